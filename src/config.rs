//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults of the
//! classroom workflow this tool was built for (Python submissions with `src/`
//! and `unit_tests/` directories, snapshots under `admin/harnesses`).

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./config/harness.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub clone: CloneConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub issues: IssuesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("admin/harnesses")
}

/// What to pull out of a cloned submission.
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: String,
    #[serde(default = "default_test_dirs")]
    pub test_dirs: Vec<String>,
    /// Globs matched against paths relative to each scanned directory.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Info string for rendered code fences.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_readme_names")]
    pub readme_names: Vec<String>,
    #[serde(default = "default_commit_limit")]
    pub commit_limit: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            test_dirs: default_test_dirs(),
            include_globs: default_include_globs(),
            language: default_language(),
            readme_names: default_readme_names(),
            commit_limit: default_commit_limit(),
        }
    }
}

fn default_source_dir() -> String {
    "src".to_string()
}
fn default_test_dirs() -> Vec<String> {
    vec![
        "unit_tests".to_string(),
        "integration_tests".to_string(),
        "tests".to_string(),
    ]
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.py".to_string()]
}
fn default_language() -> String {
    "python".to_string()
}
fn default_readme_names() -> Vec<String> {
    vec![
        "README.md".to_string(),
        "readme.md".to_string(),
        "README.txt".to_string(),
        "README".to_string(),
    ]
}
fn default_commit_limit() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct CloneConfig {
    /// `gh` runs `gh repo clone`; `git` clones `<url_base>/<full_name>`.
    #[serde(default = "default_clone_tool")]
    pub tool: String,
    #[serde(default = "default_url_base")]
    pub url_base: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_cleanup_attempts")]
    pub cleanup_attempts: u32,
    #[serde(default = "default_cleanup_delay_ms")]
    pub cleanup_delay_ms: u64,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            tool: default_clone_tool(),
            url_base: default_url_base(),
            branch: default_branch(),
            cleanup_attempts: default_cleanup_attempts(),
            cleanup_delay_ms: default_cleanup_delay_ms(),
        }
    }
}

fn default_clone_tool() -> String {
    "gh".to_string()
}
fn default_url_base() -> String {
    "https://github.com".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_cleanup_attempts() -> u32 {
    3
}
fn default_cleanup_delay_ms() -> u64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_gh_program")]
    pub gh_program: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            gh_program: default_gh_program(),
        }
    }
}

fn default_gh_program() -> String {
    "gh".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluatorConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Whole-request timeout. Unset leaves reqwest's default (none).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            api_url: default_api_url(),
            timeout_secs: None,
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct IssuesConfig {
    #[serde(default = "default_label")]
    pub label: Option<String>,
}

impl Default for IssuesConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
        }
    }
}

fn default_label() -> Option<String> {
    Some("ai-feedback".to_string())
}

impl Config {
    /// Path of the durable snapshot index.
    pub fn index_path(&self) -> PathBuf {
        self.storage.root.join("index.json")
    }
}

/// Load configuration.
///
/// With no explicit path, a missing default file means "use defaults".
/// An explicitly named file must exist and parse.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = match explicit {
        Some(path) => read_config(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                read_config(default_path)?
            } else {
                Config::default()
            }
        }
    };
    validate(&config)?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.extract.commit_limit == 0 {
        bail!("extract.commit_limit must be > 0");
    }
    if config.extract.include_globs.is_empty() {
        bail!("extract.include_globs must not be empty");
    }
    for pattern in &config.extract.include_globs {
        Glob::new(pattern)
            .with_context(|| format!("extract.include_globs: invalid glob '{}'", pattern))?;
    }

    if config.clone.cleanup_attempts == 0 {
        bail!("clone.cleanup_attempts must be >= 1");
    }
    match config.clone.tool.as_str() {
        "gh" | "git" => {}
        other => bail!("Unknown clone tool: '{}'. Must be gh or git.", other),
    }

    match config.evaluator.provider.as_str() {
        "anthropic" | "disabled" => {}
        other => bail!(
            "Unknown evaluator provider: '{}'. Must be anthropic or disabled.",
            other
        ),
    }
    if config.evaluator.max_tokens == 0 {
        bail!("evaluator.max_tokens must be > 0");
    }
    if config.evaluator.timeout_secs == Some(0) {
        bail!("evaluator.timeout_secs must be > 0 when set");
    }

    Ok(())
}
