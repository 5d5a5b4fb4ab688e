//! # Classroom Harness
//!
//! Snapshots of classroom assignment submissions, taken as reviewable
//! documents and tracked in a durable index.
//!
//! For each accepted submission the pipeline clones the repository into a
//! throwaway workspace, extracts sources, tests, README and recent history,
//! assembles a [`models::HarnessDocument`], renders it deterministically, and
//! stores the rendering under `<root>/assignments/<assignment>/<student>/`.
//! Stored documents can later be evaluated against a rubric.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────┐   ┌──────────┐
//! │ Classroom  │──▶│ Materialize │──▶│ Document │──▶│  Render  │
//! │  API (gh)  │   │ clone+walk  │   │  build   │   │ markdown │
//! └────────────┘   └─────────────┘   └──────────┘   └────┬─────┘
//!                                                        ▼
//!                  ┌─────────────┐                 ┌──────────┐
//!                  │  Evaluate   │◀────────────────│  Store   │
//!                  │ (Anthropic) │                 │ + index  │
//!                  └─────────────┘                 └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error categories callers distinguish |
//! | [`models`] | API payloads and the harness document |
//! | [`slug`] | Filesystem-safe identifiers |
//! | [`classroom`] | Classroom API access |
//! | [`workspace`] | Self-removing clone directories |
//! | [`materialize`] | Cloning and extraction |
//! | [`document`] | Harness document assembly |
//! | [`render`] | Deterministic rendering and section extraction |
//! | [`index`] | Snapshot index model and persistence |
//! | [`store`] | Snapshot files and `latest` alias |
//! | [`snapshot`] | The snapshot pipeline |
//! | [`evaluate`] | Rubric evaluation of stored documents |
//! | [`issues`] | Posting feedback as issues |
//! | [`logging`] | Diagnostic logging setup |

pub mod classroom;
pub mod config;
pub mod document;
pub mod error;
pub mod evaluate;
pub mod index;
pub mod issues;
pub mod logging;
pub mod materialize;
pub mod models;
pub mod render;
pub mod slug;
pub mod snapshot;
pub mod store;
pub mod workspace;
