//! Feature Tracker
//!
//! A file-based lifecycle tracker for feature work items, stored as Markdown
//! records with YAML front matter and moved between status directories.
//!
//! ## Features
//!
//! - **Plain Files**: Every feature is one Markdown file; the directory it
//!   sits in is its workflow status
//! - **Guarded Transitions**: Status moves follow a fixed state machine and
//!   check that dependencies are done before work starts
//! - **Schema Validation**: Record headers are checked against a JSON Schema,
//!   with findings reported as data rather than failures
//! - **Dependency Analysis**: Missing, unmet, and circular dependencies are
//!   detected across the whole collection
//! - **Advisory Locks**: TTL-based lock files signal who is editing what
//!
//! ## Architecture
//!
//! ```text
//! features/
//! ├── backlog/
//! │   └── FEAT-0001-dark-mode.md
//! ├── in-progress/
//! ├── blocked/
//! ├── review/
//! └── done/
//! templates/
//! └── feature.md
//! schemas/
//! └── feature.schema.json
//! locks/
//! └── FEAT-0001.lock
//! ```

pub mod config;
pub mod error;
pub mod fsio;
pub mod graph;
pub mod lock;
pub mod manager;
pub mod record;
pub mod template;
pub mod validate;
pub mod workflow;

pub use config::TrackerConfig;
pub use error::{ParseFailure, Result, TrackerError};
pub use graph::DependencyGraph;
pub use lock::{LockManager, LockRecord, LockState};
pub use manager::{FeatureManager, Listing, MoveReceipt};
pub use record::{Body, Feature, FeatureHeader, Section};
pub use template::TemplateProcessor;
pub use validate::{Issue, IssueCode, RecordReport, Summary, Validator};
pub use workflow::{Status, STATUSES};
