//! Apps Script manifest audit.
//!
//! Lists every active user of a Google Workspace domain, scans the script
//! projects each one owns with bounded concurrency, and merges the extracted
//! `appsscript` manifests into a DuckDB table keyed by script id.

pub mod config;
pub mod pipeline;

pub use config::{strip_project_qualifier, AuditConfig, ConfigError, RawConfig};
pub use pipeline::{AuditPipeline, PipelineSettings, RunReport};
