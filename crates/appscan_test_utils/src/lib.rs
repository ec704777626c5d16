//! Appscan Test Utilities
//!
//! In-memory doubles for everything the pipeline talks to:
//!
//! - [`MockWorkspace`]: directory, file listing, script content and
//!   impersonation over plain maps, with call recording
//! - [`RecordingSink`]: a [`BatchSink`](appscan_sinks::BatchSink) that keeps
//!   every batch it receives
//! - [`fixtures`]: an in-memory DuckDB target
//!
//! # Usage
//!
//! ```rust,ignore
//! use appscan_test_utils::{MockWorkspace, RecordingSink};
//!
//! let workspace = MockWorkspace::new("admin@example.com")
//!     .with_user("a@example.com")
//!     .with_script("a@example.com", "s-1", "Budget", Some("{}"));
//! let impersonator = workspace.impersonator();
//! ```

pub mod fixtures;
pub mod remote;
pub mod sinks;

pub use fixtures::memory_target;
pub use remote::{MockWorkspace, WorkspaceCall};
pub use sinks::RecordingSink;
