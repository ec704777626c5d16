//! Concurrent harvesting for the manifest audit.
//!
//! The building blocks, leaf first:
//!
//! - [`retry::retry_remote`]: bounded exponential-backoff retry of one remote call
//! - [`paginate::collect_pages`]: follows continuation tokens into one ordered list
//! - [`extractor::extract_manifest`]: pulls the `appsscript` manifest out of a project
//! - [`scan::scan_user`]: all manifests owned by one user, never failing
//! - [`scheduler::BoundedScheduler`]: fixed-size window of concurrent tasks
//!
//! Remote capabilities are traits in [`remote`], so every piece can be driven
//! by in-memory doubles.

pub mod extractor;
pub mod paginate;
pub mod remote;
pub mod retry;
pub mod scan;
pub mod scheduler;

pub use extractor::{extract_manifest, find_manifest, ExtractError};
pub use paginate::collect_pages;
pub use remote::{
    ApiKind, AuthError, DirectoryService, FileListingService, Impersonator, RemoteError,
    ScriptContentService,
};
pub use retry::{retry_remote, RetryPolicy};
pub use scan::{scan_user, ScanContext};
pub use scheduler::{BoundedScheduler, SchedulerReport};
