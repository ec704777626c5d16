//! Shared data model for the Appscan manifest audit.
//!
//! Every crate in the workspace speaks in these types: directory users and
//! script assets flow in from the remote services, manifest records flow out
//! to the sink, and the run status is what the entry point reports.

pub mod defaults;
pub mod status;
pub mod types;

pub use status::RunStatus;
pub use types::{
    DomainUser, ManifestRecord, Page, ScriptAsset, ScriptFile, MANIFEST_COLUMNS,
    MANIFEST_FILE_NAME, MANIFEST_FILE_TYPE,
};
