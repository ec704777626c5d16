//! Google Workspace adapters.
//!
//! Implements the remote traits of `appscan_worker` over the Admin
//! Directory, Drive and Apps Script REST APIs with plain `reqwest` calls.
//! Delegated handles are minted by [`GoogleImpersonator`]: the runtime
//! identity asks IAM Credentials to sign a domain-wide delegation JWT for the
//! subject, which is then exchanged for an access token.

mod auth;
mod clients;
mod error;
mod wire;

pub use auth::{DelegationSettings, GoogleEndpoints, GoogleImpersonator};
pub use clients::{ApiSession, DirectoryClient, DriveClient, ScriptClient};
pub use error::{classify_failure, GoogleError};
