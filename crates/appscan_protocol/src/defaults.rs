//! Canonical default values shared across the pipeline and the binary.

/// Worker pool size for the user fan-out.
pub const DEFAULT_MAX_WORKERS: usize = 8;
/// Flush threshold for the batching buffer.
pub const DEFAULT_BATCH_SIZE: usize = 500;
/// Target table when none is configured.
pub const DEFAULT_MANIFEST_TABLE: &str = "manifest_audit_log";
/// DuckDB file used as the persistent store.
pub const DEFAULT_STORE_PATH: &str = "manifest_audit.duckdb";

/// Directory customer alias for "the caller's own organization".
pub const DIRECTORY_CUSTOMER: &str = "my_customer";
pub const DIRECTORY_PAGE_SIZE: u32 = 500;
pub const DRIVE_PAGE_SIZE: u32 = 100;
/// Drive query selecting owned, non-trashed Apps Script projects.
pub const SCRIPT_FILES_QUERY: &str =
    "mimeType='application/vnd.google-apps.script' and 'me' in owners and trashed=false";

pub const RETRY_MAX_ATTEMPTS: u32 = 3;
pub const RETRY_INITIAL_BACKOFF_SECS: u64 = 2;
pub const RETRY_MAX_BACKOFF_SECS: u64 = 10;
pub const RETRY_JITTER_MS: u64 = 250;

pub const HTTP_TIMEOUT_SECS: u64 = 60;
