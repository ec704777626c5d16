//! Remote capabilities the pipeline depends on.

use appscan_protocol::{DomainUser, Page, ScriptAsset, ScriptFile};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The three APIs a delegated handle can be acquired for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    Directory,
    Drive,
    Script,
}

impl ApiKind {
    pub fn api_name(&self) -> &'static str {
        match self {
            ApiKind::Directory => "admin",
            ApiKind::Drive => "drive",
            ApiKind::Script => "script",
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            ApiKind::Directory => "directory_v1",
            ApiKind::Drive => "v3",
            ApiKind::Script => "v1",
        }
    }

    /// Read-only OAuth scope requested for this API.
    pub fn scope(&self) -> &'static str {
        match self {
            ApiKind::Directory => "https://www.googleapis.com/auth/admin.directory.user.readonly",
            ApiKind::Drive => "https://www.googleapis.com/auth/drive.readonly",
            ApiKind::Script => "https://www.googleapis.com/auth/script.projects.readonly",
        }
    }

    pub fn all() -> [ApiKind; 3] {
        [ApiKind::Directory, ApiKind::Drive, ApiKind::Script]
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_name(), self.api_version())
    }
}

/// Failure of one remote call, classified for retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Undecodable response: {message}")]
    Decode { message: String },

    #[error("{message}")]
    Other { message: String },
}

impl RemoteError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        RemoteError::RateLimited {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        RemoteError::Transport {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        RemoteError::Other {
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Http { status, .. } => Some(*status),
            RemoteError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Rate limiting, request timeout, server errors and transport failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::RateLimited { .. } | RemoteError::Transport { .. } => true,
            RemoteError::Http { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            RemoteError::Decode { .. } | RemoteError::Other { .. } => false,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, RemoteError::Http { status: 403, .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Http { status: 404, .. })
    }
}

/// Failure to obtain a delegated handle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Delegation for {subject} on {api} rejected: {message}")]
    Denied {
        subject: String,
        api: ApiKind,
        message: String,
    },

    #[error("Credential exchange failed: {message}")]
    Credentials { message: String },
}

impl AuthError {
    pub fn denied(subject: impl Into<String>, api: ApiKind, message: impl Into<String>) -> Self {
        AuthError::Denied {
            subject: subject.into(),
            api,
            message: message.into(),
        }
    }
}

/// Paginated listing of the organization's users.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn list_users(&self, page_token: Option<String>) -> Result<Page<DomainUser>, RemoteError>;
}

/// Paginated listing of files owned by the impersonated user.
#[async_trait]
pub trait FileListingService: Send + Sync {
    async fn list_files(
        &self,
        query: &str,
        page_token: Option<String>,
    ) -> Result<Page<ScriptAsset>, RemoteError>;
}

/// Content listing of one script project.
#[async_trait]
pub trait ScriptContentService: Send + Sync {
    async fn get_content(&self, script_id: &str) -> Result<Vec<ScriptFile>, RemoteError>;
}

/// Acquires API handles acting as a given user.
#[async_trait]
pub trait Impersonator: Send + Sync {
    async fn directory(&self, subject: &str) -> Result<Arc<dyn DirectoryService>, AuthError>;
    async fn drive(&self, subject: &str) -> Result<Arc<dyn FileListingService>, AuthError>;
    async fn script(&self, subject: &str) -> Result<Arc<dyn ScriptContentService>, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(RemoteError::rate_limited("slow down").is_retryable());
        assert!(RemoteError::transport("reset").is_retryable());
        for status in [408, 429, 500, 502, 503, 599] {
            assert!(RemoteError::http(status, "x").is_retryable(), "{}", status);
        }
        for status in [400, 401, 403, 404, 409] {
            assert!(!RemoteError::http(status, "x").is_retryable(), "{}", status);
        }
        assert!(!RemoteError::other("boom").is_retryable());
    }

    #[test]
    fn permission_and_not_found_are_distinct() {
        assert!(RemoteError::http(403, "no").is_permission_denied());
        assert!(!RemoteError::rate_limited("quota").is_permission_denied());
        assert!(RemoteError::http(404, "gone").is_not_found());
    }

    #[test]
    fn api_kind_display() {
        assert_eq!(ApiKind::Directory.to_string(), "admin/directory_v1");
        assert_eq!(ApiKind::Script.to_string(), "script/v1");
    }
}
