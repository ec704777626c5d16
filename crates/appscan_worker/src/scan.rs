//! Per-user scan: every manifest owned by one user.

use crate::extractor::{extract_manifest, ExtractError};
use crate::paginate::collect_pages;
use crate::remote::Impersonator;
use crate::retry::{retry_remote, RetryPolicy};
use appscan_protocol::defaults::SCRIPT_FILES_QUERY;
use appscan_protocol::ManifestRecord;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared, read-only inputs of every scan task.
#[derive(Clone)]
pub struct ScanContext {
    pub impersonator: Arc<dyn Impersonator>,
    pub retry: RetryPolicy,
    pub file_query: String,
}

impl ScanContext {
    pub fn new(impersonator: Arc<dyn Impersonator>, retry: RetryPolicy) -> Self {
        Self {
            impersonator,
            retry,
            file_query: SCRIPT_FILES_QUERY.to_string(),
        }
    }
}

/// Scan one user. Failures are logged and yield fewer (or no) records.
pub async fn scan_user(ctx: &ScanContext, email: &str) -> Vec<ManifestRecord> {
    let drive = match ctx.impersonator.drive(email).await {
        Ok(handle) => handle,
        Err(err) => {
            warn!(user = %email, "Skipping user, Drive delegation failed: {}", err);
            return Vec::new();
        }
    };
    let scripts = match ctx.impersonator.script(email).await {
        Ok(handle) => handle,
        Err(err) => {
            warn!(user = %email, "Skipping user, Apps Script delegation failed: {}", err);
            return Vec::new();
        }
    };

    let label = format!("drive.list_files({})", email);
    let label = label.as_str();
    let retry = &ctx.retry;
    let query = ctx.file_query.as_str();
    let drive = &drive;
    let assets = match collect_pages(move |token: Option<String>| async move {
        retry_remote(retry, label, || drive.list_files(query, token.clone())).await
    })
    .await
    {
        Ok(assets) => assets,
        Err(err) => {
            error!(user = %email, "Listing script projects failed: {}", err);
            return Vec::new();
        }
    };
    debug!(user = %email, scripts = assets.len(), "Listed script projects");

    let mut records = Vec::new();
    for asset in &assets {
        match extract_manifest(scripts.as_ref(), &asset.id, &ctx.retry).await {
            Ok(Some(content)) => {
                records.push(ManifestRecord::new(asset, email, Some(content), Utc::now()));
            }
            Ok(None) => debug!(user = %email, script_id = %asset.id, "No manifest in project"),
            Err(err) if is_lost_to_retries(&err) => {
                warn!(user = %email, script_id = %asset.id, "Skipping script: {}", err)
            }
            Err(err) => debug!(user = %email, script_id = %asset.id, "Skipping script: {}", err),
        }
    }

    if !records.is_empty() {
        info!(user = %email, manifests = records.len(), "Retrieved manifests");
    }
    records
}

/// Permission and not-found skips are already reported by the extractor;
/// a script dropped after exhausting retries is not.
fn is_lost_to_retries(err: &ExtractError) -> bool {
    matches!(err, ExtractError::Exhausted { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{
        ApiKind, AuthError, DirectoryService, FileListingService, RemoteError,
        ScriptContentService,
    };
    use appscan_protocol::{Page, ScriptAsset, ScriptFile};
    use async_trait::async_trait;

    struct Files {
        pages: Vec<Page<ScriptAsset>>,
        fail: bool,
    }

    #[async_trait]
    impl FileListingService for Files {
        async fn list_files(
            &self,
            _query: &str,
            page_token: Option<String>,
        ) -> Result<Page<ScriptAsset>, RemoteError> {
            if self.fail {
                return Err(RemoteError::http(400, "bad query"));
            }
            let index: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            Ok(self.pages[index].clone())
        }
    }

    struct Contents;

    #[async_trait]
    impl ScriptContentService for Contents {
        async fn get_content(&self, script_id: &str) -> Result<Vec<ScriptFile>, RemoteError> {
            match script_id {
                "denied" => Err(RemoteError::http(403, "forbidden")),
                "flaky" => Err(RemoteError::http(503, "backend error")),
                "plain" => Ok(vec![ScriptFile::new("Code", "SERVER_JS", None)]),
                id => Ok(vec![ScriptFile::new(
                    "appsscript",
                    "JSON",
                    Some(format!("{{\"id\":\"{}\"}}", id)),
                )]),
            }
        }
    }

    struct Delegation {
        deny_script: bool,
        fail_listing: bool,
    }

    #[async_trait]
    impl Impersonator for Delegation {
        async fn directory(&self, subject: &str) -> Result<Arc<dyn DirectoryService>, AuthError> {
            Err(AuthError::denied(subject, ApiKind::Directory, "not used"))
        }

        async fn drive(&self, _subject: &str) -> Result<Arc<dyn FileListingService>, AuthError> {
            Ok(Arc::new(Files {
                pages: vec![
                    Page::new(
                        vec![
                            ScriptAsset::new("s-1", "One"),
                            ScriptAsset::new("denied", "Two"),
                            ScriptAsset::new("flaky", "Five"),
                        ],
                        Some("1".to_string()),
                    ),
                    Page::last(vec![
                        ScriptAsset::new("plain", "Three"),
                        ScriptAsset::new("s-4", "Four"),
                    ]),
                ],
                fail: self.fail_listing,
            }))
        }

        async fn script(&self, subject: &str) -> Result<Arc<dyn ScriptContentService>, AuthError> {
            if self.deny_script {
                Err(AuthError::denied(subject, ApiKind::Script, "unauthorized_client"))
            } else {
                Ok(Arc::new(Contents))
            }
        }
    }

    fn context(deny_script: bool, fail_listing: bool) -> ScanContext {
        ScanContext::new(
            Arc::new(Delegation {
                deny_script,
                fail_listing,
            }),
            RetryPolicy::immediate(3),
        )
    }

    #[tokio::test]
    async fn collects_manifests_across_pages_and_skips_failures() {
        let records = scan_user(&context(false, false), "a@example.com").await;
        let ids: Vec<&str> = records.iter().map(|r| r.script_id.as_str()).collect();
        assert_eq!(ids, vec!["s-1", "s-4"]);
        assert!(records.iter().all(|r| r.owner_email == "a@example.com"));
        assert_eq!(records[1].script_name, "Four");
        assert_eq!(records[0].manifest_content.as_deref(), Some("{\"id\":\"s-1\"}"));
    }

    #[tokio::test]
    async fn failed_delegation_returns_nothing() {
        assert!(scan_user(&context(true, false), "a@example.com").await.is_empty());
    }

    #[tokio::test]
    async fn failed_listing_returns_nothing() {
        assert!(scan_user(&context(false, true), "a@example.com").await.is_empty());
    }

    #[test]
    fn only_exhausted_retries_are_loud_skips() {
        assert!(is_lost_to_retries(&ExtractError::Exhausted {
            script_id: "s-1".into(),
            source: RemoteError::http(503, "backend error"),
        }));
        assert!(!is_lost_to_retries(&ExtractError::PermissionDenied {
            script_id: "s-1".into()
        }));
        assert!(!is_lost_to_retries(&ExtractError::NotFound {
            script_id: "s-1".into()
        }));
    }
}
