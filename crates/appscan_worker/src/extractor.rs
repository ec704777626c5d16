//! Manifest extraction from a script project's content listing.

use crate::remote::{RemoteError, ScriptContentService};
use crate::retry::{retry_remote, RetryPolicy};
use appscan_protocol::ScriptFile;
use thiserror::Error;
use tracing::{error, warn};

/// Extraction failures a caller may want to tell apart.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Permission denied reading script {script_id}")]
    PermissionDenied { script_id: String },

    #[error("Script {script_id} not found")]
    NotFound { script_id: String },

    #[error("Retries exhausted reading script {script_id}: {source}")]
    Exhausted {
        script_id: String,
        #[source]
        source: RemoteError,
    },
}

/// Source of the `appsscript` JSON file, if the project has one.
pub fn find_manifest(files: Vec<ScriptFile>) -> Option<String> {
    files
        .into_iter()
        .find(ScriptFile::is_manifest)
        .and_then(|file| file.source)
}

/// Fetch a project's files and return its manifest source.
///
/// Failures other than permission, not-found and retry exhaustion are logged
/// and reported as "no manifest".
pub async fn extract_manifest(
    scripts: &dyn ScriptContentService,
    script_id: &str,
    policy: &RetryPolicy,
) -> Result<Option<String>, ExtractError> {
    let label = format!("script.get_content({})", script_id);
    match retry_remote(policy, &label, || scripts.get_content(script_id)).await {
        Ok(files) => Ok(find_manifest(files)),
        Err(err) if err.is_permission_denied() => {
            warn!(script_id, "Permission denied reading script content: {}", err);
            Err(ExtractError::PermissionDenied {
                script_id: script_id.to_string(),
            })
        }
        Err(err) if err.is_not_found() => {
            warn!(script_id, "Script project not found: {}", err);
            Err(ExtractError::NotFound {
                script_id: script_id.to_string(),
            })
        }
        Err(err) if err.is_retryable() => Err(ExtractError::Exhausted {
            script_id: script_id.to_string(),
            source: err,
        }),
        Err(err) => {
            error!(script_id, "Unexpected failure reading script content: {}", err);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedContent(Result<Vec<ScriptFile>, RemoteError>);

    #[async_trait]
    impl ScriptContentService for FixedContent {
        async fn get_content(&self, _script_id: &str) -> Result<Vec<ScriptFile>, RemoteError> {
            self.0.clone()
        }
    }

    async fn extract(
        response: Result<Vec<ScriptFile>, RemoteError>,
    ) -> Result<Option<String>, ExtractError> {
        extract_manifest(&FixedContent(response), "s-1", &RetryPolicy::immediate(2)).await
    }

    #[tokio::test]
    async fn returns_manifest_source() {
        let files = vec![
            ScriptFile::new("Code", "SERVER_JS", Some("function f() {}".into())),
            ScriptFile::new("appsscript", "JSON", Some("{\"timeZone\":\"UTC\"}".into())),
        ];
        assert_eq!(
            extract(Ok(files)).await,
            Ok(Some("{\"timeZone\":\"UTC\"}".to_string()))
        );
    }

    #[tokio::test]
    async fn missing_manifest_is_none() {
        let files = vec![ScriptFile::new("Code", "SERVER_JS", Some("x".into()))];
        assert_eq!(extract(Ok(files)).await, Ok(None));
        assert_eq!(extract(Ok(Vec::new())).await, Ok(None));
    }

    #[tokio::test]
    async fn errors_are_classified() {
        assert_eq!(
            extract(Err(RemoteError::http(403, "forbidden"))).await,
            Err(ExtractError::PermissionDenied {
                script_id: "s-1".into()
            })
        );
        assert_eq!(
            extract(Err(RemoteError::http(404, "gone"))).await,
            Err(ExtractError::NotFound {
                script_id: "s-1".into()
            })
        );
        assert!(matches!(
            extract(Err(RemoteError::http(500, "oops"))).await,
            Err(ExtractError::Exhausted { .. })
        ));
        assert_eq!(extract(Err(RemoteError::http(400, "bad"))).await, Ok(None));
    }
}
