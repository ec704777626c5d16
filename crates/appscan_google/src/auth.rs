//! Domain-wide delegation without a private key.
//!
//! The runtime identity (metadata server token, or an explicit override)
//! asks IAM Credentials to sign a JWT on behalf of the delegating service
//! account. The signed assertion names the subject being impersonated and is
//! exchanged at the OAuth token endpoint for a short-lived access token.

use crate::clients::{ApiSession, DirectoryClient, DriveClient, ScriptClient};
use crate::error::{oauth_message, GoogleError};
use crate::wire::{AccessToken, DelegationClaims, SignJwtRequest, SignJwtResponse};
use appscan_worker::{
    ApiKind, AuthError, DirectoryService, FileListingService, Impersonator, ScriptContentService,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens this close to expiry are refreshed instead of reused.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Base URLs of every endpoint the adapters talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub directory: String,
    pub drive: String,
    pub script: String,
    pub oauth_token: String,
    pub iam_credentials: String,
    pub metadata_token: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            directory: "https://admin.googleapis.com/admin/directory/v1".to_string(),
            drive: "https://www.googleapis.com/drive/v3".to_string(),
            script: "https://script.googleapis.com/v1".to_string(),
            oauth_token: "https://oauth2.googleapis.com/token".to_string(),
            iam_credentials: "https://iamcredentials.googleapis.com/v1".to_string(),
            metadata_token: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
                .to_string(),
        }
    }
}

/// Who signs, who pays, and how long requests may take.
#[derive(Debug, Clone)]
pub struct DelegationSettings {
    pub service_account_email: String,
    pub quota_project: String,
    pub http_timeout: Duration,
    /// Caller token to use instead of asking the metadata server.
    pub access_token_override: Option<String>,
    pub endpoints: GoogleEndpoints,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn new(token: String, expires_in_secs: u64) -> Self {
        Self {
            token,
            expires_at: Instant::now() + Duration::from_secs(expires_in_secs),
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now() + EXPIRY_MARGIN
    }
}

/// [`Impersonator`] backed by IAM `signJwt` and the OAuth JWT-bearer grant.
pub struct GoogleImpersonator {
    http: reqwest::Client,
    settings: DelegationSettings,
    endpoints: Arc<GoogleEndpoints>,
    caller_token: Mutex<Option<CachedToken>>,
    delegated: Mutex<HashMap<String, CachedToken>>,
}

impl GoogleImpersonator {
    pub fn new(settings: DelegationSettings) -> Result<Self, GoogleError> {
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()?;
        let endpoints = Arc::new(settings.endpoints.clone());
        Ok(Self {
            http,
            settings,
            endpoints,
            caller_token: Mutex::new(None),
            delegated: Mutex::new(HashMap::new()),
        })
    }

    fn scopes() -> String {
        ApiKind::all()
            .iter()
            .map(|api| api.scope())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn claims(&self, subject: &str, now: DateTime<Utc>) -> DelegationClaims {
        let iat = now.timestamp();
        DelegationClaims {
            iss: self.settings.service_account_email.clone(),
            sub: subject.to_string(),
            scope: Self::scopes(),
            aud: self.endpoints.oauth_token.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        }
    }

    fn sign_jwt_url(&self) -> String {
        format!(
            "{}/projects/-/serviceAccounts/{}:signJwt",
            self.endpoints.iam_credentials, self.settings.service_account_email
        )
    }

    /// Access token of the identity this process runs as.
    async fn caller_token(&self) -> Result<String, GoogleError> {
        if let Some(token) = &self.settings.access_token_override {
            return Ok(token.clone());
        }
        let cached = lock(&self.caller_token)
            .as_ref()
            .filter(|t| t.is_fresh())
            .map(|t| t.token.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        let response = self
            .http
            .get(&self.endpoints.metadata_token)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        let token: AccessToken = read_json(response, "metadata token").await?;
        debug!(expires_in = token.expires_in, "Fetched runtime identity token");

        let cached = CachedToken::new(token.access_token, token.expires_in);
        let value = cached.token.clone();
        *lock(&self.caller_token) = Some(cached);
        Ok(value)
    }

    /// Access token acting as `subject`, cached until close to expiry.
    async fn delegated_token(&self, subject: &str) -> Result<String, GoogleError> {
        let cached = lock(&self.delegated)
            .get(subject)
            .filter(|t| t.is_fresh())
            .map(|t| t.token.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        let caller = self.caller_token().await?;
        let payload = serde_json::to_string(&self.claims(subject, Utc::now()))?;
        let response = self
            .http
            .post(self.sign_jwt_url())
            .bearer_auth(&caller)
            .json(&SignJwtRequest { payload })
            .send()
            .await?;
        let signed: SignJwtResponse = read_json(response, "signJwt").await?;

        let response = self
            .http
            .post(&self.endpoints.oauth_token)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", signed.signed_jwt.as_str())])
            .send()
            .await?;
        let token: AccessToken = read_json(response, "token exchange").await?;
        debug!(subject, expires_in = token.expires_in, "Minted delegated token");

        let cached = CachedToken::new(token.access_token, token.expires_in);
        let value = cached.token.clone();
        lock(&self.delegated).insert(subject.to_string(), cached);
        Ok(value)
    }

    async fn session(&self, subject: &str, api: ApiKind) -> Result<ApiSession, AuthError> {
        let token = self
            .delegated_token(subject)
            .await
            .map_err(|e| e.into_auth_error(subject, api))?;
        Ok(ApiSession::new(
            self.http.clone(),
            token,
            self.settings.quota_project.clone(),
            Arc::clone(&self.endpoints),
        ))
    }
}

#[async_trait]
impl Impersonator for GoogleImpersonator {
    async fn directory(&self, subject: &str) -> Result<Arc<dyn DirectoryService>, AuthError> {
        let session = self.session(subject, ApiKind::Directory).await?;
        info!(subject, api = %ApiKind::Directory, "Acquired delegated handle");
        Ok(Arc::new(DirectoryClient::new(session)))
    }

    async fn drive(&self, subject: &str) -> Result<Arc<dyn FileListingService>, AuthError> {
        let session = self.session(subject, ApiKind::Drive).await?;
        Ok(Arc::new(DriveClient::new(session)))
    }

    async fn script(&self, subject: &str) -> Result<Arc<dyn ScriptContentService>, AuthError> {
        let session = self.session(subject, ApiKind::Script).await?;
        Ok(Arc::new(ScriptClient::new(session)))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    stage: &'static str,
) -> Result<T, GoogleError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GoogleError::Status {
            stage,
            status: status.as_u16(),
            message: oauth_message(&body),
        });
    }
    Ok(response.json::<T>().await?)
}

// Cache maps stay usable after a panic elsewhere; worst case is a refetch.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn impersonator(override_token: Option<&str>) -> GoogleImpersonator {
        GoogleImpersonator::new(DelegationSettings {
            service_account_email: "auditor@proj.iam.gserviceaccount.com".to_string(),
            quota_project: "proj".to_string(),
            http_timeout: Duration::from_secs(5),
            access_token_override: override_token.map(str::to_string),
            endpoints: GoogleEndpoints::default(),
        })
        .unwrap()
    }

    #[test]
    fn claims_name_subject_and_all_scopes() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let claims = impersonator(None).claims("a@example.com", now);
        assert_eq!(claims.iss, "auditor@proj.iam.gserviceaccount.com");
        assert_eq!(claims.sub, "a@example.com");
        assert_eq!(claims.aud, "https://oauth2.googleapis.com/token");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.scope.split(' ').count(), 3);
        assert!(claims.scope.contains("script.projects.readonly"));
    }

    #[test]
    fn sign_jwt_url_targets_service_account() {
        assert_eq!(
            impersonator(None).sign_jwt_url(),
            "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/auditor@proj.iam.gserviceaccount.com:signJwt"
        );
    }

    #[test]
    fn stale_tokens_are_not_reused() {
        assert!(CachedToken::new("t".into(), 3600).is_fresh());
        assert!(!CachedToken::new("t".into(), 30).is_fresh());
    }

    #[tokio::test]
    async fn override_skips_metadata_server() {
        let token = impersonator(Some("caller-token")).caller_token().await.unwrap();
        assert_eq!(token, "caller-token");
    }
}
