//! REST clients bound to one delegated access token.

use crate::auth::GoogleEndpoints;
use crate::error::{classify_failure, classify_transport};
use crate::wire::{FileList, ProjectContent, UserList};
use appscan_protocol::defaults::{DIRECTORY_CUSTOMER, DIRECTORY_PAGE_SIZE, DRIVE_PAGE_SIZE};
use appscan_protocol::{DomainUser, Page, ScriptAsset, ScriptFile};
use appscan_worker::{DirectoryService, FileListingService, RemoteError, ScriptContentService};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

const QUOTA_PROJECT_HEADER: &str = "x-goog-user-project";
const DRIVE_FIELDS: &str = "nextPageToken, files(id, name)";

/// HTTP client, bearer token and quota project shared by the API clients.
#[derive(Clone)]
pub struct ApiSession {
    http: reqwest::Client,
    access_token: String,
    quota_project: String,
    endpoints: Arc<GoogleEndpoints>,
}

impl std::fmt::Debug for ApiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSession")
            .field("quota_project", &self.quota_project)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl ApiSession {
    pub fn new(
        http: reqwest::Client,
        access_token: impl Into<String>,
        quota_project: impl Into<String>,
        endpoints: Arc<GoogleEndpoints>,
    ) -> Self {
        Self {
            http,
            access_token: access_token.into(),
            quota_project: quota_project.into(),
            endpoints,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let mut request = self.http.get(url).bearer_auth(&self.access_token).query(query);
        if !self.quota_project.is_empty() {
            request = request.header(QUOTA_PROJECT_HEADER, &self.quota_project);
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(url, status = status.as_u16(), "Google API call failed");
            return Err(classify_failure(status.as_u16(), &body));
        }
        response.json::<T>().await.map_err(|e| RemoteError::Decode {
            message: format!("{}: {}", url, e),
        })
    }
}

fn with_page_token(
    mut query: Vec<(&'static str, String)>,
    page_token: Option<String>,
) -> Vec<(&'static str, String)> {
    if let Some(token) = page_token {
        query.push(("pageToken", token));
    }
    query
}

/// Admin Directory users listing.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    session: ApiSession,
}

impl DirectoryClient {
    pub fn new(session: ApiSession) -> Self {
        Self { session }
    }

    fn users_url(&self) -> String {
        format!("{}/users", self.session.endpoints.directory)
    }
}

#[async_trait]
impl DirectoryService for DirectoryClient {
    async fn list_users(
        &self,
        page_token: Option<String>,
    ) -> Result<Page<DomainUser>, RemoteError> {
        let query = with_page_token(
            vec![
                ("customer", DIRECTORY_CUSTOMER.to_string()),
                ("maxResults", DIRECTORY_PAGE_SIZE.to_string()),
            ],
            page_token,
        );
        let list: UserList = self.session.get_json(&self.users_url(), &query).await?;
        Ok(list.into())
    }
}

/// Drive files listing, as the impersonated user.
#[derive(Debug, Clone)]
pub struct DriveClient {
    session: ApiSession,
}

impl DriveClient {
    pub fn new(session: ApiSession) -> Self {
        Self { session }
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.session.endpoints.drive)
    }
}

#[async_trait]
impl FileListingService for DriveClient {
    async fn list_files(
        &self,
        query: &str,
        page_token: Option<String>,
    ) -> Result<Page<ScriptAsset>, RemoteError> {
        let params = with_page_token(
            vec![
                ("q", query.to_string()),
                ("spaces", "drive".to_string()),
                ("fields", DRIVE_FIELDS.to_string()),
                ("pageSize", DRIVE_PAGE_SIZE.to_string()),
            ],
            page_token,
        );
        let list: FileList = self.session.get_json(&self.files_url(), &params).await?;
        Ok(list.into())
    }
}

/// Apps Script project content.
#[derive(Debug, Clone)]
pub struct ScriptClient {
    session: ApiSession,
}

impl ScriptClient {
    pub fn new(session: ApiSession) -> Self {
        Self { session }
    }

    fn content_url(&self, script_id: &str) -> String {
        format!("{}/projects/{}/content", self.session.endpoints.script, script_id)
    }
}

#[async_trait]
impl ScriptContentService for ScriptClient {
    async fn get_content(&self, script_id: &str) -> Result<Vec<ScriptFile>, RemoteError> {
        let content: ProjectContent = self
            .session
            .get_json(&self.content_url(script_id), &[])
            .await?;
        Ok(content.into())
    }
}
