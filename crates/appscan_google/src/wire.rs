//! JSON bodies exchanged with the Google endpoints.

use appscan_protocol::{DomainUser, Page, ScriptAsset, ScriptFile};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserList {
    #[serde(default)]
    pub users: Vec<UserEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserEntry {
    #[serde(default)]
    pub primary_email: String,
    #[serde(default)]
    pub suspended: bool,
}

impl From<UserList> for Page<DomainUser> {
    fn from(list: UserList) -> Self {
        let users = list
            .users
            .into_iter()
            .map(|u| DomainUser::new(u.primary_email, u.suspended))
            .collect();
        Page::new(users, list.next_page_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileList {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl From<FileList> for Page<ScriptAsset> {
    fn from(list: FileList) -> Self {
        let assets = list
            .files
            .into_iter()
            .map(|f| ScriptAsset::new(f.id, f.name))
            .collect();
        Page::new(assets, list.next_page_token)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectContent {
    #[serde(default)]
    pub files: Vec<ContentFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentFile {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub file_type: String,
    pub source: Option<String>,
}

impl From<ProjectContent> for Vec<ScriptFile> {
    fn from(content: ProjectContent) -> Self {
        content
            .files
            .into_iter()
            .map(|f| ScriptFile::new(f.name, f.file_type, f.source))
            .collect()
    }
}

/// Token from the metadata server or the OAuth token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignJwtRequest {
    pub payload: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignJwtResponse {
    pub signed_jwt: String,
}

/// Claims of the domain-wide delegation assertion.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct DelegationClaims {
    pub iss: String,
    pub sub: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Standard Google API error envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorReason {
    #[serde(default)]
    pub reason: String,
}

/// OAuth token endpoint error.
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthError {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_list_defaults_missing_fields() {
        let list: UserList = serde_json::from_str(
            r#"{"users":[{"primaryEmail":"a@example.com"},{"primaryEmail":"b@example.com","suspended":true}],"nextPageToken":"n1"}"#,
        )
        .unwrap();
        let page: Page<DomainUser> = list.into();
        assert_eq!(page.items[0], DomainUser::active("a@example.com"));
        assert!(page.items[1].suspended);
        assert_eq!(page.next_token.as_deref(), Some("n1"));

        let empty: UserList = serde_json::from_str("{}").unwrap();
        let page: Page<DomainUser> = empty.into();
        assert!(page.items.is_empty());
        assert!(!page.has_next());
    }

    #[test]
    fn project_content_maps_type_field() {
        let content: ProjectContent = serde_json::from_str(
            r#"{"scriptId":"s-1","files":[{"name":"appsscript","type":"JSON","source":"{}"},{"name":"Code","type":"SERVER_JS"}]}"#,
        )
        .unwrap();
        let files: Vec<ScriptFile> = content.into();
        assert!(files[0].is_manifest());
        assert_eq!(files[1].source, None);
    }
}
