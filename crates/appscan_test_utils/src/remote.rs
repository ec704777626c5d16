//! In-memory Google Workspace: users, owned scripts, delegation.

use appscan_protocol::{DomainUser, Page, ScriptAsset, ScriptFile};
use appscan_worker::{
    ApiKind, AuthError, DirectoryService, FileListingService, Impersonator, RemoteError,
    ScriptContentService,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// One interaction with the fake workspace, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceCall {
    Delegate { api: ApiKind, subject: String },
    ListUsers { page_token: Option<String> },
    ListFiles { subject: String, page_token: Option<String> },
    GetContent { subject: String, script_id: String },
}

type CallLog = Arc<Mutex<Vec<WorkspaceCall>>>;

/// Builder and [`Impersonator`] over in-memory maps.
#[derive(Clone)]
pub struct MockWorkspace {
    admin: String,
    users: Vec<DomainUser>,
    user_page_size: usize,
    file_page_size: usize,
    files: HashMap<String, Vec<ScriptAsset>>,
    contents: HashMap<String, Result<Vec<ScriptFile>, RemoteError>>,
    denied: HashSet<String>,
    directory_failure: Option<RemoteError>,
    calls: CallLog,
}

impl MockWorkspace {
    pub fn new(admin: &str) -> Self {
        Self {
            admin: admin.to_string(),
            users: Vec::new(),
            user_page_size: 500,
            file_page_size: 100,
            files: HashMap::new(),
            contents: HashMap::new(),
            denied: HashSet::new(),
            directory_failure: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_user(mut self, email: &str) -> Self {
        self.users.push(DomainUser::active(email));
        self
    }

    pub fn with_suspended_user(mut self, email: &str) -> Self {
        self.users.push(DomainUser::new(email, true));
        self
    }

    pub fn with_user_page_size(mut self, size: usize) -> Self {
        self.user_page_size = size.max(1);
        self
    }

    pub fn with_file_page_size(mut self, size: usize) -> Self {
        self.file_page_size = size.max(1);
        self
    }

    /// A script owned by `owner`; `manifest` becomes its `appsscript` source.
    pub fn with_script(
        mut self,
        owner: &str,
        id: &str,
        name: &str,
        manifest: Option<&str>,
    ) -> Self {
        self.files
            .entry(owner.to_string())
            .or_default()
            .push(ScriptAsset::new(id, name));
        let mut files = vec![ScriptFile::new(
            "Code",
            "SERVER_JS",
            Some("function main() {}".to_string()),
        )];
        if let Some(source) = manifest {
            files.push(ScriptFile::new("appsscript", "JSON", Some(source.to_string())));
        }
        self.contents.insert(id.to_string(), Ok(files));
        self
    }

    /// Make content reads of `script_id` fail with `error`.
    pub fn with_content_error(mut self, script_id: &str, error: RemoteError) -> Self {
        self.contents.insert(script_id.to_string(), Err(error));
        self
    }

    /// Refuse delegation for `subject` on every API.
    pub fn deny(mut self, subject: &str) -> Self {
        self.denied.insert(subject.to_string());
        self
    }

    pub fn fail_directory(mut self, error: RemoteError) -> Self {
        self.directory_failure = Some(error);
        self
    }

    pub fn impersonator(&self) -> Arc<dyn Impersonator> {
        Arc::new(self.clone())
    }

    pub fn calls(&self) -> Vec<WorkspaceCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Subjects for which a handle of `api` was requested.
    pub fn delegations(&self, api: ApiKind) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                WorkspaceCall::Delegate { api: a, subject } if a == api => Some(subject),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: WorkspaceCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn delegate(&self, api: ApiKind, subject: &str) -> Result<(), AuthError> {
        self.record(WorkspaceCall::Delegate {
            api,
            subject: subject.to_string(),
        });
        if self.denied.contains(subject) {
            Err(AuthError::denied(subject, api, "unauthorized_client"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Impersonator for MockWorkspace {
    async fn directory(&self, subject: &str) -> Result<Arc<dyn DirectoryService>, AuthError> {
        self.delegate(ApiKind::Directory, subject)?;
        if subject != self.admin {
            return Err(AuthError::denied(
                subject,
                ApiKind::Directory,
                "not a domain administrator",
            ));
        }
        Ok(Arc::new(MockDirectory {
            users: self.users.clone(),
            page_size: self.user_page_size,
            failure: self.directory_failure.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }

    async fn drive(&self, subject: &str) -> Result<Arc<dyn FileListingService>, AuthError> {
        self.delegate(ApiKind::Drive, subject)?;
        Ok(Arc::new(MockDrive {
            subject: subject.to_string(),
            assets: self.files.get(subject).cloned().unwrap_or_default(),
            page_size: self.file_page_size,
            calls: Arc::clone(&self.calls),
        }))
    }

    async fn script(&self, subject: &str) -> Result<Arc<dyn ScriptContentService>, AuthError> {
        self.delegate(ApiKind::Script, subject)?;
        Ok(Arc::new(MockScripts {
            subject: subject.to_string(),
            contents: self.contents.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

/// Page `items` with offset tokens.
fn page_at<T: Clone>(
    items: &[T],
    page_token: Option<&str>,
    page_size: usize,
) -> Result<Page<T>, RemoteError> {
    let start = match page_token {
        None => 0,
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| RemoteError::http(400, format!("invalid page token {}", token)))?,
    };
    let start = start.min(items.len());
    let end = (start + page_size).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    Ok(Page::new(items[start..end].to_vec(), next))
}

struct MockDirectory {
    users: Vec<DomainUser>,
    page_size: usize,
    failure: Option<RemoteError>,
    calls: CallLog,
}

#[async_trait]
impl DirectoryService for MockDirectory {
    async fn list_users(
        &self,
        page_token: Option<String>,
    ) -> Result<Page<DomainUser>, RemoteError> {
        self.calls.lock().unwrap().push(WorkspaceCall::ListUsers {
            page_token: page_token.clone(),
        });
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        page_at(&self.users, page_token.as_deref(), self.page_size)
    }
}

struct MockDrive {
    subject: String,
    assets: Vec<ScriptAsset>,
    page_size: usize,
    calls: CallLog,
}

#[async_trait]
impl FileListingService for MockDrive {
    async fn list_files(
        &self,
        _query: &str,
        page_token: Option<String>,
    ) -> Result<Page<ScriptAsset>, RemoteError> {
        self.calls.lock().unwrap().push(WorkspaceCall::ListFiles {
            subject: self.subject.clone(),
            page_token: page_token.clone(),
        });
        page_at(&self.assets, page_token.as_deref(), self.page_size)
    }
}

struct MockScripts {
    subject: String,
    contents: HashMap<String, Result<Vec<ScriptFile>, RemoteError>>,
    calls: CallLog,
}

#[async_trait]
impl ScriptContentService for MockScripts {
    async fn get_content(&self, script_id: &str) -> Result<Vec<ScriptFile>, RemoteError> {
        self.calls.lock().unwrap().push(WorkspaceCall::GetContent {
            subject: self.subject.clone(),
            script_id: script_id.to_string(),
        });
        self.contents
            .get(script_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(RemoteError::http(
                    404,
                    format!("script {} not found", script_id),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn users_are_paged_with_offset_tokens() {
        let workspace = MockWorkspace::new("admin@example.com")
            .with_user("a@example.com")
            .with_user("b@example.com")
            .with_user("c@example.com")
            .with_user_page_size(2);
        let directory = workspace.impersonator().directory("admin@example.com").await.unwrap();

        let first = directory.list_users(None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        let second = directory.list_users(first.next_token).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(!second.has_next());
        assert_eq!(workspace.delegations(ApiKind::Directory), vec!["admin@example.com"]);
    }

    #[tokio::test]
    async fn denied_subject_gets_no_handle() {
        let workspace = MockWorkspace::new("admin@example.com").deny("a@example.com");
        assert!(workspace.impersonator().drive("a@example.com").await.is_err());
    }

    #[tokio::test]
    async fn only_the_admin_can_list_the_directory() {
        let workspace = MockWorkspace::new("admin@example.com").with_user("a@example.com");
        let impersonator = workspace.impersonator();
        assert!(impersonator.directory("a@example.com").await.is_err());
        assert!(impersonator.directory("admin@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_script_is_not_found() {
        let workspace = MockWorkspace::new("admin@example.com");
        let scripts = workspace.impersonator().script("a@example.com").await.unwrap();
        let err = scripts.get_content("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
