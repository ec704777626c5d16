//! Outcome reported by a pipeline invocation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Final status of one audit run.
///
/// Maps onto an HTTP-style code: 200 for outcomes that are not failures
/// (including an empty directory), 500 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    NoUsersFound,
    AdminAuthFailure,
    Failed(String),
}

impl RunStatus {
    pub fn failed(detail: impl Into<String>) -> Self {
        RunStatus::Failed(detail.into())
    }

    pub fn message(&self) -> String {
        match self {
            RunStatus::Success => "Success".to_string(),
            RunStatus::NoUsersFound => "No Users Found".to_string(),
            RunStatus::AdminAuthFailure => "Admin Auth Failure".to_string(),
            RunStatus::Failed(detail) => format!("Failed: {}", detail),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            RunStatus::Success | RunStatus::NoUsersFound => 200,
            RunStatus::AdminAuthFailure | RunStatus::Failed(_) => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code() == 200
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}
