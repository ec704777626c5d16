//! Error mapping for Google API responses.

use crate::wire::{ErrorEnvelope, OAuthError};
use appscan_worker::{ApiKind, AuthError, RemoteError};
use thiserror::Error;

/// Reasons Google attaches to a 403 that is really a quota refusal.
const RATE_LIMIT_REASONS: [&str; 3] = [
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "quotaExceeded",
];

/// Longest response body quoted in an error message.
const MAX_BODY_CHARS: usize = 300;

/// Failures while minting credentials.
#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{stage} returned {status}: {message}")]
    Status {
        stage: &'static str,
        status: u16,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GoogleError {
    /// Client errors from the token exchange mean the subject cannot be
    /// impersonated; anything else is a credential plumbing failure.
    pub fn into_auth_error(self, subject: &str, api: ApiKind) -> AuthError {
        match self {
            GoogleError::Status {
                stage,
                status,
                message,
            } if (400..500).contains(&status) => {
                AuthError::denied(subject, api, format!("{} ({}): {}", stage, status, message))
            }
            other => AuthError::Credentials {
                message: other.to_string(),
            },
        }
    }
}

/// Classify a non-success API response.
pub fn classify_failure(status: u16, body: &str) -> RemoteError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = match &envelope {
        Some(env) if !env.error.message.is_empty() => env.error.message.clone(),
        _ => truncate(body),
    };

    let quota_refusal = envelope.as_ref().is_some_and(|env| {
        env.error.status == "RESOURCE_EXHAUSTED"
            || env
                .error
                .errors
                .iter()
                .any(|e| RATE_LIMIT_REASONS.contains(&e.reason.as_str()))
    });

    if status == 429 || (status == 403 && quota_refusal) {
        RemoteError::RateLimited { message }
    } else {
        RemoteError::Http { status, message }
    }
}

/// Classify a failure that produced no HTTP status.
pub(crate) fn classify_transport(err: &reqwest::Error) -> RemoteError {
    if err.is_decode() {
        RemoteError::Decode {
            message: err.to_string(),
        }
    } else if err.is_builder() {
        RemoteError::Other {
            message: err.to_string(),
        }
    } else {
        RemoteError::Transport {
            message: err.to_string(),
        }
    }
}

/// Message for a failed OAuth token exchange.
pub(crate) fn oauth_message(body: &str) -> String {
    match serde_json::from_str::<OAuthError>(body) {
        Ok(err) => match err.error_description {
            Some(description) => format!("{}: {}", err.error, description),
            None => err.error,
        },
        Err(_) => truncate(body),
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_BODY_CHARS {
        trimmed.to_string()
    } else {
        let mut out: String = trimmed.chars().take(MAX_BODY_CHARS).collect();
        out.push_str("...");
        out
    }
}
