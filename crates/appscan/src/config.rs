//! Run configuration, validated once at startup.

use appscan_protocol::defaults::{
    DEFAULT_BATCH_SIZE, DEFAULT_MANIFEST_TABLE, DEFAULT_MAX_WORKERS, DEFAULT_STORE_PATH,
    HTTP_TIMEOUT_SECS,
};
use appscan_store::TableRef;
use appscan_worker::RetryPolicy;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Unvalidated settings as they arrive from flags and the environment.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub project_id: Option<String>,
    pub dataset_id: Option<String>,
    pub table_id: Option<String>,
    pub admin_email: Option<String>,
    pub service_account_email: Option<String>,
    pub store_path: Option<PathBuf>,
    pub max_workers: Option<usize>,
    pub batch_size: Option<usize>,
    pub http_timeout_secs: Option<u64>,
}

/// Everything a run needs, sanitized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    pub admin_email: String,
    pub service_account_email: String,
    pub store_path: PathBuf,
    pub max_workers: usize,
    pub batch_size: usize,
    pub http_timeout_secs: u64,
}

/// `project.dataset` and `project.dataset.table` forms keep only the last segment.
pub fn strip_project_qualifier(value: &str) -> String {
    value
        .trim()
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn positive(
    value: Option<usize>,
    default: usize,
    field: &'static str,
) -> Result<usize, ConfigError> {
    match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::Invalid {
            field,
            reason: "must be at least 1".to_string(),
        }),
        Some(n) => Ok(n),
    }
}

impl AuditConfig {
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let project_id = required(raw.project_id, "PROJECT_ID")?;
        let dataset_id = strip_project_qualifier(&required(raw.dataset_id, "DATASET_ID")?);
        if dataset_id.is_empty() {
            return Err(ConfigError::Invalid {
                field: "DATASET_ID",
                reason: "empty after removing the project prefix".to_string(),
            });
        }
        let table_id = match raw.table_id.map(|t| t.trim().to_string()) {
            Some(t) if !t.is_empty() => strip_project_qualifier(&t),
            _ => DEFAULT_MANIFEST_TABLE.to_string(),
        };
        if table_id.is_empty() {
            return Err(ConfigError::Invalid {
                field: "MANIFEST_TABLE_ID",
                reason: "empty after removing the project prefix".to_string(),
            });
        }

        let admin_email = required(raw.admin_email, "ADMIN_USER_EMAIL")?;
        let service_account_email = required(raw.service_account_email, "SERVICE_ACCOUNT_EMAIL")?;

        let http_timeout_secs = match raw.http_timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    field: "APPSCAN_HTTP_TIMEOUT_SECS",
                    reason: "must be at least 1".to_string(),
                })
            }
            Some(secs) => secs,
            None => HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            project_id,
            dataset_id,
            table_id,
            admin_email,
            service_account_email,
            store_path: raw
                .store_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            max_workers: positive(raw.max_workers, DEFAULT_MAX_WORKERS, "APPSCAN_MAX_WORKERS")?,
            batch_size: positive(raw.batch_size, DEFAULT_BATCH_SIZE, "APPSCAN_BATCH_SIZE")?,
            http_timeout_secs,
        })
    }

    /// Fully qualified target table.
    pub fn target(&self) -> TableRef {
        TableRef::new(self.dataset_id.clone(), self.table_id.clone())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> RawConfig {
        RawConfig {
            project_id: Some("acme-prod".into()),
            dataset_id: Some("acme-prod.audit".into()),
            table_id: None,
            admin_email: Some("admin@acme.com".into()),
            service_account_email: Some("auditor@acme-prod.iam.gserviceaccount.com".into()),
            ..Default::default()
        }
    }

    #[test]
    fn qualifier_keeps_last_segment() {
        assert_eq!(strip_project_qualifier("proj.dataset"), "dataset");
        assert_eq!(strip_project_qualifier("proj.dataset.table"), "table");
        assert_eq!(strip_project_qualifier(" plain "), "plain");
        assert_eq!(strip_project_qualifier("proj."), "");
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let config = AuditConfig::from_raw(complete()).unwrap();
        assert_eq!(config.dataset_id, "audit");
        assert_eq!(config.table_id, "manifest_audit_log");
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.http_timeout(), Duration::from_secs(60));
        assert_eq!(config.target().to_string(), "audit.manifest_audit_log");
    }

    #[test]
    fn table_id_is_sanitized() {
        let mut raw = complete();
        raw.table_id = Some("acme-prod.audit.scripts".into());
        assert_eq!(AuditConfig::from_raw(raw).unwrap().table_id, "scripts");
    }

    #[test]
    fn missing_and_blank_values_are_fatal() {
        let mut raw = complete();
        raw.admin_email = Some("   ".into());
        assert_eq!(
            AuditConfig::from_raw(raw),
            Err(ConfigError::Missing("ADMIN_USER_EMAIL"))
        );

        let mut raw = complete();
        raw.project_id = None;
        assert_eq!(AuditConfig::from_raw(raw), Err(ConfigError::Missing("PROJECT_ID")));

        let mut raw = complete();
        raw.dataset_id = Some("proj.".into());
        assert!(matches!(
            AuditConfig::from_raw(raw),
            Err(ConfigError::Invalid { field: "DATASET_ID", .. })
        ));
    }

    #[test]
    fn zero_pool_or_batch_is_rejected() {
        let mut raw = complete();
        raw.max_workers = Some(0);
        assert!(AuditConfig::from_raw(raw).is_err());

        let mut raw = complete();
        raw.batch_size = Some(0);
        assert!(AuditConfig::from_raw(raw).is_err());
    }
}
