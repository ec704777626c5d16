//! Core records exchanged between the remote services, the scan tasks and
//! the sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the project file holding the script manifest.
pub const MANIFEST_FILE_NAME: &str = "appsscript";
/// Declared type of the manifest file.
pub const MANIFEST_FILE_TYPE: &str = "JSON";

/// Columns of the manifest table, key first.
pub const MANIFEST_COLUMNS: [&str; 5] = [
    "script_id",
    "script_name",
    "owner_email",
    "manifest_content",
    "extraction_date",
];

/// A user account listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainUser {
    pub primary_email: String,
    #[serde(default)]
    pub suspended: bool,
}

impl DomainUser {
    pub fn new(primary_email: impl Into<String>, suspended: bool) -> Self {
        Self {
            primary_email: primary_email.into(),
            suspended,
        }
    }

    pub fn active(primary_email: impl Into<String>) -> Self {
        Self::new(primary_email, false)
    }

    /// Suspended accounts and accounts without an address are never scanned.
    pub fn is_active(&self) -> bool {
        !self.suspended && !self.primary_email.trim().is_empty()
    }
}

/// A script project owned by a user, as returned by the file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptAsset {
    pub id: String,
    pub name: String,
}

impl ScriptAsset {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One file inside a script project's content listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFile {
    pub name: String,
    pub file_type: String,
    pub source: Option<String>,
}

impl ScriptFile {
    pub fn new(
        name: impl Into<String>,
        file_type: impl Into<String>,
        source: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            file_type: file_type.into(),
            source,
        }
    }

    pub fn is_manifest(&self) -> bool {
        self.name == MANIFEST_FILE_NAME && self.file_type == MANIFEST_FILE_TYPE
    }
}

/// A manifest captured for one script, keyed by `script_id` in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub script_id: String,
    pub script_name: String,
    pub owner_email: String,
    pub manifest_content: Option<String>,
    pub extraction_date: DateTime<Utc>,
}

impl ManifestRecord {
    pub fn new(
        asset: &ScriptAsset,
        owner_email: impl Into<String>,
        manifest_content: Option<String>,
        extraction_date: DateTime<Utc>,
    ) -> Self {
        Self {
            script_id: asset.id.clone(),
            script_name: asset.name.clone(),
            owner_email: owner_email.into(),
            manifest_content,
            extraction_date,
        }
    }

    pub fn has_key(&self) -> bool {
        !self.script_id.trim().is_empty()
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// Build a page; an empty continuation token means "no more pages".
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self {
            items,
            next_token: next_token.filter(|token| !token.is_empty()),
        }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    pub fn has_next(&self) -> bool {
        self.next_token.is_some()
    }
}
