//! Revision model for story content
//!
//! Every revision is a full text snapshot of a project's manuscript. Exactly one
//! revision per project is active at a time; the rest are frozen history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ContentError;

/// Project identifier (owned by the project collaborator)
pub type ProjectId = i64;

/// Authenticated principal identifier supplied by the session layer
pub type PrincipalId = i64;

/// Unique identifier of a stored revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(i64);

impl RevisionId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoding of a revision's text body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Markdown,
    Html,
    PlainText,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Markdown => "markdown",
            ContentType::Html => "html",
            ContentType::PlainText => "plain_text",
        }
    }
}

impl FromStr for ContentType {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(ContentType::Markdown),
            "html" => Ok(ContentType::Html),
            "plain_text" => Ok(ContentType::PlainText),
            other => Err(ContentError::InvalidInput(format!("unknown content type '{}'", other))),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a revision was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveReason {
    #[serde(rename = "initial_creation")]
    InitialCreation,
    #[serde(rename = "manual_save")]
    Manual,
    #[serde(rename = "auto_save")]
    Auto,
    #[serde(rename = "version_save")]
    VersionSnapshot,
    #[serde(rename = "version_restore")]
    Restore,
}

impl SaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveReason::InitialCreation => "initial_creation",
            SaveReason::Manual => "manual_save",
            SaveReason::Auto => "auto_save",
            SaveReason::VersionSnapshot => "version_save",
            SaveReason::Restore => "version_restore",
        }
    }
}

impl FromStr for SaveReason {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial_creation" => Ok(SaveReason::InitialCreation),
            "manual_save" => Ok(SaveReason::Manual),
            "auto_save" => Ok(SaveReason::Auto),
            "version_save" => Ok(SaveReason::VersionSnapshot),
            "version_restore" => Ok(SaveReason::Restore),
            other => Err(ContentError::InvalidInput(format!("unknown save reason '{}'", other))),
        }
    }
}

impl fmt::Display for SaveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored revision of a project's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub project_id: ProjectId,
    /// Text body; `None` means the revision was never written to
    pub content: Option<String>,
    pub content_type: ContentType,
    /// Version number scoped to the owning project
    pub version: u32,
    pub is_active: bool,
    pub auto_saved: bool,
    pub save_reason: SaveReason,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Revision {
    /// Text body, treating an untouched revision as empty
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Revision fields supplied by the caller; the store assigns identity and timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct NewRevision {
    pub project_id: ProjectId,
    pub content: Option<String>,
    pub content_type: ContentType,
    pub version: u32,
    pub auto_saved: bool,
    pub save_reason: SaveReason,
}

impl NewRevision {
    /// The empty version-1 revision every project starts with
    pub fn initial(project_id: ProjectId, content: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            project_id,
            content: Some(content.into()),
            content_type,
            version: 1,
            auto_saved: false,
            save_reason: SaveReason::InitialCreation,
        }
    }

    /// A successor carrying the text and encoding of `source`
    pub fn copy_of(source: &Revision, version: u32, save_reason: SaveReason) -> Self {
        Self {
            project_id: source.project_id,
            content: source.content.clone(),
            content_type: source.content_type,
            version,
            auto_saved: false,
            save_reason,
        }
    }

    /// Materialize into a stored revision. New revisions are always active.
    pub fn into_revision(self, id: RevisionId, created_at: DateTime<Utc>) -> Revision {
        Revision {
            id,
            project_id: self.project_id,
            content: self.content,
            content_type: self.content_type,
            version: self.version,
            is_active: true,
            auto_saved: self.auto_saved,
            save_reason: self.save_reason,
            created_at,
            updated_at: None,
        }
    }
}
