//! Project collaborator interface
//!
//! Projects are owned elsewhere; the content engine only looks them up by owner.
//! Denormalized statistics are written by the revision store together with the
//! revision that changed the active text (see `RevisionStore::commit`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::revision::{PrincipalId, ProjectId, Revision};

/// A writing project as seen by the content engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub owner: PrincipalId,
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub status: String,
    pub is_private: bool,
    pub word_count: u32,
    pub target_word_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_edited_at: Option<DateTime<Utc>>,
}

/// Fields needed to register a project
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProject {
    pub owner: PrincipalId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub target_word_count: Option<u32>,
}

/// Ownership lookups for projects
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Register a project. Called by the project-creation collaborator.
    async fn register(&self, project: NewProject) -> Result<Project>;

    /// Fetch a project owned by `principal`, or fail with `NotFoundOrForbidden`.
    async fn fetch_owned(&self, project: ProjectId, principal: PrincipalId) -> Result<Project>;

    /// Fetch a project regardless of owner.
    async fn fetch(&self, project: ProjectId) -> Result<Option<Project>>;
}

/// Statistics stamped on a project whenever its active text changes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectEdit {
    pub word_count: u32,
    /// Becomes both `last_edited_at` and `updated_at`
    pub at: DateTime<Utc>,
}

impl ProjectEdit {
    pub fn for_text(text: &str, at: DateTime<Utc>) -> Self {
        Self { word_count: word_count(text), at }
    }
}

/// Number of whitespace-separated words in `text`.
pub fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Derived statistics for a project's active text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectStats {
    pub project_id: ProjectId,
    pub word_count: u32,
    pub target_word_count: Option<u32>,
    pub character_count: usize,
    pub progress_percentage: f64,
    pub days_since_creation: i64,
    pub last_edited: Option<DateTime<Utc>>,
}

impl ProjectStats {
    pub fn compute(project: &Project, active: Option<&Revision>, now: DateTime<Utc>) -> Self {
        let character_count = active.map(|r| r.text().chars().count()).unwrap_or(0);
        let progress_percentage = match project.target_word_count {
            Some(target) if target > 0 => {
                (project.word_count as f64 / target as f64 * 100.0).min(100.0)
            }
            _ => 0.0,
        };
        Self {
            project_id: project.id,
            word_count: project.word_count,
            target_word_count: project.target_word_count,
            character_count,
            progress_percentage,
            days_since_creation: (now - project.created_at).num_days(),
            last_edited: project.last_edited_at,
        }
    }
}
