//! Backup export
//!
//! Read-only projection of a project's full revision history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::project::Project;
use crate::revision::{ContentType, ProjectId, Revision, SaveReason};
use crate::store::RevisionStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub word_count: u32,
}

impl From<&Project> for ProjectSummary {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id,
            title: project.title.clone(),
            description: project.description.clone(),
            genre: project.genre.clone(),
            status: project.status.clone(),
            created_at: project.created_at,
            word_count: project.word_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub version: u32,
    pub content: Option<String>,
    pub content_type: ContentType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub save_reason: SaveReason,
}

impl From<Revision> for RevisionSummary {
    fn from(rev: Revision) -> Self {
        Self {
            version: rev.version,
            content: rev.content,
            content_type: rev.content_type,
            is_active: rev.is_active,
            created_at: rev.created_at,
            save_reason: rev.save_reason,
        }
    }
}

/// Exported history of one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub project: ProjectSummary,
    /// Newest version first
    pub content_versions: Vec<RevisionSummary>,
    pub backup_created_at: DateTime<Utc>,
}

impl Backup {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct BackupExporter {
    store: Arc<dyn RevisionStore>,
}

impl BackupExporter {
    pub fn new(store: Arc<dyn RevisionStore>) -> Self {
        Self { store }
    }

    pub async fn export_history(&self, project: &Project) -> Result<Backup> {
        let revisions = self.store.list_all(project.id).await?;
        Ok(Backup {
            project: ProjectSummary::from(project),
            content_versions: revisions.into_iter().map(RevisionSummary::from).collect(),
            backup_created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::project::{NewProject, ProjectDirectory};
    use crate::revision::NewRevision;

    #[tokio::test]
    async fn test_export_empty_history() {
        let store = Arc::new(MemoryStore::new());
        let project = store
            .register(NewProject { owner: 1, title: "Blank".into(), ..Default::default() })
            .await
            .unwrap();
        let backup = BackupExporter::new(store).export_history(&project).await.unwrap();
        assert!(backup.content_versions.is_empty());
        assert_eq!(backup.project.title, "Blank");
    }

    #[tokio::test]
    async fn test_export_shape() {
        let store = Arc::new(MemoryStore::new());
        let project = store
            .register(NewProject { owner: 1, title: "Odyssey".into(), ..Default::default() })
            .await
            .unwrap();
        let first = store
            .create(NewRevision::initial(project.id, "sing", ContentType::Markdown))
            .await
            .unwrap();
        store
            .supersede(NewRevision::copy_of(&first, 2, SaveReason::VersionSnapshot))
            .await
            .unwrap();

        let backup = BackupExporter::new(store).export_history(&project).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&backup.to_json_pretty().unwrap()).unwrap();
        let versions = json["content_versions"].as_array().unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0]["version"], 2);
        assert_eq!(versions[0]["is_active"], true);
        assert_eq!(versions[0]["save_reason"], "version_save");
        assert_eq!(versions[1]["content"], "sing");
        assert_eq!(json["project"]["title"], "Odyssey");
        assert!(json["backup_created_at"].is_string());
    }
}
