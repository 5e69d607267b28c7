//! Active-revision resolution
//!
//! Single source of truth for which revision of a project is live. Methods
//! that mutate must run on the project's writer; `find_active` is the only
//! read-only entry point.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ContentError, Result};
use crate::project::ProjectEdit;
use crate::revision::{ContentType, NewRevision, ProjectId, Revision};
use crate::store::{RevisionStore, RevisionWrite};

pub struct ActiveRevisionResolver {
    store: Arc<dyn RevisionStore>,
    default_content_type: ContentType,
}

impl ActiveRevisionResolver {
    pub fn new(store: Arc<dyn RevisionStore>, default_content_type: ContentType) -> Self {
        Self { store, default_content_type }
    }

    pub fn store(&self) -> &Arc<dyn RevisionStore> {
        &self.store
    }

    pub fn default_content_type(&self) -> ContentType {
        self.default_content_type
    }

    /// Plain lookup without any repair.
    pub async fn find_active(&self, project: ProjectId) -> Result<Option<Revision>> {
        self.store.find_active(project).await
    }

    /// Active revision of the project, repairing the single-active invariant
    /// first if it is found broken. `None` only when the project has no history.
    pub async fn resolve(&self, project: ProjectId) -> Result<Option<Revision>> {
        match self.store.find_active(project).await {
            Ok(Some(active)) => Ok(Some(active)),
            Ok(None) => {
                if self.store.max_version(project).await? == 0 {
                    return Ok(None);
                }
                warn!("Project {} has history but no active revision", project);
                self.repair(project).await
            }
            Err(ContentError::ConcurrencyViolation { active, .. }) => {
                warn!("Project {} has {} active revisions", project, active);
                self.repair(project).await
            }
            Err(e) => Err(e),
        }
    }

    /// Active revision of the project, creating an empty version 1 if the
    /// project has never had one.
    pub async fn get_active_or_create(&self, project: ProjectId, default_text: &str) -> Result<Revision> {
        if let Some(active) = self.resolve(project).await? {
            return Ok(active);
        }
        let created = self
            .store
            .create(NewRevision::initial(project, default_text, self.default_content_type))
            .await?;
        debug!("Created initial revision {} for project {}", created.id, project);
        Ok(created)
    }

    /// Deactivate the project's current revision and activate `successor` in
    /// one atomic store operation.
    pub async fn supersede(&self, successor: NewRevision) -> Result<Revision> {
        let project = successor.project_id;
        let activated = self.store.supersede(successor).await?;
        debug!(
            "Project {} active revision is now {} (v{})",
            project, activated.id, activated.version
        );
        Ok(activated)
    }

    /// Apply `write` and the project statistics in `edit` as one store operation.
    pub async fn commit(&self, write: RevisionWrite, edit: ProjectEdit) -> Result<Revision> {
        let project = write.project_id();
        let saved = self.store.commit(write, edit).await?;
        debug!(
            "Project {} wrote revision {} (v{}), {} words",
            project, saved.id, saved.version, edit.word_count
        );
        Ok(saved)
    }

    /// Promote the highest version to active and deactivate everything else.
    pub async fn repair(&self, project: ProjectId) -> Result<Option<Revision>> {
        let promoted = self.store.repair_active(project).await?;
        match &promoted {
            Some(rev) => info!("Repaired project {}: v{} is active", project, rev.version),
            None => info!("Repair of project {} found no revisions", project),
        }
        Ok(promoted)
    }

    /// Whether the project has history but not exactly one active revision.
    pub async fn needs_repair(&self, project: ProjectId) -> Result<bool> {
        let active = self.store.count_active(project).await?;
        if active == 1 {
            return Ok(false);
        }
        Ok(active > 1 || self.store.max_version(project).await? > 0)
    }
}
