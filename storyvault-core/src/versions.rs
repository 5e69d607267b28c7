//! Version snapshots and restore
//!
//! A snapshot freezes the active revision and continues editing on an
//! identical copy one version higher. A restore copies an older version into
//! a new active revision. Neither deletes nor renumbers existing history.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::error::{ContentError, Result};
use crate::project::ProjectEdit;
use crate::revision::{NewRevision, ProjectId, Revision, SaveReason};
use crate::store::{RevisionStore, RevisionWrite};
use crate::writer::{ProjectWriters, WriterContext};

pub struct VersionManager {
    writers: Arc<ProjectWriters>,
    store: Arc<dyn RevisionStore>,
}

impl VersionManager {
    pub fn new(writers: Arc<ProjectWriters>, store: Arc<dyn RevisionStore>) -> Self {
        Self { writers, store }
    }

    /// Freeze the active revision and return its new active successor.
    pub async fn snapshot_current(&self, project: ProjectId) -> Result<Revision> {
        self.writers
            .run(project, "snapshot", move |ctx| async move {
                apply_snapshot(&ctx, project).await
            })
            .await
    }

    /// Make a copy of `version` the active revision and return it.
    pub async fn restore(&self, project: ProjectId, version: u32) -> Result<Revision> {
        self.writers
            .run(project, "restore", move |ctx| async move {
                apply_restore(&ctx, project, version).await
            })
            .await
    }

    /// Every revision of the project, newest version first.
    pub async fn list_versions(&self, project: ProjectId) -> Result<Vec<Revision>> {
        self.store.list_all(project).await
    }
}

async fn apply_snapshot(ctx: &WriterContext, project: ProjectId) -> Result<Revision> {
    let current = ctx
        .resolver
        .resolve(project)
        .await?
        .ok_or(ContentError::NoContentToVersion(project))?;
    let next = ctx.resolver.store().max_version(project).await? + 1;
    let successor = ctx
        .resolver
        .supersede(NewRevision::copy_of(&current, next, SaveReason::VersionSnapshot))
        .await?;
    info!("Project {} froze v{}, editing continues on v{}", project, current.version, next);
    Ok(successor)
}

async fn apply_restore(ctx: &WriterContext, project: ProjectId, version: u32) -> Result<Revision> {
    let store = ctx.resolver.store();
    let target = store
        .find_by_version(project, version)
        .await?
        .ok_or(ContentError::VersionNotFound { project, version })?;
    // Restored revisions continue the sequence so version numbers stay unique
    let next = store.max_version(project).await? + 1;
    // Statistics follow the restored text
    let edit = ProjectEdit::for_text(target.text(), Utc::now());
    let restored = ctx
        .resolver
        .commit(
            RevisionWrite::Supersede(NewRevision::copy_of(&target, next, SaveReason::Restore)),
            edit,
        )
        .await?;
    info!("Project {} restored v{} as v{}", project, version, next);
    Ok(restored)
}
