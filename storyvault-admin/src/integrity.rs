//! Single-active integrity check and repair

use anyhow::Result;
use std::sync::Arc;
use storyvault_core::{ActiveRevisionResolver, ProjectId, RevisionStore, VaultConfig};
use tracing::info;

/// A project whose active-revision count is not exactly one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub project: ProjectId,
    pub active: usize,
}

/// Report every project that needs repair, without mutating anything.
pub async fn check(store: &dyn RevisionStore) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for project in store.project_ids().await? {
        let active = store.count_active(project).await?;
        if active != 1 {
            violations.push(Violation { project, active });
        }
    }
    Ok(violations)
}

/// Repair one project, or every project when `only` is `None`.
/// Returns `(project, promoted version)` for each project that was changed.
pub async fn repair(
    store: Arc<dyn RevisionStore>,
    config: &VaultConfig,
    only: Option<ProjectId>,
) -> Result<Vec<(ProjectId, u32)>> {
    let resolver = ActiveRevisionResolver::new(store.clone(), config.default_content_type);
    let projects = match only {
        Some(project) => vec![project],
        None => store.project_ids().await?,
    };

    let mut repaired = Vec::new();
    for project in projects {
        if !resolver.needs_repair(project).await? {
            continue;
        }
        if let Some(rev) = resolver.repair(project).await? {
            info!("Project {} repaired, v{} active", project, rev.version);
            repaired.push((project, rev.version));
        }
    }
    Ok(repaired)
}
