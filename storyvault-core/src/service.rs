//! Content service
//!
//! Transport-agnostic entry points. Every operation first checks project
//! ownership through the project directory, then dispatches to the resolver,
//! save coordinator, version manager or backup exporter.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::backup::{Backup, BackupExporter};
use crate::config::VaultConfig;
use crate::coordinator::{SaveCoordinator, SaveRequest};
use crate::error::{ContentError, Result};
use crate::project::{NewProject, Project, ProjectDirectory, ProjectStats};
use crate::resolver::ActiveRevisionResolver;
use crate::revision::{PrincipalId, ProjectId, Revision};
use crate::sqlite_store::SqliteStore;
use crate::store::RevisionStore;
use crate::versions::VersionManager;
use crate::writer::{ProjectWriters, WriterContext};

pub struct ContentService {
    store: Arc<dyn RevisionStore>,
    projects: Arc<dyn ProjectDirectory>,
    resolver: Arc<ActiveRevisionResolver>,
    writers: Arc<ProjectWriters>,
    saves: SaveCoordinator,
    versions: VersionManager,
    exporter: BackupExporter,
    config: VaultConfig,
}

impl ContentService {
    pub fn new(
        store: Arc<dyn RevisionStore>,
        projects: Arc<dyn ProjectDirectory>,
        config: VaultConfig,
    ) -> Self {
        let resolver = Arc::new(ActiveRevisionResolver::new(
            store.clone(),
            config.default_content_type,
        ));
        let writers = Arc::new(ProjectWriters::new(
            WriterContext { resolver: resolver.clone() },
            config.writer_idle_timeout(),
        ));
        Self {
            saves: SaveCoordinator::new(writers.clone()),
            versions: VersionManager::new(writers.clone(), store.clone()),
            exporter: BackupExporter::new(store.clone()),
            store,
            projects,
            resolver,
            writers,
            config,
        }
    }

    /// Service over one SQLite database holding both revisions and projects.
    pub fn open_sqlite(config: VaultConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.database_path)?);
        Ok(Self::new(store.clone(), store, config))
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RevisionStore> {
        &self.store
    }

    pub fn projects(&self) -> &Arc<dyn ProjectDirectory> {
        &self.projects
    }

    /// Register a project and give it its initial empty revision.
    pub async fn create_project(&self, project: NewProject) -> Result<Project> {
        let created = self.projects.register(project).await?;
        self.initialize_content(created.id).await?;
        Ok(created)
    }

    /// Hook for project creation: ensure the project has an active revision.
    pub async fn initialize_content(&self, project: ProjectId) -> Result<Revision> {
        self.writers
            .run(project, "initialize", move |ctx| async move {
                ctx.resolver.get_active_or_create(project, "").await
            })
            .await
    }

    pub async fn get_active_content(&self, principal: PrincipalId, project: ProjectId) -> Result<Revision> {
        self.authorize(principal, project).await?;
        match self.read_with_retry(|| self.resolver.find_active(project)).await {
            Ok(Some(active)) => Ok(active),
            // Missing or duplicated active rows are resolved on the writer
            Ok(None) | Err(ContentError::ConcurrencyViolation { .. }) => {
                self.initialize_content(project).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn save_content(
        &self,
        principal: PrincipalId,
        project: ProjectId,
        request: SaveRequest,
    ) -> Result<Revision> {
        self.authorize(principal, project).await?;
        self.saves.manual_save(project, request).await
    }

    /// Queue an auto-save; `Ok(false)` means the text was empty and nothing was queued.
    pub async fn schedule_auto_save(
        &self,
        principal: PrincipalId,
        project: ProjectId,
        text: Option<String>,
    ) -> Result<bool> {
        self.authorize(principal, project).await?;
        Ok(self.saves.auto_save(project, text))
    }

    pub async fn create_version_snapshot(&self, principal: PrincipalId, project: ProjectId) -> Result<Revision> {
        self.authorize(principal, project).await?;
        self.versions.snapshot_current(project).await
    }

    pub async fn list_versions(&self, principal: PrincipalId, project: ProjectId) -> Result<Vec<Revision>> {
        self.authorize(principal, project).await?;
        self.read_with_retry(|| self.versions.list_versions(project)).await
    }

    pub async fn restore_version(
        &self,
        principal: PrincipalId,
        project: ProjectId,
        version: u32,
    ) -> Result<Revision> {
        self.authorize(principal, project).await?;
        self.versions.restore(project, version).await
    }

    pub async fn export_backup(&self, principal: PrincipalId, project: ProjectId) -> Result<Backup> {
        let record = self.authorize(principal, project).await?;
        self.read_with_retry(|| self.exporter.export_history(&record)).await
    }

    pub async fn project_stats(&self, principal: PrincipalId, project: ProjectId) -> Result<ProjectStats> {
        let record = self.authorize(principal, project).await?;
        let active = self.read_with_retry(|| self.resolver.find_active(project)).await?;
        Ok(ProjectStats::compute(&record, active.as_ref(), Utc::now()))
    }

    /// Wait for every queued mutation of `project` to be applied.
    pub async fn flush(&self, project: ProjectId) -> Result<()> {
        self.writers.flush(project).await
    }

    /// Drain every live project writer; used before the process exits.
    pub async fn flush_all(&self) -> Result<usize> {
        self.writers.flush_all().await
    }

    /// Run the single-active repair pass for one project on its writer.
    pub async fn repair(&self, project: ProjectId) -> Result<Option<Revision>> {
        self.writers
            .run(project, "repair", move |ctx| async move { ctx.resolver.repair(project).await })
            .await
    }

    /// Whether `project` currently violates the single-active invariant.
    pub async fn needs_repair(&self, project: ProjectId) -> Result<bool> {
        self.resolver.needs_repair(project).await
    }

    async fn authorize(&self, principal: PrincipalId, project: ProjectId) -> Result<Project> {
        self.read_with_retry(|| self.projects.fetch_owned(project, principal)).await
    }

    async fn read_with_retry<T, F, Fut>(&self, read: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match read().await {
                Err(e) if e.is_retryable() && attempt < self.config.read_retries => {
                    attempt += 1;
                    warn!("Transient read failure (attempt {}): {}", attempt, e);
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
                other => return other,
            }
        }
    }
}
