//! Save coordination
//!
//! Manual saves and auto-saves both overwrite the active revision in place.
//! Manual saves reply to the caller; auto-saves are queued behind whatever the
//! project's writer already has and their failures are only logged.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ContentError, Result};
use crate::project::ProjectEdit;
use crate::revision::{ContentType, NewRevision, ProjectId, Revision, SaveReason};
use crate::store::RevisionWrite;
use crate::writer::{ProjectWriters, WriterContext};

/// Fields of a save; absent fields fall back to manual-save defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub auto_saved: Option<bool>,
    #[serde(default)]
    pub save_reason: Option<SaveReason>,
}

impl SaveRequest {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), ..Self::default() }
    }
}

pub struct SaveCoordinator {
    writers: Arc<ProjectWriters>,
}

impl SaveCoordinator {
    pub fn new(writers: Arc<ProjectWriters>) -> Self {
        Self { writers }
    }

    /// Overwrite the active revision (creating version 1 if the project has
    /// none) and write the project's statistics in the same store operation.
    /// Empty or missing text still saves, as an empty body.
    pub async fn manual_save(&self, project: ProjectId, request: SaveRequest) -> Result<Revision> {
        self.writers
            .run(project, "manual_save", move |ctx| async move {
                apply_manual_save(&ctx, project, request).await
            })
            .await
    }

    /// Queue an auto-save. Returns `false` without queuing anything when the
    /// text is missing or empty.
    pub fn auto_save(&self, project: ProjectId, text: Option<String>) -> bool {
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            debug!("Skipping empty auto-save for project {}", project);
            return false;
        };
        self.writers.spawn_detached(project, "auto_save", move |ctx| async move {
            apply_auto_save(&ctx, project, text).await
        });
        true
    }
}

async fn apply_manual_save(ctx: &WriterContext, project: ProjectId, request: SaveRequest) -> Result<Revision> {
    let text = request.content.unwrap_or_default();
    let edit = ProjectEdit::for_text(&text, Utc::now());
    let auto_saved = request.auto_saved.unwrap_or(false);
    let save_reason = request.save_reason.unwrap_or(SaveReason::Manual);

    let write = match ctx.resolver.resolve(project).await? {
        Some(mut active) => {
            active.content = Some(text);
            if let Some(content_type) = request.content_type {
                active.content_type = content_type;
            }
            active.auto_saved = auto_saved;
            active.save_reason = save_reason;
            RevisionWrite::Update(active)
        }
        None => RevisionWrite::Create(NewRevision {
            project_id: project,
            content: Some(text),
            content_type: request
                .content_type
                .unwrap_or(ctx.resolver.default_content_type()),
            version: 1,
            auto_saved,
            save_reason,
        }),
    };

    let saved = ctx.resolver.commit(write, edit).await?;
    debug!("Project {} saved v{} ({} words)", project, saved.version, edit.word_count);
    Ok(saved)
}

async fn apply_auto_save(ctx: &WriterContext, project: ProjectId, text: String) -> Result<()> {
    let mut active = ctx
        .resolver
        .resolve(project)
        .await?
        .ok_or(ContentError::NoActiveRevision(project))?;
    let edit = ProjectEdit::for_text(&text, Utc::now());
    active.content = Some(text);
    active.auto_saved = true;
    active.save_reason = SaveReason::Auto;
    let saved = ctx.resolver.commit(RevisionWrite::Update(active), edit).await?;
    debug!("Project {} auto-saved v{} ({} words)", project, saved.version, edit.word_count);
    Ok(())
}
