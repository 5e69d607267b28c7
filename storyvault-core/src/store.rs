//! Revision store abstraction
//!
//! Persistence-agnostic repository of content revisions keyed by project.
//! Implementations own revision rows exclusively and must keep at most one
//! active revision per project when any call returns.

use async_trait::async_trait;

use crate::error::Result;
use crate::project::ProjectEdit;
use crate::revision::{NewRevision, ProjectId, Revision};

/// A revision mutation that changes a project's active text
#[derive(Debug, Clone, PartialEq)]
pub enum RevisionWrite {
    /// First active revision of a project that has none
    Create(NewRevision),
    /// Overwrite the active revision in place
    Update(Revision),
    /// Deactivate the current active revision and activate a new one
    Supersede(NewRevision),
}

impl RevisionWrite {
    pub fn project_id(&self) -> ProjectId {
        match self {
            RevisionWrite::Create(draft) | RevisionWrite::Supersede(draft) => draft.project_id,
            RevisionWrite::Update(rev) => rev.project_id,
        }
    }
}

/// Storage backend for revisions
///
/// Every call may fail with `StoreUnavailable`. Callers treat that as
/// retryable for reads and fatal to the request for writes.
#[async_trait]
pub trait RevisionStore: Send + Sync {
    /// The active revision of a project, if any.
    ///
    /// Fails with `ConcurrencyViolation` when more than one active row is found.
    async fn find_active(&self, project: ProjectId) -> Result<Option<Revision>>;

    /// The revision carrying `version`, if any.
    async fn find_by_version(&self, project: ProjectId, version: u32) -> Result<Option<Revision>>;

    /// Every revision of a project, newest version first.
    async fn list_all(&self, project: ProjectId) -> Result<Vec<Revision>>;

    /// Persist a new active revision. The project must not already have one.
    async fn create(&self, draft: NewRevision) -> Result<Revision>;

    /// Persist the mutable fields of `revision` and stamp `updated_at`.
    ///
    /// Text, encoding, auto-save flag and save reason are written; the active
    /// flag is only ever changed by `supersede` and `repair_active`. Fails with
    /// `NoActiveRevision` when the revision no longer exists.
    async fn update(&self, revision: &Revision) -> Result<Revision>;

    /// Highest version number of the project, 0 when it has no revisions.
    async fn max_version(&self, project: ProjectId) -> Result<u32>;

    /// Atomically deactivate the project's current active revision (if any)
    /// and persist `successor` as the new active one.
    async fn supersede(&self, successor: NewRevision) -> Result<Revision>;

    /// Apply `write` and stamp `edit` on the owning project as one unit: either
    /// both the revision and the project statistics change, or neither does.
    /// Timestamps written by the revision mutation use `edit.at`.
    async fn commit(&self, write: RevisionWrite, edit: ProjectEdit) -> Result<Revision>;

    /// Restore the single-active invariant: every revision is deactivated and
    /// the highest version is promoted. Returns the promoted revision.
    async fn repair_active(&self, project: ProjectId) -> Result<Option<Revision>>;

    /// Number of active revisions the project currently has.
    async fn count_active(&self, project: ProjectId) -> Result<usize>;

    /// Projects that own at least one revision.
    async fn project_ids(&self) -> Result<Vec<ProjectId>>;
}
