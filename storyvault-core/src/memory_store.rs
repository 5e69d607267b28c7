//! In-memory store
//!
//! Arena-style layout: each project keeps its revisions in creation order plus
//! a single pointer to the active one, so two active revisions cannot exist.
//! A commit holds both the revision and the project locks, and validates the
//! write before changing either map.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::error::{ContentError, Result};
use crate::project::{NewProject, Project, ProjectDirectory, ProjectEdit};
use crate::revision::{NewRevision, PrincipalId, ProjectId, Revision, RevisionId};
use crate::store::{RevisionStore, RevisionWrite};

#[derive(Default)]
struct ProjectRevisions {
    /// Revisions in creation order; the stored `is_active` flag is ignored
    revisions: Vec<Revision>,
    /// Index of the active revision
    active: Option<usize>,
}

impl ProjectRevisions {
    fn materialize(&self, idx: usize) -> Revision {
        let mut rev = self.revisions[idx].clone();
        rev.is_active = self.active == Some(idx);
        rev
    }

    fn max_version(&self) -> u32 {
        self.revisions.iter().map(|r| r.version).max().unwrap_or(0)
    }
}

/// Volatile revision and project store
pub struct MemoryStore {
    /// Project ID -> revision arena
    revisions: Arc<RwLock<HashMap<ProjectId, ProjectRevisions>>>,

    /// Registered projects
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,

    next_revision_id: AtomicI64,
    next_project_id: AtomicI64,

    /// Number of upcoming calls that fail with `StoreUnavailable`
    pending_failures: AtomicUsize,
    /// Same, counted only by calls that mutate revisions
    pending_write_failures: AtomicUsize,
    /// Same, counted only by the project statistics half of `commit`
    pending_stats_failures: AtomicUsize,
}

fn consume_failure(counter: &AtomicUsize, what: &str) -> Result<()> {
    match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
        Ok(_) => Err(ContentError::StoreUnavailable(format!("injected {} failure", what))),
        Err(_) => Ok(()),
    }
}

fn check_write(revisions: &HashMap<ProjectId, ProjectRevisions>, write: &RevisionWrite) -> Result<()> {
    match write {
        RevisionWrite::Create(draft) => {
            let has_active = revisions.get(&draft.project_id).is_some_and(|p| p.active.is_some());
            if has_active {
                return Err(ContentError::ConcurrencyViolation { project: draft.project_id, active: 2 });
            }
        }
        RevisionWrite::Update(revision) => {
            let known = revisions
                .get(&revision.project_id)
                .is_some_and(|p| p.revisions.iter().any(|r| r.id == revision.id));
            if !known {
                return Err(ContentError::NoActiveRevision(revision.project_id));
            }
        }
        RevisionWrite::Supersede(_) => {}
    }
    Ok(())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            revisions: Arc::new(RwLock::new(HashMap::new())),
            projects: Arc::new(RwLock::new(HashMap::new())),
            next_revision_id: AtomicI64::new(1),
            next_project_id: AtomicI64::new(1),
            pending_failures: AtomicUsize::new(0),
            pending_write_failures: AtomicUsize::new(0),
            pending_stats_failures: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` store calls fail as if the backend were unreachable.
    pub fn inject_failures(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` revision mutations fail; reads keep working.
    pub fn inject_write_failures(&self, count: usize) {
        self.pending_write_failures.store(count, Ordering::SeqCst);
    }

    /// Make the project statistics half of the next `count` commits fail.
    pub fn inject_stats_failures(&self, count: usize) {
        self.pending_stats_failures.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        consume_failure(&self.pending_failures, "store")
    }

    fn check_writable(&self) -> Result<()> {
        self.check_available()?;
        consume_failure(&self.pending_write_failures, "write")
    }

    fn allocate(&self, draft: NewRevision, now: DateTime<Utc>) -> Revision {
        let id = RevisionId::new(self.next_revision_id.fetch_add(1, Ordering::SeqCst));
        draft.into_revision(id, now)
    }

    fn apply_write(
        &self,
        revisions: &mut HashMap<ProjectId, ProjectRevisions>,
        write: RevisionWrite,
        now: DateTime<Utc>,
    ) -> Result<Revision> {
        check_write(revisions, &write)?;
        match write {
            RevisionWrite::Create(draft) | RevisionWrite::Supersede(draft) => {
                let entry = revisions.entry(draft.project_id).or_default();
                let rev = self.allocate(draft, now);
                entry.revisions.push(rev);
                // Moving the pointer deactivates the previous revision in the same step
                entry.active = Some(entry.revisions.len() - 1);
                Ok(entry.materialize(entry.revisions.len() - 1))
            }
            RevisionWrite::Update(revision) => {
                let entry = revisions
                    .get_mut(&revision.project_id)
                    .ok_or(ContentError::NoActiveRevision(revision.project_id))?;
                let idx = entry
                    .revisions
                    .iter()
                    .position(|r| r.id == revision.id)
                    .ok_or(ContentError::NoActiveRevision(revision.project_id))?;
                let stored = &mut entry.revisions[idx];
                stored.content = revision.content;
                stored.content_type = revision.content_type;
                stored.auto_saved = revision.auto_saved;
                stored.save_reason = revision.save_reason;
                stored.updated_at = Some(now);
                Ok(entry.materialize(idx))
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RevisionStore for MemoryStore {
    async fn find_active(&self, project: ProjectId) -> Result<Option<Revision>> {
        self.check_available()?;
        let revisions = self.revisions.read().await;
        Ok(revisions
            .get(&project)
            .and_then(|p| p.active.map(|idx| p.materialize(idx))))
    }

    async fn find_by_version(&self, project: ProjectId, version: u32) -> Result<Option<Revision>> {
        self.check_available()?;
        let revisions = self.revisions.read().await;
        Ok(revisions.get(&project).and_then(|p| {
            p.revisions
                .iter()
                .position(|r| r.version == version)
                .map(|idx| p.materialize(idx))
        }))
    }

    async fn list_all(&self, project: ProjectId) -> Result<Vec<Revision>> {
        self.check_available()?;
        let revisions = self.revisions.read().await;
        let mut all: Vec<Revision> = match revisions.get(&project) {
            Some(p) => (0..p.revisions.len()).map(|idx| p.materialize(idx)).collect(),
            None => Vec::new(),
        };
        all.sort_by(|a, b| b.version.cmp(&a.version).then(b.id.cmp(&a.id)));
        Ok(all)
    }

    async fn create(&self, draft: NewRevision) -> Result<Revision> {
        self.check_writable()?;
        let mut revisions = self.revisions.write().await;
        self.apply_write(&mut revisions, RevisionWrite::Create(draft), Utc::now())
    }

    async fn update(&self, revision: &Revision) -> Result<Revision> {
        self.check_writable()?;
        let mut revisions = self.revisions.write().await;
        self.apply_write(&mut revisions, RevisionWrite::Update(revision.clone()), Utc::now())
    }

    async fn max_version(&self, project: ProjectId) -> Result<u32> {
        self.check_available()?;
        let revisions = self.revisions.read().await;
        Ok(revisions.get(&project).map(|p| p.max_version()).unwrap_or(0))
    }

    async fn supersede(&self, successor: NewRevision) -> Result<Revision> {
        self.check_writable()?;
        let mut revisions = self.revisions.write().await;
        self.apply_write(&mut revisions, RevisionWrite::Supersede(successor), Utc::now())
    }

    async fn commit(&self, write: RevisionWrite, edit: ProjectEdit) -> Result<Revision> {
        self.check_writable()?;
        let mut revisions = self.revisions.write().await;
        let mut projects = self.projects.write().await;
        check_write(&revisions, &write)?;
        consume_failure(&self.pending_stats_failures, "statistics")?;

        let project = write.project_id();
        let saved = self.apply_write(&mut revisions, write, edit.at)?;
        if let Some(record) = projects.get_mut(&project) {
            record.word_count = edit.word_count;
            record.last_edited_at = Some(edit.at);
            record.updated_at = Some(edit.at);
        }
        Ok(saved)
    }

    async fn repair_active(&self, project: ProjectId) -> Result<Option<Revision>> {
        self.check_writable()?;
        let mut revisions = self.revisions.write().await;
        let Some(entry) = revisions.get_mut(&project) else {
            return Ok(None);
        };
        let promoted = entry
            .revisions
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.version.cmp(&b.version).then(a.id.cmp(&b.id)))
            .map(|(idx, _)| idx);
        entry.active = promoted;
        Ok(promoted.map(|idx| entry.materialize(idx)))
    }

    async fn count_active(&self, project: ProjectId) -> Result<usize> {
        self.check_available()?;
        let revisions = self.revisions.read().await;
        Ok(revisions
            .get(&project)
            .map(|p| usize::from(p.active.is_some()))
            .unwrap_or(0))
    }

    async fn project_ids(&self) -> Result<Vec<ProjectId>> {
        self.check_available()?;
        let revisions = self.revisions.read().await;
        let mut ids: Vec<ProjectId> = revisions.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl ProjectDirectory for MemoryStore {
    async fn register(&self, project: NewProject) -> Result<Project> {
        self.check_available()?;
        let id = self.next_project_id.fetch_add(1, Ordering::SeqCst);
        let record = Project {
            id,
            owner: project.owner,
            title: project.title,
            description: project.description,
            genre: project.genre,
            status: "draft".to_string(),
            is_private: true,
            word_count: 0,
            target_word_count: project.target_word_count,
            created_at: Utc::now(),
            updated_at: None,
            last_edited_at: None,
        };
        self.projects.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn fetch_owned(&self, project: ProjectId, principal: PrincipalId) -> Result<Project> {
        self.check_available()?;
        let projects = self.projects.read().await;
        projects
            .get(&project)
            .filter(|p| p.owner == principal)
            .cloned()
            .ok_or(ContentError::NotFoundOrForbidden(project))
    }

    async fn fetch(&self, project: ProjectId) -> Result<Option<Project>> {
        self.check_available()?;
        Ok(self.projects.read().await.get(&project).cloned())
    }
}
