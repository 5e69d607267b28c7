//! Per-project single-writer tasks
//!
//! Every mutation of a project's revisions is queued on that project's writer
//! and applied one at a time in submission order. Different projects have
//! independent writers and proceed in parallel.
//!
//! Writers are spawned on demand and retire after sitting idle. Sending and
//! retiring both happen under the registry lock, and a writer only retires
//! with an empty queue, so a job is never dropped or run by two writers.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{ContentError, Result};
use crate::resolver::ActiveRevisionResolver;
use crate::revision::ProjectId;

/// Collaborators available to queued mutations
pub struct WriterContext {
    pub resolver: Arc<ActiveRevisionResolver>,
}

type Job = Box<dyn FnOnce(Arc<WriterContext>) -> BoxFuture<'static, ()> + Send>;

struct Envelope {
    label: &'static str,
    submitted_at: DateTime<Utc>,
    job: Job,
}

struct WriterHandle {
    tx: mpsc::UnboundedSender<Envelope>,
    generation: u64,
}

type Registry = Arc<Mutex<HashMap<ProjectId, WriterHandle>>>;

/// Registry of per-project writer tasks
pub struct ProjectWriters {
    context: Arc<WriterContext>,
    registry: Registry,
    next_generation: AtomicU64,
    idle_timeout: Duration,
}

impl ProjectWriters {
    pub fn new(context: WriterContext, idle_timeout: Duration) -> Self {
        Self {
            context: Arc::new(context),
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            idle_timeout,
        }
    }

    pub fn context(&self) -> &Arc<WriterContext> {
        &self.context
    }

    /// Queue `job` on the project's writer and wait for its result.
    pub async fn run<T, F, Fut>(&self, project: ProjectId, label: &'static str, job: F) -> Result<T>
    where
        F: FnOnce(Arc<WriterContext>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |ctx| {
            async move {
                let _ = reply_tx.send(job(ctx).await);
            }
            .boxed()
        });
        self.submit(project, label, job)?;
        reply_rx.await.map_err(|_| ContentError::WriterClosed(project))?
    }

    /// Queue `job` without waiting. Failures are logged and dropped.
    pub fn spawn_detached<F, Fut>(&self, project: ProjectId, label: &'static str, job: F)
    where
        F: FnOnce(Arc<WriterContext>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let job: Job = Box::new(move |ctx| {
            async move {
                if let Err(e) = job(ctx).await {
                    warn!("{} for project {} dropped: {}", label, project, e);
                }
            }
            .boxed()
        });
        if let Err(e) = self.submit(project, label, job) {
            warn!("{} for project {} not queued: {}", label, project, e);
        }
    }

    /// Wait until every job submitted so far for `project` has been applied.
    pub async fn flush(&self, project: ProjectId) -> Result<()> {
        self.run(project, "flush", |_| async { Ok(()) }).await
    }

    /// Wait for every live writer to apply what it has queued. Returns the
    /// number of projects drained.
    pub async fn flush_all(&self) -> Result<usize> {
        let projects: Vec<ProjectId> = {
            let registry = self
                .registry
                .lock()
                .map_err(|_| ContentError::StoreUnavailable("writer registry poisoned".into()))?;
            registry.keys().copied().collect()
        };
        for &project in &projects {
            self.flush(project).await?;
        }
        Ok(projects.len())
    }

    /// Number of live writer tasks.
    pub fn live_writers(&self) -> usize {
        self.registry.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn submit(&self, project: ProjectId, label: &'static str, job: Job) -> Result<()> {
        let mut registry = self
            .registry
            .lock()
            .map_err(|_| ContentError::WriterClosed(project))?;

        let mut envelope = Envelope { label, submitted_at: Utc::now(), job };
        if let Some(handle) = registry.get(&project) {
            match handle.tx.send(envelope) {
                Ok(()) => return Ok(()),
                // The writer died without retiring (a job panicked)
                Err(mpsc::error::SendError(returned)) => envelope = returned,
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        tx.send(envelope)
            .map_err(|_| ContentError::WriterClosed(project))?;
        registry.insert(project, WriterHandle { tx, generation });
        debug!("Spawning writer {} for project {}", generation, project);

        tokio::spawn(run_writer(
            project,
            generation,
            rx,
            self.context.clone(),
            self.registry.clone(),
            self.idle_timeout,
        ));
        Ok(())
    }
}

async fn run_writer(
    project: ProjectId,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    context: Arc<WriterContext>,
    registry: Registry,
    idle_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(envelope)) => {
                let queued_ms = (Utc::now() - envelope.submitted_at).num_milliseconds();
                debug!(
                    "Project {} applying {} (queued {}ms)",
                    project, envelope.label, queued_ms
                );
                (envelope.job)(context.clone()).await;
            }
            Ok(None) => break,
            Err(_) => {
                if retire(project, generation, &rx, &registry) {
                    break;
                }
            }
        }
    }
    debug!("Writer {} for project {} stopped", generation, project);
}

/// Remove this writer from the registry if its queue is empty.
fn retire(
    project: ProjectId,
    generation: u64,
    rx: &mpsc::UnboundedReceiver<Envelope>,
    registry: &Registry,
) -> bool {
    let Ok(mut registry) = registry.lock() else {
        return true;
    };
    if !rx.is_empty() {
        return false;
    }
    if registry.get(&project).is_some_and(|h| h.generation == generation) {
        registry.remove(&project);
    }
    true
}
