//! Job submission, prioritized dispatch, cancellation and shutdown (§4.B).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{BackgroundJob, JobStatus};
use super::persistence::JobStore;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("server is shutting down, not accepting new jobs")]
    Maintenance,
    #[error("job '{0}' not found")]
    NotFound(String),
    #[error("cannot cancel job in '{0}' status")]
    NotCancellable(String),
}

/// Handle passed into a job body: progress reporting and cooperative
/// cancellation checks at suspension points, per §4.B's cooperative model.
#[derive(Clone)]
pub struct JobContext {
    job_id: Uuid,
    jobs: Arc<Mutex<HashMap<Uuid, BackgroundJob>>>,
    store: Arc<dyn JobStore>,
}

impl JobContext {
    pub async fn set_progress(&self, progress: u8) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&self.job_id) {
            job.set_progress(progress);
        }
        let _ = self.store.save_all(&jobs).await;
    }

    pub async fn is_cancelled(&self) -> bool {
        self.jobs
            .lock()
            .await
            .get(&self.job_id)
            .map(|j| j.cancelled)
            .unwrap_or(false)
    }

    pub async fn set_self_healing_note(&self, note: impl Into<String>) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&self.job_id) {
            job.self_healing.claude_actions.push(note.into());
        }
        let _ = self.store.save_all(&jobs).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub completed: u64,
    pub failed: u64,
}

pub type JobOutcome = Result<Option<serde_json::Value>, String>;
pub type JobBody = Box<dyn FnOnce(JobContext) -> Pin<Box<dyn Future<Output = JobOutcome> + Send>> + Send>;

struct QueuedJob {
    job_id: Uuid,
    body: JobBody,
}

pub struct JobManager {
    jobs: Arc<Mutex<HashMap<Uuid, BackgroundJob>>>,
    store: Arc<dyn JobStore>,
    admin_tx: mpsc::UnboundedSender<QueuedJob>,
    user_tx: mpsc::UnboundedSender<QueuedJob>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    dispatcher: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutting_down: Arc<std::sync::atomic::AtomicBool>,
}

impl JobManager {
    pub async fn new(store: Arc<dyn JobStore>) -> Result<Arc<Self>, JobError> {
        let mut loaded = store
            .load_all()
            .await
            .map_err(|e| JobError::NotFound(format!("failed to load job store: {e}")))?;

        // Orphan rewrite (§4.B "Persistence", invariant §8.6): any record
        // left `running`/`pending` from a previous process is unrecoverable.
        let mut orphaned = 0;
        for job in loaded.values_mut() {
            if matches!(job.status, JobStatus::Running | JobStatus::Pending) {
                job.rewrite_as_orphan();
                orphaned += 1;
            }
        }
        if orphaned > 0 {
            warn!(target: "jobs", count = orphaned, "rewrote orphaned jobs from previous run");
            store
                .save_all(&loaded)
                .await
                .map_err(|e| JobError::NotFound(format!("failed to persist orphan rewrite: {e}")))?;
        }

        let jobs = Arc::new(Mutex::new(loaded));
        let (admin_tx, admin_rx) = mpsc::unbounded_channel();
        let (user_tx, user_rx) = mpsc::unbounded_channel();

        let manager = Arc::new(Self {
            jobs,
            store,
            admin_tx,
            user_tx,
            workers: Mutex::new(Vec::new()),
            dispatcher: Mutex::new(None),
            shutting_down: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        });

        let dispatcher_handle = manager.clone().spawn_dispatcher(admin_rx, user_rx);
        *manager.dispatcher.lock().await = Some(dispatcher_handle);

        Ok(manager)
    }

    fn spawn_dispatcher(
        self: Arc<Self>,
        mut admin_rx: mpsc::UnboundedReceiver<QueuedJob>,
        mut user_rx: mpsc::UnboundedReceiver<QueuedJob>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let queued = tokio::select! {
                    biased;
                    Some(q) = admin_rx.recv() => q,
                    Some(q) = user_rx.recv() => q,
                    else => break,
                };
                let manager = self.clone();
                let handle = tokio::spawn(async move { manager.run_job(queued).await });
                self.workers.lock().await.push(handle);
            }
        })
    }

    async fn run_job(&self, queued: QueuedJob) {
        {
            let mut jobs = self.jobs.lock().await;
            if let Some(job) = jobs.get_mut(&queued.job_id) {
                if job.status == JobStatus::Cancelled {
                    return; // cancelled while still pending in the queue
                }
                job.mark_running();
            }
            let _ = self.store.save_all(&jobs).await;
        }

        let ctx = JobContext {
            job_id: queued.job_id,
            jobs: self.jobs.clone(),
            store: self.store.clone(),
        };
        let outcome = (queued.body)(ctx.clone()).await;

        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&queued.job_id) {
            match outcome {
                _ if job.cancelled => job.mark_cancelled(),
                Ok(result) => job.mark_completed(result),
                Err(message) => job.mark_failed(message),
            }
        }
        let _ = self.store.save_all(&jobs).await;
    }

    /// Non-blocking: validates and persists a `pending` record, then hands
    /// the body to the prioritized dispatcher.
    pub async fn submit(
        &self,
        operation_type: impl Into<String>,
        username: impl Into<String>,
        is_admin: bool,
        repo_alias: Option<String>,
        body: JobBody,
    ) -> Result<Uuid, JobError> {
        if self.shutting_down.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(JobError::Maintenance);
        }

        match repo_alias.as_deref() {
            None => warn!(target: "jobs", "job submitted with null repo_alias"),
            Some("unknown") => warn!(target: "jobs", "job submitted with literal 'unknown' repo_alias"),
            _ => {}
        }

        let job = BackgroundJob::new(operation_type, username, is_admin, repo_alias);
        let job_id = job.job_id;

        {
            let mut jobs = self.jobs.lock().await;
            jobs.insert(job_id, job);
            self.store
                .save_all(&jobs)
                .await
                .map_err(|e| JobError::NotFound(format!("failed to persist job: {e}")))?;
        }

        let queued = QueuedJob { job_id, body };
        let tx = if is_admin { &self.admin_tx } else { &self.user_tx };
        let _ = tx.send(queued);

        Ok(job_id)
    }

    pub async fn status(&self, job_id: Uuid, requester: &str) -> Result<BackgroundJob, JobError> {
        let jobs = self.jobs.lock().await;
        jobs.get(&job_id)
            .filter(|j| j.username == requester)
            .cloned()
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    pub async fn list(
        &self,
        requester: &str,
        status_filter: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Vec<BackgroundJob> {
        let jobs = self.jobs.lock().await;
        let mut matching: Vec<BackgroundJob> = jobs
            .values()
            .filter(|j| j.username == requester)
            .filter(|j| status_filter.map(|s| j.status == s).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.into_iter().skip(offset).take(limit).collect()
    }

    pub async fn cancel(&self, job_id: Uuid, requester: &str) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&job_id)
            .filter(|j| j.username == requester)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        match job.status {
            JobStatus::Pending => {
                job.mark_cancelled();
            }
            JobStatus::Running => {
                job.cancelled = true;
            }
            other => return Err(JobError::NotCancellable(other.to_string())),
        }
        let _ = self.store.save_all(&jobs).await;
        Ok(())
    }

    /// Counts completed/failed jobs with a completion time at or after
    /// `window` ago. `("24h", "completed")` etc. — a dashboard read, not
    /// gated by ownership.
    pub async fn stats(&self, window: Duration) -> JobStats {
        let cutoff = Utc::now() - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        let jobs = self.jobs.lock().await;
        let mut completed = 0;
        let mut failed = 0;
        for job in jobs.values() {
            let Some(completed_at) = job.completed_at else { continue };
            if completed_at < cutoff {
                continue;
            }
            match job.status {
                JobStatus::Completed => completed += 1,
                JobStatus::Failed => failed += 1,
                _ => {}
            }
        }
        JobStats { completed, failed }
    }

    /// Completed or failed jobs finishing within `window`, newest first,
    /// across all users — a dashboard read, not gated by ownership.
    pub async fn recent(&self, window: Duration, limit: usize) -> Vec<BackgroundJob> {
        let cutoff = Utc::now() - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        let jobs = self.jobs.lock().await;
        let mut matching: Vec<BackgroundJob> = jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Completed | JobStatus::Failed))
            .filter(|j| j.completed_at.map(|c| c >= cutoff).unwrap_or(false))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        matching.truncate(limit);
        matching
    }

    /// Jobs whose operation type is one of `operation_types`, regardless
    /// of owner — used internally to find and cancel in-flight jobs for a
    /// repo alias during deletion.
    pub async fn find_by_operation(&self, operation_types: &[&str]) -> Vec<BackgroundJob> {
        let jobs = self.jobs.lock().await;
        jobs.values()
            .filter(|j| operation_types.contains(&j.operation_type.as_str()))
            .cloned()
            .collect()
    }

    /// Removes terminal jobs older than `age`, under the job lock.
    pub async fn prune(&self, age: Duration) -> usize {
        let cutoff: DateTime<Utc> =
            Utc::now() - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, j| {
            !(j.status.is_terminal() && j.completed_at.map(|c| c < cutoff).unwrap_or(false))
        });
        let removed = before - jobs.len();
        if removed > 0 {
            let _ = self.store.save_all(&jobs).await;
        }
        removed
    }

    /// Marks all `running` jobs cancelled, persists, then joins worker
    /// tasks with a bounded wait.
    pub async fn shutdown(&self, budget: Duration) {
        self.shutting_down.store(true, std::sync::atomic::Ordering::SeqCst);

        {
            let mut jobs = self.jobs.lock().await;
            for job in jobs.values_mut() {
                if job.status == JobStatus::Running {
                    job.mark_cancelled();
                }
            }
            let _ = self.store.save_all(&jobs).await;
        }

        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            dispatcher.abort();
        }

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(budget, join_all).await.is_err() {
            warn!(target: "jobs", "shutdown exceeded budget, abandoning remaining workers");
        }
        info!(target: "jobs", "job manager shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::persistence::JsonFileJobStore;

    async fn test_manager() -> Arc<JobManager> {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileJobStore::new(dir.path().join("jobs.json")));
        // Leaking the TempDir guard is fine here: write_atomic recreates the
        // directory on demand, and the OS reclaims it at process exit.
        std::mem::forget(dir);
        JobManager::new(store).await.unwrap()
    }

    #[tokio::test]
    async fn submit_and_await_completion() {
        let manager = test_manager().await;
        let job_id = manager
            .submit("add_golden", "alice", false, Some("hello".into()), Box::new(|_ctx| {
                Box::pin(async { Ok(Some(serde_json::json!({"ok": true}))) })
            }))
            .await
            .unwrap();

        for _ in 0..50 {
            let job = manager.status(job_id, "alice").await.unwrap();
            if job.status.is_terminal() {
                assert_eq!(job.status, JobStatus::Completed);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn listing_is_owner_scoped() {
        let manager = test_manager().await;
        manager
            .submit("add_golden", "alice", false, None, Box::new(|_| Box::pin(async { Ok(None) })))
            .await
            .unwrap();
        manager
            .submit("add_golden", "bob", false, None, Box::new(|_| Box::pin(async { Ok(None) })))
            .await
            .unwrap();

        let alice_jobs = manager.list("alice", None, 100, 0).await;
        assert_eq!(alice_jobs.len(), 1);
        assert_eq!(alice_jobs[0].username, "alice");
    }

    #[tokio::test]
    async fn cancel_requires_ownership() {
        let manager = test_manager().await;
        let job_id = manager
            .submit(
                "refresh_golden",
                "alice",
                false,
                None,
                Box::new(|ctx| {
                    Box::pin(async move {
                        for _ in 0..200 {
                            if ctx.is_cancelled().await {
                                return Err("cancelled".to_string());
                            }
                            tokio::time::sleep(Duration::from_millis(5)).await;
                        }
                        Ok(None)
                    })
                }),
            )
            .await
            .unwrap();

        assert!(manager.cancel(job_id, "bob").await.is_err());
        manager.cancel(job_id, "alice").await.unwrap();

        for _ in 0..100 {
            let job = manager.status(job_id, "alice").await.unwrap();
            if job.status.is_terminal() {
                assert_eq!(job.status, JobStatus::Cancelled);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cancelled job never reached terminal state");
    }

    #[tokio::test]
    async fn stats_counts_only_within_window() {
        let manager = test_manager().await;
        let job_id = manager
            .submit("add_golden", "alice", false, None, Box::new(|_| Box::pin(async { Ok(None) })))
            .await
            .unwrap();

        for _ in 0..50 {
            if manager.status(job_id, "alice").await.unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let stats = manager.stats(Duration::from_secs(3600)).await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);

        let stats = manager.stats(Duration::from_nanos(1)).await;
        assert_eq!(stats.completed, 0);
    }

    #[tokio::test]
    async fn find_by_operation_ignores_owner() {
        let manager = test_manager().await;
        manager
            .submit("remove_golden", "alice", true, Some("hello".into()), Box::new(|_| Box::pin(async { Ok(None) })))
            .await
            .unwrap();

        let found = manager.find_by_operation(&["remove_golden", "refresh_golden"]).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].operation_type, "remove_golden");
    }
}
