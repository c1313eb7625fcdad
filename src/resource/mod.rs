//! Resource Manager (§4.A): a scoped region that guarantees cleanup of
//! everything acquired inside it — background tasks, file handles, DB
//! connections, temporary paths — in reverse dependency order, regardless
//! of how the region is exited.
//!
//! Usage mirrors the teacher's builder-opts-then-invoke shape, generalized
//! to an async scope:
//!
//! ```ignore
//! let result = resource::scoped(&config, |rm| async move {
//!     let tmp = tempfile::tempdir()?;
//!     rm.track_temp_path(tmp.path().to_path_buf()).await;
//!     do_the_work().await
//! }).await;
//! ```

pub mod memory;
pub mod shutdown;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use memory::{MemoryLeakWarning, MemoryMonitor};

const TASK_CANCEL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to remove temp path {path}: {source}")]
    TempPathRemoval {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to close connection '{name}': {message}")]
    ConnectionClose { name: String, message: String },
}

/// A named resource held open for the lifetime of a [`ResourceManager`]
/// scope, closed (idempotently) on dispose.
#[async_trait]
pub trait DbConnection: Send + Sync {
    async fn close(&self) -> Result<(), String>;
}

/// A tracked open file; closing is a no-op if already closed.
pub struct TrackedFile {
    name: String,
    file: Mutex<Option<tokio::fs::File>>,
}

impl TrackedFile {
    pub fn new(name: impl Into<String>, file: tokio::fs::File) -> Self {
        Self {
            name: name.into(),
            file: Mutex::new(Some(file)),
        }
    }

    async fn close(&self) {
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.take() {
            drop(file); // std/tokio files close their fd on drop
            debug!(target: "resource", file = %self.name, "closed tracked file handle");
        }
    }
}

#[derive(Default)]
struct Tracker {
    tasks: Vec<(String, tokio::task::JoinHandle<()>)>,
    files: Vec<Arc<TrackedFile>>,
    connections: HashMap<String, Arc<dyn DbConnection>>,
    temp_paths: Vec<PathBuf>,
}

impl Drop for Tracker {
    /// Best-effort synchronous fallback for the case the scope never ran
    /// its async `dispose()` (e.g. the owning task panicked). This never
    /// replaces `dispose()`; it only bounds the worst case.
    fn drop(&mut self) {
        for (name, handle) in &self.tasks {
            if !handle.is_finished() {
                handle.abort();
                debug!(target: "resource", task = %name, "aborted tracked task on drop");
            }
        }
        for path in &self.temp_paths {
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(path);
            } else {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

/// The scope itself. Clone is cheap (shared `Arc` state) so it can be
/// passed into spawned subtasks that need to register their own resources.
#[derive(Clone)]
pub struct ResourceManager {
    tracker: Arc<Mutex<Tracker>>,
    memory: Option<Arc<MemoryMonitor>>,
}

impl ResourceManager {
    pub fn new(enable_memory_monitoring: bool, memory_leak_threshold_mb: f64) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(Tracker::default())),
            memory: enable_memory_monitoring
                .then(|| Arc::new(MemoryMonitor::new(memory_leak_threshold_mb))),
        }
    }

    pub async fn track_task(&self, name: impl Into<String>, handle: tokio::task::JoinHandle<()>) {
        self.tracker.lock().await.tasks.push((name.into(), handle));
    }

    pub async fn track_file(&self, file: TrackedFile) {
        self.tracker.lock().await.files.push(Arc::new(file));
    }

    pub async fn track_connection(&self, name: impl Into<String>, conn: Arc<dyn DbConnection>) {
        self.tracker.lock().await.connections.insert(name.into(), conn);
    }

    pub async fn track_temp_path(&self, path: PathBuf) {
        self.tracker.lock().await.temp_paths.push(path);
    }

    /// Disposes everything tracked so far, in reverse dependency order.
    /// Every step is independent: a failure in one step is logged and the
    /// next step still runs (§4.A "Failure semantics").
    pub async fn dispose(&self) -> Option<MemoryLeakWarning> {
        let mut tracker = self.tracker.lock().await;

        // 1. Cancel background tasks first; they may hold other resources.
        for (name, handle) in tracker.tasks.drain(..) {
            if handle.is_finished() {
                continue;
            }
            handle.abort();
            match tokio::time::timeout(TASK_CANCEL_TIMEOUT, handle).await {
                Ok(_) => debug!(target: "resource", task = %name, "task cancelled"),
                Err(_) => warn!(target: "resource", task = %name, "task did not cancel within 2s"),
            }
        }

        // 2. Close file handles (idempotent).
        for file in tracker.files.drain(..) {
            file.close().await;
        }

        // 3. Close named DB connections.
        for (name, conn) in tracker.connections.drain() {
            if let Err(message) = conn.close().await {
                warn!(target: "resource", connection = %name, error = %message, "failed to close connection");
            }
        }

        // 4. Remove temporary paths (recursive for directories).
        for path in tracker.temp_paths.drain(..) {
            let result = if path.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            if let Err(source) = result {
                if source.kind() != std::io::ErrorKind::NotFound {
                    warn!(target: "resource", path = %path.display(), error = %source, "failed to remove temp path");
                }
            }
        }

        drop(tracker);

        // 5. Memory leak check (informational only, never fatal).
        let warning = self.memory.as_ref().and_then(|m| m.check_for_leak());
        if let Some(w) = &warning {
            warn!(target: "resource", "{w}");
        }
        warning
    }
}

/// Runs `body` inside a fresh [`ResourceManager`] scope and guarantees
/// `dispose()` runs afterward regardless of whether `body` succeeded.
pub async fn scoped<F, Fut, T>(
    memory_monitoring_enabled: bool,
    memory_leak_threshold_mb: f64,
    body: F,
) -> T
where
    F: FnOnce(ResourceManager) -> Fut,
    Fut: Future<Output = T>,
{
    let rm = ResourceManager::new(memory_monitoring_enabled, memory_leak_threshold_mb);
    let result = body(rm.clone()).await;
    rm.dispose().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn temp_paths_removed_on_dispose() {
        let dir = tempfile::tempdir().unwrap();
        let leftover = dir.path().join("leftover.txt");
        tokio::fs::write(&leftover, b"x").await.unwrap();

        let rm = ResourceManager::new(false, 100.0);
        rm.track_temp_path(leftover.clone()).await;
        rm.dispose().await;

        assert!(!leftover.exists());
    }

    #[tokio::test]
    async fn disposal_is_independent_per_step() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("already-gone.txt");
        // Not created: removal will hit NotFound and must not abort the scope.
        let still_there = dir.path().join("still-there.txt");
        tokio::fs::write(&still_there, b"x").await.unwrap();

        let rm = ResourceManager::new(false, 100.0);
        rm.track_temp_path(missing).await;
        rm.track_temp_path(still_there.clone()).await;
        rm.dispose().await;

        assert!(!still_there.exists());
    }

    #[tokio::test]
    async fn scoped_disposes_after_body() {
        let dir = tempfile::tempdir().unwrap();
        let leftover = dir.path().join("leftover.txt");
        tokio::fs::write(&leftover, b"x").await.unwrap();

        let result = scoped(false, 100.0, |rm| {
            let leftover = leftover.clone();
            async move {
                rm.track_temp_path(leftover).await;
                42
            }
        })
        .await;

        assert_eq!(result, 42);
        assert!(!leftover.exists());
    }
}
