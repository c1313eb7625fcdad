//! Root orchestration struct: wires every component manager to a single
//! [`ServerConfig`] and owns the shutdown sequence (§4.A, §5).

use std::sync::Arc;

use tracing::info;

use crate::activated_repo::ActivatedRepoManager;
use crate::config::{JobStoreKind, ServerConfig};
use crate::file_crud::FileCrudService;
use crate::git_ops::GitOpsService;
use crate::golden_repo::{AuxiliaryCleanupHook, GoldenRepoManager, NoopCleanupHook};
use crate::jobs::{JobManager, JobStore, JsonFileJobStore};
use crate::listing::RepositoryListingService;
use crate::resource::shutdown::{drain_within_budget, ShutdownCoordinator};
use crate::ServerError;

/// Everything a request handler in the (out-of-scope) adaptor layer needs:
/// one manager per component, all cheaply `Clone`-able via `Arc`.
pub struct Server {
    pub config: Arc<ServerConfig>,
    pub golden_repos: Arc<GoldenRepoManager>,
    pub activated_repos: Arc<ActivatedRepoManager>,
    pub jobs: Arc<JobManager>,
    pub file_crud: Arc<FileCrudService>,
    pub git_ops: Arc<GitOpsService>,
    pub listing: Arc<RepositoryListingService>,
    shutdown: ShutdownCoordinator,
}

impl Server {
    /// Builds every manager from `config`, selecting the job store backend
    /// named by `config.job_store`. Use [`Server::bootstrap_with_cleanup_hook`]
    /// to attach auxiliary-service cleanup (§4.C "Removal") instead of the
    /// no-op default.
    pub async fn bootstrap(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bootstrap_with_cleanup_hook(config, Arc::new(NoopCleanupHook)).await
    }

    pub async fn bootstrap_with_cleanup_hook(
        config: ServerConfig,
        cleanup_hook: Arc<dyn AuxiliaryCleanupHook>,
    ) -> Result<Self, ServerError> {
        let config = Arc::new(config);

        let job_store: Arc<dyn JobStore> = match config.job_store {
            JobStoreKind::JsonFile => Arc::new(JsonFileJobStore::new(config.jobs_json_path())),
            #[cfg(feature = "sqlite-jobs")]
            JobStoreKind::Sqlite => Arc::new(
                crate::jobs::SqliteJobStore::connect(&config.jobs_sqlite_path())
                    .await
                    .map_err(|e| ServerError::Cleanup(e.to_string()))?,
            ),
            #[cfg(not(feature = "sqlite-jobs"))]
            JobStoreKind::Sqlite => {
                return Err(ServerError::Cleanup(
                    "sqlite job store selected but the 'sqlite-jobs' feature is not enabled".to_string(),
                ));
            }
        };

        let jobs = JobManager::new(job_store).await.map_err(ServerError::from)?;
        let golden_repos = GoldenRepoManager::new(config.clone(), jobs.clone(), cleanup_hook)
            .await
            .map_err(ServerError::from)?;
        let activated_repos = ActivatedRepoManager::new(config.clone(), jobs.clone(), golden_repos.clone());
        let file_crud = Arc::new(FileCrudService::new(config.clone()));
        let git_ops = Arc::new(GitOpsService::new(&config));
        let listing = Arc::new(RepositoryListingService::new(config.clone(), golden_repos.clone(), activated_repos.clone()));

        info!(target: "server", data_dir = %config.data_dir.display(), "server bootstrapped");

        Ok(Self {
            config,
            golden_repos,
            activated_repos,
            jobs,
            file_crud,
            git_ops,
            listing,
            shutdown: ShutdownCoordinator::new(),
        })
    }

    /// Blocks until SIGINT/SIGTERM (or an explicit `self.shutdown.trigger`),
    /// then drains in-flight jobs within the configured budget (§5).
    pub async fn run_until_shutdown(&self) {
        self.shutdown.wait_for_signal().await;
        info!(target: "server", "shutdown signal received, draining jobs");
        let budget = self.config.shutdown_budget;
        drain_within_budget(budget, self.jobs.shutdown(budget)).await;
        info!(target: "server", "shutdown complete");
    }
}
