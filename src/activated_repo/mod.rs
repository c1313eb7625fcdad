//! Activated Repository Manager (§4.D): per-user copy-on-write working
//! copies of golden repositories, dual-remote topology, branch switching,
//! and golden-sync.

pub mod branch_switch;
pub mod cow_clone;
pub mod model;
pub mod remotes;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

pub use model::ActivatedRepoMetadata;

use crate::config::ServerConfig;
use crate::golden_repo::GoldenRepoManager;
use crate::jobs::JobManager;
use crate::subprocess::run_plain;
use crate::validation::{validate_alias, ValidationError};

const LOCAL_DEADLINE: Duration = Duration::from_secs(30);
const FETCH_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ActivatedRepoError {
    #[error("repository alias '{0}' is already activated")]
    AlreadyActivated(String),
    #[error("activated repository '{0}' not found")]
    NotFound(String),
    #[error("golden repository '{0}' not found")]
    GoldenNotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("branch '{branch}' not found (remote fetch attempted: {fetch_attempted})")]
    BranchNotFound { branch: String, fetch_attempted: bool },
    #[error("{0}")]
    MergeConflict(String),
    #[error("{0}")]
    GitOperation(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ValidationError> for ActivatedRepoError {
    fn from(e: ValidationError) -> Self {
        ActivatedRepoError::Validation(e.to_string())
    }
}

impl From<crate::subprocess::SubprocessError> for ActivatedRepoError {
    fn from(e: crate::subprocess::SubprocessError) -> Self {
        ActivatedRepoError::GitOperation(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct SyncResult {
    pub changes_applied: bool,
    pub message: String,
}

pub struct ActivatedRepoManager {
    config: Arc<ServerConfig>,
    jobs: Arc<JobManager>,
    golden_repos: Arc<GoldenRepoManager>,
}

impl ActivatedRepoManager {
    pub fn new(config: Arc<ServerConfig>, jobs: Arc<JobManager>, golden_repos: Arc<GoldenRepoManager>) -> Arc<Self> {
        Arc::new(Self { config, jobs, golden_repos })
    }

    pub async fn activate(
        &self,
        username: String,
        golden_alias: String,
        branch: Option<String>,
        user_alias: Option<String>,
    ) -> Result<Uuid, ActivatedRepoError> {
        let golden = self
            .golden_repos
            .get(&golden_alias)
            .await
            .ok_or_else(|| ActivatedRepoError::GoldenNotFound(golden_alias.clone()))?;

        let user_alias = user_alias.unwrap_or_else(|| golden_alias.clone());
        validate_alias(&user_alias)?;

        let activated_dir = self.config.activated_repos_dir();
        if model::is_live(&activated_dir, &username, &user_alias) {
            return Err(ActivatedRepoError::AlreadyActivated(user_alias));
        }

        let dest = model::repo_dir(&activated_dir, &username, &user_alias);
        let requested_branch = branch.filter(|b| b != &golden.default_branch);

        let job_username = username.clone();
        let job_user_alias = user_alias.clone();
        let golden_default_branch = golden.default_branch.clone();
        let golden_clone_path = golden.clone_path.clone();
        let golden_repo_url = golden.repo_url.clone();
        let job_golden_alias = golden_alias.clone();

        let job_id = self
            .jobs
            .submit(
                "activate",
                username,
                false,
                Some(user_alias),
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        activate_body(
                            &golden_clone_path,
                            &golden_repo_url,
                            &job_golden_alias,
                            &golden_default_branch,
                            &dest,
                            requested_branch,
                            &activated_dir,
                            &job_username,
                            &job_user_alias,
                        )
                        .await
                        .map_err(|e: ActivatedRepoError| e.to_string())
                    })
                }),
            )
            .await
            .map_err(|e| ActivatedRepoError::GitOperation(e.to_string()))?;

        Ok(job_id)
    }

    pub async fn deactivate(&self, username: String, user_alias: String) -> Result<Uuid, ActivatedRepoError> {
        let activated_dir = self.config.activated_repos_dir();
        if !model::is_live(&activated_dir, &username, &user_alias) {
            return Err(ActivatedRepoError::NotFound(user_alias));
        }

        let dir = model::repo_dir(&activated_dir, &username, &user_alias);
        let meta_path = model::metadata_path(&activated_dir, &username, &user_alias);

        let job_id = self
            .jobs
            .submit(
                "deactivate",
                username,
                false,
                Some(user_alias),
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        if dir.exists() {
                            tokio::fs::remove_dir_all(&dir).await.map_err(|e| e.to_string())?;
                        }
                        if meta_path.exists() {
                            tokio::fs::remove_file(&meta_path).await.map_err(|e| e.to_string())?;
                        }
                        Ok(None)
                    })
                }),
            )
            .await
            .map_err(|e| ActivatedRepoError::GitOperation(e.to_string()))?;

        Ok(job_id)
    }

    /// Scans the user's directory; corrupted metadata files are skipped
    /// with a warning rather than failing the whole listing.
    pub async fn list(&self, username: &str) -> Vec<ActivatedRepoMetadata> {
        let user_dir = self.config.activated_repos_dir().join(username);
        let mut out = Vec::new();

        let mut entries = match tokio::fs::read_dir(&user_dir).await {
            Ok(entries) => entries,
            Err(_) => return out,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(user_alias) = name.strip_suffix("_metadata.json") else {
                continue;
            };
            if !model::repo_dir(&self.config.activated_repos_dir(), username, user_alias).is_dir() {
                continue;
            }
            match model::read_metadata(&self.config.activated_repos_dir(), username, user_alias).await {
                Ok(meta) => out.push(meta),
                Err(e) => warn!(target: "activated_repo", user_alias, error = %e, "skipping corrupted metadata"),
            }
        }
        out
    }

    pub async fn switch_branch(
        &self,
        username: String,
        user_alias: String,
        branch: String,
    ) -> Result<(), ActivatedRepoError> {
        let activated_dir = self.config.activated_repos_dir();
        if !model::is_live(&activated_dir, &username, &user_alias) {
            return Err(ActivatedRepoError::NotFound(user_alias));
        }
        let dir = model::repo_dir(&activated_dir, &username, &user_alias);

        branch_switch::switch_branch(&dir, &branch).await?;

        let mut meta = model::read_metadata(&activated_dir, &username, &user_alias).await?;
        meta.current_branch = branch;
        meta.last_accessed = Utc::now();
        model::write_metadata(&activated_dir, &username, &user_alias, &meta).await?;
        Ok(())
    }

    pub async fn sync_with_golden(
        &self,
        username: String,
        user_alias: String,
    ) -> Result<SyncResult, ActivatedRepoError> {
        let activated_dir = self.config.activated_repos_dir();
        if !model::is_live(&activated_dir, &username, &user_alias) {
            return Err(ActivatedRepoError::NotFound(user_alias));
        }
        let dir = model::repo_dir(&activated_dir, &username, &user_alias);

        remotes::migrate_legacy_remote(&dir).await?;

        let fetch = run_plain(&["git", "fetch", "golden"], &dir, FETCH_DEADLINE).await?;
        if !fetch.success() {
            return Ok(SyncResult {
                changes_applied: false,
                message: format!("fetch from golden failed: {}", fetch.stderr.trim()),
            });
        }

        let meta = model::read_metadata(&activated_dir, &username, &user_alias).await?;
        let golden_ref = format!("golden/{}", meta.current_branch);

        let diff = run_plain(&["git", "rev-list", "--count", &format!("HEAD..{golden_ref}")], &dir, LOCAL_DEADLINE).await?;
        let behind: u64 = diff.stdout.trim().parse().unwrap_or(0);
        if behind == 0 {
            return Ok(SyncResult { changes_applied: false, message: "already up to date".to_string() });
        }

        let merge = run_plain(&["git", "merge", &golden_ref], &dir, LOCAL_DEADLINE).await?;
        if !merge.success() {
            if merge.combined().to_lowercase().contains("conflict") {
                return Err(ActivatedRepoError::MergeConflict(merge.stderr));
            }
            return Err(ActivatedRepoError::GitOperation(merge.stderr));
        }

        Ok(SyncResult { changes_applied: true, message: format!("fast-forwarded {behind} commit(s)") })
    }
}

#[cfg(test)]
mod sync_tests {
    use super::*;
    use crate::golden_repo::NoopCleanupHook;
    use crate::jobs::JsonFileJobStore;

    async fn init_repo_with_commit(path: &Path, file: &str, contents: &str) {
        run_plain(&["git", "init"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.email", "t@example.com"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.name", "T"], path, LOCAL_DEADLINE).await.unwrap();
        tokio::fs::write(path.join(file), contents).await.unwrap();
        run_plain(&["git", "add", "."], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "commit", "-m", "init"], path, LOCAL_DEADLINE).await.unwrap();
    }

    async fn commit_change(path: &Path, file: &str, contents: &str, message: &str) {
        tokio::fs::write(path.join(file), contents).await.unwrap();
        run_plain(&["git", "add", "."], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "commit", "-m", message], path, LOCAL_DEADLINE).await.unwrap();
    }

    async fn current_branch_name(path: &Path) -> String {
        let out = run_plain(&["git", "branch", "--show-current"], path, LOCAL_DEADLINE).await.unwrap();
        out.stdout.trim().to_string()
    }

    async fn manager_fixture() -> (Arc<ActivatedRepoManager>, tempfile::TempDir) {
        let root = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.data_dir = root.path().join("data");
        let config = Arc::new(config);

        let jobs = JobManager::new(Arc::new(JsonFileJobStore::new(config.jobs_json_path())))
            .await
            .unwrap();
        let golden_repos = GoldenRepoManager::new(config.clone(), jobs.clone(), Arc::new(NoopCleanupHook))
            .await
            .unwrap();
        let manager = ActivatedRepoManager::new(config, jobs, golden_repos);
        (manager, root)
    }

    /// Clones `golden_dir` to `activated_dir` and renames `origin` to
    /// `golden`, matching the dual-remote topology `sync_with_golden` expects.
    async fn clone_with_golden_remote(golden_dir: &Path, activated_dir: &Path) {
        let out = run_plain(
            &["git", "clone", &golden_dir.display().to_string(), &activated_dir.display().to_string()],
            golden_dir,
            LOCAL_DEADLINE,
        )
        .await
        .unwrap();
        assert!(out.success(), "clone failed: {}", out.stderr);
        run_plain(&["git", "remote", "rename", "origin", "golden"], activated_dir, LOCAL_DEADLINE)
            .await
            .unwrap();
    }

    async fn place_activation(
        manager: &ActivatedRepoManager,
        activated_dir: &Path,
        username: &str,
        user_alias: &str,
        branch: String,
    ) -> std::path::PathBuf {
        let activated_repos_dir = manager.config.activated_repos_dir();
        let dest = model::repo_dir(&activated_repos_dir, username, user_alias);
        tokio::fs::create_dir_all(dest.parent().unwrap()).await.unwrap();
        tokio::fs::rename(activated_dir, &dest).await.unwrap();
        model::write_metadata(
            &activated_repos_dir,
            username,
            user_alias,
            &ActivatedRepoMetadata {
                user_alias: user_alias.to_string(),
                golden_repo_alias: "hello".to_string(),
                current_branch: branch,
                activated_at: Utc::now(),
                last_accessed: Utc::now(),
            },
        )
        .await
        .unwrap();
        dest
    }

    #[tokio::test]
    async fn fast_forwards_when_golden_has_new_commits() {
        let (manager, _root) = manager_fixture().await;

        let golden_dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(golden_dir.path(), "a.txt", "one").await;
        let branch = current_branch_name(golden_dir.path()).await;

        let activated_dir = tempfile::tempdir().unwrap();
        clone_with_golden_remote(golden_dir.path(), activated_dir.path()).await;

        commit_change(golden_dir.path(), "b.txt", "two", "add b").await;

        let dest = place_activation(&manager, activated_dir.path(), "alice", "work", branch).await;

        let result = manager.sync_with_golden("alice".to_string(), "work".to_string()).await.unwrap();
        assert!(result.changes_applied);
        assert!(result.message.contains("fast-forwarded"));
        assert!(dest.join("b.txt").is_file());
    }

    #[tokio::test]
    async fn diverging_same_line_edit_is_reported_as_conflict() {
        let (manager, _root) = manager_fixture().await;

        let golden_dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(golden_dir.path(), "shared.txt", "line one\n").await;
        let branch = current_branch_name(golden_dir.path()).await;

        let activated_dir = tempfile::tempdir().unwrap();
        clone_with_golden_remote(golden_dir.path(), activated_dir.path()).await;

        commit_change(golden_dir.path(), "shared.txt", "golden version\n", "golden edit").await;
        commit_change(activated_dir.path(), "shared.txt", "local version\n", "local edit").await;

        place_activation(&manager, activated_dir.path(), "alice", "work", branch).await;

        let result = manager.sync_with_golden("alice".to_string(), "work".to_string()).await;
        match result {
            Err(ActivatedRepoError::MergeConflict(_)) => {}
            other => panic!("expected MergeConflict, got {other:?}"),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn activate_body(
    golden_clone_path: &Path,
    golden_repo_url: &str,
    golden_alias: &str,
    golden_default_branch: &str,
    dest: &Path,
    requested_branch: Option<String>,
    activated_repos_dir: &Path,
    username: &str,
    user_alias: &str,
) -> Result<Option<serde_json::Value>, ActivatedRepoError> {
    let upstream_url = remotes::get_remote_url(golden_clone_path, "origin")
        .await?
        .unwrap_or_else(|| golden_repo_url.to_string());

    if let Err(e) = cow_clone::run_cow_clone(golden_clone_path, dest, &upstream_url).await {
        tokio::fs::remove_dir_all(dest).await.ok();
        return Err(e);
    }

    let mut current_branch = golden_default_branch.to_string();
    if let Some(branch) = requested_branch {
        if let Err(e) = branch_switch::switch_branch(dest, &branch).await {
            tokio::fs::remove_dir_all(dest).await.ok();
            return Err(e);
        }
        current_branch = branch;
    }

    let now = Utc::now();
    let meta = ActivatedRepoMetadata {
        user_alias: user_alias.to_string(),
        golden_repo_alias: golden_alias.to_string(),
        current_branch,
        activated_at: now,
        last_accessed: now,
    };
    model::write_metadata(activated_repos_dir, username, user_alias, &meta).await?;

    Ok(None)
}
