//! The copy-on-write clone procedure (§4.D), the hardest part of the
//! Activated Repository Manager: a reflink-aware copy that preserves the
//! golden repo's `.code-indexer/` indexes, followed by git bookkeeping,
//! remote configuration, and a mandatory verification step.

use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::subprocess::run_plain;

use super::remotes::configure_dual_remotes;
use super::ActivatedRepoError;

const REFLINK_COPY_DEADLINE: Duration = Duration::from_secs(2 * 60);
const LOCAL_DEADLINE: Duration = Duration::from_secs(30);
const FETCH_DEADLINE: Duration = Duration::from_secs(60);

/// Runs the full six-step procedure. On any fatal failure the caller is
/// responsible for deleting `dest` (§4.D "Activate": "on failure, delete
/// `D_` and fail the job").
pub async fn run_cow_clone(golden: &Path, dest: &Path, upstream_url: &str) -> Result<(), ActivatedRepoError> {
    reflink_copy(golden, dest).await?;
    reset_git_timestamps(dest).await?;
    fix_config_paths(dest).await?;
    configure_dual_remotes(dest, upstream_url, golden).await?;
    best_effort_fetch_origin(dest).await;
    verify_operational(dest).await?;
    Ok(())
}

async fn reflink_copy(golden: &Path, dest: &Path) -> Result<(), ActivatedRepoError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let out = run_plain(
        &["cp", "--reflink=auto", "-r", &golden.display().to_string(), &dest.display().to_string()],
        Path::new("."),
        REFLINK_COPY_DEADLINE,
    )
    .await?;
    if !out.success() {
        return Err(ActivatedRepoError::GitOperation(format!(
            "reflink copy from {} failed: {}",
            golden.display(),
            out.stderr
        )));
    }
    Ok(())
}

async fn reset_git_timestamps(dest: &Path) -> Result<(), ActivatedRepoError> {
    run_plain(&["git", "update-index", "--refresh"], dest, LOCAL_DEADLINE).await?;
    let restore = run_plain(&["git", "restore", "."], dest, LOCAL_DEADLINE).await?;
    if !restore.success() {
        return Err(ActivatedRepoError::GitOperation(restore.stderr));
    }
    Ok(())
}

async fn fix_config_paths(dest: &Path) -> Result<(), ActivatedRepoError> {
    let out = run_plain(&["cidx", "fix-config", "--force"], dest, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(ActivatedRepoError::GitOperation(format!(
            "cidx fix-config failed: {}",
            out.stderr
        )));
    }
    Ok(())
}

async fn best_effort_fetch_origin(dest: &Path) {
    match run_plain(&["git", "fetch", "origin"], dest, FETCH_DEADLINE).await {
        Ok(out) if !out.success() => {
            warn!(target: "activated_repo", stderr = %out.stderr, "best-effort origin fetch failed during activation");
        }
        Err(e) => {
            warn!(target: "activated_repo", error = %e, "best-effort origin fetch errored during activation");
        }
        _ => {}
    }
}

async fn verify_operational(dest: &Path) -> Result<(), ActivatedRepoError> {
    let out = run_plain(&["git", "status"], dest, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(ActivatedRepoError::GitOperation(format!(
            "activated repository failed verification: {}",
            out.stderr
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_golden_repo(path: &Path) {
        run_plain(&["git", "init"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.email", "t@example.com"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.name", "T"], path, LOCAL_DEADLINE).await.unwrap();
        tokio::fs::write(path.join("a.txt"), b"hi").await.unwrap();
        tokio::fs::create_dir_all(path.join(".code-indexer")).await.unwrap();
        tokio::fs::write(path.join(".code-indexer").join("config.json"), b"{}").await.unwrap();
        run_plain(&["git", "add", "a.txt"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "commit", "-m", "init"], path, LOCAL_DEADLINE).await.unwrap();
    }

    #[tokio::test]
    async fn reflink_copy_preserves_code_indexer_dir() {
        let golden = tempfile::tempdir().unwrap();
        init_golden_repo(golden.path()).await;

        let parent = tempfile::tempdir().unwrap();
        let dest = parent.path().join("activated");

        reflink_copy(golden.path(), &dest).await.unwrap();

        assert!(dest.join(".code-indexer").join("config.json").exists());
        assert!(dest.join("a.txt").exists());
    }
}
