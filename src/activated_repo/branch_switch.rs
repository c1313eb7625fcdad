//! Branch switch with prioritized fallback strategies (§4.D).

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::subprocess::run_plain;
use crate::validation::validate_branch_name;

use super::remotes::{get_remote_url, is_local_filesystem_path, migrate_legacy_remote};
use super::ActivatedRepoError;

const LOCAL_DEADLINE: Duration = Duration::from_secs(30);
const FETCH_DEADLINE: Duration = Duration::from_secs(60);

/// Switches `repo_path` to `branch`, trying remote-tracking first and
/// falling back through three weaker strategies. Returns `Ok(())` on the
/// first strategy that succeeds.
pub async fn switch_branch(repo_path: &Path, branch: &str) -> Result<(), ActivatedRepoError> {
    validate_branch_name(branch).map_err(|e| ActivatedRepoError::Validation(e.to_string()))?;

    migrate_legacy_remote(repo_path).await?;

    let fetch_attempted = should_fetch(repo_path).await?;
    let fetch_succeeded = if fetch_attempted {
        best_effort_fetch(repo_path).await
    } else {
        false
    };

    if fetch_succeeded && checkout_remote_tracking(repo_path, branch).await? {
        return Ok(());
    }
    if checkout_direct_local(repo_path, branch).await? {
        return Ok(());
    }
    if create_from_remote_ref(repo_path, branch).await? {
        return Ok(());
    }
    if force_local_reuse(repo_path, branch).await? {
        return Ok(());
    }

    Err(ActivatedRepoError::BranchNotFound {
        branch: branch.to_string(),
        fetch_attempted,
    })
}

async fn should_fetch(repo_path: &Path) -> Result<bool, ActivatedRepoError> {
    match get_remote_url(repo_path, "origin").await? {
        Some(url) => Ok(!is_local_filesystem_path(&url)),
        None => Ok(false),
    }
}

async fn best_effort_fetch(repo_path: &Path) -> bool {
    match run_plain(&["git", "fetch", "origin"], repo_path, FETCH_DEADLINE).await {
        Ok(out) if out.success() => true,
        Ok(out) => {
            debug!(target: "git_ops", stderr = %out.stderr, "best-effort fetch failed");
            false
        }
        Err(e) => {
            debug!(target: "git_ops", error = %e, "best-effort fetch errored");
            false
        }
    }
}

async fn checkout_remote_tracking(repo_path: &Path, branch: &str) -> Result<bool, ActivatedRepoError> {
    let remote_ref = format!("origin/{branch}");
    let out = run_plain(&["git", "checkout", "-B", branch, &remote_ref], repo_path, LOCAL_DEADLINE).await?;
    Ok(out.success())
}

async fn checkout_direct_local(repo_path: &Path, branch: &str) -> Result<bool, ActivatedRepoError> {
    let out = run_plain(&["git", "checkout", branch], repo_path, LOCAL_DEADLINE).await?;
    Ok(out.success())
}

async fn create_from_remote_ref(repo_path: &Path, branch: &str) -> Result<bool, ActivatedRepoError> {
    let remote_ref = format!("refs/remotes/origin/{branch}");
    let show = run_plain(&["git", "show-ref", "--verify", "--quiet", &remote_ref], repo_path, LOCAL_DEADLINE).await?;
    if !show.success() {
        return Ok(false);
    }
    let tracking_ref = format!("origin/{branch}");
    let out = run_plain(&["git", "checkout", "-b", branch, &tracking_ref], repo_path, LOCAL_DEADLINE).await?;
    Ok(out.success())
}

async fn force_local_reuse(repo_path: &Path, branch: &str) -> Result<bool, ActivatedRepoError> {
    let show = run_plain(&["git", "show-ref", branch], repo_path, LOCAL_DEADLINE).await?;
    if !show.success() {
        return Ok(false);
    }
    let out = run_plain(&["git", "checkout", "-B", branch], repo_path, LOCAL_DEADLINE).await?;
    Ok(out.success())
}
