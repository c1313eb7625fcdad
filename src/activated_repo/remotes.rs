//! Dual-remote topology and the just-in-time legacy migration (§4.D).
//!
//! A correctly configured activated repository has exactly two remotes:
//! `origin` (the upstream URL, e.g. a GitHub SSH URL) and `golden` (the
//! local golden clone path). Some repositories predate this scheme and
//! still have a single `origin` pointing at the golden path directly;
//! [`migrate_legacy_remote`] repairs them on first touch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::subprocess::run_plain;

use super::ActivatedRepoError;

const LOCAL_DEADLINE: Duration = Duration::from_secs(30);

pub async fn get_remote_url(repo_path: &Path, name: &str) -> Result<Option<String>, ActivatedRepoError> {
    let out = run_plain(&["git", "remote", "get-url", name], repo_path, LOCAL_DEADLINE).await?;
    Ok(out.success().then(|| out.stdout.trim().to_string()))
}

pub async fn remote_exists(repo_path: &Path, name: &str) -> Result<bool, ActivatedRepoError> {
    Ok(get_remote_url(repo_path, name).await?.is_some())
}

pub async fn add_remote(repo_path: &Path, name: &str, url: &str) -> Result<(), ActivatedRepoError> {
    let out = run_plain(&["git", "remote", "add", name, url], repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(ActivatedRepoError::GitOperation(out.stderr));
    }
    Ok(())
}

async fn rename_remote(repo_path: &Path, from: &str, to: &str) -> Result<(), ActivatedRepoError> {
    let out = run_plain(&["git", "remote", "rename", from, to], repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(ActivatedRepoError::GitOperation(out.stderr));
    }
    Ok(())
}

/// A URL with no scheme and no `user@host` shorthand is a filesystem path.
pub fn is_local_filesystem_path(url: &str) -> bool {
    !url.contains("://") && !url.contains('@')
}

/// Sets up the dual-remote topology on a freshly activated repository.
pub async fn configure_dual_remotes(
    repo_path: &Path,
    upstream_url: &str,
    golden_path: &Path,
) -> Result<(), ActivatedRepoError> {
    add_remote(repo_path, "origin", upstream_url).await?;
    add_remote(repo_path, "golden", &golden_path.display().to_string()).await?;
    Ok(())
}

/// Repairs a single-remote legacy repository in place. Returns `true`
/// only the first time this runs for a given repository; idempotent
/// thereafter (a `golden` remote already existing short-circuits it).
pub async fn migrate_legacy_remote(repo_path: &Path) -> Result<bool, ActivatedRepoError> {
    if remote_exists(repo_path, "golden").await? {
        return Ok(false);
    }

    let Some(origin_url) = get_remote_url(repo_path, "origin").await? else {
        return Ok(false);
    };
    if !is_local_filesystem_path(&origin_url) {
        return Ok(false);
    }

    rename_remote(repo_path, "origin", "golden").await?;

    let golden_path = PathBuf::from(&origin_url);
    let upstream_url = get_remote_url(&golden_path, "origin")
        .await?
        .ok_or_else(|| {
            ActivatedRepoError::GitOperation(format!(
                "golden repository at {origin_url} has no origin remote to propagate"
            ))
        })?;

    add_remote(repo_path, "origin", &upstream_url).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_local_vs_remote_urls() {
        assert!(is_local_filesystem_path("/data/golden-repos/hello"));
        assert!(!is_local_filesystem_path("https://example.com/repo.git"));
        assert!(!is_local_filesystem_path("git@example.com:org/repo.git"));
        assert!(!is_local_filesystem_path("ssh://git@example.com/org/repo.git"));
    }

    async fn init_repo(path: &Path) {
        run_plain(&["git", "init"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.email", "test@example.com"], path, LOCAL_DEADLINE)
            .await
            .unwrap();
        run_plain(&["git", "config", "user.name", "Test"], path, LOCAL_DEADLINE).await.unwrap();
    }

    #[tokio::test]
    async fn migration_runs_once() {
        let upstream_dir = tempfile::tempdir().unwrap();
        init_repo(upstream_dir.path()).await;

        let golden_dir = tempfile::tempdir().unwrap();
        init_repo(golden_dir.path()).await;
        add_remote(golden_dir.path(), "origin", &upstream_dir.path().display().to_string())
            .await
            .unwrap();

        let activated_dir = tempfile::tempdir().unwrap();
        init_repo(activated_dir.path()).await;
        add_remote(activated_dir.path(), "origin", &golden_dir.path().display().to_string())
            .await
            .unwrap();

        let migrated = migrate_legacy_remote(activated_dir.path()).await.unwrap();
        assert!(migrated);
        assert!(remote_exists(activated_dir.path(), "golden").await.unwrap());
        let new_origin = get_remote_url(activated_dir.path(), "origin").await.unwrap().unwrap();
        assert_eq!(new_origin, upstream_dir.path().display().to_string());

        let migrated_again = migrate_legacy_remote(activated_dir.path()).await.unwrap();
        assert!(!migrated_again);
    }
}
