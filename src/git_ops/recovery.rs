//! Recovery family: `reset`, `clean`, `merge_abort`, `checkout_file`
//! (§4.F). `reset --hard` and `clean -fd` discard work irreversibly and
//! are gated behind a confirmation token at the [`super::GitOpsService`]
//! dispatch layer — the functions here perform the git invocation only.

use std::path::Path;

use crate::subprocess::run_plain;

use super::{command_failure, GitOpsError, LOCAL_DEADLINE};

pub async fn reset_hard(repo_path: &Path, revision: &str) -> Result<(), GitOpsError> {
    let argv = ["git", "reset", "--hard", revision];
    let out = run_plain(&argv, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(())
}

pub async fn reset_soft(repo_path: &Path, revision: &str) -> Result<(), GitOpsError> {
    let argv = ["git", "reset", "--soft", revision];
    let out = run_plain(&argv, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(())
}

pub async fn clean_fd(repo_path: &Path) -> Result<String, GitOpsError> {
    let argv = ["git", "clean", "-fd"];
    let out = run_plain(&argv, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(out.stdout)
}

pub async fn merge_abort(repo_path: &Path) -> Result<(), GitOpsError> {
    let argv = ["git", "merge", "--abort"];
    let out = run_plain(&argv, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(())
}

pub async fn checkout_file(repo_path: &Path, revision: &str, path: &str) -> Result<(), GitOpsError> {
    let argv = ["git", "checkout", revision, "--", path];
    let out = run_plain(&argv, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo_with_commit(path: &Path) {
        run_plain(&["git", "init"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.email", "t@example.com"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.name", "T"], path, LOCAL_DEADLINE).await.unwrap();
        tokio::fs::write(path.join("a.txt"), b"one").await.unwrap();
        run_plain(&["git", "add", "."], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "commit", "-m", "first"], path, LOCAL_DEADLINE).await.unwrap();
    }

    #[tokio::test]
    async fn reset_hard_discards_dirty_changes() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path()).await;
        tokio::fs::write(dir.path().join("a.txt"), b"dirty").await.unwrap();

        reset_hard(dir.path(), "HEAD").await.unwrap();

        let content = tokio::fs::read_to_string(dir.path().join("a.txt")).await.unwrap();
        assert_eq!(content, "one");
    }

    #[tokio::test]
    async fn clean_fd_removes_untracked_file() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path()).await;
        tokio::fs::write(dir.path().join("untracked.txt"), b"x").await.unwrap();

        clean_fd(dir.path()).await.unwrap();

        assert!(!dir.path().join("untracked.txt").exists());
    }
}
