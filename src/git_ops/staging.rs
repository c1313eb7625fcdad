//! Staging family: `stage`, `unstage` (§4.F).

use std::path::Path;

use crate::subprocess::run_plain;

use super::{command_failure, GitOpsError, LOCAL_DEADLINE};

pub async fn stage(repo_path: &Path, paths: &[String]) -> Result<(), GitOpsError> {
    let mut argv: Vec<&str> = vec!["git", "add"];
    if paths.is_empty() {
        argv.push(".");
    } else {
        argv.extend(paths.iter().map(|p| p.as_str()));
    }

    let out = run_plain(&argv, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(())
}

pub async fn unstage(repo_path: &Path, paths: &[String]) -> Result<(), GitOpsError> {
    let mut argv: Vec<&str> = vec!["git", "restore", "--staged"];
    if paths.is_empty() {
        argv.push(".");
    } else {
        argv.extend(paths.iter().map(|p| p.as_str()));
    }

    let out = run_plain(&argv, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo(path: &Path) {
        run_plain(&["git", "init"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.email", "t@example.com"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.name", "T"], path, LOCAL_DEADLINE).await.unwrap();
    }

    #[tokio::test]
    async fn stage_then_unstage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        tokio::fs::write(dir.path().join("a.txt"), b"x").await.unwrap();

        stage(dir.path(), &[]).await.unwrap();
        let staged = run_plain(&["git", "diff", "--cached", "--name-only"], dir.path(), LOCAL_DEADLINE).await.unwrap();
        assert_eq!(staged.stdout.trim(), "a.txt");

        unstage(dir.path(), &[]).await.unwrap();
        let staged = run_plain(&["git", "diff", "--cached", "--name-only"], dir.path(), LOCAL_DEADLINE).await.unwrap();
        assert!(staged.stdout.trim().is_empty());
    }
}
