//! Branch family: `branch_list`, `branch_create`, `branch_switch`,
//! `branch_delete` (§4.F). Switching reuses the same fallback ladder the
//! activation workflow uses; `branch -d` is gated behind a confirmation
//! token at the [`super::GitOpsService`] dispatch layer.

use std::path::Path;

use crate::activated_repo::branch_switch::switch_branch as activated_switch_branch;
use crate::subprocess::run_plain;
use crate::validation::validate_branch_name;

use super::{command_failure, GitOpsError, LOCAL_DEADLINE};

pub async fn branch_list(repo_path: &Path) -> Result<Vec<String>, GitOpsError> {
    let argv = ["git", "branch", "--format=%(refname:short)"];
    let out = run_plain(&argv, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(out.stdout.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
}

pub async fn branch_create(repo_path: &Path, branch: &str, from_ref: Option<&str>) -> Result<(), GitOpsError> {
    validate_branch_name(branch).map_err(|e| GitOpsError::Validation(e.to_string()))?;

    let mut argv: Vec<&str> = vec!["git", "branch", branch];
    if let Some(start_point) = from_ref {
        argv.push(start_point);
    }

    let out = run_plain(&argv, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(())
}

/// Delegates to the activation workflow's fallback ladder (§4.D) so the
/// two entry points to "switch this working tree to a branch" behave
/// identically.
pub async fn branch_switch(repo_path: &Path, branch: &str) -> Result<(), GitOpsError> {
    activated_switch_branch(repo_path, branch).await.map_err(GitOpsError::from)
}

pub async fn branch_delete(repo_path: &Path, branch: &str, force: bool) -> Result<(), GitOpsError> {
    validate_branch_name(branch).map_err(|e| GitOpsError::Validation(e.to_string()))?;

    let flag = if force { "-D" } else { "-d" };
    let argv = ["git", "branch", flag, branch];
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
        tokio::fs::write(path.join("a.txt"), b"hi").await.unwrap();
        run_plain(&["git", "add", "."], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "commit", "-m", "init"], path, LOCAL_DEADLINE).await.unwrap();
    }

    #[tokio::test]
    async fn create_then_list_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path()).await;

        branch_create(dir.path(), "feature", None).await.unwrap();
        let branches = branch_list(dir.path()).await.unwrap();
        assert!(branches.contains(&"feature".to_string()));

        branch_delete(dir.path(), "feature", false).await.unwrap();
        let branches = branch_list(dir.path()).await.unwrap();
        assert!(!branches.contains(&"feature".to_string()));
    }

    #[tokio::test]
    async fn invalid_branch_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path()).await;
        let result = branch_create(dir.path(), "-evil", None).await;
        assert!(matches!(result, Err(GitOpsError::Validation(_))));
    }
}
