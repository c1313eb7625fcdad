//! Remote family: `push`, `pull`, `fetch` (§4.F). Each triggers the
//! just-in-time dual-remote migration before touching remotes.

use std::path::Path;

use regex::Regex;
use std::sync::LazyLock;

use crate::activated_repo::remotes::migrate_legacy_remote;
use crate::subprocess::run_plain;

use super::{command_failure, GitOpsError, REMOTE_DEADLINE};

static CONFLICT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CONFLICT.*Merge conflict in (.+)").unwrap());

#[derive(Debug, Clone, serde::Serialize)]
pub struct PullResult {
    pub success: bool,
    pub conflicts: Vec<String>,
    pub output: String,
}

pub async fn fetch(repo_path: &Path, remote: &str) -> Result<String, GitOpsError> {
    migrate_legacy_remote(repo_path).await?;
    let argv = ["git", "fetch", remote];
    let out = run_plain(&argv, repo_path, REMOTE_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(out.stdout)
}

pub async fn push(repo_path: &Path, remote: &str, branch: &str, force: bool) -> Result<String, GitOpsError> {
    migrate_legacy_remote(repo_path).await?;
    let mut argv: Vec<&str> = vec!["git", "push"];
    if force {
        argv.push("--force");
    }
    argv.push(remote);
    argv.push(branch);

    let out = run_plain(&argv, repo_path, REMOTE_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }
    Ok(out.stdout)
}

pub async fn pull(repo_path: &Path, remote: &str, branch: &str) -> Result<PullResult, GitOpsError> {
    migrate_legacy_remote(repo_path).await?;
    let argv = ["git", "pull", remote, branch];
    let out = run_plain(&argv, repo_path, REMOTE_DEADLINE).await?;

    let combined = out.combined();
    let conflicts: Vec<String> = CONFLICT_RE
        .captures_iter(&combined)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .collect();

    if !out.success() && conflicts.is_empty() {
        return Err(command_failure(&argv, repo_path, &out));
    }

    Ok(PullResult { success: conflicts.is_empty() && out.success(), conflicts, output: combined })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conflict_paths() {
        let output = "Auto-merging a.txt\nCONFLICT (content): Merge conflict in a.txt\nAutomatic merge failed";
        let conflicts: Vec<String> =
            CONFLICT_RE.captures_iter(output).filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string())).collect();
        assert_eq!(conflicts, vec!["a.txt".to_string()]);
    }
}
