//! Status/inspection family: `status`, `diff`, `log` (§4.F).

use std::path::Path;

use serde::Serialize;

use crate::subprocess::run_plain;

use super::{command_failure, GitOpsError, LOCAL_DEADLINE};

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub branch: String,
    pub staged: Vec<String>,
    pub unstaged: Vec<String>,
    pub untracked: Vec<String>,
}

pub async fn status(repo_path: &Path) -> Result<StatusResult, GitOpsError> {
    let argv = ["git", "status", "--porcelain=v1", "-b"];
    let out = run_plain(&argv, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv, repo_path, &out));
    }

    let mut branch = String::new();
    let mut staged = Vec::new();
    let mut unstaged = Vec::new();
    let mut untracked = Vec::new();

    for line in out.stdout.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            branch = rest.split("...").next().unwrap_or(rest).to_string();
            continue;
        }
        if line.len() < 3 {
            continue;
        }
        let (index_state, worktree_state) = (&line[0..1], &line[1..2]);
        let path = line[3..].to_string();
        if index_state == "?" && worktree_state == "?" {
            untracked.push(path);
        } else {
            if index_state != " " {
                staged.push(path.clone());
            }
            if worktree_state != " " {
                unstaged.push(path);
            }
        }
    }

    Ok(StatusResult { branch, staged, unstaged, untracked })
}

/// Supports `-U<n>`, `--stat`, a single revision or `A..B` range, and a
/// trailing path limiter separated by `--`.
pub async fn diff(
    repo_path: &Path,
    revision_spec: Option<&str>,
    stat: bool,
    context_lines: Option<u32>,
    path_limiter: Option<&str>,
) -> Result<String, GitOpsError> {
    let mut argv: Vec<String> = vec!["git".to_string(), "diff".to_string()];
    if stat {
        argv.push("--stat".to_string());
    }
    if let Some(n) = context_lines {
        argv.push(format!("-U{n}"));
    }
    if let Some(spec) = revision_spec {
        argv.push(spec.to_string());
    }
    if let Some(path) = path_limiter {
        argv.push("--".to_string());
        argv.push(path.to_string());
    }

    let argv_refs: Vec<&str> = argv.iter().map(|s| s.as_str()).collect();
    let out = run_plain(&argv_refs, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv_refs, repo_path, &out));
    }
    Ok(out.stdout)
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub hash: String,
    pub author: String,
    pub email: String,
    pub date: String,
    pub subject: String,
}

const LOG_FORMAT: &str = r#"{"hash":"%H","author":"%an","email":"%ae","date":"%aI","subject":"%s"}"#;

#[derive(Debug, Default, Clone)]
pub struct LogFilters<'a> {
    pub limit: Option<u32>,
    pub since: Option<&'a str>,
    pub until: Option<&'a str>,
    pub author: Option<&'a str>,
    pub branch: Option<&'a str>,
    pub path_limiter: Option<&'a str>,
}

pub async fn log(repo_path: &Path, filters: LogFilters<'_>) -> Result<Vec<LogEntry>, GitOpsError> {
    let mut argv: Vec<String> = vec!["git".to_string(), "log".to_string(), format!("--format={LOG_FORMAT}")];
    if let Some(n) = filters.limit {
        argv.push(format!("-n{n}"));
    }
    if let Some(since) = filters.since {
        argv.push(format!("--since={since}"));
    }
    if let Some(until) = filters.until {
        argv.push(format!("--until={until}"));
    }
    if let Some(author) = filters.author {
        argv.push(format!("--author={author}"));
    }
    if let Some(branch) = filters.branch {
        argv.push(branch.to_string());
    }
    if let Some(path) = filters.path_limiter {
        argv.push("--".to_string());
        argv.push(path.to_string());
    }

    let argv_refs: Vec<&str> = argv.iter().map(|s| s.as_str()).collect();
    let out = run_plain(&argv_refs, repo_path, LOCAL_DEADLINE).await?;
    if !out.success() {
        return Err(command_failure(&argv_refs, repo_path, &out));
    }

    let mut entries = Vec::new();
    for line in out.stdout.lines().filter(|l| !l.trim().is_empty()) {
        if let Ok(entry) = serde_json::from_str::<LogEntry>(line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

impl<'de> serde::Deserialize<'de> for LogEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Raw {
            hash: String,
            author: String,
            email: String,
            date: String,
            subject: String,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(LogEntry { hash: raw.hash, author: raw.author, email: raw.email, date: raw.date, subject: raw.subject })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo_with_commits(path: &Path) {
        run_plain(&["git", "init"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.email", "t@example.com"], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "config", "user.name", "T"], path, LOCAL_DEADLINE).await.unwrap();
        tokio::fs::write(path.join("a.txt"), b"one").await.unwrap();
        run_plain(&["git", "add", "."], path, LOCAL_DEADLINE).await.unwrap();
        run_plain(&["git", "commit", "-m", "first-commit"], path, LOCAL_DEADLINE).await.unwrap();
    }

    #[tokio::test]
    async fn status_reports_untracked_file() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commits(dir.path()).await;
        tokio::fs::write(dir.path().join("b.txt"), b"new").await.unwrap();

        let result = status(dir.path()).await.unwrap();
        assert_eq!(result.untracked, vec!["b.txt".to_string()]);
    }

    #[tokio::test]
    async fn log_parses_one_entry_per_commit() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commits(dir.path()).await;

        let entries = log(dir.path(), LogFilters::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].subject, "first-commit");
    }
}
