//! Dual-attribution commits (§4.F): the end user is the git *author*, a
//! fixed service identity is the *committer*, and the message carries an
//! audit trailer that cannot be forged by the caller.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::subprocess::run;
use crate::validation::{name_from_email, validate_display_name, validate_email};

use super::{CommandFailure, GitOpsError};

const COMMIT_DEADLINE: Duration = Duration::from_secs(30);

/// Strips any pre-existing `Actual-Author:` / `Committed-Via:` lines from
/// a caller-supplied message — trailer forgery defense — then appends the
/// real trailers.
pub fn sanitize_and_stamp(message: &str, author_email: &str) -> String {
    let cleaned: Vec<&str> = message
        .lines()
        .filter(|line| !line.starts_with("Actual-Author:") && !line.starts_with("Committed-Via:"))
        .collect();
    let mut body = cleaned.join("\n");
    while body.ends_with('\n') {
        body.pop();
    }
    format!("{body}\n\nActual-Author: {author_email}\nCommitted-Via: CIDX API")
}

pub struct CommitResult {
    pub commit_hash: String,
}

pub async fn commit_with_dual_attribution(
    repo_path: &Path,
    message: &str,
    author_email: &str,
    author_name: Option<&str>,
    committer_name: &str,
    committer_email: &str,
) -> Result<CommitResult, GitOpsError> {
    validate_email(author_email).map_err(|e| GitOpsError::Validation(e.to_string()))?;
    let author_name = match author_name {
        Some(name) => {
            validate_display_name(name).map_err(|e| GitOpsError::Validation(e.to_string()))?;
            name.to_string()
        }
        None => name_from_email(author_email),
    };

    let stamped = sanitize_and_stamp(message, author_email);

    let mut env = HashMap::new();
    env.insert("GIT_AUTHOR_NAME".to_string(), author_name);
    env.insert("GIT_AUTHOR_EMAIL".to_string(), author_email.to_string());
    env.insert("GIT_COMMITTER_NAME".to_string(), committer_name.to_string());
    env.insert("GIT_COMMITTER_EMAIL".to_string(), committer_email.to_string());

    let commit_argv = ["git", "commit", "-m", &stamped];
    let out = run(&commit_argv, repo_path, Some(&env), COMMIT_DEADLINE).await?;
    if !out.success() {
        return Err(GitOpsError::Command(CommandFailure {
            argv: commit_argv.join(" "),
            cwd: repo_path.to_path_buf(),
            exit_code: out.exit_code,
            stderr: out.stderr,
        }));
    }

    let rev_argv = ["git", "rev-parse", "HEAD"];
    let rev = run(&rev_argv, repo_path, None, COMMIT_DEADLINE).await?;
    if !rev.success() {
        return Err(GitOpsError::Command(CommandFailure {
            argv: rev_argv.join(" "),
            cwd: repo_path.to_path_buf(),
            exit_code: rev.exit_code,
            stderr: rev.stderr,
        }));
    }

    Ok(CommitResult { commit_hash: rev.stdout.trim().to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_forged_trailers_and_appends_real_ones() {
        let message = "fix bug\n\nActual-Author: attacker@evil.com\nCommitted-Via: something else";
        let stamped = sanitize_and_stamp(message, "real@example.com");
        assert_eq!(stamped.matches("Actual-Author:").count(), 1);
        assert!(stamped.contains("Actual-Author: real@example.com"));
        assert!(stamped.contains("Committed-Via: CIDX API"));
        assert!(!stamped.contains("attacker@evil.com"));
    }

    #[test]
    fn preserves_legitimate_message_body() {
        let stamped = sanitize_and_stamp("fix the thing", "u@example.com");
        assert!(stamped.starts_with("fix the thing\n\n"));
    }
}
