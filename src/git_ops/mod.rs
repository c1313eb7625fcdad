//! Git Operations Service (§4.F): five operation families — inspection,
//! staging, remote, recovery, branch — plus the confirmation-token
//! protocol that gates destructive commands and the dual-attribution
//! commit path.

pub mod branch;
pub mod commit;
pub mod inspection;
pub mod recovery;
pub mod remote;
pub mod staging;
pub mod tokens;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::activated_repo::ActivatedRepoError;
use crate::config::ServerConfig;
use crate::subprocess::{CommandOutput, SubprocessError};

pub use tokens::TokenCache;

/// Local operations (status, diff, log, staging, branch) get 30 s;
/// network operations (fetch, push, pull) get 300 s.
pub const LOCAL_DEADLINE: Duration = Duration::from_secs(30);
pub const REMOTE_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub argv: String,
    pub cwd: PathBuf,
    pub exit_code: i32,
    pub stderr: String,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` in {} exited with {}: {}",
            self.argv,
            self.cwd.display(),
            self.exit_code,
            self.stderr.trim()
        )
    }
}

pub(crate) fn command_failure(argv: &[&str], cwd: &Path, out: &CommandOutput) -> GitOpsError {
    GitOpsError::Command(CommandFailure {
        argv: argv.join(" "),
        cwd: cwd.to_path_buf(),
        exit_code: out.exit_code,
        stderr: out.stderr.clone(),
    })
}

#[derive(Debug, Error)]
pub enum GitOpsError {
    #[error("operation '{operation}' requires confirmation; token issued: {token}")]
    ConfirmationRequired { operation: String, token: String },

    #[error("confirmation token for '{operation}' is missing, expired, or already used")]
    ConfirmationInvalid { operation: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Command(CommandFailure),

    #[error(transparent)]
    ActivatedRepo(#[from] ActivatedRepoError),

    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
}

/// Operations that mutate history or discard work irreversibly and
/// therefore require a confirmation token before executing.
pub const DESTRUCTIVE_OPERATIONS: &[&str] = &["reset_hard", "clean_fd", "branch_delete"];

/// Wires the token cache and committer identity together and dispatches
/// the 17 git operations. Thin by design: each family module holds the
/// actual git invocation logic; this struct is the confirmation-token
/// gate and the one place that knows the service's committer identity.
pub struct GitOpsService {
    tokens: TokenCache,
    committer_name: String,
    committer_email: String,
}

impl GitOpsService {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            tokens: TokenCache::new(config.confirmation_token_ttl),
            committer_name: config.service_committer_name.clone(),
            committer_email: config.service_committer_email.clone(),
        }
    }

    pub fn committer_name(&self) -> &str {
        &self.committer_name
    }

    pub fn committer_email(&self) -> &str {
        &self.committer_email
    }

    /// Issues a confirmation token for `operation`, to be echoed back on
    /// the follow-up call that actually performs the destructive action.
    pub async fn request_confirmation(&self, operation: &str) -> GitOpsError {
        let token = self.tokens.generate(operation).await;
        GitOpsError::ConfirmationRequired { operation: operation.to_string(), token }
    }

    /// Gate helper for destructive operations: consumes `token` if valid,
    /// otherwise returns `ConfirmationInvalid`. Call at the top of any
    /// handler for an operation listed in [`DESTRUCTIVE_OPERATIONS`].
    pub async fn require_confirmation(&self, operation: &str, token: Option<&str>) -> Result<(), GitOpsError> {
        let ok = match token {
            Some(t) => self.tokens.validate_and_consume(operation, t).await,
            None => false,
        };
        if ok {
            Ok(())
        } else {
            Err(GitOpsError::ConfirmationInvalid { operation: operation.to_string() })
        }
    }

    pub async fn commit(
        &self,
        repo_path: &Path,
        message: &str,
        author_email: &str,
        author_name: Option<&str>,
    ) -> Result<commit::CommitResult, GitOpsError> {
        commit::commit_with_dual_attribution(
            repo_path,
            message,
            author_email,
            author_name,
            &self.committer_name,
            &self.committer_email,
        )
        .await
    }

    /// Issues a token on first call (`token` is `None`); on the follow-up
    /// call with the echoed token, discards history back to `revision`.
    pub async fn reset_hard(&self, repo_path: &Path, revision: &str, token: Option<&str>) -> Result<(), GitOpsError> {
        match token {
            None => Err(self.request_confirmation("reset_hard").await),
            Some(t) => {
                self.require_confirmation("reset_hard", Some(t)).await?;
                recovery::reset_hard(repo_path, revision).await
            }
        }
    }

    /// Issues a token on first call; on the follow-up call, removes
    /// untracked files and directories.
    pub async fn clean_fd(&self, repo_path: &Path, token: Option<&str>) -> Result<String, GitOpsError> {
        match token {
            None => Err(self.request_confirmation("clean_fd").await),
            Some(t) => {
                self.require_confirmation("clean_fd", Some(t)).await?;
                recovery::clean_fd(repo_path).await
            }
        }
    }

    /// Issues a token on first call; on the follow-up call, deletes the
    /// local branch (`-D` when `force` is set).
    pub async fn branch_delete(
        &self,
        repo_path: &Path,
        branch: &str,
        force: bool,
        token: Option<&str>,
    ) -> Result<(), GitOpsError> {
        match token {
            None => Err(self.request_confirmation("branch_delete").await),
            Some(t) => {
                self.require_confirmation("branch_delete", Some(t)).await?;
                branch::branch_delete(repo_path, branch, force).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn destructive_operation_requires_matching_token() {
        let config = ServerConfig::default();
        let service = GitOpsService::new(&config);

        let err = service.request_confirmation("reset_hard").await;
        let token = match err {
            GitOpsError::ConfirmationRequired { token, .. } => token,
            other => panic!("unexpected: {other:?}"),
        };

        assert!(service.require_confirmation("reset_hard", Some(&token)).await.is_ok());
        assert!(service.require_confirmation("reset_hard", Some(&token)).await.is_err());
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let config = ServerConfig::default();
        let service = GitOpsService::new(&config);
        assert!(service.require_confirmation("clean_fd", None).await.is_err());
    }
}
