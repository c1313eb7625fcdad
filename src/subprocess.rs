//! Single primitive for running external processes (`git`, `cidx`, `cp`)
//! with an explicit working directory, environment and deadline.
//!
//! Every caller in this crate translates the resulting [`CommandOutput`]
//! into a component-specific error at the boundary; nothing upstream of
//! this module sees a raw [`std::io::Error`] or [`tokio::time::error::Elapsed`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Outcome of a completed subprocess invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Error raised by [`run`] itself (not by the command's own exit status,
/// which callers inspect via [`CommandOutput::exit_code`]).
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("command `{argv}` in {cwd} timed out after {timeout_secs}s")]
    Timeout {
        argv: String,
        cwd: PathBuf,
        timeout_secs: u64,
    },

    #[error("failed to spawn `{argv}` in {cwd}: {source}")]
    Spawn {
        argv: String,
        cwd: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Run `argv[0] argv[1..]` with working directory `cwd`, optional
/// environment overrides, bounded by `deadline`.
///
/// Never inherits the caller's current directory implicitly: `cwd` is
/// always passed explicitly to the child process (§6).
pub async fn run(
    argv: &[&str],
    cwd: &Path,
    env: Option<&HashMap<String, String>>,
    deadline: Duration,
) -> Result<CommandOutput, SubprocessError> {
    let mut cmd = tokio::process::Command::new(argv[0]);
    cmd.args(&argv[1..]);
    cmd.current_dir(cwd);
    cmd.kill_on_drop(true);
    if let Some(env) = env {
        for (k, v) in env {
            cmd.env(k, v);
        }
    }

    let argv_joined = argv.join(" ");

    let spawn_result = cmd.output();
    let output = match tokio::time::timeout(deadline, spawn_result).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(SubprocessError::Spawn {
                argv: argv_joined,
                cwd: cwd.to_path_buf(),
                source,
            });
        }
        Err(_elapsed) => {
            return Err(SubprocessError::Timeout {
                argv: argv_joined,
                cwd: cwd.to_path_buf(),
                timeout_secs: deadline.as_secs(),
            });
        }
    };

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Convenience for invocations with no environment overrides.
pub async fn run_plain(
    argv: &[&str],
    cwd: &Path,
    deadline: Duration,
) -> Result<CommandOutput, SubprocessError> {
    run(argv, cwd, None, deadline).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_plain(&["echo", "hello"], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_plain(&["false"], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 1);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_plain(&["sleep", "5"], dir.path(), Duration::from_millis(50)).await;
        assert!(matches!(result, Err(SubprocessError::Timeout { .. })));
    }
}
