//! Root error type that every component error converts into at the
//! outward-facing boundary (§7). The out-of-scope HTTP adaptor layer maps
//! [`ServerError::status_hint`] onto actual status codes.

use thiserror::Error;

use crate::activated_repo::ActivatedRepoError;
use crate::file_crud::FileCrudError;
use crate::git_ops::GitOpsError;
use crate::golden_repo::GoldenRepoError;
use crate::jobs::JobError;
use crate::resource::ResourceError;

/// HTTP-mapping hint consumed by the (out-of-scope) adaptor layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusHint {
    NotFound,
    Conflict,
    BadRequest,
    Forbidden,
    Internal,
    ServiceUnavailable,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Sandbox(String),

    #[error("hash mismatch on '{path}': expected {expected}, found {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("confirmation required for '{operation}'")]
    ConfirmationRequired { operation: String, token: String },

    #[error("confirmation token invalid or expired for '{operation}'")]
    ConfirmationInvalid { operation: String },

    #[error("git operation failed: {0}")]
    GitOperation(String),

    #[error("cleanup failed: {0}")]
    Cleanup(String),

    #[error("server is in maintenance mode")]
    Maintenance,
}

impl ServerError {
    pub fn status_hint(&self) -> StatusHint {
        match self {
            ServerError::NotFound(_) => StatusHint::NotFound,
            ServerError::Conflict(_) => StatusHint::Conflict,
            ServerError::Validation(_) => StatusHint::BadRequest,
            ServerError::Sandbox(_) => StatusHint::Forbidden,
            ServerError::HashMismatch { .. } => StatusHint::Conflict,
            ServerError::ConfirmationRequired { .. } => StatusHint::BadRequest,
            ServerError::ConfirmationInvalid { .. } => StatusHint::BadRequest,
            ServerError::GitOperation(msg) => {
                if msg.to_lowercase().contains("could not resolve host")
                    || msg.to_lowercase().contains("network")
                    || msg.to_lowercase().contains("connection")
                {
                    StatusHint::ServiceUnavailable
                } else {
                    StatusHint::Internal
                }
            }
            ServerError::Cleanup(_) => StatusHint::Internal,
            ServerError::Maintenance => StatusHint::ServiceUnavailable,
        }
    }
}

impl From<GoldenRepoError> for ServerError {
    fn from(e: GoldenRepoError) -> Self {
        match e {
            GoldenRepoError::AlreadyExists(alias) => {
                ServerError::Conflict(format!("golden repository '{alias}' already exists"))
            }
            GoldenRepoError::NotFound(alias) => {
                ServerError::NotFound(format!("golden repository '{alias}' not found"))
            }
            GoldenRepoError::QuotaExceeded(max) => {
                ServerError::Conflict(format!("maximum of {max} golden repositories allowed"))
            }
            GoldenRepoError::SizeExceeded { actual, limit } => ServerError::Conflict(format!(
                "repository size ({actual} bytes) exceeds limit ({limit} bytes)"
            )),
            GoldenRepoError::Validation(msg) => ServerError::Validation(msg),
            GoldenRepoError::GitOperation(msg) => ServerError::GitOperation(msg),
            GoldenRepoError::Cleanup(msg) => ServerError::Cleanup(msg),
            GoldenRepoError::Io(e) => ServerError::GitOperation(e.to_string()),
        }
    }
}

impl From<ActivatedRepoError> for ServerError {
    fn from(e: ActivatedRepoError) -> Self {
        match e {
            ActivatedRepoError::AlreadyActivated(alias) => {
                ServerError::Conflict(format!("repository alias '{alias}' is already activated"))
            }
            ActivatedRepoError::NotFound(alias) => {
                ServerError::NotFound(format!("activated repository '{alias}' not found"))
            }
            ActivatedRepoError::GoldenNotFound(alias) => {
                ServerError::NotFound(format!("golden repository '{alias}' not found"))
            }
            ActivatedRepoError::Validation(msg) => ServerError::Validation(msg),
            ActivatedRepoError::BranchNotFound { branch, fetch_attempted } => {
                ServerError::NotFound(format!(
                    "branch '{branch}' not found (remote fetch attempted: {fetch_attempted})"
                ))
            }
            ActivatedRepoError::MergeConflict(msg) => ServerError::Conflict(msg),
            ActivatedRepoError::GitOperation(msg) => ServerError::GitOperation(msg),
            ActivatedRepoError::Io(e) => ServerError::GitOperation(e.to_string()),
        }
    }
}

impl From<FileCrudError> for ServerError {
    fn from(e: FileCrudError) -> Self {
        match e {
            FileCrudError::Sandbox(msg) => ServerError::Sandbox(msg),
            FileCrudError::FileExists(path) => {
                ServerError::Conflict(format!("file already exists: {path}"))
            }
            FileCrudError::FileNotFound(path) => {
                ServerError::NotFound(format!("file not found: {path}"))
            }
            FileCrudError::HashMismatch { path, expected, actual } => {
                ServerError::HashMismatch { path, expected, actual }
            }
            FileCrudError::NotUnique { path, count } => ServerError::Validation(format!(
                "string in '{path}' occurs {count} times; not unique"
            )),
            FileCrudError::NotFoundInFile(path) => {
                ServerError::Validation(format!("string not found in '{path}'"))
            }
            FileCrudError::Io(e) => ServerError::Cleanup(e.to_string()),
            FileCrudError::ActivatedRepo(e) => e.into(),
        }
    }
}

impl From<GitOpsError> for ServerError {
    fn from(e: GitOpsError) -> Self {
        match e {
            GitOpsError::ConfirmationRequired { operation, token } => {
                ServerError::ConfirmationRequired { operation, token }
            }
            GitOpsError::ConfirmationInvalid { operation } => {
                ServerError::ConfirmationInvalid { operation }
            }
            GitOpsError::Validation(msg) => ServerError::Validation(msg),
            GitOpsError::Command(e) => ServerError::GitOperation(e.to_string()),
            GitOpsError::ActivatedRepo(e) => e.into(),
            GitOpsError::Subprocess(e) => ServerError::GitOperation(e.to_string()),
        }
    }
}

impl From<ResourceError> for ServerError {
    fn from(e: ResourceError) -> Self {
        ServerError::Cleanup(e.to_string())
    }
}

impl From<JobError> for ServerError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::Maintenance => ServerError::Maintenance,
            JobError::NotFound(id) => ServerError::NotFound(format!("job '{id}' not found")),
            JobError::NotCancellable(status) => {
                ServerError::Conflict(format!("cannot cancel job in '{status}' status"))
            }
        }
    }
}
