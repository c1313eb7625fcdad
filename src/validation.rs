//! Shared grammar validators: aliases, branch names, emails and display
//! names. Kept in one place so the regexes in §6 of the spec have exactly
//! one implementation each.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("alias '{0}' must match [A-Za-z0-9._-]+ and must not contain '..', '/', or '\\'")]
    InvalidAlias(String),

    #[error(
        "branch name '{0}' must match [A-Za-z0-9/_.-]+, not start with '-', not end with '.lock', and not contain '..'"
    )]
    InvalidBranch(String),

    #[error("invalid email format: {0}")]
    InvalidEmail(String),

    #[error("invalid name '{0}': only letters, digits, spaces, hyphens, and underscores are allowed")]
    InvalidName(String),
}

static ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());
static BRANCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9/_.-]+$").unwrap());
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9 _-]+$").unwrap());

/// Validates a golden- or user-alias: `[A-Za-z0-9._-]+`, no `..`, `/`, `\`.
pub fn validate_alias(alias: &str) -> Result<(), ValidationError> {
    if alias.is_empty()
        || !ALIAS_RE.is_match(alias)
        || alias.contains("..")
        || alias.contains('/')
        || alias.contains('\\')
    {
        return Err(ValidationError::InvalidAlias(alias.to_string()));
    }
    Ok(())
}

/// Validates a git branch name per §6's grammar.
pub fn validate_branch_name(branch: &str) -> Result<(), ValidationError> {
    if branch.is_empty()
        || !BRANCH_RE.is_match(branch)
        || branch.starts_with('-')
        || branch.ends_with(".lock")
        || branch.contains("..")
    {
        return Err(ValidationError::InvalidBranch(branch.to_string()));
    }
    Ok(())
}

/// Validates an RFC-5322-ish email address (same simplified pattern as the
/// original commit-attribution check).
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email) {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

/// Validates a display name: letters, digits, spaces, hyphens, underscores.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || !NAME_RE.is_match(name) {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Derives a display name from the local part of an email address.
pub fn name_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}
