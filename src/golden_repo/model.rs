//! `GoldenRepository` records and their on-disk metadata document (§3).

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenRepository {
    pub alias: String,
    pub repo_url: String,
    pub default_branch: String,
    pub clone_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub enable_temporal: bool,
    pub temporal_options: Option<serde_json::Value>,
}

/// The single metadata document, keyed by alias, rewritten atomically on
/// every registration and removal.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GoldenRepoMetadata {
    pub repos: HashMap<String, GoldenRepository>,
}

/// A source URL is a remote if it names a scheme other than `file://` and
/// is not an absolute filesystem path (§4.C "Cloning rules").
pub fn is_remote_source(repo_url: &str) -> bool {
    !repo_url.starts_with("file://") && !PathBuf::from(repo_url).is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_source_kind() {
        assert!(is_remote_source("https://example.com/repo.git"));
        assert!(is_remote_source("git@example.com:org/repo.git"));
        assert!(!is_remote_source("/tmp/fixture.git"));
        assert!(!is_remote_source("file:///tmp/fixture.git"));
    }
}
