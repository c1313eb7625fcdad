//! `ActivatedRepository` sidecar metadata (§3): the record lives entirely
//! on disk, one JSON file per activation, never in a shared document.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivatedRepoMetadata {
    pub user_alias: String,
    pub golden_repo_alias: String,
    pub current_branch: String,
    pub activated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

pub fn repo_dir(activated_repos_dir: &Path, username: &str, user_alias: &str) -> PathBuf {
    activated_repos_dir.join(username).join(user_alias)
}

pub fn metadata_path(activated_repos_dir: &Path, username: &str, user_alias: &str) -> PathBuf {
    activated_repos_dir
        .join(username)
        .join(format!("{user_alias}_metadata.json"))
}

/// An activation is only "live" when both the directory and the sidecar
/// file exist (§3 invariant).
pub fn is_live(activated_repos_dir: &Path, username: &str, user_alias: &str) -> bool {
    repo_dir(activated_repos_dir, username, user_alias).is_dir()
        && metadata_path(activated_repos_dir, username, user_alias).is_file()
}

pub async fn write_metadata(
    activated_repos_dir: &Path,
    username: &str,
    user_alias: &str,
    metadata: &ActivatedRepoMetadata,
) -> Result<(), std::io::Error> {
    let path = metadata_path(activated_repos_dir, username, user_alias);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;
    let tmp = dir.join(format!(".{user_alias}_metadata.tmp-{}", uuid::Uuid::new_v4()));
    let serialized = serde_json::to_vec_pretty(metadata).expect("metadata serializes");
    tokio::fs::write(&tmp, &serialized).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

pub async fn read_metadata(
    activated_repos_dir: &Path,
    username: &str,
    user_alias: &str,
) -> Result<ActivatedRepoMetadata, std::io::Error> {
    let path = metadata_path(activated_repos_dir, username, user_alias);
    let contents = tokio::fs::read_to_string(&path).await?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let meta = ActivatedRepoMetadata {
            user_alias: "work".to_string(),
            golden_repo_alias: "hello".to_string(),
            current_branch: "main".to_string(),
            activated_at: Utc::now(),
            last_accessed: Utc::now(),
        };
        write_metadata(dir.path(), "alice", "work", &meta).await.unwrap();
        let loaded = read_metadata(dir.path(), "alice", "work").await.unwrap();
        assert_eq!(loaded.user_alias, "work");
    }
}
