//! File CRUD Service (§4.E): sandboxed, hash-locked file operations
//! against an activated repository's working tree.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::activated_repo::{model as activated_model, ActivatedRepoError};
use crate::config::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum FileCrudError {
    #[error("{0}")]
    Sandbox(String),
    #[error("file already exists: {0}")]
    FileExists(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("hash mismatch on '{path}': expected {expected}, found {actual}")]
    HashMismatch { path: String, expected: String, actual: String },
    #[error("string in '{path}' occurs {count} times; not unique")]
    NotUnique { path: String, count: usize },
    #[error("string not found in '{0}'")]
    NotFoundInFile(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ActivatedRepo(#[from] ActivatedRepoError),
}

#[derive(Debug, Clone)]
pub struct FileWriteResult {
    pub hash: String,
    pub size: u64,
    pub at: DateTime<Utc>,
}

/// Rejects `.git` as a path *component*, `..` components, and absolute
/// paths; returns the resolved path, verified to still be under `root`.
pub fn sandbox_resolve(root: &Path, relative_path: &str) -> Result<PathBuf, FileCrudError> {
    let candidate = Path::new(relative_path);
    if candidate.is_absolute() {
        return Err(FileCrudError::Sandbox(format!("absolute paths are not allowed: {relative_path}")));
    }

    for component in candidate.components() {
        match component {
            Component::Normal(part) if part == ".git" => {
                return Err(FileCrudError::Sandbox(format!(
                    "path component '.git' is not allowed: {relative_path}"
                )));
            }
            Component::ParentDir => {
                return Err(FileCrudError::Sandbox(format!(
                    "'..' is not allowed in paths: {relative_path}"
                )));
            }
            Component::Normal(_) | Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(FileCrudError::Sandbox(format!("absolute paths are not allowed: {relative_path}")));
            }
        }
    }

    let resolved = root.join(candidate);
    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let canonical_target = resolved
        .parent()
        .and_then(|p| p.canonicalize().ok())
        .map(|p| p.join(resolved.file_name().unwrap_or_default()))
        .unwrap_or_else(|| resolved.clone());

    if !canonical_target.starts_with(&canonical_root) {
        return Err(FileCrudError::Sandbox(format!(
            "resolved path escapes the repository root: {relative_path}"
        )));
    }

    Ok(resolved)
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), std::io::Error> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;
    let tmp = dir.join(format!(".{}.tmp-{}", file_name(path), Uuid::new_v4()));

    let write_result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        use tokio::io::AsyncWriteExt;
        file.write_all(contents).await?;
        file.sync_all().await?;
        Ok::<(), std::io::Error>(())
    }
    .await;

    if let Err(e) = write_result {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(e);
    }

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "file".to_string())
}

pub struct FileCrudService {
    config: std::sync::Arc<ServerConfig>,
}

impl FileCrudService {
    pub fn new(config: std::sync::Arc<ServerConfig>) -> Self {
        Self { config }
    }

    async fn repo_root(&self, username: &str, repo_alias: &str) -> Result<PathBuf, FileCrudError> {
        let activated_dir = self.config.activated_repos_dir();
        if !activated_model::is_live(&activated_dir, username, repo_alias) {
            return Err(FileCrudError::ActivatedRepo(ActivatedRepoError::NotFound(repo_alias.to_string())));
        }
        Ok(activated_model::repo_dir(&activated_dir, username, repo_alias))
    }

    pub async fn create(
        &self,
        username: &str,
        repo_alias: &str,
        relative_path: &str,
        content: &[u8],
    ) -> Result<FileWriteResult, FileCrudError> {
        let root = self.repo_root(username, repo_alias).await?;
        let target = sandbox_resolve(&root, relative_path)?;

        if target.exists() {
            return Err(FileCrudError::FileExists(relative_path.to_string()));
        }
        write_atomic(&target, content).await?;

        Ok(FileWriteResult { hash: content_hash(content), size: content.len() as u64, at: Utc::now() })
    }

    pub async fn edit(
        &self,
        username: &str,
        repo_alias: &str,
        relative_path: &str,
        old: &str,
        new: &str,
        expected_hash: &str,
        replace_all: bool,
    ) -> Result<FileWriteResult, FileCrudError> {
        let root = self.repo_root(username, repo_alias).await?;
        let target = sandbox_resolve(&root, relative_path)?;

        let bytes = tokio::fs::read(&target)
            .await
            .map_err(|_| FileCrudError::FileNotFound(relative_path.to_string()))?;
        let actual_hash = content_hash(&bytes);
        if actual_hash != expected_hash {
            return Err(FileCrudError::HashMismatch {
                path: relative_path.to_string(),
                expected: expected_hash.to_string(),
                actual: actual_hash,
            });
        }

        let text = String::from_utf8_lossy(&bytes);
        let occurrences = text.matches(old).count();
        if occurrences == 0 {
            return Err(FileCrudError::NotFoundInFile(relative_path.to_string()));
        }
        if !replace_all && occurrences != 1 {
            return Err(FileCrudError::NotUnique { path: relative_path.to_string(), count: occurrences });
        }

        let updated = if replace_all {
            text.replace(old, new)
        } else {
            text.replacen(old, new, 1)
        };

        write_atomic(&target, updated.as_bytes()).await?;
        Ok(FileWriteResult { hash: content_hash(updated.as_bytes()), size: updated.len() as u64, at: Utc::now() })
    }

    pub async fn delete(
        &self,
        username: &str,
        repo_alias: &str,
        relative_path: &str,
        expected_hash: Option<&str>,
    ) -> Result<DateTime<Utc>, FileCrudError> {
        let root = self.repo_root(username, repo_alias).await?;
        let target = sandbox_resolve(&root, relative_path)?;

        if !target.exists() {
            return Err(FileCrudError::FileNotFound(relative_path.to_string()));
        }

        if let Some(expected) = expected_hash {
            let bytes = tokio::fs::read(&target).await?;
            let actual = content_hash(&bytes);
            if actual != expected {
                return Err(FileCrudError::HashMismatch {
                    path: relative_path.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        tokio::fs::remove_file(&target).await?;
        Ok(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_git_directory_component_but_allows_gitignore() {
        let root = PathBuf::from("/repo");
        assert!(sandbox_resolve(&root, ".gitignore").is_ok());
        assert!(sandbox_resolve(&root, ".git/hooks/pre-commit").is_err());
        assert!(sandbox_resolve(&root, "../etc/passwd").is_err());
        assert!(sandbox_resolve(&root, "/etc/passwd").is_err());
    }

    async fn service_with_live_repo() -> (FileCrudService, tempfile::TempDir) {
        let data_dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.data_dir = data_dir.path().to_path_buf();

        let activated_dir = config.activated_repos_dir();
        tokio::fs::create_dir_all(activated_model::repo_dir(&activated_dir, "alice", "work"))
            .await
            .unwrap();
        activated_model::write_metadata(
            &activated_dir,
            "alice",
            "work",
            &activated_model::ActivatedRepoMetadata {
                user_alias: "work".to_string(),
                golden_repo_alias: "hello".to_string(),
                current_branch: "main".to_string(),
                activated_at: Utc::now(),
                last_accessed: Utc::now(),
            },
        )
        .await
        .unwrap();

        (FileCrudService::new(std::sync::Arc::new(config)), data_dir)
    }

    #[tokio::test]
    async fn create_then_edit_with_hash_lock() {
        let (service, _guard) = service_with_live_repo().await;

        let created = service.create("alice", "work", "src/a.txt", b"hello world").await.unwrap();

        let stale_hash = "0".repeat(64);
        let err = service
            .edit("alice", "work", "src/a.txt", "hello", "hi", &stale_hash, false)
            .await
            .unwrap_err();
        assert!(matches!(err, FileCrudError::HashMismatch { .. }));

        let edited = service
            .edit("alice", "work", "src/a.txt", "hello", "hi", &created.hash, false)
            .await
            .unwrap();
        assert_ne!(edited.hash, created.hash);

        let err = service.create("alice", "work", "src/a.txt", b"anything").await.unwrap_err();
        assert!(matches!(err, FileCrudError::FileExists(_)));
    }

    #[tokio::test]
    async fn edit_requires_unique_occurrence_unless_replace_all() {
        let (service, _guard) = service_with_live_repo().await;
        let created = service.create("alice", "work", "dup.txt", b"foo bar foo").await.unwrap();

        let err = service
            .edit("alice", "work", "dup.txt", "foo", "baz", &created.hash, false)
            .await
            .unwrap_err();
        assert!(matches!(err, FileCrudError::NotUnique { count: 2, .. }));

        let result = service
            .edit("alice", "work", "dup.txt", "foo", "baz", &created.hash, true)
            .await
            .unwrap();
        assert!(result.hash.len() == 64);
    }

    #[tokio::test]
    async fn delete_rejects_path_traversal() {
        let (service, _guard) = service_with_live_repo().await;
        let err = service.delete("alice", "work", "../../etc/passwd", None).await.unwrap_err();
        assert!(matches!(err, FileCrudError::Sandbox(_)));
    }
}
