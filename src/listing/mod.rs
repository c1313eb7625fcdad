//! Repository Listing Service (component G): a read-only composition over
//! the golden and activated repository managers — availability search,
//! per-repo detail/branch/statistics lookups, and cross-user activation
//! counts. Grounded on `repository_listing_manager.py`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::activated_repo::ActivatedRepoManager;
use crate::config::ServerConfig;
use crate::golden_repo::{GoldenRepoManager, GoldenRepository};
use crate::subprocess::run_plain;

const LS_REMOTE_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("invalid status filter '{0}': must be 'available' or 'activated'")]
    InvalidStatusFilter(String),
    #[error("repository '{0}' not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Available,
    Activated,
}

impl StatusFilter {
    fn parse(raw: &str) -> Result<Self, ListingError> {
        match raw {
            "available" => Ok(StatusFilter::Available),
            "activated" => Ok(StatusFilter::Activated),
            other => Err(ListingError::InvalidStatusFilter(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableRepositories {
    pub repositories: Vec<GoldenRepository>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    Activated,
    Available,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryDetails {
    pub alias: String,
    pub repo_url: String,
    pub default_branch: String,
    pub clone_path: std::path::PathBuf,
    pub created_at: DateTime<Utc>,
    pub activation_status: ActivationStatus,
    pub branches_list: Vec<String>,
    pub file_count: u64,
    pub index_size: u64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryStatistics {
    pub file_count: u64,
    pub index_size: u64,
    pub last_updated: DateTime<Utc>,
}

pub struct RepositoryListingService {
    config: std::sync::Arc<ServerConfig>,
    golden_repos: std::sync::Arc<GoldenRepoManager>,
    activated_repos: std::sync::Arc<ActivatedRepoManager>,
}

impl RepositoryListingService {
    pub fn new(
        config: std::sync::Arc<ServerConfig>,
        golden_repos: std::sync::Arc<GoldenRepoManager>,
        activated_repos: std::sync::Arc<ActivatedRepoManager>,
    ) -> Self {
        Self { config, golden_repos, activated_repos }
    }

    async fn activated_aliases(&self, username: &str) -> HashSet<String> {
        self.activated_repos
            .list(username)
            .await
            .into_iter()
            .map(|repo| repo.golden_repo_alias)
            .collect()
    }

    /// Lists golden repositories, defaulting to "not yet activated by this
    /// user" when no status filter is given — matching the original's
    /// "available listing" default.
    pub async fn list_available_repositories(
        &self,
        username: &str,
        search_term: Option<&str>,
        status_filter: Option<&str>,
    ) -> Result<AvailableRepositories, ListingError> {
        let filter = status_filter.map(StatusFilter::parse).transpose()?;
        let activated = self.activated_aliases(username).await;

        let mut repos: Vec<GoldenRepository> = self
            .golden_repos
            .list()
            .await
            .into_iter()
            .filter(|repo| match filter {
                Some(StatusFilter::Available) | None => !activated.contains(&repo.alias),
                Some(StatusFilter::Activated) => activated.contains(&repo.alias),
            })
            .collect();

        if let Some(term) = search_term {
            let needle = term.to_lowercase();
            repos.retain(|repo| {
                repo.alias.to_lowercase().contains(&needle) || repo.repo_url.to_lowercase().contains(&needle)
            });
        }

        let total = repos.len();
        Ok(AvailableRepositories { repositories: repos, total })
    }

    pub async fn search_repositories(
        &self,
        username: &str,
        search_term: &str,
    ) -> Result<AvailableRepositories, ListingError> {
        self.list_available_repositories(username, Some(search_term), None).await
    }

    pub async fn filter_repositories(
        &self,
        username: &str,
        status_filter: &str,
    ) -> Result<AvailableRepositories, ListingError> {
        self.list_available_repositories(username, None, Some(status_filter)).await
    }

    pub async fn get_repository_details(
        &self,
        alias: &str,
        username: &str,
    ) -> Result<RepositoryDetails, ListingError> {
        let golden = self.golden_repos.get(alias).await.ok_or_else(|| ListingError::NotFound(alias.to_string()))?;
        let activated = self.activated_aliases(username).await;

        let branches_list = self
            .get_available_branches(alias)
            .await
            .unwrap_or_else(|_| vec![golden.default_branch.clone()]);

        let stats = self.get_repository_statistics(alias).await.unwrap_or(RepositoryStatistics {
            file_count: 0,
            index_size: 0,
            last_updated: golden.created_at,
        });

        Ok(RepositoryDetails {
            alias: golden.alias.clone(),
            repo_url: golden.repo_url,
            default_branch: golden.default_branch,
            clone_path: golden.clone_path,
            created_at: golden.created_at,
            activation_status: if activated.contains(alias) {
                ActivationStatus::Activated
            } else {
                ActivationStatus::Available
            },
            branches_list,
            file_count: stats.file_count,
            index_size: stats.index_size,
            last_updated: stats.last_updated,
        })
    }

    pub async fn get_available_branches(&self, alias: &str) -> Result<Vec<String>, ListingError> {
        let golden = self.golden_repos.get(alias).await.ok_or_else(|| ListingError::NotFound(alias.to_string()))?;

        let argv = ["git", "ls-remote", "--heads", golden.clone_path.to_str().unwrap_or(".")];
        let branches = match run_plain(&argv, &golden.clone_path, LS_REMOTE_DEADLINE).await {
            Ok(out) if out.success() => out
                .stdout
                .lines()
                .filter_map(|line| line.split("refs/heads/").nth(1))
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            _ => Vec::new(),
        };

        Ok(if branches.is_empty() { vec![golden.default_branch] } else { branches })
    }

    pub async fn get_repository_statistics(&self, alias: &str) -> Result<RepositoryStatistics, ListingError> {
        let golden = self.golden_repos.get(alias).await.ok_or_else(|| ListingError::NotFound(alias.to_string()))?;

        let (file_count, index_size, latest_mtime) = walk_stats(&golden.clone_path);
        let last_updated = latest_mtime.unwrap_or(golden.created_at);

        Ok(RepositoryStatistics { file_count, index_size, last_updated })
    }

    /// Number of distinct users who currently have `golden_repo_alias`
    /// activated, scanned directly off the activated-repos directory tree
    /// since activation records are sharded per user.
    pub async fn get_activation_count(&self, golden_repo_alias: &str) -> u64 {
        let root = self.config.activated_repos_dir();
        let mut count = 0;

        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(username) = entry.file_name().to_str().map(|s| s.to_string()) else { continue };
            let activated = self.activated_repos.list(&username).await;
            if activated.iter().any(|repo| repo.golden_repo_alias == golden_repo_alias) {
                count += 1;
            }
        }
        count
    }
}

/// Single-pass directory walk skipping `.git`, returning (file_count,
/// total_bytes, latest_mtime). Tolerates unreadable entries the way the
/// original swallows per-file `OSError`s.
fn walk_stats(root: &Path) -> (u64, u64, Option<DateTime<Utc>>) {
    let mut file_count = 0u64;
    let mut total_size = 0u64;
    let mut latest: Option<std::time::SystemTime> = None;

    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            file_count += 1;
            total_size += meta.len();
            if let Ok(modified) = meta.modified() {
                latest = Some(latest.map_or(modified, |cur| cur.max(modified)));
            }
        }
    }

    (file_count, total_size, latest.map(DateTime::<Utc>::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_rejects_unknown_value() {
        assert!(matches!(StatusFilter::parse("bogus"), Err(ListingError::InvalidStatusFilter(_))));
        assert_eq!(StatusFilter::parse("available").unwrap(), StatusFilter::Available);
    }

    #[test]
    fn walk_stats_counts_files_and_skips_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("HEAD"), b"ref: refs/heads/main").unwrap();

        let (count, size, latest) = walk_stats(dir.path());
        assert_eq!(count, 1);
        assert_eq!(size, 5);
        assert!(latest.is_some());
    }
}
