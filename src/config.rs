//! Server-wide configuration: quotas, timeouts, identities.
//!
//! Loading this struct from a config file or environment is part of the
//! out-of-scope CLI/config layer (spec §1); this module only defines the
//! shape and its defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Job persistence backend selection (spec §4.B "Persistence").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStoreKind {
    JsonFile,
    Sqlite,
}

impl Default for JobStoreKind {
    fn default() -> Self {
        JobStoreKind::JsonFile
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Root of all persisted state: `<data>/golden-repos`, `<data>/activated-repos`, jobs.
    pub data_dir: PathBuf,

    pub max_golden_repos: usize,
    pub max_repo_size_bytes: u64,

    pub job_store: JobStoreKind,

    /// Memory growth, in MiB, that triggers a leak warning (§4.A).
    pub memory_leak_threshold_mb: f64,
    pub memory_monitoring_enabled: bool,

    /// Total budget for graceful shutdown cleanup (§4.A, §5).
    pub shutdown_budget: Duration,

    /// Embedding provider name passed to `cidx init --embedding-provider`.
    pub embedding_provider: String,

    /// Git identity used as the *committer* for dual-attribution commits
    /// (§4.F); the *author* identity always comes from the caller.
    pub service_committer_name: String,
    pub service_committer_email: String,

    pub confirmation_token_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_golden_repos: 20,
            max_repo_size_bytes: 1 * 1024 * 1024 * 1024,
            job_store: JobStoreKind::JsonFile,
            memory_leak_threshold_mb: 100.0,
            memory_monitoring_enabled: true,
            shutdown_budget: Duration::from_secs(30),
            embedding_provider: "voyage-ai".to_string(),
            service_committer_name: "CIDX Service".to_string(),
            service_committer_email: "cidx-service@localhost".to_string(),
            confirmation_token_ttl: Duration::from_secs(300),
        }
    }
}

impl ServerConfig {
    pub fn golden_repos_dir(&self) -> PathBuf {
        self.data_dir.join("golden-repos")
    }

    pub fn golden_metadata_path(&self) -> PathBuf {
        self.golden_repos_dir().join("metadata.json")
    }

    pub fn activated_repos_dir(&self) -> PathBuf {
        self.data_dir.join("activated-repos")
    }

    pub fn jobs_json_path(&self) -> PathBuf {
        self.data_dir.join("jobs.json")
    }

    pub fn jobs_sqlite_path(&self) -> PathBuf {
        self.data_dir.join("jobs.sqlite")
    }
}
