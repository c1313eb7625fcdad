//! The `BackgroundJob` record and its status machine (§4.B / §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    ResolvingPrerequisites,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::ResolvingPrerequisites => "resolving_prerequisites",
        };
        write!(f, "{s}")
    }
}

/// Optional fields written by indexing workers reporting automated
/// remediation attempts. Always present in the serialized record, even
/// when empty, for API stability (§4.B "Queries").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelfHealingFields {
    pub resolution_attempts: u32,
    pub claude_actions: Vec<String>,
    pub failure_reason: Option<String>,
    pub extended_error: Option<String>,
    pub language_resolution_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundJob {
    pub job_id: Uuid,
    pub operation_type: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub username: String,
    pub is_admin: bool,
    pub cancelled: bool,
    pub repo_alias: Option<String>,
    #[serde(default)]
    pub self_healing: SelfHealingFields,
}

impl BackgroundJob {
    pub fn new(
        operation_type: impl Into<String>,
        username: impl Into<String>,
        is_admin: bool,
        repo_alias: Option<String>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            operation_type: operation_type.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0,
            result: None,
            error: None,
            username: username.into(),
            is_admin,
            cancelled: false,
            repo_alias,
            self_healing: SelfHealingFields::default(),
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    pub fn mark_completed(&mut self, result: Option<serde_json::Value>) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = result;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Rewrites an orphaned `running`/`pending` record found at restart.
    pub fn rewrite_as_orphan(&mut self) {
        self.status = JobStatus::Failed;
        self.error = Some("job was orphaned by a server restart".to_string());
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_sets_full_progress() {
        let mut job = BackgroundJob::new("add_golden", "alice", false, Some("hello".into()));
        job.mark_running();
        job.set_progress(40);
        job.mark_completed(None);
        assert_eq!(job.progress, 100);
        assert!(job.status.is_terminal());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn orphan_rewrite_fails_with_fixed_reason() {
        let mut job = BackgroundJob::new("refresh_golden", "bob", false, Some("x".into()));
        job.rewrite_as_orphan();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("orphaned"));
    }
}
