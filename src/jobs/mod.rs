//! Background Job Engine (§4.B): submission, prioritized dispatch,
//! persistence, owner-scoped queries, cancellation, graceful shutdown.

pub mod manager;
pub mod model;
pub mod persistence;

pub use manager::{JobBody, JobContext, JobError, JobManager, JobOutcome, JobStats};
pub use model::{BackgroundJob, JobStatus, SelfHealingFields};
pub use persistence::{JobStore, JsonFileJobStore, PersistenceError};

#[cfg(feature = "sqlite-jobs")]
pub use persistence::sqlite::SqliteJobStore;
