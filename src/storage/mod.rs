//! Persistence port for jobs and HCS entities.
//!
//! Every method that changes status is a single atomic operation on the stored
//! entity, so two executors racing on the same stage cannot both win.

pub mod in_memory;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AnalysisFamily, Hcs, Job, JobStatus, LogEntry, StageOutput};
use crate::error::Result;

pub use in_memory::InMemoryStore;

/// Outcome of trying to claim a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageBegin {
    /// The stage already completed; nothing to run.
    AlreadyCompleted,
    /// The caller now owns the stage and must complete or fail it with this token.
    Claimed(Uuid),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_job(&self, job: Job) -> Result<()>;
    async fn insert_hcs(&self, hcs: Hcs) -> Result<()>;

    async fn get_job(&self, id: &str) -> Result<Job>;
    async fn get_hcs(&self, id: &str) -> Result<Hcs>;

    /// Move the job to `to` if that is a forward (or same-status) transition.
    /// Returns the status it had before.
    async fn transition_job(&self, id: &str, to: JobStatus) -> Result<JobStatus>;

    async fn append_log(&self, job_id: &str, entry: LogEntry) -> Result<()>;

    /// Check-and-set a stage to `running`. A running stage whose claim is younger
    /// than `lease` belongs to someone else and yields `StageConflict`.
    async fn begin_stage(&self, hcs_id: &str, family: AnalysisFamily, lease: Duration) -> Result<StageBegin>;

    /// Store the output and mark its stage `completed`, in one step.
    async fn complete_stage(&self, hcs_id: &str, token: Uuid, output: StageOutput) -> Result<()>;

    /// Mark the stage `failed` and drop any stale result.
    async fn fail_stage(&self, hcs_id: &str, family: AnalysisFamily, token: Uuid) -> Result<()>;
}
