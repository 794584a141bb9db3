use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::{StageBegin, Store};
use crate::domain::{AnalysisFamily, Hcs, Job, JobStatus, LogEntry, StageClaim, StageOutput, StageStatus};
use crate::error::{PipelineError, Result};

/// In-memory store for the worker CLI and tests
pub struct InMemoryStore {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    hcs: Arc<Mutex<HashMap<String, Hcs>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            hcs: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| PipelineError::Storage("store lock poisoned".to_string()))
}

fn stage_conflict(hcs_id: &str, family: AnalysisFamily) -> PipelineError {
    PipelineError::StageConflict {
        hcs_id: hcs_id.to_string(),
        stage: family.to_string(),
    }
}

/// The claim on `family` must exist and carry `token`.
fn check_claim(hcs: &Hcs, family: AnalysisFamily, token: Uuid) -> Result<()> {
    match hcs.claims.get(&family) {
        Some(claim) if claim.token == token => Ok(()),
        _ => Err(stage_conflict(&hcs.id, family)),
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_job(&self, job: Job) -> Result<()> {
        let mut jobs = lock(&self.jobs)?;
        debug!("Created job: {} with id {}", job.name, job.id);
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn insert_hcs(&self, hcs: Hcs) -> Result<()> {
        let mut entries = lock(&self.hcs)?;
        debug!("Created HCS {} at position {}", hcs.id, hcs.position);
        entries.insert(hcs.id.clone(), hcs);
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Job> {
        let jobs = lock(&self.jobs)?;
        jobs.get(id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("job", id))
    }

    async fn get_hcs(&self, id: &str) -> Result<Hcs> {
        let entries = lock(&self.hcs)?;
        entries
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("hcs", id))
    }

    async fn transition_job(&self, id: &str, to: JobStatus) -> Result<JobStatus> {
        let mut jobs = lock(&self.jobs)?;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| PipelineError::not_found("job", id))?;

        let from = job.status;
        if !from.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        job.status = to;
        debug!("Job {} status {} -> {}", id, from, to);
        Ok(from)
    }

    async fn append_log(&self, job_id: &str, entry: LogEntry) -> Result<()> {
        let mut jobs = lock(&self.jobs)?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| PipelineError::not_found("job", job_id))?;
        job.log.push(entry);
        Ok(())
    }

    async fn begin_stage(&self, hcs_id: &str, family: AnalysisFamily, lease: Duration) -> Result<StageBegin> {
        let mut entries = lock(&self.hcs)?;
        let hcs = entries
            .get_mut(hcs_id)
            .ok_or_else(|| PipelineError::not_found("hcs", hcs_id))?;

        match hcs.stage_status.get(family) {
            StageStatus::Completed => return Ok(StageBegin::AlreadyCompleted),
            StageStatus::Running => {
                let now = Utc::now();
                let fresh = hcs.claims.get(&family).is_some_and(|claim| {
                    (now - claim.claimed_at)
                        .to_std()
                        .map(|age| age < lease)
                        .unwrap_or(true)
                });
                if fresh {
                    return Err(stage_conflict(hcs_id, family));
                }
                debug!("Reclaiming stale {} stage of HCS {}", family, hcs_id);
            }
            StageStatus::Pending | StageStatus::Failed => {}
        }

        let token = Uuid::new_v4();
        hcs.claims.insert(
            family,
            StageClaim {
                token,
                claimed_at: Utc::now(),
            },
        );
        hcs.stage_status.set(family, StageStatus::Running);
        hcs.results.clear(family);
        Ok(StageBegin::Claimed(token))
    }

    async fn complete_stage(&self, hcs_id: &str, token: Uuid, output: StageOutput) -> Result<()> {
        let mut entries = lock(&self.hcs)?;
        let hcs = entries
            .get_mut(hcs_id)
            .ok_or_else(|| PipelineError::not_found("hcs", hcs_id))?;

        let family = output.family();
        check_claim(hcs, family, token)?;
        hcs.results.store(output);
        hcs.stage_status.set(family, StageStatus::Completed);
        hcs.claims.remove(&family);
        Ok(())
    }

    async fn fail_stage(&self, hcs_id: &str, family: AnalysisFamily, token: Uuid) -> Result<()> {
        let mut entries = lock(&self.hcs)?;
        let hcs = entries
            .get_mut(hcs_id)
            .ok_or_else(|| PipelineError::not_found("hcs", hcs_id))?;

        check_claim(hcs, family, token)?;
        hcs.results.clear(family);
        hcs.stage_status.set(family, StageStatus::Failed);
        hcs.claims.remove(&family);
        Ok(())
    }
}
