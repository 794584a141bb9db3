use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::executor::StageExecutor;
use super::record;
use super::state_machine::JobRunner;
use crate::analyzers::{AnalyzerSet, BackendRegistry};
use crate::config::PipelineConfig;
use crate::domain::{Hcs, Job, JobStatus, JobSubmission, LogContext, LogEntry, MessageCode};
use crate::error::{PipelineError, Result};
use crate::storage::Store;

/// A job together with its HCS entities, in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: Job,
    pub hcs: Vec<Hcs>,
}

/// Entry point handed to the execution substrate, one `process` call per job.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    registry: Arc<BackendRegistry>,
    runner: JobRunner,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, registry: Arc<BackendRegistry>, config: &PipelineConfig) -> Self {
        let executor = StageExecutor::new(store.clone(), Duration::from_secs(config.stage_lease_secs));
        let runner = JobRunner::new(store.clone(), executor, config.failure_policy);
        Self {
            store,
            registry,
            runner,
        }
    }

    /// Validate and persist a submission as a `pending` job. Returns the job id.
    /// Nothing is persisted when any HCS is invalid.
    pub async fn submit(&self, submission: &JobSubmission) -> Result<String> {
        if submission.hcs.is_empty() {
            return Err(PipelineError::Validation("job has no HCS".to_string()));
        }

        let hcs = submission
            .hcs
            .iter()
            .map(|h| Hcs::new(&h.sequence, h.incidence, h.position))
            .collect::<Result<Vec<_>>>()?;

        let job = Job::new(submission, hcs.iter().map(|h| h.id.clone()).collect());
        let job_id = job.id.clone();

        for entry in hcs {
            self.store.insert_hcs(entry).await?;
        }
        self.store.insert_job(job).await?;
        record(
            &*self.store,
            &job_id,
            LogEntry::info(LogContext::General, MessageCode::JobPending),
        )
        .await?;

        info!(job_id = %job_id, hcs = submission.hcs.len(), "job submitted");
        Ok(job_id)
    }

    /// Run a job to a terminal status. Safe to call again for the same job: a
    /// terminal job is left untouched and completed stages are not re-run.
    #[instrument(skip(self))]
    pub async fn process(&self, job_id: &str) -> Result<JobStatus> {
        let job = self.store.get_job(job_id).await?;
        if job.status.is_terminal() {
            info!("job already {}, nothing to do", job.status);
            return Ok(job.status);
        }

        // Another delivery may have moved the job since `job` was read; only the
        // call that actually changes the status logs it.
        if job.status == JobStatus::Pending {
            match self.store.transition_job(job_id, JobStatus::Starting).await {
                Ok(JobStatus::Pending) => {
                    record(
                        &*self.store,
                        job_id,
                        LogEntry::info(LogContext::General, MessageCode::JobStarting),
                    )
                    .await?
                }
                Ok(_) | Err(PipelineError::InvalidTransition { .. }) => {
                    debug!("job left pending through another delivery");
                }
                Err(e) => return Err(e),
            }
        }

        let analyzers = match self.prepare(&job).await {
            Ok(analyzers) => analyzers,
            Err(e) => {
                self.runner.settle(job_id, JobStatus::Error, Some(e.to_string())).await?;
                return Err(e);
            }
        };

        if job.status != JobStatus::Running {
            let from = self.store.transition_job(job_id, JobStatus::Running).await?;
            if from != JobStatus::Running {
                record(
                    &*self.store,
                    job_id,
                    LogEntry::info(LogContext::General, MessageCode::JobRunning),
                )
                .await?;
            }
        }

        self.runner.run(&job, &analyzers).await
    }

    /// Everything that must hold before the first stage is dispatched.
    async fn prepare(&self, job: &Job) -> Result<AnalyzerSet> {
        for hcs_id in &job.hcs_ids {
            self.store.get_hcs(hcs_id).await?.validate()?;
        }
        self.registry.select_for_job(job)
    }

    pub async fn report(&self, job_id: &str) -> Result<JobReport> {
        let job = self.store.get_job(job_id).await?;
        let mut hcs = Vec::with_capacity(job.hcs_ids.len());
        for hcs_id in &job.hcs_ids {
            hcs.push(self.store.get_hcs(hcs_id).await?);
        }
        Ok(JobReport { job, hcs })
    }
}
