use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::executor::{StageExecutor, StageRun};
use super::record;
use crate::analyzers::{AnalysisRequest, AnalyzerSet};
use crate::config::FailurePolicy;
use crate::domain::{Job, JobStatus, LogContext, LogEntry, LogFlag, MessageCode};
use crate::error::{PipelineError, Result};
use crate::storage::Store;

/// Stage tallies for one pass over a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobOutcome {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl JobOutcome {
    /// Terminal status for these tallies. Skipped stages count as completed.
    pub fn final_status(&self) -> JobStatus {
        match (self.completed + self.skipped, self.failed) {
            (_, 0) => JobStatus::Completed,
            (0, _) => JobStatus::Error,
            _ => JobStatus::Partial,
        }
    }
}

/// Sequences the stages of a running job and settles its final status.
///
/// HCS are processed in list order, and within one HCS the stages run one after
/// another in [`crate::domain::AnalysisFamily::ALL`] order.
pub struct JobRunner {
    store: Arc<dyn Store>,
    executor: StageExecutor,
    policy: FailurePolicy,
}

impl JobRunner {
    pub fn new(store: Arc<dyn Store>, executor: StageExecutor, policy: FailurePolicy) -> Self {
        Self {
            store,
            executor,
            policy,
        }
    }

    /// Drive a `running` job to a terminal status.
    ///
    /// Analyzer failures are recorded and settle the job; store errors and stage
    /// conflicts are returned as-is and leave the job `running` for redelivery.
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn run(&self, job: &Job, analyzers: &AnalyzerSet) -> Result<JobStatus> {
        let mut outcome = JobOutcome::default();

        'hcs: for hcs_id in &job.hcs_ids {
            let hcs = self.store.get_hcs(hcs_id).await?;
            let request = AnalysisRequest::new(hcs.sequence.clone()).excluding_taxid(job.taxonomy_exclusion_id);

            for analyzer in analyzers.in_stage_order() {
                match self.executor.run_stage(&job.id, hcs_id, analyzer.as_ref(), &request).await {
                    Ok(StageRun::Completed { .. }) => outcome.completed += 1,
                    Ok(StageRun::Skipped) => outcome.skipped += 1,
                    Err(PipelineError::Analyzer(e)) => {
                        outcome.failed += 1;
                        match self.policy {
                            FailurePolicy::FailFast => {
                                warn!(hcs_id = %hcs_id, "stage failed, stopping job: {}", e);
                                break 'hcs;
                            }
                            FailurePolicy::Continue => {
                                warn!(hcs_id = %hcs_id, "stage failed, continuing: {}", e);
                            }
                        }
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        let status = match self.policy {
            FailurePolicy::FailFast if outcome.failed > 0 => JobStatus::Error,
            _ => outcome.final_status(),
        };

        info!(
            completed = outcome.completed,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "job finished as {}",
            status
        );
        self.settle(&job.id, status, None).await?;
        Ok(status)
    }

    /// Move a job to a terminal status and log it.
    pub async fn settle(&self, job_id: &str, status: JobStatus, detail: Option<String>) -> Result<()> {
        let (flag, code) = match status {
            JobStatus::Completed => (LogFlag::Info, MessageCode::JobCompleted),
            JobStatus::Partial => (LogFlag::Warning, MessageCode::JobPartial),
            _ => (LogFlag::Error, MessageCode::JobError),
        };

        self.store.transition_job(job_id, status).await?;
        let mut log = LogEntry::new(flag, LogContext::General, code);
        if let Some(detail) = detail {
            log = log.with_detail(detail);
        }
        record(&*self.store, job_id, log).await?;
        crate::metrics::record_job_outcome(status.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_status_from_tallies() {
        let outcome = |completed, skipped, failed| JobOutcome { completed, skipped, failed };
        assert_eq!(outcome(4, 0, 0).final_status(), JobStatus::Completed);
        assert_eq!(outcome(0, 4, 0).final_status(), JobStatus::Completed);
        assert_eq!(outcome(0, 0, 0).final_status(), JobStatus::Completed);
        assert_eq!(outcome(3, 0, 1).final_status(), JobStatus::Partial);
        assert_eq!(outcome(0, 1, 1).final_status(), JobStatus::Partial);
        assert_eq!(outcome(0, 0, 2).final_status(), JobStatus::Error);
    }
}
