//! Runs one analyzer for one HCS with an idempotency guard.
//!
//! The same start / complete / fail sequence serves every family: claim the stage,
//! log that it started, run the backend, then store the records and mark the stage
//! completed, or mark it failed and hand the error back to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use super::record;
use crate::analyzers::{AnalysisRequest, Analyzer};
use crate::domain::{LogContext, LogEntry, LogFlag, MessageCode, StagePhase};
use crate::error::{AnalyzerError, PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::storage::{StageBegin, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRun {
    /// The stage had already completed; the analyzer was not invoked.
    Skipped,
    Completed { records: usize },
}

pub struct StageExecutor {
    store: Arc<dyn Store>,
    lease: Duration,
}

impl StageExecutor {
    pub fn new(store: Arc<dyn Store>, lease: Duration) -> Self {
        Self { store, lease }
    }

    #[instrument(skip_all, fields(job_id = %job_id, hcs_id = %hcs_id, stage = %analyzer.family()))]
    pub async fn run_stage(
        &self,
        job_id: &str,
        hcs_id: &str,
        analyzer: &dyn Analyzer,
        request: &AnalysisRequest,
    ) -> Result<StageRun> {
        let family = analyzer.family();
        let stage = family.as_str();
        let context = LogContext::from(family);

        let token = match self.store.begin_stage(hcs_id, family, self.lease).await? {
            StageBegin::AlreadyCompleted => {
                debug!("stage already completed, skipping");
                StageMetrics::record_skip(stage);
                return Ok(StageRun::Skipped);
            }
            StageBegin::Claimed(token) => token,
        };

        let entry = |phase: StagePhase| {
            LogEntry::new(phase_flag(phase), context, MessageCode::for_stage(family, phase)).for_hcs(hcs_id)
        };

        let starting = entry(StagePhase::Starting).with_detail(format!("method {}", analyzer.method()));
        if let Err(e) = record(&*self.store, job_id, starting).await {
            // give the claim back before bailing out
            self.store.fail_stage(hcs_id, family, token).await?;
            return Err(e);
        }
        let started = Instant::now();

        let report = analyzer.run(request).await.and_then(|report| {
            if report.output.family() == family {
                Ok(report)
            } else {
                Err(AnalyzerError::parse(format!(
                    "{} backend returned {} output",
                    family,
                    report.output.family()
                )))
            }
        });

        match report {
            Ok(report) => {
                for warning in &report.warnings {
                    record(&*self.store, job_id, entry(StagePhase::Warning).with_detail(warning.clone())).await?;
                }

                let records = report.output.record_count();
                self.store.complete_stage(hcs_id, token, report.output).await?;
                record(
                    &*self.store,
                    job_id,
                    entry(StagePhase::Completed).with_detail(format!("{} records", records)),
                )
                .await?;
                StageMetrics::record_outcome(stage, "completed", started);
                Ok(StageRun::Completed { records })
            }
            Err(e) => {
                self.store.fail_stage(hcs_id, family, token).await?;
                record(&*self.store, job_id, entry(StagePhase::Failed).with_detail(e.to_string())).await?;
                StageMetrics::record_outcome(stage, "failed", started);
                Err(PipelineError::Analyzer(e))
            }
        }
    }
}

fn phase_flag(phase: StagePhase) -> LogFlag {
    match phase {
        StagePhase::Starting | StagePhase::Completed => LogFlag::Info,
        StagePhase::Warning => LogFlag::Warning,
        StagePhase::Failed => LogFlag::Error,
    }
}
