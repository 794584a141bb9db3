// Job orchestration: stage executor, per-job state machine, entry point

pub mod executor;
pub mod orchestrator;
pub mod state_machine;

pub use executor::{StageExecutor, StageRun};
pub use orchestrator::{JobReport, Orchestrator};
pub use state_machine::{JobOutcome, JobRunner};

use tracing::{error, info, warn};

use crate::domain::{LogEntry, LogFlag};
use crate::error::Result;
use crate::storage::Store;

/// Append to the job log, mirrored as a tracing event.
pub(crate) async fn record(store: &dyn Store, job_id: &str, entry: LogEntry) -> Result<()> {
    let detail = entry.detail.as_deref().unwrap_or("");
    match entry.flag {
        LogFlag::Info => info!(job_id, code = ?entry.message_code, "{} {}", entry.message_code, detail),
        LogFlag::Warning => warn!(job_id, code = ?entry.message_code, "{} {}", entry.message_code, detail),
        LogFlag::Error => error!(job_id, code = ?entry.message_code, "{} {}", entry.message_code, detail),
    }
    store.append_log(job_id, entry).await
}
