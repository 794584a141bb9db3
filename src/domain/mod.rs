//! Domain data shapes shared across layers

pub mod job;
pub mod log;
pub mod records;

pub use job::{
    AnalysisFamily, Hcs, HcsSubmission, Job, JobStatus, JobSubmission, MhcIIMethod, MhcIMethod,
    ResultContainer, StageClaim, StageOutput, StageStatus, StageStatuses,
};
pub use log::{LogContext, LogEntry, LogFlag, MessageCode, StagePhase};
pub use records::{Epitope, MotifMatch, SimilarityHit, SupertypeEpitopes};
