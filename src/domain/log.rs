use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::AnalysisFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFlag {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogContext {
    General,
    Motif,
    Similarity,
    #[serde(rename = "mhci")]
    MhcI,
    #[serde(rename = "mhcii")]
    MhcII,
}

impl From<AnalysisFamily> for LogContext {
    fn from(family: AnalysisFamily) -> Self {
        match family {
            AnalysisFamily::Motif => LogContext::Motif,
            AnalysisFamily::Similarity => LogContext::Similarity,
            AnalysisFamily::MhcI => LogContext::MhcI,
            AnalysisFamily::MhcII => LogContext::MhcII,
        }
    }
}

/// Point in a stage's life a log entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    Starting,
    Completed,
    Warning,
    Failed,
}

/// Fixed message codes. Free-form text goes into [`LogEntry::detail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageCode {
    JobPending,
    JobStarting,
    JobRunning,
    JobCompleted,
    JobPartial,
    JobError,

    MotifStarting,
    MotifCompleted,
    MotifWarning,
    MotifError,

    SimilarityStarting,
    SimilarityCompleted,
    SimilarityWarning,
    SimilarityError,

    MhciStarting,
    MhciCompleted,
    MhciWarning,
    MhciError,

    MhciiStarting,
    MhciiCompleted,
    MhciiWarning,
    MhciiError,
}

impl MessageCode {
    pub fn for_stage(family: AnalysisFamily, phase: StagePhase) -> Self {
        use AnalysisFamily::*;
        use StagePhase::*;
        match (family, phase) {
            (Motif, Starting) => MessageCode::MotifStarting,
            (Motif, Completed) => MessageCode::MotifCompleted,
            (Motif, Warning) => MessageCode::MotifWarning,
            (Motif, Failed) => MessageCode::MotifError,
            (Similarity, Starting) => MessageCode::SimilarityStarting,
            (Similarity, Completed) => MessageCode::SimilarityCompleted,
            (Similarity, Warning) => MessageCode::SimilarityWarning,
            (Similarity, Failed) => MessageCode::SimilarityError,
            (MhcI, Starting) => MessageCode::MhciStarting,
            (MhcI, Completed) => MessageCode::MhciCompleted,
            (MhcI, Warning) => MessageCode::MhciWarning,
            (MhcI, Failed) => MessageCode::MhciError,
            (MhcII, Starting) => MessageCode::MhciiStarting,
            (MhcII, Completed) => MessageCode::MhciiCompleted,
            (MhcII, Warning) => MessageCode::MhciiWarning,
            (MhcII, Failed) => MessageCode::MhciiError,
        }
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MessageCode::JobPending => "Job has been created",
            MessageCode::JobStarting => "Job is starting",
            MessageCode::JobRunning => "Job is running",
            MessageCode::JobCompleted => "Job is complete",
            MessageCode::JobPartial => "Job finished with failed stages",
            MessageCode::JobError => "Job failed",
            MessageCode::MotifStarting => "Motif scan is starting.",
            MessageCode::MotifCompleted => "Motif scan completed.",
            MessageCode::MotifWarning => "Motif scan reported a warning.",
            MessageCode::MotifError => "Motif scan failed.",
            MessageCode::SimilarityStarting => "Similarity search is starting.",
            MessageCode::SimilarityCompleted => "Similarity search completed.",
            MessageCode::SimilarityWarning => "Similarity search reported a warning.",
            MessageCode::SimilarityError => "Similarity search failed.",
            MessageCode::MhciStarting => "MHCI prediction is starting.",
            MessageCode::MhciCompleted => "MHCI prediction completed.",
            MessageCode::MhciWarning => "MHCI prediction reported a warning.",
            MessageCode::MhciError => "MHCI prediction failed.",
            MessageCode::MhciiStarting => "MHCII prediction is starting.",
            MessageCode::MhciiCompleted => "MHCII prediction completed.",
            MessageCode::MhciiWarning => "MHCII prediction reported a warning.",
            MessageCode::MhciiError => "MHCII prediction failed.",
        };
        f.write_str(text)
    }
}

/// Append-only job log entry. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub flag: LogFlag,
    pub context: LogContext,
    pub message_code: MessageCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hcs_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(flag: LogFlag, context: LogContext, message_code: MessageCode) -> Self {
        Self {
            id: Uuid::new_v4(),
            flag,
            context,
            message_code,
            detail: None,
            hcs_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn info(context: LogContext, message_code: MessageCode) -> Self {
        Self::new(LogFlag::Info, context, message_code)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn for_hcs(mut self, hcs_id: impl Into<String>) -> Self {
        self.hcs_id = Some(hcs_id.into());
        self
    }
}
