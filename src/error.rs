use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure category reported by an analysis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerErrorKind {
    ExternalToolFailure,
    Timeout,
    ParseError,
    RemoteServiceError,
}

impl fmt::Display for AnalyzerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalyzerErrorKind::ExternalToolFailure => "external tool failure",
            AnalyzerErrorKind::Timeout => "timeout",
            AnalyzerErrorKind::ParseError => "parse error",
            AnalyzerErrorKind::RemoteServiceError => "remote service error",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {detail}")]
pub struct AnalyzerError {
    pub kind: AnalyzerErrorKind,
    pub detail: String,
}

impl AnalyzerError {
    pub fn new(kind: AnalyzerErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn tool(detail: impl Into<String>) -> Self {
        Self::new(AnalyzerErrorKind::ExternalToolFailure, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(AnalyzerErrorKind::Timeout, detail)
    }

    pub fn parse(detail: impl Into<String>) -> Self {
        Self::new(AnalyzerErrorKind::ParseError, detail)
    }

    pub fn remote(detail: impl Into<String>) -> Self {
        Self::new(AnalyzerErrorKind::RemoteServiceError, detail)
    }
}

impl From<reqwest::Error> for AnalyzerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AnalyzerError::timeout(err.to_string())
        } else {
            AnalyzerError::remote(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid job status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Stage {stage} of HCS {hcs_id} is already claimed by another executor")]
    StageConflict { hcs_id: String, stage: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

impl PipelineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PipelineError::NotFound { kind, id: id.into() }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
