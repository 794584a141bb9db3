//! Analysis backends and the registry that selects them.
//!
//! Every backend implements [`Analyzer`]: it takes one HCS sequence and returns the
//! normalized records for its family, or an [`AnalyzerError`]. External calls
//! (subprocesses, HTTP) finish before `run` returns.

pub mod mhc;
pub mod motif;
pub mod process;
pub mod registry;
pub mod similarity;

use async_trait::async_trait;

use crate::domain::{AnalysisFamily, StageOutput};
use crate::error::AnalyzerError;

pub use mhc::{filter_by_cutoff, MhcPredictor};
pub use motif::{ExpasyLookup, MotifDescriptionLookup, PrositeScanner};
pub use process::{ProcessOutput, ProcessRunner, ProcessSpec, TokioProcessRunner};
pub use registry::{AnalyzerSet, BackendRegistry};
pub use similarity::RemoteSimilaritySearch;

/// Input handed to a backend for one HCS.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub sequence: String,
    /// Taxonomy id to leave out of similarity results, if any.
    pub exclude_taxid: Option<i64>,
}

impl AnalysisRequest {
    pub fn new(sequence: impl Into<String>) -> Self {
        Self {
            sequence: sequence.into(),
            exclude_taxid: None,
        }
    }

    pub fn excluding_taxid(mut self, taxid: i64) -> Self {
        // Zero is the "no exclusion" value accepted on submission.
        self.exclude_taxid = (taxid > 0).then_some(taxid);
        self
    }
}

/// Records from one run plus the non-fatal problems met on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerReport {
    pub output: StageOutput,
    pub warnings: Vec<String>,
}

impl AnalyzerReport {
    pub fn new(output: StageOutput) -> Self {
        Self {
            output,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    fn family(&self) -> AnalysisFamily;

    /// Method name this backend was registered under.
    fn method(&self) -> &str;

    async fn run(&self, request: &AnalysisRequest) -> Result<AnalyzerReport, AnalyzerError>;
}
