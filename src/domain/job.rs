use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::log::LogEntry;
use super::records::{MotifMatch, SimilarityHit, SupertypeEpitopes};
use crate::error::{PipelineError, Result};

/// The four independent analyses run for every HCS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisFamily {
    Motif,
    Similarity,
    #[serde(rename = "mhci")]
    MhcI,
    #[serde(rename = "mhcii")]
    MhcII,
}

impl AnalysisFamily {
    /// Execution order within one HCS.
    pub const ALL: [AnalysisFamily; 4] = [
        AnalysisFamily::Motif,
        AnalysisFamily::MhcI,
        AnalysisFamily::MhcII,
        AnalysisFamily::Similarity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisFamily::Motif => "motif",
            AnalysisFamily::Similarity => "similarity",
            AnalysisFamily::MhcI => "mhci",
            AnalysisFamily::MhcII => "mhcii",
        }
    }
}

impl fmt::Display for AnalysisFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MhcIMethod {
    #[serde(rename = "netmhcpan")]
    NetMhcPan,
    #[serde(rename = "netmhcpan_el")]
    NetMhcPanEl,
    #[serde(rename = "pickpocket")]
    Pickpocket,
    #[serde(rename = "mhcflurry")]
    MhcFlurry,
}

impl MhcIMethod {
    pub const ALL: [MhcIMethod; 4] = [
        MhcIMethod::NetMhcPan,
        MhcIMethod::NetMhcPanEl,
        MhcIMethod::Pickpocket,
        MhcIMethod::MhcFlurry,
    ];

    /// Method name as understood by the prediction tool.
    pub fn as_str(&self) -> &'static str {
        match self {
            MhcIMethod::NetMhcPan => "netmhcpan",
            MhcIMethod::NetMhcPanEl => "netmhcpan_el",
            MhcIMethod::Pickpocket => "pickpocket",
            MhcIMethod::MhcFlurry => "mhcflurry",
        }
    }
}

impl Default for MhcIMethod {
    fn default() -> Self {
        MhcIMethod::NetMhcPan
    }
}

impl FromStr for MhcIMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        MhcIMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PipelineError::Configuration(format!("Unknown MHC-I method: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MhcIIMethod {
    #[serde(rename = "NetMHCIIpan")]
    NetMhcIIPan,
    #[serde(rename = "netmhciipan_el")]
    NetMhcIIPanEl,
    #[serde(rename = "netmhciipan_ba")]
    NetMhcIIPanBa,
}

impl MhcIIMethod {
    pub const ALL: [MhcIIMethod; 3] = [
        MhcIIMethod::NetMhcIIPan,
        MhcIIMethod::NetMhcIIPanEl,
        MhcIIMethod::NetMhcIIPanBa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MhcIIMethod::NetMhcIIPan => "NetMHCIIpan",
            MhcIIMethod::NetMhcIIPanEl => "netmhciipan_el",
            MhcIIMethod::NetMhcIIPanBa => "netmhciipan_ba",
        }
    }
}

impl Default for MhcIIMethod {
    fn default() -> Self {
        MhcIIMethod::NetMhcIIPan
    }
}

impl FromStr for MhcIIMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        MhcIIMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PipelineError::Configuration(format!("Unknown MHC-II method: {}", s)))
    }
}

/// Job status. Only moves forward: `pending, starting, running, {completed|partial|error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Starting,
    Running,
    Completed,
    Partial,
    Error,
}

impl JobStatus {
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Starting => 1,
            JobStatus::Running => 2,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Error => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    /// Staying in the same status is allowed; everything else must move forward.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        *self == next || next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Starting => "starting",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Per-family stage status of one HCS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageStatuses {
    pub motif: StageStatus,
    pub similarity: StageStatus,
    pub mhci: StageStatus,
    pub mhcii: StageStatus,
}

impl StageStatuses {
    pub fn get(&self, family: AnalysisFamily) -> StageStatus {
        match family {
            AnalysisFamily::Motif => self.motif,
            AnalysisFamily::Similarity => self.similarity,
            AnalysisFamily::MhcI => self.mhci,
            AnalysisFamily::MhcII => self.mhcii,
        }
    }

    pub fn set(&mut self, family: AnalysisFamily, status: StageStatus) {
        match family {
            AnalysisFamily::Motif => self.motif = status,
            AnalysisFamily::Similarity => self.similarity = status,
            AnalysisFamily::MhcI => self.mhci = status,
            AnalysisFamily::MhcII => self.mhcii = status,
        }
    }
}

/// Marks which executor currently owns a running stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageClaim {
    pub token: Uuid,
    pub claimed_at: DateTime<Utc>,
}

/// Normalized output of one stage, tagged by family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "records", rename_all = "snake_case")]
pub enum StageOutput {
    Motif(Vec<MotifMatch>),
    Similarity(Vec<SimilarityHit>),
    #[serde(rename = "mhci")]
    MhcI(SupertypeEpitopes),
    #[serde(rename = "mhcii")]
    MhcII(SupertypeEpitopes),
}

impl StageOutput {
    pub fn family(&self) -> AnalysisFamily {
        match self {
            StageOutput::Motif(_) => AnalysisFamily::Motif,
            StageOutput::Similarity(_) => AnalysisFamily::Similarity,
            StageOutput::MhcI(_) => AnalysisFamily::MhcI,
            StageOutput::MhcII(_) => AnalysisFamily::MhcII,
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            StageOutput::Motif(r) => r.len(),
            StageOutput::Similarity(r) => r.len(),
            StageOutput::MhcI(r) | StageOutput::MhcII(r) => r.values().map(Vec::len).sum(),
        }
    }
}

/// Four independent result slots; a slot stays `None` until its stage completes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultContainer {
    pub motif: Option<Vec<MotifMatch>>,
    pub similarity: Option<Vec<SimilarityHit>>,
    pub mhci: Option<SupertypeEpitopes>,
    pub mhcii: Option<SupertypeEpitopes>,
}

impl ResultContainer {
    pub fn store(&mut self, output: StageOutput) {
        match output {
            StageOutput::Motif(r) => self.motif = Some(r),
            StageOutput::Similarity(r) => self.similarity = Some(r),
            StageOutput::MhcI(r) => self.mhci = Some(r),
            StageOutput::MhcII(r) => self.mhcii = Some(r),
        }
    }

    pub fn clear(&mut self, family: AnalysisFamily) {
        match family {
            AnalysisFamily::Motif => self.motif = None,
            AnalysisFamily::Similarity => self.similarity = None,
            AnalysisFamily::MhcI => self.mhci = None,
            AnalysisFamily::MhcII => self.mhcii = None,
        }
    }

    pub fn is_present(&self, family: AnalysisFamily) -> bool {
        match family {
            AnalysisFamily::Motif => self.motif.is_some(),
            AnalysisFamily::Similarity => self.similarity.is_some(),
            AnalysisFamily::MhcI => self.mhci.is_some(),
            AnalysisFamily::MhcII => self.mhcii.is_some(),
        }
    }
}

/// Standard amino acids plus ambiguity/stop codes.
const AMINO_ACID_ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWYBZXJUO*";

/// One highly conserved sequence fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hcs {
    pub id: String,
    pub sequence: String,
    pub incidence: f64,
    pub position: u32,
    #[serde(default)]
    pub stage_status: StageStatuses,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub claims: BTreeMap<AnalysisFamily, StageClaim>,
    #[serde(default)]
    pub results: ResultContainer,
}

impl Hcs {
    pub fn new(sequence: &str, incidence: f64, position: u32) -> Result<Self> {
        let sequence = sequence.trim().to_ascii_uppercase();
        validate_sequence(&sequence)?;
        validate_incidence(incidence)?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            sequence,
            incidence,
            position,
            stage_status: StageStatuses::default(),
            claims: BTreeMap::new(),
            results: ResultContainer::default(),
        })
    }

    /// Re-check the persisted fields before dispatching any stage.
    pub fn validate(&self) -> Result<()> {
        validate_sequence(&self.sequence)?;
        validate_incidence(self.incidence)
    }
}

fn validate_sequence(sequence: &str) -> Result<()> {
    if sequence.is_empty() {
        return Err(PipelineError::Validation("HCS sequence is empty".to_string()));
    }
    if let Some(bad) = sequence.chars().find(|c| !AMINO_ACID_ALPHABET.contains(*c)) {
        return Err(PipelineError::Validation(format!(
            "HCS sequence contains invalid residue '{}'",
            bad
        )));
    }
    Ok(())
}

fn validate_incidence(incidence: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&incidence) {
        return Err(PipelineError::Validation(format!(
            "HCS incidence {} is outside 0..=1",
            incidence
        )));
    }
    Ok(())
}

fn default_job_name() -> String {
    "Unknown Protein".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HcsSubmission {
    pub sequence: String,
    pub incidence: f64,
    pub position: u32,
}

/// A user-submitted analysis request, before anything is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub taxonomy_exclusion_id: i64,
    #[serde(default = "default_job_name")]
    pub name: String,
    pub hcs: Vec<HcsSubmission>,
    #[serde(default)]
    pub mhci_method: MhcIMethod,
    #[serde(default)]
    pub mhcii_method: MhcIIMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub taxonomy_exclusion_id: i64,
    pub name: String,
    pub hcs_ids: Vec<String>,
    pub status: JobStatus,
    pub mhci_method: MhcIMethod,
    pub mhcii_method: MhcIIMethod,
    #[serde(default)]
    pub log: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(submission: &JobSubmission, hcs_ids: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            taxonomy_exclusion_id: submission.taxonomy_exclusion_id,
            name: submission.name.clone(),
            hcs_ids,
            status: JobStatus::Pending,
            mhci_method: submission.mhci_method,
            mhcii_method: submission.mhcii_method,
            log: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_only_moves_forward() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Starting));
        assert!(JobStatus::Starting.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Starting));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Error.can_transition_to(JobStatus::Partial));
    }

    #[test]
    fn test_hcs_rejects_empty_and_invalid_sequences() {
        assert!(matches!(Hcs::new("", 0.5, 0), Err(PipelineError::Validation(_))));
        assert!(matches!(Hcs::new("MDS1", 0.5, 0), Err(PipelineError::Validation(_))));
        assert!(matches!(Hcs::new("MDSN", 1.5, 0), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_hcs_normalizes_case_and_accepts_ambiguity_codes() {
        let hcs = Hcs::new(" mdsntvssfqdiX ", 0.93, 12).unwrap();
        assert_eq!(hcs.sequence, "MDSNTVSSFQDIX");
        assert_eq!(hcs.stage_status.get(AnalysisFamily::MhcI), StageStatus::Pending);
        assert!(!hcs.results.is_present(AnalysisFamily::Motif));
    }

    #[test]
    fn test_method_names_parse_from_tool_names() {
        assert_eq!("netmhcpan_el".parse::<MhcIMethod>().unwrap(), MhcIMethod::NetMhcPanEl);
        assert_eq!("NetMHCIIpan".parse::<MhcIIMethod>().unwrap(), MhcIIMethod::NetMhcIIPan);
        assert!(matches!(
            "smm".parse::<MhcIMethod>(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_submission_defaults() {
        let submission: JobSubmission = serde_json::from_str(
            r#"{"taxonomy_exclusion_id": 2697049, "hcs": [{"sequence": "MDSN", "incidence": 1.0, "position": 0}]}"#,
        )
        .unwrap();
        assert_eq!(submission.name, "Unknown Protein");
        assert_eq!(submission.mhci_method, MhcIMethod::NetMhcPan);
        assert_eq!(submission.mhcii_method, MhcIIMethod::NetMhcIIPan);
    }
}
