//! Remote similarity search: submit a job, poll its status, fetch the BLAST JSON report.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{AnalysisRequest, Analyzer, AnalyzerReport};
use crate::config::SimilarityConfig;
use crate::domain::{AnalysisFamily, SimilarityHit, StageOutput};
use crate::error::AnalyzerError;
use crate::http::HttpTransport;

pub const METHOD: &str = "remote_blast";

const STATUS_FINISHED: i64 = 3;
const STATUS_FAILED: i64 = 2;

#[derive(Debug, Deserialize)]
struct BlastDocument {
    #[serde(rename = "BlastOutput2")]
    outputs: Vec<BlastOutput>,
}

#[derive(Debug, Deserialize)]
struct BlastOutput {
    report: BlastReport,
}

#[derive(Debug, Deserialize)]
struct BlastReport {
    results: BlastResults,
}

#[derive(Debug, Deserialize)]
struct BlastResults {
    search: BlastSearch,
}

#[derive(Debug, Deserialize)]
struct BlastSearch {
    #[serde(default)]
    hits: Vec<BlastHit>,
}

#[derive(Debug, Deserialize)]
struct BlastHit {
    #[serde(default)]
    description: Vec<HitDescription>,
}

#[derive(Debug, Deserialize)]
struct HitDescription {
    accession: String,
    #[serde(default)]
    title: String,
    taxid: Option<u64>,
    sciname: Option<String>,
}

/// Turn a BLAST JSON2 document into hits, one per description, in document order.
pub fn hits_from_report(document: &str) -> Result<Vec<SimilarityHit>, AnalyzerError> {
    let document: BlastDocument = serde_json::from_str(document)
        .map_err(|e| AnalyzerError::parse(format!("invalid BLAST report: {}", e)))?;

    let hits = document
        .outputs
        .into_iter()
        .next()
        .map(|output| output.report.results.search.hits)
        .unwrap_or_default()
        .into_iter()
        .flat_map(|hit| hit.description)
        .map(|d| SimilarityHit::new(d.accession, d.sciname, d.taxid, d.title))
        .collect();
    Ok(hits)
}

pub struct RemoteSimilaritySearch {
    config: SimilarityConfig,
    http: Arc<dyn HttpTransport>,
}

impl RemoteSimilaritySearch {
    pub fn new(config: SimilarityConfig, http: Arc<dyn HttpTransport>) -> Self {
        Self { config, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn submit(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError> {
        let mut body = json!({
            "sequence": request.sequence,
            "db": self.config.database.as_str(),
        });
        if let Some(taxid) = request.exclude_taxid {
            body["exclude_taxid"] = json!(taxid);
        }

        let url = self.url("job/create");
        let response = self.http.post_json(&url, &body).await?.error_for_status(&url)?;
        let job_id = response.body.trim().trim_matches('"').to_string();
        if job_id.is_empty() {
            return Err(AnalyzerError::remote("similarity service returned an empty job id"));
        }
        Ok(job_id)
    }

    async fn wait_for(&self, job_id: &str) -> Result<(), AnalyzerError> {
        let url = self.url(&format!("job/status/{}", job_id));
        let interval = Duration::from_secs(self.config.poll_interval_secs);

        for poll in 1..=self.config.max_polls {
            let response = self.http.get(&url).await?.error_for_status(&url)?;
            let raw = response.body.trim().trim_matches('"');
            let status: i64 = raw
                .parse()
                .map_err(|_| AnalyzerError::parse(format!("invalid job status '{}'", raw)))?;

            match status {
                STATUS_FINISHED => return Ok(()),
                STATUS_FAILED => {
                    return Err(AnalyzerError::remote(format!(
                        "similarity job {} failed on the remote service",
                        job_id
                    )))
                }
                _ => {
                    debug!(job_id, poll, status, "similarity job still pending");
                    if poll < self.config.max_polls {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }

        Err(AnalyzerError::remote(format!(
            "similarity job {} not finished after {} polls",
            job_id, self.config.max_polls
        )))
    }

    async fn fetch(&self, job_id: &str) -> Result<Vec<SimilarityHit>, AnalyzerError> {
        let url = self.url(&format!("static/{}.json", job_id));
        let response = self.http.get(&url).await?.error_for_status(&url)?;
        hits_from_report(&response.body)
    }
}

#[async_trait]
impl Analyzer for RemoteSimilaritySearch {
    fn family(&self) -> AnalysisFamily {
        AnalysisFamily::Similarity
    }

    fn method(&self) -> &str {
        METHOD
    }

    async fn run(&self, request: &AnalysisRequest) -> Result<AnalyzerReport, AnalyzerError> {
        let job_id = self.submit(request).await?;
        info!(job_id = %job_id, database = self.config.database.as_str(), "similarity job submitted");

        self.wait_for(&job_id).await?;
        let hits = self.fetch(&job_id).await?;
        Ok(AnalyzerReport::new(StageOutput::Similarity(hits)))
    }
}
