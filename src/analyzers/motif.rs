//! PROSITE motif scanning with `ps_scan`.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::distributions::Uniform;
use rand::Rng;
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::process::{ProcessRunner, ProcessSpec};
use super::{AnalysisRequest, Analyzer, AnalyzerReport};
use crate::config::MotifConfig;
use crate::domain::{AnalysisFamily, MotifMatch, StageOutput};
use crate::error::AnalyzerError;
use crate::http::HttpTransport;

pub const METHOD: &str = "ps_scan";

struct ScanPatterns {
    accession: Regex,
    range: Regex,
    description: Regex,
}

static PATTERNS: Lazy<Result<ScanPatterns, regex::Error>> = Lazy::new(|| {
    Ok(ScanPatterns {
        accession: Regex::new(r"PS\d{5}")?,
        range: Regex::new(r"/(\d+)-(\d+)")?,
        description: Regex::new(r"description=(.+?)(?:\s+[A-Za-z_]+=|$)")?,
    })
});

fn patterns() -> Result<&'static ScanPatterns, AnalyzerError> {
    PATTERNS
        .as_ref()
        .map_err(|e| AnalyzerError::parse(format!("invalid scan pattern: {}", e)))
}

/// One `>` entry of the scanner output, before the description is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub accession: String,
    pub start: u32,
    pub end: u32,
    pub description: Option<String>,
}

/// Parse xPSA output. Empty output means no matches.
pub fn parse_scan_output(stdout: &str) -> Result<Vec<ScanEntry>, AnalyzerError> {
    let patterns = patterns()?;
    stdout
        .split('>')
        .skip(1)
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| parse_entry(patterns, entry))
        .collect()
}

fn parse_entry(patterns: &ScanPatterns, entry: &str) -> Result<ScanEntry, AnalyzerError> {
    let header = entry.lines().next().unwrap_or_default();

    let accession = patterns
        .accession
        .find(header)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AnalyzerError::parse(format!("no PROSITE accession in '{}'", header.trim())))?;

    let range = patterns
        .range
        .captures(header)
        .ok_or_else(|| AnalyzerError::parse(format!("no match range in '{}'", header.trim())))?;
    let start = parse_position(&range[1], header)?;
    let end = parse_position(&range[2], header)?;
    if start > end {
        return Err(AnalyzerError::parse(format!(
            "match range {}-{} is inverted in '{}'",
            start,
            end,
            header.trim()
        )));
    }

    let description = patterns
        .description
        .captures(header)
        .map(|c| c[1].trim().to_string())
        .filter(|d| !d.is_empty());

    Ok(ScanEntry {
        accession,
        start,
        end,
        description,
    })
}

fn parse_position(value: &str, header: &str) -> Result<u32, AnalyzerError> {
    value
        .parse()
        .map_err(|_| AnalyzerError::parse(format!("invalid position '{}' in '{}'", value, header.trim())))
}

/// Wrap a sequence in a single-entry FASTA block with a random 5-letter header.
pub fn fasta_from_sequence(sequence: &str) -> String {
    let header: String = rand::thread_rng()
        .sample_iter(Uniform::new_inclusive(b'A', b'Z'))
        .take(5)
        .map(char::from)
        .collect();
    format!(">{}\n{}\n", header, sequence)
}

/// Resolves the free-text description of a PROSITE entry.
#[async_trait]
pub trait MotifDescriptionLookup: Send + Sync {
    async fn describe(&self, accession: &str) -> Result<String, AnalyzerError>;
}

/// Reads the `DE` line of the public PROSITE text record.
pub struct ExpasyLookup {
    http: Arc<dyn HttpTransport>,
    base_url: String,
    retries: u32,
    backoff: Duration,
}

impl ExpasyLookup {
    const MAX_BACKOFF: Duration = Duration::from_secs(30);

    pub fn new(http: Arc<dyn HttpTransport>, config: &MotifConfig) -> Self {
        Self {
            http,
            base_url: config.lookup_base_url.trim_end_matches('/').to_string(),
            retries: config.lookup_retries,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn fetch(&self, url: &str) -> Result<String, AnalyzerError> {
        let response = self.http.get(url).await?.error_for_status(url)?;
        Ok(response.body)
    }
}

#[async_trait]
impl MotifDescriptionLookup for ExpasyLookup {
    async fn describe(&self, accession: &str) -> Result<String, AnalyzerError> {
        let url = format!("{}/{}.txt", self.base_url, accession);
        let mut delay = self.backoff;
        let mut attempt = 0;

        let body = loop {
            attempt += 1;
            match self.fetch(&url).await {
                Ok(body) => break body,
                Err(e) if attempt > self.retries => {
                    return Err(AnalyzerError::remote(format!(
                        "PROSITE lookup for {} failed after {} attempts: {}",
                        accession, attempt, e.detail
                    )));
                }
                Err(e) => {
                    warn!(accession, attempt, "PROSITE lookup failed, retrying: {}", e);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Self::MAX_BACKOFF);
                }
            }
        };

        description_from_record(&body)
            .ok_or_else(|| AnalyzerError::parse(format!("PROSITE record {} has no DE line", accession)))
    }
}

/// The `DE` line of a PROSITE text record.
pub fn description_from_record(record: &str) -> Option<String> {
    record
        .lines()
        .find_map(|line| line.strip_prefix("DE"))
        .map(|rest| rest.trim().to_string())
        .filter(|d| !d.is_empty())
}

pub struct PrositeScanner {
    config: MotifConfig,
    runner: Arc<dyn ProcessRunner>,
    lookup: Arc<dyn MotifDescriptionLookup>,
}

impl PrositeScanner {
    pub fn new(
        config: MotifConfig,
        runner: Arc<dyn ProcessRunner>,
        lookup: Arc<dyn MotifDescriptionLookup>,
    ) -> Self {
        Self {
            config,
            runner,
            lookup,
        }
    }

    fn spec_for(&self, input: &NamedTempFile) -> ProcessSpec {
        ProcessSpec::new(
            &self.config.executable,
            Duration::from_secs(self.config.timeout_secs),
        )
        .arg("-f")
        .arg("-k")
        .arg("-z")
        .arg("-C")
        .arg("-1")
        .arg(input.path().display().to_string())
        .arg(self.config.database.display().to_string())
    }
}

#[async_trait]
impl Analyzer for PrositeScanner {
    fn family(&self) -> AnalysisFamily {
        AnalysisFamily::Motif
    }

    fn method(&self) -> &str {
        METHOD
    }

    async fn run(&self, request: &AnalysisRequest) -> Result<AnalyzerReport, AnalyzerError> {
        let mut input = NamedTempFile::new()
            .map_err(|e| AnalyzerError::tool(format!("failed to create FASTA file: {}", e)))?;
        input
            .write_all(fasta_from_sequence(&request.sequence).as_bytes())
            .and_then(|_| input.flush())
            .map_err(|e| AnalyzerError::tool(format!("failed to write FASTA file: {}", e)))?;

        let stdout = self.runner.run(&self.spec_for(&input)).await?.into_stdout(METHOD)?;
        let entries = parse_scan_output(&stdout)?;
        debug!(matches = entries.len(), "ps_scan finished");

        let mut descriptions: HashMap<String, String> = HashMap::new();
        let mut matches = Vec::with_capacity(entries.len());
        for entry in entries {
            let description = match entry.description {
                Some(d) => d,
                None => match descriptions.get(&entry.accession) {
                    Some(d) => d.clone(),
                    None => {
                        let d = self.lookup.describe(&entry.accession).await?;
                        descriptions.insert(entry.accession.clone(), d.clone());
                        d
                    }
                },
            };
            matches.push(MotifMatch {
                accession: entry.accession,
                description,
                start: entry.start,
                end: entry.end,
            });
        }

        Ok(AnalyzerReport::new(StageOutput::Motif(matches)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::process::ProcessOutput;
    use crate::error::AnalyzerErrorKind;
    use crate::http::HttpResponse;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const XPSA_OUTPUT: &str = ">QWERT/3-9 motif=PS00001|ASN_GLYCOSYLATION description=N-glycosylation site. level=0\n\
        NTVSSFQ\n\
        >QWERT/20-25 motif=PS00005|PKC_PHOSPHO_SITE level=0\n\
        SSFQDI\n";

    struct FixedRunner(ProcessOutput);

    #[async_trait]
    impl ProcessRunner for FixedRunner {
        async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, AnalyzerError> {
            assert_eq!(spec.args[..5], ["-f", "-k", "-z", "-C", "-1"]);
            Ok(self.0.clone())
        }
    }

    struct CountingLookup {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MotifDescriptionLookup for CountingLookup {
        async fn describe(&self, accession: &str) -> Result<String, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("looked up {}", accession))
        }
    }

    fn scanner(stdout: &str, exit_code: i32, lookup: Arc<dyn MotifDescriptionLookup>) -> PrositeScanner {
        let output = ProcessOutput {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: "ps_scan: cannot open database".to_string(),
        };
        PrositeScanner::new(MotifConfig::default(), Arc::new(FixedRunner(output)), lookup)
    }

    #[test]
    fn test_parse_scan_output() {
        let entries = parse_scan_output(XPSA_OUTPUT).unwrap();
        assert_eq!(
            entries,
            vec![
                ScanEntry {
                    accession: "PS00001".to_string(),
                    start: 3,
                    end: 9,
                    description: Some("N-glycosylation site.".to_string()),
                },
                ScanEntry {
                    accession: "PS00005".to_string(),
                    start: 20,
                    end: 25,
                    description: None,
                },
            ]
        );
        assert!(parse_scan_output("").unwrap().is_empty());
    }

    #[test]
    fn test_entry_without_range_is_a_parse_error() {
        let err = parse_scan_output(">QWERT motif=PS00001\n").unwrap_err();
        assert_eq!(err.kind, AnalyzerErrorKind::ParseError);
    }

    #[test]
    fn test_fasta_header_is_five_uppercase_letters() {
        let fasta = fasta_from_sequence("MDSN");
        let mut lines = fasta.lines();
        let header = lines.next().unwrap();
        assert_eq!(header.len(), 6);
        assert!(header[1..].chars().all(|c| c.is_ascii_uppercase()));
        assert_eq!(lines.next(), Some("MDSN"));
    }

    #[tokio::test]
    async fn test_single_match_lands_in_motif_output() {
        let lookup = Arc::new(CountingLookup { calls: AtomicUsize::new(0) });
        let scanner = scanner(
            ">ABCDE/3-9 motif=PS00001|ASN_GLYCOSYLATION\nNTVSSFQ\n",
            0,
            lookup.clone(),
        );

        let report = scanner.run(&AnalysisRequest::new("MDSNTVSSFQDI")).await.unwrap();
        assert_eq!(
            report.output,
            StageOutput::Motif(vec![MotifMatch {
                accession: "PS00001".to_string(),
                description: "looked up PS00001".to_string(),
                start: 3,
                end: 9,
            }])
        );
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inline_descriptions_skip_the_lookup() {
        let lookup = Arc::new(CountingLookup { calls: AtomicUsize::new(0) });
        let scanner = scanner(XPSA_OUTPUT, 0, lookup.clone());

        let report = scanner.run(&AnalysisRequest::new("MDSNTVSSFQDI")).await.unwrap();
        assert_eq!(report.output.record_count(), 2);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_tool_failure() {
        let lookup = Arc::new(CountingLookup { calls: AtomicUsize::new(0) });
        let err = scanner("", 1, lookup)
            .run(&AnalysisRequest::new("MDSN"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AnalyzerErrorKind::ExternalToolFailure);
        assert!(err.detail.contains("cannot open database"));
    }

    struct FlakyHttp {
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl HttpTransport for FlakyHttp {
        async fn get(&self, url: &str) -> Result<HttpResponse, AnalyzerError> {
            assert!(url.ends_with("/PS00001.txt"));
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Ok(HttpResponse { status: 502, body: String::new() });
            }
            Ok(HttpResponse {
                status: 200,
                body: "ID   ASN_GLYCOSYLATION; PATTERN.\nAC   PS00001;\nDE   N-glycosylation site.\n".to_string(),
            })
        }

        async fn post_json(&self, _url: &str, _body: &Value) -> Result<HttpResponse, AnalyzerError> {
            unreachable!("lookup only reads")
        }
    }

    #[tokio::test]
    async fn test_lookup_retries_then_reads_de_line() {
        let http = Arc::new(FlakyHttp { failures_left: Mutex::new(2) });
        let lookup = ExpasyLookup::new(http, &MotifConfig::default()).with_backoff(Duration::ZERO);
        assert_eq!(lookup.describe("PS00001").await.unwrap(), "N-glycosylation site.");
    }

    #[tokio::test]
    async fn test_lookup_gives_up_after_retry_budget() {
        let http = Arc::new(FlakyHttp { failures_left: Mutex::new(10) });
        let config = MotifConfig {
            lookup_retries: 2,
            ..MotifConfig::default()
        };
        let lookup = ExpasyLookup::new(http, &config).with_backoff(Duration::ZERO);

        let err = lookup.describe("PS00001").await.unwrap_err();
        assert_eq!(err.kind, AnalyzerErrorKind::RemoteServiceError);
        assert!(err.detail.contains("after 3 attempts"));
    }
}
