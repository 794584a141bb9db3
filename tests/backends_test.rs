use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::tempdir;

use hcs_pipeline::analyzers::{BackendRegistry, MotifDescriptionLookup, TokioProcessRunner};
use hcs_pipeline::config::FailurePolicy;
use hcs_pipeline::domain::{AnalysisFamily, Job, JobSubmission};
use hcs_pipeline::http::{HttpResponse, HttpTransport};
use hcs_pipeline::supertypes::SupertypeTable;
use hcs_pipeline::{AnalyzerError, AppConfig, PipelineError};

struct OfflineHttp;

#[async_trait]
impl HttpTransport for OfflineHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, AnalyzerError> {
        panic!("no network expected, got GET {}", url)
    }

    async fn post_json(&self, url: &str, _body: &Value) -> Result<HttpResponse, AnalyzerError> {
        panic!("no network expected, got POST {}", url)
    }
}

struct OfflineLookup;

#[async_trait]
impl MotifDescriptionLookup for OfflineLookup {
    async fn describe(&self, accession: &str) -> Result<String, AnalyzerError> {
        panic!("no lookup expected for {}", accession)
    }
}

fn registry(config: &AppConfig, table: SupertypeTable) -> BackendRegistry {
    BackendRegistry::with_defaults(
        config,
        Arc::new(table),
        Arc::new(TokioProcessRunner),
        Arc::new(OfflineHttp),
        Arc::new(OfflineLookup),
    )
}

#[test]
fn test_config_and_supertypes_load_from_files() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let supertypes_path = dir.path().join("supertypes.toml");
    fs::write(
        &supertypes_path,
        "[[mhci]]\nname = \"A2\"\nalleles = [\"HLA-A*02:01\"]\n\n[[mhcii]]\nname = \"DR\"\nalleles = [\"HLA-DRB1*01:01\"]\n",
    )?;

    let config_path = dir.path().join("hcs-pipeline.toml");
    fs::write(
        &config_path,
        format!(
            "[pipeline]\nsupertypes_path = {:?}\nfailure_policy = \"continue\"\n\n[mhci]\ncutoff = 0.5\n",
            supertypes_path.display().to_string()
        ),
    )?;

    let config = AppConfig::from_file(&config_path)?;
    assert_eq!(config.pipeline.failure_policy, FailurePolicy::Continue);
    assert_eq!(config.mhci.cutoff, 0.5);
    assert_eq!(config.mhcii.cutoff, 1.0);

    let table = SupertypeTable::load_or_bundled(config.pipeline.supertypes_path.as_deref())?;
    let names: Vec<&str> = table.mhci.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["A2"]);
    assert_eq!(table.alleles(AnalysisFamily::MhcII, "DR")?.to_vec(), vec!["HLA-DRB1*01:01".to_string()]);
    Ok(())
}

#[test]
fn test_missing_supertype_file_is_an_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(SupertypeTable::load_or_bundled(Some(missing.as_path())).is_err());
    assert_eq!(SupertypeTable::load_or_bundled(None).unwrap().mhci.len(), 12);
}

#[test]
fn test_unknown_method_is_rejected_before_any_backend_runs() {
    let registry = registry(&AppConfig::default(), SupertypeTable::bundled().unwrap());

    let err = registry.select(AnalysisFamily::MhcI, "smm").err().unwrap();
    match err {
        PipelineError::Configuration(message) => assert!(message.contains("smm")),
        other => panic!("expected a configuration error, got {:?}", other),
    }

    let selected = registry.select(AnalysisFamily::MhcI, "NETMHCPAN_EL").unwrap();
    assert_eq!(selected.method(), "netmhcpan_el");
}

#[test]
fn test_every_submission_method_has_a_backend() {
    let registry = registry(&AppConfig::default(), SupertypeTable::bundled().unwrap());

    for (mhci, mhcii) in [
        ("netmhcpan", "NetMHCIIpan"),
        ("pickpocket", "netmhciipan_el"),
        ("mhcflurry", "netmhciipan_ba"),
    ] {
        let submission: JobSubmission = serde_json::from_value(serde_json::json!({
            "taxonomy_exclusion_id": 0,
            "hcs": [],
            "mhci_method": mhci,
            "mhcii_method": mhcii,
        }))
        .unwrap();
        let job = Job::new(&submission, Vec::new());

        let set = registry.select_for_job(&job).unwrap();
        let order: Vec<AnalysisFamily> = set.in_stage_order().map(|a| a.family()).collect();
        assert_eq!(order, AnalysisFamily::ALL.to_vec());
        assert_eq!(set.get(AnalysisFamily::MhcI).unwrap().method(), mhci);
        assert_eq!(set.get(AnalysisFamily::MhcII).unwrap().method(), mhcii);
    }
}
