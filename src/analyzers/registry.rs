use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::mhc::MhcPredictor;
use super::motif::{self, MotifDescriptionLookup, PrositeScanner};
use super::process::ProcessRunner;
use super::similarity::{self, RemoteSimilaritySearch};
use super::Analyzer;
use crate::config::AppConfig;
use crate::domain::{AnalysisFamily, Job, MhcIIMethod, MhcIMethod};
use crate::error::{PipelineError, Result};
use crate::http::HttpTransport;
use crate::supertypes::SupertypeTable;

pub type AnalyzerConstructor = Arc<dyn Fn() -> Arc<dyn Analyzer> + Send + Sync>;

/// Maps `(family, method)` to a backend constructor.
#[derive(Default)]
pub struct BackendRegistry {
    constructors: HashMap<(AnalysisFamily, String), AnalyzerConstructor>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in backend, sharing the given tool runner, HTTP transport and supertype table.
    pub fn with_defaults(
        config: &AppConfig,
        supertypes: Arc<SupertypeTable>,
        runner: Arc<dyn ProcessRunner>,
        http: Arc<dyn HttpTransport>,
        lookup: Arc<dyn MotifDescriptionLookup>,
    ) -> Self {
        let mut registry = Self::new();

        let motif_config = config.motif.clone();
        let motif_runner = runner.clone();
        registry.register(AnalysisFamily::Motif, motif::METHOD, move || {
            Arc::new(PrositeScanner::new(
                motif_config.clone(),
                motif_runner.clone(),
                lookup.clone(),
            ))
        });

        let similarity_config = config.similarity.clone();
        registry.register(AnalysisFamily::Similarity, similarity::METHOD, move || {
            Arc::new(RemoteSimilaritySearch::new(similarity_config.clone(), http.clone()))
        });

        for method in MhcIMethod::ALL {
            let mhc_config = config.mhci.clone();
            let table = supertypes.clone();
            let runner = runner.clone();
            registry.register(AnalysisFamily::MhcI, method.as_str(), move || {
                Arc::new(MhcPredictor::mhci(method, mhc_config.clone(), &table, runner.clone()))
            });
        }

        for method in MhcIIMethod::ALL {
            let mhc_config = config.mhcii.clone();
            let table = supertypes.clone();
            let runner = runner.clone();
            registry.register(AnalysisFamily::MhcII, method.as_str(), move || {
                Arc::new(MhcPredictor::mhcii(method, mhc_config.clone(), &table, runner.clone()))
            });
        }

        registry
    }

    /// Register (or replace) the backend for a method. Method names are case-insensitive.
    pub fn register<F>(&mut self, family: AnalysisFamily, method: &str, constructor: F)
    where
        F: Fn() -> Arc<dyn Analyzer> + Send + Sync + 'static,
    {
        self.constructors
            .insert((family, method.to_ascii_lowercase()), Arc::new(constructor));
    }

    /// Build the backend for a method. An unregistered method fails here, before any tool runs.
    pub fn select(&self, family: AnalysisFamily, method: &str) -> Result<Arc<dyn Analyzer>> {
        let constructor = self
            .constructors
            .get(&(family, method.to_ascii_lowercase()))
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "No {} backend registered for method '{}'",
                    family, method
                ))
            })?;
        debug!(family = %family, method, "backend selected");
        Ok(constructor())
    }

    /// Registered method names for a family, sorted.
    pub fn methods(&self, family: AnalysisFamily) -> Vec<&str> {
        let mut methods: Vec<&str> = self
            .constructors
            .keys()
            .filter(|(f, _)| *f == family)
            .map(|(_, m)| m.as_str())
            .collect();
        methods.sort_unstable();
        methods
    }

    /// One backend per family for a job: its MHC method choices plus the single
    /// motif and similarity backends.
    pub fn select_for_job(&self, job: &Job) -> Result<AnalyzerSet> {
        let mut analyzers = BTreeMap::new();
        for (family, method) in [
            (AnalysisFamily::Motif, motif::METHOD),
            (AnalysisFamily::Similarity, similarity::METHOD),
            (AnalysisFamily::MhcI, job.mhci_method.as_str()),
            (AnalysisFamily::MhcII, job.mhcii_method.as_str()),
        ] {
            analyzers.insert(family, self.select(family, method)?);
        }
        Ok(AnalyzerSet { analyzers })
    }
}

/// The backends chosen for one job, one per family.
pub struct AnalyzerSet {
    analyzers: BTreeMap<AnalysisFamily, Arc<dyn Analyzer>>,
}

impl AnalyzerSet {
    pub fn get(&self, family: AnalysisFamily) -> Option<&Arc<dyn Analyzer>> {
        self.analyzers.get(&family)
    }

    /// Backends in stage execution order.
    pub fn in_stage_order(&self) -> impl Iterator<Item = &Arc<dyn Analyzer>> {
        AnalysisFamily::ALL
            .into_iter()
            .filter_map(move |family| self.analyzers.get(&family))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::process::TokioProcessRunner;
    use crate::analyzers::{AnalysisRequest, AnalyzerReport};
    use crate::domain::{JobSubmission, StageOutput};
    use crate::error::AnalyzerError;
    use crate::http::HttpResponse;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NoHttp;

    #[async_trait]
    impl HttpTransport for NoHttp {
        async fn get(&self, url: &str) -> std::result::Result<HttpResponse, AnalyzerError> {
            panic!("unexpected GET {}", url)
        }

        async fn post_json(&self, url: &str, _body: &Value) -> std::result::Result<HttpResponse, AnalyzerError> {
            panic!("unexpected POST {}", url)
        }
    }

    struct NoLookup;

    #[async_trait]
    impl MotifDescriptionLookup for NoLookup {
        async fn describe(&self, accession: &str) -> std::result::Result<String, AnalyzerError> {
            panic!("unexpected lookup {}", accession)
        }
    }

    fn default_registry() -> BackendRegistry {
        BackendRegistry::with_defaults(
            &AppConfig::default(),
            Arc::new(SupertypeTable::bundled().unwrap()),
            Arc::new(TokioProcessRunner),
            Arc::new(NoHttp),
            Arc::new(NoLookup),
        )
    }

    #[test]
    fn test_all_built_in_methods_are_registered() {
        let registry = default_registry();
        assert_eq!(registry.methods(AnalysisFamily::Motif), vec!["ps_scan"]);
        assert_eq!(registry.methods(AnalysisFamily::Similarity), vec!["remote_blast"]);
        assert_eq!(registry.methods(AnalysisFamily::MhcI).len(), 4);
        assert_eq!(registry.methods(AnalysisFamily::MhcII).len(), 3);

        let analyzer = registry.select(AnalysisFamily::MhcII, "NetMHCIIpan").unwrap();
        assert_eq!(analyzer.family(), AnalysisFamily::MhcII);
        assert_eq!(analyzer.method(), "NetMHCIIpan");
    }

    #[test]
    fn test_unregistered_method_is_a_configuration_error() {
        let registry = default_registry();
        assert!(matches!(
            registry.select(AnalysisFamily::MhcI, "smm"),
            Err(PipelineError::Configuration(_))
        ));
        // a known method under the wrong family is still unregistered
        assert!(matches!(
            registry.select(AnalysisFamily::MhcI, "netmhciipan_el"),
            Err(PipelineError::Configuration(_))
        ));
    }

    struct Fixed(AnalysisFamily);

    #[async_trait]
    impl Analyzer for Fixed {
        fn family(&self) -> AnalysisFamily {
            self.0
        }

        fn method(&self) -> &str {
            "fixed"
        }

        async fn run(&self, _request: &AnalysisRequest) -> std::result::Result<AnalyzerReport, AnalyzerError> {
            Ok(AnalyzerReport::new(StageOutput::Motif(Vec::new())))
        }
    }

    #[test]
    fn test_select_for_job_fails_when_any_family_is_missing() {
        let mut registry = BackendRegistry::new();
        registry.register(AnalysisFamily::Motif, motif::METHOD, || Arc::new(Fixed(AnalysisFamily::Motif)));

        let submission: JobSubmission = serde_json::from_str(
            r#"{"taxonomy_exclusion_id": 0, "hcs": [{"sequence": "MDSN", "incidence": 1.0, "position": 0}]}"#,
        )
        .unwrap();
        let job = Job::new(&submission, vec![]);

        assert!(matches!(
            registry.select_for_job(&job),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_analyzer_set_follows_stage_order() {
        let mut registry = BackendRegistry::new();
        for (family, method) in [
            (AnalysisFamily::Similarity, "remote_blast"),
            (AnalysisFamily::MhcII, "netmhciipan"),
            (AnalysisFamily::MhcI, "netmhcpan"),
            (AnalysisFamily::Motif, "ps_scan"),
        ] {
            registry.register(family, method, move || Arc::new(Fixed(family)));
        }

        let submission: JobSubmission = serde_json::from_str(
            r#"{"taxonomy_exclusion_id": 0, "hcs": []}"#,
        )
        .unwrap();
        let set = registry.select_for_job(&Job::new(&submission, vec![])).unwrap();
        let order: Vec<AnalysisFamily> = set.in_stage_order().map(|a| a.family()).collect();
        assert_eq!(order, AnalysisFamily::ALL.to_vec());
    }
}
