use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "hcs-pipeline.toml";
pub const CONFIG_PATH_ENV: &str = "HCS_PIPELINE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub motif: MotifConfig,
    pub similarity: SimilarityConfig,
    pub mhci: MhcConfig,
    pub mhcii: MhcConfig,
    pub pipeline: PipelineConfig,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotifConfig {
    pub executable: PathBuf,
    pub database: PathBuf,
    pub timeout_secs: u64,
    pub lookup_base_url: String,
    pub lookup_retries: u32,
}

impl Default for MotifConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("ps_scan/ps_scan.pl"),
            database: PathBuf::from("ps_scan/prosite.dat"),
            timeout_secs: 300,
            lookup_base_url: "https://prosite.expasy.org".to_string(),
            lookup_retries: 5,
        }
    }
}

/// Reference database searched by the remote similarity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimilarityDatabase {
    #[default]
    #[serde(rename = "VNR")]
    Vnr,
    #[serde(rename = "HumanNR")]
    HumanNr,
    #[serde(rename = "pdbaa")]
    PdbAa,
}

impl SimilarityDatabase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityDatabase::Vnr => "VNR",
            SimilarityDatabase::HumanNr => "HumanNR",
            SimilarityDatabase::PdbAa => "pdbaa",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub base_url: String,
    pub database: SimilarityDatabase,
    pub poll_interval_secs: u64,
    pub max_polls: u32,
    pub request_timeout_secs: u64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            database: SimilarityDatabase::default(),
            poll_interval_secs: 5,
            max_polls: 120,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MhcConfig {
    pub install_path: PathBuf,
    pub script: String,
    pub length: u32,
    pub cutoff: f64,
    pub timeout_secs: u64,
}

impl MhcConfig {
    pub fn mhci_default() -> Self {
        Self {
            install_path: PathBuf::from("mhc_i"),
            script: "src/predict_binding.py".to_string(),
            length: 9,
            cutoff: 1.0,
            timeout_secs: 600,
        }
    }

    pub fn mhcii_default() -> Self {
        Self {
            install_path: PathBuf::from("mhc_ii"),
            script: "mhc_II_binding.py".to_string(),
            length: 15,
            cutoff: 1.0,
            timeout_secs: 600,
        }
    }

    /// Full path of the prediction script.
    pub fn script_path(&self) -> PathBuf {
        self.install_path.join(&self.script)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First failed stage ends the job in `error`.
    #[default]
    FailFast,
    /// Keep going; the job ends `partial` when some stages failed.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub supertypes_path: Option<PathBuf>,
    pub stage_lease_secs: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            supertypes_path: None,
            stage_lease_secs: 3600,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            motif: MotifConfig::default(),
            similarity: SimilarityConfig::default(),
            mhci: MhcConfig::mhci_default(),
            mhcii: MhcConfig::mhcii_default(),
            pipeline: PipelineConfig::default(),
            metrics_port: None,
        }
    }
}

impl AppConfig {
    /// Load from `HCS_PIPELINE_CONFIG` or `hcs-pipeline.toml`, then apply env overrides.
    /// A missing file is not an error; every section has defaults.
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = Path::new(&path);

        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawAppConfig = toml::from_str(content)?;
        let config = raw.into_config();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("PROSITE_INSTALL_PATH") {
            self.motif.executable = PathBuf::from(v);
        }
        if let Ok(v) = env::var("PROSITE_DB_PATH") {
            self.motif.database = PathBuf::from(v);
        }
        if let Ok(v) = env::var("BLAST_BASE_URL") {
            self.similarity.base_url = v;
        }
        if let Ok(v) = env::var("IEDB_MHCI_INSTALL_PATH") {
            self.mhci.install_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("IEDB_MHCII_INSTALL_PATH") {
            self.mhcii.install_path = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.motif.timeout_secs == 0 {
            return Err(invalid("motif.timeout_secs must be greater than zero"));
        }
        if self.similarity.request_timeout_secs == 0 {
            return Err(invalid("similarity.request_timeout_secs must be greater than zero"));
        }
        if self.similarity.max_polls == 0 {
            return Err(invalid("similarity.max_polls must be greater than zero"));
        }
        for (name, mhc) in [("mhci", &self.mhci), ("mhcii", &self.mhcii)] {
            if mhc.timeout_secs == 0 {
                return Err(invalid(&format!("{}.timeout_secs must be greater than zero", name)));
            }
            if mhc.length == 0 {
                return Err(invalid(&format!("{}.length must be greater than zero", name)));
            }
            if !mhc.cutoff.is_finite() || mhc.cutoff < 0.0 {
                return Err(invalid(&format!("{}.cutoff must be a non-negative number", name)));
            }
        }
        if self.pipeline.stage_lease_secs == 0 {
            return Err(invalid("pipeline.stage_lease_secs must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> PipelineError {
    PipelineError::Configuration(message.to_string())
}

/// File shape. The two MHC sections default differently, so they are read as
/// overrides and applied on top of their family defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAppConfig {
    motif: MotifConfig,
    similarity: SimilarityConfig,
    mhci: MhcOverrides,
    mhcii: MhcOverrides,
    pipeline: PipelineConfig,
    metrics_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MhcOverrides {
    install_path: Option<PathBuf>,
    script: Option<String>,
    length: Option<u32>,
    cutoff: Option<f64>,
    timeout_secs: Option<u64>,
}

impl MhcOverrides {
    fn apply(self, mut base: MhcConfig) -> MhcConfig {
        if let Some(v) = self.install_path {
            base.install_path = v;
        }
        if let Some(v) = self.script {
            base.script = v;
        }
        if let Some(v) = self.length {
            base.length = v;
        }
        if let Some(v) = self.cutoff {
            base.cutoff = v;
        }
        if let Some(v) = self.timeout_secs {
            base.timeout_secs = v;
        }
        base
    }
}

impl RawAppConfig {
    fn into_config(self) -> AppConfig {
        AppConfig {
            motif: self.motif,
            similarity: self.similarity,
            mhci: self.mhci.apply(MhcConfig::mhci_default()),
            mhcii: self.mhcii.apply(MhcConfig::mhcii_default()),
            pipeline: self.pipeline,
            metrics_port: self.metrics_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.mhci.length, 9);
        assert_eq!(config.mhcii.length, 15);
        assert_eq!(config.mhci.cutoff, 1.0);
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.similarity.database, SimilarityDatabase::Vnr);
    }

    #[test]
    fn test_partial_file_keeps_section_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            metrics_port = 9100

            [similarity]
            database = "HumanNR"
            max_polls = 10

            [mhcii]
            cutoff = 2.5

            [pipeline]
            failure_policy = "continue"
            "#,
        )
        .unwrap();

        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.similarity.database, SimilarityDatabase::HumanNr);
        assert_eq!(config.similarity.max_polls, 10);
        assert_eq!(config.similarity.poll_interval_secs, 5);
        assert_eq!(config.mhcii.cutoff, 2.5);
        assert_eq!(config.mhcii.length, 15);
        assert_eq!(config.mhci.length, 9);
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::Continue);
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        for content in [
            "[motif]\ntimeout_secs = 0\n",
            "[similarity]\nmax_polls = 0\n",
            "[mhci]\nlength = 0\n",
            "[mhcii]\ncutoff = -1.0\n",
            "[pipeline]\nstage_lease_secs = 0\n",
        ] {
            assert!(
                matches!(
                    AppConfig::from_toml_str(content),
                    Err(PipelineError::Configuration(_))
                ),
                "expected configuration error for {:?}",
                content
            );
        }
    }

    #[test]
    fn test_unknown_database_fails_to_parse() {
        assert!(matches!(
            AppConfig::from_toml_str("[similarity]\ndatabase = \"nr\"\n"),
            Err(PipelineError::Toml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mhci]\ninstall_path = \"/opt/iedb/mhc_i\"\n").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.mhci.script_path(),
            PathBuf::from("/opt/iedb/mhc_i/src/predict_binding.py")
        );
    }
}
