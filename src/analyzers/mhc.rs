//! MHC-I and MHC-II epitope prediction through the IEDB standalone tools.
//!
//! The tool is run once per allele of every supertype. Its table is decoded with the
//! layout of the selected method and only candidates at or below the percentile
//! cutoff are kept.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::process::{ProcessRunner, ProcessSpec};
use super::{AnalysisRequest, Analyzer, AnalyzerReport};
use crate::config::MhcConfig;
use crate::domain::{AnalysisFamily, Epitope, MhcIIMethod, MhcIMethod, StageOutput, SupertypeEpitopes};
use crate::error::AnalyzerError;
use crate::normalize::{epitope_from_row, mhci_layout, mhcii_layout, parse_table, TableLayout};
use crate::supertypes::{Supertype, SupertypeTable};

/// Keep the candidates whose percentile is at or below `cutoff`.
pub fn filter_by_cutoff(epitopes: Vec<Epitope>, cutoff: f64) -> Vec<Epitope> {
    epitopes.into_iter().filter(|e| e.percentile <= cutoff).collect()
}

pub struct MhcPredictor {
    family: AnalysisFamily,
    method: &'static str,
    layout: &'static TableLayout,
    config: MhcConfig,
    supertypes: Vec<Supertype>,
    runner: Arc<dyn ProcessRunner>,
}

impl MhcPredictor {
    pub fn mhci(
        method: MhcIMethod,
        config: MhcConfig,
        table: &SupertypeTable,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            family: AnalysisFamily::MhcI,
            method: method.as_str(),
            layout: mhci_layout(method),
            config,
            supertypes: table.mhci.clone(),
            runner,
        }
    }

    pub fn mhcii(
        method: MhcIIMethod,
        config: MhcConfig,
        table: &SupertypeTable,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            family: AnalysisFamily::MhcII,
            method: method.as_str(),
            layout: mhcii_layout(method),
            config,
            supertypes: table.mhcii.clone(),
            runner,
        }
    }

    fn spec_for(&self, allele: &str, input: &NamedTempFile) -> ProcessSpec {
        let file = input.path().display().to_string();
        let length = self.config.length.to_string();
        let spec = ProcessSpec::new(
            self.config.script_path(),
            Duration::from_secs(self.config.timeout_secs),
        )
        .current_dir(&self.config.install_path)
        .arg(self.method)
        .arg(allele);

        // predict_binding.py takes the length before the input file, mhc_II_binding.py after it.
        match self.family {
            AnalysisFamily::MhcII => spec.arg(file).arg(length),
            _ => spec.arg(length).arg(file),
        }
    }

    /// Predict for one allele. `Ok(None)` means the tool reported a problem on stderr
    /// without producing a table; the allele is skipped with a warning.
    async fn predict_allele(
        &self,
        allele: &str,
        input: &NamedTempFile,
    ) -> Result<Option<Vec<Epitope>>, AnalyzerError> {
        let output = self.runner.run(&self.spec_for(allele, input)).await?;
        let stderr = output.stderr.trim().to_string();
        let stdout = output.into_stdout(self.method)?;

        if stdout.trim().is_empty() && !stderr.is_empty() {
            return Ok(None);
        }

        let rows = parse_table(&stdout, self.layout)?;
        let epitopes = rows
            .iter()
            .map(epitope_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(filter_by_cutoff(epitopes, self.config.cutoff)))
    }
}

#[async_trait]
impl Analyzer for MhcPredictor {
    fn family(&self) -> AnalysisFamily {
        self.family
    }

    fn method(&self) -> &str {
        self.method
    }

    async fn run(&self, request: &AnalysisRequest) -> Result<AnalyzerReport, AnalyzerError> {
        let input = write_sequence_file(&request.sequence)?;
        let mut results = SupertypeEpitopes::new();
        let mut warnings = Vec::new();

        for supertype in &self.supertypes {
            let mut kept = Vec::new();
            for allele in &supertype.alleles {
                match self.predict_allele(allele, &input).await? {
                    Some(epitopes) => kept.extend(epitopes),
                    None => {
                        warn!(family = %self.family, allele = %allele, "prediction tool reported errors, allele skipped");
                        warnings.push(format!("{} {}: prediction skipped", supertype.name, allele));
                    }
                }
            }
            debug!(family = %self.family, supertype = %supertype.name, epitopes = kept.len(), "supertype predicted");
            results.insert(supertype.name.clone(), kept);
        }

        let output = match self.family {
            AnalysisFamily::MhcII => StageOutput::MhcII(results),
            _ => StageOutput::MhcI(results),
        };
        Ok(AnalyzerReport::new(output).with_warnings(warnings))
    }
}

fn write_sequence_file(sequence: &str) -> Result<NamedTempFile, AnalyzerError> {
    let mut file = NamedTempFile::new()
        .map_err(|e| AnalyzerError::tool(format!("failed to create input file: {}", e)))?;
    writeln!(file, "{}", sequence)
        .and_then(|_| file.flush())
        .map_err(|e| AnalyzerError::tool(format!("failed to write input file: {}", e)))?;
    Ok(file)
}
