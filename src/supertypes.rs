//! Supertype → allele tables, loaded once at startup and shared read-only.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::AnalysisFamily;
use crate::error::{PipelineError, Result};

const BUNDLED_SUPERTYPES: &str = include_str!("../data/supertypes.toml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supertype {
    pub name: String,
    pub alleles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupertypeTable {
    pub mhci: Vec<Supertype>,
    pub mhcii: Vec<Supertype>,
}

impl SupertypeTable {
    /// The table compiled into the binary.
    pub fn bundled() -> Result<Self> {
        Self::from_toml_str(BUNDLED_SUPERTYPES)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "Failed to read supertype table '{}': {}",
                path.display(),
                e
            ))
        })?;
        let table = Self::from_toml_str(&content)?;
        info!(
            "Loaded supertype table from {} ({} MHC-I, {} MHC-II supertypes)",
            path.display(),
            table.mhci.len(),
            table.mhcii.len()
        );
        Ok(table)
    }

    /// Use `path` when given, the bundled table otherwise.
    pub fn load_or_bundled(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::bundled(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: SupertypeTable = toml::from_str(content)?;
        table.validate()?;
        Ok(table)
    }

    /// Supertypes for an MHC family, in table order.
    pub fn for_family(&self, family: AnalysisFamily) -> Result<&[Supertype]> {
        match family {
            AnalysisFamily::MhcI => Ok(&self.mhci),
            AnalysisFamily::MhcII => Ok(&self.mhcii),
            other => Err(PipelineError::Configuration(format!(
                "No supertypes are defined for the {} family",
                other
            ))),
        }
    }

    pub fn alleles(&self, family: AnalysisFamily, supertype: &str) -> Result<&[String]> {
        self.for_family(family)?
            .iter()
            .find(|s| s.name == supertype)
            .map(|s| s.alleles.as_slice())
            .ok_or_else(|| {
                PipelineError::Configuration(format!("Unknown {} supertype: {}", family, supertype))
            })
    }

    fn validate(&self) -> Result<()> {
        for (family, supertypes) in [("mhci", &self.mhci), ("mhcii", &self.mhcii)] {
            if supertypes.is_empty() {
                return Err(PipelineError::Configuration(format!(
                    "Supertype table has no {} supertypes",
                    family
                )));
            }
            let mut seen = HashSet::new();
            for supertype in supertypes {
                if !seen.insert(supertype.name.as_str()) {
                    return Err(PipelineError::Configuration(format!(
                        "Duplicate {} supertype: {}",
                        family, supertype.name
                    )));
                }
                if supertype.alleles.is_empty() {
                    return Err(PipelineError::Configuration(format!(
                        "Supertype {} has no alleles",
                        supertype.name
                    )));
                }
            }
        }
        Ok(())
    }
}
