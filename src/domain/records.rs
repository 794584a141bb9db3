//! Canonical records produced by every analysis backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A structural or functional signature found by the motif scanner.
///
/// Coordinates are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotifMatch {
    pub accession: String,
    pub description: String,
    pub start: u32,
    pub end: u32,
}

/// One described hit from the sequence similarity search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub accession: String,
    pub species: Option<String>,
    pub strain: Option<String>,
    pub taxonomy_id: Option<u64>,
    pub title: String,
}

impl SimilarityHit {
    pub fn new(accession: String, species: Option<String>, taxonomy_id: Option<u64>, title: String) -> Self {
        let strain = species.as_deref().and_then(strain_from_species);
        Self {
            accession,
            species,
            strain,
            taxonomy_id,
            title,
        }
    }
}

/// Extract the strain from a scientific name such as `Human coronavirus (strain OC43)`.
///
/// Purely alphanumeric names never carry a strain. The strain is the text inside the
/// first parenthesis, closed by a `)` ending the name (or the first `)` otherwise);
/// a leading `strain` keyword is dropped.
pub fn strain_from_species(species: &str) -> Option<String> {
    if species.is_empty() || species.chars().all(char::is_alphanumeric) {
        return None;
    }

    let open = species.find('(')?;
    let inner = &species[open + 1..];
    let inner = inner
        .strip_suffix(')')
        .or_else(|| inner.find(')').map(|close| &inner[..close]))
        .unwrap_or(inner)
        .trim();
    let inner = match inner.strip_prefix("strain") {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => inner,
    };

    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

/// A predicted MHC binder. Lower percentile means a stronger predicted binder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epitope {
    pub allele: String,
    pub peptide: String,
    pub percentile: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Epitopes keyed by supertype label (`A1`, `B7`, `DR`, ...).
pub type SupertypeEpitopes = BTreeMap<String, Vec<Epitope>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strain_is_parsed_from_parenthesized_suffix() {
        assert_eq!(
            strain_from_species("Human coronavirus (strain OC43)"),
            Some("OC43".to_string())
        );
        assert_eq!(
            strain_from_species("Influenza A virus (A/Puerto Rico/8/1934(H1N1))"),
            Some("A/Puerto Rico/8/1934(H1N1)".to_string())
        );
    }

    #[test]
    fn test_alphanumeric_species_has_no_strain() {
        assert_eq!(strain_from_species("SARSCoV2"), None);
        assert_eq!(strain_from_species(""), None);
    }

    #[test]
    fn test_species_without_parentheses_has_no_strain() {
        assert_eq!(strain_from_species("Severe acute respiratory syndrome coronavirus 2"), None);
    }

    #[test]
    fn test_similarity_hit_derives_strain() {
        let hit = SimilarityHit::new(
            "P0DTC2".to_string(),
            Some("Bat coronavirus (BtCoV/273/2005)".to_string()),
            Some(389166),
            "Spike glycoprotein".to_string(),
        );
        assert_eq!(hit.strain.as_deref(), Some("BtCoV/273/2005"));

        let hit = SimilarityHit::new("X".to_string(), None, None, "untitled".to_string());
        assert_eq!(hit.strain, None);
    }
}
