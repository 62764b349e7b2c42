//! Reconciliation configuration: the persisted JSON document
//! `{version, mappings, virtualFields, transformations, sortConfiguration}`
//! plus the `validate()` pass that rejects a bad config before any row is
//! processed.

use serde::Deserialize;

use crate::error::ReconError;
use crate::matchpred::{ToleranceSpec, ToleranceUnit};
use crate::model::{ColumnMapping, VirtualField};
use crate::transform::TransformationStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    Exact,
    Fuzzy,
    Smart,
}

/// `sortConfiguration`: the keys used to order each side for streaming, plus
/// the tolerance window and strategy governing how rows are admitted as
/// candidates.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortConfiguration {
    pub source_sort_key: String,
    pub target_sort_key: String,
    #[serde(default)]
    pub tolerance: f64,
    #[serde(default = "default_tolerance_unit")]
    pub tolerance_unit: ToleranceUnit,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_match_strategy")]
    pub match_strategy: MatchStrategy,
}

fn default_tolerance_unit() -> ToleranceUnit {
    ToleranceUnit::Exact
}
fn default_chunk_size() -> usize {
    10_000
}
fn default_match_strategy() -> MatchStrategy {
    MatchStrategy::Exact
}

impl SortConfiguration {
    pub fn tolerance_spec(&self) -> ToleranceSpec {
        ToleranceSpec { tolerance: self.tolerance, unit: self.tolerance_unit }
    }
}

/// The full persisted reconciliation config document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconConfig {
    pub version: u32,
    pub mappings: Vec<ColumnMapping>,
    #[serde(default)]
    pub virtual_fields: Vec<VirtualField>,
    #[serde(default)]
    pub transformations: Vec<TransformationStep>,
    pub sort_configuration: SortConfiguration,
}

impl ReconConfig {
    pub fn from_json(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig = serde_json::from_str(input)
            .map_err(|e| ReconError::ConfigInvalid { reason: format!("JSON parse error: {e}") })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.mappings.is_empty() {
            return Err(ReconError::ConfigInvalid { reason: "mappings must not be empty".into() });
        }
        for m in &self.mappings {
            if m.target.is_empty() {
                return Err(ReconError::ConfigInvalid {
                    reason: format!("mapping '{}': target column name must not be empty", m.id),
                });
            }
            if m.match_kind != crate::model::MatchKind::Formula && m.source.is_empty() {
                return Err(ReconError::ConfigInvalid {
                    reason: format!("mapping '{}': source selector must not be empty", m.id),
                });
            }
            if m.match_kind == crate::model::MatchKind::Formula && m.formula.is_none() {
                return Err(ReconError::ConfigInvalid {
                    reason: format!("mapping '{}': formula match kind requires a formula descriptor", m.id),
                });
            }
        }
        for f in &self.virtual_fields {
            if !f.is_well_formed() {
                return Err(ReconError::ConfigInvalid {
                    reason: format!(
                        "virtual field '{}': operations.len() must equal fields.len() - 1",
                        f.name
                    ),
                });
            }
        }
        crate::transform::validate_pipeline(&self.transformations_for(crate::model::Side::Source))?;
        crate::transform::validate_pipeline(&self.transformations_for(crate::model::Side::Target))?;

        if self.sort_configuration.source_sort_key.is_empty()
            || self.sort_configuration.target_sort_key.is_empty()
        {
            return Err(ReconError::ConfigInvalid { reason: "sort keys must not be empty".into() });
        }
        if self.sort_configuration.chunk_size == 0 {
            return Err(ReconError::ConfigInvalid { reason: "chunk_size must be positive".into() });
        }
        if self.sort_configuration.tolerance < 0.0 {
            return Err(ReconError::ConfigInvalid { reason: "tolerance must be non-negative".into() });
        }

        Ok(())
    }

    pub fn virtual_fields_for(&self, side: crate::model::Side) -> Vec<VirtualField> {
        self.virtual_fields.iter().filter(|f| f.side == side).cloned().collect()
    }

    pub fn transformations_for(&self, side: crate::model::Side) -> Vec<TransformationStep> {
        self.transformations.iter().filter(|s| s.side == side).cloned().collect()
    }
}
