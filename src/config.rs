//! Validated configuration for the aggregation engine.
//!
//! The reclassification table is a configuration value rather than a
//! hard-coded constant so the engine can serve other categorical domains.

use crate::types::{AggError, AggResult, CellCode, PixelState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How to treat the pre-masked sentinel value (cells masked out upstream as
/// definitionally not the feature, e.g. deep water or uplands).
///
/// Folding to `Absent` is the default; exclusion is available for domains
/// where masked cells should not enter the counts at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PremaskedPolicy {
    /// Pre-masked cells count as observed-and-absent
    FoldToAbsent,
    /// Pre-masked cells are treated as unobserved
    Exclude,
}

/// Reclassification table mapping raw classifier codes to canonical states
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclassConfig {
    /// Raw code -> canonical state. Every code the classifier can emit must
    /// appear here; unmapped codes abort the reclassification.
    pub value_map: BTreeMap<CellCode, PixelState>,
    /// Raw sentinel for pre-masked cells, when the domain uses one
    pub premasked_code: Option<CellCode>,
    pub premasked_policy: PremaskedPolicy,
}

impl ReclassConfig {
    /// The Sentinel-2 sargassum classifier domain:
    /// 1 = present, 0 = absent, -1 = no data (clouds),
    /// -9999 = pre-masked non-feature pixels (deep water, uplands)
    pub fn sargassum() -> Self {
        let mut value_map = BTreeMap::new();
        value_map.insert(1, PixelState::Present);
        value_map.insert(0, PixelState::Absent);
        value_map.insert(-1, PixelState::Invalid);
        value_map.insert(-9999, PixelState::Absent);
        Self {
            value_map,
            premasked_code: Some(-9999),
            premasked_policy: PremaskedPolicy::FoldToAbsent,
        }
    }

    /// Identity mapping over the canonical three-state domain
    pub fn identity() -> Self {
        let mut value_map = BTreeMap::new();
        value_map.insert(1, PixelState::Present);
        value_map.insert(0, PixelState::Absent);
        value_map.insert(-1, PixelState::Invalid);
        Self {
            value_map,
            premasked_code: None,
            premasked_policy: PremaskedPolicy::FoldToAbsent,
        }
    }

    /// Check the table against the set of codes the source domain emits:
    /// every expected code mapped, nothing extra.
    pub fn validate(&self, expected_codes: &[CellCode]) -> AggResult<()> {
        for code in expected_codes {
            if !self.value_map.contains_key(code) {
                return Err(AggError::Config(format!(
                    "reclassification table is missing expected code {}",
                    code
                )));
            }
        }
        for code in self.value_map.keys() {
            if !expected_codes.contains(code) {
                return Err(AggError::Config(format!(
                    "reclassification table has unexpected code {}",
                    code
                )));
            }
        }
        if let Some(premasked) = self.premasked_code {
            if !self.value_map.contains_key(&premasked) {
                return Err(AggError::Config(format!(
                    "pre-masked code {} is not in the reclassification table",
                    premasked
                )));
            }
        }
        Ok(())
    }

    /// Resolve one raw code to its canonical state, applying the
    /// pre-masked policy. `None` means the cell is dropped from counts
    /// entirely (only possible under `PremaskedPolicy::Exclude`).
    pub fn resolve(&self, code: CellCode) -> Option<Option<PixelState>> {
        if self.premasked_code == Some(code)
            && self.premasked_policy == PremaskedPolicy::Exclude
        {
            return Some(None);
        }
        self.value_map.get(&code).map(|s| Some(*s))
    }
}
