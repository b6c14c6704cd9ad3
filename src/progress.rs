//! Weighted progress computation
//!
//! Pure arithmetic over the static weight profile of a run: no IO, no
//! engine state. Weight already earned by finished modules counts in
//! full; the current module contributes a linear fraction of its weight,
//! truncated toward zero before summing, so fractional carry never leaks
//! across modules.

use crate::manifest::Module;
use serde::{Deserialize, Serialize};

/// Progress record emitted to the presentation boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressInfo {
    pub percentage: f64,
    pub current_module: String,
    pub current_step: String,
    pub step_index: usize,
    pub total_steps: usize,
}

/// Converts (module index, step index, total steps) into a 0–100
/// completion percentage against a fixed weight profile.
#[derive(Debug, Clone)]
pub struct ProgressCalculator {
    weights: Vec<u32>,
    total_weight: u64,
}

impl ProgressCalculator {
    /// Capture the weight profile of the given module set.
    pub fn new(modules: &[Module]) -> Self {
        Self::from_weights(modules.iter().map(|m| m.command.weight).collect())
    }

    /// Build directly from a weight profile.
    pub fn from_weights(weights: Vec<u32>) -> Self {
        let total_weight = weights.iter().map(|&w| w as u64).sum();
        Self {
            weights,
            total_weight,
        }
    }

    /// Completion percentage with `module_index` modules fully done and
    /// `step_index` of `total_steps` steps done in the current module.
    ///
    /// A zero total weight yields 0 regardless of position.
    pub fn calculate(&self, module_index: usize, step_index: usize, total_steps: usize) -> f64 {
        if self.total_weight == 0 {
            return 0.0;
        }

        let mut completed: u64 = self
            .weights
            .iter()
            .take(module_index)
            .map(|&w| w as u64)
            .sum();

        if module_index < self.weights.len() && total_steps > 0 {
            let weight = self.weights[module_index] as f64;
            let step_fraction = step_index as f64 / total_steps as f64;
            // Truncate toward zero: integer weighting semantics.
            completed += (weight * step_fraction) as u64;
        }

        (completed as f64 / self.total_weight as f64) * 100.0
    }
}
