//! Per-source score calibration.
//!
//! Converts one source's raw relative scores into a probability
//! distribution via temperature-scaled softmax. Each source carries its
//! own β so that habitually over- or under-spread score scales land on
//! a comparable probability scale before pooling.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::SourcesConfig;
use crate::types::{EngineError, SourcePrediction, WinDistribution};

/// Calibrates raw source scores into per-source win distributions.
pub struct SourceCalibrator {
    config: SourcesConfig,
}

impl SourceCalibrator {
    pub fn new(config: SourcesConfig) -> Self {
        Self { config }
    }

    /// Access the calibration configuration.
    pub fn config(&self) -> &SourcesConfig {
        &self.config
    }

    /// Calibrate one source's scores into a probability distribution.
    ///
    /// Softmax with the max score subtracted first for numerical
    /// stability: `p_i = exp(β·(s_i − max)) / Σ exp(β·(s_j − max))`.
    ///
    /// An empty score list yields the empty distribution — the source is
    /// unusable, which is a data condition, not an error. A non-finite
    /// score is a caller contract violation and fails loudly. Duplicate
    /// horse numbers are a caller contract violation as well; the last
    /// entry silently winning would hide upstream bugs.
    pub fn calibrate(&self, prediction: &SourcePrediction) -> Result<WinDistribution, EngineError> {
        if prediction.scores.is_empty() {
            debug!(source = %prediction.source, "No scores — source unusable");
            return Ok(WinDistribution::empty());
        }

        let beta = self.config.beta_for(&prediction.source);

        let mut max_score = f64::NEG_INFINITY;
        for entry in &prediction.scores {
            if !entry.score.is_finite() {
                return Err(EngineError::NonFiniteScore {
                    source_name: prediction.source.clone(),
                    horse: entry.horse,
                    value: entry.score,
                });
            }
            if entry.score > max_score {
                max_score = entry.score;
            }
        }

        let mut masses: BTreeMap<u32, f64> = BTreeMap::new();
        for entry in &prediction.scores {
            let mass = (beta * (entry.score - max_score)).exp();
            if masses.insert(entry.horse, mass).is_some() {
                return Err(EngineError::DuplicateHorse { horse: entry.horse });
            }
        }

        let dist = WinDistribution::normalized(masses);
        debug!(
            source = %prediction.source,
            beta,
            horses = dist.len(),
            favorite = ?dist.favorite(),
            "Source calibrated"
        );
        Ok(dist)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
