//! Cross-source opinion pooling.
//!
//! Fuses several calibrated per-source distributions into one consensus
//! win distribution using weighted log-linear (product-of-experts)
//! pooling over the intersection of horses every contributing source
//! scored. A horse unscored by some source cannot be fairly compared on
//! a log scale, hence intersection rather than union.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::config::SourcesConfig;
use crate::types::WinDistribution;

/// Probability floor inside the log, so a zero never becomes -∞.
const LOG_FLOOR: f64 = 1e-10;

/// Fuses per-source distributions into a consensus distribution.
pub struct OpinionPool {
    config: SourcesConfig,
}

impl OpinionPool {
    pub fn new(config: SourcesConfig) -> Self {
        Self { config }
    }

    /// Pool calibrated distributions, weighted per source.
    ///
    /// Sources with an empty distribution are unusable and excluded
    /// before the intersection is taken; sources with zero fusion weight
    /// do not contribute. Returns the empty distribution when nothing
    /// usable remains or the intersection is empty — the caller decides
    /// whether to fall back to a single source or report insufficient
    /// data. Deterministic: identical inputs always pool identically.
    pub fn pool(&self, sources: &[(String, WinDistribution)]) -> WinDistribution {
        let contributing: Vec<(&str, &WinDistribution, f64)> = sources
            .iter()
            .filter(|(_, dist)| !dist.is_empty())
            .map(|(name, dist)| {
                let weight = self.config.weight_for(name, sources.len());
                (name.as_str(), dist, weight)
            })
            .filter(|(_, _, weight)| *weight > 0.0)
            .collect();

        if contributing.is_empty() {
            debug!("No usable sources to pool");
            return WinDistribution::empty();
        }

        // Intersection of horses scored by every contributing source.
        let (_, first, _) = contributing[0];
        let intersection: Vec<u32> = first
            .horses()
            .filter(|&h| {
                contributing[1..]
                    .iter()
                    .all(|(_, dist, _)| dist.probability(h).is_some())
            })
            .collect();

        if intersection.is_empty() {
            info!(
                sources = contributing.len(),
                "Empty intersection — no horse scored by all sources"
            );
            return WinDistribution::empty();
        }

        let mut masses: BTreeMap<u32, f64> = BTreeMap::new();
        for &horse in &intersection {
            let log_mass: f64 = contributing
                .iter()
                .map(|(_, dist, weight)| {
                    let p = dist.probability(horse).unwrap_or(0.0).max(LOG_FLOOR);
                    weight * p.ln()
                })
                .sum();
            masses.insert(horse, log_mass.exp());
        }

        let consensus = WinDistribution::normalized(masses);
        debug!(
            sources = contributing.len(),
            horses = consensus.len(),
            favorite = ?consensus.favorite(),
            "Opinion pool complete"
        );
        consensus
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
