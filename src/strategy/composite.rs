//! Composite odds analysis across a multi-leg slate.
//!
//! When several legs cover one outcome space, the purchase behaves like
//! a single wager at a blended multiplier. The blend is the stake-share
//! harmonic combination of the leg odds — the same identity dutching
//! uses. Below the torigami threshold the purchaser cannot profit even
//! on a correct prediction, which is surfaced as a warning, not a
//! selection criterion.

use tracing::warn;

use crate::types::SelectedBet;

/// Composite odds result for a final slate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CompositeAnalysis {
    /// Effective blended payout multiplier across all legs.
    pub composite_odds: f64,
    pub is_torigami: bool,
    /// Human-readable warning, present only when torigami.
    pub warning: Option<String>,
}

/// Analyzes the final selected slate for value-destroying structures.
pub struct CompositeOddsAnalyzer {
    torigami_threshold: f64,
}

impl CompositeOddsAnalyzer {
    pub fn new(torigami_threshold: f64) -> Self {
        Self { torigami_threshold }
    }

    /// Blended multiplier for the slate, or `None` for slates of fewer
    /// than two legs (a single leg has no composite to analyze).
    ///
    /// `composite = total_stake / Σ(stake_i / odds_i)` — the payout on a
    /// fully dutched purchase when any one leg wins.
    pub fn analyze(&self, legs: &[SelectedBet]) -> Option<CompositeAnalysis> {
        if legs.len() < 2 {
            return None;
        }

        let total_stake: f64 = legs.iter().map(|l| l.stake as f64).sum();
        let weighted_inverse: f64 = legs
            .iter()
            .map(|l| {
                let odds = l
                    .candidate
                    .odds
                    .resolve(crate::types::OddsPolicy::Midpoint);
                if odds > 0.0 {
                    l.stake as f64 / odds
                } else {
                    0.0
                }
            })
            .sum();

        if total_stake <= 0.0 || weighted_inverse <= 0.0 {
            return None;
        }

        let composite_odds = total_stake / weighted_inverse;
        let is_torigami = composite_odds < self.torigami_threshold;
        let warning = if is_torigami {
            let text = format!(
                "Composite odds {composite_odds:.2} across {} legs fall below {:.1}: \
                 a correct prediction still loses money once every covered outcome \
                 is considered. Reduce the leg count or add a longshot.",
                legs.len(),
                self.torigami_threshold,
            );
            warn!(
                composite_odds = format!("{composite_odds:.2}"),
                legs = legs.len(),
                "Torigami slate detected"
            );
            Some(text)
        } else {
            None
        };

        Some(CompositeAnalysis {
            composite_odds,
            is_torigami,
            warning,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
