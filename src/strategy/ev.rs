//! Expected-value calculation.
//!
//! Combines a wager's success probability with its market odds to
//! produce an expected return and a qualitative rating. This calculator
//! never recommends action — it only produces the number and the label;
//! selection is downstream's business.

use crate::types::{EngineError, Odds, OddsPolicy, ValueRating};

/// A computed valuation for one candidate wager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Valuation {
    /// `resolved_odds × probability`. Zero when data is insufficient.
    pub expected_return: f64,
    pub rating: ValueRating,
}

/// Computes expected returns under a configured odds-band policy.
pub struct EvCalculator {
    policy: OddsPolicy,
}

impl EvCalculator {
    pub fn new(policy: OddsPolicy) -> Self {
        Self { policy }
    }

    /// The active band-resolution policy.
    pub fn policy(&self) -> OddsPolicy {
        self.policy
    }

    /// Evaluate a success probability against market odds.
    ///
    /// Non-finite odds or probability is a caller contract violation.
    /// Odds ≤ 0 or probability ≤ 0 yields the `InsufficientData` rating
    /// (a distinct classification, not a numeric error).
    pub fn evaluate(&self, probability: f64, odds: &Odds) -> Result<Valuation, EngineError> {
        if !probability.is_finite() {
            return Err(EngineError::InvalidProbability {
                horse: 0,
                value: probability,
            });
        }
        if !odds.is_finite() {
            return Err(EngineError::NonFiniteOdds {
                bet_type: crate::types::BetType::Win,
                horses: Vec::new(),
            });
        }

        let multiplier = odds.resolve(self.policy);
        if multiplier <= 0.0 || probability <= 0.0 {
            return Ok(Valuation {
                expected_return: 0.0,
                rating: ValueRating::InsufficientData,
            });
        }

        let expected_return = multiplier * probability;
        if !expected_return.is_finite() {
            return Ok(Valuation {
                expected_return: 0.0,
                rating: ValueRating::InsufficientData,
            });
        }

        Ok(Valuation {
            expected_return,
            rating: ValueRating::classify(expected_return),
        })
    }
}

impl Default for EvCalculator {
    fn default() -> Self {
        Self::new(OddsPolicy::Midpoint)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
