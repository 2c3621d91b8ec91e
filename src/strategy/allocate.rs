//! Fund allocation across the selected slate.
//!
//! Fixed-budget mode spreads the budget proportionally to each leg's
//! weight and rounds to the wagering denomination, handing the rounding
//! remainder to the strongest leg. Bankroll mode first scales the
//! bankroll into a race-level budget via a confidence factor derived
//! from how concentrated the consensus distribution is, then applies
//! fixed-budget allocation within it. Weighting is proportional-to-EV
//! by default, or a Kelly-style edge weighting on request.

use tracing::{debug, info};

use crate::config::AllocationConfig;
use crate::types::{BetCandidate, Budget, EngineError, OddsPolicy, SelectedBet, WinDistribution};

// ---------------------------------------------------------------------------
// Modes and results
// ---------------------------------------------------------------------------

/// How stakes are weighted across legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationMode {
    /// Stakes proportional to each leg's expected return.
    #[default]
    Proportional,
    /// Stakes proportional to each leg's Kelly fraction `(b·p − q) / b`.
    EdgeWeighted,
}

impl std::fmt::Display for AllocationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationMode::Proportional => write!(f, "proportional-EV"),
            AllocationMode::EdgeWeighted => write!(f, "edge-weighted"),
        }
    }
}

/// A completed allocation for one race.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub bets: Vec<SelectedBet>,
    /// Sum of all stakes, in currency units.
    pub total_spent: u64,
    /// Unspent portion of the budget (or bankroll).
    pub remaining: f64,
    /// Human-readable description of the strategy applied.
    pub strategy: String,
}

impl Allocation {
    /// An allocation that spends nothing.
    fn unspent(budget: &Budget, reason: &str) -> Self {
        Self {
            bets: Vec::new(),
            total_spent: 0,
            remaining: budget.amount(),
            strategy: reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

/// Distributes a budget or bankroll fraction across selected candidates.
pub struct FundAllocator {
    config: AllocationConfig,
}

impl FundAllocator {
    pub fn new(config: AllocationConfig) -> Self {
        Self { config }
    }

    /// Access the allocation configuration.
    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// Assign stakes to the slate. Candidates are expected in selection
    /// order (expected return descending). An empty slate allocates
    /// nothing and reports the budget entirely unspent.
    pub fn allocate(
        &self,
        candidates: &[BetCandidate],
        budget: &Budget,
        consensus: &WinDistribution,
        mode: AllocationMode,
    ) -> Result<Allocation, EngineError> {
        if !budget.is_valid() {
            return Err(EngineError::InvalidBudget(format!(
                "{budget} is not a positive finite amount"
            )));
        }
        if candidates.is_empty() {
            return Ok(Allocation::unspent(budget, "no qualifying wagers"));
        }

        let (race_budget, scaling_note) = match *budget {
            Budget::Fixed(amount) => (amount, format!("fixed budget ¥{amount:.0}")),
            Budget::Bankroll(bankroll) => {
                let confidence = self.confidence_factor(consensus);
                let fraction = self.config.min_bankroll_fraction
                    + (self.config.max_bankroll_fraction - self.config.min_bankroll_fraction)
                        * confidence;
                let amount = bankroll * fraction;
                debug!(
                    bankroll,
                    confidence = format!("{confidence:.2}"),
                    fraction = format!("{fraction:.3}"),
                    race_budget = format!("{amount:.0}"),
                    "Bankroll scaled to race budget"
                );
                (
                    amount,
                    format!(
                        "bankroll ¥{bankroll:.0} × {:.1}% (confidence {confidence:.2}) → ¥{amount:.0}",
                        fraction * 100.0
                    ),
                )
            }
        };

        let unit = self.config.stake_unit.max(1);
        let budget_units = (race_budget / unit as f64).floor() as u64;
        if budget_units == 0 {
            return Ok(Allocation::unspent(
                budget,
                "race budget below the minimum stake denomination",
            ));
        }

        let weights = self.weights(candidates, mode);
        let weight_sum: f64 = weights.iter().sum();
        if weight_sum <= 0.0 || !weight_sum.is_finite() {
            return Ok(Allocation::unspent(budget, "no leg carries positive weight"));
        }

        // Whole stake units per leg, floored; remainder goes to the
        // strongest leg so the budget is fully used without exceeding it.
        let mut units: Vec<u64> = weights
            .iter()
            .map(|w| ((w / weight_sum) * budget_units as f64).floor() as u64)
            .collect();
        let assigned: u64 = units.iter().sum();
        let remainder = budget_units - assigned;
        if remainder > 0 {
            let best = candidates
                .iter()
                .enumerate()
                .max_by(|(ia, a), (ib, b)| {
                    a.expected_return
                        .partial_cmp(&b.expected_return)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(ib.cmp(ia))
                })
                .map(|(i, _)| i)
                .unwrap_or(0);
            units[best] += remainder;
        }

        let bets: Vec<SelectedBet> = candidates
            .iter()
            .zip(&units)
            .filter(|(_, &u)| u > 0)
            .map(|(candidate, &u)| {
                let stake = u * unit;
                let rationale = format!(
                    "{} at p={:.1}%, EV {:.2} ({}) — {} share of ¥{:.0}",
                    candidate.bet_type,
                    candidate.probability * 100.0,
                    candidate.expected_return,
                    candidate.rating,
                    mode,
                    race_budget,
                );
                SelectedBet {
                    candidate: candidate.clone(),
                    stake,
                    rationale,
                }
            })
            .collect();

        let total_spent: u64 = bets.iter().map(|b| b.stake).sum();
        let remaining = budget.amount() - total_spent as f64;
        let strategy = format!("{scaling_note}, {mode} dutching, ¥{unit} units");

        info!(
            legs = bets.len(),
            total_spent,
            remaining = format!("{remaining:.0}"),
            strategy = %strategy,
            "Funds allocated"
        );

        Ok(Allocation {
            bets,
            total_spent,
            remaining,
            strategy,
        })
    }

    /// Confidence in the consensus, from the concentration of the win
    /// distribution: 0 at uniform, 1 at a point mass. An empty or
    /// single-horse distribution gives the conservative floor.
    fn confidence_factor(&self, consensus: &WinDistribution) -> f64 {
        let n = consensus.len();
        if n < 2 {
            return 0.0;
        }
        let uniform = 1.0 / n as f64;
        let h = consensus.concentration();
        ((h - uniform) / (1.0 - uniform)).clamp(0.0, 1.0)
    }

    fn weights(&self, candidates: &[BetCandidate], mode: AllocationMode) -> Vec<f64> {
        match mode {
            AllocationMode::Proportional => candidates
                .iter()
                .map(|c| c.expected_return.max(0.0))
                .collect(),
            AllocationMode::EdgeWeighted => {
                let kelly: Vec<f64> = candidates
                    .iter()
                    .map(|c| {
                        let b = c.odds.resolve(OddsPolicy::Midpoint) - 1.0;
                        if b <= 0.0 {
                            return 0.0;
                        }
                        let p = c.probability;
                        let q = 1.0 - p;
                        ((b * p - q) / b).max(0.0)
                    })
                    .collect();
                if kelly.iter().sum::<f64>() > 0.0 {
                    kelly
                } else {
                    // No positive-Kelly leg: fall back to proportional
                    // rather than allocating nothing.
                    self.weights(candidates, AllocationMode::Proportional)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BetType, Odds, ValueRating};
    use std::collections::BTreeMap;

    fn make_candidate(ev: f64, probability: f64, odds: f64) -> BetCandidate {
        BetCandidate {
            bet_type: BetType::Win,
            horses: vec![1],
            probability,
            odds: Odds::Fixed(odds),
            expected_return: ev,
            rating: ValueRating::classify(ev),
        }
    }

    fn allocator() -> FundAllocator {
        FundAllocator::new(AllocationConfig::default())
    }

    fn peaked_consensus() -> WinDistribution {
        WinDistribution::new(BTreeMap::from([(1, 0.7), (2, 0.2), (3, 0.1)])).unwrap()
    }

    #[test]
    fn test_fixed_budget_proportional_split() {
        // Two legs at EV 1.5 and 1.2 on a ¥1000 budget: the 1.5 leg gets
        // strictly more, and the stakes never exceed the budget.
        let alloc = allocator()
            .allocate(
                &[make_candidate(1.5, 0.5, 3.0), make_candidate(1.2, 0.4, 3.0)],
                &Budget::Fixed(1000.0),
                &peaked_consensus(),
                AllocationMode::Proportional,
            )
            .unwrap();
        assert_eq!(alloc.bets.len(), 2);
        assert!(alloc.bets[0].stake > alloc.bets[1].stake);
        assert!(alloc.total_spent <= 1000);
        assert_eq!(alloc.total_spent % 100, 0);
    }

    #[test]
    fn test_remainder_goes_to_highest_ev_leg() {
        // 1.5/2.7 of 10 units floors to 5, 1.2/2.7 floors to 4; the spare
        // unit lands on the 1.5 leg.
        let alloc = allocator()
            .allocate(
                &[make_candidate(1.5, 0.5, 3.0), make_candidate(1.2, 0.4, 3.0)],
                &Budget::Fixed(1000.0),
                &peaked_consensus(),
                AllocationMode::Proportional,
            )
            .unwrap();
        assert_eq!(alloc.bets[0].stake, 600);
        assert_eq!(alloc.bets[1].stake, 400);
        assert_eq!(alloc.total_spent, 1000);
        assert!((alloc.remaining - 0.0).abs() < 1e-10);
    }

    #[test]
    fn test_empty_slate_spends_nothing() {
        let alloc = allocator()
            .allocate(
                &[],
                &Budget::Fixed(1000.0),
                &peaked_consensus(),
                AllocationMode::Proportional,
            )
            .unwrap();
        assert!(alloc.bets.is_empty());
        assert_eq!(alloc.total_spent, 0);
        assert!((alloc.remaining - 1000.0).abs() < 1e-10);
    }

    #[test]
    fn test_invalid_budget_fails_loudly() {
        let result = allocator().allocate(
            &[make_candidate(1.5, 0.5, 3.0)],
            &Budget::Fixed(-100.0),
            &peaked_consensus(),
            AllocationMode::Proportional,
        );
        assert!(matches!(result, Err(EngineError::InvalidBudget(_))));
    }

    #[test]
    fn test_budget_below_denomination_spends_nothing() {
        let alloc = allocator()
            .allocate(
                &[make_candidate(1.5, 0.5, 3.0)],
                &Budget::Fixed(60.0),
                &peaked_consensus(),
                AllocationMode::Proportional,
            )
            .unwrap();
        assert!(alloc.bets.is_empty());
        assert!((alloc.remaining - 60.0).abs() < 1e-10);
    }

    #[test]
    fn test_bankroll_mode_commits_a_fraction() {
        let alloc = allocator()
            .allocate(
                &[make_candidate(1.5, 0.5, 3.0), make_candidate(1.2, 0.4, 3.0)],
                &Budget::Bankroll(100_000.0),
                &peaked_consensus(),
                AllocationMode::Proportional,
            )
            .unwrap();
        // Never more than the maximum fraction of the bankroll.
        assert!(alloc.total_spent as f64 <= 100_000.0 * 0.15 + 100.0);
        assert!(alloc.total_spent > 0);
        assert!(alloc.strategy.contains("confidence"));
    }

    #[test]
    fn test_concentrated_consensus_raises_commitment() {
        let legs = [make_candidate(1.5, 0.5, 3.0), make_candidate(1.2, 0.4, 3.0)];
        let sharp = WinDistribution::new(BTreeMap::from([(1, 0.90), (2, 0.06), (3, 0.04)]))
            .unwrap();
        let flat = WinDistribution::new(BTreeMap::from([
            (1, 0.34),
            (2, 0.33),
            (3, 0.33),
        ]))
        .unwrap();
        let confident = allocator()
            .allocate(&legs, &Budget::Bankroll(100_000.0), &sharp, AllocationMode::Proportional)
            .unwrap();
        let hesitant = allocator()
            .allocate(&legs, &Budget::Bankroll(100_000.0), &flat, AllocationMode::Proportional)
            .unwrap();
        assert!(confident.total_spent > hesitant.total_spent);
    }

    #[test]
    fn test_edge_weighted_favors_bigger_edge() {
        // Same EV, but the second leg's edge (b·p − q)/b is larger.
        let low_edge = make_candidate(1.2, 0.8, 1.5);
        let high_edge = make_candidate(1.2, 0.12, 10.0);
        let alloc = allocator()
            .allocate(
                &[low_edge, high_edge],
                &Budget::Fixed(1000.0),
                &peaked_consensus(),
                AllocationMode::EdgeWeighted,
            )
            .unwrap();
        // kelly(0.8 @ 1.5) = (0.5·0.8 − 0.2)/0.5 = 0.4
        // kelly(0.12 @ 10) = (9·0.12 − 0.88)/9 ≈ 0.022
        assert!(alloc.bets[0].stake > alloc.bets[1].stake);
    }

    #[test]
    fn test_edge_weighted_falls_back_when_no_positive_kelly() {
        // EV exactly 1.0 means zero Kelly edge on every leg; fall back
        // to proportional rather than allocating nothing.
        let alloc = allocator()
            .allocate(
                &[make_candidate(1.0, 0.4, 2.5), make_candidate(1.0, 0.5, 2.0)],
                &Budget::Fixed(1000.0),
                &peaked_consensus(),
                AllocationMode::EdgeWeighted,
            )
            .unwrap();
        assert!(!alloc.bets.is_empty());
        assert!(alloc.total_spent > 0);
    }

    #[test]
    fn test_allocation_is_deterministic() {
        let legs = [make_candidate(1.5, 0.5, 3.0), make_candidate(1.2, 0.4, 3.0)];
        let a = allocator()
            .allocate(&legs, &Budget::Fixed(1000.0), &peaked_consensus(), AllocationMode::Proportional)
            .unwrap();
        let b = allocator()
            .allocate(&legs, &Budget::Fixed(1000.0), &peaked_consensus(), AllocationMode::Proportional)
            .unwrap();
        assert_eq!(a.total_spent, b.total_spent);
        assert_eq!(a.bets.len(), b.bets.len());
        for (x, y) in a.bets.iter().zip(&b.bets) {
            assert_eq!(x.stake, y.stake);
        }
    }

    #[test]
    fn test_rationale_mentions_rating() {
        let alloc = allocator()
            .allocate(
                &[make_candidate(1.5, 0.5, 3.0)],
                &Budget::Fixed(500.0),
                &peaked_consensus(),
                AllocationMode::Proportional,
            )
            .unwrap();
        assert!(alloc.bets[0].rationale.contains("value"));
        assert!(alloc.bets[0].rationale.contains("EV 1.50"));
    }
}
