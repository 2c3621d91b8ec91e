//! Strategy layer — candidate enumeration, valuation, and slate selection.

pub mod allocate;
pub mod composite;
pub mod ev;

use tracing::{debug, info};

use crate::config::SelectionConfig;
use crate::model::ProbabilityModel;
use crate::types::{
    BetCandidate, BetType, EngineError, Odds, RaceContext, RunnerEntry, ValueRating,
    WinDistribution,
};
use ev::EvCalculator;

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Enumerates candidate wagers, values them, and picks the ranked slate.
///
/// A pure single-pass pipeline: enumerate → estimate probability →
/// compute EV → filter → sort → truncate. No state survives a call.
pub struct BetSelector {
    model: ProbabilityModel,
    ev: EvCalculator,
    config: SelectionConfig,
}

impl BetSelector {
    pub fn new(model: ProbabilityModel, ev: EvCalculator, config: SelectionConfig) -> Self {
        Self { model, ev, config }
    }

    /// Access the selection configuration.
    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Produce the ranked, filtered slate of candidates.
    ///
    /// `preferred` restricts the bet types considered; `max_bets`
    /// overrides the configured slate cap. An empty result is a valid,
    /// non-error outcome: nothing cleared the profitability bar.
    pub fn select(
        &self,
        consensus: &WinDistribution,
        runners: &[RunnerEntry],
        ctx: &RaceContext,
        preferred: Option<&[BetType]>,
        max_bets: Option<usize>,
    ) -> Result<Vec<BetCandidate>, EngineError> {
        if ctx.field_size == 0 {
            return Err(EngineError::EmptyField);
        }

        let bet_types: Vec<BetType> = match preferred {
            Some(types) if !types.is_empty() => types.to_vec(),
            _ => BetType::ALL.to_vec(),
        };

        let pool = self.candidate_pool(consensus, runners);
        let mut candidates: Vec<BetCandidate> = Vec::new();
        let mut skipped = 0usize;

        for &bet_type in &bet_types {
            let tuples = enumerate_tuples(
                &pool,
                bet_type.required_horses(),
                bet_type.is_ordered(),
                self.config.enumeration_ceiling,
            );
            for horses in tuples {
                match self.evaluate_candidate(bet_type, &horses, consensus, runners, ctx) {
                    Ok(Some(candidate)) => candidates.push(candidate),
                    Ok(None) => skipped += 1,
                    Err(e) if e.is_recoverable() => skipped += 1,
                    Err(e) => return Err(e),
                }
            }
        }

        // Expected return descending; ties by ascending horse tuple, then
        // bet-type order, so identical inputs always rank identically.
        candidates.sort_by(|a, b| {
            b.expected_return
                .partial_cmp(&a.expected_return)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.horses.cmp(&b.horses))
                .then_with(|| a.bet_type.cmp(&b.bet_type))
        });

        let cap = max_bets.unwrap_or(self.config.default_max_bets);
        candidates.truncate(cap);

        info!(
            pool = pool.len(),
            bet_types = bet_types.len(),
            selected = candidates.len(),
            skipped,
            "Candidate selection complete"
        );
        Ok(candidates)
    }

    /// Value one combination; `Ok(None)` means it fails the EV filter.
    fn evaluate_candidate(
        &self,
        bet_type: BetType,
        horses: &[u32],
        consensus: &WinDistribution,
        runners: &[RunnerEntry],
        ctx: &RaceContext,
    ) -> Result<Option<BetCandidate>, EngineError> {
        let probability = self
            .model
            .success_probability(bet_type, horses, consensus, runners, ctx)?;

        let odds = match self.market_odds(bet_type, horses, runners)? {
            Some(odds) => odds,
            None => return Ok(None),
        };

        let valuation = self.ev.evaluate(probability, &odds)?;
        if valuation.rating == ValueRating::InsufficientData
            || valuation.expected_return < self.config.min_expected_return
        {
            debug!(
                bet_type = %bet_type,
                horses = ?horses,
                ev = format!("{:.2}", valuation.expected_return),
                "Candidate below EV cutoff"
            );
            return Ok(None);
        }

        Ok(Some(BetCandidate {
            bet_type,
            horses: horses.to_vec(),
            probability,
            odds,
            expected_return: valuation.expected_return,
            rating: valuation.rating,
        }))
    }

    /// Market odds for a candidate. Win and place quote directly from
    /// runner data; combination pools are not quoted per-runner, so a
    /// synthetic quote is derived from the component win odds (product
    /// over the orderings covered, discounted for exotic-pool takeout).
    fn market_odds(
        &self,
        bet_type: BetType,
        horses: &[u32],
        runners: &[RunnerEntry],
    ) -> Result<Option<Odds>, EngineError> {
        let entry = |h: u32| runners.iter().find(|r| r.horse == h);

        match bet_type {
            BetType::Win => Ok(entry(horses[0]).map(|r| Odds::Fixed(r.win_odds))),
            BetType::Place => Ok(entry(horses[0]).and_then(|r| r.place_odds)),
            _ => {
                let mut product = 1.0;
                for &h in horses {
                    match entry(h) {
                        Some(r) if r.win_odds.is_finite() && r.win_odds > 0.0 => {
                            product *= r.win_odds;
                        }
                        Some(_) => {
                            return Err(EngineError::NonFiniteOdds {
                                bet_type,
                                horses: horses.to_vec(),
                            })
                        }
                        None => return Ok(None),
                    }
                }
                let orderings = if bet_type.is_ordered() {
                    1.0
                } else {
                    factorial(bet_type.required_horses()) as f64
                };
                let mut quote =
                    product / orderings * self.config.synthetic_odds_discount;
                if bet_type == BetType::QuinellaPlace {
                    // Wide pays on any of the three top-3 pairs.
                    quote /= self.config.wide_odds_divisor;
                }
                Ok(Some(Odds::Fixed(quote.max(1.0))))
            }
        }
    }

    /// Horses eligible for enumeration: the top N by consensus
    /// probability (odds-implied for horses the consensus misses,
    /// popularity order when there is no consensus at all).
    fn candidate_pool(&self, consensus: &WinDistribution, runners: &[RunnerEntry]) -> Vec<u32> {
        let mut ranked: Vec<(u32, f64, u32)> = runners
            .iter()
            .map(|r| {
                let strength = consensus.probability(r.horse).unwrap_or_else(|| {
                    if r.win_odds.is_finite() && r.win_odds > 0.0 {
                        0.8 / r.win_odds
                    } else {
                        0.0
                    }
                });
                (r.horse, strength, r.popularity)
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(self.config.max_combination_horses);
        ranked.into_iter().map(|(h, _, _)| h).collect()
    }
}

// ---------------------------------------------------------------------------
// Enumeration helpers
// ---------------------------------------------------------------------------

fn factorial(n: usize) -> usize {
    (1..=n).product()
}

/// All k-tuples from the pool: combinations for unordered bet types,
/// permutations for ordered ones, stopping at the ceiling.
fn enumerate_tuples(pool: &[u32], k: usize, ordered: bool, ceiling: usize) -> Vec<Vec<u32>> {
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(k);
    extend_tuples(pool, k, ordered, ceiling, 0, &mut current, &mut out);
    out
}

fn extend_tuples(
    pool: &[u32],
    k: usize,
    ordered: bool,
    ceiling: usize,
    start: usize,
    current: &mut Vec<u32>,
    out: &mut Vec<Vec<u32>>,
) {
    if out.len() >= ceiling {
        return;
    }
    if current.len() == k {
        out.push(current.clone());
        return;
    }
    if ordered {
        for &h in pool {
            if !current.contains(&h) {
                current.push(h);
                extend_tuples(pool, k, ordered, ceiling, 0, current, out);
                current.pop();
            }
        }
    } else {
        for i in start..pool.len() {
            current.push(pool[i]);
            extend_tuples(pool, k, ordered, ceiling, i + 1, current, out);
            current.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
