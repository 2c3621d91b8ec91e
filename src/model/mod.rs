//! Bet-type probability model.
//!
//! Derives the success probability of a specific wager from the
//! consensus win distribution, historical base rates indexed by
//! popularity rank, and contextual corrections for field size and race
//! conditions. Place-style rates come from rank tables rather than the
//! win distribution because top-3 rate does not scale linearly with win
//! probability.

use tracing::debug;

use crate::config::ModelConfig;
use crate::types::{BetType, EngineError, RaceContext, RunnerEntry, WinDistribution};

/// Estimates per-wager success probabilities.
pub struct ProbabilityModel {
    config: ModelConfig,
}

impl ProbabilityModel {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    /// Access the model configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Estimated probability that the named combination succeeds.
    ///
    /// Contract violations (wrong combination size, duplicate horses,
    /// invalid odds) fail loudly. A field too small for the bet type or
    /// a horse missing from the runner list is `InsufficientData`: the
    /// candidate is skipped, not fatal. Output is clamped to [0,1].
    pub fn success_probability(
        &self,
        bet_type: BetType,
        horses: &[u32],
        consensus: &WinDistribution,
        runners: &[RunnerEntry],
        ctx: &RaceContext,
    ) -> Result<f64, EngineError> {
        let required = bet_type.required_horses();
        if horses.len() != required {
            return Err(EngineError::CombinationSize {
                bet_type,
                required,
                got: horses.len(),
            });
        }
        for (i, &h) in horses.iter().enumerate() {
            if horses[..i].contains(&h) {
                return Err(EngineError::DuplicateHorse { horse: h });
            }
        }
        if ctx.field_size == 0 {
            return Err(EngineError::EmptyField);
        }
        if ctx.field_size < bet_type.min_field_size() {
            return Err(EngineError::insufficient(format!(
                "field of {} too small for {bet_type}",
                ctx.field_size
            )));
        }

        let raw = match bet_type {
            BetType::Win => self.win_probability(horses[0], consensus, runners)?,
            BetType::Place => self.config.place_rate(self.rank_of(horses[0], runners)?),
            BetType::QuinellaPlace => {
                let a = self.config.place_rate(self.rank_of(horses[0], runners)?);
                let b = self.config.place_rate(self.rank_of(horses[1], runners)?);
                a * b * self.config.wide_joint_factor
            }
            BetType::Quinella => self.quinella_probability(horses, runners)?,
            BetType::Exacta => {
                let pair = self.quinella_probability(horses, runners)?;
                let strengths = self.strengths(horses, consensus, runners)?;
                pair * order_share(&strengths)
            }
            BetType::Trio => self.trio_probability(horses, runners, ctx)?,
            BetType::Trifecta => {
                // Trio mass divided across the 6 orderings, skewed by
                // relative strength (uniform ordering share is exactly 1/6).
                let trio = self.trio_probability(horses, runners, ctx)?;
                let strengths = self.strengths(horses, consensus, runners)?;
                trio * order_share(&strengths)
            }
        };

        let corrected = raw
            * self.config.field_correction(ctx.field_size)
            * self
                .config
                .condition_correction(ctx.conditions.iter().copied());

        if !corrected.is_finite() {
            // Degenerate arithmetic excludes the candidate, never propagates NaN.
            return Err(EngineError::insufficient(format!(
                "degenerate probability for {bet_type} on {horses:?}"
            )));
        }

        let clamped = corrected.clamp(0.0, 1.0);
        debug!(
            bet_type = %bet_type,
            horses = ?horses,
            raw = format!("{raw:.4}"),
            corrected = format!("{clamped:.4}"),
            "Probability estimated"
        );
        Ok(clamped)
    }

    /// Win probability: consensus entry when available, otherwise the
    /// odds-implied probability under the configured payout rate.
    fn win_probability(
        &self,
        horse: u32,
        consensus: &WinDistribution,
        runners: &[RunnerEntry],
    ) -> Result<f64, EngineError> {
        if let Some(p) = consensus.probability(horse) {
            return Ok(p);
        }
        let entry = self.runner(horse, runners)?;
        if !entry.win_odds.is_finite() || entry.win_odds <= 0.0 {
            return Err(EngineError::NonFiniteOdds {
                bet_type: BetType::Win,
                horses: vec![horse],
            });
        }
        Ok((self.config.payout_rate / entry.win_odds).clamp(0.0, 1.0))
    }

    fn quinella_probability(
        &self,
        horses: &[u32],
        runners: &[RunnerEntry],
    ) -> Result<f64, EngineError> {
        let a = self.config.top2_rate(self.rank_of(horses[0], runners)?);
        let b = self.config.top2_rate(self.rank_of(horses[1], runners)?);
        Ok(a * b * self.config.quinella_joint_factor)
    }

    fn trio_probability(
        &self,
        horses: &[u32],
        runners: &[RunnerEntry],
        ctx: &RaceContext,
    ) -> Result<f64, EngineError> {
        let product: f64 = horses
            .iter()
            .map(|&h| {
                self.rank_of(h, runners)
                    .map(|rank| self.config.place_rate(rank))
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .product();
        // Independence overcounts the joint top-3 event more as the field
        // grows; the crowding denominator compensates.
        let denominator = 1.0
            + self.config.trio_crowding * ctx.field_size as f64
                / self.config.reference_field_size as f64;
        Ok(product / denominator)
    }

    fn runner<'r>(
        &self,
        horse: u32,
        runners: &'r [RunnerEntry],
    ) -> Result<&'r RunnerEntry, EngineError> {
        runners.iter().find(|r| r.horse == horse).ok_or_else(|| {
            EngineError::insufficient(format!("horse {horse} missing from runner data"))
        })
    }

    fn rank_of(&self, horse: u32, runners: &[RunnerEntry]) -> Result<u32, EngineError> {
        Ok(self.runner(horse, runners)?.popularity)
    }

    /// Relative strength of each horse in combination order, for the
    /// ordering-share skew. Consensus probability when present, else
    /// odds-implied, else zero (the share falls back to uniform).
    fn strengths(
        &self,
        horses: &[u32],
        consensus: &WinDistribution,
        runners: &[RunnerEntry],
    ) -> Result<Vec<f64>, EngineError> {
        horses
            .iter()
            .map(|&h| match consensus.probability(h) {
                Some(p) => Ok(p),
                None => {
                    let entry = self.runner(h, runners)?;
                    if entry.win_odds.is_finite() && entry.win_odds > 0.0 {
                        Ok((self.config.payout_rate / entry.win_odds).clamp(0.0, 1.0))
                    } else {
                        Ok(0.0)
                    }
                }
            })
            .collect()
    }
}

/// Probability that horses finish in exactly the given order, conditional
/// on all of them occupying the top positions (sequential Harville share).
/// Degenerate strengths fall back to the uniform share `1 / k!`.
fn order_share(strengths: &[f64]) -> f64 {
    let k = strengths.len();
    let uniform = 1.0 / (1..=k).product::<usize>() as f64;
    let mut remaining: f64 = strengths.iter().sum();
    if remaining <= 0.0 || !remaining.is_finite() {
        return uniform;
    }
    let mut share = 1.0;
    for &s in &strengths[..k - 1] {
        if remaining <= 0.0 {
            return uniform;
        }
        share *= s / remaining;
        remaining -= s;
    }
    if share.is_finite() {
        share
    } else {
        uniform
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConditionTag;
    use std::collections::BTreeMap;

    fn make_runners(n: u32) -> Vec<RunnerEntry> {
        // Popularity follows horse number; odds rise with rank.
        (1..=n)
            .map(|h| RunnerEntry {
                horse: h,
                win_odds: 1.5 * h as f64,
                place_odds: None,
                popularity: h,
            })
            .collect()
    }

    fn make_context(field_size: usize) -> RaceContext {
        RaceContext {
            field_size,
            conditions: Default::default(),
            venue: "Tokyo".to_string(),
            distance_m: 2000,
        }
    }

    fn make_consensus(entries: &[(u32, f64)]) -> WinDistribution {
        WinDistribution::new(entries.iter().copied().collect::<BTreeMap<_, _>>()).unwrap()
    }

    fn model() -> ProbabilityModel {
        ProbabilityModel::new(ModelConfig::default())
    }

    #[test]
    fn test_win_uses_consensus_directly() {
        let m = model();
        let consensus = make_consensus(&[(1, 0.5), (2, 0.3), (3, 0.2)]);
        let p = m
            .success_probability(
                BetType::Win,
                &[1],
                &consensus,
                &make_runners(18),
                &make_context(18),
            )
            .unwrap();
        // Reference field and no condition tags → no correction.
        assert!((p - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_win_falls_back_to_implied_odds() {
        let m = model();
        let p = m
            .success_probability(
                BetType::Win,
                &[2],
                &WinDistribution::empty(),
                &make_runners(18),
                &make_context(18),
            )
            .unwrap();
        // 0.8 / 3.0 odds
        assert!((p - 0.8 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_place_uses_rank_table() {
        let m = model();
        let p = m
            .success_probability(
                BetType::Place,
                &[1],
                &WinDistribution::empty(),
                &make_runners(18),
                &make_context(18),
            )
            .unwrap();
        assert!((p - 0.65).abs() < 1e-10);
    }

    #[test]
    fn test_field_size_correction_raises_small_field_rate() {
        // Base rate calibrated for 18 runners, applied at field size 8:
        // the corrected favorite rate is ~+25% relative.
        let m = model();
        let at_18 = m
            .success_probability(
                BetType::Place,
                &[1],
                &WinDistribution::empty(),
                &make_runners(18),
                &make_context(18),
            )
            .unwrap();
        let at_8 = m
            .success_probability(
                BetType::Place,
                &[1],
                &WinDistribution::empty(),
                &make_runners(8),
                &make_context(8),
            )
            .unwrap();
        let relative = at_8 / at_18;
        assert!(relative > 1.2 && relative < 1.3, "relative lift {relative}");
    }

    #[test]
    fn test_condition_corrections_shrink_probability() {
        let m = model();
        let mut ctx = make_context(18);
        ctx.conditions.insert(ConditionTag::Handicap);
        let handicapped = m
            .success_probability(
                BetType::Place,
                &[1],
                &WinDistribution::empty(),
                &make_runners(18),
                &ctx,
            )
            .unwrap();
        assert!((handicapped - 0.65 * 0.85).abs() < 1e-10);
    }

    #[test]
    fn test_untabled_condition_applies_no_correction() {
        let m = model();
        let mut ctx = make_context(18);
        ctx.conditions.insert(ConditionTag::FilliesOnly);
        let p = m
            .success_probability(
                BetType::Place,
                &[1],
                &WinDistribution::empty(),
                &make_runners(18),
                &ctx,
            )
            .unwrap();
        assert!((p - 0.65).abs() < 1e-10);
    }

    #[test]
    fn test_exacta_below_quinella() {
        let m = model();
        let consensus = make_consensus(&[(1, 0.4), (2, 0.3), (3, 0.3)]);
        let runners = make_runners(18);
        let ctx = make_context(18);
        let quinella = m
            .success_probability(BetType::Quinella, &[1, 2], &consensus, &runners, &ctx)
            .unwrap();
        let exacta = m
            .success_probability(BetType::Exacta, &[1, 2], &consensus, &runners, &ctx)
            .unwrap();
        assert!(exacta < quinella);
        // Favorite first: the order split exceeds an even coin flip.
        assert!(exacta > quinella * 0.5);
    }

    #[test]
    fn test_exacta_order_matters() {
        let m = model();
        let consensus = make_consensus(&[(1, 0.6), (2, 0.2), (3, 0.2)]);
        let runners = make_runners(18);
        let ctx = make_context(18);
        let strong_first = m
            .success_probability(BetType::Exacta, &[1, 2], &consensus, &runners, &ctx)
            .unwrap();
        let weak_first = m
            .success_probability(BetType::Exacta, &[2, 1], &consensus, &runners, &ctx)
            .unwrap();
        assert!(strong_first > weak_first);
    }

    #[test]
    fn test_trifecta_below_trio() {
        let m = model();
        let consensus = make_consensus(&[(1, 0.4), (2, 0.3), (3, 0.3)]);
        let runners = make_runners(18);
        let ctx = make_context(18);
        let trio = m
            .success_probability(BetType::Trio, &[1, 2, 3], &consensus, &runners, &ctx)
            .unwrap();
        let trifecta = m
            .success_probability(BetType::Trifecta, &[1, 2, 3], &consensus, &runners, &ctx)
            .unwrap();
        assert!(trifecta < trio);
        assert!(trifecta > 0.0);
    }

    #[test]
    fn test_trio_crowding_denominator() {
        let m = model();
        let runners = make_runners(18);
        let ctx = make_context(18);
        let trio = m
            .success_probability(
                BetType::Trio,
                &[1, 2, 3],
                &WinDistribution::empty(),
                &runners,
                &ctx,
            )
            .unwrap();
        let product = 0.65 * 0.52 * 0.43;
        assert!(trio < product);
    }

    #[test]
    fn test_combination_size_mismatch_fails_loudly() {
        let m = model();
        let result = m.success_probability(
            BetType::Trio,
            &[1, 2],
            &WinDistribution::empty(),
            &make_runners(18),
            &make_context(18),
        );
        assert!(matches!(
            result,
            Err(EngineError::CombinationSize {
                required: 3,
                got: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_horse_fails_loudly() {
        let m = model();
        let result = m.success_probability(
            BetType::Quinella,
            &[4, 4],
            &WinDistribution::empty(),
            &make_runners(18),
            &make_context(18),
        );
        assert!(matches!(result, Err(EngineError::DuplicateHorse { horse: 4 })));
    }

    #[test]
    fn test_small_field_is_insufficient_data() {
        let m = model();
        let result = m.success_probability(
            BetType::Trio,
            &[1, 2, 3],
            &WinDistribution::empty(),
            &make_runners(2),
            &make_context(2),
        );
        match result {
            Err(e) => assert!(e.is_recoverable()),
            Ok(_) => panic!("trio on a 2-runner field must not produce a probability"),
        }
    }

    #[test]
    fn test_unknown_horse_is_insufficient_data() {
        let m = model();
        let result = m.success_probability(
            BetType::Place,
            &[99],
            &WinDistribution::empty(),
            &make_runners(18),
            &make_context(18),
        );
        match result {
            Err(e) => assert!(e.is_recoverable()),
            Ok(_) => panic!("unknown horse must not produce a probability"),
        }
    }

    #[test]
    fn test_output_clamped_to_unit_interval() {
        // Small field boost on the favorite's place rate could exceed 1
        // without the clamp when sensitivity is cranked up.
        let mut cfg = ModelConfig::default();
        cfg.field_size_sensitivity = 20.0;
        let m = ProbabilityModel::new(cfg);
        let p = m
            .success_probability(
                BetType::Place,
                &[1],
                &WinDistribution::empty(),
                &make_runners(4),
                &make_context(4),
            )
            .unwrap();
        assert!(p <= 1.0);
    }

    #[test]
    fn test_order_share_uniform_fallback() {
        assert!((order_share(&[0.0, 0.0]) - 0.5).abs() < 1e-10);
        assert!((order_share(&[0.0, 0.0, 0.0]) - 1.0 / 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_order_share_skews_toward_strength() {
        let share = order_share(&[0.6, 0.2]);
        assert!((share - 0.75).abs() < 1e-10);
        let three = order_share(&[0.5, 0.3, 0.2]);
        // 0.5/1.0 * 0.3/0.5
        assert!((three - 0.3).abs() < 1e-10);
    }
}
