//! Configuration loading from TOML.
//!
//! Every table the engine reads — per-source calibration, base rates,
//! correction factors, selection ceilings, allocation parameters — lives
//! here as an immutable struct built once at startup and passed by
//! reference into each component, so tests can inject alternates without
//! touching global state.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::types::ConditionTag;

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub model: ModelConfig,
    pub selection: SelectionConfig,
    pub allocation: AllocationConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Source calibration
// ---------------------------------------------------------------------------

/// Calibration parameters for one prediction source.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SourceParams {
    /// Softmax temperature. Larger β sharpens the distribution
    /// toward the top-scored horse.
    pub beta: f64,
    /// Fusion weight in the opinion pool. Zero excludes the source.
    pub weight: f64,
}

/// Per-source calibration table with a uniform fallback for sources
/// the table does not know about.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourcesConfig {
    /// β applied to sources absent from the table.
    pub default_beta: f64,
    /// Known sources keyed by identity.
    pub table: HashMap<String, SourceParams>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            default_beta: 0.1,
            table: HashMap::new(),
        }
    }
}

impl SourcesConfig {
    /// β for a source, falling back to the default for unknown identities.
    pub fn beta_for(&self, source: &str) -> f64 {
        self.table
            .get(source)
            .map(|p| p.beta)
            .unwrap_or(self.default_beta)
    }

    /// Fusion weight for a source. Unknown sources receive an equal
    /// share of the remaining mass (`1 / source_count`) so they still
    /// contribute to the pool.
    pub fn weight_for(&self, source: &str, source_count: usize) -> f64 {
        match self.table.get(source) {
            Some(p) => p.weight,
            None if source_count > 0 => 1.0 / source_count as f64,
            None => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Probability model tables
// ---------------------------------------------------------------------------

/// Base-rate tables and correction factors for the bet-type model.
///
/// Rates are indexed by popularity rank (index 0 = 1st favorite) and
/// calibrated against a reference field of 18 runners.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// Historical top-3 finish rate by popularity rank.
    pub place_rates: Vec<f64>,
    /// Historical top-2 finish rate by popularity rank.
    pub top2_rates: Vec<f64>,
    /// Floor applied to ranks beyond the tables.
    pub rate_floor: f64,
    /// Field size the tables were calibrated on.
    pub reference_field_size: usize,
    /// Strength of the field-size correction. 0.45 yields roughly +25%
    /// for the favorite in an 8-runner field.
    pub field_size_sensitivity: f64,
    /// Multiplicative corrections per condition tag. Tags absent from
    /// the table apply no correction.
    pub condition_corrections: HashMap<ConditionTag, f64>,
    /// Joint-probability discount for wide (both horses top-3).
    pub wide_joint_factor: f64,
    /// Joint-probability discount for quinella (both horses top-2).
    pub quinella_joint_factor: f64,
    /// Crowding term in the trio combinatorial denominator.
    pub trio_crowding: f64,
    /// Pari-mutuel payout rate used for odds-implied win probabilities.
    pub payout_rate: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let mut condition_corrections = HashMap::new();
        condition_corrections.insert(ConditionTag::Handicap, 0.85);
        condition_corrections.insert(ConditionTag::MaidenNew, 0.88);
        condition_corrections.insert(ConditionTag::Hurdle, 0.80);
        condition_corrections.insert(ConditionTag::GradeOne, 1.05);

        Self {
            place_rates: vec![
                0.65, 0.52, 0.43, 0.36, 0.30, 0.25, 0.21, 0.17, 0.14, 0.12, 0.10, 0.08, 0.07,
                0.06, 0.05, 0.04, 0.035, 0.03,
            ],
            top2_rates: vec![
                0.52, 0.41, 0.32, 0.25, 0.20, 0.16, 0.13, 0.10, 0.08, 0.065, 0.05, 0.04, 0.035,
                0.03, 0.025, 0.02, 0.018, 0.015,
            ],
            rate_floor: 0.01,
            reference_field_size: 18,
            field_size_sensitivity: 0.45,
            condition_corrections,
            wide_joint_factor: 0.80,
            quinella_joint_factor: 0.75,
            trio_crowding: 0.6,
            payout_rate: 0.80,
        }
    }
}

impl ModelConfig {
    /// Top-3 base rate for a popularity rank (1-based).
    pub fn place_rate(&self, rank: u32) -> f64 {
        rate_at(&self.place_rates, rank, self.rate_floor)
    }

    /// Top-2 base rate for a popularity rank (1-based).
    pub fn top2_rate(&self, rank: u32) -> f64 {
        rate_at(&self.top2_rates, rank, self.rate_floor)
    }

    /// Multiplicative field-size correction relative to the reference
    /// field. Smaller fields raise the effective rate.
    pub fn field_correction(&self, field_size: usize) -> f64 {
        let reference = self.reference_field_size as f64;
        if reference <= 0.0 || field_size == 0 {
            return 1.0;
        }
        let shortfall = (reference - field_size as f64) / reference;
        (1.0 + self.field_size_sensitivity * shortfall).max(0.1)
    }

    /// Product of condition-tag corrections present in the table.
    pub fn condition_correction(&self, tags: impl IntoIterator<Item = ConditionTag>) -> f64 {
        tags.into_iter()
            .filter_map(|t| self.condition_corrections.get(&t))
            .product()
    }
}

fn rate_at(table: &[f64], rank: u32, floor: f64) -> f64 {
    if rank == 0 {
        return floor;
    }
    table
        .get(rank as usize - 1)
        .copied()
        .unwrap_or(floor)
        .max(floor)
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Candidate enumeration and filtering parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SelectionConfig {
    /// Hard EV cutoff. Candidates below this are never proposed.
    pub min_expected_return: f64,
    /// Default slate size cap when the request does not supply one.
    pub default_max_bets: usize,
    /// Candidate horses are pre-filtered to the top N most probable
    /// before pair/triple enumeration (graceful degradation on big fields).
    pub max_combination_horses: usize,
    /// Per-bet-type ceiling on enumerated candidates.
    pub enumeration_ceiling: usize,
    /// Discount applied when a combination quote is synthesized from
    /// component win odds (exotic pools carry heavier takeout).
    pub synthetic_odds_discount: f64,
    /// Extra divisor for synthesized wide quotes, which pay on any of
    /// the three top-3 pairs.
    pub wide_odds_divisor: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_expected_return: 1.0,
            default_max_bets: 6,
            max_combination_horses: 8,
            enumeration_ceiling: 512,
            synthetic_odds_discount: 0.75,
            wide_odds_divisor: 2.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Stake sizing parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AllocationConfig {
    /// Minimum wagering denomination; stakes are multiples of this.
    pub stake_unit: u64,
    /// Bankroll fraction committed when consensus confidence is zero.
    pub min_bankroll_fraction: f64,
    /// Bankroll fraction committed when consensus confidence is one.
    pub max_bankroll_fraction: f64,
    /// Composite odds below this flag the slate as torigami.
    pub torigami_threshold: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            stake_unit: 100,
            min_bankroll_fraction: 0.02,
            max_bankroll_fraction: 0.15,
            torigami_threshold: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_complete() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.model.place_rates.len(), 18);
        assert_eq!(cfg.model.top2_rates.len(), 18);
        assert_eq!(cfg.selection.min_expected_return, 1.0);
        assert_eq!(cfg.allocation.stake_unit, 100);
    }

    #[test]
    fn test_source_fallbacks() {
        let mut table = HashMap::new();
        table.insert(
            "alpha".to_string(),
            SourceParams {
                beta: 0.2,
                weight: 0.6,
            },
        );
        let cfg = SourcesConfig {
            default_beta: 0.1,
            table,
        };
        assert_eq!(cfg.beta_for("alpha"), 0.2);
        assert_eq!(cfg.beta_for("unknown"), 0.1);
        assert_eq!(cfg.weight_for("alpha", 3), 0.6);
        // Unknown sources get an equal share, not zero.
        assert!((cfg.weight_for("unknown", 4) - 0.25).abs() < 1e-10);
    }

    #[test]
    fn test_place_rates_decay_by_rank() {
        let cfg = ModelConfig::default();
        assert!((cfg.place_rate(1) - 0.65).abs() < 1e-10);
        assert!((cfg.place_rate(2) - 0.52).abs() < 1e-10);
        for rank in 1..18 {
            assert!(cfg.place_rate(rank) >= cfg.place_rate(rank + 1));
        }
        // Past the end of the table → floor.
        assert_eq!(cfg.place_rate(30), cfg.rate_floor);
        assert_eq!(cfg.place_rate(0), cfg.rate_floor);
    }

    #[test]
    fn test_top2_rates() {
        let cfg = ModelConfig::default();
        assert!((cfg.top2_rate(1) - 0.52).abs() < 1e-10);
        assert!(cfg.top2_rate(1) < cfg.place_rate(1));
    }

    #[test]
    fn test_field_correction_small_field_raises_rate() {
        let cfg = ModelConfig::default();
        // Reference field → no correction.
        assert!((cfg.field_correction(18) - 1.0).abs() < 1e-10);
        // 8 runners → roughly +25% relative.
        let at_8 = cfg.field_correction(8);
        assert!(at_8 > 1.2 && at_8 < 1.3, "got {at_8}");
    }

    #[test]
    fn test_condition_corrections_compose() {
        let cfg = ModelConfig::default();
        let single = cfg.condition_correction([ConditionTag::Handicap]);
        assert!((single - 0.85).abs() < 1e-10);

        let combined =
            cfg.condition_correction([ConditionTag::Handicap, ConditionTag::GradeOne]);
        assert!((combined - 0.85 * 1.05).abs() < 1e-10);

        // Tag absent from the table applies no correction.
        let untabled = cfg.condition_correction([ConditionTag::FilliesOnly]);
        assert!((untabled - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_load_config_file() {
        // Exercised against the shipped config.toml when present.
        if let Ok(cfg) = AppConfig::load("config.toml") {
            assert!(cfg.model.reference_field_size >= 8);
            assert!(cfg.selection.enumeration_ceiling > 0);
            assert!(cfg.allocation.max_bankroll_fraction <= 1.0);
        }
    }
}
