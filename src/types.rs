//! Shared types for the ODDSMITH engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that fusion, model, strategy,
//! and engine modules can depend on them without circular references.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Bet types
// ---------------------------------------------------------------------------

/// The seven wager types supported by the engine.
///
/// Each variant carries its required horse count and ordering sensitivity
/// as associated behavior, so combination validation is an exhaustive
/// match rather than a runtime string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BetType {
    /// Single horse finishes 1st.
    Win,
    /// Single horse finishes in the top 3.
    Place,
    /// Two horses fill the top 2, either order.
    Quinella,
    /// Two horses both finish in the top 3 ("wide").
    QuinellaPlace,
    /// Two horses fill the top 2 in the named order.
    Exacta,
    /// Three horses fill the top 3, any order.
    Trio,
    /// Three horses fill the top 3 in the named order.
    Trifecta,
}

impl BetType {
    /// All seven bet types in canonical order.
    pub const ALL: &'static [BetType] = &[
        BetType::Win,
        BetType::Place,
        BetType::Quinella,
        BetType::QuinellaPlace,
        BetType::Exacta,
        BetType::Trio,
        BetType::Trifecta,
    ];

    /// Number of horses a combination of this type must name.
    pub fn required_horses(&self) -> usize {
        match self {
            BetType::Win | BetType::Place => 1,
            BetType::Quinella | BetType::QuinellaPlace | BetType::Exacta => 2,
            BetType::Trio | BetType::Trifecta => 3,
        }
    }

    /// Whether the finish order within the combination matters.
    pub fn is_ordered(&self) -> bool {
        matches!(self, BetType::Exacta | BetType::Trifecta)
    }

    /// Smallest field size on which this bet type is meaningful.
    pub fn min_field_size(&self) -> usize {
        match self {
            BetType::Win => 1,
            BetType::Quinella | BetType::Exacta => 2,
            BetType::Place | BetType::QuinellaPlace | BetType::Trio | BetType::Trifecta => 3,
        }
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::Win => write!(f, "win"),
            BetType::Place => write!(f, "place"),
            BetType::Quinella => write!(f, "quinella"),
            BetType::QuinellaPlace => write!(f, "wide"),
            BetType::Exacta => write!(f, "exacta"),
            BetType::Trio => write!(f, "trio"),
            BetType::Trifecta => write!(f, "trifecta"),
        }
    }
}

impl std::str::FromStr for BetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "win" => Ok(BetType::Win),
            "place" | "show" => Ok(BetType::Place),
            "quinella" => Ok(BetType::Quinella),
            "wide" | "quinella-place" => Ok(BetType::QuinellaPlace),
            "exacta" => Ok(BetType::Exacta),
            "trio" => Ok(BetType::Trio),
            "trifecta" => Ok(BetType::Trifecta),
            _ => Err(anyhow::anyhow!("Unknown bet type: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// Market odds for a wager: a single quote, or a {min,max} band as
/// published for place-style pools.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Odds {
    Fixed(f64),
    Band { min: f64, max: f64 },
}

/// Which end of an odds band to use when computing expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OddsPolicy {
    Conservative,
    #[default]
    Midpoint,
    Optimistic,
}

impl Odds {
    /// Resolve to a single multiplier under the given band policy.
    pub fn resolve(&self, policy: OddsPolicy) -> f64 {
        match *self {
            Odds::Fixed(x) => x,
            Odds::Band { min, max } => match policy {
                OddsPolicy::Conservative => min,
                OddsPolicy::Midpoint => (min + max) / 2.0,
                OddsPolicy::Optimistic => max,
            },
        }
    }

    /// Whether every quoted value is a finite number.
    pub fn is_finite(&self) -> bool {
        match *self {
            Odds::Fixed(x) => x.is_finite(),
            Odds::Band { min, max } => min.is_finite() && max.is_finite(),
        }
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Odds::Fixed(x) => write!(f, "{x:.1}"),
            Odds::Band { min, max } => write!(f, "{min:.1}-{max:.1}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Race context
// ---------------------------------------------------------------------------

/// Race condition tags that carry probability corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionTag {
    /// Weight-for-ability handicap race.
    Handicap,
    /// Newcomer/maiden debut race.
    MaidenNew,
    /// Grade 1 stakes race.
    GradeOne,
    /// Jump / hurdle race.
    Hurdle,
    /// Restricted to fillies and mares.
    FilliesOnly,
}

impl fmt::Display for ConditionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionTag::Handicap => write!(f, "handicap"),
            ConditionTag::MaidenNew => write!(f, "maiden-new"),
            ConditionTag::GradeOne => write!(f, "grade-1"),
            ConditionTag::Hurdle => write!(f, "hurdle"),
            ConditionTag::FilliesOnly => write!(f, "fillies-only"),
        }
    }
}

/// Static facts about the race being analyzed.
///
/// Only `field_size` and `conditions` affect the math; venue and distance
/// ride along for report output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceContext {
    /// Total number of runners (≥ 1).
    pub field_size: usize,
    #[serde(default)]
    pub conditions: BTreeSet<ConditionTag>,
    #[serde(default)]
    pub venue: String,
    /// Race distance in meters (informational).
    #[serde(default)]
    pub distance_m: u32,
}

impl fmt::Display for RaceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<String> = self.conditions.iter().map(|t| t.to_string()).collect();
        write!(
            f,
            "{} {}m, {} runners [{}]",
            self.venue,
            self.distance_m,
            self.field_size,
            tags.join(", "),
        )
    }
}

// ---------------------------------------------------------------------------
// Inputs: predictions and runners
// ---------------------------------------------------------------------------

/// One scored horse within a source's prediction list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorseScore {
    pub horse: u32,
    /// Relative strength score; not a probability.
    pub score: f64,
    /// Rank within the source's own ordering, if published.
    #[serde(default)]
    pub rank: Option<u32>,
}

/// One external source's raw prediction for a race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePrediction {
    /// Source identity, used for calibration and weight lookup.
    pub source: String,
    pub scores: Vec<HorseScore>,
}

/// Market data for one runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerEntry {
    pub horse: u32,
    /// Win-pool odds (single quote).
    pub win_odds: f64,
    /// Place-pool odds band, when published.
    #[serde(default)]
    pub place_odds: Option<Odds>,
    /// Popularity rank in the win pool (1 = favorite).
    pub popularity: u32,
}

// ---------------------------------------------------------------------------
// Win probability distribution
// ---------------------------------------------------------------------------

/// A mapping from horse number to win probability.
///
/// Invariant: all probabilities are in [0,1] and sum to 1.0 within
/// `SUM_TOLERANCE` whenever the distribution is non-empty. The checked
/// constructor enforces this; an empty distribution signals "no usable
/// data" and is a valid state, not an error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WinDistribution {
    probs: BTreeMap<u32, f64>,
}

impl WinDistribution {
    /// Tolerance on the sum-to-one invariant.
    pub const SUM_TOLERANCE: f64 = 1e-6;

    /// The empty distribution ("no usable scores").
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a distribution, enforcing the sum-to-one invariant.
    pub fn new(probs: BTreeMap<u32, f64>) -> Result<Self, EngineError> {
        if probs.is_empty() {
            return Ok(Self::empty());
        }
        for (&horse, &p) in &probs {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(EngineError::InvalidProbability { horse, value: p });
            }
        }
        let sum: f64 = probs.values().sum();
        if (sum - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(EngineError::UnnormalizedDistribution { sum });
        }
        Ok(Self { probs })
    }

    /// Build from raw non-negative masses, normalizing to sum 1.0.
    /// A zero, negative, or non-finite total yields the empty distribution
    /// (degenerate input is insufficient data, not an error).
    pub fn normalized(masses: BTreeMap<u32, f64>) -> Self {
        let total: f64 = masses.values().sum();
        if !total.is_finite() || total <= 0.0 {
            return Self::empty();
        }
        let probs = masses
            .into_iter()
            .map(|(h, m)| (h, (m / total).clamp(0.0, 1.0)))
            .collect();
        Self { probs }
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    /// Probability for one horse, if present.
    pub fn probability(&self, horse: u32) -> Option<f64> {
        self.probs.get(&horse).copied()
    }

    /// Horses covered by the distribution, ascending.
    pub fn horses(&self) -> impl Iterator<Item = u32> + '_ {
        self.probs.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.probs.iter().map(|(&h, &p)| (h, p))
    }

    /// The most probable horse, ties broken by lowest horse number.
    pub fn favorite(&self) -> Option<u32> {
        self.probs
            .iter()
            .max_by(|a, b| {
                a.1.partial_cmp(b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.0.cmp(a.0))
            })
            .map(|(&h, _)| h)
    }

    /// Herfindahl concentration index (Σ p²). 1.0 for a point mass,
    /// 1/n for a uniform distribution, 0.0 when empty.
    pub fn concentration(&self) -> f64 {
        self.probs.values().map(|p| p * p).sum()
    }
}

// ---------------------------------------------------------------------------
// Candidates, valuations, and selected bets
// ---------------------------------------------------------------------------

/// Qualitative rating of a wager's expected return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueRating {
    Undervalued,
    Fair,
    SlightlyOverpriced,
    Overpriced,
    InsufficientData,
}

impl ValueRating {
    /// Classify an expected return per the fixed thresholds.
    pub fn classify(expected_return: f64) -> Self {
        if !expected_return.is_finite() {
            ValueRating::InsufficientData
        } else if expected_return >= 1.05 {
            ValueRating::Undervalued
        } else if expected_return >= 0.90 {
            ValueRating::Fair
        } else if expected_return >= 0.70 {
            ValueRating::SlightlyOverpriced
        } else {
            ValueRating::Overpriced
        }
    }
}

impl fmt::Display for ValueRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRating::Undervalued => write!(f, "value"),
            ValueRating::Fair => write!(f, "fair"),
            ValueRating::SlightlyOverpriced => write!(f, "slightly overpriced"),
            ValueRating::Overpriced => write!(f, "overpriced"),
            ValueRating::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

/// A fully evaluated candidate wager. Immutable once built; re-derived
/// from scratch if odds or probabilities change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetCandidate {
    pub bet_type: BetType,
    /// Horse numbers; order is significant for exacta/trifecta.
    pub horses: Vec<u32>,
    /// Estimated success probability, clamped to [0,1].
    pub probability: f64,
    pub odds: Odds,
    /// `resolved_odds × probability`.
    pub expected_return: f64,
    pub rating: ValueRating,
}

impl fmt::Display for BetCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let horses: Vec<String> = self.horses.iter().map(|h| h.to_string()).collect();
        write!(
            f,
            "{} {} | p={:.1}% odds={} EV={:.2} ({})",
            self.bet_type,
            horses.join("-"),
            self.probability * 100.0,
            self.odds,
            self.expected_return,
            self.rating,
        )
    }
}

/// A candidate with an assigned stake, as produced by the allocator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedBet {
    pub candidate: BetCandidate,
    /// Stake in whole currency units.
    pub stake: u64,
    pub rationale: String,
}

impl fmt::Display for SelectedBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ ¥{}", self.candidate, self.stake)
    }
}

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// Spending constraint for one analysis request. Exactly one mode is
/// active — the enum itself enforces the budget-XOR-bankroll contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Budget {
    /// Spend up to this fixed amount on the race.
    Fixed(f64),
    /// Derive the race budget from total bankroll via a confidence factor.
    Bankroll(f64),
}

impl Budget {
    /// The raw amount behind either mode.
    pub fn amount(&self) -> f64 {
        match *self {
            Budget::Fixed(x) | Budget::Bankroll(x) => x,
        }
    }

    /// Whether the amount is a usable positive finite number.
    pub fn is_valid(&self) -> bool {
        let x = self.amount();
        x.is_finite() && x > 0.0
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Budget::Fixed(x) => write!(f, "fixed ¥{x:.0}"),
            Budget::Bankroll(x) => write!(f, "bankroll ¥{x:.0}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for ODDSMITH.
///
/// `InsufficientData` is recoverable: callers skip the affected candidate
/// or source and carry on. Every other variant is a contract violation,
/// a caller bug that must fail loudly rather than be coerced.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error("{bet_type} requires {required} horses, combination names {got}")]
    CombinationSize {
        bet_type: BetType,
        required: usize,
        got: usize,
    },

    #[error("horse {horse} appears more than once in the combination")]
    DuplicateHorse { horse: u32 },

    #[error("non-finite score {value} for horse {horse} from source {source_name}")]
    NonFiniteScore {
        source_name: String,
        horse: u32,
        value: f64,
    },

    #[error("invalid probability {value} for horse {horse}")]
    InvalidProbability { horse: u32, value: f64 },

    #[error("distribution sums to {sum}, expected 1.0")]
    UnnormalizedDistribution { sum: f64 },

    #[error("non-finite odds quoted for {bet_type} on {horses:?}")]
    NonFiniteOdds { bet_type: BetType, horses: Vec<u32> },

    #[error("invalid budget: {0}")]
    InvalidBudget(String),

    #[error("empty field: race context reports no runners")]
    EmptyField,

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Shorthand for the recoverable variant.
    pub fn insufficient(reason: impl Into<String>) -> Self {
        EngineError::InsufficientData {
            reason: reason.into(),
        }
    }

    /// Whether this error means "skip and continue" rather than "abort".
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::InsufficientData { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
