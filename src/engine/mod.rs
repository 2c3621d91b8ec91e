//! Analysis engine — the full per-race pipeline.
//!
//! Wires calibration, pooling, probability modelling, selection,
//! allocation, and composite analysis into one deterministic pass over a
//! race request. The engine holds only configuration; every analysis is
//! a pure function of its request, so replaying a request reproduces the
//! report bit for bit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::fusion::{OpinionPool, SourceCalibrator};
use crate::model::ProbabilityModel;
use crate::strategy::allocate::{AllocationMode, FundAllocator};
use crate::strategy::composite::{CompositeAnalysis, CompositeOddsAnalyzer};
use crate::strategy::ev::EvCalculator;
use crate::strategy::BetSelector;
use crate::types::{
    BetType, Budget, EngineError, OddsPolicy, RaceContext, RunnerEntry, SelectedBet,
    SourcePrediction, WinDistribution,
};

// ---------------------------------------------------------------------------
// Request and report
// ---------------------------------------------------------------------------

/// Everything needed to analyze one race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceAnalysisRequest {
    pub race_id: String,
    /// Raw predictions, one per external source.
    pub predictions: Vec<SourcePrediction>,
    /// Current market data for every runner.
    pub runners: Vec<RunnerEntry>,
    pub context: RaceContext,
    pub budget: Budget,
    /// Restrict the slate to these bet types. Empty or absent means all.
    #[serde(default)]
    pub preferred_bet_types: Option<Vec<BetType>>,
    /// Override the configured slate size cap.
    #[serde(default)]
    pub max_bets: Option<usize>,
    #[serde(default)]
    pub allocation_mode: Option<AllocationMode>,
    #[serde(default)]
    pub odds_policy: Option<OddsPolicy>,
}

/// The complete analysis result for one race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceAnalysisReport {
    pub race_id: String,
    pub generated_at: DateTime<Utc>,
    /// Consensus win distribution the slate was built on.
    pub consensus: WinDistribution,
    pub bets: Vec<SelectedBet>,
    /// Present for multi-leg slates only.
    pub composite: Option<CompositeAnalysis>,
    pub total_spent: u64,
    pub remaining: f64,
    pub strategy: String,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Per-race analysis pipeline, configured once at startup.
pub struct AnalysisEngine {
    config: AppConfig,
    calibrator: SourceCalibrator,
    pool: OpinionPool,
}

impl AnalysisEngine {
    pub fn new(config: AppConfig) -> Self {
        let calibrator = SourceCalibrator::new(config.sources.clone());
        let pool = OpinionPool::new(config.sources.clone());
        Self {
            config,
            calibrator,
            pool,
        }
    }

    /// Run the full pipeline on one race request.
    ///
    /// Recoverable data problems shrink the result (fewer sources, fewer
    /// candidates, an empty slate) without failing the analysis; contract
    /// violations in the request abort it.
    pub fn analyze(
        &self,
        request: &RaceAnalysisRequest,
    ) -> Result<RaceAnalysisReport, EngineError> {
        info!(
            race_id = %request.race_id,
            sources = request.predictions.len(),
            runners = request.runners.len(),
            context = %request.context,
            budget = %request.budget,
            "Analyzing race"
        );

        let consensus = self.build_consensus(&request.predictions)?;
        if consensus.is_empty() {
            warn!(
                race_id = %request.race_id,
                "No usable consensus — falling back to rank-table estimates"
            );
        }

        let model = ProbabilityModel::new(self.config.model.clone());
        let ev = EvCalculator::new(request.odds_policy.unwrap_or_default());
        let selector = BetSelector::new(model, ev, self.config.selection.clone());
        let slate = selector.select(
            &consensus,
            &request.runners,
            &request.context,
            request.preferred_bet_types.as_deref(),
            request.max_bets,
        )?;

        let allocator = FundAllocator::new(self.config.allocation.clone());
        let mode = request.allocation_mode.unwrap_or_default();
        let allocation = allocator.allocate(&slate, &request.budget, &consensus, mode)?;

        let analyzer = CompositeOddsAnalyzer::new(self.config.allocation.torigami_threshold);
        let composite = analyzer.analyze(&allocation.bets);

        let summary = summarize(&request.race_id, &allocation.bets, composite.as_ref());
        info!(race_id = %request.race_id, summary = %summary, "Analysis complete");

        Ok(RaceAnalysisReport {
            race_id: request.race_id.clone(),
            generated_at: Utc::now(),
            consensus,
            bets: allocation.bets,
            composite,
            total_spent: allocation.total_spent,
            remaining: allocation.remaining,
            strategy: allocation.strategy,
            summary,
        })
    }

    /// Calibrate every source and pool them. When the pool comes back
    /// empty (disjoint coverage, all sources unusable), fall back to the
    /// highest-weight single usable source rather than discarding all
    /// prediction data.
    fn build_consensus(
        &self,
        predictions: &[SourcePrediction],
    ) -> Result<WinDistribution, EngineError> {
        let mut calibrated: Vec<(String, WinDistribution)> = Vec::with_capacity(predictions.len());
        for prediction in predictions {
            let dist = self.calibrator.calibrate(prediction)?;
            calibrated.push((prediction.source.clone(), dist));
        }

        let consensus = self.pool.pool(&calibrated);
        if !consensus.is_empty() {
            return Ok(consensus);
        }

        let fallback = calibrated
            .iter()
            .filter(|(_, dist)| !dist.is_empty())
            .max_by(|(a, _), (b, _)| {
                let wa = self.config.sources.weight_for(a, calibrated.len());
                let wb = self.config.sources.weight_for(b, calibrated.len());
                wa.partial_cmp(&wb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.cmp(a))
            });
        match fallback {
            Some((source, dist)) => {
                debug!(source = %source, "Pool empty — using best single source");
                Ok(dist.clone())
            }
            None => Ok(WinDistribution::empty()),
        }
    }
}

/// One-line human summary of the slate.
fn summarize(race_id: &str, bets: &[SelectedBet], composite: Option<&CompositeAnalysis>) -> String {
    if bets.is_empty() {
        return format!("{race_id}: no positive-expected-value wager found");
    }
    let total: u64 = bets.iter().map(|b| b.stake).sum();
    let mut summary = format!(
        "{race_id}: {} bet(s) totalling ¥{total}, best {}",
        bets.len(),
        bets[0].candidate,
    );
    if let Some(c) = composite {
        if c.is_torigami {
            summary.push_str(&format!(
                "; WARNING composite odds {:.2} — slate cannot profit",
                c.composite_odds
            ));
        }
    }
    summary
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
