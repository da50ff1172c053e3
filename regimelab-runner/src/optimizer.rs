//! Regime-partitioned parameter optimizer.
//!
//! For every candidate indicator configuration and every regime partition of
//! the bars, the optimizer generates signals, scores them on next-bar returns
//! and keeps the pairs that pass the degeneracy gate. Candidates are
//! independent, so they are evaluated on the rayon pool when
//! [`OptimizerConfig::parallel`] is set.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use regimelab_core::{
    BarSeries, Catalog, IndicatorCache, IndicatorError, IndicatorFrame, IndicatorOutputs,
    IndicatorRegistry, RegimeChange, RegimeId, RegimeTimeline,
};

use crate::config::{OptimizerConfig, SettingError, TestMode};
use crate::scoring::{score_bars, PairScore, Rejection, ScoringParams};
use crate::signals::{generate_signals, Bias};
use crate::space::{enumerate_spaces, CandidateSpace, OptimizationCandidate};

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error(transparent)]
    InvalidConfig(#[from] SettingError),
    #[error("no candidates to evaluate")]
    EmptySpace,
    #[error("invalid range for {indicator}.{param}: {reason}")]
    InvalidRange {
        indicator: String,
        param: String,
        reason: String,
    },
    #[error("{indicator} grid expands to more than {max} points")]
    GridTooLarge { indicator: String, max: usize },
    #[error("candidate {candidate}: {source}")]
    Indicator {
        candidate: String,
        #[source]
        source: IndicatorError,
    },
    #[error("regime indicators: {0}")]
    RegimeIndicators(#[source] IndicatorError),
}

// ─── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// One scored (candidate, regime) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub candidate: OptimizationCandidate,
    /// `None` for the unclassified partition.
    pub regime: Option<RegimeId>,
    /// Composite score, 0-100.
    pub score: u8,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    pub trade_count: usize,
    pub signal_count: usize,
    pub proximity: Option<f64>,
    pub max_drawdown: f64,
}

impl OptimizationResult {
    fn new(candidate: &OptimizationCandidate, regime: Option<RegimeId>, pair: &PairScore) -> Self {
        Self {
            candidate: candidate.clone(),
            regime,
            score: pair.score,
            win_rate: pair.metrics.win_rate,
            profit_factor: pair.metrics.profit_factor,
            sharpe: pair.metrics.sharpe,
            trade_count: pair.metrics.trade_count,
            signal_count: pair.signal_count,
            proximity: pair.proximity,
            max_drawdown: pair.metrics.max_drawdown,
        }
    }
}

/// Counts of everything the run evaluated or discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegeneracySummary {
    /// Candidates after enumeration and sampling.
    pub candidates_total: usize,
    /// Candidates actually evaluated (fewer when cancelled).
    pub candidates_evaluated: usize,
    /// Grid points dropped as invalid parameter combinations.
    pub invalid_combinations: usize,
    /// Regime partitions skipped for having fewer than `min_regime_bars`.
    pub small_partitions: usize,
    pub pairs_evaluated: usize,
    pub zero_signal: usize,
    pub below_min_trades: usize,
}

impl DegeneracySummary {
    pub fn rejected(&self) -> usize {
        self.zero_signal + self.below_min_trades
    }

    fn reject(&mut self, why: Rejection) {
        match why {
            Rejection::ZeroSignals => self.zero_signal += 1,
            Rejection::BelowMinTrades => self.below_min_trades += 1,
        }
    }

    fn absorb(&mut self, other: &DegeneracySummary) {
        self.candidates_evaluated += other.candidates_evaluated;
        self.pairs_evaluated += other.pairs_evaluated;
        self.zero_signal += other.zero_signal;
        self.below_min_trades += other.below_min_trades;
    }
}

/// Ranked output of one optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    /// Surviving pairs, best first.
    pub results: Vec<OptimizationResult>,
    /// Primary-regime transitions of the governing series.
    pub regime_changes: Vec<RegimeChange>,
    pub summary: DegeneracySummary,
    pub status: RunStatus,
}

impl OptimizationReport {
    pub fn best(&self) -> Option<&OptimizationResult> {
        self.results.first()
    }

    /// Best result within one partition.
    pub fn best_for(&self, regime: Option<&RegimeId>) -> Option<&OptimizationResult> {
        self.results.iter().find(|r| r.regime.as_ref() == regime)
    }
}

// ─── Run context ─────────────────────────────────────────────────────

/// Shared, read-only inputs of a run.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub catalog: &'a Catalog,
    pub registry: &'a IndicatorRegistry,
    pub cache: Option<&'a IndicatorCache>,
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> RunContext<'a> {
    pub fn new(catalog: &'a Catalog, registry: &'a IndicatorRegistry) -> Self {
        Self {
            catalog,
            registry,
            cache: None,
            cancel: None,
        }
    }

    pub fn with_cache(mut self, cache: &'a IndicatorCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Catalog indicators over `series`, labelled for `config.regime_scope`.
    pub fn label(
        &self,
        series: &BarSeries,
        config: &OptimizerConfig,
    ) -> Result<RegimeTimeline, OptimizerError> {
        let definitions = self.catalog.indicators();
        let frame = match self.cache {
            Some(cache) => {
                IndicatorFrame::compute_cached(series, definitions, self.registry, cache)
            }
            None => IndicatorFrame::compute(series, definitions, self.registry),
        }
        .map_err(OptimizerError::RegimeIndicators)?;
        Ok(self
            .catalog
            .detector()
            .label_series(&frame, config.regime_scope))
    }

    /// Outputs of `candidate` over `series`.
    pub fn compute_candidate(
        &self,
        series: &BarSeries,
        candidate: &OptimizationCandidate,
    ) -> Result<Arc<IndicatorOutputs>, OptimizerError> {
        let computed = match self.cache {
            Some(cache) => cache.get_or_compute(self.registry, series, &candidate.kind),
            None => self
                .registry
                .compute_kind(series.bars(), &candidate.kind)
                .map(Arc::new),
        };
        computed.map_err(|source| OptimizerError::Indicator {
            candidate: candidate.label(),
            source,
        })
    }
}

pub(crate) fn scoring_params(config: &OptimizerConfig) -> ScoringParams {
    ScoringParams {
        bias: Bias::of(config.mode, config.side),
        weights: config.weights.normalized(config.mode),
        proximity_window: match config.mode {
            TestMode::Entry => Some(config.proximity_window),
            TestMode::Exit => None,
        },
        trade_count_target: config.trade_count_target,
    }
}

// ─── Optimization ────────────────────────────────────────────────────

/// Enumerate `spaces` and optimize every candidate over `series`.
pub fn optimize(
    ctx: &RunContext<'_>,
    series: &BarSeries,
    spaces: &[CandidateSpace],
    config: &OptimizerConfig,
) -> Result<OptimizationReport, OptimizerError> {
    config.validate()?;
    let enumeration = enumerate_spaces(spaces, config.search)?;
    let mut report = optimize_candidates(ctx, series, &enumeration.candidates, config)?;
    report.summary.invalid_combinations = enumeration.invalid_combinations;
    Ok(report)
}

/// Optimize an already enumerated candidate list over `series`.
pub fn optimize_candidates(
    ctx: &RunContext<'_>,
    series: &BarSeries,
    candidates: &[OptimizationCandidate],
    config: &OptimizerConfig,
) -> Result<OptimizationReport, OptimizerError> {
    config.validate()?;
    if candidates.is_empty() {
        return Err(OptimizerError::EmptySpace);
    }

    let timeline = ctx.label(series, config)?;
    let mut summary = DegeneracySummary {
        candidates_total: candidates.len(),
        ..Default::default()
    };
    let partitions: Vec<(Option<RegimeId>, Vec<usize>)> = timeline
        .partition()
        .into_iter()
        .filter(|(regime, _)| regime.is_some() || config.include_unclassified)
        .filter(|(_, bars)| {
            let keep = bars.len() >= config.min_regime_bars;
            if !keep {
                summary.small_partitions += 1;
            }
            keep
        })
        .collect();

    info!(
        symbol = series.symbol(),
        bars = series.len(),
        candidates = candidates.len(),
        partitions = partitions.len(),
        small_partitions = summary.small_partitions,
        "optimizer starting"
    );

    let params = scoring_params(config);
    let evaluate = |candidate: &OptimizationCandidate| -> Option<Result<CandidateOutcome, OptimizerError>> {
        if ctx.is_cancelled() {
            return None;
        }
        Some(evaluate_candidate(ctx, series, candidate, &partitions, config, &params))
    };

    let outcomes: Vec<Option<Result<CandidateOutcome, OptimizerError>>> = if config.parallel {
        candidates.par_iter().map(evaluate).collect()
    } else {
        candidates.iter().map(evaluate).collect()
    };

    let mut results = Vec::new();
    let mut skipped = 0usize;
    for outcome in outcomes {
        match outcome {
            Some(outcome) => {
                let outcome = outcome?;
                summary.absorb(&outcome.summary);
                results.extend(outcome.results);
            }
            None => skipped += 1,
        }
    }

    results.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.candidate.label().cmp(&b.candidate.label()))
            .then_with(|| a.regime.cmp(&b.regime))
    });

    let status = if skipped > 0 {
        warn!(
            evaluated = summary.candidates_evaluated,
            skipped, "optimizer cancelled"
        );
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };
    if results.is_empty() {
        warn!(
            zero_signal = summary.zero_signal,
            below_min_trades = summary.below_min_trades,
            "no candidate survived the degeneracy gate"
        );
    }
    info!(
        results = results.len(),
        rejected = summary.rejected(),
        best_score = results.first().map(|r| r.score),
        "optimizer finished"
    );

    Ok(OptimizationReport {
        results,
        regime_changes: timeline.changes().to_vec(),
        summary,
        status,
    })
}

struct CandidateOutcome {
    results: Vec<OptimizationResult>,
    summary: DegeneracySummary,
}

fn evaluate_candidate(
    ctx: &RunContext<'_>,
    series: &BarSeries,
    candidate: &OptimizationCandidate,
    partitions: &[(Option<RegimeId>, Vec<usize>)],
    config: &OptimizerConfig,
    params: &ScoringParams,
) -> Result<CandidateOutcome, OptimizerError> {
    let outputs = ctx.compute_candidate(series, candidate)?;
    let signals = generate_signals(
        &candidate.kind,
        &outputs,
        series.bars(),
        config.mode,
        config.side,
        &config.thresholds,
    );

    let mut summary = DegeneracySummary {
        candidates_evaluated: 1,
        ..Default::default()
    };
    let mut results = Vec::new();
    for (regime, indices) in partitions {
        summary.pairs_evaluated += 1;
        let pair = score_bars(series.bars(), &signals, indices, params);
        match pair.rejection(config.min_trades) {
            Some(why) => summary.reject(why),
            None => results.push(OptimizationResult::new(candidate, regime.clone(), &pair)),
        }
    }

    debug!(
        candidate = %candidate.label(),
        kept = results.len(),
        rejected = summary.rejected(),
        "candidate evaluated"
    );
    Ok(CandidateOutcome { results, summary })
}

/// Score a fixed candidate on one regime partition of `series`, without the
/// degeneracy gate or the partition-size minimum.
pub fn score_candidate(
    ctx: &RunContext<'_>,
    series: &BarSeries,
    candidate: &OptimizationCandidate,
    regime: Option<&RegimeId>,
    config: &OptimizerConfig,
) -> Result<PairScore, OptimizerError> {
    score_candidate_from(ctx, series, candidate, regime, config, 0)
}

/// Like [`score_candidate`], but bars before `score_from` only feed indicator
/// and regime warm-up; they are never scored.
pub fn score_candidate_from(
    ctx: &RunContext<'_>,
    series: &BarSeries,
    candidate: &OptimizationCandidate,
    regime: Option<&RegimeId>,
    config: &OptimizerConfig,
    score_from: usize,
) -> Result<PairScore, OptimizerError> {
    let timeline = ctx.label(series, config)?;
    let indices: Vec<usize> = timeline
        .labels()
        .iter()
        .enumerate()
        .filter(|&(i, label)| i >= score_from && label.as_ref() == regime)
        .map(|(i, _)| i)
        .collect();
    let outputs = ctx.compute_candidate(series, candidate)?;
    let signals = generate_signals(
        &candidate.kind,
        &outputs,
        series.bars(),
        config.mode,
        config.side,
        &config.thresholds,
    );
    Ok(score_bars(series.bars(), &signals, &indices, &scoring_params(config)))
}

/// Best surviving result per partition, keyed by regime.
pub fn best_per_regime(report: &OptimizationReport) -> BTreeMap<Option<RegimeId>, &OptimizationResult> {
    let mut best = BTreeMap::new();
    for result in &report.results {
        best.entry(result.regime.clone()).or_insert(result);
    }
    best
}
