//! Walk-forward validation: rolling in-sample / out-of-sample folds.
//!
//! Each fold optimizes on its in-sample (IS) bars, takes the single best
//! (candidate, regime) pair and re-scores it, unchanged, on the following
//! out-of-sample (OOS) bars. The fold's IS bars are prepended to the OOS
//! slice as warm-up context for the candidate and the regime indicators, so
//! the first OOS bars are already labelled; only OOS bars are scored.
//!
//! Aggregate OOS behaviour is checked against fixed thresholds and reported
//! as a [`Verdict`] naming every failed criterion.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use regimelab_core::{BarSeries, RegimeId};

use crate::config::OptimizerConfig;
use crate::metrics::{mean_f64, variance};
use crate::optimizer::{
    optimize_candidates, score_candidate_from, DegeneracySummary, OptimizationResult, OptimizerError,
    RunContext, RunStatus,
};
use crate::scoring::PairScore;
use crate::space::{enumerate_spaces, CandidateSpace, OptimizationCandidate};

// ─── Configuration ───────────────────────────────────────────────────

/// Configuration for walk-forward validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Bars per fold, IS and OOS together (default 252).
    pub window_size: usize,
    /// Bars between consecutive fold starts (default 63).
    pub step_size: usize,
    /// Share of each window used in-sample (default 0.75).
    pub in_sample_ratio: f64,
    /// Minimum scored OOS signals in every fold (default 5).
    pub min_oos_trades: usize,
    /// Largest tolerated OOS drawdown, as a positive fraction (default 0.25).
    pub max_drawdown: f64,
    /// Largest tolerated relative score loss from IS to OOS (default 0.5).
    pub max_degradation: f64,
    /// Run folds on the rayon pool. Candidates within a fold are then
    /// evaluated sequentially.
    pub parallel: bool,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            window_size: 252,
            step_size: 63,
            in_sample_ratio: 0.75,
            min_oos_trades: 5,
            max_drawdown: 0.25,
            max_degradation: 0.5,
            parallel: true,
        }
    }
}

impl WalkForwardConfig {
    /// IS bars per window.
    pub fn in_sample_len(&self) -> usize {
        (self.window_size as f64 * self.in_sample_ratio).round() as usize
    }

    pub fn validate(&self) -> Result<(), WalkForwardError> {
        let invalid = |reason: String| Err(WalkForwardError::InvalidConfig(reason));
        if self.window_size < 2 {
            return invalid(format!("window_size {} must be >= 2", self.window_size));
        }
        if self.step_size == 0 {
            return invalid("step_size must be >= 1".into());
        }
        if !(self.in_sample_ratio.is_finite()
            && self.in_sample_ratio > 0.0
            && self.in_sample_ratio < 1.0)
        {
            return invalid(format!(
                "in_sample_ratio {} must lie strictly between 0 and 1",
                self.in_sample_ratio
            ));
        }
        let is_len = self.in_sample_len();
        if is_len == 0 || is_len >= self.window_size {
            return invalid(format!(
                "window of {} bars at ratio {} leaves an empty IS or OOS slice",
                self.window_size, self.in_sample_ratio
            ));
        }
        if !(self.max_drawdown.is_finite() && self.max_drawdown >= 0.0) {
            return invalid("max_drawdown must be a non-negative fraction".into());
        }
        if !self.max_degradation.is_finite() {
            return invalid("max_degradation must be finite".into());
        }
        Ok(())
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Bar index ranges of a single walk-forward fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSpec {
    pub fold_index: usize,
    /// In-sample start bar index (inclusive).
    pub is_start: usize,
    /// In-sample end bar index (exclusive).
    pub is_end: usize,
    /// Out-of-sample start bar index (inclusive).
    pub oos_start: usize,
    /// Out-of-sample end bar index (exclusive).
    pub oos_end: usize,
}

/// Score and metrics of one side of a fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub score: u8,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    pub trade_count: usize,
    /// Negative fraction.
    pub max_drawdown: f64,
}

impl From<&OptimizationResult> for FoldMetrics {
    fn from(result: &OptimizationResult) -> Self {
        Self {
            score: result.score,
            win_rate: result.win_rate,
            profit_factor: result.profit_factor,
            sharpe: result.sharpe,
            trade_count: result.trade_count,
            max_drawdown: result.max_drawdown,
        }
    }
}

impl From<&PairScore> for FoldMetrics {
    fn from(pair: &PairScore) -> Self {
        Self {
            score: pair.score,
            win_rate: pair.metrics.win_rate,
            profit_factor: pair.metrics.profit_factor,
            sharpe: pair.metrics.sharpe,
            trade_count: pair.metrics.trade_count,
            max_drawdown: pair.metrics.max_drawdown,
        }
    }
}

/// The IS winner of a fold and how it held up OOS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldWinner {
    pub candidate: OptimizationCandidate,
    pub regime: Option<RegimeId>,
    pub in_sample: FoldMetrics,
    pub out_of_sample: FoldMetrics,
}

/// Result of a single fold evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: FoldSpec,
    /// `None` when nothing survived the IS degeneracy gate.
    pub winner: Option<FoldWinner>,
    pub in_sample_summary: DegeneracySummary,
}

/// Cross-fold statistics over folds with an IS winner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WalkForwardAggregate {
    pub folds: usize,
    pub folds_with_winner: usize,
    pub mean_oos_sharpe: f64,
    /// Sample variance of the per-fold OOS Sharpe-like ratios.
    pub oos_sharpe_variance: f64,
    /// Most negative per-fold OOS drawdown.
    pub worst_oos_drawdown: f64,
    pub mean_is_score: f64,
    pub mean_oos_score: f64,
    /// `(mean IS score - mean OOS score) / mean IS score`; `None` when the
    /// mean IS score is zero.
    pub degradation: Option<f64>,
    pub total_oos_trades: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Robust,
    NotRobust,
}

/// A robustness criterion that did not hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "criterion", rename_all = "snake_case")]
pub enum FailedCriterion {
    /// The series is shorter than one window.
    NoFolds { total_bars: usize, window_size: usize },
    NoInSampleWinner { folds: Vec<usize> },
    OosTradeCount { fold: usize, trades: usize, min: usize },
    Drawdown { worst: f64, max: f64 },
    Degradation { value: Option<f64>, max: f64 },
    Cancelled,
}

impl fmt::Display for FailedCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedCriterion::NoFolds {
                total_bars,
                window_size,
            } => write!(
                f,
                "no folds: {total_bars} bars is shorter than one {window_size}-bar window"
            ),
            FailedCriterion::NoInSampleWinner { folds } => {
                write!(f, "no in-sample winner in folds {folds:?}")
            }
            FailedCriterion::OosTradeCount { fold, trades, min } => {
                write!(f, "fold {fold}: {trades} OOS trades < minimum {min}")
            }
            FailedCriterion::Drawdown { worst, max } => write!(
                f,
                "OOS drawdown {:.1}% exceeds {:.1}%",
                worst.abs() * 100.0,
                max * 100.0
            ),
            FailedCriterion::Degradation {
                value: Some(value),
                max,
            } => write!(f, "IS→OOS degradation {value:.2} exceeds {max:.2}"),
            FailedCriterion::Degradation { value: None, .. } => {
                write!(f, "degradation undefined: mean IS score is zero")
            }
            FailedCriterion::Cancelled => write!(f, "run cancelled before every fold finished"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessVerdict {
    pub verdict: Verdict,
    pub failed: Vec<FailedCriterion>,
}

impl RobustnessVerdict {
    pub fn is_robust(&self) -> bool {
        self.verdict == Verdict::Robust
    }
}

/// Complete result of walk-forward validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub folds: Vec<FoldResult>,
    pub aggregate: WalkForwardAggregate,
    pub verdict: RobustnessVerdict,
    pub status: RunStatus,
}

/// Errors from walk-forward validation.
#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("invalid walk-forward config: {0}")]
    InvalidConfig(String),
    #[error(
        "insufficient data: {is_bars} in-sample bars per fold < min_regime_bars {min_regime_bars}"
    )]
    InsufficientData {
        is_bars: usize,
        min_regime_bars: usize,
    },
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
    #[error("optimizer error on fold {fold}: {source}")]
    FoldFailed {
        fold: usize,
        #[source]
        source: OptimizerError,
    },
}

// ─── Fold creation ───────────────────────────────────────────────────

/// Create rolling-window folds.
///
/// Fold `k` covers `[k * step, k * step + window)`; its first
/// `round(window * in_sample_ratio)` bars are in-sample, the rest
/// out-of-sample. Windows that would run past the data are not created, so
/// a series shorter than one window yields no folds.
pub fn create_folds(
    total_bars: usize,
    config: &WalkForwardConfig,
) -> Result<Vec<FoldSpec>, WalkForwardError> {
    config.validate()?;
    let is_len = config.in_sample_len();

    let mut folds = Vec::new();
    let mut start = 0usize;
    while start + config.window_size <= total_bars {
        folds.push(FoldSpec {
            fold_index: folds.len(),
            is_start: start,
            is_end: start + is_len,
            oos_start: start + is_len,
            oos_end: start + config.window_size,
        });
        start += config.step_size;
    }
    Ok(folds)
}

// ─── Walk-forward orchestration ──────────────────────────────────────

/// Run walk-forward validation of `spaces` over `series`.
///
/// The candidate list is enumerated once and shared by every fold.
pub fn run_walk_forward(
    ctx: &RunContext<'_>,
    series: &BarSeries,
    spaces: &[CandidateSpace],
    optimizer: &OptimizerConfig,
    config: &WalkForwardConfig,
) -> Result<WalkForwardReport, WalkForwardError> {
    optimizer.validate().map_err(OptimizerError::from)?;
    let folds = create_folds(series.len(), config)?;
    let is_len = config.in_sample_len();
    if is_len < optimizer.min_regime_bars {
        return Err(WalkForwardError::InsufficientData {
            is_bars: is_len,
            min_regime_bars: optimizer.min_regime_bars,
        });
    }
    let candidates = enumerate_spaces(spaces, optimizer.search)?.candidates;

    info!(
        symbol = series.symbol(),
        bars = series.len(),
        folds = folds.len(),
        candidates = candidates.len(),
        "walk-forward starting"
    );

    let mut inner = optimizer.clone();
    if config.parallel {
        inner.parallel = false;
    }

    let run_fold = |fold: &FoldSpec| -> Option<Result<FoldResult, WalkForwardError>> {
        if ctx.is_cancelled() {
            return None;
        }
        evaluate_fold(ctx, series, fold, &candidates, &inner).transpose()
    };

    let outcomes: Vec<Option<Result<FoldResult, WalkForwardError>>> = if config.parallel {
        folds.par_iter().map(run_fold).collect()
    } else {
        folds.iter().map(run_fold).collect()
    };

    let mut results = Vec::with_capacity(outcomes.len());
    let mut incomplete = 0usize;
    for outcome in outcomes {
        match outcome {
            Some(result) => results.push(result?),
            None => incomplete += 1,
        }
    }
    let status = if incomplete > 0 {
        warn!(
            completed = results.len(),
            incomplete, "walk-forward cancelled"
        );
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };

    let aggregate = compute_aggregate(&results);
    let verdict = judge(series.len(), &results, &aggregate, config, status);
    info!(
        verdict = ?verdict.verdict,
        failed = verdict.failed.len(),
        mean_oos_sharpe = aggregate.mean_oos_sharpe,
        degradation = ?aggregate.degradation,
        "walk-forward finished"
    );

    Ok(WalkForwardReport {
        folds: results,
        aggregate,
        verdict,
        status,
    })
}

/// Optimize IS, re-score the winner OOS. `Ok(None)` when the fold was cut
/// short by cancellation.
///
/// The re-score runs over `[is_start, oos_end)` and scores only bars from
/// `oos_start` on. Indicators are causal, so IS bars act purely as history.
fn evaluate_fold(
    ctx: &RunContext<'_>,
    series: &BarSeries,
    fold: &FoldSpec,
    candidates: &[OptimizationCandidate],
    optimizer: &OptimizerConfig,
) -> Result<Option<FoldResult>, WalkForwardError> {
    let failed = |source: OptimizerError| WalkForwardError::FoldFailed {
        fold: fold.fold_index,
        source,
    };

    let is_series = series.slice(fold.is_start, fold.is_end);
    let report = optimize_candidates(ctx, &is_series, candidates, optimizer).map_err(failed)?;
    if report.status == RunStatus::Cancelled {
        return Ok(None);
    }

    let winner = match report.best() {
        Some(best) => {
            let context = series.slice(fold.is_start, fold.oos_end);
            let oos = score_candidate_from(
                ctx,
                &context,
                &best.candidate,
                best.regime.as_ref(),
                optimizer,
                fold.oos_start - fold.is_start,
            )
            .map_err(failed)?;
            Some(FoldWinner {
                candidate: best.candidate.clone(),
                regime: best.regime.clone(),
                in_sample: FoldMetrics::from(best),
                out_of_sample: FoldMetrics::from(&oos),
            })
        }
        None => None,
    };

    match &winner {
        Some(w) => debug!(
            fold = fold.fold_index,
            candidate = %w.candidate.label(),
            is_score = w.in_sample.score,
            oos_score = w.out_of_sample.score,
            oos_trades = w.out_of_sample.trade_count,
            "fold evaluated"
        ),
        None => debug!(fold = fold.fold_index, "fold has no in-sample winner"),
    }

    Ok(Some(FoldResult {
        fold: *fold,
        winner,
        in_sample_summary: report.summary,
    }))
}

// ─── Aggregation ─────────────────────────────────────────────────────

/// Cross-fold statistics. Folds without an IS winner count towards `folds`
/// only.
pub fn compute_aggregate(folds: &[FoldResult]) -> WalkForwardAggregate {
    let winners: Vec<&FoldWinner> = folds.iter().filter_map(|f| f.winner.as_ref()).collect();
    if winners.is_empty() {
        return WalkForwardAggregate {
            folds: folds.len(),
            ..Default::default()
        };
    }

    let oos_sharpes: Vec<f64> = winners.iter().map(|w| w.out_of_sample.sharpe).collect();
    let is_scores: Vec<f64> = winners.iter().map(|w| w.in_sample.score as f64).collect();
    let oos_scores: Vec<f64> = winners
        .iter()
        .map(|w| w.out_of_sample.score as f64)
        .collect();
    let mean_is_score = mean_f64(&is_scores);
    let mean_oos_score = mean_f64(&oos_scores);
    let degradation = if mean_is_score > 0.0 {
        Some((mean_is_score - mean_oos_score) / mean_is_score)
    } else {
        None
    };

    WalkForwardAggregate {
        folds: folds.len(),
        folds_with_winner: winners.len(),
        mean_oos_sharpe: mean_f64(&oos_sharpes),
        oos_sharpe_variance: variance(&oos_sharpes),
        worst_oos_drawdown: winners
            .iter()
            .map(|w| w.out_of_sample.max_drawdown)
            .fold(0.0, f64::min),
        mean_is_score,
        mean_oos_score,
        degradation,
        total_oos_trades: winners.iter().map(|w| w.out_of_sample.trade_count).sum(),
    }
}

/// Check the aggregate against the configured thresholds. Every failing
/// criterion is listed; an empty list means ROBUST.
pub fn judge(
    total_bars: usize,
    folds: &[FoldResult],
    aggregate: &WalkForwardAggregate,
    config: &WalkForwardConfig,
    status: RunStatus,
) -> RobustnessVerdict {
    let mut failed = Vec::new();

    if status == RunStatus::Cancelled {
        failed.push(FailedCriterion::Cancelled);
    }
    if folds.is_empty() && status == RunStatus::Completed {
        failed.push(FailedCriterion::NoFolds {
            total_bars,
            window_size: config.window_size,
        });
    }

    let without_winner: Vec<usize> = folds
        .iter()
        .filter(|f| f.winner.is_none())
        .map(|f| f.fold.fold_index)
        .collect();
    if !without_winner.is_empty() {
        failed.push(FailedCriterion::NoInSampleWinner {
            folds: without_winner,
        });
    }

    for fold in folds {
        if let Some(w) = &fold.winner {
            if w.out_of_sample.trade_count < config.min_oos_trades {
                failed.push(FailedCriterion::OosTradeCount {
                    fold: fold.fold.fold_index,
                    trades: w.out_of_sample.trade_count,
                    min: config.min_oos_trades,
                });
            }
        }
    }

    if aggregate.folds_with_winner > 0 {
        if aggregate.worst_oos_drawdown.abs() > config.max_drawdown {
            failed.push(FailedCriterion::Drawdown {
                worst: aggregate.worst_oos_drawdown,
                max: config.max_drawdown,
            });
        }
        match aggregate.degradation {
            Some(d) if d <= config.max_degradation => {}
            value => failed.push(FailedCriterion::Degradation {
                value,
                max: config.max_degradation,
            }),
        }
    }

    let verdict = if failed.is_empty() {
        Verdict::Robust
    } else {
        Verdict::NotRobust
    };
    RobustnessVerdict { verdict, failed }
}
