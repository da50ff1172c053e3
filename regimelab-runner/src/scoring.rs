//! Forward-looking evaluation of flagged bars.
//!
//! This is the only module that reads bars after a signal: the next bar's
//! close scores the signal. Signal generation itself lives in
//! [`crate::signals`] and never sees those bars.

use serde::{Deserialize, Serialize};

use regimelab_core::Bar;

use crate::config::ScoreWeights;
use crate::metrics::SignalMetrics;
use crate::signals::Bias;

/// Why a (candidate, regime) pair was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    ZeroSignals,
    BelowMinTrades,
}

/// Evaluation of one candidate's signals over one set of bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    /// Flagged bars in the partition, including a final bar with no next bar.
    pub signal_count: usize,
    pub metrics: SignalMetrics,
    /// Entry mode only.
    pub proximity: Option<f64>,
    pub score: u8,
}

impl PairScore {
    /// Degeneracy gate: zero signals first, then the trade-count minimum.
    pub fn rejection(&self, min_trades: usize) -> Option<Rejection> {
        if self.signal_count == 0 {
            Some(Rejection::ZeroSignals)
        } else if self.metrics.trade_count < min_trades {
            Some(Rejection::BelowMinTrades)
        } else {
            None
        }
    }
}

/// Scoring knobs shared by every pair of a run.
#[derive(Debug, Clone, Copy)]
pub struct ScoringParams {
    pub bias: Bias,
    /// Already normalized for the run's mode.
    pub weights: ScoreWeights,
    /// `Some(window)` in entry mode.
    pub proximity_window: Option<usize>,
    pub trade_count_target: usize,
}

/// Score the signals at `indices` (ascending bar indices into `bars`).
pub fn score_bars(
    bars: &[Bar],
    signals: &[bool],
    indices: &[usize],
    params: &ScoringParams,
) -> PairScore {
    let flagged: Vec<usize> = indices
        .iter()
        .copied()
        .filter(|&i| signals.get(i).copied().unwrap_or(false))
        .collect();

    let returns = signal_returns(bars, &flagged, params.bias);
    let metrics = SignalMetrics::compute(&returns);
    let proximity = params
        .proximity_window
        .filter(|_| !flagged.is_empty())
        .map(|window| proximity(bars, &flagged, window, params.bias));
    let score = composite_score(&metrics, proximity, &params.weights, params.trade_count_target);

    PairScore {
        signal_count: flagged.len(),
        metrics,
        proximity,
        score,
    }
}

/// Signed next-bar return of each flagged bar that has a next bar.
pub fn signal_returns(bars: &[Bar], flagged: &[usize], bias: Bias) -> Vec<f64> {
    flagged
        .iter()
        .filter(|&&i| i + 1 < bars.len() && bars[i].close > 0.0)
        .map(|&i| bias.sign() * (bars[i + 1].close - bars[i].close) / bars[i].close)
        .collect()
}

/// Mean closeness of flagged bars to the local extreme within `window` bars
/// either side: 1.0 on the extreme itself, falling linearly to 0.0 at
/// `window` bars away. Bullish signals look for the lowest low, bearish ones
/// for the highest high.
pub fn proximity(bars: &[Bar], flagged: &[usize], window: usize, bias: Bias) -> f64 {
    if flagged.is_empty() || window == 0 {
        return 0.0;
    }
    let total: f64 = flagged
        .iter()
        .filter(|&&i| i < bars.len())
        .map(|&i| {
            let lo = i.saturating_sub(window);
            let hi = (i + window).min(bars.len() - 1);
            let mut best = i;
            for j in lo..=hi {
                let better = match bias {
                    Bias::Bullish => bars[j].low < bars[best].low,
                    Bias::Bearish => bars[j].high > bars[best].high,
                };
                let tie = match bias {
                    Bias::Bullish => bars[j].low == bars[best].low,
                    Bias::Bearish => bars[j].high == bars[best].high,
                };
                if better || (tie && j.abs_diff(i) < best.abs_diff(i)) {
                    best = j;
                }
            }
            1.0 - best.abs_diff(i) as f64 / window as f64
        })
        .sum();
    total / flagged.len() as f64
}

/// Weighted 0-100 score.
///
/// Components are mapped to `[0, 1]` first: win rate as is, profit factor as
/// `pf / (1 + pf)`, the Sharpe-like ratio clamped to `[-1, 1]` and shifted,
/// trade count relative to `trade_count_target`, proximity as is.
pub fn composite_score(
    metrics: &SignalMetrics,
    proximity: Option<f64>,
    weights: &ScoreWeights,
    trade_count_target: usize,
) -> u8 {
    let pf = metrics.profit_factor.max(0.0);
    let components = [
        (weights.win_rate, metrics.win_rate),
        (weights.profit_factor, pf / (1.0 + pf)),
        (weights.sharpe, (metrics.sharpe.clamp(-1.0, 1.0) + 1.0) / 2.0),
        (
            weights.trade_count,
            (metrics.trade_count as f64 / trade_count_target.max(1) as f64).min(1.0),
        ),
        (weights.proximity, proximity.unwrap_or(0.0)),
    ];
    let raw: f64 = components
        .iter()
        .map(|(w, v)| w * v.clamp(0.0, 1.0))
        .sum();
    if !raw.is_finite() {
        return 0;
    }
    (raw * 100.0).round().clamp(0.0, 100.0) as u8
}
