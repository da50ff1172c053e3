//! Signal-quality metrics: pure functions over per-signal returns.
//!
//! A signal return is the signed next-bar return of one signal bar, positive
//! when the market moved the way the signal anticipated. Every metric here is
//! a pure function of that list.

use serde::{Deserialize, Serialize};

/// Profit factor reported when there are winners and no losers.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Aggregate metrics of one signal-return list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalMetrics {
    pub trade_count: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    pub mean_return: f64,
    /// Worst peak-to-trough of the compounded returns, as a negative fraction.
    pub max_drawdown: f64,
}

impl SignalMetrics {
    pub fn compute(returns: &[f64]) -> Self {
        Self {
            trade_count: returns.len(),
            win_rate: win_rate(returns),
            profit_factor: profit_factor(returns),
            sharpe: sharpe_like(returns),
            mean_return: mean_f64(returns),
            max_drawdown: max_drawdown(&equity_curve(returns)),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Fraction of strictly positive returns.
pub fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let winners = returns.iter().filter(|&&r| r > 0.0).count();
    winners as f64 / returns.len() as f64
}

/// Profit factor: sum of winning returns / sum of |losing returns|.
///
/// Capped at [`PROFIT_FACTOR_CAP`] for edge cases (all winners, zero losses).
pub fn profit_factor(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = returns.iter().filter(|&&r| r > 0.0).sum();
    let gross_loss: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r.abs()).sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

/// Sharpe-like ratio: mean / std of the returns, not annualized.
///
/// Returns 0.0 for fewer than 2 returns or zero variance.
pub fn sharpe_like(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(returns) / std
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let mut peak = equity_curve[0];
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Compound `returns` onto a unit starting balance. The curve has
/// `returns.len() + 1` points.
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    let mut curve = Vec::with_capacity(returns.len() + 1);
    let mut equity = 1.0;
    curve.push(equity);
    for r in returns {
        equity *= 1.0 + r;
        curve.push(equity);
    }
    curve
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator), 0.0 below two values.
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}
