//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1], alpha = 2/(period+1)
//! Seed: EMA[period-1] = SMA of first `period` close values.
//! Warm-up: period - 1.

use crate::domain::Bar;
use crate::indicators::{Indicator, IndicatorOutputs};

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self { period }
    }
}

impl Indicator for Ema {
    fn warmup(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        IndicatorOutputs::single(self.warmup(), ema_of_series(&closes, self.period))
    }
}

/// Compute EMA values from a pre-extracted f64 slice.
///
/// Leading NaNs are skipped: the seed is the SMA of the first `period` values
/// after the first non-NaN one. This lets composed indicators (MACD signal
/// line) smooth a series that carries its own warm-up prefix. A NaN inside the
/// seed window or after the seed taints everything that follows.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    let start = match values.iter().position(|v| !v.is_nan()) {
        Some(s) => s,
        None => return result,
    };

    if period == 0 || n - start < period {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed_end = start + period;

    let mut sum = 0.0;
    for &v in &values[start..seed_end] {
        if v.is_nan() {
            return result;
        }
        sum += v;
    }
    let seed = sum / period as f64;
    result[seed_end - 1] = seed;

    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        let ema = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = ema;
        prev = ema;
    }

    result
}
