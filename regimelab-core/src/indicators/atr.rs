//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (alpha = 1/period).
//! TR[0] has no previous close and is excluded from the seed.
//! Warm-up: period.

use crate::domain::Bar;
use crate::indicators::{Indicator, IndicatorOutputs};

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self { period }
    }
}

/// True Range series. TR[0] is NaN (no previous close).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];
    for i in 1..bars.len() {
        let h = bars[i].high;
        let l = bars[i].low;
        let pc = bars[i - 1].close;
        tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
    }
    tr
}

/// Apply Wilder smoothing to a series. Alpha = 1/period.
///
/// Seed: mean of the first `period` consecutive non-NaN values, placed at the
/// last index of that run. A NaN after the seed taints the rest.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    // End (exclusive) of the first run of `period` valid values.
    let mut run = 0usize;
    let mut seed_end = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            run = 0;
            continue;
        }
        run += 1;
        if run == period {
            seed_end = Some(i + 1);
            break;
        }
    }
    let Some(seed_end) = seed_end else {
        return result;
    };

    let seed: f64 = values[seed_end - period..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        let smoothed = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = smoothed;
        prev = smoothed;
    }

    result
}

impl Indicator for Atr {
    fn warmup(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs {
        let tr = true_range(bars);
        IndicatorOutputs::single(self.warmup(), wilder_smooth(&tr, self.period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_ohlc_bars, DEFAULT_EPSILON, VALUE};

    #[test]
    fn true_range_basic() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0), // TR = max(8, |108-102|, |100-102|) = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = max(9, |107-106|, |98-106|) = 9
        ]);
        let tr = true_range(&bars);
        assert!(tr[0].is_nan());
        assert_approx(tr[1], 8.0, DEFAULT_EPSILON);
        assert_approx(tr[2], 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let bars = make_ohlc_bars(&[
            (98.0, 102.0, 97.0, 100.0),
            (110.0, 115.0, 108.0, 112.0), // TR = max(7, |115-100|, |108-100|) = 15
        ]);
        let tr = true_range(&bars);
        assert_approx(tr[1], 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_period_3() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0), // TR = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = 9
            (99.0, 103.0, 97.0, 101.0),   // TR = 6
            (101.0, 106.0, 100.0, 105.0), // TR = 6
        ]);
        let out = Atr::new(3).compute(&bars);
        let result = out.get(VALUE).unwrap();

        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert!(result[2].is_nan());
        // Seed: ATR[3] = mean(8, 9, 6) = 23/3
        // ATR[4] = (1/3)*6 + (2/3)*(23/3) = 64/9
        assert_approx(result[3], 23.0 / 3.0, DEFAULT_EPSILON);
        assert_approx(result[4], 64.0 / 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn wilder_smooth_restarts_seed_after_nan_gap() {
        let result = wilder_smooth(&[1.0, f64::NAN, 2.0, 4.0, 6.0], 2);
        assert!(result[2].is_nan());
        assert_approx(result[3], 3.0, DEFAULT_EPSILON);
        assert_approx(result[4], 4.5, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_warmup() {
        assert_eq!(Atr::new(14).warmup(), 14);
    }
}
