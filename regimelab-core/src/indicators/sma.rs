//! Simple Moving Average (SMA).
//!
//! Rolling mean of close prices over a lookback window.
//! Warm-up: period - 1 (first valid value at index period-1).

use crate::domain::Bar;
use crate::indicators::{Indicator, IndicatorOutputs};

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self { period }
    }
}

impl Indicator for Sma {
    fn warmup(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        IndicatorOutputs::single(self.warmup(), sma_of_series(&closes, self.period))
    }
}

/// Rolling mean of an arbitrary series.
///
/// Any window containing a NaN yields NaN, so a NaN warm-up prefix in the
/// input simply extends the warm-up of the output.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            nan_count += 1;
        } else {
            sum += v;
        }

        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }

        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON, VALUE};

    fn values(sma: &Sma, closes: &[f64]) -> Vec<f64> {
        sma.compute(&make_bars(closes)).get(VALUE).unwrap().to_vec()
    }

    #[test]
    fn sma_5_basic() {
        let result = values(&Sma::new(5), &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);

        assert_eq!(result.len(), 7);
        for (i, v) in result.iter().enumerate().take(4) {
            assert!(v.is_nan(), "expected NaN at index {i}");
        }
        // SMA[4] = mean(10,11,12,13,14) = 12.0
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[5], 13.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_1_is_close() {
        let result = values(&Sma::new(1), &[100.0, 200.0, 300.0]);
        assert_approx(result[0], 100.0, DEFAULT_EPSILON);
        assert_approx(result[1], 200.0, DEFAULT_EPSILON);
        assert_approx(result[2], 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_of_series_nan_window() {
        let result = sma_of_series(&[10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0], 3);
        // Windows touching index 2 are NaN
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
        assert_approx(result[5], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_of_series_skips_leading_nan() {
        let result = sma_of_series(&[f64::NAN, f64::NAN, 1.0, 2.0, 3.0], 2);
        assert!(result[2].is_nan());
        assert_approx(result[3], 1.5, DEFAULT_EPSILON);
        assert_approx(result[4], 2.5, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_warmup() {
        assert_eq!(Sma::new(20).warmup(), 19);
        assert_eq!(Sma::new(1).warmup(), 0);
    }

    #[test]
    fn sma_too_few_bars() {
        let result = values(&Sma::new(5), &[10.0, 11.0]);
        assert!(result.iter().all(|v| v.is_nan()));
    }
}
