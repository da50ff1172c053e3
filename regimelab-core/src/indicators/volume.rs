//! Volume indicators.
//!
//! - OBV: cumulative volume signed by close direction, starting at 0.
//!   Unchanged closes leave it flat. Warm-up: 0.
//! - VolumeSma: rolling mean of volume. Warm-up: period - 1.

use crate::domain::Bar;
use crate::indicators::sma::sma_of_series;
use crate::indicators::{Indicator, IndicatorOutputs};

#[derive(Debug, Clone, Copy, Default)]
pub struct Obv;

impl Indicator for Obv {
    fn warmup(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs {
        let mut values = Vec::with_capacity(bars.len());
        let mut obv = 0.0;
        for (i, bar) in bars.iter().enumerate() {
            if i > 0 {
                let prev_close = bars[i - 1].close;
                if bar.close > prev_close {
                    obv += bar.volume;
                } else if bar.close < prev_close {
                    obv -= bar.volume;
                }
            }
            values.push(obv);
        }
        IndicatorOutputs::single(0, values)
    }
}

#[derive(Debug, Clone)]
pub struct VolumeSma {
    period: usize,
}

impl VolumeSma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "VolumeSma period must be >= 1");
        Self { period }
    }
}

impl Indicator for VolumeSma {
    fn warmup(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs {
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        IndicatorOutputs::single(self.warmup(), sma_of_series(&volumes, self.period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn obv_accumulates_signed_volume() {
        let mut bars = make_bars(&[10.0, 11.0, 11.0, 9.0, 12.0]);
        for (bar, vol) in bars.iter_mut().zip([500.0, 100.0, 200.0, 300.0, 50.0]) {
            bar.volume = vol;
        }
        let out = Obv.compute(&bars);
        assert_eq!(out.primary(), &[0.0, 100.0, 100.0, -200.0, -150.0]);
    }

    #[test]
    fn volume_sma_basic() {
        let mut bars = make_bars(&[1.0, 1.0, 1.0, 1.0]);
        for (bar, vol) in bars.iter_mut().zip([100.0, 200.0, 300.0, 400.0]) {
            bar.volume = vol;
        }
        let out = VolumeSma::new(2).compute(&bars);
        let v = out.primary();
        assert!(v[0].is_nan());
        assert_approx(v[1], 150.0, DEFAULT_EPSILON);
        assert_approx(v[3], 350.0, DEFAULT_EPSILON);
    }
}
