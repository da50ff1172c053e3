//! Stochastic oscillator.
//!
//! %K[t] = 100 * (close[t] - LL) / (HH - LL) over the last `k_period` bars,
//! 50 when the window has no range. %D = SMA(%K, d_period).
//!
//! Outputs: `k` (primary), `d`.
//! Warm-up: %K k_period - 1, %D k_period + d_period - 2.

use std::collections::BTreeMap;

use crate::domain::Bar;
use crate::indicators::sma::sma_of_series;
use crate::indicators::{Indicator, IndicatorOutputs};

#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    d_period: usize,
}

impl Stochastic {
    pub fn new(k_period: usize, d_period: usize) -> Self {
        assert!(k_period >= 1, "Stochastic k_period must be >= 1");
        assert!(d_period >= 1, "Stochastic d_period must be >= 1");
        Self { k_period, d_period }
    }
}

impl Indicator for Stochastic {
    fn warmup(&self) -> usize {
        self.k_period.saturating_add(self.d_period).saturating_sub(2)
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs {
        let n = bars.len();
        let mut k = vec![f64::NAN; n];

        if n >= self.k_period {
            for i in (self.k_period - 1)..n {
                let window = &bars[i + 1 - self.k_period..=i];
                let hh = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
                let ll = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
                k[i] = if hh == ll {
                    50.0
                } else {
                    100.0 * (bars[i].close - ll) / (hh - ll)
                };
            }
        }

        let d = sma_of_series(&k, self.d_period);

        let mut series = BTreeMap::new();
        series.insert("k".to_string(), k);
        series.insert("d".to_string(), d);
        IndicatorOutputs::new(self.warmup(), "k", series)
            .with_field_warmup("k", self.k_period - 1)
    }
}
