//! Bollinger Bands: moving average +/- standard deviation multiplier.
//!
//! - Middle: SMA(close, period) (primary output)
//! - Upper: middle + std_dev * stddev(close, period)
//! - Lower: middle - std_dev * stddev(close, period)
//!
//! Uses population stddev (divide by N).
//! Warm-up: period - 1.

use std::collections::BTreeMap;

use crate::domain::Bar;
use crate::indicators::{Indicator, IndicatorOutputs};

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    std_dev: f64,
}

impl Bollinger {
    pub fn new(period: usize, std_dev: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self { period, std_dev }
    }
}

impl Indicator for Bollinger {
    fn warmup(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs {
        let n = bars.len();
        let mut middle = vec![f64::NAN; n];
        let mut upper = vec![f64::NAN; n];
        let mut lower = vec![f64::NAN; n];

        if n >= self.period {
            for i in (self.period - 1)..n {
                let window = &bars[i + 1 - self.period..=i];
                let mean = window.iter().map(|b| b.close).sum::<f64>() / self.period as f64;
                let variance = window
                    .iter()
                    .map(|b| {
                        let diff = b.close - mean;
                        diff * diff
                    })
                    .sum::<f64>()
                    / self.period as f64;
                let width = self.std_dev * variance.sqrt();

                middle[i] = mean;
                upper[i] = mean + width;
                lower[i] = mean - width;
            }
        }

        let mut series = BTreeMap::new();
        series.insert("middle".to_string(), middle);
        series.insert("upper".to_string(), upper);
        series.insert("lower".to_string(), lower);
        IndicatorOutputs::new(self.warmup(), "middle", series)
    }
}
