//! Rate of Change (ROC).
//!
//! Percentage price change over N bars.
//! ROC[t] = (close[t] - close[t-period]) / close[t-period] * 100
//! Warm-up: period. A zero base close yields NaN.

use crate::domain::Bar;
use crate::indicators::{Indicator, IndicatorOutputs};

#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ROC period must be >= 1");
        Self { period }
    }
}

impl Indicator for Roc {
    fn warmup(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];

        for i in self.period..n {
            let prev = bars[i - self.period].close;
            if prev != 0.0 {
                result[i] = (bars[i].close - prev) / prev * 100.0;
            }
        }

        IndicatorOutputs::single(self.warmup(), result)
    }
}
