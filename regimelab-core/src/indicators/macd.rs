//! MACD: Moving Average Convergence/Divergence.
//!
//! - macd = EMA(close, fast) - EMA(close, slow) (primary output)
//! - signal = EMA(macd, signal)
//! - histogram = macd - signal
//!
//! The signal EMA is seeded from the first `signal` defined MACD values.
//! Warm-up: slow + signal - 2 (the macd line alone is defined from slow - 1).

use std::collections::BTreeMap;

use crate::domain::Bar;
use crate::indicators::ema::ema_of_series;
use crate::indicators::{Indicator, IndicatorOutputs};

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be below slow period");
        Self { fast, slow, signal }
    }
}

impl Indicator for Macd {
    fn warmup(&self) -> usize {
        self.slow.saturating_add(self.signal).saturating_sub(2)
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);

        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_of_series(&line, self.signal);
        let histogram: Vec<f64> = line.iter().zip(&signal).map(|(m, s)| m - s).collect();

        let mut series = BTreeMap::new();
        series.insert("macd".to_string(), line);
        series.insert("signal".to_string(), signal);
        series.insert("histogram".to_string(), histogram);
        IndicatorOutputs::new(self.warmup(), "macd", series)
            .with_field_warmup("macd", self.slow - 1)
    }
}
