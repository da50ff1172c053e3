//! ADX: Average Directional Index (Wilder).
//!
//! Steps:
//! 1. Compute +DM and -DM from consecutive bars
//! 2. Smooth +DM, -DM, and TR using Wilder smoothing (alpha = 1/period)
//! 3. +DI = 100 * smoothed(+DM) / smoothed(TR)
//! 4. -DI = 100 * smoothed(-DM) / smoothed(TR)
//! 5. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 6. ADX = Wilder-smoothed DX
//!
//! Outputs: `adx` (primary), `plus_di`, `minus_di`.
//! Warm-up: DI lines `period`, ADX `2 * period - 1`.

use std::collections::BTreeMap;

use crate::domain::Bar;
use crate::indicators::atr::{true_range, wilder_smooth};
use crate::indicators::{Indicator, IndicatorOutputs};

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ADX period must be >= 1");
        Self { period }
    }
}

impl Indicator for Adx {
    /// Warm-up of the slowest output (`adx`).
    fn warmup(&self) -> usize {
        self.period.saturating_mul(2).saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs {
        let n = bars.len();
        let mut plus_dm = vec![f64::NAN; n];
        let mut minus_dm = vec![f64::NAN; n];

        for i in 1..n {
            let high_diff = bars[i].high - bars[i - 1].high;
            let low_diff = bars[i - 1].low - bars[i].low;

            plus_dm[i] = if high_diff > low_diff && high_diff > 0.0 {
                high_diff
            } else {
                0.0
            };
            minus_dm[i] = if low_diff > high_diff && low_diff > 0.0 {
                low_diff
            } else {
                0.0
            };
        }

        let smooth_tr = wilder_smooth(&true_range(bars), self.period);
        let smooth_plus_dm = wilder_smooth(&plus_dm, self.period);
        let smooth_minus_dm = wilder_smooth(&minus_dm, self.period);

        let mut plus_di = vec![f64::NAN; n];
        let mut minus_di = vec![f64::NAN; n];
        let mut dx = vec![f64::NAN; n];
        for i in 0..n {
            if smooth_tr[i].is_nan() || smooth_plus_dm[i].is_nan() || smooth_minus_dm[i].is_nan() {
                continue;
            }

            // Zero range: no directional movement either
            let (pdi, mdi) = if smooth_tr[i] == 0.0 {
                (0.0, 0.0)
            } else {
                (
                    100.0 * smooth_plus_dm[i] / smooth_tr[i],
                    100.0 * smooth_minus_dm[i] / smooth_tr[i],
                )
            };
            plus_di[i] = pdi;
            minus_di[i] = mdi;

            let di_sum = pdi + mdi;
            dx[i] = if di_sum == 0.0 {
                0.0
            } else {
                100.0 * (pdi - mdi).abs() / di_sum
            };
        }

        let mut series = BTreeMap::new();
        series.insert("adx".to_string(), wilder_smooth(&dx, self.period));
        series.insert("plus_di".to_string(), plus_di);
        series.insert("minus_di".to_string(), minus_di);
        IndicatorOutputs::new(self.warmup(), "adx", series)
            .with_field_warmup("plus_di", self.period)
            .with_field_warmup("minus_di", self.period)
    }
}
