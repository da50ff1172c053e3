//! Per-kind signal rules.
//!
//! Each indicator kind has a bullish and a bearish rule. Long entries and
//! short exits fire on the bullish rule, short entries and long exits on the
//! bearish one. ADX is the exception: both exits fire when trend strength
//! fades below the level.
//!
//! Signals must NEVER read past the bar they flag. Every rule below looks at
//! bar `i` and at most bar `i - 1`.

use serde::{Deserialize, Serialize};

use regimelab_core::indicators::sma::sma_of_series;
use regimelab_core::{Bar, IndicatorKind, IndicatorOutputs};

use crate::config::{SignalThresholds, Side, TestMode};

/// Direction of the move a signal anticipates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
}

impl Bias {
    pub fn of(mode: TestMode, side: Side) -> Bias {
        match (mode, side) {
            (TestMode::Entry, Side::Long) | (TestMode::Exit, Side::Short) => Bias::Bullish,
            (TestMode::Entry, Side::Short) | (TestMode::Exit, Side::Long) => Bias::Bearish,
        }
    }

    /// +1 when rising prices vindicate the signal, -1 when falling ones do.
    pub fn sign(self) -> f64 {
        match self {
            Bias::Bullish => 1.0,
            Bias::Bearish => -1.0,
        }
    }
}

/// Flag every bar where the rule for `kind` fires.
///
/// `outputs` must be the outputs of `kind` computed over `bars`. Bars inside
/// any required warm-up never fire.
pub fn generate_signals(
    kind: &IndicatorKind,
    outputs: &IndicatorOutputs,
    bars: &[Bar],
    mode: TestMode,
    side: Side,
    thresholds: &SignalThresholds,
) -> Vec<bool> {
    let bias = Bias::of(mode, side);
    let n = bars.len().min(outputs.len());
    let primary = outputs.primary_name();
    let at = |field: &str, i: usize| outputs.value(field, i);

    match kind {
        IndicatorKind::Rsi { .. } => (0..n)
            .map(|i| band(at(primary, i), thresholds.rsi_oversold, thresholds.rsi_overbought, bias))
            .collect(),

        IndicatorKind::Stochastic { .. } => (0..n)
            .map(|i| {
                band(
                    at("k", i),
                    thresholds.stochastic_oversold,
                    thresholds.stochastic_overbought,
                    bias,
                )
            })
            .collect(),

        IndicatorKind::Sma { .. } | IndicatorKind::Ema { .. } => {
            let pair = |i: usize| at(primary, i).map(|ma| (bars[i].close, ma));
            (0..n)
                .map(|i| i > 0 && cross(pair(i - 1), pair(i), bias))
                .collect()
        }

        IndicatorKind::Macd { .. } => zero_cross(|i| at("histogram", i), n, bias),

        IndicatorKind::Roc { .. } | IndicatorKind::Custom { .. } => {
            zero_cross(|i| at(primary, i), n, bias)
        }

        IndicatorKind::Bollinger { .. } => (0..n)
            .map(|i| {
                let close = bars[i].close;
                match bias {
                    Bias::Bullish => at("lower", i).is_some_and(|lower| close < lower),
                    Bias::Bearish => at("upper", i).is_some_and(|upper| close > upper),
                }
            })
            .collect(),

        IndicatorKind::Adx { .. } => (0..n)
            .map(|i| adx_rule(outputs, i, mode, bias, thresholds.adx_level))
            .collect(),

        IndicatorKind::Atr { .. } => (0..n)
            .map(|i| {
                if i == 0 {
                    return false;
                }
                let Some(prev_atr) = at(primary, i - 1) else {
                    return false;
                };
                let move_up = bars[i].close - bars[i - 1].close;
                let threshold = thresholds.atr_multiplier * prev_atr;
                match bias {
                    Bias::Bullish => move_up > threshold,
                    Bias::Bearish => -move_up > threshold,
                }
            })
            .collect(),

        IndicatorKind::Obv => {
            let obv = outputs.primary();
            let baseline = sma_of_series(obv, thresholds.obv_sma_period);
            let pair = |i: usize| {
                let (o, b) = (obv[i], baseline[i]);
                (o.is_finite() && b.is_finite()).then_some((o, b))
            };
            (0..n)
                .map(|i| i > 0 && cross(pair(i - 1), pair(i), bias))
                .collect()
        }

        IndicatorKind::VolumeSma { .. } => (0..n)
            .map(|i| {
                let bar = &bars[i];
                let spike = at(primary, i)
                    .is_some_and(|avg| bar.volume > thresholds.volume_multiplier * avg);
                spike
                    && match bias {
                        Bias::Bullish => bar.close > bar.open,
                        Bias::Bearish => bar.close < bar.open,
                    }
            })
            .collect(),
    }
}

/// Oscillator band: oversold is bullish, overbought bearish.
fn band(value: Option<f64>, oversold: f64, overbought: f64, bias: Bias) -> bool {
    value.is_some_and(|v| match bias {
        Bias::Bullish => v < oversold,
        Bias::Bearish => v > overbought,
    })
}

/// `a` crossing `b` in the direction of `bias` between two bars.
fn cross(prev: Option<(f64, f64)>, cur: Option<(f64, f64)>, bias: Bias) -> bool {
    let (Some((a0, b0)), Some((a1, b1))) = (prev, cur) else {
        return false;
    };
    match bias {
        Bias::Bullish => a0 <= b0 && a1 > b1,
        Bias::Bearish => a0 >= b0 && a1 < b1,
    }
}

fn zero_cross(value: impl Fn(usize) -> Option<f64>, n: usize, bias: Bias) -> Vec<bool> {
    (0..n)
        .map(|i| {
            i > 0
                && cross(
                    value(i - 1).map(|v| (v, 0.0)),
                    value(i).map(|v| (v, 0.0)),
                    bias,
                )
        })
        .collect()
}

fn adx_rule(outputs: &IndicatorOutputs, i: usize, mode: TestMode, bias: Bias, level: f64) -> bool {
    if i == 0 {
        return false;
    }
    let (Some(prev), Some(cur)) = (outputs.value("adx", i - 1), outputs.value("adx", i)) else {
        return false;
    };
    match mode {
        TestMode::Exit => prev >= level && cur < level,
        TestMode::Entry => {
            if !(prev <= level && cur > level) {
                return false;
            }
            let (Some(plus), Some(minus)) =
                (outputs.value("plus_di", i), outputs.value("minus_di", i))
            else {
                return false;
            };
            match bias {
                Bias::Bullish => plus > minus,
                Bias::Bearish => minus > plus,
            }
        }
    }
}
