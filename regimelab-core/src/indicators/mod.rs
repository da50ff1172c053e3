//! Indicator engine.
//!
//! Every indicator is a pure, causal function of a bar slice: the value at
//! bar `i` never reads bar `i + 1` or later. Outputs are full-length series
//! with `f64::NAN` as the "unavailable" sentinel for the warm-up prefix.
//!
//! Indicator families form a closed enumeration ([`IndicatorKind`]), each with
//! its own fixed parameter record, plus one `Custom` variant carrying a generic
//! key to number map that is resolved through an [`IndicatorRegistry`].

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod cache;
pub mod ema;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod volume;

pub use adx::Adx;
pub use atr::Atr;
pub use bollinger::Bollinger;
pub use cache::{CacheStats, IndicatorCache};
pub use ema::Ema;
pub use macd::Macd;
pub use roc::Roc;
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::Stochastic;
pub use volume::{Obv, VolumeSma};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{Bar, BarSeries, IndicatorId};

/// Name of the output exposed by single-series indicators.
pub const VALUE: &str = "value";

const PERIOD_BOUNDS: &str = "must be between 1 and 100000";

/// Largest accepted period or lookback of a built-in indicator.
pub const MAX_PERIOD: usize = 100_000;

/// Errors raised while building or computing an indicator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("invalid parameter `{param}` for {kind}: {reason}")]
    InvalidParameter {
        kind: String,
        param: String,
        reason: String,
    },
    #[error("unknown parameter `{param}` for {kind}")]
    UnknownParameter { kind: String, param: String },
    #[error("no custom indicator registered under `{0}`")]
    UnknownCustom(String),
    #[error("unknown indicator type `{0}`")]
    UnknownKind(String),
}

/// Broad family of an indicator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorFamily {
    MovingAverage,
    Oscillator,
    Volatility,
    TrendStrength,
    Volume,
    Custom,
}

/// Indicator type tag plus its parameter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma {
        period: usize,
    },
    Ema {
        period: usize,
    },
    Rsi {
        period: usize,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Stochastic {
        k_period: usize,
        d_period: usize,
    },
    Roc {
        period: usize,
    },
    Atr {
        period: usize,
    },
    Bollinger {
        period: usize,
        std_dev: f64,
    },
    Adx {
        period: usize,
    },
    Obv,
    VolumeSma {
        period: usize,
    },
    Custom {
        name: String,
        #[serde(default)]
        params: BTreeMap<String, f64>,
    },
}

impl IndicatorKind {
    /// Kind with its conventional default parameters, looked up by type tag.
    /// Unknown tags become `Custom` kinds with no parameters.
    pub fn default_for(type_tag: &str) -> IndicatorKind {
        match type_tag {
            "sma" => IndicatorKind::Sma { period: 20 },
            "ema" => IndicatorKind::Ema { period: 20 },
            "rsi" => IndicatorKind::Rsi { period: 14 },
            "macd" => IndicatorKind::Macd {
                fast: 12,
                slow: 26,
                signal: 9,
            },
            "stochastic" => IndicatorKind::Stochastic {
                k_period: 14,
                d_period: 3,
            },
            "roc" => IndicatorKind::Roc { period: 10 },
            "atr" => IndicatorKind::Atr { period: 14 },
            "bollinger" => IndicatorKind::Bollinger {
                period: 20,
                std_dev: 2.0,
            },
            "adx" => IndicatorKind::Adx { period: 14 },
            "obv" => IndicatorKind::Obv,
            "volume_sma" => IndicatorKind::VolumeSma { period: 20 },
            other => IndicatorKind::Custom {
                name: other.to_string(),
                params: BTreeMap::new(),
            },
        }
    }

    /// Build a kind from a type tag and a full or partial parameter map.
    /// Missing parameters keep their defaults.
    pub fn from_params(
        type_tag: &str,
        params: &BTreeMap<String, f64>,
    ) -> Result<IndicatorKind, IndicatorError> {
        let mut kind = IndicatorKind::default_for(type_tag);
        for (key, &value) in params {
            kind = kind.with_param(key, value)?;
        }
        Ok(kind)
    }

    /// Type tag as written in configuration documents.
    pub fn type_tag(&self) -> &str {
        match self {
            IndicatorKind::Sma { .. } => "sma",
            IndicatorKind::Ema { .. } => "ema",
            IndicatorKind::Rsi { .. } => "rsi",
            IndicatorKind::Macd { .. } => "macd",
            IndicatorKind::Stochastic { .. } => "stochastic",
            IndicatorKind::Roc { .. } => "roc",
            IndicatorKind::Atr { .. } => "atr",
            IndicatorKind::Bollinger { .. } => "bollinger",
            IndicatorKind::Adx { .. } => "adx",
            IndicatorKind::Obv => "obv",
            IndicatorKind::VolumeSma { .. } => "volume_sma",
            IndicatorKind::Custom { name, .. } => name,
        }
    }

    pub fn family(&self) -> IndicatorFamily {
        match self {
            IndicatorKind::Sma { .. } | IndicatorKind::Ema { .. } => IndicatorFamily::MovingAverage,
            IndicatorKind::Rsi { .. }
            | IndicatorKind::Macd { .. }
            | IndicatorKind::Stochastic { .. }
            | IndicatorKind::Roc { .. } => IndicatorFamily::Oscillator,
            IndicatorKind::Atr { .. } | IndicatorKind::Bollinger { .. } => {
                IndicatorFamily::Volatility
            }
            IndicatorKind::Adx { .. } => IndicatorFamily::TrendStrength,
            IndicatorKind::Obv | IndicatorKind::VolumeSma { .. } => IndicatorFamily::Volume,
            IndicatorKind::Custom { .. } => IndicatorFamily::Custom,
        }
    }

    /// Named outputs, primary output first.
    pub fn outputs(&self) -> &'static [&'static str] {
        match self {
            IndicatorKind::Bollinger { .. } => &["middle", "lower", "upper"],
            IndicatorKind::Macd { .. } => &["macd", "signal", "histogram"],
            IndicatorKind::Stochastic { .. } => &["k", "d"],
            IndicatorKind::Adx { .. } => &["adx", "plus_di", "minus_di"],
            _ => &[VALUE],
        }
    }

    /// Output used when a reference names no field.
    pub fn primary_output(&self) -> &'static str {
        self.outputs()[0]
    }

    pub fn has_output(&self, field: &str) -> bool {
        self.outputs().contains(&field)
    }

    /// Parameter record as a flat name to number map.
    pub fn params(&self) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        match self {
            IndicatorKind::Sma { period }
            | IndicatorKind::Ema { period }
            | IndicatorKind::Rsi { period }
            | IndicatorKind::Roc { period }
            | IndicatorKind::Atr { period }
            | IndicatorKind::Adx { period }
            | IndicatorKind::VolumeSma { period } => {
                m.insert("period".into(), *period as f64);
            }
            IndicatorKind::Macd { fast, slow, signal } => {
                m.insert("fast".into(), *fast as f64);
                m.insert("slow".into(), *slow as f64);
                m.insert("signal".into(), *signal as f64);
            }
            IndicatorKind::Stochastic { k_period, d_period } => {
                m.insert("k_period".into(), *k_period as f64);
                m.insert("d_period".into(), *d_period as f64);
            }
            IndicatorKind::Bollinger { period, std_dev } => {
                m.insert("period".into(), *period as f64);
                m.insert("std_dev".into(), *std_dev);
            }
            IndicatorKind::Obv => {}
            IndicatorKind::Custom { params, .. } => {
                m.extend(params.iter().map(|(k, v)| (k.clone(), *v)));
            }
        }
        m
    }

    /// True for parameters stored as whole numbers (periods).
    pub fn is_integer_param(&self, key: &str) -> bool {
        match self {
            IndicatorKind::Bollinger { .. } => key != "std_dev",
            IndicatorKind::Custom { .. } => false,
            _ => true,
        }
    }

    /// Copy of this kind with one named parameter replaced.
    ///
    /// Integer parameters reject fractional or negative values. Custom kinds
    /// accept any finite key.
    pub fn with_param(&self, key: &str, value: f64) -> Result<IndicatorKind, IndicatorError> {
        let invalid = |reason: &str| IndicatorError::InvalidParameter {
            kind: self.type_tag().to_string(),
            param: key.to_string(),
            reason: reason.to_string(),
        };
        if !value.is_finite() {
            return Err(invalid("value must be finite"));
        }
        let as_int = || -> Result<usize, IndicatorError> {
            if value < 0.0 || value.fract() != 0.0 {
                Err(invalid("expected a non-negative integer"))
            } else {
                Ok(value as usize)
            }
        };
        let unknown = || IndicatorError::UnknownParameter {
            kind: self.type_tag().to_string(),
            param: key.to_string(),
        };

        let mut next = self.clone();
        match (&mut next, key) {
            (IndicatorKind::Sma { period }, "period")
            | (IndicatorKind::Ema { period }, "period")
            | (IndicatorKind::Rsi { period }, "period")
            | (IndicatorKind::Roc { period }, "period")
            | (IndicatorKind::Atr { period }, "period")
            | (IndicatorKind::Adx { period }, "period")
            | (IndicatorKind::VolumeSma { period }, "period")
            | (IndicatorKind::Bollinger { period, .. }, "period") => *period = as_int()?,
            (IndicatorKind::Bollinger { std_dev, .. }, "std_dev") => *std_dev = value,
            (IndicatorKind::Macd { fast, .. }, "fast") => *fast = as_int()?,
            (IndicatorKind::Macd { slow, .. }, "slow") => *slow = as_int()?,
            (IndicatorKind::Macd { signal, .. }, "signal") => *signal = as_int()?,
            (IndicatorKind::Stochastic { k_period, .. }, "k_period") => *k_period = as_int()?,
            (IndicatorKind::Stochastic { d_period, .. }, "d_period") => *d_period = as_int()?,
            (IndicatorKind::Custom { params, .. }, _) => {
                params.insert(key.to_string(), value);
            }
            _ => return Err(unknown()),
        }
        Ok(next)
    }

    /// Range checks on the parameter record.
    pub fn validate(&self) -> Result<(), IndicatorError> {
        let invalid = |param: &str, reason: &str| IndicatorError::InvalidParameter {
            kind: self.type_tag().to_string(),
            param: param.to_string(),
            reason: reason.to_string(),
        };
        let in_bounds = |p: usize| (1..=MAX_PERIOD).contains(&p);
        match self {
            IndicatorKind::Sma { period }
            | IndicatorKind::Ema { period }
            | IndicatorKind::Rsi { period }
            | IndicatorKind::Roc { period }
            | IndicatorKind::Atr { period }
            | IndicatorKind::Adx { period }
            | IndicatorKind::VolumeSma { period } => {
                if !in_bounds(*period) {
                    return Err(invalid("period", PERIOD_BOUNDS));
                }
            }
            IndicatorKind::Macd { fast, slow, signal } => {
                if ![*fast, *slow, *signal].into_iter().all(in_bounds) {
                    return Err(invalid("fast/slow/signal", PERIOD_BOUNDS));
                }
                if fast >= slow {
                    return Err(invalid("fast", "must be smaller than slow"));
                }
            }
            IndicatorKind::Stochastic { k_period, d_period } => {
                if !(in_bounds(*k_period) && in_bounds(*d_period)) {
                    return Err(invalid("k_period/d_period", PERIOD_BOUNDS));
                }
            }
            IndicatorKind::Bollinger { period, std_dev } => {
                if !in_bounds(*period) {
                    return Err(invalid("period", PERIOD_BOUNDS));
                }
                if !std_dev.is_finite() || *std_dev <= 0.0 {
                    return Err(invalid("std_dev", "must be a positive number"));
                }
            }
            IndicatorKind::Obv => {}
            IndicatorKind::Custom { name, params } => {
                if name.trim().is_empty() {
                    return Err(invalid("name", "must not be empty"));
                }
                if let Some((k, _)) = params.iter().find(|(_, v)| !v.is_finite()) {
                    return Err(invalid(k, "must be finite"));
                }
            }
        }
        Ok(())
    }

    fn builtin(&self) -> Option<Box<dyn Indicator>> {
        let indicator: Box<dyn Indicator> = match *self {
            IndicatorKind::Sma { period } => Box::new(Sma::new(period)),
            IndicatorKind::Ema { period } => Box::new(Ema::new(period)),
            IndicatorKind::Rsi { period } => Box::new(Rsi::new(period)),
            IndicatorKind::Macd { fast, slow, signal } => Box::new(Macd::new(fast, slow, signal)),
            IndicatorKind::Stochastic { k_period, d_period } => {
                Box::new(Stochastic::new(k_period, d_period))
            }
            IndicatorKind::Roc { period } => Box::new(Roc::new(period)),
            IndicatorKind::Atr { period } => Box::new(Atr::new(period)),
            IndicatorKind::Bollinger { period, std_dev } => {
                Box::new(Bollinger::new(period, std_dev))
            }
            IndicatorKind::Adx { period } => Box::new(Adx::new(period)),
            IndicatorKind::Obv => Box::new(Obv),
            IndicatorKind::VolumeSma { period } => Box::new(VolumeSma::new(period)),
            IndicatorKind::Custom { .. } => return None,
        };
        Some(indicator)
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .params()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{}({})", self.type_tag(), params)
    }
}

/// A configured indicator: identifier plus kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDefinition {
    pub id: IndicatorId,
    #[serde(flatten)]
    pub kind: IndicatorKind,
}

impl IndicatorDefinition {
    pub fn new(id: impl Into<IndicatorId>, kind: IndicatorKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Named output series of one indicator computation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndicatorOutputs {
    warmup: usize,
    field_warmups: BTreeMap<String, usize>,
    primary: String,
    series: BTreeMap<String, Vec<f64>>,
}

impl IndicatorOutputs {
    pub fn new(warmup: usize, primary: &str, series: BTreeMap<String, Vec<f64>>) -> Self {
        Self {
            warmup,
            field_warmups: BTreeMap::new(),
            primary: primary.to_string(),
            series,
        }
    }

    /// Record a shorter warm-up for one output (e.g. the DI lines of ADX).
    pub fn with_field_warmup(mut self, field: &str, warmup: usize) -> Self {
        self.field_warmups.insert(field.to_string(), warmup);
        self
    }

    /// Single-output indicator result stored under [`VALUE`].
    pub fn single(warmup: usize, values: Vec<f64>) -> Self {
        let mut series = BTreeMap::new();
        series.insert(VALUE.to_string(), values);
        Self::new(warmup, VALUE, series)
    }

    /// Number of leading bars where at least one output is unavailable.
    pub fn warmup(&self) -> usize {
        self.warmup
    }

    /// Number of leading bars where `field` is unavailable.
    pub fn warmup_of(&self, field: &str) -> usize {
        self.field_warmups.get(field).copied().unwrap_or(self.warmup)
    }

    pub fn get(&self, field: &str) -> Option<&[f64]> {
        self.series.get(field).map(|v| v.as_slice())
    }

    pub fn primary_name(&self) -> &str {
        &self.primary
    }

    pub fn primary(&self) -> &[f64] {
        self.get(&self.primary).unwrap_or(&[])
    }

    /// Value of `field` at `bar_index`, `None` when unavailable.
    pub fn value(&self, field: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(field)
            .and_then(|v| v.get(bar_index).copied())
            .filter(|v| !v.is_nan())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.series.values().next().map_or(0, |v| v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Built-in indicator computation.
///
/// Implementations must be causal and return series as long as `bars`, with
/// `NaN` for at least the first `warmup()` values.
pub trait Indicator: Send + Sync {
    /// Number of leading bars with unavailable output.
    fn warmup(&self) -> usize;

    /// Compute every named output for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> IndicatorOutputs;
}

/// Caller-supplied computation for `Custom` indicator kinds.
///
/// Custom indicators expose a single [`VALUE`] output.
pub trait CustomIndicator: Send + Sync {
    fn warmup(&self, params: &BTreeMap<String, f64>) -> usize;

    fn compute(&self, bars: &[Bar], params: &BTreeMap<String, f64>) -> Vec<f64>;
}

/// Lookup table from custom indicator names to implementations.
///
/// Built-in kinds never consult the registry.
#[derive(Clone, Default)]
pub struct IndicatorRegistry {
    custom: HashMap<String, Arc<dyn CustomIndicator>>,
}

impl fmt::Debug for IndicatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.custom.keys().collect();
        names.sort();
        f.debug_struct("IndicatorRegistry")
            .field("custom", &names)
            .finish()
    }
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, indicator: Arc<dyn CustomIndicator>) {
        self.custom.insert(name.into(), indicator);
    }

    pub fn with_custom(mut self, name: impl Into<String>, indicator: Arc<dyn CustomIndicator>) -> Self {
        self.register(name, indicator);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.custom.contains_key(name)
    }

    /// Address of the implementation registered under `name`. Two
    /// registries that share an `Arc` report the same identity.
    pub(crate) fn custom_identity(&self, name: &str) -> Option<usize> {
        self.custom
            .get(name)
            .map(|indicator| Arc::as_ptr(indicator) as *const () as usize)
    }

    /// Compute `kind` over `bars`.
    pub fn compute_kind(
        &self,
        bars: &[Bar],
        kind: &IndicatorKind,
    ) -> Result<IndicatorOutputs, IndicatorError> {
        kind.validate()?;
        if let Some(indicator) = kind.builtin() {
            return Ok(indicator.compute(bars));
        }
        match kind {
            IndicatorKind::Custom { name, params } => {
                let custom = self
                    .custom
                    .get(name)
                    .ok_or_else(|| IndicatorError::UnknownCustom(name.clone()))?;
                let mut values = custom.compute(bars, params);
                values.resize(bars.len(), f64::NAN);
                let warmup = custom.warmup(params).min(bars.len());
                for v in values.iter_mut().take(warmup) {
                    *v = f64::NAN;
                }
                Ok(IndicatorOutputs::single(warmup, values))
            }
            _ => Err(IndicatorError::UnknownKind(kind.type_tag().to_string())),
        }
    }

    pub fn compute(
        &self,
        series: &BarSeries,
        definition: &IndicatorDefinition,
    ) -> Result<IndicatorOutputs, IndicatorError> {
        self.compute_kind(series.bars(), &definition.kind)
    }
}

/// Compute a built-in indicator definition over a series.
pub fn compute(
    series: &BarSeries,
    definition: &IndicatorDefinition,
) -> Result<IndicatorOutputs, IndicatorError> {
    IndicatorRegistry::default().compute(series, definition)
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Create synthetic bars from explicit (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            timestamp: base + chrono::Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
