//! Run-wide optimizer settings.
//!
//! Everything a run depends on is carried in [`OptimizerConfig`] and passed
//! explicitly, so concurrent runs with different settings never interfere.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use regimelab_core::RegimeScope;

/// A run setting outside its valid range.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid setting `{field}`: {reason}")]
pub struct SettingError {
    pub field: &'static str,
    pub reason: String,
}

impl SettingError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Whether signals are tested as entries or as exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    #[default]
    Entry,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[default]
    Long,
    Short,
}

/// Relative weights of the composite score components.
///
/// Only the ratios matter: weights are renormalized before use, and the
/// proximity weight is dropped in exit mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    pub trade_count: f64,
    pub proximity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            win_rate: 25.0,
            profit_factor: 25.0,
            sharpe: 20.0,
            trade_count: 10.0,
            proximity: 20.0,
        }
    }
}

impl ScoreWeights {
    /// Weights applicable to `mode`, scaled to sum to 1.
    pub fn normalized(&self, mode: TestMode) -> ScoreWeights {
        let proximity = match mode {
            TestMode::Entry => self.proximity,
            TestMode::Exit => 0.0,
        };
        let total = self.win_rate + self.profit_factor + self.sharpe + self.trade_count + proximity;
        ScoreWeights {
            win_rate: self.win_rate / total,
            profit_factor: self.profit_factor / total,
            sharpe: self.sharpe / total,
            trade_count: self.trade_count / total,
            proximity: proximity / total,
        }
    }

    pub fn validate(&self, mode: TestMode) -> Result<(), SettingError> {
        let all = [
            self.win_rate,
            self.profit_factor,
            self.sharpe,
            self.trade_count,
            self.proximity,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SettingError::new(
                "weights",
                "every weight must be a finite, non-negative number",
            ));
        }
        let n = self.normalized(mode);
        if !(n.win_rate + n.profit_factor + n.sharpe + n.trade_count + n.proximity).is_finite() {
            return Err(SettingError::new(
                "weights",
                format!("weights applicable to {mode:?} mode sum to zero"),
            ));
        }
        Ok(())
    }
}

/// Thresholds used by the per-kind signal rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalThresholds {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub stochastic_oversold: f64,
    pub stochastic_overbought: f64,
    /// ADX level whose crossing marks a trend start or end.
    pub adx_level: f64,
    /// Breakout size in multiples of the previous bar's ATR.
    pub atr_multiplier: f64,
    /// Volume spike size in multiples of the volume average.
    pub volume_multiplier: f64,
    /// Period of the SMA that OBV is compared against.
    pub obv_sma_period: usize,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            stochastic_oversold: 20.0,
            stochastic_overbought: 80.0,
            adx_level: 25.0,
            atr_multiplier: 1.0,
            volume_multiplier: 1.5,
            obv_sma_period: 20,
        }
    }
}

impl SignalThresholds {
    pub fn validate(&self) -> Result<(), SettingError> {
        check_band("rsi", self.rsi_oversold, self.rsi_overbought)?;
        check_band(
            "stochastic",
            self.stochastic_oversold,
            self.stochastic_overbought,
        )?;
        if !(self.adx_level.is_finite() && (0.0..=100.0).contains(&self.adx_level)) {
            return Err(SettingError::new("adx_level", "must lie in [0, 100]"));
        }
        if !(self.atr_multiplier.is_finite() && self.atr_multiplier > 0.0) {
            return Err(SettingError::new("atr_multiplier", "must be positive"));
        }
        if !(self.volume_multiplier.is_finite() && self.volume_multiplier > 0.0) {
            return Err(SettingError::new("volume_multiplier", "must be positive"));
        }
        if self.obv_sma_period == 0 {
            return Err(SettingError::new("obv_sma_period", "must be >= 1"));
        }
        Ok(())
    }
}

fn check_band(name: &'static str, oversold: f64, overbought: f64) -> Result<(), SettingError> {
    let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
    if !in_range(oversold) || !in_range(overbought) || oversold >= overbought {
        return Err(SettingError::new(
            name,
            format!("need 0 <= oversold < overbought <= 100, got {oversold} / {overbought}"),
        ));
    }
    Ok(())
}

/// How candidates are drawn from the parameter spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchMode {
    /// Every grid point.
    #[default]
    Grid,
    /// A seeded subset of at most `samples` grid points.
    Random { samples: usize, seed: u64 },
}

/// Complete optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub mode: TestMode,
    pub side: Side,
    /// Scope of the regime definitions used to partition bars.
    pub regime_scope: RegimeScope,
    pub weights: ScoreWeights,
    pub thresholds: SignalThresholds,
    /// Regime partitions with fewer bars are not scored.
    pub min_regime_bars: usize,
    /// Pairs with fewer scored signals are rejected.
    pub min_trades: usize,
    /// Bars on either side of a signal searched for the local extreme.
    pub proximity_window: usize,
    /// Trade count at which the trade-count component saturates.
    pub trade_count_target: usize,
    /// Score bars with no active regime as their own partition.
    pub include_unclassified: bool,
    pub search: SearchMode,
    /// Evaluate candidates on the rayon pool.
    pub parallel: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            mode: TestMode::Entry,
            side: Side::Long,
            regime_scope: RegimeScope::Global,
            weights: ScoreWeights::default(),
            thresholds: SignalThresholds::default(),
            min_regime_bars: 20,
            min_trades: 5,
            proximity_window: 5,
            trade_count_target: 30,
            include_unclassified: true,
            search: SearchMode::Grid,
            parallel: true,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), SettingError> {
        self.weights.validate(self.mode)?;
        self.thresholds.validate()?;
        if self.min_trades == 0 {
            return Err(SettingError::new(
                "min_trades",
                "must be >= 1 so that silent candidates are rejected",
            ));
        }
        if self.min_regime_bars == 0 {
            return Err(SettingError::new("min_regime_bars", "must be >= 1"));
        }
        if self.proximity_window == 0 {
            return Err(SettingError::new("proximity_window", "must be >= 1"));
        }
        if self.trade_count_target == 0 {
            return Err(SettingError::new("trade_count_target", "must be >= 1"));
        }
        if let SearchMode::Random { samples: 0, .. } = self.search {
            return Err(SettingError::new("search.samples", "must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(OptimizerConfig::default().validate().is_ok());
    }

    #[test]
    fn exit_mode_drops_proximity_and_renormalizes() {
        let w = ScoreWeights::default().normalized(TestMode::Exit);
        assert_eq!(w.proximity, 0.0);
        let sum = w.win_rate + w.profit_factor + w.sharpe + w.trade_count;
        assert!((sum - 1.0).abs() < 1e-12);
        assert!((w.win_rate - 25.0 / 80.0).abs() < 1e-12);
    }

    #[test]
    fn entry_mode_keeps_proximity() {
        let w = ScoreWeights::default().normalized(TestMode::Entry);
        assert!((w.proximity - 0.2).abs() < 1e-12);
    }

    #[test]
    fn proximity_only_weights_are_invalid_in_exit_mode() {
        let weights = ScoreWeights {
            win_rate: 0.0,
            profit_factor: 0.0,
            sharpe: 0.0,
            trade_count: 0.0,
            proximity: 1.0,
        };
        assert!(weights.validate(TestMode::Entry).is_ok());
        assert!(weights.validate(TestMode::Exit).is_err());
    }

    #[test]
    fn negative_weight_rejected() {
        let weights = ScoreWeights {
            sharpe: -1.0,
            ..Default::default()
        };
        assert!(weights.validate(TestMode::Entry).is_err());
    }

    #[test]
    fn inverted_band_rejected() {
        let thresholds = SignalThresholds {
            rsi_oversold: 70.0,
            rsi_overbought: 30.0,
            ..Default::default()
        };
        assert_eq!(thresholds.validate().unwrap_err().field, "rsi");
    }

    #[test]
    fn zero_min_trades_rejected() {
        let config = OptimizerConfig {
            min_trades: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().field, "min_trades");
    }

    #[test]
    fn zero_random_samples_rejected() {
        let config = OptimizerConfig {
            search: SearchMode::Random { samples: 0, seed: 7 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: OptimizerConfig = toml::from_str(
            r#"
            mode = "exit"
            side = "short"
            min_trades = 3
            search = { type = "random", samples = 50, seed = 42 }
            [weights]
            proximity = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, TestMode::Exit);
        assert_eq!(config.side, Side::Short);
        assert_eq!(config.min_trades, 3);
        assert_eq!(config.min_regime_bars, 20);
        assert_eq!(config.weights.win_rate, 25.0);
        assert_eq!(config.weights.proximity, 0.0);
        assert_eq!(
            config.search,
            SearchMode::Random {
                samples: 50,
                seed: 42
            }
        );
    }

    #[test]
    fn config_serialization_round_trip() {
        let config = OptimizerConfig {
            side: Side::Short,
            regime_scope: RegimeScope::Entry,
            ..Default::default()
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: OptimizerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
