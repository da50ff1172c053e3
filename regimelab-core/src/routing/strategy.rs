//! Strategies, strategy sets and override resolution.
//!
//! A strategy set may override indicator parameters and strategy risk fields.
//! Resolution never touches the catalog: it produces a new
//! [`ResolvedStrategySet`] carrying patched copies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::ConditionGroup;
use crate::domain::{BarSeries, IndicatorId, StrategyId, StrategySetId};
use crate::error::ConfigError;
use crate::frame::{IndicatorFrame, Snapshot};
use crate::indicators::{IndicatorDefinition, IndicatorError, IndicatorRegistry};

/// Position risk settings, all percentages of price or equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBlock {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub position_size_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_stop_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_holding_bars: Option<u32>,
}

impl Default for RiskBlock {
    fn default() -> Self {
        Self {
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
            position_size_pct: 10.0,
            trailing_stop_pct: None,
            max_holding_bars: None,
        }
    }
}

impl RiskBlock {
    /// Copy with one named field replaced. Errors carry `(field, reason)`.
    pub fn with_override(&self, key: &str, value: f64) -> Result<RiskBlock, (String, String)> {
        let fail = |reason: &str| Err((key.to_string(), reason.to_string()));
        if !value.is_finite() {
            return fail("value must be finite");
        }
        let mut next = self.clone();
        match key {
            "stop_loss_pct" => next.stop_loss_pct = value,
            "take_profit_pct" => next.take_profit_pct = value,
            "position_size_pct" => next.position_size_pct = value,
            "trailing_stop_pct" => next.trailing_stop_pct = Some(value),
            "max_holding_bars" => {
                if value < 1.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
                    return fail("expected a positive integer");
                }
                next.max_holding_bars = Some(value as u32);
            }
            _ => return fail("unknown risk field"),
        }
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> Result<(), (String, String)> {
        let check = |field: &str, ok: bool, reason: &str| {
            if ok {
                Ok(())
            } else {
                Err((field.to_string(), reason.to_string()))
            }
        };
        check(
            "stop_loss_pct",
            self.stop_loss_pct.is_finite() && self.stop_loss_pct >= 0.0,
            "must be >= 0",
        )?;
        check(
            "take_profit_pct",
            self.take_profit_pct.is_finite() && self.take_profit_pct >= 0.0,
            "must be >= 0",
        )?;
        check(
            "position_size_pct",
            self.position_size_pct > 0.0 && self.position_size_pct <= 100.0,
            "must be in (0, 100]",
        )?;
        if let Some(t) = self.trailing_stop_pct {
            check("trailing_stop_pct", t.is_finite() && t > 0.0, "must be > 0")?;
        }
        if let Some(bars) = self.max_holding_bars {
            check("max_holding_bars", bars >= 1, "must be >= 1")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: StrategyId,
    #[serde(default)]
    pub name: String,
    pub entry: ConditionGroup,
    pub exit: ConditionGroup,
    #[serde(default)]
    pub risk: RiskBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySet {
    pub id: StrategySetId,
    pub strategies: Vec<StrategyId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indicator_overrides: BTreeMap<IndicatorId, BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub strategy_overrides: BTreeMap<StrategyId, BTreeMap<String, f64>>,
}

/// A strategy with its set's overrides applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStrategy {
    pub id: StrategyId,
    pub name: String,
    pub entry: ConditionGroup,
    pub exit: ConditionGroup,
    pub risk: RiskBlock,
}

impl ResolvedStrategy {
    /// Entry conditions at the snapshot. The snapshot should come from the
    /// owning set's [`ResolvedStrategySet::compute_frame`].
    pub fn entry_signal(&self, snapshot: &Snapshot<'_>) -> bool {
        self.entry.evaluate(snapshot)
    }

    pub fn exit_signal(&self, snapshot: &Snapshot<'_>) -> bool {
        self.exit.evaluate(snapshot)
    }
}

/// A strategy set after override resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStrategySet {
    pub id: StrategySetId,
    pub strategies: Vec<ResolvedStrategy>,
    /// Every catalog indicator, with this set's parameter overrides applied.
    pub indicators: Vec<IndicatorDefinition>,
}

impl ResolvedStrategySet {
    /// Indicator frame under this set's overrides.
    pub fn compute_frame(
        &self,
        series: &BarSeries,
        registry: &IndicatorRegistry,
    ) -> Result<IndicatorFrame, IndicatorError> {
        IndicatorFrame::compute(series, &self.indicators, registry)
    }
}

/// Apply `set`'s overrides to copies of `indicators` and `strategies`.
pub fn resolve_strategy_set(
    set: &StrategySet,
    indicators: &[IndicatorDefinition],
    strategies: &[Strategy],
) -> Result<ResolvedStrategySet, ConfigError> {
    let invalid = |target: &str, key: &str, reason: String| ConfigError::InvalidOverride {
        set: set.id.to_string(),
        target: target.to_string(),
        key: key.to_string(),
        reason,
    };

    for target in set.indicator_overrides.keys() {
        if !indicators.iter().any(|d| &d.id == target) {
            return Err(invalid(target.as_str(), "*", "unknown indicator".into()));
        }
    }

    let mut resolved_indicators = Vec::with_capacity(indicators.len());
    for def in indicators {
        let mut kind = def.kind.clone();
        if let Some(params) = set.indicator_overrides.get(&def.id) {
            for (key, &value) in params {
                kind = kind
                    .with_param(key, value)
                    .map_err(|e| invalid(def.id.as_str(), key, e.to_string()))?;
            }
            kind.validate()
                .map_err(|e| invalid(def.id.as_str(), "*", e.to_string()))?;
        }
        resolved_indicators.push(IndicatorDefinition {
            id: def.id.clone(),
            kind,
        });
    }

    for target in set.strategy_overrides.keys() {
        if !set.strategies.contains(target) {
            return Err(invalid(
                target.as_str(),
                "*",
                "strategy is not a member of this set".into(),
            ));
        }
    }

    let mut resolved_strategies = Vec::with_capacity(set.strategies.len());
    for id in &set.strategies {
        let strategy = strategies
            .iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| ConfigError::UnknownStrategy {
                set: set.id.to_string(),
                strategy: id.to_string(),
            })?;
        let mut risk = strategy.risk.clone();
        if let Some(params) = set.strategy_overrides.get(id) {
            for (key, &value) in params {
                risk = risk
                    .with_override(key, value)
                    .map_err(|(field, reason)| invalid(id.as_str(), &field, reason))?;
            }
        }
        resolved_strategies.push(ResolvedStrategy {
            id: strategy.id.clone(),
            name: strategy.name.clone(),
            entry: strategy.entry.clone(),
            exit: strategy.exit.clone(),
            risk,
        });
    }

    Ok(ResolvedStrategySet {
        id: set.id.clone(),
        strategies: resolved_strategies,
        indicators: resolved_indicators,
    })
}
