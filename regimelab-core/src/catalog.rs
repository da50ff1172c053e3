//! Configuration catalog: indicators, regimes, strategies, strategy sets and
//! routing rules loaded from one TOML or JSON document.
//!
//! Loading runs two validation passes before anything can be evaluated:
//!
//! 1. structural: ids present and unique, indicator parameters in range,
//!    condition groups non-empty and well-formed, risk blocks in range;
//! 2. referential: every indicator/output, strategy, strategy set and regime
//!    reference resolves, and every override applies cleanly.
//!
//! A catalog either loads completely or not at all. Once built it is
//! immutable and shareable across threads.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::ConditionGroup;
use crate::domain::{BarSeries, IndicatorId, RegimeId, StrategySetId};
use crate::error::ConfigError;
use crate::frame::IndicatorFrame;
use crate::indicators::{IndicatorDefinition, IndicatorError, IndicatorKind, IndicatorRegistry};
use crate::regime::{RegimeDefinition, RegimeDetector, RegimeScope};
use crate::routing::{
    resolve_strategy_set, route, ResolvedStrategy, ResolvedStrategySet, RouteOutcome,
    RoutingRule, Strategy, StrategySet,
};

/// Raw configuration document, as written on disk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub indicators: Vec<IndicatorDefinition>,
    #[serde(default)]
    pub regimes: Vec<RegimeDefinition>,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    #[serde(default)]
    pub strategy_sets: Vec<StrategySet>,
    #[serde(default)]
    pub routing: Vec<RoutingRule>,
}

/// Routing result for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub bar_index: usize,
    pub active_regime_ids: Vec<RegimeId>,
    pub outcome: RouteOutcome,
    pub matched_strategy_set_id: Option<StrategySetId>,
    pub resolved_strategies: Vec<ResolvedStrategy>,
}

/// Validated, immutable configuration.
#[derive(Debug, Clone)]
pub struct Catalog {
    document: CatalogDocument,
    detector: RegimeDetector,
    resolved: BTreeMap<StrategySetId, ResolvedStrategySet>,
}

impl Catalog {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let document: CatalogDocument = toml::from_str(s).map_err(|e| ConfigError::Parse {
            format: "TOML",
            message: e.to_string(),
        })?;
        Self::from_document(document)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let document: CatalogDocument =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            })?;
        Self::from_document(document)
    }

    pub fn from_document(document: CatalogDocument) -> Result<Self, ConfigError> {
        validate_structure(&document)?;
        validate_references(&document)?;

        let mut resolved = BTreeMap::new();
        for set in &document.strategy_sets {
            let r = resolve_strategy_set(set, &document.indicators, &document.strategies)?;
            resolved.insert(set.id.clone(), r);
        }

        debug!(
            indicators = document.indicators.len(),
            regimes = document.regimes.len(),
            strategies = document.strategies.len(),
            strategy_sets = document.strategy_sets.len(),
            rules = document.routing.len(),
            "catalog loaded"
        );

        Ok(Self {
            detector: RegimeDetector::new(document.regimes.clone()),
            document,
            resolved,
        })
    }

    pub fn document(&self) -> &CatalogDocument {
        &self.document
    }

    pub fn indicators(&self) -> &[IndicatorDefinition] {
        &self.document.indicators
    }

    pub fn regimes(&self) -> &[RegimeDefinition] {
        &self.document.regimes
    }

    pub fn routing(&self) -> &[RoutingRule] {
        &self.document.routing
    }

    pub fn detector(&self) -> &RegimeDetector {
        &self.detector
    }

    pub fn resolved_set(&self, id: &str) -> Option<&ResolvedStrategySet> {
        self.resolved.get(id)
    }

    /// Compute every catalog indicator over `series`.
    pub fn compute_frame(
        &self,
        series: &BarSeries,
        registry: &IndicatorRegistry,
    ) -> Result<IndicatorFrame, IndicatorError> {
        IndicatorFrame::compute(series, &self.document.indicators, registry)
    }

    /// Detect, route and resolve at one bar.
    pub fn decide(
        &self,
        frame: &IndicatorFrame,
        bar_index: usize,
        scope: RegimeScope,
    ) -> RoutingDecision {
        let snapshot = frame.snapshot(bar_index);
        let active = self.detector.active_regimes(&snapshot, scope);
        let outcome = route(&active, &self.document.routing);
        let matched = outcome.strategy_set().cloned();
        let resolved_strategies = matched
            .as_ref()
            .and_then(|id| self.resolved.get(id))
            .map(|set| set.strategies.clone())
            .unwrap_or_default();

        RoutingDecision {
            bar_index,
            active_regime_ids: active,
            outcome,
            matched_strategy_set_id: matched,
            resolved_strategies,
        }
    }

    /// Indicator ids the regime definitions of `scope` read.
    pub fn regime_indicator_ids(&self, scope: RegimeScope) -> Vec<IndicatorId> {
        let mut ids: Vec<IndicatorId> = self
            .document
            .regimes
            .iter()
            .filter(|r| r.scope == scope)
            .flat_map(|r| r.conditions.indicator_refs())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

fn check_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(ConfigError::EmptyId { kind });
        }
        if !seen.insert(id) {
            return Err(ConfigError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

fn check_group_shape(group: &ConditionGroup, context: &str) -> Result<(), ConfigError> {
    let mut result = Ok(());
    group.for_each_group(&mut |g| {
        if result.is_ok() && g.nodes().is_empty() {
            result = Err(ConfigError::EmptyGroup {
                context: context.to_string(),
            });
        }
    });
    result?;

    let mut result = Ok(());
    group.for_each_condition(&mut |c| {
        if result.is_ok() {
            if let Some(reason) = c.shape_error() {
                result = Err(ConfigError::InvalidCondition {
                    context: context.to_string(),
                    reason: reason.to_string(),
                });
            }
        }
    });
    result
}

fn check_group_refs(
    group: &ConditionGroup,
    context: &str,
    indicators: &BTreeMap<&str, &IndicatorKind>,
) -> Result<(), ConfigError> {
    for (id, field) in group.indicator_refs() {
        let kind = indicators
            .get(id.as_str())
            .ok_or_else(|| ConfigError::UnknownIndicator {
                context: context.to_string(),
                indicator: id.to_string(),
            })?;
        if let Some(field) = field {
            if !kind.has_output(field) {
                return Err(ConfigError::UnknownOutput {
                    context: context.to_string(),
                    indicator: id.to_string(),
                    field: field.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn validate_structure(doc: &CatalogDocument) -> Result<(), ConfigError> {
    check_ids("indicator", doc.indicators.iter().map(|d| d.id.as_str()))?;
    check_ids("regime", doc.regimes.iter().map(|r| r.id.as_str()))?;
    check_ids("strategy", doc.strategies.iter().map(|s| s.id.as_str()))?;
    check_ids("strategy set", doc.strategy_sets.iter().map(|s| s.id.as_str()))?;

    for def in &doc.indicators {
        def.kind.validate().map_err(|source| ConfigError::Indicator {
            id: def.id.to_string(),
            source,
        })?;
    }

    for regime in &doc.regimes {
        check_group_shape(&regime.conditions, &format!("regime `{}`", regime.id))?;
    }

    for strategy in &doc.strategies {
        check_group_shape(&strategy.entry, &format!("strategy `{}` entry", strategy.id))?;
        check_group_shape(&strategy.exit, &format!("strategy `{}` exit", strategy.id))?;
        strategy
            .risk
            .validate()
            .map_err(|(field, reason)| ConfigError::InvalidRisk {
                strategy: strategy.id.to_string(),
                field,
                reason,
            })?;
    }

    for set in &doc.strategy_sets {
        if set.strategies.is_empty() {
            return Err(ConfigError::EmptyStrategySet {
                set: set.id.to_string(),
            });
        }
    }

    Ok(())
}

fn validate_references(doc: &CatalogDocument) -> Result<(), ConfigError> {
    let indicators: BTreeMap<&str, &IndicatorKind> = doc
        .indicators
        .iter()
        .map(|d| (d.id.as_str(), &d.kind))
        .collect();

    for regime in &doc.regimes {
        check_group_refs(&regime.conditions, &format!("regime `{}`", regime.id), &indicators)?;
    }
    for strategy in &doc.strategies {
        check_group_refs(&strategy.entry, &format!("strategy `{}` entry", strategy.id), &indicators)?;
        check_group_refs(&strategy.exit, &format!("strategy `{}` exit", strategy.id), &indicators)?;
    }

    let strategies: HashSet<&str> = doc.strategies.iter().map(|s| s.id.as_str()).collect();
    for set in &doc.strategy_sets {
        if let Some(missing) = set.strategies.iter().find(|s| !strategies.contains(s.as_str())) {
            return Err(ConfigError::UnknownStrategy {
                set: set.id.to_string(),
                strategy: missing.to_string(),
            });
        }
    }

    let regimes: HashSet<&str> = doc.regimes.iter().map(|r| r.id.as_str()).collect();
    let sets: HashSet<&str> = doc.strategy_sets.iter().map(|s| s.id.as_str()).collect();
    for (i, rule) in doc.routing.iter().enumerate() {
        if let Some(missing) = rule.when.regime_refs().find(|r| !regimes.contains(r.as_str())) {
            return Err(ConfigError::UnknownRegime {
                rule: rule.label(i),
                regime: missing.to_string(),
            });
        }
        if !sets.contains(rule.strategy_set.as_str()) {
            return Err(ConfigError::UnknownStrategySet {
                rule: rule.label(i),
                set: rule.strategy_set.to_string(),
            });
        }
    }

    Ok(())
}
