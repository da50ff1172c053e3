//! Strategy routing.
//!
//! Routing rules are evaluated in declared order against the set of active
//! regime ids; the first rule whose regime predicate holds selects its
//! strategy set. Falling off the end is an ordinary [`RouteOutcome::NoMatch`].

pub mod strategy;

pub use strategy::{
    resolve_strategy_set, ResolvedStrategy, ResolvedStrategySet, RiskBlock, Strategy, StrategySet,
};

use serde::{Deserialize, Serialize};

use crate::domain::{RegimeId, StrategySetId};

/// Predicate over the active regime set.
///
/// Holds iff every `all_of` id is active, at least one `any_of` id is active
/// (vacuously true when empty) and no `none_of` id is active. The default
/// predicate always holds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegimeMatch {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<RegimeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<RegimeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub none_of: Vec<RegimeId>,
}

impl RegimeMatch {
    pub fn matches(&self, active: &[RegimeId]) -> bool {
        self.all_of.iter().all(|r| active.contains(r))
            && (self.any_of.is_empty() || self.any_of.iter().any(|r| active.contains(r)))
            && !self.none_of.iter().any(|r| active.contains(r))
    }

    pub fn regime_refs(&self) -> impl Iterator<Item = &RegimeId> {
        self.all_of
            .iter()
            .chain(self.any_of.iter())
            .chain(self.none_of.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub when: RegimeMatch,
    pub strategy_set: StrategySetId,
}

impl RoutingRule {
    /// Name for diagnostics: the configured name or `#index`.
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => format!("`{name}`"),
            None => format!("#{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouteOutcome {
    Matched {
        rule_index: usize,
        strategy_set: StrategySetId,
    },
    NoMatch,
}

impl RouteOutcome {
    pub fn strategy_set(&self) -> Option<&StrategySetId> {
        match self {
            RouteOutcome::Matched { strategy_set, .. } => Some(strategy_set),
            RouteOutcome::NoMatch => None,
        }
    }
}

/// First rule, in declared order, matching `active`.
pub fn route(active: &[RegimeId], rules: &[RoutingRule]) -> RouteOutcome {
    rules
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.when.matches(active))
        .map_or(RouteOutcome::NoMatch, |(rule_index, rule)| {
            RouteOutcome::Matched {
                rule_index,
                strategy_set: rule.strategy_set.clone(),
            }
        })
}
