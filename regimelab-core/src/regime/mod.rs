//! Regime detection.
//!
//! A regime is a named condition group with a scope and a priority. The
//! detector is stateless per bar: it reports every regime of the requested
//! scope whose conditions hold at a snapshot, highest priority first, ties in
//! declaration order. Flap suppression lives in [`RegimeDebouncer`].

pub mod debounce;
pub mod timeline;

pub use debounce::{DebounceConfig, RegimeDebouncer, RegimeTransition};
pub use timeline::{RegimeChange, RegimeTimeline};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::condition::ConditionGroup;
use crate::domain::RegimeId;
use crate::frame::{IndicatorFrame, Snapshot};

/// Evaluation context a regime applies to. Matching is exact: a `global`
/// regime is only reported when `global` is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeScope {
    Entry,
    Exit,
    InTrade,
    #[default]
    Global,
}

impl fmt::Display for RegimeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegimeScope::Entry => "entry",
            RegimeScope::Exit => "exit",
            RegimeScope::InTrade => "in_trade",
            RegimeScope::Global => "global",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeDefinition {
    pub id: RegimeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub scope: RegimeScope,
    #[serde(default)]
    pub priority: i32,
    pub conditions: ConditionGroup,
}

/// Stateless classifier over a fixed, declaration-ordered list of regimes.
#[derive(Debug, Clone, Default)]
pub struct RegimeDetector {
    regimes: Vec<RegimeDefinition>,
}

impl RegimeDetector {
    pub fn new(regimes: Vec<RegimeDefinition>) -> Self {
        Self { regimes }
    }

    pub fn regimes(&self) -> &[RegimeDefinition] {
        &self.regimes
    }

    /// Active regimes of `scope`, priority descending, stable on ties.
    pub fn active_regimes(&self, snapshot: &Snapshot<'_>, scope: RegimeScope) -> Vec<RegimeId> {
        let mut active: Vec<&RegimeDefinition> = self
            .regimes
            .iter()
            .filter(|r| r.scope == scope && r.conditions.evaluate(snapshot))
            .collect();
        // sort_by_key is stable
        active.sort_by_key(|r| std::cmp::Reverse(r.priority));
        active.into_iter().map(|r| r.id.clone()).collect()
    }

    /// Highest-priority active regime at the snapshot, if any.
    pub fn primary_regime(&self, snapshot: &Snapshot<'_>, scope: RegimeScope) -> Option<RegimeId> {
        self.active_regimes(snapshot, scope).into_iter().next()
    }

    /// Label every bar of `frame` with its primary regime.
    pub fn label_series(&self, frame: &IndicatorFrame, scope: RegimeScope) -> RegimeTimeline {
        let labels = (0..frame.len())
            .map(|i| self.primary_regime(&frame.snapshot(i), scope))
            .collect();
        RegimeTimeline::from_labels(frame, labels)
    }
}
