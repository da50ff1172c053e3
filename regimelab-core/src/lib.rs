//! RegimeLab Core: bars, indicators, conditions, regimes and routing.
//!
//! This crate contains the deterministic, single-bar side of the system:
//! - Validated bar series
//! - Indicator engine with named multi-output series and an LRU memo
//! - Declarative condition language evaluated against per-bar snapshots
//! - Priority-ordered regime detector, timelines and debouncing
//! - First-match strategy router with override resolution
//! - Configuration catalog with structural and referential validation
//!
//! Nothing here holds mutable state across calls; a loaded [`Catalog`] is
//! immutable and `Send + Sync`.

pub mod catalog;
pub mod condition;
pub mod domain;
pub mod error;
pub mod frame;
pub mod indicators;
pub mod regime;
pub mod routing;

pub use catalog::{Catalog, CatalogDocument, RoutingDecision};
pub use condition::{evaluate, Condition, ConditionGroup, ConditionNode, Operand, Operator};
pub use domain::{Bar, BarError, BarSeries, IndicatorId, RegimeId, StrategyId, StrategySetId};
pub use error::ConfigError;
pub use frame::{IndicatorFrame, Snapshot};
pub use indicators::{
    compute, CustomIndicator, IndicatorCache, IndicatorDefinition, IndicatorError,
    IndicatorFamily, IndicatorKind, IndicatorOutputs, IndicatorRegistry,
};
pub use regime::{
    DebounceConfig, RegimeChange, RegimeDebouncer, RegimeDefinition, RegimeDetector, RegimeScope,
    RegimeTimeline,
};
pub use routing::{
    route, RegimeMatch, ResolvedStrategy, ResolvedStrategySet, RiskBlock, RouteOutcome,
    RoutingRule, Strategy, StrategySet,
};
