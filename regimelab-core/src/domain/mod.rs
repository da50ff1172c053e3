//! Domain types for RegimeLab

pub mod bar;
pub mod ids;

pub use bar::{Bar, BarError, BarSeries};
pub use ids::{IndicatorId, RegimeId, StrategyId, StrategySetId};
