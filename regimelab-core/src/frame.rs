//! Precomputed indicator values and per-bar snapshots.
//!
//! Indicators are computed once per series into an [`IndicatorFrame`], then
//! queried by bar index. A [`Snapshot`] exposes the values at exactly one bar,
//! so anything evaluated against it cannot see later bars.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::domain::{BarSeries, IndicatorId};
use crate::indicators::{
    IndicatorCache, IndicatorDefinition, IndicatorError, IndicatorOutputs, IndicatorRegistry,
};

/// Outputs of every configured indicator over one series.
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    timestamps: Vec<NaiveDateTime>,
    outputs: BTreeMap<IndicatorId, IndicatorOutputs>,
}

impl IndicatorFrame {
    /// Empty frame aligned with `series`.
    pub fn new(series: &BarSeries) -> Self {
        Self {
            timestamps: series.bars().iter().map(|b| b.timestamp).collect(),
            outputs: BTreeMap::new(),
        }
    }

    /// Compute every definition over `series`.
    pub fn compute(
        series: &BarSeries,
        definitions: &[IndicatorDefinition],
        registry: &IndicatorRegistry,
    ) -> Result<Self, IndicatorError> {
        let mut frame = Self::new(series);
        for def in definitions {
            frame.insert(def.id.clone(), registry.compute(series, def)?);
        }
        Ok(frame)
    }

    /// Same as [`IndicatorFrame::compute`], memoizing through `cache`.
    pub fn compute_cached(
        series: &BarSeries,
        definitions: &[IndicatorDefinition],
        registry: &IndicatorRegistry,
        cache: &IndicatorCache,
    ) -> Result<Self, IndicatorError> {
        let mut frame = Self::new(series);
        for def in definitions {
            let outputs = cache.get_or_compute(registry, series, &def.kind)?;
            frame.insert(def.id.clone(), (*outputs).clone());
        }
        Ok(frame)
    }

    pub fn insert(&mut self, id: impl Into<IndicatorId>, outputs: IndicatorOutputs) {
        self.outputs.insert(id.into(), outputs);
    }

    pub fn get(&self, id: &str) -> Option<&IndicatorOutputs> {
        self.outputs.get(id)
    }

    /// Number of bars covered.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamp(&self, bar_index: usize) -> Option<NaiveDateTime> {
        self.timestamps.get(bar_index).copied()
    }

    /// Largest warm-up across all indicators in the frame.
    pub fn max_warmup(&self) -> usize {
        self.outputs.values().map(|o| o.warmup()).max().unwrap_or(0)
    }

    pub fn snapshot(&self, bar_index: usize) -> Snapshot<'_> {
        Snapshot {
            frame: self,
            bar_index,
        }
    }
}

/// Read-only view of every indicator at one bar.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    frame: &'a IndicatorFrame,
    bar_index: usize,
}

impl<'a> Snapshot<'a> {
    pub fn bar_index(&self) -> usize {
        self.bar_index
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.frame.timestamp(self.bar_index)
    }

    /// Value of `field` (or the primary output) of indicator `id` at this bar.
    ///
    /// `None` for unknown ids, unknown fields, warm-up and NaN values.
    pub fn value(&self, id: &str, field: Option<&str>) -> Option<f64> {
        let outputs = self.frame.get(id)?;
        let field = field.unwrap_or_else(|| outputs.primary_name());
        outputs.value(field, self.bar_index)
    }
}
