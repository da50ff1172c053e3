//! Per-bar regime labels and the boundaries between them.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::RegimeId;
use crate::frame::IndicatorFrame;

/// The bar at which the primary label changed. `regime: None` means the
/// series left every regime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeChange {
    pub bar_index: usize,
    pub timestamp: Option<NaiveDateTime>,
    pub regime: Option<RegimeId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegimeTimeline {
    labels: Vec<Option<RegimeId>>,
    changes: Vec<RegimeChange>,
}

impl RegimeTimeline {
    /// Build from per-bar labels. A change is recorded at every bar whose
    /// label differs from the previous bar's; bar 0 counts as a change only
    /// when it starts inside a regime.
    pub fn from_labels(frame: &IndicatorFrame, labels: Vec<Option<RegimeId>>) -> Self {
        let mut changes = Vec::new();
        let mut prev: Option<&RegimeId> = None;
        for (i, label) in labels.iter().enumerate() {
            if label.as_ref() != prev {
                changes.push(RegimeChange {
                    bar_index: i,
                    timestamp: frame.timestamp(i),
                    regime: label.clone(),
                });
            }
            prev = label.as_ref();
        }
        Self { labels, changes }
    }

    pub fn labels(&self) -> &[Option<RegimeId>] {
        &self.labels
    }

    pub fn label(&self, bar_index: usize) -> Option<&RegimeId> {
        self.labels.get(bar_index).and_then(|l| l.as_ref())
    }

    pub fn changes(&self) -> &[RegimeChange] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Bar indices grouped by label, unclassified bars under `None`.
    pub fn partition(&self) -> BTreeMap<Option<RegimeId>, Vec<usize>> {
        let mut parts: BTreeMap<Option<RegimeId>, Vec<usize>> = BTreeMap::new();
        for (i, label) in self.labels.iter().enumerate() {
            parts.entry(label.clone()).or_default().push(i);
        }
        parts
    }
}
