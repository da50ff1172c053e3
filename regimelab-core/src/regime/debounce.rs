//! Hysteresis for regime labels.
//!
//! The detector itself is stateless, so a label that flickers across a
//! threshold flips every bar. [`RegimeDebouncer`] only commits to a new label
//! after it has been observed on `confirmation_bars` consecutive bars.

use serde::{Deserialize, Serialize};

use crate::domain::RegimeId;
use crate::error::ConfigError;
use crate::frame::IndicatorFrame;
use crate::regime::RegimeTimeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Consecutive bars a new label must persist before it is reported.
    /// 1 reports every change immediately.
    pub confirmation_bars: usize,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            confirmation_bars: 3,
        }
    }
}

impl DebounceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confirmation_bars == 0 {
            return Err(ConfigError::invalid_field(
                "confirmation_bars",
                "must be >= 1",
            ));
        }
        Ok(())
    }
}

/// A confirmed label change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeTransition {
    pub bar_index: usize,
    pub from: Option<RegimeId>,
    pub to: Option<RegimeId>,
}

#[derive(Debug, Clone)]
pub struct RegimeDebouncer {
    config: DebounceConfig,
    current: Option<RegimeId>,
    pending: Option<(Option<RegimeId>, usize)>,
}

impl RegimeDebouncer {
    pub fn new(config: DebounceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            current: None,
            pending: None,
        })
    }

    /// Confirmed label.
    pub fn current(&self) -> Option<&RegimeId> {
        self.current.as_ref()
    }

    /// Feed the raw label of `bar_index`. Returns the transition when this
    /// bar confirms a change.
    pub fn observe(
        &mut self,
        bar_index: usize,
        observed: Option<&RegimeId>,
    ) -> Option<RegimeTransition> {
        if observed == self.current.as_ref() {
            self.pending = None;
            return None;
        }

        let count = match self.pending.take() {
            Some((label, count)) if label.as_ref() == observed => count + 1,
            _ => 1,
        };
        self.pending = Some((observed.cloned(), count));

        if count < self.config.confirmation_bars {
            return None;
        }

        self.pending = None;
        let from = std::mem::replace(&mut self.current, observed.cloned());
        Some(RegimeTransition {
            bar_index,
            from,
            to: observed.cloned(),
        })
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.pending = None;
    }

    /// Debounced copy of a whole timeline.
    pub fn smooth(&mut self, frame: &IndicatorFrame, timeline: &RegimeTimeline) -> RegimeTimeline {
        self.reset();
        let labels = timeline
            .labels()
            .iter()
            .enumerate()
            .map(|(i, label)| {
                self.observe(i, label.as_ref());
                self.current.clone()
            })
            .collect();
        RegimeTimeline::from_labels(frame, labels)
    }
}
