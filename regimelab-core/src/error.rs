//! Configuration errors raised while loading and validating a catalog.

use thiserror::Error;

use crate::indicators::IndicatorError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failed to parse {format} document: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("{kind} id must not be empty")]
    EmptyId { kind: &'static str },

    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },

    #[error("indicator `{id}`: {source}")]
    Indicator {
        id: String,
        #[source]
        source: IndicatorError,
    },

    #[error("{context}: condition groups must not be empty")]
    EmptyGroup { context: String },

    #[error("{context}: {reason}")]
    InvalidCondition { context: String, reason: String },

    #[error("{context}: unknown indicator `{indicator}`")]
    UnknownIndicator { context: String, indicator: String },

    #[error("{context}: indicator `{indicator}` has no output `{field}`")]
    UnknownOutput {
        context: String,
        indicator: String,
        field: String,
    },

    #[error("strategy `{strategy}`: invalid risk field `{field}`: {reason}")]
    InvalidRisk {
        strategy: String,
        field: String,
        reason: String,
    },

    #[error("strategy set `{set}` references unknown strategy `{strategy}`")]
    UnknownStrategy { set: String, strategy: String },

    #[error("strategy set `{set}` must list at least one strategy")]
    EmptyStrategySet { set: String },

    #[error("strategy set `{set}`: invalid override `{target}.{key}`: {reason}")]
    InvalidOverride {
        set: String,
        target: String,
        key: String,
        reason: String,
    },

    #[error("routing rule {rule}: unknown regime `{regime}`")]
    UnknownRegime { rule: String, regime: String },

    #[error("routing rule {rule}: unknown strategy set `{set}`")]
    UnknownStrategySet { rule: String, set: String },

    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
