//! RegimeLab Runner: regime-aware parameter optimization and walk-forward
//! validation.
//!
//! This crate builds on `regimelab-core` to provide:
//! - Candidate parameter spaces with grid and seeded random search
//! - Per-indicator signal rules for entry and exit testing
//! - Next-bar signal scoring with a weighted 0-100 composite
//! - A regime-partitioned optimizer with a degeneracy gate
//! - Rolling walk-forward validation with a ROBUST / NOT_ROBUST verdict

pub mod config;
pub mod metrics;
pub mod optimizer;
pub mod scoring;
pub mod signals;
pub mod space;
pub mod walk_forward;

pub use config::{
    OptimizerConfig, ScoreWeights, SearchMode, SettingError, Side, SignalThresholds, TestMode,
};
pub use metrics::SignalMetrics;
pub use optimizer::{
    best_per_regime, optimize, optimize_candidates, score_candidate, score_candidate_from,
    DegeneracySummary, OptimizationReport, OptimizationResult, OptimizerError, RunContext,
    RunStatus,
};
pub use scoring::{PairScore, Rejection};
pub use signals::{generate_signals, Bias};
pub use space::{enumerate_spaces, CandidateSpace, OptimizationCandidate, ParamRange};
pub use walk_forward::{
    create_folds, run_walk_forward, FailedCriterion, FoldResult, FoldSpec, RobustnessVerdict,
    Verdict, WalkForwardAggregate, WalkForwardConfig, WalkForwardError, WalkForwardReport,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<OptimizerConfig>();
        assert_sync::<OptimizerConfig>();
        assert_send::<WalkForwardConfig>();
        assert_sync::<WalkForwardConfig>();
    }

    #[test]
    fn run_context_is_send_sync() {
        assert_send::<RunContext<'static>>();
        assert_sync::<RunContext<'static>>();
    }

    #[test]
    fn candidate_is_send_sync() {
        assert_send::<OptimizationCandidate>();
        assert_sync::<OptimizationCandidate>();
        assert_send::<CandidateSpace>();
        assert_sync::<CandidateSpace>();
    }

    #[test]
    fn optimization_report_is_send_sync() {
        assert_send::<OptimizationReport>();
        assert_sync::<OptimizationReport>();
    }

    #[test]
    fn walk_forward_report_is_send_sync() {
        assert_send::<WalkForwardReport>();
        assert_sync::<WalkForwardReport>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<OptimizerError>();
        assert_sync::<OptimizerError>();
        assert_send::<WalkForwardError>();
        assert_sync::<WalkForwardError>();
    }
}
