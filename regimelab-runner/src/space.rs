//! Candidate parameter spaces and their enumeration.
//!
//! A [`CandidateSpace`] names an indicator type, a [`ParamRange`] per swept
//! parameter and any fixed parameters. Enumeration takes the cartesian
//! product of the ranges in parameter-name order.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use regimelab_core::IndicatorKind;

use crate::config::SearchMode;
use crate::optimizer::OptimizerError;

/// Upper bound on the points one range may expand to.
pub const MAX_RANGE_POINTS: usize = 100_000;

/// Upper bound on the raw grid points of one space.
pub const MAX_GRID_POINTS: usize = 1_000_000;

/// Inclusive `[min, max]` range walked in `step` increments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParamRange {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    /// Range holding a single value.
    pub fn fixed(value: f64) -> Self {
        Self {
            min: value,
            max: value,
            step: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.min.is_finite() && self.max.is_finite() && self.step.is_finite()) {
            return Err("bounds and step must be finite".into());
        }
        if self.min > self.max {
            return Err(format!("min {} exceeds max {}", self.min, self.max));
        }
        if self.step <= 0.0 {
            return Err("step must be positive".into());
        }
        if (self.max - self.min) / self.step >= MAX_RANGE_POINTS as f64 {
            return Err(format!("expands to more than {MAX_RANGE_POINTS} points"));
        }
        Ok(())
    }

    /// Grid points `min + k * step` for `k = 0, 1, ...` while `<= max`.
    ///
    /// Each point is computed from its index, so float steps do not drift.
    pub fn values(&self) -> Vec<f64> {
        let tolerance = 1e-9 * self.max.abs().max(1.0);
        let mut out = Vec::new();
        for k in 0..MAX_RANGE_POINTS {
            let v = self.min + k as f64 * self.step;
            if v > self.max + tolerance {
                break;
            }
            out.push(v);
        }
        out
    }
}

/// One concrete parameter assignment of one indicator type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationCandidate {
    pub kind: IndicatorKind,
}

impl OptimizationCandidate {
    pub fn new(kind: IndicatorKind) -> Self {
        Self { kind }
    }

    /// Stable display label, e.g. `rsi(period=14)`.
    pub fn label(&self) -> String {
        self.kind.to_string()
    }
}

/// Parameter space of one indicator type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateSpace {
    /// Indicator type tag (`rsi`, `macd`, or a custom indicator name).
    pub indicator: String,
    #[serde(default)]
    pub ranges: BTreeMap<String, ParamRange>,
    #[serde(default)]
    pub fixed: BTreeMap<String, f64>,
}

/// Outcome of enumerating one or more spaces.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub candidates: Vec<OptimizationCandidate>,
    /// Grid points dropped because the parameter combination is invalid,
    /// e.g. a MACD fast period not below the slow one.
    pub invalid_combinations: usize,
}

impl CandidateSpace {
    pub fn new(indicator: impl Into<String>) -> Self {
        Self {
            indicator: indicator.into(),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, param: impl Into<String>, range: ParamRange) -> Self {
        self.ranges.insert(param.into(), range);
        self
    }

    pub fn with_fixed(mut self, param: impl Into<String>, value: f64) -> Self {
        self.fixed.insert(param.into(), value);
        self
    }

    /// Number of raw grid points before validation and de-duplication,
    /// `None` when the product overflows `usize`.
    pub fn grid_size(&self) -> Option<usize> {
        self.ranges
            .values()
            .try_fold(1usize, |total, r| total.checked_mul(r.values().len()))
    }

    /// Every valid candidate in the space.
    ///
    /// Integer parameters are rounded to the nearest whole number; candidates
    /// that collapse onto the same assignment are kept once.
    pub fn enumerate(&self) -> Result<Enumeration, OptimizerError> {
        let base = IndicatorKind::from_params(&self.indicator, &self.fixed).map_err(|source| {
            OptimizerError::Indicator {
                candidate: self.indicator.clone(),
                source,
            }
        })?;

        let mut axes: Vec<(&str, Vec<f64>)> = Vec::with_capacity(self.ranges.len());
        for (param, range) in &self.ranges {
            let invalid = |reason: String| OptimizerError::InvalidRange {
                indicator: self.indicator.clone(),
                param: param.clone(),
                reason,
            };
            range.validate().map_err(invalid)?;
            let integer = base.is_integer_param(param);
            if integer && range.min < 0.0 {
                return Err(invalid("integer parameter cannot be negative".into()));
            }
            let values = range
                .values()
                .into_iter()
                .map(|v| if integer { v.round() } else { v })
                .collect();
            axes.push((param.as_str(), values));
        }

        let points = axes
            .iter()
            .try_fold(1usize, |total, (_, values)| total.checked_mul(values.len()));
        if !points.is_some_and(|p| p <= MAX_GRID_POINTS) {
            return Err(OptimizerError::GridTooLarge {
                indicator: self.indicator.clone(),
                max: MAX_GRID_POINTS,
            });
        }

        let mut out = Enumeration::default();
        let mut seen = BTreeSet::new();
        let mut cursor = vec![0usize; axes.len()];
        loop {
            let mut kind = base.clone();
            for ((param, values), &i) in axes.iter().zip(&cursor) {
                kind = kind.with_param(param, values[i]).map_err(|source| {
                    OptimizerError::Indicator {
                        candidate: self.indicator.clone(),
                        source,
                    }
                })?;
            }

            if kind.validate().is_err() {
                out.invalid_combinations += 1;
            } else if seen.insert(kind.to_string()) {
                out.candidates.push(OptimizationCandidate::new(kind));
            }

            if !advance(&mut cursor, &axes) {
                break;
            }
        }
        Ok(out)
    }
}

/// Odometer step over the axes, last axis fastest. False once exhausted.
fn advance(cursor: &mut [usize], axes: &[(&str, Vec<f64>)]) -> bool {
    for pos in (0..cursor.len()).rev() {
        cursor[pos] += 1;
        if cursor[pos] < axes[pos].1.len() {
            return true;
        }
        cursor[pos] = 0;
    }
    false
}

/// Enumerate every space, then apply the search mode.
///
/// Random search draws a seeded subset of the full grid and keeps it in grid
/// order, so the same seed always yields the same candidates.
pub fn enumerate_spaces(
    spaces: &[CandidateSpace],
    search: SearchMode,
) -> Result<Enumeration, OptimizerError> {
    if spaces.is_empty() {
        return Err(OptimizerError::EmptySpace);
    }

    let mut all = Enumeration::default();
    let mut seen = BTreeSet::new();
    for space in spaces {
        let e = space.enumerate()?;
        all.invalid_combinations += e.invalid_combinations;
        for candidate in e.candidates {
            if seen.insert(candidate.label()) {
                all.candidates.push(candidate);
            }
        }
    }

    if all.candidates.is_empty() {
        return Err(OptimizerError::EmptySpace);
    }

    if let SearchMode::Random { samples, seed } = search {
        if samples < all.candidates.len() {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut picked = rand::seq::index::sample(&mut rng, all.candidates.len(), samples)
                .into_vec();
            picked.sort_unstable();
            all.candidates = picked
                .into_iter()
                .map(|i| all.candidates[i].clone())
                .collect();
        }
    }

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_steps_accumulate_by_index() {
        let values = ParamRange::new(0.1, 0.5, 0.1).values();
        assert_eq!(values.len(), 5);
        assert!((values[4] - 0.5).abs() < 1e-12);
        assert!((values[2] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn range_endpoint_excluded_when_step_overshoots() {
        assert_eq!(ParamRange::new(10.0, 20.0, 4.0).values(), vec![10.0, 14.0, 18.0]);
    }

    #[test]
    fn degenerate_range_has_one_point() {
        assert_eq!(ParamRange::fixed(14.0).values(), vec![14.0]);
    }

    #[test]
    fn invalid_ranges_rejected() {
        assert!(ParamRange::new(5.0, 1.0, 1.0).validate().is_err());
        assert!(ParamRange::new(1.0, 5.0, 0.0).validate().is_err());
        assert!(ParamRange::new(1.0, f64::NAN, 1.0).validate().is_err());
        assert!(ParamRange::new(0.0, 1e9, 1.0).validate().is_err());
    }

    #[test]
    fn rsi_grid() {
        let space = CandidateSpace::new("rsi").with_range("period", ParamRange::new(10.0, 20.0, 5.0));
        assert_eq!(space.grid_size(), Some(3));
        let e = space.enumerate().unwrap();
        let labels: Vec<String> = e.candidates.iter().map(|c| c.label()).collect();
        assert_eq!(labels, ["rsi(period=10)", "rsi(period=15)", "rsi(period=20)"]);
        assert_eq!(e.invalid_combinations, 0);
    }

    #[test]
    fn integer_params_round_and_dedupe() {
        let space = CandidateSpace::new("sma").with_range("period", ParamRange::new(10.0, 11.0, 0.25));
        let e = space.enumerate().unwrap();
        // 10, 10.25→10, 10.5→11 (round half away from zero), 10.75→11, 11
        let periods: Vec<_> = e
            .candidates
            .iter()
            .map(|c| c.kind.clone())
            .collect();
        assert_eq!(
            periods,
            vec![IndicatorKind::Sma { period: 10 }, IndicatorKind::Sma { period: 11 }]
        );
    }

    #[test]
    fn float_params_keep_fraction() {
        let space = CandidateSpace::new("bollinger")
            .with_fixed("period", 20.0)
            .with_range("std_dev", ParamRange::new(1.5, 2.5, 0.5));
        let e = space.enumerate().unwrap();
        assert_eq!(e.candidates.len(), 3);
        assert_eq!(
            e.candidates[0].kind,
            IndicatorKind::Bollinger {
                period: 20,
                std_dev: 1.5
            }
        );
    }

    #[test]
    fn invalid_combinations_counted_not_emitted() {
        let space = CandidateSpace::new("macd")
            .with_range("fast", ParamRange::new(10.0, 30.0, 10.0))
            .with_range("slow", ParamRange::new(20.0, 30.0, 10.0));
        let e = space.enumerate().unwrap();
        // fast/slow pairs: (10,20) (10,30) (20,20)x (20,30) (30,20)x (30,30)x
        assert_eq!(e.candidates.len(), 3);
        assert_eq!(e.invalid_combinations, 3);
    }

    #[test]
    fn unknown_param_is_an_error() {
        let space = CandidateSpace::new("rsi").with_range("length", ParamRange::fixed(14.0));
        assert!(matches!(
            space.enumerate(),
            Err(OptimizerError::Indicator { .. })
        ));
    }

    #[test]
    fn negative_integer_range_is_an_error() {
        let space = CandidateSpace::new("ema").with_range("period", ParamRange::new(-5.0, 5.0, 5.0));
        assert!(matches!(
            space.enumerate(),
            Err(OptimizerError::InvalidRange { .. })
        ));
    }

    #[test]
    fn custom_space_uses_free_params() {
        let space = CandidateSpace::new("zscore").with_range("lookback", ParamRange::new(5.0, 6.0, 0.5));
        let e = space.enumerate().unwrap();
        assert_eq!(e.candidates.len(), 3);
        assert_eq!(e.candidates[1].label(), "zscore(lookback=5.5)");
    }

    #[test]
    fn oversized_grids_are_rejected_before_expansion() {
        let wide = ParamRange::new(0.0, 89_999.0, 1.0);
        let two_axes = CandidateSpace::new("zscore")
            .with_range("a", wide)
            .with_range("b", wide);
        assert_eq!(two_axes.grid_size(), Some(90_000 * 90_000));
        assert!(matches!(
            two_axes.enumerate(),
            Err(OptimizerError::GridTooLarge { max: MAX_GRID_POINTS, .. })
        ));

        // 90_000^4 does not fit in a usize
        let four_axes = two_axes.with_range("c", wide).with_range("d", wide);
        assert_eq!(four_axes.grid_size(), None);
        assert!(matches!(
            enumerate_spaces(&[four_axes], SearchMode::Grid),
            Err(OptimizerError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn no_spaces_is_an_error() {
        assert!(matches!(
            enumerate_spaces(&[], SearchMode::Grid),
            Err(OptimizerError::EmptySpace)
        ));
    }

    #[test]
    fn fully_invalid_space_is_an_error() {
        let space = CandidateSpace::new("macd")
            .with_fixed("fast", 30.0)
            .with_fixed("slow", 10.0);
        assert!(matches!(
            enumerate_spaces(&[space], SearchMode::Grid),
            Err(OptimizerError::EmptySpace)
        ));
    }

    #[test]
    fn random_search_is_seeded_subset_in_grid_order() {
        let spaces = [CandidateSpace::new("rsi").with_range("period", ParamRange::new(2.0, 50.0, 1.0))];
        let full = enumerate_spaces(&spaces, SearchMode::Grid).unwrap();
        let search = SearchMode::Random {
            samples: 10,
            seed: 7,
        };
        let a = enumerate_spaces(&spaces, search).unwrap();
        let b = enumerate_spaces(&spaces, search).unwrap();

        assert_eq!(full.candidates.len(), 49);
        assert_eq!(a.candidates.len(), 10);
        assert_eq!(a.candidates, b.candidates);

        let positions: Vec<usize> = a
            .candidates
            .iter()
            .map(|c| full.candidates.iter().position(|f| f == c).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn random_search_larger_than_grid_keeps_everything() {
        let spaces = [CandidateSpace::new("roc").with_range("period", ParamRange::new(5.0, 7.0, 1.0))];
        let e = enumerate_spaces(
            &spaces,
            SearchMode::Random {
                samples: 100,
                seed: 1,
            },
        )
        .unwrap();
        assert_eq!(e.candidates.len(), 3);
    }

    #[test]
    fn spaces_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            spaces: Vec<CandidateSpace>,
        }
        let doc: Doc = toml::from_str(
            r#"
            [[spaces]]
            indicator = "stochastic"
            fixed = { d_period = 3 }
            ranges = { k_period = { min = 5, max = 21, step = 8 } }
            "#,
        )
        .unwrap();
        let e = doc.spaces[0].enumerate().unwrap();
        assert_eq!(e.candidates.len(), 3);
        assert_eq!(
            e.candidates[2].kind,
            IndicatorKind::Stochastic {
                k_period: 21,
                d_period: 3
            }
        );
    }
}
