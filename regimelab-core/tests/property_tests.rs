//! Property tests for core invariants.
//!
//! Uses proptest to verify:
//! 1. Evaluation purity: the same group and snapshot always give the same answer
//! 2. Group semantics: `all` implies `any`, unavailable operands are false
//! 3. Router first-match: the chosen rule is the lowest matching index
//! 4. Series validation: any non-increasing timestamp is rejected
//! 5. Slicing: adjacent slices concatenate back to the original series
//! 6. Indicators: nothing before warm-up, a value at warm-up, identical reruns

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use regimelab_core::{
    route, Bar, BarSeries, Condition, ConditionGroup, ConditionNode, IndicatorFrame,
    IndicatorKind, IndicatorOutputs, IndicatorRegistry, Operand, Operator, RegimeId, RegimeMatch,
    RouteOutcome, RoutingRule,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn bar_at(day: i64, close: f64) -> Bar {
    Bar {
        timestamp: base() + Duration::days(day),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000.0,
    }
}

fn series_from_closes(closes: &[f64]) -> BarSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| bar_at(i as i64, c))
        .collect();
    BarSeries::new("PROP", "1d", bars).unwrap()
}

/// Frame with three single-output indicators `a`, `b`, `c` taking the given
/// values at bar 0.
fn frame_with(values: [f64; 3]) -> IndicatorFrame {
    let series = series_from_closes(&[100.0]);
    let mut frame = IndicatorFrame::new(&series);
    for (id, v) in ["a", "b", "c"].into_iter().zip(values) {
        frame.insert(id, IndicatorOutputs::single(0, vec![v]));
    }
    frame
}

const REGIMES: [&str; 4] = ["trend", "range", "volatile", "quiet"];

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => -100.0..100.0_f64,
        1 => Just(f64::NAN),
    ]
}

fn arb_operand() -> impl Strategy<Value = Operand> {
    prop_oneof![
        prop::sample::select(vec!["a", "b", "c", "missing"]).prop_map(Operand::indicator),
        (-100.0..100.0_f64).prop_map(Operand::Constant),
    ]
}

fn arb_condition() -> impl Strategy<Value = Condition> {
    let scalar = (
        arb_operand(),
        prop::sample::select(vec![Operator::Gt, Operator::Lt, Operator::Eq]),
        arb_operand(),
    )
        .prop_map(|(l, op, r)| Condition::new(l, op, r));
    let between = (arb_operand(), -100.0..0.0_f64, 0.0..100.0_f64).prop_map(|(l, min, max)| {
        Condition::new(l, Operator::Between, Operand::Range { min, max })
    });
    prop_oneof![3 => scalar, 1 => between]
}

fn arb_group() -> impl Strategy<Value = ConditionGroup> {
    let leaf = prop::collection::vec(arb_condition().prop_map(ConditionNode::from), 1..4)
        .prop_map(ConditionGroup::All);
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop::collection::vec(
            prop_oneof![
                arb_condition().prop_map(ConditionNode::from),
                inner.prop_map(ConditionNode::from),
            ],
            1..4,
        )
        .prop_flat_map(|nodes| {
            prop_oneof![
                Just(ConditionGroup::All(nodes.clone())),
                Just(ConditionGroup::Any(nodes)),
            ]
        })
    })
}

fn arb_regime_set() -> impl Strategy<Value = Vec<RegimeId>> {
    prop::sample::subsequence(REGIMES.to_vec(), 0..=REGIMES.len())
        .prop_map(|ids| ids.into_iter().map(RegimeId::from).collect())
}

fn arb_rule() -> impl Strategy<Value = RoutingRule> {
    (arb_regime_set(), arb_regime_set(), arb_regime_set(), 0..5usize).prop_map(
        |(all_of, any_of, none_of, set)| RoutingRule {
            name: None,
            when: RegimeMatch {
                all_of,
                any_of,
                none_of,
            },
            strategy_set: format!("set_{set}").into(),
        },
    )
}

// ── 1–2. Evaluator ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn evaluation_is_pure(group in arb_group(), values in [arb_value(), arb_value(), arb_value()]) {
        let frame = frame_with(values);
        let snapshot = frame.snapshot(0);
        let first = group.evaluate(&snapshot);
        for _ in 0..3 {
            prop_assert_eq!(group.evaluate(&snapshot), first);
        }
    }

    #[test]
    fn all_implies_any(
        conditions in prop::collection::vec(arb_condition(), 1..5),
        values in [arb_value(), arb_value(), arb_value()],
    ) {
        let frame = frame_with(values);
        let snapshot = frame.snapshot(0);
        let nodes: Vec<ConditionNode> = conditions.into_iter().map(ConditionNode::from).collect();
        let all = ConditionGroup::All(nodes.clone()).evaluate(&snapshot);
        let any = ConditionGroup::Any(nodes.clone()).evaluate(&snapshot);
        if all {
            prop_assert!(any);
        }
        prop_assert_eq!(all, nodes.iter().all(|n| n.evaluate(&snapshot)));
        prop_assert_eq!(any, nodes.iter().any(|n| n.evaluate(&snapshot)));
    }

    /// No operator holds when either side is unavailable.
    #[test]
    fn unavailable_operand_is_false(
        op in prop::sample::select(vec![Operator::Gt, Operator::Lt, Operator::Eq]),
        constant in -100.0..100.0_f64,
        nan_left in any::<bool>(),
    ) {
        let frame = frame_with([f64::NAN, 1.0, 2.0]);
        let snapshot = frame.snapshot(0);
        let (left, right) = if nan_left {
            (Operand::indicator("a"), Operand::Constant(constant))
        } else {
            (Operand::Constant(constant), Operand::indicator("missing"))
        };
        prop_assert!(!Condition::new(left, op, right).evaluate(&snapshot));
    }

    /// Gt and Lt never both hold; Eq excludes both beyond tolerance.
    #[test]
    fn comparison_trichotomy(x in -1e6..1e6_f64, y in -1e6..1e6_f64) {
        let frame = frame_with([x, y, 0.0]);
        let snapshot = frame.snapshot(0);
        let check = |op| {
            Condition::new(Operand::indicator("a"), op, Operand::indicator("b")).evaluate(&snapshot)
        };
        let (gt, lt, eq) = (check(Operator::Gt), check(Operator::Lt), check(Operator::Eq));
        prop_assert!(!(gt && lt));
        prop_assert!(gt || lt || eq);
        prop_assert_eq!(gt, x > y);
        prop_assert_eq!(lt, x < y);
    }
}

// ── 3. Router ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn router_picks_lowest_matching_rule(
        rules in prop::collection::vec(arb_rule(), 0..8),
        active in arb_regime_set(),
    ) {
        let expected = rules.iter().position(|r| r.when.matches(&active));
        match route(&active, &rules) {
            RouteOutcome::Matched { rule_index, strategy_set } => {
                prop_assert_eq!(Some(rule_index), expected);
                prop_assert_eq!(&strategy_set, &rules[rule_index].strategy_set);
            }
            RouteOutcome::NoMatch => prop_assert_eq!(expected, None),
        }
    }

    /// A trailing unconditional rule is chosen exactly when nothing before it matches.
    #[test]
    fn trailing_default_rule_catches_the_rest(
        mut rules in prop::collection::vec(arb_rule(), 0..6),
        active in arb_regime_set(),
    ) {
        let earlier_match = rules.iter().any(|r| r.when.matches(&active));
        rules.push(RoutingRule {
            name: Some("default".into()),
            when: RegimeMatch::default(),
            strategy_set: "fallback".into(),
        });
        let default_index = rules.len() - 1;

        match route(&active, &rules) {
            RouteOutcome::Matched { rule_index, .. } => {
                prop_assert_eq!(rule_index == default_index, !earlier_match);
            }
            RouteOutcome::NoMatch => prop_assert!(false, "default rule must always match"),
        }
    }

    #[test]
    fn none_of_vetoes(active in arb_regime_set()) {
        prop_assume!(!active.is_empty());
        let when = RegimeMatch {
            all_of: vec![],
            any_of: vec![],
            none_of: vec![active[0].clone()],
        };
        prop_assert!(!when.matches(&active));
    }
}

// ── 4–5. Bar series ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn non_increasing_timestamps_are_rejected(
        len in 2..40usize,
        at in 1..40usize,
        back in 0..3i64,
    ) {
        let at = at % len;
        prop_assume!(at >= 1);
        let mut bars: Vec<Bar> = (0..len).map(|i| bar_at(i as i64 * 2, 100.0)).collect();
        // Move bar `at` to or before its predecessor
        bars[at].timestamp = bars[at - 1].timestamp - Duration::days(back);
        prop_assert!(BarSeries::new("PROP", "1d", bars).is_err());
    }

    #[test]
    fn adjacent_slices_concatenate(
        closes in prop::collection::vec(10.0..500.0_f64, 1..80),
        cut in 0..100usize,
    ) {
        let series = series_from_closes(&closes);
        let cut = cut % (series.len() + 1);
        let head = series.slice(0, cut);
        let tail = series.slice(cut, series.len());

        prop_assert_eq!(head.len() + tail.len(), series.len());
        let joined: Vec<Bar> = head.bars().iter().chain(tail.bars()).cloned().collect();
        prop_assert_eq!(joined.as_slice(), series.bars());
        prop_assert_eq!(head.symbol(), series.symbol());
        prop_assert_eq!(
            series.content_hash(0, series.len()),
            series.slice(0, series.len()).content_hash(0, series.len())
        );
    }
}

// ── 6. Indicators ────────────────────────────────────────────────────

fn arb_kind() -> impl Strategy<Value = IndicatorKind> {
    prop_oneof![
        (1..30usize).prop_map(|period| IndicatorKind::Sma { period }),
        (1..30usize).prop_map(|period| IndicatorKind::Ema { period }),
        (1..30usize).prop_map(|period| IndicatorKind::Rsi { period }),
        (1..30usize).prop_map(|period| IndicatorKind::Roc { period }),
        (1..30usize).prop_map(|period| IndicatorKind::Atr { period }),
        (2..20usize).prop_map(|period| IndicatorKind::Adx { period }),
        (1..30usize).prop_map(|period| IndicatorKind::VolumeSma { period }),
        Just(IndicatorKind::Obv),
        (2..10usize, 11..30usize, 1..10usize)
            .prop_map(|(fast, slow, signal)| IndicatorKind::Macd { fast, slow, signal }),
        (1..20usize, 1..6usize)
            .prop_map(|(k_period, d_period)| IndicatorKind::Stochastic { k_period, d_period }),
        (2..30usize, 0.5..3.0_f64)
            .prop_map(|(period, std_dev)| IndicatorKind::Bollinger { period, std_dev }),
    ]
}

/// Random walk with a real range on every bar.
fn arb_walk() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec(-0.02..0.02_f64, 1..120).prop_map(|steps| {
        let mut close = 100.0;
        steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let open = close;
                close *= 1.0 + step;
                Bar {
                    timestamp: base() + Duration::days(i as i64),
                    open,
                    high: open.max(close) + 0.5 + step.abs() * 10.0,
                    low: open.min(close) - 0.5,
                    close,
                    volume: 1_000.0 + (i % 9) as f64 * 100.0,
                }
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn warmup_boundary_and_determinism(kind in arb_kind(), bars in arb_walk()) {
        let registry = IndicatorRegistry::default();
        let first = registry.compute_kind(&bars, &kind).unwrap();
        let second = registry.compute_kind(&bars, &kind).unwrap();
        prop_assert_eq!(first.len(), bars.len());

        for field in kind.outputs() {
            let warmup = first.warmup_of(field);
            for i in 0..warmup.min(bars.len()) {
                prop_assert_eq!(first.value(field, i), None, "{} {} at {}", kind, field, i);
            }
            if warmup < bars.len() {
                prop_assert!(first.value(field, warmup).is_some(), "{} {} at warm-up", kind, field);
            }
            let a = first.get(field).unwrap();
            let b = second.get(field).unwrap();
            for (x, y) in a.iter().zip(b) {
                prop_assert!(x.to_bits() == y.to_bits());
            }
        }
    }
}
