//! Look-ahead contamination tests for every indicator kind.
//!
//! Invariant: no indicator value at bar t may depend on data from bar t+1 or
//! later.
//!
//! Method: compute on a truncated series (bars 0..100) and the full series
//! (bars 0..200). Every output of bars 0..100 must be identical between both
//! runs. Any difference means the indicator leaks future data into the past.

use chrono::{Duration, NaiveDate};
use regimelab_core::indicators::IndicatorRegistry;
use regimelab_core::{Bar, IndicatorKind};

/// Generate N bars of synthetic OHLCV data with realistic variation.
fn make_test_bars(n: usize) -> Vec<Bar> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0;

    for i in 0..n {
        // Deterministic pseudo-random walk using a simple LCG
        let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
        let change = ((seed % 200) as f64 - 100.0) * 0.05;
        price += change;
        price = f64::max(price, 10.0);

        let open = price - 0.5;
        let close = price + 0.3;
        bars.push(Bar {
            timestamp: base + Duration::days(i as i64),
            open,
            high: open.max(close) + 2.0,
            low: open.min(close) - 2.0,
            close,
            volume: 1000.0 + (i as f64 * 100.0),
        });
    }

    bars
}

fn assert_no_lookahead(kind: IndicatorKind, full_bars: &[Bar], truncated_len: usize) {
    let registry = IndicatorRegistry::new();
    let full = registry.compute_kind(full_bars, &kind).unwrap();
    let truncated = registry
        .compute_kind(&full_bars[..truncated_len], &kind)
        .unwrap();

    assert_eq!(truncated.len(), truncated_len, "{kind}: truncated length mismatch");
    assert_eq!(full.len(), full_bars.len(), "{kind}: full length mismatch");

    for field in kind.outputs() {
        let t_series = truncated.get(field).unwrap();
        let f_series = full.get(field).unwrap();
        for i in 0..truncated_len {
            let (t, f) = (t_series[i], f_series[i]);
            if t.is_nan() && f.is_nan() {
                continue;
            }
            assert!(
                !t.is_nan() && !f.is_nan(),
                "{kind}.{field}: NaN mismatch at bar {i} (truncated={t}, full={f})"
            );
            assert!(
                (t - f).abs() < 1e-10,
                "{kind}.{field}: look-ahead contamination at bar {i}: truncated={t}, full={f}"
            );
        }
    }
}

/// Warm-up contract: each output is unavailable before its warm-up and
/// defined at it; the overall warm-up is the slowest output's.
fn assert_warmup_boundary(kind: IndicatorKind, bars: &[Bar]) {
    let out = IndicatorRegistry::new().compute_kind(bars, &kind).unwrap();
    let mut slowest = 0;
    for field in kind.outputs() {
        let w = out.warmup_of(field);
        slowest = slowest.max(w);
        for i in 0..w {
            assert_eq!(out.value(field, i), None, "{kind}.{field} defined during warm-up at {i}");
        }
        assert!(out.value(field, w).is_some(), "{kind}.{field} undefined at warm-up end {w}");
    }
    assert_eq!(out.warmup(), slowest, "{kind}: overall warm-up");
}

fn all_kinds() -> Vec<IndicatorKind> {
    vec![
        IndicatorKind::Sma { period: 10 },
        IndicatorKind::Ema { period: 20 },
        IndicatorKind::Rsi { period: 14 },
        IndicatorKind::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        },
        IndicatorKind::Stochastic {
            k_period: 14,
            d_period: 3,
        },
        IndicatorKind::Roc { period: 10 },
        IndicatorKind::Atr { period: 14 },
        IndicatorKind::Bollinger {
            period: 20,
            std_dev: 2.0,
        },
        IndicatorKind::Adx { period: 14 },
        IndicatorKind::Obv,
        IndicatorKind::VolumeSma { period: 20 },
    ]
}

#[test]
fn no_indicator_reads_future_bars() {
    let bars = make_test_bars(200);
    for kind in all_kinds() {
        assert_no_lookahead(kind, &bars, 100);
    }
}

#[test]
fn no_indicator_reads_future_bars_short_prefix() {
    let bars = make_test_bars(200);
    for kind in all_kinds() {
        assert_no_lookahead(kind, &bars, 30);
    }
}

#[test]
fn warmup_boundaries_hold_for_every_kind() {
    let bars = make_test_bars(120);
    for kind in all_kinds() {
        assert_warmup_boundary(kind, &bars);
    }
}

#[test]
fn repeated_runs_are_identical() {
    let bars = make_test_bars(150);
    let registry = IndicatorRegistry::new();
    for kind in all_kinds() {
        let a = registry.compute_kind(&bars, &kind).unwrap();
        let b = registry.compute_kind(&bars, &kind).unwrap();
        for field in kind.outputs() {
            let (x, y) = (a.get(field).unwrap(), b.get(field).unwrap());
            assert!(
                x.iter().zip(y).all(|(p, q)| p.to_bits() == q.to_bits()),
                "{kind}.{field} not deterministic"
            );
        }
    }
}
