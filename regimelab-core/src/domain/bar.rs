//! Bar and BarSeries - the market data units every component consumes.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV bar for a single symbol at a single timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLCV field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
    }

    /// Basic OHLCV sanity check: high bounds the body, low bounds the body,
    /// volume is non-negative.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.high >= self.low
            && self.volume >= 0.0
    }
}

/// Rejections raised while building a [`BarSeries`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("bar series symbol must not be empty")]
    EmptySymbol,
    #[error("timestamp at bar {index} ({timestamp}) is not after bar {prev_index} ({prev_timestamp})")]
    NonMonotonic {
        index: usize,
        timestamp: NaiveDateTime,
        prev_index: usize,
        prev_timestamp: NaiveDateTime,
    },
    #[error("duplicate timestamp {timestamp} at bar {index}")]
    DuplicateTimestamp {
        index: usize,
        timestamp: NaiveDateTime,
    },
    #[error("bar {index} at {timestamp} violates OHLCV invariants")]
    InsaneBar {
        index: usize,
        timestamp: NaiveDateTime,
    },
}

/// Ordered, validated sequence of bars for one symbol and timeframe.
///
/// The only constructor is [`BarSeries::new`], so every series in circulation
/// has strictly increasing timestamps and sane bars. Components rely on that
/// and never re-check it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarSeries {
    symbol: String,
    timeframe: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Validate and wrap a bar vector. Rejects instead of reordering.
    pub fn new(
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        bars: Vec<Bar>,
    ) -> Result<Self, BarError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(BarError::EmptySymbol);
        }

        for (i, bar) in bars.iter().enumerate() {
            if !bar.is_sane() {
                return Err(BarError::InsaneBar {
                    index: i,
                    timestamp: bar.timestamp,
                });
            }
            if i == 0 {
                continue;
            }
            let prev = &bars[i - 1];
            if bar.timestamp == prev.timestamp {
                return Err(BarError::DuplicateTimestamp {
                    index: i,
                    timestamp: bar.timestamp,
                });
            }
            if bar.timestamp < prev.timestamp {
                return Err(BarError::NonMonotonic {
                    index: i,
                    timestamp: bar.timestamp,
                    prev_index: i - 1,
                    prev_timestamp: prev.timestamp,
                });
            }
        }

        Ok(Self {
            symbol,
            timeframe: timeframe.into(),
            bars,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Sub-series over the bar index range `[start, end)`, clamped to bounds.
    ///
    /// Adjacent slices `slice(a, b)` and `slice(b, c)` concatenate to exactly
    /// `slice(a, c)`.
    pub fn slice(&self, start: usize, end: usize) -> BarSeries {
        let end = end.min(self.bars.len());
        let start = start.min(end);
        BarSeries {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            bars: self.bars[start..end].to_vec(),
        }
    }

    /// BLAKE3 content hash of the symbol, timeframe and bars in `[start, end)`.
    ///
    /// Used as the series identity for indicator memoization: two ranges with
    /// identical content hash identically regardless of where they came from.
    pub fn content_hash(&self, start: usize, end: usize) -> String {
        let end = end.min(self.bars.len());
        let start = start.min(end);
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.symbol.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.timeframe.as_bytes());
        for bar in &self.bars[start..end] {
            hasher.update(&bar.timestamp.and_utc().timestamp_millis().to_le_bytes());
            for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
                hasher.update(&v.to_bits().to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl<'de> Deserialize<'de> for BarSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            symbol: String,
            timeframe: String,
            bars: Vec<Bar>,
        }

        let raw = Raw::deserialize(deserializer)?;
        BarSeries::new(raw.symbol, raw.timeframe, raw.bars).map_err(serde::de::Error::custom)
    }
}
