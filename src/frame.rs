// =============================================================================
// OhlcvFrame — column-oriented OHLCV table with appended indicator columns
// =============================================================================
//
// The frame is the unit of exchange for the whole pipeline: a time-indexed
// table of open/high/low/close/volume vectors plus any number of named
// indicator columns appended by the computation unit.  Missing values are
// encoded as `f64::NAN`.
//
// Frames have value semantics.  Every computation clones its input and
// appends to the clone; caller-owned frames are never mutated in place.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV bar (oldest-first ordering is assumed everywhere).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One named indicator column, same length as the frame it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Column-oriented OHLCV table.
///
/// Invariants maintained by the constructors and mutators here:
/// - all price/volume vectors have the same length as `timestamps`;
/// - every indicator column has that same length (shorter series are
///   left-padded with NaN before insertion by the computation unit).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OhlcvFrame {
    pub timestamps: Vec<i64>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    columns: Vec<IndicatorColumn>,
}

impl OhlcvFrame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty frame with room for `capacity` bars.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(capacity),
            open: Vec::with_capacity(capacity),
            high: Vec::with_capacity(capacity),
            low: Vec::with_capacity(capacity),
            close: Vec::with_capacity(capacity),
            volume: Vec::with_capacity(capacity),
            columns: Vec::new(),
        }
    }

    /// Number of bars in the frame.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Append one bar.  Indicator columns are extended with NaN so the
    /// length invariant holds.
    pub fn push_bar(&mut self, bar: Bar) {
        self.timestamps.push(bar.timestamp);
        self.open.push(bar.open);
        self.high.push(bar.high);
        self.low.push(bar.low);
        self.close.push(bar.close);
        self.volume.push(bar.volume);
        for col in &mut self.columns {
            col.values.push(f64::NAN);
        }
    }

    /// The bar at `index`, or `None` when out of range.
    pub fn bar(&self, index: usize) -> Option<Bar> {
        if index >= self.len() {
            return None;
        }
        Some(Bar {
            timestamp: self.timestamps[index],
            open: self.open[index],
            high: self.high[index],
            low: self.low[index],
            close: self.close[index],
            volume: self.volume[index],
        })
    }

    // -------------------------------------------------------------------------
    // Indicator columns
    // -------------------------------------------------------------------------

    /// Insert or replace a named indicator column.
    ///
    /// Series shorter than the frame are left-padded with NaN (indicator
    /// warm-up); series longer than the frame are truncated from the front.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        let name = name.into();
        let aligned = align_to_len(values, self.len());
        if let Some(col) = self.columns.iter_mut().find(|c| c.name == name) {
            col.values = aligned;
        } else {
            self.columns.push(IndicatorColumn {
                name,
                values: aligned,
            });
        }
    }

    /// Borrow a named indicator column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Names of all indicator columns, in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Rename every indicator column through `rename`.  Used by the
    /// computation unit for per-timeframe column standardization.
    pub fn rename_columns(&mut self, mut rename: impl FnMut(&str) -> String) {
        for col in &mut self.columns {
            col.name = rename(&col.name);
        }
    }

    /// Drop all indicator columns, keeping the OHLCV data.
    pub fn clear_columns(&mut self) {
        self.columns.clear();
    }

    // -------------------------------------------------------------------------
    // Slicing and concatenation
    // -------------------------------------------------------------------------

    /// Copy out the bars (and column values) in `range`.
    ///
    /// Out-of-range bounds are clamped to the frame length.
    pub fn slice(&self, start: usize, end: usize) -> OhlcvFrame {
        let end = end.min(self.len());
        let start = start.min(end);
        OhlcvFrame {
            timestamps: self.timestamps[start..end].to_vec(),
            open: self.open[start..end].to_vec(),
            high: self.high[start..end].to_vec(),
            low: self.low[start..end].to_vec(),
            close: self.close[start..end].to_vec(),
            volume: self.volume[start..end].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| IndicatorColumn {
                    name: c.name.clone(),
                    values: c.values[start..end].to_vec(),
                })
                .collect(),
        }
    }

    /// The trailing `n` bars (the whole frame when `n >= len`).
    pub fn tail(&self, n: usize) -> OhlcvFrame {
        self.slice(self.len().saturating_sub(n), self.len())
    }

    /// Append all bars of `other`, matching indicator columns by name.
    ///
    /// A column present on only one side is NaN-filled for the rows it does
    /// not cover, so the length invariant survives ragged inputs (e.g. a
    /// chunk that failed to produce one of its columns).
    pub fn append(&mut self, other: &OhlcvFrame) {
        let old_len = self.len();
        self.timestamps.extend_from_slice(&other.timestamps);
        self.open.extend_from_slice(&other.open);
        self.high.extend_from_slice(&other.high);
        self.low.extend_from_slice(&other.low);
        self.close.extend_from_slice(&other.close);
        self.volume.extend_from_slice(&other.volume);
        let new_len = self.len();

        for col in &mut self.columns {
            match other.column(&col.name) {
                Some(values) => col.values.extend_from_slice(values),
                None => col.values.resize(new_len, f64::NAN),
            }
        }
        for other_col in &other.columns {
            if self.columns.iter().any(|c| c.name == other_col.name) {
                continue;
            }
            let mut values = vec![f64::NAN; old_len];
            values.extend_from_slice(&other_col.values);
            self.columns.push(IndicatorColumn {
                name: other_col.name.clone(),
                values,
            });
        }
    }

    // -------------------------------------------------------------------------
    // Derived views
    // -------------------------------------------------------------------------

    /// Number of finite (non-NaN, non-infinite) close values.
    pub fn valid_close_count(&self) -> usize {
        self.close.iter().filter(|v| v.is_finite()).count()
    }

    /// First and last bar timestamps as UTC datetimes; `None` when empty.
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = *self.timestamps.first()?;
        let last = *self.timestamps.last()?;
        let start = Utc.timestamp_millis_opt(first).single()?;
        let end = Utc.timestamp_millis_opt(last).single()?;
        Some((start, end))
    }
}

/// Left-pad with NaN (or truncate from the front) so `values.len() == len`.
fn align_to_len(mut values: Vec<f64>, len: usize) -> Vec<f64> {
    if values.len() == len {
        return values;
    }
    if values.len() > len {
        return values.split_off(values.len() - len);
    }
    let mut aligned = vec![f64::NAN; len - values.len()];
    aligned.append(&mut values);
    aligned
}
