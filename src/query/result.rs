use serde::{Deserialize, Serialize};

/// Output columns, in contractual order.
pub const COLUMNS: [&str; 4] = [
    "user_id",
    "session_id",
    "total_session_time",
    "cart_addition_ratio",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
}

pub const COLUMN_TYPES: [ColumnType; 4] = [
    ColumnType::Int,
    ColumnType::Int,
    ColumnType::Float,
    ColumnType::Float,
];

/// Metrics for one session. Field order matches [`COLUMNS`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionMetricsRow {
    pub user_id: i64,
    pub session_id: i64,
    pub total_session_time: f64,
    pub cart_addition_ratio: f64,
}

/// One row per session, sorted by `(user_id, session_id)`.
///
/// An empty table still reports the full column set through [`Self::columns`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SessionMetricsTable {
    rows: Vec<SessionMetricsRow>,
}

impl SessionMetricsTable {
    pub const fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn from_rows(mut rows: Vec<SessionMetricsRow>) -> Self {
        rows.sort_by_key(|r| (r.user_id, r.session_id));
        Self { rows }
    }

    pub const fn columns(&self) -> &'static [&'static str; 4] {
        &COLUMNS
    }

    pub const fn column_types(&self) -> &'static [ColumnType; 4] {
        &COLUMN_TYPES
    }

    pub fn rows(&self) -> &[SessionMetricsRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<SessionMetricsRow> {
        self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SessionMetricsRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<'a> IntoIterator for &'a SessionMetricsTable {
    type Item = &'a SessionMetricsRow;
    type IntoIter = std::slice::Iter<'a, SessionMetricsRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Decimal places are capped here; beyond this `f64` has nothing left to round.
const MAX_DECIMALS: u32 = 15;

/// Round half-to-even at `decimals` places. Non-finite input becomes 0.0.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(i32::try_from(decimals.min(MAX_DECIMALS)).unwrap_or(0));
    (value * factor).round_ties_even() / factor
}

/// `numerator / denominator`, or 0.0 when the denominator is zero.
#[allow(clippy::cast_precision_loss)]
pub fn guarded_ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}
