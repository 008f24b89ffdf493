use crate::error::MetricsError;
use crate::ingest::table::InteractionTable;
use crate::ingest::timestamp::TimestampParser;
use crate::query::result::{guarded_ratio, round_to, SessionMetricsRow, SessionMetricsTable};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

pub const DEFAULT_ROUND_DECIMALS: u32 = 2;

/// Knobs shared by every engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsOptions {
    pub round_decimals: u32,
    pub parser: TimestampParser,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            round_decimals: DEFAULT_ROUND_DECIMALS,
            parser: TimestampParser::default(),
        }
    }
}

/// Running min/max/count/sum for one session.
#[derive(Debug, Clone, Copy)]
struct SessionAccumulator {
    first: NaiveDateTime,
    last: NaiveDateTime,
    interactions: u64,
    cart_additions: f64,
}

impl SessionAccumulator {
    const fn new(ts: NaiveDateTime) -> Self {
        Self {
            first: ts,
            last: ts,
            interactions: 0,
            cart_additions: 0.0,
        }
    }

    fn record(&mut self, ts: NaiveDateTime, cart_flag: f64) {
        self.first = self.first.min(ts);
        self.last = self.last.max(ts);
        self.interactions += 1;
        self.cart_additions += cart_flag;
    }
}

/// Elapsed seconds between two instants, at microsecond resolution.
///
/// Spans too large for a microsecond count fall back to milliseconds.
#[allow(clippy::cast_precision_loss)]
pub fn span_seconds(first: NaiveDateTime, last: NaiveDateTime) -> f64 {
    let span = last - first;
    span.num_microseconds().map_or_else(
        || span.num_milliseconds() as f64 / 1_000.0,
        |us| us as f64 / 1_000_000.0,
    )
}

/// Per-session metrics for `user_id` with the default options.
pub fn compute(
    table: &InteractionTable,
    user_id: i64,
) -> Result<SessionMetricsTable, MetricsError> {
    compute_with(table, user_id, &MetricsOptions::default())
}

/// Per-session duration and cart-addition ratio for one user.
///
/// Rows with an unparsable timestamp are dropped before grouping, so a session
/// made only of such rows does not appear. Unknown users yield an empty table.
/// Only a structurally broken table is an error.
pub fn compute_with(
    table: &InteractionTable,
    user_id: i64,
    options: &MetricsOptions,
) -> Result<SessionMetricsTable, MetricsError> {
    let view = table.view()?;
    let rows = view.rows_for_user(user_id);

    if rows.is_empty() {
        tracing::debug!(user_id, "No interactions for user");
        return Ok(SessionMetricsTable::empty());
    }

    let mut sessions: BTreeMap<i64, SessionAccumulator> = BTreeMap::new();
    let mut invalid_timestamps = 0usize;

    for &row in &rows {
        let Some(ts) = view.timestamp(row, &options.parser).instant() else {
            invalid_timestamps += 1;
            continue;
        };
        // Rows without a session key cannot be grouped.
        let Some(session_id) = view.session_id(row) else {
            continue;
        };
        sessions
            .entry(session_id)
            .or_insert_with(|| SessionAccumulator::new(ts))
            .record(ts, view.cart_flag(row));
    }

    let metrics: Vec<SessionMetricsRow> = sessions
        .into_iter()
        .map(|(session_id, acc)| SessionMetricsRow {
            user_id,
            session_id,
            total_session_time: round_to(
                span_seconds(acc.first, acc.last),
                options.round_decimals,
            ),
            cart_addition_ratio: round_to(
                guarded_ratio(acc.cart_additions, acc.interactions),
                options.round_decimals,
            ),
        })
        .collect();

    tracing::debug!(
        user_id,
        rows = rows.len(),
        invalid_timestamps,
        sessions = metrics.len(),
        "Computed session metrics"
    );

    Ok(SessionMetricsTable::from_rows(metrics))
}
