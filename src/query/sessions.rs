use crate::error::MetricsError;
use crate::ingest::table::InteractionTable;
use crate::query::aggregate::{span_seconds, MetricsOptions};
use crate::query::result::{round_to, SessionMetricsRow, SessionMetricsTable};
use crate::storage::{schema, staging};
use chrono::{DateTime, NaiveDateTime};
use duckdb::Connection;
use parking_lot::Mutex;
use std::sync::Arc;

/// Raw per-session aggregates as returned by SQL, before rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionAggregate {
    pub session_id: i64,
    /// Earliest staged instant, microseconds since the Unix epoch.
    pub first_micros: i64,
    /// Latest staged instant, microseconds since the Unix epoch.
    pub last_micros: i64,
    pub ratio: f64,
}

impl SessionAggregate {
    /// Elapsed seconds between the first and last instant.
    pub fn span_seconds(&self) -> f64 {
        match (micros_to_instant(self.first_micros), micros_to_instant(self.last_micros)) {
            (Some(first), Some(last)) => span_seconds(first, last),
            _ => 0.0,
        }
    }
}

fn micros_to_instant(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

/// Aggregate the staged rows of `user_id` by session.
///
/// Bounds come back as epoch microseconds so the span is computed by the same
/// code as the in-memory engine. The ratio is already guarded against zero
/// interaction counts.
pub fn query_session_aggregates(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<SessionAggregate>, duckdb::Error> {
    let sql = r"
        WITH valid AS (
            SELECT session_id, ts_micros, cart_flag
            FROM temp.session_interactions
            WHERE user_id = ? AND ts_micros IS NOT NULL AND session_id IS NOT NULL
        ),
        durations AS (
            SELECT
                session_id,
                MIN(ts_micros) AS first_micros,
                MAX(ts_micros) AS last_micros
            FROM valid
            GROUP BY session_id
        ),
        ratios AS (
            SELECT
                session_id,
                COUNT(*) AS total_interactions,
                COALESCE(SUM(cart_flag), 0.0) AS cart_additions
            FROM valid
            GROUP BY session_id
        )
        SELECT
            d.session_id,
            d.first_micros,
            d.last_micros,
            COALESCE(r.cart_additions / NULLIF(r.total_interactions, 0), 0.0) AS ratio
        FROM durations d
        JOIN ratios r ON d.session_id = r.session_id
        ORDER BY d.session_id
    ";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(duckdb::params![user_id], |row| {
        Ok(SessionAggregate {
            session_id: row.get(0)?,
            first_micros: row.get(1)?,
            last_micros: row.get(2)?,
            ratio: row.get(3)?,
        })
    })?;
    let aggregates = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(aggregates)
}

/// Session metrics computed by DuckDB on a shared in-memory connection.
///
/// Each call stages only the requested user's rows, aggregates them in SQL and
/// drops the staging table again while holding the connection lock.
pub struct DuckDbEngine {
    conn: Arc<Mutex<Connection>>,
    options: MetricsOptions,
}

impl DuckDbEngine {
    pub const fn new(conn: Arc<Mutex<Connection>>, options: MetricsOptions) -> Self {
        Self { conn, options }
    }

    pub fn open_in_memory(options: MetricsOptions) -> Result<Self, MetricsError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::new(Arc::new(Mutex::new(conn)), options))
    }

    /// Returns a reference to the DuckDB connection.
    pub const fn conn(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    pub const fn options(&self) -> &MetricsOptions {
        &self.options
    }

    pub fn compute(
        &self,
        table: &InteractionTable,
        user_id: i64,
    ) -> Result<SessionMetricsTable, MetricsError> {
        let view = table.view()?;
        if view.rows_for_user(user_id).is_empty() {
            tracing::debug!(user_id, "No interactions for user");
            return Ok(SessionMetricsTable::empty());
        }

        let conn = self.conn.lock();
        schema::init_staging(&conn)?;
        let result = staging::stage_user_rows(&conn, &view, user_id, &self.options.parser)
            .and_then(|staged| {
                query_session_aggregates(&conn, user_id).map(|aggregates| (staged, aggregates))
            });
        let dropped = schema::drop_staging(&conn);
        drop(conn);
        let (staged, aggregates) = first_error(result, dropped)?;

        let decimals = self.options.round_decimals;
        let rows: Vec<SessionMetricsRow> = aggregates
            .into_iter()
            .map(|agg| SessionMetricsRow {
                user_id,
                session_id: agg.session_id,
                total_session_time: round_to(agg.span_seconds(), decimals),
                cart_addition_ratio: round_to(agg.ratio, decimals),
            })
            .collect();

        tracing::debug!(
            user_id,
            rows = staged,
            sessions = rows.len(),
            "Computed session metrics in DuckDB"
        );

        Ok(SessionMetricsTable::from_rows(rows))
    }
}

/// Combine a staging result with the outcome of the cleanup that followed it.
///
/// A staging or query failure wins; a cleanup failure after one is only logged.
fn first_error<T>(
    result: Result<T, duckdb::Error>,
    cleanup: Result<(), duckdb::Error>,
) -> Result<T, duckdb::Error> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_err)) => {
            tracing::warn!(error = %cleanup_err, "Failed to drop staging table");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::table::{Column, Interaction};

    fn interaction(user_id: i64, session_id: i64, ts: &str, add: bool) -> Interaction {
        Interaction {
            user_id,
            session_id,
            timestamp_local: Some(ts.to_string()),
            partnumber: Some(7),
            add_to_cart: add,
        }
    }

    fn engine() -> DuckDbEngine {
        DuckDbEngine::open_in_memory(MetricsOptions::default()).unwrap()
    }

    #[test]
    fn test_duckdb_duration_and_ratio() {
        let table = InteractionTable::from_records(&[
            interaction(1, 10, "2024-01-15 10:00:00", true),
            interaction(1, 10, "2024-01-15 10:00:30", false),
        ]);
        let result = engine().compute(&table, 1).unwrap();
        assert_eq!(result.len(), 1);
        let row = result.rows()[0];
        assert_eq!((row.user_id, row.session_id), (1, 10));
        assert!((row.total_session_time - 30.0).abs() < 1e-9);
        assert!((row.cart_addition_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_duckdb_unknown_user() {
        let table =
            InteractionTable::from_records(&[interaction(1, 10, "2024-01-15 10:00:00", true)]);
        assert!(engine().compute(&table, 2).unwrap().is_empty());
    }

    #[test]
    fn test_duckdb_invalid_timestamps_dropped() {
        let table = InteractionTable::from_records(&[
            interaction(4, 30, "nope", true),
            interaction(4, 31, "2024-01-15 10:00:00", false),
        ]);
        let result = engine().compute(&table, 4).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0].session_id, 31);
    }

    #[test]
    fn test_duckdb_staging_dropped_after_call() {
        let engine = engine();
        let table =
            InteractionTable::from_records(&[interaction(1, 10, "2024-01-15 10:00:00", true)]);
        engine.compute(&table, 1).unwrap();

        let conn = engine.conn().lock();
        assert!(conn.prepare("SELECT * FROM session_interactions").is_err());
    }

    #[test]
    fn test_duckdb_engine_reusable() {
        let engine = engine();
        let table = InteractionTable::from_records(&[
            interaction(1, 10, "2024-01-15 10:00:00", true),
            interaction(2, 20, "2024-01-15 10:00:00", false),
            interaction(2, 20, "2024-01-15 10:02:00", true),
        ]);
        let first = engine.compute(&table, 1).unwrap();
        let second = engine.compute(&table, 2).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!((second.rows()[0].total_session_time - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_query_session_aggregates_skips_null_keys() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_staging(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO temp.session_interactions VALUES
                (1, 10, 1705312800000000, 1.0),
                (1, 10, 1705312801500000, 0.0),
                (1, 11, NULL, 1.0),
                (1, NULL, 1705312800000000, 1.0),
                (2, 10, 1705316400000000, 1.0)",
        )
        .unwrap();
        let aggregates = query_session_aggregates(&conn, 1).unwrap();
        assert_eq!(
            aggregates,
            vec![SessionAggregate {
                session_id: 10,
                first_micros: 1_705_312_800_000_000,
                last_micros: 1_705_312_801_500_000,
                ratio: 0.5,
            }]
        );
        assert!((aggregates[0].span_seconds() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_duckdb_keeps_caller_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE session_interactions (x INTEGER);
             INSERT INTO session_interactions VALUES (1);",
        )
        .unwrap();
        let engine = DuckDbEngine::new(Arc::new(Mutex::new(conn)), MetricsOptions::default());
        let table = InteractionTable::from_records(&[
            interaction(1, 10, "2024-01-15 10:00:00", true),
            interaction(1, 10, "2024-01-15 10:00:30", false),
        ]);
        let result = engine.compute(&table, 1).unwrap();
        assert_eq!(result.len(), 1);

        let conn = engine.conn().lock();
        let mut stmt = conn
            .prepare("SELECT COUNT(*), MIN(x) FROM main.session_interactions")
            .unwrap();
        let (rows, x): (i64, i32) = stmt
            .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        assert_eq!((rows, x), (1, 1));
    }

    #[test]
    fn test_duckdb_far_future_timestamps() {
        let t0 = chrono::NaiveDate::from_ymd_opt(12000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let t1 = t0 + chrono::TimeDelta::seconds(30);
        let table = InteractionTable::from_records(&[
            interaction(1, 10, "", true),
            interaction(1, 10, "", false),
        ])
        .with_column("timestamp_local", Column::Timestamp(vec![Some(t0), Some(t1)]))
        .unwrap();

        let result = engine().compute(&table, 1).unwrap();
        assert_eq!(result.len(), 1);
        let row = result.rows()[0];
        assert_eq!((row.user_id, row.session_id), (1, 10));
        assert!((row.total_session_time - 30.0).abs() < 1e-9);
        assert!((row.cart_addition_ratio - 0.5).abs() < 1e-9);
    }

    fn query_error(conn: &Connection, sql: &str) -> duckdb::Error {
        conn.execute_batch(sql).unwrap_err()
    }

    #[test]
    fn test_first_error_prefers_staging_failure() {
        let conn = Connection::open_in_memory().unwrap();
        let staging_err = query_error(&conn, "SELECT * FROM missing_staging_source");
        let cleanup_err = query_error(&conn, "DROP TABLE missing_cleanup_target");

        let err = first_error::<()>(Err(staging_err), Err(cleanup_err)).unwrap_err();
        assert!(err.to_string().contains("missing_staging_source"));
    }

    #[test]
    fn test_first_error_reports_cleanup_failure_after_success() {
        let conn = Connection::open_in_memory().unwrap();
        let cleanup_err = query_error(&conn, "DROP TABLE missing_cleanup_target");

        let err = first_error(Ok(3), Err(cleanup_err)).unwrap_err();
        assert!(err.to_string().contains("missing_cleanup_target"));
        assert_eq!(first_error(Ok(3), Ok(())).unwrap(), 3);
    }
}
