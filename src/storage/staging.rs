use crate::ingest::table::InteractionView;
use crate::ingest::timestamp::TimestampParser;
use duckdb::Connection;

/// Copy one user's rows into the staging table.
///
/// Timestamps go through the shared parser first and are staged as epoch
/// microseconds, so every instant chrono can represent survives staging.
/// Invalid ones are staged as NULL so the SQL side drops exactly the rows the
/// in-memory engine drops.
/// Returns the number of staged rows.
pub fn stage_user_rows(
    conn: &Connection,
    view: &InteractionView<'_>,
    user_id: i64,
    parser: &TimestampParser,
) -> Result<usize, duckdb::Error> {
    let rows = view.rows_for_user(user_id);
    if rows.is_empty() {
        return Ok(0);
    }

    let mut stmt = conn.prepare(
        "INSERT INTO temp.session_interactions (user_id, session_id, ts_micros, cart_flag)
         VALUES (?, ?, ?, ?)",
    )?;
    for &row in &rows {
        let ts_micros = view
            .timestamp(row, parser)
            .instant()
            .map(|ts| ts.and_utc().timestamp_micros());
        stmt.execute(duckdb::params![
            user_id,
            view.session_id(row),
            ts_micros,
            view.cart_flag(row),
        ])?;
    }

    Ok(rows.len())
}
