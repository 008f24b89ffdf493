use duckdb::Connection;

/// Qualified name of the per-call staging table used by the DuckDB engine.
///
/// The table lives in the connection's `temp` catalog so it never collides
/// with a caller table of the same name in `main`.
pub const STAGING_TABLE: &str = "temp.session_interactions";

/// SQL statement to (re)create the staging table.
///
/// `ts_micros` is the normalized timestamp as microseconds since the Unix
/// epoch; unparsable source timestamps are staged as NULL.
pub const CREATE_STAGING_TABLE: &str = r"
CREATE OR REPLACE TEMP TABLE session_interactions (
    user_id         BIGINT NOT NULL,
    session_id      BIGINT,
    ts_micros       BIGINT,
    cart_flag       DOUBLE NOT NULL
)
";

/// Create an empty staging table, replacing any leftover from an earlier call.
pub fn init_staging(conn: &Connection) -> Result<(), duckdb::Error> {
    conn.execute_batch(CREATE_STAGING_TABLE)?;
    Ok(())
}

/// Drop the staging table. Tables outside the `temp` catalog are untouched.
pub fn drop_staging(conn: &Connection) -> Result<(), duckdb::Error> {
    conn.execute_batch("DROP TABLE IF EXISTS temp.session_interactions")?;
    Ok(())
}
