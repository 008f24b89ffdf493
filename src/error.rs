/// Errors raised when the input table is structurally unusable or the SQL engine fails.
///
/// Dirty data (unparsable timestamps, unknown users, null cells) is never an
/// error; it is absorbed by the aggregation itself.
#[derive(Debug)]
pub enum MetricsError {
    MissingColumn(String),
    ColumnType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    Database(duckdb::Error),
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn(name) => write!(f, "Missing required column: {name}"),
            Self::ColumnType {
                column,
                expected,
                found,
            } => write!(f, "Column {column} has type {found}, expected {expected}"),
            Self::LengthMismatch {
                column,
                expected,
                found,
            } => write!(
                f,
                "Column {column} has {found} rows, table has {expected}"
            ),
            Self::Database(e) => write!(f, "Database error: {e}"),
        }
    }
}

impl std::error::Error for MetricsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<duckdb::Error> for MetricsError {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e)
    }
}
