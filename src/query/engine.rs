use crate::error::MetricsError;
use crate::ingest::table::InteractionTable;
use crate::query::aggregate::{self, MetricsOptions};
use crate::query::result::SessionMetricsTable;
use crate::query::sessions::DuckDbEngine;

/// Anything that can turn an interaction table into per-session metrics.
///
/// Implementations must not modify `table` and must return the same result
/// for the same input regardless of row order.
pub trait SessionMetricsEngine: Send + Sync {
    fn compute(
        &self,
        table: &InteractionTable,
        user_id: i64,
    ) -> Result<SessionMetricsTable, MetricsError>;
}

/// Pure Rust aggregation over the in-memory table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    options: MetricsOptions,
}

impl InMemoryEngine {
    pub const fn new(options: MetricsOptions) -> Self {
        Self { options }
    }

    pub const fn options(&self) -> &MetricsOptions {
        &self.options
    }
}

impl SessionMetricsEngine for InMemoryEngine {
    fn compute(
        &self,
        table: &InteractionTable,
        user_id: i64,
    ) -> Result<SessionMetricsTable, MetricsError> {
        aggregate::compute_with(table, user_id, &self.options)
    }
}

impl SessionMetricsEngine for DuckDbEngine {
    fn compute(
        &self,
        table: &InteractionTable,
        user_id: i64,
    ) -> Result<SessionMetricsTable, MetricsError> {
        Self::compute(self, table, user_id)
    }
}
