//! Per-session behavioral metrics for one user of an e-commerce event log.
//!
//! [`compute`] filters an [`InteractionTable`] down to one user, drops rows
//! whose timestamp cannot be parsed, and returns one [`SessionMetricsRow`] per
//! session with its duration and cart-addition ratio, both rounded to two
//! decimals and sorted by `(user_id, session_id)`.
//!
//! ```
//! use session_metrics::{compute, Interaction, InteractionTable};
//!
//! let table = InteractionTable::from_records(&[
//!     Interaction {
//!         user_id: 1,
//!         session_id: 10,
//!         timestamp_local: Some("2024-01-15 10:00:00".to_string()),
//!         partnumber: Some(501),
//!         add_to_cart: true,
//!     },
//!     Interaction {
//!         user_id: 1,
//!         session_id: 10,
//!         timestamp_local: Some("2024-01-15 10:00:30".to_string()),
//!         partnumber: Some(502),
//!         add_to_cart: false,
//!     },
//! ]);
//!
//! let metrics = compute(&table, 1).unwrap();
//! assert_eq!(metrics.len(), 1);
//! assert_eq!(metrics.rows()[0].total_session_time, 30.0);
//! assert_eq!(metrics.rows()[0].cart_addition_ratio, 0.5);
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod storage;

pub use config::{Config, EngineKind};
pub use error::MetricsError;
pub use ingest::table::{Column, Interaction, InteractionTable};
pub use ingest::timestamp::{Timestamp, TimestampParser};
pub use query::aggregate::{compute, compute_with, MetricsOptions};
pub use query::engine::{InMemoryEngine, SessionMetricsEngine};
pub use query::result::{ColumnType, SessionMetricsRow, SessionMetricsTable, COLUMNS};
pub use query::sessions::DuckDbEngine;
