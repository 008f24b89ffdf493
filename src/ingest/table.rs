use crate::error::MetricsError;
use crate::ingest::timestamp::{Timestamp, TimestampParser};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

pub const USER_ID: &str = "user_id";
pub const SESSION_ID: &str = "session_id";
pub const TIMESTAMP_LOCAL: &str = "timestamp_local";
pub const PARTNUMBER: &str = "partnumber";
pub const ADD_TO_CART: &str = "add_to_cart";

/// One interaction event in row form.
///
/// `add_to_cart` deserializes from either a JSON boolean or a 0/1 number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: i64,
    pub session_id: i64,
    pub timestamp_local: Option<String>,
    pub partnumber: Option<i64>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub add_to_cart: bool,
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Float(f64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
        Flag::Float(x) => x != 0.0,
    })
}

/// A typed, nullable column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Text(v) => v.len(),
            Self::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

/// In-memory interaction table: named columns of equal length.
///
/// The table is never modified by the aggregation; every computation reads
/// through an [`InteractionView`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionTable {
    columns: Vec<(String, Column)>,
    len: usize,
}

impl InteractionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a column. The first column fixes the row count.
    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, MetricsError> {
        let others = self.columns.iter().filter(|(n, _)| n != name).count();
        if others > 0 && column.len() != self.len {
            return Err(MetricsError::LengthMismatch {
                column: name.to_string(),
                expected: self.len,
                found: column.len(),
            });
        }
        self.len = column.len();

        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| n == name) {
            slot.1 = column;
        } else {
            self.columns.push((name.to_string(), column));
        }
        Ok(self)
    }

    /// Build the five interaction columns from row records.
    pub fn from_records(records: &[Interaction]) -> Self {
        let columns = vec![
            (
                USER_ID.to_string(),
                Column::Int(records.iter().map(|r| Some(r.user_id)).collect()),
            ),
            (
                SESSION_ID.to_string(),
                Column::Int(records.iter().map(|r| Some(r.session_id)).collect()),
            ),
            (
                TIMESTAMP_LOCAL.to_string(),
                Column::Text(records.iter().map(|r| r.timestamp_local.clone()).collect()),
            ),
            (
                PARTNUMBER.to_string(),
                Column::Int(records.iter().map(|r| r.partnumber).collect()),
            ),
            (
                ADD_TO_CART.to_string(),
                Column::Bool(records.iter().map(|r| Some(r.add_to_cart)).collect()),
            ),
        ];
        Self {
            columns,
            len: records.len(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find_map(|(n, c)| (n == name).then_some(c))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resolve and type-check the columns the aggregation reads.
    ///
    /// Fails fast when a required column is absent or has an unusable type.
    pub fn view(&self) -> Result<InteractionView<'_>, MetricsError> {
        let user_id = self.int_column(USER_ID)?;
        let session_id = self.int_column(SESSION_ID)?;

        let timestamp = match self.required(TIMESTAMP_LOCAL)? {
            Column::Text(v) => TimestampCells::Text(v),
            Column::Timestamp(v) => TimestampCells::Typed(v),
            other => return Err(type_error(TIMESTAMP_LOCAL, "text or timestamp", other)),
        };

        // Only presence is checked: every row counts as one interaction.
        self.required(PARTNUMBER)?;

        let add_to_cart = match self.required(ADD_TO_CART)? {
            Column::Bool(v) => FlagCells::Bool(v),
            Column::Int(v) => FlagCells::Int(v),
            Column::Float(v) => FlagCells::Float(v),
            other => return Err(type_error(ADD_TO_CART, "bool, int or float", other)),
        };

        Ok(InteractionView {
            user_id,
            session_id,
            timestamp,
            add_to_cart,
        })
    }

    fn required(&self, name: &str) -> Result<&Column, MetricsError> {
        self.column(name)
            .ok_or_else(|| MetricsError::MissingColumn(name.to_string()))
    }

    fn int_column(&self, name: &str) -> Result<&[Option<i64>], MetricsError> {
        match self.required(name)? {
            Column::Int(v) => Ok(v),
            other => Err(type_error(name, "int", other)),
        }
    }
}

fn type_error(column: &str, expected: &'static str, found: &Column) -> MetricsError {
    MetricsError::ColumnType {
        column: column.to_string(),
        expected,
        found: found.type_name(),
    }
}

enum TimestampCells<'a> {
    Text(&'a [Option<String>]),
    Typed(&'a [Option<NaiveDateTime>]),
}

enum FlagCells<'a> {
    Bool(&'a [Option<bool>]),
    Int(&'a [Option<i64>]),
    Float(&'a [Option<f64>]),
}

/// Borrowed, type-checked access to the interaction columns of a table.
pub struct InteractionView<'a> {
    user_id: &'a [Option<i64>],
    session_id: &'a [Option<i64>],
    timestamp: TimestampCells<'a>,
    add_to_cart: FlagCells<'a>,
}

impl InteractionView<'_> {
    /// Indices of rows whose `user_id` equals `user_id`. Null ids never match.
    pub fn rows_for_user(&self, user_id: i64) -> Vec<usize> {
        self.user_id
            .iter()
            .enumerate()
            .filter_map(|(i, id)| (*id == Some(user_id)).then_some(i))
            .collect()
    }

    pub fn session_id(&self, row: usize) -> Option<i64> {
        self.session_id[row]
    }

    pub fn timestamp(&self, row: usize, parser: &TimestampParser) -> Timestamp {
        match &self.timestamp {
            TimestampCells::Text(v) => v[row]
                .as_deref()
                .map_or(Timestamp::Invalid, |text| parser.parse(text)),
            TimestampCells::Typed(v) => Timestamp::from(v[row]),
        }
    }

    /// The `add_to_cart` cell as a summand. Missing values contribute 0.
    #[allow(clippy::cast_precision_loss)]
    pub fn cart_flag(&self, row: usize) -> f64 {
        match &self.add_to_cart {
            FlagCells::Bool(v) => v[row].map_or(0.0, |b| f64::from(u8::from(b))),
            FlagCells::Int(v) => v[row].map_or(0.0, |n| n as f64),
            FlagCells::Float(v) => v[row].filter(|x| !x.is_nan()).unwrap_or(0.0),
        }
    }
}
