//! Engine value model and the type conversion layer.
//!
//! Provider payloads are decoded once into a [`TaggedValue`] and converted to
//! the engine's [`Value`] for a requested [`LogicalType`]. Conversion is total:
//! anything that cannot be represented degrades to a documented default
//! instead of failing.
//!
//! | Source \ Target | integer            | float          | string        | boolean       | timestamp        |
//! |-----------------|--------------------|----------------|---------------|---------------|------------------|
//! | Integer         | truncate to width  | widen          | decimal text  | `!= 0`        | NULL             |
//! | Float           | truncate toward 0  | as is          | decimal text  | `!= 0.0`      | NULL             |
//! | Boolean         | 0 / 1              | 0.0 / 1.0      | `true/false`  | as is         | NULL             |
//! | String          | NULL               | NULL           | as is         | falsy words   | parse or epoch   |
//! | Timestamp       | NULL               | NULL           | ISO text      | `true`        | as is            |
//! | Unsupported     | NULL               | NULL           | placeholder   | `true`        | NULL             |

pub mod temporal;

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::provider::DbType;

/// Placeholder text for values with no string rendering.
pub const UNSUPPORTED_PLACEHOLDER: &str = "[Unsupported Type]";

/// The provider's fixed-point unit is ten-thousandths.
pub const CURRENCY_SCALE: f64 = 10_000.0;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Engine-facing column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LogicalType {
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    /// Carried as f64; no fixed-precision representation is kept.
    Decimal,
    Boolean,
    Varchar,
    Timestamp,
}

impl LogicalType {
    /// Engine type for a native column type.
    pub fn from_native(db_type: DbType) -> Self {
        match db_type {
            DbType::I1 | DbType::I2 | DbType::UI1 => LogicalType::SmallInt,
            DbType::I4 | DbType::UI2 => LogicalType::Integer,
            DbType::I8 | DbType::UI4 | DbType::UI8 => LogicalType::BigInt,
            DbType::R4 => LogicalType::Float,
            DbType::R8 => LogicalType::Double,
            DbType::Cy | DbType::Decimal | DbType::Numeric => LogicalType::Decimal,
            DbType::Bool => LogicalType::Boolean,
            t if t.is_temporal() => LogicalType::Timestamp,
            _ => LogicalType::Varchar,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LogicalType::SmallInt => "SMALLINT",
            LogicalType::Integer => "INTEGER",
            LogicalType::BigInt => "BIGINT",
            LogicalType::Float => "FLOAT",
            LogicalType::Double => "DOUBLE",
            LogicalType::Decimal => "DECIMAL",
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::Varchar => "VARCHAR",
            LogicalType::Timestamp => "TIMESTAMP",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(
            self,
            LogicalType::Float | LogicalType::Double | LogicalType::Decimal
        )
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Engine value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Varchar(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JSON rendering for CLI output.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::SmallInt(v) => serde_json::Value::from(*v),
            Value::Integer(v) => serde_json::Value::from(*v),
            Value::BigInt(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v as f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(v) => serde_json::Value::Bool(*v),
            Value::Varchar(v) => serde_json::Value::String(v.clone()),
            Value::Timestamp(v) => serde_json::Value::String(v.format(TIMESTAMP_FORMAT).to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Varchar(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

/// A provider scalar after decoding, before conversion to a [`Value`].
///
/// Currency and decimal payloads are already scaled to `Float`; calendar
/// payloads are already recombined to `Timestamp`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Timestamp(NaiveDateTime),
    /// Native tag with no mapping.
    Unsupported(u16),
}

/// Scale a raw currency payload.
pub fn currency_to_f64(raw: i64) -> f64 {
    raw as f64 / CURRENCY_SCALE
}

/// Convert a decoded scalar to the engine value for `target`.
pub fn convert(value: &TaggedValue, target: LogicalType) -> Value {
    if matches!(value, TaggedValue::Null) {
        return Value::Null;
    }
    match target {
        LogicalType::SmallInt => to_i64(value).map_or(Value::Null, |v| Value::SmallInt(v as i16)),
        LogicalType::Integer => to_i64(value).map_or(Value::Null, |v| Value::Integer(v as i32)),
        LogicalType::BigInt => to_i64(value).map_or(Value::Null, Value::BigInt),
        LogicalType::Float => to_f64(value).map_or(Value::Null, |v| Value::Float(v as f32)),
        LogicalType::Double | LogicalType::Decimal => to_f64(value).map_or(Value::Null, Value::Double),
        LogicalType::Boolean => to_bool(value).map_or(Value::Null, Value::Boolean),
        LogicalType::Varchar => Value::Varchar(to_text(value)),
        LogicalType::Timestamp => to_timestamp(value).map_or(Value::Null, Value::Timestamp),
    }
}

/// Integer view; floats truncate toward zero, saturating at the bounds.
fn to_i64(value: &TaggedValue) -> Option<i64> {
    match value {
        TaggedValue::Integer(v) => Some(*v),
        TaggedValue::Float(v) => Some(*v as i64),
        TaggedValue::Boolean(v) => Some(*v as i64),
        _ => None,
    }
}

fn to_f64(value: &TaggedValue) -> Option<f64> {
    match value {
        TaggedValue::Integer(v) => Some(*v as f64),
        TaggedValue::Float(v) => Some(*v),
        TaggedValue::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn to_bool(value: &TaggedValue) -> Option<bool> {
    match value {
        TaggedValue::Integer(v) => Some(*v != 0),
        TaggedValue::Float(v) => Some(*v != 0.0),
        TaggedValue::Boolean(v) => Some(*v),
        TaggedValue::String(s) => {
            let s = s.trim();
            Some(!(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")))
        }
        TaggedValue::Timestamp(_) | TaggedValue::Unsupported(_) => Some(true),
        TaggedValue::Null => None,
    }
}

fn to_text(value: &TaggedValue) -> String {
    match value {
        TaggedValue::Integer(v) => v.to_string(),
        TaggedValue::Float(v) => v.to_string(),
        TaggedValue::Boolean(v) => v.to_string(),
        TaggedValue::String(s) => s.clone(),
        TaggedValue::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        TaggedValue::Null | TaggedValue::Unsupported(_) => UNSUPPORTED_PLACEHOLDER.to_string(),
    }
}

/// Strings that do not parse as a calendar timestamp yield the zero epoch.
fn to_timestamp(value: &TaggedValue) -> Option<NaiveDateTime> {
    match value {
        TaggedValue::Timestamp(ts) => Some(*ts),
        TaggedValue::String(s) => Some(
            NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S"))
                .unwrap_or_else(|_| temporal::epoch()),
        ),
        _ => None,
    }
}
