//! Materialized column values.

use chrono::{DateTime, FixedOffset, TimeDelta};
use std::fmt;

use crate::cursor::RowCursor;
use crate::lob::Lob;

/// A single column value of a fetched row.
#[derive(Debug)]
pub enum Value {
    /// NULL value.
    Null,
    /// Character data (VARCHAR2, CHAR, LONG, ...).
    String(String),
    Int64(i64),
    Uint64(u64),
    Float(f32),
    Double(f64),
    /// NUMBER as decimal text (preserves precision).
    Number(String),
    /// Binary data (RAW, LONG RAW, ROWID).
    Raw(Vec<u8>),
    /// DATE and TIMESTAMP variants.
    Timestamp(DateTime<FixedOffset>),
    /// INTERVAL DAY TO SECOND.
    Interval(TimeDelta),
    /// INTERVAL YEAR TO MONTH as `"{years}y{months}m"`.
    IntervalYm(String),
    /// CLOB, NCLOB, BLOB or BFILE, read lazily.
    Lob(Lob),
    /// Nested cursor (REF CURSOR column).
    Cursor(Box<RowCursor>),
    Bool(bool),
}

impl Value {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get the value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Number(s) | Value::IntervalYm(s) => Some(s),
            _ => None,
        }
    }

    /// Try to convert to i64.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Uint64(v) => i64::try_from(*v).ok(),
            Value::Number(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to f64.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Int64(v) => Some(*v as f64),
            Value::Uint64(v) => Some(*v as f64),
            Value::Number(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Try to get the value as raw bytes.
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_lob_mut(&mut self) -> Option<&mut Lob> {
        match self {
            Value::Lob(lob) => Some(lob),
            _ => None,
        }
    }

    pub fn as_cursor_mut(&mut self) -> Option<&mut RowCursor> {
        match self {
            Value::Cursor(cursor) => Some(cursor),
            _ => None,
        }
    }
}

/// LOBs and cursors never compare equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Uint64(a), Value::Uint64(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Interval(a), Value::Interval(b)) => a == b,
            (Value::IntervalYm(a), Value::IntervalYm(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::String(s) | Value::Number(s) | Value::IntervalYm(s) => write!(f, "{}", s),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Uint64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Raw(bytes) => write!(f, "<RAW: {} bytes>", bytes.len()),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f %:z")),
            Value::Interval(d) => write!(f, "{}", d),
            Value::Lob(lob) if lob.is_clob => write!(f, "<CLOB>"),
            Value::Lob(_) => write!(f, "<BLOB>"),
            Value::Cursor(_) => write!(f, "<CURSOR>"),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}
