//! Column and ColumnInfo types for the user-facing API.
//!
//! A `Column` is built once per result column when a cursor opens. It
//! records what the native layer reported and the representation this
//! crate chose for fetching it.

use crate::native::constants::{NUMBER_AS_TEXT_CHARS, TEXT_BYTES_PER_CHAR};
use crate::native::{NativeTypeNum, OracleTypeNum, QueryInfo};

/// How a NUMBER column is fetched and materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberRepr {
    Int64,
    Uint64,
    Float,
    Double,
    /// Decimal text, preserving full precision.
    Decimal,
}

impl NumberRepr {
    /// Pick a representation from the native default and declared
    /// precision/scale.
    pub fn choose(default_native: Option<NativeTypeNum>, precision: i16, scale: i8) -> Self {
        match default_native {
            Some(NativeTypeNum::Int64) => NumberRepr::Int64,
            Some(NativeTypeNum::Uint64) => NumberRepr::Uint64,
            Some(NativeTypeNum::Float) => NumberRepr::Float,
            Some(NativeTypeNum::Double) => NumberRepr::Double,
            _ if (1..=18).contains(&precision) && scale == 0 => NumberRepr::Int64,
            _ => NumberRepr::Decimal,
        }
    }

    pub fn native_type(self) -> NativeTypeNum {
        match self {
            NumberRepr::Int64 => NativeTypeNum::Int64,
            NumberRepr::Uint64 => NativeTypeNum::Uint64,
            NumberRepr::Float => NativeTypeNum::Float,
            NumberRepr::Double => NativeTypeNum::Double,
            NumberRepr::Decimal => NativeTypeNum::Bytes,
        }
    }
}

/// A column in a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Raw Oracle type number.
    pub oracle_type_num: u32,
    /// Native representation used for fetching.
    pub native_type_num: u32,
    /// Declared size in bytes.
    pub size: u32,
    pub precision: i16,
    pub scale: i8,
    /// Whether NULL values are allowed.
    pub nullable: bool,
    /// Representation of a NUMBER column, fixed for the life of the cursor.
    pub number_repr: Option<NumberRepr>,
}

impl Column {
    /// Build a column from native query info, choosing its fetch
    /// representation.
    pub fn from_query_info(info: &QueryInfo) -> Self {
        let oracle_type = OracleTypeNum::from_raw(info.oracle_type_num);
        let default_native = NativeTypeNum::from_raw(info.default_native_type_num);

        let mut number_repr = None;
        let native_type_num = match oracle_type {
            Some(OracleTypeNum::Number) => {
                let repr = NumberRepr::choose(default_native, info.precision, info.scale);
                number_repr = Some(repr);
                repr.native_type().as_raw()
            }
            Some(OracleTypeNum::Date) => NativeTypeNum::Timestamp.as_raw(),
            _ => info.default_native_type_num,
        };

        Self {
            name: info.name.clone(),
            oracle_type_num: info.oracle_type_num,
            native_type_num,
            size: info.client_size_in_bytes,
            precision: info.precision,
            scale: info.scale,
            nullable: info.null_ok,
            number_repr,
        }
    }

    pub fn oracle_type(&self) -> Option<OracleTypeNum> {
        OracleTypeNum::from_raw(self.oracle_type_num)
    }

    pub fn native_type(&self) -> Option<NativeTypeNum> {
        NativeTypeNum::from_raw(self.native_type_num)
    }

    /// Bytes per slot of the fetch buffer.
    pub(crate) fn buffer_size(&self) -> u32 {
        if self.number_repr == Some(NumberRepr::Decimal) {
            return NUMBER_AS_TEXT_CHARS;
        }
        match self.oracle_type() {
            Some(t) if t.is_char() => self.size.saturating_mul(TEXT_BYTES_PER_CHAR as u32).max(1),
            _ if self.native_type() == Some(NativeTypeNum::Bytes) => self.size.max(1),
            _ => self.size,
        }
    }

    /// Database type name without length, upper case.
    pub fn database_type_name(&self) -> String {
        match self.oracle_type() {
            Some(t) => t.type_name().to_string(),
            None => format!("OTHER[{}]", self.oracle_type_num),
        }
    }

    /// Length of variable-length types; `u64::MAX` for LOBs.
    pub fn length(&self) -> Option<u64> {
        match self.oracle_type()? {
            OracleTypeNum::Varchar
            | OracleTypeNum::NVarchar
            | OracleTypeNum::Char
            | OracleTypeNum::NChar
            | OracleTypeNum::LongVarchar
            | OracleTypeNum::Raw
            | OracleTypeNum::LongRaw => Some(u64::from(self.size)),
            t if t.is_lob() => Some(u64::MAX),
            _ => None,
        }
    }

    /// Precision and scale of NUMBER columns.
    pub fn precision_scale(&self) -> Option<(i16, i8)> {
        match self.oracle_type()? {
            OracleTypeNum::Number => Some((self.precision, self.scale)),
            _ => None,
        }
    }

    /// Name of the Rust type a non-null value of this column carries.
    pub fn scan_type(&self) -> &'static str {
        if let Some(repr) = self.number_repr {
            return match repr {
                NumberRepr::Int64 => "i64",
                NumberRepr::Uint64 => "u64",
                NumberRepr::Float => "f32",
                NumberRepr::Double => "f64",
                NumberRepr::Decimal => "String",
            };
        }
        match self.oracle_type() {
            Some(OracleTypeNum::Raw | OracleTypeNum::Rowid | OracleTypeNum::LongRaw) => "Vec<u8>",
            Some(OracleTypeNum::NativeFloat) => "f32",
            Some(OracleTypeNum::NativeDouble) => "f64",
            Some(OracleTypeNum::NativeInt) => "i64",
            Some(OracleTypeNum::NativeUint) => "u64",
            Some(
                OracleTypeNum::Date
                | OracleTypeNum::Timestamp
                | OracleTypeNum::TimestampTz
                | OracleTypeNum::TimestampLtz,
            ) => "DateTime<FixedOffset>",
            Some(OracleTypeNum::IntervalDs) => "TimeDelta",
            Some(t) if t.is_lob() => "Lob",
            Some(OracleTypeNum::Stmt) => "RowCursor",
            Some(OracleTypeNum::Boolean) => "bool",
            _ => "String",
        }
    }
}

/// Shared column information for all rows in a result set.
#[derive(Debug, Clone, Default)]
pub struct ColumnInfo {
    /// Column definitions.
    pub columns: Vec<Column>,
}

impl ColumnInfo {
    /// Create new column info from columns.
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column by index.
    pub fn get(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Find column index by name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        let name_upper = name.to_uppercase();
        self.columns
            .iter()
            .position(|c| c.name.to_uppercase() == name_upper)
    }
}
