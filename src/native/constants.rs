//! Native type numbers and limits.
//!
//! Oracle type numbers start at 2000 and native representation numbers at
//! 3000, matching the client library's enumerations.

use std::fmt;

/// Oracle (database-side) type of a variable or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OracleTypeNum {
    Varchar = 2001,
    NVarchar = 2002,
    Char = 2003,
    NChar = 2004,
    Rowid = 2005,
    Raw = 2006,
    NativeFloat = 2007,
    NativeDouble = 2008,
    NativeInt = 2009,
    Number = 2010,
    Date = 2011,
    Timestamp = 2012,
    TimestampTz = 2013,
    TimestampLtz = 2014,
    IntervalDs = 2015,
    IntervalYm = 2016,
    Clob = 2017,
    Nclob = 2018,
    Blob = 2019,
    Bfile = 2020,
    Stmt = 2021,
    Boolean = 2022,
    Object = 2023,
    LongVarchar = 2024,
    LongRaw = 2025,
    NativeUint = 2026,
}

impl OracleTypeNum {
    /// Map a raw type number reported by the native layer.
    pub fn from_raw(num: u32) -> Option<Self> {
        use OracleTypeNum::*;
        let t = match num {
            2001 => Varchar,
            2002 => NVarchar,
            2003 => Char,
            2004 => NChar,
            2005 => Rowid,
            2006 => Raw,
            2007 => NativeFloat,
            2008 => NativeDouble,
            2009 => NativeInt,
            2010 => Number,
            2011 => Date,
            2012 => Timestamp,
            2013 => TimestampTz,
            2014 => TimestampLtz,
            2015 => IntervalDs,
            2016 => IntervalYm,
            2017 => Clob,
            2018 => Nclob,
            2019 => Blob,
            2020 => Bfile,
            2021 => Stmt,
            2022 => Boolean,
            2023 => Object,
            2024 => LongVarchar,
            2025 => LongRaw,
            2026 => NativeUint,
            _ => return None,
        };
        Some(t)
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Character types whose buffers hold encoded text.
    pub fn is_char(self) -> bool {
        matches!(
            self,
            OracleTypeNum::Varchar
                | OracleTypeNum::NVarchar
                | OracleTypeNum::Char
                | OracleTypeNum::NChar
        )
    }

    pub fn is_lob(self) -> bool {
        matches!(
            self,
            OracleTypeNum::Clob | OracleTypeNum::Nclob | OracleTypeNum::Blob | OracleTypeNum::Bfile
        )
    }

    /// Database type name without length, upper case.
    pub fn type_name(self) -> &'static str {
        match self {
            OracleTypeNum::Varchar => "VARCHAR2",
            OracleTypeNum::NVarchar => "NVARCHAR2",
            OracleTypeNum::Char => "CHAR",
            OracleTypeNum::NChar => "NCHAR",
            OracleTypeNum::LongVarchar => "LONG",
            OracleTypeNum::Raw => "RAW",
            OracleTypeNum::Rowid => "ROWID",
            OracleTypeNum::LongRaw => "LONG RAW",
            OracleTypeNum::Number => "NUMBER",
            OracleTypeNum::NativeFloat => "FLOAT",
            OracleTypeNum::NativeDouble => "DOUBLE",
            OracleTypeNum::NativeInt | OracleTypeNum::NativeUint => "BINARY_INTEGER",
            OracleTypeNum::Timestamp => "TIMESTAMP",
            OracleTypeNum::TimestampTz => "TIMESTAMP WITH TIMEZONE",
            OracleTypeNum::TimestampLtz => "TIMESTAMP WITH LOCAL TIMEZONE",
            OracleTypeNum::Date => "DATE",
            OracleTypeNum::IntervalDs => "INTERVAL DAY TO SECOND",
            OracleTypeNum::IntervalYm => "INTERVAL YEAR TO MONTH",
            OracleTypeNum::Clob => "CLOB",
            OracleTypeNum::Nclob => "NCLOB",
            OracleTypeNum::Blob => "BLOB",
            OracleTypeNum::Bfile => "BFILE",
            OracleTypeNum::Stmt => "SYS_REFCURSOR",
            OracleTypeNum::Boolean => "BOOLEAN",
            OracleTypeNum::Object => "OBJECT",
        }
    }
}

impl fmt::Display for OracleTypeNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Client-side representation of the values held in a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NativeTypeNum {
    Int64 = 3000,
    Uint64 = 3001,
    Float = 3002,
    Double = 3003,
    Bytes = 3004,
    Timestamp = 3005,
    IntervalDs = 3006,
    IntervalYm = 3007,
    Lob = 3008,
    Object = 3009,
    Stmt = 3010,
    Boolean = 3011,
    Rowid = 3012,
}

impl NativeTypeNum {
    pub fn from_raw(num: u32) -> Option<Self> {
        use NativeTypeNum::*;
        let t = match num {
            3000 => Int64,
            3001 => Uint64,
            3002 => Float,
            3003 => Double,
            3004 => Bytes,
            3005 => Timestamp,
            3006 => IntervalDs,
            3007 => IntervalYm,
            3008 => Lob,
            3009 => Object,
            3010 => Stmt,
            3011 => Boolean,
            3012 => Rowid,
            _ => return None,
        };
        Some(t)
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

/// ORA-01403: no data found.
pub const ORA_NO_DATA_FOUND: i32 = 1403;

/// ORA-01013: user requested cancel of current operation.
pub const ORA_USER_CANCEL: i32 = 1013;

/// Upper bound on the length of an array argument.
pub const MAX_ARRAY_SIZE: usize = 1 << 10;

/// Rows per native fetch.
pub const DEFAULT_FETCH_ARRAY_SIZE: u32 = 1;

/// Chunk size used when a LOB does not report one.
pub const DEFAULT_LOB_CHUNK_SIZE: u32 = 1 << 20;

/// Worst-case bytes per character when sizing text buffers.
pub const TEXT_BYTES_PER_CHAR: usize = 4;

/// Buffer size for a NUMBER fetched as decimal text.
pub const NUMBER_AS_TEXT_CHARS: u32 = 172;
