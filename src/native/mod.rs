//! Boundary to the native client library.
//!
//! Everything the crate needs from the client library goes through the
//! [`Native`] trait: statement handles, typed variables addressed by slot,
//! and LOB locators. Handles are opaque ids; the native layer owns the
//! memory behind them and the crate only decides when to release them.
//!
//! All calls are blocking. The crate moves the ones that can run for a long
//! time (statement execution, ping) onto tokio's blocking pool.

pub mod constants;
pub mod memory;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use bytes::Bytes;
use thiserror::Error;

pub use constants::{NativeTypeNum, OracleTypeNum};
use constants::ORA_NO_DATA_FOUND;

/// Result of a call into the native layer.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Diagnostic reported by the native layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct NativeError {
    /// Numeric error code (1403 = no data found, 0 for client-side errors).
    pub code: i32,
    /// Full message text as reported by the native layer, including its
    /// `ORA-`/`DPI-` prefix.
    pub message: String,
}

impl NativeError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// ORA-01403, used to detect the end of a LOB.
    pub fn is_no_data_found(&self) -> bool {
        self.code == ORA_NO_DATA_FOUND
    }
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// Native statement handle.
    StmtHandle,
    "stmt"
);
handle!(
    /// Native variable (typed slot array) handle.
    VarHandle,
    "var"
);
handle!(
    /// Native LOB locator.
    LobHandle,
    "lob"
);

/// Execution mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecMode(u32);

impl ExecMode {
    pub const DEFAULT: ExecMode = ExecMode(0);
    pub const DESCRIBE_ONLY: ExecMode = ExecMode(0x10);
    pub const COMMIT_ON_SUCCESS: ExecMode = ExecMode(0x20);
    pub const PARSE_ONLY: ExecMode = ExecMode(0x100);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: ExecMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ExecMode {
    type Output = ExecMode;

    fn bitor(self, rhs: ExecMode) -> ExecMode {
        ExecMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for ExecMode {
    fn bitor_assign(&mut self, rhs: ExecMode) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("DEFAULT");
        }
        let mut names = Vec::new();
        if self.contains(ExecMode::DESCRIBE_ONLY) {
            names.push("DESCRIBE_ONLY");
        }
        if self.contains(ExecMode::COMMIT_ON_SUCCESS) {
            names.push("COMMIT_ON_SUCCESS");
        }
        if self.contains(ExecMode::PARSE_ONLY) {
            names.push("PARSE_ONLY");
        }
        f.write_str(&names.join("|"))
    }
}

/// Kind of a LOB locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobKind {
    Clob,
    Nclob,
    Blob,
    Bfile,
}

impl LobKind {
    pub fn oracle_type(self) -> OracleTypeNum {
        match self {
            LobKind::Clob => OracleTypeNum::Clob,
            LobKind::Nclob => OracleTypeNum::Nclob,
            LobKind::Blob => OracleTypeNum::Blob,
            LobKind::Bfile => OracleTypeNum::Bfile,
        }
    }

    pub fn is_clob(self) -> bool {
        matches!(self, LobKind::Clob | LobKind::Nclob)
    }
}

/// Timestamp as stored in a native slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeTimestamp {
    pub year: i16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Nanoseconds.
    pub fsecond: u32,
    pub tz_hour_offset: i8,
    pub tz_minute_offset: i8,
}

/// INTERVAL DAY TO SECOND slot contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeIntervalDs {
    pub days: i32,
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
    /// Nanoseconds.
    pub fseconds: i32,
}

/// INTERVAL YEAR TO MONTH slot contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeIntervalYm {
    pub years: i32,
    pub months: i32,
}

/// Contents of one variable slot.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeData {
    Null,
    Int64(i64),
    Uint64(u64),
    Float(f32),
    Double(f64),
    Bytes(Bytes),
    Timestamp(NativeTimestamp),
    IntervalDs(NativeIntervalDs),
    IntervalYm(NativeIntervalYm),
    Lob(LobHandle),
    Stmt(StmtHandle),
    Bool(bool),
}

impl NativeData {
    pub fn is_null(&self) -> bool {
        matches!(self, NativeData::Null)
    }
}

/// Parameters for allocating a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarSpec {
    pub oracle_type: OracleTypeNum,
    pub native_type: NativeTypeNum,
    /// Number of slots.
    pub max_array_size: u32,
    /// Bytes per slot for BYTES variables; ignored otherwise.
    pub size: u32,
    /// Whether the variable is bound as a PL/SQL array.
    pub is_array: bool,
}

/// Description of one result column as reported by the native layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfo {
    pub name: String,
    /// Raw Oracle type number; may be a type this crate cannot map.
    pub oracle_type_num: u32,
    /// Native representation the client library would pick by default.
    pub default_native_type_num: u32,
    pub client_size_in_bytes: u32,
    pub precision: i16,
    pub scale: i8,
    pub null_ok: bool,
}

/// Outcome of one native fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchInfo {
    /// Slot of the first fetched row in the defined variables.
    pub buffer_row_index: u32,
    pub num_rows_fetched: u32,
    pub more_rows: bool,
}

/// Calls consumed from the native client library.
///
/// Offsets into LOBs are 1-based, as in the client library.
pub trait Native: Send + Sync + 'static {
    // connection
    fn prepare(&self, sql: &str) -> NativeResult<StmtHandle>;
    fn commit(&self) -> NativeResult<()>;
    fn rollback(&self) -> NativeResult<()>;
    /// Best-effort interrupt of the call currently running on the connection.
    fn break_execution(&self) -> NativeResult<()>;
    fn ping(&self) -> NativeResult<()>;

    // statements
    fn stmt_add_ref(&self, stmt: StmtHandle) -> NativeResult<()>;
    fn stmt_release(&self, stmt: StmtHandle) -> NativeResult<()>;
    /// Execute once; returns the number of query columns.
    fn stmt_execute(&self, stmt: StmtHandle, mode: ExecMode) -> NativeResult<u32>;
    fn stmt_execute_many(&self, stmt: StmtHandle, mode: ExecMode, num_iters: u32)
        -> NativeResult<()>;
    fn stmt_bind_count(&self, stmt: StmtHandle) -> NativeResult<u32>;
    fn stmt_bind_by_pos(&self, stmt: StmtHandle, pos: u32, var: VarHandle) -> NativeResult<()>;
    fn stmt_bind_by_name(&self, stmt: StmtHandle, name: &str, var: VarHandle)
        -> NativeResult<()>;
    fn stmt_row_count(&self, stmt: StmtHandle) -> NativeResult<u64>;
    fn stmt_set_fetch_array_size(&self, stmt: StmtHandle, size: u32) -> NativeResult<()>;
    fn stmt_num_query_columns(&self, stmt: StmtHandle) -> NativeResult<u32>;
    /// Column description, `pos` is 1-based.
    fn stmt_query_info(&self, stmt: StmtHandle, pos: u32) -> NativeResult<QueryInfo>;
    fn stmt_define(&self, stmt: StmtHandle, pos: u32, var: VarHandle) -> NativeResult<()>;
    fn stmt_fetch_rows(&self, stmt: StmtHandle, max_rows: u32) -> NativeResult<FetchInfo>;

    // variables
    fn var_new(&self, spec: VarSpec) -> NativeResult<VarHandle>;
    fn var_set(&self, var: VarHandle, pos: u32, data: NativeData) -> NativeResult<()>;
    fn var_get(&self, var: VarHandle, pos: u32) -> NativeResult<NativeData>;
    fn var_set_num_elements(&self, var: VarHandle, num: u32) -> NativeResult<()>;
    fn var_release(&self, var: VarHandle) -> NativeResult<()>;

    // LOBs
    fn lob_new_temp(&self, kind: LobKind) -> NativeResult<LobHandle>;
    fn lob_add_ref(&self, lob: LobHandle) -> NativeResult<()>;
    fn lob_release(&self, lob: LobHandle) -> NativeResult<()>;
    fn lob_chunk_size(&self, lob: LobHandle) -> NativeResult<u32>;
    fn lob_size(&self, lob: LobHandle) -> NativeResult<u64>;
    /// Read into `buf` starting at the 1-based `offset`; returns bytes read.
    fn lob_read_bytes(&self, lob: LobHandle, offset: u64, buf: &mut [u8]) -> NativeResult<u64>;
    fn lob_write_bytes(&self, lob: LobHandle, offset: u64, data: &[u8]) -> NativeResult<()>;
    fn lob_open_resource(&self, lob: LobHandle) -> NativeResult<()>;
    fn lob_flush_buffer(&self, lob: LobHandle) -> NativeResult<()>;
    fn lob_close_resource(&self, lob: LobHandle) -> NativeResult<()>;
}
