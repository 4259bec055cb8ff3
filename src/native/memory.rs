//! In-memory native layer.
//!
//! `MemoryNative` implements [`Native`] without a database. Variables,
//! statements and LOBs live in handle-indexed arenas, slot writes are
//! checked against the declared type and capacity, and LOBs and statements
//! are reference counted the way the client library counts them. Statements
//! behave according to a [`Script`] registered for their SQL text.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use oracle_dpi_rs::native::memory::{MemoryNative, Script};
//!
//! let native = Arc::new(MemoryNative::new());
//! native.script("DELETE FROM t WHERE id = :1", Script::dml(1));
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use super::constants::{ORA_NO_DATA_FOUND, ORA_USER_CANCEL};
use super::{
    ExecMode, FetchInfo, LobHandle, LobKind, Native, NativeData, NativeError,
    NativeIntervalDs, NativeIntervalYm, NativeResult, NativeTimestamp, NativeTypeNum,
    OracleTypeNum, QueryInfo, StmtHandle, VarHandle, VarSpec,
};

/// How long a blocking statement waits for a break before giving up.
const BLOCKING_TIMEOUT: Duration = Duration::from_secs(10);

fn ora(code: i32, message: &str) -> NativeError {
    NativeError::new(code, format!("ORA-{:05}: {}", code, message))
}

fn dpi(num: u32, message: impl AsRef<str>) -> NativeError {
    NativeError::new(0, format!("DPI-{:04}: {}", num, message.as_ref()))
}

fn invalid_handle(kind: &str) -> NativeError {
    dpi(1002, format!("invalid {} handle", kind))
}

/// Behaviour of a statement, keyed by its SQL text.
#[derive(Debug, Clone)]
pub enum Script {
    /// A query producing the given result set.
    Query(MemResult),
    /// A DML statement affecting `rows_per_execution` rows per iteration.
    Dml { rows_per_execution: u64 },
    /// Selects the bound values back: one column per bind variable, one row
    /// per iteration.
    Echo,
    /// Blocks until a break is requested, then fails with ORA-01013.
    Blocking,
    /// Fails with the given error on execution.
    Fail(NativeError),
}

impl Script {
    pub fn dml(rows_per_execution: u64) -> Self {
        Script::Dml { rows_per_execution }
    }

    pub fn query(columns: Vec<MemColumn>, rows: Vec<Vec<MemValue>>) -> Self {
        Script::Query(MemResult { columns, rows })
    }
}

/// A scripted result set.
#[derive(Debug, Clone, Default)]
pub struct MemResult {
    pub columns: Vec<MemColumn>,
    pub rows: Vec<Vec<MemValue>>,
}

/// A scripted result column.
#[derive(Debug, Clone)]
pub struct MemColumn {
    pub name: String,
    pub oracle_type: u32,
    pub native_type: u32,
    pub size: u32,
    pub precision: i16,
    pub scale: i8,
    pub nullable: bool,
}

impl MemColumn {
    pub fn new(name: &str, oracle_type: OracleTypeNum, native_type: NativeTypeNum) -> Self {
        Self::raw(name, oracle_type.as_raw(), native_type.as_raw())
    }

    /// Column with raw type numbers, including ones the crate cannot map.
    pub fn raw(name: &str, oracle_type: u32, native_type: u32) -> Self {
        Self {
            name: name.to_string(),
            oracle_type,
            native_type,
            size: 0,
            precision: 0,
            scale: 0,
            nullable: true,
        }
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn precision(mut self, precision: i16, scale: i8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn query_info(&self) -> QueryInfo {
        QueryInfo {
            name: self.name.clone(),
            oracle_type_num: self.oracle_type,
            default_native_type_num: self.native_type,
            client_size_in_bytes: self.size,
            precision: self.precision,
            scale: self.scale,
            null_ok: self.nullable,
        }
    }
}

/// A scripted cell value. LOB and cursor cells are turned into native
/// locators and statements when the query executes.
#[derive(Debug, Clone)]
pub enum MemValue {
    Null,
    Int(i64),
    Uint(u64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NativeTimestamp),
    IntervalDs(NativeIntervalDs),
    IntervalYm(NativeIntervalYm),
    Bool(bool),
    Clob(String),
    Blob(Vec<u8>),
    Cursor(MemResult),
}

/// Calls that can be made to fail once with [`MemoryNative::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Prepare,
    Execute,
    BindByPos,
    BindByName,
    VarNew,
    QueryInfo,
    Define,
    Fetch,
    RowCount,
    TempLob,
    LobOpen,
    LobRead,
    LobWrite,
    LobFlush,
    LobClose,
    Commit,
    Rollback,
    Break,
    Ping,
}

/// Bind position or name as seen by the native layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindKey {
    Pos(u32),
    Name(String),
}

impl std::fmt::Display for BindKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindKey::Pos(pos) => write!(f, "{}", pos),
            BindKey::Name(name) => f.write_str(name),
        }
    }
}

/// Snapshot of one bound variable at execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundVar {
    pub key: BindKey,
    pub spec: VarSpec,
    pub slots: Vec<NativeData>,
    pub num_elements: u32,
}

/// One recorded execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub sql: String,
    pub mode: ExecMode,
    pub iterations: u32,
    pub many: bool,
    pub binds: Vec<BoundVar>,
}

/// Call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub breaks: u32,
    pub commits: u32,
    pub rollbacks: u32,
    pub pings: u32,
    pub auto_commits: u32,
    pub fetch_calls: u32,
    pub lob_reads: u32,
    pub lob_writes: u32,
    pub lob_opens: u32,
    pub lob_closes: u32,
    pub lob_flushes: u32,
}

#[derive(Debug)]
struct MemVar {
    spec: VarSpec,
    slots: Vec<NativeData>,
    num_elements: u32,
}

#[derive(Debug)]
struct MemLob {
    kind: LobKind,
    data: Vec<u8>,
    refs: u32,
    temp: bool,
    open: bool,
}

#[derive(Debug, Default)]
struct ResultState {
    columns: Vec<MemColumn>,
    rows: VecDeque<Vec<NativeData>>,
}

#[derive(Debug)]
struct MemStmt {
    sql: String,
    refs: u32,
    placeholders: Vec<String>,
    binds: Vec<(BindKey, u64)>,
    defines: BTreeMap<u32, u64>,
    fetch_array_size: u32,
    result: Option<ResultState>,
    row_count: u64,
}

impl MemStmt {
    fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            refs: 1,
            placeholders: placeholders(sql),
            binds: Vec::new(),
            defines: BTreeMap::new(),
            fetch_array_size: 100,
            result: None,
            row_count: 0,
        }
    }
}

/// Distinct placeholder names in order of first appearance, upper-cased.
/// Quoted literals are skipped.
fn placeholders(sql: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut chars = sql.chars().peekable();
    let mut in_quote = false;
    while let Some(c) = chars.next() {
        match c {
            '\'' => in_quote = !in_quote,
            ':' if !in_quote => {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if !name.is_empty() && seen.insert(name.to_uppercase()) {
                    names.push(name.to_uppercase());
                }
            }
            _ => {}
        }
    }
    names
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    stmts: HashMap<u64, MemStmt>,
    vars: HashMap<u64, MemVar>,
    lobs: HashMap<u64, MemLob>,
    scripts: HashMap<String, Script>,
    faults: HashMap<FaultPoint, NativeError>,
    chunk_size: u32,
    short_writes: bool,
    break_requested: bool,
    stats: MemoryStats,
    executions: Vec<ExecutionRecord>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn take_fault(&mut self, point: FaultPoint) -> NativeResult<()> {
        match self.faults.remove(&point) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn stmt(&self, stmt: StmtHandle) -> NativeResult<&MemStmt> {
        self.stmts.get(&stmt.0).ok_or_else(|| invalid_handle("dpiStmt"))
    }

    fn stmt_mut(&mut self, stmt: StmtHandle) -> NativeResult<&mut MemStmt> {
        self.stmts
            .get_mut(&stmt.0)
            .ok_or_else(|| invalid_handle("dpiStmt"))
    }

    fn new_lob(&mut self, kind: LobKind, data: Vec<u8>, temp: bool) -> LobHandle {
        let id = self.next_id();
        self.lobs.insert(
            id,
            MemLob {
                kind,
                data,
                refs: 1,
                temp,
                open: false,
            },
        );
        LobHandle(id)
    }

    fn lob_mut(&mut self, lob: LobHandle) -> NativeResult<&mut MemLob> {
        self.lobs.get_mut(&lob.0).ok_or_else(|| invalid_handle("dpiLob"))
    }

    fn add_ref(&mut self, data: &NativeData) -> NativeResult<()> {
        match data {
            NativeData::Lob(lob) => {
                self.lob_mut(*lob)?.refs += 1;
            }
            NativeData::Stmt(stmt) => {
                self.stmt_mut(*stmt)?.refs += 1;
            }
            _ => {}
        }
        Ok(())
    }

    fn release_data(&mut self, data: NativeData) -> NativeResult<()> {
        match data {
            NativeData::Lob(lob) => self.release_lob(lob),
            NativeData::Stmt(stmt) => self.release_stmt(stmt),
            _ => Ok(()),
        }
    }

    fn release_lob(&mut self, lob: LobHandle) -> NativeResult<()> {
        let entry = self.lob_mut(lob)?;
        entry.refs -= 1;
        if entry.refs == 0 {
            self.lobs.remove(&lob.0);
        }
        Ok(())
    }

    fn release_stmt(&mut self, stmt: StmtHandle) -> NativeResult<()> {
        let entry = self.stmt_mut(stmt)?;
        entry.refs -= 1;
        if entry.refs > 0 {
            return Ok(());
        }
        if let Some(st) = self.stmts.remove(&stmt.0) {
            if let Some(result) = st.result {
                self.release_result(result)?;
            }
        }
        Ok(())
    }

    fn release_result(&mut self, result: ResultState) -> NativeResult<()> {
        for row in result.rows {
            for data in row {
                self.release_data(data)?;
            }
        }
        Ok(())
    }

    fn replace_result(&mut self, stmt: StmtHandle, result: Option<ResultState>) -> NativeResult<()> {
        let old = std::mem::replace(&mut self.stmt_mut(stmt)?.result, result);
        if let Some(old) = old {
            self.release_result(old)?;
        }
        Ok(())
    }

    /// Store `data` into a slot. With `take_ref` the slot takes its own
    /// reference on a LOB or statement; otherwise ownership moves in.
    fn put_slot(&mut self, var: u64, pos: u32, data: NativeData, take_ref: bool) -> NativeResult<()> {
        {
            let entry = self.vars.get(&var).ok_or_else(|| invalid_handle("dpiVar"))?;
            if pos >= entry.spec.max_array_size {
                return Err(dpi(
                    1009,
                    format!(
                        "zero-based position {} is not valid with max array size of {}",
                        pos, entry.spec.max_array_size
                    ),
                ));
            }
            check_slot_type(&entry.spec, &data)?;
        }
        if take_ref {
            self.add_ref(&data)?;
        }
        let entry = self.vars.get_mut(&var).ok_or_else(|| invalid_handle("dpiVar"))?;
        let old = std::mem::replace(&mut entry.slots[pos as usize], data);
        self.release_data(old)
    }

    fn mem_to_native(&mut self, value: &MemValue) -> NativeResult<NativeData> {
        Ok(match value {
            MemValue::Null => NativeData::Null,
            MemValue::Int(v) => NativeData::Int64(*v),
            MemValue::Uint(v) => NativeData::Uint64(*v),
            MemValue::Float(v) => NativeData::Float(*v),
            MemValue::Double(v) => NativeData::Double(*v),
            MemValue::Text(s) => NativeData::Bytes(Bytes::copy_from_slice(s.as_bytes())),
            MemValue::Bytes(b) => NativeData::Bytes(Bytes::copy_from_slice(b)),
            MemValue::Timestamp(ts) => NativeData::Timestamp(*ts),
            MemValue::IntervalDs(iv) => NativeData::IntervalDs(*iv),
            MemValue::IntervalYm(iv) => NativeData::IntervalYm(*iv),
            MemValue::Bool(b) => NativeData::Bool(*b),
            MemValue::Clob(s) => NativeData::Lob(self.new_lob(LobKind::Clob, s.as_bytes().to_vec(), false)),
            MemValue::Blob(b) => NativeData::Lob(self.new_lob(LobKind::Blob, b.clone(), false)),
            MemValue::Cursor(result) => {
                let id = self.next_id();
                self.stmts.insert(id, MemStmt::new("<cursor>"));
                let state = self.result_state(result)?;
                let stmt = self.stmt_mut(StmtHandle(id))?;
                stmt.result = Some(state);
                NativeData::Stmt(StmtHandle(id))
            }
        })
    }

    fn result_state(&mut self, result: &MemResult) -> NativeResult<ResultState> {
        let mut rows = VecDeque::with_capacity(result.rows.len());
        for row in &result.rows {
            let mut out = Vec::with_capacity(row.len());
            for value in row {
                out.push(self.mem_to_native(value)?);
            }
            rows.push_back(out);
        }
        Ok(ResultState {
            columns: result.columns.clone(),
            rows,
        })
    }

    fn snapshot_binds(&self, stmt: StmtHandle) -> NativeResult<Vec<BoundVar>> {
        let st = self.stmt(stmt)?;
        st.binds
            .iter()
            .map(|(key, var)| {
                let entry = self.vars.get(var).ok_or_else(|| invalid_handle("dpiVar"))?;
                Ok(BoundVar {
                    key: key.clone(),
                    spec: entry.spec,
                    slots: entry.slots.clone(),
                    num_elements: entry.num_elements,
                })
            })
            .collect()
    }

    fn echo_result(&mut self, binds: &[BoundVar], iterations: u32) -> NativeResult<ResultState> {
        let columns = binds
            .iter()
            .map(|b| {
                MemColumn::new(&b.key.to_string(), b.spec.oracle_type, b.spec.native_type)
                    .size(b.spec.size)
            })
            .collect();
        let mut rows = VecDeque::new();
        for i in 0..iterations as usize {
            let mut row = Vec::with_capacity(binds.len());
            for bind in binds {
                let data = bind.slots.get(i).cloned().unwrap_or(NativeData::Null);
                self.add_ref(&data)?;
                row.push(data);
            }
            rows.push_back(row);
        }
        Ok(ResultState { columns, rows })
    }
}

fn check_slot_type(spec: &VarSpec, data: &NativeData) -> NativeResult<()> {
    let ok = match data {
        NativeData::Null => true,
        NativeData::Int64(_) => spec.native_type == NativeTypeNum::Int64,
        NativeData::Uint64(_) => spec.native_type == NativeTypeNum::Uint64,
        NativeData::Float(_) => spec.native_type == NativeTypeNum::Float,
        NativeData::Double(_) => spec.native_type == NativeTypeNum::Double,
        NativeData::Bytes(b) => {
            if !matches!(spec.native_type, NativeTypeNum::Bytes | NativeTypeNum::Rowid) {
                false
            } else if b.len() > spec.size as usize {
                return Err(dpi(
                    1019,
                    format!("buffer size of {} is too small ({} bytes)", spec.size, b.len()),
                ));
            } else {
                true
            }
        }
        NativeData::Timestamp(_) => spec.native_type == NativeTypeNum::Timestamp,
        NativeData::IntervalDs(_) => spec.native_type == NativeTypeNum::IntervalDs,
        NativeData::IntervalYm(_) => spec.native_type == NativeTypeNum::IntervalYm,
        NativeData::Lob(_) => spec.native_type == NativeTypeNum::Lob,
        NativeData::Stmt(_) => spec.native_type == NativeTypeNum::Stmt,
        NativeData::Bool(_) => spec.native_type == NativeTypeNum::Boolean,
    };
    if ok {
        Ok(())
    } else {
        Err(dpi(
            1014,
            format!(
                "conversion between Oracle type {} and native type {} is not implemented",
                spec.oracle_type.as_raw(),
                spec.native_type.as_raw()
            ),
        ))
    }
}

/// In-memory implementation of [`Native`].
#[derive(Debug)]
pub struct MemoryNative {
    state: Mutex<State>,
    interrupted: Condvar,
}

impl Default for MemoryNative {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNative {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                chunk_size: 8132,
                ..State::default()
            }),
            interrupted: Condvar::new(),
        }
    }

    /// Register the behaviour of statements prepared with `sql`.
    pub fn script(&self, sql: &str, script: Script) {
        self.state.lock().scripts.insert(sql.to_string(), script);
    }

    /// Make the next call at `point` fail with `err`.
    pub fn fail_next(&self, point: FaultPoint, err: NativeError) {
        self.state.lock().faults.insert(point, err);
    }

    /// Chunk size reported for LOBs; 0 means "not reported".
    pub fn set_lob_chunk_size(&self, size: u32) {
        self.state.lock().chunk_size = size;
    }

    /// When set, LOB writes store only the first half of each buffer.
    pub fn set_short_writes(&self, short: bool) {
        self.state.lock().short_writes = short;
    }

    /// Create a persistent LOB with the given contents.
    pub fn create_lob(&self, kind: LobKind, data: &[u8]) -> LobHandle {
        self.state.lock().new_lob(kind, data.to_vec(), false)
    }

    pub fn lob_contents(&self, lob: LobHandle) -> Option<Vec<u8>> {
        self.state.lock().lobs.get(&lob.0).map(|l| l.data.clone())
    }

    pub fn lob_kind(&self, lob: LobHandle) -> Option<LobKind> {
        self.state.lock().lobs.get(&lob.0).map(|l| l.kind)
    }

    pub fn lob_is_open(&self, lob: LobHandle) -> bool {
        self.state.lock().lobs.get(&lob.0).is_some_and(|l| l.open)
    }

    pub fn stats(&self) -> MemoryStats {
        self.state.lock().stats
    }

    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.state.lock().executions.clone()
    }

    pub fn last_execution(&self) -> Option<ExecutionRecord> {
        self.state.lock().executions.last().cloned()
    }

    pub fn live_vars(&self) -> usize {
        self.state.lock().vars.len()
    }

    pub fn live_stmts(&self) -> usize {
        self.state.lock().stmts.len()
    }

    pub fn live_lobs(&self) -> usize {
        self.state.lock().lobs.len()
    }

    pub fn live_temp_lobs(&self) -> usize {
        self.state.lock().lobs.values().filter(|l| l.temp).count()
    }

    fn execute(&self, stmt: StmtHandle, mode: ExecMode, iterations: u32, many: bool) -> NativeResult<u32> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Execute)?;
        let binds = state.snapshot_binds(stmt)?;
        let (sql, placeholder_count) = {
            let st = state.stmt(stmt)?;
            (st.sql.clone(), st.placeholders.len())
        };
        state.executions.push(ExecutionRecord {
            sql: sql.clone(),
            mode,
            iterations,
            many,
            binds: binds.clone(),
        });
        if mode.contains(ExecMode::PARSE_ONLY) {
            return Ok(0);
        }
        if binds.len() < placeholder_count {
            return Err(ora(1008, "not all variables bound"));
        }
        let script = state
            .scripts
            .get(&sql)
            .cloned()
            .ok_or_else(|| ora(942, "table or view does not exist"))?;

        let num_columns = match script {
            Script::Fail(err) => return Err(err),
            Script::Blocking => {
                let deadline = Instant::now() + BLOCKING_TIMEOUT;
                while !state.break_requested {
                    if self.interrupted.wait_until(&mut state, deadline).timed_out() {
                        return Err(dpi(1080, "blocking statement was never interrupted"));
                    }
                }
                state.break_requested = false;
                return Err(ora(ORA_USER_CANCEL, "user requested cancel of current operation"));
            }
            Script::Dml { rows_per_execution } => {
                state.replace_result(stmt, None)?;
                state.stmt_mut(stmt)?.row_count = rows_per_execution * u64::from(iterations);
                0
            }
            Script::Query(result) => {
                let result = state.result_state(&result)?;
                let n = result.columns.len() as u32;
                state.replace_result(stmt, Some(result))?;
                state.stmt_mut(stmt)?.row_count = 0;
                n
            }
            Script::Echo => {
                let result = state.echo_result(&binds, iterations)?;
                let n = result.columns.len() as u32;
                state.replace_result(stmt, Some(result))?;
                state.stmt_mut(stmt)?.row_count = 0;
                n
            }
        };
        if mode.contains(ExecMode::COMMIT_ON_SUCCESS) {
            state.stats.auto_commits += 1;
        }
        Ok(num_columns)
    }
}

impl Native for MemoryNative {
    fn prepare(&self, sql: &str) -> NativeResult<StmtHandle> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Prepare)?;
        let id = state.next_id();
        state.stmts.insert(id, MemStmt::new(sql));
        Ok(StmtHandle(id))
    }

    fn commit(&self) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Commit)?;
        state.stats.commits += 1;
        Ok(())
    }

    fn rollback(&self) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Rollback)?;
        state.stats.rollbacks += 1;
        Ok(())
    }

    fn break_execution(&self) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Break)?;
        state.stats.breaks += 1;
        state.break_requested = true;
        self.interrupted.notify_all();
        Ok(())
    }

    fn ping(&self) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Ping)?;
        state.stats.pings += 1;
        Ok(())
    }

    fn stmt_add_ref(&self, stmt: StmtHandle) -> NativeResult<()> {
        self.state.lock().stmt_mut(stmt)?.refs += 1;
        Ok(())
    }

    fn stmt_release(&self, stmt: StmtHandle) -> NativeResult<()> {
        self.state.lock().release_stmt(stmt)
    }

    fn stmt_execute(&self, stmt: StmtHandle, mode: ExecMode) -> NativeResult<u32> {
        self.execute(stmt, mode, 1, false)
    }

    fn stmt_execute_many(&self, stmt: StmtHandle, mode: ExecMode, num_iters: u32) -> NativeResult<()> {
        self.execute(stmt, mode, num_iters, true).map(|_| ())
    }

    fn stmt_bind_count(&self, stmt: StmtHandle) -> NativeResult<u32> {
        Ok(self.state.lock().stmt(stmt)?.placeholders.len() as u32)
    }

    fn stmt_bind_by_pos(&self, stmt: StmtHandle, pos: u32, var: VarHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::BindByPos)?;
        if !state.vars.contains_key(&var.0) {
            return Err(invalid_handle("dpiVar"));
        }
        let st = state.stmt_mut(stmt)?;
        if pos == 0 || pos as usize > st.placeholders.len() {
            return Err(ora(1036, "illegal variable name/number"));
        }
        let key = BindKey::Pos(pos);
        st.binds.retain(|(k, _)| *k != key);
        st.binds.push((key, var.0));
        Ok(())
    }

    fn stmt_bind_by_name(&self, stmt: StmtHandle, name: &str, var: VarHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::BindByName)?;
        if !state.vars.contains_key(&var.0) {
            return Err(invalid_handle("dpiVar"));
        }
        let st = state.stmt_mut(stmt)?;
        let upper = name.trim_start_matches(':').to_uppercase();
        if !st.placeholders.contains(&upper) {
            return Err(ora(1036, "illegal variable name/number"));
        }
        let key = BindKey::Name(upper);
        st.binds.retain(|(k, _)| *k != key);
        st.binds.push((key, var.0));
        Ok(())
    }

    fn stmt_row_count(&self, stmt: StmtHandle) -> NativeResult<u64> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::RowCount)?;
        Ok(state.stmt(stmt)?.row_count)
    }

    fn stmt_set_fetch_array_size(&self, stmt: StmtHandle, size: u32) -> NativeResult<()> {
        if size == 0 {
            return Err(dpi(1031, "array size cannot be zero"));
        }
        self.state.lock().stmt_mut(stmt)?.fetch_array_size = size;
        Ok(())
    }

    fn stmt_num_query_columns(&self, stmt: StmtHandle) -> NativeResult<u32> {
        let state = self.state.lock();
        let st = state.stmt(stmt)?;
        Ok(st.result.as_ref().map_or(0, |r| r.columns.len() as u32))
    }

    fn stmt_query_info(&self, stmt: StmtHandle, pos: u32) -> NativeResult<QueryInfo> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::QueryInfo)?;
        let st = state.stmt(stmt)?;
        st.result
            .as_ref()
            .and_then(|r| r.columns.get((pos as usize).wrapping_sub(1)))
            .map(MemColumn::query_info)
            .ok_or_else(|| dpi(1028, format!("query position {} is invalid", pos)))
    }

    fn stmt_define(&self, stmt: StmtHandle, pos: u32, var: VarHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Define)?;
        if !state.vars.contains_key(&var.0) {
            return Err(invalid_handle("dpiVar"));
        }
        let st = state.stmt_mut(stmt)?;
        let columns = st.result.as_ref().map_or(0, |r| r.columns.len() as u32);
        if pos == 0 || pos > columns {
            return Err(dpi(1028, format!("query position {} is invalid", pos)));
        }
        st.defines.insert(pos, var.0);
        Ok(())
    }

    fn stmt_fetch_rows(&self, stmt: StmtHandle, max_rows: u32) -> NativeResult<FetchInfo> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Fetch)?;
        state.stats.fetch_calls += 1;
        let (rows, defines, more_rows) = {
            let st = state.stmt_mut(stmt)?;
            let limit = max_rows.min(st.fetch_array_size) as usize;
            let result = st
                .result
                .as_mut()
                .ok_or_else(|| dpi(1013, "not supported for a statement that is not a query"))?;
            let n = limit.min(result.rows.len());
            let rows: Vec<Vec<NativeData>> = result.rows.drain(..n).collect();
            let more = !result.rows.is_empty();
            st.row_count += n as u64;
            (rows, st.defines.clone(), more)
        };
        let num_rows = rows.len() as u32;
        for (r, row) in rows.into_iter().enumerate() {
            for (c, data) in row.into_iter().enumerate() {
                match defines.get(&(c as u32 + 1)) {
                    Some(&var) => state.put_slot(var, r as u32, data, false)?,
                    None => {
                        state.release_data(data)?;
                        return Err(dpi(1059, format!("variable not defined for column {}", c + 1)));
                    }
                }
            }
        }
        Ok(FetchInfo {
            buffer_row_index: 0,
            num_rows_fetched: num_rows,
            more_rows,
        })
    }

    fn var_new(&self, spec: VarSpec) -> NativeResult<VarHandle> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::VarNew)?;
        if spec.max_array_size == 0 {
            return Err(dpi(1031, "array size cannot be zero"));
        }
        if spec.native_type == NativeTypeNum::Bytes && spec.size == 0 {
            return Err(dpi(1019, "buffer size of 0 is too small"));
        }
        let id = state.next_id();
        state.vars.insert(
            id,
            MemVar {
                spec,
                slots: vec![NativeData::Null; spec.max_array_size as usize],
                num_elements: if spec.is_array { 0 } else { spec.max_array_size },
            },
        );
        Ok(VarHandle(id))
    }

    fn var_set(&self, var: VarHandle, pos: u32, data: NativeData) -> NativeResult<()> {
        self.state.lock().put_slot(var.0, pos, data, true)
    }

    fn var_get(&self, var: VarHandle, pos: u32) -> NativeResult<NativeData> {
        let state = self.state.lock();
        let entry = state.vars.get(&var.0).ok_or_else(|| invalid_handle("dpiVar"))?;
        entry.slots.get(pos as usize).cloned().ok_or_else(|| {
            dpi(
                1009,
                format!(
                    "zero-based position {} is not valid with max array size of {}",
                    pos, entry.spec.max_array_size
                ),
            )
        })
    }

    fn var_set_num_elements(&self, var: VarHandle, num: u32) -> NativeResult<()> {
        let mut state = self.state.lock();
        let entry = state.vars.get_mut(&var.0).ok_or_else(|| invalid_handle("dpiVar"))?;
        if !entry.spec.is_array {
            return Err(dpi(1050, "variable is not an array"));
        }
        if num > entry.spec.max_array_size {
            return Err(dpi(1018, format!("array size of {} is too small", entry.spec.max_array_size)));
        }
        entry.num_elements = num;
        Ok(())
    }

    fn var_release(&self, var: VarHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        let entry = state.vars.remove(&var.0).ok_or_else(|| invalid_handle("dpiVar"))?;
        for data in entry.slots {
            state.release_data(data)?;
        }
        Ok(())
    }

    fn lob_new_temp(&self, kind: LobKind) -> NativeResult<LobHandle> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::TempLob)?;
        if kind == LobKind::Bfile {
            return Err(ora(22275, "invalid LOB locator specified"));
        }
        Ok(state.new_lob(kind, Vec::new(), true))
    }

    fn lob_add_ref(&self, lob: LobHandle) -> NativeResult<()> {
        self.state.lock().lob_mut(lob)?.refs += 1;
        Ok(())
    }

    fn lob_release(&self, lob: LobHandle) -> NativeResult<()> {
        self.state.lock().release_lob(lob)
    }

    fn lob_chunk_size(&self, lob: LobHandle) -> NativeResult<u32> {
        let mut state = self.state.lock();
        let chunk = state.chunk_size;
        state.lob_mut(lob)?;
        Ok(chunk)
    }

    fn lob_size(&self, lob: LobHandle) -> NativeResult<u64> {
        Ok(self.state.lock().lob_mut(lob)?.data.len() as u64)
    }

    fn lob_read_bytes(&self, lob: LobHandle, offset: u64, buf: &mut [u8]) -> NativeResult<u64> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::LobRead)?;
        state.stats.lob_reads += 1;
        let entry = state.lob_mut(lob)?;
        if offset == 0 {
            return Err(ora(24801, "illegal parameter value in OCI lob function"));
        }
        let start = (offset - 1) as usize;
        if start >= entry.data.len() {
            return Err(ora(ORA_NO_DATA_FOUND, "no data found"));
        }
        let n = buf.len().min(entry.data.len() - start);
        buf[..n].copy_from_slice(&entry.data[start..start + n]);
        Ok(n as u64)
    }

    fn lob_write_bytes(&self, lob: LobHandle, offset: u64, data: &[u8]) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::LobWrite)?;
        state.stats.lob_writes += 1;
        let short = state.short_writes;
        let entry = state.lob_mut(lob)?;
        if !entry.open {
            return Err(ora(22289, "cannot perform operation on an unopened file or LOB"));
        }
        if offset == 0 || (offset - 1) as usize > entry.data.len() {
            return Err(ora(24801, "illegal parameter value in OCI lob function"));
        }
        let data = if short { &data[..data.len() / 2] } else { data };
        let start = (offset - 1) as usize;
        let end = start + data.len();
        if end > entry.data.len() {
            entry.data.resize(end, 0);
        }
        entry.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn lob_open_resource(&self, lob: LobHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::LobOpen)?;
        state.stats.lob_opens += 1;
        let entry = state.lob_mut(lob)?;
        if entry.open {
            return Err(ora(22293, "LOB already opened in the same transaction"));
        }
        entry.open = true;
        Ok(())
    }

    fn lob_flush_buffer(&self, lob: LobHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::LobFlush)?;
        state.stats.lob_flushes += 1;
        state.lob_mut(lob)?;
        Ok(())
    }

    fn lob_close_resource(&self, lob: LobHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::LobClose)?;
        state.stats.lob_closes += 1;
        let entry = state.lob_mut(lob)?;
        if !entry.open {
            return Err(ora(22289, "cannot perform operation on an unopened file or LOB"));
        }
        entry.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_var(native: &MemoryNative, slots: u32) -> VarHandle {
        native
            .var_new(VarSpec {
                oracle_type: OracleTypeNum::Number,
                native_type: NativeTypeNum::Int64,
                max_array_size: slots,
                size: 0,
                is_array: false,
            })
            .unwrap()
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders("SELECT :1, :2 FROM dual"), vec!["1", "2"]);
        assert_eq!(
            placeholders("UPDATE t SET a = :a WHERE b = :b AND c = ':x' AND d = :A"),
            vec!["A", "B"]
        );
        assert!(placeholders("SELECT 1 FROM dual").is_empty());
    }

    #[test]
    fn test_var_slots_checked() {
        let native = MemoryNative::new();
        let var = int_var(&native, 2);
        native.var_set(var, 1, NativeData::Int64(7)).unwrap();
        assert_eq!(native.var_get(var, 1).unwrap(), NativeData::Int64(7));
        assert_eq!(native.var_get(var, 0).unwrap(), NativeData::Null);

        let err = native.var_set(var, 2, NativeData::Int64(1)).unwrap_err();
        assert!(err.message.starts_with("DPI-1009"));
        let err = native.var_set(var, 0, NativeData::Double(1.0)).unwrap_err();
        assert!(err.message.starts_with("DPI-1014"));

        native.var_release(var).unwrap();
        assert!(native.var_release(var).is_err());
        assert_eq!(native.live_vars(), 0);
    }

    #[test]
    fn test_bytes_capacity_enforced() {
        let native = MemoryNative::new();
        let spec = VarSpec {
            oracle_type: OracleTypeNum::Raw,
            native_type: NativeTypeNum::Bytes,
            max_array_size: 1,
            size: 3,
            is_array: false,
        };
        let var = native.var_new(spec).unwrap();
        native
            .var_set(var, 0, NativeData::Bytes(Bytes::from_static(b"abc")))
            .unwrap();
        let err = native
            .var_set(var, 0, NativeData::Bytes(Bytes::from_static(b"abcd")))
            .unwrap_err();
        assert!(err.message.starts_with("DPI-1019"));

        let zero = native.var_new(VarSpec { size: 0, ..spec }).unwrap_err();
        assert!(zero.message.starts_with("DPI-1019"));
    }

    #[test]
    fn test_lob_refs_follow_slots() {
        let native = MemoryNative::new();
        let lob = native.lob_new_temp(LobKind::Blob).unwrap();
        let var = native
            .var_new(VarSpec {
                oracle_type: OracleTypeNum::Blob,
                native_type: NativeTypeNum::Lob,
                max_array_size: 1,
                size: 0,
                is_array: false,
            })
            .unwrap();
        native.var_set(var, 0, NativeData::Lob(lob)).unwrap();
        native.lob_release(lob).unwrap();
        assert_eq!(native.live_temp_lobs(), 1);
        native.var_release(var).unwrap();
        assert_eq!(native.live_temp_lobs(), 0);
    }

    #[test]
    fn test_lob_read_past_end_is_no_data_found() {
        let native = MemoryNative::new();
        let lob = native.create_lob(LobKind::Clob, b"hello");
        let mut buf = [0u8; 4];
        assert_eq!(native.lob_read_bytes(lob, 1, &mut buf).unwrap(), 4);
        assert_eq!(native.lob_read_bytes(lob, 5, &mut buf).unwrap(), 1);
        let err = native.lob_read_bytes(lob, 6, &mut buf).unwrap_err();
        assert!(err.is_no_data_found());
    }

    #[test]
    fn test_lob_write_requires_open() {
        let native = MemoryNative::new();
        let lob = native.lob_new_temp(LobKind::Clob).unwrap();
        assert!(native.lob_write_bytes(lob, 1, b"x").is_err());
        native.lob_open_resource(lob).unwrap();
        native.lob_write_bytes(lob, 1, b"xy").unwrap();
        native.lob_write_bytes(lob, 3, b"z").unwrap();
        assert_eq!(native.lob_size(lob).unwrap(), 3);
        native.lob_close_resource(lob).unwrap();
        assert_eq!(native.lob_contents(lob).unwrap(), b"xyz");
    }

    #[test]
    fn test_fault_fires_once() {
        let native = MemoryNative::new();
        native.fail_next(FaultPoint::Prepare, ora(900, "invalid SQL statement"));
        assert_eq!(native.prepare("x").unwrap_err().code, 900);
        assert!(native.prepare("x").is_ok());
    }

    #[test]
    fn test_dml_script_row_count() {
        let native = MemoryNative::new();
        native.script("DELETE FROM t", Script::dml(4));
        let stmt = native.prepare("DELETE FROM t").unwrap();
        native
            .stmt_execute_many(stmt, ExecMode::COMMIT_ON_SUCCESS, 3)
            .unwrap();
        assert_eq!(native.stmt_row_count(stmt).unwrap(), 12);
        assert_eq!(native.stats().auto_commits, 1);
        native.stmt_release(stmt).unwrap();
        assert_eq!(native.live_stmts(), 0);
    }

    #[test]
    fn test_unbound_placeholder_rejected() {
        let native = MemoryNative::new();
        native.script("DELETE FROM t WHERE id = :1", Script::dml(1));
        let stmt = native.prepare("DELETE FROM t WHERE id = :1").unwrap();
        let err = native.stmt_execute(stmt, ExecMode::DEFAULT).unwrap_err();
        assert_eq!(err.code, 1008);
        assert_eq!(native.stmt_execute(stmt, ExecMode::PARSE_ONLY).unwrap(), 0);
        assert_eq!(native.stmt_bind_count(stmt).unwrap(), 1);
    }
}
