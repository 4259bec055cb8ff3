//! Cursor for iterating over query results with buffering.
//!
//! The cursor module provides a trait-based interface for iterating over query
//! results. The `Cursor` trait defines the common interface, while `RowCursor`
//! materializes rows out of the native column buffers.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeDelta, TimeZone};
use futures::Stream;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, trace, warn};

use crate::buffer::VarBuffer;
use crate::error::{Error, NativeContext, Result};
use crate::lob::{Lob, LobReader};
use crate::native::{
    LobHandle, Native, NativeData, NativeIntervalDs, NativeTimestamp, OracleTypeNum, StmtHandle,
    VarSpec,
};
use crate::statement::StatementState;
use crate::types::{Column, ColumnInfo, NumberRepr, Row, Value};

/// Base trait for all cursor types.
///
/// Each cursor implementation specifies its Item type and implements
/// the async methods for fetching items.
///
/// # Example
///
/// ```
/// use oracle_dpi_rs::{Cursor, Row};
///
/// // Generic function that works with any cursor type
/// async fn count_rows<C: Cursor<Item = Row>>(cursor: &mut C) -> oracle_dpi_rs::Result<u64> {
///     let mut count = 0;
///     while cursor.next().await?.is_some() {
///         count += 1;
///     }
///     Ok(count)
/// }
/// ```
pub trait Cursor {
    /// The type of item this cursor yields.
    type Item;

    /// Column metadata for this cursor.
    fn columns(&self) -> &[Column];

    /// Number of rows fetched so far.
    fn rowcount(&self) -> u64;

    /// Check if the cursor is closed.
    fn is_closed(&self) -> bool;

    /// Check if more items may be available (buffered or native).
    fn has_more(&self) -> bool;

    /// Rows per native fetch.
    fn fetch_size(&self) -> u32;

    /// Close the cursor and release native resources.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Get the next item, fetching from the native layer if the buffer is
    /// exhausted.
    ///
    /// Returns `Ok(None)` when exhausted.
    fn next(&mut self) -> impl Future<Output = Result<Option<Self::Item>>> + Send;

    /// Fetch all remaining items into a vector.
    fn fetch_all(&mut self) -> impl Future<Output = Result<Vec<Self::Item>>> + Send;
}

/// Row-by-row cursor over a query result.
///
/// One native variable per column holds `fetch_size` rows. A `next()` with
/// no buffered rows performs exactly one native fetch; once a fetch returns
/// no rows and the native layer reports no more, the cursor is exhausted
/// and stays that way without further native calls.
///
/// # Lifecycle
///
/// 1. Created by `Statement::query()` (or as a nested cursor value)
/// 2. Iterated via `next()` or `fetch_all()`
/// 3. Closed explicitly via `close()` or on drop
pub struct RowCursor {
    native: Arc<dyn Native>,
    /// `None` once closed, or if a fetch was abandoned mid-flight.
    target: Option<FetchTarget>,
    columns: Arc<ColumnInfo>,
    fetch_size: u32,
    /// Slot of the next buffered row.
    buffer_row: u32,
    /// Rows left in the buffers.
    buffered: u32,
    finished: bool,
    rows_fetched: u64,
}

/// Everything a native fetch writes into.
///
/// Moved onto the blocking thread for each fetch and handed back when the
/// call returns, so nothing here is released while the call is running.
struct FetchTarget {
    native: Arc<dyn Native>,
    /// Statement reference held by the cursor.
    stmt: Option<StmtHandle>,
    buffers: Vec<VarBuffer>,
    /// Exclusive use of the owning statement.
    _lease: Option<OwnedMutexGuard<StatementState>>,
}

impl FetchTarget {
    /// Release the column buffers, then the statement reference.
    fn release(&mut self) -> Result<()> {
        let mut first_err = None;
        for buf in &mut self.buffers {
            if let Err(e) = buf.release() {
                first_err.get_or_insert(e);
            }
        }
        if let Some(stmt) = self.stmt.take() {
            if let Err(e) = self
                .native
                .stmt_release(stmt)
                .context(|| format!("release {}", stmt))
            {
                first_err.get_or_insert(e);
            }
        }
        self._lease = None;
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for FetchTarget {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to release cursor resources");
        }
    }
}

impl RowCursor {
    /// Describe and define `num_columns` columns of an executed query.
    pub(crate) fn open(
        native: &Arc<dyn Native>,
        stmt: StmtHandle,
        num_columns: u32,
        fetch_size: u32,
        lease: Option<OwnedMutexGuard<StatementState>>,
    ) -> Result<Self> {
        let fetch_size = fetch_size.max(1);
        native
            .stmt_set_fetch_array_size(stmt, fetch_size)
            .context(|| format!("set fetch array size of {}", stmt))?;

        let mut columns = Vec::with_capacity(num_columns as usize);
        let mut buffers = Vec::with_capacity(num_columns as usize);
        for pos in 1..=num_columns {
            let index = pos as usize - 1;
            let info = native
                .stmt_query_info(stmt, pos)
                .context(|| format!("describe column {} of {}", pos, stmt))?;
            let col = Column::from_query_info(&info);
            let (Some(oracle_type), Some(native_type)) = (col.oracle_type(), col.native_type())
            else {
                return Err(Error::UnsupportedColumnType {
                    index,
                    type_num: col.oracle_type_num,
                });
            };

            let buf = VarBuffer::new(
                native,
                VarSpec {
                    oracle_type,
                    native_type,
                    max_array_size: fetch_size,
                    size: col.buffer_size(),
                    is_array: false,
                },
            )?;
            if let Some(var) = buf.handle() {
                native
                    .stmt_define(stmt, pos, var)
                    .context(|| format!("define column {} of {}", pos, stmt))?;
            }
            columns.push(col);
            buffers.push(buf);
        }

        native
            .stmt_add_ref(stmt)
            .context(|| format!("add reference to {}", stmt))?;
        debug!(%stmt, columns = num_columns, fetch_size, "cursor open");

        Ok(Self {
            native: Arc::clone(native),
            target: Some(FetchTarget {
                native: Arc::clone(native),
                stmt: Some(stmt),
                buffers,
                _lease: lease,
            }),
            columns: Arc::new(ColumnInfo::new(columns)),
            fetch_size,
            buffer_row: 0,
            buffered: 0,
            finished: false,
            rows_fetched: 0,
        })
    }

    /// Get column metadata.
    pub fn columns(&self) -> &[Column] {
        &self.columns.columns
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.column_names()
    }

    /// Get the number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows currently buffered.
    pub fn buffered_count(&self) -> usize {
        self.buffered as usize
    }

    fn stmt(&self) -> Option<StmtHandle> {
        self.target.as_ref().and_then(|t| t.stmt)
    }

    /// Internal: one native fetch into the column buffers.
    async fn do_fetch(&mut self, stmt: StmtHandle) -> Result<()> {
        let Some(target) = self.target.take() else {
            return Ok(());
        };
        let size = self.fetch_size;
        let (target, fetched) = tokio::task::spawn_blocking(move || {
            let fetched = target.native.stmt_fetch_rows(stmt, size);
            (target, fetched)
        })
        .await?;
        self.target = Some(target);
        let info = fetched.context(|| format!("fetch rows of {}", stmt))?;
        trace!(%stmt, rows = info.num_rows_fetched, more = info.more_rows, "fetch");

        self.buffer_row = info.buffer_row_index;
        self.buffered = info.num_rows_fetched;
        self.rows_fetched += u64::from(info.num_rows_fetched);
        if info.num_rows_fetched == 0 {
            self.finished = !info.more_rows;
        }
        Ok(())
    }

    /// Internal: convert the row at the current buffer slot.
    ///
    /// The slot is consumed even when a column fails to convert.
    fn materialize(&mut self) -> Result<Row> {
        let slot = self.buffer_row;
        self.buffer_row += 1;
        self.buffered -= 1;
        let Some(target) = &self.target else {
            return Err(Error::StatementClosed);
        };
        let mut values = Vec::with_capacity(target.buffers.len());
        for (index, (col, buf)) in self.columns.columns.iter().zip(&target.buffers).enumerate() {
            let data = buf.get(slot)?;
            values.push(convert(&self.native, self.fetch_size, index, col, data)?);
        }
        Ok(Row::new(values, Arc::clone(&self.columns)))
    }

    /// Release the column buffers and the statement reference.
    fn release(&mut self) -> Result<()> {
        self.buffered = 0;
        self.finished = true;
        let Some(mut target) = self.target.take() else {
            return Ok(());
        };
        if let Some(stmt) = target.stmt {
            debug!(%stmt, rows = self.rows_fetched, "cursor closed");
        }
        target.release()
    }
}

impl Cursor for RowCursor {
    type Item = Row;

    fn columns(&self) -> &[Column] {
        &self.columns.columns
    }

    fn rowcount(&self) -> u64 {
        self.rows_fetched
    }

    fn is_closed(&self) -> bool {
        self.stmt().is_none()
    }

    fn has_more(&self) -> bool {
        self.buffered > 0 || (!self.finished && self.stmt().is_some())
    }

    fn fetch_size(&self) -> u32 {
        self.fetch_size
    }

    async fn close(&mut self) -> Result<()> {
        self.release()
    }

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        let Some(stmt) = self.stmt() else {
            return Ok(None);
        };

        if self.buffered == 0 {
            if self.finished {
                return Ok(None);
            }
            self.do_fetch(stmt).await?;
            if self.buffered == 0 {
                return Ok(None);
            }
        }

        self.materialize().map(Some)
    }

    async fn fetch_all(&mut self) -> Result<Vec<Self::Item>> {
        let mut all_rows = Vec::new();
        while let Some(row) = self.next().await? {
            all_rows.push(row);
        }
        Ok(all_rows)
    }
}

impl Drop for RowCursor {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to close cursor");
        }
    }
}

impl std::fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("stmt", &self.stmt())
            .field("columns", &self.columns.column_names())
            .field("fetch_size", &self.fetch_size)
            .field("rows_fetched", &self.rows_fetched)
            .field("finished", &self.finished)
            .finish()
    }
}

fn mismatch(index: usize, col: &Column) -> Error {
    Error::UnsupportedColumnType {
        index,
        type_num: col.oracle_type_num,
    }
}

/// Convert one fetched slot to a generic value.
fn convert(
    native: &Arc<dyn Native>,
    fetch_size: u32,
    index: usize,
    col: &Column,
    data: NativeData,
) -> Result<Value> {
    use OracleTypeNum as O;

    if data.is_null() {
        return Ok(Value::Null);
    }
    let Some(oracle_type) = col.oracle_type() else {
        return Err(mismatch(index, col));
    };

    let value = match (oracle_type, data) {
        (
            O::Varchar | O::NVarchar | O::Char | O::NChar | O::LongVarchar,
            NativeData::Bytes(b),
        ) => Value::String(String::from_utf8_lossy(&b).into_owned()),

        (O::Number, data) => match (col.number_repr, data) {
            (Some(NumberRepr::Int64), NativeData::Int64(v)) => Value::Int64(v),
            (Some(NumberRepr::Uint64), NativeData::Uint64(v)) => Value::Uint64(v),
            (Some(NumberRepr::Float), NativeData::Float(v)) => Value::Float(v),
            (Some(NumberRepr::Double), NativeData::Double(v)) => Value::Double(v),
            (Some(NumberRepr::Decimal), NativeData::Bytes(b)) => {
                Value::Number(String::from_utf8_lossy(&b).into_owned())
            }
            _ => return Err(mismatch(index, col)),
        },

        (O::NativeFloat, NativeData::Float(v)) => Value::Float(v),
        (O::NativeDouble, NativeData::Double(v)) => Value::Double(v),
        (O::NativeInt, NativeData::Int64(v)) => Value::Int64(v),
        (O::NativeUint, NativeData::Uint64(v)) => Value::Uint64(v),

        (O::Raw | O::Rowid | O::LongRaw, NativeData::Bytes(b)) => Value::Raw(b.to_vec()),

        (O::TimestampTz | O::TimestampLtz, NativeData::Timestamp(ts)) => {
            Value::Timestamp(fixed_timestamp(index, &ts)?)
        }
        (O::Date | O::Timestamp, NativeData::Timestamp(ts)) => {
            Value::Timestamp(local_timestamp(index, &ts)?)
        }

        (O::IntervalDs, NativeData::IntervalDs(iv)) => Value::Interval(interval_ds(&iv)),
        (O::IntervalYm, NativeData::IntervalYm(iv)) => {
            Value::IntervalYm(format!("{}y{}m", iv.years, iv.months))
        }

        (O::Clob | O::Nclob | O::Blob | O::Bfile, NativeData::Lob(lob)) => {
            Value::Lob(lob_value(native, lob, matches!(oracle_type, O::Clob | O::Nclob))?)
        }

        (O::Stmt, NativeData::Stmt(stmt)) => {
            let num_columns = native
                .stmt_num_query_columns(stmt)
                .context(|| format!("column count of nested {}", stmt))?;
            let cursor = RowCursor::open(native, stmt, num_columns, fetch_size, None)?;
            Value::Cursor(Box::new(cursor))
        }

        (O::Boolean, NativeData::Bool(b)) => Value::Bool(b),

        _ => return Err(mismatch(index, col)),
    };
    Ok(value)
}

fn lob_value(native: &Arc<dyn Native>, lob: LobHandle, is_clob: bool) -> Result<Lob> {
    let reader = LobReader::new(native, lob)?;
    Ok(Lob::new(reader, is_clob))
}

fn naive(index: usize, ts: &NativeTimestamp) -> Result<chrono::NaiveDateTime> {
    NaiveDate::from_ymd_opt(i32::from(ts.year), u32::from(ts.month), u32::from(ts.day))
        .and_then(|d| {
            d.and_hms_nano_opt(
                u32::from(ts.hour),
                u32::from(ts.minute),
                u32::from(ts.second),
                ts.fsecond,
            )
        })
        .ok_or_else(|| Error::type_conversion(format!("column {}: invalid timestamp {:?}", index, ts)))
}

fn fixed_timestamp(index: usize, ts: &NativeTimestamp) -> Result<DateTime<FixedOffset>> {
    let offset_secs = i32::from(ts.tz_hour_offset) * 3600 + i32::from(ts.tz_minute_offset) * 60;
    let offset = FixedOffset::east_opt(offset_secs).ok_or_else(|| {
        Error::type_conversion(format!("column {}: invalid zone offset {}s", index, offset_secs))
    })?;
    offset
        .from_local_datetime(&naive(index, ts)?)
        .single()
        .ok_or_else(|| Error::type_conversion(format!("column {}: invalid timestamp {:?}", index, ts)))
}

fn local_timestamp(index: usize, ts: &NativeTimestamp) -> Result<DateTime<FixedOffset>> {
    Local
        .from_local_datetime(&naive(index, ts)?)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| {
            Error::type_conversion(format!("column {}: {:?} does not exist in the local zone", index, ts))
        })
}

fn interval_ds(iv: &NativeIntervalDs) -> TimeDelta {
    TimeDelta::days(i64::from(iv.days))
        + TimeDelta::hours(i64::from(iv.hours))
        + TimeDelta::minutes(i64::from(iv.minutes))
        + TimeDelta::seconds(i64::from(iv.seconds))
        + TimeDelta::nanoseconds(i64::from(iv.fseconds))
}

/// Extension trait for converting Cursor to Stream.
///
/// # Example
///
/// ```
/// use futures::stream::TryStreamExt;
/// use oracle_dpi_rs::{CursorStreamExt, Row, RowCursor};
///
/// async fn names(cursor: RowCursor) -> oracle_dpi_rs::Result<Vec<String>> {
///     cursor
///         .into_stream()
///         .map_ok(|row: Row| row.get(0).map(|v| v.to_string()).unwrap_or_default())
///         .try_collect()
///         .await
/// }
/// ```
pub trait CursorStreamExt: Cursor + Sized {
    /// Convert this cursor into a Stream yielding `Result<Item>`.
    ///
    /// The stream takes ownership of the cursor. Each call to `poll_next`
    /// will call `cursor.next()` internally. The stream ends after the
    /// first error.
    fn into_stream(self) -> impl Stream<Item = Result<Self::Item>>;
}

impl<C: Cursor + Unpin> CursorStreamExt for C {
    fn into_stream(self) -> impl Stream<Item = Result<Self::Item>> {
        use futures::stream;

        stream::unfold(Some(self), |opt_cursor| async move {
            let mut cursor = opt_cursor?;
            match cursor.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::memory::{MemColumn, MemValue, MemoryNative, Script};
    use crate::native::{ExecMode, NativeIntervalYm, NativeTypeNum};

    async fn open(mem: &Arc<MemoryNative>, sql: &str, fetch_size: u32) -> RowCursor {
        let native: Arc<dyn Native> = mem.clone();
        let stmt = native.prepare(sql).unwrap();
        let n = native.stmt_execute(stmt, ExecMode::DEFAULT).unwrap();
        let cursor = RowCursor::open(&native, stmt, n, fetch_size, None).unwrap();
        native.stmt_release(stmt).unwrap();
        cursor
    }

    fn ints(n: i64) -> Script {
        Script::query(
            vec![MemColumn::new("N", OracleTypeNum::NativeInt, NativeTypeNum::Int64)],
            (1..=n).map(|i| vec![MemValue::Int(i)]).collect(),
        )
    }

    #[tokio::test]
    async fn test_exhaustion_is_idempotent() {
        let mem = Arc::new(MemoryNative::new());
        mem.script("SELECT n FROM t", ints(2));
        let mut cursor = open(&mem, "SELECT n FROM t", 1).await;
        assert_eq!(cursor.next().await.unwrap().unwrap().get(0), Some(&Value::Int64(1)));
        assert_eq!(cursor.next().await.unwrap().unwrap().get(0), Some(&Value::Int64(2)));
        assert!(cursor.next().await.unwrap().is_none());
        let calls = mem.stats().fetch_calls;
        assert!(cursor.next().await.unwrap().is_none());
        assert!(cursor.next().await.unwrap().is_none());
        assert_eq!(mem.stats().fetch_calls, calls);
        assert!(!cursor.has_more());
        assert_eq!(cursor.rowcount(), 2);
    }

    #[tokio::test]
    async fn test_fetch_size_batches_rows() {
        let mem = Arc::new(MemoryNative::new());
        mem.script("SELECT n FROM t", ints(5));
        let mut cursor = open(&mem, "SELECT n FROM t", 2).await;
        let rows = cursor.fetch_all().await.unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4].get(0), Some(&Value::Int64(5)));
        // 2 + 2 + 1 rows, then an empty fetch
        assert_eq!(mem.stats().fetch_calls, 4);
    }

    #[tokio::test]
    async fn test_close_releases_everything() {
        let mem = Arc::new(MemoryNative::new());
        mem.script("SELECT n FROM t", ints(3));
        let mut cursor = open(&mem, "SELECT n FROM t", 1).await;
        assert_eq!(mem.live_stmts(), 1);
        assert_eq!(mem.live_vars(), 1);
        cursor.close().await.unwrap();
        cursor.close().await.unwrap();
        assert!(cursor.is_closed());
        assert!(cursor.next().await.unwrap().is_none());
        assert_eq!(mem.live_stmts(), 0);
        assert_eq!(mem.live_vars(), 0);
    }

    #[tokio::test]
    async fn test_conversions() {
        let mem = Arc::new(MemoryNative::new());
        let ts = NativeTimestamp {
            year: 2024,
            month: 5,
            day: 17,
            hour: 8,
            minute: 30,
            second: 0,
            fsecond: 500,
            tz_hour_offset: 2,
            tz_minute_offset: 0,
        };
        mem.script(
            "SELECT * FROM v",
            Script::query(
                vec![
                    MemColumn::new("S", OracleTypeNum::Varchar, NativeTypeNum::Bytes).size(10),
                    MemColumn::new("N", OracleTypeNum::Number, NativeTypeNum::Bytes).precision(10, 0),
                    MemColumn::new("D", OracleTypeNum::Number, NativeTypeNum::Bytes).precision(10, 2),
                    MemColumn::new("R", OracleTypeNum::Raw, NativeTypeNum::Bytes).size(4),
                    MemColumn::new("TZ", OracleTypeNum::TimestampTz, NativeTypeNum::Timestamp),
                    MemColumn::new("DS", OracleTypeNum::IntervalDs, NativeTypeNum::IntervalDs),
                    MemColumn::new("YM", OracleTypeNum::IntervalYm, NativeTypeNum::IntervalYm),
                    MemColumn::new("B", OracleTypeNum::Boolean, NativeTypeNum::Boolean),
                    MemColumn::new("X", OracleTypeNum::Varchar, NativeTypeNum::Bytes).size(1),
                ],
                vec![vec![
                    MemValue::Text("héllo".into()),
                    MemValue::Int(42),
                    MemValue::Text("3.14".into()),
                    MemValue::Bytes(vec![0xde, 0xad]),
                    MemValue::Timestamp(ts),
                    MemValue::IntervalDs(NativeIntervalDs {
                        days: 1,
                        hours: 2,
                        minutes: 3,
                        seconds: 4,
                        fseconds: 5,
                    }),
                    MemValue::IntervalYm(NativeIntervalYm { years: 3, months: 7 }),
                    MemValue::Bool(true),
                    MemValue::Null,
                ]],
            ),
        );
        let mut cursor = open(&mem, "SELECT * FROM v", 1).await;
        let row = cursor.next().await.unwrap().unwrap();
        assert_eq!(row.get(0), Some(&Value::String("héllo".into())));
        assert_eq!(row.get(1), Some(&Value::Int64(42)));
        assert_eq!(row.get(2), Some(&Value::Number("3.14".into())));
        assert_eq!(row.get(3), Some(&Value::Raw(vec![0xde, 0xad])));
        let expected = FixedOffset::east_opt(7200)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 17, 8, 30, 0)
            .unwrap()
            + TimeDelta::nanoseconds(500);
        assert_eq!(row.get(4).and_then(Value::as_timestamp), Some(expected));
        assert_eq!(
            row.get(5),
            Some(&Value::Interval(
                TimeDelta::days(1)
                    + TimeDelta::hours(2)
                    + TimeDelta::minutes(3)
                    + TimeDelta::seconds(4)
                    + TimeDelta::nanoseconds(5)
            ))
        );
        assert_eq!(row.get(6), Some(&Value::IntervalYm("3y7m".into())));
        assert_eq!(row.get(7), Some(&Value::Bool(true)));
        assert_eq!(row.get(8), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_date_uses_local_zone() {
        let mem = Arc::new(MemoryNative::new());
        let ts = NativeTimestamp {
            year: 2023,
            month: 1,
            day: 15,
            hour: 12,
            ..NativeTimestamp::default()
        };
        mem.script(
            "SELECT d FROM t",
            Script::query(
                vec![MemColumn::new("D", OracleTypeNum::Date, NativeTypeNum::Timestamp)],
                vec![vec![MemValue::Timestamp(ts)]],
            ),
        );
        let mut cursor = open(&mem, "SELECT d FROM t", 1).await;
        assert_eq!(cursor.columns()[0].native_type(), Some(NativeTypeNum::Timestamp));
        let row = cursor.next().await.unwrap().unwrap();
        let got = row.get(0).and_then(Value::as_timestamp).unwrap();
        assert_eq!(got.naive_local().to_string(), "2023-01-15 12:00:00");
    }

    #[tokio::test]
    async fn test_unsupported_column_type() {
        let mem = Arc::new(MemoryNative::new());
        mem.script(
            "SELECT o FROM t",
            Script::query(
                vec![
                    MemColumn::new("A", OracleTypeNum::NativeInt, NativeTypeNum::Int64),
                    MemColumn::raw("O", 2099, NativeTypeNum::Bytes.as_raw()),
                ],
                vec![],
            ),
        );
        let native: Arc<dyn Native> = mem.clone();
        let stmt = native.prepare("SELECT o FROM t").unwrap();
        let n = native.stmt_execute(stmt, ExecMode::DEFAULT).unwrap();
        let err = RowCursor::open(&native, stmt, n, 1, None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedColumnType { index: 1, type_num: 2099 }));
        native.stmt_release(stmt).unwrap();
        assert_eq!(mem.live_vars(), 0);
        assert_eq!(mem.live_stmts(), 0);
    }

    fn bad_then_good() -> Script {
        let good = NativeTimestamp {
            year: 2020,
            month: 6,
            day: 1,
            ..NativeTimestamp::default()
        };
        let bad = NativeTimestamp { month: 13, ..good };
        Script::query(
            vec![MemColumn::new("TZ", OracleTypeNum::TimestampTz, NativeTypeNum::Timestamp)],
            vec![vec![MemValue::Timestamp(bad)], vec![MemValue::Timestamp(good)]],
        )
    }

    #[tokio::test]
    async fn test_conversion_error_skips_row() {
        let mem = Arc::new(MemoryNative::new());
        mem.script("SELECT tz FROM t", bad_then_good());
        let mut cursor = open(&mem, "SELECT tz FROM t", 2).await;

        let err = cursor.next().await.unwrap_err();
        assert!(matches!(err, Error::TypeConversion { .. }), "{:?}", err);
        let row = cursor.next().await.unwrap().unwrap();
        let got = row.get(0).and_then(Value::as_timestamp).unwrap();
        assert_eq!(got.naive_local().to_string(), "2020-06-01 00:00:00");
        assert!(cursor.next().await.unwrap().is_none());
        assert_eq!(mem.stats().fetch_calls, 2);
    }

    #[tokio::test]
    async fn test_stream_ends_after_error() {
        use futures::StreamExt;

        let mem = Arc::new(MemoryNative::new());
        mem.script("SELECT tz FROM t", bad_then_good());
        let cursor = open(&mem, "SELECT tz FROM t", 2).await;

        let items: Vec<_> = cursor.into_stream().collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
        assert_eq!(mem.live_vars(), 0);
    }
}
