//! Argument values and their native mapping.

use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use tracing::{trace, warn};

use crate::buffer::VarBuffer;
use crate::config::StatementOptions;
use crate::error::{Error, NativeContext, Result};
use crate::lob::{copy_chunked, Lob, LobWriter};
use crate::native::{
    LobKind, Native, NativeData, NativeTimestamp, NativeTypeNum, OracleTypeNum,
};

/// A bind argument value.
///
/// Scalar variants bind one value; `*Array` variants bind one element per
/// batch row (or the whole array as a PL/SQL collection). `Bytes` is a
/// scalar even though it is a sequence.
#[derive(Debug)]
pub enum BindValue {
    Null,
    Bytes(Vec<u8>),
    BytesArray(Vec<Vec<u8>>),
    Text(String),
    TextArray(Vec<String>),
    Int(i64),
    IntArray(Vec<i64>),
    Uint(u64),
    UintArray(Vec<u64>),
    Float(f32),
    FloatArray(Vec<f32>),
    Double(f64),
    DoubleArray(Vec<f64>),
    Bool(bool),
    BoolArray(Vec<bool>),
    Timestamp(DateTime<FixedOffset>),
    TimestampArray(Vec<DateTime<FixedOffset>>),
    Lob(Lob),
    LobArray(Vec<Lob>),
    /// Output placeholder; binds like the wrapped value.
    Out(Box<BindValue>),
}

/// Native mapping of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub oracle_type: OracleTypeNum,
    pub native_type: NativeTypeNum,
    /// Bytes per slot; 0 for fixed-size representations.
    pub capacity: u32,
}

impl BindValue {
    /// Wrap a value as an output placeholder.
    pub fn out(value: impl Into<BindValue>) -> Self {
        BindValue::Out(Box::new(value.into()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            BindValue::Null => "NULL",
            BindValue::Bytes(_) => "bytes",
            BindValue::BytesArray(_) => "[]bytes",
            BindValue::Text(_) => "string",
            BindValue::TextArray(_) => "[]string",
            BindValue::Int(_) => "int64",
            BindValue::IntArray(_) => "[]int64",
            BindValue::Uint(_) => "uint64",
            BindValue::UintArray(_) => "[]uint64",
            BindValue::Float(_) => "float32",
            BindValue::FloatArray(_) => "[]float32",
            BindValue::Double(_) => "float64",
            BindValue::DoubleArray(_) => "[]float64",
            BindValue::Bool(_) => "bool",
            BindValue::BoolArray(_) => "[]bool",
            BindValue::Timestamp(_) => "timestamp",
            BindValue::TimestampArray(_) => "[]timestamp",
            BindValue::Lob(_) => "lob",
            BindValue::LobArray(_) => "[]lob",
            BindValue::Out(inner) if matches!(**inner, BindValue::Out(_)) => "out(out)",
            BindValue::Out(inner) => inner.type_name(),
        }
    }

    /// Length of an array argument; `None` for scalars.
    pub fn array_len(&self) -> Option<usize> {
        match self {
            BindValue::BytesArray(v) => Some(v.len()),
            BindValue::TextArray(v) => Some(v.len()),
            BindValue::IntArray(v) => Some(v.len()),
            BindValue::UintArray(v) => Some(v.len()),
            BindValue::FloatArray(v) => Some(v.len()),
            BindValue::DoubleArray(v) => Some(v.len()),
            BindValue::BoolArray(v) => Some(v.len()),
            BindValue::TimestampArray(v) => Some(v.len()),
            BindValue::LobArray(v) => Some(v.len()),
            BindValue::Out(inner) => inner.array_len(),
            _ => None,
        }
    }

    /// Strip one `Out` level. `index` is the 1-based argument position.
    fn unwrap_out(&mut self, index: usize) -> Result<&mut BindValue> {
        match self {
            BindValue::Out(inner) => match **inner {
                BindValue::Out(_) => Err(Error::unsupported_bind(index, "out(out)")),
                _ => Ok(&mut **inner),
            },
            other => Ok(other),
        }
    }

    /// Native types and slot capacity for this value.
    pub(crate) fn dispatch(&self, index: usize, opts: &StatementOptions) -> Result<Dispatch> {
        use NativeTypeNum as N;
        use OracleTypeNum as O;

        let fixed = |oracle_type, native_type| Dispatch {
            oracle_type,
            native_type,
            capacity: 0,
        };
        let sized = |oracle_type, capacity: usize| Dispatch {
            oracle_type,
            native_type: N::Bytes,
            capacity: u32::try_from(capacity.max(1)).unwrap_or(u32::MAX),
        };
        let text_capacity = |s: &String| s.chars().count() * opts.text_capacity_factor;

        let d = match self {
            BindValue::Null => return Err(Error::unsupported_bind(index, "NULL")),
            BindValue::Out(inner) => {
                if matches!(**inner, BindValue::Out(_)) {
                    return Err(Error::unsupported_bind(index, "out(out)"));
                }
                return inner.dispatch(index, opts);
            }
            BindValue::Bytes(b) => sized(O::Raw, b.len()),
            BindValue::BytesArray(v) => sized(O::Raw, v.iter().map(Vec::len).max().unwrap_or(0)),
            BindValue::Text(s) => sized(O::Varchar, text_capacity(s)),
            BindValue::TextArray(v) => sized(O::Varchar, v.iter().map(text_capacity).max().unwrap_or(0)),
            BindValue::Int(_) | BindValue::IntArray(_) => fixed(O::Number, N::Int64),
            BindValue::Uint(_) | BindValue::UintArray(_) => fixed(O::Number, N::Uint64),
            BindValue::Float(_) | BindValue::FloatArray(_) => fixed(O::Number, N::Float),
            BindValue::Double(_) | BindValue::DoubleArray(_) => fixed(O::Number, N::Double),
            BindValue::Bool(_) | BindValue::BoolArray(_) => fixed(O::Boolean, N::Boolean),
            BindValue::Timestamp(ts) => {
                timestamp_year(index, ts)?;
                fixed(O::TimestampTz, N::Timestamp)
            }
            BindValue::TimestampArray(v) => {
                for ts in v {
                    timestamp_year(index, ts)?;
                }
                fixed(O::TimestampTz, N::Timestamp)
            }
            BindValue::Lob(lob) => fixed(lob_kind(lob.is_clob).oracle_type(), N::Lob),
            BindValue::LobArray(v) => {
                let is_clob = v.first().is_some_and(|l| l.is_clob);
                fixed(lob_kind(is_clob).oracle_type(), N::Lob)
            }
        };
        Ok(d)
    }

    /// Write this value into `slots` slots of `buf`.
    ///
    /// With `elementwise`, slot `i` receives element `i` of an array value;
    /// otherwise an array value leaves a single NULL slot. Scalars are
    /// written to every slot.
    pub(crate) fn fill(
        &mut self,
        buf: &VarBuffer,
        slots: u32,
        elementwise: bool,
        ctx: &BindContext<'_>,
    ) -> Result<()> {
        let value = self.unwrap_out(ctx.index)?;
        if value.array_len().is_some() {
            if !elementwise {
                return buf.set(0, NativeData::Null);
            }
            for slot in 0..slots {
                let data = value.element(slot as usize, ctx)?;
                put(buf, slot, data, ctx)?;
            }
            return Ok(());
        }

        let data = value.scalar(ctx)?;
        let mut result = Ok(());
        for slot in 0..slots {
            result = buf.set(slot, data.clone());
            if result.is_err() {
                break;
            }
        }
        release_owned(&data, ctx);
        result
    }

    fn scalar(&mut self, ctx: &BindContext<'_>) -> Result<NativeData> {
        let data = match self {
            BindValue::Bytes(b) => NativeData::Bytes(b.clone().into()),
            BindValue::Text(s) => NativeData::Bytes(s.clone().into_bytes().into()),
            BindValue::Int(v) => NativeData::Int64(*v),
            BindValue::Uint(v) => NativeData::Uint64(*v),
            BindValue::Float(v) => NativeData::Float(*v),
            BindValue::Double(v) => NativeData::Double(*v),
            BindValue::Bool(v) => NativeData::Bool(*v),
            BindValue::Timestamp(ts) => NativeData::Timestamp(native_timestamp(ctx.index, ts)?),
            BindValue::Lob(lob) => write_lob(lob, ctx)?,
            other => return Err(Error::unsupported_bind(ctx.index, other.type_name())),
        };
        Ok(data)
    }

    fn element(&mut self, i: usize, ctx: &BindContext<'_>) -> Result<NativeData> {
        let data = match self {
            BindValue::BytesArray(v) => v.get(i).map(|b| NativeData::Bytes(b.clone().into())),
            BindValue::TextArray(v) => v
                .get(i)
                .map(|s| NativeData::Bytes(s.clone().into_bytes().into())),
            BindValue::IntArray(v) => v.get(i).map(|x| NativeData::Int64(*x)),
            BindValue::UintArray(v) => v.get(i).map(|x| NativeData::Uint64(*x)),
            BindValue::FloatArray(v) => v.get(i).map(|x| NativeData::Float(*x)),
            BindValue::DoubleArray(v) => v.get(i).map(|x| NativeData::Double(*x)),
            BindValue::BoolArray(v) => v.get(i).map(|x| NativeData::Bool(*x)),
            BindValue::TimestampArray(v) => match v.get(i) {
                Some(ts) => Some(NativeData::Timestamp(native_timestamp(ctx.index, ts)?)),
                None => None,
            },
            BindValue::LobArray(v) => match v.get_mut(i) {
                Some(lob) => Some(write_lob(lob, ctx)?),
                None => None,
            },
            other => return Err(Error::unsupported_bind(ctx.index, other.type_name())),
        };
        Ok(data.unwrap_or(NativeData::Null))
    }
}

/// What a setter needs besides the value.
pub(crate) struct BindContext<'a> {
    pub native: &'a Arc<dyn Native>,
    pub opts: &'a StatementOptions,
    /// 1-based argument position.
    pub index: usize,
}

fn lob_kind(is_clob: bool) -> LobKind {
    if is_clob {
        LobKind::Clob
    } else {
        LobKind::Blob
    }
}

/// Set a slot, then drop the reference a freshly written LOB carried.
fn put(buf: &VarBuffer, slot: u32, data: NativeData, ctx: &BindContext<'_>) -> Result<()> {
    let result = buf.set(slot, data.clone());
    release_owned(&data, ctx);
    result
}

fn release_owned(data: &NativeData, ctx: &BindContext<'_>) {
    if let NativeData::Lob(lob) = data {
        if let Err(e) = ctx.native.lob_release(*lob) {
            warn!(%lob, error = %e, "failed to release temporary lob");
        }
    }
}

/// The year of `ts` if it fits a native timestamp.
fn timestamp_year(index: usize, ts: &DateTime<FixedOffset>) -> Result<i16> {
    i16::try_from(ts.year())
        .map_err(|_| Error::unsupported_bind(index, format!("timestamp with year {}", ts.year())))
}

fn native_timestamp(index: usize, ts: &DateTime<FixedOffset>) -> Result<NativeTimestamp> {
    let offset = ts.offset().local_minus_utc();
    Ok(NativeTimestamp {
        year: timestamp_year(index, ts)?,
        month: ts.month() as u8,
        day: ts.day() as u8,
        hour: ts.hour() as u8,
        minute: ts.minute() as u8,
        second: ts.second() as u8,
        fsecond: ts.nanosecond(),
        tz_hour_offset: (offset / 3600) as i8,
        tz_minute_offset: ((offset % 3600) / 60) as i8,
    })
}

/// Stream a LOB argument into a new temporary locator.
///
/// Returns the locator with the reference the caller now owns, or NULL for
/// a LOB without content. On failure the locator is released.
fn write_lob(lob: &mut Lob, ctx: &BindContext<'_>) -> Result<NativeData> {
    let Some(reader) = lob.reader.as_mut() else {
        return Ok(NativeData::Null);
    };
    let native = ctx.native;
    let kind = lob_kind(lob.is_clob);
    let handle = native
        .lob_new_temp(kind)
        .context(|| format!("create temporary {}", kind.oracle_type()))?;

    let result = (|| {
        let chunk = match native
            .lob_chunk_size(handle)
            .context(|| format!("chunk size of {}", handle))?
        {
            0 => ctx.opts.lob_chunk_fallback,
            n => n,
        };
        let mut writer = LobWriter::new(native, handle).with_size_check(ctx.opts.check_lob_write);
        let copied = copy_chunked(reader.as_mut(), &mut writer, chunk as usize);
        let closed = writer.close();
        let written = copied?;
        closed.map(|_| written)
    })();

    match result {
        Ok(written) => {
            trace!(%handle, written, "streamed lob argument");
            Ok(NativeData::Lob(handle))
        }
        Err(e) => {
            if let Err(release_err) = native.lob_release(handle) {
                warn!(%handle, error = %release_err, "failed to release temporary lob");
            }
            Err(e)
        }
    }
}

macro_rules! from_scalar {
    ($variant:ident, $array:ident, $target:ty: $($t:ty),+) => {
        $(
            impl From<$t> for BindValue {
                fn from(v: $t) -> Self {
                    BindValue::$variant(<$target>::from(v))
                }
            }

            impl From<Vec<$t>> for BindValue {
                fn from(v: Vec<$t>) -> Self {
                    BindValue::$array(v.into_iter().map(<$target>::from).collect())
                }
            }
        )+
    };
}

from_scalar!(Int, IntArray, i64: i8, i16, i32, i64);
from_scalar!(Uint, UintArray, u64: u16, u32, u64);
from_scalar!(Float, FloatArray, f32: f32);
from_scalar!(Double, DoubleArray, f64: f64);
from_scalar!(Bool, BoolArray, bool: bool);

impl From<isize> for BindValue {
    fn from(v: isize) -> Self {
        BindValue::Int(v as i64)
    }
}

impl From<usize> for BindValue {
    fn from(v: usize) -> Self {
        BindValue::Uint(v as u64)
    }
}

impl From<Vec<u8>> for BindValue {
    fn from(v: Vec<u8>) -> Self {
        BindValue::Bytes(v)
    }
}

impl From<&[u8]> for BindValue {
    fn from(v: &[u8]) -> Self {
        BindValue::Bytes(v.to_vec())
    }
}

impl From<Vec<Vec<u8>>> for BindValue {
    fn from(v: Vec<Vec<u8>>) -> Self {
        BindValue::BytesArray(v)
    }
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        BindValue::Text(v)
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        BindValue::Text(v.to_string())
    }
}

impl From<Vec<String>> for BindValue {
    fn from(v: Vec<String>) -> Self {
        BindValue::TextArray(v)
    }
}

impl From<Vec<&str>> for BindValue {
    fn from(v: Vec<&str>) -> Self {
        BindValue::TextArray(v.into_iter().map(str::to_string).collect())
    }
}

impl From<DateTime<FixedOffset>> for BindValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        BindValue::Timestamp(v)
    }
}

impl From<Vec<DateTime<FixedOffset>>> for BindValue {
    fn from(v: Vec<DateTime<FixedOffset>>) -> Self {
        BindValue::TimestampArray(v)
    }
}

impl From<Lob> for BindValue {
    fn from(v: Lob) -> Self {
        BindValue::Lob(v)
    }
}

impl From<Vec<Lob>> for BindValue {
    fn from(v: Vec<Lob>) -> Self {
        BindValue::LobArray(v)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(BindValue::Null, Into::into)
    }
}
