//! Binding arguments to a native statement.
//!
//! The binder turns an ordered list of [`BindArg`]s into native variables
//! attached to a statement. Array-valued arguments of equal length switch
//! the statement into batch mode: one variable slot per row, executed with
//! a single execute-many call.

mod dispatch;

pub use dispatch::{BindValue, Dispatch};

use std::sync::Arc;

use tracing::debug;

use crate::buffer::VarBuffer;
use crate::config::StatementOptions;
use crate::error::{Error, NativeContext, Result};
use crate::native::{Native, StmtHandle, VarSpec};
use dispatch::BindContext;

/// One argument: an optional placeholder name and a value.
#[derive(Debug)]
pub struct BindArg {
    /// Placeholder name without the colon; empty for positional binds.
    pub name: String,
    pub value: BindValue,
}

impl BindArg {
    /// A positional argument.
    pub fn new(value: impl Into<BindValue>) -> Self {
        Self {
            name: String::new(),
            value: value.into(),
        }
    }

    /// A named argument.
    pub fn named(name: impl Into<String>, value: impl Into<BindValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Variables produced by one bind.
#[derive(Debug, Default)]
pub(crate) struct Bound {
    pub vars: Vec<VarBuffer>,
    /// Rows of an execute-many; 0 for a single execution.
    pub batch_len: usize,
}

/// Length bounds of the array arguments; `None` when there are none.
fn array_bounds(args: &[BindArg]) -> Option<(usize, usize)> {
    args.iter()
        .filter_map(|a| a.value.array_len())
        .fold(None, |acc, n| match acc {
            None => Some((n, n)),
            Some((min, max)) => Some((min.min(n), max.max(n))),
        })
}

/// Bind `args` to `stmt`.
///
/// `plsql_arrays` binds array arguments as PL/SQL collections instead of
/// inferring a batch.
pub(crate) fn bind(
    native: &Arc<dyn Native>,
    stmt: StmtHandle,
    args: &mut [BindArg],
    plsql_arrays: bool,
    opts: &StatementOptions,
) -> Result<Bound> {
    let named = args.iter().any(|a| !a.name.is_empty());

    let (min, max) = array_bounds(args).unwrap_or((0, 0));
    if max > opts.max_array_size {
        return Err(Error::BatchTooLarge {
            len: max,
            max: opts.max_array_size,
        });
    }
    if !plsql_arrays && min != max {
        return Err(Error::BatchShapeMismatch { min, max });
    }
    let batch_len = if plsql_arrays { 0 } else { min };
    let batch = batch_len > 0;

    debug!(%stmt, args = args.len(), named, plsql_arrays, batch_len, "bind");

    let mut vars = Vec::with_capacity(args.len());
    for (i, arg) in args.iter_mut().enumerate() {
        let index = i + 1;
        let d = arg.value.dispatch(index, opts)?;
        let array_len = arg.value.array_len();
        let as_collection = plsql_arrays && array_len.is_some();

        let slots = if batch {
            batch_len
        } else if as_collection {
            array_len.unwrap_or(0).max(1)
        } else {
            1
        };
        let spec = VarSpec {
            oracle_type: d.oracle_type,
            native_type: d.native_type,
            max_array_size: slots as u32,
            size: d.capacity,
            is_array: as_collection,
        };
        let buf = VarBuffer::new(native, spec).map_err(|e| e.at_argument(index))?;

        let ctx = BindContext {
            native,
            opts,
            index,
        };
        arg.value
            .fill(&buf, slots as u32, batch || as_collection, &ctx)
            .map_err(|e| e.at_argument(index))?;
        if as_collection {
            buf.set_num_elements(array_len.unwrap_or(0) as u32)
                .map_err(|e| e.at_argument(index))?;
        }
        vars.push(buf);
    }

    for (i, (arg, buf)) in args.iter().zip(&vars).enumerate() {
        let index = i + 1;
        let Some(var) = buf.handle() else {
            continue;
        };
        if named {
            let name = if arg.name.is_empty() {
                index.to_string()
            } else {
                arg.name.clone()
            };
            native
                .stmt_bind_by_name(stmt, &name, var)
                .context(|| format!("argument {}: bind by name {:?}", index, name))?;
        } else {
            native
                .stmt_bind_by_pos(stmt, index as u32, var)
                .context(|| format!("argument {}: bind by position", index))?;
        }
    }

    Ok(Bound { vars, batch_len })
}
