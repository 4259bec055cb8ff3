//! Prepared statements: bind, execute, query.
//!
//! A statement serializes its own operations. Binding, execution and an
//! open result cursor all hold the statement's lock, so a second caller
//! waits until the prior operation (or cursor) is finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bind::{self, BindArg};
use crate::buffer::VarBuffer;
use crate::cancel::{run_cancellable, CancelToken};
use crate::config::StatementOptions;
use crate::cursor::RowCursor;
use crate::error::{Error, NativeContext, Result};
use crate::native::{ExecMode, Native, StmtHandle};

/// Native state guarded by the statement lock.
///
/// Shared between the statement and an open cursor's lease; the native
/// statement is released when the last of them goes away.
pub(crate) struct StatementState {
    native: Arc<dyn Native>,
    handle: Option<StmtHandle>,
    /// Variables attached by the last bind.
    vars: Vec<VarBuffer>,
}

impl StatementState {
    fn handle(&self) -> Result<StmtHandle> {
        self.handle.ok_or(Error::StatementClosed)
    }

    /// Release the variables of the previous bind.
    fn release_vars(&mut self) -> Result<()> {
        let mut first_err = None;
        for mut var in self.vars.drain(..) {
            if let Err(e) = var.release() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A prepared statement.
///
/// Created by [`Connection::prepare`](crate::Connection::prepare).
pub struct Statement {
    native: Arc<dyn Native>,
    sql: String,
    state: Arc<Mutex<StatementState>>,
    in_transaction: Arc<AtomicBool>,
    plsql_arrays: AtomicBool,
    options: StatementOptions,
}

impl Statement {
    pub(crate) fn new(
        native: Arc<dyn Native>,
        sql: &str,
        handle: StmtHandle,
        in_transaction: Arc<AtomicBool>,
        options: StatementOptions,
    ) -> Self {
        let state = StatementState {
            native: Arc::clone(&native),
            handle: Some(handle),
            vars: Vec::new(),
        };
        Self {
            native,
            sql: sql.to_string(),
            state: Arc::new(Mutex::new(state)),
            in_transaction,
            plsql_arrays: AtomicBool::new(false),
            options,
        }
    }

    /// The SQL text this statement was prepared from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Treat array arguments as PL/SQL collections instead of batch rows.
    pub fn set_plsql_arrays(&self, enabled: bool) {
        self.plsql_arrays.store(enabled, Ordering::Relaxed);
    }

    pub fn plsql_arrays(&self) -> bool {
        self.plsql_arrays.load(Ordering::Relaxed)
    }

    /// Number of bind placeholders, discovered by a parse-only execution.
    ///
    /// Returns `None` if the count cannot be determined.
    pub async fn num_input(&self) -> Option<usize> {
        let state = self.state.lock().await;
        let stmt = state.handle?;
        let count = self
            .native
            .stmt_execute(stmt, ExecMode::PARSE_ONLY)
            .and_then(|_| self.native.stmt_bind_count(stmt));
        match count {
            Ok(n) => Some(n as usize),
            Err(e) => {
                debug!(%stmt, error = %e, "placeholder count unavailable");
                None
            }
        }
    }

    /// Execute a non-query statement and return the affected row count.
    ///
    /// Array arguments of equal length run as one batched execution.
    pub async fn execute(&self, args: Vec<BindArg>) -> Result<u64> {
        self.execute_inner(args, None).await
    }

    /// Like [`execute`](Self::execute), interrupting the native call when
    /// `token` is cancelled.
    pub async fn execute_cancellable(&self, args: Vec<BindArg>, token: &CancelToken) -> Result<u64> {
        self.execute_inner(args, Some(token)).await
    }

    /// Execute a query and open a cursor over its rows.
    ///
    /// The statement stays locked until the cursor is closed or dropped.
    pub async fn query(&self, args: Vec<BindArg>) -> Result<RowCursor> {
        self.query_inner(args, None).await
    }

    pub async fn query_cancellable(&self, args: Vec<BindArg>, token: &CancelToken) -> Result<RowCursor> {
        self.query_inner(args, Some(token)).await
    }

    /// Release the bind variables and the native statement.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(stmt) = state.handle.take() else {
            return Ok(());
        };
        let vars = state.release_vars();
        self.native
            .stmt_release(stmt)
            .context(|| format!("release {}", stmt))?;
        debug!(%stmt, "statement closed");
        vars
    }

    fn exec_mode(&self) -> ExecMode {
        if self.in_transaction.load(Ordering::Acquire) {
            ExecMode::DEFAULT
        } else {
            ExecMode::COMMIT_ON_SUCCESS
        }
    }

    /// Replace the statement's variables with a fresh bind of `args`.
    fn bind(&self, state: &mut StatementState, stmt: StmtHandle, args: &mut [BindArg]) -> Result<usize> {
        state.release_vars()?;
        let bound = bind::bind(
            &self.native,
            stmt,
            args,
            self.plsql_arrays(),
            &self.options,
        )?;
        state.vars = bound.vars;
        Ok(bound.batch_len)
    }

    async fn execute_inner(&self, mut args: Vec<BindArg>, token: Option<&CancelToken>) -> Result<u64> {
        let mut state = Arc::clone(&self.state).lock_owned().await;
        let stmt = state.handle()?;
        let batch_len = self.bind(&mut state, stmt, &mut args)?;
        let mode = self.exec_mode();
        debug!(%stmt, %mode, batch = batch_len, "execute");

        let native = Arc::clone(&self.native);
        let rows = run_cancellable(&self.native, token, move || {
            // held until the native call returns, even if the caller goes away
            let _state = state;
            let executed = if batch_len > 0 {
                native.stmt_execute_many(stmt, mode, batch_len as u32)
            } else {
                native.stmt_execute(stmt, mode).map(|_| ())
            };
            executed.context(|| format!("execute(mode={}, batch={})", mode, batch_len))?;
            native
                .stmt_row_count(stmt)
                .context(|| format!("row count of {}", stmt))
        })
        .await?;
        debug!(%stmt, rows, "executed");
        Ok(rows)
    }

    async fn query_inner(&self, mut args: Vec<BindArg>, token: Option<&CancelToken>) -> Result<RowCursor> {
        let mut state = Arc::clone(&self.state).lock_owned().await;
        let stmt = state.handle()?;
        self.bind(&mut state, stmt, &mut args)?;
        let mode = ExecMode::DEFAULT;
        debug!(%stmt, "query");

        let native = Arc::clone(&self.native);
        let (state, num_columns) = run_cancellable(&self.native, token, move || {
            let num_columns = native
                .stmt_execute(stmt, mode)
                .context(|| format!("execute(mode={}, batch=0)", mode))?;
            Ok((state, num_columns))
        })
        .await?;

        RowCursor::open(
            &self.native,
            stmt,
            num_columns,
            self.options.fetch_array_size,
            Some(state),
        )
    }
}

impl Drop for StatementState {
    fn drop(&mut self) {
        if let Err(e) = self.release_vars() {
            warn!(error = %e, "failed to release bind variables");
        }
        if let Some(stmt) = self.handle.take() {
            if let Err(e) = self.native.stmt_release(stmt) {
                warn!(%stmt, error = %e, "failed to release statement");
            }
        }
    }
}

impl std::fmt::Debug for StatementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementState")
            .field("handle", &self.handle)
            .field("vars", &self.vars.len())
            .finish()
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("plsql_arrays", &self.plsql_arrays())
            .finish()
    }
}
