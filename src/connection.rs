//! High-level Connection API over a native client library.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::cancel::{run_cancellable, CancelToken};
use crate::config::StatementOptions;
use crate::error::{NativeContext, Result};
use crate::native::Native;
use crate::statement::Statement;

/// A database connection backed by a [`Native`] implementation.
///
/// Acquiring the native connection is up to the caller; this type only
/// drives statements over it and tracks whether a transaction is open.
pub struct Connection {
    native: Arc<dyn Native>,
    /// Whether a transaction is open; disables auto-commit.
    in_transaction: Arc<AtomicBool>,
    options: StatementOptions,
}

impl Connection {
    /// Wrap a native connection with default statement options.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use oracle_dpi_rs::native::memory::MemoryNative;
    /// use oracle_dpi_rs::Connection;
    ///
    /// let conn = Connection::new(Arc::new(MemoryNative::new()));
    /// assert!(!conn.in_transaction());
    /// ```
    pub fn new(native: Arc<dyn Native>) -> Self {
        Self::with_options(native, StatementOptions::default())
    }

    /// Wrap a native connection with explicit statement options.
    pub fn with_options(native: Arc<dyn Native>, options: StatementOptions) -> Self {
        Self {
            native,
            in_transaction: Arc::new(AtomicBool::new(false)),
            options,
        }
    }

    pub fn options(&self) -> &StatementOptions {
        &self.options
    }

    /// Prepare a statement.
    pub async fn prepare(&self, sql: &str) -> Result<Statement> {
        let handle = self
            .native
            .prepare(sql)
            .context(|| format!("prepare {:?}", sql))?;
        debug!(stmt = %handle, sql, "prepared");
        Ok(Statement::new(
            Arc::clone(&self.native),
            sql,
            handle,
            Arc::clone(&self.in_transaction),
            self.options.clone(),
        ))
    }

    /// Start a transaction. Statements stop auto-committing until
    /// [`commit`](Self::commit) or [`rollback`](Self::rollback).
    pub fn begin(&self) {
        self.in_transaction.store(true, Ordering::Release);
        debug!("transaction started");
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    pub async fn commit(&self) -> Result<()> {
        let result = self.native.commit().context(|| "commit");
        self.in_transaction.store(false, Ordering::Release);
        result
    }

    pub async fn rollback(&self) -> Result<()> {
        let result = self.native.rollback().context(|| "rollback");
        self.in_transaction.store(false, Ordering::Release);
        result
    }

    /// Request a best-effort interrupt of the call currently running on
    /// this connection.
    pub fn break_execution(&self) -> Result<()> {
        self.native.break_execution().context(|| "break execution")
    }

    /// Check that the connection is alive.
    pub async fn ping(&self) -> Result<()> {
        self.ping_inner(None).await
    }

    /// Like [`ping`](Self::ping), interrupting the round trip when `token`
    /// is cancelled.
    pub async fn ping_cancellable(&self, token: &CancelToken) -> Result<()> {
        self.ping_inner(Some(token)).await
    }

    async fn ping_inner(&self, token: Option<&CancelToken>) -> Result<()> {
        let native = Arc::clone(&self.native);
        run_cancellable(&self.native, token, move || native.ping().context(|| "ping")).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("in_transaction", &self.in_transaction())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::BindArg;
    use crate::error::Error;
    use crate::native::memory::{FaultPoint, MemoryNative, Script};
    use crate::native::{ExecMode, NativeError};

    fn connect() -> (Arc<MemoryNative>, Connection) {
        let mem = Arc::new(MemoryNative::new());
        let conn = Connection::new(mem.clone());
        (mem, conn)
    }

    #[tokio::test]
    async fn test_transaction_flag_controls_commit_mode() {
        let (mem, conn) = connect();
        mem.script("UPDATE t SET x = :1", Script::dml(1));
        let stmt = conn.prepare("UPDATE t SET x = :1").await.unwrap();

        conn.begin();
        assert!(conn.in_transaction());
        stmt.execute(vec![BindArg::new(1i64)]).await.unwrap();
        assert_eq!(mem.last_execution().unwrap().mode, ExecMode::DEFAULT);
        conn.commit().await.unwrap();
        assert!(!conn.in_transaction());

        stmt.execute(vec![BindArg::new(2i64)]).await.unwrap();
        assert_eq!(mem.last_execution().unwrap().mode, ExecMode::COMMIT_ON_SUCCESS);

        conn.begin();
        conn.rollback().await.unwrap();
        assert!(!conn.in_transaction());
        let stats = mem.stats();
        assert_eq!((stats.commits, stats.rollbacks, stats.auto_commits), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_failed_commit_ends_transaction() {
        let (mem, conn) = connect();
        conn.begin();
        mem.fail_next(FaultPoint::Commit, NativeError::new(2091, "ORA-02091: transaction rolled back"));
        let err = conn.commit().await.unwrap_err();
        assert_eq!(err.native_code(), Some(2091));
        assert_eq!(err.to_string(), "commit: ORA-02091: transaction rolled back");
        assert!(!conn.in_transaction());
    }

    #[tokio::test]
    async fn test_prepare_failure_names_sql() {
        let (mem, conn) = connect();
        mem.fail_next(FaultPoint::Prepare, NativeError::new(900, "ORA-00900: invalid SQL statement"));
        let err = conn.prepare("SELEKT").await.unwrap_err();
        assert!(err.to_string().starts_with("prepare \"SELEKT\""));
    }

    #[tokio::test]
    async fn test_ping() {
        let (mem, conn) = connect();
        conn.ping().await.unwrap();
        assert_eq!(mem.stats().pings, 1);

        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(conn.ping_cancellable(&token).await, Err(Error::Cancelled)));
        assert_eq!(mem.stats().pings, 1);
        assert_eq!(mem.stats().breaks, 0);
    }
}
