//! Integration tests for cooperative cancellation of native calls.

use std::sync::Arc;
use std::time::Duration;

use oracle_dpi_rs::native::memory::{MemoryNative, Script};
use oracle_dpi_rs::{BindArg, CancelToken, Connection, Error};

const SLEEP: &str = "BEGIN dbms_session.sleep(:secs); END;";

fn connect() -> (Arc<MemoryNative>, Connection) {
    oracle_dpi_rs::logging::init_test();
    let mem = Arc::new(MemoryNative::new());
    mem.script(SLEEP, Script::Blocking);
    let conn = Connection::new(mem.clone());
    (mem, conn)
}

fn cancel_after(token: &CancelToken, delay: Duration) -> tokio::task::JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
        token.cancel();
    })
}

#[tokio::test]
async fn test_cancel_interrupts_running_execute() {
    let (mem, conn) = connect();
    let stmt = conn.prepare(SLEEP).await.unwrap();
    let token = CancelToken::new();
    let canceller = cancel_after(&token, Duration::from_millis(50));

    let err = stmt
        .execute_cancellable(vec![BindArg::named("secs", 60i64)], &token)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert_eq!(err.native_code(), Some(1013));
    assert!(err.to_string().starts_with("execute(mode=COMMIT_ON_SUCCESS, batch=0)"));
    assert_eq!(mem.stats().breaks, 1);

    stmt.close().await.unwrap();
    assert_eq!(mem.live_vars(), 0);
}

#[tokio::test]
async fn test_cancel_interrupts_running_query() {
    let (mem, conn) = connect();
    let stmt = conn.prepare(SLEEP).await.unwrap();
    let token = CancelToken::new();
    let canceller = cancel_after(&token, Duration::from_millis(20));

    let err = stmt
        .query_cancellable(vec![BindArg::named("secs", 60i64)], &token)
        .await
        .unwrap_err();
    canceller.await.unwrap();
    assert_eq!(err.native_code(), Some(1013));
    assert_eq!(mem.stats().breaks, 1);
}

#[tokio::test]
async fn test_no_break_after_completion() {
    let (mem, conn) = connect();
    mem.script("DELETE FROM t", Script::dml(4));
    let stmt = conn.prepare("DELETE FROM t").await.unwrap();
    let token = CancelToken::new();

    assert_eq!(stmt.execute_cancellable(vec![], &token).await.unwrap(), 4);
    token.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(mem.stats().breaks, 0);
}

#[tokio::test]
async fn test_precancelled_token_skips_execution() {
    let (mem, conn) = connect();
    let stmt = conn.prepare(SLEEP).await.unwrap();
    let token = CancelToken::new();
    token.cancel();

    let err = stmt
        .execute_cancellable(vec![BindArg::named("secs", 60i64)], &token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(mem.executions().is_empty());
    assert_eq!(mem.stats().breaks, 0);
}

#[tokio::test]
async fn test_manual_break() {
    let (mem, conn) = connect();
    let stmt = Arc::new(conn.prepare(SLEEP).await.unwrap());
    let running = {
        let stmt = Arc::clone(&stmt);
        tokio::spawn(async move { stmt.execute(vec![BindArg::named("secs", 60i64)]).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.break_execution().unwrap();

    let err = running.await.unwrap().unwrap_err();
    assert_eq!(err.native_code(), Some(1013));
    assert_eq!(mem.stats().breaks, 1);
}

#[tokio::test]
async fn test_abandoned_execute_keeps_statement_locked() {
    let (mem, conn) = connect();
    let stmt = Arc::new(conn.prepare(SLEEP).await.unwrap());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        stmt.execute(vec![BindArg::named("secs", 60i64)]),
    )
    .await;
    assert!(abandoned.is_err());

    let closing = {
        let stmt = Arc::clone(&stmt);
        tokio::spawn(async move { stmt.close().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!closing.is_finished());
    assert_eq!(mem.live_stmts(), 1);
    assert_eq!(mem.live_vars(), 1);

    conn.break_execution().unwrap();
    tokio::time::timeout(Duration::from_secs(5), closing)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(mem.live_stmts(), 0);
    assert_eq!(mem.live_vars(), 0);
}

#[tokio::test]
async fn test_abandoned_query_keeps_statement_locked() {
    let (mem, conn) = connect();
    let stmt = Arc::new(conn.prepare(SLEEP).await.unwrap());

    let running = {
        let stmt = Arc::clone(&stmt);
        tokio::spawn(async move { stmt.query(vec![BindArg::named("secs", 60i64)]).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    running.abort();
    assert!(running.await.unwrap_err().is_cancelled());

    let rebinding = {
        let stmt = Arc::clone(&stmt);
        tokio::spawn(async move { stmt.execute(vec![BindArg::named("secs", 1i64)]).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!rebinding.is_finished());
    assert_eq!(mem.executions().len(), 1);

    // the second execution blocks as well; one break for each
    conn.break_execution().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.break_execution().unwrap();
    let err = tokio::time::timeout(Duration::from_secs(5), rebinding)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert_eq!(err.native_code(), Some(1013));
    assert_eq!(mem.stats().breaks, 2);
}
