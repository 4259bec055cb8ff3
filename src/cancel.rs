//! Cooperative cancellation of blocking native calls.
//!
//! A native call runs on tokio's blocking pool while the calling task
//! watches a [`CancelToken`]. Cancellation issues a single best-effort
//! break on the connection and then keeps waiting for the call to return
//! through its own path; there is no hard abort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::native::Native;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation signal.
///
/// ```
/// use oracle_dpi_rs::CancelToken;
///
/// let token = CancelToken::new();
/// let child = token.clone();
/// token.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Run the blocking `call` and watch `token` while it runs.
///
/// A token that is already cancelled fails with [`Error::Cancelled`]
/// without calling into the native layer. Once the call has returned no
/// break is issued, even if the token fires in the same instant.
pub(crate) async fn run_cancellable<T, F>(
    native: &Arc<dyn Native>,
    token: Option<&CancelToken>,
    call: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let Some(token) = token else {
        return tokio::task::spawn_blocking(call).await?;
    };
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let done = Arc::new(Mutex::new(false));
    let task_done = Arc::clone(&done);
    let mut task = tokio::task::spawn_blocking(move || {
        let result = call();
        *task_done.lock() = true;
        result
    });

    tokio::select! {
        biased;
        joined = &mut task => return joined?,
        _ = token.cancelled() => {}
    }

    {
        let done = done.lock();
        if !*done {
            debug!("cancel requested, interrupting native call");
            if let Err(e) = native.break_execution() {
                warn!(error = %e, "break failed");
            }
        }
    }
    task.await?
}
