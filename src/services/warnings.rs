use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Side channel for task-failure diagnostics.
///
/// Emitted warnings go to `tracing::warn!`. While at least one
/// [`WarningSuspension`] is alive the channel stays quiet and only counts what
/// it swallowed; suspension never changes whether a commit succeeds.
///
/// Handles are cheap clones sharing the same counters, so a test can hold one
/// while the queue owning another runs.
#[derive(Debug, Clone, Default)]
pub struct WarningChannel {
    inner: Arc<WarningCounters>,
}

#[derive(Debug, Default)]
struct WarningCounters {
    suspensions: AtomicUsize,
    emitted: AtomicUsize,
    suppressed: AtomicUsize,
}

impl WarningChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.suspensions.load(Ordering::Acquire) > 0
    }

    /// Report a failed task with its registration-time context.
    pub fn emit(&self, description: &str, context: &Value, error: &str) {
        if self.is_suspended() {
            self.inner.suppressed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.inner.emitted.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            task = description,
            context = %context,
            "Queued task failed: {}",
            error
        );
    }

    /// Silence the channel until the returned guard is dropped.
    pub fn suspend(&self) -> WarningSuspension {
        self.inner.suspensions.fetch_add(1, Ordering::AcqRel);
        WarningSuspension {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Await `future` with the channel silenced, restoring it afterwards.
    ///
    /// # Example
    /// ```ignore
    /// let warnings = queue.warnings();
    /// let result = warnings.suspend_while(queue.commit()).await;
    /// ```
    pub async fn suspend_while<F: Future>(&self, future: F) -> F::Output {
        let _suspension = self.suspend();
        future.await
    }

    /// Warnings actually logged
    pub fn emitted(&self) -> usize {
        self.inner.emitted.load(Ordering::Relaxed)
    }

    /// Warnings swallowed while suspended
    pub fn suppressed(&self) -> usize {
        self.inner.suppressed.load(Ordering::Relaxed)
    }
}

/// Guard returned by [`WarningChannel::suspend`]
#[must_use = "warnings resume as soon as the suspension is dropped"]
#[derive(Debug)]
pub struct WarningSuspension {
    inner: Arc<WarningCounters>,
}

impl Drop for WarningSuspension {
    fn drop(&mut self) {
        self.inner.suspensions.fetch_sub(1, Ordering::AcqRel);
    }
}
