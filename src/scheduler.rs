//! Regeneration scheduler
//!
//! Live events arrive in bursts, so rebuilds are debounced: each trigger
//! arms (or re-arms) a timer, and only the timer that is still current when
//! it fires emits a rebuild request. Currency is tracked with an epoch
//! counter; a timer that lost the epoch race simply drops out, and
//! cancelling after the timer has fired is a no-op.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Default debounce window for burst coalescing.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

struct SchedulerState {
    epoch: u64,
    /// Reason of the armed rebuild; the latest trigger wins.
    pending_reason: Option<String>,
}

struct Inner {
    debounce: Duration,
    state: Mutex<SchedulerState>,
    tx: mpsc::UnboundedSender<String>,
}

impl Inner {
    async fn fire(&self, my_epoch: u64) {
        let mut state = self.state.lock().await;
        if state.epoch != my_epoch {
            // A newer trigger re-armed the timer; this one is stale.
            return;
        }
        let Some(reason) = state.pending_reason.take() else {
            return;
        };
        drop(state);
        debug!(reason = %reason, epoch = my_epoch, "debounce elapsed, rebuild due");
        // Receiver dropped means shutdown; nothing to do.
        let _ = self.tx.send(reason);
    }
}

pub struct RebuildScheduler {
    inner: Arc<Inner>,
}

impl RebuildScheduler {
    /// Create a scheduler and the receiving end of the rebuild queue.
    pub fn new(debounce: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            inner: Arc::new(Inner {
                debounce,
                state: Mutex::new(SchedulerState {
                    epoch: 0,
                    pending_reason: None,
                }),
                tx,
            }),
        });
        (scheduler, rx)
    }

    /// Request a rebuild. Re-arms the debounce timer; the reason of the
    /// most recent trigger is the one reported when the timer fires.
    pub async fn trigger(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let my_epoch = {
            let mut state = self.inner.state.lock().await;
            state.epoch += 1;
            state.pending_reason = Some(reason.clone());
            state.epoch
        };
        debug!(reason = %reason, epoch = my_epoch, "rebuild armed");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            inner.fire(my_epoch).await;
        });
    }

    /// Bypass the debounce window, used by the periodic full refresh.
    pub async fn trigger_immediate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.inner.state.lock().await;
        // Invalidate any armed timer so the refresh is not reported twice.
        state.epoch += 1;
        state.pending_reason = None;
        drop(state);
        debug!(reason = %reason, "immediate rebuild requested");
        let _ = self.inner.tx.send(reason);
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }
}
