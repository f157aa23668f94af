//! Debounced device-list resync.
//!
//! Node events only carry deltas and some gateway-side effects (scene triggers)
//! produce no event at all, so after any burst of device activity the session
//! re-reads the full device list once the link has been quiet for a moment.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use symi_protocol::{
    OP_DEVICE_COUNT_RSP, OP_DEVICE_LIST_RSP, OP_READ_MAC_RSP, OP_READ_VERSION_RSP,
    OP_START_SCAN_RSP,
};
use tokio::task::JoinHandle;
use tracing::trace;

/// Returns true if an inbound frame with this opcode counts as device activity.
///
/// Pure query responses do not; everything else (node events, control and
/// scene acknowledgements, unknown opcodes) does.
pub fn triggers_status_sync(opcode: u8) -> bool {
    !matches!(
        opcode,
        OP_DEVICE_LIST_RSP
            | OP_START_SCAN_RSP
            | OP_READ_VERSION_RSP
            | OP_READ_MAC_RSP
            | OP_DEVICE_COUNT_RSP
    )
}

/// Single-instance debounce timer. Scheduling again cancels the pending run.
#[derive(Debug)]
pub struct StatusSyncScheduler {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl StatusSyncScheduler {
    pub fn new(delay: Duration) -> Self {
        StatusSyncScheduler {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` once `delay` passes without another call to `schedule`.
    ///
    /// The action is spawned as its own task when the timer fires, so a later
    /// reschedule cannot cancel it halfway through.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action());
        });
        if let Some(previous) = self.pending.lock().replace(timer) {
            previous.abort();
            trace!("status sync rescheduled");
        }
    }

    /// Drop the pending run, if any. Returns true if one was cancelled.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(timer) => {
                let live = !timer.is_finished();
                timer.abort();
                live
            }
            None => false,
        }
    }

    /// Returns true while a run is scheduled but has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for StatusSyncScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.pending.get_mut().take() {
            timer.abort();
        }
    }
}
