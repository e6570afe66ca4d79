use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::gpio::pin::{CallbackId, CloseHook, PinCore};
use crate::gpio::{Edge, Error, Event, Result, Trigger};

/// Outcome of a blocking wait for an edge.
///
/// Exactly one of `edge` and `timed_out` carries information: a successful wait
/// returns the observed edge with `timed_out` set to `false`, and a wait that ran
/// out of time returns `None` with `timed_out` set to `true`.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct WaitResult {
    /// The first matching edge observed during the wait.
    pub edge: Option<Edge>,
    /// `true` if no matching edge occurred before the timeout elapsed.
    pub timed_out: bool,
}

#[derive(Debug, Default)]
struct Slot {
    observed: Option<Edge>,
    closed: bool,
}

impl Slot {
    fn is_settled(&self) -> bool {
        self.observed.is_some() || self.closed
    }
}

// Single-value slot shared between the waiting thread and its sentinel callback.
#[derive(Default)]
struct Waiter {
    slot: Mutex<Slot>,
    signal: Condvar,
}

impl Waiter {
    // Only the first edge is kept.
    fn observe(&self, edge: Edge) {
        let mut slot = self.slot.lock();
        if slot.observed.is_none() {
            slot.observed = Some(edge);
            self.signal.notify_all();
        }
    }

    fn close(&self) {
        self.slot.lock().closed = true;
        self.signal.notify_all();
    }
}

// Removes the sentinel on every exit path.
struct Sentinel<'a> {
    core: &'a PinCore,
    id: CallbackId,
}

impl Drop for Sentinel<'_> {
    fn drop(&mut self) {
        // The pin may have been closed while we were waiting, which already
        // dropped its subscribers.
        if let Err(e) = self.core.remove_callback(self.id) {
            debug!("Sentinel for pin {} not removed: {}", self.core.pin(), e);
        }
    }
}

pub(crate) fn wait_for_event(
    core: &Arc<PinCore>,
    trigger: Trigger,
    timeout: Duration,
) -> Result<WaitResult> {
    let waiter = Arc::new(Waiter::default());

    let id = {
        let observer = waiter.clone();
        let closer = waiter.clone();
        let on_close: CloseHook = Arc::new(move || closer.close());
        core.subscribe(
            trigger,
            Arc::new(move |event: Event| observer.observe(event.edge)),
            Some(on_close),
        )?
    };
    let _sentinel = Sentinel {
        core: core.as_ref(),
        id,
    };

    // A deadline that can't be represented waits indefinitely
    let deadline = Instant::now().checked_add(timeout);
    if deadline.is_none() {
        warn!("Timeout {:?} for pin {} is too large, waiting indefinitely", timeout, core.pin());
    }

    let mut slot = waiter.slot.lock();
    while !slot.is_settled() {
        match deadline {
            Some(deadline) => {
                if waiter.signal.wait_until(&mut slot, deadline).timed_out() {
                    break;
                }
            }
            None => waiter.signal.wait(&mut slot),
        }
    }

    // An edge that landed right before the deadline, or before the pin was
    // closed, still counts
    let edge = slot.observed;
    let closed = slot.closed;
    drop(slot);

    if edge.is_none() && closed {
        return Err(Error::Disposed(core.pin()));
    }

    Ok(WaitResult {
        edge,
        timed_out: edge.is_none(),
    })
}
