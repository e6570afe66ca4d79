use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::gpio::pin::{CallbackId, PinCore};
use crate::gpio::{Error, Event, Pin, Result, Trigger};

/// Snapshot of a [`ChangeCounter`].
///
/// [`ChangeCounter`]: struct.ChangeCounter.html
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct ChangeCount {
    /// Number of counted transitions.
    pub count: u64,
    /// Time elapsed since the counter was created.
    pub relative_time: Duration,
}

/// Counts the transitions of a pin that match a polarity.
///
/// The counter subscribes to the pin while it's started, so it counts edges
/// reported by the backend as well as edges caused by writing to the pin.
/// Once the pin is closed, every method returns `Err(`[`Error::Disposed`]`)`.
///
/// [`Error::Disposed`]: enum.Error.html#variant.Disposed
#[derive(Debug)]
pub struct ChangeCounter {
    core: Arc<PinCore>,
    count: Arc<AtomicU64>,
    polarity: Trigger,
    subscription: Option<CallbackId>,
    created: Instant,
}

impl ChangeCounter {
    /// Constructs a stopped counter for `pin`, counting falling edges.
    pub fn new(pin: &Pin) -> Result<ChangeCounter> {
        ChangeCounter::from_core(pin.core.clone())
    }

    pub(crate) fn from_core(core: Arc<PinCore>) -> Result<ChangeCounter> {
        if core.is_disposed() {
            return Err(Error::Disposed(core.pin()));
        }

        Ok(ChangeCounter {
            core,
            count: Arc::new(AtomicU64::new(0)),
            polarity: Trigger::FallingEdge,
            subscription: None,
            created: Instant::now(),
        })
    }

    fn check(&self) -> Result<()> {
        if self.core.is_disposed() {
            Err(Error::Disposed(self.core.pin()))
        } else {
            Ok(())
        }
    }

    /// Returns the pin number.
    pub fn pin(&self) -> u8 {
        self.core.pin()
    }

    /// Returns the counted polarity.
    pub fn polarity(&self) -> Trigger {
        self.polarity
    }

    /// Sets the counted polarity. Only allowed while the counter is stopped.
    pub fn set_polarity(&mut self, polarity: Trigger) -> Result<()> {
        self.check()?;
        if self.is_started() {
            return Err(Error::CounterStarted(self.core.pin()));
        }

        self.polarity = polarity;

        Ok(())
    }

    /// Returns `true` if the counter is running.
    pub fn is_started(&self) -> bool {
        self.subscription.is_some()
    }

    /// Starts counting.
    pub fn start(&mut self) -> Result<()> {
        self.check()?;
        if self.is_started() {
            return Err(Error::CounterStarted(self.core.pin()));
        }

        let count = self.count.clone();
        let id = self.core.add_callback(
            self.polarity,
            Arc::new(move |_: Event| {
                count.fetch_add(1, Ordering::SeqCst);
            }),
        )?;
        self.subscription = Some(id);

        debug!("Started change counter on pin {} ({})", self.core.pin(), self.polarity);

        Ok(())
    }

    /// Stops counting. The current count is kept.
    pub fn stop(&mut self) -> Result<()> {
        self.check()?;
        let id = self
            .subscription
            .ok_or(Error::CounterStopped(self.core.pin()))?;

        self.core.remove_callback(id)?;
        self.subscription = None;

        debug!("Stopped change counter on pin {}", self.core.pin());

        Ok(())
    }

    /// Returns the current count.
    pub fn read(&self) -> Result<ChangeCount> {
        self.check()?;

        Ok(ChangeCount {
            count: self.count.load(Ordering::SeqCst),
            relative_time: self.created.elapsed(),
        })
    }

    /// Resets the count to zero, and returns the count before the reset.
    pub fn reset(&mut self) -> Result<ChangeCount> {
        self.check()?;

        Ok(ChangeCount {
            count: self.count.swap(0, Ordering::SeqCst),
            relative_time: self.created.elapsed(),
        })
    }
}

impl Drop for ChangeCounter {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            // Closing the pin already dropped the subscription
            let _ = self.core.remove_callback(id);
        }
    }
}
