// Copyright (c) 2017-2019 Rene van der Meer
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
// THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error};
use parking_lot::{Mutex, MutexGuard, ReentrantMutex};

use crate::gpio::interrupt::Dispatcher;
use crate::gpio::{
    wait, Edge, Error, Event, GpioState, Level, Line, Mode, Result, SharingMode, Trigger,
    WaitResult,
};

pub(crate) type Callback = Arc<dyn Fn(Event) + Send + Sync>;
pub(crate) type CloseHook = Arc<dyn Fn() + Send + Sync>;

/// Identifies a registered callback.
///
/// Returned by [`Pin::add_callback`] and [`Gpio::register_callback`].
///
/// [`Pin::add_callback`]: struct.Pin.html#method.add_callback
/// [`Gpio::register_callback`]: struct.Gpio.html#method.register_callback
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub struct CallbackId(u64);

struct Subscriber {
    id: CallbackId,
    trigger: Trigger,
    callback: Callback,
    // Called once the pin is disposed
    on_close: Option<CloseHook>,
}

struct PinInner {
    line: Box<dyn Line>,
    mode: Mode,
    debounce: Duration,
    level: Level,
    subscribers: Vec<Subscriber>,
}

impl PinInner {
    // Drives the line if the level changed, and returns the resulting edge.
    fn drive(&mut self, level: Level) -> Result<Option<Edge>> {
        if self.level == level {
            return Ok(None);
        }

        self.line.write(level)?;
        self.level = level;

        Ok(Some(Edge::towards(level)))
    }

    fn callbacks_for(&self, edge: Edge) -> Vec<Callback> {
        self.subscribers
            .iter()
            .filter(|subscriber| subscriber.trigger.matches(edge))
            .map(|subscriber| subscriber.callback.clone())
            .collect()
    }
}

// Per-pin state machine shared by the registry, the dispatcher and the owning Pin.
//
// Lock order is delivery, then inner. The delivery lock is held while subscribers
// run, so edges on one pin reach them in the order they were applied. It's
// reentrant, because a subscriber may write to or close its own pin.
pub(crate) struct PinCore {
    pin: u8,
    inner: Mutex<PinInner>,
    delivery: ReentrantMutex<()>,
    disposed: AtomicBool,
    registered: AtomicBool,
    next_id: AtomicU64,
    dispatcher: Arc<Dispatcher>,
}

impl fmt::Debug for PinCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinCore")
            .field("pin", &self.pin)
            .field("inner", &format_args!("{{ .. }}"))
            .field("disposed", &self.disposed)
            .field("registered", &self.registered)
            .finish()
    }
}

impl PinCore {
    pub(crate) fn new(pin: u8, line: Box<dyn Line>, dispatcher: Arc<Dispatcher>) -> PinCore {
        PinCore {
            pin,
            inner: Mutex::new(PinInner {
                line,
                mode: Mode::Input,
                debounce: Duration::ZERO,
                level: Level::Low,
                subscribers: Vec::new(),
            }),
            delivery: ReentrantMutex::new(()),
            disposed: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            dispatcher,
        }
    }

    #[inline]
    pub(crate) fn pin(&self) -> u8 {
        self.pin
    }

    #[inline]
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    // Locks the pin's state, unless it has been disposed.
    fn lock(&self) -> Result<MutexGuard<'_, PinInner>> {
        let inner = self.inner.lock();

        if self.is_disposed() {
            Err(Error::Disposed(self.pin))
        } else {
            Ok(inner)
        }
    }

    pub(crate) fn mode(&self) -> Result<Mode> {
        Ok(self.lock()?.mode)
    }

    pub(crate) fn set_mode(&self, mode: Mode) -> Result<()> {
        let mut inner = self.lock()?;

        if !inner.line.is_mode_supported(mode) {
            return Err(Error::UnsupportedMode(self.pin, mode));
        }

        inner.line.set_mode(mode)?;
        inner.mode = mode;
        debug!("Set pin {} mode to {}", self.pin, mode);

        Ok(())
    }

    pub(crate) fn is_mode_supported(&self, mode: Mode) -> Result<bool> {
        Ok(self.lock()?.line.is_mode_supported(mode))
    }

    pub(crate) fn read(&self) -> Result<Level> {
        Ok(self.lock()?.line.read()?)
    }

    pub(crate) fn write(&self, level: Level) -> Result<()> {
        let _delivery = self.delivery.lock();
        let changed = {
            let mut inner = self.lock()?;
            inner
                .drive(level)?
                .map(|edge| (edge, inner.callbacks_for(edge)))
        };

        if let Some((edge, callbacks)) = changed {
            self.notify(edge, &callbacks);
        }

        Ok(())
    }

    pub(crate) fn toggle(&self) -> Result<()> {
        let _delivery = self.delivery.lock();
        let changed = {
            let mut inner = self.lock()?;
            let level = !inner.level;
            inner
                .drive(level)?
                .map(|edge| (edge, inner.callbacks_for(edge)))
        };

        if let Some((edge, callbacks)) = changed {
            self.notify(edge, &callbacks);
        }

        Ok(())
    }

    pub(crate) fn debounce_timeout(&self) -> Result<Duration> {
        Ok(self.lock()?.debounce)
    }

    pub(crate) fn set_debounce_timeout(&self, timeout: Duration) -> Result<()> {
        let mut inner = self.lock()?;

        inner.line.set_debounce_timeout(timeout)?;
        inner.debounce = timeout;

        Ok(())
    }

    pub(crate) fn add_callback(self: &Arc<Self>, trigger: Trigger, callback: Callback) -> Result<CallbackId> {
        self.subscribe(trigger, callback, None)
    }

    // Adds a subscriber with an optional hook that runs when the pin is disposed.
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        trigger: Trigger,
        callback: Callback,
        on_close: Option<CloseHook>,
    ) -> Result<CallbackId> {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));

        {
            let mut inner = self.lock()?;
            inner.subscribers.push(Subscriber {
                id,
                trigger,
                callback,
                on_close,
            });

            // Re-applying the mode refreshes the line's edge detection
            let mode = inner.mode;
            if let Err(e) = inner.line.set_mode(mode) {
                inner.subscribers.pop();
                return Err(e.into());
            }
        }

        // The dispatcher table is only locked after the pin lock is released.
        // Pins stay registered until they're disposed.
        if !self.registered.swap(true, Ordering::SeqCst) {
            self.dispatcher.add_pin(self);
        }

        debug!("Added callback {:?} ({}) to pin {}", id, trigger, self.pin);

        Ok(id)
    }

    // Returns false if no callback with this id was registered.
    pub(crate) fn remove_callback(&self, id: CallbackId) -> Result<bool> {
        // Dropped after the pin lock is released
        let _removed = {
            let mut inner = self.lock()?;

            let Some(index) = inner
                .subscribers
                .iter()
                .position(|subscriber| subscriber.id == id)
            else {
                return Ok(false);
            };

            let subscriber = inner.subscribers.remove(index);
            let mode = inner.mode;
            if let Err(e) = inner.line.set_mode(mode) {
                inner.subscribers.insert(index, subscriber);
                return Err(e.into());
            }

            subscriber
        };

        debug!("Removed callback {:?} from pin {}", id, self.pin);

        Ok(true)
    }

    // Handles an edge reported by the dispatcher.
    pub(crate) fn on_edge(&self, edge: Edge) {
        let _delivery = self.delivery.lock();
        let callbacks = {
            let mut inner = self.inner.lock();
            if self.is_disposed() {
                return;
            }

            inner.level = edge.level();
            inner.callbacks_for(edge)
        };

        self.notify(edge, &callbacks);
    }

    // Runs every callback, even if an earlier one panics. Must be called without
    // holding the pin lock.
    fn notify(&self, edge: Edge, callbacks: &[Callback]) {
        let event = Event {
            pin: self.pin,
            edge,
        };

        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!("Callback for pin {} panicked while handling {} edge", self.pin, edge);
            }
        }
    }

    // Releases the line and unregisters the pin. Returns false if the pin was
    // already disposed.
    pub(crate) fn dispose(&self) -> bool {
        let (released, subscribers) = {
            let mut inner = self.inner.lock();
            if self.disposed.swap(true, Ordering::SeqCst) {
                return false;
            }

            (inner.line.release(), mem::take(&mut inner.subscribers))
        };

        if let Err(e) = released {
            error!("Failed to release pin {}: {}", self.pin, e);
        }

        self.dispatcher.remove_pin(self);

        for on_close in subscribers.iter().filter_map(|subscriber| subscriber.on_close.as_ref()) {
            on_close();
        }

        true
    }
}

/// An open GPIO pin.
///
/// `Pin`s are constructed by opening them through [`Gpio::get`]. A `Pin` has
/// exclusive access to its pin number until it's closed, either explicitly through
/// [`close`], through [`Gpio::close_pin`], or when the `Pin` goes out of scope.
/// Any method called on a closed `Pin` returns `Err(`[`Error::Disposed`]`)`.
///
/// The `embedded-hal` [`digital::InputPin`], [`digital::OutputPin`] and
/// [`digital::StatefulOutputPin`] trait implementations for `Pin` can be enabled
/// by specifying the optional `hal` feature in the dependency declaration for
/// the `edgegpio` crate.
///
/// [`Gpio::get`]: struct.Gpio.html#method.get
/// [`Gpio::close_pin`]: struct.Gpio.html#method.close_pin
/// [`close`]: #method.close
/// [`Error::Disposed`]: enum.Error.html#variant.Disposed
/// [`digital::InputPin`]: ../../embedded_hal/digital/trait.InputPin.html
/// [`digital::OutputPin`]: ../../embedded_hal/digital/trait.OutputPin.html
/// [`digital::StatefulOutputPin`]: ../../embedded_hal/digital/trait.StatefulOutputPin.html
#[derive(Debug)]
pub struct Pin {
    pub(crate) core: Arc<PinCore>,
    gpio_state: Arc<GpioState>,
    close_on_drop: bool,
}

impl Pin {
    pub(crate) fn new(core: Arc<PinCore>, gpio_state: Arc<GpioState>) -> Pin {
        Pin {
            core,
            gpio_state,
            close_on_drop: true,
        }
    }

    /// Returns the GPIO pin number.
    #[inline]
    pub fn pin(&self) -> u8 {
        self.core.pin()
    }

    /// Returns the pin's sharing mode. Pins are always opened in exclusive mode.
    #[inline]
    pub fn sharing_mode(&self) -> SharingMode {
        SharingMode::Exclusive
    }

    /// Returns the pin's drive mode.
    pub fn mode(&self) -> Result<Mode> {
        self.core.mode()
    }

    /// Sets the pin's drive mode.
    ///
    /// If the backend doesn't support `mode` for this pin, `set_mode` returns
    /// `Err(`[`Error::UnsupportedMode`]`)` and the pin's mode is left unchanged.
    ///
    /// [`Error::UnsupportedMode`]: enum.Error.html#variant.UnsupportedMode
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.core.set_mode(mode)
    }

    /// Returns `true` if the backend supports `mode` for this pin.
    pub fn is_mode_supported(&self, mode: Mode) -> Result<bool> {
        self.core.is_mode_supported(mode)
    }

    /// Reads the pin's logic level.
    ///
    /// If the pin is configured as an output, this is the last written level.
    pub fn read(&self) -> Result<Level> {
        self.core.read()
    }

    /// Reads the pin's logic level, and returns `true` if it's set to [`Low`].
    ///
    /// [`Low`]: enum.Level.html#variant.Low
    pub fn is_low(&self) -> Result<bool> {
        Ok(self.read()? == Level::Low)
    }

    /// Reads the pin's logic level, and returns `true` if it's set to [`High`].
    ///
    /// [`High`]: enum.Level.html#variant.High
    pub fn is_high(&self) -> Result<bool> {
        Ok(self.read()? == Level::High)
    }

    /// Sets the pin's logic level.
    ///
    /// If `level` differs from the previously written level, callbacks are
    /// called with a [`Rising`] edge for a change to [`High`], or a [`Falling`]
    /// edge for a change to [`Low`]. Writing the same level again has no effect.
    ///
    /// Edges on the same pin are delivered one at a time, so `write` blocks while
    /// callbacks for an earlier edge on this pin are still running on another thread.
    ///
    /// [`Rising`]: enum.Edge.html#variant.Rising
    /// [`Falling`]: enum.Edge.html#variant.Falling
    /// [`Low`]: enum.Level.html#variant.Low
    /// [`High`]: enum.Level.html#variant.High
    pub fn write(&mut self, level: Level) -> Result<()> {
        self.core.write(level)
    }

    /// Sets the pin's logic level to [`Low`].
    ///
    /// [`Low`]: enum.Level.html#variant.Low
    #[inline]
    pub fn set_low(&mut self) -> Result<()> {
        self.write(Level::Low)
    }

    /// Sets the pin's logic level to [`High`].
    ///
    /// [`High`]: enum.Level.html#variant.High
    #[inline]
    pub fn set_high(&mut self) -> Result<()> {
        self.write(Level::High)
    }

    /// Toggles the pin's logic level between [`Low`] and [`High`], based on the
    /// last written level.
    ///
    /// [`Low`]: enum.Level.html#variant.Low
    /// [`High`]: enum.Level.html#variant.High
    pub fn toggle(&mut self) -> Result<()> {
        self.core.toggle()
    }

    /// Returns the debounce timeout.
    pub fn debounce_timeout(&self) -> Result<Duration> {
        self.core.debounce_timeout()
    }

    /// Sets the debounce timeout, which is the interval during which changes to
    /// the pin's level are filtered out by the backend.
    ///
    /// A zero duration disables filtering.
    pub fn set_debounce_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.core.set_debounce_timeout(timeout)
    }

    /// Adds a callback that's executed for each edge matching `trigger`.
    ///
    /// Callbacks are executed in the order they were added, on the event thread for
    /// edges reported by the backend, or on the current thread for edges caused by
    /// [`write`]. A panicking callback doesn't prevent the remaining callbacks from
    /// being executed.
    ///
    /// [`write`]: #method.write
    pub fn add_callback<C>(&mut self, trigger: Trigger, callback: C) -> Result<CallbackId>
    where
        C: Fn(Event) + Send + Sync + 'static,
    {
        self.core.add_callback(trigger, Arc::new(callback))
    }

    /// Removes a previously added callback.
    ///
    /// Returns `false` if no callback with this id was registered.
    pub fn remove_callback(&mut self, id: CallbackId) -> Result<bool> {
        self.core.remove_callback(id)
    }

    /// Blocks until an edge matching `trigger` occurs, or until `timeout` elapses.
    ///
    /// Only edges that occur after `wait_for_event` is called are observed. If
    /// several matching edges occur before the thread wakes up, the first one is
    /// returned. If the pin is closed while waiting, `wait_for_event` returns
    /// `Err(`[`Error::Disposed`]`)` right away.
    ///
    /// [`Error::Disposed`]: enum.Error.html#variant.Disposed
    pub fn wait_for_event(&mut self, trigger: Trigger, timeout: Duration) -> Result<WaitResult> {
        wait::wait_for_event(&self.core, trigger, timeout)
    }

    /// Returns the value of `close_on_drop`.
    pub fn close_on_drop(&self) -> bool {
        self.close_on_drop
    }

    /// When enabled, closes the pin when the `Pin` goes out of scope. By default,
    /// this is set to `true`.
    ///
    /// When disabled, dropping the `Pin` leaves the pin open in the [`Gpio`]
    /// registry, where it can be accessed by number and closed through
    /// [`Gpio::close_pin`].
    ///
    /// [`Gpio`]: struct.Gpio.html
    /// [`Gpio::close_pin`]: struct.Gpio.html#method.close_pin
    pub fn set_close_on_drop(&mut self, close_on_drop: bool) {
        self.close_on_drop = close_on_drop;
    }

    /// Closes the pin and releases its line. Closing a pin more than once has
    /// no effect.
    pub fn close(&mut self) {
        self.gpio_state.close_core(&self.core);
    }

    /// Returns `true` if the pin has been closed.
    pub fn is_closed(&self) -> bool {
        self.core.is_disposed()
    }
}

impl Drop for Pin {
    fn drop(&mut self) {
        if self.close_on_drop {
            self.close();
        }
    }
}

impl PartialEq for Pin {
    fn eq(&self, other: &Pin) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl Eq for Pin {}
