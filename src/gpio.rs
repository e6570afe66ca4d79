//! Interface for GPIO pins and their edge events.
//!
//! A [`Gpio`] instance owns the registry of open pins, the event dispatcher and the
//! thread that delivers edge events. The physical lines are provided by a
//! [`Backend`], which is chosen when the [`Gpio`] is constructed: [`MockBackend`]
//! simulates lines in memory, and [`SysfsBackend`] drives `/sys/class/gpio` on Linux.
//!
//! ## Pins
//!
//! Pins can be used in two styles, which share the same registry and can be mixed.
//!
//! [`Gpio::get`] opens a pin and returns an owned [`Pin`]. The pin is closed when
//! the [`Pin`] goes out of scope, unless [`Pin::set_close_on_drop(false)`] hands it
//! over to the registry.
//!
//! [`Gpio::open_pin`] and [`Gpio::open_pin_with_mode`] open a pin that's kept in the
//! registry until [`Gpio::close_pin`] is called. Registry pins are addressed by their
//! number, through methods such as [`Gpio::read`], [`Gpio::write`] and
//! [`Gpio::set_pin_mode`].
//!
//! Each pin number can only be open once. Opening a pin that's already open returns
//! `Err(`[`Error::AlreadyOpen`]`)`, and any operation on a closed [`Pin`] returns
//! `Err(`[`Error::Disposed`]`)`.
//!
//! ## Edge events
//!
//! Edges are reported either by the backend, when an input changes, or by the pin
//! itself, when a written value differs from the previous one. Writing the same
//! value twice doesn't generate an event.
//!
//! Callbacks are registered with [`Pin::add_callback`] or [`Gpio::register_callback`],
//! and are executed on the event thread for hardware edges, or on the writing thread
//! for edges caused by [`Pin::write`]. Callbacks are never called while any internal
//! lock is held, so a callback is free to close its own pin.
//!
//! [`Pin::wait_for_event`] and [`Gpio::wait_for_event`] block the current thread
//! until a matching edge occurs, or until the timeout elapses.
//!
//! ## Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use edgegpio::gpio::{Gpio, Level, MockBackend, Mode, Trigger};
//!
//! # fn main() -> edgegpio::gpio::Result<()> {
//! let gpio = Gpio::new(MockBackend::new(16))?;
//! let mut pin = gpio.get(5)?;
//! pin.set_mode(Mode::Output)?;
//!
//! pin.add_callback(Trigger::Both, |event| println!("{}", event))?;
//! pin.write(Level::High)?;
//!
//! let result = pin.wait_for_event(Trigger::FallingEdge, Duration::from_millis(10))?;
//! assert!(result.timed_out);
//! # Ok(())
//! # }
//! ```
//!
//! [`Backend`]: trait.Backend.html
//! [`MockBackend`]: struct.MockBackend.html
//! [`SysfsBackend`]: struct.SysfsBackend.html
//! [`Gpio`]: struct.Gpio.html
//! [`Gpio::get`]: struct.Gpio.html#method.get
//! [`Gpio::open_pin`]: struct.Gpio.html#method.open_pin
//! [`Gpio::open_pin_with_mode`]: struct.Gpio.html#method.open_pin_with_mode
//! [`Gpio::close_pin`]: struct.Gpio.html#method.close_pin
//! [`Gpio::read`]: struct.Gpio.html#method.read
//! [`Gpio::write`]: struct.Gpio.html#method.write
//! [`Gpio::set_pin_mode`]: struct.Gpio.html#method.set_pin_mode
//! [`Gpio::register_callback`]: struct.Gpio.html#method.register_callback
//! [`Gpio::wait_for_event`]: struct.Gpio.html#method.wait_for_event
//! [`Pin`]: struct.Pin.html
//! [`Pin::set_close_on_drop(false)`]: struct.Pin.html#method.set_close_on_drop
//! [`Pin::add_callback`]: struct.Pin.html#method.add_callback
//! [`Pin::write`]: struct.Pin.html#method.write
//! [`Pin::wait_for_event`]: struct.Pin.html#method.wait_for_event
//! [`Error::AlreadyOpen`]: enum.Error.html#variant.AlreadyOpen
//! [`Error::Disposed`]: enum.Error.html#variant.Disposed

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::ops::{BitOr, Not};
use std::result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

mod backend;
mod counter;
#[cfg(target_os = "linux")]
mod epoll;
#[cfg(any(feature = "embedded-hal", feature = "embedded-hal-0"))]
mod hal;
#[cfg(feature = "hal-unproven")]
mod hal_unproven;
mod interrupt;
mod mock;
mod pin;
#[cfg(target_os = "linux")]
mod sysfs;
mod wait;

pub use self::backend::{Backend, Line};
pub use self::counter::{ChangeCount, ChangeCounter};
pub use self::interrupt::{EventSink, RawEvent};
pub use self::mock::MockBackend;
pub use self::pin::{CallbackId, Pin};
#[cfg(target_os = "linux")]
pub use self::sysfs::SysfsBackend;
pub use self::wait::WaitResult;

use self::interrupt::{Dispatcher, EventLoop};
use self::pin::PinCore;

/// Errors that can occur when accessing GPIO pins.
#[derive(Debug, Error)]
pub enum Error {
    /// Pin is already open.
    ///
    /// The pin is already in use elsewhere in your application. It can be opened
    /// again after it's closed, either through [`Gpio::close_pin`] or by dropping
    /// the owning [`Pin`].
    ///
    /// [`Gpio::close_pin`]: struct.Gpio.html#method.close_pin
    /// [`Pin`]: struct.Pin.html
    #[error("Pin {0} is already open")]
    AlreadyOpen(u8),
    /// Pin isn't open.
    ///
    /// A registry operation addressed a pin number that isn't currently open.
    #[error("Pin {0} is not open")]
    NotOpen(u8),
    /// Pin has been closed.
    ///
    /// The [`Pin`] was closed, either explicitly or through [`Gpio::close_pin`].
    ///
    /// [`Pin`]: struct.Pin.html
    /// [`Gpio::close_pin`]: struct.Gpio.html#method.close_pin
    #[error("Pin {0} has been closed")]
    Disposed(u8),
    /// The backend doesn't support the requested drive mode for this pin.
    #[error("Pin {0} doesn't support mode {1}")]
    UnsupportedMode(u8, Mode),
    /// Pin is not available.
    ///
    /// The pin number is out of range, or the backend refused to initialize the line.
    #[error("Pin {0} is not available")]
    PinUnavailable(u8),
    /// The change counter has already been started.
    #[error("Change counter for pin {0} is already started")]
    CounterStarted(u8),
    /// The change counter hasn't been started.
    #[error("Change counter for pin {0} is not started")]
    CounterStopped(u8),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Thread panicked.
    #[error("Thread panicked")]
    ThreadPanic,
}

/// Result type returned from methods that can have `edgegpio::gpio::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Pin drive modes.
///
/// Modes ordered before [`Output`] configure the pin as an input.
///
/// [`Output`]: #variant.Output
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
#[repr(u8)]
pub enum Mode {
    #[default]
    Input = 0,
    InputPullDown = 1,
    InputPullUp = 2,
    Output = 3,
    OutputOpenDrain = 4,
    OutputOpenDrainPullUp = 5,
    OutputOpenSource = 6,
    OutputOpenSourcePullDown = 7,
}

impl Mode {
    /// Returns `true` if the mode configures the pin as an input.
    #[inline]
    pub fn is_input(self) -> bool {
        self < Mode::Output
    }

    /// Returns `true` if the mode configures the pin as an output.
    #[inline]
    pub fn is_output(self) -> bool {
        !self.is_input()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Mode::Input => write!(f, "In"),
            Mode::InputPullDown => write!(f, "InPullDown"),
            Mode::InputPullUp => write!(f, "InPullUp"),
            Mode::Output => write!(f, "Out"),
            Mode::OutputOpenDrain => write!(f, "OutOpenDrain"),
            Mode::OutputOpenDrainPullUp => write!(f, "OutOpenDrainPullUp"),
            Mode::OutputOpenSource => write!(f, "OutOpenSource"),
            Mode::OutputOpenSourcePullDown => write!(f, "OutOpenSourcePullDown"),
        }
    }
}

/// Pin logic levels.
#[derive(Debug, Default, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u8)]
pub enum Level {
    #[default]
    Low = 0,
    High = 1,
}

impl From<bool> for Level {
    fn from(e: bool) -> Level {
        if e {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<u8> for Level {
    fn from(value: u8) -> Self {
        if value == 0 {
            Level::Low
        } else {
            Level::High
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Level::Low => write!(f, "Low"),
            Level::High => write!(f, "High"),
        }
    }
}

impl Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// A single observed transition of a pin's logic level.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum Edge {
    /// Transition from [`Low`] to [`High`].
    ///
    /// [`Low`]: enum.Level.html#variant.Low
    /// [`High`]: enum.Level.html#variant.High
    Rising,
    /// Transition from [`High`] to [`Low`].
    ///
    /// [`Low`]: enum.Level.html#variant.Low
    /// [`High`]: enum.Level.html#variant.High
    Falling,
}

impl Edge {
    /// Returns the edge that ends at `level`.
    #[inline]
    pub fn towards(level: Level) -> Edge {
        match level {
            Level::High => Edge::Rising,
            Level::Low => Edge::Falling,
        }
    }

    /// Returns the logic level after the transition.
    #[inline]
    pub fn level(self) -> Level {
        match self {
            Edge::Rising => Level::High,
            Edge::Falling => Level::Low,
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Edge::Rising => write!(f, "Rising"),
            Edge::Falling => write!(f, "Falling"),
        }
    }
}

/// Edge trigger conditions.
///
/// Triggers can be combined with `|`, so `RisingEdge | FallingEdge == Both`.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum Trigger {
    Disabled = 0,
    RisingEdge = 1,
    FallingEdge = 2,
    Both = 3,
}

impl Trigger {
    /// Returns `true` if `edge` satisfies this trigger.
    #[inline]
    pub fn matches(self, edge: Edge) -> bool {
        (self as u8) & (Trigger::from(edge) as u8) != 0
    }

    fn from_bits(bits: u8) -> Trigger {
        match bits & 0b11 {
            0 => Trigger::Disabled,
            1 => Trigger::RisingEdge,
            2 => Trigger::FallingEdge,
            _ => Trigger::Both,
        }
    }
}

impl From<Edge> for Trigger {
    fn from(edge: Edge) -> Trigger {
        match edge {
            Edge::Rising => Trigger::RisingEdge,
            Edge::Falling => Trigger::FallingEdge,
        }
    }
}

impl BitOr for Trigger {
    type Output = Trigger;

    fn bitor(self, rhs: Trigger) -> Trigger {
        Trigger::from_bits(self as u8 | rhs as u8)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Trigger::Disabled => write!(f, "Disabled"),
            Trigger::RisingEdge => write!(f, "RisingEdge"),
            Trigger::FallingEdge => write!(f, "FallingEdge"),
            Trigger::Both => write!(f, "Both"),
        }
    }
}

/// Edge event passed to pin callbacks.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Event {
    /// Pin number.
    pub pin: u8,
    /// The transition that occurred.
    pub edge: Edge,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin {}: {}", self.pin, self.edge)
    }
}

/// Pin sharing modes.
///
/// Pins are always opened in `Exclusive` mode. `SharedReadOnly` is never
/// produced by this crate, and only exists for interoperability with code that
/// matches on both sharing modes.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SharingMode {
    Exclusive,
    SharedReadOnly,
}

/// `Gpio` construction settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Debounce timeout applied to each newly opened pin.
    pub default_debounce: Duration,
    /// Name of the thread that delivers edge events.
    pub event_thread_name: String,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            default_debounce: Duration::ZERO,
            event_thread_name: String::from("edgegpio-events"),
        }
    }
}

// Store Gpio's state separately, so we can conveniently share it through
// a cloned Arc.
pub(crate) struct GpioState {
    backend: Box<dyn Backend>,
    pins: Mutex<HashMap<u8, Arc<PinCore>>>,
    pins_taken: Box<[AtomicBool]>,
    dispatcher: Arc<Dispatcher>,
    event_loop: Mutex<EventLoop>,
    config: Config,
}

impl fmt::Debug for GpioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpioState")
            .field("backend", &self.backend)
            .field("pins", &format_args!("{{ .. }}"))
            .field("pins_taken", &format_args!("{{ .. }}"))
            .field("dispatcher", &self.dispatcher)
            .field("event_loop", &self.event_loop)
            .field("config", &self.config)
            .finish()
    }
}

impl GpioState {
    fn open(&self, pin: u8, mode: Option<Mode>) -> Result<Arc<PinCore>> {
        if pin >= self.backend.pin_count() {
            warn!("Pin {} is out of range", pin);
            return Err(Error::PinUnavailable(pin));
        }

        // Returns an error if the pin is already taken, otherwise atomically sets it to true here
        if self.pins_taken[pin as usize]
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyOpen(pin));
        }

        let line = match self.backend.open_line(pin) {
            Ok(line) => line,
            Err(e) => {
                warn!("Backend refused to open pin {}: {}", pin, e);
                self.pins_taken[pin as usize].store(false, Ordering::SeqCst);
                return Err(Error::PinUnavailable(pin));
            }
        };

        let core = Arc::new(PinCore::new(pin, line, self.dispatcher.clone()));
        self.pins.lock().insert(pin, core.clone());

        if let Err(e) = self.configure(&core, mode) {
            self.close_core(&core);
            return Err(e);
        }

        debug!("Opened pin {}", pin);

        Ok(core)
    }

    fn configure(&self, core: &PinCore, mode: Option<Mode>) -> Result<()> {
        if !self.config.default_debounce.is_zero() {
            core.set_debounce_timeout(self.config.default_debounce)?;
        }

        if let Some(mode) = mode {
            core.set_mode(mode)?;
        }

        Ok(())
    }

    fn lookup(&self, pin: u8) -> Result<Arc<PinCore>> {
        self.pins
            .lock()
            .get(&pin)
            .cloned()
            .ok_or(Error::NotOpen(pin))
    }

    // Disposes the pin, removes it from the registry and frees its number. Returns
    // false if the pin was already closed.
    pub(crate) fn close_core(&self, core: &Arc<PinCore>) -> bool {
        let disposed = core.dispose();

        {
            let mut pins = self.pins.lock();
            if pins
                .get(&core.pin())
                .map_or(false, |entry| Arc::ptr_eq(entry, core))
            {
                pins.remove(&core.pin());
            }
        }

        if disposed {
            self.pins_taken[core.pin() as usize].store(false, Ordering::SeqCst);
            debug!("Closed pin {}", core.pin());
        }

        disposed
    }
}

impl Drop for GpioState {
    fn drop(&mut self) {
        let open: Vec<Arc<PinCore>> = self.pins.lock().drain().map(|(_, core)| core).collect();
        for core in open {
            if core.dispose() {
                self.pins_taken[core.pin() as usize].store(false, Ordering::SeqCst);
            }
        }

        if let Err(e) = self.event_loop.lock().stop() {
            warn!("Failed to stop event thread: {}", e);
        }
    }
}

/// Provides access to GPIO pins through a [`Backend`].
///
/// Cloning a `Gpio` is cheap, and all clones share the same registry of open pins.
/// Separately constructed `Gpio` instances are fully independent.
///
/// [`Backend`]: trait.Backend.html
#[derive(Clone, Debug)]
pub struct Gpio {
    inner: Arc<GpioState>,
}

impl Gpio {
    /// Constructs a new `Gpio` with the default [`Config`].
    ///
    /// [`Config`]: struct.Config.html
    pub fn new<B>(backend: B) -> Result<Gpio>
    where
        B: Backend + 'static,
    {
        Gpio::with_config(backend, Config::default())
    }

    /// Constructs a new `Gpio` with the specified [`Config`].
    ///
    /// Spawns the event thread, and attaches the backend to it.
    ///
    /// [`Config`]: struct.Config.html
    pub fn with_config<B>(backend: B, config: Config) -> Result<Gpio>
    where
        B: Backend + 'static,
    {
        let dispatcher = Arc::new(Dispatcher::new());
        let event_loop = EventLoop::spawn(&config.event_thread_name, dispatcher.clone())?;
        backend.attach(event_loop.sink());

        let pins_taken = (0..backend.pin_count())
            .map(|_| AtomicBool::new(false))
            .collect();

        Ok(Gpio {
            inner: Arc::new(GpioState {
                backend: Box::new(backend),
                pins: Mutex::new(HashMap::new()),
                pins_taken,
                dispatcher,
                event_loop: Mutex::new(event_loop),
                config,
            }),
        })
    }

    /// Returns the number of pins provided by the backend.
    ///
    /// Valid pin numbers range from `0` to `pin_count() - 1`.
    #[inline]
    pub fn pin_count(&self) -> u8 {
        self.inner.backend.pin_count()
    }

    /// Returns a sink that feeds raw edge records into the event thread.
    ///
    /// Backends receive their own sink through [`Backend::attach`]. This is useful
    /// for custom interrupt sources.
    ///
    /// [`Backend::attach`]: trait.Backend.html#method.attach
    pub fn event_sink(&self) -> EventSink {
        self.inner.event_loop.lock().sink()
    }

    /// Opens the specified pin, and returns an owned [`Pin`].
    ///
    /// If the pin is already open, `get` returns `Err(`[`Error::AlreadyOpen`]`)`.
    /// If the pin number is out of range, or the backend can't initialize the line,
    /// `get` returns `Err(`[`Error::PinUnavailable`]`)`.
    ///
    /// The pin is closed when the [`Pin`] goes out of scope.
    ///
    /// [`Pin`]: struct.Pin.html
    /// [`Error::AlreadyOpen`]: enum.Error.html#variant.AlreadyOpen
    /// [`Error::PinUnavailable`]: enum.Error.html#variant.PinUnavailable
    pub fn get(&self, pin: u8) -> Result<Pin> {
        let core = self.inner.open(pin, None)?;

        Ok(Pin::new(core, self.inner.clone()))
    }

    /// Opens the specified pin, and keeps it in the registry until [`close_pin`]
    /// is called.
    ///
    /// [`close_pin`]: #method.close_pin
    pub fn open_pin(&self, pin: u8) -> Result<()> {
        self.inner.open(pin, None).map(|_| ())
    }

    /// Opens the specified pin and sets its drive mode.
    ///
    /// If the mode isn't supported, the pin is closed again and
    /// `Err(`[`Error::UnsupportedMode`]`)` is returned.
    ///
    /// [`Error::UnsupportedMode`]: enum.Error.html#variant.UnsupportedMode
    pub fn open_pin_with_mode(&self, pin: u8, mode: Mode) -> Result<()> {
        self.inner.open(pin, Some(mode)).map(|_| ())
    }

    /// Closes the specified pin.
    ///
    /// Any owned [`Pin`] for this number returns `Err(`[`Error::Disposed`]`)`
    /// afterwards.
    ///
    /// [`Pin`]: struct.Pin.html
    /// [`Error::Disposed`]: enum.Error.html#variant.Disposed
    pub fn close_pin(&self, pin: u8) -> Result<()> {
        let core = self.inner.lookup(pin)?;
        self.inner.close_core(&core);

        Ok(())
    }

    /// Returns `true` if the specified pin is open.
    pub fn is_pin_open(&self, pin: u8) -> bool {
        self.inner.pins.lock().contains_key(&pin)
    }

    /// Returns the pin's drive mode.
    pub fn pin_mode(&self, pin: u8) -> Result<Mode> {
        self.inner.lookup(pin)?.mode()
    }

    /// Sets the pin's drive mode.
    ///
    /// The pin is left unchanged if the backend doesn't support `mode`.
    pub fn set_pin_mode(&self, pin: u8, mode: Mode) -> Result<()> {
        self.inner.lookup(pin)?.set_mode(mode)
    }

    /// Returns `true` if the backend supports `mode` for the specified pin.
    pub fn is_pin_mode_supported(&self, pin: u8, mode: Mode) -> Result<bool> {
        self.inner.lookup(pin)?.is_mode_supported(mode)
    }

    /// Reads the pin's logic level.
    pub fn read(&self, pin: u8) -> Result<Level> {
        self.inner.lookup(pin)?.read()
    }

    /// Sets the pin's logic level.
    ///
    /// Subscribers are notified if the level differs from the previously written level.
    pub fn write(&self, pin: u8, level: Level) -> Result<()> {
        self.inner.lookup(pin)?.write(level)
    }

    /// Toggles the pin's logic level between [`Low`] and [`High`].
    ///
    /// [`Low`]: enum.Level.html#variant.Low
    /// [`High`]: enum.Level.html#variant.High
    pub fn toggle(&self, pin: u8) -> Result<()> {
        self.inner.lookup(pin)?.toggle()
    }

    /// Reads the logic levels of multiple pins, in order.
    pub fn read_many(&self, pins: &[u8]) -> Result<Vec<(u8, Level)>> {
        pins.iter()
            .map(|&pin| Ok((pin, self.read(pin)?)))
            .collect()
    }

    /// Writes multiple pins, in order.
    ///
    /// Stops at the first failure. Pins written before the failure keep their new level.
    pub fn write_many(&self, levels: &[(u8, Level)]) -> Result<()> {
        for &(pin, level) in levels {
            self.write(pin, level)?;
        }

        Ok(())
    }

    /// Returns the pin's debounce timeout.
    pub fn debounce_timeout(&self, pin: u8) -> Result<Duration> {
        self.inner.lookup(pin)?.debounce_timeout()
    }

    /// Sets the pin's debounce timeout. A zero duration disables filtering.
    pub fn set_debounce_timeout(&self, pin: u8, timeout: Duration) -> Result<()> {
        self.inner.lookup(pin)?.set_debounce_timeout(timeout)
    }

    /// Registers a callback that's executed for each edge on the pin that
    /// matches `trigger`.
    ///
    /// Returns a [`CallbackId`] that can be passed to [`unregister_callback`].
    /// Callbacks that capture a clone of this `Gpio` keep it alive until the pin
    /// is closed.
    ///
    /// [`CallbackId`]: struct.CallbackId.html
    /// [`unregister_callback`]: #method.unregister_callback
    pub fn register_callback<C>(&self, pin: u8, trigger: Trigger, callback: C) -> Result<CallbackId>
    where
        C: Fn(Event) + Send + Sync + 'static,
    {
        self.inner
            .lookup(pin)?
            .add_callback(trigger, Arc::new(callback))
    }

    /// Removes a previously registered callback.
    ///
    /// Removing a callback that isn't registered has no effect.
    pub fn unregister_callback(&self, pin: u8, id: CallbackId) -> Result<()> {
        self.inner.lookup(pin)?.remove_callback(id).map(|_| ())
    }

    /// Blocks until an edge matching `trigger` occurs on the pin, or until `timeout`
    /// elapses.
    ///
    /// Closing the pin from another thread ends the wait with
    /// `Err(`[`Error::Disposed`]`)`.
    ///
    /// [`Error::Disposed`]: enum.Error.html#variant.Disposed
    pub fn wait_for_event(&self, pin: u8, trigger: Trigger, timeout: Duration) -> Result<WaitResult> {
        let core = self.inner.lookup(pin)?;

        wait::wait_for_event(&core, trigger, timeout)
    }

    /// Creates a [`ChangeCounter`] for the specified pin.
    ///
    /// [`ChangeCounter`]: struct.ChangeCounter.html
    pub fn change_counter(&self, pin: u8) -> Result<ChangeCounter> {
        ChangeCounter::from_core(self.inner.lookup(pin)?)
    }
}
