use std::fmt;
use std::io;
use std::time::Duration;

use crate::gpio::{EventSink, Level, Mode};

/// Provides the physical GPIO lines for a [`Gpio`] instance.
///
/// A backend is selected when the [`Gpio`] is constructed. It's responsible for
/// initializing lines, and for reporting edges on those lines through the
/// [`EventSink`] passed to [`attach`].
///
/// [`Gpio`]: struct.Gpio.html
/// [`EventSink`]: struct.EventSink.html
/// [`attach`]: #method.attach
pub trait Backend: fmt::Debug + Send + Sync {
    /// Returns the number of pins. Pin numbers range from `0` to `pin_count() - 1`.
    fn pin_count(&self) -> u8;

    /// Initializes the line for the specified pin.
    ///
    /// Returning an error causes the open call to fail with [`Error::PinUnavailable`].
    /// This is never called for a pin that's still open.
    ///
    /// [`Error::PinUnavailable`]: enum.Error.html#variant.PinUnavailable
    fn open_line(&self, pin: u8) -> io::Result<Box<dyn Line>>;

    /// Connects the backend's edge detection to the event thread.
    ///
    /// Called once, while the [`Gpio`] is being constructed.
    ///
    /// [`Gpio`]: struct.Gpio.html
    fn attach(&self, _sink: EventSink) {}
}

/// A single initialized GPIO line.
///
/// All calls for a line are serialized by the pin that owns it.
pub trait Line: fmt::Debug + Send {
    /// Reads the line's logic level. For outputs, this is the last latched level.
    fn read(&self) -> io::Result<Level>;

    /// Drives `level` onto the line.
    fn write(&mut self, level: Level) -> io::Result<()>;

    /// Applies the drive mode. Only called with modes that passed [`is_mode_supported`].
    ///
    /// This is also called with the current mode whenever the pin's callbacks change,
    /// so edge detection can be reconfigured.
    ///
    /// [`is_mode_supported`]: #tymethod.is_mode_supported
    fn set_mode(&mut self, mode: Mode) -> io::Result<()>;

    /// Returns `true` if the line supports the drive mode.
    fn is_mode_supported(&self, mode: Mode) -> bool;

    /// Configures the interval during which repeated transitions are filtered out.
    fn set_debounce_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Releases the line. Called exactly once, when the pin is closed.
    fn release(&mut self) -> io::Result<()>;
}
