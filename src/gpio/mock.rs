use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::trace;
use parking_lot::Mutex;

use crate::gpio::{Backend, Edge, EventSink, Level, Line, Mode, RawEvent};

#[derive(Debug, Default, Clone)]
struct MockPinState {
    open: bool,
    unavailable: bool,
    unsupported: HashSet<Mode>,
    mode: Mode,
    level: Level,
    debounce: Duration,
    mode_writes: usize,
    release_count: usize,
}

#[derive(Debug)]
struct MockState {
    pins: Vec<MockPinState>,
    sink: Option<EventSink>,
}

/// Simulated GPIO lines, kept in memory.
///
/// `MockBackend` is cheap to clone. Clones share the same simulated lines, so a
/// clone kept by a test can inspect the lines after the original has been moved
/// into a [`Gpio`], and drive simulated input edges through [`set_input_level`].
///
/// [`Gpio`]: struct.Gpio.html
/// [`set_input_level`]: #method.set_input_level
#[derive(Clone)]
pub struct MockBackend {
    pin_count: u8,
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBackend")
            .field("pin_count", &self.pin_count)
            .field("state", &format_args!("{{ .. }}"))
            .finish()
    }
}

impl MockBackend {
    /// Constructs a new `MockBackend` with `pin_count` lines, all available and
    /// supporting every mode.
    pub fn new(pin_count: u8) -> MockBackend {
        MockBackend {
            pin_count,
            state: Arc::new(Mutex::new(MockState {
                pins: vec![MockPinState::default(); usize::from(pin_count)],
                sink: None,
            })),
        }
    }

    fn with_pin<T>(&self, pin: u8, f: impl FnOnce(&mut MockPinState) -> T) -> Option<T> {
        self.state.lock().pins.get_mut(usize::from(pin)).map(f)
    }

    /// Makes the line refuse initialization, so opening it fails.
    pub fn set_unavailable(&self, pin: u8) {
        self.with_pin(pin, |state| state.unavailable = true);
    }

    /// Marks `mode` as unsupported for the line.
    pub fn set_unsupported(&self, pin: u8, mode: Mode) {
        self.with_pin(pin, |state| {
            state.unsupported.insert(mode);
        });
    }

    /// Returns the line's current level.
    pub fn level(&self, pin: u8) -> Option<Level> {
        self.with_pin(pin, |state| state.level)
    }

    /// Returns the line's current mode.
    pub fn mode(&self, pin: u8) -> Option<Mode> {
        self.with_pin(pin, |state| state.mode)
    }

    /// Returns the line's stored debounce timeout.
    pub fn debounce(&self, pin: u8) -> Option<Duration> {
        self.with_pin(pin, |state| state.debounce)
    }

    /// Returns the number of times a mode was applied to the line.
    pub fn mode_writes(&self, pin: u8) -> usize {
        self.with_pin(pin, |state| state.mode_writes).unwrap_or(0)
    }

    /// Returns the number of times the line was released.
    pub fn release_count(&self, pin: u8) -> usize {
        self.with_pin(pin, |state| state.release_count).unwrap_or(0)
    }

    /// Returns `true` if the line is currently initialized.
    pub fn is_line_open(&self, pin: u8) -> bool {
        self.with_pin(pin, |state| state.open).unwrap_or(false)
    }

    /// Drives a simulated signal onto an open input line.
    ///
    /// If the level changes, the resulting edge is posted to the attached event
    /// thread. Returns `true` if an edge was posted.
    pub fn set_input_level(&self, pin: u8, level: Level) -> bool {
        let mut state = self.state.lock();

        let changed = match state.pins.get_mut(usize::from(pin)) {
            Some(line) if line.open && line.mode.is_input() && line.level != level => {
                line.level = level;
                true
            }
            _ => false,
        };

        match (&state.sink, changed) {
            (Some(sink), true) => {
                trace!("Simulated {} edge on pin {}", Edge::towards(level), pin);
                sink.post_edge(pin, Edge::towards(level))
            }
            _ => false,
        }
    }

    /// Posts a raw record to the attached event thread, regardless of line state.
    pub fn inject(&self, event: RawEvent) -> bool {
        self.state
            .lock()
            .sink
            .as_ref()
            .map_or(false, |sink| sink.post(event))
    }
}

impl Backend for MockBackend {
    fn pin_count(&self) -> u8 {
        self.pin_count
    }

    fn open_line(&self, pin: u8) -> io::Result<Box<dyn Line>> {
        let mut state = self.state.lock();

        let line = state
            .pins
            .get_mut(usize::from(pin))
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;

        if line.unavailable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("line {} is reserved", pin),
            ));
        }

        if line.open {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("line {} is busy", pin),
            ));
        }

        line.open = true;
        line.mode = Mode::Input;

        Ok(Box::new(MockLine {
            pin,
            state: self.state.clone(),
        }))
    }

    fn attach(&self, sink: EventSink) {
        self.state.lock().sink = Some(sink);
    }
}

struct MockLine {
    pin: u8,
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockLine").field("pin", &self.pin).finish()
    }
}

impl MockLine {
    fn with_state<T>(&self, f: impl FnOnce(&mut MockPinState) -> T) -> io::Result<T> {
        self.state
            .lock()
            .pins
            .get_mut(usize::from(self.pin))
            .map(f)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

impl Line for MockLine {
    fn read(&self) -> io::Result<Level> {
        self.with_state(|state| state.level)
    }

    fn write(&mut self, level: Level) -> io::Result<()> {
        self.with_state(|state| state.level = level)
    }

    fn set_mode(&mut self, mode: Mode) -> io::Result<()> {
        self.with_state(|state| {
            state.mode = mode;
            state.mode_writes += 1;
        })
    }

    fn is_mode_supported(&self, mode: Mode) -> bool {
        self.with_state(|state| !state.unsupported.contains(&mode))
            .unwrap_or(false)
    }

    fn set_debounce_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.with_state(|state| state.debounce = timeout)
    }

    fn release(&mut self) -> io::Result<()> {
        self.with_state(|state| {
            state.open = false;
            state.release_count += 1;
        })
    }
}
