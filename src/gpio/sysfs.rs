// Copyright (c) 2017-2018 Rene van der Meer
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

use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::linux::fs::MetadataExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::gpio::epoll::{epoll_event, Epoll, EventFd, EPOLLERR, EPOLLET, EPOLLIN, EPOLLPRI};
use crate::gpio::{Backend, Edge, EventSink, Level, Line, Mode, Result, Trigger};

// Epoll id reserved for the stop notification
const STOP_ID: u64 = u64::MAX;

#[derive(Debug, PartialEq, Copy, Clone)]
enum Direction {
    In,
    Out,
    // Output, initialized to the given level in the same write
    Low,
    High,
}

impl Direction {
    fn parse(buffer: &[u8]) -> io::Result<Direction> {
        match buffer.strip_suffix(b"\n").unwrap_or(buffer) {
            b"in" => Ok(Direction::In),
            b"out" => Ok(Direction::Out),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unexpected direction",
            )),
        }
    }

    // Direction to write when switching to output while keeping `level`, or
    // `None` if the line already is an output.
    fn output_transition(self, level: Level) -> Option<Direction> {
        match self {
            Direction::In => Some(match level {
                Level::Low => Direction::Low,
                Level::High => Direction::High,
            }),
            _ => None,
        }
    }
}

// Find group ID for specified group name
fn group_name_to_gid(name: &str) -> Option<u32> {
    let name_cstr = CString::new(name).ok()?;

    unsafe {
        let group_ptr = libc::getgrnam(name_cstr.as_ptr());

        if group_ptr.is_null() {
            None
        } else {
            Some((*group_ptr).gr_gid)
        }
    }
}

fn export(pin: u8) -> io::Result<()> {
    // Only export if the pin isn't already exported
    if !Path::new(&format!("/sys/class/gpio/gpio{}", pin)).exists() {
        File::create("/sys/class/gpio/export")?.write_fmt(format_args!("{}", pin))?;
    }

    // The exported directory starts off owned by root:root, and udev changes its
    // group to gpio shortly after. Wait max. 1s for that to happen, so non-root
    // users can configure the pin.
    let gid_gpio = group_name_to_gid("gpio").unwrap_or(0);

    for _ in 0..20 {
        let meta = fs::metadata(format!("/sys/class/gpio/gpio{}", pin))?;
        if meta.st_gid() == gid_gpio {
            break;
        }

        thread::sleep(Duration::from_millis(50));
    }

    Ok(())
}

fn unexport(pin: u8) -> io::Result<()> {
    // Only unexport if the pin is actually exported
    if Path::new(&format!("/sys/class/gpio/gpio{}", pin)).exists() {
        File::create("/sys/class/gpio/unexport")?.write_fmt(format_args!("{}", pin))?;
    }

    Ok(())
}

fn set_direction(pin: u8, direction: Direction) -> io::Result<()> {
    let b_direction: &[u8] = match direction {
        Direction::In => b"in",
        Direction::Out => b"out",
        Direction::Low => b"low",
        Direction::High => b"high",
    };

    File::create(format!("/sys/class/gpio/gpio{}/direction", pin))?.write_all(b_direction)
}

fn direction(pin: u8) -> io::Result<Direction> {
    let mut buffer = Vec::with_capacity(4);
    File::open(format!("/sys/class/gpio/gpio{}/direction", pin))?.read_to_end(&mut buffer)?;

    Direction::parse(&buffer)
}

fn set_edge(pin: u8, trigger: Trigger) -> io::Result<()> {
    let b_trigger: &[u8] = match trigger {
        Trigger::Disabled => b"none",
        Trigger::RisingEdge => b"rising",
        Trigger::FallingEdge => b"falling",
        Trigger::Both => b"both",
    };

    File::create(format!("/sys/class/gpio/gpio{}/edge", pin))?.write_all(b_trigger)
}

fn open_value(pin: u8) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(format!("/sys/class/gpio/gpio{}/value", pin))
}

// Reading the value also acknowledges a pending edge notification.
fn read_value(value: &mut File) -> io::Result<Level> {
    let mut buffer = [0; 1];
    value.seek(SeekFrom::Start(0))?;
    value.read_exact(&mut buffer)?;

    match &buffer {
        b"0" => Ok(Level::Low),
        _ => Ok(Level::High),
    }
}

// Value files of all input lines with edge detection, shared between the lines
// and the watcher thread.
struct Watcher {
    poll: Epoll,
    stop: EventFd,
    values: Mutex<HashMap<u8, File>>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("poll", &self.poll)
            .field("stop", &self.stop)
            .field("values", &format_args!("{{ .. }}"))
            .finish()
    }
}

impl Watcher {
    fn new() -> io::Result<Watcher> {
        let poll = Epoll::new()?;
        let stop = EventFd::new()?;
        poll.add(stop.fd(), STOP_ID, EPOLLERR | EPOLLET | EPOLLIN)?;

        Ok(Watcher {
            poll,
            stop,
            values: Mutex::new(HashMap::new()),
        })
    }

    fn watch(&self, pin: u8) -> io::Result<()> {
        let mut values = self.values.lock();
        if values.contains_key(&pin) {
            return Ok(());
        }

        // Clear any stale edge before the file is armed
        let mut value = open_value(pin)?;
        read_value(&mut value)?;

        // Triggering an edge sets error and priority
        self.poll
            .add(value.as_raw_fd(), u64::from(pin), EPOLLERR | EPOLLET | EPOLLPRI)?;
        values.insert(pin, value);

        Ok(())
    }

    fn unwatch(&self, pin: u8) -> io::Result<()> {
        if let Some(value) = self.values.lock().remove(&pin) {
            self.poll.delete(value.as_raw_fd())?;
        }

        Ok(())
    }

    fn run(&self, sink: EventSink) -> io::Result<()> {
        let mut events = [epoll_event { events: 0, u64: 0 }; 16];

        loop {
            let num_events = self.poll.wait(&mut events, None)?;

            for event in &events[..num_events] {
                let id = event.u64;
                if id == STOP_ID {
                    return Ok(());
                }

                let Ok(pin) = u8::try_from(id) else {
                    continue;
                };

                // The line may have been unwatched after the event was queued
                let level = match self.values.lock().get_mut(&pin).map(read_value) {
                    Some(Ok(level)) => level,
                    Some(Err(e)) => {
                        warn!("Failed to read pin {} after edge: {}", pin, e);
                        continue;
                    }
                    None => continue,
                };

                if !sink.post_edge(pin, Edge::towards(level)) {
                    return Ok(());
                }
            }
        }
    }
}

/// GPIO lines exposed through the Linux `/sys/class/gpio` interface.
///
/// Lines are exported when they're opened, and unexported when they're released.
/// Only [`Input`] and [`Output`] modes are supported. Input lines report both
/// edges to the event thread, through a single thread that waits on all value
/// files with `epoll`.
///
/// The sysfs interface doesn't offer debounce control, so debounce timeouts are
/// stored but not applied.
///
/// [`Input`]: enum.Mode.html#variant.Input
/// [`Output`]: enum.Mode.html#variant.Output
#[derive(Debug)]
pub struct SysfsBackend {
    pin_count: u8,
    watcher: Arc<Watcher>,
    watch_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SysfsBackend {
    /// Constructs a new `SysfsBackend` for a board with `pin_count` lines.
    pub fn new(pin_count: u8) -> Result<SysfsBackend> {
        Ok(SysfsBackend {
            pin_count,
            watcher: Arc::new(Watcher::new()?),
            watch_thread: Mutex::new(None),
        })
    }
}

impl Backend for SysfsBackend {
    fn pin_count(&self) -> u8 {
        self.pin_count
    }

    fn open_line(&self, pin: u8) -> io::Result<Box<dyn Line>> {
        export(pin)?;

        let mut line = SysfsLine {
            pin,
            watcher: self.watcher.clone(),
            debounce: Duration::ZERO,
        };

        if let Err(e) = line.set_mode(Mode::Input) {
            let _ = line.release();
            return Err(e);
        }

        debug!("Exported pin {}", pin);

        Ok(Box::new(line))
    }

    fn attach(&self, sink: EventSink) {
        let mut watch_thread = self.watch_thread.lock();
        if watch_thread.is_some() {
            warn!("Sysfs backend is already attached");
            return;
        }

        let watcher = self.watcher.clone();
        let spawned = thread::Builder::new()
            .name(String::from("edgegpio-sysfs"))
            .spawn(move || {
                if let Err(e) = watcher.run(sink) {
                    error!("Sysfs edge watcher stopped: {}", e);
                }
            });

        match spawned {
            Ok(handle) => *watch_thread = Some(handle),
            Err(e) => error!("Failed to spawn sysfs edge watcher: {}", e),
        }
    }
}

impl Drop for SysfsBackend {
    fn drop(&mut self) {
        if let Some(watch_thread) = self.watch_thread.lock().take() {
            if let Err(e) = self.watcher.stop.notify() {
                error!("Failed to stop sysfs edge watcher: {}", e);
                return;
            }

            let _ = watch_thread.join();
        }
    }
}

struct SysfsLine {
    pin: u8,
    watcher: Arc<Watcher>,
    debounce: Duration,
}

impl fmt::Debug for SysfsLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysfsLine")
            .field("pin", &self.pin)
            .field("debounce", &self.debounce)
            .finish()
    }
}

impl Line for SysfsLine {
    fn read(&self) -> io::Result<Level> {
        read_value(&mut open_value(self.pin)?)
    }

    fn write(&mut self, level: Level) -> io::Result<()> {
        let b_level: &[u8] = match level {
            Level::Low => b"0",
            Level::High => b"1",
        };

        open_value(self.pin)?.write_all(b_level)
    }

    fn set_mode(&mut self, mode: Mode) -> io::Result<()> {
        match mode {
            Mode::Input => {
                set_direction(self.pin, Direction::In)?;
                set_edge(self.pin, Trigger::Both)?;
                self.watcher.watch(self.pin)
            }
            Mode::Output => {
                self.watcher.unwatch(self.pin)?;

                // Rewriting "out" would drive the line low
                let level = self.read()?;
                match direction(self.pin)?.output_transition(level) {
                    Some(output) => {
                        set_edge(self.pin, Trigger::Disabled)?;
                        set_direction(self.pin, output)
                    }
                    None => Ok(()),
                }
            }
            _ => Err(io::Error::from(io::ErrorKind::Unsupported)),
        }
    }

    fn is_mode_supported(&self, mode: Mode) -> bool {
        matches!(mode, Mode::Input | Mode::Output)
    }

    fn set_debounce_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.debounce = timeout;

        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        let unwatched = self.watcher.unwatch(self.pin);
        unexport(self.pin)?;

        debug!("Unexported pin {}", self.pin);

        unwatched
    }
}
