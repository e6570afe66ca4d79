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
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::gpio::pin::PinCore;
use crate::gpio::{Edge, Error, Result};

/// Raw edge record, as delivered by an interrupt source.
///
/// The pin number is stored in the high 16 bits of `data1`. `data2` holds the edge
/// discriminator, where `0` indicates a falling edge, and any other value a rising edge.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct RawEvent {
    pub data1: u32,
    pub data2: u32,
}

impl RawEvent {
    /// Packs a pin number and edge into a raw record.
    pub fn new(pin: u8, edge: Edge) -> RawEvent {
        RawEvent {
            data1: u32::from(pin) << 16,
            data2: match edge {
                Edge::Falling => 0,
                Edge::Rising => 1,
            },
        }
    }

    /// Returns the packed pin number.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.data1 >> 16
    }

    /// Returns the decoded edge.
    #[inline]
    pub fn edge(&self) -> Edge {
        if self.data2 == 0 {
            Edge::Falling
        } else {
            Edge::Rising
        }
    }
}

#[derive(Debug)]
enum Msg {
    Event(RawEvent),
    Stop,
}

/// Sends raw edge records to the event thread.
///
/// Records are delivered in the order they're posted. Records for pins that
/// aren't open, or don't have any callbacks, are silently dropped.
#[derive(Clone, Debug)]
pub struct EventSink {
    sender: Sender<Msg>,
}

impl EventSink {
    /// Posts a raw record. Returns `false` if the event thread has stopped.
    pub fn post(&self, event: RawEvent) -> bool {
        self.sender.send(Msg::Event(event)).is_ok()
    }

    /// Posts an edge for the specified pin. Returns `false` if the event thread
    /// has stopped.
    pub fn post_edge(&self, pin: u8, edge: Edge) -> bool {
        self.post(RawEvent::new(pin, edge))
    }
}

// Pins eligible for event delivery. Lookups happen under the table lock, but
// the pin is always notified after the lock is released, so a callback can close
// its own pin.
pub(crate) struct Dispatcher {
    pins: Mutex<HashMap<u8, Weak<PinCore>>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pins", &format_args!("{{ .. }}"))
            .finish()
    }
}

impl Dispatcher {
    pub(crate) fn new() -> Dispatcher {
        Dispatcher {
            pins: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn add_pin(&self, core: &Arc<PinCore>) {
        if core.is_disposed() {
            return;
        }

        let mut pins = self.pins.lock();

        // Never replace a live pin that's still open on the same number
        if let Some(existing) = pins.get(&core.pin()).and_then(Weak::upgrade) {
            if !Arc::ptr_eq(&existing, core) && !existing.is_disposed() {
                warn!("Pin {} is already registered for events", core.pin());
                return;
            }
        }

        pins.insert(core.pin(), Arc::downgrade(core));
        debug!("Registered pin {} for events", core.pin());
    }

    pub(crate) fn remove_pin(&self, core: &PinCore) {
        let mut pins = self.pins.lock();

        if pins
            .get(&core.pin())
            .map_or(false, |entry| std::ptr::eq(entry.as_ptr(), core))
        {
            pins.remove(&core.pin());
            debug!("Unregistered pin {} for events", core.pin());
        }
    }

    pub(crate) fn dispatch(&self, event: RawEvent) {
        let edge = event.edge();

        let Ok(pin) = u8::try_from(event.pin()) else {
            warn!("Dropped {} edge on invalid pin {}", edge, event.pin());
            return;
        };

        // The table lock is released before the pin is notified.
        let core = self.pins.lock().get(&pin).and_then(Weak::upgrade);

        match core {
            Some(core) => {
                trace!("Dispatching {} edge on pin {}", edge, pin);
                core.on_edge(edge);
            }
            None => trace!("Dropped {} edge on unregistered pin {}", edge, pin),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pins.lock().len()
    }
}

// Delivers raw events from all sources to the dispatcher on a single thread,
// which keeps the per-pin delivery order intact.
pub(crate) struct EventLoop {
    event_thread: Option<thread::JoinHandle<()>>,
    sender: Sender<Msg>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("event_thread", &self.event_thread)
            .field("sender", &format_args!("{{ .. }}"))
            .finish()
    }
}

impl EventLoop {
    pub(crate) fn spawn(name: &str, dispatcher: Arc<Dispatcher>) -> Result<EventLoop> {
        let (sender, receiver): (Sender<Msg>, Receiver<Msg>) = mpsc::channel();

        let event_thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                while let Ok(msg) = receiver.recv() {
                    match msg {
                        Msg::Event(event) => dispatcher.dispatch(event),
                        Msg::Stop => break,
                    }
                }
            })?;

        Ok(EventLoop {
            event_thread: Some(event_thread),
            sender,
        })
    }

    pub(crate) fn sink(&self) -> EventSink {
        EventSink {
            sender: self.sender.clone(),
        }
    }

    pub(crate) fn stop(&mut self) -> Result<()> {
        let Some(event_thread) = self.event_thread.take() else {
            return Ok(());
        };

        // The thread may already be gone if it panicked.
        let _ = self.sender.send(Msg::Stop);

        // A callback that drops the last Gpio runs on the event thread itself,
        // which can't join itself. It exits after processing the stop message.
        if event_thread.thread().id() == thread::current().id() {
            return Ok(());
        }

        event_thread.join().map_err(|_| Error::ThreadPanic)
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
