use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use edgegpio::gpio::{
    ChangeCounter, Edge, Error, Event, Gpio, Level, MockBackend, Mode, RawEvent, Trigger,
    WaitResult,
};
use parking_lot::Mutex;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn setup(pin_count: u8) -> (Gpio, MockBackend) {
    init_logger();

    let backend = MockBackend::new(pin_count);
    let gpio = Gpio::new(backend.clone()).unwrap();

    (gpio, backend)
}

fn channel_callback(gpio: &Gpio, pin: u8, trigger: Trigger) -> mpsc::Receiver<Event> {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    gpio.register_callback(pin, trigger, move |event| {
        let _ = tx.lock().send(event);
    })
    .unwrap();

    rx
}

#[test]
fn hardware_edges_reach_callbacks() {
    let (gpio, backend) = setup(8);
    gpio.open_pin_with_mode(3, Mode::InputPullDown).unwrap();
    let rx = channel_callback(&gpio, 3, Trigger::Both);

    assert!(backend.set_input_level(3, Level::High));
    assert!(backend.set_input_level(3, Level::Low));

    let first = rx.recv_timeout(DELIVERY_TIMEOUT).unwrap();
    let second = rx.recv_timeout(DELIVERY_TIMEOUT).unwrap();
    assert_eq!(first, Event { pin: 3, edge: Edge::Rising });
    assert_eq!(second, Event { pin: 3, edge: Edge::Falling });
}

#[test]
fn trigger_filters_hardware_edges() {
    let (gpio, backend) = setup(8);
    gpio.open_pin(2).unwrap();
    let rx = channel_callback(&gpio, 2, Trigger::FallingEdge);

    backend.set_input_level(2, Level::High);
    backend.set_input_level(2, Level::Low);

    assert_eq!(rx.recv_timeout(DELIVERY_TIMEOUT).unwrap().edge, Edge::Falling);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn raw_events_for_unknown_pins_are_dropped() {
    let (gpio, backend) = setup(8);
    gpio.open_pin(1).unwrap();
    let rx = channel_callback(&gpio, 1, Trigger::Both);

    assert!(backend.inject(RawEvent::new(4, Edge::Rising)));
    assert!(backend.inject(RawEvent {
        data1: 0x1234 << 16,
        data2: 1,
    }));
    assert!(backend.inject(RawEvent {
        data1: 1 << 16,
        data2: 0,
    }));

    // Delivery is in order, so only the last record reaches the callback
    assert_eq!(rx.recv_timeout(DELIVERY_TIMEOUT).unwrap().edge, Edge::Falling);
    assert!(rx.try_recv().is_err());
}

#[test]
fn event_sink_feeds_dispatcher() {
    let (gpio, _backend) = setup(8);
    gpio.open_pin(0).unwrap();
    let rx = channel_callback(&gpio, 0, Trigger::RisingEdge);

    assert!(gpio.event_sink().post_edge(0, Edge::Rising));
    assert_eq!(rx.recv_timeout(DELIVERY_TIMEOUT).unwrap().edge, Edge::Rising);
}

#[test]
fn callback_can_close_its_own_pin() {
    let (gpio, backend) = setup(8);
    gpio.open_pin(6).unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let handle = gpio.clone();
    gpio.register_callback(6, Trigger::Both, move |event| {
        let _ = tx.lock().send(handle.close_pin(event.pin).is_ok());
    })
    .unwrap();

    backend.set_input_level(6, Level::High);
    assert!(rx.recv_timeout(DELIVERY_TIMEOUT).unwrap());
    assert!(!gpio.is_pin_open(6));
    assert!(!backend.is_line_open(6));

    // The closed pin is no longer registered for events
    gpio.open_pin(6).unwrap();
    assert!(backend.set_input_level(6, Level::Low));
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn callback_holding_last_gpio_clone() {
    init_logger();

    let backend = MockBackend::new(4);
    let gpio = Gpio::new(backend.clone()).unwrap();
    gpio.open_pin(0).unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let handle = Mutex::new(Some(gpio.clone()));
    gpio.register_callback(0, Trigger::Both, move |_| {
        // Dropping the last clone on the event thread tears the instance down
        let _ = handle.lock().take();
        let _ = tx.lock().send(());
    })
    .unwrap();
    drop(gpio);

    backend.set_input_level(0, Level::High);
    rx.recv_timeout(DELIVERY_TIMEOUT).unwrap();

    let start = Instant::now();
    while backend.is_line_open(0) && start.elapsed() < DELIVERY_TIMEOUT {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(!backend.is_line_open(0));
}

#[test]
fn panicking_callback_is_isolated() {
    let (gpio, backend) = setup(4);
    gpio.open_pin(1).unwrap();

    gpio.register_callback(1, Trigger::Both, |_| panic!("callback failure"))
        .unwrap();
    let rx = channel_callback(&gpio, 1, Trigger::Both);

    backend.set_input_level(1, Level::High);
    backend.set_input_level(1, Level::Low);

    assert_eq!(rx.recv_timeout(DELIVERY_TIMEOUT).unwrap().edge, Edge::Rising);
    assert_eq!(rx.recv_timeout(DELIVERY_TIMEOUT).unwrap().edge, Edge::Falling);
}

#[test]
fn wait_times_out_without_stimulus() {
    let (gpio, _backend) = setup(8);
    gpio.open_pin_with_mode(7, Mode::InputPullUp).unwrap();

    let timeout = Duration::from_millis(200);
    let start = Instant::now();
    let result = gpio.wait_for_event(7, Trigger::FallingEdge, timeout).unwrap();

    assert_eq!(
        result,
        WaitResult {
            edge: None,
            timed_out: true
        }
    );
    assert!(start.elapsed() >= timeout);
}

#[test]
fn wait_observes_hardware_edge() {
    let (gpio, backend) = setup(8);
    gpio.open_pin(4).unwrap();

    let stimulus = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        backend.set_input_level(4, Level::High);
    });

    let result = gpio
        .wait_for_event(4, Trigger::Both, DELIVERY_TIMEOUT)
        .unwrap();
    stimulus.join().unwrap();

    assert_eq!(result.edge, Some(Edge::Rising));
    assert!(!result.timed_out);
}

#[test]
fn wait_ignores_other_edges() {
    let (gpio, _backend) = setup(8);
    gpio.open_pin_with_mode(2, Mode::Output).unwrap();
    let mut pin = gpio.get(3).unwrap();
    pin.set_mode(Mode::Output).unwrap();

    let writer = {
        let gpio = gpio.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            gpio.write(2, Level::High).unwrap();
            gpio.write(2, Level::Low).unwrap();
        })
    };

    let result = gpio
        .wait_for_event(2, Trigger::FallingEdge, DELIVERY_TIMEOUT)
        .unwrap();
    writer.join().unwrap();
    assert_eq!(result.edge, Some(Edge::Falling));

    // Nothing happens on pin 3
    let result = pin
        .wait_for_event(Trigger::Both, Duration::from_millis(20))
        .unwrap();
    assert!(result.timed_out);
}

#[test]
fn concurrent_waits_on_same_pin() {
    let (gpio, backend) = setup(4);
    gpio.open_pin(0).unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let gpio = gpio.clone();
            thread::spawn(move || gpio.wait_for_event(0, Trigger::Both, DELIVERY_TIMEOUT))
        })
        .collect();

    // Give every waiter time to subscribe
    thread::sleep(Duration::from_millis(100));
    backend.set_input_level(0, Level::High);

    for waiter in waiters {
        let result = waiter.join().unwrap().unwrap();
        assert_eq!(result.edge, Some(Edge::Rising));
    }
}

#[test]
fn wait_on_closed_pin_fails() {
    let (gpio, _backend) = setup(4);
    let mut pin = gpio.get(0).unwrap();
    pin.close();

    assert!(matches!(
        pin.wait_for_event(Trigger::Both, Duration::from_millis(1)),
        Err(Error::Disposed(0))
    ));
}

#[test]
fn change_counter_counts_polarity() {
    let (gpio, backend) = setup(4);
    let pin = gpio.get(1).unwrap();

    let mut counter = ChangeCounter::new(&pin).unwrap();
    counter.set_polarity(Trigger::RisingEdge).unwrap();
    counter.start().unwrap();

    // A marker callback registered after the counter sees the last edge after it
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    {
        let calls = calls.clone();
        gpio.register_callback(1, Trigger::Both, move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 5 {
                let _ = tx.lock().send(());
            }
        })
        .unwrap();
    }

    for _ in 0..3 {
        backend.set_input_level(1, Level::High);
        backend.set_input_level(1, Level::Low);
    }
    rx.recv_timeout(DELIVERY_TIMEOUT).unwrap();

    assert_eq!(counter.read().unwrap().count, 3);
    assert_eq!(counter.reset().unwrap().count, 3);
    assert_eq!(counter.read().unwrap().count, 0);

    counter.stop().unwrap();
    assert!(!counter.is_started());
}

#[test]
fn change_counter_on_closed_pin() {
    let (gpio, _backend) = setup(4);
    gpio.open_pin(2).unwrap();
    let mut counter = gpio.change_counter(2).unwrap();

    gpio.close_pin(2).unwrap();
    assert!(matches!(counter.start(), Err(Error::Disposed(2))));
    assert!(matches!(counter.read(), Err(Error::Disposed(2))));
    assert!(matches!(gpio.change_counter(2), Err(Error::NotOpen(2))));
}

#[test]
fn closing_pin_ends_wait() {
    let (gpio, _backend) = setup(4);
    gpio.open_pin(0).unwrap();

    let closer = {
        let gpio = gpio.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            gpio.close_pin(0)
        })
    };

    let start = Instant::now();
    let result = gpio.wait_for_event(0, Trigger::Both, Duration::from_secs(30));
    closer.join().unwrap().unwrap();

    assert!(matches!(result, Err(Error::Disposed(0))));
    assert!(start.elapsed() < DELIVERY_TIMEOUT);
}

#[test]
fn concurrent_writers_keep_edge_order() {
    let (gpio, backend) = setup(4);
    gpio.open_pin_with_mode(1, Mode::Output).unwrap();

    let (entered_tx, entered_rx) = mpsc::channel();
    let entered_tx = Mutex::new(entered_tx);
    let edges = Arc::new(Mutex::new(Vec::new()));
    {
        let edges = edges.clone();
        gpio.register_callback(1, Trigger::Both, move |event| {
            if event.edge == Edge::Rising {
                let _ = entered_tx.lock().send(());
                thread::sleep(Duration::from_millis(50));
            }
            edges.lock().push(event.edge);
        })
        .unwrap();
    }

    let high = {
        let gpio = gpio.clone();
        thread::spawn(move || gpio.write(1, Level::High))
    };
    entered_rx.recv_timeout(DELIVERY_TIMEOUT).unwrap();

    let low = {
        let gpio = gpio.clone();
        thread::spawn(move || gpio.write(1, Level::Low))
    };

    high.join().unwrap().unwrap();
    low.join().unwrap().unwrap();

    assert_eq!(*edges.lock(), vec![Edge::Rising, Edge::Falling]);
    assert_eq!(backend.level(1), Some(Level::Low));
}
