use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use edgegpio::gpio::{Config, Edge, Error, Gpio, Level, MockBackend, Mode, SharingMode, Trigger};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn setup(pin_count: u8) -> (Gpio, MockBackend) {
    init_logger();

    let backend = MockBackend::new(pin_count);
    let gpio = Gpio::new(backend.clone()).unwrap();

    (gpio, backend)
}

#[test]
fn open_close_lifecycle() {
    let (gpio, backend) = setup(8);

    for pin in 0..gpio.pin_count() {
        gpio.open_pin(pin).unwrap();
        assert!(gpio.is_pin_open(pin));
        assert!(backend.is_line_open(pin));

        gpio.close_pin(pin).unwrap();
        assert!(!gpio.is_pin_open(pin));
        assert!(!backend.is_line_open(pin));
        assert_eq!(backend.release_count(pin), 1);
    }
}

#[test]
fn open_twice_fails() {
    let (gpio, _backend) = setup(8);

    gpio.open_pin(3).unwrap();
    assert!(matches!(gpio.open_pin(3), Err(Error::AlreadyOpen(3))));
    assert!(matches!(gpio.get(3), Err(Error::AlreadyOpen(3))));

    gpio.close_pin(3).unwrap();
    gpio.open_pin(3).unwrap();
}

#[test]
fn operations_on_closed_pins_fail() {
    let (gpio, _backend) = setup(8);

    assert!(matches!(gpio.close_pin(1), Err(Error::NotOpen(1))));
    assert!(matches!(gpio.read(1), Err(Error::NotOpen(1))));
    assert!(matches!(gpio.write(1, Level::High), Err(Error::NotOpen(1))));
    assert!(matches!(gpio.pin_mode(1), Err(Error::NotOpen(1))));
    assert!(matches!(gpio.set_pin_mode(1, Mode::Output), Err(Error::NotOpen(1))));
    assert!(matches!(
        gpio.is_pin_mode_supported(1, Mode::Output),
        Err(Error::NotOpen(1))
    ));
    assert!(matches!(
        gpio.register_callback(1, Trigger::Both, |_| {}),
        Err(Error::NotOpen(1))
    ));
    assert!(matches!(
        gpio.wait_for_event(1, Trigger::Both, Duration::from_millis(1)),
        Err(Error::NotOpen(1))
    ));
}

#[test]
fn unavailable_pins() {
    let (gpio, backend) = setup(8);
    backend.set_unavailable(2);

    assert!(matches!(gpio.open_pin(2), Err(Error::PinUnavailable(2))));
    assert!(matches!(gpio.open_pin(8), Err(Error::PinUnavailable(8))));
    assert!(!gpio.is_pin_open(2));
}

#[test]
fn rejected_mode_rolls_back_open() {
    let (gpio, backend) = setup(8);
    backend.set_unsupported(4, Mode::OutputOpenSource);

    assert!(matches!(
        gpio.open_pin_with_mode(4, Mode::OutputOpenSource),
        Err(Error::UnsupportedMode(4, Mode::OutputOpenSource))
    ));
    assert!(!gpio.is_pin_open(4));
    assert!(!backend.is_line_open(4));

    gpio.open_pin_with_mode(4, Mode::Output).unwrap();
    assert_eq!(gpio.pin_mode(4).unwrap(), Mode::Output);
    assert!(!gpio.is_pin_mode_supported(4, Mode::OutputOpenSource).unwrap());
}

#[test]
fn write_notifications_follow_transitions() {
    let (gpio, _backend) = setup(8);
    gpio.open_pin_with_mode(5, Mode::Output).unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = parking_lot::Mutex::new(tx);
    gpio.register_callback(5, Trigger::Both, move |event| {
        let _ = tx.lock().send(event.edge);
    })
    .unwrap();

    gpio.write(5, Level::High).unwrap();
    gpio.write(5, Level::High).unwrap();
    gpio.write(5, Level::Low).unwrap();
    gpio.close_pin(5).unwrap();

    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![Edge::Rising, Edge::Falling]);
    assert!(matches!(gpio.read(5), Err(Error::NotOpen(5))));
}

#[test]
fn unregister_is_idempotent() {
    let (gpio, _backend) = setup(8);
    gpio.open_pin_with_mode(0, Mode::Output).unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = parking_lot::Mutex::new(tx);
    let id = gpio
        .register_callback(0, Trigger::RisingEdge, move |event| {
            let _ = tx.lock().send(event);
        })
        .unwrap();

    gpio.unregister_callback(0, id).unwrap();
    gpio.unregister_callback(0, id).unwrap();
    gpio.toggle(0).unwrap();

    assert!(rx.try_recv().is_err());
}

#[test]
fn bulk_read_write() {
    let (gpio, backend) = setup(8);
    for pin in 0..3 {
        gpio.open_pin_with_mode(pin, Mode::Output).unwrap();
    }

    gpio.write_many(&[(0, Level::High), (2, Level::High)]).unwrap();
    assert_eq!(
        gpio.read_many(&[0, 1, 2]).unwrap(),
        vec![(0, Level::High), (1, Level::Low), (2, Level::High)]
    );

    // Earlier writes stay applied when a later pin fails
    assert!(matches!(
        gpio.write_many(&[(1, Level::High), (6, Level::High)]),
        Err(Error::NotOpen(6))
    ));
    assert_eq!(backend.level(1), Some(Level::High));
}

#[test]
fn owned_pin_closes_on_drop() {
    let (gpio, backend) = setup(8);

    {
        let pin = gpio.get(6).unwrap();
        assert_eq!(pin.sharing_mode(), SharingMode::Exclusive);
        assert!(gpio.is_pin_open(6));
    }

    assert!(!gpio.is_pin_open(6));
    assert_eq!(backend.release_count(6), 1);
}

#[test]
fn owned_pin_handed_to_registry() {
    let (gpio, backend) = setup(8);

    {
        let mut pin = gpio.get(6).unwrap();
        pin.set_close_on_drop(false);
        pin.set_mode(Mode::Output).unwrap();
    }

    gpio.write(6, Level::High).unwrap();
    assert_eq!(backend.level(6), Some(Level::High));

    gpio.close_pin(6).unwrap();
    assert!(!backend.is_line_open(6));
}

#[test]
fn closed_pin_reports_disposed() {
    let (gpio, backend) = setup(8);
    let mut pin = gpio.get(1).unwrap();

    gpio.close_pin(1).unwrap();
    assert!(pin.is_closed());
    assert!(matches!(pin.read(), Err(Error::Disposed(1))));
    assert!(matches!(pin.set_high(), Err(Error::Disposed(1))));

    // A new pin on the same number is unaffected by the stale handle
    let _reopened = gpio.get(1).unwrap();
    pin.close();
    drop(pin);
    assert!(gpio.is_pin_open(1));
    assert_eq!(backend.release_count(1), 1);
}

#[test]
fn config_applies_default_debounce() {
    init_logger();

    let backend = MockBackend::new(4);
    let config = Config {
        default_debounce: Duration::from_millis(5),
        ..Config::default()
    };
    let gpio = Gpio::with_config(backend.clone(), config).unwrap();

    gpio.open_pin(0).unwrap();
    assert_eq!(gpio.debounce_timeout(0).unwrap(), Duration::from_millis(5));
    assert_eq!(backend.debounce(0), Some(Duration::from_millis(5)));

    gpio.set_debounce_timeout(0, Duration::ZERO).unwrap();
    assert_eq!(backend.debounce(0), Some(Duration::ZERO));
}

#[test]
fn independent_instances() {
    init_logger();

    let first = Gpio::new(MockBackend::new(4)).unwrap();
    let second = Gpio::new(MockBackend::new(4)).unwrap();

    first.open_pin(0).unwrap();
    second.open_pin(0).unwrap();

    // Clones share a registry
    assert!(matches!(first.clone().open_pin(0), Err(Error::AlreadyOpen(0))));
}

#[test]
fn concurrent_opens_claim_each_pin_once() {
    let (gpio, _backend) = setup(4);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gpio = gpio.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                (0..4).filter(|&pin| gpio.open_pin(pin).is_ok()).count()
            })
        })
        .collect();

    let opened: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(opened, 4);
}

#[test]
fn pins_dont_block_each_other() {
    let (gpio, _backend) = setup(4);
    gpio.open_pin_with_mode(0, Mode::Output).unwrap();
    gpio.open_pin_with_mode(1, Mode::Output).unwrap();

    // A slow callback on pin 0 runs on the writing thread, without holding any
    // lock that pin 1 needs
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered_tx = parking_lot::Mutex::new(entered_tx);
    let release_rx = parking_lot::Mutex::new(release_rx);
    gpio.register_callback(0, Trigger::RisingEdge, move |_| {
        let _ = entered_tx.lock().send(());
        let _ = release_rx.lock().recv_timeout(Duration::from_secs(5));
    })
    .unwrap();

    let slow = {
        let gpio = gpio.clone();
        thread::spawn(move || gpio.write(0, Level::High))
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    for _ in 0..100 {
        gpio.toggle(1).unwrap();
    }
    assert_eq!(gpio.read(0).unwrap(), Level::High);

    release_tx.send(()).unwrap();
    slow.join().unwrap().unwrap();
}
