use std::vec::Vec;

use super::*;
use crate::test_util::{MockDelay, MockHostWake, MockPin, MockSleepLock, MockUart, MockUartError};

struct Bytes(Vec<u8>);

impl TransportEvents for Bytes {
    fn on_data_received(&mut self, byte: u8) {
        self.0.push(byte);
    }
}

/// Sleep lock state seen at the moment each byte arrives.
struct LockWatcher<'a> {
    lock: &'a MockSleepLock,
    held: Vec<u32>,
}

impl TransportEvents for LockWatcher<'_> {
    fn on_data_received(&mut self, _byte: u8) {
        self.held.push(self.lock.held.get());
    }
}

fn open_transport(uart: MockUart) -> UartTransport<MockUart, MockPin> {
    let mut t = UartTransport::new(uart, MockPin::default(), Config::default());
    t.initialize(&mut MockDelay::default()).unwrap();
    t
}

#[test]
fn initialize_configures_8n1_and_releases_wake_after_settle() {
    let mut t = UartTransport::new(MockUart::default(), MockPin::default(), Config::default());
    let mut delay = MockDelay::default();
    t.initialize(&mut delay).unwrap();
    assert!(t.is_open());
    assert_eq!(delay.total_ns, 500_000_000);

    let (uart, pin, _, _) = t.release();
    assert!(uart.rx_irq_enabled);
    assert_eq!(uart.configs.len(), 1);
    let cfg = uart.configs[0];
    assert_eq!(cfg.baudrate, 115_200);
    assert_eq!(cfg.data_bits, DataBits::DataBits8);
    assert_eq!(cfg.parity, Parity::ParityNone);
    assert_eq!(cfg.stop_bits, StopBits::STOP1);
    assert_eq!(cfg.flow_control, FlowControl::RtsCts);
    // Active low: released means high.
    assert_eq!(pin.levels, [true]);
}

#[test]
fn initialize_falls_back_without_flow_control() {
    let uart = MockUart {
        no_flow_control: true,
        ..MockUart::default()
    };
    let (uart, _, _, _) = open_transport(uart).release();
    assert_eq!(uart.configs.len(), 1);
    assert_eq!(uart.configs[0].flow_control, FlowControl::None);
}

#[test]
fn initialize_arms_host_wake_only_with_deep_sleep() {
    let config = Config {
        deep_sleep: true,
        ..Config::default()
    };
    let mut t = UartTransport::with_deep_sleep(
        MockUart::default(),
        MockPin::default(),
        MockHostWake::default(),
        MockSleepLock::default(),
        config,
    );
    t.initialize(&mut MockDelay::default()).unwrap();
    t.terminate();
    assert!(!t.is_open());
    let (_, _, host_wake, _) = t.release();
    assert!(!host_wake.armed);

    let mut t = UartTransport::with_deep_sleep(
        MockUart::default(),
        MockPin::default(),
        MockHostWake::default(),
        MockSleepLock::default(),
        config,
    );
    t.initialize(&mut MockDelay::default()).unwrap();
    let (_, _, host_wake, _) = t.release();
    assert!(host_wake.armed);

    let mut t = UartTransport::with_deep_sleep(
        MockUart::default(),
        MockPin::default(),
        MockHostWake::default(),
        MockSleepLock::default(),
        Config::default(),
    );
    t.initialize(&mut MockDelay::default()).unwrap();
    let (_, _, host_wake, _) = t.release();
    assert!(!host_wake.armed);
}

#[test]
fn write_frames_indicator_and_toggles_wake() {
    let uart = MockUart {
        tx_busy: 2,
        ..MockUart::default()
    };
    let mut t = open_transport(uart);
    let n = t.write(PacketKind::Cmd, &[0x03, 0x0C, 0x00]).unwrap();
    assert_eq!(n, 3);

    let (uart, pin, _, _) = t.release();
    assert_eq!(uart.tx, [0x01, 0x03, 0x0C, 0x00]);
    // released by initialize, asserted (low) for the write, released again
    assert_eq!(pin.levels, [true, false, true]);
}

#[test]
fn transmit_error_is_reported_and_wake_released() {
    let uart = MockUart {
        tx_fail: true,
        ..MockUart::default()
    };
    let mut t = open_transport(uart);
    assert_eq!(
        t.write(PacketKind::Cmd, &[0x03, 0x0C, 0x00]),
        Err(Error::Uart(embedded_hal_nb::serial::ErrorKind::Overrun))
    );

    let (uart, pin, _, _) = t.release();
    assert!(uart.tx.is_empty());
    assert_eq!(pin.levels, [true, false, true]);
}

#[test]
fn write_active_high_wake() {
    let config = Config {
        device_wake_polarity: Polarity::ActiveHigh,
        ..Config::default()
    };
    let mut t = UartTransport::new(MockUart::default(), MockPin::default(), config);
    t.initialize(&mut MockDelay::default()).unwrap();
    t.write(PacketKind::AclData, &[0x01, 0x00, 0x00, 0x00]).unwrap();
    let (_, pin, _, _) = t.release();
    assert_eq!(pin.levels, [false, true, false]);
}

#[test]
fn write_before_initialize_is_rejected() {
    let mut t = UartTransport::new(MockUart::default(), MockPin::default(), Config::default());
    assert_eq!(t.write(PacketKind::Cmd, &[0x03, 0x0C, 0x00]), Err(Error::NotOpen));
    let (uart, pin, _, _) = t.release();
    assert!(uart.tx.is_empty());
    assert!(pin.levels.is_empty());
}

#[test]
fn receive_interrupt_drains_all_available_bytes() {
    let mut uart = MockUart::default();
    uart.push_rx(&[0x04, 0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00]);
    let mut t = open_transport(uart);

    let mut sink = Bytes(Vec::new());
    assert_eq!(t.on_receive_interrupt(&mut sink), 7);
    assert_eq!(sink.0, [0x04, 0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00]);
    assert_eq!(t.on_receive_interrupt(&mut sink), 0);

    let (_, pin, _, _) = t.release();
    assert_eq!(pin.levels, [true, false, true, false, true]);
}

#[test]
fn receive_error_stops_drain() {
    let mut uart = MockUart::default();
    uart.push_rx(&[0x04, 0x0E]);
    uart.rx.push_back(Err(MockUartError::Overrun));
    uart.push_rx(&[0x01]);
    let mut t = open_transport(uart);

    let mut sink = Bytes(Vec::new());
    assert_eq!(t.on_receive_interrupt(&mut sink), 2);
    assert_eq!(t.on_receive_interrupt(&mut sink), 1);
    assert_eq!(sink.0, [0x04, 0x0E, 0x01]);
}

#[test]
fn host_wake_holds_sleep_lock_while_draining() {
    let mut uart = MockUart::default();
    uart.push_rx(&[0x04, 0x0E, 0x00]);
    let config = Config {
        deep_sleep: true,
        ..Config::default()
    };
    let lock = MockSleepLock::default();
    let mut t = UartTransport::with_deep_sleep(
        uart,
        MockPin::default(),
        MockHostWake::default(),
        &lock,
        config,
    );
    t.initialize(&mut MockDelay::default()).unwrap();

    let mut watcher = LockWatcher {
        lock: &lock,
        held: Vec::new(),
    };
    assert_eq!(t.host_wake_interrupt(&mut watcher), 3);
    assert_eq!(watcher.held, [1, 1, 1]);
    assert_eq!(lock.held.get(), 0);
    assert_eq!(lock.max_held.get(), 1);
}
