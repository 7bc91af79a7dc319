//! Host-side stand-ins for the UART, pins, delay and host stack.

use std::cell::Cell;
use std::collections::VecDeque;
use std::vec::Vec;

use crate::packet::PacketKind;
use crate::reassembler::HciHost;
use crate::transport::{ConfigError, FlowControl, HciUart, HciWrite, HostWake, SleepLock, UartConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockUartError {
    Overrun,
}

impl embedded_hal_nb::serial::Error for MockUartError {
    fn kind(&self) -> embedded_hal_nb::serial::ErrorKind {
        embedded_hal_nb::serial::ErrorKind::Overrun
    }
}

#[derive(Default)]
pub struct MockUart {
    pub rx: VecDeque<Result<u8, MockUartError>>,
    pub tx: Vec<u8>,
    pub configs: Vec<UartConfig>,
    pub no_flow_control: bool,
    pub rx_irq_enabled: bool,
    /// Number of `WouldBlock`s returned before each transmitted byte.
    pub tx_busy: usize,
    pub busy_left: usize,
    /// Fail every transmitted byte with an overrun.
    pub tx_fail: bool,
}

impl MockUart {
    pub fn push_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().map(|&b| Ok(b)));
    }
}

impl embedded_hal_nb::serial::ErrorType for MockUart {
    type Error = MockUartError;
}

impl embedded_hal_nb::serial::Read for MockUart {
    fn read(&mut self) -> nb::Result<u8, MockUartError> {
        match self.rx.pop_front() {
            Some(Ok(b)) => Ok(b),
            Some(Err(e)) => Err(nb::Error::Other(e)),
            None => Err(nb::Error::WouldBlock),
        }
    }
}

impl embedded_hal_nb::serial::Write for MockUart {
    fn write(&mut self, word: u8) -> nb::Result<(), MockUartError> {
        if self.tx_fail {
            return Err(nb::Error::Other(MockUartError::Overrun));
        }
        if self.busy_left > 0 {
            self.busy_left -= 1;
            return Err(nb::Error::WouldBlock);
        }
        self.busy_left = self.tx_busy;
        self.tx.push(word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), MockUartError> {
        Ok(())
    }
}

impl HciUart for MockUart {
    fn configure(&mut self, config: &UartConfig) -> Result<(), ConfigError> {
        if self.no_flow_control && config.flow_control == FlowControl::RtsCts {
            return Err(ConfigError::FlowControlNotSupported);
        }
        self.configs.push(*config);
        Ok(())
    }

    fn enable_rx_interrupt(&mut self) {
        self.rx_irq_enabled = true;
    }
}

/// Output pin recording every level it is driven to (`true` = high).
#[derive(Default)]
pub struct MockPin {
    pub levels: Vec<bool>,
}

impl embedded_hal_1::digital::ErrorType for MockPin {
    type Error = core::convert::Infallible;
}

impl embedded_hal_1::digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.push(true);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockDelay {
    pub total_ns: u64,
}

impl embedded_hal_1::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
    }
}

#[derive(Default)]
pub struct MockHostWake {
    pub armed: bool,
}

impl HostWake for MockHostWake {
    fn enable_falling_edge_interrupt(&mut self) {
        self.armed = true;
    }

    fn disable_interrupt(&mut self) {
        self.armed = false;
    }
}

/// Counts locks; remembers the deepest nesting seen.
#[derive(Default)]
pub struct MockSleepLock {
    pub held: Cell<u32>,
    pub max_held: Cell<u32>,
}

impl SleepLock for MockSleepLock {
    fn lock(&self) {
        self.held.set(self.held.get() + 1);
        self.max_held.set(self.max_held.get().max(self.held.get()));
    }

    fn unlock(&self) {
        self.held.set(self.held.get() - 1);
    }
}

/// Host stack that keeps every delivered packet.
#[derive(Default)]
pub struct RecordingHost {
    pub packets: Vec<(PacketKind, Vec<u8>)>,
}

impl<B: AsRef<[u8]>> HciHost<B> for RecordingHost {
    fn deliver(&mut self, kind: PacketKind, buffer: B) {
        self.packets.push((kind, buffer.as_ref().to_vec()));
    }
}

/// Transport that records writes instead of sending them.
#[derive(Default)]
pub struct RecordingWriter {
    pub writes: Vec<(PacketKind, Vec<u8>)>,
    pub fail: bool,
}

impl HciWrite for RecordingWriter {
    type Error = ();

    fn write(&mut self, kind: PacketKind, data: &[u8]) -> Result<usize, ()> {
        if self.fail {
            return Err(());
        }
        self.writes.push((kind, data.to_vec()));
        Ok(data.len())
    }
}
