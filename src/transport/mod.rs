//! Serial (H4) transport driver.
//!
//! Owns the UART link to the Bluetooth controller and the wake handshake around it:
//!
//! - outbound, [`UartTransport::write`] asserts device-wake, clocks out the indicator byte and
//!   the packet bytes one at a time, then deasserts device-wake;
//! - inbound, [`UartTransport::on_receive_interrupt`] drains every byte the UART currently holds
//!   into a [`TransportEvents`] sink, typically the [`Reassembler`] or an [`RxPipe`].
//!
//! With deep sleep configured, the controller pulls host-wake low before it starts talking;
//! [`UartTransport::host_wake_interrupt`] keeps the system out of deep sleep while it drains.
//!
//! ```no_run
//! # fn example<U, W, D>(uart: U, wake: W, mut delay: D)
//! # where U: hci_uart::transport::HciUart, W: embedded_hal_1::digital::OutputPin, D: embedded_hal_1::delay::DelayNs {
//! use hci_uart::transport::{Config, HciWrite, UartTransport};
//! use hci_uart::PacketKind;
//!
//! let mut transport = UartTransport::new(uart, wake, Config::default());
//! transport.initialize(&mut delay).unwrap();
//! // HCI_Reset
//! transport.write(PacketKind::Cmd, &[0x03, 0x0C, 0x00]).unwrap();
//! # }
//! ```
//!
//! [`Reassembler`]: crate::reassembler::Reassembler

pub mod pipe;

pub use pipe::RxPipe;

use embedded_hal_1::delay::DelayNs;
use embedded_hal_1::digital::{Error as _, OutputPin};
use embedded_hal_nb::serial::{Error as _, Read, Write};

use crate::packet::{indicator, PacketKind};

//=============================================================================
// Configuration
//=============================================================================

/// Number of data bits
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    /// 7 Data Bits
    DataBits7,
    /// 8 Data Bits
    DataBits8,
}

/// Parity
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    /// No parity
    ParityNone,
    /// Even Parity
    ParityEven,
    /// Odd Parity
    ParityOdd,
}

/// Number of stop bits
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    #[doc = "1 stop bit"]
    STOP1,
    #[doc = "2 stop bits"]
    STOP2,
}

/// Hardware flow control
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowControl {
    None,
    RtsCts,
}

/// Line parameters handed to [`HciUart::configure`].
#[non_exhaustive]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Baud rate
    pub baudrate: u32,
    /// Number of data bits
    pub data_bits: DataBits,
    /// Parity type
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baudrate: 115_200,
            data_bits: DataBits::DataBits8,
            parity: Parity::ParityNone,
            stop_bits: StopBits::STOP1,
            flow_control: FlowControl::RtsCts,
        }
    }
}

/// Active level of the device-wake output.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    ActiveLow,
    ActiveHigh,
}

/// Transport configuration.
#[non_exhaustive]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Baud rate
    pub baudrate: u32,
    /// Request RTS/CTS flow control. Falls back to none if the UART cannot do it.
    pub flow_control: bool,
    /// Arm the host-wake interrupt and hold the sleep lock while draining.
    pub deep_sleep: bool,
    /// Time the controller gets to boot before device-wake is released in
    /// [`UartTransport::initialize`].
    pub boot_settle_ms: u32,
    pub device_wake_polarity: Polarity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baudrate: 115_200,
            flow_control: true,
            deep_sleep: false,
            boot_settle_ms: 500,
            device_wake_polarity: Polarity::ActiveLow,
        }
    }
}

impl Config {
    fn uart_config(&self) -> UartConfig {
        UartConfig {
            baudrate: self.baudrate,
            flow_control: if self.flow_control {
                FlowControl::RtsCts
            } else {
                FlowControl::None
            },
            ..UartConfig::default()
        }
    }
}

/// Config Error
#[non_exhaustive]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Baudrate too low
    BaudrateTooLow,
    /// Baudrate too high
    BaudrateTooHigh,
    /// Data bits and parity combination not supported
    DataParityNotSupported,
    /// No RTS/CTS lines on this UART
    FlowControlNotSupported,
}

//=============================================================================
// Collaborators
//=============================================================================

/// UART peripheral the transport drives.
///
/// Byte transfer goes through the `embedded-hal-nb` serial traits: `write` returns
/// `WouldBlock` until the transmitter is ready, `read` returns `WouldBlock` once the receive
/// FIFO is empty.
pub trait HciUart: Read<u8> + Write<u8> {
    /// Apply line parameters.
    fn configure(&mut self, config: &UartConfig) -> Result<(), ConfigError>;

    /// Unmask the byte-received interrupt. The platform routes it to
    /// [`UartTransport::on_receive_interrupt`].
    fn enable_rx_interrupt(&mut self);
}

/// Host-wake input line.
pub trait HostWake {
    /// Arm the falling-edge interrupt. The platform routes it to
    /// [`UartTransport::host_wake_interrupt`].
    fn enable_falling_edge_interrupt(&mut self);

    fn disable_interrupt(&mut self);
}

/// Deep-sleep lock. While at least one lock is held the system must not enter deep sleep.
pub trait SleepLock {
    fn lock(&self);
    fn unlock(&self);
}

/// No host-wake line.
impl HostWake for () {
    fn enable_falling_edge_interrupt(&mut self) {}
    fn disable_interrupt(&mut self) {}
}

/// No deep sleep.
impl SleepLock for () {
    fn lock(&self) {}
    fn unlock(&self) {}
}

impl<T: SleepLock + ?Sized> SleepLock for &T {
    fn lock(&self) {
        (**self).lock()
    }

    fn unlock(&self) {
        (**self).unlock()
    }
}

/// Holds a [`SleepLock`] for its lifetime.
pub struct SleepGuard<'a, S: SleepLock> {
    lock: &'a S,
}

impl<'a, S: SleepLock> SleepGuard<'a, S> {
    #[inline]
    pub fn new(lock: &'a S) -> Self {
        lock.lock();
        Self { lock }
    }
}

impl<S: SleepLock> Drop for SleepGuard<'_, S> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Receiver of transport-level events, called from interrupt context.
pub trait TransportEvents {
    /// One byte arrived, in wire order.
    fn on_data_received(&mut self, byte: u8);

    /// The link was reset; any partially received packet is void.
    fn on_bus_reset(&mut self) {}
}

impl<T: TransportEvents + ?Sized> TransportEvents for &mut T {
    fn on_data_received(&mut self, byte: u8) {
        (**self).on_data_received(byte)
    }

    fn on_bus_reset(&mut self) {
        (**self).on_bus_reset()
    }
}

/// Outbound half of an H4 transport.
pub trait HciWrite {
    type Error;

    /// Send `data` as one packet of type `kind`, indicator first. Returns `data.len()`.
    fn write(&mut self, kind: PacketKind, data: &[u8]) -> Result<usize, Self::Error>;
}

impl<T: HciWrite + ?Sized> HciWrite for &mut T {
    type Error = T::Error;

    fn write(&mut self, kind: PacketKind, data: &[u8]) -> Result<usize, Self::Error> {
        (**self).write(kind, data)
    }
}

//=============================================================================
// Error
//=============================================================================

/// Transport error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The UART rejected its configuration.
    Config(ConfigError),
    /// UART transmit error.
    Uart(embedded_hal_nb::serial::ErrorKind),
    /// Device-wake pin error.
    Pin(embedded_hal_1::digital::ErrorKind),
    /// `write` before `initialize`, or after `terminate`.
    NotOpen,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Config(e) => defmt::write!(f, "UART config error: {}", e),
            Error::Uart(e) => defmt::write!(f, "UART error: {:?}", defmt::Debug2Format(e)),
            Error::Pin(e) => defmt::write!(f, "wake pin error: {:?}", defmt::Debug2Format(e)),
            Error::NotOpen => defmt::write!(f, "transport not open"),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "UART config error: {:?}", e),
            Error::Uart(e) => write!(f, "UART error: {:?}", e),
            Error::Pin(e) => write!(f, "wake pin error: {:?}", e),
            Error::NotOpen => write!(f, "transport not open"),
        }
    }
}

impl core::error::Error for Error {}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::Config(_) => embedded_io::ErrorKind::InvalidInput,
            Self::Uart(_) | Self::Pin(_) => embedded_io::ErrorKind::Other,
            Self::NotOpen => embedded_io::ErrorKind::NotConnected,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

//=============================================================================
// Driver
//=============================================================================

/// H4 transport over a UART with a device-wake line and optional host-wake/deep-sleep support.
pub struct UartTransport<U, W, H = (), S = ()> {
    uart: U,
    device_wake: W,
    host_wake: H,
    sleep: S,
    config: Config,
    open: bool,
}

impl<U: HciUart, W: OutputPin> UartTransport<U, W> {
    /// Transport without host-wake or deep-sleep support.
    pub fn new(uart: U, device_wake: W, config: Config) -> Self {
        Self::with_deep_sleep(uart, device_wake, (), (), config)
    }
}

impl<U: HciUart, W: OutputPin, H: HostWake, S: SleepLock> UartTransport<U, W, H, S> {
    pub fn with_deep_sleep(uart: U, device_wake: W, host_wake: H, sleep: S, config: Config) -> Self {
        Self {
            uart,
            device_wake,
            host_wake,
            sleep,
            config,
            open: false,
        }
    }

    /// Configure the UART (8-N-1, RTS/CTS where available), arm the receive path and release
    /// device-wake once the controller has had `boot_settle_ms` to boot.
    pub fn initialize(&mut self, delay: &mut impl DelayNs) -> Result<(), Error> {
        let mut uart_config = self.config.uart_config();
        match self.uart.configure(&uart_config) {
            Err(ConfigError::FlowControlNotSupported) => {
                warn!("HCI UART: no RTS/CTS, running without flow control");
                uart_config.flow_control = FlowControl::None;
                self.uart.configure(&uart_config)?;
            }
            res => res?,
        }
        info!(
            "HCI UART: {} baud, 8N1, flow control {}",
            uart_config.baudrate,
            uart_config.flow_control == FlowControl::RtsCts
        );

        self.uart.enable_rx_interrupt();
        if self.config.deep_sleep {
            self.host_wake.enable_falling_edge_interrupt();
        }

        delay.delay_ms(self.config.boot_settle_ms);
        set_wake(&mut self.device_wake, self.config.device_wake_polarity, false)?;

        self.open = true;
        Ok(())
    }

    /// Close the link. The UART keeps its configuration and its receive interrupt.
    pub fn terminate(&mut self) {
        if self.open && self.config.deep_sleep {
            self.host_wake.disable_interrupt();
        }
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Receive interrupt: drain every byte the UART holds into `events`.
    ///
    /// Runs in interrupt context. Returns the number of bytes delivered.
    pub fn on_receive_interrupt(&mut self, events: &mut impl TransportEvents) -> usize {
        drain(
            &mut self.uart,
            &mut self.device_wake,
            self.config.device_wake_polarity,
            events,
        )
    }

    /// Host-wake falling edge: drain the UART while holding the deep-sleep lock.
    pub fn host_wake_interrupt(&mut self, events: &mut impl TransportEvents) -> usize {
        let _sleep = SleepGuard::new(&self.sleep);
        drain(
            &mut self.uart,
            &mut self.device_wake,
            self.config.device_wake_polarity,
            events,
        )
    }

    /// Give back the owned peripherals.
    pub fn release(self) -> (U, W, H, S) {
        (self.uart, self.device_wake, self.host_wake, self.sleep)
    }
}

impl<U: HciUart, W: OutputPin, H: HostWake, S: SleepLock> HciWrite for UartTransport<U, W, H, S> {
    type Error = Error;

    /// Blocks on the UART's transmit-ready status for every byte; a controller that holds CTS
    /// forever blocks here forever.
    fn write(&mut self, kind: PacketKind, data: &[u8]) -> Result<usize, Error> {
        if !self.open {
            return Err(Error::NotOpen);
        }
        let polarity = self.config.device_wake_polarity;
        set_wake(&mut self.device_wake, polarity, true)?;

        let res = transmit(&mut self.uart, kind, data);

        set_wake(&mut self.device_wake, polarity, false)?;
        res?;
        trace!("HCI tx: type={} len={}", indicator(kind), data.len());
        Ok(data.len())
    }
}

fn transmit<U: HciUart>(uart: &mut U, kind: PacketKind, data: &[u8]) -> Result<(), Error> {
    nb::block!(uart.write(indicator(kind))).map_err(|e| Error::Uart(e.kind()))?;
    for &byte in data {
        nb::block!(uart.write(byte)).map_err(|e| Error::Uart(e.kind()))?;
    }
    nb::block!(uart.flush()).map_err(|e| Error::Uart(e.kind()))
}

fn drain<U: HciUart, W: OutputPin>(
    uart: &mut U,
    device_wake: &mut W,
    polarity: Polarity,
    events: &mut impl TransportEvents,
) -> usize {
    if set_wake(device_wake, polarity, true).is_err() {
        warn!("HCI UART: failed to assert device-wake");
    }

    let mut n = 0;
    loop {
        match uart.read() {
            Ok(byte) => {
                events.on_data_received(byte);
                n += 1;
            }
            Err(nb::Error::WouldBlock) => break,
            Err(nb::Error::Other(_)) => {
                warn!("HCI UART: receive error after {} bytes", n);
                break;
            }
        }
    }

    if set_wake(device_wake, polarity, false).is_err() {
        warn!("HCI UART: failed to release device-wake");
    }
    n
}

fn set_wake<W: OutputPin>(pin: &mut W, polarity: Polarity, asserted: bool) -> Result<(), Error> {
    let high = match polarity {
        Polarity::ActiveLow => !asserted,
        Polarity::ActiveHigh => asserted,
    };
    let res = if high { pin.set_high() } else { pin.set_low() };
    res.map_err(|e| Error::Pin(e.kind()))
}

#[cfg(test)]
mod tests;
