//! H4 packet reassembly.
//!
//! A byte-at-a-time state machine, `Idle -> Header -> Data -> Complete -> Idle`:
//!
//! - **Idle**: the byte is a packet indicator. Anything that is not a known indicator is
//!   dropped and the next byte is tried as an indicator again.
//! - **Header**: bytes collect in a small header buffer until the type's header length is
//!   reached. The payload length is then decoded, a buffer of `header + payload` bytes is taken
//!   from the [`PacketPool`], and the header is copied in. A zero payload goes straight to
//!   Complete.
//! - **Data**: payload bytes are copied into the buffer until the count runs out.
//! - **Complete**: the buffer goes to the [`HciHost`]. Vendor `Command Complete` events are also
//!   reported to the [`VendorEventSink`] first.
//!
//! If the pool cannot provide a buffer, the packet's payload is skipped byte by byte so the
//! stream stays framed, and the machine returns to Idle afterwards.
//!
//! Header lengths and length fields are fixed by the H4 format; a controller that violates them
//! desynchronizes the stream.

use crate::packet::{self, Opcode, PacketKind, VendorCommandComplete, MAX_HEADER_LEN};
use crate::pool::PacketPool;
use crate::transport::TransportEvents;

/// Upstream host stack.
pub trait HciHost<B> {
    /// Called once per complete packet. `buffer` holds header and payload, without the
    /// indicator byte; ownership passes to the host.
    fn deliver(&mut self, kind: PacketKind, buffer: B);
}

impl<B, T: HciHost<B> + ?Sized> HciHost<B> for &mut T {
    fn deliver(&mut self, kind: PacketKind, buffer: B) {
        (**self).deliver(kind, buffer)
    }
}

/// Receiver of vendor `Command Complete` events seen on the receive path.
///
/// Called from whatever context runs the reassembler, possibly an interrupt.
pub trait VendorEventSink {
    /// `data` is the return parameters after the status byte.
    fn inject_vendor_response(&self, opcode: Opcode, status: u8, data: &[u8]);
}

/// No vendor command tracking.
impl VendorEventSink for () {
    fn inject_vendor_response(&self, _opcode: Opcode, _status: u8, _data: &[u8]) {}
}

impl<T: VendorEventSink + ?Sized> VendorEventSink for &T {
    fn inject_vendor_response(&self, opcode: Opcode, status: u8, data: &[u8]) {
        (**self).inject_vendor_response(opcode, status, data)
    }
}

/// Reassembly error, reported for the byte that caused it.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The byte in indicator position is not a packet type.
    InvalidPacketKind(u8),
    /// No buffer for a packet of this type and total length; the packet is skipped.
    AllocationFailed { kind: PacketKind, len: usize },
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidPacketKind(b) => write!(f, "invalid packet type 0x{:02X}", b),
            Error::AllocationFailed { kind, len } => {
                write!(f, "no buffer for {:?} packet of {} bytes", kind, len)
            }
        }
    }
}

impl core::error::Error for Error {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Idle,
    Header,
    Data,
    /// Skipping the payload of a packet that could not be buffered.
    Discard,
    Complete,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    /// Packets handed to the host.
    pub packets: u32,
    /// Vendor command-complete events reported to the vendor sink.
    pub vendor_events: u32,
    /// Bytes dropped in indicator position.
    pub invalid_types: u32,
    /// Packets skipped for lack of a buffer.
    pub alloc_failures: u32,
}

/// H4 packet reassembler.
pub struct Reassembler<P: PacketPool, H, V = ()> {
    pool: P,
    host: H,
    vendor: V,

    state: State,
    kind: PacketKind,
    header: [u8; MAX_HEADER_LEN],
    header_pos: usize,
    packet: Option<P::Buffer>,
    write_pos: usize,
    remaining: usize,

    stats: Stats,
}

impl<P: PacketPool, H: HciHost<P::Buffer>> Reassembler<P, H> {
    pub fn new(pool: P, host: H) -> Self {
        Self::with_vendor_sink(pool, host, ())
    }
}

impl<P: PacketPool, H: HciHost<P::Buffer>, V: VendorEventSink> Reassembler<P, H, V> {
    pub fn with_vendor_sink(pool: P, host: H, vendor: V) -> Self {
        Self {
            pool,
            host,
            vendor,
            state: State::Idle,
            kind: PacketKind::Event,
            header: [0; MAX_HEADER_LEN],
            header_pos: 0,
            packet: None,
            write_pos: 0,
            remaining: 0,
            stats: Stats::default(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Drop any partial packet and wait for the next indicator.
    pub fn reset(&mut self) {
        self.packet = None;
        self.header_pos = 0;
        self.write_pos = 0;
        self.remaining = 0;
        self.state = State::Idle;
    }

    /// Feed a run of bytes. Errors are counted in [`stats`](Self::stats) and otherwise ignored.
    pub fn push_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            let _ = self.push(b);
        }
    }

    /// Feed one byte.
    pub fn push(&mut self, byte: u8) -> Result<(), Error> {
        let res = self.step(byte);
        if self.state == State::Complete {
            self.complete();
        }
        res
    }

    fn step(&mut self, byte: u8) -> Result<(), Error> {
        match self.state {
            State::Idle | State::Complete => match packet::from_indicator(byte) {
                Some(kind) => {
                    self.kind = kind;
                    self.header_pos = 0;
                    self.state = State::Header;
                }
                None => {
                    self.stats.invalid_types = self.stats.invalid_types.wrapping_add(1);
                    warn!("HCI rx: invalid packet type 0x{:02X}", byte);
                    return Err(Error::InvalidPacketKind(byte));
                }
            },
            State::Header => {
                self.header[self.header_pos] = byte;
                self.header_pos += 1;
                if self.header_pos == packet::header_len(self.kind) {
                    return self.header_done();
                }
            }
            State::Data => {
                if let Some(packet) = self.packet.as_mut() {
                    packet.as_mut()[self.write_pos] = byte;
                }
                self.write_pos += 1;
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.state = State::Complete;
                }
            }
            State::Discard => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.state = State::Idle;
                }
            }
        }
        Ok(())
    }

    fn header_done(&mut self) -> Result<(), Error> {
        let header_len = packet::header_len(self.kind);
        let payload_len = packet::payload_len(self.kind, &self.header[..header_len]);
        let len = header_len + payload_len;

        let packet = self
            .pool
            .alloc(self.kind, len)
            .filter(|p| p.as_ref().len() == len);
        let Some(mut packet) = packet else {
            self.stats.alloc_failures = self.stats.alloc_failures.wrapping_add(1);
            warn!(
                "HCI rx: no buffer for type {} len {}, skipping",
                packet::indicator(self.kind),
                len
            );
            self.remaining = payload_len;
            self.state = if payload_len == 0 {
                State::Idle
            } else {
                State::Discard
            };
            return Err(Error::AllocationFailed {
                kind: self.kind,
                len,
            });
        };

        packet.as_mut()[..header_len].copy_from_slice(&self.header[..header_len]);
        self.packet = Some(packet);
        self.write_pos = header_len;
        self.remaining = payload_len;
        self.state = if payload_len == 0 {
            State::Complete
        } else {
            State::Data
        };
        Ok(())
    }

    fn complete(&mut self) {
        self.state = State::Idle;
        let Some(packet) = self.packet.take() else {
            return;
        };

        if self.kind == PacketKind::Event {
            if let Some(cc) = VendorCommandComplete::parse(packet.as_ref()) {
                trace!(
                    "HCI rx: vendor command complete 0x{:04X} status {}",
                    cc.opcode.to_raw(),
                    cc.status
                );
                self.stats.vendor_events = self.stats.vendor_events.wrapping_add(1);
                self.vendor
                    .inject_vendor_response(cc.opcode, cc.status, cc.params);
            }
        }

        self.stats.packets = self.stats.packets.wrapping_add(1);
        self.host.deliver(self.kind, packet);
    }
}

impl<P, H, V> TransportEvents for Reassembler<P, H, V>
where
    P: PacketPool,
    H: HciHost<P::Buffer>,
    V: VendorEventSink,
{
    fn on_data_received(&mut self, byte: u8) {
        let _ = self.push(byte);
    }

    fn on_bus_reset(&mut self) {
        self.reset();
    }
}
