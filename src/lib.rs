#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod packet;
pub mod pool;
pub mod transport;
pub mod reassembler;
pub mod vendor;
pub mod multi_adv;

#[cfg(test)]
mod test_util;

// Reexports
pub use packet::PacketKind;
pub use pool::{HeaplessPool, PacketPool};
pub use reassembler::{HciHost, Reassembler, VendorEventSink};
pub use transport::{Config, HciWrite, RxPipe, TransportEvents, UartTransport};
pub use vendor::VendorDispatcher;
