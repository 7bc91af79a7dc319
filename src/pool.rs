//! Packet buffer allocation.
//!
//! The reassembler asks a [`PacketPool`] for one buffer per inbound packet, sized
//! `header_len + payload_len`. Ownership of the buffer passes to [`HciHost::deliver`]
//! once the packet is complete; dropping it releases it back to wherever it came from.
//!
//! [`HciHost::deliver`]: crate::reassembler::HciHost::deliver

use crate::packet::PacketKind;

/// Source of packet buffers.
pub trait PacketPool {
    /// Buffer handed to the host stack. Its slice view must be exactly the requested length.
    type Buffer: AsRef<[u8]> + AsMut<[u8]>;

    /// Allocate a zeroed buffer of `len` bytes for a packet of type `kind`.
    ///
    /// ACL data may be served from a different pool than commands and events, which is why
    /// the type is passed in. `None` means the allocation failed.
    fn alloc(&mut self, kind: PacketKind, len: usize) -> Option<Self::Buffer>;
}

/// Fixed-capacity buffers, no heap.
///
/// Every buffer is a `heapless::Vec<u8, N>`; requests larger than `N` fail. ACL packets may
/// additionally be capped below `N` with [`with_acl_limit`](Self::with_acl_limit).
#[derive(Debug, Clone, Copy)]
pub struct HeaplessPool<const N: usize> {
    acl_limit: usize,
}

impl<const N: usize> HeaplessPool<N> {
    pub const fn new() -> Self {
        Self { acl_limit: N }
    }

    pub const fn with_acl_limit(limit: usize) -> Self {
        Self {
            acl_limit: if limit < N { limit } else { N },
        }
    }
}

impl<const N: usize> Default for HeaplessPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PacketPool for HeaplessPool<N> {
    type Buffer = heapless::Vec<u8, N>;

    fn alloc(&mut self, kind: PacketKind, len: usize) -> Option<Self::Buffer> {
        if kind == PacketKind::AclData && len > self.acl_limit {
            return None;
        }
        let mut buf = heapless::Vec::new();
        buf.resize(len, 0).ok()?;
        Some(buf)
    }
}

#[cfg(feature = "alloc")]
pub use self::global::GlobalPool;

#[cfg(feature = "alloc")]
mod global {
    extern crate alloc;

    use alloc::vec::Vec;

    use super::PacketPool;
    use crate::packet::PacketKind;

    /// Buffers from the global allocator. Allocation failure is reported, not aborted on.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct GlobalPool;

    impl PacketPool for GlobalPool {
        type Buffer = Vec<u8>;

        fn alloc(&mut self, _kind: PacketKind, len: usize) -> Option<Self::Buffer> {
            let mut buf = Vec::new();
            buf.try_reserve_exact(len).ok()?;
            buf.resize(len, 0);
            Some(buf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heapless_pool_sizes() {
        let mut pool = HeaplessPool::<16>::new();
        let buf = pool.alloc(PacketKind::Event, 6).unwrap();
        assert_eq!(AsRef::<[u8]>::as_ref(&buf), &[0u8; 6]);
        assert!(pool.alloc(PacketKind::Event, 17).is_none());
    }

    #[test]
    fn heapless_pool_acl_limit() {
        let mut pool = HeaplessPool::<64>::with_acl_limit(8);
        assert!(pool.alloc(PacketKind::AclData, 8).is_some());
        assert!(pool.alloc(PacketKind::AclData, 9).is_none());
        assert!(pool.alloc(PacketKind::Event, 9).is_some());
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn global_pool_sizes() {
        use crate::reassembler::Reassembler;
        use crate::test_util::RecordingHost;

        let mut pool = GlobalPool;
        let buf = pool.alloc(PacketKind::AclData, 300).unwrap();
        assert_eq!(buf.len(), 300);
        assert!(buf.iter().all(|&b| b == 0));

        // ACL payload of 0x012C bytes.
        let mut r = Reassembler::new(GlobalPool, RecordingHost::default());
        let mut bytes = std::vec![0x02, 0x01, 0x00, 0x2C, 0x01];
        bytes.extend(core::iter::repeat(0x5A).take(300));
        r.push_slice(&bytes);
        assert_eq!(r.host().packets.len(), 1);
        assert_eq!(r.host().packets[0].1.len(), 304);
    }
}
