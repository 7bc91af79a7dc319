//! Deferred receive path.
//!
//! The receive interrupt only copies bytes into a bounded [`Pipe`]; a task drains the pipe and
//! runs the reassembler outside interrupt context. Single producer, single consumer, so byte
//! order is preserved end to end.
//!
//! A bus reset clears the pipe and bumps an epoch in one critical section. The consumer reads
//! each chunk together with the epoch it belongs to, so bytes received before a reset are never
//! fed after the consumer has reported it.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_sync::signal::Signal;

use super::TransportEvents;

const CHUNK: usize = 32;

/// Interrupt-to-task byte pipe holding up to `N` bytes.
pub struct RxPipe<const N: usize> {
    pipe: Pipe<CriticalSectionRawMutex, N>,
    /// Bus resets seen by the producer.
    epoch: AtomicU32,
    /// Bus resets already reported to the consumer.
    reported: AtomicU32,
    readable: Signal<CriticalSectionRawMutex, ()>,
    overflow: AtomicU32,
}

impl<const N: usize> RxPipe<N> {
    pub const fn new() -> Self {
        Self {
            pipe: Pipe::new(),
            epoch: AtomicU32::new(0),
            reported: AtomicU32::new(0),
            readable: Signal::new(),
            overflow: AtomicU32::new(0),
        }
    }

    /// Bytes dropped because the pipe was full.
    pub fn overflow_count(&self) -> u32 {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Bytes waiting for the consumer.
    pub fn len(&self) -> usize {
        self.pipe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipe.is_empty()
    }

    /// Consumer task body: forward every byte to `events`, forever.
    pub async fn forward_to<E: TransportEvents>(&self, events: &mut E) -> ! {
        loop {
            self.try_forward_to(events);
            self.readable.wait().await;
        }
    }

    /// Forward whatever is buffered right now without waiting. Returns the number of bytes.
    pub fn try_forward_to<E: TransportEvents>(&self, events: &mut E) -> usize {
        let mut buf = [0u8; CHUNK];
        let mut total = 0;
        loop {
            let (epoch, n) = critical_section::with(|_| {
                let epoch = self.epoch.load(Ordering::Acquire);
                (epoch, self.pipe.try_read(&mut buf).unwrap_or(0))
            });
            if self.reported.swap(epoch, Ordering::AcqRel) != epoch {
                events.on_bus_reset();
            }
            if n == 0 {
                return total;
            }
            total += self.forward(epoch, &buf[..n], events);
        }
    }

    /// Feed a chunk read during `epoch`. A reset landing meanwhile makes the rest of the chunk
    /// stale; it is dropped like the bytes the reset cleared from the pipe.
    fn forward<E: TransportEvents>(&self, epoch: u32, bytes: &[u8], events: &mut E) -> usize {
        for (i, &b) in bytes.iter().enumerate() {
            if self.epoch.load(Ordering::Acquire) != epoch {
                debug!("HCI rx: bus reset, {} stale bytes dropped", bytes.len() - i);
                return i;
            }
            events.on_data_received(b);
        }
        bytes.len()
    }
}

impl<const N: usize> Default for RxPipe<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side, used from the receive interrupt.
impl<const N: usize> TransportEvents for &RxPipe<N> {
    fn on_data_received(&mut self, byte: u8) {
        if self.pipe.try_write(&[byte]).is_err() {
            let dropped = self.overflow.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 {
                warn!("HCI rx pipe full, dropping bytes");
            }
            return;
        }
        self.readable.signal(());
    }

    fn on_bus_reset(&mut self) {
        critical_section::with(|_| {
            self.pipe.clear();
            self.epoch.fetch_add(1, Ordering::Release);
        });
        self.readable.signal(());
    }
}
