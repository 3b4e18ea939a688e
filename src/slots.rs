//! Per-program table of HTTP client slots.
//!
//! A slot's `connection` is a bounded channel rather than a raw socket: the
//! worker's broadcast loop treats a full channel exactly like a non-blocking
//! socket write that returned `EAGAIN` (discard and move on), and a closed
//! channel exactly like any other write failure (retire the slot). Capacity
//! is kept small so a client that stops reading starts discarding quickly;
//! writes are whole-datagram, never partial, and never reordered.
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Maximum number of concurrent HTTP clients per program entry.
pub const MAX_HTTP_STREAM: usize = 100;

/// Capacity of a slot's datagram channel. One in flight plus one buffered is
/// enough headroom for a healthy client; anything beyond that is backpressure
/// and surfaces as a discard.
const SLOT_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Idle,
    Running,
    Close,
}

pub struct Slot {
    pub connection: Option<mpsc::Sender<Bytes>>,
    pub remote: Option<SocketAddr>,
    pub status: SlotStatus,
    pub send_bytes: u64,
    pub discard_bytes: u64,
    pub start_time: Option<Instant>,
}

impl Slot {
    fn new() -> Self {
        Self {
            connection: None,
            remote: None,
            status: SlotStatus::Idle,
            send_bytes: 0,
            discard_bytes: 0,
            start_time: None,
        }
    }
}

/// The fixed-capacity slot table plus its running counters (`nr_streams`,
/// `max_stream_index`). Always accessed under the owning program entry's
/// mutex.
pub struct SlotTable {
    slots: Vec<Slot>,
    pub max_stream_index: Option<usize>,
    pub nr_streams: usize,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::with_capacity(MAX_HTTP_STREAM)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| Slot::new()).collect();
        Self {
            slots,
            max_stream_index: None,
            nr_streams: 0,
        }
    }

    /// Claim the first non-RUNNING slot for a new client, returning its
    /// index and the sending half of its channel. `None` if the table is
    /// full.
    pub fn add_stream(
        &mut self,
        remote: SocketAddr,
    ) -> Option<(usize, mpsc::Receiver<Bytes>)> {
        let idx = self
            .slots
            .iter()
            .position(|s| s.status != SlotStatus::Running)?;

        let (tx, rx) = mpsc::channel(SLOT_CHANNEL_CAPACITY);
        let slot = &mut self.slots[idx];
        slot.connection = Some(tx);
        slot.remote = Some(remote);
        slot.send_bytes = 0;
        slot.discard_bytes = 0;
        slot.start_time = Some(Instant::now());
        slot.status = SlotStatus::Running;

        self.max_stream_index = Some(self.max_stream_index.map_or(idx, |m| m.max(idx)));
        self.nr_streams += 1;

        Some((idx, rx))
    }

    /// Retire a slot: mark it CLOSE, drop its sender, decrement `nr_streams`.
    pub fn remove_stream(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        if slot.status == SlotStatus::Running {
            self.nr_streams -= 1;
        }
        slot.status = SlotStatus::Close;
        slot.connection = None;
    }

    /// A consistent snapshot of every RUNNING slot's sender, taken under the
    /// entry mutex and used by the worker's broadcast loop *after* the lock
    /// is released; the lock is never held across the sends themselves.
    pub fn running_snapshot(&self) -> Vec<(usize, mpsc::Sender<Bytes>)> {
        let Some(max) = self.max_stream_index else {
            return Vec::new();
        };
        self.slots[..=max]
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                if s.status == SlotStatus::Running {
                    s.connection.clone().map(|tx| (i, tx))
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn record_sent(&mut self, idx: usize, len: u64) {
        self.slots[idx].send_bytes += len;
    }

    pub fn record_discarded(&mut self, idx: usize, len: u64) {
        self.slots[idx].discard_bytes += len;
    }

    /// Iterate slots with a live connection, for the `/si` report. Yields
    /// `(index, slot)` pairs bounded by `max_stream_index`.
    pub fn running(&self) -> impl Iterator<Item = (usize, &Slot)> {
        let max = self.max_stream_index;
        self.slots
            .iter()
            .enumerate()
            .take_while(move |(i, _)| max.map_or(false, |m| *i <= m))
            .filter(|(_, s)| s.connection.is_some())
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    #[test]
    fn add_stream_claims_first_free_slot() {
        let mut table = SlotTable::new();
        let (idx, _rx) = table.add_stream(addr()).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(table.nr_streams, 1);
        assert_eq!(table.max_stream_index, Some(0));
    }

    #[test]
    fn remove_stream_frees_the_slot_for_reuse() {
        let mut table = SlotTable::new();
        let (idx, _rx) = table.add_stream(addr()).unwrap();
        table.remove_stream(idx);
        assert_eq!(table.nr_streams, 0);
        let (idx2, _rx2) = table.add_stream(addr()).unwrap();
        assert_eq!(idx2, idx, "closed slot should be reclaimed");
    }

    #[test]
    fn table_refuses_past_capacity() {
        let mut table = SlotTable::new();
        let mut rxs = Vec::new();
        for _ in 0..MAX_HTTP_STREAM {
            rxs.push(table.add_stream(addr()).unwrap());
        }
        assert!(table.add_stream(addr()).is_none());
    }

    #[test]
    fn running_snapshot_only_contains_running_slots() {
        let mut table = SlotTable::new();
        let (idx0, _rx0) = table.add_stream(addr()).unwrap();
        let (idx1, _rx1) = table.add_stream(addr()).unwrap();
        table.remove_stream(idx0);
        let snapshot = table.running_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, idx1);
    }
}
