//! MPEG Transport Stream inspection: PID extraction and the per-second rate ring.

use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

/// Fixed-length TS packet size.
pub const TS_PACKET_LEN: usize = 188;

/// Number of TS packets carried per UDP datagram (7 × 188 = 1316 bytes).
pub const PACKETS_PER_DATAGRAM: usize = 7;

/// Maximum UDP payload the ingest worker will ever read or synthesize.
pub const DATAGRAM_LEN: usize = TS_PACKET_LEN * PACKETS_PER_DATAGRAM;

/// Number of distinct 13-bit PID values (0x0000..=0x1FFF).
pub const PID_SPACE: usize = 0x1FFF + 1;

/// Depth of the per-second packet-count ring kept for each PID.
pub const RATE_HISTORY_LEN: usize = 64;

/// PID reserved for filler ("null") packets.
pub const NULL_PID: u16 = 0x1FFF;

/// Per-PID counters: a running total and a ring of per-second counts.
///
/// Every field is atomic rather than lock-protected: the inspector is the
/// only writer, but readers (the `/si` and `/ss` handlers) observe it
/// without taking any lock and must tolerate a torn snapshot across the
/// ring. Atomics make that data race well-defined instead of undefined
/// behavior.
#[derive(Debug)]
pub struct PidCounters {
    pub count: AtomicU32,
    pub rate_history: [AtomicU16; RATE_HISTORY_LEN],
}

impl PidCounters {
    fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            rate_history: std::array::from_fn(|_| AtomicU16::new(0)),
        }
    }

    /// Snapshot the running total.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Snapshot `rate_history[idx]`.
    pub fn rate_at(&self, idx: usize) -> u16 {
        self.rate_history[idx].load(Ordering::Relaxed)
    }
}

/// The PID table and rate ring owned by one program entry.
///
/// Written exclusively by that entry's ingest worker; read without
/// synchronization by the HTTP handlers.
pub struct PidTable {
    pids: Box<[PidCounters; PID_SPACE]>,
    rate_index: AtomicU16,
}

impl PidTable {
    pub fn new() -> Self {
        // `PidCounters` isn't `Copy`, so build the array element-by-element.
        let pids: Vec<PidCounters> = (0..PID_SPACE).map(|_| PidCounters::new()).collect();
        let pids: Box<[PidCounters; PID_SPACE]> = pids
            .into_boxed_slice()
            .try_into()
            .unwrap_or_else(|_| unreachable!("PID_SPACE is a compile-time constant"));
        Self {
            pids,
            rate_index: AtomicU16::new(0),
        }
    }

    pub fn rate_index(&self) -> u16 {
        self.rate_index.load(Ordering::Relaxed)
    }

    pub fn pid(&self, pid: u16) -> &PidCounters {
        &self.pids[pid as usize]
    }

    /// Iterate PIDs with a nonzero running count, in ascending PID order.
    pub fn nonzero(&self) -> impl Iterator<Item = (u16, &PidCounters)> {
        self.pids
            .iter()
            .enumerate()
            .filter(|(_, c)| c.count() != 0)
            .map(|(pid, c)| (pid as u16, c))
    }

    /// Record one 188-byte TS packet at the current rate-ring position.
    ///
    /// Reads bytes 1 and 2 without checking the sync byte: a misaligned
    /// payload simply attributes counts to whatever 13 bits land in the
    /// PID field rather than being resynced.
    pub fn observe_packet(&self, packet: &[u8]) {
        debug_assert!(packet.len() >= 3);
        let pid = (((packet[1] & 0x1F) as u16) << 8) | packet[2] as u16;
        let idx = self.rate_index() as usize;
        let counters = self.pid(pid);
        counters.count.fetch_add(1, Ordering::Relaxed);
        counters.rate_history[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Advance the rate ring to a new wall-clock second, zeroing the new
    /// slot for every PID before any producer can write into it.
    pub fn advance_second(&self) {
        let next = (self.rate_index() + 1) % RATE_HISTORY_LEN as u16;
        for counters in self.pids.iter() {
            counters.rate_history[next as usize].store(0, Ordering::Relaxed);
        }
        self.rate_index.store(next, Ordering::Release);
    }
}

impl Default for PidTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a datagram into its constituent 188-byte TS packets.
///
/// Any trailing bytes that don't fill a whole packet are ignored.
pub fn packets(datagram: &[u8]) -> impl Iterator<Item = &[u8]> {
    datagram.chunks_exact(TS_PACKET_LEN)
}

/// Build the synthetic filler datagram sent whenever the UDP source goes
/// quiet: seven TS null packets.
pub fn filler_datagram() -> [u8; DATAGRAM_LEN] {
    let mut buf = [0xFFu8; DATAGRAM_LEN];
    for packet in buf.chunks_exact_mut(TS_PACKET_LEN) {
        packet[0] = 0x47;
        packet[1] = 0x1F;
        packet[2] = 0xFF;
        packet[3] = 0x00;
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filler_datagram_is_seven_null_packets() {
        let buf = filler_datagram();
        assert_eq!(buf.len(), DATAGRAM_LEN);
        for packet in packets(&buf) {
            assert_eq!(&packet[0..4], &[0x47, 0x1F, 0xFF, 0x00]);
            assert!(packet[4..].iter().all(|&b| b == 0xFF));
        }
    }

    #[test]
    fn observe_packet_extracts_13_bit_pid() {
        let table = PidTable::new();
        let mut packet = [0u8; TS_PACKET_LEN];
        packet[0] = 0x47;
        packet[1] = 0x01; // high 5 bits of PID
        packet[2] = 0x00; // low 8 bits of PID -> pid = 0x100 = 256
        table.observe_packet(&packet);
        table.observe_packet(&packet);
        assert_eq!(table.pid(256).count(), 2);
        assert_eq!(table.pid(256).rate_at(0), 2);
    }

    #[test]
    fn advance_second_zeroes_new_slot_only() {
        let table = PidTable::new();
        let mut packet = [0u8; TS_PACKET_LEN];
        packet[1] = 0x00;
        packet[2] = 0x01; // pid = 1
        table.observe_packet(&packet);
        assert_eq!(table.pid(1).rate_at(0), 1);
        table.advance_second();
        assert_eq!(table.rate_index(), 1);
        assert_eq!(table.pid(1).rate_at(1), 0);
        assert_eq!(table.pid(1).rate_at(0), 1, "old slot is untouched");
    }

    #[test]
    fn rate_index_wraps_modulo_64() {
        let table = PidTable::new();
        for _ in 0..RATE_HISTORY_LEN {
            table.advance_second();
        }
        assert_eq!(table.rate_index(), 0);
    }

    #[test]
    fn nonzero_only_yields_pids_with_packets() {
        let table = PidTable::new();
        let mut packet = [0u8; TS_PACKET_LEN];
        packet[1] = 0x00;
        packet[2] = 0x05;
        table.observe_packet(&packet);
        let seen: Vec<u16> = table.nonzero().map(|(pid, _)| pid).collect();
        assert_eq!(seen, vec![5]);
    }
}
