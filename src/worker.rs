//! The ingest worker: one task per program entry, reading UDP datagrams
//! (or synthesizing filler), updating PID statistics, and broadcasting to
//! every RUNNING slot.
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::entry::ProgramEntry;
use crate::registry::ProgramRegistry;
use crate::ts::{self, DATAGRAM_LEN};
use crate::udp;

/// How long the worker sleeps between idle checks while waiting out the
/// reap grace period.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Spawn and run the ingest worker for `entry`, removing it from `registry`
/// when it decides to exit (idle reap or shutdown).
pub async fn run(
    entry: Arc<ProgramEntry>,
    registry: Arc<ProgramRegistry>,
    shutdown: CancellationToken,
) {
    let key = entry.key.clone();
    let mut buf = [0u8; DATAGRAM_LEN];
    let mut last_second: Option<Instant> = None;

    loop {
        if shutdown.is_cancelled() {
            info!(udp_addr = %key, "shutting down, removing program entry");
            registry.force_remove(&key);
            return;
        }

        let idle_expired = {
            let state = entry.state.lock().await;
            state.is_idle_expired()
        };
        if idle_expired {
            if registry.try_destroy(&key) {
                info!(udp_addr = %key, "idle timeout elapsed, worker exiting");
                return;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            continue;
        }

        let datagram: &[u8] = match udp::recv_timeout(&entry.socket, &mut buf).await {
            Ok(Some(n)) => {
                observe_datagram(&entry, &buf[..n], &mut last_second);
                &buf[..n]
            }
            Ok(None) => {
                debug!(udp_addr = %key, "udp source idle, sending filler");
                let filler = ts::filler_datagram();
                buf = filler;
                &buf[..]
            }
            Err(e) => {
                warn!(udp_addr = %key, error = %e, "udp read error, sending filler");
                let filler = ts::filler_datagram();
                buf = filler;
                &buf[..]
            }
        };

        broadcast(&entry, datagram).await;
    }
}

fn observe_datagram(entry: &ProgramEntry, datagram: &[u8], last_second: &mut Option<Instant>) {
    for packet in ts::packets(datagram) {
        entry.pid_table.observe_packet(packet);
    }

    let now = Instant::now();
    match last_second {
        None => *last_second = Some(now),
        Some(prev) => {
            if now.duration_since(*prev) >= Duration::from_secs(1) {
                entry.pid_table.advance_second();
                *last_second = Some(now);
            }
        }
    }
}

/// Send `datagram` to every RUNNING slot, taking a lock-free-after-the-fact
/// snapshot so the entry mutex is never held across the sends themselves.
async fn broadcast(entry: &ProgramEntry, datagram: &[u8]) {
    let snapshot = {
        let state = entry.state.lock().await;
        state.slots.running_snapshot()
    };
    if snapshot.is_empty() {
        return;
    }

    let payload = Bytes::copy_from_slice(datagram);
    let len = payload.len() as u64;

    let mut discarded = Vec::new();
    let mut sent = Vec::new();
    let mut closed = Vec::new();

    for (idx, tx) in snapshot {
        match tx.try_send(payload.clone()) {
            Ok(()) => sent.push(idx),
            Err(TrySendError::Full(_)) => discarded.push(idx),
            Err(TrySendError::Closed(_)) => closed.push(idx),
        }
    }

    if sent.is_empty() && discarded.is_empty() && closed.is_empty() {
        return;
    }

    let mut state = entry.state.lock().await;
    for idx in sent {
        state.slots.record_sent(idx, len);
    }
    for idx in discarded {
        state.slots.record_discarded(idx, len);
    }
    for idx in closed {
        state.slots.remove_stream(idx);
    }
    if state.slots.nr_streams == 0 {
        state.idle_start_time = tokio::time::Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::TS_PACKET_LEN;

    #[test]
    fn observe_datagram_feeds_the_pid_table() {
        let entry_state = crate::ts::PidTable::new();
        let mut datagram = [0u8; TS_PACKET_LEN * 2];
        datagram[1] = 0x01;
        datagram[2] = 0x00; // pid 256
        datagram[TS_PACKET_LEN + 1] = 0x01;
        datagram[TS_PACKET_LEN + 2] = 0x00; // pid 256 again
        for packet in ts::packets(&datagram) {
            entry_state.observe_packet(packet);
        }
        assert_eq!(entry_state.pid(256).count(), 2);
    }
}
