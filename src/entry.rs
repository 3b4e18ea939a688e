//! A single program entry: the state owned by one ingested UDP source.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::limits::Limits;
use crate::slots::SlotTable;
use crate::ts::PidTable;

/// Counters and state guarded by the entry's own mutex: everything the
/// worker's idle check and the slot table need in lockstep.
pub struct EntryState {
    pub slots: SlotTable,
    pub nr_users: usize,
    pub idle_start_time: Instant,
    limits: Limits,
}

impl EntryState {
    fn new(limits: Limits) -> Self {
        Self {
            slots: SlotTable::with_capacity(limits.max_streams_per_program),
            nr_users: 0,
            idle_start_time: Instant::now(),
            limits,
        }
    }

    /// Whether the idle countdown has fully elapsed.
    pub fn is_idle_expired(&self) -> bool {
        self.nr_users == 0
            && self.slots.nr_streams == 0
            && self.idle_start_time.elapsed() >= self.limits.idle_timeout
    }
}

pub struct ProgramEntry {
    pub key: String,
    pub socket: UdpSocket,
    /// Guarded by the registry mutex: see `ProgramRegistry::get`/`try_destroy`.
    pub refcnt: AtomicUsize,
    pub state: AsyncMutex<EntryState>,
    pub pid_table: PidTable,
}

impl ProgramEntry {
    /// Parse `"host:port"`, bind (and, for multicast addresses, join) the
    /// UDP endpoint, and build a fresh entry with refcnt 1.
    ///
    /// Any failure here must be reported to the caller so it can release
    /// its registry reservation.
    pub async fn init(key: &str, limits: Limits) -> Result<Self> {
        let addr: SocketAddr = key
            .parse()
            .with_context(|| format!("malformed udp address {key:?}, expected host:port"))?;

        let socket = crate::udp::open(addr)
            .await
            .with_context(|| format!("opening udp endpoint for {key}"))?;

        Ok(Self {
            key: key.to_string(),
            socket,
            refcnt: AtomicUsize::new(1),
            state: AsyncMutex::new(EntryState::new(limits)),
            pid_table: PidTable::new(),
        })
    }

    pub fn refcnt(&self) -> usize {
        self.refcnt.load(Ordering::SeqCst)
    }

    /// Bump `nr_users`; a logical holder keeps the entry alive without
    /// consuming a streaming slot.
    pub async fn inc_users(&self) {
        let mut state = self.state.lock().await;
        state.nr_users += 1;
    }

    /// Drop `nr_users`; refreshes the idle timer on the 1 -> 0 transition.
    pub async fn dec_users(&self) {
        let mut state = self.state.lock().await;
        if state.nr_users == 1 {
            state.idle_start_time = Instant::now();
        }
        if state.nr_users > 0 {
            state.nr_users -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;

    #[tokio::test(start_paused = true)]
    async fn a_user_keeps_the_entry_alive_past_the_idle_timeout() {
        let limits = Limits::default();
        let entry = ProgramEntry::init("127.0.0.1:0", limits).await.unwrap();

        entry.inc_users().await;
        tokio::time::advance(limits.idle_timeout + std::time::Duration::from_secs(1)).await;

        assert!(
            !entry.state.lock().await.is_idle_expired(),
            "an outstanding user should block idle expiry even once the timeout has elapsed"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn releasing_the_last_user_restarts_the_idle_countdown() {
        let limits = Limits::default();
        let entry = ProgramEntry::init("127.0.0.1:0", limits).await.unwrap();

        entry.inc_users().await;
        tokio::time::advance(limits.idle_timeout + std::time::Duration::from_secs(1)).await;
        entry.dec_users().await;

        assert!(
            !entry.state.lock().await.is_idle_expired(),
            "dropping the last user resets idle_start_time to now"
        );

        tokio::time::advance(limits.idle_timeout + std::time::Duration::from_secs(1)).await;

        assert!(
            entry.state.lock().await.is_idle_expired(),
            "idle countdown should expire once it has run uninterrupted for idle_timeout"
        );
    }
}
