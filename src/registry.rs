//! The program registry: a capacity-bounded, refcounted table of program
//! entries keyed by `"host:port"`.
//!
//! A key is "reserved but not yet named" by being present in the map
//! without a published entry behind it; `reserve` / `publish` /
//! `release_reserved` make that transition explicit instead of leaning on
//! a sentinel value.
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::entry::ProgramEntry;
use crate::limits::Limits;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("program registry is full ({0} entries)")]
    Full(usize),
    #[error("program {0:?} is already registered")]
    AlreadyExists(String),
}

enum Slot {
    /// Reserved by a caller that is still constructing the entry.
    Reserved,
    /// Fully initialized and discoverable.
    Published(Arc<ProgramEntry>),
}

pub struct ProgramRegistry {
    entries: Mutex<HashMap<String, Slot>>,
    limits: Limits,
}

impl ProgramRegistry {
    pub fn new(limits: Limits) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limits,
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Look up a published entry by key, incrementing its refcount.
    ///
    /// The increment happens while still holding the registry mutex, so it
    /// can never race with a `destroy` that is deciding whether
    /// `refcnt <= 1`.
    pub fn get(&self, key: &str) -> Option<Arc<ProgramEntry>> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(Slot::Published(entry)) => {
                entry.refcnt.fetch_add(1, Ordering::SeqCst);
                Some(entry.clone())
            }
            _ => None,
        }
    }

    /// Return any one published entry, incrementing its refcount. Used by
    /// `/ss` when no `udp` query parameter selects a specific source.
    pub fn get_first(&self) -> Option<Arc<ProgramEntry>> {
        let entries = self.entries.lock().unwrap();
        for slot in entries.values() {
            if let Slot::Published(entry) = slot {
                entry.refcnt.fetch_add(1, Ordering::SeqCst);
                return Some(entry.clone());
            }
        }
        None
    }

    /// Release a reference obtained from `get`/`get_first`.
    pub fn put(&self, entry: &Arc<ProgramEntry>) {
        entry.refcnt.fetch_sub(1, Ordering::SeqCst);
    }

    /// Claim a registry slot for `key` before the entry has been built.
    /// Fails if the key is already reserved/published, or the table is full.
    pub fn reserve(&self, key: &str) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(key) {
            return Err(RegistryError::AlreadyExists(key.to_string()));
        }
        if entries.len() >= self.limits.max_programs {
            return Err(RegistryError::Full(self.limits.max_programs));
        }
        entries.insert(key.to_string(), Slot::Reserved);
        Ok(())
    }

    /// Make a reserved entry discoverable under its key.
    pub fn publish(&self, key: &str, entry: Arc<ProgramEntry>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), Slot::Published(entry));
    }

    /// Undo a `reserve` whose subsequent construction failed.
    pub fn release_reserved(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
    }

    /// Attempt to tear down a published entry. Succeeds (and removes the
    /// entry from the table) only if `refcnt <= 1` under the registry
    /// mutex, i.e. the caller (the entry's own worker) is the only
    /// outstanding reference.
    pub fn try_destroy(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let destroyable = matches!(
            entries.get(key),
            Some(Slot::Published(entry)) if entry.refcnt.load(Ordering::SeqCst) <= 1
        );
        if destroyable {
            entries.remove(key);
        }
        destroyable
    }

    /// Force-remove an entry regardless of refcount/streams/users. Used only
    /// by the shutdown path, never by the ordinary idle-reap logic.
    pub fn force_remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Snapshot every published entry, for the `/si` report.
    pub fn all_published(&self) -> Vec<Arc<ProgramEntry>> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter_map(|s| match s {
                Slot::Published(e) => Some(e.clone()),
                Slot::Reserved => None,
            })
            .collect()
    }
}
