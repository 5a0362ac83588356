//! A thread-safe, bounded in-memory storage for flag configurations. [`ConfigurationStore`]
//! provides concurrent access for readers (flag evaluation) and a writer (periodic refresh).
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, RwLock},
};

use crate::{
    ufc::{Flag, TryParse, UniversalFlagConfig},
    Error, Result,
};

#[derive(Debug, Clone)]
enum Entry {
    Parsed(Arc<Flag>),
    ParseFailed,
}

#[derive(Debug, Default)]
struct Entries {
    /// Flag entries along with the generation they were inserted at.
    flags: HashMap<String, (u64, Entry)>,
    /// `(generation, key)` from oldest to newest insertion. A pair whose generation no longer
    /// matches `flags` is stale and gets skipped.
    order: VecDeque<(u64, String)>,
    next_generation: u64,
}

impl Entries {
    fn insert(&mut self, key: String, entry: Entry) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.flags.insert(key.clone(), (generation, entry));
        self.order.push_back((generation, key));
    }

    /// Remove the oldest live entry. Returns its key.
    fn evict_oldest(&mut self) -> Option<String> {
        while let Some((generation, key)) = self.order.pop_front() {
            if matches!(self.flags.get(&key), Some((g, _)) if *g == generation) {
                self.flags.remove(&key);
                return Some(key);
            }
        }
        None
    }

    /// Drop stale pairs once they outnumber live ones, keeping `order` linear in `flags`.
    fn compact(&mut self) {
        if self.order.len() > 2 * self.flags.len() + 16 {
            let flags = &self.flags;
            self.order
                .retain(|(generation, key)| matches!(flags.get(key), Some((g, _)) if g == generation));
        }
    }
}

/// `ConfigurationStore` holds the latest known configuration of every flag.
///
/// Refreshes are merged into the store: a flag missing from a refresh stays available until it
/// gets evicted. When the number of flags exceeds `max_entries`, the oldest-inserted flags are
/// evicted first. Reads do not affect eviction order.
///
/// Each `Flag` is immutable and can only be replaced completely, so readers never observe a
/// partially updated flag.
#[derive(Debug)]
pub struct ConfigurationStore {
    max_entries: usize,
    entries: RwLock<Entries>,
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        ConfigurationStore::new(ConfigurationStore::DEFAULT_MAX_ENTRIES)
    }
}

impl ConfigurationStore {
    /// Default maximum number of flags held by the store.
    pub const DEFAULT_MAX_ENTRIES: usize = 1000;

    /// Create a new empty store holding at most `max_entries` flags.
    pub fn new(max_entries: usize) -> Self {
        ConfigurationStore {
            max_entries,
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Get the current configuration of `flag_key`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigNotFound`] if the flag is unknown or has been evicted.
    /// - [`Error::ConfigurationParseError`] if the flag was received but failed to parse.
    pub fn get_configuration(&self, flag_key: &str) -> Result<Arc<Flag>> {
        // self.entries.read() should always return Ok(). Err() is possible only if the lock is
        // poisoned (writer panicked while holding the lock), which should never happen.
        let entries = self
            .entries
            .read()
            .expect("thread holding configuration lock should not panic");

        match entries.flags.get(flag_key) {
            Some((_, Entry::Parsed(flag))) => Ok(flag.clone()),
            Some((_, Entry::ParseFailed)) => Err(Error::ConfigurationParseError),
            None => Err(Error::ConfigNotFound),
        }
    }

    /// Merge `configuration` into the store, evicting the oldest flags if the store grows beyond
    /// its maximum size.
    pub fn set_configurations(&self, configuration: UniversalFlagConfig) {
        // Constructing new values before requesting the lock to minimize lock span.
        let new_entries: Vec<(String, Entry)> = configuration
            .flags
            .into_iter()
            .map(|(key, flag)| {
                let entry = match flag {
                    TryParse::Parsed(flag) => Entry::Parsed(Arc::new(flag)),
                    TryParse::ParseFailed(_) => {
                        log::warn!(target: "eppo", flag_key:display = key; "failed to parse flag configuration");
                        Entry::ParseFailed
                    }
                };
                (key, entry)
            })
            .collect();

        let mut entries = self
            .entries
            .write()
            .expect("thread holding configuration lock should not panic");

        for (key, entry) in new_entries {
            entries.insert(key, entry);
        }

        while entries.flags.len() > self.max_entries {
            let Some(oldest) = entries.evict_oldest() else {
                break;
            };
            log::debug!(target: "eppo", flag_key:display = oldest; "evicting flag configuration");
        }

        entries.compact();
    }

    /// Number of flags currently held.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("thread holding configuration lock should not panic")
            .flags
            .len()
    }

    /// Return `true` if the store holds no flags.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of flags held by the store.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}
