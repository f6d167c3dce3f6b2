//! Process-wide directory of live sources
//!
//! ```text
//!   schema ─► vhost ─► app ─► stream ─► Weak<MediaSource>
//! ```
//!
//! Entries are weak: the registry never keeps a source alive. An entry whose
//! source has gone away is treated as free and replaced on the next
//! registration.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::error::RegistryError;
use super::key::MediaKey;
use super::source::MediaSource;

type StreamMap = HashMap<String, Weak<MediaSource>>;
type AppMap = HashMap<String, StreamMap>;
type VhostMap = HashMap<String, AppMap>;

#[derive(Debug, Default)]
pub struct Registry {
    schemas: Mutex<HashMap<String, VhostMap>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live source.
    ///
    /// The flag reports whether an entry exists for the key at all, even if
    /// its source has already gone away.
    pub fn find(&self, key: &MediaKey) -> (Option<Arc<MediaSource>>, bool) {
        let schemas = self.schemas.lock();
        let entry = schemas
            .get(&key.schema)
            .and_then(|vhosts| vhosts.get(&key.vhost))
            .and_then(|apps| apps.get(&key.app))
            .and_then(|streams| streams.get(&key.stream));

        match entry {
            Some(weak) => (weak.upgrade(), true),
            None => (None, false),
        }
    }

    pub fn register(&self, source: &Arc<MediaSource>) -> Result<(), RegistryError> {
        let key = source.key();
        let mut schemas = self.schemas.lock();
        let slot = schemas
            .entry(key.schema.clone())
            .or_default()
            .entry(key.vhost.clone())
            .or_default()
            .entry(key.app.clone())
            .or_default()
            .entry(key.stream.clone());

        match slot {
            Entry::Occupied(mut occupied) => match occupied.get().upgrade() {
                Some(existing) if Arc::ptr_eq(&existing, source) => {
                    tracing::debug!(stream = %key, "Source already registered");
                    return Ok(());
                }
                Some(_) => {
                    tracing::warn!(stream = %key, "Rejecting second source for live stream");
                    return Err(RegistryError::AlreadyRegistered(key.clone()));
                }
                None => {
                    tracing::debug!(stream = %key, "Replacing expired registry entry");
                    occupied.insert(Arc::downgrade(source));
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::downgrade(source));
            }
        }
        drop(schemas);

        source.set_registered(true);
        tracing::info!(stream = %key, "Source registered");
        Ok(())
    }

    /// Remove the entry for `source` if it is still the registered one.
    /// Safe to call more than once.
    pub fn unregister(&self, source: &MediaSource) {
        let key = source.key();
        let mut schemas = self.schemas.lock();

        let Some(vhosts) = schemas.get_mut(&key.schema) else {
            return;
        };
        let Some(apps) = vhosts.get_mut(&key.vhost) else {
            return;
        };
        let Some(streams) = apps.get_mut(&key.app) else {
            return;
        };
        let matches = streams
            .get(&key.stream)
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), source));
        if !matches {
            return;
        }

        streams.remove(&key.stream);
        if streams.is_empty() {
            apps.remove(&key.app);
        }
        if apps.is_empty() {
            vhosts.remove(&key.vhost);
        }
        if vhosts.is_empty() {
            schemas.remove(&key.schema);
        }
        drop(schemas);

        source.set_registered(false);
        tracing::info!(stream = %key, "Source unregistered");
    }

    /// Number of entries, expired ones included
    pub fn len(&self) -> usize {
        self.schemas
            .lock()
            .values()
            .flat_map(|vhosts| vhosts.values())
            .flat_map(|apps| apps.values())
            .map(|streams| streams.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.lock().is_empty()
    }

    /// Drop every entry
    pub fn shutdown(&self) {
        let schemas = std::mem::take(&mut *self.schemas.lock());
        let mut count = 0;
        for streams in schemas
            .values()
            .flat_map(|vhosts| vhosts.values())
            .flat_map(|apps| apps.values())
        {
            for weak in streams.values() {
                if let Some(source) = weak.upgrade() {
                    source.set_registered(false);
                }
                count += 1;
            }
        }
        tracing::info!(entries = count, "Registry shut down");
    }
}
