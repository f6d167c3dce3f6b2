//! Packet fan-out with a trailing cache for late joiners
//!
//! ```text
//!   distribute(pkt)
//!        │
//!        ├─1─► synced readers      (live delivery, dead transports pruned)
//!        │
//!        ├─2─► trailing cache      (cleared on keyframe, bounded otherwise)
//!        │
//!        └─3─► fresh readers  ◄── whole cache replayed, then moved to synced
//! ```
//!
//! Readers hold only a weak reference to their transport, so a closed
//! subscriber never stays alive because the dispatcher knows about it.
//!
//! Read callbacks run while the dispatcher's locks are held and must not call
//! back into the dispatcher. Detach callbacks run after the locks are released.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Smallest trailing cache a dispatcher keeps
pub const MIN_CACHE_SIZE: usize = 32;
/// Largest trailing cache a dispatcher keeps
pub const MAX_CACHE_SIZE: usize = 1024;

static NEXT_READER_ID: AtomicU64 = AtomicU64::new(1);

type ReadFn<T> = Box<dyn Fn(&T) + Send + Sync>;
type DetachFn = Box<dyn Fn(bool) + Send + Sync>;

/// One registered consumer of a dispatcher
pub struct SubscriberHandle<T> {
    id: u64,
    transport: Weak<dyn Any + Send + Sync>,
    on_read: ReadFn<T>,
    on_detach: Option<DetachFn>,
    registered: AtomicBool,
}

impl<T> SubscriberHandle<T> {
    pub fn new<S, F>(transport: &Arc<S>, on_read: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let weak: Weak<S> = Arc::downgrade(transport);
        let transport: Weak<dyn Any + Send + Sync> = weak;
        Self {
            id: NEXT_READER_ID.fetch_add(1, Ordering::Relaxed),
            transport,
            on_read: Box::new(on_read),
            on_detach: None,
            registered: AtomicBool::new(false),
        }
    }

    /// Called with `true` when the source ended normally
    pub fn with_detach<F>(mut self, on_detach: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_detach = Some(Box::new(on_detach));
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Whether the transport behind this reader still exists
    pub fn is_alive(&self) -> bool {
        self.transport.strong_count() > 0
    }

    fn read(&self, packet: &T) {
        (self.on_read)(packet);
    }

    fn detach(&self, is_normal: bool) {
        if self.is_registered() {
            if let Some(on_detach) = &self.on_detach {
                on_detach(is_normal);
            }
        }
    }

    fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }
}

impl<T> fmt::Debug for SubscriberHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("id", &self.id)
            .field("registered", &self.is_registered())
            .field("alive", &self.is_alive())
            .finish()
    }
}

struct Readers<T> {
    /// Registered since the last distribute, still owed the cache
    fresh: Vec<Arc<SubscriberHandle<T>>>,
    /// Receiving live packets
    synced: Vec<Arc<SubscriberHandle<T>>>,
}

pub struct PacketDispatcher<T> {
    max_cache_size: usize,
    cache: Mutex<VecDeque<T>>,
    readers: Mutex<Readers<T>>,
}

impl<T> PacketDispatcher<T> {
    /// `max_cache_size` is clamped to `[MIN_CACHE_SIZE, MAX_CACHE_SIZE]`
    pub fn new(max_cache_size: usize) -> Self {
        let max_cache_size = max_cache_size.clamp(MIN_CACHE_SIZE, MAX_CACHE_SIZE);
        Self {
            max_cache_size,
            cache: Mutex::new(VecDeque::with_capacity(max_cache_size)),
            readers: Mutex::new(Readers {
                fresh: Vec::new(),
                synced: Vec::new(),
            }),
        }
    }

    pub fn max_cache_size(&self) -> usize {
        self.max_cache_size
    }

    /// The reader receives the whole cache on the next distribute, then
    /// joins live delivery
    pub fn register_reader(&self, handle: Arc<SubscriberHandle<T>>) {
        let mut readers = self.readers.lock();
        if handle.is_registered() {
            tracing::warn!(reader = handle.id, "Reader already registered");
            return;
        }
        handle.set_registered(true);
        tracing::debug!(reader = handle.id, "Reader registered");
        readers.fresh.push(handle);
    }

    pub fn deregister_reader(&self, handle: &SubscriberHandle<T>) {
        let mut readers = self.readers.lock();
        readers.fresh.retain(|h| h.id != handle.id);
        readers.synced.retain(|h| h.id != handle.id);
        handle.set_registered(false);
        tracing::debug!(reader = handle.id, "Reader deregistered");
    }

    /// Drop every reader, invoking its detach callback first
    pub fn detach_all(&self, is_normal: bool) {
        let detached: Vec<_> = {
            let mut readers = self.readers.lock();
            let mut all = std::mem::take(&mut readers.synced);
            all.append(&mut readers.fresh);
            all
        };

        if !detached.is_empty() {
            tracing::debug!(readers = detached.len(), is_normal, "Detaching readers");
        }
        for handle in detached {
            handle.detach(is_normal);
            handle.set_registered(false);
        }
    }

    pub fn reader_count(&self) -> usize {
        let readers = self.readers.lock();
        readers.fresh.len() + readers.synced.len()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<T: Clone> PacketDispatcher<T> {
    pub fn distribute(&self, packet: T, is_keyframe: bool) {
        {
            let mut readers = self.readers.lock();
            readers.synced.retain(|h| prune_dead(h));
            for handle in &readers.synced {
                handle.read(&packet);
            }
        }

        {
            let mut cache = self.cache.lock();
            if is_keyframe {
                cache.clear();
            } else {
                while cache.len() >= self.max_cache_size {
                    cache.pop_front();
                }
            }
            cache.push_back(packet);
        }

        let cache = self.cache.lock();
        let mut readers = self.readers.lock();
        if readers.fresh.is_empty() {
            return;
        }
        let mut fresh = std::mem::take(&mut readers.fresh);
        fresh.retain(|h| prune_dead(h));
        for handle in &fresh {
            for packet in cache.iter() {
                handle.read(packet);
            }
        }
        readers.synced.append(&mut fresh);
    }

    /// Deliver to every registered reader without retaining the packet
    pub fn broadcast(&self, packet: &T) {
        let mut readers = self.readers.lock();
        readers.synced.retain(|h| prune_dead(h));
        readers.fresh.retain(|h| prune_dead(h));
        for handle in readers.synced.iter().chain(readers.fresh.iter()) {
            handle.read(packet);
        }
    }

    pub fn cache_snapshot(&self) -> Vec<T> {
        self.cache.lock().iter().cloned().collect()
    }
}

impl<T> Drop for PacketDispatcher<T> {
    fn drop(&mut self) {
        self.detach_all(false);
    }
}

impl<T> fmt::Debug for PacketDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketDispatcher")
            .field("max_cache_size", &self.max_cache_size)
            .field("cached", &self.cached_len())
            .field("readers", &self.reader_count())
            .finish()
    }
}

fn prune_dead<T>(handle: &SubscriberHandle<T>) -> bool {
    if handle.is_alive() {
        return true;
    }
    tracing::debug!(reader = handle.id, "Pruning reader with closed transport");
    handle.set_registered(false);
    false
}
