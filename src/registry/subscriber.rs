//! Channel-backed subscriptions to a media source

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, watch};

use super::dispatcher::SubscriberHandle;
use super::source::MediaSource;
use crate::media::MediaPacket;

/// Packets of one source, delivered through a bounded queue.
///
/// Dropping the subscription deregisters it from the source's dispatcher.
pub struct Subscription {
    packets: mpsc::Receiver<MediaPacket>,
    detached: watch::Receiver<Option<bool>>,
    handle: Arc<SubscriberHandle<MediaPacket>>,
    source: Weak<MediaSource>,
}

impl Subscription {
    pub(crate) fn new(
        packets: mpsc::Receiver<MediaPacket>,
        detached: watch::Receiver<Option<bool>>,
        handle: Arc<SubscriberHandle<MediaPacket>>,
        source: Weak<MediaSource>,
    ) -> Self {
        Self {
            packets,
            detached,
            handle,
            source,
        }
    }

    /// Next packet, or `None` once the source detached this subscriber and
    /// the queue is drained
    pub async fn recv(&mut self) -> Option<MediaPacket> {
        if let Ok(packet) = self.packets.try_recv() {
            return Some(packet);
        }
        if self.detach_reason().is_some() {
            return None;
        }
        tokio::select! {
            packet = self.packets.recv() => packet,
            _ = self.detached.changed() => self.packets.try_recv().ok(),
        }
    }

    pub fn try_recv(&mut self) -> Option<MediaPacket> {
        self.packets.try_recv().ok()
    }

    /// `Some(true)` after the publisher stopped normally, `Some(false)` after
    /// an abnormal teardown
    pub fn detach_reason(&self) -> Option<bool> {
        *self.detached.borrow()
    }

    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    pub fn is_registered(&self) -> bool {
        self.handle.is_registered()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.handle.is_registered() {
            return;
        }
        if let Some(source) = self.source.upgrade() {
            source.dispatcher().deregister_reader(&self.handle);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("handle", &self.handle)
            .field("detached", &self.detach_reason())
            .finish()
    }
}
