//! Live media sources
//!
//! A [`MediaSource`] is created by the first successful `publish` for a key
//! and shared with every subscriber through the [`Registry`]. Only the
//! holder of its [`Ownership`] may feed it packets.
//!
//! [`Registry`]: super::Registry

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use super::dispatcher::{PacketDispatcher, SubscriberHandle};
use super::key::MediaKey;
use super::subscriber::Subscription;
use crate::error::Result;
use crate::media::{MediaPacket, PacketKind, RtmpDemuxer, StreamMetadata};
use crate::protocol::message::RtmpMessage;

pub struct MediaSource {
    key: MediaKey,
    demuxer: Mutex<RtmpDemuxer>,
    metadata: RwLock<Option<StreamMetadata>>,
    /// Latest sequence header per media kind
    config_frames: RwLock<IndexMap<PacketKind, MediaPacket>>,
    dispatcher: PacketDispatcher<MediaPacket>,
    owned: AtomicBool,
    registered: AtomicBool,
}

impl MediaSource {
    pub fn new(key: MediaKey, cache_size: usize) -> Self {
        Self {
            key,
            demuxer: Mutex::new(RtmpDemuxer::new()),
            metadata: RwLock::new(None),
            config_frames: RwLock::new(IndexMap::new()),
            dispatcher: PacketDispatcher::new(cache_size),
            owned: AtomicBool::new(false),
            registered: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &MediaKey {
        &self.key
    }

    /// Take the single publishing capability, `None` while another holder
    /// has it
    pub fn get_ownership(self: &Arc<Self>) -> Option<Ownership> {
        if self.owned.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Ownership {
            source: Arc::downgrade(self),
        })
    }

    pub fn is_owned(&self) -> bool {
        self.owned.load(Ordering::Acquire)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    /// Initialize tracks from the publisher's metadata
    pub fn set_metadata(&self, metadata: StreamMetadata) -> Result<()> {
        self.demuxer.lock().init_tracks(&metadata)?;
        tracing::debug!(
            stream = %self.key,
            video = metadata.video_codec_id,
            audio = metadata.audio_codec_id,
            "Metadata received"
        );
        *self.metadata.write() = Some(metadata);
        Ok(())
    }

    pub fn metadata(&self) -> Option<StreamMetadata> {
        self.metadata.read().clone()
    }

    /// Sequence headers a new subscriber needs before live packets
    pub fn config_frames(&self) -> Vec<MediaPacket> {
        self.config_frames.read().values().cloned().collect()
    }

    pub fn dispatcher(&self) -> &PacketDispatcher<MediaPacket> {
        &self.dispatcher
    }

    /// Run an audio/video message through the demuxer and fan it out
    pub fn input_packet(&self, msg: &RtmpMessage) -> Result<()> {
        let packet = self.demuxer.lock().input(msg)?;

        if packet.config {
            tracing::debug!(stream = %self.key, kind = ?packet.kind, "Sequence header updated");
            // held across the broadcast so subscribe() sees it exactly once
            let mut config_frames = self.config_frames.write();
            config_frames.insert(packet.kind, packet.clone());
            self.dispatcher.broadcast(&packet);
            return Ok(());
        }

        let keyframe = packet.keyframe;
        self.dispatcher.distribute(packet, keyframe);
        Ok(())
    }

    /// Register a channel-backed reader tied to `transport`'s lifetime
    pub fn subscribe<S>(self: &Arc<Self>, transport: &Arc<S>, queue_depth: usize) -> Subscription
    where
        S: Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let primer = tx.clone();
        let (detach_tx, detach_rx) = watch::channel(None);

        let key = self.key.clone();
        let handle = SubscriberHandle::new(transport, move |packet: &MediaPacket| {
            if let Err(TrySendError::Full(_)) = tx.try_send(packet.clone()) {
                tracing::warn!(stream = %key, "Subscriber queue full, dropping packet");
            }
        })
        .with_detach(move |is_normal| {
            detach_tx.send_replace(Some(is_normal));
        });
        let handle = Arc::new(handle);

        // priming and registration under one read lock, so a header update
        // lands either in the primed set or in a broadcast to this reader
        {
            let config_frames = self.config_frames.read();
            for frame in config_frames.values() {
                if primer.try_send(frame.clone()).is_err() {
                    break;
                }
            }
            self.dispatcher.register_reader(Arc::clone(&handle));
        }
        tracing::info!(stream = %self.key, subscriber = handle.id(), "Subscriber added");

        Subscription::new(rx, detach_rx, handle, Arc::downgrade(self))
    }
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSource")
            .field("key", &self.key)
            .field("owned", &self.is_owned())
            .field("registered", &self.is_registered())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Exclusive right to publish into a [`MediaSource`].
///
/// Dropping it makes the source available to the next publisher.
#[derive(Debug)]
pub struct Ownership {
    source: Weak<MediaSource>,
}

impl Ownership {
    pub fn source(&self) -> Option<Arc<MediaSource>> {
        self.source.upgrade()
    }

    pub fn release(self) {}
}

impl Drop for Ownership {
    fn drop(&mut self) {
        if let Some(source) = self.source.upgrade() {
            source.owned.store(false, Ordering::Release);
            tracing::debug!(stream = %source.key, "Ownership released");
        }
    }
}
