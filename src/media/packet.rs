//! Media packets handed to the dispatcher

use bytes::Bytes;

use crate::media::track::CodecId;
use crate::protocol::constants::{MSG_AUDIO, MSG_VIDEO};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Audio,
    Video,
}

impl PacketKind {
    pub fn type_id(&self) -> u8 {
        match self {
            PacketKind::Audio => MSG_AUDIO,
            PacketKind::Video => MSG_VIDEO,
        }
    }
}

/// One audio or video message as received from the publisher.
///
/// `payload` keeps the FLV tag header so egress paths can re-mux without
/// re-encoding. Cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPacket {
    pub kind: PacketKind,
    pub codec: CodecId,
    pub timestamp: u32,
    pub payload: Bytes,
    /// Video frame that starts a decodable run
    pub keyframe: bool,
    /// Codec sequence header
    pub config: bool,
}

impl MediaPacket {
    pub fn is_video(&self) -> bool {
        self.kind == PacketKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind == PacketKind::Audio
    }

    pub fn type_id(&self) -> u8 {
        self.kind.type_id()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
