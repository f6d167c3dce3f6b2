//! Track collaborators
//!
//! A track is selected once from the negotiated codec id and then fed the
//! codec config and access units of its elementary stream. Only H.264 video
//! and AAC audio are accepted.

use bytes::Bytes;

use crate::error::{MediaError, Result};
use crate::media::aac::AacTrack;
use crate::media::h264::H264Track;

/// FLV codec ids understood by the ingest path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    H264,
    Aac,
}

impl CodecId {
    pub fn id(&self) -> u8 {
        match self {
            CodecId::H264 => 7,
            CodecId::Aac => 10,
        }
    }

    pub fn from_video_id(id: u8) -> Result<Self> {
        match id {
            7 => Ok(CodecId::H264),
            other => Err(MediaError::UnsupportedVideoCodec(other).into()),
        }
    }

    pub fn from_audio_id(id: u8) -> Result<Self> {
        match id {
            10 => Ok(CodecId::Aac),
            other => Err(MediaError::UnsupportedAudioCodec(other).into()),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, CodecId::H264)
    }
}

/// One coded frame with its FLV tag header stripped
#[derive(Debug, Clone)]
pub struct AccessUnit {
    /// Decode timestamp in milliseconds
    pub timestamp: u32,
    /// Presentation offset from the decode timestamp
    pub composition_time: i32,
    pub keyframe: bool,
    pub data: Bytes,
}

#[derive(Debug)]
pub enum Track {
    H264(H264Track),
    Aac(AacTrack),
}

impl Track {
    pub fn new(codec: CodecId, bit_rate: u32) -> Self {
        match codec {
            CodecId::H264 => Track::H264(H264Track::new(bit_rate)),
            CodecId::Aac => Track::Aac(AacTrack::new(bit_rate)),
        }
    }

    /// Feed the codec configuration (sequence header body)
    pub fn parse_config(&mut self, config: Bytes) -> Result<()> {
        match self {
            Track::H264(t) => t.parse_config(config),
            Track::Aac(t) => t.parse_config(config),
        }
    }

    pub fn input_frame(&mut self, frame: AccessUnit) -> Result<()> {
        match self {
            Track::H264(t) => t.input_frame(frame),
            Track::Aac(t) => t.input_frame(frame),
        }
    }

    pub fn codec_id(&self) -> CodecId {
        match self {
            Track::H264(_) => CodecId::H264,
            Track::Aac(_) => CodecId::Aac,
        }
    }

    /// Bits per second announced by the publisher
    pub fn bit_rate(&self) -> u32 {
        match self {
            Track::H264(t) => t.bit_rate,
            Track::Aac(t) => t.bit_rate,
        }
    }

    pub fn is_configured(&self) -> bool {
        match self {
            Track::H264(t) => t.config().is_some(),
            Track::Aac(t) => t.config().is_some(),
        }
    }

    pub fn frames(&self) -> u64 {
        match self {
            Track::H264(t) => t.frames,
            Track::Aac(t) => t.frames,
        }
    }
}
