//! FLV tag headers carried at the front of RTMP audio/video payloads
//!
//! Video:
//! ```text
//! +----------+----------+---------------+-----------------+
//! |FrameType | CodecID  | AVCPacketType | CompositionTime | Data
//! | (4 bits) | (4 bits) | (1 byte)      | (3 bytes, SI24) |
//! +----------+----------+---------------+-----------------+
//! ```
//!
//! Audio:
//! ```text
//! +-----------+----------+----------+----------+---------------+
//! |SoundFormat|SoundRate |SoundSize |SoundType | AACPacketType | Data
//! | (4 bits)  | (2 bits) | (1 bit)  | (1 bit)  | (1 byte)      |
//! +-----------+----------+----------+----------+---------------+
//! ```
//!
//! The packet type byte and composition time are only present for AVC and
//! AAC payloads.

use crate::error::{MediaError, Result};
use crate::media::track::CodecId;

/// Video frame type (upper 4 bits of the first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    Keyframe = 1,
    InterFrame = 2,
    DisposableInterFrame = 3,
    GeneratedKeyframe = 4,
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// AVCPacketType / AACPacketType value of a sequence header
pub const PACKET_TYPE_SEQUENCE_HEADER: u8 = 0;
/// AVCPacketType value of an end-of-sequence marker
pub const PACKET_TYPE_END_OF_SEQUENCE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTagHeader {
    pub frame_type: Option<VideoFrameType>,
    pub codec_id: u8,
    /// Present for AVC payloads
    pub packet_type: Option<u8>,
    pub composition_time: i32,
}

impl VideoTagHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let Some(&first) = data.first() else {
            return Err(truncated("video", data));
        };
        let codec_id = first & 0x0F;
        let mut header = VideoTagHeader {
            frame_type: VideoFrameType::from_byte(first),
            codec_id,
            packet_type: None,
            composition_time: 0,
        };

        if codec_id == CodecId::H264.id() {
            if data.len() < 5 {
                return Err(truncated("video", data));
            }
            header.packet_type = Some(data[1]);
            // signed 24-bit
            let raw = (data[2] as i32) << 16 | (data[3] as i32) << 8 | data[4] as i32;
            header.composition_time = (raw << 8) >> 8;
        }
        Ok(header)
    }

    /// Bytes the tag header occupies at the front of the payload
    pub fn header_len(&self) -> usize {
        if self.packet_type.is_some() {
            5
        } else {
            1
        }
    }

    pub fn is_sequence_header(&self) -> bool {
        self.packet_type == Some(PACKET_TYPE_SEQUENCE_HEADER)
    }

    /// A keyframe that carries picture data
    pub fn is_keyframe(&self) -> bool {
        self.frame_type.is_some_and(|t| t.is_keyframe())
            && !self.is_sequence_header()
            && self.packet_type != Some(PACKET_TYPE_END_OF_SEQUENCE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTagHeader {
    pub sound_format: u8,
    pub stereo: bool,
    /// Present for AAC payloads
    pub packet_type: Option<u8>,
}

impl AudioTagHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let Some(&first) = data.first() else {
            return Err(truncated("audio", data));
        };
        let sound_format = first >> 4;
        let mut header = AudioTagHeader {
            sound_format,
            stereo: first & 0x01 != 0,
            packet_type: None,
        };

        if sound_format == CodecId::Aac.id() {
            if data.len() < 2 {
                return Err(truncated("audio", data));
            }
            header.packet_type = Some(data[1]);
        }
        Ok(header)
    }

    pub fn header_len(&self) -> usize {
        if self.packet_type.is_some() {
            2
        } else {
            1
        }
    }

    pub fn is_sequence_header(&self) -> bool {
        self.packet_type == Some(PACKET_TYPE_SEQUENCE_HEADER)
    }
}

fn truncated(kind: &'static str, data: &[u8]) -> crate::error::Error {
    MediaError::TruncatedTag {
        kind,
        len: data.len(),
    }
    .into()
}
