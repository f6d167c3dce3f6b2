//! RTMP audio/video demultiplexing into tracks
//!
//! Tracks are created from the publisher's metadata when it arrives first,
//! otherwise lazily from the codec id in the first tag header of each kind.

use crate::error::{Error, Result};
use crate::media::flv::{AudioTagHeader, VideoTagHeader, PACKET_TYPE_END_OF_SEQUENCE};
use crate::media::metadata::StreamMetadata;
use crate::media::packet::{MediaPacket, PacketKind};
use crate::media::track::{AccessUnit, CodecId, Track};
use crate::protocol::constants::{MSG_AUDIO, MSG_VIDEO};
use crate::protocol::message::RtmpMessage;

#[derive(Debug, Default)]
pub struct RtmpDemuxer {
    video: Option<Track>,
    audio: Option<Track>,
    duration: f64,
}

impl RtmpDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_tracks(&mut self, metadata: &StreamMetadata) -> Result<()> {
        self.duration = metadata.duration;
        if metadata.has_video() {
            self.init_video_track(metadata.video_codec_id, metadata.video_bit_rate())?;
        }
        if metadata.has_audio() {
            self.init_audio_track(metadata.audio_codec_id, metadata.audio_bit_rate())?;
        }
        Ok(())
    }

    /// Existing tracks are kept, later announcements do not replace them
    fn init_video_track(&mut self, codec_id: u8, bit_rate: u32) -> Result<&mut Track> {
        match &mut self.video {
            Some(track) => Ok(track),
            slot => {
                let codec = CodecId::from_video_id(codec_id)?;
                tracing::debug!(?codec, bit_rate, "Video track created");
                Ok(slot.insert(Track::new(codec, bit_rate)))
            }
        }
    }

    fn init_audio_track(&mut self, codec_id: u8, bit_rate: u32) -> Result<&mut Track> {
        match &mut self.audio {
            Some(track) => Ok(track),
            slot => {
                let codec = CodecId::from_audio_id(codec_id)?;
                tracing::debug!(?codec, bit_rate, "Audio track created");
                Ok(slot.insert(Track::new(codec, bit_rate)))
            }
        }
    }

    pub fn video_track(&self) -> Option<&Track> {
        self.video.as_ref()
    }

    pub fn audio_track(&self) -> Option<&Track> {
        self.audio.as_ref()
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Feed one audio or video message through its track
    pub fn input(&mut self, msg: &RtmpMessage) -> Result<MediaPacket> {
        match msg.type_id {
            MSG_VIDEO => self.input_video(msg),
            MSG_AUDIO => self.input_audio(msg),
            _ => Err(Error::NotMedia(msg.type_id)),
        }
    }

    fn input_video(&mut self, msg: &RtmpMessage) -> Result<MediaPacket> {
        let header = VideoTagHeader::parse(&msg.payload)?;
        let track = self.init_video_track(header.codec_id, 0)?;

        let body = msg.payload.slice(header.header_len()..);
        if header.is_sequence_header() {
            track.parse_config(body)?;
        } else if header.packet_type != Some(PACKET_TYPE_END_OF_SEQUENCE) {
            track.input_frame(AccessUnit {
                timestamp: msg.timestamp,
                composition_time: header.composition_time,
                keyframe: header.is_keyframe(),
                data: body,
            })?;
        }

        Ok(MediaPacket {
            kind: PacketKind::Video,
            codec: track.codec_id(),
            timestamp: msg.timestamp,
            payload: msg.payload.clone(),
            keyframe: header.is_keyframe(),
            config: header.is_sequence_header(),
        })
    }

    fn input_audio(&mut self, msg: &RtmpMessage) -> Result<MediaPacket> {
        let header = AudioTagHeader::parse(&msg.payload)?;
        let track = self.init_audio_track(header.sound_format, 0)?;

        let body = msg.payload.slice(header.header_len()..);
        if header.is_sequence_header() {
            track.parse_config(body)?;
        } else {
            track.input_frame(AccessUnit {
                timestamp: msg.timestamp,
                composition_time: 0,
                keyframe: false,
                data: body,
            })?;
        }

        Ok(MediaPacket {
            kind: PacketKind::Audio,
            codec: track.codec_id(),
            timestamp: msg.timestamp,
            payload: msg.payload.clone(),
            keyframe: false,
            config: header.is_sequence_header(),
        })
    }
}
