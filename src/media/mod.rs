//! Media handling for RTMP
//!
//! This module provides:
//! - FLV tag header parsing for audio/video payloads
//! - H.264 and AAC track collaborators
//! - Metadata parsing and the per-source demuxer

pub mod aac;
pub mod demuxer;
pub mod flv;
pub mod h264;
pub mod metadata;
pub mod packet;
pub mod track;

pub use demuxer::RtmpDemuxer;
pub use metadata::StreamMetadata;
pub use packet::{MediaPacket, PacketKind};
pub use track::{AccessUnit, CodecId, Track};
