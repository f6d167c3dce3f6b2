//! H.264 track
//!
//! RTMP transports H.264 in AVCC format (length-prefixed NAL units). The
//! sequence header body is an AVCDecoderConfigurationRecord:
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```

use bytes::{Buf, Bytes};

use crate::error::{MediaError, Result};
use crate::media::track::AccessUnit;

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    Slice = 1,
    Idr = 5,
    Sei = 6,
    Sps = 7,
    Pps = 8,
    Aud = 9,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            _ => None,
        }
    }
}

/// AVC decoder configuration (from sequence header)
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, etc.)
    pub profile: u8,
    pub compatibility: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
    /// Bytes in each NALU length prefix
    pub nalu_length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
    pub raw: Bytes,
}

impl AvcConfig {
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 7 {
            return Err(MediaError::InvalidAvcConfig("shorter than 7 bytes").into());
        }

        let raw = data.clone();
        let mut data = data;

        if data.get_u8() != 1 {
            return Err(MediaError::InvalidAvcConfig("unknown configuration version").into());
        }

        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let sps = read_parameter_sets(&mut data, num_sps, "SPS truncated")?;

        if data.is_empty() {
            return Err(MediaError::InvalidAvcConfig("missing PPS count").into());
        }
        let num_pps = data.get_u8() as usize;
        let pps = read_parameter_sets(&mut data, num_pps, "PPS truncated")?;

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
            raw,
        })
    }

    pub fn profile_name(&self) -> &'static str {
        match self.profile {
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 => "High 10",
            122 => "High 4:2:2",
            244 => "High 4:4:4",
            _ => "Unknown",
        }
    }

    pub fn level_string(&self) -> String {
        format!("{}.{}", self.level / 10, self.level % 10)
    }
}

fn read_parameter_sets(data: &mut Bytes, count: usize, what: &'static str) -> Result<Vec<Bytes>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if data.len() < 2 {
            return Err(MediaError::InvalidAvcConfig(what).into());
        }
        let len = data.get_u16() as usize;
        if data.len() < len {
            return Err(MediaError::InvalidAvcConfig(what).into());
        }
        sets.push(data.copy_to_bytes(len));
    }
    Ok(sets)
}

#[derive(Debug)]
pub struct H264Track {
    pub(crate) bit_rate: u32,
    config: Option<AvcConfig>,
    pub(crate) frames: u64,
    keyframes: u64,
}

impl H264Track {
    pub fn new(bit_rate: u32) -> Self {
        Self {
            bit_rate,
            config: None,
            frames: 0,
            keyframes: 0,
        }
    }

    pub fn config(&self) -> Option<&AvcConfig> {
        self.config.as_ref()
    }

    pub fn parse_config(&mut self, data: Bytes) -> Result<()> {
        let config = AvcConfig::parse(data)?;
        tracing::debug!(
            profile = config.profile_name(),
            level = %config.level_string(),
            sps = config.sps.len(),
            pps = config.pps.len(),
            "AVC config"
        );
        self.config = Some(config);
        Ok(())
    }

    pub fn input_frame(&mut self, frame: AccessUnit) -> Result<()> {
        let Some(config) = &self.config else {
            return Err(MediaError::TrackNotConfigured("H264").into());
        };
        if frame.keyframe {
            self.keyframes += 1;
        } else if contains_idr(&frame.data, config.nalu_length_size) {
            tracing::trace!(timestamp = frame.timestamp, "IDR in frame not flagged as key");
        }
        self.frames += 1;
        Ok(())
    }

    pub fn keyframes(&self) -> u64 {
        self.keyframes
    }
}

/// Walk length-prefixed NAL units looking for an IDR slice
fn contains_idr(data: &Bytes, length_size: u8) -> bool {
    let length_size = length_size as usize;
    let mut pos = 0;
    while pos + length_size <= data.len() {
        let len = data[pos..pos + length_size]
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        pos += length_size;
        if len == 0 || pos + len > data.len() {
            break;
        }
        if NaluType::from_byte(data[pos]) == Some(NaluType::Idr) {
            return true;
        }
        pos += len;
    }
    false
}
