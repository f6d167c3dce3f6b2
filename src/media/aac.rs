//! AAC track
//!
//! RTMP carries raw AAC frames; the sequence header body is the
//! AudioSpecificConfig:
//! ```text
//! audioObjectType (5 bits) | samplingFrequencyIndex (4 bits)
//! | [samplingFrequency (24 bits) if index == 0xF] | channelConfiguration (4 bits)
//! ```

use bytes::Bytes;

use crate::error::{MediaError, Result};
use crate::media::track::AccessUnit;

const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub audio_object_type: u8,
    pub sampling_frequency_index: u8,
    pub sampling_frequency: u32,
    pub channel_configuration: u8,
    pub raw: Bytes,
}

impl AudioSpecificConfig {
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacConfig("shorter than 2 bytes").into());
        }

        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        if audio_object_type == 0 {
            return Err(MediaError::InvalidAacConfig("null object type").into());
        }
        let sampling_frequency_index = ((b0 & 0x07) << 1) | (b1 >> 7);

        let (sampling_frequency, channel_configuration) = if sampling_frequency_index == 0x0F {
            // explicit 24-bit frequency follows the index
            if data.len() < 5 {
                return Err(MediaError::InvalidAacConfig("explicit frequency truncated").into());
            }
            let f = ((data[1] & 0x7F) as u32) << 17
                | (data[2] as u32) << 9
                | (data[3] as u32) << 1
                | (data[4] >> 7) as u32;
            (f, (data[4] >> 3) & 0x0F)
        } else {
            let f = SAMPLING_FREQUENCIES
                .get(sampling_frequency_index as usize)
                .copied()
                .ok_or(MediaError::InvalidAacConfig("reserved sampling frequency index"))?;
            (f, (b1 & 0x78) >> 3)
        };

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            raw: data,
        })
    }

    pub fn channels(&self) -> u8 {
        match self.channel_configuration {
            7 => 8,
            n => n,
        }
    }
}

#[derive(Debug)]
pub struct AacTrack {
    pub(crate) bit_rate: u32,
    config: Option<AudioSpecificConfig>,
    pub(crate) frames: u64,
    bytes: u64,
}

impl AacTrack {
    pub fn new(bit_rate: u32) -> Self {
        Self {
            bit_rate,
            config: None,
            frames: 0,
            bytes: 0,
        }
    }

    pub fn config(&self) -> Option<&AudioSpecificConfig> {
        self.config.as_ref()
    }

    pub fn parse_config(&mut self, data: Bytes) -> Result<()> {
        let config = AudioSpecificConfig::parse(data)?;
        tracing::debug!(
            object_type = config.audio_object_type,
            sample_rate = config.sampling_frequency,
            channels = config.channels(),
            "AAC config"
        );
        self.config = Some(config);
        Ok(())
    }

    pub fn input_frame(&mut self, frame: AccessUnit) -> Result<()> {
        if self.config.is_none() {
            return Err(MediaError::TrackNotConfigured("AAC").into());
        }
        self.frames += 1;
        self.bytes += frame.data.len() as u64;
        Ok(())
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}
