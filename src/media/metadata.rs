//! Stream metadata sent by the publisher via `onMetaData`

use crate::amf::{AmfObject, AmfValue};
use crate::error::{MediaError, Result};

/// Typed view over the metadata map.
///
/// Unknown keys stay available through [`StreamMetadata::properties`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMetadata {
    pub duration: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub framerate: Option<f64>,
    /// FLV video codec id, 0 when the stream has no video
    pub video_codec_id: u8,
    /// kbit/s
    pub video_data_rate: f64,
    /// FLV sound format, 0 when the stream has no audio
    pub audio_codec_id: u8,
    /// kbit/s
    pub audio_data_rate: f64,
    pub audio_sample_rate: f64,
    pub audio_sample_size: f64,
    pub stereo: bool,
    properties: AmfObject,
}

impl StreamMetadata {
    pub fn from_amf(map: &AmfObject) -> Result<Self> {
        if map.is_empty() {
            return Err(MediaError::EmptyMetadata.into());
        }

        let number = |key: &str| map.get(key).and_then(AmfValue::as_number);

        Ok(StreamMetadata {
            duration: number("duration").unwrap_or(0.0),
            width: number("width"),
            height: number("height"),
            framerate: number("framerate"),
            video_codec_id: codec_id(map.get("videocodecid")),
            video_data_rate: number("videodatarate").unwrap_or(0.0),
            audio_codec_id: codec_id(map.get("audiocodecid")),
            audio_data_rate: number("audiodatarate").unwrap_or(0.0),
            audio_sample_rate: number("audiosamplerate").unwrap_or(0.0),
            audio_sample_size: number("audiosamplesize").unwrap_or(0.0),
            stereo: map.get("stereo").and_then(AmfValue::as_bool).unwrap_or(false),
            properties: map.clone(),
        })
    }

    pub fn has_video(&self) -> bool {
        self.video_codec_id != 0
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec_id != 0
    }

    pub fn audio_channels(&self) -> u8 {
        if self.stereo {
            2
        } else {
            1
        }
    }

    /// Announced video bitrate in bits per second
    pub fn video_bit_rate(&self) -> u32 {
        (self.video_data_rate as u32).saturating_mul(1024)
    }

    pub fn audio_bit_rate(&self) -> u32 {
        (self.audio_data_rate as u32).saturating_mul(1024)
    }

    pub fn properties(&self) -> &AmfObject {
        &self.properties
    }
}

// Some encoders send the fourcc instead of the numeric FLV id
fn codec_id(value: Option<&AmfValue>) -> u8 {
    match value {
        Some(AmfValue::Number(n)) => *n as u8,
        Some(AmfValue::String(s)) => match s.as_str() {
            "avc1" => 7,
            "mp4a" => 10,
            _ => 0xFF,
        },
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs_metadata() -> AmfObject {
        let mut map = AmfObject::new();
        map.insert("duration".into(), 0.0.into());
        map.insert("width".into(), 1280.0.into());
        map.insert("height".into(), 720.0.into());
        map.insert("videodatarate".into(), 2500.0.into());
        map.insert("framerate".into(), 30.0.into());
        map.insert("videocodecid".into(), 7.0.into());
        map.insert("audiodatarate".into(), 160.0.into());
        map.insert("audiosamplerate".into(), 48000.0.into());
        map.insert("audiosamplesize".into(), 16.0.into());
        map.insert("stereo".into(), true.into());
        map.insert("audiocodecid".into(), 10.0.into());
        map.insert("encoder".into(), "obs-output module".into());
        map
    }

    #[test]
    fn test_from_amf() {
        let meta = StreamMetadata::from_amf(&obs_metadata()).unwrap();
        assert!(meta.has_video());
        assert!(meta.has_audio());
        assert_eq!(meta.video_codec_id, 7);
        assert_eq!(meta.audio_codec_id, 10);
        assert_eq!(meta.video_bit_rate(), 2500 * 1024);
        assert_eq!(meta.audio_bit_rate(), 160 * 1024);
        assert_eq!(meta.audio_channels(), 2);
        assert_eq!(meta.width, Some(1280.0));
        assert_eq!(
            meta.properties().get("encoder").and_then(AmfValue::as_str),
            Some("obs-output module")
        );
    }

    #[test]
    fn test_empty_metadata() {
        assert!(StreamMetadata::from_amf(&AmfObject::new()).is_err());
    }

    #[test]
    fn test_audio_only() {
        let mut map = AmfObject::new();
        map.insert("audiocodecid".into(), "mp4a".into());
        let meta = StreamMetadata::from_amf(&map).unwrap();
        assert!(!meta.has_video());
        assert_eq!(meta.audio_codec_id, 10);
        assert_eq!(meta.audio_channels(), 1);
    }
}
