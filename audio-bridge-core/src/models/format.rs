use serde::{Deserialize, Serialize};

/// Sample encoding of one channel of one frame.
///
/// `Unknown` is only meaningful in requests ("use the default") and in
/// backend reports ("nothing negotiated"); an initialized session never
/// carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    #[default]
    Unknown,
    U8,
    S16,
    S24,
    S32,
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S24 => 3,
            Self::S32 | Self::F32 => 4,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Byte value that encodes silence in this format.
    ///
    /// Unsigned 8-bit audio is centered on 0x80; every signed and float
    /// format is silent at all-zero bytes.
    pub fn silence_byte(self) -> u8 {
        match self {
            Self::U8 => 0x80,
            _ => 0,
        }
    }

    /// Fill `bytes` with silence in this format.
    pub fn fill_silence(self, bytes: &mut [u8]) {
        bytes.fill(self.silence_byte());
    }
}

/// Direction of audio flow through a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Frames flow from the device into the application (microphone).
    Capture,
    /// Frames flow from the application to the device (speaker).
    Playback,
}

impl Direction {
    /// Channel count used when the caller leaves it unspecified.
    pub fn default_channels(self) -> u32 {
        match self {
            Self::Capture => 1,
            Self::Playback => 2,
        }
    }
}

/// Negotiated stream layout of a session. Fixed for the life of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamFormat {
    pub format: SampleFormat,
    pub channels: u32,
    pub sample_rate: u32,
}

impl StreamFormat {
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_frame() {
        let stereo_f32 = StreamFormat {
            format: SampleFormat::F32,
            channels: 2,
            sample_rate: 48000,
        };
        assert_eq!(stereo_f32.bytes_per_frame(), 8);

        let mono_s24 = StreamFormat {
            format: SampleFormat::S24,
            channels: 1,
            sample_rate: 44100,
        };
        assert_eq!(mono_s24.bytes_per_frame(), 3);
    }

    #[test]
    fn unsigned_silence_is_midpoint() {
        let mut bytes = [0u8; 4];
        SampleFormat::U8.fill_silence(&mut bytes);
        assert_eq!(bytes, [0x80; 4]);

        let mut bytes = [0xAAu8; 8];
        SampleFormat::F32.fill_silence(&mut bytes);
        assert_eq!(bytes, [0; 8]);
    }

    #[test]
    fn default_channels_per_direction() {
        assert_eq!(Direction::Capture.default_channels(), 1);
        assert_eq!(Direction::Playback.default_channels(), 2);
    }

    #[test]
    fn format_serializes_lowercase() {
        let json = serde_json::to_string(&SampleFormat::F32).unwrap();
        assert_eq!(json, "\"f32\"");
        let parsed: SampleFormat = serde_json::from_str("\"s16\"").unwrap();
        assert_eq!(parsed, SampleFormat::S16);
    }
}
