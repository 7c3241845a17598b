use serde::{Deserialize, Serialize};

use super::format::SampleFormat;

/// Lowest sample rate a session may request.
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Highest sample rate a session may request.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Highest channel count a session may request.
pub const MAX_CHANNELS: u32 = 254;

/// Requested parameters for a capture or playback session.
///
/// Zero and `SampleFormat::Unknown` mean "let the factory pick": the default
/// format is `F32`, the default channel count depends on the direction, the
/// sample rate falls back to whatever the backend negotiates, and the buffer
/// size is derived from the negotiated rate and period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Requested sample rate in Hz (0 = device native).
    pub sample_rate: u32,

    /// Requested channel count (0 = 1 for capture, 2 for playback).
    pub channels: u32,

    /// Requested sample format (`Unknown` = `F32`).
    pub format: SampleFormat,

    /// Ring buffer capacity in frames (0 = derived from the device period).
    pub buffer_size_in_frames: u32,
}

impl SessionConfig {
    pub fn new(sample_rate: u32, channels: u32, format: SampleFormat, buffer_size_in_frames: u32) -> Self {
        Self {
            sample_rate,
            channels,
            format,
            buffer_size_in_frames,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate != 0 && !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(format!(
                "unsupported sample rate: {} (expected {}..={} Hz)",
                self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            ));
        }
        if self.channels > MAX_CHANNELS {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        Ok(())
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("invalid session config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_all_unspecified() {
        let config = SessionConfig::default();
        assert_eq!(config.sample_rate, 0);
        assert_eq!(config.channels, 0);
        assert_eq!(config.format, SampleFormat::Unknown);
        assert_eq!(config.buffer_size_in_frames, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_sample_rate() {
        let config = SessionConfig::new(4000, 1, SampleFormat::F32, 0);
        assert!(config.validate().unwrap_err().contains("sample rate"));

        let config = SessionConfig::new(400_000, 1, SampleFormat::F32, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_too_many_channels() {
        let config = SessionConfig::new(48000, 255, SampleFormat::F32, 0);
        assert!(config.validate().unwrap_err().contains("channel"));
    }

    #[test]
    fn parses_partial_json() {
        let config = SessionConfig::from_json(r#"{ "sample_rate": 44100, "format": "s16" }"#).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.format, SampleFormat::S16);
        assert_eq!(config.channels, 0);
        assert_eq!(config.buffer_size_in_frames, 0);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(SessionConfig::from_json("{ sample_rate: }").is_err());
    }
}
