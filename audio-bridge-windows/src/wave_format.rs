//! Stream layout for shared-mode `IAudioClient::Initialize`.

use audio_bridge_core::SampleFormat;

pub const WAVE_FORMAT_PCM: u16 = 1;
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;

/// Reference time units (100 ns) per second.
pub const REFTIMES_PER_SEC: i64 = 10_000_000;

/// Fields of a `WAVEFORMATEX` describing an interleaved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveLayout {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WaveLayout {
    /// Layout for `format` at `channels` x `sample_rate`. `None` for
    /// `Unknown` or a channel count a `WAVEFORMATEX` cannot express.
    pub fn new(format: SampleFormat, channels: u32, sample_rate: u32) -> Option<Self> {
        let format_tag = match format {
            SampleFormat::Unknown => return None,
            SampleFormat::F32 => WAVE_FORMAT_IEEE_FLOAT,
            _ => WAVE_FORMAT_PCM,
        };
        let channels = u16::try_from(channels).ok().filter(|&c| c > 0)?;
        let block_align = u16::try_from(format.bytes_per_sample() * channels as usize).ok()?;
        Some(Self {
            format_tag,
            channels,
            samples_per_sec: sample_rate,
            avg_bytes_per_sec: sample_rate.checked_mul(block_align as u32)?,
            block_align,
            bits_per_sample: (format.bytes_per_sample() * 8) as u16,
        })
    }
}

/// Frames covered by a device period given in 100 ns units.
pub fn period_in_frames(sample_rate: u32, period: i64) -> u32 {
    if period <= 0 {
        return 0;
    }
    (sample_rate as i64 * period / REFTIMES_PER_SEC) as u32
}
