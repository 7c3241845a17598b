//! Data callbacks that run on the backend's realtime thread.
//!
//! Each handler owns the device-side half of the session's ring buffer. The
//! only shared state besides the ring is a relaxed counter, so a callback
//! never waits on the application thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::models::format::SampleFormat;
use crate::processing::ring_buffer::{FrameConsumer, FrameProducer};
use crate::traits::backend::DataCallback;

/// Moves captured frames into the ring, dropping whatever does not fit.
pub(crate) struct CaptureHandler {
    producer: FrameProducer,
    dropped_frames: Arc<AtomicU64>,
}

impl CaptureHandler {
    pub(crate) fn new(producer: FrameProducer, dropped_frames: Arc<AtomicU64>) -> Self {
        Self {
            producer,
            dropped_frames,
        }
    }
}

impl DataCallback for CaptureHandler {
    fn process(&mut self, _output: Option<&mut [u8]>, input: Option<&[u8]>, frame_count: u32) {
        let Some(input) = input else {
            return;
        };
        let frame_size = self.producer.frame_size();
        let frames = (frame_count as usize).min(input.len() / frame_size);
        if frames == 0 {
            return;
        }

        let written = self.producer.push_frames(&input[..frames * frame_size]);
        if written < frames {
            self.dropped_frames
                .fetch_add((frames - written) as u64, Ordering::Relaxed);
        }
    }
}

/// Fills the device's output from the ring, padding with silence on underrun.
pub(crate) struct PlaybackHandler {
    consumer: FrameConsumer,
    format: SampleFormat,
    underrun_frames: Arc<AtomicU64>,
}

impl PlaybackHandler {
    pub(crate) fn new(consumer: FrameConsumer, format: SampleFormat, underrun_frames: Arc<AtomicU64>) -> Self {
        Self {
            consumer,
            format,
            underrun_frames,
        }
    }
}

impl DataCallback for PlaybackHandler {
    fn process(&mut self, output: Option<&mut [u8]>, _input: Option<&[u8]>, frame_count: u32) {
        let Some(output) = output else {
            return;
        };
        let frame_size = self.consumer.frame_size();
        let frames = (frame_count as usize).min(output.len() / frame_size);

        let read = self.consumer.pop_frames(&mut output[..frames * frame_size]);
        self.format.fill_silence(&mut output[read * frame_size..]);
        if read < frames {
            self.underrun_frames
                .fetch_add((frames - read) as u64, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::ring_buffer::frame_ring_buffer;

    #[test]
    fn capture_drops_overflow_and_counts_it() {
        let (producer, mut consumer) = frame_ring_buffer(2, 4).unwrap();
        let dropped = Arc::new(AtomicU64::new(0));
        let mut handler = CaptureHandler::new(producer, Arc::clone(&dropped));

        let input: Vec<u8> = (0..12).collect();
        handler.process(None, Some(&input), 6);

        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        let mut out = [0u8; 8];
        assert_eq!(consumer.pop_frames(&mut out), 4);
        assert_eq!(out, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn capture_ignores_missing_input() {
        let (producer, consumer) = frame_ring_buffer(2, 4).unwrap();
        let mut handler = CaptureHandler::new(producer, Arc::new(AtomicU64::new(0)));
        handler.process(None, None, 4);
        assert_eq!(consumer.available_read(), 0);
    }

    #[test]
    fn capture_never_reads_past_input() {
        let (producer, consumer) = frame_ring_buffer(2, 8).unwrap();
        let mut handler = CaptureHandler::new(producer, Arc::new(AtomicU64::new(0)));
        handler.process(None, Some(&[1, 2, 3, 4]), 8);
        assert_eq!(consumer.available_read(), 2);
    }

    #[test]
    fn playback_pads_underrun_with_silence() {
        let (mut producer, consumer) = frame_ring_buffer(4, 8).unwrap();
        producer.push_frames(&[1, 1, 1, 1, 2, 2, 2, 2]);
        let underruns = Arc::new(AtomicU64::new(0));
        let mut handler = PlaybackHandler::new(consumer, SampleFormat::F32, Arc::clone(&underruns));

        let mut output = [0xAAu8; 16];
        handler.process(Some(&mut output), None, 4);

        assert_eq!(&output[..8], &[1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(&output[8..], &[0u8; 8]);
        assert_eq!(underruns.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn playback_silence_for_unsigned_format() {
        let (_producer, consumer) = frame_ring_buffer(2, 4).unwrap();
        let mut handler = PlaybackHandler::new(consumer, SampleFormat::U8, Arc::new(AtomicU64::new(0)));

        let mut output = [0u8; 4];
        handler.process(Some(&mut output), None, 2);
        assert_eq!(output, [0x80; 4]);
    }
}
