use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::Pod;

use crate::models::error::ErrorCode;
use crate::models::format::{SampleFormat, StreamFormat};
use crate::models::state::SessionState;
use crate::processing::ring_buffer::{frame_ring_buffer, FrameProducer};

use super::core::SessionCore;
use super::realtime::PlaybackHandler;

/// Speaker session: the application writes frames, the backend plays them.
///
/// When the buffer runs dry the device plays silence.
pub struct PlaybackSession {
    producer: FrameProducer,
    underrun_frames: Arc<AtomicU64>,
    core: SessionCore,
}

impl PlaybackSession {
    pub(crate) fn new(producer: FrameProducer, underrun_frames: Arc<AtomicU64>, core: SessionCore) -> Self {
        Self {
            producer,
            underrun_frames,
            core,
        }
    }

    pub fn start(&mut self) -> Result<(), ErrorCode> {
        self.core.start()
    }

    pub fn stop(&mut self) -> Result<(), ErrorCode> {
        self.core.stop()
    }

    /// Queue up to `frame_count` frames from `frames` for playback.
    ///
    /// Returns the number of frames accepted, which is short when the buffer
    /// fills up. Invalid arguments record `InvalidArgs` and return 0.
    pub fn write(&mut self, frames: &[u8], frame_count: usize) -> usize {
        if !self.core.check_io_request(frames.len(), frame_count, "write") {
            return 0;
        }
        let frame_size = self.producer.frame_size();
        let written = self.producer.push_frames(&frames[..frame_count * frame_size]);
        self.core.set_success();
        written
    }

    /// Typed variant of [`write`](Self::write).
    pub fn write_samples<T: Pod>(&mut self, samples: &[T]) -> usize {
        if !self.core.check_sample_width(std::mem::size_of::<T>()) {
            return 0;
        }
        let frame_count = samples.len() / self.channels() as usize;
        self.write(bytemuck::cast_slice(samples), frame_count)
    }

    /// Free space in frames right now. Advisory: the callback may drain more
    /// immediately after.
    pub fn available_frames(&self) -> usize {
        self.producer.available_write()
    }

    /// Discard all queued frames.
    ///
    /// While stopped the device gets a fresh empty buffer on the spot. While
    /// running the device-side reader drops the queued frames on its next
    /// callback; frames written after this call are kept.
    pub fn flush(&mut self) {
        if self.core.state().is_running() {
            self.producer.request_discard();
            self.core.set_success();
            log::debug!("playback session flush requested");
            return;
        }

        let (producer, consumer) = match frame_ring_buffer(self.producer.frame_size(), self.producer.capacity()) {
            Ok(halves) => halves,
            Err(code) => {
                self.core.set_rejected(code, "failed to allocate playback buffer");
                log::warn!("playback session flush failed: {}", self.core.last_error_message());
                return;
            }
        };
        let handler = PlaybackHandler::new(consumer, self.format(), Arc::clone(&self.underrun_frames));
        if self.core.rebind(Box::new(handler)).is_err() {
            log::warn!("playback session flush failed: {}", self.core.last_error_message());
            return;
        }

        self.producer = producer;
        self.core.set_success();
        log::debug!("playback session flushed");
    }

    /// Frames the callback padded with silence because the buffer was empty.
    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }

    pub fn format(&self) -> SampleFormat {
        self.core.format().format
    }

    pub fn channels(&self) -> u32 {
        self.core.format().channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.core.format().sample_rate
    }

    pub fn stream_format(&self) -> StreamFormat {
        self.core.format()
    }

    pub fn buffer_size_in_frames(&self) -> u32 {
        self.core.buffer_size_in_frames()
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn is_started(&self) -> bool {
        self.core.state().is_running()
    }

    pub fn last_result(&self) -> Result<(), ErrorCode> {
        self.core.last_result()
    }

    pub fn last_error_message(&self) -> &str {
        self.core.last_error_message()
    }

    /// Stop and release the session. Dropping it does the same.
    pub fn destroy(self) {
        log::debug!("{:?} session destroyed", self.core.direction());
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}
