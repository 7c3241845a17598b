use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::Pod;

use crate::models::error::ErrorCode;
use crate::models::format::{SampleFormat, StreamFormat};
use crate::models::state::SessionState;
use crate::processing::ring_buffer::FrameConsumer;

use super::core::SessionCore;

/// Microphone session: the backend produces frames, the application reads them.
///
/// Created by [`SessionFactory::create_capture`](super::factory::SessionFactory::create_capture).
/// Dropping the session stops the device first, then releases the ring
/// buffer, device, context, and log registration.
pub struct CaptureSession {
    consumer: FrameConsumer,
    dropped_frames: Arc<AtomicU64>,
    core: SessionCore,
}

impl CaptureSession {
    pub(crate) fn new(consumer: FrameConsumer, dropped_frames: Arc<AtomicU64>, core: SessionCore) -> Self {
        Self {
            consumer,
            dropped_frames,
            core,
        }
    }

    /// Start delivering captured frames into the buffer. No-op if running.
    pub fn start(&mut self) -> Result<(), ErrorCode> {
        self.core.start()
    }

    /// Stop the device, blocking until the data callback has quiesced.
    /// No-op if stopped.
    pub fn stop(&mut self) -> Result<(), ErrorCode> {
        self.core.stop()
    }

    /// Copy up to `frame_count` buffered frames into `out`.
    ///
    /// Returns the number of frames copied. A short count means the buffer
    /// ran dry, not an error. An empty `out`, a zero `frame_count`, or an
    /// `out` too small for `frame_count` frames records `InvalidArgs` and
    /// returns 0 without touching `out`.
    pub fn read(&mut self, out: &mut [u8], frame_count: usize) -> usize {
        if !self.core.check_io_request(out.len(), frame_count, "read") {
            return 0;
        }
        let frame_size = self.consumer.frame_size();
        let read = self.consumer.pop_frames(&mut out[..frame_count * frame_size]);
        self.core.set_success();
        read
    }

    /// Typed variant of [`read`](Self::read): fills whole frames of `out`
    /// (`out.len() / channels` of them). `T` must match the negotiated sample
    /// width, e.g. `f32` for [`SampleFormat::F32`].
    pub fn read_samples<T: Pod>(&mut self, out: &mut [T]) -> usize {
        if !self.core.check_sample_width(std::mem::size_of::<T>()) {
            return 0;
        }
        let frame_count = out.len() / self.channels() as usize;
        self.read(bytemuck::cast_slice_mut(out), frame_count)
    }

    /// Frames ready to read right now. Advisory: the callback may add more
    /// immediately after.
    pub fn available_frames(&self) -> usize {
        self.consumer.available_read()
    }

    /// Discard all buffered frames.
    pub fn flush(&mut self) {
        let discarded = self.consumer.discard_all();
        self.core.set_success();
        log::debug!("capture session flushed {} frames", discarded);
    }

    /// Frames the callback had to drop because the buffer was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
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

    /// Message for the last result; empty after a success.
    pub fn last_error_message(&self) -> &str {
        self.core.last_error_message()
    }

    /// Stop and release the session. Dropping it does the same.
    pub fn destroy(self) {
        log::debug!("{:?} session destroyed", self.core.direction());
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}
