//! Single-producer/single-consumer ring buffer of interleaved frames.
//!
//! A thin frame-granular layer over `ringbuf::HeapRb<u8>`. The byte capacity
//! is a whole number of frames and every operation moves whole frames, so the
//! ring's contiguous regions always start and end on a frame boundary.
//!
//! The buffer is split into a [`FrameProducer`] and a [`FrameConsumer`]. One
//! half lives in the realtime callback, the other in the session. Data moves
//! through an acquire/commit protocol: `acquire_*` hands out a contiguous
//! region of up to the requested number of frames (shorter at the physical end
//! of the storage, empty when the buffer is full or empty), `commit_*`
//! publishes how many of those frames were used. Nothing here allocates or
//! blocks once the buffer exists.
//!
//! A producer cannot move the read side, so a producer-side flush is a
//! request: the producer publishes how many frames it had committed, and the
//! consumer skips up to that mark on its next acquire. Both counters only grow.

use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;

use crate::models::error::ErrorCode;

/// Create a ring buffer holding `capacity_in_frames` frames of `frame_size` bytes.
///
/// Fails with `InvalidArgs` for a zero frame size or capacity and with
/// `OutOfMemory` when the storage cannot be sized or allocated.
pub fn frame_ring_buffer(
    frame_size: usize,
    capacity_in_frames: usize,
) -> Result<(FrameProducer, FrameConsumer), ErrorCode> {
    if frame_size == 0 || capacity_in_frames == 0 {
        return Err(ErrorCode::InvalidArgs);
    }
    let size_in_bytes = capacity_in_frames
        .checked_mul(frame_size)
        .filter(|&bytes| bytes <= isize::MAX as usize)
        .ok_or(ErrorCode::OutOfMemory)?;

    let rb = HeapRb::<u8>::try_new(size_in_bytes).map_err(|_| ErrorCode::OutOfMemory)?;
    let (mut inner_producer, mut inner_consumer) = rb.split();

    // Touch every byte once so writable regions can be handed out as `&mut [u8]`.
    let zeros = [0u8; 256];
    while inner_producer.push_slice(&zeros) > 0 {}
    inner_consumer.clear();

    let discard_mark = Arc::new(AtomicU64::new(0));

    Ok((
        FrameProducer {
            inner: inner_producer,
            frame_size,
            capacity: capacity_in_frames,
            acquired: 0,
            committed: 0,
            discard_mark: Arc::clone(&discard_mark),
        },
        FrameConsumer {
            inner: inner_consumer,
            frame_size,
            capacity: capacity_in_frames,
            acquired: 0,
            consumed: 0,
            discard_mark,
        },
    ))
}

/// Writing half of the ring buffer.
pub struct FrameProducer {
    inner: ringbuf::HeapProd<u8>,
    frame_size: usize,
    capacity: usize,
    acquired: usize,
    // Frames committed since creation.
    committed: u64,
    discard_mark: Arc<AtomicU64>,
}

impl FrameProducer {
    /// Acquire a writable region of up to `frames` frames.
    ///
    /// The region is `n_actual * frame_size` bytes long; an empty region means
    /// the buffer is full.
    pub fn acquire_write(&mut self, frames: usize) -> &mut [u8] {
        let frame_size = self.frame_size;
        let (head, _) = self.inner.vacant_slices_mut();
        let frames = frames.min(head.len() / frame_size);
        self.acquired = frames;

        let region: &mut [MaybeUninit<u8>] = &mut head[..frames * frame_size];
        // SAFETY: every byte of the storage was written when the buffer was
        // created, and `MaybeUninit<u8>` has the layout of `u8`.
        unsafe { &mut *(region as *mut [MaybeUninit<u8>] as *mut [u8]) }
    }

    /// Publish `frames` frames of the last acquired region.
    ///
    /// Committing more than was acquired commits only the acquired amount.
    pub fn commit_write(&mut self, frames: usize) {
        debug_assert!(frames <= self.acquired, "commit_write beyond acquired region");
        let frames = frames.min(self.acquired);
        self.acquired = 0;
        if frames == 0 {
            return;
        }
        // SAFETY: the first `frames * frame_size` vacant bytes were handed out by
        // `acquire_write` and are initialized.
        unsafe { self.inner.advance_write_index(frames * self.frame_size) };
        self.committed += frames as u64;
    }

    /// Copy whole frames from `bytes` into the buffer until it is full.
    ///
    /// Returns the number of frames accepted; the rest of `bytes` is left
    /// untouched for the caller to retry or drop.
    pub fn push_frames(&mut self, bytes: &[u8]) -> usize {
        let frames = (bytes.len() / self.frame_size).min(self.available_write());
        let pushed = self.inner.push_slice(&bytes[..frames * self.frame_size]);
        let pushed = pushed / self.frame_size;
        self.acquired = 0;
        self.committed += pushed as u64;
        pushed
    }

    /// Ask the consumer to discard every frame committed so far.
    ///
    /// The consumer honours the request on its next acquire, so frames written
    /// after this call are kept.
    pub fn request_discard(&mut self) {
        self.discard_mark.store(self.committed, Ordering::Release);
    }

    pub fn available_read(&self) -> usize {
        self.inner.occupied_len() / self.frame_size
    }

    pub fn available_write(&self) -> usize {
        self.inner.vacant_len() / self.frame_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

/// Reading half of the ring buffer.
pub struct FrameConsumer {
    inner: ringbuf::HeapCons<u8>,
    frame_size: usize,
    capacity: usize,
    acquired: usize,
    // Frames read or skipped since creation.
    consumed: u64,
    discard_mark: Arc<AtomicU64>,
}

impl FrameConsumer {
    /// Acquire a readable region of up to `frames` frames.
    ///
    /// An empty region means no committed data is available.
    pub fn acquire_read(&mut self, frames: usize) -> &[u8] {
        self.apply_pending_discard();

        let (head, _) = self.inner.as_slices();
        let frames = frames.min(head.len() / self.frame_size);
        self.acquired = frames;
        &head[..frames * self.frame_size]
    }

    /// Release `frames` frames of the last acquired region back to the producer.
    pub fn commit_read(&mut self, frames: usize) {
        debug_assert!(frames <= self.acquired, "commit_read beyond acquired region");
        let frames = frames.min(self.acquired);
        self.acquired = 0;
        if frames == 0 {
            return;
        }
        let skipped = self.inner.skip(frames * self.frame_size) / self.frame_size;
        self.consumed += skipped as u64;
    }

    /// Copy whole frames out of the buffer into `out` until it is empty.
    ///
    /// Returns the number of frames copied; the tail of `out` is untouched.
    pub fn pop_frames(&mut self, out: &mut [u8]) -> usize {
        self.apply_pending_discard();

        let frames = (out.len() / self.frame_size).min(self.available_read());
        let popped = self.inner.pop_slice(&mut out[..frames * self.frame_size]);
        let popped = popped / self.frame_size;
        self.acquired = 0;
        self.consumed += popped as u64;
        popped
    }

    /// Drop every committed frame. Returns how many frames were discarded.
    pub fn discard_all(&mut self) -> usize {
        let frames = self.inner.clear() / self.frame_size;
        self.acquired = 0;
        self.consumed += frames as u64;
        frames
    }

    /// Skip up to the producer's discard mark. A mark at or behind what was
    /// already consumed is spent.
    fn apply_pending_discard(&mut self) {
        let mark = self.discard_mark.load(Ordering::Acquire);
        if mark <= self.consumed {
            return;
        }
        let pending = usize::try_from(mark - self.consumed).unwrap_or(usize::MAX);
        let frames = pending.min(self.available_read());
        let skipped = self.inner.skip(frames * self.frame_size) / self.frame_size;
        self.consumed += skipped as u64;
    }

    pub fn available_read(&self) -> usize {
        self.inner.occupied_len() / self.frame_size
    }

    pub fn available_write(&self) -> usize {
        self.inner.vacant_len() / self.frame_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}
