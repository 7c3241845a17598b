//! # audio-bridge-core
//!
//! Platform-agnostic microphone and speaker sessions.
//!
//! A session owns a lock-free single-producer/single-consumer frame ring
//! buffer shared between the application thread and a backend's realtime
//! callback. Platform backends (the software [`NullBackend`] here, WASAPI in
//! `audio-bridge-windows`) implement the [`AudioBackend`] trait and are turned
//! into sessions by a [`SessionFactory`].
//!
//! ## Architecture
//!
//! ```text
//! audio-bridge-core (this crate)
//! ├── traits/       ← AudioBackend, BackendContext, BackendDevice, DataCallback
//! ├── models/       ← ErrorCode, SessionError, SessionConfig, SampleFormat, SessionState
//! ├── processing/   ← frame ring buffer (FrameProducer / FrameConsumer)
//! ├── diagnostics/  ← backend log, diagnostic capture, per-session error state
//! ├── session/      ← CaptureSession, PlaybackSession, SessionFactory
//! └── backends/     ← NullBackend
//! ```

pub mod backends;
pub mod diagnostics;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use backends::null::NullBackend;
pub use diagnostics::backend_log::{BackendLog, LogCallback, LogHandle, LogLevel};
pub use models::config::SessionConfig;
pub use models::error::{ErrorCode, SessionError};
pub use models::format::{Direction, SampleFormat, StreamFormat};
pub use models::state::SessionState;
pub use processing::ring_buffer::{frame_ring_buffer, FrameConsumer, FrameProducer};
pub use session::capture::CaptureSession;
pub use session::factory::{default_buffer_size, SessionFactory};
pub use session::playback::PlaybackSession;
pub use traits::backend::{AudioBackend, BackendContext, BackendDevice, DataCallback, DeviceConfig, NegotiatedFormat};
