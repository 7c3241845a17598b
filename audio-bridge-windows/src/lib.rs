//! # audio-bridge-windows
//!
//! Windows WASAPI backend for audio-bridge.
//!
//! Provides:
//! - `WasapiBackend`: shared-mode capture and render on the default endpoints
//! - `hresult`: mapping of WASAPI failure codes onto [`ErrorCode`](audio_bridge_core::ErrorCode)
//! - `wave_format`: stream layout helpers used to build `WAVEFORMATEX`
//!
//! ## Usage
//! ```ignore
//! use audio_bridge_core::{SessionConfig, SessionFactory};
//! use audio_bridge_windows::WasapiBackend;
//!
//! let factory = SessionFactory::new(WasapiBackend::new());
//! let mut mic = factory.create_capture(SessionConfig::default())?;
//! mic.start()?;
//! ```

pub mod hresult;
pub mod wave_format;

#[cfg(target_os = "windows")]
pub mod wasapi_backend;

#[cfg(target_os = "windows")]
pub use wasapi_backend::WasapiBackend;
