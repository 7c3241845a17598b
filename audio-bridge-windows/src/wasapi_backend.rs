//! WASAPI backend.
//!
//! Opens the default capture or render endpoint in shared mode. The stream is
//! initialized with automatic PCM conversion, so the device accepts the
//! session's requested format, channel count, and rate. The realtime
//! callback runs on a dedicated thread registered with MMCSS.

use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HANDLE, RPC_E_CHANGED_MODE};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::{AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW};

use audio_bridge_core::diagnostics::backend_log::{LogHandle, LogLevel};
use audio_bridge_core::models::error::ErrorCode;
use audio_bridge_core::models::format::Direction;
use audio_bridge_core::traits::backend::{
    AudioBackend, BackendContext, BackendDevice, DataCallback, DeviceConfig, NegotiatedFormat,
};

use crate::hresult;
use crate::wave_format::{period_in_frames, WaveLayout};

/// Shared-mode buffer duration: 100 ms in 100 ns units.
const BUFFER_DURATION: i64 = 1_000_000;

#[derive(Debug, Error)]
enum StreamError {
    #[error("{step} failed: {source}")]
    Call {
        step: &'static str,
        code: ErrorCode,
        #[source]
        source: windows::core::Error,
    },
    #[error("{0}")]
    Unsupported(String),
}

impl StreamError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Call { code, .. } => *code,
            Self::Unsupported(_) => ErrorCode::FormatNotSupported,
        }
    }
}

fn call_failed(step: &'static str, fallback: ErrorCode) -> impl FnOnce(windows::core::Error) -> StreamError {
    move |source| StreamError::Call {
        step,
        code: hresult::to_error_code(source.code().0, fallback),
        source,
    }
}

/// WASAPI shared-mode backend for the default endpoints.
#[derive(Debug, Default, Clone)]
pub struct WasapiBackend;

impl WasapiBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for WasapiBackend {
    fn name(&self) -> &str {
        "wasapi"
    }

    fn open_context(&self, log: Option<LogHandle>) -> Result<Box<dyn BackendContext>, ErrorCode> {
        // Confirm COM and the MMDevice API are usable from this thread.
        let initialized = unsafe {
            ComScope::enter().and_then(|_com| {
                CoCreateInstance::<_, IMMDeviceEnumerator>(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map(drop)
                    .map_err(call_failed("CoCreateInstance(MMDeviceEnumerator)", ErrorCode::FailedToInitBackend))
            })
        };
        if let Err(e) = initialized {
            post(&log, LogLevel::Error, &e.to_string());
            return Err(e.code());
        }
        Ok(Box::new(WasapiContext { log }))
    }
}

struct WasapiContext {
    log: Option<LogHandle>,
}

impl BackendContext for WasapiContext {
    fn open_device(&mut self, config: &DeviceConfig) -> Result<Box<dyn BackendDevice>, ErrorCode> {
        let (params, negotiated) = unsafe { inspect_device(config) }.map_err(|e| {
            post(&self.log, LogLevel::Error, &e.to_string());
            e.code()
        })?;

        post(
            &self.log,
            LogLevel::Info,
            &format!(
                "opened default {:?} endpoint: {:?} x{} @ {} Hz, period {} frames",
                config.direction,
                negotiated.format,
                negotiated.channels,
                negotiated.sample_rate,
                negotiated.period_size_in_frames
            ),
        );

        Ok(Box::new(WasapiDevice {
            params,
            negotiated,
            log: self.log.clone(),
            callback: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }
}

/// Everything the stream thread needs to rebuild the inspected stream.
#[derive(Debug, Clone, Copy)]
struct StreamParams {
    direction: Direction,
    layout: WaveLayout,
    silence_byte: u8,
    period: i64,
}

impl StreamParams {
    fn poll_interval(&self) -> Duration {
        let half_period_ms = (self.period / 10_000 / 2).clamp(1, 10);
        Duration::from_millis(half_period_ms as u64)
    }
}

struct WasapiDevice {
    params: StreamParams,
    negotiated: NegotiatedFormat,
    log: Option<LogHandle>,
    callback: Option<Box<dyn DataCallback>>,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<Box<dyn DataCallback>>>,
}

impl BackendDevice for WasapiDevice {
    fn negotiated(&self) -> NegotiatedFormat {
        self.negotiated
    }

    fn bind(&mut self, callback: Box<dyn DataCallback>) -> Result<(), ErrorCode> {
        if self.worker.is_some() {
            post(&self.log, LogLevel::Error, "cannot bind a callback while the stream is running");
            return Err(ErrorCode::InvalidOperation);
        }
        self.callback = Some(callback);
        Ok(())
    }

    fn start(&mut self) -> Result<(), ErrorCode> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(callback) = self.callback.take() else {
            post(&self.log, LogLevel::Error, "no data callback bound");
            return Err(ErrorCode::InvalidOperation);
        };

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let params = self.params;
        let backend_log = self.log.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let name = match params.direction {
            Direction::Capture => "wasapi-capture",
            Direction::Playback => "wasapi-render",
        };
        let spawned = thread::Builder::new().name(name.into()).spawn(move || {
            let mut callback = callback;
            if let Err(e) = unsafe { run_stream(&params, &running, &ready_tx, callback.as_mut()) } {
                post(&backend_log, LogLevel::Error, &e.to_string());
                let _ = ready_tx.try_send(Err(e.code()));
            }
            running.store(false, Ordering::Release);
            callback
        });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                post(&self.log, LogLevel::Error, &format!("failed to spawn stream thread: {}", e));
                return Err(ErrorCode::FailedToStartBackendDevice);
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(handle);
                Ok(())
            }
            Ok(Err(code)) => {
                self.running.store(false, Ordering::Release);
                self.callback = handle.join().ok();
                Err(code)
            }
            Err(_) => {
                self.running.store(false, Ordering::Release);
                self.callback = handle.join().ok();
                post(&self.log, LogLevel::Error, "stream thread exited during startup");
                Err(ErrorCode::FailedToStartBackendDevice)
            }
        }
    }

    fn stop(&mut self) -> Result<(), ErrorCode> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::Release);
        match handle.join() {
            Ok(callback) => self.callback = Some(callback),
            Err(_) => post(&self.log, LogLevel::Warning, "stream thread panicked"),
        }
        Ok(())
    }
}

impl Drop for WasapiDevice {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Open and initialize a throwaway client to settle the stream parameters
/// before any session state is committed.
unsafe fn inspect_device(config: &DeviceConfig) -> Result<(StreamParams, NegotiatedFormat), StreamError> {
    let _com = ComScope::enter()?;
    let client = activate_default(config.direction, ErrorCode::FailedToOpenBackendDevice)?;

    let sample_rate = if config.sample_rate != 0 {
        config.sample_rate
    } else {
        mix_sample_rate(&client)?
    };
    let layout = WaveLayout::new(config.format, config.channels, sample_rate).ok_or_else(|| {
        StreamError::Unsupported(format!(
            "cannot describe {:?} x{} @ {} Hz as a wave format",
            config.format, config.channels, sample_rate
        ))
    })?;
    initialize(&client, &layout, ErrorCode::FailedToOpenBackendDevice)?;

    let mut period = 0i64;
    client
        .GetDevicePeriod(Some(&mut period), None)
        .map_err(call_failed("IAudioClient::GetDevicePeriod", ErrorCode::FailedToOpenBackendDevice))?;

    let params = StreamParams {
        direction: config.direction,
        layout,
        silence_byte: config.format.silence_byte(),
        period,
    };
    let negotiated = NegotiatedFormat {
        format: config.format,
        channels: config.channels,
        sample_rate,
        period_size_in_frames: period_in_frames(sample_rate, period),
    };
    Ok((params, negotiated))
}

unsafe fn activate_default(direction: Direction, fallback: ErrorCode) -> Result<IAudioClient, StreamError> {
    let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
        .map_err(call_failed("CoCreateInstance(MMDeviceEnumerator)", ErrorCode::FailedToInitBackend))?;

    let flow = match direction {
        Direction::Capture => eCapture,
        Direction::Playback => eRender,
    };
    let device = enumerator
        .GetDefaultAudioEndpoint(flow, eConsole)
        .map_err(call_failed("GetDefaultAudioEndpoint", ErrorCode::NoDevice))?;

    device
        .Activate(CLSCTX_ALL, None)
        .map_err(call_failed("IMMDevice::Activate", fallback))
}

unsafe fn mix_sample_rate(client: &IAudioClient) -> Result<u32, StreamError> {
    let mix_format = client
        .GetMixFormat()
        .map_err(call_failed("IAudioClient::GetMixFormat", ErrorCode::FailedToOpenBackendDevice))?;
    let sample_rate = (*mix_format).nSamplesPerSec;
    CoTaskMemFree(Some(mix_format as *const _));
    Ok(sample_rate)
}

unsafe fn initialize(client: &IAudioClient, layout: &WaveLayout, fallback: ErrorCode) -> Result<(), StreamError> {
    let format = WAVEFORMATEX {
        wFormatTag: layout.format_tag,
        nChannels: layout.channels,
        nSamplesPerSec: layout.samples_per_sec,
        nAvgBytesPerSec: layout.avg_bytes_per_sec,
        nBlockAlign: layout.block_align,
        wBitsPerSample: layout.bits_per_sample,
        cbSize: 0,
    };
    client
        .Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            AUDCLNT_STREAMFLAGS_NOPERSIST
                | AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM
                | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
            BUFFER_DURATION,
            0,
            &format,
            None,
        )
        .map_err(call_failed("IAudioClient::Initialize", fallback))
}

/// Stream thread body.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Activate and initialize the default endpoint's IAudioClient
/// 3. Get the capture or render service
/// 4. Register with MMCSS for real-time priority
/// 5. Start, report readiness, and pump buffers until `running` clears
unsafe fn run_stream(
    params: &StreamParams,
    running: &AtomicBool,
    ready: &SyncSender<Result<(), ErrorCode>>,
    callback: &mut dyn DataCallback,
) -> Result<(), StreamError> {
    let _com = ComScope::enter()?;
    let fallback = ErrorCode::FailedToStartBackendDevice;
    let client = activate_default(params.direction, fallback)?;
    initialize(&client, &params.layout, fallback)?;

    let buffer_frames = client
        .GetBufferSize()
        .map_err(call_failed("IAudioClient::GetBufferSize", fallback))?;
    let _mmcss = MmcssRegistration::register();

    let result = match params.direction {
        Direction::Capture => {
            let capture: IAudioCaptureClient = client
                .GetService()
                .map_err(call_failed("IAudioClient::GetService(capture)", fallback))?;
            client.Start().map_err(call_failed("IAudioClient::Start", fallback))?;
            let _ = ready.send(Ok(()));
            capture_loop(params, running, &capture, buffer_frames, callback)
        }
        Direction::Playback => {
            let render: IAudioRenderClient = client
                .GetService()
                .map_err(call_failed("IAudioClient::GetService(render)", fallback))?;
            // Prime with silence so the first period is not an underrun.
            render
                .GetBuffer(buffer_frames)
                .and_then(|_| render.ReleaseBuffer(buffer_frames, AUDCLNT_BUFFERFLAGS_SILENT.0 as u32))
                .map_err(call_failed("IAudioRenderClient::GetBuffer", fallback))?;
            client.Start().map_err(call_failed("IAudioClient::Start", fallback))?;
            let _ = ready.send(Ok(()));
            render_loop(params, running, &client, &render, buffer_frames, callback)
        }
    };

    let _ = client.Stop();
    result
}

unsafe fn capture_loop(
    params: &StreamParams,
    running: &AtomicBool,
    capture: &IAudioCaptureClient,
    buffer_frames: u32,
    callback: &mut dyn DataCallback,
) -> Result<(), StreamError> {
    let frame_size = params.layout.block_align as usize;
    let silence_frames = buffer_frames.max(1);
    let silence = vec![params.silence_byte; silence_frames as usize * frame_size];
    let poll = params.poll_interval();
    let fallback = ErrorCode::Generic;

    while running.load(Ordering::Acquire) {
        thread::sleep(poll);

        let mut packet_length = capture
            .GetNextPacketSize()
            .map_err(call_failed("IAudioCaptureClient::GetNextPacketSize", fallback))?;

        while packet_length > 0 {
            let mut data: *mut u8 = ptr::null_mut();
            let mut frames: u32 = 0;
            let mut flags: u32 = 0;
            capture
                .GetBuffer(&mut data, &mut frames, &mut flags, None, None)
                .map_err(call_failed("IAudioCaptureClient::GetBuffer", fallback))?;

            if frames > 0 {
                if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 || data.is_null() {
                    let mut remaining = frames;
                    while remaining > 0 {
                        let chunk = remaining.min(silence_frames);
                        callback.process(None, Some(&silence[..chunk as usize * frame_size]), chunk);
                        remaining -= chunk;
                    }
                } else {
                    let input = slice::from_raw_parts(data, frames as usize * frame_size);
                    callback.process(None, Some(input), frames);
                }
            }

            capture
                .ReleaseBuffer(frames)
                .map_err(call_failed("IAudioCaptureClient::ReleaseBuffer", fallback))?;
            packet_length = capture
                .GetNextPacketSize()
                .map_err(call_failed("IAudioCaptureClient::GetNextPacketSize", fallback))?;
        }
    }

    Ok(())
}

unsafe fn render_loop(
    params: &StreamParams,
    running: &AtomicBool,
    client: &IAudioClient,
    render: &IAudioRenderClient,
    buffer_frames: u32,
    callback: &mut dyn DataCallback,
) -> Result<(), StreamError> {
    let frame_size = params.layout.block_align as usize;
    let poll = params.poll_interval();
    let fallback = ErrorCode::Generic;

    while running.load(Ordering::Acquire) {
        thread::sleep(poll);

        let padding = client
            .GetCurrentPadding()
            .map_err(call_failed("IAudioClient::GetCurrentPadding", fallback))?;
        let frames = buffer_frames.saturating_sub(padding);
        if frames == 0 {
            continue;
        }

        let data = render
            .GetBuffer(frames)
            .map_err(call_failed("IAudioRenderClient::GetBuffer", fallback))?;
        let output = slice::from_raw_parts_mut(data, frames as usize * frame_size);
        callback.process(Some(output), None, frames);
        render
            .ReleaseBuffer(frames, 0)
            .map_err(call_failed("IAudioRenderClient::ReleaseBuffer", fallback))?;
    }

    Ok(())
}

/// COM apartment membership for the current thread. Uninitializes on drop
/// unless COM was already set up in another apartment mode.
struct ComScope {
    initialized: bool,
}

impl ComScope {
    unsafe fn enter() -> Result<Self, StreamError> {
        let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { initialized: false });
        }
        hr.ok()
            .map_err(call_failed("CoInitializeEx", ErrorCode::FailedToInitBackend))?;
        Ok(Self { initialized: true })
    }
}

impl Drop for ComScope {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

/// "Pro Audio" MMCSS task registration, reverted on drop.
struct MmcssRegistration(Option<HANDLE>);

impl MmcssRegistration {
    unsafe fn register() -> Self {
        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let handle = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);
        if handle.is_err() {
            log::warn!("MMCSS registration failed; stream thread runs at normal priority");
        }
        Self(handle.ok())
    }
}

impl Drop for MmcssRegistration {
    fn drop(&mut self) {
        if let Some(handle) = self.0 {
            unsafe {
                let _ = AvRevertMmThreadCharacteristics(handle);
            }
        }
    }
}

fn post(backend_log: &Option<LogHandle>, level: LogLevel, message: &str) {
    match backend_log {
        Some(handle) => handle.post(level, message),
        None => log::log!(target: "audio_backend", log::Level::from(level), "{}", message),
    }
}
