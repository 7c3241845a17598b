use std::thread;
use std::time::{Duration, Instant};

use audio_bridge_core::{ErrorCode, NullBackend, SampleFormat, SessionConfig, SessionFactory, SessionState};

fn factory() -> SessionFactory<NullBackend> {
    SessionFactory::new(NullBackend::with_period(Duration::from_millis(2)))
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn capture_delivers_silence_while_running() {
    let mut session = factory()
        .create_capture(SessionConfig::new(48000, 1, SampleFormat::S16, 0))
        .unwrap();
    assert_eq!(session.buffer_size_in_frames(), 384);

    session.start().unwrap();
    assert!(wait_until(|| session.available_frames() >= 96));

    let mut out = [1i16; 96];
    assert_eq!(session.read_samples(&mut out), 96);
    assert!(out.iter().all(|&s| s == 0));

    session.stop().unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    let frozen = session.available_frames();
    thread::sleep(Duration::from_millis(10));
    assert_eq!(session.available_frames(), frozen);

    session.flush();
    assert_eq!(session.available_frames(), 0);
}

#[test]
fn capture_overflow_is_counted_not_fatal() {
    let mut session = factory()
        .create_capture(SessionConfig::new(48000, 2, SampleFormat::F32, 100))
        .unwrap();
    session.start().unwrap();

    assert!(wait_until(|| session.dropped_frames() > 0));
    assert_eq!(session.available_frames(), 100);
    assert_eq!(session.last_result(), Ok(()));
}

#[test]
fn playback_drains_written_frames() {
    let mut session = factory()
        .create_playback(SessionConfig::new(44100, 2, SampleFormat::F32, 0))
        .unwrap();
    let capacity = session.buffer_size_in_frames() as usize;
    assert_eq!(session.sample_rate(), 44100);

    let samples = vec![0.25f32; capacity * 2];
    assert_eq!(session.write_samples(&samples), capacity);
    assert_eq!(session.available_frames(), 0);

    session.start().unwrap();
    assert!(wait_until(|| session.available_frames() == capacity));
    assert!(wait_until(|| session.underrun_frames() > 0));
    session.destroy();
}

#[test]
fn flush_while_running_takes_effect_on_next_period() {
    let mut session = factory()
        .create_playback(SessionConfig::new(48000, 1, SampleFormat::S32, 4800))
        .unwrap();
    session.write_samples(&vec![7i32; 4800]);
    session.start().unwrap();

    session.flush();
    assert!(wait_until(|| session.available_frames() == 4800));
    assert_eq!(session.last_result(), Ok(()));
}

#[test]
fn sessions_are_independent() {
    let factory = factory();
    let mut capture = factory.create_capture(SessionConfig::default()).unwrap();
    let playback = factory.create_playback(SessionConfig::default()).unwrap();

    capture.start().unwrap();
    assert!(capture.is_started());
    assert!(!playback.is_started());
    drop(playback);
    assert!(capture.is_started());
}

#[test]
fn out_of_range_rate_is_invalid() {
    let err = factory()
        .create_playback(SessionConfig::new(1000, 2, SampleFormat::F32, 0))
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::InvalidArgs);
    assert!(err.to_string().contains("sample rate"));
}

#[test]
fn config_from_json_drives_the_factory() {
    let config = SessionConfig::from_json(r#"{"sample_rate": 16000, "format": "s16"}"#).unwrap();
    let session = factory().create_capture(config).unwrap();
    assert_eq!(session.sample_rate(), 16000);
    assert_eq!(session.format(), SampleFormat::S16);
    assert_eq!(session.channels(), 1);
}
