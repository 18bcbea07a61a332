//! Integration Tests
//!
//! End-to-end tests for session generation, streaming and export.

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use resonera::engine::{BackgroundKind, EqGains, SessionSpec, Waypoint};
use resonera::safety::BrainwaveBand;
use resonera::synth::TransitionStyle;
use resonera::{Engine, EngineConfig, EngineError};

/// Engine that accepts short sessions so tests stay fast
fn short_engine() -> Engine {
    let mut config = EngineConfig::default();
    config.safety.min_session_secs = 1.0;
    config.segment_secs = 0.5;
    Engine::new(config).unwrap()
}

/// Largest jump between consecutive samples of a channel
fn max_step(samples: &[f32]) -> f32 {
    samples
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0, f32::max)
}

// === Full Session Tests ===

#[test]
fn test_five_minute_alpha_session() {
    let engine = Engine::with_defaults();
    let spec = SessionSpec::new(10.0, 300.0, 0.7);
    let (buffer, metadata) = engine.generate(&spec).unwrap();

    assert_eq!(buffer.channels(), 2);
    assert_eq!(buffer.len(), 13_230_000);
    assert!(buffer.peak() <= 0.7 * 0.95 + 1e-6);
    assert!(buffer.samples.iter().flatten().all(|s| s.is_finite()));
    assert_eq!(metadata.target_band, Some(BrainwaveBand::Alpha));
    assert!(metadata.safety_validated);
    assert_relative_eq!(metadata.duration_secs, 300.0);
}

#[test]
fn test_band_request_resolves_to_canonical() {
    let engine = short_engine();
    let spec = SessionSpec::for_band(BrainwaveBand::Theta, 2.0, 0.5);
    let (_, metadata) = engine.generate(&spec).unwrap();
    assert_eq!(metadata.base_frequency_hz, 6.0);
    assert_eq!(metadata.carrier_hz, 288.0);
    assert_eq!(metadata.target_band, Some(BrainwaveBand::Theta));
}

#[test]
fn test_segments_have_no_seams() {
    let engine = short_engine();
    let spec = SessionSpec::new(10.0, 3.0, 0.8)
        .with_isochronic(0.5, 0.5)
        .with_harmonics(4, 0.7, 0.2)
        .with_fade(0.0);
    let (buffer, _) = engine.generate(&spec).unwrap();

    // A 300 Hz tone at full scale moves at most 2*pi*300/44100 per sample;
    // the isochronic ramps add a little on top of that
    for channel in 0..2 {
        assert!(max_step(buffer.channel(channel)) < 0.2);
    }
}

#[test]
fn test_generate_is_bit_identical_with_noise() {
    let engine = short_engine();
    let spec = SessionSpec::new(8.0, 2.0, 0.6)
        .with_background(
            BackgroundKind::WhiteNoise,
            0.3,
            EqGains {
                low: 3.0,
                mid: 0.0,
                high: -6.0,
            },
        )
        .with_seed(1234);

    let (a, meta_a) = engine.generate(&spec).unwrap();
    let (b, meta_b) = engine.generate(&spec).unwrap();
    assert_eq!(a, b);
    assert_eq!(meta_a.checksum, meta_b.checksum);

    let (c, _) = engine.generate(&spec.clone().with_seed(99)).unwrap();
    assert_ne!(a, c);
}

#[test]
fn test_ambient_background() {
    let engine = short_engine();
    let spec = SessionSpec::new(10.0, 2.0, 0.5).with_background(
        BackgroundKind::Ambient,
        0.4,
        EqGains::default(),
    );
    let (buffer, _) = engine.generate(&spec).unwrap();
    assert!(buffer.peak() <= 0.5 * 0.95 + 1e-6);
    assert_ne!(buffer.channel(0), buffer.channel(1));
}

#[test]
fn test_fades_start_and_end_silent() {
    let engine = short_engine();
    let spec = SessionSpec::new(10.0, 4.0, 0.5).with_fade(1.0);
    let (buffer, _) = engine.generate(&spec).unwrap();
    let last = buffer.len() - 1;
    for channel in 0..2 {
        assert_eq!(buffer.channel(channel)[0], 0.0);
        assert_eq!(buffer.channel(channel)[last], 0.0);
    }
}

#[test]
fn test_multi_state_session() {
    let mut config = EngineConfig::default();
    config.safety.min_session_secs = 1.0;
    config.segment_secs = 0.5;
    config.transition.enforce_band_minimums = false;
    let engine = Engine::new(config).unwrap();

    let spec = SessionSpec::new(2.0, 4.0, 0.5)
        .with_waypoints(vec![
            Waypoint::new(0.0, 2.0, TransitionStyle::Linear),
            Waypoint::new(1.5, 5.0, TransitionStyle::Linear),
            Waypoint::new(3.0, 6.0, TransitionStyle::Sigmoid),
        ])
        .with_fade(0.0);
    assert!(engine.validate(&spec).is_safe);

    let (buffer, metadata) = engine.generate(&spec).unwrap();
    assert_eq!(buffer.len(), 176_400);
    assert_eq!(metadata.base_frequency_hz, 2.0);
    assert_eq!(metadata.target_frequency_hz, 6.0);
    assert_eq!(metadata.transition_points.first().unwrap().frequency_hz, 2.0);
    assert!(metadata
        .transition_points
        .iter()
        .any(|p| p.time_secs == 1.5 && p.frequency_hz == 5.0));
    for channel in 0..2 {
        assert!(max_step(buffer.channel(channel)) < 0.2);
    }
}

// === Error Mapping Tests ===

#[test]
fn test_band_minimum_rejects_short_transition() {
    let engine = Engine::with_defaults();
    let spec = SessionSpec::new(10.0, 60.0, 0.5).with_transition(4.0, 10.0, TransitionStyle::Linear);
    match engine.generate(&spec) {
        Err(EngineError::TransitionTooFast {
            duration_secs,
            min_duration_secs,
            ..
        }) => {
            assert_eq!(duration_secs, 60.0);
            assert!(min_duration_secs >= 180.0);
        }
        other => panic!("expected TransitionTooFast, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_rate_rejects_two_second_transition() {
    let engine = Engine::with_defaults();
    let spec = SessionSpec::new(10.0, 600.0, 0.5)
        .with_transition(4.0, 10.0, TransitionStyle::Linear)
        .with_transition_duration(2.0);
    let err = engine.generate(&spec).map(|_| ()).unwrap_err();
    assert!(matches!(err, EngineError::TransitionTooFast { .. }));
    assert!(err.is_recoverable());
}

#[test]
fn test_validation_matches_generation_for_curves() {
    let mut config = EngineConfig::default();
    config.transition.enforce_band_minimums = false;
    let engine = Engine::new(config).unwrap();

    for (style, duration) in [
        (TransitionStyle::Linear, 60.0),
        (TransitionStyle::Sigmoid, 60.0),
        (TransitionStyle::Sigmoid, 70.0),
        (TransitionStyle::Exponential, 60.0),
        (TransitionStyle::Exponential, 61.0),
    ] {
        let spec = SessionSpec::new(30.0, duration, 0.5).with_transition(30.0, 100.0, style);
        let validated = engine.validate(&spec).is_safe;
        let planned = engine.stream(&spec).is_ok();
        assert_eq!(validated, planned, "{} over {}s", style, duration);
    }
}

#[test]
fn test_unsafe_frequency_reports_every_violation() {
    let engine = short_engine();
    let spec = SessionSpec::new(0.05, 2.0, 0.5).with_harmonics(0, 0.7, 0.2);
    match engine.generate(&spec) {
        Err(EngineError::SafetyViolation { report }) => {
            assert!(!report.is_safe);
            assert!(report.names("frequency"));
            assert!(report.names("harmonics.count"));
        }
        other => panic!("expected SafetyViolation, got {:?}", other.map(|_| ())),
    }
}

// === Streaming and Export ===

#[test]
fn test_stream_concatenates_to_session_length() {
    let engine = short_engine();
    let spec = SessionSpec::new(10.0, 2.2, 0.6).with_fade(0.5);
    let stream = engine.stream(&spec).unwrap();
    let gain = stream.gain();

    let mut frames = 0;
    let mut peak = 0.0_f32;
    for segment in stream {
        assert!(segment.len() <= 22050);
        frames += segment.len();
        peak = peak.max(segment.peak());
    }
    assert_eq!(frames, 97020);
    assert!(peak <= 0.6 * gain + 1e-6);
}

#[test]
fn test_export_writes_wav_and_metadata() {
    let dir = tempdir().unwrap();
    let wav = dir.path().join("session.wav");
    let engine = short_engine();

    let metadata = engine
        .export(&SessionSpec::new(10.0, 1.0, 0.5), &wav, Some(24))
        .unwrap();
    let reader = hound::WavReader::open(&wav).unwrap();
    assert_eq!(reader.spec().bits_per_sample, 24);
    assert_eq!(reader.duration(), 44100);

    let json_path = dir.path().join("session.json");
    metadata.write_json(&json_path).unwrap();
    let json = std::fs::read_to_string(&json_path).unwrap();
    assert!(json.contains(&metadata.checksum));
}

#[test]
fn test_streamed_export() {
    let dir = tempdir().unwrap();
    let wav = dir.path().join("streamed.wav");
    let frames = short_engine()
        .export_streamed(&SessionSpec::new(6.0, 1.5, 0.5), &wav, None)
        .unwrap();
    assert_eq!(frames, 66150);
    assert_eq!(hound::WavReader::open(&wav).unwrap().duration(), 66150);
}

#[test]
fn test_export_uses_configured_bit_depth() {
    let dir = tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.safety.min_session_secs = 1.0;
    config.output.bit_depth = 32;
    let engine = Engine::new(config).unwrap();
    let spec = SessionSpec::new(10.0, 1.0, 0.5);

    let configured = dir.path().join("configured.wav");
    engine.export(&spec, &configured, None).unwrap();
    let reader = hound::WavReader::open(&configured).unwrap();
    assert_eq!(reader.spec().bits_per_sample, 32);
    assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);

    let overridden = dir.path().join("overridden.wav");
    engine.export_streamed(&spec, &overridden, Some(16)).unwrap();
    assert_eq!(hound::WavReader::open(&overridden).unwrap().spec().bits_per_sample, 16);
}

#[test]
fn test_batch_runs_in_order() {
    let mut config = EngineConfig::default();
    config.safety.min_session_secs = 1.0;
    config.worker_threads = Some(2);
    let engine = Engine::new(config).unwrap();

    let specs: Vec<SessionSpec> = [2.0, 6.0, 10.0, 20.0]
        .iter()
        .map(|&f| SessionSpec::new(f, 1.0, 0.5))
        .collect();
    let results = engine.generate_batch(&specs);
    let targets: Vec<f64> = results
        .iter()
        .map(|r| r.as_ref().unwrap().1.target_frequency_hz)
        .collect();
    assert_eq!(targets, vec![2.0, 6.0, 10.0, 20.0]);
}
