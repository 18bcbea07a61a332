//! Segment pipeline
//!
//! A validated `SessionSpec` is turned into a `SessionPlan` (envelope,
//! carrier, voice gains) and then rendered in fixed-size segments:
//!
//! ```text
//! VoiceBank -> OvertoneVoice -> BackgroundGenerator -> (fade, gain)
//! ```
//!
//! Every stage keeps its own phase and sample position, so the segments
//! concatenate into exactly the signal a single pass would produce.

use log::debug;

use crate::config::EngineConfig;
use crate::dsp::{mix_into, BackgroundGenerator};
use crate::engine::buffer::SampleBuffer;
use crate::engine::output::{Fade, OutputAssembler, SessionInfo};
use crate::engine::session::SessionSpec;
use crate::error::{EngineError, Result};
use crate::safety::Violation;
use crate::synth::{
    FrequencyEnvelope, HarmonicCalculator, IsochronicSettings, OvertoneGenerator, OvertoneVoice,
    Synthesizer, TransitionController, VoiceBank, VoiceSettings,
};

/// Everything needed to render a session, resolved from its spec
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub envelope: FrequencyEnvelope,
    pub voices: VoiceSettings,
    /// Overtone amplitude budget (0 when harmonics are off)
    pub harmonic_gain: f64,
    pub harmonic_count: usize,
    pub harmonic_decay: f64,
    pub total_frames: usize,
    pub fade_secs: f64,
    pub info: SessionInfo,
}

impl SessionPlan {
    /// Resolve a spec that has already passed the safety limiter.
    ///
    /// # Arguments
    /// * `config` - Engine configuration
    /// * `spec` - The session request
    /// * `warnings` - Safety warnings to carry into the metadata
    pub fn build(
        config: &EngineConfig,
        spec: &SessionSpec,
        warnings: Vec<Violation>,
    ) -> Result<Self> {
        let (start, end) = spec.frequency_range().ok_or_else(|| {
            EngineError::invalid(
                "frequency",
                "none",
                "a frequency, transition, waypoints or target_state",
            )
        })?;

        let duration = spec.duration_secs;
        let path = spec.transition_path();
        let envelope = match &path {
            Some(path) => TransitionController::new(config)
                .plan_path(path)?
                .extend_hold(duration),
            None => FrequencyEnvelope::constant(start, duration),
        };

        let carrier_hz = spec.carrier.unwrap_or_else(|| {
            HarmonicCalculator::new().optimize_carrier(end, config.carrier.min_hz, config.carrier.max_hz)
        });

        let volume = spec.volume;
        let harmonic_gain = if spec.harmonics.enabled {
            volume * spec.harmonics.weight
        } else {
            0.0
        };
        let voice_budget = volume - harmonic_gain;
        let (binaural_gain, isochronic_gain) = match (spec.binaural, spec.isochronic.enabled) {
            (true, true) => (voice_budget * 0.5, voice_budget * 0.5),
            (true, false) => (voice_budget, 0.0),
            (false, true) => (0.0, voice_budget),
            (false, false) => (0.0, 0.0),
        };

        let voices = VoiceSettings {
            carrier_hz,
            binaural_gain,
            isochronic: spec.isochronic.enabled.then(|| IsochronicSettings {
                carrier_hz: spec.isochronic.carrier_hz.unwrap_or(config.carrier.isochronic_hz),
                duty_cycle: spec.isochronic.duty_cycle,
                depth: spec.isochronic.depth,
                edge_secs: config.isochronic.edge_secs,
                gain: isochronic_gain,
            }),
        };
        Synthesizer::new(config).check_settings(&envelope, duration, &voices)?;

        let total_frames = (duration * config.sample_rate as f64).round() as usize;
        debug!(
            "Planned session: {:.2} -> {:.2} Hz, carrier {:.1} Hz, {} frames, gains b={:.3} i={:.3} h={:.3}",
            start, end, carrier_hz, total_frames, binaural_gain, isochronic_gain, harmonic_gain
        );

        let info = SessionInfo {
            base_frequency_hz: start,
            target_frequency_hz: end,
            carrier_hz,
            volume,
            transition_style: path.as_ref().and_then(|p| p.last()).map(|w| w.style),
            transition_points: envelope.points().to_vec(),
            target_band: spec.target_state,
            warnings,
        };

        Ok(Self {
            envelope,
            voices,
            harmonic_gain,
            harmonic_count: spec.harmonics.count,
            harmonic_decay: spec.harmonics.decay,
            total_frames,
            fade_secs: spec.fade_secs.unwrap_or(config.output.fade_secs),
            info,
        })
    }
}

/// Renders the raw (unfaded, unnormalized) session one segment at a time
pub struct SessionRenderer {
    envelope: FrequencyEnvelope,
    voices: VoiceBank,
    overtones: Option<OvertoneVoice>,
    background: BackgroundGenerator,
    position: usize,
    total_frames: usize,
    segment_frames: usize,
    sample_rate: u32,
}

impl SessionRenderer {
    pub fn new(config: &EngineConfig, plan: &SessionPlan, spec: &SessionSpec) -> Self {
        let sample_rate = config.sample_rate;
        let overtones = (plan.harmonic_gain > 0.0).then(|| {
            let generator = OvertoneGenerator::new(config, plan.harmonic_count, plan.harmonic_decay);
            OvertoneVoice::new(&generator, &plan.envelope, plan.harmonic_gain, sample_rate)
        });
        Self {
            envelope: plan.envelope.clone(),
            voices: VoiceBank::new(&plan.voices, sample_rate),
            overtones,
            background: BackgroundGenerator::new(
                &spec.background,
                &config.background,
                spec.seed,
                sample_rate,
            ),
            position: 0,
            total_frames: plan.total_frames,
            segment_frames: config.segment_samples(),
            sample_rate,
        }
    }

    /// Absolute frame index of the next segment
    pub fn position(&self) -> usize {
        self.position
    }
}

impl Iterator for SessionRenderer {
    type Item = SampleBuffer;

    fn next(&mut self) -> Option<SampleBuffer> {
        if self.position >= self.total_frames {
            return None;
        }
        let len = self.segment_frames.min(self.total_frames - self.position);
        let mut left = vec![0.0_f32; len];
        let mut right = vec![0.0_f32; len];

        self.voices.render(&self.envelope, &mut left, &mut right);
        if let Some(overtones) = self.overtones.as_mut() {
            overtones.render(&self.envelope, &mut left, &mut right);
        }

        let mut segment = SampleBuffer {
            samples: vec![left, right],
            sample_rate: self.sample_rate,
        };
        if let Some(block) = self.background.next_block(len) {
            mix_into(&mut segment, &block);
        }
        self.position += len;
        Some(segment)
    }
}

/// Finished segments of a streamed session.
///
/// Fades are applied at their absolute positions. Instead of measuring the
/// final peak, every segment is scaled by one static gain that keeps the
/// worst case at the target peak.
pub struct SessionStream {
    renderer: SessionRenderer,
    fade: Fade,
    gain: f32,
    info: SessionInfo,
}

impl SessionStream {
    pub fn new(config: &EngineConfig, plan: SessionPlan, spec: &SessionSpec) -> Self {
        let renderer = SessionRenderer::new(config, &plan, spec);
        let fade = Fade::new(
            config.output.fade_curve,
            plan.fade_secs,
            config.sample_rate,
            plan.total_frames,
        );

        let target = OutputAssembler::new(config).target_peak(spec.volume);
        let background = if spec.background.is_active() {
            spec.background.volume
        } else {
            0.0
        };
        let worst_case = spec.volume + background;
        let gain = if worst_case > 0.0 {
            (target / worst_case).min(1.0)
        } else {
            0.0
        };

        Self {
            renderer,
            fade,
            gain: gain as f32,
            info: plan.info,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn total_frames(&self) -> usize {
        self.renderer.total_frames
    }

    /// Static gain applied to every segment
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Iterator for SessionStream {
    type Item = SampleBuffer;

    fn next(&mut self) -> Option<SampleBuffer> {
        let offset = self.renderer.position();
        let mut segment = self.renderer.next()?;
        self.fade.apply(&mut segment, offset);
        segment.scale(self.gain);
        Some(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::{BackgroundKind, EqGains};
    use crate::safety::BrainwaveBand;
    use crate::synth::{TransitionStyle, Waypoint};

    fn short_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.safety.min_session_secs = 1.0;
        config.segment_secs = 0.5;
        config
    }

    #[test]
    fn test_gain_split() {
        let config = short_config();
        let spec = SessionSpec::new(10.0, 2.0, 0.6)
            .with_isochronic(0.5, 1.0)
            .with_harmonics(3, 0.7, 0.2);
        let plan = SessionPlan::build(&config, &spec, Vec::new()).unwrap();

        assert!((plan.harmonic_gain - 0.12).abs() < 1e-12);
        assert!((plan.voices.binaural_gain - 0.24).abs() < 1e-12);
        let iso = plan.voices.isochronic.as_ref().unwrap();
        assert!((iso.gain - 0.24).abs() < 1e-12);
        assert_eq!(iso.carrier_hz, 300.0);
    }

    #[test]
    fn test_carrier_optimized_for_target() {
        let config = short_config();
        let plan = SessionPlan::build(&config, &SessionSpec::new(10.0, 2.0, 0.5), Vec::new()).unwrap();
        assert_eq!(plan.voices.carrier_hz, 200.0);

        let fixed = SessionSpec::new(10.0, 2.0, 0.5).with_carrier(220.0);
        let plan = SessionPlan::build(&config, &fixed, Vec::new()).unwrap();
        assert_eq!(plan.voices.carrier_hz, 220.0);
    }

    #[test]
    fn test_partial_transition_holds_end() {
        let mut config = short_config();
        config.transition.enforce_band_minimums = false;
        let spec = SessionSpec::new(10.0, 4.0, 0.5)
            .with_transition(9.0, 10.0, TransitionStyle::Linear)
            .with_transition_duration(1.0);
        let plan = SessionPlan::build(&config, &spec, Vec::new()).unwrap();

        assert_eq!(plan.envelope.duration(), 4.0);
        assert_eq!(plan.envelope.frequency_at(3.0), 10.0);
        assert_eq!(plan.info.transition_style, Some(TransitionStyle::Linear));
    }

    #[test]
    fn test_waypoint_plan_moves_through_bands() {
        let config = EngineConfig::default();
        let spec = SessionSpec::for_band(BrainwaveBand::Alpha, 900.0, 0.5).with_waypoints(vec![
            Waypoint::new(0.0, 2.0, TransitionStyle::Linear),
            Waypoint::new(300.0, 6.0, TransitionStyle::Sigmoid),
            Waypoint::new(600.0, 10.0, TransitionStyle::Linear),
        ]);
        let plan = SessionPlan::build(&config, &spec, Vec::new()).unwrap();

        let envelope = &plan.envelope;
        assert_eq!(envelope.duration(), 900.0);
        let band_at = |t: f64| BrainwaveBand::classify(envelope.frequency_at(t));
        assert_eq!(band_at(0.0), Some(BrainwaveBand::Delta));
        assert_eq!(band_at(300.0), Some(BrainwaveBand::Theta));
        assert_eq!(band_at(750.0), Some(BrainwaveBand::Alpha));
        assert!(envelope.max_slope() <= config.safety.max_transition_rate + 1e-9);

        assert_eq!(plan.info.base_frequency_hz, 2.0);
        assert_eq!(plan.info.target_frequency_hz, 10.0);
        assert_eq!(plan.info.transition_style, Some(TransitionStyle::Linear));
        assert_eq!(plan.voices.carrier_hz, 200.0);
    }

    #[test]
    fn test_renderer_segments_cover_session() {
        let config = short_config();
        let spec = SessionSpec::new(10.0, 1.7, 0.5);
        let plan = SessionPlan::build(&config, &spec, Vec::new()).unwrap();
        let lengths: Vec<usize> = SessionRenderer::new(&config, &plan, &spec)
            .map(|s| s.len())
            .collect();
        assert_eq!(lengths, vec![22050, 22050, 22050, 8820]);
    }

    #[test]
    fn test_stream_gain_bounds_peak() {
        let config = short_config();
        let spec = SessionSpec::new(10.0, 2.0, 0.8).with_background(
            BackgroundKind::WhiteNoise,
            0.2,
            EqGains::default(),
        );
        let plan = SessionPlan::build(&config, &spec, Vec::new()).unwrap();
        let stream = SessionStream::new(&config, plan, &spec);
        assert!((stream.gain() - 0.76).abs() < 1e-6);

        let target = 0.8 * 0.95;
        for segment in stream {
            assert!(segment.peak() as f64 <= target + 1e-6);
        }
    }
}
