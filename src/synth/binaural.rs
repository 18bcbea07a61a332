//! Binaural and isochronic synthesis
//!
//! A `VoiceBank` owns every oscillator phase for one session, so rendering
//! the session in consecutive segments produces the same samples as
//! rendering it in one pass.

use std::f64::consts::PI;

use crate::config::EngineConfig;
use crate::engine::buffer::SampleBuffer;
use crate::error::{EngineError, Result};
use crate::safety::SafetyLimiter;
use crate::synth::oscillator::Oscillator;
use crate::synth::transition::{EnvelopeCursor, FrequencyEnvelope};

/// Isochronic voice parameters
#[derive(Debug, Clone, PartialEq)]
pub struct IsochronicSettings {
    pub carrier_hz: f64,
    pub duty_cycle: f64,
    pub depth: f64,
    /// Raised-cosine ramp length on each gate edge, in seconds
    pub edge_secs: f64,
    pub gain: f64,
}

/// Carrier and gain for every entrainment voice in a session
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub carrier_hz: f64,
    /// Binaural pair amplitude (0 disables the pair)
    pub binaural_gain: f64,
    pub isochronic: Option<IsochronicSettings>,
}

impl VoiceSettings {
    /// Binaural pair only
    pub fn binaural(carrier_hz: f64, gain: f64) -> Self {
        Self {
            carrier_hz,
            binaural_gain: gain,
            isochronic: None,
        }
    }

    /// Highest carrier frequency any voice reaches, excluding the beat offset
    fn max_carrier(&self) -> f64 {
        let iso = self.isochronic.as_ref().map_or(0.0, |i| i.carrier_hz);
        self.carrier_hz.max(iso)
    }

    /// Peak amplitude the voices can reach together
    pub fn peak_gain(&self) -> f64 {
        self.binaural_gain + self.isochronic.as_ref().map_or(0.0, |i| i.gain)
    }
}

/// Isochronic gate value for a modulator phase in cycles.
///
/// On for the first `duty` of each cycle. Each edge is a raised-cosine
/// ramp `edge` cycles wide; `edge = 0` gives a hard square wave.
#[inline]
pub fn isochronic_gate(phase: f64, duty: f64, edge: f64) -> f64 {
    if phase >= duty {
        return 0.0;
    }
    if edge <= 0.0 {
        return 1.0;
    }
    let ramp = |x: f64| 0.5 - 0.5 * (PI * x / edge).cos();
    if phase < edge {
        ramp(phase)
    } else if phase > duty - edge {
        ramp(duty - phase)
    } else {
        1.0
    }
}

#[derive(Debug, Clone)]
struct IsochronicVoice {
    carrier: Oscillator,
    /// Modulator phase in cycles
    modulator_phase: f64,
    settings: IsochronicSettings,
    sample_rate: f64,
}

impl IsochronicVoice {
    fn new(settings: IsochronicSettings, sample_rate: u32) -> Self {
        Self {
            carrier: Oscillator::new(sample_rate),
            modulator_phase: 0.0,
            settings,
            sample_rate: sample_rate as f64,
        }
    }

    #[inline]
    fn next_sample(&mut self, beat_hz: f64) -> f64 {
        let s = &self.settings;
        let edge = (s.edge_secs * beat_hz)
            .min(s.duty_cycle * 0.5)
            .min((1.0 - s.duty_cycle) * 0.5);
        let gate = isochronic_gate(self.modulator_phase, s.duty_cycle, edge);
        let envelope = 1.0 - s.depth + s.depth * gate;
        let value = s.gain * envelope * self.carrier.next_sample(s.carrier_hz);

        self.modulator_phase = (self.modulator_phase + beat_hz / self.sample_rate).rem_euclid(1.0);
        value
    }
}

/// Stateful binaural and isochronic voices for one session
#[derive(Debug, Clone)]
pub struct VoiceBank {
    left: Oscillator,
    right: Oscillator,
    isochronic: Option<IsochronicVoice>,
    carrier_hz: f64,
    binaural_gain: f64,
    cursor: EnvelopeCursor,
    /// Absolute sample index of the next frame
    position: u64,
    sample_rate: u32,
}

impl VoiceBank {
    pub fn new(settings: &VoiceSettings, sample_rate: u32) -> Self {
        Self {
            left: Oscillator::new(sample_rate),
            right: Oscillator::new(sample_rate),
            isochronic: settings
                .isochronic
                .clone()
                .map(|iso| IsochronicVoice::new(iso, sample_rate)),
            carrier_hz: settings.carrier_hz,
            binaural_gain: settings.binaural_gain,
            cursor: EnvelopeCursor::new(),
            position: 0,
            sample_rate,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Render the next `left.len()` frames, adding into both channels
    pub fn render(&mut self, envelope: &FrequencyEnvelope, left: &mut [f32], right: &mut [f32]) {
        let sr = self.sample_rate as f64;
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let t = (self.position + i as u64) as f64 / sr;
            let beat = self.cursor.frequency_at(envelope, t);

            let mut out_l = 0.0;
            let mut out_r = 0.0;
            if self.binaural_gain > 0.0 {
                out_l += self.binaural_gain * self.left.next_sample(self.carrier_hz);
                out_r += self.binaural_gain * self.right.next_sample(self.carrier_hz + beat);
            }
            if let Some(iso) = self.isochronic.as_mut() {
                let value = iso.next_sample(beat);
                out_l += value;
                out_r += value;
            }
            *l += out_l as f32;
            *r += out_r as f32;
        }
        self.position += left.len() as u64;
    }
}

/// One-shot synthesis of the entrainment voices
#[derive(Debug, Clone, Copy)]
pub struct Synthesizer<'a> {
    config: &'a EngineConfig,
}

impl<'a> Synthesizer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Binaural beat: left = sine(carrier), right = sine(carrier + f(t))
    ///
    /// # Returns
    /// A stereo buffer of round(duration * sample_rate) frames, or
    /// `FrequencyError` if an envelope point fails the safety limits
    pub fn synthesize(
        &self,
        envelope: &FrequencyEnvelope,
        carrier: f64,
        duration: f64,
        amplitude: f64,
    ) -> Result<SampleBuffer> {
        self.render(envelope, duration, &VoiceSettings::binaural(carrier, amplitude))
    }

    /// Render any combination of binaural and isochronic voices
    pub fn render(
        &self,
        envelope: &FrequencyEnvelope,
        duration: f64,
        settings: &VoiceSettings,
    ) -> Result<SampleBuffer> {
        self.check_settings(envelope, duration, settings)?;

        let sample_rate = self.config.sample_rate;
        let frames = (duration * sample_rate as f64).round() as usize;
        let mut left = vec![0.0_f32; frames];
        let mut right = vec![0.0_f32; frames];
        VoiceBank::new(settings, sample_rate).render(envelope, &mut left, &mut right);
        SampleBuffer::stereo(left, right, sample_rate)
    }

    /// Validate settings before a `VoiceBank` is built from them
    pub fn check_settings(
        &self,
        envelope: &FrequencyEnvelope,
        duration: f64,
        settings: &VoiceSettings,
    ) -> Result<()> {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(EngineError::invalid("duration", duration, "a positive duration"));
        }
        if !(0.0..=1.0).contains(&settings.peak_gain()) || settings.binaural_gain < 0.0 {
            return Err(EngineError::invalid(
                "amplitude",
                settings.peak_gain(),
                "a combined voice amplitude in 0.0-1.0",
            ));
        }
        SafetyLimiter::new(self.config).check_envelope(envelope)?;

        let ceiling = self.config.nyquist();
        let highest = settings.max_carrier() + envelope.max_frequency();
        if !(settings.carrier_hz > 0.0) || highest >= ceiling {
            return Err(EngineError::invalid(
                "carrier",
                settings.carrier_hz,
                &format!("a carrier that keeps every voice below {} Hz", ceiling),
            ));
        }
        Ok(())
    }
}
