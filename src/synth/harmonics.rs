//! Harmonic overtones and consonant-ratio helpers

use crate::config::EngineConfig;
use crate::engine::buffer::SampleBuffer;
use crate::error::{EngineError, Result};
use crate::synth::oscillator::Oscillator;
use crate::synth::transition::{EnvelopeCursor, FrequencyEnvelope};

/// Consonant frequency ratios: unison, octave, fifth, fourth, major third,
/// minor third
pub const CONSONANT_RATIOS: [f64; 6] = [1.0, 2.0, 1.5, 1.333, 1.25, 1.2];

/// Tolerance when matching a reduced ratio against `CONSONANT_RATIOS`
const RATIO_TOLERANCE: f64 = 0.01;

/// Core entrainment frequencies with carriers known to work well
const CORE_CARRIERS: [(f64, f64); 3] = [(10.0, 200.0), (6.0, 288.0), (2.0, 256.0)];

/// One harmonic of a fundamental
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partial {
    /// Harmonic number (1 = fundamental)
    pub harmonic: u32,
    pub frequency_hz: f64,
    pub amplitude: f64,
}

/// Generates decaying harmonic series under the overtone ceiling
#[derive(Debug, Clone, PartialEq)]
pub struct OvertoneGenerator {
    max_harmonics: usize,
    decay: f64,
    ceiling_hz: f64,
    min_relative_amplitude: f64,
}

impl OvertoneGenerator {
    /// # Arguments
    /// * `config` - Supplies the ceiling and amplitude floor
    /// * `count` - Number of harmonics including the fundamental
    /// * `decay` - Amplitude ratio between successive harmonics
    pub fn new(config: &EngineConfig, count: usize, decay: f64) -> Self {
        Self {
            max_harmonics: count,
            decay,
            ceiling_hz: config
                .harmonics
                .ceiling_hz
                .min(config.safety.max_frequency_hz),
            min_relative_amplitude: config.harmonics.min_relative_amplitude,
        }
    }

    pub fn ceiling_hz(&self) -> f64 {
        self.ceiling_hz
    }

    /// Harmonics of `fundamental` with amplitudes `base * decay^(n-1)`.
    ///
    /// Stops at the first harmonic above the ceiling or below the
    /// relative amplitude floor. Amplitudes are not normalized.
    pub fn partials(&self, fundamental: f64, base_amplitude: f64) -> Vec<Partial> {
        let mut partials = Vec::with_capacity(self.max_harmonics);
        let mut relative = 1.0;
        for n in 1..=self.max_harmonics as u32 {
            let frequency_hz = fundamental * n as f64;
            if frequency_hz > self.ceiling_hz || relative < self.min_relative_amplitude {
                break;
            }
            partials.push(Partial {
                harmonic: n,
                frequency_hz,
                amplitude: base_amplitude * relative,
            });
            relative *= self.decay;
        }
        partials
    }

    /// Gain that keeps the summed partials within [-1, 1]
    pub fn normalization(partials: &[Partial]) -> f64 {
        let bound: f64 = partials.iter().map(|p| p.amplitude).sum();
        if bound > 1.0 {
            1.0 / bound
        } else {
            1.0
        }
    }

    /// Render the overtone series of a fixed fundamental.
    ///
    /// # Returns
    /// A mono buffer with peak at most 1.0
    pub fn overtones(
        &self,
        fundamental: f64,
        duration: f64,
        base_amplitude: f64,
        sample_rate: u32,
    ) -> Result<SampleBuffer> {
        if !(fundamental > 0.0 && fundamental <= self.ceiling_hz) {
            return Err(EngineError::invalid(
                "fundamental",
                fundamental,
                &format!("a frequency between 0 and {} Hz", self.ceiling_hz),
            ));
        }
        if !(duration.is_finite() && duration > 0.0) {
            return Err(EngineError::invalid("duration", duration, "a positive duration"));
        }
        if !(0.0..=1.0).contains(&base_amplitude) {
            return Err(EngineError::invalid("base_amplitude", base_amplitude, "0.0-1.0"));
        }

        let partials = self.partials(fundamental, base_amplitude);
        let norm = Self::normalization(&partials);
        let mut samples = vec![0.0_f32; (duration * sample_rate as f64).round() as usize];
        for partial in &partials {
            Oscillator::new(sample_rate).fill(
                partial.frequency_hz,
                partial.amplitude * norm,
                &mut samples,
            );
        }
        Ok(SampleBuffer::mono(samples, sample_rate))
    }
}

/// Overtones that follow a frequency envelope across segments.
///
/// The harmonic set is fixed from the envelope's highest frequency, so no
/// partial switches on or off mid-session.
#[derive(Debug, Clone)]
pub struct OvertoneVoice {
    /// (harmonic number, amplitude) after normalization and gain
    partials: Vec<(u32, f64)>,
    oscillators: Vec<Oscillator>,
    cursor: EnvelopeCursor,
    position: u64,
    sample_rate: u32,
}

impl OvertoneVoice {
    pub fn new(
        generator: &OvertoneGenerator,
        envelope: &FrequencyEnvelope,
        gain: f64,
        sample_rate: u32,
    ) -> Self {
        let partials = generator.partials(envelope.max_frequency(), 1.0);
        let norm = OvertoneGenerator::normalization(&partials) * gain;
        Self {
            oscillators: partials.iter().map(|_| Oscillator::new(sample_rate)).collect(),
            partials: partials
                .iter()
                .map(|p| (p.harmonic, p.amplitude * norm))
                .collect(),
            cursor: EnvelopeCursor::new(),
            position: 0,
            sample_rate,
        }
    }

    pub fn harmonic_count(&self) -> usize {
        self.partials.len()
    }

    /// Render the next `left.len()` frames, adding the same signal to both channels
    pub fn render(&mut self, envelope: &FrequencyEnvelope, left: &mut [f32], right: &mut [f32]) {
        let sr = self.sample_rate as f64;
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let t = (self.position + i as u64) as f64 / sr;
            let fundamental = self.cursor.frequency_at(envelope, t);
            let value: f64 = self
                .partials
                .iter()
                .zip(self.oscillators.iter_mut())
                .map(|(&(n, amp), osc)| amp * osc.next_sample(fundamental * n as f64))
                .sum();
            *l += value as f32;
            *r += value as f32;
        }
        self.position += left.len() as u64;
    }
}

// ============================================================================
// Harmonic Calculator
// ============================================================================

/// Octave-reduce a ratio into (1, 2]
fn reduce_ratio(mut ratio: f64) -> f64 {
    while ratio > 2.0 {
        ratio /= 2.0;
    }
    ratio
}

fn is_consonant(ratio: f64) -> bool {
    CONSONANT_RATIOS
        .iter()
        .any(|r| (ratio - r).abs() < RATIO_TOLERANCE)
}

/// Harmonic relationships between frequencies
#[derive(Debug, Clone, Copy, Default)]
pub struct HarmonicCalculator;

impl HarmonicCalculator {
    pub fn new() -> Self {
        Self
    }

    /// First `count` integer harmonics of `fundamental`
    pub fn harmonic_series(&self, fundamental: f64, count: usize) -> Vec<f64> {
        (1..=count).map(|n| fundamental * n as f64).collect()
    }

    /// The consonant multiple of `base` closest to `target`.
    ///
    /// # Returns
    /// `(harmonic frequency, ratio)`
    pub fn nearest_harmonic(&self, base: f64, target: f64) -> (f64, f64) {
        CONSONANT_RATIOS
            .iter()
            .map(|&ratio| (base * ratio, ratio))
            .min_by(|a, b| (a.0 - target).abs().total_cmp(&(b.0 - target).abs()))
            .unwrap_or((base, 1.0))
    }

    /// Frequencies within `tolerance` Hz of a harmonic of both inputs,
    /// using the first ten harmonics of each
    pub fn common_harmonics(&self, freq1: f64, freq2: f64, tolerance: f64) -> Vec<f64> {
        let series2 = self.harmonic_series(freq2, 10);
        let mut common: Vec<f64> = self
            .harmonic_series(freq1, 10)
            .into_iter()
            .flat_map(|h1| {
                series2
                    .iter()
                    .filter(move |h2| (h1 - **h2).abs() <= tolerance)
                    .map(move |h2| (h1 + h2) / 2.0)
            })
            .collect();
        common.sort_by(f64::total_cmp);
        common.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        common
    }

    /// Pick a carrier for an entrainment frequency.
    ///
    /// Core frequencies (10, 6, 2 Hz) map to their known carriers. Other
    /// targets get the smallest integer multiple in `[min, max]` whose
    /// octave-reduced ratio is consonant, falling back to `min`.
    pub fn optimize_carrier(&self, target: f64, min_carrier: f64, max_carrier: f64) -> f64 {
        if !(target > 0.0) {
            return min_carrier;
        }
        for (core, carrier) in CORE_CARRIERS {
            if (target - core).abs() < RATIO_TOLERANCE
                && (min_carrier..=max_carrier).contains(&carrier)
            {
                return carrier;
            }
        }

        let first = (min_carrier / target).ceil().max(1.0) as u64;
        let last = (max_carrier / target).floor() as u64;
        for multiplier in first..=last {
            let carrier = target * multiplier as f64;
            if carrier > max_carrier {
                break;
            }
            if is_consonant(reduce_ratio(multiplier as f64)) {
                return carrier;
            }
        }
        min_carrier
    }

    /// Whether two frequencies form an acceptable relationship: their
    /// octave-reduced ratio is consonant (or within 10% of unison), or the
    /// plain ratio is at most `max_ratio`
    pub fn validate_combination(&self, freq1: f64, freq2: f64, max_ratio: f64) -> bool {
        let ratio = freq1.max(freq2) / freq1.min(freq2);
        let reduced = reduce_ratio(ratio);
        if is_consonant(reduced) || (reduced - 1.0).abs() < 0.1 {
            return true;
        }
        ratio <= max_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partials_decay() {
        let config = EngineConfig::default();
        let generator = OvertoneGenerator::new(&config, 5, 0.7);
        let partials = generator.partials(10.0, 1.0);

        let freqs: Vec<f64> = partials.iter().map(|p| p.frequency_hz).collect();
        assert_eq!(freqs, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        let expected = [1.0, 0.7, 0.49, 0.343, 0.2401];
        for (partial, amp) in partials.iter().zip(expected) {
            assert_relative_eq!(partial.amplitude, amp, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_partials_stop_at_ceiling() {
        let config = EngineConfig::default();
        let generator = OvertoneGenerator::new(&config, 5, 0.7);
        let partials = generator.partials(40.0, 0.5);
        assert_eq!(partials.len(), 2);
        assert_eq!(partials[1].frequency_hz, 80.0);
    }

    #[test]
    fn test_overtones_normalized() {
        let config = EngineConfig::default();
        let generator = OvertoneGenerator::new(&config, 5, 0.7);
        let buffer = generator.overtones(10.0, 1.0, 1.0, 44100).unwrap();
        assert_eq!(buffer.len(), 44100);
        assert!(buffer.peak() <= 1.0);
        assert!(generator.overtones(150.0, 1.0, 0.5, 44100).is_err());
    }

    #[test]
    fn test_voice_follows_envelope_max() {
        let config = EngineConfig::default();
        let generator = OvertoneGenerator::new(&config, 5, 0.7);
        let envelope = crate::synth::transition::FrequencyEnvelope::new(vec![
            crate::synth::transition::ControlPoint::new(0.0, 10.0),
            crate::synth::transition::ControlPoint::new(100.0, 30.0),
        ])
        .unwrap();
        let voice = OvertoneVoice::new(&generator, &envelope, 0.2, 44100);
        assert_eq!(voice.harmonic_count(), 3);
    }

    #[test]
    fn test_optimize_carrier_core() {
        let calc = HarmonicCalculator::new();
        assert_eq!(calc.optimize_carrier(10.0, 200.0, 1000.0), 200.0);
        assert_eq!(calc.optimize_carrier(6.0, 200.0, 1000.0), 288.0);
        assert_eq!(calc.optimize_carrier(2.0, 200.0, 1000.0), 256.0);
    }

    #[test]
    fn test_optimize_carrier_search() {
        let calc = HarmonicCalculator::new();
        // 7 Hz: multipliers 29..31 are dissonant, 32 reduces to 2.0
        assert_eq!(calc.optimize_carrier(7.0, 200.0, 1000.0), 224.0);
        // 40 Hz: 5 reduces to 1.25
        assert_eq!(calc.optimize_carrier(40.0, 200.0, 1000.0), 200.0);
    }

    #[test]
    fn test_nearest_and_common_harmonics() {
        let calc = HarmonicCalculator::new();
        assert_eq!(calc.nearest_harmonic(200.0, 310.0), (300.0, 1.5));
        assert_eq!(calc.common_harmonics(2.0, 3.0, 0.1), vec![6.0, 12.0, 18.0]);
        assert_eq!(calc.harmonic_series(5.0, 3), vec![5.0, 10.0, 15.0]);
    }

    #[test]
    fn test_validate_combination() {
        let calc = HarmonicCalculator::new();
        assert!(calc.validate_combination(200.0, 300.0, 2.0));
        assert!(calc.validate_combination(100.0, 800.0, 2.0));
        assert!(!calc.validate_combination(100.0, 370.0, 2.0));
    }
}
