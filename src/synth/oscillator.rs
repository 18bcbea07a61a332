//! Phase-accumulating sine oscillator
//!
//! Phase is tracked in cycles as `f64` and wrapped every sample, so an
//! oscillator can be driven across any number of segments without drift or
//! seams.

use std::f64::consts::TAU;

use crate::engine::buffer::SampleBuffer;
use crate::error::{EngineError, Result};

/// Sine oscillator with continuous phase
#[derive(Debug, Clone)]
pub struct Oscillator {
    /// Current phase in cycles, always in [0, 1)
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            sample_rate: sample_rate as f64,
        }
    }

    /// Start at a phase offset given in radians
    pub fn with_phase(sample_rate: u32, phase_radians: f64) -> Self {
        Self {
            phase: (phase_radians / TAU).rem_euclid(1.0),
            sample_rate: sample_rate as f64,
        }
    }

    /// Current phase in radians
    pub fn phase_radians(&self) -> f64 {
        self.phase * TAU
    }

    /// Emit one sample at `frequency` and advance the phase
    #[inline]
    pub fn next_sample(&mut self, frequency: f64) -> f64 {
        let value = (TAU * self.phase).sin();
        self.phase = (self.phase + frequency / self.sample_rate).rem_euclid(1.0);
        value
    }

    /// Add `amplitude`-scaled samples at a fixed frequency into `out`
    pub fn fill(&mut self, frequency: f64, amplitude: f64, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample += (amplitude * self.next_sample(frequency)) as f32;
        }
    }
}

/// Render a mono sine tone.
///
/// # Arguments
/// * `frequency` - Tone frequency in Hz, below Nyquist
/// * `duration` - Length in seconds
/// * `amplitude` - Peak amplitude in [0, 1]
/// * `sample_rate` - Sample rate in Hz
/// * `phase_offset` - Starting phase in radians
///
/// # Returns
/// A mono buffer of exactly round(duration * sample_rate) samples
pub fn sine(
    frequency: f64,
    duration: f64,
    amplitude: f64,
    sample_rate: u32,
    phase_offset: f64,
) -> Result<SampleBuffer> {
    if sample_rate == 0 {
        return Err(EngineError::invalid("sample_rate", sample_rate, "a positive rate"));
    }
    let nyquist = sample_rate as f64 / 2.0;
    if !(frequency > 0.0 && frequency < nyquist) {
        return Err(EngineError::invalid(
            "frequency",
            frequency,
            &format!("a frequency between 0 and {} Hz", nyquist),
        ));
    }
    if !(duration.is_finite() && duration > 0.0) {
        return Err(EngineError::invalid("duration", duration, "a positive duration"));
    }
    if !(0.0..=1.0).contains(&amplitude) {
        return Err(EngineError::invalid("amplitude", amplitude, "0.0-1.0"));
    }

    let num_samples = (duration * sample_rate as f64).round() as usize;
    let mut samples = vec![0.0_f32; num_samples];
    Oscillator::with_phase(sample_rate, phase_offset).fill(frequency, amplitude, &mut samples);
    Ok(SampleBuffer::mono(samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_length_and_bounds() {
        let buffer = sine(10.0, 2.5, 0.6, 44100, 0.0).unwrap();
        assert_eq!(buffer.len(), 110250);
        assert_eq!(buffer.channels(), 1);
        assert!(buffer.peak() <= 0.6);
        assert!(buffer.peak() > 0.59);
    }

    #[test]
    fn test_sine_rejects_bad_input() {
        assert!(sine(0.0, 1.0, 0.5, 44100, 0.0).is_err());
        assert!(sine(10.0, 0.0, 0.5, 44100, 0.0).is_err());
        assert!(sine(10.0, 1.0, 1.5, 44100, 0.0).is_err());
        assert!(sine(10.0, 1.0, -0.1, 44100, 0.0).is_err());
        assert!(sine(30000.0, 1.0, 0.5, 44100, 0.0).is_err());
    }

    #[test]
    fn test_sine_is_deterministic() {
        let a = sine(440.0, 0.5, 0.8, 44100, 0.3).unwrap();
        let b = sine(440.0, 0.5, 0.8, 44100, 0.3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_phase_offset() {
        let buffer = sine(100.0, 0.01, 1.0, 44100, std::f64::consts::FRAC_PI_2).unwrap();
        assert!((buffer.channel(0)[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_segments_are_seamless() {
        let whole = sine(210.0, 1.0, 0.9, 44100, 0.0).unwrap();

        let mut osc = Oscillator::new(44100);
        let mut first = vec![0.0_f32; 22050];
        let mut second = vec![0.0_f32; 22050];
        osc.fill(210.0, 0.9, &mut first);
        osc.fill(210.0, 0.9, &mut second);
        first.extend_from_slice(&second);

        for (a, b) in whole.channel(0).iter().zip(&first) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
