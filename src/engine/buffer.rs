//! Sample Buffer Management
//!
//! The per-channel `f32` buffer every synthesis stage produces and consumes.
//! Each stage owns the buffer it creates and moves it to the next stage.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
///
/// # Arguments
/// * `db` - Value in decibels
///
/// # Returns
/// Linear amplitude (1.0 at 0 dB)
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Largest absolute value in a slice of samples
#[inline]
pub fn slice_peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

// ============================================================================
// Sample Buffer
// ============================================================================

/// Fixed-length multi-channel sample buffer.
///
/// Samples are stored per channel (non-interleaved). After final
/// normalization every sample lies in [-1.0, 1.0].
///
/// # Example
/// ```
/// use resonera::engine::buffer::{ChannelLayout, SampleBuffer};
///
/// // One second of stereo silence
/// let buffer = SampleBuffer::new(44100, ChannelLayout::Stereo, 44100);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl SampleBuffer {
    /// Create a silent buffer
    ///
    /// # Arguments
    /// * `num_samples` - Number of samples per channel
    /// * `layout` - Channel configuration (Mono or Stereo)
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Wrap a single channel of samples
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: vec![samples],
            sample_rate,
        }
    }

    /// Wrap left and right channels
    ///
    /// # Returns
    /// Error if the channels differ in length
    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if left.len() != right.len() {
            return Err(EngineError::invalid(
                "right",
                format!("{} samples", right.len()),
                &format!("{} samples to match the left channel", left.len()),
            ));
        }
        Ok(Self {
            samples: vec![left, right],
            sample_rate,
        })
    }

    /// Empty buffer with room for `capacity` samples per channel
    pub fn with_capacity(capacity: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: (0..layout.num_channels())
                .map(|_| Vec::with_capacity(capacity))
                .collect(),
            sample_rate,
        }
    }

    /// Samples in interleaved order (L, R, L, R, ...), without copying
    pub fn interleaved(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.len()).flat_map(move |i| self.samples.iter().map(move |channel| channel[i]))
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Peak absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .map(|channel| slice_peak(channel))
            .fold(0.0_f32, f32::max)
    }

    /// Multiply every sample by a linear gain
    pub fn scale(&mut self, gain: f32) {
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Append another buffer of the same shape
    pub fn append(&mut self, other: &SampleBuffer) -> Result<()> {
        if other.channels() != self.channels() || other.sample_rate != self.sample_rate {
            return Err(EngineError::invalid(
                "segment",
                format!("{} ch @ {} Hz", other.channels(), other.sample_rate),
                &format!("{} ch @ {} Hz", self.channels(), self.sample_rate),
            ));
        }
        for (dst, src) in self.samples.iter_mut().zip(&other.samples) {
            dst.extend_from_slice(src);
        }
        Ok(())
    }

    /// Interleaved 16-bit PCM, quantized on the fly.
    ///
    /// Samples are clamped to [-1.0, 1.0] first.
    pub fn pcm_i16(&self) -> impl Iterator<Item = i16> + '_ {
        self.interleaved().map(quantize_i16)
    }
}

/// Quantize one sample to 16-bit PCM
#[inline]
pub fn quantize_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Quantize one sample to 24-bit PCM, stored in an `i32`
#[inline]
pub fn quantize_i24(sample: f32) -> i32 {
    (sample.clamp(-1.0, 1.0) as f64 * 8_388_607.0).round() as i32
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_conversion() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_linear(-6.0206) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_buffer_shape() {
        let buffer = SampleBuffer::new(441, ChannelLayout::Mono, 44100);
        assert_eq!(buffer.channels(), 1);
        assert_eq!(buffer.len(), 441);
        assert!((buffer.duration_secs() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_with_capacity_is_empty() {
        let mut buffer = SampleBuffer::with_capacity(1000, ChannelLayout::Stereo, 44100);
        assert_eq!(buffer.channels(), 2);
        assert!(buffer.is_empty());
        buffer
            .append(&SampleBuffer::new(1000, ChannelLayout::Stereo, 44100))
            .unwrap();
        assert_eq!(buffer.samples[0].capacity(), 1000);
    }

    #[test]
    fn test_stereo_length_mismatch() {
        let result = SampleBuffer::stereo(vec![0.0; 10], vec![0.0; 9], 44100);
        assert!(result.is_err());
    }

    #[test]
    fn test_interleave_and_peak() {
        let buffer =
            SampleBuffer::stereo(vec![0.1, -0.5], vec![0.2, 0.3], 44100).unwrap();
        assert_eq!(buffer.interleaved().collect::<Vec<_>>(), vec![0.1, 0.2, -0.5, 0.3]);
        assert_eq!(buffer.peak(), 0.5);
    }

    #[test]
    fn test_append_requires_same_shape() {
        let mut a = SampleBuffer::new(10, ChannelLayout::Stereo, 44100);
        let b = SampleBuffer::new(5, ChannelLayout::Stereo, 44100);
        a.append(&b).unwrap();
        assert_eq!(a.len(), 15);

        let mono = SampleBuffer::new(5, ChannelLayout::Mono, 44100);
        assert!(a.append(&mono).is_err());
    }

    #[test]
    fn test_pcm_quantization_clamps() {
        let buffer = SampleBuffer::mono(vec![0.0, 1.0, -1.0, 2.0, 0.5], 44100);
        let pcm: Vec<i16> = buffer.pcm_i16().collect();
        assert_eq!(pcm, vec![0, 32767, -32767, 32767, 16384]);
        assert_eq!(quantize_i24(-2.0), -8_388_607);
    }

    #[test]
    fn test_scale() {
        let mut buffer = SampleBuffer::mono(vec![1.0, -0.5], 44100);
        buffer.scale(0.5);
        assert_eq!(buffer.channel(0), &[0.5, -0.25]);
    }
}
