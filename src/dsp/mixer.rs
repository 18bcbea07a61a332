//! Background mixing
//!
//! The background layer is mono; it is summed equally into every channel of
//! the primary signal, after which each channel is renormalized on its own.

use log::debug;

use crate::config::EngineConfig;
use crate::dsp::noise::BackgroundGenerator;
use crate::engine::buffer::{slice_peak, SampleBuffer};
use crate::engine::session::BackgroundSpec;

/// Add a mono background block to every channel
pub fn mix_into(buffer: &mut SampleBuffer, background: &[f32]) {
    for channel in buffer.samples.iter_mut() {
        for (sample, bg) in channel.iter_mut().zip(background) {
            *sample += *bg;
        }
    }
}

/// Scale down any channel whose peak exceeds full scale.
///
/// Channels are handled independently; a channel already within [-1, 1]
/// is left untouched.
pub fn renormalize_channels(buffer: &mut SampleBuffer) {
    for (index, channel) in buffer.samples.iter_mut().enumerate() {
        let peak = slice_peak(channel);
        if peak > 1.0 {
            debug!("Renormalizing channel {} from peak {:.3}", index, peak);
            let gain = 1.0 / peak;
            channel.iter_mut().for_each(|s| *s *= gain);
        }
    }
}

/// Mixes a background layer under a primary signal
#[derive(Debug, Clone, Copy)]
pub struct BackgroundMixer<'a> {
    config: &'a EngineConfig,
}

impl<'a> BackgroundMixer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Mix a freshly generated background into `primary`.
    ///
    /// # Arguments
    /// * `primary` - Signal to mix into; its shape is preserved
    /// * `background` - Kind, volume and EQ gains of the background
    /// * `seed` - Seed for the noise source
    pub fn mix(&self, mut primary: SampleBuffer, background: &BackgroundSpec, seed: u64) -> SampleBuffer {
        let mut generator =
            BackgroundGenerator::new(background, &self.config.background, seed, primary.sample_rate);
        if let Some(block) = generator.next_block(primary.len()) {
            mix_into(&mut primary, &block);
        }
        renormalize_channels(&mut primary);
        primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::{BackgroundKind, EqGains};

    #[test]
    fn test_mix_preserves_shape() {
        let config = EngineConfig::default();
        let primary = SampleBuffer::stereo(vec![0.5; 1000], vec![-0.5; 1000], 44100).unwrap();
        let background = BackgroundSpec {
            kind: BackgroundKind::Ambient,
            volume: 0.3,
            eq_gains: EqGains::default(),
        };
        let mixed = BackgroundMixer::new(&config).mix(primary.clone(), &background, 0);
        assert_eq!(mixed.channels(), 2);
        assert_eq!(mixed.len(), 1000);
        assert_ne!(mixed, primary);
    }

    #[test]
    fn test_no_background_is_identity() {
        let config = EngineConfig::default();
        let primary = SampleBuffer::stereo(vec![0.5; 100], vec![0.25; 100], 44100).unwrap();
        let mixed = BackgroundMixer::new(&config).mix(primary.clone(), &BackgroundSpec::default(), 0);
        assert_eq!(mixed, primary);
    }

    #[test]
    fn test_channels_renormalized_independently() {
        let mut buffer = SampleBuffer::stereo(vec![0.75, -0.5], vec![0.25, 0.125], 44100).unwrap();
        mix_into(&mut buffer, &[0.75, 0.0]);
        renormalize_channels(&mut buffer);

        assert!((buffer.channel(0)[0] - 1.0).abs() < 1e-6);
        assert!((buffer.channel(0)[1] + 0.5 / 1.5).abs() < 1e-6);
        // Right channel peaked at 1.0 exactly and is left alone
        assert_eq!(buffer.channel(1), &[1.0, 0.125]);
    }
}
