//! Background sources: seeded pink noise and an ambient drone
//!
//! Both are rendered block by block so a long session never holds more
//! than one segment of background in memory.

use std::f64::consts::TAU;

use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::BackgroundConfig;
use crate::dsp::equalizer::ThreeBandEq;
use crate::engine::buffer::slice_peak;
use crate::engine::session::{BackgroundKind, BackgroundSpec};

/// Drone partials as (ratio to the base frequency, relative amplitude)
pub const DRONE_PARTIALS: [(f64, f64); 5] = [(1.0, 1.0), (1.5, 0.5), (2.0, 0.3), (2.5, 0.2), (3.0, 0.1)];

/// Peak of the first noise block, and the knee of the soft limiter
const NOISE_PEAK: f64 = 0.8;

// ============================================================================
// Pink noise
// ============================================================================

/// Identity below `NOISE_PEAK`; above it, a tanh curve that approaches but
/// never reaches full scale. Continuous in value and slope at the knee.
#[inline]
pub fn soft_limit(x: f64) -> f64 {
    let magnitude = x.abs();
    if magnitude <= NOISE_PEAK {
        return x;
    }
    let range = 1.0 - NOISE_PEAK;
    let limited = NOISE_PEAK + range * ((magnitude - NOISE_PEAK) / range).tanh();
    limited.copysign(x)
}

/// Gaussian noise shaped to a pink (1/sqrt(f) amplitude) spectrum.
///
/// The first block is peak-normalized to `NOISE_PEAK` and its RMS becomes
/// the target for every later block, so loudness stays level across
/// segments. Later peaks above the knee go through `soft_limit`.
pub struct PinkNoise {
    rng: Pcg64,
    planner: FftPlanner<f64>,
    sample_rate: f64,
    target_rms: Option<f64>,
}

impl PinkNoise {
    pub fn new(seed: u64, sample_rate: u32) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
            planner: FftPlanner::new(),
            sample_rate: sample_rate as f64,
            target_rms: None,
        }
    }

    /// Next `len` samples, within [-1, 1]
    pub fn next_block(&mut self, len: usize) -> Vec<f32> {
        if len == 0 {
            return Vec::new();
        }
        let mut spectrum: Vec<Complex<f64>> = (0..len)
            .map(|_| {
                let x: f64 = StandardNormal.sample(&mut self.rng);
                Complex::new(x, 0.0)
            })
            .collect();

        self.planner.plan_fft_forward(len).process(&mut spectrum);

        spectrum[0] = Complex::new(0.0, 0.0);
        for i in 1..=len / 2 {
            let freq = i as f64 * self.sample_rate / len as f64;
            spectrum[i] *= freq.powf(-0.5);
            if i < len - i {
                spectrum[len - i] = spectrum[i].conj();
            }
        }

        self.planner.plan_fft_inverse(len).process(&mut spectrum);

        let scale = 1.0 / len as f64;
        let mut output: Vec<f64> = spectrum.iter().map(|c| c.re * scale).collect();
        self.level(&mut output);
        output.into_iter().map(|x| x as f32).collect()
    }

    fn level(&mut self, block: &mut [f64]) {
        let rms = (block.iter().map(|x| x * x).sum::<f64>() / block.len() as f64).sqrt();
        if rms < 1e-12 {
            return;
        }
        match self.target_rms {
            Some(target) => {
                let gain = target / rms;
                for x in block.iter_mut() {
                    *x = soft_limit(*x * gain);
                }
            }
            None => {
                let peak = block.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
                let gain = NOISE_PEAK / peak;
                for x in block.iter_mut() {
                    *x *= gain;
                }
                self.target_rms = Some(rms * gain);
            }
        }
    }
}

// ============================================================================
// Ambient drone
// ============================================================================

/// Harmonic drone with slow amplitude modulation.
///
/// Computed from the absolute sample index, so any block boundary is
/// seamless. EQ is applied analytically as a per-partial gain.
#[derive(Debug, Clone)]
pub struct AmbientDrone {
    /// (frequency Hz, amplitude) after EQ, normalized so the peak is <= 1
    partials: Vec<(f64, f64)>,
    mod_hz: f64,
    mod_depth: f64,
    sample_rate: f64,
    position: u64,
}

impl AmbientDrone {
    pub fn new(config: &BackgroundConfig, eq: &ThreeBandEq, sample_rate: u32) -> Self {
        let shaped: Vec<(f64, f64)> = DRONE_PARTIALS
            .iter()
            .map(|&(ratio, amp)| {
                let freq = config.drone_base_hz * ratio;
                (freq, amp * eq.magnitude(freq))
            })
            .collect();

        let bound: f64 = shaped.iter().map(|(_, a)| a).sum::<f64>() * (1.0 + config.drone_mod_depth);
        let norm = if bound > 0.0 { 1.0 / bound } else { 0.0 };

        Self {
            partials: shaped.into_iter().map(|(f, a)| (f, a * norm)).collect(),
            mod_hz: config.drone_mod_hz,
            mod_depth: config.drone_mod_depth,
            sample_rate: sample_rate as f64,
            position: 0,
        }
    }

    pub fn next_block(&mut self, len: usize) -> Vec<f32> {
        let block = (0..len as u64)
            .map(|i| {
                let t = (self.position + i) as f64 / self.sample_rate;
                let modulation = 1.0 + self.mod_depth * (TAU * self.mod_hz * t).sin();
                let tone: f64 = self
                    .partials
                    .iter()
                    .map(|(freq, amp)| amp * (TAU * freq * t).sin())
                    .sum();
                (modulation * tone) as f32
            })
            .collect();
        self.position += len as u64;
        block
    }
}

// ============================================================================
// Background generator
// ============================================================================

enum Source {
    Noise { noise: PinkNoise, eq: ThreeBandEq },
    Drone(AmbientDrone),
}

/// Stateful mono background layer for one session
pub struct BackgroundGenerator {
    source: Option<Source>,
    volume: f64,
}

impl BackgroundGenerator {
    pub fn new(spec: &BackgroundSpec, config: &BackgroundConfig, seed: u64, sample_rate: u32) -> Self {
        let eq = ThreeBandEq::new(&spec.eq_gains, config, sample_rate);
        let source = if !spec.is_active() {
            None
        } else {
            match spec.kind {
                BackgroundKind::None => None,
                BackgroundKind::WhiteNoise => Some(Source::Noise {
                    noise: PinkNoise::new(seed, sample_rate),
                    eq,
                }),
                BackgroundKind::Ambient => Some(Source::Drone(AmbientDrone::new(config, &eq, sample_rate))),
            }
        };
        Self {
            source,
            volume: spec.volume,
        }
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    /// Next `len` samples scaled to the background volume, or `None` when
    /// the session has no background
    pub fn next_block(&mut self, len: usize) -> Option<Vec<f32>> {
        let mut block = match self.source.as_mut()? {
            Source::Noise { noise, eq } => {
                let mut block = noise.next_block(len);
                if !eq.is_bypass() {
                    eq.process(&mut block);
                    // EQ boost can push the block past full scale
                    let peak = slice_peak(&block);
                    if peak > 1.0 {
                        block.iter_mut().for_each(|x| *x /= peak);
                    }
                }
                block
            }
            Source::Drone(drone) => drone.next_block(len),
        };
        let volume = self.volume as f32;
        block.iter_mut().for_each(|x| *x *= volume);
        Some(block)
    }
}
