//! Three-band background equalizer
//!
//! Low shelf, mid peak and high shelf biquads (Audio EQ Cookbook) whose
//! corner frequencies come from the configured crossovers. Only the
//! background layer passes through this EQ.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;

use crate::config::BackgroundConfig;
use crate::engine::session::EqGains;

/// Shelf slope of 1 (Q = 1/sqrt(2))
const SHELF_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterType {
    LowShelf,
    Peak,
    HighShelf,
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Calculate coefficients using Audio EQ Cookbook formulas
    fn calculate(filter_type: FilterType, sample_rate: f64, frequency: f64, gain_db: f64, q: f64) -> Self {
        let freq = frequency.clamp(20.0, sample_rate / 2.0 - 1.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q.clamp(0.1, 10.0));
        let a = 10.0_f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Peak => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterType::LowShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::HighShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// |H| at `frequency`
    fn magnitude(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let z1 = Complex::from_polar(1.0, -w);
        let z2 = z1 * z1;
        let num = self.b0 + z1 * self.b1 + z2 * self.b2;
        let den = 1.0 + z1 * self.a1 + z2 * self.a2;
        (num / den).norm()
    }
}

/// Biquad delay line for one filter
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// Low/mid/high EQ for a single channel.
///
/// Filter state persists across calls, so a background rendered in segments
/// is filtered as one continuous stream.
#[derive(Debug, Clone)]
pub struct ThreeBandEq {
    /// Filters with a non-zero gain, in processing order
    filters: Vec<(BiquadCoeffs, BiquadState)>,
    sample_rate: f64,
}

impl ThreeBandEq {
    /// # Arguments
    /// * `gains` - Low, mid and high gains in dB
    /// * `config` - Crossover frequencies
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(gains: &EqGains, config: &BackgroundConfig, sample_rate: u32) -> Self {
        let sr = sample_rate as f64;
        let low = config.low_crossover_hz;
        let high = config.high_crossover_hz;

        // Mid band centred geometrically, bandwidth spanning both crossovers
        let centre = (low * high).sqrt();
        let octaves = (high / low).log2();
        let mid_q = 2f64.powf(octaves / 2.0) / (2f64.powf(octaves) - 1.0);

        let bands = [
            (FilterType::LowShelf, low, gains.low, SHELF_Q),
            (FilterType::Peak, centre, gains.mid, mid_q),
            (FilterType::HighShelf, high, gains.high, SHELF_Q),
        ];
        let filters = bands
            .iter()
            .filter(|(_, _, gain, _)| *gain != 0.0)
            .map(|&(kind, freq, gain, q)| {
                (BiquadCoeffs::calculate(kind, sr, freq, gain, q), BiquadState::default())
            })
            .collect();

        Self {
            filters,
            sample_rate: sr,
        }
    }

    /// True when every band gain is 0 dB
    pub fn is_bypass(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filter samples in place
    pub fn process(&mut self, samples: &mut [f32]) {
        if self.is_bypass() {
            return;
        }
        for sample in samples.iter_mut() {
            let mut value = *sample as f64;
            for (coeffs, state) in self.filters.iter_mut() {
                value = state.process(value, coeffs);
            }
            *sample = value as f32;
        }
    }

    /// Combined linear gain of all bands at `frequency`
    pub fn magnitude(&self, frequency: f64) -> f64 {
        self.filters
            .iter()
            .map(|(coeffs, _)| coeffs.magnitude(frequency, self.sample_rate))
            .product()
    }
}
