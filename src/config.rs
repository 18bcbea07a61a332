//! Engine configuration
//!
//! All limits the engine enforces live here, injected once at construction.
//! Every section deserializes with defaults, so a JSON file only needs the
//! values a deployment wants to override.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::buffer::db_to_linear;
use crate::engine::output::FadeCurve;
use crate::error::{EngineError, Result};
use crate::safety::BandTransitionMinimums;

/// Canonical output sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Length of each synthesis segment in seconds
    pub segment_secs: f64,
    /// Worker threads for batch rendering (None = one per core)
    pub worker_threads: Option<usize>,
    pub safety: SafetyLimits,
    pub carrier: CarrierConfig,
    pub isochronic: IsochronicConfig,
    pub harmonics: HarmonicConfig,
    pub background: BackgroundConfig,
    pub transition: TransitionConfig,
    pub output: OutputConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            segment_secs: 5.0,
            worker_threads: None,
            safety: SafetyLimits::default(),
            carrier: CarrierConfig::default(),
            isochronic: IsochronicConfig::default(),
            harmonics: HarmonicConfig::default(),
            background: BackgroundConfig::default(),
            transition: TransitionConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Hard safety limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLimits {
    pub min_frequency_hz: f64,
    pub max_frequency_hz: f64,
    /// Maximum rate of frequency change in Hz per second
    pub max_transition_rate: f64,
    pub min_session_secs: f64,
    pub max_session_secs: f64,
    /// Shortest sub-segment the engine will synthesize
    pub min_segment_secs: f64,
    pub max_volume: f64,
    /// Loudness of a full-scale (1.0) peak, in dB
    pub full_scale_db: f64,
    /// Loudness ceiling for any session, in dB
    pub max_output_db: f64,
    pub photosensitive_low_hz: f64,
    pub photosensitive_high_hz: f64,
    /// Isochronic depth above which flicker-band modulation is rejected
    pub photosensitive_depth_threshold: f64,
    pub band_minimums: BandTransitionMinimums,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            min_frequency_hz: 0.1,
            max_frequency_hz: 100.0,
            max_transition_rate: 2.0,
            min_session_secs: 60.0,
            max_session_secs: 7200.0,
            min_segment_secs: 0.1,
            max_volume: 1.0,
            full_scale_db: 85.0,
            max_output_db: 85.0,
            photosensitive_low_hz: 15.0,
            photosensitive_high_hz: 25.0,
            photosensitive_depth_threshold: 0.5,
            band_minimums: BandTransitionMinimums::default(),
        }
    }
}

impl SafetyLimits {
    /// Largest linear peak allowed by the loudness ceiling
    pub fn peak_ceiling(&self) -> f64 {
        db_to_linear(self.max_output_db - self.full_scale_db).min(1.0)
    }
}

/// Carrier frequency search bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    pub min_hz: f64,
    pub max_hz: f64,
    /// Default carrier for isochronic tones
    pub isochronic_hz: f64,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            min_hz: 200.0,
            max_hz: 1000.0,
            isochronic_hz: 300.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsochronicConfig {
    /// Raised-cosine ramp on each on/off edge (0 = hard square)
    pub edge_secs: f64,
}

impl Default for IsochronicConfig {
    fn default() -> Self {
        Self { edge_secs: 0.001 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicConfig {
    /// Upper bound on the harmonic count a session may request
    pub max_harmonics: usize,
    /// No overtone may exceed this frequency
    pub ceiling_hz: f64,
    /// Harmonics quieter than this fraction of the fundamental are dropped
    pub min_relative_amplitude: f64,
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        Self {
            max_harmonics: 8,
            ceiling_hz: 100.0,
            min_relative_amplitude: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub drone_base_hz: f64,
    pub drone_mod_hz: f64,
    pub drone_mod_depth: f64,
    /// Boundary between the low and mid EQ bands
    pub low_crossover_hz: f64,
    /// Boundary between the mid and high EQ bands
    pub high_crossover_hz: f64,
    pub max_eq_gain_db: f64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            drone_base_hz: 100.0,
            drone_mod_hz: 0.1,
            drone_mod_depth: 0.1,
            low_crossover_hz: 250.0,
            high_crossover_hz: 4000.0,
            max_eq_gain_db: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Maximum interpolation error between envelope control points
    pub tolerance_hz: f64,
    pub enforce_band_minimums: bool,
    /// Recursion limit for adaptive envelope subdivision
    pub max_subdivision_depth: u32,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            tolerance_hz: 0.1,
            enforce_band_minimums: true,
            max_subdivision_depth: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub fade_secs: f64,
    pub fade_curve: FadeCurve,
    /// Fraction of the volume budget the final peak may reach
    pub headroom: f64,
    /// Bit depth used when quantizing for export
    pub bit_depth: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fade_secs: 2.5,
            fade_curve: FadeCurve::RaisedCosine,
            headroom: 0.95,
            bit_depth: 16,
        }
    }
}

fn config_error(reason: impl Into<String>) -> EngineError {
    EngineError::Config {
        reason: reason.into(),
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file and validate it
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Nyquist frequency for the configured sample rate
    pub fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    /// Number of samples in each synthesis segment
    pub fn segment_samples(&self) -> usize {
        ((self.segment_secs * self.sample_rate as f64).round() as usize).max(1)
    }

    /// Check that the configuration is internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000 {
            return Err(config_error(format!(
                "sample_rate {} is below 8000 Hz",
                self.sample_rate
            )));
        }
        if !(self.segment_secs > 0.0) {
            return Err(config_error("segment_secs must be positive"));
        }
        if self.worker_threads == Some(0) {
            return Err(config_error("worker_threads must be at least 1"));
        }

        let s = &self.safety;
        if !(s.min_frequency_hz > 0.0 && s.min_frequency_hz < s.max_frequency_hz) {
            return Err(config_error(
                "safety frequency range must satisfy 0 < min < max",
            ));
        }
        if !(s.max_transition_rate > 0.0) {
            return Err(config_error("max_transition_rate must be positive"));
        }
        if !(s.min_segment_secs > 0.0 && s.min_session_secs <= s.max_session_secs) {
            return Err(config_error("session duration bounds are inconsistent"));
        }
        if !(0.0..=1.0).contains(&s.max_volume) {
            return Err(config_error("max_volume must lie in 0.0-1.0"));
        }
        if s.photosensitive_low_hz > s.photosensitive_high_hz {
            return Err(config_error("photosensitive band is inverted"));
        }

        if !(self.carrier.min_hz > 0.0 && self.carrier.min_hz <= self.carrier.max_hz) {
            return Err(config_error("carrier search range is inconsistent"));
        }
        if self.carrier.max_hz + s.max_frequency_hz >= self.nyquist() {
            return Err(config_error(
                "carrier.max_hz plus the highest target frequency exceeds Nyquist",
            ));
        }
        if !(self.isochronic.edge_secs >= 0.0) {
            return Err(config_error("isochronic.edge_secs must not be negative"));
        }
        if self.harmonics.max_harmonics == 0 {
            return Err(config_error("harmonics.max_harmonics must be at least 1"));
        }
        if self.background.low_crossover_hz >= self.background.high_crossover_hz
            || self.background.high_crossover_hz >= self.nyquist()
        {
            return Err(config_error("background EQ crossovers are out of order"));
        }
        if !(self.transition.tolerance_hz > 0.0) {
            return Err(config_error("transition.tolerance_hz must be positive"));
        }
        if !(self.output.headroom > 0.0 && self.output.headroom <= 1.0) {
            return Err(config_error("output.headroom must lie in (0, 1]"));
        }
        if !(self.output.fade_secs >= 0.0) {
            return Err(config_error("output.fade_secs must not be negative"));
        }
        if !matches!(self.output.bit_depth, 16 | 24 | 32) {
            return Err(config_error(format!(
                "output.bit_depth {} is not one of 16, 24, 32",
                self.output.bit_depth
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.safety.max_transition_rate, 2.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "sample_rate": 48000, "safety": { "max_transition_rate": 1.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.safety.max_transition_rate, 1.0);
        assert_eq!(config.safety.max_frequency_hz, 100.0);
        assert_eq!(config.output.bit_depth, 16);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = EngineConfig::from_json_str(r#"{ "output": { "bit_depth": 12 } }"#);
        assert!(matches!(result, Err(EngineError::Config { .. })));

        let result = EngineConfig::from_json_str(r#"{ "sample_rate": 100 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_peak_ceiling() {
        let mut limits = SafetyLimits::default();
        assert_eq!(limits.peak_ceiling(), 1.0);

        limits.max_output_db = 79.0;
        assert!((limits.peak_ceiling() - 0.501).abs() < 0.001);
    }

    #[test]
    fn test_segment_samples() {
        let config = EngineConfig::default();
        assert_eq!(config.segment_samples(), 220500);
    }
}
