//! Output assembly
//!
//! Fades, final peak normalization and session metadata. This is the last
//! stage before a buffer leaves the engine.

use std::f64::consts::PI;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::buffer::SampleBuffer;
use crate::error::Result;
use crate::safety::{BrainwaveBand, Violation};
use crate::synth::{ControlPoint, TransitionStyle};

/// Fade envelope shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    Linear,
    #[default]
    RaisedCosine,
}

impl FadeCurve {
    /// Gain at fade progress `x` in [0, 1]
    #[inline]
    pub fn gain(self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => x,
            FadeCurve::RaisedCosine => 0.5 - 0.5 * (PI * x).cos(),
        }
    }
}

/// Symmetric fade-in/out over a session of known length.
///
/// Works on absolute frame positions, so a session can be faded one
/// segment at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    curve: FadeCurve,
    /// Fade length in frames, at most half the session
    frames: usize,
    total_frames: usize,
}

impl Fade {
    pub fn new(curve: FadeCurve, fade_secs: f64, sample_rate: u32, total_frames: usize) -> Self {
        let requested = (fade_secs.max(0.0) * sample_rate as f64).round() as usize;
        Self {
            curve,
            frames: requested.min(total_frames / 2),
            total_frames,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Gain for the frame at absolute position `index`
    #[inline]
    pub fn gain_at(&self, index: usize) -> f64 {
        if self.frames == 0 {
            return 1.0;
        }
        let from_end = self.total_frames.saturating_sub(index + 1);
        let distance = index.min(from_end);
        if distance >= self.frames {
            1.0
        } else {
            self.curve.gain(distance as f64 / self.frames as f64)
        }
    }

    /// Apply the fade to a segment that starts at absolute frame `offset`
    pub fn apply(&self, buffer: &mut SampleBuffer, offset: usize) {
        let len = buffer.len();
        let touches_start = offset < self.frames;
        let touches_end = offset + len > self.total_frames.saturating_sub(self.frames);
        if !touches_start && !touches_end {
            return;
        }
        for channel in buffer.samples.iter_mut() {
            for (i, sample) in channel.iter_mut().enumerate() {
                *sample = (*sample as f64 * self.gain_at(offset + i)) as f32;
            }
        }
    }
}

/// Hex-encoded SHA-256 of the interleaved little-endian `f32` samples
pub fn checksum(buffer: &SampleBuffer) -> String {
    let mut hasher = Sha256::new();
    for sample in buffer.interleaved() {
        hasher.update(sample.to_le_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Facts about a planned session that end up in its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub base_frequency_hz: f64,
    pub target_frequency_hz: f64,
    pub carrier_hz: f64,
    pub volume: f64,
    pub transition_style: Option<TransitionStyle>,
    pub transition_points: Vec<ControlPoint>,
    pub target_band: Option<BrainwaveBand>,
    pub warnings: Vec<Violation>,
}

/// Description of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub session_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub base_frequency_hz: f64,
    pub target_frequency_hz: f64,
    pub carrier_hz: f64,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub transition_style: Option<TransitionStyle>,
    pub transition_points: Vec<ControlPoint>,
    pub target_band: Option<BrainwaveBand>,
    pub safety_validated: bool,
    pub warnings: Vec<Violation>,
    pub peak: f32,
    /// SHA-256 of the final samples
    pub checksum: String,
}

impl Metadata {
    pub fn new(info: &SessionInfo, buffer: &SampleBuffer) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            base_frequency_hz: info.base_frequency_hz,
            target_frequency_hz: info.target_frequency_hz,
            carrier_hz: info.carrier_hz,
            duration_secs: buffer.duration_secs(),
            sample_rate: buffer.sample_rate,
            channels: buffer.channels(),
            transition_style: info.transition_style,
            transition_points: info.transition_points.clone(),
            target_band: info
                .target_band
                .or_else(|| BrainwaveBand::classify(info.target_frequency_hz)),
            safety_validated: true,
            warnings: info.warnings.clone(),
            peak: buffer.peak(),
            checksum: checksum(buffer),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Applies fades and final normalization, and builds metadata
#[derive(Debug, Clone, Copy)]
pub struct OutputAssembler<'a> {
    config: &'a EngineConfig,
}

impl<'a> OutputAssembler<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Peak the finished signal may reach for a given volume
    pub fn target_peak(&self, volume: f64) -> f64 {
        volume.min(self.config.safety.peak_ceiling()) * self.config.output.headroom
    }

    /// Fade, normalize and describe a finished signal.
    ///
    /// # Arguments
    /// * `signal` - Complete session signal
    /// * `fade_secs` - Fade-in and fade-out length (clamped to half the signal)
    /// * `info` - Session facts for the metadata
    ///
    /// # Returns
    /// The final buffer, with peak exactly at the target unless silent,
    /// and its metadata
    pub fn finalize(
        &self,
        mut signal: SampleBuffer,
        fade_secs: f64,
        info: &SessionInfo,
    ) -> (SampleBuffer, Metadata) {
        let fade = Fade::new(
            self.config.output.fade_curve,
            fade_secs,
            signal.sample_rate,
            signal.len(),
        );
        fade.apply(&mut signal, 0);

        let peak = signal.peak() as f64;
        let target = self.target_peak(info.volume);
        if peak > 1e-9 {
            let gain = target / peak;
            debug!("Normalizing peak {:.4} -> {:.4} (gain {:.4})", peak, target, gain);
            signal.scale(gain as f32);
        }

        let metadata = Metadata::new(info, &signal);
        (signal, metadata)
    }
}
