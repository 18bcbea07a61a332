//! Entrainment Engine
//!
//! The public entry point. An `Engine` owns an immutable `EngineConfig` and
//! turns `SessionSpec`s into finished buffers:
//! - validation through the safety limiter
//! - planning (envelope, carrier, voice gains)
//! - segment-by-segment synthesis and background mixing
//! - fades, normalization and metadata
//!
//! Nothing is shared between calls, so one engine can serve any number of
//! threads.

pub mod buffer;
pub mod io;
pub mod output;
pub mod pipeline;
pub mod session;

use std::path::Path;

use log::{info, warn};
use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::dsp::renormalize_channels;
use crate::error::{EngineError, Result};
use crate::safety::{SafetyLimiter, SafetyReport};
use crate::synth::TransitionController;

pub use buffer::{ChannelLayout, SampleBuffer};
pub use io::{write_wav, WavSink};
pub use output::{FadeCurve, Metadata, OutputAssembler, SessionInfo};
pub use pipeline::{SessionPlan, SessionRenderer, SessionStream};
pub use session::{
    BackgroundKind, BackgroundSpec, EqGains, HarmonicSpec, IsochronicSpec, SessionSpec,
    TransitionSpec,
};
pub use crate::synth::Waypoint;

/// Session generator bound to one configuration
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create an engine, rejecting an inconsistent configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the safety limiter without synthesizing anything
    pub fn validate(&self, spec: &SessionSpec) -> SafetyReport {
        SafetyLimiter::new(&self.config).validate(spec)
    }

    /// Validate and plan, mapping a failing report to the matching error
    fn prepare(&self, spec: &SessionSpec) -> Result<SessionPlan> {
        let report = self.validate(spec);
        if !report.is_safe {
            return Err(self.rejection(spec, report));
        }
        for warning in &report.warnings {
            warn!("{}: {}", warning.parameter, warning.reason);
        }
        SessionPlan::build(&self.config, spec, report.warnings)
    }

    /// Transition-only failures become `TransitionTooFast` for the first
    /// leg that is too short; anything else is a `SafetyViolation`.
    fn rejection(&self, spec: &SessionSpec, report: SafetyReport) -> EngineError {
        if !report.only_transition_violations() {
            return EngineError::SafetyViolation { report };
        }
        let Some(path) = spec.transition_path() else {
            return EngineError::SafetyViolation { report };
        };
        let controller = TransitionController::new(&self.config);
        for leg in path.windows(2) {
            let (from, to) = (leg[0], leg[1]);
            let duration = to.time_secs - from.time_secs;
            let too_fast = matches!(
                controller.plan(from.frequency_hz, to.frequency_hz, duration, to.style),
                Err(EngineError::TransitionTooFast { .. })
            );
            if too_fast {
                return EngineError::TransitionTooFast {
                    from_hz: from.frequency_hz,
                    to_hz: to.frequency_hz,
                    duration_secs: duration,
                    min_duration_secs: controller.recommended_duration(
                        from.frequency_hz,
                        to.frequency_hz,
                        to.style,
                    ),
                };
            }
        }
        EngineError::SafetyViolation { report }
    }

    /// Generate a complete session.
    ///
    /// # Arguments
    /// * `spec` - The session request
    ///
    /// # Returns
    /// A stereo buffer of round(duration * sample_rate) frames and its
    /// metadata. Identical specs produce identical samples.
    pub fn generate(&self, spec: &SessionSpec) -> Result<(SampleBuffer, Metadata)> {
        let plan = self.prepare(spec)?;
        info!(
            "Generating {:.1}s session at {:.2} -> {:.2} Hz",
            spec.duration_secs, plan.info.base_frequency_hz, plan.info.target_frequency_hz
        );

        let mut signal = SampleBuffer::with_capacity(
            plan.total_frames,
            ChannelLayout::Stereo,
            self.config.sample_rate,
        );
        for segment in SessionRenderer::new(&self.config, &plan, spec) {
            signal.append(&segment)?;
        }
        renormalize_channels(&mut signal);

        let (buffer, metadata) =
            OutputAssembler::new(&self.config).finalize(signal, plan.fade_secs, &plan.info);
        info!(
            "Session {} complete: {} frames, peak {:.3}",
            metadata.session_id,
            buffer.len(),
            metadata.peak
        );
        Ok((buffer, metadata))
    }

    /// Validate a session and return an iterator over its finished segments
    pub fn stream(&self, spec: &SessionSpec) -> Result<SessionStream> {
        let plan = self.prepare(spec)?;
        info!(
            "Streaming {:.1}s session in {:.1}s segments",
            spec.duration_secs, self.config.segment_secs
        );
        Ok(SessionStream::new(&self.config, plan, spec))
    }

    /// Generate independent sessions in parallel.
    ///
    /// Results come back in input order, one per spec.
    pub fn generate_batch(&self, specs: &[SessionSpec]) -> Vec<Result<(SampleBuffer, Metadata)>> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.config.worker_threads {
            builder = builder.num_threads(threads);
        }
        match builder.build() {
            Ok(pool) => pool.install(|| specs.par_iter().map(|spec| self.generate(spec)).collect()),
            Err(e) => {
                warn!("Falling back to sequential batch: {}", e);
                specs.iter().map(|spec| self.generate(spec)).collect()
            }
        }
    }

    /// Generate a session and write it as WAV.
    ///
    /// `bit_depth` overrides `output.bit_depth` from the configuration.
    pub fn export(
        &self,
        spec: &SessionSpec,
        path: &Path,
        bit_depth: Option<u16>,
    ) -> Result<Metadata> {
        let (buffer, metadata) = self.generate(spec)?;
        write_wav(path, &buffer, bit_depth.unwrap_or(self.config.output.bit_depth))?;
        Ok(metadata)
    }

    /// Stream a session straight to a WAV file, one segment at a time.
    ///
    /// # Returns
    /// The number of frames written
    pub fn export_streamed(
        &self,
        spec: &SessionSpec,
        path: &Path,
        bit_depth: Option<u16>,
    ) -> Result<u64> {
        let stream = self.stream(spec)?;
        let bit_depth = bit_depth.unwrap_or(self.config.output.bit_depth);
        let mut sink = WavSink::create(path, 2, self.config.sample_rate, bit_depth)?;
        for segment in stream {
            sink.write(&segment)?;
        }
        let frames = sink.finalize()?;
        info!("Streamed {} frames to {}", frames, path.display());
        Ok(frames)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_defaults()
    }
}
