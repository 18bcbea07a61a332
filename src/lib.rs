//! Resonera - Neural Entrainment Audio Engine
//!
//! Resonera renders binaural-beat and isochronic-tone sessions for
//! brainwave entrainment. A request describes a target frequency (or a
//! sweep between two), a duration and a loudness; the engine validates it
//! against fixed safety limits and produces a stereo buffer plus metadata.
//!
//! # Architecture
//!
//! Requests flow through a statically ordered pipeline:
//! - Safety: every limit is checked up front and all violations are reported
//! - Synthesis: phase-continuous oscillators driven by a frequency envelope
//! - Background: seeded pink noise or an ambient drone, equalized and mixed
//! - Output: fades, peak normalization, metadata and WAV export

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod safety;
pub mod synth;

pub use config::EngineConfig;
pub use engine::{Engine, Metadata, SampleBuffer, SessionSpec};
pub use error::{EngineError, Result};
