//! Safety limits for entrainment sessions
//!
//! Bands, band-to-band transition minimums, validation reports and the
//! limiter that produces them.

pub mod bands;
pub mod limiter;
pub mod report;

pub use bands::{BandTransitionMinimums, BrainwaveBand};
pub use limiter::SafetyLimiter;
pub use report::{SafetyReport, Violation, ViolationKind};
