//! Signal generation
//!
//! Oscillators, frequency transitions, binaural/isochronic voices and
//! harmonic overtones.

pub mod binaural;
pub mod harmonics;
pub mod oscillator;
pub mod transition;

pub use binaural::{IsochronicSettings, Synthesizer, VoiceBank, VoiceSettings};
pub use harmonics::{HarmonicCalculator, OvertoneGenerator, OvertoneVoice, Partial};
pub use oscillator::{sine, Oscillator};
pub use transition::{
    ControlPoint, EnvelopeCursor, FrequencyEnvelope, TransitionController, TransitionStyle,
    Waypoint,
};
