//! Background processing: noise and drone sources, EQ, and mixing

pub mod equalizer;
pub mod mixer;
pub mod noise;

pub use equalizer::ThreeBandEq;
pub use mixer::{mix_into, renormalize_channels, BackgroundMixer};
pub use noise::{AmbientDrone, BackgroundGenerator, PinkNoise};
