//! Session requests
//!
//! A `SessionSpec` is the request an external caller hands to the engine.
//! It is plain data: the engine borrows it read-only and never mutates it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::safety::BrainwaveBand;
use crate::synth::{TransitionStyle, Waypoint};

fn default_volume() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

/// A complete request for one entrainment session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSpec {
    /// Named target band; resolves to its canonical frequency when no
    /// explicit frequency or transition is given
    #[serde(default)]
    pub target_state: Option<BrainwaveBand>,
    /// Entrainment frequency in Hz
    #[serde(default)]
    pub frequency: Option<f64>,
    pub duration_secs: f64,
    #[serde(default = "default_volume")]
    pub volume: f64,
    /// Frequency sweep; takes precedence over `frequency`
    #[serde(default)]
    pub transition: Option<TransitionSpec>,
    /// Multi-state path; takes precedence over `transition` and `frequency`.
    /// The last frequency holds for the rest of the session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waypoints: Vec<Waypoint>,
    /// Binaural carrier in Hz (chosen automatically when absent)
    #[serde(default)]
    pub carrier: Option<f64>,
    #[serde(default = "default_true")]
    pub binaural: bool,
    #[serde(default)]
    pub isochronic: IsochronicSpec,
    #[serde(default)]
    pub background: BackgroundSpec,
    #[serde(default)]
    pub harmonics: HarmonicSpec,
    /// Fade-in/out length in seconds (configured default when absent)
    #[serde(default)]
    pub fade_secs: Option<f64>,
    /// Seed for every random source in the render
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub from_hz: f64,
    pub to_hz: f64,
    #[serde(default)]
    pub style: TransitionStyle,
    /// Length of the sweep; the end frequency holds for the rest of the
    /// session. Defaults to the whole session.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsochronicSpec {
    pub enabled: bool,
    pub carrier_hz: Option<f64>,
    /// Fraction of each cycle the tone is on
    pub duty_cycle: f64,
    /// Modulation depth; 1.0 gates the carrier fully off
    pub depth: f64,
}

impl Default for IsochronicSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            carrier_hz: None,
            duty_cycle: 0.5,
            depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundKind {
    #[default]
    None,
    WhiteNoise,
    Ambient,
}

/// Per-band background EQ gains in dB
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EqGains {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl EqGains {
    pub fn is_flat(&self) -> bool {
        self.low == 0.0 && self.mid == 0.0 && self.high == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundSpec {
    pub kind: BackgroundKind,
    pub volume: f64,
    pub eq_gains: EqGains,
}

impl Default for BackgroundSpec {
    fn default() -> Self {
        Self {
            kind: BackgroundKind::None,
            volume: 0.3,
            eq_gains: EqGains::default(),
        }
    }
}

impl BackgroundSpec {
    pub fn is_active(&self) -> bool {
        self.kind != BackgroundKind::None && self.volume > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicSpec {
    pub enabled: bool,
    pub count: usize,
    pub decay: f64,
    /// Share of the volume budget given to the overtones
    pub weight: f64,
}

impl Default for HarmonicSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            count: 5,
            decay: 0.7,
            weight: 0.2,
        }
    }
}

impl SessionSpec {
    /// Constant-frequency session
    pub fn new(frequency: f64, duration_secs: f64, volume: f64) -> Self {
        Self {
            target_state: None,
            frequency: Some(frequency),
            duration_secs,
            volume,
            transition: None,
            waypoints: Vec::new(),
            carrier: None,
            binaural: true,
            isochronic: IsochronicSpec::default(),
            background: BackgroundSpec::default(),
            harmonics: HarmonicSpec::default(),
            fade_secs: None,
            seed: 0,
        }
    }

    /// Session at a band's canonical frequency
    pub fn for_band(band: BrainwaveBand, duration_secs: f64, volume: f64) -> Self {
        Self {
            target_state: Some(band),
            frequency: None,
            ..Self::new(band.canonical_frequency(), duration_secs, volume)
        }
    }

    pub fn with_transition(mut self, from_hz: f64, to_hz: f64, style: TransitionStyle) -> Self {
        self.transition = Some(TransitionSpec {
            from_hz,
            to_hz,
            style,
            duration_secs: None,
        });
        self
    }

    /// Move through `waypoints` in order
    pub fn with_waypoints(mut self, waypoints: Vec<Waypoint>) -> Self {
        self.waypoints = waypoints;
        self
    }

    /// Limit the sweep to the first `secs` of the session
    pub fn with_transition_duration(mut self, secs: f64) -> Self {
        if let Some(transition) = self.transition.as_mut() {
            transition.duration_secs = Some(secs);
        }
        self
    }

    pub fn with_target_state(mut self, band: BrainwaveBand) -> Self {
        self.target_state = Some(band);
        self
    }

    pub fn with_carrier(mut self, carrier_hz: f64) -> Self {
        self.carrier = Some(carrier_hz);
        self
    }

    pub fn with_binaural(mut self, enabled: bool) -> Self {
        self.binaural = enabled;
        self
    }

    pub fn with_isochronic(mut self, duty_cycle: f64, depth: f64) -> Self {
        self.isochronic = IsochronicSpec {
            enabled: true,
            duty_cycle,
            depth,
            ..self.isochronic
        };
        self
    }

    pub fn with_background(mut self, kind: BackgroundKind, volume: f64, eq_gains: EqGains) -> Self {
        self.background = BackgroundSpec {
            kind,
            volume,
            eq_gains,
        };
        self
    }

    pub fn with_harmonics(mut self, count: usize, decay: f64, weight: f64) -> Self {
        self.harmonics = HarmonicSpec {
            enabled: true,
            count,
            decay,
            weight,
        };
        self
    }

    pub fn with_fade(mut self, secs: f64) -> Self {
        self.fade_secs = Some(secs);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Start and end entrainment frequencies, if any can be resolved
    pub fn frequency_range(&self) -> Option<(f64, f64)> {
        if let (Some(first), Some(last)) = (self.waypoints.first(), self.waypoints.last()) {
            return Some((first.frequency_hz, last.frequency_hz));
        }
        if let Some(t) = &self.transition {
            return Some((t.from_hz, t.to_hz));
        }
        self.frequency
            .or_else(|| self.target_state.map(BrainwaveBand::canonical_frequency))
            .map(|f| (f, f))
    }

    /// Lowest and highest entrainment frequency the session passes through
    pub fn frequency_bounds(&self) -> Option<(f64, f64)> {
        if !self.waypoints.is_empty() {
            let frequencies = self.waypoints.iter().map(|w| w.frequency_hz);
            let low = frequencies.clone().fold(f64::INFINITY, f64::min);
            let high = frequencies.fold(f64::NEG_INFINITY, f64::max);
            return Some((low, high));
        }
        self.frequency_range()
            .map(|(start, end)| (start.min(end), start.max(end)))
    }

    /// The frequency path as waypoints, or `None` for a constant session.
    ///
    /// A single `transition` becomes a two-waypoint path.
    pub fn transition_path(&self) -> Option<Vec<Waypoint>> {
        if !self.waypoints.is_empty() {
            return Some(self.waypoints.clone());
        }
        self.transition.as_ref().map(|t| {
            vec![
                Waypoint::new(0.0, t.from_hz, t.style),
                Waypoint::new(self.transition_secs(), t.to_hz, t.style),
            ]
        })
    }

    /// Frequency the session starts at
    pub fn base_frequency(&self) -> Option<f64> {
        self.frequency_range().map(|(start, _)| start)
    }

    /// Frequency the session settles on
    pub fn target_frequency(&self) -> Option<f64> {
        self.frequency_range().map(|(_, end)| end)
    }

    /// Length of the frequency sweep in seconds (0 when there is none)
    pub fn transition_secs(&self) -> f64 {
        if let Some(last) = self.waypoints.last() {
            return last.time_secs;
        }
        match &self.transition {
            Some(t) => t.duration_secs.unwrap_or(self.duration_secs),
            None => 0.0,
        }
    }

    /// Name of the parameter that carries the target frequency
    pub fn target_parameter(&self) -> &'static str {
        if !self.waypoints.is_empty() {
            "waypoints"
        } else if self.transition.is_some() {
            "transition.to_hz"
        } else if self.frequency.is_some() {
            "frequency"
        } else {
            "target_state"
        }
    }
}
