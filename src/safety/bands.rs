//! Brainwave bands and the transition graph between them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A named brainwave frequency band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrainwaveBand {
    /// Deep sleep
    Delta,
    /// Deep relaxation, meditation
    Theta,
    /// Relaxed focus
    Alpha,
    /// Active thinking
    Beta,
    /// High-level cognition
    Gamma,
}

/// Band table in ascending order: (band, low Hz, high Hz)
const BAND_TABLE: [(BrainwaveBand, f64, f64); 5] = [
    (BrainwaveBand::Delta, 0.5, 4.0),
    (BrainwaveBand::Theta, 4.0, 8.0),
    (BrainwaveBand::Alpha, 8.0, 14.0),
    (BrainwaveBand::Beta, 14.0, 30.0),
    (BrainwaveBand::Gamma, 30.0, 100.0),
];

impl BrainwaveBand {
    /// All bands, lowest first
    pub const ALL: [BrainwaveBand; 5] = [
        BrainwaveBand::Delta,
        BrainwaveBand::Theta,
        BrainwaveBand::Alpha,
        BrainwaveBand::Beta,
        BrainwaveBand::Gamma,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Closed frequency interval (low, high) in Hz
    pub fn range(self) -> (f64, f64) {
        let (_, low, high) = BAND_TABLE[self.index()];
        (low, high)
    }

    /// Whether `frequency` lies inside the band's closed interval
    pub fn contains(self, frequency: f64) -> bool {
        let (low, high) = self.range();
        (low..=high).contains(&frequency)
    }

    /// Frequency used when a session names the band but no explicit frequency
    pub fn canonical_frequency(self) -> f64 {
        match self {
            BrainwaveBand::Delta => 2.0,
            BrainwaveBand::Theta => 6.0,
            BrainwaveBand::Alpha => 10.0,
            BrainwaveBand::Beta => 20.0,
            BrainwaveBand::Gamma => 40.0,
        }
    }

    /// Preferred carrier for binaural beats in this band.
    ///
    /// Delta, theta and alpha carriers are power-of-two multiples of a
    /// consonant ratio of the canonical frequency (256 = 2 x 2^7,
    /// 288 = 6 x 2^5 x 1.5, 200 = 10 x 2^4 x 1.25).
    pub fn preferred_carrier(self) -> f64 {
        match self {
            BrainwaveBand::Delta => 256.0,
            BrainwaveBand::Theta => 288.0,
            BrainwaveBand::Alpha => 200.0,
            BrainwaveBand::Beta => 200.0,
            BrainwaveBand::Gamma => 400.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BrainwaveBand::Delta => "delta",
            BrainwaveBand::Theta => "theta",
            BrainwaveBand::Alpha => "alpha",
            BrainwaveBand::Beta => "beta",
            BrainwaveBand::Gamma => "gamma",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            BrainwaveBand::Delta => "Deep sleep",
            BrainwaveBand::Theta => "Deep relaxation, meditation",
            BrainwaveBand::Alpha => "Relaxed focus",
            BrainwaveBand::Beta => "Active thinking",
            BrainwaveBand::Gamma => "High-level cognition",
        }
    }

    /// Band a frequency belongs to.
    ///
    /// Shared edges belong to the upper band (4 Hz is theta). Frequencies below
    /// delta or above gamma have no band.
    pub fn classify(frequency: f64) -> Option<BrainwaveBand> {
        BAND_TABLE
            .iter()
            .rev()
            .find(|(_, low, high)| frequency >= *low && frequency <= *high)
            .map(|(band, _, _)| *band)
    }

    /// Like `classify`, but clamps out-of-table frequencies to the nearest band
    pub fn nearest(frequency: f64) -> BrainwaveBand {
        match Self::classify(frequency) {
            Some(band) => band,
            None if frequency < BAND_TABLE[0].1 => BrainwaveBand::Delta,
            None => BrainwaveBand::Gamma,
        }
    }

    /// Next band up, if any
    pub fn higher(self) -> Option<BrainwaveBand> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Next band down, if any
    pub fn lower(self) -> Option<BrainwaveBand> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl fmt::Display for BrainwaveBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BrainwaveBand {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delta" => Ok(BrainwaveBand::Delta),
            "theta" => Ok(BrainwaveBand::Theta),
            "alpha" => Ok(BrainwaveBand::Alpha),
            "beta" => Ok(BrainwaveBand::Beta),
            "gamma" => Ok(BrainwaveBand::Gamma),
            other => Err(EngineError::invalid(
                "target_state",
                other,
                "one of delta, theta, alpha, beta, gamma",
            )),
        }
    }
}

/// Minimum safe durations (seconds) for transitions between adjacent bands.
///
/// Non-adjacent transitions walk the chain and sum every hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandTransitionMinimums {
    pub delta_to_theta: f64,
    pub theta_to_delta: f64,
    pub theta_to_alpha: f64,
    pub alpha_to_theta: f64,
    pub alpha_to_beta: f64,
    pub beta_to_alpha: f64,
    pub beta_to_gamma: f64,
    pub gamma_to_beta: f64,
}

impl Default for BandTransitionMinimums {
    fn default() -> Self {
        Self {
            delta_to_theta: 300.0,
            theta_to_delta: 360.0,
            theta_to_alpha: 180.0,
            alpha_to_theta: 240.0,
            alpha_to_beta: 120.0,
            beta_to_alpha: 180.0,
            beta_to_gamma: 240.0,
            gamma_to_beta: 300.0,
        }
    }
}

impl BandTransitionMinimums {
    /// Minimum duration of a single hop between adjacent bands
    fn hop(&self, from: BrainwaveBand, to: BrainwaveBand) -> f64 {
        use BrainwaveBand::*;
        match (from, to) {
            (Delta, Theta) => self.delta_to_theta,
            (Theta, Delta) => self.theta_to_delta,
            (Theta, Alpha) => self.theta_to_alpha,
            (Alpha, Theta) => self.alpha_to_theta,
            (Alpha, Beta) => self.alpha_to_beta,
            (Beta, Alpha) => self.beta_to_alpha,
            (Beta, Gamma) => self.beta_to_gamma,
            (Gamma, Beta) => self.gamma_to_beta,
            _ => 0.0,
        }
    }

    /// Minimum duration for moving from one band to another
    pub fn minimum(&self, from: BrainwaveBand, to: BrainwaveBand) -> f64 {
        let mut total = 0.0;
        let mut current = from;
        while current != to {
            let next = if to > current {
                current.higher()
            } else {
                current.lower()
            };
            let Some(next) = next else { break };
            total += self.hop(current, next);
            current = next;
        }
        total
    }

    /// Minimum duration for a transition between two frequencies
    pub fn minimum_for_frequencies(&self, from_hz: f64, to_hz: f64) -> f64 {
        self.minimum(BrainwaveBand::nearest(from_hz), BrainwaveBand::nearest(to_hz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_shared_edges_go_up() {
        assert_eq!(BrainwaveBand::classify(4.0), Some(BrainwaveBand::Theta));
        assert_eq!(BrainwaveBand::classify(3.99), Some(BrainwaveBand::Delta));
        assert_eq!(BrainwaveBand::classify(14.0), Some(BrainwaveBand::Beta));
        assert_eq!(BrainwaveBand::classify(100.0), Some(BrainwaveBand::Gamma));
        assert_eq!(BrainwaveBand::classify(0.2), None);
        assert_eq!(BrainwaveBand::nearest(0.2), BrainwaveBand::Delta);
    }

    #[test]
    fn test_contains_is_closed() {
        assert!(BrainwaveBand::Delta.contains(4.0));
        assert!(BrainwaveBand::Theta.contains(4.0));
        assert!(!BrainwaveBand::Alpha.contains(14.5));
    }

    #[test]
    fn test_adjacent_minimums() {
        let mins = BandTransitionMinimums::default();
        assert_eq!(mins.minimum(BrainwaveBand::Delta, BrainwaveBand::Theta), 300.0);
        assert_eq!(mins.minimum(BrainwaveBand::Theta, BrainwaveBand::Alpha), 180.0);
        assert_eq!(mins.minimum(BrainwaveBand::Alpha, BrainwaveBand::Beta), 120.0);
        assert_eq!(mins.minimum(BrainwaveBand::Beta, BrainwaveBand::Gamma), 240.0);
        assert_eq!(mins.minimum(BrainwaveBand::Alpha, BrainwaveBand::Alpha), 0.0);
    }

    #[test]
    fn test_reverse_minimums_not_shorter() {
        let mins = BandTransitionMinimums::default();
        for pair in BrainwaveBand::ALL.windows(2) {
            let up = mins.minimum(pair[0], pair[1]);
            let down = mins.minimum(pair[1], pair[0]);
            assert!(down >= up, "{} -> {} shorter than reverse", pair[1], pair[0]);
        }
    }

    #[test]
    fn test_multi_hop_sums_path() {
        let mins = BandTransitionMinimums::default();
        assert_eq!(
            mins.minimum(BrainwaveBand::Delta, BrainwaveBand::Alpha),
            300.0 + 180.0
        );
        assert_eq!(
            mins.minimum_for_frequencies(40.0, 10.0),
            300.0 + 180.0
        );
    }

    #[test]
    fn test_parse_band() {
        assert_eq!("Alpha".parse::<BrainwaveBand>().unwrap(), BrainwaveBand::Alpha);
        assert!("epsilon".parse::<BrainwaveBand>().is_err());
    }
}
