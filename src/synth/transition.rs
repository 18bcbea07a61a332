//! Frequency transitions
//!
//! Plans a frequency-over-time curve between two entrainment frequencies, or
//! through a sequence of waypoints, and discretizes it into a piecewise-linear
//! `FrequencyEnvelope`. A plan is rejected, never stretched, when its steepest
//! slope would exceed the configured maximum rate.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Sigmoid steepness: 95% of the transition completes inside the window,
/// i.e. sigma(k/2) = 0.975, so k = 2 ln 39.
const SIGMOID_STEEPNESS: f64 = 7.327_123_292_259_3;

const RATE_EPSILON: f64 = 1e-9;

/// Shape of a frequency transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    #[default]
    Linear,
    Exponential,
    Sigmoid,
}

impl TransitionStyle {
    pub fn name(self) -> &'static str {
        match self {
            TransitionStyle::Linear => "linear",
            TransitionStyle::Exponential => "exponential",
            TransitionStyle::Sigmoid => "sigmoid",
        }
    }

    /// Frequency at normalized progress `u` in [0, 1]
    pub fn frequency_at(self, start: f64, end: f64, u: f64) -> f64 {
        let u = u.clamp(0.0, 1.0);
        match self {
            TransitionStyle::Linear => start + (end - start) * u,
            TransitionStyle::Exponential => start * (end / start).powf(u),
            TransitionStyle::Sigmoid => {
                let raw = logistic(SIGMOID_STEEPNESS * (u - 0.5));
                let floor = logistic(-SIGMOID_STEEPNESS * 0.5);
                start + (end - start) * (raw - floor) / sigmoid_span()
            }
        }
    }

    /// Steepest |df/du| over the curve. Divide by the duration for Hz/s.
    pub fn peak_slope(self, start: f64, end: f64) -> f64 {
        let delta = (end - start).abs();
        match self {
            TransitionStyle::Linear => delta,
            TransitionStyle::Exponential => start.max(end) * (end / start).ln().abs(),
            TransitionStyle::Sigmoid => delta * SIGMOID_STEEPNESS * 0.25 / sigmoid_span(),
        }
    }
}

impl std::fmt::Display for TransitionStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TransitionStyle {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(TransitionStyle::Linear),
            "exponential" => Ok(TransitionStyle::Exponential),
            "sigmoid" => Ok(TransitionStyle::Sigmoid),
            other => Err(EngineError::invalid(
                "style",
                other,
                "one of linear, exponential, sigmoid",
            )),
        }
    }
}

#[inline]
fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fraction of the raw logistic swing inside the window (0.95)
#[inline]
fn sigmoid_span() -> f64 {
    logistic(SIGMOID_STEEPNESS * 0.5) - logistic(-SIGMOID_STEEPNESS * 0.5)
}

// ============================================================================
// Frequency Envelope
// ============================================================================

/// One `(time, frequency)` control point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub time_secs: f64,
    pub frequency_hz: f64,
}

impl ControlPoint {
    pub fn new(time_secs: f64, frequency_hz: f64) -> Self {
        Self {
            time_secs,
            frequency_hz,
        }
    }
}

/// Piecewise-linear frequency curve.
///
/// Control point times start at 0 and strictly increase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyEnvelope {
    points: Vec<ControlPoint>,
}

impl FrequencyEnvelope {
    pub fn new(points: Vec<ControlPoint>) -> Result<Self> {
        if points.len() < 2 {
            return Err(EngineError::invalid(
                "envelope",
                format!("{} point(s)", points.len()),
                "at least two control points",
            ));
        }
        if points[0].time_secs != 0.0 {
            return Err(EngineError::invalid(
                "envelope",
                points[0].time_secs,
                "first control point at time 0",
            ));
        }
        for pair in points.windows(2) {
            if !(pair[1].time_secs > pair[0].time_secs) {
                return Err(EngineError::invalid(
                    "envelope",
                    pair[1].time_secs,
                    "strictly increasing control point times",
                ));
            }
        }
        if points.iter().any(|p| !p.frequency_hz.is_finite()) {
            return Err(EngineError::invalid(
                "envelope",
                "non-finite frequency",
                "finite control point frequencies",
            ));
        }
        Ok(Self { points })
    }

    /// A flat envelope holding `frequency` for `duration_secs`
    pub fn constant(frequency: f64, duration_secs: f64) -> Self {
        Self {
            points: vec![
                ControlPoint::new(0.0, frequency),
                ControlPoint::new(duration_secs, frequency),
            ],
        }
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    pub fn duration(&self) -> f64 {
        self.points[self.points.len() - 1].time_secs
    }

    pub fn start_frequency(&self) -> f64 {
        self.points[0].frequency_hz
    }

    pub fn end_frequency(&self) -> f64 {
        self.points[self.points.len() - 1].frequency_hz
    }

    pub fn min_frequency(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.frequency_hz)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn max_frequency(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.frequency_hz)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Largest slope between consecutive control points, in Hz/s
    pub fn max_slope(&self) -> f64 {
        self.points
            .windows(2)
            .map(|p| (p[1].frequency_hz - p[0].frequency_hz).abs() / (p[1].time_secs - p[0].time_secs))
            .fold(0.0, f64::max)
    }

    /// Interpolated frequency at `time_secs`, clamped to the envelope ends
    pub fn frequency_at(&self, time_secs: f64) -> f64 {
        let index = self.points.partition_point(|p| p.time_secs <= time_secs);
        self.interpolate(index.saturating_sub(1), time_secs)
    }

    fn interpolate(&self, index: usize, time_secs: f64) -> f64 {
        let Some(next) = self.points.get(index + 1) else {
            return self.end_frequency();
        };
        let current = self.points[index];
        if time_secs <= current.time_secs {
            return current.frequency_hz;
        }
        let u = (time_secs - current.time_secs) / (next.time_secs - current.time_secs);
        current.frequency_hz + (next.frequency_hz - current.frequency_hz) * u.min(1.0)
    }

    /// Extend the envelope to `duration_secs` by holding the end frequency
    pub fn extend_hold(mut self, duration_secs: f64) -> Self {
        if duration_secs > self.duration() {
            let end = self.end_frequency();
            self.points.push(ControlPoint::new(duration_secs, end));
        }
        self
    }
}

/// One state on a multi-state path: the frequency reached at `time_secs`,
/// approached along `style` from the previous waypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub time_secs: f64,
    pub frequency_hz: f64,
    #[serde(default)]
    pub style: TransitionStyle,
}

impl Waypoint {
    pub fn new(time_secs: f64, frequency_hz: f64, style: TransitionStyle) -> Self {
        Self {
            time_secs,
            frequency_hz,
            style,
        }
    }
}

/// Sequential reader over an envelope.
///
/// Lookups must be made at non-decreasing times; each one is amortized O(1).
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCursor {
    index: usize,
}

impl EnvelopeCursor {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn frequency_at(&mut self, envelope: &FrequencyEnvelope, time_secs: f64) -> f64 {
        let points = envelope.points();
        while self.index + 1 < points.len() && points[self.index + 1].time_secs <= time_secs {
            self.index += 1;
        }
        envelope.interpolate(self.index, time_secs)
    }
}

// ============================================================================
// Transition Controller
// ============================================================================

/// Plans safe frequency transitions under the configured rate limits
#[derive(Debug, Clone, Copy)]
pub struct TransitionController<'a> {
    config: &'a EngineConfig,
}

impl<'a> TransitionController<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    fn max_rate(&self) -> f64 {
        self.config.safety.max_transition_rate
    }

    fn band_minimum(&self, start: f64, end: f64) -> f64 {
        if self.config.transition.enforce_band_minimums {
            self.config
                .safety
                .band_minimums
                .minimum_for_frequencies(start, end)
        } else {
            0.0
        }
    }

    /// Shortest duration whose steepest slope fits the rate limit
    pub fn rate_minimum(&self, start: f64, end: f64, style: TransitionStyle) -> f64 {
        style.peak_slope(start, end) / self.max_rate()
    }

    /// Plan a transition and discretize it.
    ///
    /// # Arguments
    /// * `start` - Starting frequency in Hz
    /// * `end` - Ending frequency in Hz
    /// * `duration` - Transition length in seconds
    /// * `style` - Curve shape
    ///
    /// # Returns
    /// An envelope whose linear interpolation stays within the configured
    /// tolerance of the curve, or `TransitionTooFast`.
    pub fn plan(
        &self,
        start: f64,
        end: f64,
        duration: f64,
        style: TransitionStyle,
    ) -> Result<FrequencyEnvelope> {
        if !(start.is_finite() && start > 0.0) {
            return Err(EngineError::invalid("start", start, "a positive frequency"));
        }
        if !(end.is_finite() && end > 0.0) {
            return Err(EngineError::invalid("end", end, "a positive frequency"));
        }
        if !(duration.is_finite() && duration > 0.0) {
            return Err(EngineError::invalid("duration", duration, "a positive duration"));
        }

        let slope = style.peak_slope(start, end) / duration;
        let band_minimum = self.band_minimum(start, end);
        if slope > self.max_rate() + RATE_EPSILON || duration + RATE_EPSILON < band_minimum {
            return Err(EngineError::TransitionTooFast {
                from_hz: start,
                to_hz: end,
                duration_secs: duration,
                min_duration_secs: self.rate_minimum(start, end, style).max(band_minimum),
            });
        }

        if start == end {
            return Ok(FrequencyEnvelope::constant(start, duration));
        }

        let mut points = vec![ControlPoint::new(0.0, start)];
        self.subdivide(start, end, duration, style, 0.0, 1.0, 0, &mut points);
        debug!(
            "Planned {} transition {:.2} -> {:.2} Hz over {:.1}s with {} control points",
            style,
            start,
            end,
            duration,
            points.len()
        );
        FrequencyEnvelope::new(points)
    }

    /// Plan a path through ordered waypoints.
    ///
    /// Each leg is planned on its own, so every hop is held to the rate
    /// limit and its band-pair minimum. The first waypoint must sit at time 0.
    ///
    /// # Returns
    /// One envelope spanning all legs, or the first leg's `TransitionTooFast`
    pub fn plan_path(&self, waypoints: &[Waypoint]) -> Result<FrequencyEnvelope> {
        let Some(first) = waypoints.first() else {
            return Err(EngineError::invalid("waypoints", "none", "at least two waypoints"));
        };
        if waypoints.len() < 2 {
            return Err(EngineError::invalid("waypoints", "1 waypoint", "at least two waypoints"));
        }
        if first.time_secs != 0.0 {
            return Err(EngineError::invalid(
                "waypoints",
                first.time_secs,
                "first waypoint at time 0",
            ));
        }

        let mut points = vec![ControlPoint::new(0.0, first.frequency_hz)];
        for leg in waypoints.windows(2) {
            let (from, to) = (leg[0], leg[1]);
            let envelope = self.plan(
                from.frequency_hz,
                to.frequency_hz,
                to.time_secs - from.time_secs,
                to.style,
            )?;
            points.extend(
                envelope.points()[1..]
                    .iter()
                    .map(|p| ControlPoint::new(from.time_secs + p.time_secs, p.frequency_hz)),
            );
        }
        debug!(
            "Planned {}-leg path with {} control points",
            waypoints.len() - 1,
            points.len()
        );
        FrequencyEnvelope::new(points)
    }

    /// Recursive bisection: split while the chord strays from the curve.
    /// Pushes the right endpoint of every accepted span.
    #[allow(clippy::too_many_arguments)]
    fn subdivide(
        &self,
        start: f64,
        end: f64,
        duration: f64,
        style: TransitionStyle,
        u0: f64,
        u1: f64,
        depth: u32,
        points: &mut Vec<ControlPoint>,
    ) {
        let f0 = style.frequency_at(start, end, u0);
        let f1 = style.frequency_at(start, end, u1);
        let tolerance = self.config.transition.tolerance_hz * 0.5;

        let error = [0.25, 0.5, 0.75]
            .iter()
            .map(|&q| {
                let u = u0 + (u1 - u0) * q;
                let chord = f0 + (f1 - f0) * q;
                (style.frequency_at(start, end, u) - chord).abs()
            })
            .fold(0.0, f64::max);

        if error > tolerance && depth < self.config.transition.max_subdivision_depth {
            let mid = 0.5 * (u0 + u1);
            self.subdivide(start, end, duration, style, u0, mid, depth + 1, points);
            self.subdivide(start, end, duration, style, mid, u1, depth + 1, points);
        } else {
            let frequency = if u1 >= 1.0 { end } else { f1 };
            points.push(ControlPoint::new(u1 * duration, frequency));
        }
    }

    /// Shortest comfortable duration for a transition.
    ///
    /// The larger of a comfort table keyed on the frequency gap, the
    /// rate-derived minimum for the style, and the band-pair minimum.
    pub fn recommended_duration(&self, start: f64, end: f64, style: TransitionStyle) -> f64 {
        let delta = (end - start).abs();
        let comfort: f64 = if delta < 2.0 {
            5.0
        } else if delta < 5.0 {
            10.0
        } else {
            20.0
        };
        comfort
            .max(self.rate_minimum(start, end, style))
            .max(self.band_minimum(start, end))
    }
}
