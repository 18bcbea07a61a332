//! Safety limiter
//!
//! Runs before any synthesis. Every check appends to the report instead of
//! returning early, so a caller sees all problems with a request at once.

use log::debug;

use crate::config::{EngineConfig, SafetyLimits};
use crate::engine::session::SessionSpec;
use crate::error::{EngineError, Result};
use crate::safety::{BrainwaveBand, SafetyReport, Violation, ViolationKind};
use crate::synth::{FrequencyEnvelope, Waypoint};

/// Slack allowed when comparing rates and loudness against their ceilings
const EPSILON: f64 = 1e-9;

/// Validates sessions, segments and envelopes against the configured limits
#[derive(Debug, Clone, Copy)]
pub struct SafetyLimiter<'a> {
    config: &'a EngineConfig,
}

impl<'a> SafetyLimiter<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn limits(&self) -> &SafetyLimits {
        &self.config.safety
    }

    /// Validate a full session request
    pub fn validate(&self, spec: &SessionSpec) -> SafetyReport {
        let mut report = SafetyReport::safe();

        report = self.check_frequencies(spec, report);
        report = self.check_band(spec, report);
        report = self.check_transition(spec, report);
        report = self.check_duration(spec, report);
        report = self.check_volume(spec, report);
        report = self.check_photosensitive(spec, report);
        report = self.check_layers(spec, report);
        report = self.check_harmonics(spec, report);
        report = self.check_background(spec, report);

        debug!(
            "Validated session: safe={}, {} violation(s), {} warning(s)",
            report.is_safe,
            report.violations.len(),
            report.warnings.len()
        );
        report
    }

    /// Validate one synthesis sub-segment.
    ///
    /// Skips the session duration bound but still checks both endpoint
    /// frequencies and the rate between them.
    pub fn validate_segment(&self, start_hz: f64, end_hz: f64, duration_secs: f64) -> SafetyReport {
        let limits = self.limits();
        let mut report = SafetyReport::safe();

        if !(duration_secs >= limits.min_segment_secs) {
            report = report.with_violation(Violation::new(
                "segment.duration_secs",
                ViolationKind::Duration,
                format!(
                    "{:.3}s is shorter than the {:.1}s segment minimum",
                    duration_secs, limits.min_segment_secs
                ),
            ));
        }
        for (parameter, frequency) in [("segment.start_hz", start_hz), ("segment.end_hz", end_hz)] {
            if let Some(violation) = self.check_frequency(parameter, frequency) {
                report = report.with_violation(violation);
            }
        }
        if report.is_safe {
            let rate = (end_hz - start_hz).abs() / duration_secs;
            if rate > limits.max_transition_rate + EPSILON {
                report = report.with_violation(Violation::new(
                    "segment",
                    ViolationKind::TransitionRate,
                    format!(
                        "{:.3} Hz/s exceeds the {:.1} Hz/s limit",
                        rate, limits.max_transition_rate
                    ),
                ));
            }
        }
        report
    }

    /// Check a single frequency against the absolute safe range
    pub fn check_frequency(&self, parameter: &str, frequency: f64) -> Option<Violation> {
        let limits = self.limits();
        if frequency.is_finite()
            && frequency >= limits.min_frequency_hz
            && frequency <= limits.max_frequency_hz
        {
            return None;
        }
        Some(Violation::new(
            parameter,
            ViolationKind::FrequencyRange,
            format!(
                "{} Hz is outside the safe range {}-{} Hz",
                frequency, limits.min_frequency_hz, limits.max_frequency_hz
            ),
        ))
    }

    /// Check every control point of an envelope and the slope between them.
    ///
    /// Returns `FrequencyError` for the first point that fails.
    pub fn check_envelope(&self, envelope: &FrequencyEnvelope) -> Result<()> {
        let max_rate = self.limits().max_transition_rate;
        let points = envelope.points();

        for point in points {
            if let Some(violation) = self.check_frequency("envelope", point.frequency_hz) {
                return Err(EngineError::FrequencyError {
                    frequency_hz: point.frequency_hz,
                    time_secs: point.time_secs,
                    reason: violation.reason,
                });
            }
        }
        for pair in points.windows(2) {
            let dt = pair[1].time_secs - pair[0].time_secs;
            let rate = (pair[1].frequency_hz - pair[0].frequency_hz).abs() / dt;
            if rate > max_rate + EPSILON {
                return Err(EngineError::FrequencyError {
                    frequency_hz: pair[1].frequency_hz,
                    time_secs: pair[1].time_secs,
                    reason: format!(
                        "slope of {:.3} Hz/s exceeds the {:.1} Hz/s limit",
                        rate, max_rate
                    ),
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Session checks, in reporting order
    // ========================================================================

    fn check_frequencies(&self, spec: &SessionSpec, mut report: SafetyReport) -> SafetyReport {
        if let Some(t) = &spec.transition {
            for (parameter, frequency) in [("transition.from_hz", t.from_hz), ("transition.to_hz", t.to_hz)] {
                if let Some(violation) = self.check_frequency(parameter, frequency) {
                    report = report.with_violation(violation);
                }
            }
        }
        for (i, waypoint) in spec.waypoints.iter().enumerate() {
            let parameter = format!("waypoints[{}].frequency_hz", i);
            if let Some(violation) = self.check_frequency(&parameter, waypoint.frequency_hz) {
                report = report.with_violation(violation);
            }
        }
        if let Some(frequency) = spec.frequency {
            if let Some(violation) = self.check_frequency("frequency", frequency) {
                report = report.with_violation(violation);
            }
        }
        if spec.frequency_range().is_none() {
            report = report.with_violation(Violation::new(
                "frequency",
                ViolationKind::MissingTarget,
                "no frequency, transition or target_state given",
            ));
        }
        report
    }

    fn check_band(&self, spec: &SessionSpec, report: SafetyReport) -> SafetyReport {
        let (Some(band), Some(target)) = (spec.target_state, spec.target_frequency()) else {
            return report;
        };
        if band.contains(target) {
            return report;
        }
        let (low, high) = band.range();
        report.with_violation(Violation::new(
            spec.target_parameter(),
            ViolationKind::BandMismatch,
            format!("{} Hz is outside the {} band ({}-{} Hz)", target, band, low, high),
        ))
    }

    fn check_transition(&self, spec: &SessionSpec, mut report: SafetyReport) -> SafetyReport {
        if !spec.waypoints.is_empty() {
            return self.check_waypoints(spec, report);
        }
        let Some(t) = &spec.transition else {
            return report;
        };
        let duration = spec.transition_secs();

        if !(duration > 0.0) || duration > spec.duration_secs + EPSILON {
            return report.with_violation(Violation::new(
                "transition.duration_secs",
                ViolationKind::Duration,
                format!(
                    "{}s must be positive and no longer than the {}s session",
                    duration, spec.duration_secs
                ),
            ));
        }
        if t.from_hz > 0.0 && t.to_hz > 0.0 {
            report = report.merge(self.check_leg(
                "transition",
                "transition.duration_secs",
                &Waypoint::new(0.0, t.from_hz, t.style),
                &Waypoint::new(duration, t.to_hz, t.style),
            ));
        }
        report
    }

    fn check_waypoints(&self, spec: &SessionSpec, mut report: SafetyReport) -> SafetyReport {
        let waypoints = &spec.waypoints;
        if waypoints.len() < 2 {
            return report.with_violation(Violation::new(
                "waypoints",
                ViolationKind::MissingTarget,
                format!("{} waypoint(s) given, at least two needed", waypoints.len()),
            ));
        }
        if waypoints[0].time_secs != 0.0 {
            report = report.with_violation(Violation::new(
                "waypoints[0].time_secs",
                ViolationKind::Duration,
                format!("{}s must be 0", waypoints[0].time_secs),
            ));
        }

        for (i, leg) in waypoints.windows(2).enumerate() {
            let index = i + 1;
            let time_parameter = format!("waypoints[{}].time_secs", index);
            let duration = leg[1].time_secs - leg[0].time_secs;
            if !(duration > 0.0) || leg[1].time_secs > spec.duration_secs + EPSILON {
                report = report.with_violation(Violation::new(
                    &time_parameter,
                    ViolationKind::Duration,
                    format!(
                        "{}s must come after {}s and within the {}s session",
                        leg[1].time_secs, leg[0].time_secs, spec.duration_secs
                    ),
                ));
                continue;
            }
            if leg[0].frequency_hz > 0.0 && leg[1].frequency_hz > 0.0 {
                report = report.merge(self.check_leg(
                    &format!("waypoints[{}]", index),
                    &time_parameter,
                    &leg[0],
                    &leg[1],
                ));
            }
        }
        report
    }

    /// Rate and band-pair minimum for one leg, judged on the steepest slope
    /// of the leg's curve rather than its average.
    fn check_leg(
        &self,
        rate_parameter: &str,
        duration_parameter: &str,
        from: &Waypoint,
        to: &Waypoint,
    ) -> SafetyReport {
        let limits = self.limits();
        let mut report = SafetyReport::safe();
        let duration = to.time_secs - from.time_secs;

        let rate = to.style.peak_slope(from.frequency_hz, to.frequency_hz) / duration;
        if rate > limits.max_transition_rate + EPSILON {
            report = report.with_violation(Violation::new(
                rate_parameter,
                ViolationKind::TransitionRate,
                format!(
                    "{} curve peaks at {:.3} Hz/s, above the {:.1} Hz/s limit",
                    to.style, rate, limits.max_transition_rate
                ),
            ));
        }

        if self.config.transition.enforce_band_minimums {
            let minimum = limits
                .band_minimums
                .minimum_for_frequencies(from.frequency_hz, to.frequency_hz);
            if duration + EPSILON < minimum {
                report = report.with_violation(Violation::new(
                    duration_parameter,
                    ViolationKind::TransitionMinimum,
                    format!(
                        "{} -> {} needs at least {:.0}s, got {:.1}s",
                        BrainwaveBand::nearest(from.frequency_hz),
                        BrainwaveBand::nearest(to.frequency_hz),
                        minimum,
                        duration
                    ),
                ));
            }
        }
        report
    }

    fn check_duration(&self, spec: &SessionSpec, report: SafetyReport) -> SafetyReport {
        let limits = self.limits();
        let duration = spec.duration_secs;
        if duration.is_finite()
            && duration >= limits.min_session_secs
            && duration <= limits.max_session_secs
        {
            return report;
        }
        report.with_violation(Violation::new(
            "duration_secs",
            ViolationKind::Duration,
            format!(
                "{}s is outside the session range {}-{}s",
                duration, limits.min_session_secs, limits.max_session_secs
            ),
        ))
    }

    fn check_volume(&self, spec: &SessionSpec, report: SafetyReport) -> SafetyReport {
        let limits = self.limits();
        let volume = spec.volume;
        if !(volume >= 0.0 && volume <= limits.max_volume) {
            return report.with_violation(Violation::new(
                "volume",
                ViolationKind::Volume,
                format!("{} is outside 0.0-{}", volume, limits.max_volume),
            ));
        }
        if volume > 0.0 {
            let loudness = limits.full_scale_db + 20.0 * volume.log10();
            if loudness > limits.max_output_db + EPSILON {
                return report.with_violation(Violation::new(
                    "volume",
                    ViolationKind::Loudness,
                    format!(
                        "{:.1} dB exceeds the {:.1} dB output ceiling",
                        loudness, limits.max_output_db
                    ),
                ));
            }
        }
        report
    }

    fn check_photosensitive(&self, spec: &SessionSpec, report: SafetyReport) -> SafetyReport {
        if !spec.isochronic.enabled {
            return report;
        }
        let Some((low, high)) = spec.frequency_bounds() else {
            return report;
        };
        let limits = self.limits();
        if high < limits.photosensitive_low_hz || low > limits.photosensitive_high_hz {
            return report;
        }

        let depth = spec.isochronic.depth;
        if depth > limits.photosensitive_depth_threshold {
            report.with_violation(Violation::new(
                "isochronic.depth",
                ViolationKind::Photosensitive,
                format!(
                    "depth {} above {} in the {}-{} Hz flicker band",
                    depth,
                    limits.photosensitive_depth_threshold,
                    limits.photosensitive_low_hz,
                    limits.photosensitive_high_hz
                ),
            ))
        } else {
            report.with_warning(Violation::new(
                "isochronic",
                ViolationKind::Photosensitive,
                format!(
                    "isochronic modulation within the {}-{} Hz flicker band",
                    limits.photosensitive_low_hz, limits.photosensitive_high_hz
                ),
            ))
        }
    }

    fn check_carrier(&self, parameter: &str, carrier: f64, report: SafetyReport) -> SafetyReport {
        let ceiling = self.config.nyquist() - self.limits().max_frequency_hz;
        if carrier.is_finite() && carrier > 0.0 && carrier < ceiling {
            return report;
        }
        report.with_violation(Violation::new(
            parameter,
            ViolationKind::Carrier,
            format!("{} Hz must lie between 0 and {} Hz", carrier, ceiling),
        ))
    }

    fn check_layers(&self, spec: &SessionSpec, mut report: SafetyReport) -> SafetyReport {
        if !spec.binaural && !spec.isochronic.enabled {
            report = report.with_violation(Violation::new(
                "binaural",
                ViolationKind::MissingTarget,
                "neither binaural nor isochronic output is enabled",
            ));
        }
        if let Some(carrier) = spec.carrier {
            report = self.check_carrier("carrier", carrier, report);
        }

        let iso = &spec.isochronic;
        if !iso.enabled {
            return report;
        }
        if let Some(carrier) = iso.carrier_hz {
            report = self.check_carrier("isochronic.carrier_hz", carrier, report);
        }
        if !(iso.duty_cycle > 0.0 && iso.duty_cycle < 1.0) {
            report = report.with_violation(Violation::new(
                "isochronic.duty_cycle",
                ViolationKind::Isochronic,
                format!("{} must lie strictly between 0 and 1", iso.duty_cycle),
            ));
        }
        if !(0.0..=1.0).contains(&iso.depth) {
            report = report.with_violation(Violation::new(
                "isochronic.depth",
                ViolationKind::Isochronic,
                format!("{} is outside 0.0-1.0", iso.depth),
            ));
        }
        report
    }

    fn check_harmonics(&self, spec: &SessionSpec, mut report: SafetyReport) -> SafetyReport {
        let h = &spec.harmonics;
        if !h.enabled {
            return report;
        }
        let max = self.config.harmonics.max_harmonics;
        if h.count == 0 || h.count > max {
            report = report.with_violation(Violation::new(
                "harmonics.count",
                ViolationKind::Harmonics,
                format!("{} is outside 1-{}", h.count, max),
            ));
        }
        if !(h.decay > 0.0 && h.decay <= 1.0) {
            report = report.with_violation(Violation::new(
                "harmonics.decay",
                ViolationKind::Harmonics,
                format!("{} must lie in (0, 1]", h.decay),
            ));
        }
        if !(h.weight >= 0.0 && h.weight < 1.0) {
            report = report.with_violation(Violation::new(
                "harmonics.weight",
                ViolationKind::Harmonics,
                format!("{} must lie in [0, 1)", h.weight),
            ));
        }
        report
    }

    fn check_background(&self, spec: &SessionSpec, mut report: SafetyReport) -> SafetyReport {
        let bg = &spec.background;
        if !(0.0..=1.0).contains(&bg.volume) {
            report = report.with_violation(Violation::new(
                "background.volume",
                ViolationKind::Background,
                format!("{} is outside 0.0-1.0", bg.volume),
            ));
        }
        let max_gain = self.config.background.max_eq_gain_db;
        let gains = [
            ("background.eq_gains.low", bg.eq_gains.low),
            ("background.eq_gains.mid", bg.eq_gains.mid),
            ("background.eq_gains.high", bg.eq_gains.high),
        ];
        for (parameter, gain) in gains {
            if !(gain.abs() <= max_gain) {
                report = report.with_violation(Violation::new(
                    parameter,
                    ViolationKind::Background,
                    format!("{} dB is outside +/-{} dB", gain, max_gain),
                ));
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::{BackgroundKind, EqGains};
    use crate::synth::{TransitionStyle, Waypoint};

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_plain_session_is_safe() {
        let config = config();
        let report = SafetyLimiter::new(&config).validate(&SessionSpec::new(10.0, 300.0, 0.7));
        assert!(report.is_safe);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_out_of_range_frequency_named() {
        let config = config();
        let limiter = SafetyLimiter::new(&config);

        let report = limiter.validate(&SessionSpec::new(150.0, 300.0, 0.5));
        assert!(!report.is_safe);
        assert!(report.names("frequency"));

        let report = limiter.validate(&SessionSpec::new(0.05, 300.0, 0.5));
        assert!(report.names("frequency"));

        let spec = SessionSpec::new(10.0, 3600.0, 0.5).with_transition(
            10.0,
            120.0,
            TransitionStyle::Linear,
        );
        let report = limiter.validate(&spec);
        assert!(report.names("transition.to_hz"));
    }

    #[test]
    fn test_all_violations_accumulate() {
        let config = config();
        let mut spec = SessionSpec::new(200.0, 10.0, 1.5);
        spec.background.volume = 2.0;
        let report = SafetyLimiter::new(&config).validate(&spec);

        assert!(report.names("frequency"));
        assert!(report.names("duration_secs"));
        assert!(report.names("volume"));
        assert!(report.names("background.volume"));
        assert_eq!(report.violations[0].parameter, "frequency");
    }

    #[test]
    fn test_band_mismatch() {
        let config = config();
        let spec = SessionSpec::new(20.0, 300.0, 0.5).with_target_state(BrainwaveBand::Alpha);
        let report = SafetyLimiter::new(&config).validate(&spec);
        assert!(!report.is_safe);
        assert_eq!(report.violations[0].kind, ViolationKind::BandMismatch);
    }

    #[test]
    fn test_transition_band_minimum() {
        let config = config();
        let spec = SessionSpec::new(4.0, 60.0, 0.5).with_transition(
            4.0,
            10.0,
            TransitionStyle::Linear,
        );
        let report = SafetyLimiter::new(&config).validate(&spec);
        assert!(!report.is_safe);
        assert!(report.only_transition_violations());
        assert!(report.names("transition.duration_secs"));
    }

    #[test]
    fn test_transition_rate() {
        let config = config();
        let spec = SessionSpec::new(4.0, 600.0, 0.5)
            .with_transition(4.0, 10.0, TransitionStyle::Linear)
            .with_transition_duration(2.0);
        let report = SafetyLimiter::new(&config).validate(&spec);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::TransitionRate));
        assert!(report.only_transition_violations());
    }

    #[test]
    fn test_curved_transition_judged_on_peak_slope() {
        let mut config = config();
        config.transition.enforce_band_minimums = false;
        let limiter = SafetyLimiter::new(&config);

        // 70 Hz over 60s averages 1.17 Hz/s; the sigmoid peaks near 2.25 Hz/s
        let linear = SessionSpec::new(30.0, 60.0, 0.5).with_transition(
            30.0,
            100.0,
            TransitionStyle::Linear,
        );
        assert!(limiter.validate(&linear).is_safe);

        let sigmoid = SessionSpec::new(30.0, 60.0, 0.5).with_transition(
            30.0,
            100.0,
            TransitionStyle::Sigmoid,
        );
        let report = limiter.validate(&sigmoid);
        assert!(!report.is_safe);
        assert_eq!(report.violations[0].kind, ViolationKind::TransitionRate);
        assert!(report.only_transition_violations());
    }

    #[test]
    fn test_waypoint_legs_checked_separately() {
        let config = config();
        let limiter = SafetyLimiter::new(&config);
        let spec = SessionSpec::new(2.0, 900.0, 0.5).with_waypoints(vec![
            Waypoint::new(0.0, 2.0, TransitionStyle::Linear),
            Waypoint::new(300.0, 6.0, TransitionStyle::Linear),
            Waypoint::new(400.0, 10.0, TransitionStyle::Linear),
        ]);
        let report = limiter.validate(&spec);
        assert!(!report.is_safe);
        assert!(report.names("waypoints[2].time_secs"));
        assert!(!report.names("waypoints[1].time_secs"));
        assert!(report.only_transition_violations());
    }

    #[test]
    fn test_waypoint_order_and_range() {
        let config = config();
        let limiter = SafetyLimiter::new(&config);
        let spec = SessionSpec::new(2.0, 900.0, 0.5).with_waypoints(vec![
            Waypoint::new(10.0, 2.0, TransitionStyle::Linear),
            Waypoint::new(5.0, 150.0, TransitionStyle::Linear),
        ]);
        let report = limiter.validate(&spec);
        assert!(report.names("waypoints[1].frequency_hz"));
        assert!(report.names("waypoints[0].time_secs"));
        assert!(report.names("waypoints[1].time_secs"));
        assert!(!report.only_transition_violations());

        let lonely = SessionSpec::new(2.0, 900.0, 0.5)
            .with_waypoints(vec![Waypoint::new(0.0, 2.0, TransitionStyle::Linear)]);
        assert!(limiter.validate(&lonely).names("waypoints"));
    }

    #[test]
    fn test_loudness_ceiling() {
        let mut config = config();
        config.safety.max_output_db = 80.0;
        let report = SafetyLimiter::new(&config).validate(&SessionSpec::new(10.0, 300.0, 0.9));
        assert_eq!(report.violations[0].kind, ViolationKind::Loudness);

        let report = SafetyLimiter::new(&config).validate(&SessionSpec::new(10.0, 300.0, 0.5));
        assert!(report.is_safe);
    }

    #[test]
    fn test_photosensitive_warning_and_violation() {
        let config = config();
        let limiter = SafetyLimiter::new(&config);

        let shallow = SessionSpec::new(18.0, 300.0, 0.5).with_isochronic(0.5, 0.4);
        let report = limiter.validate(&shallow);
        assert!(report.is_safe);
        assert!(report.has_warnings());

        let deep = SessionSpec::new(18.0, 300.0, 0.5).with_isochronic(0.5, 1.0);
        let report = limiter.validate(&deep);
        assert!(!report.is_safe);
        assert!(report.names("isochronic.depth"));

        let outside = SessionSpec::new(10.0, 300.0, 0.5).with_isochronic(0.5, 1.0);
        let report = limiter.validate(&outside);
        assert!(report.is_safe);
        assert!(!report.has_warnings());
    }

    #[test]
    fn test_background_eq_limits() {
        let config = config();
        let spec = SessionSpec::new(10.0, 300.0, 0.5).with_background(
            BackgroundKind::WhiteNoise,
            0.3,
            EqGains {
                low: 0.0,
                mid: 18.0,
                high: -3.0,
            },
        );
        let report = SafetyLimiter::new(&config).validate(&spec);
        assert!(report.names("background.eq_gains.mid"));
        assert!(!report.names("background.eq_gains.high"));
    }

    #[test]
    fn test_segment_validation() {
        let config = config();
        let limiter = SafetyLimiter::new(&config);

        assert!(limiter.validate_segment(10.0, 10.0, 0.5).is_safe);
        assert!(!limiter.validate_segment(10.0, 10.0, 0.05).is_safe);
        assert!(!limiter.validate_segment(10.0, 12.0, 0.5).is_safe);
        assert!(!limiter.validate_segment(10.0, 150.0, 100.0).is_safe);
    }
}
