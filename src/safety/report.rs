//! Safety validation results

use serde::{Deserialize, Serialize};

/// What kind of limit a violation breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// No usable target frequency, or no entrainment layer enabled
    MissingTarget,
    /// Frequency outside the absolute safe range
    FrequencyRange,
    /// Frequency outside the named target band
    BandMismatch,
    /// Steepest transition slope above the maximum Hz/s
    TransitionRate,
    /// Transition shorter than the band-pair minimum
    TransitionMinimum,
    /// Session or segment duration out of bounds
    Duration,
    /// Volume out of bounds
    Volume,
    /// Requested loudness above the output ceiling
    Loudness,
    /// Flicker-adjacent isochronic modulation
    Photosensitive,
    /// Carrier frequency unusable
    Carrier,
    /// Isochronic duty cycle or depth out of bounds
    Isochronic,
    /// Harmonic settings out of bounds
    Harmonics,
    /// Background volume or EQ out of bounds
    Background,
}

impl ViolationKind {
    /// Violations that the caller fixes by lengthening the transition
    pub fn is_transition(self) -> bool {
        matches!(
            self,
            ViolationKind::TransitionRate | ViolationKind::TransitionMinimum
        )
    }
}

/// A single named problem with a session parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Dotted parameter path, e.g. `transition.to_hz`
    pub parameter: String,
    pub kind: ViolationKind,
    /// Human-readable reason
    pub reason: String,
}

impl Violation {
    pub fn new(parameter: &str, kind: ViolationKind, reason: impl Into<String>) -> Self {
        Self {
            parameter: parameter.to_string(),
            kind,
            reason: reason.into(),
        }
    }
}

/// Outcome of validating a session or segment.
///
/// Violations block synthesis; warnings are informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub is_safe: bool,
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
}

impl SafetyReport {
    /// An empty, passing report
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            violations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record a hard violation; the report becomes unsafe
    pub fn with_violation(mut self, violation: Violation) -> Self {
        self.violations.push(violation);
        self.is_safe = false;
        self
    }

    pub fn with_warning(mut self, warning: Violation) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Fold another report's findings into this one, keeping order
    pub fn merge(mut self, other: SafetyReport) -> Self {
        self.is_safe &= other.is_safe;
        self.violations.extend(other.violations);
        self.warnings.extend(other.warnings);
        self
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether any violation names `parameter`
    pub fn names(&self, parameter: &str) -> bool {
        self.violations.iter().any(|v| v.parameter == parameter)
    }

    /// True when every violation is a transition violation
    pub fn only_transition_violations(&self) -> bool {
        !self.violations.is_empty() && self.violations.iter().all(|v| v.kind.is_transition())
    }

    /// One-line summary of all violations
    pub fn summary(&self) -> String {
        if self.violations.is_empty() {
            return "no violations".to_string();
        }
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.parameter, v.reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_marks_unsafe() {
        let report = SafetyReport::safe().with_violation(Violation::new(
            "volume",
            ViolationKind::Volume,
            "above 1.0",
        ));
        assert!(!report.is_safe);
        assert!(report.names("volume"));
        assert_eq!(report.summary(), "volume: above 1.0");
    }

    #[test]
    fn test_warning_keeps_safe() {
        let report = SafetyReport::safe().with_warning(Violation::new(
            "isochronic",
            ViolationKind::Photosensitive,
            "flicker band",
        ));
        assert!(report.is_safe);
        assert!(report.has_warnings());
    }

    #[test]
    fn test_merge_preserves_order() {
        let a = SafetyReport::safe().with_violation(Violation::new(
            "frequency",
            ViolationKind::FrequencyRange,
            "a",
        ));
        let b = SafetyReport::safe().with_violation(Violation::new(
            "duration",
            ViolationKind::Duration,
            "b",
        ));
        let merged = a.merge(b);
        assert_eq!(merged.violations[0].parameter, "frequency");
        assert_eq!(merged.violations[1].parameter, "duration");
        assert!(!merged.only_transition_violations());
    }
}
