//! Error handling for Resonera
//!
//! Every failure is terminal for the request that produced it. Errors carry
//! enough context for the calling service to decide whether to surface the
//! problem, adjust the request and retry once, or reject it outright.

use thiserror::Error;

use crate::safety::SafetyReport;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    // Parameter Errors
    #[error("Invalid parameter '{param}': got {value}, expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Safety Errors
    #[error("Session rejected by safety limiter: {}", .report.summary())]
    SafetyViolation { report: SafetyReport },

    #[error(
        "Transition {from_hz:.2} Hz -> {to_hz:.2} Hz over {duration_secs:.1}s is too fast \
         (needs at least {min_duration_secs:.1}s)"
    )]
    TransitionTooFast {
        from_hz: f64,
        to_hz: f64,
        duration_secs: f64,
        min_duration_secs: f64,
    },

    #[error("Frequency {frequency_hz:.3} Hz at {time_secs:.3}s rejected: {reason}")]
    FrequencyError {
        frequency_hz: f64,
        time_secs: f64,
        reason: String,
    },

    // Configuration Errors
    #[error("Invalid engine configuration: {reason}")]
    Config { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Shorthand for building an `InvalidParameter` error
    pub fn invalid(param: &str, value: impl ToString, expected: &str) -> Self {
        EngineError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::InvalidParameter { .. } => "INVALID_PARAMETER",
            EngineError::SafetyViolation { .. } => "SAFETY_VIOLATION",
            EngineError::TransitionTooFast { .. } => "TRANSITION_TOO_FAST",
            EngineError::FrequencyError { .. } => "FREQUENCY_ERROR",
            EngineError::Config { .. } => "CONFIG_ERROR",
            EngineError::Io(_) => "IO_ERROR",
            EngineError::Wav(_) => "WAV_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the caller can fix the request and retry.
    ///
    /// Retrying an identical request never succeeds: synthesis is deterministic.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::TransitionTooFast { .. }
                | EngineError::SafetyViolation { .. }
                | EngineError::InvalidParameter { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            EngineError::InvalidParameter { .. } => vec![
                "Check the parameter against its documented range",
                "Volume and amplitude values must lie between 0.0 and 1.0",
            ],
            EngineError::SafetyViolation { .. } => vec![
                "Review the violation list and adjust each named parameter",
                "Frequencies must stay between 0.1 Hz and 100 Hz",
                "Full sessions must last between 1 minute and 2 hours",
            ],
            EngineError::TransitionTooFast { .. } => vec![
                "Lengthen the transition duration",
                "Reduce the frequency difference between start and end",
                "Use a linear curve, which has the gentlest peak slope",
            ],
            EngineError::FrequencyError { .. } => vec![
                "Re-plan the transition with frequencies inside the safe range",
            ],
            EngineError::Config { .. } => vec![
                "Check the engine configuration file",
                "Remove overrides to fall back to the built-in defaults",
            ],
            _ => vec![],
        }
    }

    /// The safety report attached to this error, if any
    pub fn report(&self) -> Option<&SafetyReport> {
        match self {
            EngineError::SafetyViolation { report } => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = EngineError::invalid("volume", 1.5, "0.0-1.0");
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
        assert!(err.to_string().contains("volume"));
    }

    #[test]
    fn test_transition_error_is_recoverable() {
        let err = EngineError::TransitionTooFast {
            from_hz: 4.0,
            to_hz: 10.0,
            duration_secs: 2.0,
            min_duration_secs: 180.0,
        };
        assert!(err.is_recoverable());
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.to_string().contains("180.0"));
    }

    #[test]
    fn test_config_error_not_recoverable() {
        let err = EngineError::Config {
            reason: "sample_rate must be positive".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(err.report().is_none());
    }
}
