use thiserror::Error;

/// Errors raised while solving one preview-window QP.
///
/// A failed solve leaves the solver usable: the next tick starts from a fresh
/// initial state and rebuilds every factor.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SolverError {
    /// A Cholesky update or downdate produced a non-positive pivot. This
    /// indicates linearly dependent active constraints or a loss of positive
    /// definiteness; the current solve cannot continue.
    #[error("KKT factor lost positive definiteness (pivot {pivot:.3e})")]
    NotPositiveDefinite { pivot: f64 },

    /// A parameter slice had the wrong length for the configured preview
    /// window.
    #[error("parameter length mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A sampling period was zero or negative.
    #[error("sampling period {value} at interval {index} must be > 0")]
    NonpositiveSamplingPeriod { index: usize, value: f64 },
}

/// Solver construction / configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("preview window must contain at least one interval")]
    EmptyPreviewWindow,

    #[error("invalid {name} gain: {value} (must be > 0)")]
    InvalidGain { name: &'static str, value: f64 },

    #[error("tolerance {0} must be > 0")]
    InvalidTolerance(f64),

    #[error("barrier multiplier {0} must be > 1")]
    InvalidBarrierMultiplier(f64),

    #[error("backtracking ratio {0} must lie in (0, 1)")]
    InvalidBacktrackingRatio(f64),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_error_display() {
        assert_eq!(
            SolverError::DimensionMismatch {
                expected: 15,
                got: 10
            }
            .to_string(),
            "parameter length mismatch: expected 15, got 10"
        );
        assert_eq!(
            SolverError::NonpositiveSamplingPeriod {
                index: 3,
                value: 0.0
            }
            .to_string(),
            "sampling period 0 at interval 3 must be > 0"
        );
        assert!(SolverError::NotPositiveDefinite { pivot: -1e-9 }
            .to_string()
            .contains("positive definiteness"));
    }

    #[test]
    fn config_error_display() {
        assert_eq!(
            ConfigError::InvalidGain {
                name: "position",
                value: -2.0
            }
            .to_string(),
            "invalid position gain: -2 (must be > 0)"
        );
        assert_eq!(
            ConfigError::InvalidBarrierMultiplier(1.0).to_string(),
            "barrier multiplier 1 must be > 1"
        );
    }
}
