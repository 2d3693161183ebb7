//! Problem parameters shared by both QP solvers.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SolverError};

/// Objective gains and tolerances of the preview QP.
///
/// The cost is `sum_i beta*|z_i - zref_i|^2 + alpha*|v_i|^2 + 2*rho*|a_i|^2
/// + gamma*|u_i|^2` over ZMP positions `z`, CoM velocities `v`, CoM
/// accelerations `a` and jerks `u`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// CoM velocity gain (alpha).
    #[serde(default = "default_velocity_gain")]
    pub velocity_gain: f64,
    /// ZMP position gain (beta).
    #[serde(default = "default_position_gain")]
    pub position_gain: f64,
    /// Jerk gain (gamma).
    #[serde(default = "default_jerk_gain")]
    pub jerk_gain: f64,
    /// Acceleration regularization (rho); keeps the Hessian positive definite.
    #[serde(default = "default_regularization")]
    pub regularization: f64,
    /// Numeric tolerance for constraint activation, multiplier sign tests and
    /// line-search termination.
    #[serde(default = "default_tol")]
    pub tol: f64,
    /// Iteration cap of the active-set loop.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Interior-point settings (only read by [`SolverKind::InteriorPoint`]).
    ///
    /// [`SolverKind::InteriorPoint`]: crate::SolverKind::InteriorPoint
    #[serde(default)]
    pub ip: IpSettings,
}

const fn default_velocity_gain() -> f64 {
    150.0
}
const fn default_position_gain() -> f64 {
    2000.0
}
const fn default_jerk_gain() -> f64 {
    1.0
}
const fn default_regularization() -> f64 {
    0.01
}
const fn default_tol() -> f64 {
    1e-7
}
const fn default_max_iterations() -> usize {
    100
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            velocity_gain: default_velocity_gain(),
            position_gain: default_position_gain(),
            jerk_gain: default_jerk_gain(),
            regularization: default_regularization(),
            tol: default_tol(),
            max_iterations: default_max_iterations(),
            ip: IpSettings::default(),
        }
    }
}

impl SolverConfig {
    /// Validate gains and tolerances. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("velocity", self.velocity_gain),
            ("position", self.position_gain),
            ("jerk", self.jerk_gain),
            ("regularization", self.regularization),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::InvalidGain { name, value });
            }
        }
        if self.tol <= 0.0 {
            return Err(ConfigError::InvalidTolerance(self.tol));
        }
        self.ip.validate()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

/// Parameters of the interior-point continuation and line search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IpSettings {
    /// Initial barrier parameter `t`.
    pub t_begin: f64,
    /// Multiplier applied to `t` between outer iterations (> 1).
    pub mu: f64,
    /// Armijo slope fraction of the backtracking search.
    pub bs_alpha: f64,
    /// Step reduction ratio of the backtracking search, in (0, 1).
    pub bs_beta: f64,
    /// Newton iteration cap per barrier stage.
    pub max_inner: usize,
    /// Outer loop stops once `2N / t` falls below this bound.
    pub tol_outer: f64,
}

impl Default for IpSettings {
    fn default() -> Self {
        Self {
            t_begin: 1.0,
            mu: 10.0,
            bs_alpha: 0.01,
            bs_beta: 0.5,
            max_inner: 20,
            tol_outer: 1e-3,
        }
    }
}

impl IpSettings {
    /// Validate continuation and line-search parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mu <= 1.0 {
            return Err(ConfigError::InvalidBarrierMultiplier(self.mu));
        }
        if !(self.bs_beta > 0.0 && self.bs_beta < 1.0) {
            return Err(ConfigError::InvalidBacktrackingRatio(self.bs_beta));
        }
        if !(self.bs_alpha > 0.0 && self.bs_alpha < 1.0) {
            return Err(ConfigError::InvalidBacktrackingRatio(self.bs_alpha));
        }
        if self.t_begin <= 0.0 {
            return Err(ConfigError::InvalidGain {
                name: "barrier start",
                value: self.t_begin,
            });
        }
        Ok(())
    }
}

/// Per-interval dynamics coefficients.
///
/// The ZMP-shifted state obeys `x_{k+1} = A x_k + B u_k` per ground axis,
/// with `A = [1 T a3; 0 1 T; 0 0 1]` and `B = [T^3/6 - h*T, T^2/2, T]`.
/// `a3 = T^2/2 - dh` absorbs a change of CoM height ratio across the
/// interval (`dh = h_i - h_{i-1}`).
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalParams {
    /// cos of the support rotation angle.
    pub cos: f64,
    /// sin of the support rotation angle.
    pub sin: f64,
    /// Sampling period of the interval [s].
    pub t: f64,
    /// CoM height divided by gravity at the end of the interval.
    pub h: f64,
    /// `A(0,2)`.
    pub a3: f64,
    /// Control column of the dynamics.
    pub b: [f64; 3],
}

/// All data the Cholesky machinery needs about the current preview window:
/// the per-interval dynamics and the diagonal of the inverse Hessian.
#[derive(Debug, Clone)]
pub struct ProblemParameters {
    n: usize,
    /// Per-interval coefficients, `intervals[i]` maps state `i` to `i+1`.
    pub intervals: Vec<IntervalParams>,
    /// Inverse Hessian diagonal of a state triple:
    /// `[1/beta, 1/alpha, 1/(2 rho)]`.
    pub inv_q: [f64; 3],
    /// Inverse Hessian entry of a control variable: `1/gamma`.
    pub inv_p: f64,
}

impl ProblemParameters {
    pub fn new(n: usize, config: &SolverConfig) -> Self {
        Self {
            n,
            intervals: vec![IntervalParams::default(); n],
            inv_q: [
                1.0 / config.position_gain,
                1.0 / config.velocity_gain,
                1.0 / (2.0 * config.regularization),
            ],
            inv_p: 1.0 / config.jerk_gain,
        }
    }

    /// Number of sampling intervals in the preview window.
    pub fn preview_len(&self) -> usize {
        self.n
    }

    /// Refresh the per-interval coefficients for a new preview window.
    ///
    /// `h0` is the height ratio of the state preceding the window; it only
    /// matters when the CoM height varies across intervals.
    pub fn set(
        &mut self,
        t: &[f64],
        h: &[f64],
        h0: f64,
        angle: &[f64],
    ) -> Result<(), SolverError> {
        for got in [t.len(), h.len(), angle.len()] {
            if got != self.n {
                return Err(SolverError::DimensionMismatch {
                    expected: self.n,
                    got,
                });
            }
        }

        let mut h_prev = h0;
        for i in 0..self.n {
            if t[i] <= 0.0 {
                return Err(SolverError::NonpositiveSamplingPeriod {
                    index: i,
                    value: t[i],
                });
            }
            let ti = t[i];
            let t2 = ti * ti / 2.0;
            let ip = &mut self.intervals[i];
            ip.cos = angle[i].cos();
            ip.sin = angle[i].sin();
            ip.t = ti;
            ip.h = h[i];
            ip.a3 = t2 - (h[i] - h_prev);
            ip.b = [t2 * ti / 3.0 - h[i] * ti, t2, ti];
            h_prev = h[i];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_config_is_valid() {
        SolverConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_gains() {
        let config = SolverConfig {
            position_gain: 0.0,
            ..SolverConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGain {
                name: "position",
                ..
            })
        ));
    }

    #[test]
    fn rejects_bad_barrier_multiplier() {
        let config = SolverConfig {
            ip: IpSettings {
                mu: 0.5,
                ..IpSettings::default()
            },
            ..SolverConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBarrierMultiplier(_))
        ));
    }

    #[test]
    fn config_from_toml() {
        let config = SolverConfig::from_toml_str(
            r#"
            position_gain = 4000.0
            tol = 1e-8
            "#,
        )
        .unwrap();
        assert_relative_eq!(config.position_gain, 4000.0);
        assert_relative_eq!(config.tol, 1e-8);
        // unspecified fields fall back to defaults
        assert_relative_eq!(config.velocity_gain, 150.0);
        assert_relative_eq!(config.ip.mu, 10.0);
    }

    #[test]
    fn interval_coefficients() {
        let config = SolverConfig::default();
        let mut p = ProblemParameters::new(2, &config);
        p.set(&[0.1, 0.1], &[0.261, 0.261], 0.261, &[0.0, 0.5]).unwrap();

        let ip = &p.intervals[0];
        assert_relative_eq!(ip.a3, 0.005, epsilon = 1e-12); // constant height
        assert_relative_eq!(ip.b[0], 0.001 / 6.0 - 0.0261, epsilon = 1e-12);
        assert_relative_eq!(ip.b[1], 0.005, epsilon = 1e-12);
        assert_relative_eq!(ip.b[2], 0.1, epsilon = 1e-12);
        assert_relative_eq!(p.intervals[1].cos, 0.5_f64.cos());
    }

    #[test]
    fn variable_height_shifts_a3() {
        let config = SolverConfig::default();
        let mut p = ProblemParameters::new(2, &config);
        p.set(&[0.1, 0.1], &[0.26, 0.27], 0.25, &[0.0, 0.0]).unwrap();
        assert_relative_eq!(p.intervals[0].a3, 0.005 - 0.01, epsilon = 1e-12);
        assert_relative_eq!(p.intervals[1].a3, 0.005 - 0.01, epsilon = 1e-12);
    }

    #[test]
    fn rejects_wrong_lengths() {
        let config = SolverConfig::default();
        let mut p = ProblemParameters::new(3, &config);
        let err = p.set(&[0.1; 2], &[0.26; 2], 0.26, &[0.0; 2]).unwrap_err();
        assert!(matches!(err, SolverError::DimensionMismatch { expected: 3, .. }));
    }

    #[test]
    fn rejects_nonpositive_period() {
        let config = SolverConfig::default();
        let mut p = ProblemParameters::new(1, &config);
        assert!(matches!(
            p.set(&[0.0], &[0.26], 0.26, &[0.0]),
            Err(SolverError::NonpositiveSamplingPeriod { index: 0, .. })
        ));
    }
}
