//! Public solver facade: selects the QP method, wires the preview-window
//! parameters and extracts states and controls from the solution.

use nalgebra::{Vector2, Vector6};

use crate::error::{ConfigError, SolverError};
use crate::params::{ProblemParameters, SolverConfig};
use crate::qp_as::ActiveSetQp;
use crate::qp_ip::InteriorPointQp;
use crate::state;

/// QP method used for the per-tick solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    /// Primal active-set method; exact solution, cost grows with the number
    /// of activated bounds.
    ActiveSet,
    /// Primal interior-point method with log-barrier continuation.
    InteriorPoint,
}

/// Result of one tick's solve. A non-converged outcome leaves the last
/// iterate available; it is equality-feasible and box-feasible for the
/// active-set method and strictly interior for the interior-point method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOutcome {
    pub converged: bool,
    pub iterations: usize,
    /// Bounds in the working set at termination (active-set method only,
    /// zero for the interior-point method).
    pub active_constraints: usize,
}

enum Backend {
    ActiveSet(ActiveSetQp),
    InteriorPoint(InteriorPointQp),
}

/// Jerk-minimizing CoM trajectory solver over a fixed preview window.
///
/// One control tick is one synchronous sequence:
/// [`set_parameters`](Self::set_parameters) →
/// [`form_init_fp`](Self::form_init_fp) → [`solve`](Self::solve) →
/// [`next_state`](Self::next_state) / [`first_controls`](Self::first_controls).
pub struct SmpcSolver {
    backend: Backend,
    n: usize,
}

impl SmpcSolver {
    /// Create a solver for windows of `n` intervals with default gains.
    pub fn new(n: usize, kind: SolverKind) -> Result<Self, ConfigError> {
        Self::with_config(n, kind, SolverConfig::default())
    }

    /// Create a solver with explicit gains and tolerances.
    pub fn with_config(
        n: usize,
        kind: SolverKind,
        config: SolverConfig,
    ) -> Result<Self, ConfigError> {
        if n == 0 {
            return Err(ConfigError::EmptyPreviewWindow);
        }
        config.validate()?;
        let backend = match kind {
            SolverKind::ActiveSet => Backend::ActiveSet(ActiveSetQp::new(n, &config)),
            SolverKind::InteriorPoint => Backend::InteriorPoint(InteriorPointQp::new(n, &config)),
        };
        Ok(Self { backend, n })
    }

    /// Number of intervals in the preview window.
    pub fn preview_len(&self) -> usize {
        self.n
    }

    /// Load the preview window for the upcoming solve.
    ///
    /// `t` are sampling periods [s], `h` the per-interval CoM height ratios
    /// (`h0` the ratio just before the window), `angle` the support rotation
    /// per interval, `zref_*` the world-frame ZMP reference and `lb`/`ub`
    /// the ZMP bounds in each interval's rotated support frame, two entries
    /// (x, y) per interval.
    #[allow(clippy::too_many_arguments)]
    pub fn set_parameters(
        &mut self,
        t: &[f64],
        h: &[f64],
        h0: f64,
        angle: &[f64],
        zref_x: &[f64],
        zref_y: &[f64],
        lb: &[f64],
        ub: &[f64],
    ) -> Result<(), SolverError> {
        match &mut self.backend {
            Backend::ActiveSet(qp) => {
                qp.set_parameters(t, h, h0, angle, zref_x, zref_y, lb, ub)
            }
            Backend::InteriorPoint(qp) => {
                qp.set_parameters(t, h, h0, angle, zref_x, zref_y, lb, ub)
            }
        }
    }

    /// Build the initial feasible point by forward-integrating the dynamics
    /// from `init_state` (a tilde state) with the footstep reference points
    /// `fp_x`/`fp_y` as feed-forward ZMP targets.
    pub fn form_init_fp(&mut self, fp_x: &[f64], fp_y: &[f64], init_state: &Vector6<f64>) {
        let init: [f64; 6] = (*init_state).into();
        match &mut self.backend {
            Backend::ActiveSet(qp) => qp.form_init_fp(fp_x, fp_y, &init),
            Backend::InteriorPoint(qp) => qp.form_init_fp(fp_x, fp_y, &init),
        }
    }

    /// Solve the QP for the loaded window.
    pub fn solve(&mut self) -> Result<SolveOutcome, SolverError> {
        match &mut self.backend {
            Backend::ActiveSet(qp) => qp.solve(),
            Backend::InteriorPoint(qp) => qp.solve(),
        }
    }

    fn params_and_x(&self) -> (&ProblemParameters, &[f64]) {
        match &self.backend {
            Backend::ActiveSet(qp) => (&qp.params, &qp.x),
            Backend::InteriorPoint(qp) => (&qp.params, &qp.x),
        }
    }

    /// Preview state `ind` in original variables (CoM position, velocity,
    /// acceleration per axis); indices clamp to the end of the window.
    pub fn state_at(&self, ind: usize) -> Vector6<f64> {
        let (p, x) = self.params_and_x();
        let mut out = [0.0; 6];
        state::state_orig_at(&p.intervals, x, ind, &mut out);
        Vector6::from(out)
    }

    /// Preview state `ind` as a tilde state (ZMP position instead of CoM
    /// position).
    pub fn state_tilde_at(&self, ind: usize) -> Vector6<f64> {
        let (p, x) = self.params_and_x();
        let mut out = [0.0; 6];
        state::state_tilde_at(&p.intervals, x, ind, &mut out);
        Vector6::from(out)
    }

    /// The next state of the closed loop, in original variables.
    pub fn next_state(&self) -> Vector6<f64> {
        self.state_at(0)
    }

    /// The next state of the closed loop, as a tilde state.
    pub fn next_state_tilde(&self) -> Vector6<f64> {
        self.state_tilde_at(0)
    }

    /// The jerk pair to apply over the first interval.
    pub fn first_controls(&self) -> Vector2<f64> {
        let (_, x) = self.params_and_x();
        Vector2::from(state::controls_at(self.n, x, 0))
    }

    /// The full solution vector: `N` bar-frame state blocks followed by `N`
    /// control pairs.
    pub fn solution(&self) -> &[f64] {
        self.params_and_x().1
    }

    /// The per-interval parameters of the loaded window.
    pub fn parameters(&self) -> &ProblemParameters {
        self.params_and_x().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_window() {
        assert!(matches!(
            SmpcSolver::new(0, SolverKind::ActiveSet),
            Err(ConfigError::EmptyPreviewWindow)
        ));
    }

    #[test]
    fn rejects_mismatched_parameters() {
        let mut solver = SmpcSolver::new(5, SolverKind::ActiveSet).unwrap();
        let err = solver
            .set_parameters(
                &[0.1; 4],
                &[0.26; 5],
                0.26,
                &[0.0; 5],
                &[0.0; 5],
                &[0.0; 5],
                &[-0.1; 10],
                &[0.1; 10],
            )
            .unwrap_err();
        assert!(matches!(err, SolverError::DimensionMismatch { .. }));
    }

    #[test]
    fn state_extraction_clamps_to_window() {
        let n = 3;
        let mut solver = SmpcSolver::new(n, SolverKind::ActiveSet).unwrap();
        solver
            .set_parameters(
                &[0.1; 3],
                &[0.261; 3],
                0.261,
                &[0.0; 3],
                &[0.0; 3],
                &[0.0; 3],
                &[-0.1; 6],
                &[0.1; 6],
            )
            .unwrap();
        solver.form_init_fp(&[0.0; 3], &[0.0; 3], &Vector6::zeros());
        assert_eq!(solver.state_at(10), solver.state_at(n - 1));
    }
}
