//! Primal interior-point driver: damped Newton descent on the log-barrier
//! objective with an outer continuation on the barrier parameter.

use tracing::{debug, warn};

use crate::chol_ip::IpCholeskySolver;
use crate::error::SolverError;
use crate::params::{IpSettings, ProblemParameters, SolverConfig};
use crate::qp_as::form_init_fp;
use crate::solver::SolveOutcome;
use crate::{STATE_VARS, VARS_PER_STEP};

pub(crate) struct InteriorPointQp {
    pub params: ProblemParameters,
    chol: IpCholeskySolver,
    /// Linear cost on the ZMP coordinates, local frame.
    g: Vec<f64>,
    /// Inverted barrier-perturbed Hessian entries of the ZMP positions.
    i2hess: Vec<f64>,
    /// `-H~^-1 grad(phi)`.
    i2hess_grad: Vec<f64>,
    grad: Vec<f64>,
    lb: Vec<f64>,
    ub: Vec<f64>,
    pub x: Vec<f64>,
    dx: Vec<f64>,
    /// Hessian diagonal of a state triple (`beta`, `alpha`, `2 rho`) and of
    /// a control (`gamma`).
    q2: [f64; 3],
    p2: f64,
    tol: f64,
    settings: IpSettings,
    /// Barrier objective at the current iterate.
    phi: f64,
    alpha_step: f64,
}

impl InteriorPointQp {
    pub fn new(n: usize, config: &SolverConfig) -> Self {
        Self {
            params: ProblemParameters::new(n, config),
            chol: IpCholeskySolver::new(n),
            g: vec![0.0; 2 * n],
            i2hess: vec![0.0; 2 * n],
            i2hess_grad: vec![0.0; VARS_PER_STEP * n],
            grad: vec![0.0; VARS_PER_STEP * n],
            lb: vec![0.0; 2 * n],
            ub: vec![0.0; 2 * n],
            x: vec![0.0; VARS_PER_STEP * n],
            dx: vec![0.0; VARS_PER_STEP * n],
            q2: [
                config.position_gain,
                config.velocity_gain,
                2.0 * config.regularization,
            ],
            p2: config.jerk_gain,
            tol: config.tol,
            settings: config.ip,
            phi: 0.0,
            alpha_step: 1.0,
        }
    }

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
        let n = self.params.preview_len();
        for got in [zref_x.len(), zref_y.len()] {
            if got != n {
                return Err(SolverError::DimensionMismatch { expected: n, got });
            }
        }
        for got in [lb.len(), ub.len()] {
            if got != 2 * n {
                return Err(SolverError::DimensionMismatch {
                    expected: 2 * n,
                    got,
                });
            }
        }
        self.params.set(t, h, h0, angle)?;
        self.lb.copy_from_slice(lb);
        self.ub.copy_from_slice(ub);
        self.form_g(zref_x, zref_y);
        Ok(())
    }

    pub fn form_init_fp(&mut self, fp_x: &[f64], fp_y: &[f64], init_state: &[f64; 6]) {
        form_init_fp(&self.params, fp_x, fp_y, init_state, &mut self.x);
    }

    fn form_g(&mut self, zref_x: &[f64], zref_y: &[f64]) {
        for (i, ip) in self.params.intervals.iter().enumerate() {
            self.g[2 * i] = -self.q2[0] * (ip.cos * zref_x[i] + ip.sin * zref_y[i]);
            self.g[2 * i + 1] = -self.q2[0] * (-ip.sin * zref_x[i] + ip.cos * zref_y[i]);
        }
    }

    /// Gradient of the barrier objective and the perturbed inverse Hessian.
    ///
    /// The curvature of a state's pair of barrier terms is shared between the
    /// two axes (the tighter one wins), which keeps the two factor chains of
    /// the Schur complement decoupled under support rotations; the gradient
    /// itself stays exact, so the damped iteration still converges to the
    /// barrier minimizer.
    fn form_grad_hess_logbar(&mut self, kappa: f64) {
        let n = self.params.preview_len();
        self.phi = 0.0;
        for i in 0..STATE_VARS * n {
            self.grad[i] = self.q2[i % 3] * self.x[i];
        }
        for i in STATE_VARS * n..VARS_PER_STEP * n {
            self.grad[i] = self.p2 * self.x[i];
        }
        for i in 0..n {
            let mut curvature = 0.0_f64;
            for axis in 0..2 {
                let k = 2 * i + axis;
                let at = 3 * k;
                let lb_diff = self.x[at] - self.lb[k];
                let ub_diff = self.ub[k] - self.x[at];
                self.phi -= lb_diff.ln() + ub_diff.ln();
                let li = 1.0 / lb_diff;
                let ui = 1.0 / ub_diff;
                self.grad[at] += self.g[k] + kappa * (ui - li);
                curvature = curvature.max(ui * ui + li * li);
            }
            let i2h = 1.0 / (self.q2[0] + kappa * curvature);
            self.i2hess[2 * i] = i2h;
            self.i2hess[2 * i + 1] = i2h;
        }
        self.phi *= kappa;
    }

    /// Complete `phi` with the quadratic cost (the barrier part is already
    /// accumulated).
    fn form_phi(&mut self) {
        let n = self.params.preview_len();
        for i in 0..STATE_VARS * n {
            self.phi += 0.5 * self.q2[i % 3] * self.x[i] * self.x[i];
        }
        for i in STATE_VARS * n..VARS_PER_STEP * n {
            self.phi += 0.5 * self.p2 * self.x[i] * self.x[i];
        }
        for i in 0..2 * n {
            self.phi += self.g[i] * self.x[3 * i];
        }
    }

    fn form_i2hess_grad(&mut self) {
        let n = self.params.preview_len();
        for i in 0..2 * n {
            let at = 3 * i;
            self.i2hess_grad[at] = -self.grad[at] * self.i2hess[i];
            self.i2hess_grad[at + 1] = -self.grad[at + 1] * self.params.inv_q[1];
            self.i2hess_grad[at + 2] = -self.grad[at + 2] * self.params.inv_q[2];
        }
        for i in STATE_VARS * n..VARS_PER_STEP * n {
            self.i2hess_grad[i] = -self.grad[i] * self.params.inv_p;
        }
    }

    /// Largest step along `dx` that keeps every ZMP coordinate strictly
    /// inside its box, bisected down from 1 by `bs_beta`.
    fn init_alpha(&mut self) {
        let n = self.params.preview_len();
        let mut min_alpha = 1.0_f64;
        for i in 0..2 * n {
            let at = 3 * i;
            let d = self.dx[at];
            let t = if d < -self.tol {
                (self.lb[i] - self.x[at]) / d
            } else if d > self.tol {
                (self.ub[i] - self.x[at]) / d
            } else {
                continue;
            };
            if t < min_alpha {
                min_alpha = t;
            }
        }
        self.alpha_step = 1.0;
        while self.alpha_step >= min_alpha {
            self.alpha_step *= self.settings.bs_beta;
            if self.alpha_step < self.tol {
                break;
            }
        }
    }

    fn grad_dot_dx(&self) -> f64 {
        self.grad.iter().zip(&self.dx).map(|(a, b)| a * b).sum()
    }

    /// `phi(x + alpha dx)` for the Armijo test.
    fn phi_at_step(&self, kappa: f64) -> f64 {
        let n = self.params.preview_len();
        let mut res = 0.0;
        for i in 0..2 * n {
            let at = 3 * i;
            let z = self.x[at] + self.alpha_step * self.dx[at];
            res -= kappa * ((z - self.lb[i]).ln() + (self.ub[i] - z).ln());
            res += self.g[i] * z;
            res += 0.5 * self.q2[0] * z * z;
            let v = self.x[at + 1] + self.alpha_step * self.dx[at + 1];
            res += 0.5 * self.q2[1] * v * v;
            let a = self.x[at + 2] + self.alpha_step * self.dx[at + 2];
            res += 0.5 * self.q2[2] * a * a;
        }
        for i in STATE_VARS * n..VARS_PER_STEP * n {
            let u = self.x[i] + self.alpha_step * self.dx[i];
            res += 0.5 * self.p2 * u * u;
        }
        res
    }

    /// Newton iterations for one barrier value. Returns the iteration count
    /// and whether the stage ended at a stationary point (as opposed to a
    /// collapsed line search).
    fn newton_stage(&mut self, kappa: f64) -> Result<(usize, bool), SolverError> {
        let n = self.params.preview_len();
        for iter in 0..self.settings.max_inner {
            self.form_grad_hess_logbar(kappa);
            self.form_phi();
            self.form_i2hess_grad();

            self.chol
                .solve(&self.params, &self.i2hess_grad, &self.i2hess, &mut self.dx)?;

            self.init_alpha();
            if self.alpha_step < self.tol {
                return Ok((iter, true));
            }
            let decrement = self.grad_dot_dx();
            if decrement.abs() < self.tol {
                return Ok((iter, true));
            }

            let slope = self.settings.bs_alpha * decrement;
            loop {
                if self.phi_at_step(kappa) <= self.phi + self.alpha_step * slope {
                    break;
                }
                self.alpha_step *= self.settings.bs_beta;
                if self.alpha_step < self.tol {
                    return Ok((iter + 1, false));
                }
            }

            for i in 0..VARS_PER_STEP * n {
                self.x[i] += self.alpha_step * self.dx[i];
            }
        }
        Ok((self.settings.max_inner, true))
    }

    pub fn solve(&mut self) -> Result<SolveOutcome, SolverError> {
        let n = self.params.preview_len();
        let mut t = self.settings.t_begin;
        let mut iterations = 0;
        let mut converged = true;
        loop {
            let (iters, finished) = self.newton_stage(1.0 / t)?;
            iterations += iters;
            if !finished {
                converged = false;
            }
            debug!(t, iterations = iters, finished, "barrier stage");
            if 2.0 * n as f64 / t < self.settings.tol_outer {
                break;
            }
            t *= self.settings.mu;
        }
        if !converged {
            warn!(iterations, "interior-point inner cap reached in some stage");
        }
        Ok(SolveOutcome {
            converged,
            iterations,
            active_constraints: 0,
        })
    }
}
