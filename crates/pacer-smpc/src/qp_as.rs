//! Primal active-set driver.
//!
//! Starting from an equality-feasible point that respects every ZMP bound,
//! each iteration computes the Newton direction for the current working set,
//! steps to the nearest blocking bound (activating it) or takes the full
//! step, and when no bound blocks, drops the active constraint with the most
//! negative multiplier. Ties go to the lower index.

use tracing::{debug, warn};

use crate::chol_as::{AsCholeskySolver, Constraint};
use crate::error::SolverError;
use crate::params::{ProblemParameters, SolverConfig};
use crate::solver::SolveOutcome;
use crate::state;
use crate::{STATE_VARS, VARS_PER_STEP};

pub(crate) struct ActiveSetQp {
    pub params: ProblemParameters,
    chol: AsCholeskySolver,
    constraints: Vec<Constraint>,
    working_set: Vec<usize>,
    /// `H^-1 g` on the ZMP coordinates (the only nonzero part of the
    /// gradient offset).
    i_hg: Vec<f64>,
    pub x: Vec<f64>,
    dx: Vec<f64>,
    position_gain: f64,
    tol: f64,
    max_iterations: usize,
}

impl ActiveSetQp {
    pub fn new(n: usize, config: &SolverConfig) -> Self {
        Self {
            params: ProblemParameters::new(n, config),
            chol: AsCholeskySolver::new(n),
            constraints: vec![Constraint::default(); 2 * n],
            working_set: Vec::with_capacity(2 * n),
            i_hg: vec![0.0; 2 * n],
            x: vec![0.0; VARS_PER_STEP * n],
            dx: vec![0.0; VARS_PER_STEP * n],
            position_gain: config.position_gain,
            tol: config.tol,
            max_iterations: config.max_iterations,
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
        self.form_i_hg(zref_x, zref_y);
        self.form_bounds(lb, ub);
        Ok(())
    }

    /// Gradient offset from the ZMP reference, rotated into the local frame
    /// of each interval and scaled by the inverse Hessian.
    fn form_i_hg(&mut self, zref_x: &[f64], zref_y: &[f64]) {
        let inv_q0 = self.params.inv_q[0];
        for (i, ip) in self.params.intervals.iter().enumerate() {
            let gx = -self.position_gain * (ip.cos * zref_x[i] + ip.sin * zref_y[i]);
            let gy = -self.position_gain * (-ip.sin * zref_x[i] + ip.cos * zref_y[i]);
            self.i_hg[2 * i] = inv_q0 * gx;
            self.i_hg[2 * i + 1] = inv_q0 * gy;
        }
    }

    fn form_bounds(&mut self, lb: &[f64], ub: &[f64]) {
        for (i, ip) in self.params.intervals.iter().enumerate() {
            self.constraints[2 * i] = Constraint {
                ind: STATE_VARS * i,
                comp: STATE_VARS * i,
                coef_x: ip.cos,
                coef_y: ip.sin,
                lb: lb[2 * i],
                ub: ub[2 * i],
                active: false,
            };
            self.constraints[2 * i + 1] = Constraint {
                ind: STATE_VARS * i,
                comp: STATE_VARS * i + 3,
                coef_x: -ip.sin,
                coef_y: ip.cos,
                lb: lb[2 * i + 1],
                ub: ub[2 * i + 1],
                active: false,
            };
        }
    }

    /// Build the initial feasible point: per interval, the jerk that places
    /// the next ZMP on the footstep reference, forward-integrated and rotated
    /// into each interval's support frame.
    pub fn form_init_fp(&mut self, fp_x: &[f64], fp_y: &[f64], init_state: &[f64; 6]) {
        form_init_fp(&self.params, fp_x, fp_y, init_state, &mut self.x);
    }

    pub fn solve(&mut self) -> Result<SolveOutcome, SolverError> {
        let n = self.params.preview_len();
        self.working_set.clear();
        for c in &mut self.constraints {
            c.active = false;
        }

        self.chol
            .solve(&self.params, &self.i_hg, &self.x, &mut self.dx)?;

        let mut iterations = 0;
        loop {
            iterations += 1;
            if iterations > self.max_iterations {
                warn!(
                    iterations,
                    active = self.working_set.len(),
                    "active-set iteration cap reached"
                );
                return Ok(SolveOutcome {
                    converged: false,
                    iterations: iterations - 1,
                    active_constraints: self.working_set.len(),
                });
            }

            let (alpha, blocking) = self.max_feasible_step();
            for i in 0..VARS_PER_STEP * n {
                self.x[i] += alpha * self.dx[i];
            }

            if let Some(cnum) = blocking {
                self.constraints[cnum].active = true;
                self.working_set.push(cnum);
                self.chol.up_resolve(
                    &self.params,
                    &self.i_hg,
                    &self.constraints,
                    &self.working_set,
                    &self.x,
                    &mut self.dx,
                )?;
            } else {
                match self.most_negative_multiplier() {
                    None => {
                        debug!(
                            iterations,
                            active = self.working_set.len(),
                            "active-set optimum"
                        );
                        return Ok(SolveOutcome {
                            converged: true,
                            iterations,
                            active_constraints: self.working_set.len(),
                        });
                    }
                    Some(pos) => {
                        let cnum = self.working_set.remove(pos);
                        self.constraints[cnum].active = false;
                        self.chol.down_resolve(
                            &self.params,
                            &self.i_hg,
                            &self.constraints,
                            &self.working_set,
                            pos,
                            &self.x,
                            &mut self.dx,
                        )?;
                    }
                }
            }
        }
    }

    /// Largest `alpha` in (0, 1] with `x + alpha dx` inside every inactive
    /// bound, and the index of the bound attained first. Scanning in index
    /// order keeps ties on the lower index.
    fn max_feasible_step(&self) -> (f64, Option<usize>) {
        let mut alpha = 1.0_f64;
        let mut blocking = None;
        for (k, c) in self.constraints.iter().enumerate() {
            if c.active {
                continue;
            }
            let v = self.x[c.comp];
            let d = self.dx[c.comp];
            let t = if d < -self.tol {
                (c.lb - v) / d
            } else if d > self.tol {
                (c.ub - v) / d
            } else {
                continue;
            };
            if t < alpha {
                alpha = t;
                blocking = Some(k);
            }
        }
        (alpha.max(0.0), blocking)
    }

    /// Working-set position of the most negative multiplier, if any is
    /// negative beyond tolerance. Scanning in set order keeps ties on the
    /// lower position.
    fn most_negative_multiplier(&self) -> Option<usize> {
        let lambda = self.chol.lambda();
        let mut worst = None;
        let mut min = -self.tol;
        for i in 0..self.working_set.len() {
            if lambda[i] < min {
                min = lambda[i];
                worst = Some(i);
            }
        }
        worst
    }

    #[cfg(test)]
    fn kkt_residual(&self) -> Vec<f64> {
        // H x + g + E' nu + A_w' lambda, evaluated from solver internals
        let n = self.params.preview_len();
        let q = [
            1.0 / self.params.inv_q[0],
            1.0 / self.params.inv_q[1],
            1.0 / self.params.inv_q[2],
        ];
        let p = 1.0 / self.params.inv_p;

        let mut r = vec![0.0; VARS_PER_STEP * n];
        crate::ecl::form_etx(&self.params, self.chol.equality_multipliers(), &mut r);
        for i in 0..STATE_VARS * n {
            r[i] += q[i % 3] * self.x[i];
        }
        for i in STATE_VARS * n..VARS_PER_STEP * n {
            r[i] += p * self.x[i];
        }
        for i in 0..2 * n {
            r[3 * i] += q[0] * self.i_hg[i]; // g = H * iHg on ZMP rows
        }
        let lambda = self.chol.lambda();
        for (i, &cnum) in self.working_set.iter().enumerate() {
            r[self.constraints[cnum].comp] += lambda[i];
        }
        r
    }
}

/// Shared between both solvers: jerks chosen so each interval's ZMP lands on
/// the footstep reference point, forward-integrated from the current state.
pub(crate) fn form_init_fp(
    params: &ProblemParameters,
    fp_x: &[f64],
    fp_y: &[f64],
    init_state: &[f64; 6],
    x: &mut [f64],
) {
    let n = params.preview_len();
    let mut cur = *init_state;
    let (states, controls) = x.split_at_mut(STATE_VARS * n);
    for i in 0..n {
        let ip = &params.intervals[i];
        let ux = (fp_x[i] - (cur[0] + ip.t * cur[1] + ip.a3 * cur[2])) / ip.b[0];
        let uy = (fp_y[i] - (cur[3] + ip.t * cur[4] + ip.a3 * cur[5])) / ip.b[0];
        state::advance_state(ip, [ux, uy], &mut cur);
        let out = &mut states[STATE_VARS * i..STATE_VARS * (i + 1)];
        out.copy_from_slice(&cur);
        state::tilde_to_bar(ip.sin, ip.cos, out);
        controls[2 * i] = ux;
        controls[2 * i + 1] = uy;
    }
}
