//! KKT solves for the active-set method: the equality factor augmented by one
//! row per active ZMP bound, maintained incrementally.
//!
//! Activating a bound appends a row to the factor (`update`); dropping one
//! removes its row and restores triangularity with Givens rotations
//! (`downdate`). Row storage is a fixed `2N x 8N` table addressed through a
//! permutation, so a downdate shuffles indices instead of memory.

use tracing::trace;

use crate::ecl::{form_etx, form_ex, EqualityFactor};
use crate::error::SolverError;
use crate::params::ProblemParameters;
use crate::STATE_VARS;

/// One rectangular ZMP bound of the preview window.
///
/// The bound applies to a single bar-frame component of the decision vector
/// (`comp`): the local x or y ZMP position of one state. `coef` is the
/// corresponding row of the interval's rotation matrix; it shapes the row
/// this constraint contributes to the augmented factor, because the
/// equality Jacobian rotates the position pair of every state.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Constraint {
    /// Offset of the state block in the decision vector (`6 * state`).
    pub ind: usize,
    /// Offset of the bounded component (`ind` for x, `ind + 3` for y).
    pub comp: usize,
    pub coef_x: f64,
    pub coef_y: f64,
    pub lb: f64,
    pub ub: f64,
    pub active: bool,
}

pub(crate) struct AsCholeskySolver {
    n: usize,
    ecl: EqualityFactor,
    /// Augmented factor rows, one per active constraint; `order` maps the
    /// working-set position to the backing row.
    icl: Vec<Vec<f64>>,
    order: Vec<usize>,
    /// Lagrange multipliers: equality part in the first `6N` entries,
    /// inequality part after them.
    nu: Vec<f64>,
    /// Forward-substitution solution, kept between factor updates.
    z: Vec<f64>,
    /// `-(x + H^-1 g)` scratch.
    x_ihg: Vec<f64>,
}

impl AsCholeskySolver {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            ecl: EqualityFactor::new(n),
            icl: vec![vec![0.0; 8 * n]; 2 * n],
            order: (0..2 * n).collect(),
            nu: vec![0.0; 8 * n],
            z: vec![0.0; 8 * n],
            x_ihg: vec![0.0; 8 * n],
        }
    }

    /// Newton step from a feasible point with an empty working set.
    ///
    /// Forms `s = E (-x - H^-1 g)`, solves the Schur system for the equality
    /// multipliers and returns `dx = -x - H^-1 (g + E' nu)`, which keeps
    /// `E (x + dx)` on the dynamics manifold.
    pub fn solve(
        &mut self,
        p: &ProblemParameters,
        i_hg: &[f64],
        x: &[f64],
        dx: &mut [f64],
    ) -> Result<(), SolverError> {
        let n = self.n;
        self.ecl.factor(p)?;

        for i in 0..8 * n {
            self.x_ihg[i] = -x[i];
        }
        for i in 0..2 * n {
            self.x_ihg[3 * i] -= i_hg[i];
        }

        form_ex(p, &self.x_ihg, &mut self.nu[..STATE_VARS * n]);
        self.ecl.forward(&mut self.nu[..STATE_VARS * n]);
        self.z[..STATE_VARS * n].copy_from_slice(&self.nu[..STATE_VARS * n]);
        self.ecl.backward(&mut self.nu[..STATE_VARS * n]);

        form_etx(p, &self.nu, dx);
        for i in 0..STATE_VARS * n {
            dx[i] = self.x_ihg[i] - p.inv_q[i % 3] * dx[i];
        }
        for i in STATE_VARS * n..8 * n {
            dx[i] = self.x_ihg[i] - p.inv_p * dx[i];
        }
        Ok(())
    }

    /// Append the newest working-set constraint to the factor and re-solve.
    pub fn up_resolve(
        &mut self,
        p: &ProblemParameters,
        i_hg: &[f64],
        constraints: &[Constraint],
        w: &[usize],
        x: &[f64],
        dx: &mut [f64],
    ) -> Result<(), SolverError> {
        let pos = w.len() - 1;
        debug_assert!(
            !w[..pos].contains(&w[pos]),
            "constraint {} already in the working set",
            w[pos]
        );
        let c = constraints[w[pos]];
        self.update(p, &c, pos)?;
        self.update_z(&c, pos, i_hg, x);
        self.resolve(p, i_hg, constraints, w, x, dx);
        Ok(())
    }

    /// Add the row of constraint `c` at working-set position `pos`.
    ///
    /// The row starts as `a H^-1 [E' A_w']` restricted to its sparsity
    /// pattern, then a single sweep against the factor columns (with fill-in
    /// to the end of the window) and against the previously added rows turns
    /// it into the new factor row.
    fn update(
        &mut self,
        p: &ProblemParameters,
        c: &Constraint,
        pos: usize,
    ) -> Result<(), SolverError> {
        let n = self.n;
        let state = c.ind / STATE_VARS;
        let tail = STATE_VARS * n;
        let last = tail + pos;
        let q0 = p.inv_q[0];

        let row_idx = self.order[pos];
        let mut row = std::mem::take(&mut self.icl[row_idx]);

        row[..=last].fill(0.0);
        row[c.ind] = -q0 * c.coef_x;
        row[c.ind + 3] = -q0 * c.coef_y;
        if state != n - 1 {
            row[c.ind + STATE_VARS] = q0 * c.coef_x;
            row[c.ind + STATE_VARS + 3] = q0 * c.coef_y;
        }
        row[last] = q0;

        // sweep the equality-factor columns; each 3-element group resolves
        // against a diagonal block and spills into the next one
        for i in state..n {
            for axis in 0..2 {
                let at = STATE_VARS * i + 3 * axis;
                let d = self.ecl.diag(i);
                row[at] /= d[(0, 0)];
                row[at + 1] = (row[at + 1] - row[at] * d[(1, 0)]) / d[(1, 1)];
                row[at + 2] =
                    (row[at + 2] - row[at] * d[(2, 0)] - row[at + 1] * d[(2, 1)]) / d[(2, 2)];

                let t = [row[at], row[at + 1], row[at + 2]];
                if i < n - 1 {
                    let nd = self.ecl.ndiag(i);
                    row[at + STATE_VARS] -=
                        t[0] * nd[(0, 0)] + t[1] * nd[(0, 1)] + t[2] * nd[(0, 2)];
                    row[at + STATE_VARS + 1] -= t[1] * nd[(1, 1)] + t[2] * nd[(1, 2)];
                    row[at + STATE_VARS + 2] -= t[2] * nd[(2, 2)];
                }
                row[last] -= t[0] * t[0] + t[1] * t[1] + t[2] * t[2];

                for j in 0..pos {
                    let prior = &self.icl[self.order[j]];
                    row[tail + j] -=
                        t[0] * prior[at] + t[1] * prior[at + 1] + t[2] * prior[at + 2];
                }
            }
        }

        // resolve the trailing entries against the previously added rows
        for j in 0..pos {
            let prior = &self.icl[self.order[j]];
            let at = tail + j;
            row[at] /= prior[at];
            let t = row[at];
            row[last] -= t * t;
            for k in j + 1..pos {
                row[tail + k] -= t * self.icl[self.order[k]][tail + j];
            }
        }

        let pivot = row[last];
        if pivot <= 0.0 {
            self.icl[row_idx] = row;
            return Err(SolverError::NotPositiveDefinite { pivot });
        }
        row[last] = pivot.sqrt();

        self.icl[row_idx] = row;
        trace!(constraint = c.comp, pos, "activated bound");
        Ok(())
    }

    /// Extend the forward-substitution solution by the entry of the new row.
    fn update_z(&mut self, c: &Constraint, pos: usize, i_hg: &[f64], x: &[f64]) {
        let tail = STATE_VARS * self.n;
        let zind = tail + pos;
        let row = &self.icl[self.order[pos]];

        let mut zn = -x[c.comp] - i_hg[c.comp / 3];
        for i in c.ind..zind {
            zn -= self.z[i] * row[i];
        }
        self.nu[..zind].copy_from_slice(&self.z[..zind]);
        self.z[zind] = zn / row[zind];
        self.nu[zind] = self.z[zind];
    }

    /// Backward substitution over the augmented factor and assembly of the
    /// descent direction for the current working set.
    fn resolve(
        &mut self,
        p: &ProblemParameters,
        i_hg: &[f64],
        constraints: &[Constraint],
        w: &[usize],
        x: &[f64],
        dx: &mut [f64],
    ) {
        let n = self.n;
        let tail = STATE_VARS * n;
        let nw = w.len();

        for i in (0..nw).rev() {
            let row = &self.icl[self.order[i]];
            let last = tail + i;
            self.nu[last] /= row[last];
            let nu_last = self.nu[last];
            for j in (constraints[w[i]].ind..last).rev() {
                self.nu[j] -= nu_last * row[j];
            }
        }
        self.ecl.backward(&mut self.nu[..tail]);

        form_etx(p, &self.nu, dx);
        for i in 0..tail {
            dx[i] = -x[i] - p.inv_q[i % 3] * dx[i];
        }
        for i in tail..8 * n {
            dx[i] = -x[i] - p.inv_p * dx[i];
        }
        for i in 0..2 * n {
            dx[3 * i] -= i_hg[i];
        }
        for (i, &cnum) in w.iter().enumerate() {
            dx[constraints[cnum].comp] -= p.inv_q[0] * self.nu[tail + i];
        }
    }

    /// Remove the constraint at working-set position `pos` (already taken out
    /// of `w`) and re-solve.
    pub fn down_resolve(
        &mut self,
        p: &ProblemParameters,
        i_hg: &[f64],
        constraints: &[Constraint],
        w: &[usize],
        pos: usize,
        x: &[f64],
        dx: &mut [f64],
    ) -> Result<(), SolverError> {
        let n = self.n;
        let tail = STATE_VARS * n;
        let nw = w.len();

        // recover the right-hand-side tail the removed row contributed to,
        // shifting every entry one slot up
        let mut z_keep = 0.0;
        for i in (pos + 1..=nw).rev() {
            let zind = tail + i;
            let row = &self.icl[self.order[i]];
            let mut zn = self.z[zind] * row[zind];
            self.z[zind] = z_keep;
            for j in tail + pos..zind {
                zn += self.z[j] * row[j];
            }
            z_keep = zn;
        }
        self.z[tail + pos] = z_keep;

        self.downdate(pos, nw)?;

        // forward-substitute the affected tail with the rotated rows
        for i in pos..nw {
            let zind = tail + i;
            let row = &self.icl[self.order[i]];
            let mut zn = self.z[zind];
            for j in tail + pos..zind {
                zn -= self.z[j] * row[j];
            }
            self.z[zind] = zn / row[zind];
        }

        self.nu[..tail + nw].copy_from_slice(&self.z[..tail + nw]);
        self.resolve(p, i_hg, constraints, w, x, dx);
        Ok(())
    }

    /// Drop row `pos` of the augmented factor. The freed slot rotates to the
    /// end of the permutation; Givens rotations re-triangularize the rows
    /// below, flipping signs where needed to keep the diagonal positive.
    fn downdate(&mut self, pos: usize, nw: usize) -> Result<(), SolverError> {
        let tail = STATE_VARS * self.n;

        let freed = self.order[pos];
        for i in pos..nw {
            self.order[i] = self.order[i + 1];
        }
        self.order[nw] = freed;

        for i in pos..nw {
            let at = tail + i;
            let row_idx = self.order[i];
            let x1 = self.icl[row_idx][at];
            let x2 = self.icl[row_idx][at + 1];

            if x1 == 0.0 && x2 == 0.0 {
                return Err(SolverError::NotPositiveDefinite { pivot: 0.0 });
            }
            let (cos_t, sin_t) = if x2.abs() >= x1.abs() {
                let t = x1 / x2;
                let s = 1.0 / (1.0 + t * t).sqrt();
                (s * t, s)
            } else {
                let t = x2 / x1;
                let c = 1.0 / (1.0 + t * t).sqrt();
                (c, c * t)
            };

            let rotated = cos_t * x1 + sin_t * x2;
            let sign = rotated.signum();
            self.icl[row_idx][at] = rotated.abs();
            self.icl[row_idx][at + 1] = 0.0;

            for j in i + 1..nw {
                let rj = self.order[j];
                let y1 = self.icl[rj][at];
                let y2 = self.icl[rj][at + 1];
                self.icl[rj][at] = sign * (cos_t * y1 + sin_t * y2);
                self.icl[rj][at + 1] = -sin_t * y1 + cos_t * y2;
            }
        }
        trace!(pos, remaining = nw, "dropped bound");
        Ok(())
    }

    /// Multipliers of the active constraints, in working-set order.
    pub fn lambda(&self) -> &[f64] {
        &self.nu[STATE_VARS * self.n..]
    }

    #[cfg(test)]
    pub fn equality_multipliers(&self) -> &[f64] {
        &self.nu[..STATE_VARS * self.n]
    }
}
