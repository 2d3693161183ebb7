//! Block-bidiagonal Cholesky factor of `S = E * H^-1 * E'`, where `E` is the
//! Jacobian of the preview dynamics equality constraints.
//!
//! Because the state cost is identical for both ground axes and the support
//! rotations are orthonormal, `S` splits into two interleaved block-tridiagonal
//! chains (one per axis) built from the same `N` diagonal and `N-1`
//! off-diagonal 3x3 blocks:
//!
//! ```text
//! S(0,0)   = iQ~(0) + B(0) p B(0)'
//! S(i,i)   = A(i) iQ~(i-1) A(i)' + iQ~(i) + B(i) p B(i)'
//! S(i,i-1) = -A(i) iQ~(i-1)
//! ```
//!
//! with `iQ~` the inverse Hessian of one state triple. In the interior-point
//! variant the first entry of `iQ~` carries the log-barrier curvature of the
//! ZMP position, shared by both axes of a state so that the chains stay
//! decoupled.
//!
//! Diagonal factor blocks are lower triangular, off-diagonal blocks upper
//! triangular.

use nalgebra::Matrix3;

use crate::error::SolverError;
use crate::params::{IntervalParams, ProblemParameters};
use crate::STATE_VARS;

pub(crate) struct EqualityFactor {
    diag: Vec<Matrix3<f64>>,
    ndiag: Vec<Matrix3<f64>>,
}

impl EqualityFactor {
    pub fn new(n: usize) -> Self {
        Self {
            diag: vec![Matrix3::zeros(); n],
            ndiag: vec![Matrix3::zeros(); n.saturating_sub(1)],
        }
    }

    pub fn diag(&self, i: usize) -> &Matrix3<f64> {
        &self.diag[i]
    }

    pub fn ndiag(&self, i: usize) -> &Matrix3<f64> {
        &self.ndiag[i]
    }

    /// Factor the Schur complement with the unperturbed Hessian.
    pub fn factor(&mut self, p: &ProblemParameters) -> Result<(), SolverError> {
        self.factor_with(p, None)
    }

    /// Factor with the ZMP-position entries of the inverse Hessian replaced
    /// by log-barrier values. `i2hess` holds `2N` entries (x and y per state);
    /// the pair of a state must be equal.
    pub fn factor_perturbed(
        &mut self,
        p: &ProblemParameters,
        i2hess: &[f64],
    ) -> Result<(), SolverError> {
        self.factor_with(p, Some(i2hess))
    }

    fn factor_with(
        &mut self,
        p: &ProblemParameters,
        i2hess: Option<&[f64]>,
    ) -> Result<(), SolverError> {
        let n = p.preview_len();
        let q_at = |i: usize| -> [f64; 3] {
            match i2hess {
                Some(h) => [h[2 * i], p.inv_q[1], p.inv_q[2]],
                None => p.inv_q,
            }
        };

        let mut m = control_gram(&p.intervals[0], p.inv_p);
        let q0 = q_at(0);
        m[(0, 0)] += q0[0];
        m[(1, 1)] += q0[1];
        m[(2, 2)] += q0[2];
        self.diag[0] = chol3(&m)?;

        for i in 1..n {
            let ip = &p.intervals[i];
            let q_prev = q_at(i - 1);
            let q_cur = q_at(i);

            let nd = solve_right_transposed(&coupling(ip, &q_prev), &self.diag[i - 1]);

            let mut m = control_gram(ip, p.inv_p);
            add_propagated_gram(&mut m, ip, &q_prev);
            m[(0, 0)] += q_cur[0];
            m[(1, 1)] += q_cur[1];
            m[(2, 2)] += q_cur[2];
            m -= nd * nd.transpose();

            self.diag[i] = chol3(&m)?;
            self.ndiag[i - 1] = nd;
        }
        Ok(())
    }

    /// In-place forward substitution `L v = s` over a `6N` vector holding the
    /// x and y triples of each block.
    pub fn forward(&self, v: &mut [f64]) {
        let n = self.diag.len();
        for i in 0..n {
            for axis in 0..2 {
                let at = STATE_VARS * i + 3 * axis;
                if i > 0 {
                    let nd = &self.ndiag[i - 1];
                    let p_at = at - STATE_VARS;
                    let prev = [v[p_at], v[p_at + 1], v[p_at + 2]];
                    v[at] -= nd[(0, 0)] * prev[0] + nd[(0, 1)] * prev[1] + nd[(0, 2)] * prev[2];
                    v[at + 1] -= nd[(1, 1)] * prev[1] + nd[(1, 2)] * prev[2];
                    v[at + 2] -= nd[(2, 2)] * prev[2];
                }
                let d = &self.diag[i];
                v[at] /= d[(0, 0)];
                v[at + 1] = (v[at + 1] - d[(1, 0)] * v[at]) / d[(1, 1)];
                v[at + 2] = (v[at + 2] - d[(2, 0)] * v[at] - d[(2, 1)] * v[at + 1]) / d[(2, 2)];
            }
        }
    }

    /// In-place backward substitution `L' v = s`.
    pub fn backward(&self, v: &mut [f64]) {
        let n = self.diag.len();
        for i in (0..n).rev() {
            for axis in 0..2 {
                let at = STATE_VARS * i + 3 * axis;
                if i + 1 < n {
                    let nd = &self.ndiag[i];
                    let n_at = at + STATE_VARS;
                    let next = [v[n_at], v[n_at + 1], v[n_at + 2]];
                    v[at] -= nd[(0, 0)] * next[0];
                    v[at + 1] -= nd[(0, 1)] * next[0] + nd[(1, 1)] * next[1];
                    v[at + 2] -=
                        nd[(0, 2)] * next[0] + nd[(1, 2)] * next[1] + nd[(2, 2)] * next[2];
                }
                let d = &self.diag[i];
                v[at + 2] /= d[(2, 2)];
                v[at + 1] = (v[at + 1] - d[(2, 1)] * v[at + 2]) / d[(1, 1)];
                v[at] = (v[at] - d[(1, 0)] * v[at + 1] - d[(2, 0)] * v[at + 2]) / d[(0, 0)];
            }
        }
    }
}

/// `B p B'` for one interval.
fn control_gram(ip: &IntervalParams, inv_p: f64) -> Matrix3<f64> {
    let b = ip.b;
    let mut m = Matrix3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            m[(r, c)] = inv_p * b[r] * b[c];
        }
    }
    m
}

/// `m += A diag(q) A'` with `A = [1 T a3; 0 1 T; 0 0 1]`.
fn add_propagated_gram(m: &mut Matrix3<f64>, ip: &IntervalParams, q: &[f64; 3]) {
    let (t, a3) = (ip.t, ip.a3);
    m[(0, 0)] += q[0] + t * t * q[1] + a3 * a3 * q[2];
    m[(0, 1)] += t * q[1] + t * a3 * q[2];
    m[(0, 2)] += a3 * q[2];
    m[(1, 0)] += t * q[1] + a3 * t * q[2];
    m[(1, 1)] += q[1] + t * t * q[2];
    m[(1, 2)] += t * q[2];
    m[(2, 0)] += a3 * q[2];
    m[(2, 1)] += t * q[2];
    m[(2, 2)] += q[2];
}

/// `-A diag(q_prev)`, the coupling of consecutive constraint blocks.
fn coupling(ip: &IntervalParams, q_prev: &[f64; 3]) -> Matrix3<f64> {
    let mut c = Matrix3::zeros();
    c[(0, 0)] = -q_prev[0];
    c[(0, 1)] = -ip.t * q_prev[1];
    c[(0, 2)] = -ip.a3 * q_prev[2];
    c[(1, 1)] = -q_prev[1];
    c[(1, 2)] = -ip.t * q_prev[2];
    c[(2, 2)] = -q_prev[2];
    c
}

/// Solve `W L' = C` for `W` given lower-triangular `L`.
fn solve_right_transposed(c: &Matrix3<f64>, l: &Matrix3<f64>) -> Matrix3<f64> {
    let mut w = Matrix3::zeros();
    for r in 0..3 {
        w[(r, 0)] = c[(r, 0)] / l[(0, 0)];
        w[(r, 1)] = (c[(r, 1)] - w[(r, 0)] * l[(1, 0)]) / l[(1, 1)];
        w[(r, 2)] = (c[(r, 2)] - w[(r, 0)] * l[(2, 0)] - w[(r, 1)] * l[(2, 1)]) / l[(2, 2)];
    }
    w
}

/// Lower-triangular Cholesky of a symmetric 3x3 block.
fn chol3(m: &Matrix3<f64>) -> Result<Matrix3<f64>, SolverError> {
    let mut l = Matrix3::zeros();
    let p0 = m[(0, 0)];
    if p0 <= 0.0 {
        return Err(SolverError::NotPositiveDefinite { pivot: p0 });
    }
    l[(0, 0)] = p0.sqrt();
    l[(1, 0)] = m[(1, 0)] / l[(0, 0)];
    l[(2, 0)] = m[(2, 0)] / l[(0, 0)];
    let p1 = m[(1, 1)] - l[(1, 0)] * l[(1, 0)];
    if p1 <= 0.0 {
        return Err(SolverError::NotPositiveDefinite { pivot: p1 });
    }
    l[(1, 1)] = p1.sqrt();
    l[(2, 1)] = (m[(2, 1)] - l[(2, 0)] * l[(1, 0)]) / l[(1, 1)];
    let p2 = m[(2, 2)] - l[(2, 0)] * l[(2, 0)] - l[(2, 1)] * l[(2, 1)];
    if p2 <= 0.0 {
        return Err(SolverError::NotPositiveDefinite { pivot: p2 });
    }
    l[(2, 2)] = p2.sqrt();
    Ok(l)
}

/// `out = E v` for a full decision vector `v` (length `8N`), `out` of length
/// `6N`. Support rotations enter through the position pair of each state.
pub(crate) fn form_ex(p: &ProblemParameters, v: &[f64], out: &mut [f64]) {
    let n = p.preview_len();
    let (states, controls) = v.split_at(STATE_VARS * n);
    for i in 0..n {
        let ip = &p.intervals[i];
        let b = &states[STATE_VARS * i..STATE_VARS * (i + 1)];
        let u = &controls[2 * i..2 * i + 2];
        let pos_x = ip.cos * b[0] - ip.sin * b[3];
        let pos_y = ip.sin * b[0] + ip.cos * b[3];
        let o = &mut out[STATE_VARS * i..STATE_VARS * (i + 1)];
        o[0] = -pos_x + ip.b[0] * u[0];
        o[1] = -b[1] + ip.b[1] * u[0];
        o[2] = -b[2] + ip.b[2] * u[0];
        o[3] = -pos_y + ip.b[0] * u[1];
        o[4] = -b[4] + ip.b[1] * u[1];
        o[5] = -b[5] + ip.b[2] * u[1];
        if i > 0 {
            let pp = &p.intervals[i - 1];
            let bp = &states[STATE_VARS * (i - 1)..STATE_VARS * i];
            let prev_x = pp.cos * bp[0] - pp.sin * bp[3];
            let prev_y = pp.sin * bp[0] + pp.cos * bp[3];
            o[0] += prev_x + ip.t * bp[1] + ip.a3 * bp[2];
            o[1] += bp[1] + ip.t * bp[2];
            o[2] += bp[2];
            o[3] += prev_y + ip.t * bp[4] + ip.a3 * bp[5];
            o[4] += bp[4] + ip.t * bp[5];
            o[5] += bp[5];
        }
    }
}

/// `out = E' nu` for a dual vector `nu` (first `6N` entries used), `out` of
/// length `8N`.
pub(crate) fn form_etx(p: &ProblemParameters, nu: &[f64], out: &mut [f64]) {
    let n = p.preview_len();
    for i in 0..n {
        let ip = &p.intervals[i];
        let v = &nu[STATE_VARS * i..STATE_VARS * (i + 1)];
        let mut gx = [-v[0], -v[1], -v[2]];
        let mut gy = [-v[3], -v[4], -v[5]];
        if i + 1 < n {
            let np = &p.intervals[i + 1];
            let w = &nu[STATE_VARS * (i + 1)..STATE_VARS * (i + 2)];
            gx[0] += w[0];
            gx[1] += np.t * w[0] + w[1];
            gx[2] += np.a3 * w[0] + np.t * w[1] + w[2];
            gy[0] += w[3];
            gy[1] += np.t * w[3] + w[4];
            gy[2] += np.a3 * w[3] + np.t * w[4] + w[5];
        }
        let o = &mut out[STATE_VARS * i..STATE_VARS * (i + 1)];
        o[0] = ip.cos * gx[0] + ip.sin * gy[0];
        o[3] = -ip.sin * gx[0] + ip.cos * gy[0];
        o[1] = gx[1];
        o[2] = gx[2];
        o[4] = gy[1];
        o[5] = gy[2];
    }
    for i in 0..n {
        let ip = &p.intervals[i];
        let v = &nu[STATE_VARS * i..STATE_VARS * (i + 1)];
        out[STATE_VARS * n + 2 * i] = ip.b[0] * v[0] + ip.b[1] * v[1] + ip.b[2] * v[2];
        out[STATE_VARS * n + 2 * i + 1] = ip.b[0] * v[3] + ip.b[1] * v[4] + ip.b[2] * v[5];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SolverConfig;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    fn test_params(n: usize) -> ProblemParameters {
        let config = SolverConfig::default();
        let mut p = ProblemParameters::new(n, &config);
        let t: Vec<f64> = (0..n).map(|i| 0.1 + 0.02 * (i % 3) as f64).collect();
        let h: Vec<f64> = (0..n).map(|i| 0.26 + 0.005 * (i % 2) as f64).collect();
        let angle: Vec<f64> = (0..n).map(|i| 0.1 * i as f64).collect();
        p.set(&t, &h, 0.255, &angle).unwrap();
        p
    }

    /// Dense `E` assembled column-by-column through `form_ex`.
    fn dense_e(p: &ProblemParameters) -> DMatrix<f64> {
        let n = p.preview_len();
        let mut e = DMatrix::zeros(6 * n, 8 * n);
        let mut v = vec![0.0; 8 * n];
        let mut col = vec![0.0; 6 * n];
        for j in 0..8 * n {
            v[j] = 1.0;
            form_ex(p, &v, &mut col);
            v[j] = 0.0;
            for i in 0..6 * n {
                e[(i, j)] = col[i];
            }
        }
        e
    }

    fn inverse_hessian(p: &ProblemParameters, i2hess: Option<&[f64]>) -> DMatrix<f64> {
        let n = p.preview_len();
        let mut hinv = DMatrix::zeros(8 * n, 8 * n);
        for i in 0..2 * n {
            let at = 3 * i;
            hinv[(at, at)] = match i2hess {
                Some(h) => h[i],
                None => p.inv_q[0],
            };
            hinv[(at + 1, at + 1)] = p.inv_q[1];
            hinv[(at + 2, at + 2)] = p.inv_q[2];
        }
        for i in 6 * n..8 * n {
            hinv[(i, i)] = p.inv_p;
        }
        hinv
    }

    #[test]
    fn block_solve_matches_dense_solve() {
        let p = test_params(4);
        let n = p.preview_len();

        let e = dense_e(&p);
        let s = &e * inverse_hessian(&p, None) * e.transpose();

        let rhs: Vec<f64> = (0..6 * n).map(|i| (i as f64 * 0.37).sin()).collect();
        let dense = nalgebra::Cholesky::new(s.clone())
            .expect("S must be positive definite")
            .solve(&DVector::from_column_slice(&rhs));

        let mut factor = EqualityFactor::new(n);
        factor.factor(&p).unwrap();
        let mut v = rhs.clone();
        factor.forward(&mut v);
        factor.backward(&mut v);

        for i in 0..6 * n {
            assert_relative_eq!(v[i], dense[i], epsilon = 1e-9, max_relative = 1e-7);
        }
    }

    #[test]
    fn factor_reconstructs_schur_complement() {
        let p = test_params(3);
        let n = p.preview_len();

        let e = dense_e(&p);
        let s = &e * inverse_hessian(&p, None) * e.transpose();

        // assemble the full lower factor from the blocks and compare L L'
        let mut l = DMatrix::zeros(6 * n, 6 * n);
        let mut factor = EqualityFactor::new(n);
        factor.factor(&p).unwrap();
        for i in 0..n {
            for axis in 0..2 {
                let at = 6 * i + 3 * axis;
                for r in 0..3 {
                    for c in 0..3 {
                        l[(at + r, at + c)] = factor.diag(i)[(r, c)];
                        if i > 0 {
                            l[(at + r, at - 6 + c)] = factor.ndiag(i - 1)[(r, c)];
                        }
                    }
                }
            }
        }
        let recon = &l * l.transpose();
        for r in 0..6 * n {
            for c in 0..6 * n {
                assert_relative_eq!(recon[(r, c)], s[(r, c)], epsilon = 1e-12, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn perturbed_solve_matches_dense_solve() {
        let p = test_params(4);
        let n = p.preview_len();

        // pairwise-equal barrier curvature per state
        let i2hess: Vec<f64> = (0..2 * n)
            .map(|i| 1.0 / (2000.0 + 50.0 * (i / 2) as f64))
            .collect();

        let e = dense_e(&p);
        let s = &e * inverse_hessian(&p, Some(&i2hess)) * e.transpose();

        let rhs: Vec<f64> = (0..6 * n).map(|i| (i as f64 * 0.71).cos()).collect();
        let dense = nalgebra::Cholesky::new(s.clone())
            .unwrap()
            .solve(&DVector::from_column_slice(&rhs));

        let mut factor = EqualityFactor::new(n);
        factor.factor_perturbed(&p, &i2hess).unwrap();
        let mut v = rhs.clone();
        factor.forward(&mut v);
        factor.backward(&mut v);

        for i in 0..6 * n {
            assert_relative_eq!(v[i], dense[i], epsilon = 1e-9, max_relative = 1e-7);
        }
    }

    #[test]
    fn ex_and_etx_are_adjoint() {
        let p = test_params(5);
        let n = p.preview_len();

        let v: Vec<f64> = (0..8 * n).map(|i| (i as f64 * 0.13).sin()).collect();
        let w: Vec<f64> = (0..6 * n).map(|i| (i as f64 * 0.29).cos()).collect();

        let mut ev = vec![0.0; 6 * n];
        form_ex(&p, &v, &mut ev);
        let mut etw = vec![0.0; 8 * n];
        form_etx(&p, &w, &mut etw);

        let lhs: f64 = ev.iter().zip(&w).map(|(a, b)| a * b).sum();
        let rhs: f64 = v.iter().zip(&etw).map(|(a, b)| a * b).sum();
        assert_relative_eq!(lhs, rhs, epsilon = 1e-12, max_relative = 1e-12);
    }

    #[test]
    fn rejects_indefinite_block() {
        let m = Matrix3::new(1.0, 2.0, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(matches!(
            chol3(&m),
            Err(SolverError::NotPositiveDefinite { .. })
        ));
    }
}
