//! KKT solve for the interior-point method: the equality factor rebuilt each
//! Newton step with the log-barrier curvature folded into the ZMP-position
//! diagonal of the Hessian.

use crate::ecl::{form_etx, form_ex, EqualityFactor};
use crate::error::SolverError;
use crate::params::ProblemParameters;
use crate::STATE_VARS;

pub(crate) struct IpCholeskySolver {
    n: usize,
    ecl: EqualityFactor,
    nu: Vec<f64>,
}

impl IpCholeskySolver {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            ecl: EqualityFactor::new(n),
            nu: vec![0.0; STATE_VARS * n],
        }
    }

    /// Newton step on the barrier objective from an equality-feasible point.
    ///
    /// `i2hess_grad` is `-H~^-1 grad(phi)` and `i2hess` the inverted
    /// barrier-perturbed Hessian entries of the ZMP positions (pairwise equal
    /// per state). Returns `dx` with `E dx = 0`.
    pub fn solve(
        &mut self,
        p: &ProblemParameters,
        i2hess_grad: &[f64],
        i2hess: &[f64],
        dx: &mut [f64],
    ) -> Result<(), SolverError> {
        let n = self.n;
        self.ecl.factor_perturbed(p, i2hess)?;

        form_ex(p, i2hess_grad, &mut self.nu);
        self.ecl.forward(&mut self.nu);
        self.ecl.backward(&mut self.nu);

        form_etx(p, &self.nu, dx);
        for i in 0..2 * n {
            let at = 3 * i;
            dx[at] = i2hess_grad[at] - i2hess[i] * dx[at];
            dx[at + 1] = i2hess_grad[at + 1] - p.inv_q[1] * dx[at + 1];
            dx[at + 2] = i2hess_grad[at + 2] - p.inv_q[2] * dx[at + 2];
        }
        for i in STATE_VARS * n..8 * n {
            dx[i] = i2hess_grad[i] - p.inv_p * dx[i];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SolverConfig;
    use approx::assert_relative_eq;

    #[test]
    fn newton_step_stays_on_dynamics_manifold() {
        let n = 5;
        let config = SolverConfig::default();
        let mut p = ProblemParameters::new(n, &config);
        let t = vec![0.1; n];
        let h = vec![0.261; n];
        let angle: Vec<f64> = (0..n).map(|i| 0.2 * i as f64).collect();
        p.set(&t, &h, 0.261, &angle).unwrap();

        let i2hess: Vec<f64> = (0..2 * n)
            .map(|i| 1.0 / (2000.0 + 100.0 * (i / 2) as f64))
            .collect();
        let i2hess_grad: Vec<f64> = (0..8 * n).map(|i| 0.01 * (i as f64 * 0.41).sin()).collect();

        let mut chol = IpCholeskySolver::new(n);
        let mut dx = vec![0.0; 8 * n];
        chol.solve(&p, &i2hess_grad, &i2hess, &mut dx).unwrap();

        // E dx = E i2hess_grad - E H~^-1 E' nu = 0 by construction
        let mut edx = vec![0.0; STATE_VARS * n];
        form_ex(&p, &dx, &mut edx);
        for v in &edx {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-9);
        }
    }
}
