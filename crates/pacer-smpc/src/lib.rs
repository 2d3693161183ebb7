//! Sparse model-predictive control for biped walking.
//!
//! This crate solves, at each control tick, a small structured quadratic
//! program encoding a linear inverted pendulum with piecewise-constant jerk
//! control and rectangular ZMP constraints over a fixed preview window of
//! `N` sampling intervals. The pipeline:
//!
//! 1. **Problem parameters** — per-interval dynamics coefficients and
//!    inverse Hessian diagonals ([`ProblemParameters`])
//! 2. **Equality factor** — block-bidiagonal Cholesky factor of the
//!    Schur complement of the preview dynamics
//! 3. **Active-set solver** — incremental up/downdates of that factor as
//!    ZMP bounds enter and leave the working set
//! 4. **Interior-point solver** — Newton descent on the same factor with a
//!    log-barrier Hessian perturbation
//!
//! # Architecture
//!
//! The decision vector stacks `N` six-dimensional states (ZMP position,
//! CoM velocity, CoM acceleration for both ground axes, each rotated into
//! the support foot frame of its interval) followed by `N` jerk pairs.
//! Exploiting that structure, every KKT solve costs `O(N)` instead of the
//! `O(N^3)` of a dense factorization, which is what makes sub-millisecond
//! replanning on the robot feasible.
//!
//! All workspace buffers are sized once at construction from `N` and reused
//! across ticks; a solve performs no allocation.

pub mod error;
pub mod params;
pub mod state;

mod chol_as;
mod chol_ip;
mod ecl;
mod qp_as;
mod qp_ip;
mod solver;

pub use error::{ConfigError, SolverError};
pub use params::{IntervalParams, IpSettings, ProblemParameters, SolverConfig};
pub use solver::{SmpcSolver, SolveOutcome, SolverKind};

/// Variables per preview state: ZMP position, CoM velocity and CoM
/// acceleration for the two ground axes.
pub const STATE_VARS: usize = 6;

/// Control variables per interval (x and y jerk).
pub const CONTROL_VARS: usize = 2;

/// Total decision variables per preview interval.
pub const VARS_PER_STEP: usize = STATE_VARS + CONTROL_VARS;
