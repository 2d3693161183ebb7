//! End-to-end checks of both QP methods on walking-shaped preview windows:
//! dynamics feasibility, box feasibility and cross-method agreement.

use approx::assert_relative_eq;
use nalgebra::Vector6;
use pacer_smpc::{state, SmpcSolver, SolverKind};

struct Window {
    n: usize,
    t: Vec<f64>,
    h: Vec<f64>,
    h0: f64,
    angle: Vec<f64>,
    zref_x: Vec<f64>,
    zref_y: Vec<f64>,
    lb: Vec<f64>,
    ub: Vec<f64>,
}

/// Alternating single supports with a slight turn every five intervals,
/// foot-local NAO-sized ZMP boxes around the rotated reference.
fn stepping_window(n: usize) -> Window {
    let t = vec![0.1; n];
    let h = vec![0.261; n];
    let angle: Vec<f64> = (0..n).map(|i| 0.0873 * (i / 5) as f64).collect();
    let zref_x: Vec<f64> = (0..n).map(|i| 0.035 * (i / 5) as f64).collect();
    let zref_y: Vec<f64> = (0..n)
        .map(|i| if (i / 5) % 2 == 0 { 0.1 } else { -0.1 })
        .collect();
    let mut lb = vec![0.0; 2 * n];
    let mut ub = vec![0.0; 2 * n];
    for i in 0..n {
        let (s, c) = angle[i].sin_cos();
        let zx = c * zref_x[i] + s * zref_y[i];
        let zy = -s * zref_x[i] + c * zref_y[i];
        lb[2 * i] = zx - 0.03;
        ub[2 * i] = zx + 0.09;
        lb[2 * i + 1] = zy - 0.025;
        ub[2 * i + 1] = zy + 0.025;
    }
    Window {
        n,
        t,
        h,
        h0: 0.261,
        angle,
        zref_x,
        zref_y,
        lb,
        ub,
    }
}

/// Standing on both feet: zero reference, tight symmetric box.
fn standing_window(n: usize) -> Window {
    let mut lb = Vec::with_capacity(2 * n);
    let mut ub = Vec::with_capacity(2 * n);
    for _ in 0..n {
        lb.extend_from_slice(&[-0.025, -0.025]);
        ub.extend_from_slice(&[0.07, 0.025]);
    }
    Window {
        n,
        t: vec![0.1; n],
        h: vec![0.261; n],
        h0: 0.261,
        angle: vec![0.0; n],
        zref_x: vec![0.0; n],
        zref_y: vec![0.0; n],
        lb,
        ub,
    }
}

fn solve_window(w: &Window, kind: SolverKind, init: &Vector6<f64>) -> SmpcSolver {
    let mut solver = SmpcSolver::new(w.n, kind).unwrap();
    solver
        .set_parameters(
            &w.t, &w.h, w.h0, &w.angle, &w.zref_x, &w.zref_y, &w.lb, &w.ub,
        )
        .unwrap();
    solver.form_init_fp(&w.zref_x, &w.zref_y, init);
    let outcome = solver.solve().unwrap();
    assert!(outcome.converged, "{kind:?} did not converge");
    solver
}

/// Residual of the preview dynamics, recomputed from scratch: every solution
/// state must satisfy `x~_{i+1} = A x~_i + B u_i` starting at `init`.
fn dynamics_residual(solver: &SmpcSolver, w: &Window, init: &Vector6<f64>) -> f64 {
    let x = solver.solution();
    let mut cur: [f64; 6] = (*init).into();
    let mut worst = 0.0_f64;
    let mut h_prev = w.h0;
    for i in 0..w.n {
        let ti = w.t[i];
        let a3 = ti * ti / 2.0 - (w.h[i] - h_prev);
        let b = [ti * ti * ti / 6.0 - w.h[i] * ti, ti * ti / 2.0, ti];
        let (ux, uy) = (x[6 * w.n + 2 * i], x[6 * w.n + 2 * i + 1]);
        for (axis, u) in [(0, ux), (1, uy)] {
            let s = &mut cur[3 * axis..3 * axis + 3];
            let p = s[0] + ti * s[1] + a3 * s[2] + b[0] * u;
            let v = s[1] + ti * s[2] + b[1] * u;
            let a = s[2] + b[2] * u;
            (s[0], s[1], s[2]) = (p, v, a);
        }
        // compare against the solution state, rotated back from the bar frame
        let mut sol = [0.0; 6];
        sol.copy_from_slice(&x[6 * i..6 * i + 6]);
        state::bar_to_tilde(w.angle[i].sin(), w.angle[i].cos(), &mut sol);
        for k in 0..6 {
            worst = worst.max((sol[k] - cur[k]).abs());
        }
        h_prev = w.h[i];
    }
    worst
}

fn box_violation(solver: &SmpcSolver, w: &Window) -> f64 {
    let x = solver.solution();
    let mut worst = 0.0_f64;
    for i in 0..2 * w.n {
        let z = x[3 * i];
        worst = worst.max(w.lb[i] - z).max(z - w.ub[i]);
    }
    worst
}

#[test]
fn active_set_satisfies_dynamics_and_bounds() {
    for n in [5, 15, 30] {
        let w = stepping_window(n);
        let init = Vector6::from([0.019, 0.0, 0.0, -6.5e-5, 0.0, 0.0]);
        let solver = solve_window(&w, SolverKind::ActiveSet, &init);

        let x_norm = solver
            .solution()
            .iter()
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        assert!(
            dynamics_residual(&solver, &w, &init) < 1e-10 * (1.0 + x_norm),
            "dynamics violated at N={n}"
        );
        assert!(box_violation(&solver, &w) < 1e-7, "bounds violated at N={n}");
    }
}

#[test]
fn interior_point_satisfies_dynamics_and_bounds() {
    for n in [5, 15] {
        let w = stepping_window(n);
        let init = Vector6::from([0.019, 0.0, 0.0, -6.5e-5, 0.0, 0.0]);
        let solver = solve_window(&w, SolverKind::InteriorPoint, &init);

        let x_norm = solver
            .solution()
            .iter()
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        assert!(
            dynamics_residual(&solver, &w, &init) < 1e-10 * (1.0 + x_norm),
            "dynamics violated at N={n}"
        );
        assert!(box_violation(&solver, &w) < 1e-7, "bounds violated at N={n}");
    }
}

#[test]
fn methods_agree_on_the_stepping_problem() {
    let n = 15;
    let w = stepping_window(n);
    let init = Vector6::from([0.019, 0.0, 0.0, -6.5e-5, 0.0, 0.0]);

    let as_solver = solve_window(&w, SolverKind::ActiveSet, &init);

    // drive the barrier continuation until the duality gap is negligible
    let mut config = pacer_smpc::SolverConfig::default();
    config.ip.tol_outer = 1e-6;
    let mut ip_solver =
        SmpcSolver::with_config(n, SolverKind::InteriorPoint, config).unwrap();
    ip_solver
        .set_parameters(
            &w.t, &w.h, w.h0, &w.angle, &w.zref_x, &w.zref_y, &w.lb, &w.ub,
        )
        .unwrap();
    ip_solver.form_init_fp(&w.zref_x, &w.zref_y, &init);
    assert!(ip_solver.solve().unwrap().converged);

    let xa = as_solver.solution();
    let xi = ip_solver.solution();
    for i in 0..6 * n {
        // accelerations (components 2 and 5 of each block) carry the
        // smallest cost weight and therefore the loosest agreement
        let tol = if i % 3 == 2 { 2e-2 } else { 1e-3 };
        assert_relative_eq!(xa[i], xi[i], epsilon = tol);
    }
}

#[test]
fn standing_keeps_zmp_near_center() {
    let n = 15;
    let w = standing_window(n);
    let init = Vector6::from([0.02, 0.0, 0.0, -6.5e-5, 0.0, 0.0]);
    let solver = solve_window(&w, SolverKind::ActiveSet, &init);

    let next = solver.next_state_tilde();
    assert!(next[0].abs() <= 0.07 + 1e-7);
    assert!(next[3].abs() <= 0.025 + 1e-7);

    // with a zero reference the ZMP may not drift outward
    assert!(next[0].abs() <= 0.021, "x ZMP drifted: {}", next[0]);
    assert!(next[3].abs() <= 0.021, "y ZMP drifted: {}", next[3]);
}

#[test]
fn next_state_matches_first_control_integration() {
    let n = 15;
    let w = stepping_window(n);
    let init = Vector6::from([0.019, 0.0, 0.0, -6.5e-5, 0.0, 0.0]);
    let solver = solve_window(&w, SolverKind::ActiveSet, &init);

    let u = solver.first_controls();
    let mut expect: [f64; 6] = init.into();
    let ip = &solver.parameters().intervals[0];
    state::advance_state(ip, [u[0], u[1]], &mut expect);

    let next = solver.next_state_tilde();
    for k in 0..6 {
        assert_relative_eq!(next[k], expect[k], epsilon = 1e-9);
    }
}
