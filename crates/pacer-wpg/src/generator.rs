//! The walking pattern generator: owns the footstep timeline, materializes
//! preview windows for the solver and interpolates foot poses.

use nalgebra::{Isometry3, Matrix4, Vector3};
use tracing::debug;

use crate::footstep::{Footstep, Pose2, StepKind};
use crate::window::PreviewWindow;

/// Support type requested when appending a footstep. `Auto` alternates the
/// single-support side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPlacement {
    Auto,
    Left,
    Right,
    Double,
}

/// Outcome of assembling a preview window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStatus {
    /// The window is filled and the timeline advanced by one interval.
    Ready,
    /// The footstep list cannot cover the window (exhausted, or an interval
    /// would have to split across two steps). The generator stays usable;
    /// append footsteps and retry.
    Halt,
}

/// ZMP rectangle of a NAO-sized single support foot, with safety margin.
pub const DEFAULT_SS_BOUNDS: [f64; 4] = [0.09, 0.025, 0.03, 0.025];

/// ZMP rectangle used during double support.
pub const DEFAULT_DS_BOUNDS: [f64; 4] = [0.07, 0.025, 0.025, 0.025];

pub struct WalkingPatternGenerator {
    /// The footstep timeline; append-only.
    pub steps: Vec<Footstep>,
    n: usize,
    /// Per-interval sampling periods of the preview window [ms].
    t_ms: Vec<u32>,
    sampling_period: u32,
    step_height: f64,
    /// First step with unconsumed time; the next window starts here.
    current_step: usize,
    /// `current_step` at the time the last window was formed.
    first_preview_step: usize,
    /// Time taken from the first step by the last window [ms].
    last_time_decrement: u32,
    ds_bounds: [f64; 4],
    addstep_bounds: [f64; 4],
    /// Preview intervals a new single support owns.
    repeat_times: u32,
    /// Double-support mini-steps inserted before a new single support.
    ds_count: u32,
}

impl WalkingPatternGenerator {
    /// `n` preview intervals of `t_ms` milliseconds each; `step_height` is
    /// the swing-foot apex [m].
    pub fn new(n: usize, t_ms: u32, step_height: f64) -> Self {
        Self {
            steps: Vec::new(),
            n,
            t_ms: vec![t_ms; n],
            sampling_period: t_ms,
            step_height,
            current_step: 0,
            first_preview_step: 0,
            last_time_decrement: 0,
            ds_bounds: DEFAULT_DS_BOUNDS,
            addstep_bounds: DEFAULT_SS_BOUNDS,
            repeat_times: 4,
            ds_count: 0,
        }
    }

    /// Number of preview intervals.
    pub fn preview_len(&self) -> usize {
        self.n
    }

    /// Override the sampling period of one preview interval [ms].
    pub fn set_sampling_time(&mut self, interval: usize, t_ms: u32) {
        self.t_ms[interval] = t_ms;
    }

    /// Append a footstep displaced by `(dx, dy, dangle)` from the previous
    /// one (absolute for the first). Uses the currently configured timing
    /// and constraint rectangle.
    pub fn add_footstep(&mut self, dx: f64, dy: f64, dangle: f64, placement: StepPlacement) {
        let zref_offset = (self.addstep_bounds[0] - self.addstep_bounds[2]) / 2.0;

        if self.steps.is_empty() {
            let kind = match placement {
                StepPlacement::Auto | StepPlacement::Double => StepKind::Double,
                StepPlacement::Left => StepKind::SingleLeft,
                StepPlacement::Right => StepKind::SingleRight,
            };
            let pose = Pose2::new(dx, dy, dangle);
            let zmp = pose.transform(zref_offset, 0.0);
            self.steps.push(Footstep::new(
                pose,
                kind,
                zmp,
                self.addstep_bounds,
                self.repeat_times * self.sampling_period,
            ));
            return;
        }

        let kind = match placement {
            StepPlacement::Left => StepKind::SingleLeft,
            StepPlacement::Right => StepKind::SingleRight,
            StepPlacement::Double => StepKind::Double,
            StepPlacement::Auto => match self.steps.last().expect("nonempty").kind {
                StepKind::SingleLeft => StepKind::SingleRight,
                StepKind::SingleRight => StepKind::SingleLeft,
                StepKind::Double => StepKind::SingleRight,
            },
        };

        let pose = self.steps.last().expect("nonempty").pose.compose(dx, dy, dangle);
        let zmp = pose.transform(zref_offset, 0.0);

        // transitional double supports interpolating towards the new step
        let theta = 1.0 / f64::from(self.ds_count + 1);
        let (sx, sy, sa) = (theta * dx, theta * dy, theta * dangle);
        for _ in 0..self.ds_count {
            let ds_pose = self.steps.last().expect("nonempty").pose.compose(sx, sy, sa);
            self.steps.push(Footstep::new(
                ds_pose,
                StepKind::Double,
                zmp,
                self.ds_bounds,
                self.sampling_period,
            ));
        }

        self.steps.push(Footstep::new(
            pose,
            kind,
            zmp,
            self.addstep_bounds,
            self.repeat_times * self.sampling_period,
        ));
    }

    /// [`add_footstep`](Self::add_footstep) with explicit timing: the step
    /// owns `n_this` preview intervals, preceded by `n_total - n_this`
    /// double-support mini-steps of one interval each.
    pub fn add_footstep_timed(
        &mut self,
        dx: f64,
        dy: f64,
        dangle: f64,
        n_this: u32,
        n_total: u32,
        placement: StepPlacement,
    ) {
        self.repeat_times = n_this;
        self.ds_count = n_total - n_this;
        self.add_footstep(dx, dy, dangle, placement);
    }

    /// [`add_footstep_timed`](Self::add_footstep_timed) with an explicit
    /// constraint rectangle (toe, outer, heel, inner) [m].
    #[allow(clippy::too_many_arguments)]
    pub fn add_footstep_bounded(
        &mut self,
        dx: f64,
        dy: f64,
        dangle: f64,
        n_this: u32,
        n_total: u32,
        bounds: [f64; 4],
        placement: StepPlacement,
    ) {
        self.addstep_bounds = bounds;
        self.add_footstep_timed(dx, dy, dangle, n_this, n_total, placement);
    }

    /// Fill `par` by walking the timeline from the current step. On success
    /// the first step's remaining time shrinks by one interval and fully
    /// consumed steps are skipped for the next window.
    ///
    /// Only the tail of the window may run past a step boundary; an interval
    /// that would have to split across two steps halts the generator.
    pub fn form_preview_window(&mut self, par: &mut PreviewWindow) -> PreviewStatus {
        if self.current_step >= self.steps.len() {
            return PreviewStatus::Halt;
        }

        let mut win_step = self.current_step;
        let mut time_left = self.steps[win_step].time_left;

        let mut i = 0;
        while i < self.n {
            if time_left > 0 {
                let fs = &self.steps[win_step];
                par.angle[i] = fs.pose.angle;
                par.fp_x[i] = fs.pose.x;
                par.fp_y[i] = fs.pose.y;
                par.zref_x[i] = fs.zmp_ref.0;
                par.zref_y[i] = fs.zmp_ref.1;

                // constraint rectangle in the support frame: the solver's
                // states are rotated but not translated, so the box is
                // centred on the rotated foot position
                let fx = fs.pose.cos() * fs.pose.x + fs.pose.sin() * fs.pose.y;
                let fy = -fs.pose.sin() * fs.pose.x + fs.pose.cos() * fs.pose.y;
                par.lb[2 * i] = fx - fs.bounds[2];
                par.ub[2 * i] = fx + fs.bounds[0];
                par.lb[2 * i + 1] = fy - fs.bounds[3];
                par.ub[2 * i + 1] = fy + fs.bounds[1];

                if self.t_ms[i] > time_left {
                    debug!(interval = i, step = win_step, "interval splits a step");
                    return PreviewStatus::Halt;
                }
                time_left -= self.t_ms[i];
                par.t[i] = f64::from(self.t_ms[i]) / 1000.0;
                i += 1;
            } else {
                win_step += 1;
                if win_step == self.steps.len() {
                    debug!(interval = i, "footstep list exhausted");
                    return PreviewStatus::Halt;
                }
                time_left = self.steps[win_step].time_left;
            }
        }

        while self.steps[self.current_step].time_left == 0 {
            self.current_step += 1;
        }
        self.first_preview_step = self.current_step;
        self.last_time_decrement = self.t_ms[0];
        self.steps[self.current_step].time_left -= self.t_ms[0];
        if self.steps[self.current_step].time_left == 0 {
            self.current_step += 1;
        }
        PreviewStatus::Ready
    }

    /// True exactly on the first tick of a fresh single support whose side
    /// differs from the preceding single support.
    pub fn is_support_switch_needed(&self) -> bool {
        let Some(cur) = self.steps.get(self.current_step) else {
            return false;
        };
        if !cur.is_single() || self.current_step == 0 {
            return false;
        }
        if cur.time_period != cur.time_left {
            return false; // not the first tick of this support
        }
        // the support the last window started in (or the single support
        // just before it, when the window started in double support)
        match (0..=self.first_preview_step).rev().find(|&i| self.steps[i].is_single()) {
            Some(prev) if prev != self.current_step => self.steps[prev].kind != cur.kind,
            _ => false,
        }
    }

    /// Move the upcoming single support to a sensed pose. Only the SS entry
    /// is adjusted; the transitional double supports before it keep their
    /// planned poses.
    pub fn change_next_ss_position(&mut self, posture: &Matrix4<f64>) {
        if let Some(next) = self.next_single(self.first_preview_step) {
            let old = self.steps[next].pose;
            self.steps[next].pose = Pose2::new(posture[(0, 3)], posture[(1, 3)], old.angle);
        }
    }

    /// World poses of both feet at `shift_ms` into the future, as 4x4
    /// homogeneous matrices `(left, right)`.
    ///
    /// During double support both feet rest on the adjacent single-support
    /// poses. During single support the stance foot rests on the step pose
    /// and the swing foot travels from the previous to the next support of
    /// its side. Requires the walk to start and end in single support;
    /// returns `None` outside the timeline.
    pub fn feet_positions(&self, shift_ms: u32) -> Option<(Matrix4<f64>, Matrix4<f64>)> {
        let mut support = self.first_preview_step;
        let mut step_time_left = self
            .steps
            .get(support)?
            .time_left
            .checked_add(self.last_time_decrement)?;
        let mut shift = shift_ms;

        while shift > step_time_left {
            shift -= step_time_left;
            support += 1;
            step_time_left = self.steps.get(support)?.time_left;
        }

        let fs = &self.steps[support];
        if fs.is_single() {
            let elapsed = (fs.time_period - step_time_left) + shift;
            let theta = f64::from(elapsed) / f64::from(fs.time_period);
            self.single_support_feet(support, theta)
        } else {
            self.double_support_feet(support)
        }
    }

    fn double_support_feet(&self, support: usize) -> Option<(Matrix4<f64>, Matrix4<f64>)> {
        let a = &self.steps[self.prev_single(support)?];
        let b = &self.steps[self.next_single(support)?];
        let (l, r) = if a.kind == StepKind::SingleLeft {
            (a, b)
        } else {
            (b, a)
        };
        Some((l.pose.homogeneous(0.0), r.pose.homogeneous(0.0)))
    }

    fn single_support_feet(
        &self,
        support: usize,
        theta: f64,
    ) -> Option<(Matrix4<f64>, Matrix4<f64>)> {
        let stance = &self.steps[support];
        let prev = &self.steps[self.prev_single(support)?];
        let next = &self.steps[self.next_single(support)?];
        let swing = self.swing_pose(&prev.pose, &next.pose, theta);
        match stance.kind {
            StepKind::SingleLeft => Some((stance.pose.homogeneous(0.0), swing)),
            StepKind::SingleRight => Some((swing, stance.pose.homogeneous(0.0))),
            StepKind::Double => None,
        }
    }

    /// Swing-foot pose at phase `theta` in [0, 1]: a quadratic Bezier in the
    /// ground plane whose control point is the midpoint of lift-off and
    /// landing, a parabolic height profile peaking at `step_height`, and a
    /// linearly interpolated yaw.
    fn swing_pose(&self, from: &Pose2, to: &Pose2, theta: f64) -> Matrix4<f64> {
        let t = theta.clamp(0.0, 1.0);
        let omt = 1.0 - t;
        let cx = (from.x + to.x) / 2.0;
        let cy = (from.y + to.y) / 2.0;
        let x = omt * omt * from.x + 2.0 * t * omt * cx + t * t * to.x;
        let y = omt * omt * from.y + 2.0 * t * omt * cy + t * t * to.y;
        let z = 4.0 * self.step_height * t * omt;
        let angle = from.angle + (to.angle - from.angle) * t;
        Isometry3::new(Vector3::new(x, y, z), Vector3::z() * angle).to_homogeneous()
    }

    /// Reference points and angles of all single-support steps.
    pub fn single_support_footsteps(&self) -> Vec<(f64, f64, f64)> {
        self.steps
            .iter()
            .filter(|fs| fs.is_single())
            .map(|fs| (fs.pose.x, fs.pose.y, fs.pose.angle))
            .collect()
    }

    fn prev_single(&self, from: usize) -> Option<usize> {
        (0..from).rev().find(|&i| self.steps[i].is_single())
    }

    fn next_single(&self, from: usize) -> Option<usize> {
        (from + 1..self.steps.len()).find(|&i| self.steps[i].is_single())
    }
}
