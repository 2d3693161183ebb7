//! Footstep entities: an SE(2) pose, a support type, a rectangular ZMP
//! constraint in the foot frame and the time the step still owns.

use nalgebra::{Isometry3, Matrix4, Vector3};

/// A planar pose with cached trigonometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2 {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    cos: f64,
    sin: f64,
}

impl Pose2 {
    pub fn new(x: f64, y: f64, angle: f64) -> Self {
        Self {
            x,
            y,
            angle,
            cos: angle.cos(),
            sin: angle.sin(),
        }
    }

    pub fn cos(&self) -> f64 {
        self.cos
    }

    pub fn sin(&self) -> f64 {
        self.sin
    }

    /// `self * Translation(dx, dy) * Rotation(dangle)`.
    pub fn compose(&self, dx: f64, dy: f64, dangle: f64) -> Self {
        Self::new(
            self.x + self.cos * dx - self.sin * dy,
            self.y + self.sin * dx + self.cos * dy,
            self.angle + dangle,
        )
    }

    /// Map a point from the foot frame to the world frame.
    pub fn transform(&self, px: f64, py: f64) -> (f64, f64) {
        (
            self.x + self.cos * px - self.sin * py,
            self.y + self.sin * px + self.cos * py,
        )
    }

    /// Homogeneous 4x4 pose at ground height `z`.
    pub fn homogeneous(&self, z: f64) -> Matrix4<f64> {
        Isometry3::new(Vector3::new(self.x, self.y, z), Vector3::z() * self.angle)
            .to_homogeneous()
    }
}

/// Which feet carry the robot during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    SingleLeft,
    SingleRight,
    Double,
}

/// One entry of the footstep timeline.
///
/// `bounds` is the ZMP rectangle in the foot frame, ordered toe, outer side,
/// heel, inner side. `time_left` is decremented as preview windows consume
/// the step.
#[derive(Debug, Clone)]
pub struct Footstep {
    pub pose: Pose2,
    pub kind: StepKind,
    /// World-frame ZMP reference point of the step.
    pub zmp_ref: (f64, f64),
    pub bounds: [f64; 4],
    /// Total time the step owns [ms].
    pub time_period: u32,
    /// Time not yet consumed by preview windows [ms].
    pub time_left: u32,
}

impl Footstep {
    pub fn new(pose: Pose2, kind: StepKind, zmp_ref: (f64, f64), bounds: [f64; 4], period: u32) -> Self {
        Self {
            pose,
            kind,
            zmp_ref,
            bounds,
            time_period: period,
            time_left: period,
        }
    }

    pub fn is_single(&self) -> bool {
        self.kind != StepKind::Double
    }
}
