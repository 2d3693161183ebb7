//! Walking pattern generation for a biped robot.
//!
//! The generator owns an append-only footstep timeline and, at every control
//! tick, materializes a preview window for the MPC solver: per-interval
//! support angles, footstep reference points, ZMP references and foot-local
//! ZMP bounds. It also tracks support switches and interpolates world-frame
//! foot poses (stance flat on the ground, swing along a Bezier arc).
//!
//! A typical tick:
//!
//! ```no_run
//! use pacer_wpg::{PreviewStatus, PreviewWindow, StepPlacement, WalkingPatternGenerator};
//!
//! let mut wpg = WalkingPatternGenerator::new(15, 100, 0.02);
//! wpg.add_footstep_timed(0.0, 0.05, 0.0, 4, 4, StepPlacement::Left);
//! wpg.add_footstep_timed(0.035, -0.1, 0.0, 4, 6, StepPlacement::Auto);
//! // ... more steps ...
//!
//! let mut window = PreviewWindow::new(15, 0.26);
//! match wpg.form_preview_window(&mut window) {
//!     PreviewStatus::Ready => { /* hand the window to the solver */ }
//!     PreviewStatus::Halt => { /* wait for more footsteps */ }
//! }
//! ```

mod config;
mod dump;
mod footstep;
mod generator;
mod window;

pub use config::{ConfigError, WpgConfig};
pub use footstep::{Footstep, Pose2, StepKind};
pub use generator::{
    PreviewStatus, StepPlacement, WalkingPatternGenerator, DEFAULT_DS_BOUNDS, DEFAULT_SS_BOUNDS,
};
pub use window::{PreviewWindow, GRAVITY};
