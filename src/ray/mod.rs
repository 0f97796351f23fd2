//! Ray state, stepping, and per-ray orchestration.

mod medium;
mod point;
mod runner;
mod step;
mod three;

pub use medium::{Direct2, Medium2, RadialSlice, Snap, radial_boundary};
pub use point::{RayPt2, RayPt3};
pub use runner::{BeamInfo, Recorder2, TraceEnv2, Truncated, trace_ray2};
pub use step::{Crossing, StepResult, step2};
pub use three::{Crossing3, Recorder3, TraceEnv3, step3, trace_ray3};
