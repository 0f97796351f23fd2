//! # beamtrace
//!
//! Underwater-acoustic Gaussian-beam / ray-tracing propagation core.
//!
//! Given an ocean environment (a depth-, range-, or fully 3D-dependent
//! sound-speed profile, top and bottom boundaries with acoustic half-spaces,
//! sources, receivers, and a frequency), the tracer launches fans of rays,
//! reflects them from the boundaries, and reduces them into one of four
//! results: ray trajectories, a transmission-loss field, eigenray hits, or
//! per-receiver arrival lists.
//!
//! The crate is re-entrant: a [`Params`] snapshot owns all run state
//! (including its error flags and memory budget), so independent
//! simulations can run concurrently in one process.
//!
//! ```no_run
//! use beamtrace::{DimMode, Init, finalize, run, setup, writeout};
//!
//! let init = Init { dim: DimMode::TwoD, ..Init::default() };
//! let (params, mut outputs) = setup("examples_data/munk", None, &init)?;
//! run(&params, &mut outputs)?;
//! writeout(&params, &outputs)?;
//! finalize(&params, &mut outputs);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod boundary;
pub mod error;
pub mod field;
pub mod io;
pub mod params;
pub mod prt;
pub mod ray;
pub mod reflect;
pub mod sched;
pub mod ssp;
pub mod types;

use std::sync::Arc;

// Re-export the main types for convenience
pub use boundary::{BcTag, Boundary2, Boundary3, HalfSpace, Side};
pub use error::{ErrState, MemTracker, RunError, SetupError};
pub use field::{Arrival, Arrivals, EigenHit, EigenHits, Outputs, RayTraj, TrajPoints, UField};
pub use params::{AngleFan, BdryPair, Params, PosInfo};
pub use prt::{LogSink, NullSink, PrtFileSink, VecSink};
pub use ray::{BeamInfo, RayPt2, RayPt3};
pub use reflect::{CurvatureFlag, ReflCoef, ReflTable};
pub use ssp::{HexGrid, QuadGrid, SspError, SspEval2, SspEval3, SspKind, SspTable};
pub use types::{Coherence, Cpx, DimMode, Real, RunMode, SegState, Vec2, Vec3};

/// Host-level knobs fixed before `setup`.
#[derive(Clone, Debug)]
pub struct Init {
    pub dim: DimMode,
    /// Worker count override; host parallelism otherwise.
    pub num_threads: Option<usize>,
    /// Tracked-allocation budget in bytes.
    pub max_memory: usize,
}

impl Default for Init {
    fn default() -> Self {
        Self { dim: DimMode::TwoD, num_threads: None, max_memory: 4 << 30 }
    }
}

/// Build a [`Params`] snapshot from `<file_root>.env` and its neighbor
/// files. When no sink is given, messages go to `<file_root>.prt`.
pub fn setup(
    file_root: &str,
    sink: Option<Arc<dyn LogSink>>,
    init: &Init,
) -> Result<(Params, Outputs), SetupError> {
    let sink: Arc<dyn LogSink> = match sink {
        Some(s) => s,
        None => Arc::new(PrtFileSink::create(format!("{file_root}.prt"))?),
    };
    let params = io::load(file_root, init.dim, sink, init.num_threads, init.max_memory)?;
    Ok((params, Outputs::new()))
}

/// Execute the simulation. On failure the caller must `finalize` (and, for
/// setup-level problems, `setup` again) before retrying.
pub fn run(params: &Params, outputs: &mut Outputs) -> Result<(), RunError> {
    sched::run(params, outputs)
}

/// Serialize the results of the last `run` to the legacy `.ray`, `.shd`,
/// or `.arr` file next to the environment file.
pub fn writeout(params: &Params, outputs: &Outputs) -> std::io::Result<()> {
    io::writeout(params, outputs)
}

/// Release the output buffers and the tracked memory; `params` and
/// `outputs` stay reusable for another `run`.
pub fn finalize(params: &Params, outputs: &mut Outputs) {
    outputs.clear();
    params.mem.reset();
    params.err.reset();
}
