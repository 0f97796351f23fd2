//! The immutable parameter snapshot a run borrows.

use std::sync::Arc;

use crate::boundary::{Boundary2, Boundary3};
use crate::error::{ErrState, MemTracker};
use crate::prt::LogSink;
use crate::ray::BeamInfo;
use crate::reflect::ReflTable;
use crate::ssp::SspTable;
use crate::types::{DimMode, Real, RunMode, Vec3, deg2rad};

/// Source and receiver coordinate vectors.
///
/// Sources are the Cartesian product `sx × sy × sz` (2D runs keep single
/// zero entries in `sx`/`sy`); receivers are a depth × range grid, swept
/// over the bearing fan in 3D oceans.
#[derive(Clone, Debug)]
pub struct PosInfo {
    pub sx: Vec<Real>,
    pub sy: Vec<Real>,
    pub sz: Vec<Real>,
    /// Receiver depths (m).
    pub rz: Vec<Real>,
    /// Receiver ranges (m).
    pub rr: Vec<Real>,
}

impl PosInfo {
    #[inline]
    pub fn n_sources(&self) -> usize {
        self.sx.len() * self.sy.len() * self.sz.len()
    }

    /// Position of flat source index `isrc`.
    pub fn source(&self, isrc: usize) -> Vec3 {
        let nsz = self.sz.len();
        let nsy = self.sy.len();
        let isz = isrc % nsz;
        let isy = (isrc / nsz) % nsy;
        let isx = isrc / (nsz * nsy);
        Vec3::new(self.sx[isx], self.sy[isy], self.sz[isz])
    }
}

/// A fan of launch angles, stored in radians.
#[derive(Clone, Debug)]
pub struct AngleFan {
    pub angles: Vec<Real>,
    /// Fan spacing (radians); zero for single-angle fans.
    pub spacing: Real,
}

impl AngleFan {
    /// Evenly spaced fan over `[a1, a2]` degrees.
    pub fn from_degrees(n: usize, a1: Real, a2: Real) -> Self {
        if n <= 1 {
            return Self { angles: vec![deg2rad(a1)], spacing: 0.0 };
        }
        let step = (a2 - a1) / (n as Real - 1.0);
        let angles = (0..n).map(|i| deg2rad(a1 + step * i as Real)).collect();
        Self { angles, spacing: deg2rad(step).abs() }
    }

    pub fn single(deg: Real) -> Self {
        Self::from_degrees(1, deg, deg)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.angles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }
}

/// Top/bottom geometry for the selected ocean dimensionality.
#[derive(Clone, Debug)]
pub enum BdryPair {
    Line { top: Boundary2, bot: Boundary2 },
    Grid { top: Boundary3, bot: Boundary3 },
}

/// Everything `run` needs, built once by the loader. The tracer takes a
/// shared borrow for the duration of the run and keeps no other state, so
/// independent simulations can run concurrently in one process.
pub struct Params {
    pub file_root: String,
    pub title: String,
    pub freq: Real,
    pub dim: DimMode,
    pub run: RunMode,
    pub ssp: SspTable,
    pub bdry: BdryPair,
    pub refl_top: Option<ReflTable>,
    pub refl_bot: Option<ReflTable>,
    pub pos: PosInfo,
    /// Elevation fan.
    pub alpha: AngleFan,
    /// Bearing fan; a single zero entry in 2D.
    pub beta: AngleFan,
    pub beam: BeamInfo,
    /// Worker count override; host parallelism otherwise.
    pub num_threads: Option<usize>,
    /// Arrival-list cap per receiver.
    pub arr_cap: usize,
    /// Eigenray hit-store cap.
    pub eigen_memsize: usize,
    pub sink: Arc<dyn LogSink>,
    pub err: ErrState,
    pub mem: MemTracker,
}

impl Params {
    #[inline]
    pub fn n_jobs(&self) -> usize {
        self.pos.n_sources() * self.beta.len() * self.alpha.len()
    }

    /// Decompose a job index into `(isrc, ibeta, ialpha)`.
    #[inline]
    pub fn job_indices(&self, job: usize) -> (usize, usize, usize) {
        let nalpha = self.alpha.len();
        let nbeta = self.beta.len();
        let ialpha = job % nalpha;
        let ibeta = (job / nalpha) % nbeta;
        let isrc = job / (nalpha * nbeta);
        (isrc, ibeta, ialpha)
    }

    pub fn num_workers(&self) -> usize {
        self.num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }
}
