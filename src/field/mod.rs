//! Output buffers and their accumulation rules.
//!
//! Workers never write into shared buffers directly: each job produces a
//! [`JobOut`] delta (a sparse field contribution, a trajectory, eigenray
//! hits, or arrivals), and the scheduler folds the deltas in job order after
//! the join. The fold order makes the result independent of how jobs landed
//! on workers, so a two-worker run reproduces the single-thread field
//! bit for bit.

mod influence;

pub use influence::{Gather, Influence2, Influence3, InfluenceCfg, Traj2, Traj3, WorkerScratch};

use crate::error::ErrState;
use crate::ray::{RayPt2, RayPt3};
use crate::types::{Cpx, Real};

/// One ray's contribution at a receiver.
#[derive(Clone, Copy, Debug)]
pub struct Arrival {
    pub amp: Real,
    pub phase: Real,
    /// Complex delay; imaginary part carries the accumulated attenuation.
    pub delay: Cpx,
    /// Launch angle at the source (radians).
    pub src_angle: Real,
    /// Arrival angle at the receiver (radians).
    pub rcv_angle: Real,
    pub num_top_bnc: u32,
    pub num_bot_bnc: u32,
}

/// Launch record of a ray that passed near a receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EigenHit {
    pub isrc: usize,
    pub ialpha: usize,
    pub ibeta: usize,
    /// Step count at the hit, used to size the retrace.
    pub nsteps: usize,
}

/// A stored trajectory (Ray and Eigen run modes).
#[derive(Clone, Debug)]
pub struct RayTraj {
    pub isrc: usize,
    pub ialpha: usize,
    pub ibeta: usize,
    /// Launch angles in radians.
    pub alpha: Real,
    pub beta: Real,
    pub points: TrajPoints,
}

#[derive(Clone, Debug)]
pub enum TrajPoints {
    Two(Vec<RayPt2>),
    Three(Vec<RayPt3>),
}

impl TrajPoints {
    pub fn len(&self) -> usize {
        match self {
            TrajPoints::Two(v) => v.len(),
            TrajPoints::Three(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Complex field on the receiver grid, one slice per `(source, bearing)`.
#[derive(Clone, Debug)]
pub struct UField {
    pub nsrc: usize,
    pub ntheta: usize,
    pub nrz: usize,
    pub nrr: usize,
    pub data: Vec<Cpx>,
}

impl UField {
    pub fn new(nsrc: usize, ntheta: usize, nrz: usize, nrr: usize) -> Self {
        Self { nsrc, ntheta, nrz, nrr, data: vec![Cpx::new(0.0, 0.0); nsrc * ntheta * nrz * nrr] }
    }

    #[inline]
    pub fn slice_len(&self) -> usize {
        self.nrz * self.nrr
    }

    #[inline]
    pub fn slice_base(&self, isrc: usize, itheta: usize) -> usize {
        (isrc * self.ntheta + itheta) * self.slice_len()
    }

    pub fn clear(&mut self) {
        self.data.fill(Cpx::new(0.0, 0.0));
    }
}

/// Per-job output delta, folded in job order by the scheduler.
#[derive(Clone, Debug)]
pub enum JobOut {
    /// Sparse field cells relative to the job's `(source, bearing)` slice.
    Tl(Vec<(u32, Cpx)>),
    Traj(RayTraj),
    /// Eigen hits plus arrival-style metadata is not needed; hits only.
    Eigen(Vec<EigenHit>),
    /// Arrivals keyed by receiver cell within the job's slice.
    Arr(Vec<(u32, Arrival)>),
    /// The ray produced nothing (left the box immediately, zero amplitude).
    Empty,
}

/// Bounded eigenray hit store.
#[derive(Clone, Debug, Default)]
pub struct EigenHits {
    pub hits: Vec<EigenHit>,
    /// Capacity derived from the memory budget.
    pub memsize: usize,
    /// Total hits seen, including dropped ones.
    pub neigen: usize,
}

impl EigenHits {
    pub fn push(&mut self, hit: EigenHit, err: &ErrState) {
        self.neigen += 1;
        if self.hits.len() < self.memsize {
            self.hits.push(hit);
        } else {
            err.count_dropped_eigen_hits(1);
        }
    }
}

/// Per-receiver arrival lists with a hard cap; the weakest entry is evicted
/// when a full list receives a stronger one.
#[derive(Clone, Debug)]
pub struct Arrivals {
    pub ntheta: usize,
    pub nrz: usize,
    pub nrr: usize,
    pub cap: usize,
    /// One list per `(source, bearing, depth, range)` receiver.
    pub lists: Vec<Vec<Arrival>>,
}

impl Arrivals {
    pub fn new(nsrc: usize, ntheta: usize, nrz: usize, nrr: usize, cap: usize) -> Self {
        Self { ntheta, nrz, nrr, cap, lists: vec![Vec::new(); nsrc * ntheta * nrz * nrr] }
    }

    #[inline]
    pub fn slice_base(&self, isrc: usize, itheta: usize) -> usize {
        (isrc * self.ntheta + itheta) * self.nrz * self.nrr
    }

    /// Append, evicting the smallest-amplitude entry when the list is full.
    pub fn push(&mut self, ircvr: usize, arr: Arrival, err: &ErrState) {
        let list = &mut self.lists[ircvr];
        if list.len() < self.cap {
            list.push(arr);
            return;
        }
        let (imin, amin) = list
            .iter()
            .enumerate()
            .map(|(i, a)| (i, a.amp))
            .fold((0, Real::INFINITY), |acc, v| if v.1 < acc.1 { v } else { acc });
        if arr.amp > amin {
            list[imin] = arr;
        }
        err.count_evicted_arrival();
    }

    pub fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }
}

/// Everything a run produces. Buffers are allocated by `setup`/first `run`,
/// reused across runs, and released by `finalize`.
#[derive(Debug, Default)]
pub struct Outputs {
    pub rays: Vec<RayTraj>,
    pub field: Option<UField>,
    pub eigen: Option<EigenHits>,
    pub arrivals: Option<Arrivals>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything, keeping the container reusable.
    pub fn clear(&mut self) {
        self.rays.clear();
        self.field = None;
        self.eigen = None;
        self.arrivals = None;
    }
}
