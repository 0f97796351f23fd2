//! Error taxonomy and the shared per-run error state.
//!
//! Fatal input problems are refused at setup with [`SetupError`]. During a
//! parallel run, workers never unwind across the pool; they record what
//! happened in the lock-free [`ErrState`] owned by the `Params` instance and
//! drain. [`ErrState::check_report`] inspects the state after the join and
//! decides whether the run failed.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use thiserror::Error;

use crate::prt::LogSink;

/// Fatal problems detected while building a [`crate::Params`].
#[derive(Debug, Error)]
pub enum SetupError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed record in an input file
    #[error("{file}: {msg}")]
    Parse { file: String, msg: String },

    /// SSP depth vector not strictly increasing
    #[error("SSP depths must be strictly increasing (node {0})")]
    NonMonotoneDepth(usize),

    /// Fewer than two SSP nodes
    #[error("SSP needs at least two depth nodes, got {0}")]
    TooFewSspNodes(usize),

    /// Internal reflection is rejected input
    #[error("boundary condition 'P' (internal reflection) is not supported")]
    InternalReflection,

    /// Unrecognized boundary-condition tag
    #[error("unknown boundary condition '{0}'")]
    UnknownBoundaryCondition(char),

    /// Unrecognized SSP interpolation tag
    #[error("unknown SSP interpolation option '{0}'")]
    UnknownSspKind(char),

    /// Unrecognized run-type tag
    #[error("unknown run type '{0}'")]
    UnknownRunType(char),

    /// Only single-medium environments are handled
    #[error("NMedia = {0}; only a single medium is supported")]
    MultipleMedia(usize),

    /// Reflection-coefficient table not sorted by angle
    #[error("reflection-coefficient table must be sorted by angle (row {0})")]
    UnsortedReflTable(usize),

    /// Empty source / receiver / angle vector
    #[error("{0} must contain at least one entry")]
    EmptyVector(&'static str),

    /// Requested dimensionality does not match the environment file
    #[error("environment is {found}, run was requested as {requested}")]
    DimensionMismatch { found: String, requested: String },
}

/// Fatal problems raised by `run` itself.
#[derive(Debug, Error)]
pub enum RunError {
    /// The tracked allocator went over budget
    #[error("memory budget of {budget} bytes exceeded (wanted {wanted} more)")]
    OverBudget { budget: usize, wanted: usize },

    /// A worker observed a fatal condition; details went to the log sink
    #[error("run aborted: {0}")]
    Aborted(&'static str),

    /// Thread-pool construction failed
    #[error("worker pool: {0}")]
    Pool(String),
}

// Fatal error kinds.
const ERR_OOM: u32 = 1 << 0;
const ERR_SSP_ESCAPE: u32 = 1 << 1;
// One-shot warning flags.
const WARN_REFL_DOMAIN_TOP: u32 = 1 << 8;
const WARN_REFL_DOMAIN_BOT: u32 = 1 << 9;
const WARN_SSP_BOX: u32 = 1 << 10;
const WARN_EIGEN_OVERFLOW: u32 = 1 << 11;

/// Lock-free error/warning state shared by all workers of one run.
///
/// A small bitset of error kinds plus one-shot message flags and soft
/// counters. Local to a `Params` instance so concurrent simulations in one
/// process do not interfere.
#[derive(Debug, Default)]
pub struct ErrState {
    bits: AtomicU32,
    truncated_rays: AtomicUsize,
    dropped_eigen_hits: AtomicUsize,
    evicted_arrivals: AtomicUsize,
}

impl ErrState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything; called at the top of each `run`.
    pub fn reset(&self) {
        self.bits.store(0, Ordering::Relaxed);
        self.truncated_rays.store(0, Ordering::Relaxed);
        self.dropped_eigen_hits.store(0, Ordering::Relaxed);
        self.evicted_arrivals.store(0, Ordering::Relaxed);
    }

    fn raise(&self, bit: u32) -> bool {
        self.bits.fetch_or(bit, Ordering::Relaxed) & bit == 0
    }

    /// Record that an allocation went over budget. Workers poll
    /// [`ErrState::fatal`] at every job pick and drain once set.
    pub fn raise_oom(&self) {
        self.raise(ERR_OOM);
    }

    /// Record that a ray escaped the SSP definition box fatally (Quad
    /// profile outside its range matrix).
    pub fn raise_ssp_escape(&self) {
        self.raise(ERR_SSP_ESCAPE);
    }

    /// True once any fatal kind has been recorded.
    pub fn fatal(&self) -> bool {
        self.bits.load(Ordering::Relaxed) & (ERR_OOM | ERR_SSP_ESCAPE) != 0
    }

    /// Emit `msg` on the sink exactly once per run, keyed by the reflection
    /// table the query missed.
    pub fn warn_refl_domain(&self, is_top: bool, sink: &dyn LogSink, msg: &str) {
        let bit = if is_top { WARN_REFL_DOMAIN_TOP } else { WARN_REFL_DOMAIN_BOT };
        if self.raise(bit) {
            tracing::warn!(target: "beamtrace", "{msg}");
            sink.emit(msg);
        }
    }

    /// One-shot warning for a ray leaving the sound-speed box.
    pub fn warn_ssp_box(&self, sink: &dyn LogSink, msg: &str) {
        if self.raise(WARN_SSP_BOX) {
            tracing::warn!(target: "beamtrace", "{msg}");
            sink.emit(msg);
        }
    }

    /// Count a trajectory truncated by the step or memory cap.
    pub fn count_truncated_ray(&self) {
        self.truncated_rays.fetch_add(1, Ordering::Relaxed);
    }

    /// Count eigenray hits dropped because the hit store was full.
    pub fn count_dropped_eigen_hits(&self, n: usize) {
        self.raise(WARN_EIGEN_OVERFLOW);
        self.dropped_eigen_hits.fetch_add(n, Ordering::Relaxed);
    }

    /// Count arrivals evicted from a full per-receiver list.
    pub fn count_evicted_arrival(&self) {
        self.evicted_arrivals.fetch_add(1, Ordering::Relaxed);
    }

    /// Post-phase inspection: summarize soft warnings on the sink and turn
    /// fatal kinds into a [`RunError`].
    pub fn check_report(&self, sink: &dyn LogSink, budget: usize) -> Result<(), RunError> {
        let truncated = self.truncated_rays.load(Ordering::Relaxed);
        if truncated > 0 {
            sink.emit(&format!("{truncated} ray trajectories were truncated"));
        }
        let dropped = self.dropped_eigen_hits.load(Ordering::Relaxed);
        if dropped > 0 {
            sink.emit(&format!("{dropped} eigenray hits dropped (hit store full)"));
        }
        let evicted = self.evicted_arrivals.load(Ordering::Relaxed);
        if evicted > 0 {
            sink.emit(&format!("{evicted} low-amplitude arrivals evicted from full lists"));
        }

        let bits = self.bits.load(Ordering::Relaxed);
        if bits & ERR_OOM != 0 {
            sink.emit("run aborted: memory budget exceeded");
            return Err(RunError::OverBudget { budget, wanted: 0 });
        }
        if bits & ERR_SSP_ESCAPE != 0 {
            sink.emit("run aborted: ray outside the sound-speed definition box");
            return Err(RunError::Aborted("ray outside the sound-speed box"));
        }
        Ok(())
    }
}

/// Tracked allocator budget.
///
/// All output and trajectory allocations charge against `max_memory`;
/// going over is a structured error, not an abort.
#[derive(Debug)]
pub struct MemTracker {
    budget: usize,
    used: AtomicUsize,
}

impl MemTracker {
    pub fn new(budget: usize) -> Self {
        Self { budget, used: AtomicUsize::new(0) }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Try to reserve `bytes`. On failure nothing is charged.
    pub fn charge(&self, bytes: usize) -> Result<(), RunError> {
        let prev = self.used.fetch_add(bytes, Ordering::Relaxed);
        if prev + bytes > self.budget {
            self.used.fetch_sub(bytes, Ordering::Relaxed);
            return Err(RunError::OverBudget { budget: self.budget, wanted: bytes });
        }
        Ok(())
    }

    /// Return previously charged bytes.
    pub fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Drop all charges; used by `finalize`.
    pub fn reset(&self) {
        self.used.store(0, Ordering::Relaxed);
    }
}
