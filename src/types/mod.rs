//! Scalar aliases, small vectors, and the tags shared across the tracer.

mod real;
mod vec;

pub use real::{Cpx, MIN_POS, PI, Real, deg2rad, rad2deg};
pub use vec::{Vec2, Vec3};

/// Dimensionality of a run, fixed at setup.
///
/// * `TwoD` — 2D ocean, 2D rays.
/// * `Nx2D` — 3D ocean swept by 2D ray fans, one fan per bearing.
/// * `ThreeD` — 3D ocean, 3D rays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimMode {
    TwoD,
    Nx2D,
    ThreeD,
}

impl DimMode {
    /// Whether the ocean environment is three-dimensional.
    #[inline]
    pub fn ocean_3d(self) -> bool {
        !matches!(self, DimMode::TwoD)
    }

    /// Whether rays themselves are traced in three dimensions.
    #[inline]
    pub fn rays_3d(self) -> bool {
        matches!(self, DimMode::ThreeD)
    }
}

/// Coherence choice for transmission-loss accumulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coherence {
    Coherent,
    Semicoherent,
    Incoherent,
}

/// What the run produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Full ray trajectories.
    Ray,
    /// Launch indices of rays passing near a receiver; trajectories are
    /// filled in by a post-pass.
    Eigen,
    /// Complex field on the receiver grid.
    Tl(Coherence),
    /// Per-receiver arrival lists. `binary` selects the `.arr` flavor at
    /// writeout.
    Arrivals { binary: bool },
}

impl RunMode {
    /// Parse the leading run-type character of the environment file.
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            'R' => Some(RunMode::Ray),
            'E' => Some(RunMode::Eigen),
            'C' => Some(RunMode::Tl(Coherence::Coherent)),
            'S' => Some(RunMode::Tl(Coherence::Semicoherent)),
            'I' => Some(RunMode::Tl(Coherence::Incoherent)),
            'A' => Some(RunMode::Arrivals { binary: false }),
            'a' => Some(RunMode::Arrivals { binary: true }),
            _ => None,
        }
    }

    #[inline]
    pub fn stores_trajectory(self) -> bool {
        matches!(self, RunMode::Ray | RunMode::Eigen)
    }
}

/// Per-ray cursor into the segmented environment tables.
///
/// These indices are pure accelerators: they remember which SSP depth/range
/// segment and which boundary segment the ray was last in, so lookups move at
/// most a segment or two per step. They are owned by the ray worker and must
/// never be shared across rays.
#[derive(Clone, Copy, Debug, Default)]
pub struct SegState {
    /// SSP depth segment.
    pub z: usize,
    /// SSP range segment (Quad profiles).
    pub r: usize,
    /// SSP x segment (hexahedral profiles).
    pub x: usize,
    /// SSP y segment (hexahedral profiles).
    pub y: usize,
    /// Active top-boundary segment (2D) or cell (3D, flattened).
    pub top: usize,
    /// Active bottom-boundary segment or cell.
    pub bot: usize,
}
