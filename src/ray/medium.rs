//! The 2D ray engine's view of the ocean.
//!
//! Plain 2D runs evaluate the profile directly. Nx2D runs sweep 2D fans
//! through a 3D ocean; [`RadialSlice`] maps the fan's `(r, z)` coordinates
//! onto the 3D profile along the launch bearing and projects gradients and
//! curvatures back into the fan plane. Both also tell the stepper where
//! their interior segmentation planes are, so a step never silently crosses
//! one.

use crate::boundary::{Boundary2, Boundary3, Side};
use crate::ssp::{SspError, SspEval2, SspKind, SspTable};
use crate::types::{Real, SegState, Vec2, Vec3};

/// Interior coordinate to pin exactly when a step lands on a segment plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Snap {
    None,
    /// Land on the depth plane `z`.
    Z(Real),
    /// Land on the range plane `r`.
    R(Real),
}

/// Ocean seen by the 2D engine.
pub trait Medium2: Sync {
    /// Sound speed and derivatives at `(r, z)`.
    fn eval(&self, x: Vec2, t: Vec2, seg: &mut SegState) -> Result<SspEval2, SspError>;

    /// Shrink `h` so the straight continuation `x + h * urayt` does not
    /// cross an interior SSP segment plane. Returns the new `h` and what to
    /// pin if this constraint is the binding one.
    fn reduce_interior(&self, x: Vec2, urayt: Vec2, seg: &SegState, h: Real) -> (Real, Snap);
}

/// Shrink `h` against one set of increasing axis planes.
fn reduce_axis(axis: &[Real], pos: Real, vel: Real, iseg: usize, h: Real) -> Option<(Real, Real)> {
    if vel == 0.0 {
        return None;
    }
    let plane = if vel > 0.0 { axis[iseg + 1] } else { axis[iseg] };
    let hc = (plane - pos) / vel;
    if hc > 0.0 && hc < h { Some((hc, plane)) } else { None }
}

/// Depth-only or range-dependent 2D profile, used as-is.
pub struct Direct2<'a> {
    pub ssp: &'a SspTable,
}

impl Medium2 for Direct2<'_> {
    fn eval(&self, x: Vec2, t: Vec2, seg: &mut SegState) -> Result<SspEval2, SspError> {
        self.ssp.eval2(x, t, seg)
    }

    fn reduce_interior(&self, x: Vec2, urayt: Vec2, seg: &SegState, mut h: Real) -> (Real, Snap) {
        let mut snap = Snap::None;
        if let Some((hc, plane)) = reduce_axis(&self.ssp.z, x.z, urayt.z, seg.z, h) {
            h = hc;
            snap = Snap::Z(plane);
        }
        if let Some(grid) = &self.ssp.quad {
            if let Some((hc, plane)) = reduce_axis(&grid.r, x.r, urayt.r, seg.r, h) {
                h = hc;
                snap = Snap::R(plane);
            }
        }
        (h, snap)
    }
}

/// A 2D fan plane cut through a 3D ocean at a fixed bearing.
pub struct RadialSlice<'a> {
    pub ssp: &'a SspTable,
    /// Source horizontal position `(x, y)`.
    pub origin: (Real, Real),
    /// `(cos β, sin β)` of the fan bearing.
    pub tradial: (Real, Real),
}

impl RadialSlice<'_> {
    #[inline]
    fn to_world(&self, x: Vec2) -> Vec3 {
        Vec3::new(
            self.origin.0 + x.r * self.tradial.0,
            self.origin.1 + x.r * self.tradial.1,
            x.z,
        )
    }

    #[inline]
    fn dir_world(&self, t: Vec2) -> Vec3 {
        Vec3::new(t.r * self.tradial.0, t.r * self.tradial.1, t.z)
    }
}

impl Medium2 for RadialSlice<'_> {
    fn eval(&self, x: Vec2, t: Vec2, seg: &mut SegState) -> Result<SspEval2, SspError> {
        let (cb, sb) = self.tradial;
        let e3 = self.ssp.eval3(self.to_world(x), self.dir_world(t), seg)?;
        Ok(SspEval2 {
            c: e3.c,
            gradc: Vec2::new(e3.gradc.x * cb + e3.gradc.y * sb, e3.gradc.z),
            crr: e3.cxx * cb * cb + 2.0 * e3.cxy * cb * sb + e3.cyy * sb * sb,
            crz: e3.cxz * cb + e3.cyz * sb,
            czz: e3.czz,
            rho: e3.rho,
        })
    }

    fn reduce_interior(&self, x: Vec2, urayt: Vec2, seg: &SegState, mut h: Real) -> (Real, Snap) {
        let mut snap = Snap::None;
        if let Some((hc, plane)) = reduce_axis(&self.ssp.z, x.z, urayt.z, seg.z, h) {
            h = hc;
            snap = Snap::Z(plane);
        }
        if self.ssp.kind == SspKind::Hexahedral {
            let hex = self.ssp.hex.as_ref().expect("hexahedral kind without grid");
            let p = self.to_world(x);
            let v = self.dir_world(urayt);
            if let Some((hc, _)) = reduce_axis(&hex.x, p.x, v.x, seg.x, h) {
                h = hc;
                snap = Snap::R(x.r + hc * urayt.r);
            }
            if let Some((hc, _)) = reduce_axis(&hex.y, p.y, v.y, seg.y, h) {
                h = hc;
                snap = Snap::R(x.r + hc * urayt.r);
            }
        }
        (h, snap)
    }
}

/// Cut the per-bearing top/bottom polylines out of the 3D boundary grids.
///
/// The polyline samples the grid where the radial crosses cell edges;
/// per-segment curvature is the `κ`-projection of the grid moments onto the
/// bearing, sign-flipped for the top boundary.
pub fn radial_boundary(
    bdry: &Boundary3,
    origin: (Real, Real),
    tradial: (Real, Real),
    r_max: Real,
) -> Boundary2 {
    let (cb, sb) = tradial;

    // radial parameters of every crossing with a grid line, plus the ends
    let mut rs: Vec<Real> = vec![0.0, r_max];
    let mut push_crossings = |axis: &[Real], p0: Real, v: Real| {
        if v.abs() > 1.0e-12 {
            for &a in axis {
                let r = (a - p0) / v;
                if r > 0.0 && r < r_max {
                    rs.push(r);
                }
            }
        }
    };
    push_crossings(&bdry.x, origin.0, cb);
    push_crossings(&bdry.y, origin.1, sb);
    rs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    rs.dedup_by(|a, b| (*a - *b).abs() < 1.0e-9);

    let mut cell = 0usize;
    let nodes: Vec<Vec2> = rs
        .iter()
        .map(|&r| {
            let px = origin.0 + r * cb;
            let py = origin.1 + r * sb;
            let p = Vec3::new(px, py, 0.0);
            bdry.update_cell(p, Vec3::new(cb, sb, 0.0), &mut cell);
            Vec2::new(r, bdry.depth_at(px, py, cell))
        })
        .collect();

    let mut out = Boundary2::from_nodes(bdry.side, nodes, bdry.hs)
        .expect("radial samples are increasing in r");

    // replace the polyline curvature with the projected grid moments
    let mut cell = 0usize;
    for i in 0..out.n_seg() {
        let rm = 0.5 * (out.node[i].r + out.node[i + 1].r);
        let px = origin.0 + rm * cb;
        let py = origin.1 + rm * sb;
        bdry.update_cell(Vec3::new(px, py, 0.0), Vec3::new(cb, sb, 0.0), &mut cell);
        let (kxx, kxy, kyy) = bdry.curvature_at(px, py, cell);
        let mut kappa = kxx * cb * cb + 2.0 * kxy * cb * sb + kyy * sb * sb;
        if bdry.side == Side::Top {
            kappa = -kappa;
        }
        out.kappa[i] = kappa;
    }
    out
}
