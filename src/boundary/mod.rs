//! Top and bottom boundary geometry and half-space properties.
//!
//! 2D boundaries are piecewise-linear polylines in `(r, z)`; 3D boundaries
//! are regular `x–y` grids of depths split into two triangles per cell. Both
//! precompute unit tangents and inward normals (into the water column) and
//! carry the acoustic half-space behind them. Curvature is stored per
//! segment in 2D and as the second-derivative moments `z_xx, z_xy, z_yy` per
//! grid node in 3D.

use crate::error::SetupError;
use crate::types::{Cpx, Real, Vec2, Vec3};

/// Which boundary a value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Top,
    Bottom,
}

/// Boundary-condition tag of a half-space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BcTag {
    Rigid,
    Vacuum,
    /// Tabulated reflection coefficient read from a file.
    File,
    /// Acousto-elastic half-space (shear if `cs > 0`).
    AcoustoElastic,
    /// GRAB-style half-space; treated like acousto-elastic.
    Grab,
}

impl BcTag {
    /// Parse the tag character. `'P'` (internal reflection) is rejected
    /// input, not a fallthrough.
    pub fn from_char(ch: char) -> Result<Self, SetupError> {
        match ch {
            'R' => Ok(BcTag::Rigid),
            'V' => Ok(BcTag::Vacuum),
            'F' => Ok(BcTag::File),
            'A' => Ok(BcTag::AcoustoElastic),
            'G' => Ok(BcTag::Grab),
            'P' => Err(SetupError::InternalReflection),
            other => Err(SetupError::UnknownBoundaryCondition(other)),
        }
    }
}

/// Acoustic properties of the medium behind a boundary.
#[derive(Clone, Copy, Debug)]
pub struct HalfSpace {
    /// Compressional speed; imaginary part is attenuation.
    pub cp: Cpx,
    /// Shear speed; zero real part disables shear.
    pub cs: Cpx,
    /// Density relative to water.
    pub rho: Real,
    pub bc: BcTag,
}

impl HalfSpace {
    /// Rigid wall.
    pub fn rigid() -> Self {
        Self { cp: Cpx::new(0.0, 0.0), cs: Cpx::new(0.0, 0.0), rho: 0.0, bc: BcTag::Rigid }
    }

    /// Pressure-release (vacuum) surface.
    pub fn vacuum() -> Self {
        Self { cp: Cpx::new(0.0, 0.0), cs: Cpx::new(0.0, 0.0), rho: 0.0, bc: BcTag::Vacuum }
    }
}

/// A piecewise-linear 2D boundary.
#[derive(Clone, Debug)]
pub struct Boundary2 {
    pub side: Side,
    /// Polyline nodes, strictly increasing in `r`.
    pub node: Vec<Vec2>,
    /// Per-segment unit tangent.
    pub tangent: Vec<Vec2>,
    /// Per-segment unit normal, pointing into the water.
    pub normal: Vec<Vec2>,
    /// Per-segment curvature (the slope rate of change along arc length).
    pub kappa: Vec<Real>,
    /// Half-space behind the whole boundary.
    pub hs: HalfSpace,
    /// Per-segment half-space overrides (long bathymetry format).
    pub hs_seg: Option<Vec<HalfSpace>>,
}

impl Boundary2 {
    /// A flat boundary at `depth` spanning `[-big, big]` in range.
    pub fn flat(side: Side, depth: Real, hs: HalfSpace) -> Self {
        const BIG: Real = 1.0e9;
        Self::from_nodes(side, vec![Vec2::new(-BIG, depth), Vec2::new(BIG, depth)], hs)
            .expect("two increasing nodes")
    }

    /// Build from polyline nodes; ranges must be strictly increasing.
    pub fn from_nodes(side: Side, node: Vec<Vec2>, hs: HalfSpace) -> Result<Self, SetupError> {
        if node.len() < 2 {
            return Err(SetupError::EmptyVector("boundary polyline"));
        }
        for i in 1..node.len() {
            if node[i].r <= node[i - 1].r {
                return Err(SetupError::NonMonotoneDepth(i));
            }
        }

        let nseg = node.len() - 1;
        let mut tangent = Vec::with_capacity(nseg);
        let mut normal = Vec::with_capacity(nseg);
        for i in 0..nseg {
            let t = (node[i + 1] - node[i]).normalized();
            tangent.push(t);
            // bottom normal points up (-z), top normal points down (+z)
            normal.push(match side {
                Side::Bottom => Vec2::new(t.z, -t.r),
                Side::Top => Vec2::new(-t.z, t.r),
            });
        }

        // curvature: rate of change of the segment slope angle, averaged
        // onto segments from the interior nodes
        let mut phi = Vec::with_capacity(nseg);
        for t in &tangent {
            phi.push(t.z.atan2(t.r));
        }
        let mut kappa_node = vec![0.0 as Real; node.len()];
        for i in 1..nseg {
            let ds = 0.5 * ((node[i + 1] - node[i]).norm() + (node[i] - node[i - 1]).norm());
            kappa_node[i] = (phi[i] - phi[i - 1]) / ds;
        }
        let kappa = (0..nseg)
            .map(|i| 0.5 * (kappa_node[i] + kappa_node[i + 1]))
            .collect();

        Ok(Self { side, node, tangent, normal, kappa, hs, hs_seg: None })
    }

    /// Attach per-segment half-space overrides.
    pub fn with_segment_halfspaces(mut self, hs_seg: Vec<HalfSpace>) -> Self {
        debug_assert_eq!(hs_seg.len(), self.node.len() - 1);
        self.hs_seg = Some(hs_seg);
        self
    }

    #[inline]
    pub fn n_seg(&self) -> usize {
        self.node.len() - 1
    }

    /// Half-space active on segment `iseg`.
    #[inline]
    pub fn halfspace(&self, iseg: usize) -> &HalfSpace {
        match &self.hs_seg {
            Some(list) => &list[iseg],
            None => &self.hs,
        }
    }

    /// Directional segment search in range, mirroring the SSP cursor rules.
    pub fn update_seg(&self, rq: Real, tr: Real, iseg: &mut usize) {
        let top = self.node.len() - 2;
        let mut i = (*iseg).min(top);
        if tr >= 0.0 {
            while rq < self.node[i].r && i > 0 {
                i -= 1;
            }
            while i < top && rq >= self.node[i + 1].r {
                i += 1;
            }
        } else {
            while i < top && rq > self.node[i + 1].r {
                i += 1;
            }
            while rq <= self.node[i].r && i > 0 {
                i -= 1;
            }
        }
        *iseg = i;
    }

    /// Depth of the boundary at range `rq` on segment `iseg`.
    #[inline]
    pub fn depth_at(&self, rq: Real, iseg: usize) -> Real {
        let a = self.node[iseg];
        let t = self.tangent[iseg];
        if t.r == 0.0 { a.z } else { a.z + (rq - a.r) * t.z / t.r }
    }

    /// Signed distance from `x` to the boundary plane of segment `iseg`,
    /// positive on the water side.
    #[inline]
    pub fn dist_inside(&self, x: Vec2, iseg: usize) -> Real {
        (x - self.node[iseg]).dot(self.normal[iseg])
    }
}

/// A 3D boundary: depths on a regular `x–y` grid, two triangles per cell.
#[derive(Clone, Debug)]
pub struct Boundary3 {
    pub side: Side,
    pub x: Vec<Real>,
    pub y: Vec<Real>,
    /// Depths, `z[iy * nx + ix]`.
    pub z: Vec<Real>,
    /// Curvature moments at grid nodes (same layout as `z`).
    pub z_xx: Vec<Real>,
    pub z_xy: Vec<Real>,
    pub z_yy: Vec<Real>,
    pub hs: HalfSpace,
}

impl Boundary3 {
    /// A flat boundary at `depth` over a huge extent.
    pub fn flat(side: Side, depth: Real, hs: HalfSpace) -> Self {
        const BIG: Real = 1.0e9;
        Self::from_grid(side, vec![-BIG, BIG], vec![-BIG, BIG], vec![depth; 4], hs)
            .expect("2x2 grid")
    }

    pub fn from_grid(
        side: Side,
        x: Vec<Real>,
        y: Vec<Real>,
        z: Vec<Real>,
        hs: HalfSpace,
    ) -> Result<Self, SetupError> {
        let (nx, ny) = (x.len(), y.len());
        if nx < 2 || ny < 2 {
            return Err(SetupError::EmptyVector("boundary grid axis"));
        }
        for i in 1..nx {
            if x[i] <= x[i - 1] {
                return Err(SetupError::NonMonotoneDepth(i));
            }
        }
        for j in 1..ny {
            if y[j] <= y[j - 1] {
                return Err(SetupError::NonMonotoneDepth(j));
            }
        }
        assert_eq!(z.len(), nx * ny);

        // centered second differences; one-sided rows/columns get zero
        let idx = |ix: usize, iy: usize| iy * nx + ix;
        let mut z_xx = vec![0.0 as Real; z.len()];
        let mut z_xy = vec![0.0 as Real; z.len()];
        let mut z_yy = vec![0.0 as Real; z.len()];
        for iy in 0..ny {
            for ix in 0..nx {
                if ix > 0 && ix < nx - 1 {
                    let dxm = x[ix] - x[ix - 1];
                    let dxp = x[ix + 1] - x[ix];
                    z_xx[idx(ix, iy)] = 2.0
                        * ((z[idx(ix + 1, iy)] - z[idx(ix, iy)]) / dxp
                            - (z[idx(ix, iy)] - z[idx(ix - 1, iy)]) / dxm)
                        / (dxm + dxp);
                }
                if iy > 0 && iy < ny - 1 {
                    let dym = y[iy] - y[iy - 1];
                    let dyp = y[iy + 1] - y[iy];
                    z_yy[idx(ix, iy)] = 2.0
                        * ((z[idx(ix, iy + 1)] - z[idx(ix, iy)]) / dyp
                            - (z[idx(ix, iy)] - z[idx(ix, iy - 1)]) / dym)
                        / (dym + dyp);
                }
                if ix > 0 && ix < nx - 1 && iy > 0 && iy < ny - 1 {
                    z_xy[idx(ix, iy)] = (z[idx(ix + 1, iy + 1)] - z[idx(ix - 1, iy + 1)]
                        - z[idx(ix + 1, iy - 1)]
                        + z[idx(ix - 1, iy - 1)])
                        / ((x[ix + 1] - x[ix - 1]) * (y[iy + 1] - y[iy - 1]));
                }
            }
        }

        Ok(Self { side, x, y, z, z_xx, z_xy, z_yy, hs })
    }

    #[inline]
    pub fn nx(&self) -> usize {
        self.x.len()
    }

    /// Directional cell search; the flattened cell index is
    /// `iy * (nx - 1) + ix`.
    pub fn update_cell(&self, p: Vec3, t: Vec3, cell: &mut usize) {
        let ncx = self.x.len() - 1;
        let ncy = self.y.len() - 1;
        let mut ix = (*cell % ncx).min(ncx - 1);
        let mut iy = (*cell / ncx).min(ncy - 1);
        axis_dir_seg(&self.x, p.x, t.x, &mut ix);
        axis_dir_seg(&self.y, p.y, t.y, &mut iy);
        *cell = iy * ncx + ix;
    }

    /// Boundary depth at `(x, y)` in the given cell (piecewise planar over
    /// the cell's two triangles).
    pub fn depth_at(&self, px: Real, py: Real, cell: usize) -> Real {
        let (ix, iy) = self.cell_xy(cell);
        let n = self.triangle_normal(px, py, cell);
        let p0 = self.corner(ix, iy);
        // plane through p0 with normal n: solve for z
        p0.z - (n.x * (px - p0.x) + n.y * (py - p0.y)) / n.z
    }

    /// Inward unit normal of the triangle under `(x, y)`.
    pub fn normal_at(&self, px: Real, py: Real, cell: usize) -> Vec3 {
        let n = self.triangle_normal(px, py, cell);
        let n = n.normalized();
        match self.side {
            // raw normal points towards -z; water is above the bottom
            Side::Bottom => {
                if n.z > 0.0 { -n } else { n }
            }
            Side::Top => {
                if n.z < 0.0 { -n } else { n }
            }
        }
    }

    /// Curvature moments `(z_xx, z_xy, z_yy)` bilinearly interpolated at
    /// `(x, y)`.
    pub fn curvature_at(&self, px: Real, py: Real, cell: usize) -> (Real, Real, Real) {
        let (ix, iy) = self.cell_xy(cell);
        let u = ((px - self.x[ix]) / (self.x[ix + 1] - self.x[ix])).clamp(0.0, 1.0);
        let v = ((py - self.y[iy]) / (self.y[iy + 1] - self.y[iy])).clamp(0.0, 1.0);
        let bilerp = |m: &[Real]| {
            let idx = |i: usize, j: usize| (iy + j) * self.x.len() + ix + i;
            (1.0 - u) * (1.0 - v) * m[idx(0, 0)]
                + u * (1.0 - v) * m[idx(1, 0)]
                + (1.0 - u) * v * m[idx(0, 1)]
                + u * v * m[idx(1, 1)]
        };
        (bilerp(&self.z_xx), bilerp(&self.z_xy), bilerp(&self.z_yy))
    }

    fn cell_xy(&self, cell: usize) -> (usize, usize) {
        let ncx = self.x.len() - 1;
        (cell % ncx, cell / ncx)
    }

    fn corner(&self, ix: usize, iy: usize) -> Vec3 {
        Vec3::new(self.x[ix], self.y[iy], self.z[iy * self.x.len() + ix])
    }

    /// Unnormalized normal of the triangle containing `(x, y)`; cells are
    /// split along the (00)–(11) diagonal.
    fn triangle_normal(&self, px: Real, py: Real, cell: usize) -> Vec3 {
        let (ix, iy) = self.cell_xy(cell);
        let p00 = self.corner(ix, iy);
        let p10 = self.corner(ix + 1, iy);
        let p01 = self.corner(ix, iy + 1);
        let p11 = self.corner(ix + 1, iy + 1);
        let u = (px - p00.x) / (p11.x - p00.x);
        let v = (py - p00.y) / (p11.y - p00.y);
        if u >= v {
            (p10 - p00).cross(p11 - p00)
        } else {
            (p11 - p00).cross(p01 - p00)
        }
    }
}

fn axis_dir_seg(axis: &[Real], q: Real, t: Real, iseg: &mut usize) {
    let top = axis.len() - 2;
    let mut i = (*iseg).min(top);
    if t >= 0.0 {
        while q < axis[i] && i > 0 {
            i -= 1;
        }
        while i < top && q >= axis[i + 1] {
            i += 1;
        }
    } else {
        while i < top && q > axis[i + 1] {
            i += 1;
        }
        while q <= axis[i] && i > 0 {
            i -= 1;
        }
    }
    *iseg = i;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bc_tag_parse() {
        assert_eq!(BcTag::from_char('R').unwrap(), BcTag::Rigid);
        assert_eq!(BcTag::from_char('V').unwrap(), BcTag::Vacuum);
        assert!(matches!(BcTag::from_char('P'), Err(SetupError::InternalReflection)));
        assert!(BcTag::from_char('X').is_err());
    }

    #[test]
    fn test_flat_bottom_normal_points_up() {
        let b = Boundary2::flat(Side::Bottom, 5000.0, HalfSpace::rigid());
        assert_eq!(b.normal[0], Vec2::new(0.0, -1.0));
        assert_eq!(b.kappa[0], 0.0);
    }

    #[test]
    fn test_flat_top_normal_points_down() {
        let t = Boundary2::flat(Side::Top, 0.0, HalfSpace::vacuum());
        assert_eq!(t.normal[0], Vec2::new(0.0, 1.0));
    }

    #[test]
    fn test_sloped_bottom_geometry() {
        let b = Boundary2::from_nodes(
            Side::Bottom,
            vec![Vec2::new(0.0, 100.0), Vec2::new(100.0, 200.0)],
            HalfSpace::rigid(),
        )
        .unwrap();
        let t = b.tangent[0];
        assert_relative_eq!(t.r, (0.5 as Real).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(t.z, (0.5 as Real).sqrt(), epsilon = 1e-12);
        // normal orthogonal to tangent, pointing up into the water
        assert_relative_eq!(b.normal[0].dot(t), 0.0, epsilon = 1e-12);
        assert!(b.normal[0].z < 0.0);
        assert_relative_eq!(b.depth_at(50.0, 0), 150.0, epsilon = 1e-9);
    }

    #[test]
    fn test_dist_inside_sign() {
        let b = Boundary2::flat(Side::Bottom, 100.0, HalfSpace::rigid());
        assert!(b.dist_inside(Vec2::new(0.0, 50.0), 0) > 0.0);
        assert!(b.dist_inside(Vec2::new(0.0, 150.0), 0) < 0.0);
    }

    #[test]
    fn test_update_seg_directional() {
        let b = Boundary2::from_nodes(
            Side::Bottom,
            vec![Vec2::new(0.0, 100.0), Vec2::new(10.0, 100.0), Vec2::new(20.0, 100.0)],
            HalfSpace::rigid(),
        )
        .unwrap();
        let mut iseg = 0;
        b.update_seg(10.0, 1.0, &mut iseg);
        assert_eq!(iseg, 1);
        b.update_seg(10.0, -1.0, &mut iseg);
        assert_eq!(iseg, 0);
    }

    #[test]
    fn test_grid_flat_depth_and_normal() {
        let b = Boundary3::flat(Side::Bottom, 4000.0, HalfSpace::rigid());
        let mut cell = 0;
        b.update_cell(Vec3::new(10.0, -5.0, 0.0), Vec3::new(1.0, 1.0, 0.0), &mut cell);
        assert_relative_eq!(b.depth_at(10.0, -5.0, cell), 4000.0, epsilon = 1e-6);
        let n = b.normal_at(10.0, -5.0, cell);
        assert_relative_eq!(n.z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_grid_curvature_of_parabola() {
        // z = 1000 + 0.001 x², so z_xx = 0.002 at interior nodes
        let xs: Vec<Real> = (0..5).map(|i| i as Real * 100.0).collect();
        let ys = vec![0.0, 100.0, 200.0];
        let mut z = Vec::new();
        for _y in &ys {
            for x in &xs {
                z.push(1000.0 + 0.001 * x * x);
            }
        }
        let b = Boundary3::from_grid(Side::Bottom, xs, ys, z, HalfSpace::rigid()).unwrap();
        let (zxx, zxy, _zyy) = b.curvature_at(200.0, 100.0, 1 * 4 + 1);
        assert_relative_eq!(zxx, 0.002, epsilon = 1e-9);
        assert_relative_eq!(zxy, 0.0, epsilon = 1e-12);
    }
}
