//! Sound-speed profile evaluation.
//!
//! A [`SspTable`] holds the depth nodes plus whatever the selected
//! interpolation kind needs (per-segment gradients, cubic coefficients, a
//! range-dependent matrix, or a 3D grid). Evaluation returns the complex
//! speed, its gradient, the second derivatives the paraxial equations need,
//! and the density.
//!
//! Segment lookup is directional: a ray sitting exactly on a node is placed
//! in the segment it is entering, decided by the sign of the relevant tangent
//! component. The step-reduction logic depends on this tie-break.

mod interp;

use thiserror::Error;

pub use interp::{eval_cubic, pchip_coefficients, spline_coefficients};

use crate::error::SetupError;
use crate::types::{Cpx, Real, SegState, Vec2, Vec3};

/// Interpolation kind discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SspKind {
    /// Linear in 1/c².
    NLinear,
    /// Linear in c.
    CLinear,
    /// Monotone piecewise-cubic Hermite.
    Pchip,
    /// Natural cubic spline.
    Spline,
    /// Bilinear in (r, z); 2D range-dependent.
    Quad,
    /// Trilinear on a regular (x, y, z) grid; 3D.
    Hexahedral,
    /// Closed-form Munk-like profile, for validation runs.
    Analytic,
}

impl SspKind {
    pub fn from_char(ch: char) -> Result<Self, SetupError> {
        match ch {
            'N' => Ok(SspKind::NLinear),
            'C' => Ok(SspKind::CLinear),
            'P' => Ok(SspKind::Pchip),
            'S' => Ok(SspKind::Spline),
            'Q' => Ok(SspKind::Quad),
            'H' => Ok(SspKind::Hexahedral),
            'A' => Ok(SspKind::Analytic),
            other => Err(SetupError::UnknownSspKind(other)),
        }
    }
}

/// Evaluation failures; all are raised mid-trace and terminate the ray.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SspError {
    #[error("ray at range {0} m is outside the sound-speed range box")]
    OutsideRangeBox(Real),

    #[error("segment cursor escaped the profile (iz {z}, ir {r})")]
    SegmentEscape { z: usize, r: usize },

    #[error("analytic profile has no homogeneous half-space (depth {0} m)")]
    AnalyticHalfspace(Real),
}

/// Result of a 2D evaluation at `(r, z)`.
#[derive(Clone, Copy, Debug)]
pub struct SspEval2 {
    pub c: Cpx,
    pub gradc: Vec2,
    pub crr: Real,
    pub crz: Real,
    pub czz: Real,
    pub rho: Real,
}

/// Result of a 3D evaluation at `(x, y, z)`.
#[derive(Clone, Copy, Debug)]
pub struct SspEval3 {
    pub c: Cpx,
    pub gradc: Vec3,
    pub cxx: Real,
    pub cxy: Real,
    pub cxz: Real,
    pub cyy: Real,
    pub cyz: Real,
    pub czz: Real,
    pub rho: Real,
}

/// Range-dependent sound-speed matrix for the `Quad` kind.
///
/// `c[iz * nr + ir]` is the real speed at depth node `iz`, range node `ir`;
/// attenuation comes from the 1D profile. `cz` holds the per-depth-segment
/// vertical gradient of each column.
#[derive(Clone, Debug)]
pub struct QuadGrid {
    pub r: Vec<Real>,
    pub c: Vec<Real>,
    pub cz: Vec<Real>,
    pub nr: usize,
    pub nz: usize,
}

impl QuadGrid {
    pub fn new(r: Vec<Real>, c: Vec<Real>, z: &[Real]) -> Result<Self, SetupError> {
        let nr = r.len();
        let nz = z.len();
        if nr < 2 {
            return Err(SetupError::EmptyVector("SSP range vector"));
        }
        for i in 1..nr {
            if r[i] <= r[i - 1] {
                return Err(SetupError::NonMonotoneDepth(i));
            }
        }
        assert_eq!(c.len(), nr * nz);
        let mut cz = vec![0.0 as Real; (nz - 1) * nr];
        for iz in 0..nz - 1 {
            let dz = z[iz + 1] - z[iz];
            for ir in 0..nr {
                cz[iz * nr + ir] = (c[(iz + 1) * nr + ir] - c[iz * nr + ir]) / dz;
            }
        }
        Ok(Self { r, c, cz, nr, nz })
    }
}

/// Regular 3D sound-speed grid for the `Hexahedral` kind;
/// `c[(iz * ny + iy) * nx + ix]`.
#[derive(Clone, Debug)]
pub struct HexGrid {
    pub x: Vec<Real>,
    pub y: Vec<Real>,
    pub c: Vec<Real>,
    pub nx: usize,
    pub ny: usize,
}

impl HexGrid {
    pub fn new(x: Vec<Real>, y: Vec<Real>, c: Vec<Real>, nz: usize) -> Result<Self, SetupError> {
        let (nx, ny) = (x.len(), y.len());
        if nx < 2 || ny < 2 {
            return Err(SetupError::EmptyVector("SSP grid axis"));
        }
        assert_eq!(c.len(), nx * ny * nz);
        Ok(Self { x, y, c, nx, ny })
    }
}

const MUNK_C0: Real = 1500.0;
const MUNK_Z0: Real = 1300.0;
const MUNK_EPS: Real = 0.00737;
/// The analytic profile is only defined above this depth; below it the
/// original sources never set the attenuation, so the branch is rejected.
const MUNK_ZMAX: Real = 5000.0;

/// A sound-speed profile table.
#[derive(Clone, Debug)]
pub struct SspTable {
    pub kind: SspKind,
    /// Depth nodes, strictly increasing.
    pub z: Vec<Real>,
    /// Complex speed at nodes.
    pub c: Vec<Cpx>,
    /// Density at nodes.
    pub rho: Vec<Real>,
    /// Per-segment speed gradient (C-linear).
    cz: Vec<Cpx>,
    /// 1/c² at nodes (N-linear).
    n2: Vec<Cpx>,
    /// Per-segment gradient of 1/c² (N-linear).
    n2z: Vec<Cpx>,
    /// Per-segment cubic (PCHIP or spline, depending on `kind`).
    cubic: Vec<[Cpx; 4]>,
    pub quad: Option<QuadGrid>,
    pub hex: Option<HexGrid>,
}

impl SspTable {
    /// Build a depth-only profile of the given kind.
    pub fn new(kind: SspKind, z: Vec<Real>, c: Vec<Cpx>, rho: Vec<Real>) -> Result<Self, SetupError> {
        if z.len() < 2 {
            return Err(SetupError::TooFewSspNodes(z.len()));
        }
        assert_eq!(z.len(), c.len());
        assert_eq!(z.len(), rho.len());
        for i in 1..z.len() {
            if z[i] <= z[i - 1] {
                return Err(SetupError::NonMonotoneDepth(i));
            }
        }

        let n = z.len();
        let cz = (0..n - 1)
            .map(|i| (c[i + 1] - c[i]) / (z[i + 1] - z[i]))
            .collect();
        let n2: Vec<Cpx> = c.iter().map(|&ci| 1.0 / (ci * ci)).collect();
        let n2z = (0..n - 1)
            .map(|i| (n2[i + 1] - n2[i]) / (z[i + 1] - z[i]))
            .collect();
        let cubic = match kind {
            SspKind::Pchip => pchip_coefficients(&z, &c),
            SspKind::Spline => spline_coefficients(&z, &c),
            _ => Vec::new(),
        };

        Ok(Self { kind, z, c, rho, cz, n2, n2z, cubic, quad: None, hex: None })
    }

    /// Attach the 2D range-dependent matrix (kind becomes `Quad`).
    pub fn with_quad(mut self, grid: QuadGrid) -> Self {
        self.kind = SspKind::Quad;
        self.quad = Some(grid);
        self
    }

    /// Attach the 3D grid (kind becomes `Hexahedral`).
    pub fn with_hex(mut self, grid: HexGrid) -> Self {
        self.kind = SspKind::Hexahedral;
        self.hex = Some(grid);
        self
    }

    /// Number of depth segments.
    #[inline]
    pub fn n_seg(&self) -> usize {
        self.z.len() - 1
    }

    /// Directional depth-segment search. With a downward tangent the segment
    /// satisfies `z[i] <= zq < z[i+1]`; upward-going rays get the half-open
    /// interval on the other side, so a ray on a node lands in the segment it
    /// is entering.
    pub fn update_depth_seg(&self, zq: Real, tz: Real, iseg: &mut usize) {
        let top = self.z.len() - 2;
        let mut i = (*iseg).min(top);
        if tz >= 0.0 {
            while zq < self.z[i] && i > 0 {
                i -= 1;
            }
            while i < top && zq >= self.z[i + 1] {
                i += 1;
            }
        } else {
            while i < top && zq > self.z[i + 1] {
                i += 1;
            }
            while zq <= self.z[i] && i > 0 {
                i -= 1;
            }
        }
        *iseg = i;
    }

    /// Directional range-segment search for the Quad matrix.
    fn update_range_seg(grid: &QuadGrid, rq: Real, tr: Real, iseg: &mut usize) {
        let top = grid.nr - 2;
        let mut i = (*iseg).min(top);
        if tr >= 0.0 {
            while rq < grid.r[i] && i > 0 {
                i -= 1;
            }
            while i < top && rq >= grid.r[i + 1] {
                i += 1;
            }
        } else {
            while i < top && rq > grid.r[i + 1] {
                i += 1;
            }
            while rq <= grid.r[i] && i > 0 {
                i -= 1;
            }
        }
        *iseg = i;
    }

    fn axis_seg(axis: &[Real], q: Real, t: Real, iseg: &mut usize) {
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

    /// Density is linear in depth regardless of the interpolation kind.
    fn density(&self, zq: Real, iseg: usize) -> (Real, Real) {
        let w = (zq - self.z[iseg]) / (self.z[iseg + 1] - self.z[iseg]);
        let rho = (1.0 - w) * self.rho[iseg] + w * self.rho[iseg + 1];
        (w, rho)
    }

    /// Evaluate at a 2D position with tangent `t` (for the segment
    /// tie-break); `seg` is the per-ray cursor.
    pub fn eval2(&self, x: Vec2, t: Vec2, seg: &mut SegState) -> Result<SspEval2, SspError> {
        match self.kind {
            SspKind::NLinear => Ok(self.eval_n_linear(x, t, seg)),
            SspKind::CLinear => Ok(self.eval_c_linear(x, t, seg)),
            SspKind::Pchip | SspKind::Spline => Ok(self.eval_cubic_kind(x, t, seg)),
            SspKind::Quad => self.eval_quad(x, t, seg),
            SspKind::Analytic => analytic_profile(x.z),
            // 1D view of the 3D grid: hold (x, y) at the grid origin
            SspKind::Hexahedral => {
                let hex = self.hex.as_ref().expect("hexahedral kind without grid");
                let e3 = self.eval3(Vec3::new(hex.x[0], hex.y[0], x.z), Vec3::new(t.r, 0.0, t.z), seg)?;
                Ok(SspEval2 {
                    c: e3.c,
                    gradc: Vec2::new(0.0, e3.gradc.z),
                    crr: 0.0,
                    crz: 0.0,
                    czz: e3.czz,
                    rho: e3.rho,
                })
            }
        }
    }

    /// Speed only; used at ray launch and by the influence stage.
    pub fn eval2_c_only(&self, x: Vec2, t: Vec2, seg: &mut SegState) -> Result<Cpx, SspError> {
        Ok(self.eval2(x, t, seg)?.c)
    }

    fn eval_n_linear(&self, x: Vec2, t: Vec2, seg: &mut SegState) -> SspEval2 {
        self.update_depth_seg(x.z, t.z, &mut seg.z);
        let i = seg.z;
        let (w, rho) = self.density(x.z, i);
        let c = 1.0 / ((1.0 - w) * self.n2[i] + w * self.n2[i + 1]).sqrt();
        let cr = c.re;
        let gz = -0.5 * cr * cr * cr * self.n2z[i].re;
        SspEval2 {
            c,
            gradc: Vec2::new(0.0, gz),
            crr: 0.0,
            crz: 0.0,
            czz: 3.0 * gz * gz / cr,
            rho,
        }
    }

    fn eval_c_linear(&self, x: Vec2, t: Vec2, seg: &mut SegState) -> SspEval2 {
        self.update_depth_seg(x.z, t.z, &mut seg.z);
        let i = seg.z;
        let (_, rho) = self.density(x.z, i);
        let c = self.c[i] + (x.z - self.z[i]) * self.cz[i];
        SspEval2 {
            c,
            gradc: Vec2::new(0.0, self.cz[i].re),
            crr: 0.0,
            crz: 0.0,
            czz: 0.0,
            rho,
        }
    }

    fn eval_cubic_kind(&self, x: Vec2, t: Vec2, seg: &mut SegState) -> SspEval2 {
        self.update_depth_seg(x.z, t.z, &mut seg.z);
        let i = seg.z;
        let (_, rho) = self.density(x.z, i);
        let (c, d1, d2) = eval_cubic(&self.cubic[i], x.z - self.z[i]);
        SspEval2 {
            c,
            gradc: Vec2::new(0.0, d1.re),
            crr: 0.0,
            crz: 0.0,
            czz: d2.re,
            rho,
        }
    }

    fn eval_quad(&self, x: Vec2, t: Vec2, seg: &mut SegState) -> Result<SspEval2, SspError> {
        let grid = self.quad.as_ref().expect("quad kind without matrix");
        self.update_depth_seg(x.z, t.z, &mut seg.z);
        Self::update_range_seg(grid, x.r, t.r, &mut seg.r);
        let (iz, ir) = (seg.z, seg.r);
        let (_, rho) = self.density(x.z, iz);
        if iz >= grid.nz - 1 || ir >= grid.nr - 1 {
            return Err(SspError::SegmentEscape { z: iz, r: ir });
        }

        let nr = grid.nr;
        let cz1 = grid.cz[iz * nr + ir];
        let cz2 = grid.cz[iz * nr + ir + 1];

        let s2 = x.z - self.z[iz];
        let delta_z = self.z[iz + 1] - self.z[iz];
        let c1 = grid.c[iz * nr + ir] + s2 * cz1;
        let c2 = grid.c[iz * nr + ir + 1] + s2 * cz2;

        let delta_r = grid.r[ir + 1] - grid.r[ir];
        // piecewise-constant extrapolation outside the range box; only a
        // depth-index escape is an error
        let s1 = ((x.r - grid.r[ir]) / delta_r).clamp(0.0, 1.0);

        let c = (1.0 - s1) * c1 + s1 * c2;

        // volume attenuation is taken from the single c(z) profile
        let s2n = s2 / delta_z;
        let cimag = ((1.0 - s2n) * self.c[iz] + s2n * self.c[iz + 1]).im;

        let cz = (1.0 - s1) * cz1 + s1 * cz2;
        let cr = (c2 - c1) / delta_r;
        let crz = (cz2 - cz1) / delta_r;

        Ok(SspEval2 {
            c: Cpx::new(c, cimag),
            gradc: Vec2::new(cr, cz),
            crr: 0.0,
            crz,
            czz: 0.0,
            rho,
        })
    }

    /// Evaluate at a 3D position. Depth-only kinds return a vertical
    /// gradient; `Hexahedral` interpolates trilinearly on its grid.
    pub fn eval3(&self, x: Vec3, t: Vec3, seg: &mut SegState) -> Result<SspEval3, SspError> {
        match self.kind {
            SspKind::Hexahedral => self.eval_hex(x, t, seg),
            _ => {
                let e2 = self.eval2(Vec2::new(0.0, x.z), Vec2::new(t.xy().norm(), t.z), seg)?;
                Ok(SspEval3 {
                    c: e2.c,
                    gradc: Vec3::new(0.0, 0.0, e2.gradc.z),
                    cxx: 0.0,
                    cxy: 0.0,
                    cxz: 0.0,
                    cyy: 0.0,
                    cyz: 0.0,
                    czz: e2.czz,
                    rho: e2.rho,
                })
            }
        }
    }

    fn eval_hex(&self, x: Vec3, t: Vec3, seg: &mut SegState) -> Result<SspEval3, SspError> {
        let hex = self.hex.as_ref().expect("hexahedral kind without grid");
        if x.x < hex.x[0] || x.x > hex.x[hex.nx - 1] || x.y < hex.y[0] || x.y > hex.y[hex.ny - 1] {
            return Err(SspError::OutsideRangeBox(x.xy().norm()));
        }

        Self::axis_seg(&hex.x, x.x, t.x, &mut seg.x);
        Self::axis_seg(&hex.y, x.y, t.y, &mut seg.y);
        self.update_depth_seg(x.z, t.z, &mut seg.z);
        let (ix, iy, iz) = (seg.x, seg.y, seg.z);
        let (_, rho) = self.density(x.z, iz);

        let dx = hex.x[ix + 1] - hex.x[ix];
        let dy = hex.y[iy + 1] - hex.y[iy];
        let dz = self.z[iz + 1] - self.z[iz];
        let u = ((x.x - hex.x[ix]) / dx).clamp(0.0, 1.0);
        let v = ((x.y - hex.y[iy]) / dy).clamp(0.0, 1.0);
        let w = ((x.z - self.z[iz]) / dz).clamp(0.0, 1.0);

        let at = |i: usize, j: usize, k: usize| hex.c[((iz + k) * hex.ny + iy + j) * hex.nx + ix + i];
        let c000 = at(0, 0, 0);
        let c100 = at(1, 0, 0);
        let c010 = at(0, 1, 0);
        let c110 = at(1, 1, 0);
        let c001 = at(0, 0, 1);
        let c101 = at(1, 0, 1);
        let c011 = at(0, 1, 1);
        let c111 = at(1, 1, 1);

        // trilinear form c(u,v,w) and its exact derivatives
        let lerp = |a: Real, b: Real, s: Real| a + s * (b - a);
        let c00 = lerp(c000, c100, u);
        let c10 = lerp(c010, c110, u);
        let c01 = lerp(c001, c101, u);
        let c11 = lerp(c011, c111, u);
        let c0 = lerp(c00, c10, v);
        let c1 = lerp(c01, c11, v);
        let c = lerp(c0, c1, w);

        let du = |s0: Real, s1: Real| s1 - s0;
        let cu = lerp(lerp(du(c000, c100), du(c010, c110), v), lerp(du(c001, c101), du(c011, c111), v), w) / dx;
        let cv = lerp(lerp(du(c000, c010), du(c100, c110), u), lerp(du(c001, c011), du(c101, c111), u), w) / dy;
        let cw = (c1 - c0) / dz;

        let cuv = lerp(c110 - c100 - c010 + c000, c111 - c101 - c011 + c001, w) / (dx * dy);
        let cuw = lerp(
            (c101 - c001) - (c100 - c000),
            (c111 - c011) - (c110 - c010),
            v,
        ) / (dx * dz);
        let cvw = lerp(
            (c011 - c001) - (c010 - c000),
            (c111 - c101) - (c110 - c100),
            u,
        ) / (dy * dz);

        // attenuation from the 1D profile at this depth
        let cimag = ((1.0 - w) * self.c[iz] + w * self.c[iz + 1]).im;

        Ok(SspEval3 {
            c: Cpx::new(c, cimag),
            gradc: Vec3::new(cu, cv, cw),
            cxx: 0.0,
            cxy: cuv,
            cxz: cuw,
            cyy: 0.0,
            cyz: cvw,
            czz: 0.0,
            rho,
        })
    }
}

/// Exponentially varying Munk-like profile used only for validation.
///
/// The homogeneous half-space below 5000 m never sets the attenuation in any
/// published table of this profile, so queries there are rejected instead of
/// silently returning a broken complex speed.
fn analytic_profile(zq: Real) -> Result<SspEval2, SspError> {
    if zq > MUNK_ZMAX {
        return Err(SspError::AnalyticHalfspace(zq));
    }
    let xt = 2.0 * (zq - MUNK_Z0) / MUNK_Z0;
    let emxt = (-xt).exp();
    let dxt_dz = 2.0 / MUNK_Z0;
    let c = MUNK_C0 * (1.0 + MUNK_EPS * (xt - 1.0 + emxt));
    let cz = MUNK_C0 * MUNK_EPS * (1.0 - emxt) * dxt_dz;
    let czz = MUNK_C0 * MUNK_EPS * emxt * dxt_dz * dxt_dz;
    Ok(SspEval2 {
        c: Cpx::new(c, 0.0),
        gradc: Vec2::new(0.0, cz),
        crr: 0.0,
        crz: 0.0,
        czz,
        rho: 1.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn re(v: Real) -> Cpx {
        Cpx::new(v, 0.0)
    }

    fn table(kind: SspKind) -> SspTable {
        SspTable::new(
            kind,
            vec![0.0, 200.0, 500.0, 1000.0],
            vec![re(1500.0), re(1490.0), re(1497.0), re(1520.0)],
            vec![1.0, 1.0, 1.03, 1.05],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_non_monotone_depths() {
        let err = SspTable::new(
            SspKind::CLinear,
            vec![0.0, 100.0, 100.0],
            vec![re(1500.0); 3],
            vec![1.0; 3],
        );
        assert!(matches!(err, Err(SetupError::NonMonotoneDepth(2))));
    }

    #[test]
    fn test_c_linear_constant_gradient() {
        let ssp = table(SspKind::CLinear);
        let mut seg = SegState::default();
        let e = ssp.eval2(Vec2::new(0.0, 100.0), Vec2::new(1.0, 0.1), &mut seg).unwrap();
        assert_relative_eq!(e.c.re, 1495.0, epsilon = 1e-9);
        assert_relative_eq!(e.gradc.z, -0.05, epsilon = 1e-12);
        assert_eq!(e.czz, 0.0);
    }

    #[test]
    fn test_n_linear_derivative_identities() {
        let ssp = table(SspKind::NLinear);
        let mut seg = SegState::default();
        let e = ssp.eval2(Vec2::new(0.0, 350.0), Vec2::new(1.0, 0.1), &mut seg).unwrap();
        // czz = 3 cz² / c for the 1/c² rule
        assert_relative_eq!(e.czz, 3.0 * e.gradc.z * e.gradc.z / e.c.re, epsilon = 1e-10);
        // finite-difference check of the gradient
        let mut s2 = SegState::default();
        let ep = ssp.eval2(Vec2::new(0.0, 350.5), Vec2::new(1.0, 0.1), &mut s2).unwrap();
        let em = ssp.eval2(Vec2::new(0.0, 349.5), Vec2::new(1.0, 0.1), &mut s2).unwrap();
        assert_relative_eq!(e.gradc.z, (ep.c.re - em.c.re) / 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_pchip_c1_across_nodes() {
        let ssp = table(SspKind::Pchip);
        let mut seg = SegState::default();
        // approach node z=500 from below and above; same gradient
        let below = ssp.eval2(Vec2::new(0.0, 500.0), Vec2::new(1.0, -0.1), &mut seg).unwrap();
        let above = ssp.eval2(Vec2::new(0.0, 500.0), Vec2::new(1.0, 0.1), &mut seg).unwrap();
        assert_relative_eq!(below.c.re, above.c.re, epsilon = 1e-9);
        assert_relative_eq!(below.gradc.z, above.gradc.z, epsilon = 1e-9);
    }

    #[test]
    fn test_directional_tie_break_on_node() {
        let ssp = table(SspKind::CLinear);
        let mut iseg = 0usize;
        // downward ray on node 200 → entering segment 1
        ssp.update_depth_seg(200.0, 1.0, &mut iseg);
        assert_eq!(iseg, 1);
        // upward ray on node 200 → still leaving segment 1, entering 0
        ssp.update_depth_seg(200.0, -1.0, &mut iseg);
        assert_eq!(iseg, 0);
    }

    #[test]
    fn test_density_linear_in_depth() {
        let ssp = table(SspKind::Pchip);
        let mut seg = SegState::default();
        let e = ssp.eval2(Vec2::new(0.0, 750.0), Vec2::new(1.0, 0.1), &mut seg).unwrap();
        assert_relative_eq!(e.rho, 1.04, epsilon = 1e-12);
    }

    #[test]
    fn test_quad_bilinear_and_box_error() {
        let z = vec![0.0, 100.0];
        let base = SspTable::new(
            SspKind::CLinear,
            z.clone(),
            vec![re(1500.0), re(1500.0)],
            vec![1.0, 1.0],
        )
        .unwrap();
        let grid = QuadGrid::new(vec![0.0, 1000.0], vec![1500.0, 1520.0, 1500.0, 1520.0], &z).unwrap();
        let ssp = base.with_quad(grid);
        let mut seg = SegState::default();
        let e = ssp.eval2(Vec2::new(500.0, 50.0), Vec2::new(1.0, 0.0), &mut seg).unwrap();
        assert_relative_eq!(e.c.re, 1510.0, epsilon = 1e-9);
        assert_relative_eq!(e.gradc.r, 0.02, epsilon = 1e-12);

        // outside the range box the interpolation is piecewise constant
        let out = ssp.eval2(Vec2::new(-1.0, 50.0), Vec2::new(-1.0, 0.0), &mut seg).unwrap();
        assert_relative_eq!(out.c.re, 1500.0, epsilon = 1e-9);
    }

    #[test]
    fn test_analytic_profile_minimum_near_axis() {
        // sound channel axis at z0 = 1300 m: gradient changes sign there
        let mut seg = SegState::default();
        let shallow = SspTable::new(
            SspKind::Analytic,
            vec![0.0, 5000.0],
            vec![re(0.0), re(0.0)],
            vec![1.0, 1.0],
        )
        .unwrap();
        let above = shallow.eval2(Vec2::new(0.0, 1200.0), Vec2::new(1.0, 0.1), &mut seg).unwrap();
        let below = shallow.eval2(Vec2::new(0.0, 1400.0), Vec2::new(1.0, 0.1), &mut seg).unwrap();
        assert!(above.gradc.z < 0.0);
        assert!(below.gradc.z > 0.0);
        // the half-space branch is rejected
        let hs = shallow.eval2(Vec2::new(0.0, 5001.0), Vec2::new(1.0, 0.1), &mut seg);
        assert!(matches!(hs, Err(SspError::AnalyticHalfspace(_))));
    }

    #[test]
    fn test_hex_trilinear_gradient() {
        let z = vec![0.0, 100.0];
        let base = SspTable::new(
            SspKind::CLinear,
            z.clone(),
            vec![re(1500.0), re(1500.0)],
            vec![1.0, 1.0],
        )
        .unwrap();
        // c = 1500 + 0.01 x, independent of y and z
        let mut c = Vec::new();
        for _iz in 0..2 {
            for _iy in 0..2 {
                for &xv in &[0.0 as Real, 1000.0] {
                    c.push(1500.0 + 0.01 * xv);
                }
            }
        }
        let hex = HexGrid::new(vec![0.0, 1000.0], vec![0.0, 1000.0], c, 2).unwrap();
        let ssp = base.with_hex(hex);
        let mut seg = SegState::default();
        let e = ssp
            .eval3(Vec3::new(250.0, 500.0, 50.0), Vec3::new(1.0, 0.0, 0.0), &mut seg)
            .unwrap();
        assert_relative_eq!(e.c.re, 1502.5, epsilon = 1e-9);
        assert_relative_eq!(e.gradc.x, 0.01, epsilon = 1e-12);
        assert_relative_eq!(e.gradc.y, 0.0, epsilon = 1e-12);
    }
}
