//! Boundary reflection.
//!
//! Applies the reflection law to the full ray state: specular tangent
//! update, bounce counting, paraxial curvature correction (Muller's formulas
//! in 2D, the rotated curvature tensor in 3D), and the amplitude/phase
//! change dictated by the half-space behind the boundary.

mod coef;

pub use coef::{ReflCoef, ReflTable};

use crate::boundary::{BcTag, HalfSpace};
use crate::error::ErrState;
use crate::prt::LogSink;
use crate::ray::{RayPt2, RayPt3};
use crate::ssp::{SspEval2, SspEval3};
use crate::types::{Cpx, MIN_POS, PI, Real, Vec2, Vec3, rad2deg};

/// Beam curvature handling at reflections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CurvatureFlag {
    /// Standard single correction.
    #[default]
    Standard,
    /// Doubled correction (beam type `'D'`).
    Double,
    /// No correction (beam type `'Z'`).
    Zero,
}

impl CurvatureFlag {
    pub fn from_char(ch: char) -> Self {
        match ch {
            'D' => CurvatureFlag::Double,
            'Z' => CurvatureFlag::Zero,
            _ => CurvatureFlag::Standard,
        }
    }
}

/// Rays whose reflection coefficient drops below this lose all energy.
const KILL_THRESHOLD: Real = 1.0e-5;

/// Everything the 2D reflector needs to know about the boundary at the
/// impact point.
pub struct ReflSetting2<'a> {
    pub hs: &'a HalfSpace,
    pub is_top: bool,
    /// Unit tangent along the boundary segment.
    pub t_bdry: Vec2,
    /// Unit normal, pointing into the water.
    pub n_bdry: Vec2,
    /// Boundary curvature at the segment.
    pub kappa: Real,
    pub table: Option<&'a ReflTable>,
    /// Half-space formula choice: the 3D-ocean variant uses the vertical
    /// wavenumber form.
    pub ocean_3d: bool,
}

/// Reflect a 2D ray point off the top or bottom boundary.
///
/// `eval` is the SSP evaluation at `old.x` with the incident tangent; its
/// gradient feeds the sound-speed jump terms of the curvature correction.
#[allow(clippy::too_many_arguments)]
pub fn reflect2(
    old: &RayPt2,
    setting: &ReflSetting2,
    eval: &SspEval2,
    freq: Real,
    curvature: CurvatureFlag,
    shift: bool,
    err: &ErrState,
    sink: &dyn LogSink,
) -> RayPt2 {
    let th = old.t.dot(setting.n_bdry); // tangent component normal to boundary
    let tg = old.t.dot(setting.t_bdry); // tangent component along boundary

    let mut new = *old;
    new.num_top_bnc += setting.is_top as u32;
    new.num_bot_bnc += !setting.is_top as u32;
    new.t = old.t - 2.0 * th * setting.n_bdry;

    let c = eval.c.re;
    new.c = c;

    // incident and reflected unit tangent/normal pairs; the reflected frame
    // has the opposite orientation
    let rayt = c * old.t;
    let rayn = rayt.perp();
    let rayt_tilde = c * new.t;
    let rayn_tilde = -rayt_tilde.perp();

    let mut rn = 2.0 * setting.kappa / (c * c) / th;

    let mut cnjump = -eval.gradc.dot(rayn_tilde - rayn);
    let csjump = -eval.gradc.dot(rayt_tilde - rayt);

    if setting.is_top {
        // the (t, n) frame of the top boundary has the opposite sense
        cnjump = -cnjump;
        rn = -rn;
    }

    let rm = tg / th; // tan of the angle of incidence
    rn += rm * (2.0 * cnjump - rm * csjump) / (c * c);

    match curvature {
        CurvatureFlag::Standard => {}
        CurvatureFlag::Double => rn *= 2.0,
        CurvatureFlag::Zero => rn = 0.0,
    }

    new.p = old.p + old.q * rn;
    new.q = old.q;

    match setting.hs.bc {
        BcTag::Rigid => {}
        BcTag::Vacuum => {
            new.phase = old.phase + PI;
        }
        BcTag::File => {
            let mut theta = rad2deg(th.atan2(tg).abs());
            if theta > 90.0 {
                // the coefficient is symmetric about 90 degrees
                theta = 180.0 - theta;
            }
            let (r, phi) = match setting.table {
                Some(table) => table.interpolate(theta, setting.is_top, err, sink),
                None => (1.0, 0.0),
            };
            new.amp = old.amp * r;
            new.phase = old.phase + phi;
        }
        BcTag::AcoustoElastic | BcTag::Grab => {
            let omega = 2.0 * PI * freq;
            let refl = if setting.ocean_3d {
                halfspace_coef_vertical(setting.hs, c, eval.rho, omega, tg)
            } else {
                halfspace_coef(setting.hs, eval.rho, omega, tg, th)
            };

            if refl.norm() < KILL_THRESHOLD {
                // the ray has lost its energy in the reflection
                new.amp = 0.0;
            } else {
                new.amp = refl.norm() * old.amp;
                new.phase = old.phase + refl.im.atan2(refl.re);
                if shift {
                    beam_displacement(old, &mut new, setting, eval, omega);
                }
            }
        }
    }

    new
}

/// Complex half-space reflection coefficient from the tangential/normal
/// wavenumber form, with shear when the half-space supports it.
fn halfspace_coef(hs: &HalfSpace, rho_w: Real, omega: Real, tg: Real, th: Real) -> Cpx {
    let kx = Cpx::new(omega * tg, 0.0); // wavenumber along the boundary
    // vertical wavenumber on the into-boundary branch; the incident normal
    // component is negative against an inward boundary normal
    let kz = Cpx::new(omega * th.abs(), 0.0);
    let kx2 = kx * kx;

    let (f, g) = if hs.cs.re > 0.0 {
        let kzs2 = kx2 - (omega / hs.cs) * (omega / hs.cs);
        let kzp2 = kx2 - (omega / hs.cp) * (omega / hs.cp);
        let kzs = kzs2.sqrt();
        let kzp = kzp2.sqrt();
        let mu = hs.rho * (hs.cs * hs.cs);

        let y2 = ((kzs2 + kx2) * (kzs2 + kx2) - 4.0 * kzs * kzp * kx2) * mu;
        let y4 = kzp * (kx2 - kzs2);

        (omega * omega * y4, y2)
    } else {
        let mut kzp = (kx2 - (omega / hs.cp) * (omega / hs.cp)).sqrt();
        // take the positive branch of the square root on the negative real axis
        if kzp.re == 0.0 && kzp.im < 0.0 {
            kzp = -kzp;
        }
        (kzp, Cpx::new(hs.rho, 0.0))
    };

    let j = Cpx::new(0.0, 1.0);
    -(rho_w * f - j * kz * g) / (rho_w * f + j * kz * g)
}

/// Half-space coefficient in the vertical-wavenumber (γ) form used for 3D
/// oceans.
fn halfspace_coef_vertical(hs: &HalfSpace, c: Real, rho_w: Real, omega: Real, tg: Real) -> Cpx {
    let j = Cpx::new(0.0, 1.0);
    let gk = Cpx::new(omega * tg, 0.0);
    // the tiny imaginary part keeps the square root on the correct branch
    let gamma1_sq = Cpx::new((omega / c) * (omega / c), 0.0) - gk * gk - j * MIN_POS;
    let gamma2_sq = (omega / hs.cp) * (omega / hs.cp) - gk * gk - j * MIN_POS;
    let gamma1 = (-gamma1_sq).sqrt();
    let gamma2 = (-gamma2_sq).sqrt();
    (hs.rho * gamma1 - rho_w * gamma2) / (hs.rho * gamma1 + rho_w * gamma2)
}

/// Beam displacement and width change for the `'S'` (displacement) beam
/// type, Tindle's Eq. (14) with the sloping-bottom update.
fn beam_displacement(
    old: &RayPt2,
    new: &mut RayPt2,
    setting: &ReflSetting2,
    eval: &SspEval2,
    omega: Real,
) {
    let hs = setting.hs;
    let ch = old.c / hs.cp.conj();
    let co = old.t.r * old.c;
    let si = old.t.z * old.c;
    let ck = omega / old.c;

    let a = 2.0 * hs.rho * (1.0 - ch * ch);
    let b = Cpx::new(co * co, 0.0) - ch * ch;
    let d = hs.rho * hs.rho * si * si + b;
    let sb = b.sqrt();
    let cco = co * co;
    let ssi = si * si;

    let delta = if si != 0.0 {
        a * co / si / (ck * sb * d)
    } else {
        Cpx::new(0.0, 0.0)
    };
    let pdelta = delta.re / (old.c / co);

    let cksbd = ck * sb * d;
    let ddelta = a
        * (cco / (cksbd * b) - (1.0 + cco / ssi) / cksbd
            - 2.0 * cco * (hs.rho * hs.rho - 1.0) / (cksbd * d));
    let rddelta = -ddelta.re;
    let sddelta = rddelta / rddelta.abs();

    let theta_bot = (setting.t_bdry.z).atan2(setting.t_bdry.r);
    new.x.r += delta.re * theta_bot.cos();
    new.x.z += delta.re * theta_bot.sin();
    new.tau += pdelta;
    new.q += sddelta * rddelta * si * eval.c.re * old.p;
}

/// Boundary data for the 3D reflector.
pub struct ReflSetting3<'a> {
    pub hs: &'a HalfSpace,
    pub is_top: bool,
    /// Unit normal, pointing into the water.
    pub n_bdry: Vec3,
    /// Boundary curvature moments `(z_xx, z_xy, z_yy)` at the impact point.
    pub z_moments: (Real, Real, Real),
    pub table: Option<&'a ReflTable>,
}

/// Reflect a 3D ray point.
#[allow(clippy::too_many_arguments)]
pub fn reflect3(
    old: &RayPt3,
    setting: &ReflSetting3,
    eval: &SspEval3,
    freq: Real,
    curvature: CurvatureFlag,
    err: &ErrState,
    sink: &dyn LogSink,
) -> RayPt3 {
    let n = setting.n_bdry;
    let th = old.t.dot(n);

    // the in-plane boundary tangent is the projection of the ray tangent
    let t_bdry = (old.t - th * n).normalized();
    let tg = old.t.dot(t_bdry);

    let mut new = *old;
    new.num_top_bnc += setting.is_top as u32;
    new.num_bot_bnc += !setting.is_top as u32;
    new.t = old.t - 2.0 * th * n;

    let c = eval.c.re;
    new.c = c;

    // incident and reflected ray frames
    let (rayt, rayn1, rayn2) = frame(old.t, c, n);
    let (rayt_tilde, rayn1_tilde, rayn2_tilde) = frame(new.t, c, n);

    // surface curvature rotated into / perpendicular to the reflection plane
    let t_rot = rayt.xy().normalized();
    let n_rot = rayn2.xy().normalized();
    let (z_xx, z_xy, z_yy) = setting.z_moments;
    // D = Rᵀ κ R with R's columns the in-plane projections
    let d11 = t_rot.r * (z_xx * t_rot.r + z_xy * t_rot.z)
        + t_rot.z * (z_xy * t_rot.r + z_yy * t_rot.z);
    let d12 = t_rot.r * (z_xx * n_rot.r + z_xy * n_rot.z)
        + t_rot.z * (z_xy * n_rot.r + z_yy * n_rot.z);
    let d22 = n_rot.r * (z_xx * n_rot.r + z_xy * n_rot.z)
        + n_rot.z * (z_xy * n_rot.r + z_yy * n_rot.z);

    // sound-speed jumps projected on the ray normals and tangent
    let cn1jump = eval.gradc.dot(-rayn1_tilde - rayn1);
    let cn2jump = eval.gradc.dot(-rayn2_tilde - rayn2);
    let csjump = -eval.gradc.dot(rayt_tilde - rayt);

    let (e1, e2) = ray_normal(old.t, old.phi, old.c);
    curvature_correction_3d(
        &mut new,
        (d11, d12, d22),
        tg,
        th,
        (cn1jump, cn2jump, csjump),
        (rayn1, rayn2),
        (e1, e2),
        curvature,
    );

    match setting.hs.bc {
        BcTag::Rigid => {}
        BcTag::Vacuum => {
            new.phase = old.phase + PI;
        }
        BcTag::File => {
            let mut theta = rad2deg(th.atan2(tg).abs());
            if theta > 90.0 {
                theta = 180.0 - theta;
            }
            let (r, phi) = match setting.table {
                Some(table) => table.interpolate(theta, setting.is_top, err, sink),
                None => (1.0, 0.0),
            };
            new.amp = old.amp * r;
            new.phase = old.phase + phi;
        }
        BcTag::AcoustoElastic | BcTag::Grab => {
            let omega = 2.0 * PI * freq;
            let refl = halfspace_coef_vertical(setting.hs, c, eval.rho, omega, tg);
            if refl.norm() < KILL_THRESHOLD {
                new.amp = 0.0;
            } else {
                new.amp = refl.norm() * old.amp;
                new.phase = old.phase + refl.im.atan2(refl.re);
            }
        }
    }

    new
}

/// Unit tangent and the two ray-frame normals at a boundary impact.
fn frame(t: Vec3, c: Real, n_bdry: Vec3) -> (Vec3, Vec3, Vec3) {
    let rayt = c * t;
    let rayn2 = rayt.cross(n_bdry).normalized();
    let rayn1 = -rayt.cross(rayn2);
    (rayt, rayn1, rayn2)
}

/// Ray-centred normals `(e1, e2)` from the tangent and the torsion angle φ.
pub fn ray_normal(t: Vec3, phi: Real, c: Real) -> (Vec3, Vec3) {
    let rl = (t.x * t.x + t.y * t.y).sqrt();
    let (sinp, cosp) = phi.sin_cos();
    let e1 = Vec3::new(
        (c * t.x * t.z * cosp + t.y * sinp) / rl,
        (c * t.y * t.z * cosp - t.x * sinp) / rl,
        -c * rl * cosp,
    );
    let e2 = Vec3::new(
        (c * t.x * t.z * sinp - t.y * cosp) / rl,
        (c * t.y * t.z * sinp + t.x * cosp) / rl,
        -c * rl * sinp,
    );
    (e1, e2)
}

/// Curvature correction of the paraxial vectors at a 3D reflection.
///
/// Rotates `(p, q)` from the ray-centred `(e1, e2)` frame onto the
/// reflection-plane normals, applies the in-plane / cross / out-of-plane
/// curvature changes, and rotates back.
#[allow(clippy::too_many_arguments)]
fn curvature_correction_3d(
    pt: &mut RayPt3,
    (d11, d12, d22): (Real, Real, Real),
    tg: Real,
    th: Real,
    (cn1jump, cn2jump, csjump): (Real, Real, Real),
    (rayn1, rayn2): (Vec3, Vec3),
    (e1, e2): (Vec3, Vec3),
    curvature: CurvatureFlag,
) {
    let rot11 = rayn1.dot(e1);
    let rot12 = rayn1.dot(e2);
    let rot21 = -rot12;
    let rot22 = rayn2.dot(e2);

    let p_tilde_in = rot11 * pt.p_tilde + rot12 * pt.p_hat;
    let p_hat_in = rot21 * pt.p_tilde + rot22 * pt.p_hat;
    let q_tilde_in = rot11 * pt.q_tilde + rot12 * pt.q_hat;
    let q_hat_in = rot21 * pt.q_tilde + rot22 * pt.q_hat;

    let c = pt.c;
    let csq = c * c;
    let rm = tg / th;

    let mut r1 = 2.0 * d11 / csq / th + rm * (2.0 * cn1jump - rm * csjump) / csq;
    let mut r2 = 2.0 * d12 / c + rm * cn2jump / csq;
    let mut r3 = 2.0 * d22 * th;

    match curvature {
        CurvatureFlag::Standard => {}
        CurvatureFlag::Double => {
            r1 *= 2.0;
            r2 *= 2.0;
            r3 *= 2.0;
        }
        CurvatureFlag::Zero => {
            r1 = 0.0;
            r2 = 0.0;
            r3 = 0.0;
        }
    }

    let p_tilde_out = p_tilde_in + q_tilde_in * r1 + q_hat_in * r2;
    let p_hat_out = p_hat_in + q_tilde_in * r2 + q_hat_in * r3;

    pt.p_tilde = rot11 * p_tilde_out + rot21 * p_hat_out;
    pt.p_hat = rot12 * p_tilde_out + rot22 * p_hat_out;
    pt.q_tilde = rot11 * q_tilde_in + rot21 * q_hat_in;
    pt.q_hat = rot12 * q_tilde_in + rot22 * q_hat_in;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prt::NullSink;
    use crate::types::Cpx;
    use approx::assert_relative_eq;

    fn incident(alpha: Real, c: Real) -> RayPt2 {
        RayPt2 {
            x: Vec2::new(1000.0, 200.0),
            t: Vec2::new(alpha.cos() / c, alpha.sin() / c),
            p: Cpx::new(1.0, 0.0),
            q: Cpx::new(500.0, 0.0),
            c,
            tau: Cpx::new(0.8, 0.0),
            amp: 1.0,
            phase: 0.0,
            num_top_bnc: 0,
            num_bot_bnc: 0,
        }
    }

    fn flat_bottom_setting<'a>(hs: &'a HalfSpace) -> ReflSetting2<'a> {
        ReflSetting2 {
            hs,
            is_top: false,
            t_bdry: Vec2::new(1.0, 0.0),
            n_bdry: Vec2::new(0.0, -1.0),
            kappa: 0.0,
            table: None,
            ocean_3d: false,
        }
    }

    fn uniform_eval(c: Real) -> SspEval2 {
        SspEval2 {
            c: Cpx::new(c, 0.0),
            gradc: Vec2::ZERO,
            crr: 0.0,
            crz: 0.0,
            czz: 0.0,
            rho: 1.0,
        }
    }

    #[test]
    fn test_reflection_law() {
        let c = 1500.0;
        let old = incident(0.4, c);
        let hs = HalfSpace::rigid();
        let setting = flat_bottom_setting(&hs);
        let err = ErrState::new();
        let new = reflect2(&old, &setting, &uniform_eval(c), 100.0,
            CurvatureFlag::Standard, false, &err, &NullSink);

        // normal component negated, tangential preserved
        assert_relative_eq!(new.t.dot(setting.n_bdry), -old.t.dot(setting.n_bdry), epsilon = 1e-15);
        assert_relative_eq!(new.t.dot(setting.t_bdry), old.t.dot(setting.t_bdry), epsilon = 1e-15);
        assert_eq!(new.num_bot_bnc, 1);
        assert_eq!(new.num_top_bnc, 0);
    }

    #[test]
    fn test_rigid_preserves_amplitude_and_phase() {
        let old = incident(0.3, 1500.0);
        let hs = HalfSpace::rigid();
        let setting = flat_bottom_setting(&hs);
        let err = ErrState::new();
        let new = reflect2(&old, &setting, &uniform_eval(1500.0), 50.0,
            CurvatureFlag::Standard, false, &err, &NullSink);
        assert_eq!(new.amp, old.amp);
        assert_eq!(new.phase, old.phase);
    }

    #[test]
    fn test_vacuum_shifts_phase_by_pi() {
        let c = 1500.0;
        let mut old = incident(0.3, c);
        old.t.z = -old.t.z; // upgoing, hits the top
        let hs = HalfSpace::vacuum();
        let setting = ReflSetting2 {
            hs: &hs,
            is_top: true,
            t_bdry: Vec2::new(1.0, 0.0),
            n_bdry: Vec2::new(0.0, 1.0),
            kappa: 0.0,
            table: None,
            ocean_3d: false,
        };
        let err = ErrState::new();
        let new = reflect2(&old, &setting, &uniform_eval(c), 50.0,
            CurvatureFlag::Standard, false, &err, &NullSink);
        assert_eq!(new.amp, old.amp);
        assert_relative_eq!(new.phase - old.phase, PI, epsilon = 1e-15);
        assert_eq!(new.num_top_bnc, 1);
        assert_eq!(new.num_bot_bnc, 0);
    }

    #[test]
    fn test_tabulated_cosine_scaling_at_45_degrees() {
        let rows = (0..=90)
            .map(|d| ReflCoef {
                theta: d as Real,
                r: (d as Real).to_radians().cos(),
                phi: 0.0,
            })
            .collect();
        let table = ReflTable::new(rows).unwrap();
        let c = 1500.0;
        let old = incident(PI / 4.0, c);
        let hs = HalfSpace { cp: Cpx::new(0.0, 0.0), cs: Cpx::new(0.0, 0.0), rho: 0.0, bc: BcTag::File };
        let mut setting = flat_bottom_setting(&hs);
        setting.table = Some(&table);
        let err = ErrState::new();
        let new = reflect2(&old, &setting, &uniform_eval(c), 50.0,
            CurvatureFlag::Standard, false, &err, &NullSink);
        assert_relative_eq!(new.amp, (0.5 as Real).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_elastic_magnitude_matches_vertical_form() {
        // pressure-only half-space: both formulas give the same |R|
        let c = 1480.0;
        let freq = 200.0;
        let omega = 2.0 * PI * freq;
        let hs = HalfSpace {
            cp: Cpx::new(1600.0, 0.0),
            cs: Cpx::new(0.0, 0.0),
            rho: 1.8,
            bc: BcTag::AcoustoElastic,
        };
        let alpha = (10.0 as Real).to_radians();
        let old = incident(alpha, c);
        let th = old.t.dot(Vec2::new(0.0, -1.0));
        let tg = old.t.r;

        let r_kx = halfspace_coef(&hs, 1.0, omega, tg, th);
        let r_gamma = halfspace_coef_vertical(&hs, c, 1.0, omega, tg);
        assert_relative_eq!(r_kx.norm(), r_gamma.norm(), epsilon = 1e-6);
    }

    #[test]
    fn test_curvature_flags() {
        // sloped-incidence ray with gradient jump: D doubles the p update, Z removes it
        let c = 1500.0;
        let old = incident(0.5, c);
        let hs = HalfSpace::rigid();
        let mut setting = flat_bottom_setting(&hs);
        setting.kappa = 0.01;
        let mut eval = uniform_eval(c);
        eval.gradc = Vec2::new(0.0, 0.05);
        let err = ErrState::new();

        let std = reflect2(&old, &setting, &eval, 50.0, CurvatureFlag::Standard, false, &err, &NullSink);
        let dbl = reflect2(&old, &setting, &eval, 50.0, CurvatureFlag::Double, false, &err, &NullSink);
        let zero = reflect2(&old, &setting, &eval, 50.0, CurvatureFlag::Zero, false, &err, &NullSink);

        assert_eq!(zero.p, old.p);
        let d_std = std.p - old.p;
        let d_dbl = dbl.p - old.p;
        assert_relative_eq!(d_dbl.re, 2.0 * d_std.re, epsilon = 1e-12);
    }

    #[test]
    fn test_reflect3_normal_incidence_returns_ray() {
        let c = 1500.0;
        let old = RayPt3 {
            x: Vec3::new(0.0, 0.0, 1000.0),
            t: Vec3::new(1.0e-9 / c, 0.0, (1.0 as Real) / c),
            p_tilde: Cpx::new(1.0, 0.0),
            p_hat: Cpx::new(0.0, 0.0),
            q_tilde: Cpx::new(300.0, 0.0),
            q_hat: Cpx::new(300.0, 0.0),
            phi: 0.0,
            c,
            tau: Cpx::new(0.6, 0.0),
            amp: 1.0,
            phase: 0.0,
            num_top_bnc: 0,
            num_bot_bnc: 0,
        };
        let hs = HalfSpace::rigid();
        let setting = ReflSetting3 {
            hs: &hs,
            is_top: false,
            n_bdry: Vec3::new(0.0, 0.0, -1.0),
            z_moments: (0.0, 0.0, 0.0),
            table: None,
        };
        let eval = SspEval3 {
            c: Cpx::new(c, 0.0),
            gradc: Vec3::ZERO,
            cxx: 0.0, cxy: 0.0, cxz: 0.0, cyy: 0.0, cyz: 0.0, czz: 0.0,
            rho: 1.0,
        };
        let err = ErrState::new();
        let new = reflect3(&old, &setting, &eval, 100.0, CurvatureFlag::Standard, &err, &NullSink);
        assert_relative_eq!(new.t.z, -old.t.z, epsilon = 1e-12);
        assert_eq!(new.num_bot_bnc, 1);
        assert_eq!(new.amp, old.amp);
    }
}
