//! 3D ray stepping and orchestration.
//!
//! The structure mirrors the 2D engine: a two-stage predictor-corrector with
//! step reduction against SSP grid planes and the boundary triangulation,
//! followed by reflection with the rotated curvature tensor. The paraxial
//! pair `(tilde, hat)` lives in the ray-centred frame whose torsion angle
//! `phi` is integrated along the ray.

use crate::boundary::Boundary3;
use crate::error::ErrState;
use crate::prt::LogSink;
use crate::reflect::{ReflSetting3, ReflTable, ray_normal, reflect3};
use crate::ssp::{SspError, SspEval3, SspTable};
use crate::types::{Real, SegState, Vec3};

use super::point::RayPt3;
use super::runner::{BeamInfo, Truncated};

/// What a 3D step ran into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Crossing3 {
    None,
    Top,
    Bottom,
}

/// Sink for committed 3D ray points.
pub trait Recorder3 {
    fn launch(&mut self, pt: &RayPt3) -> Result<(), Truncated>;
    fn step(&mut self, prev: &RayPt3, pt: &RayPt3) -> Result<(), Truncated>;
}

/// Environment for tracing 3D rays.
pub struct TraceEnv3<'a> {
    pub ssp: &'a SspTable,
    pub top: &'a Boundary3,
    pub bot: &'a Boundary3,
    pub refl_top: Option<&'a ReflTable>,
    pub refl_bot: Option<&'a ReflTable>,
    pub freq: Real,
    pub beam: &'a BeamInfo,
    pub err: &'a ErrState,
    pub sink: &'a dyn LogSink,
}

const AMP_FLOOR: Real = 0.005;

/// Signed distance above/below the boundary surface, positive in water.
fn dist_inside(bdry: &Boundary3, p: Vec3, cell: usize) -> Real {
    let zb = bdry.depth_at(p.x, p.y, cell);
    match bdry.side {
        crate::boundary::Side::Bottom => zb - p.z,
        crate::boundary::Side::Top => p.z - zb,
    }
}

/// Projections of the curvature tensor of `c` onto the ray-normal frame.
fn normal_curvatures(e: &SspEval3, e1: Vec3, e2: Vec3) -> (Real, Real, Real) {
    let h = |a: Vec3, b: Vec3| {
        e.cxx * a.x * b.x
            + e.cyy * a.y * b.y
            + e.czz * a.z * b.z
            + e.cxy * (a.x * b.y + a.y * b.x)
            + e.cxz * (a.x * b.z + a.z * b.x)
            + e.cyz * (a.y * b.z + a.z * b.y)
    };
    (h(e1, e1), h(e1, e2), h(e2, e2))
}

/// Torsion rate of the ray-centred frame.
fn phi_rate(t: Vec3, gradc: Vec3, c: Real) -> Real {
    let th2 = t.x * t.x + t.y * t.y;
    if th2 == 0.0 {
        return 0.0;
    }
    (t.z / th2) * (t.y * gradc.x - t.x * gradc.y) / (c * c)
}

fn reduce_axis(axis: &[Real], pos: Real, vel: Real, iseg: usize, h: Real) -> Real {
    if vel == 0.0 {
        return h;
    }
    let plane = if vel > 0.0 { axis[iseg + 1] } else { axis[iseg] };
    let hc = (plane - pos) / vel;
    if hc > 0.0 && hc < h { hc } else { h }
}

fn reduce_step3(env: &TraceEnv3<'_>, ray0: &RayPt3, urayt: Vec3, seg: &SegState, mut h: Real) -> (Real, Crossing3) {
    let mut crossing = Crossing3::None;

    // SSP planes
    h = reduce_axis(&env.ssp.z, ray0.x.z, urayt.z, seg.z, h);
    if let Some(hex) = &env.ssp.hex {
        h = reduce_axis(&hex.x, ray0.x.x, urayt.x, seg.x, h);
        h = reduce_axis(&hex.y, ray0.x.y, urayt.y, seg.y, h);
    }

    // boundary surfaces
    for (bdry, cell, which) in [
        (env.top, seg.top, Crossing3::Top),
        (env.bot, seg.bot, Crossing3::Bottom),
    ] {
        let n = bdry.normal_at(ray0.x.x, ray0.x.y, cell);
        let d0 = dist_inside(bdry, ray0.x, cell);
        let rate = urayt.dot(n);
        if rate < 0.0 && d0 >= 0.0 {
            // the vertical distance maps to a perpendicular one through n.z
            let hp = -(d0 * n.z.abs()) / rate;
            if hp > 0.0 && hp < h {
                h = hp;
                crossing = which;
            }
        }
        // lateral cell edges
        let (ix, iy) = (cell % (bdry.x.len() - 1), cell / (bdry.x.len() - 1));
        h = reduce_axis(&bdry.x, ray0.x.x, urayt.x, ix, h);
        h = reduce_axis(&bdry.y, ray0.x.y, urayt.y, iy, h);
    }

    // caustics in either paraxial component
    for (q, p) in [(ray0.q_tilde, ray0.p_tilde), (ray0.q_hat, ray0.p_hat)] {
        let dq = ray0.c * p.re;
        if dq != 0.0 {
            let hc = -q.re / dq;
            if hc > 0.0 && hc < h {
                h = hc;
            }
        }
    }

    (h, crossing)
}

/// Advance a 3D ray by one adaptive step.
pub fn step3(
    env: &TraceEnv3<'_>,
    ray0: &RayPt3,
    seg: &mut SegState,
) -> Result<(RayPt3, Crossing3), SspError> {
    let e0 = env.ssp.eval3(ray0.x, ray0.t, seg)?;
    let seg0 = *seg;
    let c0 = e0.c.re;
    let csq0 = c0 * c0;
    let urayt0 = c0 * ray0.t;
    let (e1f, e2f) = ray_normal(ray0.t, ray0.phi, c0);
    let (cnn0, cmn0, cmm0) = normal_curvatures(&e0, e1f, e2f);

    let (h1, _) = reduce_step3(env, ray0, urayt0, &seg0, env.beam.deltas);

    // Euler half-step
    let halfh = 0.5 * h1;
    let x_half = ray0.x + halfh * urayt0;
    let t_half = ray0.t - halfh * (1.0 / csq0) * e0.gradc;
    let p_tilde_half = ray0.p_tilde - (halfh / csq0) * (cnn0 * ray0.q_tilde + cmn0 * ray0.q_hat);
    let p_hat_half = ray0.p_hat - (halfh / csq0) * (cmn0 * ray0.q_tilde + cmm0 * ray0.q_hat);
    let q_tilde_half = ray0.q_tilde + (halfh * c0) * ray0.p_tilde;
    let q_hat_half = ray0.q_hat + (halfh * c0) * ray0.p_hat;

    let e1 = env.ssp.eval3(x_half, t_half, seg)?;
    let c1 = e1.c.re;
    let csq1 = c1 * c1;
    let urayt1 = c1 * t_half;
    let (e1f1, e2f1) = ray_normal(t_half, ray0.phi, c1);
    let (cnn1, cmn1, cmm1) = normal_curvatures(&e1, e1f1, e2f1);

    let (h, mut crossing) = reduce_step3(env, ray0, urayt1, &seg0, h1);

    let w = 0.5 * h;
    let mut pt = *ray0;
    pt.x = ray0.x + w * (urayt0 + urayt1);
    pt.t = ray0.t - w * ((1.0 / csq0) * e0.gradc + (1.0 / csq1) * e1.gradc);
    pt.p_tilde = ray0.p_tilde
        - w * ((cnn0 / csq0) * ray0.q_tilde
            + (cmn0 / csq0) * ray0.q_hat
            + (cnn1 / csq1) * q_tilde_half
            + (cmn1 / csq1) * q_hat_half);
    pt.p_hat = ray0.p_hat
        - w * ((cmn0 / csq0) * ray0.q_tilde
            + (cmm0 / csq0) * ray0.q_hat
            + (cmn1 / csq1) * q_tilde_half
            + (cmm1 / csq1) * q_hat_half);
    pt.q_tilde = ray0.q_tilde + w * (c0 * ray0.p_tilde + c1 * p_tilde_half);
    pt.q_hat = ray0.q_hat + w * (c0 * ray0.p_hat + c1 * p_hat_half);
    pt.tau = ray0.tau + w * (1.0 / e0.c + 1.0 / e1.c);
    pt.phi = ray0.phi
        + w * (phi_rate(ray0.t, e0.gradc, c0) + phi_rate(t_half, e1.gradc, c1));

    let e2 = env.ssp.eval3(pt.x, pt.t, seg)?;
    pt.c = e2.c.re;

    env.top.update_cell(pt.x, pt.t, &mut seg.top);
    env.bot.update_cell(pt.x, pt.t, &mut seg.bot);
    if crossing == Crossing3::None {
        if dist_inside(env.top, pt.x, seg.top) <= 0.0
            && pt.t.dot(env.top.normal_at(pt.x.x, pt.x.y, seg.top)) < 0.0
        {
            crossing = Crossing3::Top;
        } else if dist_inside(env.bot, pt.x, seg.bot) <= 0.0
            && pt.t.dot(env.bot.normal_at(pt.x.x, pt.x.y, seg.bot)) < 0.0
        {
            crossing = Crossing3::Bottom;
        }
    }
    match crossing {
        Crossing3::Top => pt.x.z = env.top.depth_at(pt.x.x, pt.x.y, seg.top),
        Crossing3::Bottom => pt.x.z = env.bot.depth_at(pt.x.x, pt.x.y, seg.bot),
        Crossing3::None => {}
    }

    Ok((pt, crossing))
}

fn warn_ssp(env: &TraceEnv3<'_>, err: &SspError) {
    match err {
        SspError::SegmentEscape { .. } => {
            env.err.raise_ssp_escape();
            env.sink.emit(&format!("fatal: {err}"));
        }
        _ => env.err.warn_ssp_box(env.sink, &format!("ray terminated: {err}")),
    }
}

/// Trace one 3D ray; returns the number of committed points.
pub fn trace_ray3<R: Recorder3>(
    env: &TraceEnv3<'_>,
    src: Vec3,
    alpha: Real,
    beta: Real,
    rec: &mut R,
) -> usize {
    let mut seg = SegState::default();
    let t_dir = Vec3::new(alpha.cos() * beta.cos(), alpha.cos() * beta.sin(), alpha.sin());
    let e0 = match env.ssp.eval3(src, t_dir, &mut seg) {
        Ok(e) => e,
        Err(err) => {
            warn_ssp(env, &err);
            return 0;
        }
    };

    let mut ray = RayPt3::launch(src, alpha, beta, e0.c.re);
    env.top.update_cell(src, ray.t, &mut seg.top);
    env.bot.update_cell(src, ray.t, &mut seg.bot);

    if rec.launch(&ray).is_err() {
        env.err.count_truncated_ray();
        return 0;
    }
    let mut nsteps = 1usize;

    loop {
        if nsteps >= env.beam.max_steps {
            env.err.count_truncated_ray();
            break;
        }
        let (pt, crossing) = match step3(env, &ray, &mut seg) {
            Ok(out) => out,
            Err(err) => {
                warn_ssp(env, &err);
                break;
            }
        };
        if rec.step(&ray, &pt).is_err() {
            env.err.count_truncated_ray();
            break;
        }
        nsteps += 1;

        ray = match crossing {
            Crossing3::None => pt,
            Crossing3::Top | Crossing3::Bottom => {
                let is_top = crossing == Crossing3::Top;
                let (bdry, table, cell) = if is_top {
                    (env.top, env.refl_top, seg.top)
                } else {
                    (env.bot, env.refl_bot, seg.bot)
                };
                let eval = match env.ssp.eval3(pt.x, pt.t, &mut seg) {
                    Ok(e) => e,
                    Err(err) => {
                        warn_ssp(env, &err);
                        break;
                    }
                };
                let setting = ReflSetting3 {
                    hs: &bdry.hs,
                    is_top,
                    n_bdry: bdry.normal_at(pt.x.x, pt.x.y, cell),
                    z_moments: bdry.curvature_at(pt.x.x, pt.x.y, cell),
                    table,
                };
                let refl = reflect3(
                    &pt,
                    &setting,
                    &eval,
                    env.freq,
                    env.beam.curvature,
                    env.err,
                    env.sink,
                );
                if rec.step(&pt, &refl).is_err() {
                    env.err.count_truncated_ray();
                    break;
                }
                nsteps += 1;
                refl
            }
        };

        if ray.amp < AMP_FLOOR {
            break;
        }
        if ray.x.xy().norm() >= env.beam.box_r || ray.x.z >= env.beam.box_z {
            break;
        }
        if ray.num_top_bnc + ray.num_bot_bnc > env.beam.max_bounces {
            break;
        }
    }

    nsteps
}
