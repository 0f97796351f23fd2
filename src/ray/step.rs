//! Adaptive ray stepping.
//!
//! Each step advances `(x, t, p, q, τ)` with a two-stage predictor-corrector
//! (SSP evaluated at the start and at the midpoint). The trial step from the
//! beam configuration is first reduced so the step never crosses an SSP
//! depth/range plane, a boundary segment, or a caustic; when an interface is
//! the binding constraint the step lands exactly on it and the crossing is
//! reported to the caller.

use crate::boundary::Boundary2;
use crate::ssp::{SspError, SspEval2};
use crate::types::{Real, SegState, Vec2};

use super::medium::{Medium2, Snap};
use super::point::RayPt2;

/// What a step ran into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Crossing {
    /// Plain interior step (possibly landed on an SSP segment plane).
    None,
    /// Landed on the top boundary; reflect before continuing.
    Top,
    /// Landed on the bottom boundary.
    Bottom,
}

/// Outcome of one step.
#[derive(Clone, Copy, Debug)]
pub struct StepResult {
    pub pt: RayPt2,
    pub crossing: Crossing,
}

/// `c_nn / c²` along the ray normal, from the scaled tangent.
#[inline]
fn cnn_over_csq(e: &SspEval2, t: Vec2) -> Real {
    e.crr * t.z * t.z - 2.0 * e.crz * t.r * t.z + e.czz * t.r * t.r
}

enum Limit {
    Interior(Snap),
    Top,
    Bottom,
    Caustic,
}

/// Reduce the trial `h` against every crossing constraint reachable from
/// `x0` along `urayt`. Returns the reduced step and the binding constraint.
fn reduce_step<M: Medium2>(
    ray0: &RayPt2,
    urayt: Vec2,
    medium: &M,
    top: &Boundary2,
    bot: &Boundary2,
    seg: &SegState,
    mut h: Real,
) -> (Real, Limit) {
    let mut limit = Limit::Interior(Snap::None);

    // (a), (b): SSP depth / range segment planes
    let (h_int, snap) = medium.reduce_interior(ray0.x, urayt, seg, h);
    if h_int < h {
        h = h_int;
        limit = Limit::Interior(snap);
    }

    // (c): top and bottom boundary planes and the lateral ends of the
    // active boundary segments
    for (bdry, iseg, which) in [(top, seg.top, Crossing::Top), (bot, seg.bot, Crossing::Bottom)] {
        let n = bdry.normal[iseg];
        let d0 = ray0.x.dot(n) - bdry.node[iseg].dot(n);
        let rate = urayt.dot(n);
        if rate < 0.0 && d0 >= 0.0 {
            let hc = -d0 / rate;
            if hc > 0.0 && hc < h {
                h = hc;
                limit = match which {
                    Crossing::Top => Limit::Top,
                    _ => Limit::Bottom,
                };
            }
        }
        // stepping onto the neighboring boundary segment is an interior event
        if urayt.r != 0.0 {
            let r_edge = if urayt.r > 0.0 { bdry.node[iseg + 1].r } else { bdry.node[iseg].r };
            let hc = (r_edge - ray0.x.r) / urayt.r;
            if hc > 0.0 && hc < h {
                h = hc;
                limit = Limit::Interior(Snap::R(r_edge));
            }
        }
    }

    // (d): caustic in q — land the step near the real-axis crossing
    let dq = ray0.c * ray0.p.re;
    if dq != 0.0 {
        let hc = -ray0.q.re / dq;
        if hc > 0.0 && hc < h {
            h = hc;
            limit = Limit::Caustic;
        }
    }

    (h, limit)
}

/// Advance a 2D ray by one adaptive step.
#[allow(clippy::too_many_arguments)]
pub fn step2<M: Medium2>(
    ray0: &RayPt2,
    medium: &M,
    top: &Boundary2,
    bot: &Boundary2,
    h_trial: Real,
    seg: &mut SegState,
) -> Result<StepResult, SspError> {
    let e0 = medium.eval(ray0.x, ray0.t, seg)?;
    let seg0 = *seg;
    let c0 = e0.c.re;
    let csq0 = c0 * c0;
    let urayt0 = c0 * ray0.t;
    let cnn0 = cnn_over_csq(&e0, ray0.t);

    let (h1, _) = reduce_step(ray0, urayt0, medium, top, bot, &seg0, h_trial);

    // Euler half-step to the midpoint
    let halfh = 0.5 * h1;
    let x_half = ray0.x + halfh * urayt0;
    let t_half = ray0.t - halfh * (1.0 / csq0) * e0.gradc;
    let p_half = ray0.p - (halfh * cnn0) * ray0.q;
    let q_half = ray0.q + (halfh * c0) * ray0.p;

    let e1 = medium.eval(x_half, t_half, seg)?;
    let c1 = e1.c.re;
    let csq1 = c1 * c1;
    let urayt1 = c1 * t_half;
    let cnn1 = cnn_over_csq(&e1, t_half);

    // the midpoint derivative may cross an interface sooner
    let (h, limit) = reduce_step(ray0, urayt1, medium, top, bot, &seg0, h1);

    // corrector: full step with averaged derivatives
    let w = 0.5 * h;
    let mut pt = *ray0;
    pt.x = ray0.x + w * (urayt0 + urayt1);
    pt.t = ray0.t - w * ((1.0 / csq0) * e0.gradc + (1.0 / csq1) * e1.gradc);
    pt.p = ray0.p - w * (cnn0 * ray0.q + cnn1 * q_half);
    pt.q = ray0.q + w * (c0 * ray0.p + c1 * p_half);
    pt.tau = ray0.tau + w * (1.0 / e0.c + 1.0 / e1.c);

    // land exactly on the binding interface
    let mut crossing = Crossing::None;
    match limit {
        Limit::Interior(Snap::Z(zp)) => pt.x.z = zp,
        Limit::Interior(Snap::R(rp)) => pt.x.r = rp,
        Limit::Interior(Snap::None) | Limit::Caustic => {}
        Limit::Top => crossing = Crossing::Top,
        Limit::Bottom => crossing = Crossing::Bottom,
    }

    // refresh the cursors at the landed position, then re-check the
    // boundary distances in case the step still overshot one
    let e2 = medium.eval(pt.x, pt.t, seg)?;
    pt.c = e2.c.re;

    top.update_seg(pt.x.r, pt.t.r, &mut seg.top);
    bot.update_seg(pt.x.r, pt.t.r, &mut seg.bot);
    if crossing == Crossing::None {
        if top.dist_inside(pt.x, seg.top) <= 0.0 && pt.t.dot(top.normal[seg.top]) < 0.0 {
            crossing = Crossing::Top;
        } else if bot.dist_inside(pt.x, seg.bot) <= 0.0 && pt.t.dot(bot.normal[seg.bot]) < 0.0 {
            crossing = Crossing::Bottom;
        }
    }
    match crossing {
        Crossing::Top => {
            let iseg = seg.top;
            pt.x = pt.x - top.dist_inside(pt.x, iseg) * top.normal[iseg];
        }
        Crossing::Bottom => {
            let iseg = seg.bot;
            pt.x = pt.x - bot.dist_inside(pt.x, iseg) * bot.normal[iseg];
        }
        Crossing::None => {}
    }

    Ok(StepResult { pt, crossing })
}
