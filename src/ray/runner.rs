//! Per-ray orchestration: launch, step, reflect, record, terminate.

use crate::boundary::Boundary2;
use crate::error::ErrState;
use crate::prt::LogSink;
use crate::reflect::{CurvatureFlag, ReflSetting2, ReflTable, reflect2};
use crate::ssp::SspError;
use crate::types::{Real, SegState, Vec2};

use super::medium::Medium2;
use super::point::RayPt2;
use super::step::{Crossing, step2};

/// Tracing limits and beam options shared by every ray of a run.
#[derive(Clone, Debug)]
pub struct BeamInfo {
    pub curvature: CurvatureFlag,
    /// Seongil's beam-displacement model (beam type `'S'`).
    pub shift: bool,
    /// Trial step size in meters.
    pub deltas: Real,
    /// Range extent of the ray box.
    pub box_r: Real,
    /// Depth extent of the ray box.
    pub box_z: Real,
    pub max_steps: usize,
    pub max_bounces: u32,
}

/// Rays below this amplitude carry no usable energy and stop.
const AMP_FLOOR: Real = 0.005;

/// Sink for committed ray points. Returning `Err(Truncated)` stops the ray
/// without failing the run.
pub trait Recorder2 {
    fn launch(&mut self, pt: &RayPt2) -> Result<(), Truncated>;
    fn step(&mut self, prev: &RayPt2, pt: &RayPt2) -> Result<(), Truncated>;
}

/// Soft stop raised by a recorder that ran out of room.
#[derive(Debug)]
pub struct Truncated;

/// Environment for tracing one fan of 2D rays.
pub struct TraceEnv2<'a, M: Medium2> {
    pub medium: &'a M,
    pub top: &'a Boundary2,
    pub bot: &'a Boundary2,
    pub refl_top: Option<&'a ReflTable>,
    pub refl_bot: Option<&'a ReflTable>,
    pub freq: Real,
    pub beam: &'a BeamInfo,
    /// Selects the 3D-ocean half-space coefficient for Nx2D fans.
    pub ocean_3d: bool,
    pub err: &'a ErrState,
    pub sink: &'a dyn LogSink,
}

/// Trace one ray from `src` at launch angle `alpha`; returns the number of
/// committed points. SSP evaluation failures terminate the ray with a
/// one-shot warning and leave the run going.
pub fn trace_ray2<M: Medium2, R: Recorder2>(
    env: &TraceEnv2<'_, M>,
    src: Vec2,
    alpha: Real,
    rec: &mut R,
) -> usize {
    let mut seg = SegState::default();
    let t_dir = Vec2::new(alpha.cos(), alpha.sin());
    let e0 = match env.medium.eval(src, t_dir, &mut seg) {
        Ok(e) => e,
        Err(err) => {
            warn_ssp(env, &err);
            return 0;
        }
    };

    let mut ray = RayPt2::launch(src, alpha, e0.c.re);
    env.top.update_seg(src.r, ray.t.r, &mut seg.top);
    env.bot.update_seg(src.r, ray.t.r, &mut seg.bot);

    // a source outside the water column produces nothing
    if env.top.dist_inside(src, seg.top) < 0.0 || env.bot.dist_inside(src, seg.bot) < 0.0 {
        env.sink.emit(&format!("source at depth {} m is outside the water column", src.z));
        return 0;
    }

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

        let out = match step2(&ray, env.medium, env.top, env.bot, env.beam.deltas, &mut seg) {
            Ok(out) => out,
            Err(err) => {
                warn_ssp(env, &err);
                break;
            }
        };

        if rec.step(&ray, &out.pt).is_err() {
            env.err.count_truncated_ray();
            break;
        }
        nsteps += 1;

        ray = match out.crossing {
            Crossing::None => out.pt,
            Crossing::Top | Crossing::Bottom => {
                let is_top = out.crossing == Crossing::Top;
                let (bdry, table, iseg) = if is_top {
                    (env.top, env.refl_top, seg.top)
                } else {
                    (env.bot, env.refl_bot, seg.bot)
                };
                let eval = match env.medium.eval(out.pt.x, out.pt.t, &mut seg) {
                    Ok(e) => e,
                    Err(err) => {
                        warn_ssp(env, &err);
                        break;
                    }
                };
                let setting = ReflSetting2 {
                    hs: bdry.halfspace(iseg),
                    is_top,
                    t_bdry: bdry.tangent[iseg],
                    n_bdry: bdry.normal[iseg],
                    kappa: bdry.kappa[iseg],
                    table,
                    ocean_3d: env.ocean_3d,
                };
                let refl = reflect2(
                    &out.pt,
                    &setting,
                    &eval,
                    env.freq,
                    env.beam.curvature,
                    env.beam.shift,
                    env.err,
                    env.sink,
                );
                if rec.step(&out.pt, &refl).is_err() {
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
        if ray.x.r.abs() >= env.beam.box_r || ray.x.z >= env.beam.box_z {
            break;
        }
        if ray.num_top_bnc + ray.num_bot_bnc > env.beam.max_bounces {
            break;
        }
    }

    nsteps
}

fn warn_ssp<M: Medium2>(env: &TraceEnv2<'_, M>, err: &SspError) {
    match err {
        // a depth-index escape means the tables are inconsistent: fatal
        SspError::SegmentEscape { .. } => {
            env.err.raise_ssp_escape();
            env.sink.emit(&format!("fatal: {err}"));
        }
        _ => env.err.warn_ssp_box(env.sink, &format!("ray terminated: {err}")),
    }
}
