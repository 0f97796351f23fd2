//! Parallel job dispatch and deterministic reduction.
//!
//! Jobs are the Cartesian product of sources and launch angles, handed out
//! by an atomic counter. Workers trace independently into per-job deltas;
//! the deltas are folded into the shared outputs in job order after the
//! join, which makes the result independent of the worker count. A fatal
//! error observed by any worker makes the rest drain at their next job pick.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::RunError;
use crate::field::{
    Arrival, Arrivals, EigenHit, EigenHits, Gather, Influence2, Influence3, InfluenceCfg, JobOut,
    Outputs, RayTraj, Traj2, Traj3, TrajPoints, UField, WorkerScratch,
};
use crate::params::{BdryPair, Params};
use crate::ray::{
    Direct2, RadialSlice, TraceEnv2, TraceEnv3, radial_boundary, trace_ray2, trace_ray3,
};
use crate::types::{Cpx, DimMode, RunMode, Vec2};

/// Execute the run described by `params` into `outputs`.
pub fn run(params: &Params, outputs: &mut Outputs) -> Result<(), RunError> {
    params.err.reset();
    params.mem.reset();
    outputs.clear();
    prepare_outputs(params, outputs)?;

    let cfg = influence_cfg(params);
    let njobs = params.n_jobs();
    let results = parallel_phase(params, njobs, |job, scratch| run_job(params, &cfg, job, scratch))?;
    fold(params, outputs, results);

    params
        .err
        .check_report(params.sink.as_ref(), params.mem.budget())?;

    if params.run == RunMode::Eigen {
        post_process_eigenrays(params, outputs)?;
    }
    Ok(())
}

fn influence_cfg(params: &Params) -> InfluenceCfg {
    InfluenceCfg {
        rz: params.pos.rz.clone(),
        rr: params.pos.rr.clone(),
        theta: params.beta.angles.clone(),
        freq: params.freq,
        dalpha: params.alpha.spacing.max(1.0e-6),
        dbeta: params.beta.spacing,
    }
}

fn prepare_outputs(params: &Params, outputs: &mut Outputs) -> Result<(), RunError> {
    let nsrc = params.pos.n_sources();
    let ntheta = params.beta.len();
    let (nrz, nrr) = (params.pos.rz.len(), params.pos.rr.len());
    match params.run {
        RunMode::Ray => {}
        RunMode::Tl(_) => {
            let cells = nsrc * ntheta * nrz * nrr;
            params.mem.charge(cells * std::mem::size_of::<Cpx>())?;
            outputs.field = Some(UField::new(nsrc, ntheta, nrz, nrr));
        }
        RunMode::Eigen => {
            let memsize = params.eigen_memsize;
            params.mem.charge(memsize * std::mem::size_of::<EigenHit>())?;
            outputs.eigen = Some(EigenHits { hits: Vec::new(), memsize, neigen: 0 });
        }
        RunMode::Arrivals { .. } => {
            let nrcvr = nsrc * ntheta * nrz * nrr;
            params.mem.charge(nrcvr * params.arr_cap * std::mem::size_of::<Arrival>())?;
            outputs.arrivals = Some(Arrivals::new(nsrc, ntheta, nrz, nrr, params.arr_cap));
        }
    }
    Ok(())
}

/// Run `njobs` jobs over a counter-dispatched worker pool; the collected
/// `(job, delta)` pairs come back sorted by job index.
fn parallel_phase<F>(params: &Params, njobs: usize, work: F) -> Result<Vec<(usize, JobOut)>, RunError>
where
    F: Fn(usize, &mut WorkerScratch) -> JobOut + Sync,
{
    let nw = params.num_workers();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(nw)
        .build()
        .map_err(|e| RunError::Pool(e.to_string()))?;

    let slice_len = params.pos.rz.len() * params.pos.rr.len();
    let counter = AtomicUsize::new(0);
    let collected: Mutex<Vec<(usize, JobOut)>> = Mutex::new(Vec::new());

    tracing::debug!(target: "beamtrace", njobs, workers = nw, "dispatching jobs");
    pool.scope(|s| {
        for _ in 0..nw {
            s.spawn(|_| {
                let mut scratch = WorkerScratch::new(slice_len);
                let mut local: Vec<(usize, JobOut)> = Vec::new();
                loop {
                    let job = counter.fetch_add(1, Ordering::Relaxed);
                    if job >= njobs || params.err.fatal() {
                        break;
                    }
                    local.push((job, work(job, &mut scratch)));
                }
                collected.lock().unwrap().extend(local);
            });
        }
    });

    let mut results = collected.into_inner().unwrap();
    results.sort_by_key(|r| r.0);
    Ok(results)
}

/// Trace the ray of one `(source, bearing, elevation)` job and package its
/// output delta. `traj_only` forces trajectory capture (eigen retrace).
fn trace_job(
    params: &Params,
    cfg: &InfluenceCfg,
    (isrc, ibeta, ialpha): (usize, usize, usize),
    traj_only: bool,
    scratch: &mut WorkerScratch,
) -> JobOut {
    let alpha = params.alpha.angles[ialpha];
    let beta = params.beta.angles[ibeta];
    let src = params.pos.source(isrc);

    let gather = if traj_only {
        None
    } else {
        match params.run {
            RunMode::Tl(c) => Some(Gather::Tl(c)),
            RunMode::Arrivals { .. } => Some(Gather::Arrivals),
            RunMode::Eigen => Some(Gather::Eigen),
            RunMode::Ray => None,
        }
    };

    let traj = |points: TrajPoints| {
        JobOut::Traj(RayTraj { isrc, ialpha, ibeta, alpha, beta, points })
    };

    match (&params.bdry, params.dim) {
        (BdryPair::Line { top, bot }, _) => {
            let medium = Direct2 { ssp: &params.ssp };
            let env = TraceEnv2 {
                medium: &medium,
                top,
                bot,
                refl_top: params.refl_top.as_ref(),
                refl_bot: params.refl_bot.as_ref(),
                freq: params.freq,
                beam: &params.beam,
                ocean_3d: false,
                err: &params.err,
                sink: params.sink.as_ref(),
            };
            let src2 = Vec2::new(0.0, src.z);
            match gather {
                None => {
                    let mut rec = Traj2::new(&params.mem);
                    trace_ray2(&env, src2, alpha, &mut rec);
                    traj(TrajPoints::Two(rec.finish().0))
                }
                Some(g) => {
                    let mut rec = Influence2::new(g, cfg, scratch, (isrc, ialpha, ibeta), alpha);
                    trace_ray2(&env, src2, alpha, &mut rec);
                    rec.finish()
                }
            }
        }
        (BdryPair::Grid { top, bot }, DimMode::Nx2D) => {
            let tradial = (beta.cos(), beta.sin());
            let origin = (src.x, src.y);
            let top2 = radial_boundary(top, origin, tradial, params.beam.box_r);
            let bot2 = radial_boundary(bot, origin, tradial, params.beam.box_r);
            let medium = RadialSlice { ssp: &params.ssp, origin, tradial };
            let env = TraceEnv2 {
                medium: &medium,
                top: &top2,
                bot: &bot2,
                refl_top: params.refl_top.as_ref(),
                refl_bot: params.refl_bot.as_ref(),
                freq: params.freq,
                beam: &params.beam,
                ocean_3d: true,
                err: &params.err,
                sink: params.sink.as_ref(),
            };
            let src2 = Vec2::new(0.0, src.z);
            match gather {
                None => {
                    let mut rec = Traj2::new(&params.mem);
                    trace_ray2(&env, src2, alpha, &mut rec);
                    traj(TrajPoints::Two(rec.finish().0))
                }
                Some(g) => {
                    let mut rec = Influence2::new(g, cfg, scratch, (isrc, ialpha, ibeta), alpha);
                    trace_ray2(&env, src2, alpha, &mut rec);
                    rec.finish()
                }
            }
        }
        (BdryPair::Grid { top, bot }, _) => {
            let env = TraceEnv3 {
                ssp: &params.ssp,
                top,
                bot,
                refl_top: params.refl_top.as_ref(),
                refl_bot: params.refl_bot.as_ref(),
                freq: params.freq,
                beam: &params.beam,
                err: &params.err,
                sink: params.sink.as_ref(),
            };
            match gather {
                None => {
                    let mut rec = Traj3::new(&params.mem);
                    trace_ray3(&env, src, alpha, beta, &mut rec);
                    traj(TrajPoints::Three(rec.finish().0))
                }
                Some(g) => {
                    let mut rec =
                        Influence3::new(g, cfg, scratch, (isrc, ialpha, ibeta), alpha, (src.x, src.y));
                    trace_ray3(&env, src, alpha, beta, &mut rec);
                    rec.finish()
                }
            }
        }
    }
}

fn run_job(params: &Params, cfg: &InfluenceCfg, job: usize, scratch: &mut WorkerScratch) -> JobOut {
    let (isrc, ibeta, ialpha) = params.job_indices(job);
    trace_job(params, cfg, (isrc, ibeta, ialpha), false, scratch)
}

/// Fold per-job deltas into the shared outputs, in job order.
fn fold(params: &Params, outputs: &mut Outputs, results: Vec<(usize, JobOut)>) {
    for (job, out) in results {
        let (isrc, ibeta, _ialpha) = params.job_indices(job);
        match out {
            JobOut::Empty => {}
            JobOut::Traj(t) => outputs.rays.push(t),
            JobOut::Tl(cells) => {
                if let Some(field) = outputs.field.as_mut() {
                    let base = field.slice_base(isrc, ibeta);
                    for (cell, v) in cells {
                        field.data[base + cell as usize] += v;
                    }
                }
            }
            JobOut::Eigen(hits) => {
                if let Some(store) = outputs.eigen.as_mut() {
                    for hit in hits {
                        store.push(hit, &params.err);
                    }
                }
            }
            JobOut::Arr(list) => {
                if let Some(arr) = outputs.arrivals.as_mut() {
                    let base = arr.slice_base(isrc, ibeta);
                    for (cell, a) in list {
                        arr.push(base + cell as usize, a, &params.err);
                    }
                }
            }
        }
    }
}

/// Second parallel pass: fill in the trajectories of the recorded hits.
fn post_process_eigenrays(params: &Params, outputs: &mut Outputs) -> Result<(), RunError> {
    let store = match outputs.eigen.as_ref() {
        Some(s) => s,
        None => return Ok(()),
    };
    if store.neigen > store.memsize {
        params.sink.emit(&format!(
            "would have had {} eigenrays but only {} fit in memory",
            store.neigen, store.memsize
        ));
    } else {
        params.sink.emit(&format!("{} eigenrays", store.neigen));
    }

    let cfg = influence_cfg(params);
    let hits = store.hits.clone();
    let results = parallel_phase(params, hits.len(), |job, scratch| {
        let hit = &hits[job];
        trace_job(params, &cfg, (hit.isrc, hit.ibeta, hit.ialpha), true, scratch)
    })?;
    for (_, out) in results {
        if let JobOut::Traj(t) = out {
            outputs.rays.push(t);
        }
    }

    params
        .err
        .check_report(params.sink.as_ref(), params.mem.budget())
}
