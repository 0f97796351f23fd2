//! Legacy output writers: `.ray` (text trajectories), `.shd` (record-based
//! binary pressure field), `.arr` (text arrival lists).

use std::fs::File;
use std::io::{BufWriter, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::field::{Outputs, RayTraj, TrajPoints, UField};
use crate::params::Params;
use crate::types::{Coherence, Real, RunMode, rad2deg};

/// Heading change (radians) that keeps a trajectory point at writeout.
const COMPRESS_TOL: Real = 2.0e-3;

/// Serialize the run's results next to the environment file.
pub fn writeout(params: &Params, outputs: &Outputs) -> std::io::Result<()> {
    match params.run {
        RunMode::Ray | RunMode::Eigen => write_ray_file(params, &outputs.rays),
        RunMode::Tl(coh) => match &outputs.field {
            Some(field) => write_shd_file(params, field, coh),
            None => Ok(()),
        },
        RunMode::Arrivals { .. } => write_arr_file(params, outputs),
    }
}

fn write_ray_file(params: &Params, rays: &[RayTraj]) -> std::io::Result<()> {
    let path = format!("{}.ray", params.file_root);
    let mut w = BufWriter::new(File::create(path)?);

    writeln!(w, "'{}'", params.title)?;
    writeln!(w, "{}", params.freq)?;
    writeln!(
        w,
        "{} {} {}",
        params.pos.sx.len(),
        params.pos.sy.len(),
        params.pos.sz.len()
    )?;
    writeln!(w, "{} {}", params.alpha.len(), params.beta.len())?;
    let (z_top, z_bot) = boundary_depths(params);
    writeln!(w, "{z_top}")?;
    writeln!(w, "{z_bot}")?;
    let coords = if params.dim.rays_3d() { "xyz" } else { "rz" };
    writeln!(w, "'{coords}'")?;

    for ray in rays {
        writeln!(w, "{:.6}", rad2deg(ray.alpha))?;
        match &ray.points {
            TrajPoints::Two(pts) => {
                let keep = compress_2d(pts);
                let (ntop, nbot) = pts
                    .last()
                    .map(|p| (p.num_top_bnc, p.num_bot_bnc))
                    .unwrap_or((0, 0));
                writeln!(w, "{} {} {}", keep.len(), ntop, nbot)?;
                for &i in &keep {
                    writeln!(w, "{:.6} {:.6}", pts[i].x.r, pts[i].x.z)?;
                }
            }
            TrajPoints::Three(pts) => {
                let (ntop, nbot) = pts
                    .last()
                    .map(|p| (p.num_top_bnc, p.num_bot_bnc))
                    .unwrap_or((0, 0));
                writeln!(w, "{} {} {}", pts.len(), ntop, nbot)?;
                for p in pts {
                    writeln!(w, "{:.6} {:.6} {:.6}", p.x.x, p.x.y, p.x.z)?;
                }
            }
        }
    }
    w.flush()
}

/// Keep the endpoints, every bounce, and every visible heading change.
fn compress_2d(pts: &[crate::ray::RayPt2]) -> Vec<usize> {
    if pts.len() <= 2 {
        return (0..pts.len()).collect();
    }
    let mut keep = vec![0usize];
    let mut last_heading = pts[0].t.z.atan2(pts[0].t.r);
    for (i, p) in pts.iter().enumerate().skip(1).take(pts.len() - 2) {
        let heading = p.t.z.atan2(p.t.r);
        let bounced = p.num_top_bnc != pts[i - 1].num_top_bnc
            || p.num_bot_bnc != pts[i - 1].num_bot_bnc;
        if bounced || (heading - last_heading).abs() > COMPRESS_TOL {
            keep.push(i);
            last_heading = heading;
        }
    }
    keep.push(pts.len() - 1);
    keep
}

fn boundary_depths(params: &Params) -> (Real, Real) {
    match &params.bdry {
        crate::params::BdryPair::Line { top, bot } => (top.node[0].z, bot.node[0].z),
        crate::params::BdryPair::Grid { top, bot } => (top.z[0], bot.z[0]),
    }
}

/// Record-based shade file; every record is `recl` 4-byte words, padded.
fn write_shd_file(params: &Params, field: &UField, coh: Coherence) -> std::io::Result<()> {
    let path = format!("{}.shd", params.file_root);
    let mut w = BufWriter::new(File::create(path)?);

    let nrr = field.nrr;
    let recl: usize = [
        41,
        2 * nrr,
        field.ntheta,
        params.pos.sx.len(),
        params.pos.sy.len(),
        params.pos.sz.len(),
        field.nrz,
    ]
    .into_iter()
    .max()
    .unwrap();

    let mut rec: Vec<u8> = Vec::with_capacity(recl * 4);

    // record 0: record length and title
    rec.write_i32::<LittleEndian>(recl as i32)?;
    let mut title = params.title.clone().into_bytes();
    title.resize(80, b' ');
    rec.extend_from_slice(&title);
    flush_record(&mut w, &mut rec, recl)?;

    // record 1: plot type
    rec.extend_from_slice(b"rectilin  ");
    flush_record(&mut w, &mut rec, recl)?;

    // record 2: dimensions and frequency
    for n in [
        1usize,
        field.ntheta,
        params.pos.sx.len(),
        params.pos.sy.len(),
        params.pos.sz.len(),
        field.nrz,
        nrr,
    ] {
        rec.write_i32::<LittleEndian>(n as i32)?;
    }
    rec.write_f64::<LittleEndian>(params.freq as f64)?;
    rec.write_f32::<LittleEndian>(0.0)?; // stabilizing attenuation
    flush_record(&mut w, &mut rec, recl)?;

    // records 3..9: frequency, bearings, source and receiver coordinates
    rec.write_f64::<LittleEndian>(params.freq as f64)?;
    flush_record(&mut w, &mut rec, recl)?;
    for list in [
        &params.beta.angles.iter().map(|&b| rad2deg(b)).collect::<Vec<_>>(),
        &params.pos.sx,
        &params.pos.sy,
        &params.pos.sz,
        &params.pos.rz,
        &params.pos.rr,
    ] {
        for &v in list.iter() {
            rec.write_f32::<LittleEndian>(v as f32)?;
        }
        flush_record(&mut w, &mut rec, recl)?;
    }

    // pressure records: one per (source, bearing, receiver depth)
    for isrc in 0..field.nsrc {
        for itheta in 0..field.ntheta {
            let base = field.slice_base(isrc, itheta);
            for irz in 0..field.nrz {
                for irr in 0..nrr {
                    let u = field.data[base + irz * nrr + irr];
                    let (re, im) = match coh {
                        Coherence::Coherent => (u.re, u.im),
                        // incoherent runs accumulate |u|²; store the RMS field
                        _ => (u.re.max(0.0).sqrt(), 0.0),
                    };
                    rec.write_f32::<LittleEndian>(re as f32)?;
                    rec.write_f32::<LittleEndian>(im as f32)?;
                }
                flush_record(&mut w, &mut rec, recl)?;
            }
        }
    }
    w.flush()
}

fn flush_record(w: &mut impl Write, rec: &mut Vec<u8>, recl: usize) -> std::io::Result<()> {
    debug_assert!(rec.len() <= recl * 4, "record overflow: {} > {}", rec.len(), recl * 4);
    rec.resize(recl * 4, 0);
    w.write_all(rec)?;
    rec.clear();
    Ok(())
}

fn write_arr_file(params: &Params, outputs: &Outputs) -> std::io::Result<()> {
    let arrivals = match &outputs.arrivals {
        Some(a) => a,
        None => return Ok(()),
    };
    let path = format!("{}.arr", params.file_root);
    let mut w = BufWriter::new(File::create(path)?);

    writeln!(w, "'{}'", if params.dim.ocean_3d() { "3D" } else { "2D" })?;
    writeln!(w, "{}", params.freq)?;
    write_counted(&mut w, &params.pos.sz)?;
    write_counted(&mut w, &params.pos.rz)?;
    write_counted(&mut w, &params.pos.rr)?;

    let nsrc = params.pos.n_sources();
    for isrc in 0..nsrc {
        let mut narrmx = 0usize;
        for itheta in 0..arrivals.ntheta {
            let base = arrivals.slice_base(isrc, itheta);
            for cell in 0..arrivals.nrz * arrivals.nrr {
                narrmx = narrmx.max(arrivals.lists[base + cell].len());
            }
        }
        writeln!(w, "{narrmx}")?;
        for itheta in 0..arrivals.ntheta {
            let base = arrivals.slice_base(isrc, itheta);
            for cell in 0..arrivals.nrz * arrivals.nrr {
                let list = &arrivals.lists[base + cell];
                writeln!(w, "{}", list.len())?;
                for a in list {
                    writeln!(
                        w,
                        "{:.6e} {:.4} {:.8} {:.8} {:.4} {:.4} {} {}",
                        a.amp,
                        rad2deg(a.phase),
                        a.delay.re,
                        a.delay.im,
                        rad2deg(a.src_angle),
                        rad2deg(a.rcv_angle),
                        a.num_top_bnc,
                        a.num_bot_bnc
                    )?;
                }
            }
        }
    }
    w.flush()
}

fn write_counted(w: &mut impl Write, list: &[Real]) -> std::io::Result<()> {
    writeln!(w, "{}", list.len())?;
    for v in list {
        write!(w, "{v} ")?;
    }
    writeln!(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ray::RayPt2;
    use crate::types::{Cpx, Vec2};

    fn pt(r: Real, z: Real, tr: Real, tz: Real) -> RayPt2 {
        RayPt2 {
            x: Vec2::new(r, z),
            t: Vec2::new(tr, tz),
            p: Cpx::new(1.0, 0.0),
            q: Cpx::new(0.0, 0.0),
            c: 1500.0,
            tau: Cpx::new(0.0, 0.0),
            amp: 1.0,
            phase: 0.0,
            num_top_bnc: 0,
            num_bot_bnc: 0,
        }
    }

    #[test]
    fn test_compress_keeps_straight_segments_sparse() {
        let pts: Vec<RayPt2> = (0..100).map(|i| pt(i as Real * 10.0, 50.0, 1.0, 0.0)).collect();
        let keep = compress_2d(&pts);
        assert_eq!(keep, vec![0, 99]);
    }

    #[test]
    fn test_compress_keeps_bounces() {
        let mut pts: Vec<RayPt2> = (0..10).map(|i| pt(i as Real * 10.0, 50.0, 1.0, 0.1)).collect();
        pts[5].num_bot_bnc = 1;
        for p in pts.iter_mut().skip(6) {
            p.num_bot_bnc = 1;
        }
        let keep = compress_2d(&pts);
        assert!(keep.contains(&5));
    }
}
