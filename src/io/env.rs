//! Environment-file loader.
//!
//! Reads `<FileRoot>.env` and its neighbors (`.ssp`, `.bty`, `.ati`,
//! `.brc`, `.trc`) into a [`Params`] snapshot. The format is the classic
//! whitespace-tolerant record layout: title, frequency, media count, top
//! option string (SSP kind, top condition, attenuation units, `*`/`~` for
//! altimetry), SSP nodes to the bottom depth, bottom option string and
//! half-space, source/receiver vectors (the two-value `/` shorthand fills
//! evenly spaced lists), run type, launch-angle fans, and the step/box
//! record. 3D oceans add source x/y blocks and a bearing fan.

use std::path::Path;
use std::sync::Arc;

use crate::boundary::{BcTag, Boundary2, Boundary3, HalfSpace, Side};
use crate::error::{ErrState, MemTracker, SetupError};
use crate::params::{AngleFan, BdryPair, Params, PosInfo};
use crate::prt::LogSink;
use crate::ray::BeamInfo;
use crate::reflect::{CurvatureFlag, ReflCoef, ReflTable};
use crate::ssp::{HexGrid, QuadGrid, SspKind, SspTable};
use crate::types::{Cpx, DimMode, PI, Real, RunMode, Vec2, deg2rad};

use super::ldi::LdiFile;

const KM: Real = 1000.0;
/// dB per neper.
const DB_PER_NEPER: Real = 8.685_889_638;

/// Attenuation value + unit → complex sound speed.
///
/// The imaginary part uses the weak-absorption relation `Im c = α c² / ω`
/// with α in nepers per meter.
pub fn crci(c: Real, alpha: Real, unit: char, freq: Real) -> Cpx {
    if alpha == 0.0 || c == 0.0 {
        return Cpx::new(c, 0.0);
    }
    let omega = 2.0 * PI * freq;
    let alpha_npm = match unit {
        'N' => alpha,
        'M' => alpha / DB_PER_NEPER,
        'F' => alpha * freq / 1000.0 / DB_PER_NEPER,
        'W' => alpha * freq / c / DB_PER_NEPER,
        'Q' => {
            if alpha > 0.0 {
                PI * freq / (c * alpha)
            } else {
                0.0
            }
        }
        _ => 0.0,
    };
    Cpx::new(c, alpha_npm * c * c / omega)
}

fn opt_chars(s: &str) -> Vec<char> {
    let mut v: Vec<char> = s.chars().collect();
    while v.len() < 6 {
        v.push(' ');
    }
    v
}

fn read_halfspace(
    f: &mut LdiFile,
    bc: BcTag,
    unit: char,
    freq: Real,
) -> Result<HalfSpace, SetupError> {
    match bc {
        BcTag::AcoustoElastic | BcTag::Grab => {
            let mut rec = f.record()?;
            let name = f.name.clone();
            let _z = rec.real(&name, "half-space depth")?;
            let cp = rec.real(&name, "half-space cp")?;
            let cs = rec.real_or(&name, "half-space cs", 0.0)?;
            let rho = rec.real_or(&name, "half-space rho", 1.0)?;
            let ap = rec.real_or(&name, "half-space p-attenuation", 0.0)?;
            let asv = rec.real_or(&name, "half-space s-attenuation", 0.0)?;
            Ok(HalfSpace { cp: crci(cp, ap, unit, freq), cs: crci(cs, asv, unit, freq), rho, bc })
        }
        _ => Ok(HalfSpace { cp: Cpx::new(0.0, 0.0), cs: Cpx::new(0.0, 0.0), rho: 1.0, bc }),
    }
}

fn counted_vector(f: &mut LdiFile, what: &str) -> Result<Vec<Real>, SetupError> {
    let name = f.name.clone();
    let n = f.record()?.usize(&name, what)?;
    f.real_vector(n, what)
}

/// Read a reflection-coefficient file; `phi` converts degrees → radians.
pub fn read_refl_file(path: &Path) -> Result<ReflTable, SetupError> {
    let mut f = LdiFile::open(path)?;
    let name = f.name.clone();
    let n = f.record()?.usize(&name, "table size")?;
    let mut rows = Vec::with_capacity(n);
    for _ in 0..n {
        let mut rec = f.record()?;
        rows.push(ReflCoef {
            theta: rec.real(&name, "theta")?,
            r: rec.real(&name, "|R|")?,
            phi: deg2rad(rec.real(&name, "phi")?),
        });
    }
    ReflTable::new(rows)
}

/// Read a 2D boundary polyline (`.bty` / `.ati`).
pub fn read_boundary_2d(path: &Path, side: Side, hs: HalfSpace) -> Result<Boundary2, SetupError> {
    let mut f = LdiFile::open(path)?;
    let name = f.name.clone();
    let _interp = f.record()?.str(&name, "interpolation flag")?;
    let n = f.record()?.usize(&name, "point count")?;
    let mut nodes = Vec::with_capacity(n + 2);
    for _ in 0..n {
        let mut rec = f.record()?;
        let r = rec.real(&name, "range")? * KM;
        let z = rec.real(&name, "depth")?;
        nodes.push(Vec2::new(r, z));
    }
    // extend flat beyond the tabulated ends, as for the default boundaries
    if let (Some(first), Some(last)) = (nodes.first().copied(), nodes.last().copied()) {
        const BIG: Real = 1.0e9;
        nodes.insert(0, Vec2::new(-BIG, first.z));
        nodes.push(Vec2::new(BIG, last.z));
    }
    Boundary2::from_nodes(side, nodes, hs)
}

/// Read a 3D boundary grid (`.bty` / `.ati` in the rectangular layout).
pub fn read_boundary_3d(path: &Path, side: Side, hs: HalfSpace) -> Result<Boundary3, SetupError> {
    let mut f = LdiFile::open(path)?;
    let name = f.name.clone();
    let _interp = f.record()?.str(&name, "grid flag")?;
    let xs: Vec<Real> = counted_vector(&mut f, "x coordinates")?.iter().map(|v| v * KM).collect();
    let ys: Vec<Real> = counted_vector(&mut f, "y coordinates")?.iter().map(|v| v * KM).collect();
    let mut z = Vec::with_capacity(xs.len() * ys.len());
    for _ in 0..ys.len() {
        let row = f.real_vector(xs.len(), "depth row")?;
        z.extend(row);
    }
    Boundary3::from_grid(side, xs, ys, z, hs)
}

/// Read the range-dependent sound-speed matrix (`.ssp`).
fn read_quad(path: &Path, z: &[Real]) -> Result<QuadGrid, SetupError> {
    let mut f = LdiFile::open(path)?;
    let r: Vec<Real> = counted_vector(&mut f, "profile ranges")?.iter().map(|v| v * KM).collect();
    let mut c = Vec::with_capacity(r.len() * z.len());
    for _ in 0..z.len() {
        c.extend(f.real_vector(r.len(), "sound-speed row")?);
    }
    QuadGrid::new(r, c, z)
}

/// Read the 3D sound-speed grid (`.ssp` in the hexahedral layout).
fn read_hex(path: &Path, nz: usize) -> Result<HexGrid, SetupError> {
    let mut f = LdiFile::open(path)?;
    let xs: Vec<Real> = counted_vector(&mut f, "grid x")?.iter().map(|v| v * KM).collect();
    let ys: Vec<Real> = counted_vector(&mut f, "grid y")?.iter().map(|v| v * KM).collect();
    let mut c = Vec::with_capacity(xs.len() * ys.len() * nz);
    for _ in 0..nz {
        for _ in 0..ys.len() {
            c.extend(f.real_vector(xs.len(), "sound-speed row")?);
        }
    }
    HexGrid::new(xs, ys, c, nz)
}

/// Load `<file_root>.env` and neighbors into a parameter snapshot.
pub fn load(
    file_root: &str,
    dim: DimMode,
    sink: Arc<dyn LogSink>,
    num_threads: Option<usize>,
    max_memory: usize,
) -> Result<Params, SetupError> {
    let env_path = format!("{file_root}.env");
    let mut f = LdiFile::open(Path::new(&env_path))?;
    let name = f.name.clone();

    let title = f.record()?.str(&name, "title")?;
    let freq = f.record()?.real(&name, "frequency")?;
    let nmedia = f.record()?.usize(&name, "NMedia")?;
    if nmedia != 1 {
        return Err(SetupError::MultipleMedia(nmedia));
    }

    // top option string
    let mut rec = f.record()?;
    let topopt = rec.str(&name, "top options")?;
    let top_chars = opt_chars(&topopt);
    let ssp_kind = SspKind::from_char(top_chars[0])?;
    let top_bc = BcTag::from_char(top_chars[1])?;
    let atten_unit = top_chars[2];
    let read_ati = topopt.contains('*') || topopt.contains('~');
    let top_hs = read_halfspace(&mut f, top_bc, atten_unit, freq)?;

    // SSP block
    let mut rec = f.record()?;
    let _nmesh = rec.usize(&name, "SSP point count")?;
    let _sigma = rec.real_or(&name, "roughness", 0.0)?;
    let depth_b = rec.real(&name, "bottom depth")?;
    let mut z = Vec::new();
    let mut c = Vec::new();
    let mut rho = Vec::new();
    loop {
        let mut rec = f.record()?;
        let zv = rec.real(&name, "SSP depth")?;
        let cv = rec.real(&name, "SSP speed")?;
        let _cs = rec.real_or(&name, "SSP shear", 0.0)?;
        let rv = rec.real_or(&name, "SSP density", *rho.last().unwrap_or(&1.0))?;
        let ap = rec.real_or(&name, "SSP attenuation", 0.0)?;
        z.push(zv);
        c.push(crci(cv, ap, atten_unit, freq));
        rho.push(rv);
        if zv >= depth_b - 1.0e-9 {
            break;
        }
    }

    // bottom option string and half-space
    let mut rec = f.record()?;
    let botopt = rec.str(&name, "bottom options")?;
    let bot_chars = opt_chars(&botopt);
    let bot_bc = BcTag::from_char(bot_chars[0])?;
    let read_bty = botopt.contains('*') || botopt.contains('~');
    let bot_hs = read_halfspace(&mut f, bot_bc, atten_unit, freq)?;

    // sources and receivers
    let sz = counted_vector(&mut f, "source depths")?;
    let rz = counted_vector(&mut f, "receiver depths")?;
    let rr: Vec<Real> = counted_vector(&mut f, "receiver ranges")?.iter().map(|v| v * KM).collect();
    let (sx, sy) = if dim.ocean_3d() {
        let sx: Vec<Real> = counted_vector(&mut f, "source x")?.iter().map(|v| v * KM).collect();
        let sy: Vec<Real> = counted_vector(&mut f, "source y")?.iter().map(|v| v * KM).collect();
        (sx, sy)
    } else {
        (vec![0.0], vec![0.0])
    };
    if sz.is_empty() {
        return Err(SetupError::EmptyVector("source depths"));
    }

    // run type
    let runtype = f.record()?.str(&name, "run type")?;
    let run_char = runtype.chars().next().unwrap_or(' ');
    let run = RunMode::from_char(run_char).ok_or(SetupError::UnknownRunType(run_char))?;
    if matches!(run, RunMode::Tl(_) | RunMode::Arrivals { .. } | RunMode::Eigen)
        && (rz.is_empty() || rr.is_empty())
    {
        return Err(SetupError::EmptyVector("receiver grid"));
    }

    // angle fans
    let nalpha = f.record()?.usize(&name, "Nalpha")?;
    let mut rec = f.record()?;
    let a1 = rec.real(&name, "alpha1")?;
    let a2 = rec.real_or(&name, "alpha2", a1)?;
    let alpha = AngleFan::from_degrees(nalpha.max(1), a1, a2);
    let beta = if dim.ocean_3d() {
        let nbeta = f.record()?.usize(&name, "Nbeta")?;
        let mut rec = f.record()?;
        let b1 = rec.real(&name, "beta1")?;
        let b2 = rec.real_or(&name, "beta2", b1)?;
        AngleFan::from_degrees(nbeta.max(1), b1, b2)
    } else {
        AngleFan::single(0.0)
    };

    // step size and ray box
    let mut rec = f.record()?;
    let deltas = rec.real(&name, "step size")?;
    let box_z = rec.real(&name, "box depth")?;
    let box_r = rec.real(&name, "box range")? * KM;

    // optional beam-interpretation record: curvature flag + shift flag
    let mut curvature = CurvatureFlag::Standard;
    let mut shift = false;
    if f.peek_more() {
        let mut rec = f.record()?;
        if !rec.is_empty() {
            let flags = rec.str(&name, "beam flags")?;
            let mut it = flags.chars();
            curvature = CurvatureFlag::from_char(it.next().unwrap_or('S'));
            shift = it.next() == Some('S');
        }
    }

    let beam = BeamInfo {
        curvature,
        shift,
        deltas: if deltas > 0.0 { deltas } else { (depth_b - z[0]).abs() / 10.0 },
        box_r,
        box_z,
        max_steps: 100_000,
        max_bounces: 100_000,
    };

    // profile table and neighbors
    let mut ssp = SspTable::new(ssp_kind, z.clone(), c, rho)?;
    match ssp_kind {
        SspKind::Quad => {
            let grid = read_quad(Path::new(&format!("{file_root}.ssp")), &z)?;
            ssp = ssp.with_quad(grid);
        }
        SspKind::Hexahedral => {
            let grid = read_hex(Path::new(&format!("{file_root}.ssp")), z.len())?;
            ssp = ssp.with_hex(grid);
        }
        _ => {}
    }

    let z_top = z[0];
    let bdry = if dim.ocean_3d() {
        let top = if read_ati {
            read_boundary_3d(Path::new(&format!("{file_root}.ati")), Side::Top, top_hs)?
        } else {
            Boundary3::flat(Side::Top, z_top, top_hs)
        };
        let bot = if read_bty {
            read_boundary_3d(Path::new(&format!("{file_root}.bty")), Side::Bottom, bot_hs)?
        } else {
            Boundary3::flat(Side::Bottom, depth_b, bot_hs)
        };
        BdryPair::Grid { top, bot }
    } else {
        let top = if read_ati {
            read_boundary_2d(Path::new(&format!("{file_root}.ati")), Side::Top, top_hs)?
        } else {
            Boundary2::flat(Side::Top, z_top, top_hs)
        };
        let bot = if read_bty {
            read_boundary_2d(Path::new(&format!("{file_root}.bty")), Side::Bottom, bot_hs)?
        } else {
            Boundary2::flat(Side::Bottom, depth_b, bot_hs)
        };
        BdryPair::Line { top, bot }
    };

    // tabulated reflection coefficients; assignment replaces any
    // previously-loaded table unconditionally
    let refl_top = if top_bc == BcTag::File {
        Some(read_refl_file(Path::new(&format!("{file_root}.trc")))?)
    } else {
        None
    };
    let refl_bot = if bot_bc == BcTag::File {
        Some(read_refl_file(Path::new(&format!("{file_root}.brc")))?)
    } else {
        None
    };

    sink.emit(&format!("{title}"));
    sink.emit(&format!("frequency = {freq} Hz, {} rays", alpha.len() * beta.len()));

    Ok(Params {
        file_root: file_root.to_string(),
        title,
        freq,
        dim,
        run,
        ssp,
        bdry,
        refl_top,
        refl_bot,
        pos: PosInfo { sx, sy, sz, rz, rr },
        alpha,
        beta,
        beam,
        num_threads,
        arr_cap: 200,
        eigen_memsize: 200_000,
        sink,
        err: ErrState::new(),
        mem: MemTracker::new(max_memory),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prt::NullSink;
    use approx::assert_relative_eq;
    use std::io::Write;

    fn write_env(dir: &Path, root: &str, text: &str) -> String {
        let path = dir.join(format!("{root}.env"));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        dir.join(root).display().to_string()
    }

    const FLAT_ENV: &str = "\
'flat waveguide'
1500.0
1
'CVW'
0 0.0 5000.0
0.0 1500.0 /
5000.0 1500.0 /
'R ' 0.0
1
36.0 /
2
0.0 5000.0 /
50
0.0 100.0 /
'R'
1
0.0 /
0.0 5100.0 101.0
";

    #[test]
    fn test_load_flat_env() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_env(dir.path(), "flat", FLAT_ENV);
        let p = load(&root, DimMode::TwoD, Arc::new(NullSink), None, 1 << 30).unwrap();
        assert_eq!(p.title, "flat waveguide");
        assert_eq!(p.freq, 1500.0);
        assert_eq!(p.run, RunMode::Ray);
        assert_eq!(p.ssp.kind, SspKind::CLinear);
        assert_eq!(p.pos.sz, vec![36.0]);
        assert_eq!(p.pos.rr.len(), 50);
        assert_relative_eq!(p.pos.rr[49], 100.0 * KM, epsilon = 1e-6);
        assert_eq!(p.alpha.len(), 1);
        assert_relative_eq!(p.beam.box_r, 101.0 * KM, epsilon = 1e-6);
        match &p.bdry {
            BdryPair::Line { bot, .. } => assert_eq!(bot.hs.bc, BcTag::Rigid),
            _ => panic!("expected 2D boundaries"),
        }
    }

    #[test]
    fn test_internal_reflection_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let env = FLAT_ENV.replace("'R ' 0.0", "'P ' 0.0");
        let root = write_env(dir.path(), "badp", &env);
        let out = load(&root, DimMode::TwoD, Arc::new(NullSink), None, 1 << 30);
        assert!(matches!(out, Err(SetupError::InternalReflection)));
    }

    #[test]
    fn test_multiple_media_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let env = FLAT_ENV.replace("\n1\n'CVW'", "\n2\n'CVW'");
        let root = write_env(dir.path(), "badm", &env);
        let out = load(&root, DimMode::TwoD, Arc::new(NullSink), None, 1 << 30);
        assert!(matches!(out, Err(SetupError::MultipleMedia(2))));
    }

    #[test]
    fn test_crci_db_per_lambda() {
        let c = crci(1600.0, 0.5, 'W', 100.0);
        assert_eq!(c.re, 1600.0);
        // Im c = alpha_npm c^2 / omega with alpha_npm = a f / (c dBperNep)
        let expect = 0.5 * 100.0 / (1600.0 * DB_PER_NEPER) * 1600.0 * 1600.0
            / (2.0 * PI * 100.0);
        assert_relative_eq!(c.im, expect, epsilon = 1e-9);
    }

    #[test]
    fn test_crci_zero_attenuation() {
        assert_eq!(crci(1500.0, 0.0, 'W', 50.0), Cpx::new(1500.0, 0.0));
    }
}
