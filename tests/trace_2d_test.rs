//! Integration tests for the 2D tracer.
//!
//! These tests verify:
//! - A horizontal ray in a flat isospeed waveguide reaches the range box
//!   untouched
//! - Tangent scaling holds along refracted rays
//! - Tabulated reflection coefficients scale the amplitude
//! - The acousto-elastic coefficient matches the vertical-wavenumber form

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use beamtrace::boundary::Side;
use beamtrace::ray::{Direct2, Recorder2, TraceEnv2, Truncated, trace_ray2};
use beamtrace::types::{PI, deg2rad};
use beamtrace::{
    BeamInfo, Boundary2, Cpx, CurvatureFlag, DimMode, ErrState, HalfSpace, Init, NullSink, RayPt2,
    Real, RunMode, SspKind, SspTable, TrajPoints, Vec2, finalize, run, setup,
};

fn write_file(dir: &Path, name: &str, text: &str) {
    let mut f = std::fs::File::create(dir.join(name)).unwrap();
    f.write_all(text.as_bytes()).unwrap();
}

struct Collect(Vec<RayPt2>);

impl Recorder2 for Collect {
    fn launch(&mut self, pt: &RayPt2) -> Result<(), Truncated> {
        self.0.push(*pt);
        Ok(())
    }
    fn step(&mut self, _prev: &RayPt2, pt: &RayPt2) -> Result<(), Truncated> {
        self.0.push(*pt);
        Ok(())
    }
}

const FLAT_ENV: &str = "\
'flat 1500 waveguide'
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
10
1.0 100.0 /
'R'
1
0.0 /
0.0 5100.0 101.0
";

#[test]
fn test_flat_waveguide_horizontal_ray() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "flat.env", FLAT_ENV);
    let root = dir.path().join("flat").display().to_string();

    let init = Init { dim: DimMode::TwoD, num_threads: Some(1), ..Init::default() };
    let (params, mut outputs) = setup(&root, Some(Arc::new(NullSink)), &init).unwrap();
    assert_eq!(params.run, RunMode::Ray);
    run(&params, &mut outputs).unwrap();

    assert_eq!(outputs.rays.len(), 1);
    let TrajPoints::Two(pts) = &outputs.rays[0].points else {
        panic!("expected 2D points");
    };
    let last = pts.last().unwrap();
    assert!(last.x.r >= params.beam.box_r - 1.0e-6, "final range {}", last.x.r);
    assert_eq!(last.amp, 1.0);
    assert_eq!(last.num_top_bnc + last.num_bot_bnc, 0);
    assert!((last.x.z - 36.0).abs() < 1.0e-6);

    finalize(&params, &mut outputs);
    assert_eq!(params.mem.used(), 0);
}

#[test]
fn test_tangent_scaling_along_refracted_ray() {
    // strong gradient so the ray actually curves
    let ssp = SspTable::new(
        SspKind::CLinear,
        vec![0.0, 2000.0],
        vec![Cpx::new(1480.0, 0.0), Cpx::new(1560.0, 0.0)],
        vec![1.0, 1.0],
    )
    .unwrap();
    let top = Boundary2::flat(Side::Top, 0.0, HalfSpace::vacuum());
    let bot = Boundary2::flat(Side::Bottom, 2000.0, HalfSpace::rigid());
    let medium = Direct2 { ssp: &ssp };
    let err = ErrState::new();
    let beam = BeamInfo {
        curvature: CurvatureFlag::Standard,
        shift: false,
        deltas: 100.0,
        box_r: 30_000.0,
        box_z: 2000.0,
        max_steps: 5000,
        max_bounces: 50,
    };
    let env = TraceEnv2 {
        medium: &medium,
        top: &top,
        bot: &bot,
        refl_top: None,
        refl_bot: None,
        freq: 250.0,
        beam: &beam,
        ocean_3d: false,
        err: &err,
        sink: &NullSink,
    };

    let mut rec = Collect(Vec::new());
    trace_ray2(&env, Vec2::new(0.0, 800.0), deg2rad(5.0), &mut rec);
    assert!(rec.0.len() > 50);
    for pt in &rec.0 {
        let err_t = (pt.t.norm() * pt.c - 1.0).abs();
        assert!(err_t < 1.0e-3, "|t| c = 1 violated by {err_t}");
    }
}

#[test]
fn test_bounce_counters_are_exclusive() {
    let ssp = SspTable::new(
        SspKind::CLinear,
        vec![0.0, 1000.0],
        vec![Cpx::new(1500.0, 0.0); 2],
        vec![1.0, 1.0],
    )
    .unwrap();
    let top = Boundary2::flat(Side::Top, 0.0, HalfSpace::rigid());
    let bot = Boundary2::flat(Side::Bottom, 1000.0, HalfSpace::rigid());
    let medium = Direct2 { ssp: &ssp };
    let err = ErrState::new();
    let beam = BeamInfo {
        curvature: CurvatureFlag::Standard,
        shift: false,
        deltas: 200.0,
        box_r: 20_000.0,
        box_z: 1100.0,
        max_steps: 5000,
        max_bounces: 20,
    };
    let env = TraceEnv2 {
        medium: &medium,
        top: &top,
        bot: &bot,
        refl_top: None,
        refl_bot: None,
        freq: 100.0,
        beam: &beam,
        ocean_3d: false,
        err: &err,
        sink: &NullSink,
    };

    let mut rec = Collect(Vec::new());
    trace_ray2(&env, Vec2::new(0.0, 500.0), deg2rad(20.0), &mut rec);
    let last = rec.0.last().unwrap();
    assert!(last.num_top_bnc > 0 && last.num_bot_bnc > 0);

    // each reflection increments exactly one counter
    for pair in rec.0.windows(2) {
        let dt = pair[1].num_top_bnc - pair[0].num_top_bnc;
        let db = pair[1].num_bot_bnc - pair[0].num_bot_bnc;
        assert!(dt + db <= 1, "a single step bounced twice");
    }
}

#[test]
fn test_tabulated_cosine_reflection_scales_amplitude() {
    let dir = tempfile::tempdir().unwrap();
    // R(theta) = cos(theta), phi = 0
    let mut brc = String::from("91\n");
    for d in 0..=90 {
        brc.push_str(&format!("{d}.0 {:.8} 0.0\n", (d as Real).to_radians().cos()));
    }
    write_file(dir.path(), "cosr.brc", &brc);
    write_file(
        dir.path(),
        "cosr.env",
        "\
'cosine-coefficient bottom'
200.0
1
'CVW'
0 0.0 1000.0
0.0 1500.0 /
1000.0 1500.0 /
'F ' 0.0
1
500.0 /
2
0.0 1000.0 /
5
1.0 20.0 /
'R'
1
45.0 /
0.0 1100.0 30.0
",
    );
    let root = dir.path().join("cosr").display().to_string();

    let init = Init { dim: DimMode::TwoD, num_threads: Some(1), ..Init::default() };
    let (params, mut outputs) = setup(&root, Some(Arc::new(NullSink)), &init).unwrap();
    run(&params, &mut outputs).unwrap();

    let TrajPoints::Two(pts) = &outputs.rays[0].points else {
        panic!("expected 2D points");
    };
    let after = pts.iter().find(|p| p.num_bot_bnc == 1).unwrap();
    let expected = (PI / 4.0).cos();
    assert!(
        (after.amp - expected).abs() < 1.0e-6,
        "amp {} != cos(45 deg) {}",
        after.amp,
        expected
    );
}

#[test]
fn test_elastic_bottom_coefficient_matches_gamma_form() {
    // Munk-style analytic profile over an acousto-elastic half-space
    let ssp = SspTable::new(
        SspKind::Analytic,
        vec![0.0, 4500.0],
        vec![Cpx::new(0.0, 0.0); 2],
        vec![1.0, 1.0],
    )
    .unwrap();
    let top = Boundary2::flat(Side::Top, 0.0, HalfSpace::vacuum());
    let bot_hs = HalfSpace {
        cp: Cpx::new(1600.0, 0.0),
        cs: Cpx::new(0.0, 0.0),
        rho: 1.8,
        bc: beamtrace::BcTag::AcoustoElastic,
    };
    let bot = Boundary2::flat(Side::Bottom, 4500.0, bot_hs);
    let medium = Direct2 { ssp: &ssp };
    let err = ErrState::new();
    let freq = 50.0;
    let beam = BeamInfo {
        curvature: CurvatureFlag::Standard,
        shift: false,
        deltas: 200.0,
        box_r: 100_000.0,
        box_z: 4600.0,
        max_steps: 20_000,
        max_bounces: 1,
    };
    let env = TraceEnv2 {
        medium: &medium,
        top: &top,
        bot: &bot,
        refl_top: None,
        refl_bot: None,
        freq,
        beam: &beam,
        ocean_3d: false,
        err: &err,
        sink: &NullSink,
    };

    let mut rec = Collect(Vec::new());
    trace_ray2(&env, Vec2::new(0.0, 1000.0), deg2rad(30.0), &mut rec);

    let ihit = rec.0.iter().position(|p| p.num_bot_bnc == 1).unwrap();
    let landing = &rec.0[ihit - 1];
    let bounced = &rec.0[ihit];
    assert!((landing.x.z - 4500.0).abs() < 1.0e-6);

    // |R| from the vertical-wavenumber (gamma) form at the landing state
    let omega = 2.0 * PI * freq;
    let gk = omega * landing.t.r; // omega * Tg with the 1/c-scaled tangent
    let g1sq = (omega / landing.c) * (omega / landing.c) - gk * gk;
    let g2sq = (omega / 1600.0) * (omega / 1600.0) - gk * gk;
    let gamma1 = Cpx::new(g1sq, 0.0).sqrt();
    let gamma2 = Cpx::new(g2sq, 0.0).sqrt();
    let expected = ((1.8 * gamma1 - 1.0 * gamma2) / (1.8 * gamma1 + 1.0 * gamma2)).norm();

    let got = bounced.amp / landing.amp;
    assert!(
        (got - expected).abs() < 1.0e-6,
        "|R| = {got}, gamma form gives {expected}"
    );
}
