//! Integration tests for field accumulation and the run-level API.
//!
//! These tests verify:
//! - Single-thread runs are bit-identical when repeated
//! - A two-worker run reproduces the single-thread field bit for bit
//! - The memory budget fails a run cleanly and the setup/finalize cycle
//!   stays usable afterwards
//! - Arrivals carry consistent metadata

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use beamtrace::{DimMode, Init, NullSink, RunMode, finalize, run, setup};

fn write_file(dir: &Path, name: &str, text: &str) {
    let mut f = std::fs::File::create(dir.join(name)).unwrap();
    f.write_all(text.as_bytes()).unwrap();
}

const TL_ENV: &str = "\
'downward refracting TL case'
150.0
1
'CVW'
0 0.0 2000.0
0.0 1520.0 /
2000.0 1560.0 /
'A ' 0.0
2100.0 1600.0 0.0 1.8 /
1
100.0 /
30
50.0 1950.0 /
40
0.5 20.0 /
'C'
21
-12.0 12.0 /
0.0 2100.0 21.0
";

const ARR_ENV: &str = "\
'arrivals case'
150.0
1
'CVW'
0 0.0 1000.0
0.0 1500.0 /
1000.0 1500.0 /
'R ' 0.0
1
400.0 /
10
100.0 900.0 /
10
1.0 10.0 /
'A'
15
-14.0 14.0 /
0.0 1100.0 11.0
";

#[test]
fn test_single_thread_runs_are_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "tl.env", TL_ENV);
    let root = dir.path().join("tl").display().to_string();

    let init = Init { dim: DimMode::TwoD, num_threads: Some(1), ..Init::default() };
    let (params, mut outputs) = setup(&root, Some(Arc::new(NullSink)), &init).unwrap();
    run(&params, &mut outputs).unwrap();
    let first = outputs.field.as_ref().unwrap().data.clone();

    run(&params, &mut outputs).unwrap();
    let second = &outputs.field.as_ref().unwrap().data;

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert!(a.re.to_bits() == b.re.to_bits() && a.im.to_bits() == b.im.to_bits());
    }
    finalize(&params, &mut outputs);
}

#[test]
fn test_two_workers_match_single_thread_bitwise() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "tl.env", TL_ENV);
    let root = dir.path().join("tl").display().to_string();

    let init = Init { dim: DimMode::TwoD, num_threads: Some(1), ..Init::default() };
    let (mut params, mut outputs) = setup(&root, Some(Arc::new(NullSink)), &init).unwrap();
    run(&params, &mut outputs).unwrap();
    let serial = outputs.field.as_ref().unwrap().data.clone();
    assert!(serial.iter().any(|u| u.re != 0.0 || u.im != 0.0), "field is empty");

    params.num_threads = Some(2);
    run(&params, &mut outputs).unwrap();
    let parallel = &outputs.field.as_ref().unwrap().data;

    for (a, b) in serial.iter().zip(parallel.iter()) {
        assert!(
            a.re.to_bits() == b.re.to_bits() && a.im.to_bits() == b.im.to_bits(),
            "worker count changed the field"
        );
    }
    finalize(&params, &mut outputs);
}

#[test]
fn test_memory_budget_fails_run_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    // 2000 x 2001 receivers x 16 bytes > 64 MB before any ray is traced
    let env = TL_ENV
        .replace("30\n50.0 1950.0 /", "2000\n50.0 1950.0 /")
        .replace("40\n0.5 20.0 /", "2001\n0.5 20.0 /");
    write_file(dir.path(), "big.env", &env);
    let root = dir.path().join("big").display().to_string();

    let init = Init {
        dim: DimMode::TwoD,
        num_threads: Some(1),
        max_memory: 64_000_000,
    };
    let (params, mut outputs) = setup(&root, Some(Arc::new(NullSink)), &init).unwrap();
    assert!(run(&params, &mut outputs).is_err());

    // the params/outputs pair stays usable after finalize
    finalize(&params, &mut outputs);
    assert_eq!(params.mem.used(), 0);
    let (params2, mut outputs2) = setup(&root, Some(Arc::new(NullSink)), &init).unwrap();
    finalize(&params2, &mut outputs2);
}

#[test]
fn test_arrivals_metadata() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "arr.env", ARR_ENV);
    let root = dir.path().join("arr").display().to_string();

    let init = Init { dim: DimMode::TwoD, num_threads: Some(1), ..Init::default() };
    let (params, mut outputs) = setup(&root, Some(Arc::new(NullSink)), &init).unwrap();
    assert_eq!(params.run, RunMode::Arrivals { binary: false });
    run(&params, &mut outputs).unwrap();

    let arrivals = outputs.arrivals.as_ref().unwrap();
    let total: usize = arrivals.lists.iter().map(Vec::len).sum();
    assert!(total > 0, "no arrivals recorded");

    for list in &arrivals.lists {
        for a in list {
            assert!(a.amp > 0.0);
            assert!(a.delay.re > 0.0, "arrival with non-positive delay");
            // launch angles come from the fan
            assert!(params
                .alpha
                .angles
                .iter()
                .any(|&al| (al - a.src_angle).abs() < 1.0e-12));
            assert!(list.len() <= params.arr_cap);
        }
    }
    finalize(&params, &mut outputs);
}

#[test]
fn test_writeout_creates_legacy_files() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "tl.env", TL_ENV);
    let root = dir.path().join("tl").display().to_string();

    let init = Init { dim: DimMode::TwoD, num_threads: Some(1), ..Init::default() };
    let (params, mut outputs) = setup(&root, Some(Arc::new(NullSink)), &init).unwrap();
    run(&params, &mut outputs).unwrap();
    beamtrace::writeout(&params, &outputs).unwrap();

    let shd = dir.path().join("tl.shd");
    assert!(shd.exists());
    let bytes = std::fs::read(shd).unwrap();
    // record-structured: a whole number of 4-byte words, header present
    assert!(bytes.len() > 80);
    assert_eq!(bytes.len() % 4, 0);
    finalize(&params, &mut outputs);
}
