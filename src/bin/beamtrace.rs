//! Command-line front end.
//!
//! `beamtrace <FileRoot> [--2D | --Nx2D | --3D] [--1] [--mem=SIZE] [--gpu=N]`
//! runs setup → run → writeout → finalize on `<FileRoot>.env` and exits 0 on
//! success, 1 on any fatal error.

use clap::{Arg, ArgAction, ArgGroup, Command};

use beamtrace::{DimMode, Init, finalize, run, setup, writeout};

fn cli() -> Command {
    Command::new("beamtrace")
        .about("Underwater-acoustic Gaussian-beam / ray-tracing simulator")
        .arg(Arg::new("FileRoot").required(true).help("Path to the .env file, without extension"))
        .arg(
            Arg::new("singlethread")
                .long("1")
                .visible_alias("singlethread")
                .action(ArgAction::SetTrue)
                .help("Force the worker count to 1"),
        )
        .arg(
            Arg::new("dim2")
                .long("2")
                .visible_alias("2D")
                .action(ArgAction::SetTrue)
                .help("2D mode"),
        )
        .arg(
            Arg::new("nx2d")
                .long("Nx2D")
                .visible_aliases(["2D3D", "2.5D", "4"])
                .action(ArgAction::SetTrue)
                .help("Nx2D mode (3D ocean, 2D ray fans)"),
        )
        .arg(
            Arg::new("dim3")
                .long("3")
                .visible_alias("3D")
                .action(ArgAction::SetTrue)
                .help("Full 3D mode"),
        )
        .group(ArgGroup::new("dim").args(["dim2", "nx2d", "dim3"]).multiple(false))
        .arg(
            Arg::new("gpu")
                .long("gpu")
                .value_name("INDEX")
                .help("GPU index (GPU builds only)"),
        )
        .arg(
            Arg::new("mem")
                .long("mem")
                .visible_alias("memory")
                .value_name("SIZE")
                .help("Memory budget, e.g. 64M, 8GiB, 500000000"),
        )
}

/// `<N>[k|K|M|G][i][B|b]`; `i` selects base 1024.
fn parse_mem_size(s: &str) -> Option<usize> {
    let mut v = s;
    if let Some(stripped) = v.strip_suffix(['B', 'b']) {
        v = stripped;
    }
    let mut base: usize = 1000;
    if let Some(stripped) = v.strip_suffix('i') {
        base = 1024;
        v = stripped;
    }
    let mut mult: usize = 1;
    if let Some(stripped) = v.strip_suffix(['k', 'K']) {
        mult = base;
        v = stripped;
    } else if let Some(stripped) = v.strip_suffix('M') {
        mult = base * base;
        v = stripped;
    } else if let Some(stripped) = v.strip_suffix('G') {
        mult = base * base * base;
        v = stripped;
    }
    v.parse::<usize>().ok().map(|n| n * mult)
}

fn real_main() -> i32 {
    let matches = match cli().try_get_matches() {
        Ok(m) => m,
        Err(e) => {
            // usage problems go to standard output, not a panic
            println!("{e}");
            return 1;
        }
    };

    let file_root = matches.get_one::<String>("FileRoot").expect("required").clone();

    let dim = if matches.get_flag("dim3") {
        DimMode::ThreeD
    } else if matches.get_flag("nx2d") {
        DimMode::Nx2D
    } else {
        if !matches.get_flag("dim2") {
            println!("No dimensionality specified (--2D, --Nx2D, --3D), assuming 2D");
        }
        DimMode::TwoD
    };

    if matches.get_one::<String>("gpu").is_some() {
        println!("This build runs on the CPU; --gpu is ignored");
    }

    let mut init = Init { dim, ..Init::default() };
    if matches.get_flag("singlethread") {
        init.num_threads = Some(1);
    }
    if let Some(mem) = matches.get_one::<String>("mem") {
        match parse_mem_size(mem) {
            Some(bytes) => init.max_memory = bytes,
            None => {
                println!("Value {mem:?} for --mem argument is invalid");
                return 1;
            }
        }
    }

    let (params, mut outputs) = match setup(&file_root, None, &init) {
        Ok(v) => v,
        Err(e) => {
            println!("{e}");
            return 1;
        }
    };
    if let Err(e) = run(&params, &mut outputs) {
        println!("{e}");
        return 1;
    }
    if let Err(e) = writeout(&params, &outputs) {
        println!("{e}");
        return 1;
    }
    finalize(&params, &mut outputs);
    0
}

fn main() {
    std::process::exit(real_main());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_size_suffixes() {
        assert_eq!(parse_mem_size("500"), Some(500));
        assert_eq!(parse_mem_size("64M"), Some(64_000_000));
        assert_eq!(parse_mem_size("64MiB"), Some(64 * 1024 * 1024));
        assert_eq!(parse_mem_size("2G"), Some(2_000_000_000));
        assert_eq!(parse_mem_size("8kB"), Some(8000));
        assert_eq!(parse_mem_size("8KiB"), Some(8192));
        assert_eq!(parse_mem_size("junk"), None);
    }

    #[test]
    fn test_dim_flags_parse() {
        let m = cli().try_get_matches_from(["beamtrace", "case", "--3D"]).unwrap();
        assert!(m.get_flag("dim3"));
        let m = cli().try_get_matches_from(["beamtrace", "case", "--2.5D"]).unwrap();
        assert!(m.get_flag("nx2d"));
        assert!(cli().try_get_matches_from(["beamtrace"]).is_err());
    }
}
