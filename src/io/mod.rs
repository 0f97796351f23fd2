//! Input loaders and legacy output writers.

mod env;
mod ldi;
mod write;

pub use env::{crci, load, read_boundary_2d, read_boundary_3d, read_refl_file};
pub use ldi::{LdiFile, Record};
pub use write::writeout;
