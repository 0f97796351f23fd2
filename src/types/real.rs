//! Scalar type selection.
//!
//! The whole crate computes in [`Real`], which is `f64` by default and `f32`
//! when the `f32` feature is enabled. Every derived type (vectors, complex
//! values, tables) follows the alias.

/// Floating-point scalar used throughout the tracer.
#[cfg(not(feature = "f32"))]
pub type Real = f64;

/// Floating-point scalar used throughout the tracer.
#[cfg(feature = "f32")]
pub type Real = f32;

/// Complex scalar; real part carries the quantity, imaginary part the loss.
pub type Cpx = num_complex::Complex<Real>;

/// π at [`Real`] precision.
pub const PI: Real = std::f64::consts::PI as Real;

/// Degrees → radians. Angles are radians everywhere inside the core;
/// degrees appear only at I/O boundaries.
#[inline]
pub fn deg2rad(deg: Real) -> Real {
    deg * (PI / 180.0)
}

/// Radians → degrees.
#[inline]
pub fn rad2deg(rad: Real) -> Real {
    rad * (180.0 / PI)
}

/// Smallest positive value used to keep branch cuts on the correct side.
pub const MIN_POS: Real = 1.0e-30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deg_rad_round_trip() {
        for d in [-180.0, -90.0, 0.0, 36.5, 90.0, 180.0] {
            assert!((rad2deg(deg2rad(d)) - d).abs() < 1e-12);
        }
    }

    #[test]
    fn test_right_angle() {
        assert!((deg2rad(90.0) - PI / 2.0).abs() < 1e-15);
    }
}
