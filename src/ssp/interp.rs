//! Interpolant construction for depth profiles.
//!
//! Both the monotone PCHIP and the natural cubic spline are reduced at load
//! time to one `[a0, a1, a2, a3]` cubic per depth segment, evaluated at the
//! local offset `xt = z − z[i]`. Coefficients are complex so the attenuation
//! (imaginary part) rides along with the speed.

use crate::types::{Cpx, Real};

/// Evaluate a segment cubic and its first two derivatives at offset `xt`.
#[inline]
pub fn eval_cubic(a: &[Cpx; 4], xt: Real) -> (Cpx, Cpx, Cpx) {
    let v = ((a[3] * xt + a[2]) * xt + a[1]) * xt + a[0];
    let d1 = (a[3] * (3.0 * xt) + a[2] * 2.0) * xt + a[1];
    let d2 = a[2] * 2.0 + a[3] * (6.0 * xt);
    (v, d1, d2)
}

/// Monotone piecewise-cubic Hermite (PCHIP) coefficients.
///
/// Slopes use the weighted-harmonic-mean rule with Fritsch–Carlson limiting
/// at the ends; the monotonicity decisions look at the real part (the speed),
/// the attenuation follows the same weights.
pub fn pchip_coefficients(z: &[Real], c: &[Cpx]) -> Vec<[Cpx; 4]> {
    let n = z.len();
    debug_assert!(n >= 2 && c.len() == n);

    let h: Vec<Real> = (0..n - 1).map(|i| z[i + 1] - z[i]).collect();
    let del: Vec<Cpx> = (0..n - 1).map(|i| (c[i + 1] - c[i]) / h[i]).collect();

    let mut d = vec![Cpx::new(0.0, 0.0); n];
    if n == 2 {
        d[0] = del[0];
        d[1] = del[0];
    } else {
        d[0] = edge_slope(h[0], h[1], del[0], del[1]);
        for i in 1..n - 1 {
            if del[i - 1].re * del[i].re > 0.0 {
                let w1 = 2.0 * h[i] + h[i - 1];
                let w2 = h[i] + 2.0 * h[i - 1];
                d[i] = (w1 + w2) / (w1 / del[i - 1] + w2 / del[i]);
            }
        }
        d[n - 1] = edge_slope(h[n - 2], h[n - 3], del[n - 2], del[n - 3]);
    }

    (0..n - 1)
        .map(|i| hermite_segment(c[i], c[i + 1], d[i], d[i + 1], h[i]))
        .collect()
}

/// Three-point end-slope estimate with the standard shape limits.
fn edge_slope(h0: Real, h1: Real, del0: Cpx, del1: Cpx) -> Cpx {
    let mut d = ((2.0 * h0 + h1) * del0 - h0 * del1) / (h0 + h1);
    if d.re * del0.re <= 0.0 {
        d = Cpx::new(0.0, 0.0);
    } else if del0.re * del1.re < 0.0 && d.re.abs() > 3.0 * del0.re.abs() {
        d = 3.0 * del0;
    }
    d
}

fn hermite_segment(c0: Cpx, c1: Cpx, d0: Cpx, d1: Cpx, h: Real) -> [Cpx; 4] {
    let del = (c1 - c0) / h;
    [
        c0,
        d0,
        (3.0 * del - 2.0 * d0 - d1) / h,
        (d0 + d1 - 2.0 * del) / (h * h),
    ]
}

/// Natural cubic-spline coefficients (second derivative zero at both ends).
///
/// Solves the tridiagonal moment system by the Thomas algorithm; diagonals
/// are real, the right-hand side is complex.
pub fn spline_coefficients(z: &[Real], c: &[Cpx]) -> Vec<[Cpx; 4]> {
    let n = z.len();
    debug_assert!(n >= 2 && c.len() == n);

    let h: Vec<Real> = (0..n - 1).map(|i| z[i + 1] - z[i]).collect();

    // Moments m[i] = second derivative at node i; natural ends are zero.
    let mut m = vec![Cpx::new(0.0, 0.0); n];
    if n > 2 {
        let dim = n - 2;
        let mut diag = vec![0.0 as Real; dim];
        let mut rhs = vec![Cpx::new(0.0, 0.0); dim];
        for i in 0..dim {
            diag[i] = 2.0 * (h[i] + h[i + 1]);
            rhs[i] = 6.0 * ((c[i + 2] - c[i + 1]) / h[i + 1] - (c[i + 1] - c[i]) / h[i]);
        }
        // forward sweep: sub/super diagonals are h[1..n-2]
        for i in 1..dim {
            let w = h[i] / diag[i - 1];
            diag[i] -= w * h[i];
            let prev = rhs[i - 1];
            rhs[i] -= prev * w;
        }
        m[dim] = rhs[dim - 1] / diag[dim - 1];
        for i in (1..dim).rev() {
            m[i] = (rhs[i - 1] - m[i + 1] * h[i]) / diag[i - 1];
        }
    }

    (0..n - 1)
        .map(|i| {
            let hi = h[i];
            [
                c[i],
                (c[i + 1] - c[i]) / hi - hi * (2.0 * m[i] + m[i + 1]) / 6.0,
                m[i] / 2.0,
                (m[i + 1] - m[i]) / (6.0 * hi),
            ]
        })
        .collect()
}
