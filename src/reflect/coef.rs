//! Tabulated reflection coefficients.
//!
//! A table is a sequence of `(θ, |R|, φ)` rows sorted by grazing angle θ in
//! degrees, with φ unwrapped so linear interpolation is meaningful. Queries
//! outside the tabulated domain return zero and warn once per run.

use crate::error::{ErrState, SetupError};
use crate::prt::LogSink;
use crate::types::Real;

/// One tabulated row. `theta` in degrees, `phi` in radians (converted from
/// degrees at load).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReflCoef {
    pub theta: Real,
    pub r: Real,
    pub phi: Real,
}

/// Reflection-coefficient table with monotone-angle lookup.
#[derive(Clone, Debug)]
pub struct ReflTable {
    rows: Vec<ReflCoef>,
}

impl ReflTable {
    pub fn new(rows: Vec<ReflCoef>) -> Result<Self, SetupError> {
        if rows.is_empty() {
            return Err(SetupError::EmptyVector("reflection-coefficient table"));
        }
        for i in 1..rows.len() {
            if rows[i].theta < rows[i - 1].theta {
                return Err(SetupError::UnsortedReflTable(i));
            }
        }
        Ok(Self { rows })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Interpolate `(|R|, φ)` at `theta` degrees, already folded to
    /// `[0°, 90°]`. Out-of-domain queries return `(0, 0)` and emit a single
    /// warning per run, however many times they occur.
    pub fn interpolate(
        &self,
        theta: Real,
        is_top: bool,
        err: &ErrState,
        sink: &dyn LogSink,
    ) -> (Real, Real) {
        let rows = &self.rows;
        let (mut left, mut right) = (0usize, rows.len() - 1);

        if theta < rows[left].theta || theta > rows[right].theta {
            err.warn_refl_domain(
                is_top,
                sink,
                &format!(
                    "reflection coefficient set to 0 outside tabulated domain: \
                     angle = {theta}, table covers [{}, {}]",
                    rows[left].theta, rows[right].theta
                ),
            );
            return (0.0, 0.0);
        }
        if rows.len() == 1 {
            return (rows[0].r, rows[0].phi);
        }

        // bisect for the bracketing abscissas
        while left != right - 1 {
            let mid = (left + right) / 2;
            if rows[mid].theta > theta {
                right = mid;
            } else {
                left = mid;
            }
        }

        let span = rows[right].theta - rows[left].theta;
        let alpha = if span == 0.0 { 0.0 } else { (theta - rows[left].theta) / span };
        (
            (1.0 - alpha) * rows[left].r + alpha * rows[right].r,
            (1.0 - alpha) * rows[left].phi + alpha * rows[right].phi,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prt::VecSink;
    use approx::assert_relative_eq;

    fn cosine_table() -> ReflTable {
        let rows = (0..=90)
            .map(|d| {
                let theta = d as Real;
                ReflCoef { theta, r: theta.to_radians().cos(), phi: 0.0 }
            })
            .collect();
        ReflTable::new(rows).unwrap()
    }

    #[test]
    fn test_rejects_unsorted() {
        let rows = vec![
            ReflCoef { theta: 10.0, r: 1.0, phi: 0.0 },
            ReflCoef { theta: 5.0, r: 1.0, phi: 0.0 },
        ];
        assert!(matches!(ReflTable::new(rows), Err(SetupError::UnsortedReflTable(1))));
    }

    #[test]
    fn test_interpolates_between_rows() {
        let table = ReflTable::new(vec![
            ReflCoef { theta: 0.0, r: 1.0, phi: 0.0 },
            ReflCoef { theta: 90.0, r: 0.0, phi: 1.0 },
        ])
        .unwrap();
        let err = ErrState::new();
        let (r, phi) = table.interpolate(45.0, false, &err, &crate::prt::NullSink);
        assert_relative_eq!(r, 0.5, epsilon = 1e-12);
        assert_relative_eq!(phi, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_exact_node_query() {
        let table = cosine_table();
        let err = ErrState::new();
        let (r, _) = table.interpolate(45.0, false, &err, &crate::prt::NullSink);
        assert_relative_eq!(r, (45.0 as Real).to_radians().cos(), epsilon = 1e-9);
    }

    #[test]
    fn test_out_of_domain_zero_and_single_warning() {
        let table = ReflTable::new(vec![
            ReflCoef { theta: 10.0, r: 0.9, phi: 0.0 },
            ReflCoef { theta: 80.0, r: 0.1, phi: 0.0 },
        ])
        .unwrap();
        let err = ErrState::new();
        let sink = VecSink::new();
        for _ in 0..4 {
            let (r, phi) = table.interpolate(5.0, false, &err, &sink);
            assert_eq!((r, phi), (0.0, 0.0));
        }
        let (r, _) = table.interpolate(85.0, false, &err, &sink);
        assert_eq!(r, 0.0);
        assert_eq!(sink.take().len(), 1);
    }
}
