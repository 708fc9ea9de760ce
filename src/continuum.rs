//! Legendre-polynomial continuum model.
//!
//! Fitting routines normalize an observed spectrum against a smooth continuum
//! before comparing it with model templates. The continuum is a Legendre
//! polynomial of configurable degree, fit by least squares over the
//! wavelength span mapped affinely to `[-1, 1]`. The degree is the
//! `poly_degree` knob the orchestrator pushes into every routine.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SpecFitError};

/// Evaluates the Legendre polynomials `P_0..=P_degree` at `t` in `[-1, 1]`
/// via the three-term recurrence.
fn legendre_row(t: f64, degree: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(degree + 1);
    row.push(1.0);
    if degree == 0 {
        return row;
    }
    row.push(t);
    for n in 1..degree {
        let next = ((2 * n + 1) as f64 * t * row[n] - n as f64 * row[n - 1]) / (n + 1) as f64;
        row.push(next);
    }
    row
}

/// Builds the Legendre design matrix for samples `x` mapped to `[-1, 1]`.
pub fn legendre_design(x: &[f64], degree: usize) -> Result<DMatrix<f64>> {
    if x.is_empty() {
        return Err(SpecFitError::EmptyContinuumInput);
    }
    let (lo, hi) = span(x);
    let mut design = DMatrix::zeros(x.len(), degree + 1);
    for (i, &xi) in x.iter().enumerate() {
        let row = legendre_row(rescale(xi, lo, hi), degree);
        for (j, &value) in row.iter().enumerate() {
            design[(i, j)] = value;
        }
    }
    Ok(design)
}

fn span(x: &[f64]) -> (f64, f64) {
    let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (lo, hi)
}

fn rescale(x: f64, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        2.0 * (x - lo) / (hi - lo) - 1.0
    } else {
        0.0
    }
}

/// Configuration for a continuum fit.
#[derive(Clone, Copy, Debug)]
pub struct ContinuumModel {
    /// Degree of the Legendre polynomial.
    pub degree: usize,
}

impl Default for ContinuumModel {
    fn default() -> Self {
        Self { degree: 40 }
    }
}

impl ContinuumModel {
    /// Creates a model of the given degree.
    pub fn new(degree: usize) -> Self {
        Self { degree }
    }

    /// Fits the continuum through `(x, y)` samples by least squares.
    pub fn fit(&self, x: &[f64], y: &[f64]) -> Result<Continuum> {
        if x.len() != y.len() {
            return Err(SpecFitError::ContinuumLengthMismatch {
                x_len: x.len(),
                y_len: y.len(),
            });
        }
        if x.is_empty() {
            return Err(SpecFitError::EmptyContinuumInput);
        }
        if self.degree + 1 > x.len() {
            return Err(SpecFitError::DegreeTooHigh {
                degree: self.degree,
                samples: x.len(),
            });
        }

        let design = legendre_design(x, self.degree)?;
        let rhs = DVector::from_column_slice(y);
        let coeffs = solve_least_squares(&design, &rhs)
            .ok_or_else(|| SpecFitError::singular("continuum least squares"))?;

        let (lo, hi) = span(x);
        Ok(Continuum {
            coeffs,
            lo,
            hi,
        })
    }
}

/// Solves a least-squares problem via SVD.
///
/// Broad absorption features can make neighboring basis columns nearly
/// collinear, so progressively looser tolerances are tried before giving up.
fn solve_least_squares(design: &DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = design.clone().svd(true, true);
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(coeffs) = svd.solve(rhs, tol) {
            if coeffs.iter().all(|v| v.is_finite()) {
                return Some(coeffs);
            }
        }
    }
    None
}

/// A fitted continuum, evaluable over the wavelength span it was fit on.
#[derive(Clone, Debug)]
pub struct Continuum {
    coeffs: DVector<f64>,
    lo: f64,
    hi: f64,
}

impl Continuum {
    /// Evaluates the continuum at one wavelength.
    pub fn evaluate(&self, x: f64) -> f64 {
        let row = legendre_row(rescale(x, self.lo, self.hi), self.coeffs.len() - 1);
        row.iter()
            .zip(self.coeffs.iter())
            .map(|(basis, coeff)| basis * coeff)
            .sum()
    }

    /// Evaluates the continuum on a wavelength grid.
    pub fn evaluate_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.evaluate(x)).collect()
    }

    /// Fitted Legendre coefficients, lowest order first.
    pub fn coefficients(&self) -> &DVector<f64> {
        &self.coeffs
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn quadratic_is_reproduced_exactly() {
        let x: Vec<f64> = (0..50).map(|i| 4000.0 + 10.0 * i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| {
            let t = (xi - 4000.0) / 490.0;
            1.0 + 0.3 * t - 0.7 * t * t
        })
        .collect();

        let continuum = ContinuumModel::new(2).fit(&x, &y).unwrap();
        for (&xi, &yi) in x.iter().zip(&y) {
            assert_relative_eq!(continuum.evaluate(xi), yi, epsilon = 1e-9);
        }
    }

    #[test]
    fn higher_degree_still_recovers_a_line() {
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 2.0 + 0.5 * xi).collect();

        let continuum = ContinuumModel::new(5).fit(&x, &y).unwrap();
        assert_relative_eq!(continuum.evaluate(50.0), 27.0, epsilon = 1e-8);
    }

    #[test]
    fn degree_must_leave_degrees_of_freedom() {
        let x = [1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 3.0];
        let result = ContinuumModel::new(3).fit(&x, &y);
        assert!(matches!(result, Err(SpecFitError::DegreeTooHigh { .. })));
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let result = ContinuumModel::new(1).fit(&[1.0, 2.0], &[1.0]);
        assert!(matches!(
            result,
            Err(SpecFitError::ContinuumLengthMismatch { .. })
        ));
    }
}
