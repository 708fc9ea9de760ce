//! The fitting-routine capability shared by concrete routines and the
//! orchestrator itself.

use crate::error::{Result, SpecFitError};

/// One independent fitting pass over a single spectrum file.
///
/// A routine reports estimates for every parameter in [`parameters`]
/// (`FittingRoutine::parameters`) and actually optimizes the subset named by
/// [`fit_parameters`](FittingRoutine::fit_parameters). Routines may mutate the
/// shared components they were constructed with; the caller only observes the
/// returned result vector.
///
/// The result vector returned by [`process`](FittingRoutine::process) is laid
/// out as interleaved `(value, error)` pairs, one per reported parameter in
/// order, followed by a trailing success flag encoded as `0.0`/`1.0`.
pub trait FittingRoutine {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Ordered list of parameter identities reported by this routine.
    fn parameters(&self) -> Vec<String>;

    /// Subset of [`parameters`](FittingRoutine::parameters) actually optimized.
    ///
    /// Defaults to every reported parameter.
    fn fit_parameters(&self) -> Vec<String> {
        self.parameters()
    }

    /// Ordered list of output columns, structurally aligned with the result
    /// vector of [`process`](FittingRoutine::process).
    fn columns(&self) -> Vec<String> {
        value_error_columns(&self.parameters())
    }

    /// Sets the degree of the polynomial used for the continuum fit.
    ///
    /// Routines without a continuum model ignore this.
    fn set_poly_degree(&mut self, _degree: u32) {}

    /// Runs one fitting pass on the given file.
    fn process(&mut self, filename: &str) -> Result<Vec<f64>>;
}

/// Expected result-vector length for a routine reporting `n_params` parameters.
pub fn result_len(n_params: usize) -> usize {
    2 * n_params + 1
}

/// Derives value/error column pairs from a parameter list.
pub fn value_error_columns(parameters: &[String]) -> Vec<String> {
    let mut columns = Vec::with_capacity(2 * parameters.len());
    for p in parameters {
        columns.push(p.clone());
        columns.push(format!("{p} Err"));
    }
    columns
}

/// Checks a routine result against the length contract.
///
/// A too-short vector is a programming error in the routine, not a runtime
/// condition, so it fails fast. Trailing status fields beyond the contract
/// are permitted: a composed orchestrator reports extra columns after its
/// value/error pairs, and consumers only read the pairs plus the final flag.
pub fn validate_result(name: &str, n_params: usize, result: &[f64]) -> Result<()> {
    let expected = result_len(n_params);
    if result.len() < expected {
        return Err(SpecFitError::malformed_result(name, expected, result.len()));
    }
    Ok(())
}

/// Reads the trailing success flag of a routine result.
pub fn success_flag(result: &[f64]) -> bool {
    result.last().is_some_and(|&flag| flag != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl FittingRoutine for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn parameters(&self) -> Vec<String> {
            vec!["star Teff".to_owned(), "star v".to_owned()]
        }

        fn process(&mut self, _filename: &str) -> Result<Vec<f64>> {
            Ok(vec![5000.0, 25.0, 12.0, 0.5, 1.0])
        }
    }

    #[test]
    fn default_columns_pair_values_and_errors() {
        let routine = Fixed;
        assert_eq!(
            routine.columns(),
            vec!["star Teff", "star Teff Err", "star v", "star v Err"]
        );
    }

    #[test]
    fn default_fit_parameters_cover_all_parameters() {
        assert_eq!(Fixed.fit_parameters(), Fixed.parameters());
    }

    #[test]
    fn validate_result_enforces_the_length_contract() {
        let mut routine = Fixed;
        let result = routine.process("spec.fits").unwrap();
        assert!(validate_result("fixed", 2, &result).is_ok());
        assert!(matches!(
            validate_result("fixed", 3, &result),
            Err(SpecFitError::MalformedResult { expected: 7, .. })
        ));
        assert!(success_flag(&result));
    }

    #[test]
    fn trailing_status_fields_are_tolerated() {
        // A composed orchestrator reports status columns after its pairs.
        let result = vec![5000.0, 25.0, 4.0, 1.0];
        assert!(validate_result("inner", 1, &result).is_ok());
    }
}
