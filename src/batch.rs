//! Parallel batch processing of spectrum files.
//!
//! Component state is shared between an orchestrator and its routines, so
//! concurrent files must never share instances. The runner therefore takes a
//! factory that builds one fully independent orchestrator per file, and fans
//! the files out with `rayon`.

use log::info;
use rayon::prelude::*;

use crate::error::Result;
use crate::orchestrator::MultiFit;

/// One output row of a batch run.
#[derive(Debug)]
pub struct BatchRow {
    /// The processed filename.
    pub filename: String,
    /// Per-file orchestration outcome. Errors are captured per row rather
    /// than aborting the whole batch.
    pub values: Result<Vec<f64>>,
}

/// Header plus one row per input file, in input order.
#[derive(Debug)]
pub struct BatchReport {
    /// Column names shared by every row, from [`MultiFit::columns`].
    pub columns: Vec<String>,
    /// Result rows, ordered as the input filenames.
    pub rows: Vec<BatchRow>,
}

impl BatchReport {
    /// Number of rows that produced a result vector.
    pub fn completed(&self) -> usize {
        self.rows.iter().filter(|r| r.values.is_ok()).count()
    }
}

/// Drives many files through independently constructed orchestrators.
pub struct BatchRunner<F>
where
    F: Fn(&str) -> Result<MultiFit> + Sync,
{
    factory: F,
}

impl<F> BatchRunner<F>
where
    F: Fn(&str) -> Result<MultiFit> + Sync,
{
    /// Creates a runner from an orchestrator factory.
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Processes every file, in parallel, one orchestrator per file.
    ///
    /// Components are reset to their filename-specific initial values before
    /// each orchestration. The header is taken from a probe orchestrator for
    /// the first file; an empty input yields an empty report.
    pub fn run(&self, filenames: &[String]) -> Result<BatchReport> {
        let columns = match filenames.first() {
            Some(first) => (self.factory)(first)?.columns(),
            None => Vec::new(),
        };

        let rows: Vec<BatchRow> = filenames
            .par_iter()
            .map(|filename| {
                info!("Processing {filename}...");
                let values = (self.factory)(filename).and_then(|mut fit| {
                    fit.components().init_all(filename)?;
                    fit.process(filename)
                });
                BatchRow {
                    filename: filename.clone(),
                    values,
                }
            })
            .collect();

        Ok(BatchReport { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{shared, Component, ComponentSet, Parameter};
    use crate::orchestrator::MultiFitOptions;
    use crate::simulate::SyntheticRoutine;

    fn factory(filename: &str) -> Result<MultiFit> {
        let _ = filename;
        let cmp = shared(Component::new("star").with_parameter(Parameter::new("v", 0.0)));
        let routine = SyntheticRoutine::new("synth", cmp.clone()).fit_toward("v", 10.0, 0.1);
        let mut components = ComponentSet::new();
        components.push(cmp)?;
        MultiFit::new(
            vec![Box::new(routine)],
            components,
            MultiFitOptions::default().with_max_iterations(10),
        )
    }

    #[test]
    fn rows_preserve_input_order() {
        let filenames: Vec<String> = (0..8).map(|i| format!("spec{i}.fits")).collect();
        let report = BatchRunner::new(factory).run(&filenames).unwrap();

        assert_eq!(report.rows.len(), 8);
        assert_eq!(report.completed(), 8);
        for (row, filename) in report.rows.iter().zip(&filenames) {
            assert_eq!(&row.filename, filename);
        }
        assert_eq!(
            report.columns,
            vec![
                "star v",
                "star v Err",
                "Iterations",
                "Success",
                "Convergence",
                "Damping Factor"
            ]
        );
    }

    #[test]
    fn empty_input_yields_an_empty_report() {
        let report = BatchRunner::new(factory).run(&[]).unwrap();
        assert!(report.columns.is_empty());
        assert!(report.rows.is_empty());
    }
}
