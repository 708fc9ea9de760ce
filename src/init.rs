//! Filename-keyed initialization of component parameters.
//!
//! A [`Component`](crate::component::Component) resets to its baseline values
//! on `init`, then delegates to an attached [`Initializer`] for values specific
//! to the spectrum being processed. [`CsvInit`] reads those values from a CSV
//! table indexed by filename.

use std::collections::HashMap;
use std::path::Path;

use log::info;

use crate::component::Component;
use crate::error::{Result, SpecFitError};

/// Supplies filename-specific initial values for a component's parameters.
pub trait Initializer {
    /// Initializes parameters of the given component for the given filename.
    fn init_component(&self, component: &mut Component, filename: &str) -> Result<()>;
}

/// Initializes a component from a row of a CSV file.
///
/// The table is read once at construction. Column matching is
/// case-insensitive: for a parameter `p` of a component with prefix `cmp`,
/// the initial value is taken from a `cmp p` or `p` column, the lower bound
/// from `min(cmp p)` or `min(p)`, and the upper bound from `max(cmp p)` or
/// `max(p)`. Empty cells and filenames absent from the table are skipped.
pub struct CsvInit {
    /// filename -> lowercase column name -> numeric value.
    rows: HashMap<String, HashMap<String, f64>>,
    parameters: Option<Vec<String>>,
    separator: String,
}

impl CsvInit {
    /// Reads a CSV file indexed by a `Filename` column.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, "Filename")
    }

    /// Reads a CSV file indexed by the given filename column.
    pub fn load_with(path: impl AsRef<Path>, filename_col: &str) -> Result<Self> {
        let path = path.as_ref();
        info!(
            "Reading CSV file with initial values from {}...",
            path.display()
        );

        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_owned())
            .collect();
        let filename_idx = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(filename_col))
            .ok_or_else(|| SpecFitError::MissingCsvColumn {
                filename: path.display().to_string(),
                column: filename_col.to_owned(),
            })?;

        let mut rows = HashMap::new();
        for record in reader.records() {
            let record = record?;
            let filename = record
                .get(filename_idx)
                .unwrap_or_default()
                .trim()
                .to_owned();
            let mut values = HashMap::new();
            for (idx, header) in headers.iter().enumerate() {
                if idx == filename_idx {
                    continue;
                }
                let cell = record.get(idx).unwrap_or_default().trim();
                if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
                    continue;
                }
                let value: f64 =
                    cell.parse()
                        .map_err(|_| SpecFitError::InvalidCsvValue {
                            filename: path.display().to_string(),
                            column: header.clone(),
                            value: cell.to_owned(),
                        })?;
                if value.is_nan() {
                    continue;
                }
                values.insert(header.to_lowercase(), value);
            }
            rows.insert(filename, values);
        }

        Ok(Self {
            rows,
            parameters: None,
            separator: " ".to_owned(),
        })
    }

    /// Restricts initialization to the given parameter names.
    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Overrides the string separating component prefix and parameter name in
    /// column headers.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Number of filenames covered by the table.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Initializer for CsvInit {
    fn init_component(&self, component: &mut Component, filename: &str) -> Result<()> {
        let Some(row) = self.rows.get(filename) else {
            return Ok(());
        };

        let params: Vec<String> = match &self.parameters {
            Some(list) => list.clone(),
            None => component.param_names().map(str::to_owned).collect(),
        };
        let prefix = component.prefix().to_lowercase();

        for param in params {
            let p = param.to_lowercase();
            // Skip names that are not parameters of this component.
            let Some(name) = component
                .param_names()
                .find(|n| n.to_lowercase() == p)
                .map(str::to_owned)
            else {
                continue;
            };

            let prefixed = format!("{}{}{}", prefix, self.separator, p);

            // A plain parameter column takes precedence over a prefixed one.
            for column in [&prefixed, &p] {
                if let Some(&value) = row.get(column.as_str()) {
                    info!(
                        "Setting initial value for \"{}\" of component \"{}\" to {}...",
                        name,
                        component.prefix(),
                        value
                    );
                    component.set_value(&name, value)?;
                }
            }
            for column in [format!("min({prefixed})"), format!("min({p})")] {
                if let Some(&value) = row.get(column.as_str()) {
                    info!(
                        "Setting min value for \"{}\" of component \"{}\" to {}...",
                        name,
                        component.prefix(),
                        value
                    );
                    component.set_min(&name, value)?;
                }
            }
            for column in [format!("max({prefixed})"), format!("max({p})")] {
                if let Some(&value) = row.get(column.as_str()) {
                    info!(
                        "Setting max value for \"{}\" of component \"{}\" to {}...",
                        name,
                        component.prefix(),
                        value
                    );
                    component.set_max(&name, value)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::component::Parameter;

    #[test]
    fn initializes_values_and_bounds_from_csv() {
        let dir = std::env::temp_dir();
        let path = dir.join("specfit_init_test.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "Filename,star Teff,v,min(star Teff),max(Teff)\nspec1.fits,5300,12.5,4000,9000\nspec2.fits,,,,"
        )
        .unwrap();

        let init = CsvInit::load(&path).unwrap();
        assert_eq!(init.len(), 2);

        let mut cmp = Component::new("star")
            .with_parameter(Parameter::new("Teff", 5000.0))
            .with_parameter(Parameter::new("v", 0.0));
        init.init_component(&mut cmp, "spec1.fits").unwrap();
        assert_eq!(cmp.value("Teff"), Some(5300.0));
        assert_eq!(cmp.value("v"), Some(12.5));

        // Empty cells leave the baseline untouched.
        let mut other = Component::new("star")
            .with_parameter(Parameter::new("Teff", 5000.0))
            .with_parameter(Parameter::new("v", 0.0));
        init.init_component(&mut other, "spec2.fits").unwrap();
        assert_eq!(other.value("Teff"), Some(5000.0));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unknown_filename_is_a_no_op() {
        let dir = std::env::temp_dir();
        let path = dir.join("specfit_init_noop.csv");
        std::fs::write(&path, "Filename,Teff\nspec1.fits,5300\n").unwrap();

        let init = CsvInit::load(&path).unwrap();
        let mut cmp = Component::new("star").with_parameter(Parameter::new("Teff", 5000.0));
        init.init_component(&mut cmp, "missing.fits").unwrap();
        assert_eq!(cmp.value("Teff"), Some(5000.0));

        std::fs::remove_file(&path).ok();
    }
}
