//! Result bookkeeping across the rounds of one orchestration attempt.

use std::collections::{BTreeSet, HashMap};

/// A value/error pair reported for one parameter by one routine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResultEntry {
    /// Best-fit value.
    pub value: f64,
    /// Estimated uncertainty of the value.
    pub error: f64,
}

impl ResultEntry {
    /// Creates a result entry.
    pub fn new(value: f64, error: f64) -> Self {
        Self { value, error }
    }
}

/// Mapping from parameter identity to its most recent result entry.
///
/// Rebuilt fresh for every attempt and persisted across the rounds within it.
#[derive(Clone, Debug, Default)]
pub struct ResultsTable {
    entries: HashMap<String, ResultEntry>,
}

impl ResultsTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a routine's result for one parameter.
    ///
    /// `passthrough` marks an entry from a routine that merely reports the
    /// parameter while some other routine fits it. Such an entry must not
    /// overwrite an existing one, otherwise a real error estimate would be
    /// silently replaced by a pass-through zero.
    pub fn merge(&mut self, identity: &str, entry: ResultEntry, passthrough: bool) {
        if passthrough && self.entries.contains_key(identity) {
            return;
        }
        self.entries.insert(identity.to_owned(), entry);
    }

    /// Entry for the given identity, if any routine produced one.
    pub fn get(&self, identity: &str) -> Option<ResultEntry> {
        self.entries.get(identity).copied()
    }

    /// Best-fit value for the given identity.
    pub fn value(&self, identity: &str) -> Option<f64> {
        self.get(identity).map(|e| e.value)
    }

    /// Flattens the table into interleaved `(value, error)` pairs following
    /// the given parameter order. Parameters never produced by any routine
    /// yield NaN pairs.
    pub fn to_vector(&self, parameters: &[String]) -> Vec<f64> {
        let mut vector = Vec::with_capacity(2 * parameters.len());
        for p in parameters {
            match self.get(p) {
                Some(entry) => {
                    vector.push(entry.value);
                    vector.push(entry.error);
                }
                None => {
                    vector.push(f64::NAN);
                    vector.push(f64::NAN);
                }
            }
        }
        vector
    }
}

/// Per-parameter value series across the completed rounds of one attempt,
/// restricted to parameters actually fit by some routine.
#[derive(Clone, Debug, Default)]
pub struct History {
    series: HashMap<String, Vec<f64>>,
}

impl History {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the current value of every fit parameter at the end of a round.
    pub fn record(&mut self, results: &ResultsTable, fit_params: &BTreeSet<String>) {
        for p in fit_params {
            if let Some(value) = results.value(p) {
                self.series.entry(p.clone()).or_default().push(value);
            }
        }
    }

    /// Absolute change between the two most recent recorded values.
    ///
    /// `None` until two rounds have been recorded for the parameter.
    pub fn latest_delta(&self, identity: &str) -> Option<f64> {
        let series = self.series.get(identity)?;
        let len = series.len();
        if len < 2 {
            return None;
        }
        Some((series[len - 1] - series[len - 2]).abs())
    }

    /// Full series for one parameter.
    pub fn series(&self, identity: &str) -> Option<&[f64]> {
        self.series.get(identity).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_never_overwrites_a_fitted_entry() {
        let mut table = ResultsTable::new();
        table.merge("star v", ResultEntry::new(12.0, 0.5), false);
        table.merge("star v", ResultEntry::new(12.0, 0.0), true);
        assert_eq!(table.get("star v"), Some(ResultEntry::new(12.0, 0.5)));

        // A fitting entry always wins.
        table.merge("star v", ResultEntry::new(13.0, 0.4), false);
        assert_eq!(table.get("star v"), Some(ResultEntry::new(13.0, 0.4)));
    }

    #[test]
    fn passthrough_fills_an_empty_slot() {
        let mut table = ResultsTable::new();
        table.merge("star v", ResultEntry::new(12.0, 0.0), true);
        assert_eq!(table.value("star v"), Some(12.0));
    }

    #[test]
    fn vector_follows_parameter_order_with_nan_gaps() {
        let mut table = ResultsTable::new();
        table.merge("b", ResultEntry::new(2.0, 0.2), false);
        let parameters = vec!["a".to_owned(), "b".to_owned()];
        let vector = table.to_vector(&parameters);
        assert!(vector[0].is_nan() && vector[1].is_nan());
        assert_eq!(&vector[2..], &[2.0, 0.2]);
    }

    #[test]
    fn history_needs_two_rounds_for_a_delta() {
        let mut history = History::new();
        let mut table = ResultsTable::new();
        let fit_params: BTreeSet<String> = ["star v".to_owned()].into();

        table.merge("star v", ResultEntry::new(10.0, 0.1), false);
        history.record(&table, &fit_params);
        assert_eq!(history.latest_delta("star v"), None);

        table.merge("star v", ResultEntry::new(10.4, 0.1), false);
        history.record(&table, &fit_params);
        let delta = history.latest_delta("star v").unwrap();
        assert!((delta - 0.4).abs() < 1e-12);
    }
}
