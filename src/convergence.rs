//! Convergence thresholds and the per-round convergence test.
//!
//! A fit converges when, for every fit parameter simultaneously, the absolute
//! change between its two most recent round estimates falls within the
//! parameter's threshold.

use std::collections::{BTreeSet, HashMap};

use log::warn;

use crate::component::ComponentSet;
use crate::error::{Result, SpecFitError};
use crate::results::History;

/// Class default for a parameter name: effective temperatures move on a much
/// coarser scale than velocities and broadenings, which in turn move on a
/// coarser scale than abundances and the like.
pub fn default_threshold(name: &str) -> f64 {
    let lower = name.to_lowercase();
    if lower == "teff" {
        25.0
    } else if lower == "v" || lower == "sig" {
        1.0
    } else {
        0.05
    }
}

/// Per-parameter convergence deltas, keyed by full parameter identity.
#[derive(Clone, Debug)]
pub struct Thresholds {
    map: HashMap<String, f64>,
}

impl Thresholds {
    /// Builds the threshold table for one fitting session.
    ///
    /// User-supplied entries use unprefixed parameter names and are expanded
    /// to every matching identity across the components. Parameters without a
    /// user entry receive class defaults, as do fit parameters that belong to
    /// no component. A user name matching nothing is ignored with a warning,
    /// or rejected when `strict` is set.
    pub fn build(
        user: Option<&HashMap<String, f64>>,
        components: &ComponentSet,
        fit_params: &BTreeSet<String>,
        strict: bool,
    ) -> Result<Self> {
        let mut map = HashMap::new();

        if let Some(user) = user {
            for (name, &value) in user {
                let mut matched = false;
                for component in components.components() {
                    let component = component.borrow();
                    if component.param_names().any(|n| n == name) {
                        map.insert(component.identity(name), value);
                        matched = true;
                    }
                }
                if !matched {
                    if strict {
                        return Err(SpecFitError::UnknownThreshold { name: name.clone() });
                    }
                    warn!("threshold name `{name}` matches no component parameter; ignoring");
                }
            }
        }

        for component in components.components() {
            let component = component.borrow();
            for name in component.param_names() {
                let identity = component.identity(name);
                map.entry(identity).or_insert_with(|| default_threshold(name));
            }
        }

        for p in fit_params {
            if !map.contains_key(p) {
                let name = p.rsplit(' ').next().unwrap_or(p);
                map.insert(p.clone(), default_threshold(name));
            }
        }

        Ok(Self { map })
    }

    /// Threshold for one identity.
    pub fn get(&self, identity: &str) -> Option<f64> {
        self.map.get(identity).copied()
    }

    /// Returns a copy with every threshold divided by 3, the one-time
    /// tightening applied before the damped retry schedule.
    pub fn tightened(&self) -> Self {
        Self {
            map: self.map.iter().map(|(k, v)| (k.clone(), v / 3.0)).collect(),
        }
    }

    /// True when every fit parameter passes its convergence criterion.
    ///
    /// A parameter without two history points or without a threshold fails
    /// the test, so an attempt never converges before its second round.
    pub fn converged(&self, history: &History, fit_params: &BTreeSet<String>) -> bool {
        fit_params.iter().all(|p| {
            matches!(
                (history.latest_delta(p), self.get(p)),
                (Some(delta), Some(threshold)) if delta <= threshold
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentSet, Parameter};
    use crate::results::{ResultEntry, ResultsTable};

    fn components() -> ComponentSet {
        ComponentSet::from_components(vec![
            Component::new("star")
                .with_parameter(Parameter::new("Teff", 5000.0))
                .with_parameter(Parameter::new("v", 0.0))
                .with_parameter(Parameter::new("logg", 4.5)),
            Component::new("tellurics").with_parameter(Parameter::new("v", 0.0)),
        ])
        .unwrap()
    }

    #[test]
    fn class_defaults_by_parameter_name() {
        assert_eq!(default_threshold("Teff"), 25.0);
        assert_eq!(default_threshold("v"), 1.0);
        assert_eq!(default_threshold("sig"), 1.0);
        assert_eq!(default_threshold("logg"), 0.05);
    }

    #[test]
    fn user_names_expand_across_components() {
        let user: HashMap<String, f64> = [("v".to_owned(), 0.2)].into();
        let thresholds =
            Thresholds::build(Some(&user), &components(), &BTreeSet::new(), false).unwrap();
        assert_eq!(thresholds.get("star v"), Some(0.2));
        assert_eq!(thresholds.get("tellurics v"), Some(0.2));
        // Unspecified parameters still get class defaults.
        assert_eq!(thresholds.get("star Teff"), Some(25.0));
        assert_eq!(thresholds.get("star logg"), Some(0.05));
    }

    #[test]
    fn strict_mode_rejects_unknown_names() {
        let user: HashMap<String, f64> = [("vsini".to_owned(), 0.2)].into();
        let strict = Thresholds::build(Some(&user), &components(), &BTreeSet::new(), true);
        assert!(matches!(strict, Err(SpecFitError::UnknownThreshold { .. })));

        // Lenient mode drops the entry but keeps the defaults.
        let lenient =
            Thresholds::build(Some(&user), &components(), &BTreeSet::new(), false).unwrap();
        assert_eq!(lenient.get("star Teff"), Some(25.0));
    }

    #[test]
    fn componentless_fit_parameters_get_name_class_defaults() {
        let fit_params: BTreeSet<String> = ["moon Teff".to_owned()].into();
        let thresholds = Thresholds::build(None, &components(), &fit_params, false).unwrap();
        assert_eq!(thresholds.get("moon Teff"), Some(25.0));
    }

    #[test]
    fn tightening_divides_by_three() {
        let thresholds =
            Thresholds::build(None, &components(), &BTreeSet::new(), false).unwrap();
        let tight = thresholds.tightened();
        assert!((tight.get("star Teff").unwrap() - 25.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn convergence_requires_two_history_points_for_all_parameters() {
        let fit_params: BTreeSet<String> = ["star v".to_owned()].into();
        let thresholds = Thresholds::build(None, &components(), &fit_params, false).unwrap();

        let mut history = History::new();
        let mut table = ResultsTable::new();
        table.merge("star v", ResultEntry::new(10.0, 0.1), false);
        history.record(&table, &fit_params);
        assert!(!thresholds.converged(&history, &fit_params));

        table.merge("star v", ResultEntry::new(10.5, 0.1), false);
        history.record(&table, &fit_params);
        assert!(thresholds.converged(&history, &fit_params));

        table.merge("star v", ResultEntry::new(13.0, 0.1), false);
        history.record(&table, &fit_params);
        assert!(!thresholds.converged(&history, &fit_params));
    }
}
