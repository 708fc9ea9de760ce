//! The iterative multi-routine convergence orchestrator.
//!
//! [`MultiFit`] sequences an ordered list of fitting routines that share one
//! set of parameter components, merges their per-round results into a single
//! parameter vector, tests for convergence across rounds, and falls back to a
//! schedule of decreasing damping factors when the undamped fit does not
//! converge. It implements [`FittingRoutine`] itself, so orchestrators compose
//! recursively and plug into the same batch machinery as plain routines.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::component::ComponentSet;
use crate::convergence::Thresholds;
use crate::error::{Result, SpecFitError};
use crate::results::{History, ResultEntry, ResultsTable};
use crate::routine::{self, FittingRoutine};

/// Default damped-retry schedule.
pub const DEFAULT_DAMPING_FACTORS: [f64; 2] = [0.7, 0.3];

/// Configuration knobs for a [`MultiFit`] orchestration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiFitOptions {
    /// Number of rounds in plain mode (no convergence testing).
    pub iterations: usize,
    /// When set, rounds run until convergence or until this bound is reached.
    /// Meaningful values are >= 2, since convergence needs two history points.
    pub max_iterations: Option<usize>,
    /// Degree of the Legendre polynomial used for the continuum fit, pushed
    /// into every routine before each invocation.
    pub poly_degree: u32,
    /// Whether to retry with damping factors when the bounded fit exhausts.
    pub damped: bool,
    /// Damping schedule, kept sorted in descending order.
    pub factors: Vec<f64>,
    /// User-supplied convergence thresholds, keyed by unprefixed parameter
    /// name. Unspecified parameters receive class defaults.
    pub thresholds: Option<HashMap<String, f64>>,
    /// Fail fast when a threshold name matches no component parameter instead
    /// of warning and ignoring it.
    pub strict_thresholds: bool,
}

impl Default for MultiFitOptions {
    fn default() -> Self {
        Self {
            iterations: 1,
            max_iterations: None,
            poly_degree: 40,
            damped: true,
            factors: DEFAULT_DAMPING_FACTORS.to_vec(),
            thresholds: None,
            strict_thresholds: false,
        }
    }
}

impl MultiFitOptions {
    /// Sets the number of plain-mode rounds.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Enables bounded convergence mode with the given round bound.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Sets the continuum polynomial degree.
    pub fn with_poly_degree(mut self, degree: u32) -> Self {
        self.poly_degree = degree;
        self
    }

    /// Enables or disables the damped retry schedule.
    pub fn with_damping(mut self, damped: bool) -> Self {
        self.damped = damped;
        self
    }

    /// Replaces the damping schedule.
    pub fn with_factors(mut self, factors: Vec<f64>) -> Self {
        self.factors = factors;
        self
    }

    /// Supplies explicit convergence thresholds by unprefixed parameter name.
    pub fn with_thresholds(mut self, thresholds: HashMap<String, f64>) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    /// Enables strict threshold-name checking.
    pub fn with_strict_thresholds(mut self, strict: bool) -> Self {
        self.strict_thresholds = strict;
        self
    }
}

/// Callback invoked once per round with a snapshot of every component
/// parameter's current value.
pub type RoundObserver = Box<dyn FnMut(&HashMap<String, f64>)>;

/// Orchestrates an ordered list of fitting routines over shared components.
pub struct MultiFit {
    routines: Vec<Box<dyn FittingRoutine>>,
    components: ComponentSet,
    options: MultiFitOptions,
    thresholds: Option<Thresholds>,
    observer: Option<RoundObserver>,
}

impl MultiFit {
    /// Creates an orchestrator over the given routines and shared components.
    ///
    /// Damping factors are validated to lie in `(0, 1]` and stored in
    /// descending order. An empty schedule disables damping.
    pub fn new(
        routines: Vec<Box<dyn FittingRoutine>>,
        components: ComponentSet,
        mut options: MultiFitOptions,
    ) -> Result<Self> {
        if routines.is_empty() {
            return Err(SpecFitError::NoRoutines);
        }
        for &factor in &options.factors {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(SpecFitError::InvalidDampingFactor { factor });
            }
        }
        options.factors.sort_by(|a, b| b.total_cmp(a));
        if options.factors.is_empty() {
            options.damped = false;
        }

        Ok(Self {
            routines,
            components,
            options,
            thresholds: None,
            observer: None,
        })
    }

    /// Attaches an observer invoked once per round of the main iteration loop
    /// with a snapshot of all component parameter values.
    pub fn with_round_observer(
        mut self,
        observer: impl FnMut(&HashMap<String, f64>) + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// The shared component set this orchestrator operates on.
    pub fn components(&self) -> &ComponentSet {
        &self.components
    }

    /// Active configuration.
    pub fn options(&self) -> &MultiFitOptions {
        &self.options
    }

    /// Sorted, deduplicated union of every routine's reported parameters.
    ///
    /// The ordering fixes the layout of the vectors returned by
    /// [`process`](MultiFit::process).
    pub fn parameters(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .routines
            .iter()
            .flat_map(|r| r.parameters())
            .collect();
        set.into_iter().collect()
    }

    /// Sorted union of every routine's fit parameters.
    pub fn fit_parameters(&self) -> Vec<String> {
        self.fit_param_set().into_iter().collect()
    }

    /// Output columns, structurally aligned with the result vector: one
    /// value/error pair per parameter, then `Iterations` and `Success`, plus
    /// `Convergence` in bounded mode and `Damping Factor` when damping is
    /// enabled as well.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = routine::value_error_columns(&self.parameters());
        columns.push("Iterations".to_owned());
        columns.push("Success".to_owned());
        if self.options.max_iterations.is_some() {
            columns.push("Convergence".to_owned());
            if self.options.damped {
                columns.push("Damping Factor".to_owned());
            }
        }
        columns
    }

    /// Processes one spectrum file through the full orchestration.
    ///
    /// Never fails for non-convergence; the returned vector always carries the
    /// status fields described by [`columns`](MultiFit::columns). The only
    /// errors raised are contract violations (malformed routine output) and
    /// configuration problems surfaced lazily (strict threshold checking).
    pub fn process(&mut self, filename: &str) -> Result<Vec<f64>> {
        let parameters = self.parameters();
        let fit_params = self.fit_param_set();

        let bounded = self.options.max_iterations;
        if bounded.is_some() && self.thresholds.is_none() {
            self.thresholds = Some(Thresholds::build(
                self.options.thresholds.as_ref(),
                &self.components,
                &fit_params,
                self.options.strict_thresholds,
            )?);
        }

        let mut results = ResultsTable::new();
        let mut success: Vec<bool> = Vec::new();
        let mut history = History::new();

        let maxiter = bounded.unwrap_or(self.options.iterations);

        for it in 0..maxiter {
            self.notify_round();
            self.run_round(filename, &fit_params, &mut results, &mut success, None)?;

            if bounded.is_none() {
                continue;
            }
            history.record(&results, &fit_params);

            // Convergence needs at least two rounds of history.
            if it == 0 {
                continue;
            }
            if let Some(thresholds) = &self.thresholds {
                if thresholds.converged(&history, &fit_params) {
                    debug!("fit converged after {} rounds", it + 1);
                    let factor = self.options.damped.then_some(1.0);
                    return Ok(assemble(
                        &results, &parameters, it + 1, &success, Some(true), factor,
                    ));
                }
                if it == maxiter - 1 && !self.options.damped {
                    debug!("fit exhausted {} rounds without convergence", maxiter);
                    return Ok(assemble(
                        &results, &parameters, it + 1, &success, Some(false), None,
                    ));
                }
            }
        }

        if bounded.is_some() && self.options.damped {
            return self.damped_retries(filename, &parameters, &fit_params, maxiter);
        }

        // Plain mode: fixed number of rounds, no convergence test.
        Ok(assemble(
            &results,
            &parameters,
            self.options.iterations,
            &success,
            None,
            None,
        ))
    }

    /// Runs the damped retry schedule after a bounded attempt exhausted.
    fn damped_retries(
        &mut self,
        filename: &str,
        parameters: &[String],
        fit_params: &BTreeSet<String>,
        maxiter: usize,
    ) -> Result<Vec<f64>> {
        // One-time tightening of the convergence criteria for all retries.
        let thresholds = match &self.thresholds {
            Some(t) => t.tightened(),
            None => Thresholds::build(
                self.options.thresholds.as_ref(),
                &self.components,
                fit_params,
                self.options.strict_thresholds,
            )?
            .tightened(),
        };
        let factors = self.options.factors.clone();

        let mut results = ResultsTable::new();
        let mut success: Vec<bool> = Vec::new();

        for &factor in &factors {
            debug!("retrying fit with damping factor {factor}");
            self.components.init_all(filename)?;
            results = ResultsTable::new();
            success = Vec::new();
            let mut history = History::new();

            for it in 0..3 * maxiter {
                self.run_round(filename, fit_params, &mut results, &mut success, Some(factor))?;
                history.record(&results, fit_params);

                // Grace period before testing under the new factor.
                if it < maxiter / 2 {
                    continue;
                }
                if thresholds.converged(&history, fit_params) {
                    debug!(
                        "damped fit converged after {} rounds at factor {factor}",
                        it + 1
                    );
                    return Ok(assemble(
                        &results,
                        parameters,
                        it + 1,
                        &success,
                        Some(true),
                        Some(factor),
                    ));
                }
            }
        }

        debug!("damped retries exhausted without convergence");
        let total = maxiter + factors.len() * 3 * maxiter;
        let last = factors.last().copied().unwrap_or(1.0);
        Ok(assemble(
            &results,
            parameters,
            total,
            &success,
            Some(false),
            Some(last),
        ))
    }

    /// Executes every routine once, in configured order, merging results and
    /// recording success flags. With a damping factor, each routine's raw
    /// update of its fit parameters is replaced by a partially applied step.
    fn run_round(
        &mut self,
        filename: &str,
        fit_params: &BTreeSet<String>,
        results: &mut ResultsTable,
        success: &mut Vec<bool>,
        damping: Option<f64>,
    ) -> Result<()> {
        let degree = self.options.poly_degree;
        for idx in 0..self.routines.len() {
            self.routines[idx].set_poly_degree(degree);
            let params = self.routines[idx].parameters();
            let routine_fit: HashSet<String> =
                self.routines[idx].fit_parameters().into_iter().collect();

            // Snapshot the values the routine starts from, so its raw update
            // can be replaced by a damped step afterwards.
            let init = damping.map(|_| self.components.snapshot(&routine_fit));

            let raw = self.routines[idx].process(filename)?;
            routine::validate_result(self.routines[idx].name(), params.len(), &raw)?;

            for (i, p) in params.iter().enumerate() {
                let entry = ResultEntry::new(raw[2 * i], raw[2 * i + 1]);
                let passthrough = fit_params.contains(p) && !routine_fit.contains(p);
                results.merge(p, entry, passthrough);
            }

            if let (Some(factor), Some(init)) = (damping, init) {
                for p in &params {
                    if let Some(&initial) = init.get(p) {
                        if let Some(new_value) = results.value(p) {
                            let delta = new_value - initial;
                            self.components.set_value(p, initial + factor * delta)?;
                        }
                    }
                }
            }

            success.push(routine::success_flag(&raw));
        }
        Ok(())
    }

    fn fit_param_set(&self) -> BTreeSet<String> {
        self.routines
            .iter()
            .flat_map(|r| r.fit_parameters())
            .collect()
    }

    fn notify_round(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            let snapshot = self.components.snapshot_all();
            observer(&snapshot);
        }
    }
}

impl fmt::Debug for MultiFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiFit")
            .field(
                "routines",
                &self.routines.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("components", &self.components)
            .field("options", &self.options)
            .finish()
    }
}

impl FittingRoutine for MultiFit {
    fn name(&self) -> &str {
        "multifit"
    }

    fn parameters(&self) -> Vec<String> {
        MultiFit::parameters(self)
    }

    fn fit_parameters(&self) -> Vec<String> {
        MultiFit::fit_parameters(self)
    }

    fn columns(&self) -> Vec<String> {
        MultiFit::columns(self)
    }

    fn set_poly_degree(&mut self, degree: u32) {
        self.options.poly_degree = degree;
    }

    fn process(&mut self, filename: &str) -> Result<Vec<f64>> {
        MultiFit::process(self, filename)
    }
}

/// Flattens one attempt's state into the positional output vector.
fn assemble(
    results: &ResultsTable,
    parameters: &[String],
    iterations: usize,
    success: &[bool],
    converged: Option<bool>,
    factor: Option<f64>,
) -> Vec<f64> {
    let mut out = results.to_vector(parameters);
    out.push(iterations as f64);
    out.push(flag(success.iter().all(|&s| s)));
    if let Some(converged) = converged {
        out.push(flag(converged));
    }
    if let Some(factor) = factor {
        out.push(factor);
    }
    out
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}
