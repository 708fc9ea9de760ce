//! Synthetic fitting routines for exercising the orchestrator.
//!
//! Production routines wrap optimizers over interpolated template grids. The
//! synthetic routine instead relaxes each fit parameter geometrically from
//! its current component value toward a configured target, optionally with
//! seeded Gaussian jitter. A rate in `(0, 1)` contracts toward the target; a
//! rate of magnitude above one produces the divergent or oscillatory behavior
//! that the damped retry schedule exists to stabilize. Without jitter the
//! routine is fully deterministic.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::component::SharedComponent;
use crate::error::Result;
use crate::routine::FittingRoutine;

struct Relaxation {
    name: String,
    target: f64,
    rate: f64,
}

/// A deterministic stand-in for a real fitting routine, bound to one shared
/// component.
pub struct SyntheticRoutine {
    name: String,
    component: SharedComponent,
    relaxations: Vec<Relaxation>,
    report_only: Vec<String>,
    jitter: Option<Normal<f64>>,
    rng: SmallRng,
    succeed: bool,
}

impl SyntheticRoutine {
    /// Creates a routine without parameters; add them with
    /// [`fit_toward`](SyntheticRoutine::fit_toward) and
    /// [`reporting`](SyntheticRoutine::reporting).
    pub fn new(name: impl Into<String>, component: SharedComponent) -> Self {
        Self {
            name: name.into(),
            component,
            relaxations: Vec::new(),
            report_only: Vec::new(),
            jitter: None,
            rng: SmallRng::seed_from_u64(0),
            succeed: true,
        }
    }

    /// Declares a fit parameter relaxed toward `target` with the given rate:
    /// each call moves the parameter so that its distance to the target is
    /// multiplied by `rate`.
    pub fn fit_toward(mut self, param: impl Into<String>, target: f64, rate: f64) -> Self {
        self.relaxations.push(Relaxation {
            name: param.into(),
            target,
            rate,
        });
        self
    }

    /// Declares a parameter that is reported from the component's current
    /// value with a zero error, but never optimized.
    pub fn reporting(mut self, param: impl Into<String>) -> Self {
        self.report_only.push(param.into());
        self
    }

    /// Adds seeded Gaussian jitter to every fitted value.
    pub fn with_jitter(mut self, sigma: f64, seed: u64) -> Self {
        // A non-finite or negative sigma has no meaningful interpretation, so
        // fall back to none rather than panic inside the distribution.
        self.jitter = Normal::new(0.0, sigma).ok();
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Forces the per-round success flag reported by the routine.
    pub fn with_success(mut self, succeed: bool) -> Self {
        self.succeed = succeed;
        self
    }

    fn identity(&self, name: &str) -> String {
        self.component.borrow().identity(name)
    }
}

impl FittingRoutine for SyntheticRoutine {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Vec<String> {
        let mut params: Vec<String> = self
            .relaxations
            .iter()
            .map(|r| self.identity(&r.name))
            .collect();
        params.extend(self.report_only.iter().map(|n| self.identity(n)));
        params
    }

    fn fit_parameters(&self) -> Vec<String> {
        self.relaxations
            .iter()
            .map(|r| self.identity(&r.name))
            .collect()
    }

    fn process(&mut self, _filename: &str) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(2 * (self.relaxations.len() + self.report_only.len()) + 1);

        for relaxation in &self.relaxations {
            let mut component = self.component.borrow_mut();
            let current = component.value(&relaxation.name).unwrap_or(relaxation.target);
            let mut next = relaxation.target + relaxation.rate * (current - relaxation.target);
            if let Some(jitter) = &self.jitter {
                next += jitter.sample(&mut self.rng);
            }
            component.set_value(&relaxation.name, next)?;
            out.push(next);
            out.push((next - current).abs());
        }

        for name in &self.report_only {
            let value = self.component.borrow().value(name).unwrap_or(f64::NAN);
            out.push(value);
            out.push(0.0);
        }

        out.push(if self.succeed { 1.0 } else { 0.0 });
        Ok(out)
    }
}
