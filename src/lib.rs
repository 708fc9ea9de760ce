//! Iterative multi-routine convergence orchestration for stellar spectrum fitting.
//!
//! Physical model parameters (effective temperature, radial velocity, line
//! broadening, ...) are fit to observed spectra by running one or more
//! independent fitting routines against a shared set of mutable parameter
//! components, round after round, until the combined result stabilizes. The
//! crate provides tools to
//!
//! - describe parameters, bounds, and components (`component` module),
//! - initialize them per file from a CSV table (`init` module),
//! - plug optimizers into the [`FittingRoutine`] capability (`routine` and
//!   `simulate` modules),
//! - normalize spectra against a Legendre continuum (`continuum` module),
//! - sequence routines, merge results, test convergence, and retry with a
//!   damping schedule (`orchestrator` module), and
//! - fan many files out in parallel (`batch` module).
//!
//! The orchestrator never raises for non-convergence: every run produces one
//! complete, positionally stable output row whose layout is described by
//! [`MultiFit::columns`]. Since [`MultiFit`] itself implements
//! [`FittingRoutine`], orchestrations compose recursively.
//!
//! # Quick start
//!
//! ```
//! use specfit::component::{shared, Component, ComponentSet, Parameter};
//! use specfit::orchestrator::{MultiFit, MultiFitOptions};
//! use specfit::simulate::SyntheticRoutine;
//!
//! # fn main() -> specfit::Result<()> {
//! let star = shared(
//!     Component::new("star")
//!         .with_parameter(Parameter::new("Teff", 5000.0))
//!         .with_parameter(Parameter::new("v", 0.0)),
//! );
//! let routine = SyntheticRoutine::new("grid", star.clone())
//!     .fit_toward("Teff", 5800.0, 0.1)
//!     .fit_toward("v", 12.0, 0.1);
//!
//! let mut components = ComponentSet::new();
//! components.push(star)?;
//!
//! let mut fit = MultiFit::new(
//!     vec![Box::new(routine)],
//!     components,
//!     MultiFitOptions::default().with_max_iterations(20),
//! )?;
//!
//! let row = fit.process("spectrum.fits")?;
//! assert_eq!(row.len(), fit.columns().len());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod component;
pub mod continuum;
pub mod convergence;
pub mod error;
pub mod init;
pub mod orchestrator;
pub mod results;
pub mod routine;
pub mod simulate;

pub use error::{Result, SpecFitError};
pub use orchestrator::{MultiFit, MultiFitOptions, DEFAULT_DAMPING_FACTORS};
pub use routine::FittingRoutine;
