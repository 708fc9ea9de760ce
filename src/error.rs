use thiserror::Error;

/// Unified error type for `specfit` operations.
#[derive(Debug, Error)]
pub enum SpecFitError {
    /// Raised when a routine returns a result vector of the wrong length.
    #[error(
        "routine `{routine}` returned a malformed result: expected at least {expected} values, found {found}"
    )]
    MalformedResult {
        /// Name of the offending routine.
        routine: String,
        /// The minimum length implied by the routine's parameter list.
        expected: usize,
        /// The length that was actually returned.
        found: usize,
    },

    /// Raised when two components declare the same parameter identity.
    #[error("parameter identity `{identity}` is declared by more than one component")]
    DuplicateParameter { identity: String },

    /// Raised when a parameter identity matches no component.
    #[error("parameter identity `{identity}` matches no component")]
    UnknownParameter { identity: String },

    /// Raised in strict mode when a configured threshold name matches no
    /// parameter of any component.
    #[error("threshold name `{name}` matches no component parameter")]
    UnknownThreshold { name: String },

    /// Raised when a damping factor lies outside the half-open interval (0, 1].
    #[error("damping factor {factor} must lie in (0, 1]")]
    InvalidDampingFactor { factor: f64 },

    /// Raised when an orchestrator is constructed without any routines.
    #[error("at least one fitting routine must be provided")]
    NoRoutines,

    /// Raised when a continuum fit is requested on an empty sample.
    #[error("continuum fit requires at least one sample point")]
    EmptyContinuumInput,

    /// Raised when wavelength and flux arrays disagree in length.
    #[error("continuum input lengths differ: {x_len} wavelengths vs {y_len} fluxes")]
    ContinuumLengthMismatch { x_len: usize, y_len: usize },

    /// Raised when the polynomial degree is too high for the sample count.
    #[error("continuum degree {degree} requires more than {samples} sample points")]
    DegreeTooHigh { degree: usize, samples: usize },

    /// Raised when a least-squares system is too ill-conditioned to solve.
    #[error("matrix in {context} is singular or ill-conditioned")]
    SingularMatrix { context: &'static str },

    /// Raised when a required CSV column is missing.
    #[error("CSV file `{filename}` has no `{column}` column")]
    MissingCsvColumn { filename: String, column: String },

    /// Raised when a CSV cell holds a value that cannot be parsed as a number.
    #[error("invalid numeric value `{value}` in column `{column}` of `{filename}`")]
    InvalidCsvValue {
        filename: String,
        column: String,
        value: String,
    },

    /// Forwarded CSV parsing errors.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Forwarded I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SpecFitError {
    /// Helper to format a [`MalformedResult`](SpecFitError::MalformedResult) error.
    pub fn malformed_result(routine: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::MalformedResult {
            routine: routine.into(),
            expected,
            found,
        }
    }

    /// Helper to raise when a matrix factorization fails due to singularity.
    pub fn singular(context: &'static str) -> Self {
        Self::SingularMatrix { context }
    }

    /// Helper for unknown parameter identities.
    pub fn unknown_parameter(identity: impl Into<String>) -> Self {
        Self::UnknownParameter {
            identity: identity.into(),
        }
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, SpecFitError>;
