//! Error type shared by all modules of this crate
//!
//! Configuration and geometry errors surface from the `setup` and `new`
//! functions, solver failures from the per time step routines.
use thiserror::Error;

/// Result type with [`DgError`] as error
pub type Result<T> = std::result::Result<T, DgError>;

/// Errors raised by the discretization, the solvers and the time integrators
#[derive(Error, Debug)]
pub enum DgError {
    /// Invalid parameter combination or missing setup call
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Iterative solver hit its iteration cap
    #[error("{solver} did not converge within {max_iter} iterations (residual {residual:.3e})")]
    NotConverged {
        /// Name of the failing solver
        solver: &'static str,
        /// Iteration cap
        max_iter: usize,
        /// Residual norm at abort
        residual: f64,
    },
    /// Degenerate numerical state, e.g. a negative invariant
    #[error("numerical failure: {0}")]
    Numerical(String),
    /// Point location or mesh inconsistency
    #[error("geometry error: {0}")]
    Geometry(String),
    /// Restart file could not be opened or written
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Restart file could not be (de)serialized
    #[error("restart archive: {0}")]
    Serialization(#[from] bincode::Error),
}

impl DgError {
    /// Shorthand for [`DgError::Config`]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for [`DgError::Numerical`]
    pub fn numerical<S: Into<String>>(msg: S) -> Self {
        Self::Numerical(msg.into())
    }
}
