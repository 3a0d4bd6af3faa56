//! Solver dispatch for the gotosym model checker.
//!
//! The [`factory::SolverFactory`] inspects the option bag and constructs
//! exactly one back-end behind the [`EquationConverter`] capability
//! contract: an in-process SMT backend, lazy bit-vector refinement, string
//! refinement, SMT-LIB 2 text emission, or DIMACS CNF emission.

pub mod dimacs;
pub mod encode;
pub mod factory;
pub mod refinement;
pub mod smt;
pub mod smt2;

use gotosym_engine::Equation;
use gotosym_ir::SsaName;
use std::time::Duration;
use thiserror::Error;

/// Solver construction or conversion error.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("invalid argument: {message} ({option})")]
    InvalidArgument { message: String, option: String },

    #[error("unsupported construct for solving: {0}")]
    Unsupported(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("I/O error on '{path}': {message}")]
    Io { path: String, message: String },

    #[error("solver process error: {0}")]
    Process(String),
}

pub type SolverResult<T> = Result<T, SolverError>;

/// Result of a satisfiability check over one equation.
///
/// `Sat` means some recorded assertion can be violated; `Unsat` means all
/// assertions hold within the explored bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatOutcome {
    Sat,
    Unsat,
    Unknown { reason: String },
}

/// Capability contract of every back-end the factory can produce: turn an
/// equation into a problem instance, decide it, and report model values.
pub trait EquationConverter {
    /// Load the equation into the back-end.
    fn convert(&mut self, equation: &Equation) -> SolverResult<()>;

    /// Decide the loaded equation.
    fn check(&mut self) -> SolverResult<SatOutcome>;

    /// Textual model value of an SSA name, after a `Sat` outcome.
    fn value_of(&self, name: &SsaName) -> Option<String>;

    /// Apply a wall-clock budget to the underlying decision procedure.
    fn set_time_limit(&mut self, limit: Duration);

    /// Short human-readable tag for logs.
    fn description(&self) -> &'static str;
}
