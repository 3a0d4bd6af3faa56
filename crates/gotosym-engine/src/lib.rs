//! Forward symbolic execution for GOTO programs.
//!
//! The executor walks a GOTO program, renaming every write into a fresh SSA
//! name, merging control-flow joins through guarded φ-functions, unwinding
//! loops and recursion up to bounds, and appending the resulting assignments,
//! assumptions and assertions to an [`equation::Equation`]. The equation is
//! the engine's sole output; a decision procedure from `gotosym-solver`
//! checks it for satisfiability.

pub mod assign;
pub mod clean;
pub mod config;
pub mod equation;
pub mod executor;
pub mod function_call;
pub mod goto;
pub mod guard;
pub mod hooks;
pub mod path_storage;
pub mod renaming;
pub mod simplify;
pub mod state;
pub mod threads;
pub mod value_set;

use thiserror::Error;

pub use config::{ArraysUf, Options, SymexConfig};
pub use equation::{AssignmentKind, Equation, Step, StepKind};
pub use executor::{Executor, FunctionSource};
pub use guard::Guard;
pub use hooks::{DefaultHooks, SymexHooks};
pub use path_storage::{PathStorage, SavedPath};
pub use state::SymexState;

/// Symbolic execution error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("the program has no entry point")]
    NoEntryPoint,

    #[error("equation validation failed: {0}")]
    Validation(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
