//! Engine and solver options.

/// How the default solver treats unbounded arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArraysUf {
    Never,
    Always,
    #[default]
    Auto,
}

/// The full option bag shared by the engine and the solver factory.
///
/// Field names follow the user-facing flags; see the CLI for the mapping.
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum instructions per path; 0 means unbounded.
    pub depth: usize,
    /// Explore one path at a time instead of eagerly merging.
    pub paths: bool,
    /// Dereference of an unknown pointer yields a failed object instead of
    /// an assertion.
    pub allow_pointer_unsoundness: bool,
    /// Enable the constant-propagation map.
    pub propagation: bool,
    /// Replace trivial self-loops with `assume(false)`.
    pub self_loops_to_assumptions: bool,
    /// Run the algebraic simplifier on emitted expressions.
    pub simplify: bool,
    /// Emit `assert(false)` when a loop bound is hit.
    pub unwinding_assertions: bool,
    /// Leave later loop iterations unmodelled instead of `assume(false)`.
    pub partial_loops: bool,
    pub debug_level: i64,
    /// Run post-emission SSA invariant checks.
    pub validate_ssa_equation: bool,
    /// Loop unwinding bound; None means unbounded.
    pub unwind: Option<u64>,
    /// Recursion unwinding bound; None means unbounded.
    pub recursion_limit: Option<u64>,

    // --- Solver selection ---
    pub dimacs: bool,
    pub refine: bool,
    pub refine_strings: bool,
    pub smt2: bool,
    pub boolector: bool,
    pub cprover_smt2: bool,
    pub mathsat: bool,
    pub cvc3: bool,
    pub cvc4: bool,
    pub yices: bool,
    pub z3: bool,
    pub generic: bool,
    /// Output file: a path, "-" for stdout, empty for in-process.
    pub outfile: String,

    // --- Solver behavior ---
    pub beautify: bool,
    pub all_properties: bool,
    pub cover: bool,
    pub incremental_check: bool,
    pub sat_preprocessor: bool,
    pub arrays_uf: ArraysUf,
    pub max_node_refinement: Option<u32>,
    pub refine_arrays: bool,
    pub refine_arithmetic: bool,
    pub fpa: bool,
    /// Solver time limit in seconds; applied when positive.
    pub solver_time_limit: i64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            depth: 0,
            paths: false,
            allow_pointer_unsoundness: false,
            propagation: true,
            self_loops_to_assumptions: false,
            simplify: true,
            unwinding_assertions: false,
            partial_loops: false,
            debug_level: 0,
            validate_ssa_equation: false,
            unwind: None,
            recursion_limit: None,
            dimacs: false,
            refine: false,
            refine_strings: false,
            smt2: false,
            boolector: false,
            cprover_smt2: false,
            mathsat: false,
            cvc3: false,
            cvc4: false,
            yices: false,
            z3: false,
            generic: false,
            outfile: String::new(),
            beautify: false,
            all_properties: false,
            cover: false,
            incremental_check: false,
            sat_preprocessor: true,
            arrays_uf: ArraysUf::Auto,
            max_node_refinement: None,
            refine_arrays: false,
            refine_arithmetic: false,
            fpa: false,
            solver_time_limit: 0,
        }
    }
}

/// The engine-side slice of [`Options`], fixed for one executor.
#[derive(Debug, Clone)]
pub struct SymexConfig {
    pub max_depth: usize,
    pub doing_path_exploration: bool,
    pub allow_pointer_unsoundness: bool,
    pub constant_propagation: bool,
    pub self_loops_to_assumptions: bool,
    pub simplify_opt: bool,
    pub unwinding_assertions: bool,
    pub partial_loops: bool,
    pub debug_level: i64,
    /// Whether the renaming and equation validation checks run.
    pub run_validation_checks: bool,
}

impl SymexConfig {
    pub fn new(options: &Options) -> Self {
        SymexConfig {
            max_depth: options.depth,
            doing_path_exploration: options.paths,
            allow_pointer_unsoundness: options.allow_pointer_unsoundness,
            constant_propagation: options.propagation,
            self_loops_to_assumptions: options.self_loops_to_assumptions,
            simplify_opt: options.simplify,
            unwinding_assertions: options.unwinding_assertions,
            partial_loops: options.partial_loops,
            debug_level: options.debug_level,
            run_validation_checks: options.validate_ssa_equation,
        }
    }
}
