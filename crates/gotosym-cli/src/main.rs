//! Command-line driver: load a GOTO program, run symbolic execution, and
//! dispatch the equation to the selected solver.

use clap::{Parser, Subcommand, ValueEnum};
use gotosym_engine::{
    ArraysUf, DefaultHooks, Equation, Executor, Options, PathStorage, StepKind,
};
use gotosym_ir::{GotoFunctions, SymbolTable};
use gotosym_solver::factory::SolverFactory;
use gotosym_solver::{EquationConverter, SatOutcome};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Exit code reported when an assertion can be violated.
const EXIT_VERIFICATION_FAILED: i32 = 10;
/// Exit code for configuration and input errors.
const EXIT_ERROR: i32 = 6;

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("symbolic execution error: {0}")]
    Engine(#[from] gotosym_engine::EngineError),

    #[error("solver error: {0}")]
    Solver(#[from] gotosym_solver::SolverError),
}

type CliResult<T> = Result<T, CliError>;

/// On-disk program: the outer symbol table plus the GOTO function map, as
/// serialized by the front end.
#[derive(Debug, Deserialize)]
struct ProgramFile {
    #[serde(default)]
    symbols: SymbolTable,
    functions: GotoFunctions,
}

#[derive(Parser)]
#[command(name = "gotosym", version)]
#[command(about = "Bounded model checker for GOTO programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ArraysUfArg {
    Never,
    Always,
    Auto,
}

#[derive(Subcommand)]
enum Commands {
    /// Run symbolic execution and check all assertions
    Check {
        /// Serialized GOTO program (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        // -- Bounds --
        /// Maximum instructions per path (0 = unbounded)
        #[arg(long, default_value = "0", help_heading = "Bounds")]
        depth: usize,

        /// Loop unwinding bound
        #[arg(long, help_heading = "Bounds")]
        unwind: Option<u64>,

        /// Recursion unwinding bound
        #[arg(long, help_heading = "Bounds")]
        recursion_limit: Option<u64>,

        /// Emit an unwinding assertion when a loop bound is hit
        #[arg(long, help_heading = "Bounds")]
        unwinding_assertions: bool,

        /// Leave unwound loop tails unmodelled
        #[arg(long, help_heading = "Bounds")]
        partial_loops: bool,

        // -- Engine --
        /// Explore one path at a time instead of merging eagerly
        #[arg(long, help_heading = "Engine")]
        paths: bool,

        /// Unknown pointer dereferences yield a failed object, not an assertion
        #[arg(long, help_heading = "Engine")]
        allow_pointer_unsoundness: bool,

        /// Disable constant propagation
        #[arg(long, help_heading = "Engine")]
        no_propagation: bool,

        /// Replace trivial self-loops with assume(false)
        #[arg(long, help_heading = "Engine")]
        self_loops_to_assumptions: bool,

        /// Disable the algebraic simplifier
        #[arg(long, help_heading = "Engine")]
        no_simplify: bool,

        /// Run post-emission SSA invariant checks
        #[arg(long, help_heading = "Engine")]
        validate_ssa_equation: bool,

        /// Engine debug level
        #[arg(long, default_value = "0", help_heading = "Engine")]
        debug_level: i64,

        // -- Solver selection --
        /// Write DIMACS CNF to the output file
        #[arg(long, help_heading = "Solver")]
        dimacs: bool,

        /// Use lazy bit-vector refinement
        #[arg(long, help_heading = "Solver")]
        refine: bool,

        /// Use string refinement
        #[arg(long, help_heading = "Solver")]
        refine_strings: bool,

        /// Emit SMT-LIB 2 text
        #[arg(long, help_heading = "Solver")]
        smt2: bool,

        #[arg(long, help_heading = "Solver")]
        boolector: bool,
        #[arg(long, help_heading = "Solver")]
        cprover_smt2: bool,
        #[arg(long, help_heading = "Solver")]
        mathsat: bool,
        #[arg(long, help_heading = "Solver")]
        cvc3: bool,
        #[arg(long, help_heading = "Solver")]
        cvc4: bool,
        #[arg(long, help_heading = "Solver")]
        yices: bool,
        #[arg(long, help_heading = "Solver")]
        z3: bool,
        #[arg(long, help_heading = "Solver")]
        generic: bool,

        /// Output file for text back-ends ("-" for stdout)
        #[arg(long, default_value = "", help_heading = "Solver")]
        outfile: String,

        // -- Solver behavior --
        #[arg(long, help_heading = "Solver")]
        beautify: bool,
        #[arg(long, help_heading = "Solver")]
        all_properties: bool,
        #[arg(long, help_heading = "Solver")]
        cover: bool,
        #[arg(long, help_heading = "Solver")]
        incremental_check: bool,

        /// Disable the SAT preprocessor
        #[arg(long, help_heading = "Solver")]
        no_sat_preprocessor: bool,

        /// Unbounded-array handling
        #[arg(long, value_enum, default_value = "auto", help_heading = "Solver")]
        arrays_uf: ArraysUfArg,

        /// Refinement iteration bound
        #[arg(long, help_heading = "Solver")]
        max_node_refinement: Option<u32>,

        #[arg(long, help_heading = "Solver")]
        refine_arrays: bool,
        #[arg(long, help_heading = "Solver")]
        refine_arithmetic: bool,

        /// Enable floating-point axioms in SMT2 output
        #[arg(long, help_heading = "Solver")]
        fpa: bool,

        /// Solver time limit in seconds (0 = unlimited)
        #[arg(long, default_value = "0", help_heading = "Solver")]
        solver_time_limit: i64,
    },

    /// Run symbolic execution and print the SSA equation
    Symex {
        /// Serialized GOTO program (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Loop unwinding bound
        #[arg(long)]
        unwind: Option<u64>,

        /// Disable constant propagation
        #[arg(long)]
        no_propagation: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> CliResult<i32> {
    match cli.command {
        Commands::Check {
            file,
            depth,
            unwind,
            recursion_limit,
            unwinding_assertions,
            partial_loops,
            paths,
            allow_pointer_unsoundness,
            no_propagation,
            self_loops_to_assumptions,
            no_simplify,
            validate_ssa_equation,
            debug_level,
            dimacs,
            refine,
            refine_strings,
            smt2,
            boolector,
            cprover_smt2,
            mathsat,
            cvc3,
            cvc4,
            yices,
            z3,
            generic,
            outfile,
            beautify,
            all_properties,
            cover,
            incremental_check,
            no_sat_preprocessor,
            arrays_uf,
            max_node_refinement,
            refine_arrays,
            refine_arithmetic,
            fpa,
            solver_time_limit,
        } => {
            let program = load_program(&file)?;
            let options = Options {
                depth,
                paths,
                allow_pointer_unsoundness,
                propagation: !no_propagation,
                self_loops_to_assumptions,
                simplify: !no_simplify,
                unwinding_assertions,
                partial_loops,
                debug_level,
                validate_ssa_equation,
                unwind,
                recursion_limit,
                dimacs,
                refine,
                refine_strings,
                smt2,
                boolector,
                cprover_smt2,
                mathsat,
                cvc3,
                cvc4,
                yices,
                z3,
                generic,
                outfile,
                beautify,
                all_properties,
                cover,
                incremental_check,
                sat_preprocessor: !no_sat_preprocessor,
                arrays_uf: match arrays_uf {
                    ArraysUfArg::Never => ArraysUf::Never,
                    ArraysUfArg::Always => ArraysUf::Always,
                    ArraysUfArg::Auto => ArraysUf::Auto,
                },
                max_node_refinement,
                refine_arrays,
                refine_arithmetic,
                fpa,
                solver_time_limit,
            };
            check(&program, &options)
        }
        Commands::Symex {
            file,
            unwind,
            no_propagation,
        } => {
            let program = load_program(&file)?;
            let options = Options {
                unwind,
                propagation: !no_propagation,
                ..Options::default()
            };
            dump_equation(&program, &options)
        }
    }
}

fn load_program(path: &PathBuf) -> CliResult<ProgramFile> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let mut program: ProgramFile =
        serde_json::from_str(&text).map_err(|e| CliError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    program.functions.update();
    Ok(program)
}

/// Run symbolic execution once, or over every path in path-exploration
/// mode, and decide each resulting equation.
fn check(program: &ProgramFile, options: &Options) -> CliResult<i32> {
    // invalid option combinations are reported before any execution
    drop(SolverFactory::new(options).get_solver()?);

    let hooks = DefaultHooks::new(options.unwind, options.recursion_limit);
    let mut equation = Equation::new();
    let mut storage = PathStorage::default();
    let mut executor = Executor::new(
        options,
        &program.symbols,
        &mut equation,
        &mut storage,
        Box::new(hooks),
    );

    let mut state = executor.symex_from_entry_point_of(&program.functions)?;
    let mut failures = 0usize;
    let mut unknowns = Vec::new();
    let mut total_assertions = 0usize;

    if options.paths {
        // drive the worklist: finish the live path, then resume saved ones
        loop {
            if executor.should_pause_symex {
                executor.should_pause_symex = false;
                executor.symex_with_state(&program.functions, &mut state)?;
                continue;
            }
            let path_equation = executor.equation().clone();
            decide_one(
                &path_equation,
                options,
                &mut failures,
                &mut unknowns,
                &mut total_assertions,
            )?;
            match executor.pop_saved_path() {
                Some(saved) => {
                    state = executor
                        .resume_symex_from_saved_state(&program.functions, &saved)?;
                }
                None => break,
            }
        }
    } else {
        let equation = executor.equation().clone();
        decide_one(
            &equation,
            options,
            &mut failures,
            &mut unknowns,
            &mut total_assertions,
        )?;
    }

    info!(
        total_vccs = executor.total_vccs(),
        remaining_vccs = executor.remaining_vccs(),
        "symbolic execution finished"
    );

    println!(
        "** {} of {} checked assertion(s) can fail",
        failures, total_assertions
    );
    for reason in &unknowns {
        println!("** inconclusive: {reason}");
    }
    if failures > 0 {
        println!("VERIFICATION FAILED");
        Ok(EXIT_VERIFICATION_FAILED)
    } else {
        println!("VERIFICATION SUCCESSFUL");
        Ok(0)
    }
}

fn decide_one(
    equation: &Equation,
    options: &Options,
    failures: &mut usize,
    unknowns: &mut Vec<String>,
    total_assertions: &mut usize,
) -> CliResult<()> {
    let assertions: Vec<String> = equation
        .assertions()
        .map(|step| match &step.kind {
            StepKind::Assertion { msg, .. } => format!("[{}] {}", step.source, msg),
            _ => unreachable!(),
        })
        .collect();
    *total_assertions += assertions.len();
    if assertions.is_empty() {
        return Ok(());
    }

    let mut solver = SolverFactory::new(options).get_solver()?;
    solver.convert(equation)?;
    match solver.check()? {
        SatOutcome::Sat => {
            *failures += 1;
            for a in &assertions {
                println!("{a}: FAILURE possible");
            }
        }
        SatOutcome::Unsat => {
            for a in &assertions {
                println!("{a}: SUCCESS");
            }
        }
        SatOutcome::Unknown { reason } => unknowns.push(reason),
    }
    Ok(())
}

fn dump_equation(program: &ProgramFile, options: &Options) -> CliResult<i32> {
    let hooks = DefaultHooks::new(options.unwind, options.recursion_limit);
    let mut equation = Equation::new();
    let mut storage = PathStorage::default();
    let mut executor = Executor::new(
        options,
        &program.symbols,
        &mut equation,
        &mut storage,
        Box::new(hooks),
    );
    executor.symex_from_entry_point_of(&program.functions)?;
    drop(executor);

    for (i, step) in equation.steps().iter().enumerate() {
        let text = match &step.kind {
            StepKind::Assignment { lhs, rhs, .. } => format!("ASSIGN {lhs} := {rhs}"),
            StepKind::Assumption { cond } => format!("ASSUME {cond}"),
            StepKind::Assertion { cond, msg } => format!("ASSERT {cond} ; {msg}"),
            StepKind::Location => "LOCATION".to_owned(),
            StepKind::Decl { ssa } => format!("DECL {ssa}"),
            StepKind::Dead { ssa } => format!("DEAD {ssa}"),
            StepKind::Constraint { cond } => format!("CONSTRAINT {cond}"),
            StepKind::SharedRead { ssa } => format!("SHARED_READ {ssa}"),
            StepKind::SharedWrite { ssa } => format!("SHARED_WRITE {ssa}"),
            StepKind::AtomicBegin => "ATOMIC_BEGIN".to_owned(),
            StepKind::AtomicEnd => "ATOMIC_END".to_owned(),
            StepKind::Spawn => "SPAWN".to_owned(),
        };
        println!(
            "{i:4} T{} [{}] {} // {}",
            step.thread, step.guard, text, step.source
        );
    }
    Ok(0)
}
