//! Solver factory: picks exactly one back-end variant from the options and
//! wires it up behind the converter contract.

use crate::dimacs::DimacsConv;
use crate::refinement::RefinementSolver;
use crate::smt::SmtBackend;
use crate::smt2::{Smt2Conv, Smt2SolverKind, Smt2Target};
use crate::{EquationConverter, SolverError, SolverResult};
use gotosym_engine::Options;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub struct SolverFactory<'a> {
    options: &'a Options,
}

impl<'a> SolverFactory<'a> {
    pub fn new(options: &'a Options) -> Self {
        SolverFactory { options }
    }

    /// Construct the selected back-end. Exactly one variant is produced;
    /// invalid option combinations are rejected here, before any work runs.
    pub fn get_solver(&self) -> SolverResult<Box<dyn EquationConverter>> {
        let mut solver = if self.options.dimacs {
            self.get_dimacs()?
        } else if self.options.refine {
            self.get_bv_refinement()?
        } else if self.options.refine_strings {
            self.get_string_refinement()?
        } else if self.options.smt2 {
            self.get_smt2(self.get_smt2_solver_kind())?
        } else {
            self.get_default()?
        };

        if self.options.solver_time_limit > 0 {
            solver.set_time_limit(Duration::from_secs(self.options.solver_time_limit as u64));
        }
        debug!(backend = solver.description(), "solver constructed");
        Ok(solver)
    }

    /// Picks the SMT 2.0 solver variant from the options.
    fn get_smt2_solver_kind(&self) -> Smt2SolverKind {
        let o = self.options;
        if o.boolector {
            Smt2SolverKind::Boolector
        } else if o.cprover_smt2 {
            Smt2SolverKind::CproverSmt2
        } else if o.mathsat {
            Smt2SolverKind::Mathsat
        } else if o.cvc3 {
            Smt2SolverKind::Cvc3
        } else if o.cvc4 {
            Smt2SolverKind::Cvc4
        } else if o.yices {
            Smt2SolverKind::Yices
        } else if o.z3 {
            Smt2SolverKind::Z3
        } else {
            Smt2SolverKind::Generic
        }
    }

    fn get_default(&self) -> SolverResult<Box<dyn EquationConverter>> {
        // the preprocessing pipeline is incompatible with beautification
        let preprocess = self.options.sat_preprocessor && !self.options.beautify;
        Ok(Box::new(SmtBackend::new(
            self.options.arrays_uf,
            preprocess,
        )))
    }

    fn get_dimacs(&self) -> SolverResult<Box<dyn EquationConverter>> {
        self.no_beautification()?;
        self.no_incremental_check()?;
        Ok(Box::new(DimacsConv::new(self.options.outfile.clone())))
    }

    fn get_bv_refinement(&self) -> SolverResult<Box<dyn EquationConverter>> {
        if self.options.sat_preprocessor {
            self.no_beautification()?;
        }
        self.no_incremental_check()?;
        Ok(Box::new(RefinementSolver::new(
            self.options.max_node_refinement,
            self.options.refine_arrays,
            self.options.refine_arithmetic,
        )))
    }

    /// String refinement adds string-theory axioms on top of the bit-vector
    /// refinement loop.
    fn get_string_refinement(&self) -> SolverResult<Box<dyn EquationConverter>> {
        self.no_incremental_check()?;
        Ok(Box::new(RefinementSolver::with_strings(
            self.options.max_node_refinement,
            self.options.refine_arrays,
            self.options.refine_arithmetic,
        )))
    }

    fn get_smt2(&self, kind: Smt2SolverKind) -> SolverResult<Box<dyn EquationConverter>> {
        self.no_beautification()?;

        let outfile = &self.options.outfile;
        let target = if outfile.is_empty() {
            if kind == Smt2SolverKind::Generic {
                return Err(SolverError::InvalidArgument {
                    message: "required filename not provided".to_owned(),
                    option: "--outfile".to_owned(),
                });
            }
            Smt2Target::Pipe
        } else if outfile == "-" {
            Smt2Target::Stdout
        } else {
            Smt2Target::File(PathBuf::from(outfile))
        };

        Ok(Box::new(Smt2Conv::new(kind, target, self.options.fpa)))
    }

    fn no_beautification(&self) -> SolverResult<()> {
        if self.options.beautify {
            return Err(SolverError::InvalidArgument {
                message: "the chosen solver does not support beautification".to_owned(),
                option: "--beautify".to_owned(),
            });
        }
        Ok(())
    }

    fn no_incremental_check(&self) -> SolverResult<()> {
        let option = if self.options.all_properties {
            "--all-properties"
        } else if self.options.cover {
            "--cover"
        } else if self.options.incremental_check {
            "--incremental-check"
        } else {
            return Ok(());
        };
        Err(SolverError::InvalidArgument {
            message: "the chosen solver does not support incremental solving".to_owned(),
            option: option.to_owned(),
        })
    }
}
