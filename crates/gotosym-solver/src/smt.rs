//! Default in-process backend: bit-vector encoding checked by Z3.

use crate::encode::Encoder;
use crate::{EquationConverter, SatOutcome, SolverError, SolverResult};
use gotosym_engine::{ArraysUf, Equation, StepKind};
use gotosym_ir::SsaName;
use std::time::Duration;
use tracing::debug;
use z3::ast::Bool;
use z3::{Model, Params, SatResult, Solver, Tactic};

pub struct SmtBackend {
    encoder: Encoder,
    solver: Solver,
    /// Negated conjunction of these refutes the recorded assertions.
    assertions: Vec<Bool>,
    model: Option<Model>,
    time_limit: Option<Duration>,
}

impl SmtBackend {
    /// `preprocess` keeps Z3's default preprocessing pipeline; without it the
    /// raw smt tactic is used (the beautification-compatible configuration).
    pub fn new(arrays_uf: ArraysUf, preprocess: bool) -> Self {
        let solver = if preprocess {
            Solver::new()
        } else {
            Tactic::new("smt").solver()
        };
        SmtBackend {
            encoder: Encoder::new(arrays_uf, false, false),
            solver,
            assertions: Vec::new(),
            model: None,
            time_limit: None,
        }
    }
}

impl EquationConverter for SmtBackend {
    fn convert(&mut self, equation: &Equation) -> SolverResult<()> {
        convert_steps(&mut self.encoder, &self.solver, &mut self.assertions, equation)
    }

    fn check(&mut self) -> SolverResult<SatOutcome> {
        apply_time_limit(&self.solver, self.time_limit);
        assert_refutation(&self.solver, &self.assertions);
        match self.solver.check() {
            SatResult::Sat => {
                self.model = self.solver.get_model();
                Ok(SatOutcome::Sat)
            }
            SatResult::Unsat => Ok(SatOutcome::Unsat),
            SatResult::Unknown => Ok(SatOutcome::Unknown {
                reason: self
                    .solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "solver returned unknown".to_owned()),
            }),
        }
    }

    fn value_of(&self, name: &SsaName) -> Option<String> {
        model_value(self.model.as_ref()?, &self.encoder, name)
    }

    fn set_time_limit(&mut self, limit: Duration) {
        self.time_limit = Some(limit);
    }

    fn description(&self) -> &'static str {
        "SMT (bit-vector flattening)"
    }
}

/// Shared step-to-solver conversion used by the in-process back-ends.
pub(crate) fn convert_steps(
    encoder: &mut Encoder,
    solver: &Solver,
    assertions: &mut Vec<Bool>,
    equation: &Equation,
) -> SolverResult<()> {
    for step in equation.steps() {
        match &step.kind {
            StepKind::Assignment { lhs, rhs, .. } => {
                let name = lhs.as_ssa().ok_or_else(|| {
                    SolverError::Encoding("assignment lhs is not an SSA name".to_owned())
                })?;
                encoder.assert_assignment(solver, &name.to_string(), &lhs.ty, rhs)?;
            }
            StepKind::Assumption { cond } | StepKind::Constraint { cond } => {
                let b = encoder.encode_bool(cond)?;
                solver.assert(&b);
            }
            StepKind::Assertion { cond, .. } => {
                assertions.push(encoder.encode_bool(cond)?);
            }
            // declarations and scheduling markers carry no constraints
            StepKind::Location
            | StepKind::Decl { .. }
            | StepKind::Dead { .. }
            | StepKind::SharedRead { .. }
            | StepKind::SharedWrite { .. }
            | StepKind::AtomicBegin
            | StepKind::AtomicEnd
            | StepKind::Spawn => {}
        }
    }
    debug!(
        steps = equation.len(),
        assertions = assertions.len(),
        "equation converted"
    );
    Ok(())
}

/// Assert the negation of the conjoined assertions; a model then witnesses a
/// violated assertion.
pub(crate) fn assert_refutation(solver: &Solver, assertions: &[Bool]) {
    if assertions.is_empty() {
        // nothing to refute
        solver.assert(&Bool::from_bool(false));
        return;
    }
    let negated: Vec<Bool> = assertions.iter().map(|a| a.not()).collect();
    solver.assert(&Bool::or(&negated));
}

pub(crate) fn apply_time_limit(solver: &Solver, limit: Option<Duration>) {
    if let Some(limit) = limit {
        let mut params = Params::new();
        params.set_u32("timeout", limit.as_millis() as u32);
        solver.set_params(&params);
    }
}

pub(crate) fn model_value(model: &Model, encoder: &Encoder, name: &SsaName) -> Option<String> {
    use crate::encode::Value;
    match encoder.lookup(name)? {
        Value::Scalar(d) => model.eval(d, true).map(|v| v.to_string()),
        Value::Elems(elems) => {
            let values: Vec<String> = elems
                .iter()
                .filter_map(|e| model.eval(e, true).map(|v| v.to_string()))
                .collect();
            Some(format!("[{}]", values.join(", ")))
        }
        Value::Arr(_) | Value::Abstract(_) => None,
    }
}
