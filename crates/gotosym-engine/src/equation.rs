//! The SSA equation: the engine's sole output.
//!
//! An append-only ordered log of symbolic steps. Steps are immutable after
//! emission; the decision procedure interprets the log as one conjoined
//! formula whose satisfiability refutes the recorded assertions.

use crate::{EngineError, EngineResult};
use gotosym_ir::{Expr, ExprKind, SourceLoc, SsaName};

/// Why an assignment was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentKind {
    /// Regular program state update.
    State,
    /// Front-end instrumentation; elided from user-facing traces.
    Hidden,
    /// φ-function at a control-flow join.
    Phi,
    /// Guard symbol definition for a branch condition.
    Guard,
}

/// One step of the equation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Assignment {
        /// Always an SSA expression; carries the type.
        lhs: Expr,
        rhs: Expr,
        kind: AssignmentKind,
    },
    Assumption {
        cond: Expr,
    },
    Assertion {
        cond: Expr,
        msg: String,
    },
    Location,
    Decl {
        ssa: Expr,
    },
    Dead {
        ssa: Expr,
    },
    /// A global constraint, unguarded by any path condition.
    Constraint {
        cond: Expr,
    },
    SharedRead {
        ssa: Expr,
    },
    SharedWrite {
        ssa: Expr,
    },
    AtomicBegin,
    AtomicEnd,
    Spawn,
}

/// A step plus the context it was emitted under.
#[derive(Debug, Clone)]
pub struct Step {
    pub guard: Expr,
    pub kind: StepKind,
    pub source: SourceLoc,
    pub thread: usize,
}

impl Step {
    pub fn is_assertion(&self) -> bool {
        matches!(self.kind, StepKind::Assertion { .. })
    }
}

/// The append-only step log.
#[derive(Debug, Clone, Default)]
pub struct Equation {
    steps: Vec<Step>,
}

impl Equation {
    pub fn new() -> Self {
        Equation::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn assertions(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_assertion())
    }

    fn push(&mut self, guard: Expr, kind: StepKind, source: SourceLoc, thread: usize) {
        self.steps.push(Step {
            guard,
            kind,
            source,
            thread,
        });
    }

    pub fn assignment(
        &mut self,
        guard: Expr,
        lhs: Expr,
        rhs: Expr,
        source: SourceLoc,
        thread: usize,
        kind: AssignmentKind,
    ) {
        debug_assert!(lhs.as_ssa().is_some(), "assignment lhs must be SSA");
        self.push(
            guard,
            StepKind::Assignment { lhs, rhs, kind },
            source,
            thread,
        );
    }

    pub fn assumption(&mut self, guard: Expr, cond: Expr, source: SourceLoc, thread: usize) {
        self.push(guard, StepKind::Assumption { cond }, source, thread);
    }

    pub fn assertion(
        &mut self,
        guard: Expr,
        cond: Expr,
        msg: impl Into<String>,
        source: SourceLoc,
        thread: usize,
    ) {
        self.push(
            guard,
            StepKind::Assertion {
                cond,
                msg: msg.into(),
            },
            source,
            thread,
        );
    }

    pub fn location(&mut self, guard: Expr, source: SourceLoc, thread: usize) {
        self.push(guard, StepKind::Location, source, thread);
    }

    pub fn decl(&mut self, guard: Expr, ssa: Expr, source: SourceLoc, thread: usize) {
        self.push(guard, StepKind::Decl { ssa }, source, thread);
    }

    pub fn dead(&mut self, guard: Expr, ssa: Expr, source: SourceLoc, thread: usize) {
        self.push(guard, StepKind::Dead { ssa }, source, thread);
    }

    pub fn constraint(&mut self, cond: Expr, source: SourceLoc, thread: usize) {
        self.push(Expr::true_expr(), StepKind::Constraint { cond }, source, thread);
    }

    pub fn shared_read(&mut self, guard: Expr, ssa: Expr, source: SourceLoc, thread: usize) {
        self.push(guard, StepKind::SharedRead { ssa }, source, thread);
    }

    pub fn shared_write(&mut self, guard: Expr, ssa: Expr, source: SourceLoc, thread: usize) {
        self.push(guard, StepKind::SharedWrite { ssa }, source, thread);
    }

    pub fn atomic_begin(&mut self, guard: Expr, source: SourceLoc, thread: usize) {
        self.push(guard, StepKind::AtomicBegin, source, thread);
    }

    pub fn atomic_end(&mut self, guard: Expr, source: SourceLoc, thread: usize) {
        self.push(guard, StepKind::AtomicEnd, source, thread);
    }

    pub fn spawn(&mut self, guard: Expr, source: SourceLoc, thread: usize) {
        self.push(guard, StepKind::Spawn, source, thread);
    }

    /// Check the SSA invariants over the whole log:
    /// no SSA triple is assigned twice, L2 versions increase per name, and
    /// every expression is fully renamed.
    pub fn validate(&self) -> EngineResult<()> {
        let mut assigned: ahash::AHashSet<SsaName> = ahash::AHashSet::new();
        let mut current_l2: ahash::AHashMap<(gotosym_ir::Ident, u64), u64> =
            ahash::AHashMap::new();

        for (i, step) in self.steps.iter().enumerate() {
            for expr in step_exprs(step) {
                check_renamed(expr, i)?;
            }
            if let StepKind::Assignment { lhs, .. } = &step.kind {
                let name = *lhs.as_ssa().expect("assignment lhs is SSA");
                if !assigned.insert(name) {
                    return Err(EngineError::Validation(format!(
                        "step {i}: SSA name {name} assigned twice"
                    )));
                }
                let slot = current_l2.entry(name.l1_key()).or_insert(0);
                if name.l2 <= *slot {
                    return Err(EngineError::Validation(format!(
                        "step {i}: L2 version of {name} does not increase (last was #{})",
                        *slot
                    )));
                }
                *slot = name.l2;
            }
        }
        Ok(())
    }
}

fn step_exprs(step: &Step) -> Vec<&Expr> {
    let mut exprs = vec![&step.guard];
    match &step.kind {
        StepKind::Assignment { lhs, rhs, .. } => {
            exprs.push(lhs);
            exprs.push(rhs);
        }
        StepKind::Assumption { cond }
        | StepKind::Assertion { cond, .. }
        | StepKind::Constraint { cond } => exprs.push(cond),
        StepKind::Decl { ssa }
        | StepKind::Dead { ssa }
        | StepKind::SharedRead { ssa }
        | StepKind::SharedWrite { ssa } => exprs.push(ssa),
        StepKind::Location | StepKind::AtomicBegin | StepKind::AtomicEnd | StepKind::Spawn => {}
    }
    exprs
}

fn check_renamed(expr: &Expr, step_index: usize) -> EngineResult<()> {
    if let Some(bad) = find_symbol(expr) {
        return Err(EngineError::Validation(format!(
            "step {step_index}: program variable '{bad}' is not SSA-renamed"
        )));
    }
    Ok(())
}

fn find_symbol(expr: &Expr) -> Option<gotosym_ir::Ident> {
    if let ExprKind::Symbol(id) = expr.kind {
        return Some(id);
    }
    expr.operands().iter().find_map(|op| find_symbol(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotosym_ir::{Ident, Type};

    fn src() -> SourceLoc {
        SourceLoc::in_function(Ident::new("main"))
    }

    fn ssa(name: &str, l2: u64) -> Expr {
        Expr::ssa(SsaName::new(Ident::new(name), 0, l2), Type::Unsigned(32))
    }

    #[test]
    fn validate_accepts_increasing_l2() {
        let mut eq = Equation::new();
        eq.assignment(
            Expr::true_expr(),
            ssa("x", 1),
            Expr::int_const(1, Type::Unsigned(32)),
            src(),
            0,
            AssignmentKind::State,
        );
        eq.assignment(
            Expr::true_expr(),
            ssa("x", 2),
            Expr::int_const(2, Type::Unsigned(32)),
            src(),
            0,
            AssignmentKind::State,
        );
        assert!(eq.validate().is_ok());
    }

    #[test]
    fn validate_rejects_reassignment() {
        let mut eq = Equation::new();
        for _ in 0..2 {
            eq.assignment(
                Expr::true_expr(),
                ssa("x", 1),
                Expr::int_const(1, Type::Unsigned(32)),
                src(),
                0,
                AssignmentKind::State,
            );
        }
        assert!(matches!(eq.validate(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn validate_rejects_unrenamed_symbol() {
        let mut eq = Equation::new();
        eq.assignment(
            Expr::true_expr(),
            ssa("x", 1),
            Expr::symbol(Ident::new("y"), Type::Unsigned(32)),
            src(),
            0,
            AssignmentKind::State,
        );
        let err = eq.validate().unwrap_err();
        assert!(err.to_string().contains("not SSA-renamed"));
    }
}
