//! Assignment lowering: recursive descent over the left-hand side.
//!
//! Composite lhs forms are rewritten into whole-object updates (`a[i] := v`
//! becomes `a := a with [i := v]`), conditional lhs forms split into guarded
//! assignments, and every chain ends in the symbol case, which bumps the L2
//! version and emits the ASSIGN step.

use crate::equation::AssignmentKind;
use crate::executor::Executor;
use crate::guard::Guard;
use crate::state::SymexState;
use crate::{EngineError, EngineResult};
use gotosym_ir::{Expr, ExprKind, SourceLoc};

impl<'a> Executor<'a> {
    /// Execute `lhs := rhs` under the current path guard.
    pub(crate) fn symex_assign(
        &mut self,
        state: &mut SymexState,
        lhs: Expr,
        rhs: Expr,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        let kind = if state.top_frame().map(|f| f.hidden).unwrap_or(false) {
            AssignmentKind::Hidden
        } else {
            AssignmentKind::State
        };
        self.symex_assign_with_kind(state, lhs, rhs, kind, source)
    }

    pub(crate) fn symex_assign_with_kind(
        &mut self,
        state: &mut SymexState,
        lhs: Expr,
        rhs: Expr,
        kind: AssignmentKind,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        let lhs = self.clean_expr(state, &lhs, source, true)?;
        let rhs = self.clean_expr(state, &rhs, source, false)?;
        let mut assign_guard = Guard::new();
        self.symex_assign_rec(state, &lhs, rhs, &mut assign_guard, kind, source)
    }

    fn symex_assign_rec(
        &mut self,
        state: &mut SymexState,
        lhs: &Expr,
        rhs: Expr,
        guard: &mut Guard,
        kind: AssignmentKind,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        match &lhs.kind {
            ExprKind::Symbol(_) => self.symex_assign_symbol(state, lhs, rhs, guard, kind, source),

            ExprKind::Typecast(inner) => {
                // push the cast onto the rhs, recursing on the inner object
                let cast_back = Expr::typecast(rhs, inner.ty.clone());
                self.symex_assign_rec(state, inner, cast_back, guard, kind, source)
            }

            ExprKind::Index { array, index } => {
                // a[i] := v  ~~>  a := a with [i := v]
                let new_rhs =
                    Expr::with_index((**array).clone(), (**index).clone(), rhs);
                self.symex_assign_rec(state, array, new_rhs, guard, kind, source)
            }

            ExprKind::Member { base, field } => {
                // s.f := v  ~~>  s := s with .f := v
                let new_rhs = Expr::with_member((**base).clone(), *field, rhs);
                self.symex_assign_rec(state, base, new_rhs, guard, kind, source)
            }

            ExprKind::Ite {
                cond,
                then_value,
                else_value,
            } => {
                // split into two guarded assignments
                let mut then_guard = guard.clone();
                then_guard.add((**cond).clone());
                self.symex_assign_rec(state, then_value, rhs.clone(), &mut then_guard, kind, source)?;

                let mut else_guard = guard.clone();
                else_guard.add(Expr::not((**cond).clone()));
                self.symex_assign_rec(state, else_value, rhs, &mut else_guard, kind, source)
            }

            ExprKind::ByteExtract { base, offset } => {
                // read-modify-write over the enclosing object
                let new_rhs =
                    Expr::byte_update((**base).clone(), (**offset).clone(), rhs);
                self.symex_assign_rec(state, base, new_rhs, guard, kind, source)
            }

            ExprKind::FailedObject(_) => {
                // write through an unresolvable pointer: drop the update
                Ok(())
            }

            _ => Err(EngineError::Unsupported(format!(
                "assignment to '{lhs}'"
            ))),
        }
    }

    fn symex_assign_symbol(
        &mut self,
        state: &mut SymexState,
        lhs: &Expr,
        mut rhs: Expr,
        guard: &Guard,
        kind: AssignmentKind,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        let identifier = lhs.as_symbol().expect("symbol lhs");

        // conditional assignment from an ite lhs keeps the old value on the
        // other branch
        if !guard.is_true() {
            rhs = Expr::ite(guard.as_expr(), rhs, lhs.clone());
        }

        // the value set tracks pre-renaming names
        state.value_set.assign(identifier, &rhs);

        let rhs_renamed = self.rename_read(state, &rhs)?;
        let rhs_simplified = self.do_simplify(rhs_renamed);
        self.flush_shared_reads(state, source);

        let name = state.ssa_lhs(self.outer_symbol_table, identifier);
        let key = name.l1_key();
        if self.config.constant_propagation && rhs_simplified.is_constant() {
            state.set_propagation(key, rhs_simplified.clone());
        } else {
            state.clear_propagation(&key);
        }

        let ssa_lhs = Expr::ssa(name, lhs.ty.clone());
        self.target.assignment(
            state.guard.as_expr(),
            ssa_lhs.clone(),
            rhs_simplified,
            source.clone(),
            state.active_thread,
            kind,
        );

        if state.threads.len() > 1 && state.is_shared(self.outer_symbol_table, identifier) {
            self.target.shared_write(
                state.guard.as_expr(),
                ssa_lhs,
                source.clone(),
                state.active_thread,
            );
        }
        Ok(())
    }
}
