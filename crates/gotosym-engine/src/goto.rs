//! Branch handling: symbolic gotos, loop unwinding, and control-flow merges.

use crate::equation::AssignmentKind;
use crate::executor::{Executor, FunctionSource};
use crate::state::{GotoState, SymexState};
use crate::{EngineError, EngineResult};
use gotosym_ir::{Expr, ExprKind, Ident, LoopId, Namespace, SourceLoc, SsaName, Symbol, Type, UnaryOp};
use tracing::debug;

/// Identifier of engine-minted branch guard symbols.
fn guard_identifier() -> Ident {
    Ident::new("gotosym::guard")
}

impl<'a> Executor<'a> {
    pub(crate) fn symex_goto<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
        target: usize,
        cond: &Expr,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        let cleaned = self.clean_expr(state, cond, source, false)?;
        let renamed = self.rename_read(state, &cleaned)?;
        self.flush_shared_reads(state, source);
        let new_guard = self.do_simplify(renamed);

        let backwards = target <= state.pc.index;

        if state.guard.is_false() || new_guard.is_false() {
            // branch not taken
            self.symex_transition_next(fsource, state);
            return Ok(());
        }

        if backwards {
            if self.config.self_loops_to_assumptions && target == state.pc.index {
                // a trivial self-loop only exits when the condition is false
                let exit = self.do_simplify(Expr::not(new_guard));
                self.symex_assume(state, exit, source);
                self.symex_transition_next(fsource, state);
                return Ok(());
            }

            let loop_id = LoopId {
                function: state.pc.function,
                location_number: state.pc.index as u32,
            };
            let stack_depth = state.call_stack().len();
            let frame = state
                .top_frame_mut()
                .ok_or_else(|| EngineError::Unsupported("GOTO outside of a function".to_owned()))?;
            let count = frame.loop_iterations.entry(loop_id).or_insert(0);
            *count += 1;
            let unwind = *count;

            if self.hooks.should_stop_unwind(loop_id, stack_depth, unwind) {
                debug!(loop_id = ?loop_id, unwind, "loop bound reached");
                self.hooks.loop_bound_exceeded(loop_id, unwind);
                self.loop_bound_exceeded(state, &new_guard, loop_id, source)?;
                // cut the back edge; execution continues past the loop
                self.symex_transition_next(fsource, state);
                return Ok(());
            }
        }

        if new_guard.is_true() {
            if backwards || self.config.doing_path_exploration {
                let to = state.pc.with_index(target);
                self.symex_transition(fsource, state, to, backwards);
            } else {
                // Unconditional forward jump: queue the state at the target
                // and walk the skipped range dead, so merges stay in program
                // order.
                let goto_state = state.save_goto_state();
                state
                    .top_frame_mut()
                    .expect("branch inside a frame")
                    .goto_states
                    .entry(target)
                    .or_default()
                    .push(goto_state);
                state.guard.make_false();
                self.symex_transition_next(fsource, state);
            }
            return Ok(());
        }

        if self.config.doing_path_exploration {
            self.path_branch(fsource, state, target, new_guard, backwards);
        } else {
            self.eager_branch(fsource, state, target, new_guard, backwards, source);
        }
        Ok(())
    }

    /// A loop (or recursion) bound was hit: emit the unwinding assertion
    /// and/or cut the path, depending on configuration.
    fn loop_bound_exceeded(
        &mut self,
        state: &mut SymexState,
        cond: &Expr,
        loop_id: LoopId,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        let negated_cond = if cond.is_true() {
            Expr::false_expr()
        } else {
            self.do_simplify(Expr::not(cond.clone()))
        };

        if !self.config.partial_loops {
            if self.config.unwinding_assertions {
                let msg = format!("unwinding assertion loop {}", loop_id.location_number);
                self.vcc(state, negated_cond.clone(), &msg, source)?;
            }
            // quietly truncate the path beyond the bound
            state.guard.add(negated_cond);
        }
        Ok(())
    }

    /// Eager-merge mode: queue a snapshot for the join point and continue
    /// with the other side under the negated condition.
    fn eager_branch<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
        target: usize,
        new_guard: Expr,
        backwards: bool,
        source: &SourceLoc,
    ) {
        // Forward: the queued state takes the branch, the live state falls
        // through. Backwards: the live state re-enters the loop, the queued
        // state waits at the loop exit.
        let (live_pc, saved_pc) = if backwards {
            (target, state.pc.index + 1)
        } else {
            (state.pc.index + 1, target)
        };

        let guard_expr = self.guard_symbol_for(state, new_guard, source);
        let negated = self.do_simplify(Expr::not(guard_expr.clone()));
        let (live_cond, saved_cond) = if backwards {
            (guard_expr, negated)
        } else {
            (negated, guard_expr)
        };

        let mut goto_state = state.save_goto_state();
        goto_state.guard.add(saved_cond);
        state
            .top_frame_mut()
            .expect("branch inside a frame")
            .goto_states
            .entry(saved_pc)
            .or_default()
            .push(goto_state);

        state.guard.add(live_cond);
        let to = state.pc.with_index(live_pc);
        self.symex_transition(fsource, state, to, backwards);
    }

    /// Path-exploration mode: save the fall-through successor and continue
    /// with the taken branch only; the caller resumes saved paths later.
    fn path_branch<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
        target: usize,
        new_guard: Expr,
        backwards: bool,
    ) {
        let mut next_state = state.clone();
        next_state.guard
            .add(self.do_simplify(Expr::not(new_guard.clone())));
        next_state.pc = state.pc.next();
        self.path_storage.push(crate::path_storage::SavedPath {
            state: next_state,
            equation: self.target.clone(),
        });
        state.has_saved_next_instruction = true;

        state.guard.add(new_guard);
        let to = state.pc.with_index(target);
        self.symex_transition(fsource, state, to, backwards);
        state.has_saved_jump_target = true;
        self.should_pause_symex = true;
    }

    /// Keep guards small: complex branch conditions are bound to a fresh
    /// boolean guard symbol via a GUARD-kind assignment; trivially simple
    /// conditions are used directly.
    fn guard_symbol_for(
        &mut self,
        state: &mut SymexState,
        cond: Expr,
        source: &SourceLoc,
    ) -> Expr {
        let simple = matches!(cond.kind, ExprKind::Ssa(_))
            || matches!(&cond.kind,
                ExprKind::Unary { op: UnaryOp::Not, operand } if matches!(operand.kind, ExprKind::Ssa(_)));
        if simple {
            return cond;
        }

        let ident = guard_identifier();
        if state.symbol_table.lookup(ident).is_none() {
            state.symbol_table.insert(Symbol {
                name: ident,
                ty: Type::Bool,
                is_static_lifetime: false,
                is_thread_local: false,
            });
        }
        let name = state.ssa_lhs(self.outer_symbol_table, ident);
        let ssa = Expr::ssa(name, Type::Bool);
        self.target.assignment(
            Expr::true_expr(),
            ssa.clone(),
            cond,
            source.clone(),
            state.active_thread,
            AssignmentKind::Guard,
        );
        ssa
    }

    /// Fold every queued state targeting the current program counter back
    /// into the live state. Runs before each instruction in eager mode.
    pub(crate) fn merge_gotos<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
    ) -> EngineResult<()> {
        let index = state.pc.index;
        let queued = match state.top_frame_mut() {
            Some(frame) => frame.goto_states.remove(&index),
            None => None,
        };
        if let Some(queued) = queued {
            let source = self
                .instruction(fsource, state.pc)
                .map(|i| i.source.clone())
                .unwrap_or_else(|_| SourceLoc::in_function(state.pc.function));
            for goto_state in queued {
                self.merge_goto(state, goto_state, &source)?;
            }
        }
        Ok(())
    }

    fn merge_goto(
        &mut self,
        state: &mut SymexState,
        goto_state: GotoState,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        if goto_state.guard.is_false() {
            return Ok(());
        }
        if state.guard.is_false() {
            // the live branch is infeasible: adopt the incoming one wholesale
            state.adopt_goto_state(goto_state);
            return Ok(());
        }

        self.phi_function(state, &goto_state, source);

        state.value_set.merge(&goto_state.value_set);
        state
            .propagation
            .retain(|key, value| goto_state.propagation.get(key) == Some(value));
        state.depth = state.depth.min(goto_state.depth);
        state.guard = goto_state.guard.disjoin(&state.guard);
        Ok(())
    }

    /// Emit `x_new := ite(goto_guard, x_goto, x_live)` for every variable
    /// whose L2 version differs between the incoming and live states.
    fn phi_function(&mut self, state: &mut SymexState, goto_state: &GotoState, source: &SourceLoc) {
        let mut keys: Vec<(Ident, u64)> = Vec::new();
        for key in state.level2.keys().chain(goto_state.level2.keys()) {
            if !keys.contains(key) {
                keys.push(*key);
            }
        }
        keys.sort();

        let guard_ident = guard_identifier();
        for key in keys {
            if key.0 == guard_ident {
                continue;
            }
            let goto_l2 = goto_state.level2.get(&key).copied().unwrap_or(0);
            let live_l2 = state.level2.get(&key).copied().unwrap_or(0);
            if goto_l2 == live_l2 {
                continue;
            }

            let ns = Namespace::with_state(self.outer_symbol_table, &state.symbol_table);
            // thread-suffixed L0 names resolve through their base symbol
            let base = key
                .0
                .as_str()
                .split_once('!')
                .map(|(b, _)| Ident::new(b))
                .unwrap_or(key.0);
            let Some(symbol) = ns.lookup(key.0).or_else(|| ns.lookup(base)) else {
                debug!(ident = %key.0, "phi skipped: no symbol for merged variable");
                continue;
            };
            let ty = symbol.ty.clone();

            let goto_value = Expr::ssa(SsaName::new(key.0, key.1, goto_l2), ty.clone());
            let live_value = Expr::ssa(SsaName::new(key.0, key.1, live_l2), ty.clone());
            let rhs = Expr::ite(goto_state.guard.as_expr(), goto_value, live_value);
            let rhs = self.do_simplify(rhs);

            let counter = state.level2_counter.entry(key).or_insert(0);
            *counter = (*counter).max(goto_l2).max(live_l2) + 1;
            let new_l2 = *counter;
            state.level2.insert(key, new_l2);
            state.clear_propagation(&key);

            let ssa_lhs = Expr::ssa(SsaName::new(key.0, key.1, new_l2), ty);
            self.target.assignment(
                Expr::true_expr(),
                ssa_lhs,
                rhs,
                source.clone(),
                state.active_thread,
                AssignmentKind::Phi,
            );
        }
    }
}
