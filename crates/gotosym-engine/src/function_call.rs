//! Function calls and returns: frame management, parameter passing, the
//! recursion bound, and the return-value shuttle.

use crate::equation::AssignmentKind;
use crate::executor::{Executor, FunctionSource};
use crate::state::{Frame, SymexState};
use crate::{EngineError, EngineResult};
use gotosym_ir::{Expr, ExprKind, Ident, Pc, SourceLoc, Symbol};
use tracing::debug;

/// Per-function symbol shuttling the return value from RETURN to the caller.
fn return_value_ident(function: Ident) -> Ident {
    Ident::new(&format!("{function}::return_value"))
}

impl<'a> Executor<'a> {
    /// Dispatch a call whose operands have been cleaned. The front end's
    /// function-pointer removal guarantees a symbol here; a dereference that
    /// survives cleaning with several candidates is rejected.
    pub(crate) fn symex_function_call<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
        lhs: Option<Expr>,
        function: Expr,
        arguments: Vec<Expr>,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        match &function.kind {
            ExprKind::Symbol(id) => {
                let id = *id;
                self.symex_function_call_symbol(fsource, state, lhs, id, arguments, source)
            }
            _ => Err(EngineError::Unsupported(format!(
                "call through unresolved function expression '{function}'"
            ))),
        }
    }

    fn symex_function_call_symbol<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
        lhs: Option<Expr>,
        function_id: Ident,
        arguments: Vec<Expr>,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        if self.hooks.symex_function_call_symbol(function_id) {
            self.symex_transition_next(fsource, state);
            return Ok(());
        }
        self.symex_function_call_code(fsource, state, lhs, function_id, arguments, source)
    }

    fn symex_function_call_code<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
        lhs: Option<Expr>,
        function_id: Ident,
        arguments: Vec<Expr>,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        let has_body = fsource
            .get_goto_function(function_id)
            .map(|f| f.has_body())
            .unwrap_or(false);
        if !has_body {
            self.hooks.no_body(function_id);
            debug!(function = %function_id, "call to function without body");
            if let Some(lhs) = lhs {
                // havoc the destination
                let rhs = Expr::nondet(lhs.ty.clone());
                self.symex_assign(state, lhs, rhs, source)?;
            }
            self.symex_transition_next(fsource, state);
            return Ok(());
        }

        // recursion bound
        let active_frames = state.recursion_depth(function_id);
        if active_frames > 0
            && self
                .hooks
                .get_unwind_recursion(function_id, state.active_thread, active_frames)
        {
            debug!(function = %function_id, depth = active_frames, "recursion bound reached");
            if self.config.unwinding_assertions {
                self.vcc(state, Expr::false_expr(), "recursion unwinding assertion", source)?;
            }
            if !self.config.partial_loops {
                state.guard.make_false();
            }
            self.symex_transition_next(fsource, state);
            return Ok(());
        }

        // rename arguments in the caller's context before the new frame
        // changes what locals resolve to
        let mut renamed_args = Vec::with_capacity(arguments.len());
        for argument in &arguments {
            let renamed = self.rename_read(state, argument)?;
            renamed_args.push(self.do_simplify(renamed));
        }
        self.flush_shared_reads(state, source);

        let function = fsource
            .get_goto_function(function_id)
            .expect("body checked above");
        let parameters = function.parameters.clone();
        let hidden = function.hidden;
        let end_of_function = function.body.len() - 1;

        let caller_hidden = state.top_frame().map(|f| f.hidden).unwrap_or(false);
        let mut frame = Frame::new(function_id, state.pc, end_of_function);
        frame.frame_level = state.next_frame_level();
        frame.hidden = hidden || caller_hidden;
        frame.return_lhs = lhs;
        state.call_stack_mut().push(frame);

        // parameter assignments in the callee's frame
        let kind = if hidden || caller_hidden {
            AssignmentKind::Hidden
        } else {
            AssignmentKind::State
        };
        for (parameter, argument) in parameters.iter().zip(renamed_args) {
            let param_lhs = Expr::symbol(parameter.identifier, parameter.ty.clone());
            self.symex_assign_with_kind(state, param_lhs, argument, kind, source)?;
            if let Some(frame) = state.top_frame_mut() {
                frame.locals.push(parameter.identifier);
            }
        }

        self.symex_transition(fsource, state, Pc::new(function_id, 0), false);
        Ok(())
    }

    /// `RETURN v` lowers to an assignment into the function's return-value
    /// shuttle symbol; the caller picks it up at END_FUNCTION.
    pub(crate) fn return_assignment(
        &mut self,
        state: &mut SymexState,
        value: Option<Expr>,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        let frame = state.top_frame().ok_or_else(|| {
            EngineError::Unsupported("RETURN outside of a function".to_owned())
        })?;
        let function = frame.function;

        if let Some(value) = value {
            let ret = return_value_ident(function);
            if state.symbol_table.lookup(ret).is_none() {
                state.symbol_table.insert(Symbol {
                    name: ret,
                    ty: value.ty.clone(),
                    is_static_lifetime: false,
                    is_thread_local: false,
                });
            }
            let lhs = Expr::symbol(ret, value.ty.clone());
            self.symex_assign_with_kind(state, lhs, value, AssignmentKind::Hidden, source)?;
        }
        Ok(())
    }

    /// END_FUNCTION: assign the return value to the saved lhs, pop the
    /// frame, and restore the caller's program counter. Runs even under a
    /// false guard so the frame created by a thread spawn is cleared.
    pub(crate) fn symex_end_of_function(
        &mut self,
        state: &mut SymexState,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        let frame = state.top_frame().ok_or_else(|| {
            EngineError::Unsupported("END_FUNCTION with an empty call stack".to_owned())
        })?;
        let function = frame.function;
        let return_lhs = frame.return_lhs.clone();
        let calling_location = frame.calling_location;

        // read the shuttle while the callee frame still resolves its L1
        let return_value = if !state.guard.is_false() && return_lhs.is_some() {
            let ret = return_value_ident(function);
            state.symbol_table.lookup(ret).map(|symbol| {
                let ty = symbol.ty.clone();
                Expr::symbol(ret, ty)
            })
        } else {
            None
        };
        let return_value = match return_value {
            Some(raw) => Some(self.rename_read(state, &raw)?),
            None => None,
        };

        state.call_stack_mut().pop();
        state.pc = calling_location;

        if !state.guard.is_false() {
            if let Some(lhs) = return_lhs {
                let rhs = return_value.unwrap_or_else(|| Expr::nondet(lhs.ty.clone()));
                self.symex_assign(state, lhs, rhs, source)?;
            }
        }
        Ok(())
    }
}
