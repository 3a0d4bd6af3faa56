//! The instruction interpreter driving symbolic execution.

use crate::config::{Options, SymexConfig};
use crate::equation::Equation;
use crate::hooks::SymexHooks;
use crate::path_storage::{PathStorage, SavedPath};
use crate::renaming::assert_fully_renamed;
use crate::simplify::simplify;
use crate::state::{Frame, SymexState};
use crate::{EngineError, EngineResult};
use gotosym_ir::{
    CodeStatement, Expr, ExprKind, GotoFunction, GotoFunctions, Ident, Instruction,
    InstructionKind, Pc, QuantKind, SourceLoc, Symbol, SymbolTable,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Producer of GOTO function bodies, looked up lazily by name.
pub trait FunctionSource {
    fn get_goto_function(&self, name: Ident) -> Option<&GotoFunction>;
}

impl FunctionSource for GotoFunctions {
    fn get_goto_function(&self, name: Ident) -> Option<&GotoFunction> {
        self.get(name)
    }
}

/// The forward symbolic simulator.
///
/// Owns nothing long-lived: the equation and path storage belong to the
/// caller, the outer symbol table is read-only, and all per-path data lives
/// in the [`SymexState`] threaded through the `symex_*` entry points.
pub struct Executor<'a> {
    pub(crate) config: SymexConfig,
    pub(crate) outer_symbol_table: &'a SymbolTable,
    pub(crate) target: &'a mut Equation,
    pub(crate) path_storage: &'a mut PathStorage,
    pub(crate) hooks: Box<dyn SymexHooks + 'a>,
    pub(crate) atomic_section_counter: u64,
    /// Fresh-name source for dynamically allocated objects. Engine-owned so
    /// concurrent executors can coexist.
    pub(crate) dynamic_counter: u64,
    pub(crate) nondet_counter: u64,
    /// Set when path exploration saved successor states; the caller should
    /// return from the top-level loop and resume from path storage.
    pub should_pause_symex: bool,
    /// VCCs generated since the last branch point (path mode) or overall.
    pub path_segment_vccs: usize,
    total_vccs: usize,
    remaining_vccs: usize,
}

impl<'a> Executor<'a> {
    pub fn new(
        options: &Options,
        outer_symbol_table: &'a SymbolTable,
        target: &'a mut Equation,
        path_storage: &'a mut PathStorage,
        hooks: Box<dyn SymexHooks + 'a>,
    ) -> Self {
        Executor {
            config: SymexConfig::new(options),
            outer_symbol_table,
            target,
            path_storage,
            hooks,
            atomic_section_counter: 0,
            dynamic_counter: 0,
            nondet_counter: 0,
            should_pause_symex: false,
            path_segment_vccs: 0,
            total_vccs: 0,
            remaining_vccs: 0,
        }
    }

    pub fn total_vccs(&self) -> usize {
        self.total_vccs
    }

    pub fn remaining_vccs(&self) -> usize {
        self.remaining_vccs
    }

    /// The equation built so far.
    pub fn equation(&self) -> &Equation {
        self.target
    }

    /// Number of paths waiting in path storage.
    pub fn saved_path_count(&self) -> usize {
        self.path_storage.len()
    }

    /// Take the next suspended path from path storage.
    pub fn pop_saved_path(&mut self) -> Option<SavedPath> {
        self.path_storage.pop()
    }

    pub(crate) fn do_simplify(&self, expr: Expr) -> Expr {
        if self.config.simplify_opt {
            simplify(&expr)
        } else {
            expr
        }
    }

    pub(crate) fn instruction<'f, F: FunctionSource>(
        &self,
        fsource: &'f F,
        pc: Pc,
    ) -> EngineResult<&'f Instruction> {
        fsource
            .get_goto_function(pc.function)
            .and_then(|f| f.body.get(pc.index))
            .ok_or_else(|| {
                EngineError::Unsupported(format!("program counter {pc} has no instruction"))
            })
    }

    /// Move to `to`, resetting the iteration counter of any loop newly
    /// entered by this transition.
    pub(crate) fn symex_transition<F: FunctionSource>(
        &self,
        fsource: &F,
        state: &mut SymexState,
        to: Pc,
        is_backwards_goto: bool,
    ) {
        if !state.call_stack().is_empty() {
            if let Ok(instruction) = self.instruction(fsource, to) {
                let from_location = state.pc.index as u32;
                let reset: Vec<gotosym_ir::LoopId> = instruction
                    .incoming_edges
                    .iter()
                    .filter(|edge| {
                        edge.backwards
                            && (!is_backwards_goto || from_location > edge.location_number)
                    })
                    .map(|edge| gotosym_ir::LoopId {
                        function: to.function,
                        location_number: edge.location_number,
                    })
                    .collect();
                if let Some(frame) = state.top_frame_mut() {
                    for loop_id in reset {
                        frame.loop_iterations.insert(loop_id, 0);
                    }
                }
            }
        }
        state.pc = to;
    }

    pub(crate) fn symex_transition_next<F: FunctionSource>(
        &self,
        fsource: &F,
        state: &mut SymexState,
    ) {
        self.symex_transition(fsource, state, state.pc.next(), false);
    }

    /// Emit SHARED_READ steps for shared variables renamed since the last
    /// flush. Only meaningful in multithreaded states.
    pub(crate) fn flush_shared_reads(&mut self, state: &mut SymexState, source: &SourceLoc) {
        for ssa in state.take_pending_shared_reads() {
            self.target.shared_read(
                state.guard.as_expr(),
                ssa,
                source.clone(),
                state.active_thread,
            );
        }
    }

    /// Rename for reading, honoring constant propagation and the validation
    /// mode contract that no program variable survives.
    pub(crate) fn rename_read(
        &mut self,
        state: &mut SymexState,
        expr: &Expr,
    ) -> EngineResult<Expr> {
        let renamed = state.rename_read(
            expr,
            self.outer_symbol_table,
            self.config.constant_propagation,
        );
        if self.config.run_validation_checks {
            assert_fully_renamed(&renamed)?;
        }
        Ok(renamed)
    }

    /// Execute the instruction at the state's program counter.
    pub fn symex_step<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
    ) -> EngineResult<()> {
        if !self.config.doing_path_exploration {
            self.merge_gotos(fsource, state)?;
        }

        // depth exceeded?
        if self.config.max_depth != 0 && state.depth > self.config.max_depth {
            state.guard.make_false();
        }
        state.depth += 1;

        let instruction = self.instruction(fsource, state.pc)?.clone();
        let source = instruction.source.clone();
        trace!(pc = %state.pc, "symex step");

        match instruction.kind {
            InstructionKind::Skip | InstructionKind::Location => {
                if !state.guard.is_false() {
                    self.target.location(
                        state.guard.as_expr(),
                        source,
                        state.active_thread,
                    );
                }
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::EndFunction => {
                // runs even under a false guard to clear out the frame
                self.symex_end_of_function(state, &source)?;
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::Goto { target, ref cond } => {
                self.symex_goto(fsource, state, target, cond, &source)?;
            }

            InstructionKind::Assume(ref cond) => {
                if !state.guard.is_false() {
                    let cleaned = self.clean_expr(state, cond, &source, false)?;
                    let renamed = self.rename_read(state, &cleaned)?;
                    self.flush_shared_reads(state, &source);
                    self.symex_assume(state, renamed, &source);
                }
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::Assert(ref cond) => {
                if !state.guard.is_false() {
                    let msg = source
                        .comment
                        .clone()
                        .unwrap_or_else(|| "assertion".to_owned());
                    let cleaned = self.clean_expr(state, cond, &source, false)?;
                    self.vcc(state, cleaned, &msg, &source)?;
                }
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::Return(ref value) => {
                if !state.guard.is_false() {
                    self.return_assignment(state, value.clone(), &source)?;
                }
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::Assign { ref lhs, ref rhs } => {
                if !state.guard.is_false() {
                    self.symex_assign(state, lhs.clone(), rhs.clone(), &source)?;
                }
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::FunctionCall {
                ref lhs,
                ref function,
                ref arguments,
            } => {
                if !state.guard.is_false() {
                    let lhs = match lhs {
                        Some(l) => Some(self.clean_expr(state, l, &source, true)?),
                        None => None,
                    };
                    let function = self.clean_expr(state, function, &source, false)?;
                    // arguments are cleaned left-to-right
                    let mut args = Vec::with_capacity(arguments.len());
                    for a in arguments {
                        args.push(self.clean_expr(state, a, &source, false)?);
                    }
                    self.symex_function_call(fsource, state, lhs, function, args, &source)?;
                } else {
                    self.symex_transition_next(fsource, state);
                }
            }

            InstructionKind::Other(ref statement) => {
                if !state.guard.is_false() {
                    self.symex_other(state, statement.clone(), &source)?;
                }
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::Decl { identifier, ref ty } => {
                if !state.guard.is_false() {
                    self.symex_decl(state, identifier, ty.clone(), &source);
                }
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::Dead { identifier, ref ty } => {
                self.symex_dead(state, identifier, ty.clone(), &source);
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::StartThread { target } => {
                self.symex_start_thread(fsource, state, target, &source)?;
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::EndThread => {
                // behaves like assume(false)
                if !state.guard.is_false() {
                    state.guard.make_false();
                    self.symex_end_thread(state);
                }
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::AtomicBegin => {
                self.symex_atomic_begin(state, &source)?;
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::AtomicEnd => {
                self.symex_atomic_end(state, &source);
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::Catch | InstructionKind::Throw => {
                // Exception edges are lowered by the front end; the engine
                // records the location so traces keep the control point.
                if !state.guard.is_false() {
                    self.target.location(
                        state.guard.as_expr(),
                        source,
                        state.active_thread,
                    );
                }
                self.symex_transition_next(fsource, state);
            }

            InstructionKind::NoInstructionType => {
                return Err(EngineError::Unsupported(
                    "symex got NO_INSTRUCTION".to_owned(),
                ));
            }
        }
        Ok(())
    }

    /// Emit a verification condition for `vcc_expr`.
    pub(crate) fn vcc(
        &mut self,
        state: &mut SymexState,
        vcc_expr: Expr,
        msg: &str,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        state.total_vccs += 1;
        self.path_segment_vccs += 1;

        let mut expr = vcc_expr;

        // we are willing to rewrite some quantified expressions
        if expr.has_quantifier() {
            expr = self.do_simplify(expr);
            expr = self.rewrite_quantifiers(state, &expr);
        }

        // now rename; this enables propagation
        expr = self.rename_read(state, &expr)?;

        expr = self.do_simplify(expr);

        if expr.is_true() {
            return Ok(());
        }

        let cond = state.guard.guard_expr(expr);
        state.remaining_vccs += 1;
        self.flush_shared_reads(state, source);
        self.target.assertion(
            state.guard.as_expr(),
            cond,
            msg,
            source.clone(),
            state.active_thread,
        );
        Ok(())
    }

    /// Record an assumption, or strengthen the thread guard in
    /// multithreaded states where step ordering across threads would make a
    /// recorded assumption unsound.
    pub(crate) fn symex_assume(&mut self, state: &mut SymexState, cond: Expr, source: &SourceLoc) {
        let simplified = self.do_simplify(cond);
        if simplified.is_true() {
            return;
        }

        if state.threads.len() == 1 {
            let guarded = state.guard.guard_expr(simplified);
            self.target.assumption(
                state.guard.as_expr(),
                guarded,
                source.clone(),
                state.active_thread,
            );
        } else {
            state.guard.add(simplified);
        }

        if state.atomic_section_id.is_some() && state.guard.is_false() {
            self.symex_atomic_end(state, source);
        }
    }

    /// `forall x. P` becomes `P` with `x` renamed to a fresh L2 generation,
    /// keeping bound variables unique across the equation.
    fn rewrite_quantifiers(&mut self, state: &mut SymexState, expr: &Expr) -> Expr {
        match &expr.kind {
            ExprKind::Quantifier {
                kind: QuantKind::Forall,
                bound,
                body,
            } => {
                let fresh = state.ssa_lhs(self.outer_symbol_table, bound.ident);
                let body = substitute_ssa(body, bound, &fresh);
                self.rewrite_quantifiers(state, &body)
            }
            ExprKind::Binary { op, lhs, rhs }
                if matches!(op, gotosym_ir::BinOp::And | gotosym_ir::BinOp::Or) =>
            {
                let l = self.rewrite_quantifiers(state, lhs);
                let r = self.rewrite_quantifiers(state, rhs);
                Expr::binary(*op, l, r, expr.ty.clone())
            }
            _ => expr.clone(),
        }
    }

    pub(crate) fn symex_decl(
        &mut self,
        state: &mut SymexState,
        identifier: Ident,
        ty: gotosym_ir::Type,
        source: &SourceLoc,
    ) {
        let key = state.l1_key(self.outer_symbol_table, identifier);
        state.clear_propagation(&key);
        state.value_set.erase(identifier);
        let name = state.ssa_lhs(self.outer_symbol_table, identifier);
        if let Some(frame) = state.top_frame_mut() {
            frame.locals.push(identifier);
        }
        self.target.decl(
            state.guard.as_expr(),
            Expr::ssa(name, ty),
            source.clone(),
            state.active_thread,
        );
    }

    pub(crate) fn symex_dead(
        &mut self,
        state: &mut SymexState,
        identifier: Ident,
        ty: gotosym_ir::Type,
        source: &SourceLoc,
    ) {
        let key = state.l1_key(self.outer_symbol_table, identifier);
        state.clear_propagation(&key);
        state.value_set.erase(identifier);
        let name = state.current_name(self.outer_symbol_table, identifier);
        self.target.dead(
            state.guard.as_expr(),
            Expr::ssa(name, ty),
            source.clone(),
            state.active_thread,
        );
    }

    fn symex_other(
        &mut self,
        state: &mut SymexState,
        statement: CodeStatement,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        match statement {
            CodeStatement::Havoc { target } => {
                let cleaned = self.clean_expr(state, &target, source, true)?;
                let rhs = Expr::nondet(cleaned.ty.clone());
                self.symex_assign(state, cleaned, rhs, source)
            }
            CodeStatement::Allocate { lhs, size } => self.symex_allocate(state, lhs, size, source),
            CodeStatement::Expression(e) => {
                // evaluated for side effects only
                self.clean_expr(state, &e, source, false).map(|_| ())
            }
        }
    }

    /// Mint a fresh dynamic object and point `lhs` at it.
    fn symex_allocate(
        &mut self,
        state: &mut SymexState,
        lhs: Expr,
        size: Expr,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        let lhs = self.clean_expr(state, &lhs, source, true)?;
        let size = self.clean_expr(state, &size, source, false)?;
        let size = self.rename_read(state, &size)?;
        let size = self.do_simplify(size);

        let object_name = Ident::new(&self.hooks.dynamic_object_name(self.dynamic_counter));
        self.dynamic_counter += 1;

        let elem_ty = lhs.ty.elem().cloned().unwrap_or(gotosym_ir::Type::Unsigned(8));
        let object_ty = match size.as_constant_int() {
            Some(n) if n > 1 => gotosym_ir::Type::Array {
                elem: Arc::new(elem_ty),
                size: Some(n as u64),
            },
            _ => elem_ty,
        };
        state.symbol_table.insert(Symbol {
            name: object_name,
            ty: object_ty.clone(),
            is_static_lifetime: true,
            is_thread_local: false,
        });
        debug!(object = %object_name, "allocated dynamic object");

        let rhs = Expr::address_of(Expr::symbol(object_name, object_ty));
        self.symex_assign(state, lhs, rhs, source)
    }

    /// Run one step, then hand the processor to the next thread if the
    /// current one has finished its call stack.
    pub fn symex_threaded_step<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
    ) -> EngineResult<()> {
        self.symex_step(fsource, state)?;

        self.total_vccs = state.total_vccs;
        self.remaining_vccs = state.remaining_vccs;

        if self.should_pause_symex {
            return Ok(());
        }

        // is there another thread to execute?
        if state.call_stack().is_empty() && state.active_thread + 1 < state.threads.len() {
            let next = state.active_thread + 1;
            debug!(thread = next, "switching to thread");
            state.switch_to_thread(next);
        }
        Ok(())
    }

    /// Symbolically execute from the state's current program counter until
    /// every thread's call stack is empty or the engine pauses for path
    /// exploration.
    ///
    /// The namespace over the outer and state-owned symbol tables is
    /// constructed per lookup from borrows, so it cannot outlive the call.
    pub fn symex_with_state<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
    ) -> EngineResult<()> {
        if state.call_stack().is_empty() {
            return Ok(());
        }
        self.symex_threaded_step(fsource, state)?;
        if self.should_pause_symex {
            return Ok(());
        }
        while !state.call_stack().is_empty() {
            state.has_saved_jump_target = false;
            state.has_saved_next_instruction = false;
            self.symex_threaded_step(fsource, state)?;
            if self.should_pause_symex {
                return Ok(());
            }
        }

        if self.config.run_validation_checks {
            self.target.validate()?;
        }
        Ok(())
    }

    /// Symbolically execute the entire program from its entry point.
    pub fn symex_from_entry_point_of<F: FunctionSource>(
        &mut self,
        fsource: &F,
    ) -> EngineResult<SymexState> {
        let entry = GotoFunctions::entry_point();
        let mut state = SymexState::new();
        state.run_validation_checks = self.config.run_validation_checks;
        self.initialize_entry_point(fsource, &mut state, entry)?;
        debug!(entry = %entry, "starting symbolic execution");
        self.symex_with_state(fsource, &mut state)?;
        Ok(state)
    }

    /// Resume execution from a state saved during path exploration. The
    /// saved equation prefix replaces the executor's target.
    pub fn resume_symex_from_saved_state<F: FunctionSource>(
        &mut self,
        fsource: &F,
        saved: &SavedPath,
    ) -> EngineResult<SymexState> {
        let mut state = saved.state.clone();
        *self.target = saved.equation.clone();
        self.should_pause_symex = false;
        self.path_segment_vccs = 0;
        self.symex_with_state(fsource, &mut state)?;
        Ok(state)
    }

    pub(crate) fn initialize_entry_point<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
        function_id: Ident,
    ) -> EngineResult<()> {
        let function = fsource
            .get_goto_function(function_id)
            .ok_or(EngineError::NoEntryPoint)?;
        if !function.has_body() {
            return Err(EngineError::NoEntryPoint);
        }
        let end = function.body.len() - 1;
        let mut frame = Frame::new(function_id, Pc::new(function_id, end), end);
        frame.frame_level = state.next_frame_level();
        frame.hidden = function.hidden;
        state.call_stack_mut().push(frame);
        let entry_pc = Pc::new(function_id, 0);
        state.threads[0].pc = entry_pc;
        self.symex_transition(fsource, state, entry_pc, false);
        Ok(())
    }
}

/// Substitute one SSA name for another throughout an expression.
pub(crate) fn substitute_ssa(expr: &Expr, from: &gotosym_ir::SsaName, to: &gotosym_ir::SsaName) -> Expr {
    match &expr.kind {
        ExprKind::Ssa(name) if name == from => Expr::ssa(*to, expr.ty.clone()),
        _ => {
            let ops = expr.operands();
            if ops.is_empty() {
                return expr.clone();
            }
            rebuild_with(expr, |child| substitute_ssa(child, from, to))
        }
    }
}

/// Rebuild an expression applying `f` to each immediate operand.
pub(crate) fn rebuild_with(expr: &Expr, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
    use gotosym_ir::Designator;
    let kind = match &expr.kind {
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op: *op,
            operand: Arc::new(f(operand)),
        },
        ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
            op: *op,
            lhs: Arc::new(f(lhs)),
            rhs: Arc::new(f(rhs)),
        },
        ExprKind::Ite {
            cond,
            then_value,
            else_value,
        } => ExprKind::Ite {
            cond: Arc::new(f(cond)),
            then_value: Arc::new(f(then_value)),
            else_value: Arc::new(f(else_value)),
        },
        ExprKind::Index { array, index } => ExprKind::Index {
            array: Arc::new(f(array)),
            index: Arc::new(f(index)),
        },
        ExprKind::Member { base, field } => ExprKind::Member {
            base: Arc::new(f(base)),
            field: *field,
        },
        ExprKind::Typecast(inner) => ExprKind::Typecast(Arc::new(f(inner))),
        ExprKind::ByteExtract { base, offset } => ExprKind::ByteExtract {
            base: Arc::new(f(base)),
            offset: Arc::new(f(offset)),
        },
        ExprKind::ByteUpdate {
            base,
            offset,
            value,
        } => ExprKind::ByteUpdate {
            base: Arc::new(f(base)),
            offset: Arc::new(f(offset)),
            value: Arc::new(f(value)),
        },
        ExprKind::With {
            base,
            designator,
            value,
        } => ExprKind::With {
            base: Arc::new(f(base)),
            designator: match designator {
                Designator::Index(i) => Designator::Index(Arc::new(f(i))),
                Designator::Member(m) => Designator::Member(*m),
            },
            value: Arc::new(f(value)),
        },
        ExprKind::Quantifier { kind, bound, body } => ExprKind::Quantifier {
            kind: *kind,
            bound: *bound,
            body: Arc::new(f(body)),
        },
        ExprKind::AddressOf(inner) => ExprKind::AddressOf(Arc::new(f(inner))),
        ExprKind::Dereference(inner) => ExprKind::Dereference(Arc::new(f(inner))),
        ExprKind::FailedObject(inner) => ExprKind::FailedObject(Arc::new(f(inner))),
        _ => return expr.clone(),
    };
    Expr::new(kind, expr.ty.clone())
}
