//! The symbolic execution state: one snapshot of a path in progress.

use crate::guard::Guard;
use crate::value_set::ValueSet;
use gotosym_ir::{Expr, GotoFunctions, Ident, LoopId, Pc, SymbolTable};

/// One activation record on a thread's call stack.
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: Ident,
    /// PC of the FUNCTION_CALL instruction that created this frame.
    pub calling_location: Pc,
    /// Cleaned lhs awaiting the return value, if any.
    pub return_lhs: Option<Expr>,
    /// Index of the function's END_FUNCTION instruction.
    pub end_of_function: usize,
    pub hidden: bool,
    /// L1 tag distinguishing activations of the same function.
    pub frame_level: u64,
    /// Iteration counts per loop, for unwinding bounds.
    pub loop_iterations: ahash::AHashMap<LoopId, u64>,
    /// States queued for merging, keyed by target instruction index.
    pub goto_states: ahash::AHashMap<usize, Vec<GotoState>>,
    /// Locals declared in this frame, for cleanup on pop.
    pub locals: Vec<Ident>,
}

impl Frame {
    pub fn new(function: Ident, calling_location: Pc, end_of_function: usize) -> Self {
        Frame {
            function,
            calling_location,
            return_lhs: None,
            end_of_function,
            hidden: false,
            frame_level: 0,
            loop_iterations: ahash::AHashMap::new(),
            goto_states: ahash::AHashMap::new(),
            locals: Vec::new(),
        }
    }
}

/// One modelled program thread.
#[derive(Debug, Clone)]
pub struct Thread {
    pub pc: Pc,
    pub guard: Guard,
    pub call_stack: Vec<Frame>,
    pub atomic_section_id: Option<u64>,
    pub active: bool,
}

/// Snapshot of the merge-relevant state taken at a branch, to be folded back
/// in by the φ-function at the join point.
#[derive(Debug, Clone)]
pub struct GotoState {
    pub guard: Guard,
    pub level2: ahash::AHashMap<(Ident, u64), u64>,
    pub propagation: ahash::AHashMap<(Ident, u64), Expr>,
    pub value_set: ValueSet,
    pub depth: usize,
    pub atomic_section_id: Option<u64>,
    pub total_vccs: usize,
    pub remaining_vccs: usize,
}

/// The full execution snapshot of one path.
#[derive(Debug, Clone)]
pub struct SymexState {
    pub threads: Vec<Thread>,
    /// Index of the thread currently executing.
    pub active_thread: usize,
    /// PC of the active thread (mirrored out of the thread record).
    pub pc: Pc,
    /// Guard of the active thread (mirrored out of the thread record).
    pub guard: Guard,
    pub atomic_section_id: Option<u64>,
    /// Names minted during execution (nondet choices, dynamic objects).
    pub symbol_table: SymbolTable,
    pub value_set: ValueSet,
    /// Constant propagation per L1 name.
    pub(crate) propagation: ahash::AHashMap<(Ident, u64), Expr>,
    /// Current L2 version per L1 name. Saved and restored across branches.
    pub(crate) level2: ahash::AHashMap<(Ident, u64), u64>,
    /// High-water mark per L1 name. Monotone for the whole run, never
    /// restored at merges, so every write gets a globally fresh version.
    pub(crate) level2_counter: ahash::AHashMap<(Ident, u64), u64>,
    /// Monotonic source of fresh L1 frame tags.
    pub(crate) frame_counter: u64,
    /// Instructions executed along this path.
    pub depth: usize,
    pub total_vccs: usize,
    pub remaining_vccs: usize,
    /// Path-exploration bookkeeping: set when a branch was saved this step.
    pub has_saved_jump_target: bool,
    pub has_saved_next_instruction: bool,
    pub run_validation_checks: bool,
    /// Shared-variable reads observed while renaming, drained by the executor.
    pub(crate) pending_shared_reads: Vec<Expr>,
}

impl Default for SymexState {
    fn default() -> Self {
        let entry = Pc::new(GotoFunctions::entry_point(), 0);
        SymexState {
            threads: vec![Thread {
                pc: entry,
                guard: Guard::new(),
                call_stack: Vec::new(),
                atomic_section_id: None,
                active: true,
            }],
            active_thread: 0,
            pc: entry,
            guard: Guard::new(),
            atomic_section_id: None,
            symbol_table: SymbolTable::new(),
            value_set: ValueSet::new(),
            propagation: ahash::AHashMap::new(),
            level2: ahash::AHashMap::new(),
            level2_counter: ahash::AHashMap::new(),
            frame_counter: 0,
            depth: 0,
            total_vccs: 0,
            remaining_vccs: 0,
            has_saved_jump_target: false,
            has_saved_next_instruction: false,
            run_validation_checks: false,
            pending_shared_reads: Vec::new(),
        }
    }
}

impl SymexState {
    pub fn new() -> Self {
        SymexState::default()
    }

    pub fn call_stack(&self) -> &[Frame] {
        &self.threads[self.active_thread].call_stack
    }

    pub fn call_stack_mut(&mut self) -> &mut Vec<Frame> {
        &mut self.threads[self.active_thread].call_stack
    }

    pub fn top_frame(&self) -> Option<&Frame> {
        self.threads[self.active_thread].call_stack.last()
    }

    pub fn top_frame_mut(&mut self) -> Option<&mut Frame> {
        self.threads[self.active_thread].call_stack.last_mut()
    }

    /// A fresh L1 tag for a new activation.
    pub fn next_frame_level(&mut self) -> u64 {
        self.frame_counter += 1;
        self.frame_counter
    }

    /// Number of active frames of `function` on the current call stack.
    pub fn recursion_depth(&self, function: Ident) -> u64 {
        self.call_stack()
            .iter()
            .filter(|f| f.function == function)
            .count() as u64
    }

    /// Snapshot the merge-relevant parts for a later φ at a join point.
    pub fn save_goto_state(&self) -> GotoState {
        GotoState {
            guard: self.guard.clone(),
            level2: self.level2.clone(),
            propagation: self.propagation.clone(),
            value_set: self.value_set.clone(),
            depth: self.depth,
            atomic_section_id: self.atomic_section_id,
            total_vccs: self.total_vccs,
            remaining_vccs: self.remaining_vccs,
        }
    }

    /// Replace the merge-relevant parts wholesale (used when the current
    /// branch is infeasible and the incoming one is adopted).
    pub fn adopt_goto_state(&mut self, goto_state: GotoState) {
        self.guard = goto_state.guard;
        self.level2 = goto_state.level2;
        self.propagation = goto_state.propagation;
        self.value_set = goto_state.value_set;
        self.depth = goto_state.depth;
        self.atomic_section_id = goto_state.atomic_section_id;
        self.total_vccs = goto_state.total_vccs;
        self.remaining_vccs = goto_state.remaining_vccs;
    }

    pub(crate) fn take_pending_shared_reads(&mut self) -> Vec<Expr> {
        std::mem::take(&mut self.pending_shared_reads)
    }

    /// Save the active thread's mirrored fields back into its record.
    pub fn stash_active_thread(&mut self) {
        let t = self.active_thread;
        self.threads[t].pc = self.pc;
        self.threads[t].guard = self.guard.clone();
        self.threads[t].atomic_section_id = self.atomic_section_id;
    }

    /// Make `thread` the active thread, loading its PC and guard.
    pub fn switch_to_thread(&mut self, thread: usize) {
        debug_assert!(thread < self.threads.len());
        self.stash_active_thread();
        self.active_thread = thread;
        self.pc = self.threads[thread].pc;
        self.guard = self.threads[thread].guard.clone();
        self.atomic_section_id = self.threads[thread].atomic_section_id;
    }
}
