//! Language-specific override points.
//!
//! The original design exposes these as virtual methods for per-language
//! subclasses; here they form a capability set the executor consults at the
//! corresponding decision points. Every method has a default, so plain
//! bounded checking only needs [`DefaultHooks`].

use gotosym_ir::{Expr, Ident, LoopId};

/// Override points consulted during symbolic execution.
pub trait SymexHooks {
    /// Called when a called function has no body.
    fn no_body(&mut self, _function: Ident) {}

    /// Whether unwinding of the given loop should stop after `unwind`
    /// iterations. `stack_depth` is the call-stack depth at the back edge.
    fn should_stop_unwind(&self, _loop_id: LoopId, _stack_depth: usize, _unwind: u64) -> bool {
        false
    }

    /// Whether recursive unwinding of `function` should stop at `unwind`
    /// active frames.
    fn get_unwind_recursion(&self, _function: Ident, _thread: usize, _unwind: u64) -> bool {
        false
    }

    /// Called once per exceeded loop bound, before the engine emits its
    /// unwinding assertion or assumption.
    fn loop_bound_exceeded(&mut self, _loop_id: LoopId, _unwind: u64) {}

    /// Name minted for the next dynamically allocated object.
    fn dynamic_object_name(&self, counter: u64) -> String {
        format!("dynamic_object${counter}")
    }

    /// Chance to replace the engine's dereference lowering for a pointer;
    /// None keeps the default value-set enumeration.
    fn dereference(&mut self, _pointer: &Expr) -> Option<Expr> {
        None
    }

    /// Chance to intercept a call to a known function symbol; returning true
    /// means the hook handled the call and the engine skips it.
    fn symex_function_call_symbol(&mut self, _function: Ident) -> bool {
        false
    }
}

/// Default capability set: plain unwind and recursion bounds.
#[derive(Debug, Clone, Default)]
pub struct DefaultHooks {
    pub max_unwind: Option<u64>,
    pub max_recursion: Option<u64>,
}

impl DefaultHooks {
    pub fn new(max_unwind: Option<u64>, max_recursion: Option<u64>) -> Self {
        DefaultHooks {
            max_unwind,
            max_recursion,
        }
    }
}

impl SymexHooks for DefaultHooks {
    fn should_stop_unwind(&self, _loop_id: LoopId, _stack_depth: usize, unwind: u64) -> bool {
        self.max_unwind.is_some_and(|bound| unwind >= bound)
    }

    fn get_unwind_recursion(&self, _function: Ident, _thread: usize, unwind: u64) -> bool {
        self.max_recursion.is_some_and(|bound| unwind >= bound)
    }
}
