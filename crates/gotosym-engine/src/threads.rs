//! Thread spawning and atomic sections.
//!
//! Program-level concurrency is modelled by carrying several thread records
//! in one engine state, advanced cooperatively: a thread runs until its call
//! stack empties, then the next thread takes over. Interleavings beyond this
//! schedule are reconstructed downstream from SHARED_READ/WRITE steps.

use crate::executor::{Executor, FunctionSource};
use crate::state::{Frame, SymexState, Thread};
use crate::{EngineError, EngineResult};
use gotosym_ir::{Pc, SourceLoc};
use tracing::debug;

impl<'a> Executor<'a> {
    /// START_THREAD: allocate a new thread record starting at `target`,
    /// inheriting the spawning thread's guard.
    pub(crate) fn symex_start_thread<F: FunctionSource>(
        &mut self,
        fsource: &F,
        state: &mut SymexState,
        target: usize,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        if state.guard.is_false() {
            return Ok(());
        }
        if self.config.doing_path_exploration {
            return Err(EngineError::Unsupported(
                "threads are not supported with path exploration".to_owned(),
            ));
        }

        let function = state.pc.function;
        let end_of_function = fsource
            .get_goto_function(function)
            .map(|f| f.body.len() - 1)
            .ok_or_else(|| {
                EngineError::Unsupported(format!("spawn in unknown function '{function}'"))
            })?;

        let entry = Pc::new(function, target);
        let mut frame = Frame::new(function, Pc::new(function, end_of_function), end_of_function);
        frame.frame_level = state.next_frame_level();

        let thread_id = state.threads.len();
        state.threads.push(Thread {
            pc: entry,
            guard: state.guard.clone(),
            call_stack: vec![frame],
            atomic_section_id: None,
            active: true,
        });
        debug!(thread = thread_id, target, "spawned thread");

        self.target
            .spawn(state.guard.as_expr(), source.clone(), state.active_thread);
        Ok(())
    }

    /// END_THREAD: the executor has already collapsed the guard; mark the
    /// record inactive.
    pub(crate) fn symex_end_thread(&mut self, state: &mut SymexState) {
        let thread = state.active_thread;
        state.threads[thread].active = false;
    }

    /// ATOMIC_BEGIN: open an atomic section. Sections do not nest.
    pub(crate) fn symex_atomic_begin(
        &mut self,
        state: &mut SymexState,
        source: &SourceLoc,
    ) -> EngineResult<()> {
        if state.guard.is_false() {
            return Ok(());
        }
        if state.atomic_section_id.is_some() {
            return Err(EngineError::Unsupported(
                "nested atomic section".to_owned(),
            ));
        }
        self.atomic_section_counter += 1;
        state.atomic_section_id = Some(self.atomic_section_counter);
        self.target.atomic_begin(
            state.guard.as_expr(),
            source.clone(),
            state.active_thread,
        );
        Ok(())
    }

    /// ATOMIC_END: close the current atomic section. Unlike most work this
    /// runs even under a false guard, releasing the scoped section when an
    /// assumption collapsed the path inside it.
    pub(crate) fn symex_atomic_end(&mut self, state: &mut SymexState, source: &SourceLoc) {
        if state.atomic_section_id.take().is_some() {
            self.target.atomic_end(
                state.guard.as_expr(),
                source.clone(),
                state.active_thread,
            );
        }
    }
}
