//! SSA renaming at levels L0 (declaration/thread identity), L1 (call-frame
//! instance) and L2 (write index).
//!
//! Reads use the current L2 version of a variable; writes obtain the next
//! version and advance the counter. The constant-propagation map may
//! substitute a known constant at read time.

use crate::state::SymexState;
use crate::{EngineError, EngineResult};
use gotosym_ir::{Designator, Expr, ExprKind, Ident, Namespace, SsaName, SymbolTable};
use std::sync::Arc;

impl SymexState {
    /// Whether a variable is shared between threads (static and not
    /// thread-local). Unknown names are treated as locals.
    pub fn is_shared(&self, outer: &SymbolTable, ident: Ident) -> bool {
        let ns = Namespace::with_state(outer, &self.symbol_table);
        ns.lookup(ident)
            .map(|s| s.is_static_lifetime && !s.is_thread_local)
            .unwrap_or(false)
    }

    /// Level-0 renaming: fold the owning thread into the identity of
    /// non-shared variables.
    pub fn level0(&self, outer: &SymbolTable, ident: Ident) -> Ident {
        if self.active_thread == 0 || self.is_shared(outer, ident) {
            ident
        } else {
            Ident::new(&format!("{}!{}", ident, self.active_thread))
        }
    }

    /// Level-1 tag: the current activation for locals, 0 for statics.
    fn level1(&self, outer: &SymbolTable, ident: Ident) -> u64 {
        let ns = Namespace::with_state(outer, &self.symbol_table);
        let is_static = ns
            .lookup(ident)
            .map(|s| s.is_static_lifetime)
            .unwrap_or(false);
        if is_static {
            0
        } else {
            self.top_frame().map(|f| f.frame_level).unwrap_or(0)
        }
    }

    /// The L1 key a program variable currently resolves to.
    pub fn l1_key(&self, outer: &SymbolTable, ident: Ident) -> (Ident, u64) {
        let l0 = self.level0(outer, ident);
        (l0, self.level1(outer, l0))
    }

    /// The SSA name a read of `ident` currently resolves to.
    pub fn current_name(&self, outer: &SymbolTable, ident: Ident) -> SsaName {
        let (l0, l1) = self.l1_key(outer, ident);
        let l2 = self.level2.get(&(l0, l1)).copied().unwrap_or(0);
        SsaName::new(l0, l1, l2)
    }

    /// The SSA name for the next write of `ident`; advances the L2 counter.
    /// Versions come from a monotone high-water mark so they stay fresh
    /// across branch restores.
    pub fn ssa_lhs(&mut self, outer: &SymbolTable, ident: Ident) -> SsaName {
        let key = self.l1_key(outer, ident);
        let counter = self.level2_counter.entry(key).or_insert(0);
        *counter += 1;
        let l2 = *counter;
        self.level2.insert(key, l2);
        SsaName::new(key.0, key.1, l2)
    }

    pub fn set_propagation(&mut self, key: (Ident, u64), value: Expr) {
        self.propagation.insert(key, value);
    }

    pub fn clear_propagation(&mut self, key: &(Ident, u64)) {
        self.propagation.remove(key);
    }

    /// L2-rename every program-variable read in `expr`.
    ///
    /// With `propagate` set, reads of variables with a known constant are
    /// substituted by that constant. Shared-variable reads in multithreaded
    /// states are recorded for SHARED_READ emission by the executor.
    pub fn rename_read(&mut self, expr: &Expr, outer: &SymbolTable, propagate: bool) -> Expr {
        match &expr.kind {
            ExprKind::Symbol(id) => {
                let (l0, l1) = self.l1_key(outer, *id);
                if propagate {
                    if let Some(value) = self.propagation.get(&(l0, l1)) {
                        return value.clone();
                    }
                }
                let name = self.current_name(outer, *id);
                let renamed = Expr::ssa(name, expr.ty.clone());
                if self.threads.len() > 1 && self.is_shared(outer, *id) {
                    self.pending_shared_reads.push(renamed.clone());
                }
                renamed
            }
            ExprKind::Ssa(_) | ExprKind::Constant(_) => expr.clone(),
            ExprKind::AddressOf(object) => {
                let renamed = self.rename_address(object, outer);
                Expr::new(ExprKind::AddressOf(Arc::new(renamed)), expr.ty.clone())
            }
            ExprKind::Quantifier { kind, bound, body } => {
                let body = self.rename_read(body, outer, propagate);
                Expr::new(
                    ExprKind::Quantifier {
                        kind: *kind,
                        bound: *bound,
                        body: Arc::new(body),
                    },
                    expr.ty.clone(),
                )
            }
            _ => self.rebuild(expr, outer, propagate),
        }
    }

    /// Rename under address-of: objects keep a stable L2 of 0 because an
    /// address does not change across writes.
    fn rename_address(&mut self, object: &Expr, outer: &SymbolTable) -> Expr {
        match &object.kind {
            ExprKind::Symbol(id) => {
                let (l0, l1) = self.l1_key(outer, *id);
                Expr::ssa(SsaName::new(l0, l1, 0), object.ty.clone())
            }
            ExprKind::Index { array, index } => {
                let array = self.rename_address(array, outer);
                let index = self.rename_read(index, outer, true);
                Expr::new(
                    ExprKind::Index {
                        array: Arc::new(array),
                        index: Arc::new(index),
                    },
                    object.ty.clone(),
                )
            }
            ExprKind::Member { base, field } => {
                let base = self.rename_address(base, outer);
                Expr::new(
                    ExprKind::Member {
                        base: Arc::new(base),
                        field: *field,
                    },
                    object.ty.clone(),
                )
            }
            _ => object.clone(),
        }
    }

    fn rebuild(&mut self, expr: &Expr, outer: &SymbolTable, propagate: bool) -> Expr {
        let kind = match &expr.kind {
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: Arc::new(self.rename_read(operand, outer, propagate)),
            },
            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op: *op,
                lhs: Arc::new(self.rename_read(lhs, outer, propagate)),
                rhs: Arc::new(self.rename_read(rhs, outer, propagate)),
            },
            ExprKind::Ite {
                cond,
                then_value,
                else_value,
            } => ExprKind::Ite {
                cond: Arc::new(self.rename_read(cond, outer, propagate)),
                then_value: Arc::new(self.rename_read(then_value, outer, propagate)),
                else_value: Arc::new(self.rename_read(else_value, outer, propagate)),
            },
            ExprKind::Index { array, index } => ExprKind::Index {
                array: Arc::new(self.rename_read(array, outer, propagate)),
                index: Arc::new(self.rename_read(index, outer, propagate)),
            },
            ExprKind::Member { base, field } => ExprKind::Member {
                base: Arc::new(self.rename_read(base, outer, propagate)),
                field: *field,
            },
            ExprKind::Typecast(inner) => {
                ExprKind::Typecast(Arc::new(self.rename_read(inner, outer, propagate)))
            }
            ExprKind::ByteExtract { base, offset } => ExprKind::ByteExtract {
                base: Arc::new(self.rename_read(base, outer, propagate)),
                offset: Arc::new(self.rename_read(offset, outer, propagate)),
            },
            ExprKind::ByteUpdate {
                base,
                offset,
                value,
            } => ExprKind::ByteUpdate {
                base: Arc::new(self.rename_read(base, outer, propagate)),
                offset: Arc::new(self.rename_read(offset, outer, propagate)),
                value: Arc::new(self.rename_read(value, outer, propagate)),
            },
            ExprKind::With {
                base,
                designator,
                value,
            } => ExprKind::With {
                base: Arc::new(self.rename_read(base, outer, propagate)),
                designator: match designator {
                    Designator::Index(i) => {
                        Designator::Index(Arc::new(self.rename_read(i, outer, propagate)))
                    }
                    Designator::Member(m) => Designator::Member(*m),
                },
                value: Arc::new(self.rename_read(value, outer, propagate)),
            },
            ExprKind::Dereference(pointer) => ExprKind::Dereference(Arc::new(
                self.rename_read(pointer, outer, propagate),
            )),
            ExprKind::FailedObject(pointer) => ExprKind::FailedObject(Arc::new(
                self.rename_read(pointer, outer, propagate),
            )),
            _ => return expr.clone(),
        };
        Expr::new(kind, expr.ty.clone())
    }
}

/// Validation: after renaming, no program-variable symbol may remain.
pub fn assert_fully_renamed(expr: &Expr) -> EngineResult<()> {
    if let Some(id) = first_symbol(expr) {
        return Err(EngineError::Validation(format!(
            "expression contains un-renamed program variable '{id}'"
        )));
    }
    Ok(())
}

fn first_symbol(expr: &Expr) -> Option<Ident> {
    if let ExprKind::Symbol(id) = expr.kind {
        return Some(id);
    }
    expr.operands().iter().find_map(|op| first_symbol(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotosym_ir::{BinOp, Type};

    fn u32_ty() -> Type {
        Type::Unsigned(32)
    }

    #[test]
    fn reads_use_current_version_writes_bump() {
        let mut state = SymexState::new();
        let outer = SymbolTable::new();
        let x = Ident::new("x");

        let read0 = state.rename_read(&Expr::symbol(x, u32_ty()), &outer, false);
        assert_eq!(read0.as_ssa().unwrap().l2, 0);

        let lhs = state.ssa_lhs(&outer, x);
        assert_eq!(lhs.l2, 1);

        let read1 = state.rename_read(&Expr::symbol(x, u32_ty()), &outer, false);
        assert_eq!(read1.as_ssa().unwrap().l2, 1);
    }

    #[test]
    fn propagation_substitutes_constants() {
        let mut state = SymexState::new();
        let outer = SymbolTable::new();
        let x = Ident::new("x");
        let key = state.l1_key(&outer, x);
        state.set_propagation(key, Expr::int_const(7, u32_ty()));

        let e = Expr::binary(
            BinOp::Add,
            Expr::symbol(x, u32_ty()),
            Expr::int_const(1, u32_ty()),
            u32_ty(),
        );
        let renamed = state.rename_read(&e, &outer, true);
        let ops = renamed.operands();
        assert_eq!(ops[0].as_constant_int(), Some(7));

        // propagation off: plain SSA read
        let renamed = state.rename_read(&e, &outer, false);
        assert!(renamed.operands()[0].as_ssa().is_some());
    }

    #[test]
    fn rename_is_total() {
        let mut state = SymexState::new();
        let outer = SymbolTable::new();
        let x = Expr::symbol(Ident::new("x"), u32_ty());
        let y = Expr::symbol(Ident::new("y"), u32_ty());
        let e = Expr::ite(
            Expr::eq(x.clone(), y.clone()),
            Expr::binary(BinOp::Mul, x.clone(), y.clone(), u32_ty()),
            Expr::int_const(0, u32_ty()),
        );
        let renamed = state.rename_read(&e, &outer, true);
        assert!(assert_fully_renamed(&renamed).is_ok());
        assert!(assert_fully_renamed(&e).is_err());
    }

    #[test]
    fn address_of_keeps_stable_l2() {
        let mut state = SymexState::new();
        let outer = SymbolTable::new();
        let x = Ident::new("x");
        state.ssa_lhs(&outer, x);
        state.ssa_lhs(&outer, x);
        let addr = Expr::address_of(Expr::symbol(x, u32_ty()));
        let renamed = state.rename_read(&addr, &outer, true);
        match &renamed.kind {
            ExprKind::AddressOf(obj) => assert_eq!(obj.as_ssa().unwrap().l2, 0),
            other => panic!("expected address-of, got {other:?}"),
        }
    }
}
