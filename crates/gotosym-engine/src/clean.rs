//! Expression cleaning: side-effect removal and dereference lowering.
//!
//! `clean_expr` rewrites an instruction operand so that symbolic execution
//! only ever sees pure expressions: non-deterministic choices become fresh
//! declared symbols, and pointer dereferences become guarded case splits
//! over the pointer's value-set targets.

use crate::executor::Executor;
use crate::state::SymexState;
use crate::value_set::Target;
use crate::{EngineError, EngineResult};
use gotosym_ir::{
    Designator, Expr, ExprKind, Ident, Namespace, SideEffect, SourceLoc, Symbol, Type,
};
use std::sync::Arc;

impl<'a> Executor<'a> {
    /// Clean one instruction operand. `write` marks lhs positions, where
    /// byte-extracts survive for the assignment lowering to consume.
    pub(crate) fn clean_expr(
        &mut self,
        state: &mut SymexState,
        expr: &Expr,
        source: &SourceLoc,
        write: bool,
    ) -> EngineResult<Expr> {
        match &expr.kind {
            ExprKind::Constant(_) | ExprKind::Symbol(_) | ExprKind::Ssa(_) => Ok(expr.clone()),

            ExprKind::SideEffect(SideEffect::Nondet) => {
                if write {
                    return Err(EngineError::Unsupported(
                        "non-deterministic choice on the left-hand side".to_owned(),
                    ));
                }
                Ok(self.fresh_nondet(state, expr.ty.clone(), source))
            }

            ExprKind::SideEffect(SideEffect::Allocate { .. }) => Err(EngineError::Unsupported(
                "allocation in expression position".to_owned(),
            )),

            ExprKind::FunctionCall { function, .. } => Err(EngineError::Unsupported(format!(
                "function call in expression position: {function}"
            ))),

            ExprKind::Dereference(pointer) => {
                let pointer = self.clean_expr(state, pointer, source, false)?;
                if let Some(replacement) = self.hooks.dereference(&pointer) {
                    return Ok(replacement);
                }
                self.dereference(state, pointer, &expr.ty, source)
            }

            ExprKind::Unary { op, operand } => {
                let operand = self.clean_expr(state, operand, source, write)?;
                Ok(Expr::unary(*op, operand, expr.ty.clone()))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.clean_expr(state, lhs, source, false)?;
                let rhs = self.clean_expr(state, rhs, source, false)?;
                Ok(Expr::binary(*op, lhs, rhs, expr.ty.clone()))
            }
            ExprKind::Ite {
                cond,
                then_value,
                else_value,
            } => {
                let cond = self.clean_expr(state, cond, source, false)?;
                let then_value = self.clean_expr(state, then_value, source, write)?;
                let else_value = self.clean_expr(state, else_value, source, write)?;
                Ok(Expr::new(
                    ExprKind::Ite {
                        cond: Arc::new(cond),
                        then_value: Arc::new(then_value),
                        else_value: Arc::new(else_value),
                    },
                    expr.ty.clone(),
                ))
            }
            ExprKind::Index { array, index } => {
                let array = self.clean_expr(state, array, source, write)?;
                let index = self.clean_expr(state, index, source, false)?;
                Ok(Expr::new(
                    ExprKind::Index {
                        array: Arc::new(array),
                        index: Arc::new(index),
                    },
                    expr.ty.clone(),
                ))
            }
            ExprKind::Member { base, field } => {
                let base = self.clean_expr(state, base, source, write)?;
                Ok(Expr::new(
                    ExprKind::Member {
                        base: Arc::new(base),
                        field: *field,
                    },
                    expr.ty.clone(),
                ))
            }
            ExprKind::Typecast(inner) => {
                let inner = self.clean_expr(state, inner, source, write)?;
                Ok(Expr::typecast(inner, expr.ty.clone()))
            }
            ExprKind::ByteExtract { base, offset } => {
                let base = self.clean_expr(state, base, source, write)?;
                let offset = self.clean_expr(state, offset, source, false)?;
                Ok(Expr::byte_extract(base, offset, expr.ty.clone()))
            }
            ExprKind::ByteUpdate {
                base,
                offset,
                value,
            } => {
                let base = self.clean_expr(state, base, source, false)?;
                let offset = self.clean_expr(state, offset, source, false)?;
                let value = self.clean_expr(state, value, source, false)?;
                Ok(Expr::byte_update(base, offset, value))
            }
            ExprKind::With {
                base,
                designator,
                value,
            } => {
                let base = self.clean_expr(state, base, source, false)?;
                let value = self.clean_expr(state, value, source, false)?;
                match designator {
                    Designator::Index(i) => {
                        let i = self.clean_expr(state, i, source, false)?;
                        Ok(Expr::with_index(base, i, value))
                    }
                    Designator::Member(m) => Ok(Expr::with_member(base, *m, value)),
                }
            }
            ExprKind::AddressOf(inner) => {
                let inner = self.clean_expr(state, inner, source, false)?;
                Ok(Expr::new(
                    ExprKind::AddressOf(Arc::new(inner)),
                    expr.ty.clone(),
                ))
            }
            ExprKind::Quantifier { kind, bound, body } => {
                let body = self.clean_expr(state, body, source, false)?;
                Ok(Expr::new(
                    ExprKind::Quantifier {
                        kind: *kind,
                        bound: *bound,
                        body: Arc::new(body),
                    },
                    expr.ty.clone(),
                ))
            }
            ExprKind::FailedObject(_) => Ok(expr.clone()),
        }
    }

    /// Replace a non-deterministic choice with a fresh declared symbol.
    fn fresh_nondet(&mut self, state: &mut SymexState, ty: Type, source: &SourceLoc) -> Expr {
        let ident = Ident::new(&format!("symex::nondet{}", self.nondet_counter));
        self.nondet_counter += 1;
        state.symbol_table.insert(Symbol {
            name: ident,
            ty: ty.clone(),
            is_static_lifetime: false,
            is_thread_local: false,
        });
        let name = state.ssa_lhs(self.outer_symbol_table, ident);
        let ssa = Expr::ssa(name, ty);
        self.target.decl(
            state.guard.as_expr(),
            ssa.clone(),
            source.clone(),
            state.active_thread,
        );
        ssa
    }

    /// Lower `*pointer` to a guarded if-then-else over the value-set targets.
    fn dereference(
        &mut self,
        state: &mut SymexState,
        pointer: Expr,
        value_ty: &Type,
        source: &SourceLoc,
    ) -> EngineResult<Expr> {
        let targets = state.value_set.get(&pointer);

        let mut cases: Vec<(Expr, Expr)> = Vec::new();
        let mut invalid = false;
        for target in &targets {
            match target {
                Target::Object { object, offset } => {
                    let object_ty = self.object_type(state, *object, value_ty);
                    let object_expr = Expr::symbol(*object, object_ty.clone());
                    let value = match &object_ty {
                        Type::Array { elem, .. } => {
                            let index =
                                Expr::int_const(offset.unwrap_or(0), Type::Unsigned(64));
                            Expr::new(
                                ExprKind::Index {
                                    array: Arc::new(object_expr.clone()),
                                    index: Arc::new(index),
                                },
                                (**elem).clone(),
                            )
                        }
                        _ => object_expr,
                    };
                    let guard = Expr::eq(pointer.clone(), Expr::address_of(value.clone()));
                    // keep ite branches sort-compatible for the solver
                    let value = if value.ty == *value_ty {
                        value
                    } else {
                        Expr::typecast(value, value_ty.clone())
                    };
                    cases.push((guard, value));
                }
                Target::Null | Target::Unknown => invalid = true,
            }
        }

        if invalid || cases.is_empty() {
            if !self.config.allow_pointer_unsoundness {
                // sound mode: assert the pointer matches some known object
                let valid = Expr::disjunction(cases.iter().map(|(g, _)| g.clone()));
                self.vcc(state, valid, "dereference failure: pointer invalid", source)?;
            }
            if cases.is_empty() {
                return Ok(Expr::failed_object(pointer));
            }
        }

        let mut iter = cases.into_iter().rev();
        let mut result = if invalid {
            Expr::failed_object(pointer.clone())
        } else {
            // last case needs no guard: some target must apply
            iter.next().expect("at least one case").1
        };
        for (guard, value) in iter {
            result = Expr::ite(guard, value, result);
        }
        Ok(result)
    }

    /// Type of a value-set object, looked up through the namespace; falls
    /// back to the expected value type for names minted elsewhere.
    fn object_type(&self, state: &SymexState, object: Ident, fallback: &Type) -> Type {
        let ns = Namespace::with_state(self.outer_symbol_table, &state.symbol_table);
        ns.lookup(object)
            .map(|s| s.ty.clone())
            .unwrap_or_else(|| fallback.clone())
    }
}
