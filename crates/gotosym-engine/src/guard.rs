//! Path-condition algebra.
//!
//! A guard is a conjunction of SSA-renamed boolean expressions. Adding
//! `false` collapses the guard, and the engine short-circuits all work under
//! a false guard except scoped cleanup (frame pops, atomic-section closing).

use gotosym_ir::Expr;
use smallvec::SmallVec;

/// A conjunction of path conditions.
#[derive(Debug, Clone, Default)]
pub struct Guard {
    /// Conjuncts; an empty list means `true`. Once `false` is added the list
    /// holds exactly the false constant.
    conjuncts: SmallVec<[Expr; 4]>,
}

impl Guard {
    pub fn new() -> Self {
        Guard::default()
    }

    pub fn is_true(&self) -> bool {
        self.conjuncts.is_empty()
    }

    pub fn is_false(&self) -> bool {
        self.conjuncts.len() == 1 && self.conjuncts[0].is_false()
    }

    pub fn len(&self) -> usize {
        self.conjuncts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty()
    }

    /// Collapse to `false`.
    pub fn make_false(&mut self) {
        self.conjuncts.clear();
        self.conjuncts.push(Expr::false_expr());
    }

    /// Conjoin one expression.
    pub fn add(&mut self, expr: Expr) {
        if self.is_false() || expr.is_true() {
            return;
        }
        if expr.is_false() {
            self.make_false();
            return;
        }
        self.conjuncts.push(expr);
    }

    /// Conjoin all conjuncts of another guard.
    pub fn append(&mut self, other: &Guard) {
        for c in &other.conjuncts {
            self.add(c.clone());
        }
    }

    /// Materialize the conjunction as one expression.
    pub fn as_expr(&self) -> Expr {
        Expr::conjunction(self.conjuncts.iter().cloned())
    }

    /// `self ⇒ expr`; the implication is omitted under a true guard.
    pub fn guard_expr(&self, expr: Expr) -> Expr {
        if self.is_true() {
            expr
        } else if self.is_false() {
            Expr::true_expr()
        } else {
            Expr::implies(self.as_expr(), expr)
        }
    }

    /// Disjunction of two guards, used when merging control flow.
    pub fn disjoin(&self, other: &Guard) -> Guard {
        if self.is_true() || other.is_true() {
            return Guard::new();
        }
        if self.is_false() {
            return other.clone();
        }
        if other.is_false() {
            return self.clone();
        }
        // c ∨ ¬c at a two-way join collapses to true
        if complements(&self.as_expr(), &other.as_expr()) {
            return Guard::new();
        }
        let mut result = Guard::new();
        result.add(Expr::or(self.as_expr(), other.as_expr()));
        result
    }
}

/// Whether one expression is the negation of the other.
fn complements(a: &Expr, b: &Expr) -> bool {
    use gotosym_ir::{ExprKind, UnaryOp};
    let negates = |x: &Expr, y: &Expr| match &x.kind {
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => operand.as_ref() == y,
        _ => false,
    };
    negates(a, b) || negates(b, a)
}
