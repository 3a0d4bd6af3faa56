//! Algebraic simplifier: constant folding and identity elimination.
//!
//! Runs bottom-up and returns the input unchanged when no rule applies.
//! Arithmetic folds with wraparound at the expression's bit width, matching
//! the machine semantics the solver layer encodes.

use gotosym_ir::{BinOp, Expr, ExprKind, Type, UnaryOp};
use std::sync::Arc;

/// Simplify an expression.
pub fn simplify(expr: &Expr) -> Expr {
    let rebuilt = simplify_operands(expr);
    simplify_node(rebuilt)
}

/// Truncate an integer to the value range of the given type.
pub fn truncate(value: i128, ty: &Type) -> i128 {
    match ty {
        Type::Unsigned(w) if *w < 128 => {
            let mask = (1u128 << w) - 1;
            (value as u128 & mask) as i128
        }
        Type::Signed(w) if *w < 128 => {
            let w = *w as u32;
            let shift = 128 - w;
            (value << shift) >> shift
        }
        _ => value,
    }
}

fn simplify_operands(expr: &Expr) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op: *op,
            operand: Arc::new(simplify(operand)),
        },
        ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
            op: *op,
            lhs: Arc::new(simplify(lhs)),
            rhs: Arc::new(simplify(rhs)),
        },
        ExprKind::Ite {
            cond,
            then_value,
            else_value,
        } => ExprKind::Ite {
            cond: Arc::new(simplify(cond)),
            then_value: Arc::new(simplify(then_value)),
            else_value: Arc::new(simplify(else_value)),
        },
        ExprKind::Typecast(inner) => ExprKind::Typecast(Arc::new(simplify(inner))),
        ExprKind::Index { array, index } => ExprKind::Index {
            array: Arc::new(simplify(array)),
            index: Arc::new(simplify(index)),
        },
        ExprKind::Member { base, field } => ExprKind::Member {
            base: Arc::new(simplify(base)),
            field: *field,
        },
        _ => return expr.clone(),
    };
    Expr::new(kind, expr.ty.clone())
}

fn simplify_node(expr: Expr) -> Expr {
    match &expr.kind {
        ExprKind::Unary { op, operand } => simplify_unary(*op, operand, &expr),
        ExprKind::Binary { op, lhs, rhs } => simplify_binary(*op, lhs, rhs, &expr),
        ExprKind::Ite {
            cond,
            then_value,
            else_value,
        } => {
            if let Some(c) = cond.as_constant_bool() {
                return if c {
                    (**then_value).clone()
                } else {
                    (**else_value).clone()
                };
            }
            if then_value == else_value {
                return (**then_value).clone();
            }
            expr
        }
        ExprKind::Typecast(inner) => {
            if inner.ty == expr.ty {
                return (**inner).clone();
            }
            if let Some(n) = inner.as_constant_int() {
                return Expr::int_const(truncate(n, &expr.ty), expr.ty.clone());
            }
            expr
        }
        _ => expr,
    }
}

fn simplify_unary(op: UnaryOp, operand: &Expr, original: &Expr) -> Expr {
    match op {
        UnaryOp::Not => {
            if let Some(b) = operand.as_constant_bool() {
                return Expr::bool_const(!b);
            }
            if let ExprKind::Unary {
                op: UnaryOp::Not,
                operand: inner,
            } = &operand.kind
            {
                return (**inner).clone();
            }
            original.clone()
        }
        UnaryOp::Neg => match operand.as_constant_int() {
            Some(n) => Expr::int_const(truncate(-n, &original.ty), original.ty.clone()),
            None => original.clone(),
        },
        UnaryOp::BitNot => match operand.as_constant_int() {
            Some(n) => Expr::int_const(truncate(!n, &original.ty), original.ty.clone()),
            None => original.clone(),
        },
        UnaryOp::StrLen => original.clone(),
    }
}

fn simplify_binary(op: BinOp, lhs: &Expr, rhs: &Expr, original: &Expr) -> Expr {
    match op {
        BinOp::And => {
            if lhs.is_false() || rhs.is_false() {
                return Expr::false_expr();
            }
            if lhs.is_true() {
                return rhs.clone();
            }
            if rhs.is_true() {
                return lhs.clone();
            }
            original.clone()
        }
        BinOp::Or => {
            if lhs.is_true() || rhs.is_true() {
                return Expr::true_expr();
            }
            if lhs.is_false() {
                return rhs.clone();
            }
            if rhs.is_false() {
                return lhs.clone();
            }
            original.clone()
        }
        BinOp::Implies => {
            if lhs.is_false() || rhs.is_true() {
                return Expr::true_expr();
            }
            if lhs.is_true() {
                return rhs.clone();
            }
            original.clone()
        }
        BinOp::Eq => {
            if lhs == rhs {
                return Expr::true_expr();
            }
            match (lhs.as_constant_int(), rhs.as_constant_int()) {
                (Some(a), Some(b)) => Expr::bool_const(a == b),
                _ => match (lhs.as_constant_bool(), rhs.as_constant_bool()) {
                    (Some(a), Some(b)) => Expr::bool_const(a == b),
                    _ => original.clone(),
                },
            }
        }
        BinOp::Ne => {
            if lhs == rhs {
                return Expr::false_expr();
            }
            match (lhs.as_constant_int(), rhs.as_constant_int()) {
                (Some(a), Some(b)) => Expr::bool_const(a != b),
                _ => original.clone(),
            }
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            match (lhs.as_constant_int(), rhs.as_constant_int()) {
                (Some(a), Some(b)) => Expr::bool_const(match op {
                    BinOp::Lt => a < b,
                    BinOp::Le => a <= b,
                    BinOp::Gt => a > b,
                    _ => a >= b,
                }),
                _ => original.clone(),
            }
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) else {
                return arith_identity(op, lhs, rhs, original);
            };
            let value = match op {
                BinOp::Add => a.wrapping_add(b),
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::Mul => a.wrapping_mul(b),
                BinOp::Div if b != 0 => a.wrapping_div(b),
                BinOp::Mod if b != 0 => a.wrapping_rem(b),
                // Division by zero is left to the solver's semantics.
                _ => return original.clone(),
            };
            Expr::int_const(truncate(value, &original.ty), original.ty.clone())
        }
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
            let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) else {
                return original.clone();
            };
            let value = match op {
                BinOp::BitAnd => a & b,
                BinOp::BitOr => a | b,
                BinOp::BitXor => a ^ b,
                BinOp::Shl => a.wrapping_shl(b as u32),
                _ => a.wrapping_shr(b as u32),
            };
            Expr::int_const(truncate(value, &original.ty), original.ty.clone())
        }
        BinOp::Concat => original.clone(),
    }
}

fn arith_identity(op: BinOp, lhs: &Expr, rhs: &Expr, original: &Expr) -> Expr {
    match op {
        BinOp::Add => {
            if lhs.as_constant_int() == Some(0) {
                return rhs.clone();
            }
            if rhs.as_constant_int() == Some(0) {
                return lhs.clone();
            }
            original.clone()
        }
        BinOp::Sub if rhs.as_constant_int() == Some(0) => lhs.clone(),
        BinOp::Mul => {
            if lhs.as_constant_int() == Some(1) {
                return rhs.clone();
            }
            if rhs.as_constant_int() == Some(1) {
                return lhs.clone();
            }
            if lhs.as_constant_int() == Some(0) || rhs.as_constant_int() == Some(0) {
                return Expr::int_const(0, original.ty.clone());
            }
            original.clone()
        }
        _ => original.clone(),
    }
}
