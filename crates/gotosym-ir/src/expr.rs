//! The algebraic expression IR.
//!
//! Expressions are immutable values; operands are shared behind `Arc` so
//! states can be forked at branch points without deep copies. Rewrites
//! (renaming, cleaning, simplification) always build new nodes.

use crate::ident::Ident;
use crate::ty::Type;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An SSA-renamed symbol: original name plus the L1 call-frame tag and the
/// L2 write index. Two SSA names are equal iff all three components match.
/// The L0 declaration identity is folded into `ident` by level-0 renaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SsaName {
    pub ident: Ident,
    pub l1: u64,
    pub l2: u64,
}

impl SsaName {
    pub fn new(ident: Ident, l1: u64, l2: u64) -> Self {
        SsaName { ident, l1, l2 }
    }

    /// The L1 instance this name belongs to, ignoring the write index.
    pub fn l1_key(&self) -> (Ident, u64) {
        (self.ident, self.l1)
    }

    /// The same instance at a different write index.
    pub fn with_l2(&self, l2: u64) -> Self {
        SsaName { l2, ..*self }
    }
}

impl fmt::Display for SsaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.ident, self.l1, self.l2)
    }
}

/// A literal constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Bool(bool),
    /// Integer payload; the expression's type fixes width and signedness.
    Integer(i128),
    /// The null pointer.
    Null,
    /// String literal (string-refinement backend only).
    StringLit(Arc<str>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    // Logical
    And,
    Or,
    Implies,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Bit-level
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    // Strings
    Concat,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    BitNot,
    StrLen,
}

/// Quantifier kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantKind {
    Forall,
    Exists,
}

/// Side effects embedded in expressions; removed by the engine's cleaner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SideEffect {
    /// A non-deterministic choice of the carrying expression's type.
    Nondet,
    /// Dynamic allocation of `size` bytes.
    Allocate { size: Arc<Expr> },
}

/// Field or index position for functional updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Designator {
    Index(Arc<Expr>),
    Member(Ident),
}

/// Expression node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprKind {
    Constant(Constant),
    /// A program variable, not yet SSA-renamed.
    Symbol(Ident),
    /// An SSA-renamed symbol.
    Ssa(SsaName),
    Unary {
        op: UnaryOp,
        operand: Arc<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Arc<Expr>,
        rhs: Arc<Expr>,
    },
    Ite {
        cond: Arc<Expr>,
        then_value: Arc<Expr>,
        else_value: Arc<Expr>,
    },
    Index {
        array: Arc<Expr>,
        index: Arc<Expr>,
    },
    Member {
        base: Arc<Expr>,
        field: Ident,
    },
    Typecast(Arc<Expr>),
    /// Read `ty`-typed bits at a byte offset of `base`.
    ByteExtract {
        base: Arc<Expr>,
        offset: Arc<Expr>,
    },
    /// `base` with the bytes at `offset` replaced by `value`.
    ByteUpdate {
        base: Arc<Expr>,
        offset: Arc<Expr>,
        value: Arc<Expr>,
    },
    /// Functional update: `base` with the designated position set to `value`.
    With {
        base: Arc<Expr>,
        designator: Designator,
        value: Arc<Expr>,
    },
    Quantifier {
        kind: QuantKind,
        bound: SsaName,
        body: Arc<Expr>,
    },
    AddressOf(Arc<Expr>),
    Dereference(Arc<Expr>),
    /// Placeholder object for a dereference the value set could not resolve.
    FailedObject(Arc<Expr>),
    /// Function application in expression position; the front end is expected
    /// to lower these to FUNCTION_CALL instructions.
    FunctionCall {
        function: Arc<Expr>,
        arguments: Arc<Vec<Expr>>,
    },
    SideEffect(SideEffect),
}

/// An expression: a kind tag plus its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Expr { kind, ty }
    }

    // --- Constructors ---

    pub fn bool_const(value: bool) -> Self {
        Expr::new(ExprKind::Constant(Constant::Bool(value)), Type::Bool)
    }

    pub fn true_expr() -> Self {
        Expr::bool_const(true)
    }

    pub fn false_expr() -> Self {
        Expr::bool_const(false)
    }

    pub fn int_const(value: i128, ty: Type) -> Self {
        Expr::new(ExprKind::Constant(Constant::Integer(value)), ty)
    }

    pub fn null_pointer(ty: Type) -> Self {
        Expr::new(ExprKind::Constant(Constant::Null), ty)
    }

    pub fn symbol(ident: Ident, ty: Type) -> Self {
        Expr::new(ExprKind::Symbol(ident), ty)
    }

    pub fn ssa(name: SsaName, ty: Type) -> Self {
        Expr::new(ExprKind::Ssa(name), ty)
    }

    pub fn nondet(ty: Type) -> Self {
        Expr::new(ExprKind::SideEffect(SideEffect::Nondet), ty)
    }

    pub fn unary(op: UnaryOp, operand: Expr, ty: Type) -> Self {
        Expr::new(
            ExprKind::Unary {
                op,
                operand: Arc::new(operand),
            },
            ty,
        )
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr, ty: Type) -> Self {
        Expr::new(
            ExprKind::Binary {
                op,
                lhs: Arc::new(lhs),
                rhs: Arc::new(rhs),
            },
            ty,
        )
    }

    pub fn not(operand: Expr) -> Self {
        Expr::unary(UnaryOp::Not, operand, Type::Bool)
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::And, lhs, rhs, Type::Bool)
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Or, lhs, rhs, Type::Bool)
    }

    pub fn implies(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Implies, lhs, rhs, Type::Bool)
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Eq, lhs, rhs, Type::Bool)
    }

    pub fn ne(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Ne, lhs, rhs, Type::Bool)
    }

    pub fn ite(cond: Expr, then_value: Expr, else_value: Expr) -> Self {
        let ty = then_value.ty.clone();
        Expr::new(
            ExprKind::Ite {
                cond: Arc::new(cond),
                then_value: Arc::new(then_value),
                else_value: Arc::new(else_value),
            },
            ty,
        )
    }

    pub fn index(array: Expr, index: Expr) -> Self {
        let ty = array.ty.elem().cloned().unwrap_or(Type::Empty);
        Expr::new(
            ExprKind::Index {
                array: Arc::new(array),
                index: Arc::new(index),
            },
            ty,
        )
    }

    pub fn member(base: Expr, field: Ident) -> Self {
        let ty = base.ty.field(field).cloned().unwrap_or(Type::Empty);
        Expr::new(
            ExprKind::Member {
                base: Arc::new(base),
                field,
            },
            ty,
        )
    }

    pub fn typecast(inner: Expr, ty: Type) -> Self {
        Expr::new(ExprKind::Typecast(Arc::new(inner)), ty)
    }

    pub fn address_of(object: Expr) -> Self {
        let ty = Type::Pointer(Arc::new(object.ty.clone()));
        Expr::new(ExprKind::AddressOf(Arc::new(object)), ty)
    }

    pub fn dereference(pointer: Expr) -> Self {
        let ty = pointer.ty.elem().cloned().unwrap_or(Type::Empty);
        Expr::new(ExprKind::Dereference(Arc::new(pointer)), ty)
    }

    pub fn failed_object(pointer: Expr) -> Self {
        let ty = pointer.ty.elem().cloned().unwrap_or(Type::Empty);
        Expr::new(ExprKind::FailedObject(Arc::new(pointer)), ty)
    }

    pub fn with_index(base: Expr, index: Expr, value: Expr) -> Self {
        let ty = base.ty.clone();
        Expr::new(
            ExprKind::With {
                base: Arc::new(base),
                designator: Designator::Index(Arc::new(index)),
                value: Arc::new(value),
            },
            ty,
        )
    }

    pub fn with_member(base: Expr, field: Ident, value: Expr) -> Self {
        let ty = base.ty.clone();
        Expr::new(
            ExprKind::With {
                base: Arc::new(base),
                designator: Designator::Member(field),
                value: Arc::new(value),
            },
            ty,
        )
    }

    pub fn byte_extract(base: Expr, offset: Expr, ty: Type) -> Self {
        Expr::new(
            ExprKind::ByteExtract {
                base: Arc::new(base),
                offset: Arc::new(offset),
            },
            ty,
        )
    }

    pub fn byte_update(base: Expr, offset: Expr, value: Expr) -> Self {
        let ty = base.ty.clone();
        Expr::new(
            ExprKind::ByteUpdate {
                base: Arc::new(base),
                offset: Arc::new(offset),
                value: Arc::new(value),
            },
            ty,
        )
    }

    pub fn quantifier(kind: QuantKind, bound: SsaName, body: Expr) -> Self {
        Expr::new(
            ExprKind::Quantifier {
                kind,
                bound,
                body: Arc::new(body),
            },
            Type::Bool,
        )
    }

    /// Conjunction of the given expressions; `true` when empty.
    pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Self {
        let mut result: Option<Expr> = None;
        for e in exprs {
            if e.is_false() {
                return Expr::false_expr();
            }
            if e.is_true() {
                continue;
            }
            result = Some(match result {
                None => e,
                Some(acc) => Expr::and(acc, e),
            });
        }
        result.unwrap_or_else(Expr::true_expr)
    }

    /// Disjunction of the given expressions; `false` when empty.
    pub fn disjunction(exprs: impl IntoIterator<Item = Expr>) -> Self {
        let mut result: Option<Expr> = None;
        for e in exprs {
            if e.is_true() {
                return Expr::true_expr();
            }
            if e.is_false() {
                continue;
            }
            result = Some(match result {
                None => e,
                Some(acc) => Expr::or(acc, e),
            });
        }
        result.unwrap_or_else(Expr::false_expr)
    }

    // --- Predicates and accessors ---

    pub fn is_true(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(Constant::Bool(true)))
    }

    pub fn is_false(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(Constant::Bool(false)))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(_))
    }

    pub fn as_constant_bool(&self) -> Option<bool> {
        match &self.kind {
            ExprKind::Constant(Constant::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_constant_int(&self) -> Option<i128> {
        match &self.kind {
            ExprKind::Constant(Constant::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_ssa(&self) -> Option<&SsaName> {
        match &self.kind {
            ExprKind::Ssa(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<Ident> {
        match &self.kind {
            ExprKind::Symbol(id) => Some(*id),
            _ => None,
        }
    }

    /// Immediate sub-expressions, in evaluation order.
    pub fn operands(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Constant(_)
            | ExprKind::Symbol(_)
            | ExprKind::Ssa(_)
            | ExprKind::SideEffect(SideEffect::Nondet) => Vec::new(),
            ExprKind::SideEffect(SideEffect::Allocate { size }) => vec![size],
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            ExprKind::Ite {
                cond,
                then_value,
                else_value,
            } => vec![cond, then_value, else_value],
            ExprKind::Index { array, index } => vec![array, index],
            ExprKind::Member { base, .. } => vec![base],
            ExprKind::Typecast(inner) => vec![inner],
            ExprKind::ByteExtract { base, offset } => vec![base, offset],
            ExprKind::ByteUpdate {
                base,
                offset,
                value,
            } => vec![base, offset, value],
            ExprKind::With {
                base,
                designator,
                value,
            } => match designator {
                Designator::Index(i) => vec![base, i, value],
                Designator::Member(_) => vec![base, value],
            },
            ExprKind::Quantifier { body, .. } => vec![body],
            ExprKind::AddressOf(inner)
            | ExprKind::Dereference(inner)
            | ExprKind::FailedObject(inner) => vec![inner],
            ExprKind::FunctionCall {
                function,
                arguments,
            } => {
                let mut ops = vec![function.as_ref()];
                ops.extend(arguments.iter());
                ops
            }
        }
    }

    /// Whether any node in the tree satisfies the predicate.
    pub fn has_subexpr(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        self.operands().iter().any(|op| op.has_subexpr(pred))
    }

    pub fn has_dereference(&self) -> bool {
        self.has_subexpr(&|e| matches!(e.kind, ExprKind::Dereference(_)))
    }

    pub fn has_quantifier(&self) -> bool {
        self.has_subexpr(&|e| matches!(e.kind, ExprKind::Quantifier { .. }))
    }

    pub fn has_side_effect(&self) -> bool {
        self.has_subexpr(&|e| matches!(e.kind, ExprKind::SideEffect(_)))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Constant(Constant::Bool(b)) => write!(f, "{b}"),
            ExprKind::Constant(Constant::Integer(n)) => write!(f, "{n}"),
            ExprKind::Constant(Constant::Null) => write!(f, "NULL"),
            ExprKind::Constant(Constant::StringLit(s)) => write!(f, "{s:?}"),
            ExprKind::Symbol(id) => write!(f, "{id}"),
            ExprKind::Ssa(name) => write!(f, "{name}"),
            ExprKind::Unary { op, operand } => {
                let sym = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                    UnaryOp::BitNot => "~",
                    UnaryOp::StrLen => "strlen ",
                };
                write!(f, "{sym}{operand}")
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let sym = match op {
                    BinOp::And => "&&",
                    BinOp::Or => "||",
                    BinOp::Implies => "==>",
                    BinOp::Eq => "==",
                    BinOp::Ne => "!=",
                    BinOp::Lt => "<",
                    BinOp::Le => "<=",
                    BinOp::Gt => ">",
                    BinOp::Ge => ">=",
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Mod => "%",
                    BinOp::BitAnd => "&",
                    BinOp::BitOr => "|",
                    BinOp::BitXor => "^",
                    BinOp::Shl => "<<",
                    BinOp::Shr => ">>",
                    BinOp::Concat => "++",
                };
                write!(f, "({lhs} {sym} {rhs})")
            }
            ExprKind::Ite {
                cond,
                then_value,
                else_value,
            } => write!(f, "({cond} ? {then_value} : {else_value})"),
            ExprKind::Index { array, index } => write!(f, "{array}[{index}]"),
            ExprKind::Member { base, field } => write!(f, "{base}.{field}"),
            ExprKind::Typecast(inner) => write!(f, "({})({inner})", self.ty),
            ExprKind::ByteExtract { base, offset } => {
                write!(f, "byte_extract({base}, {offset})")
            }
            ExprKind::ByteUpdate {
                base,
                offset,
                value,
            } => write!(f, "byte_update({base}, {offset}, {value})"),
            ExprKind::With {
                base,
                designator: Designator::Index(i),
                value,
            } => write!(f, "{base} with [{i}:={value}]"),
            ExprKind::With {
                base,
                designator: Designator::Member(m),
                value,
            } => write!(f, "{base} with .{m}:={value}"),
            ExprKind::Quantifier { kind, bound, body } => {
                let q = match kind {
                    QuantKind::Forall => "forall",
                    QuantKind::Exists => "exists",
                };
                write!(f, "({q} {bound}. {body})")
            }
            ExprKind::AddressOf(inner) => write!(f, "&{inner}"),
            ExprKind::Dereference(inner) => write!(f, "*{inner}"),
            ExprKind::FailedObject(inner) => write!(f, "failed_object({inner})"),
            ExprKind::FunctionCall {
                function,
                arguments,
            } => {
                write!(f, "{function}(")?;
                for (i, a) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            ExprKind::SideEffect(SideEffect::Nondet) => write!(f, "nondet({})", self.ty),
            ExprKind::SideEffect(SideEffect::Allocate { size }) => {
                write!(f, "allocate({size})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_ty() -> Type {
        Type::Unsigned(32)
    }

    #[test]
    fn conjunction_short_circuits() {
        let x = Expr::symbol(Ident::new("x"), Type::Bool);
        assert!(Expr::conjunction([Expr::true_expr(), Expr::true_expr()]).is_true());
        assert!(Expr::conjunction([x.clone(), Expr::false_expr()]).is_false());
        assert_eq!(Expr::conjunction([x.clone()]), x);
    }

    #[test]
    fn ssa_equality_is_componentwise() {
        let a = SsaName::new(Ident::new("x"), 1, 2);
        let b = SsaName::new(Ident::new("x"), 1, 2);
        let c = SsaName::new(Ident::new("x"), 1, 3);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "x@1#2");
    }

    #[test]
    fn dereference_detection() {
        let p = Expr::symbol(Ident::new("p"), Type::Pointer(Arc::new(u32_ty())));
        let deref = Expr::dereference(p);
        let sum = Expr::binary(
            BinOp::Add,
            deref,
            Expr::int_const(1, u32_ty()),
            u32_ty(),
        );
        assert!(sum.has_dereference());
        assert!(!Expr::int_const(3, u32_ty()).has_dereference());
    }

    #[test]
    fn index_takes_element_type() {
        let arr = Expr::symbol(
            Ident::new("a"),
            Type::Array {
                elem: Arc::new(u32_ty()),
                size: Some(8),
            },
        );
        let e = Expr::index(arr, Expr::int_const(0, u32_ty()));
        assert_eq!(e.ty, u32_ty());
    }
}
