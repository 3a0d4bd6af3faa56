//! Value sets: an over-approximation of the objects a pointer may target.
//!
//! The engine uses value sets to lower pointer dereferences into guarded
//! case splits over concrete objects. The transfer rules here are a simple
//! flow-insensitive approximation that tracks address-of expressions through
//! assignments and merges by union; anything it cannot see becomes Unknown.

use gotosym_ir::{Expr, ExprKind, Ident};
use smallvec::SmallVec;

/// One possible target of a pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A named object, with a constant element offset when known.
    Object {
        object: Ident,
        offset: Option<i128>,
    },
    /// The null pointer.
    Null,
    /// Anything; the pointer escaped the approximation.
    Unknown,
}

pub type Targets = SmallVec<[Target; 2]>;

/// Per-state pointer target map, keyed by the pointer variable's L0 name.
#[derive(Debug, Clone, Default)]
pub struct ValueSet {
    map: ahash::AHashMap<Ident, Targets>,
}

impl ValueSet {
    pub fn new() -> Self {
        ValueSet::default()
    }

    /// Targets of a pointer-valued expression.
    pub fn get(&self, pointer: &Expr) -> Targets {
        match &pointer.kind {
            ExprKind::AddressOf(object) => match object_of(object) {
                Some((object, offset)) => {
                    SmallVec::from_iter([Target::Object { object, offset }])
                }
                None => SmallVec::from_iter([Target::Unknown]),
            },
            ExprKind::Constant(gotosym_ir::Constant::Null) => {
                SmallVec::from_iter([Target::Null])
            }
            ExprKind::Symbol(id) => self.lookup(*id),
            ExprKind::Ssa(name) => self.lookup(name.ident),
            ExprKind::Typecast(inner) => self.get(inner),
            ExprKind::Ite {
                then_value,
                else_value,
                ..
            } => {
                let mut targets = self.get(then_value);
                union_into(&mut targets, self.get(else_value));
                targets
            }
            _ => SmallVec::from_iter([Target::Unknown]),
        }
    }

    fn lookup(&self, id: Ident) -> Targets {
        match self.map.get(&id) {
            Some(targets) => targets.clone(),
            None => SmallVec::from_iter([Target::Unknown]),
        }
    }

    /// Record an assignment to a pointer variable.
    pub fn assign(&mut self, lhs: Ident, rhs: &Expr) {
        let targets = self.get(rhs);
        self.map.insert(lhs, targets);
    }

    /// Record a pointer variable as pointing to a single known object.
    pub fn set_single(&mut self, lhs: Ident, object: Ident) {
        self.map.insert(
            lhs,
            SmallVec::from_iter([Target::Object {
                object,
                offset: Some(0),
            }]),
        );
    }

    pub fn erase(&mut self, id: Ident) {
        self.map.remove(&id);
    }

    /// Union another value set into this one (control-flow merge).
    pub fn merge(&mut self, other: &ValueSet) {
        for (id, targets) in &other.map {
            match self.map.get_mut(id) {
                Some(existing) => union_into(existing, targets.clone()),
                None => {
                    self.map.insert(*id, targets.clone());
                }
            }
        }
    }
}

fn union_into(dest: &mut Targets, src: Targets) {
    for t in src {
        if !dest.contains(&t) {
            dest.push(t);
        }
    }
}

/// Resolve `&object` shapes: a symbol, or a symbol indexed at a constant.
fn object_of(object: &Expr) -> Option<(Ident, Option<i128>)> {
    match &object.kind {
        ExprKind::Symbol(id) => Some((*id, Some(0))),
        ExprKind::Ssa(name) => Some((name.ident, Some(0))),
        ExprKind::Index { array, index } => {
            let (id, _) = object_of(array)?;
            Some((id, index.as_constant_int()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotosym_ir::Type;
    use std::sync::Arc;

    fn ptr_ty() -> Type {
        Type::Pointer(Arc::new(Type::Unsigned(32)))
    }

    #[test]
    fn address_of_resolves_directly() {
        let vs = ValueSet::new();
        let p = Expr::address_of(Expr::symbol(Ident::new("obj"), Type::Unsigned(32)));
        let targets = vs.get(&p);
        assert_eq!(
            targets.as_slice(),
            &[Target::Object {
                object: Ident::new("obj"),
                offset: Some(0),
            }]
        );
    }

    #[test]
    fn assignment_propagates_targets() {
        let mut vs = ValueSet::new();
        let addr = Expr::address_of(Expr::symbol(Ident::new("obj"), Type::Unsigned(32)));
        vs.assign(Ident::new("p"), &addr);
        // q := p copies p's targets
        let p = Expr::symbol(Ident::new("p"), ptr_ty());
        vs.assign(Ident::new("q"), &p);
        let targets = vs.get(&Expr::symbol(Ident::new("q"), ptr_ty()));
        assert_eq!(targets.len(), 1);
        assert!(matches!(&targets[0], Target::Object { object, .. }
            if *object == Ident::new("obj")));
    }

    #[test]
    fn unseen_pointer_is_unknown() {
        let vs = ValueSet::new();
        let p = Expr::symbol(Ident::new("wild"), ptr_ty());
        assert_eq!(vs.get(&p).as_slice(), &[Target::Unknown]);
    }

    #[test]
    fn ite_unions_both_branches() {
        let mut vs = ValueSet::new();
        vs.set_single(Ident::new("p"), Ident::new("a"));
        vs.set_single(Ident::new("q"), Ident::new("b"));
        let cond = Expr::symbol(Ident::new("c"), Type::Bool);
        let e = Expr::ite(
            cond,
            Expr::symbol(Ident::new("p"), ptr_ty()),
            Expr::symbol(Ident::new("q"), ptr_ty()),
        );
        assert_eq!(vs.get(&e).len(), 2);
    }

    #[test]
    fn merge_unions_per_key() {
        let mut a = ValueSet::new();
        a.set_single(Ident::new("p"), Ident::new("x"));
        let mut b = ValueSet::new();
        b.set_single(Ident::new("p"), Ident::new("y"));
        a.merge(&b);
        let targets = a.get(&Expr::symbol(Ident::new("p"), ptr_ty()));
        assert_eq!(targets.len(), 2);
    }
}
