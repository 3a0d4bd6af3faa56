//! Symbol tables and the two-layer namespace.
//!
//! The outer table comes from the front end and is read-only during symbolic
//! execution; names minted during a run (nondet choices, dynamic objects) go
//! into a table owned by the execution state. A [`Namespace`] borrows both
//! for the duration of a run, so the reset-on-exit contract is enforced by
//! scope rather than by discipline.

use crate::ident::Ident;
use crate::ty::Type;
use serde::{Deserialize, Serialize};

/// One symbol table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: Ident,
    pub ty: Type,
    /// Static-lifetime objects are visible to all threads and participate in
    /// shared-access instrumentation.
    #[serde(default)]
    pub is_static_lifetime: bool,
    #[serde(default)]
    pub is_thread_local: bool,
}

/// A flat symbol table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: ahash::AHashMap<Ident, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn insert(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.name, symbol);
    }

    pub fn lookup(&self, name: Ident) -> Option<&Symbol> {
        self.symbols.get(&name)
    }

    pub fn contains(&self, name: Ident) -> bool {
        self.symbols.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

/// Name resolution over the outer table plus an optional state-owned table.
#[derive(Debug, Clone, Copy)]
pub struct Namespace<'a> {
    outer: &'a SymbolTable,
    state: Option<&'a SymbolTable>,
}

impl<'a> Namespace<'a> {
    pub fn new(outer: &'a SymbolTable) -> Self {
        Namespace { outer, state: None }
    }

    pub fn with_state(outer: &'a SymbolTable, state: &'a SymbolTable) -> Self {
        Namespace {
            outer,
            state: Some(state),
        }
    }

    /// State-owned names shadow outer names.
    pub fn lookup(&self, name: Ident) -> Option<&'a Symbol> {
        self.state
            .and_then(|table| table.lookup(name))
            .or_else(|| self.outer.lookup(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, ty: Type) -> Symbol {
        Symbol {
            name: Ident::new(name),
            ty,
            is_static_lifetime: false,
            is_thread_local: false,
        }
    }

    #[test]
    fn state_table_shadows_outer() {
        let mut outer = SymbolTable::new();
        outer.insert(sym("x", Type::Bool));
        let mut state = SymbolTable::new();
        state.insert(sym("x", Type::Unsigned(8)));

        let ns = Namespace::with_state(&outer, &state);
        assert_eq!(ns.lookup(Ident::new("x")).unwrap().ty, Type::Unsigned(8));

        let plain = Namespace::new(&outer);
        assert_eq!(plain.lookup(Ident::new("x")).unwrap().ty, Type::Bool);
        assert!(plain.lookup(Ident::new("y")).is_none());
    }
}
