//! Interned program identifiers.
//!
//! Every name in a GOTO program (variables, functions, struct fields) is
//! interned once in a process-wide table and referenced by a lightweight
//! `Copy` handle, so identifier comparison and hashing are O(1) regardless
//! of name length.

use std::fmt;
use std::sync::{OnceLock, RwLock};

/// An interned identifier: a handle into the global string table.
///
/// Two idents are equal iff they intern the same string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(u32);

struct Interner {
    strings: Vec<&'static str>,
    lookup: ahash::AHashMap<&'static str, u32>,
}

fn interner() -> &'static RwLock<Interner> {
    static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| {
        RwLock::new(Interner {
            strings: Vec::new(),
            lookup: ahash::AHashMap::new(),
        })
    })
}

impl Ident {
    /// Intern a string, returning its handle.
    pub fn new(name: &str) -> Self {
        {
            let table = interner().read().expect("ident table poisoned");
            if let Some(&id) = table.lookup.get(name) {
                return Ident(id);
            }
        }
        let mut table = interner().write().expect("ident table poisoned");
        // Re-check: another thread may have interned it between the locks.
        if let Some(&id) = table.lookup.get(name) {
            return Ident(id);
        }
        let id = table.strings.len() as u32;
        let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
        table.strings.push(leaked);
        table.lookup.insert(leaked, id);
        Ident(id)
    }

    /// Resolve the handle back to its string.
    pub fn as_str(self) -> &'static str {
        interner().read().expect("ident table poisoned").strings[self.0 as usize]
    }

    /// The raw table index, stable for the process lifetime.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ident({:?})", self.as_str())
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Ident::new(s)
    }
}

impl serde::Serialize for Ident {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Ident {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Ident::new(&s))
    }
}
