//! Machine-level types for GOTO-program expressions.

use crate::ident::Ident;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The type of an expression. Composite types share their components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Boolean.
    Bool,
    /// Unsigned bit-vector of the given width in bits.
    Unsigned(u32),
    /// Signed (two's complement) bit-vector of the given width in bits.
    Signed(u32),
    /// Pointer to a value of the element type.
    Pointer(Arc<Type>),
    /// Array of elements; `size` is None for incomplete arrays.
    Array { elem: Arc<Type>, size: Option<u64> },
    /// Struct with a tag and ordered named fields.
    Struct {
        tag: Ident,
        fields: Arc<Vec<(Ident, Type)>>,
    },
    /// Function type.
    Code {
        params: Arc<Vec<Type>>,
        ret: Arc<Type>,
    },
    /// Character string (used by the string-refinement backend).
    String,
    /// No value (void).
    Empty,
}

impl Type {
    /// Width in bits for scalar types; None for composites.
    pub fn width(&self) -> Option<u32> {
        match self {
            Type::Bool => Some(1),
            Type::Unsigned(w) | Type::Signed(w) => Some(*w),
            // Pointers flatten to a fixed-width word in the solver layer.
            Type::Pointer(_) => Some(64),
            _ => None,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    /// Field type of a struct member, if present.
    pub fn field(&self, name: Ident) -> Option<&Type> {
        match self {
            Type::Struct { fields, .. } => {
                fields.iter().find(|(f, _)| *f == name).map(|(_, t)| t)
            }
            _ => None,
        }
    }

    /// Element type for arrays and pointers.
    pub fn elem(&self) -> Option<&Type> {
        match self {
            Type::Array { elem, .. } => Some(elem),
            Type::Pointer(elem) => Some(elem),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Unsigned(w) => write!(f, "u{w}"),
            Type::Signed(w) => write!(f, "i{w}"),
            Type::Pointer(elem) => write!(f, "*{elem}"),
            Type::Array { elem, size: Some(n) } => write!(f, "[{elem}; {n}]"),
            Type::Array { elem, size: None } => write!(f, "[{elem}]"),
            Type::Struct { tag, .. } => write!(f, "struct {tag}"),
            Type::Code { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
            Type::String => write!(f, "string"),
            Type::Empty => write!(f, "void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        let t = Type::Pointer(Arc::new(Type::Unsigned(32)));
        assert_eq!(t.to_string(), "*u32");
        let a = Type::Array {
            elem: Arc::new(Type::Signed(8)),
            size: Some(4),
        };
        assert_eq!(a.to_string(), "[i8; 4]");
    }

    #[test]
    fn struct_field_lookup() {
        let fields = Arc::new(vec![
            (Ident::new("a"), Type::Bool),
            (Ident::new("b"), Type::Unsigned(16)),
        ]);
        let s = Type::Struct {
            tag: Ident::new("pair"),
            fields,
        };
        assert_eq!(s.field(Ident::new("b")), Some(&Type::Unsigned(16)));
        assert_eq!(s.field(Ident::new("c")), None);
    }
}
