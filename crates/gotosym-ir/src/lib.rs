//! GOTO-program intermediate representation for gotosym.
//!
//! The IR is produced by an external front end and consumed by the symbolic
//! execution engine in `gotosym-engine`: interned identifiers, machine-level
//! types, an immutable algebraic expression tree, the instruction taxonomy,
//! and the symbol table / namespace pair the engine resolves names against.

pub mod expr;
pub mod ident;
pub mod program;
pub mod symbol_table;
pub mod ty;

pub use expr::{
    BinOp, Constant, Designator, Expr, ExprKind, QuantKind, SideEffect, SsaName, UnaryOp,
};
pub use ident::Ident;
pub use program::{
    CodeStatement, GotoFunction, GotoFunctions, GotoProgram, IncomingEdge, Instruction,
    InstructionKind, LoopId, Parameter, Pc, ProgramBuilder, SourceLoc,
};
pub use symbol_table::{Namespace, Symbol, SymbolTable};
pub use ty::Type;
