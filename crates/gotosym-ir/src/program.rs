//! GOTO programs: the control-flow-graph instruction taxonomy the engine
//! consumes, plus the function map and program-counter type.

use crate::expr::Expr;
use crate::ident::Ident;
use crate::ty::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location attached to every instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    pub function: Ident,
    pub line: Option<u32>,
    /// Front-end comment; used as the message of assertion VCCs.
    pub comment: Option<String>,
}

impl SourceLoc {
    pub fn in_function(function: Ident) -> Self {
        SourceLoc {
            function,
            line: None,
            comment: None,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{line}", self.function),
            None => write!(f, "{}", self.function),
        }
    }
}

/// A CFG edge arriving at an instruction from a GOTO elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingEdge {
    /// Location number of the jumping instruction.
    pub location_number: u32,
    /// Whether the jump goes backwards (a loop back-edge).
    pub backwards: bool,
}

/// Statements carried by `OTHER` instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeStatement {
    /// Assign fresh non-deterministic values to the target object.
    Havoc { target: Expr },
    /// Dynamic allocation: `lhs` receives a pointer to a fresh object.
    Allocate { lhs: Expr, size: Expr },
    /// Evaluate for side effects only.
    Expression(Expr),
}

/// The instruction taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionKind {
    Skip,
    Location,
    EndFunction,
    /// Conditional jump to `target` (an index into the same program).
    /// An unconditional jump carries a `true` condition.
    Goto { target: usize, cond: Expr },
    Assume(Expr),
    Assert(Expr),
    Return(Option<Expr>),
    Assign { lhs: Expr, rhs: Expr },
    FunctionCall {
        lhs: Option<Expr>,
        function: Expr,
        arguments: Vec<Expr>,
    },
    Other(CodeStatement),
    Decl { identifier: Ident, ty: Type },
    Dead { identifier: Ident, ty: Type },
    /// Spawn a thread whose entry is `target` in the same program.
    StartThread { target: usize },
    EndThread,
    AtomicBegin,
    AtomicEnd,
    Catch,
    Throw,
    /// Invalid; the engine aborts on this.
    NoInstructionType,
}

/// One instruction of a GOTO program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub source: SourceLoc,
    /// Position of this instruction within its program.
    pub location_number: u32,
    /// GOTO edges arriving here, filled in by [`GotoProgram::update`].
    #[serde(default)]
    pub incoming_edges: Vec<IncomingEdge>,
}

/// Identifies a loop: the function plus the location number of the
/// backwards GOTO that closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoopId {
    pub function: Ident,
    pub location_number: u32,
}

/// A program counter: function plus instruction index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pc {
    pub function: Ident,
    pub index: usize,
}

impl Pc {
    pub fn new(function: Ident, index: usize) -> Self {
        Pc { function, index }
    }

    pub fn next(self) -> Self {
        Pc {
            index: self.index + 1,
            ..self
        }
    }

    pub fn with_index(self, index: usize) -> Self {
        Pc { index, ..self }
    }
}

impl fmt::Display for Pc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.function, self.index)
    }
}

/// The body of one GOTO function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GotoProgram {
    pub instructions: Vec<Instruction>,
}

impl GotoProgram {
    /// Recompute location numbers and incoming GOTO edges. Must run after
    /// construction and after any structural edit.
    pub fn update(&mut self) {
        for (i, instr) in self.instructions.iter_mut().enumerate() {
            instr.location_number = i as u32;
            instr.incoming_edges.clear();
        }
        let jumps: Vec<(usize, usize)> = self
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(i, instr)| match instr.kind {
                InstructionKind::Goto { target, .. }
                | InstructionKind::StartThread { target } => Some((i, target)),
                _ => None,
            })
            .collect();
        for (from, target) in jumps {
            let edge = IncomingEdge {
                location_number: from as u32,
                backwards: target <= from,
            };
            self.instructions[target].incoming_edges.push(edge);
        }
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub identifier: Ident,
    pub ty: Type,
}

/// One GOTO function: parameters plus body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GotoFunction {
    pub parameters: Vec<Parameter>,
    pub return_type: Type,
    pub body: GotoProgram,
    /// Hidden functions are front-end instrumentation; their assignments are
    /// marked so reporting can elide them.
    #[serde(default)]
    pub hidden: bool,
}

impl GotoFunction {
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}

/// The function map of a whole program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GotoFunctions {
    pub functions: ahash::AHashMap<Ident, GotoFunction>,
}

impl GotoFunctions {
    /// Name of the entry-point function every program starts in.
    pub fn entry_point() -> Ident {
        Ident::new("__start")
    }

    pub fn get(&self, name: Ident) -> Option<&GotoFunction> {
        self.functions.get(&name)
    }

    pub fn insert(&mut self, name: Ident, function: GotoFunction) {
        self.functions.insert(name, function);
    }

    /// Run [`GotoProgram::update`] on every body.
    pub fn update(&mut self) {
        for function in self.functions.values_mut() {
            function.body.update();
        }
    }
}

/// Convenience builder for constructing function bodies in order.
pub struct ProgramBuilder {
    function: Ident,
    instructions: Vec<Instruction>,
}

impl ProgramBuilder {
    pub fn new(function: Ident) -> Self {
        ProgramBuilder {
            function,
            instructions: Vec::new(),
        }
    }

    /// Append an instruction; returns its index.
    pub fn push(&mut self, kind: InstructionKind) -> usize {
        self.push_with_comment(kind, None)
    }

    /// Append an instruction with a source comment (used for VCC messages).
    pub fn push_with_comment(
        &mut self,
        kind: InstructionKind,
        comment: Option<&str>,
    ) -> usize {
        let index = self.instructions.len();
        self.instructions.push(Instruction {
            kind,
            source: SourceLoc {
                function: self.function,
                line: Some(index as u32 + 1),
                comment: comment.map(str::to_owned),
            },
            location_number: index as u32,
            incoming_edges: Vec::new(),
        });
        index
    }

    /// Finish with an `END_FUNCTION` terminator and compute CFG edges.
    pub fn finish(mut self) -> GotoProgram {
        self.push(InstructionKind::EndFunction);
        let mut program = GotoProgram {
            instructions: self.instructions,
        };
        program.update();
        program
    }
}
