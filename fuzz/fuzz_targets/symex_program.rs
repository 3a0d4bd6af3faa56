#![no_main]
use arbitrary::Arbitrary;
use gotosym_engine::{DefaultHooks, Equation, Executor, Options, PathStorage};
use gotosym_ir::{
    BinOp, Expr, GotoFunction, GotoFunctions, Ident, InstructionKind, ProgramBuilder, Symbol,
    SymbolTable, Type,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum FuzzStmt {
    Const { var: u8, value: u16 },
    Add { var: u8, from: u8, delta: u8 },
    Branch { var: u8, skip: u8 },
    Assert { var: u8, bound: u16 },
    Assume { var: u8, bound: u16 },
    Havoc { var: u8 },
}

#[derive(Debug, Arbitrary)]
struct FuzzProgram {
    stmts: Vec<FuzzStmt>,
}

const VARS: [&str; 4] = ["a", "b", "c", "d"];

fn u32_ty() -> Type {
    Type::Unsigned(32)
}

fn var(index: u8) -> Expr {
    Expr::symbol(Ident::new(VARS[index as usize % VARS.len()]), u32_ty())
}

fuzz_target!(|program: FuzzProgram| {
    if program.stmts.len() > 64 {
        return;
    }

    let count = program.stmts.len();
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    for (i, stmt) in program.stmts.iter().enumerate() {
        match stmt {
            FuzzStmt::Const { var: v, value } => {
                b.push(InstructionKind::Assign {
                    lhs: var(*v),
                    rhs: Expr::int_const(*value as i128, u32_ty()),
                });
            }
            FuzzStmt::Add { var: v, from, delta } => {
                b.push(InstructionKind::Assign {
                    lhs: var(*v),
                    rhs: Expr::binary(
                        BinOp::Add,
                        var(*from),
                        Expr::int_const(*delta as i128, u32_ty()),
                        u32_ty(),
                    ),
                });
            }
            FuzzStmt::Branch { var: v, skip } => {
                // forward jump over up to eight following statements; each
                // statement emits exactly one instruction, so indices line up
                let target = (i + 1 + *skip as usize % 8).min(count);
                b.push(InstructionKind::Goto {
                    target,
                    cond: Expr::ne(var(*v), Expr::int_const(0, u32_ty())),
                });
            }
            FuzzStmt::Assert { var: v, bound } => {
                b.push(InstructionKind::Assert(Expr::binary(
                    BinOp::Le,
                    var(*v),
                    Expr::int_const(*bound as i128, u32_ty()),
                    Type::Bool,
                )));
            }
            FuzzStmt::Assume { var: v, bound } => {
                b.push(InstructionKind::Assume(Expr::binary(
                    BinOp::Lt,
                    var(*v),
                    Expr::int_const(*bound as i128, u32_ty()),
                    Type::Bool,
                )));
            }
            FuzzStmt::Havoc { var: v } => {
                b.push(InstructionKind::Assign {
                    lhs: var(*v),
                    rhs: Expr::nondet(u32_ty()),
                });
            }
        }
    }

    let mut functions = GotoFunctions::default();
    functions.insert(
        GotoFunctions::entry_point(),
        GotoFunction {
            parameters: Vec::new(),
            return_type: Type::Empty,
            body: b.finish(),
            hidden: false,
        },
    );

    let mut outer = SymbolTable::new();
    for name in VARS {
        outer.insert(Symbol {
            name: Ident::new(name),
            ty: u32_ty(),
            is_static_lifetime: false,
            is_thread_local: false,
        });
    }

    let options = Options {
        depth: 10_000,
        ..Options::default()
    };
    let mut equation = Equation::new();
    let mut storage = PathStorage::default();
    let mut executor = Executor::new(
        &options,
        &outer,
        &mut equation,
        &mut storage,
        Box::new(DefaultHooks::new(Some(8), Some(8))),
    );
    if executor.symex_from_entry_point_of(&functions).is_ok() {
        drop(executor);
        // the SSA invariants must hold on every successful run
        equation.validate().expect("SSA invariants violated");
    }
});
