//! Property tests for the universal SSA invariants: freshness of assigned
//! names, full renaming, guard monotonicity on straight-line segments, and
//! termination under bounds.

use gotosym_engine::{
    DefaultHooks, Equation, Executor, Options, PathStorage, StepKind, SymexState,
};
use gotosym_ir::{
    BinOp, Expr, GotoFunction, GotoFunctions, Ident, InstructionKind, ProgramBuilder, Symbol,
    SymbolTable, Type,
};
use proptest::prelude::*;

fn u32_ty() -> Type {
    Type::Unsigned(32)
}

const VARS: [&str; 3] = ["a", "b", "c"];

fn var(index: usize) -> Expr {
    Expr::symbol(Ident::new(VARS[index % VARS.len()]), u32_ty())
}

fn outer_table() -> SymbolTable {
    let mut table = SymbolTable::new();
    for name in VARS {
        table.insert(Symbol {
            name: Ident::new(name),
            ty: u32_ty(),
            is_static_lifetime: false,
            is_thread_local: false,
        });
    }
    table
}

/// One synthesized statement of a straight-line program.
#[derive(Debug, Clone)]
enum Stmt {
    /// v := constant
    Const(usize, i128),
    /// v := w + constant
    Add(usize, usize, i128),
    /// assert(v <= constant)
    Assert(usize, i128),
}

fn stmt_strategy() -> impl Strategy<Value = Stmt> {
    prop_oneof![
        (0usize..3, 0i128..100).prop_map(|(v, k)| Stmt::Const(v, k)),
        (0usize..3, 0usize..3, 0i128..10).prop_map(|(v, w, k)| Stmt::Add(v, w, k)),
        (0usize..3, 0i128..200).prop_map(|(v, k)| Stmt::Assert(v, k)),
    ]
}

fn build(stmts: &[Stmt], branch_on: Option<usize>) -> GotoFunctions {
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    // optional diamond: branch over the first half of the statements
    if let Some(split) = branch_on {
        let split = split.min(stmts.len());
        // jump over the first `split` statements when a != 0
        b.push(InstructionKind::Goto {
            target: split + 1,
            cond: Expr::ne(var(0), Expr::int_const(0, u32_ty())),
        });
        for s in &stmts[..split] {
            push_stmt(&mut b, s);
        }
        for s in &stmts[split..] {
            push_stmt(&mut b, s);
        }
    } else {
        for s in stmts {
            push_stmt(&mut b, s);
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
    functions
}

fn push_stmt(b: &mut ProgramBuilder, s: &Stmt) {
    match s {
        Stmt::Const(v, k) => {
            b.push(InstructionKind::Assign {
                lhs: var(*v),
                rhs: Expr::int_const(*k, u32_ty()),
            });
        }
        Stmt::Add(v, w, k) => {
            b.push(InstructionKind::Assign {
                lhs: var(*v),
                rhs: Expr::binary(BinOp::Add, var(*w), Expr::int_const(*k, u32_ty()), u32_ty()),
            });
        }
        Stmt::Assert(v, k) => {
            b.push(InstructionKind::Assert(Expr::binary(
                BinOp::Le,
                var(*v),
                Expr::int_const(*k, u32_ty()),
                Type::Bool,
            )));
        }
    }
}

fn run(functions: &GotoFunctions, options: &Options) -> (Equation, SymexState) {
    let outer = outer_table();
    let mut equation = Equation::new();
    let mut storage = PathStorage::default();
    let mut executor = Executor::new(
        options,
        &outer,
        &mut equation,
        &mut storage,
        Box::new(DefaultHooks::new(Some(8), Some(8))),
    );
    let state = executor
        .symex_from_entry_point_of(functions)
        .expect("synthesized programs are well-formed");
    drop(executor);
    (equation, state)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    /// Every run of a straight-line program satisfies the equation's SSA
    /// invariants, with and without constant propagation.
    #[test]
    fn linear_programs_validate(stmts in prop::collection::vec(stmt_strategy(), 1..20),
                                propagation in any::<bool>()) {
        let functions = build(&stmts, None);
        let options = Options { propagation, ..Options::default() };
        let (equation, _) = run(&functions, &options);
        prop_assert!(equation.validate().is_ok());
    }

    /// Guards never shrink along a non-branching segment: every step of a
    /// straight-line program carries a true guard.
    #[test]
    fn linear_programs_keep_true_guards(stmts in prop::collection::vec(stmt_strategy(), 1..15)) {
        let functions = build(&stmts, None);
        let (equation, state) = run(&functions, &Options::default());
        for step in equation.steps() {
            prop_assert!(step.guard.is_true(), "guard grew on a straight line: {}", step.guard);
        }
        prop_assert!(state.guard.is_true());
    }

    /// Diamond programs merge completely and still validate.
    #[test]
    fn branching_programs_validate(stmts in prop::collection::vec(stmt_strategy(), 2..20),
                                   split in 1usize..6,
                                   propagation in any::<bool>()) {
        let functions = build(&stmts, Some(split));
        let options = Options {
            propagation,
            validate_ssa_equation: true,
            ..Options::default()
        };
        let (equation, state) = run(&functions, &options);
        prop_assert!(equation.validate().is_ok());
        prop_assert!(state.call_stack().is_empty());
    }

    /// VCC bookkeeping: remaining never exceeds total, and equals the number
    /// of assertion steps emitted.
    #[test]
    fn vcc_counters_are_consistent(stmts in prop::collection::vec(stmt_strategy(), 1..20)) {
        let functions = build(&stmts, None);
        let options = Options { propagation: false, ..Options::default() };
        let (equation, state) = run(&functions, &options);
        prop_assert!(state.remaining_vccs <= state.total_vccs);
        prop_assert_eq!(state.remaining_vccs, equation.assertions().count());
    }
}

/// Termination under bounds: a program whose loop condition never
/// concretizes still terminates because the unwind bound cuts it.
#[test]
fn symbolic_loop_terminates_under_bound() {
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    // while (a != 0) a := a + 1;  -- never resolved by propagation
    b.push(InstructionKind::Goto {
        target: 3,
        cond: Expr::eq(var(0), Expr::int_const(0, u32_ty())),
    }); // 0
    b.push(InstructionKind::Assign {
        lhs: var(0),
        rhs: Expr::binary(
            BinOp::Add,
            var(0),
            Expr::int_const(1, u32_ty()),
            u32_ty(),
        ),
    }); // 1
    b.push(InstructionKind::Goto {
        target: 0,
        cond: Expr::true_expr(),
    }); // 2
    b.push(InstructionKind::Skip); // 3
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

    let (equation, _) = run(&functions, &Options::default());
    assert!(equation.validate().is_ok());
}
