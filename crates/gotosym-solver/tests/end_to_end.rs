//! Engine-to-solver integration: symbolically execute small programs and
//! decide the resulting equations with the in-process back-ends.

use gotosym_engine::{DefaultHooks, Equation, Executor, Options, PathStorage};
use gotosym_solver::factory::SolverFactory;
use gotosym_solver::{EquationConverter, SatOutcome};
use gotosym_ir::{
    BinOp, Expr, GotoFunction, GotoFunctions, Ident, InstructionKind, ProgramBuilder, SsaName,
    Symbol, SymbolTable, Type,
};

fn u32_ty() -> Type {
    Type::Unsigned(32)
}

fn var(name: &str) -> Expr {
    Expr::symbol(Ident::new(name), u32_ty())
}

fn n(v: i128) -> Expr {
    Expr::int_const(v, u32_ty())
}

fn lt(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinOp::Lt, a, b, Type::Bool)
}

fn outer(vars: &[(&str, Type)]) -> SymbolTable {
    let mut table = SymbolTable::new();
    for (name, ty) in vars {
        table.insert(Symbol {
            name: Ident::new(name),
            ty: ty.clone(),
            is_static_lifetime: false,
            is_thread_local: false,
        });
    }
    table
}

fn symex(builder: ProgramBuilder, table: &SymbolTable, options: &Options) -> Equation {
    let mut functions = GotoFunctions::default();
    functions.insert(
        GotoFunctions::entry_point(),
        GotoFunction {
            parameters: Vec::new(),
            return_type: Type::Empty,
            body: builder.finish(),
            hidden: false,
        },
    );
    let mut equation = Equation::new();
    let mut storage = PathStorage::default();
    let mut executor = Executor::new(
        options,
        table,
        &mut equation,
        &mut storage,
        Box::new(DefaultHooks::default()),
    );
    executor
        .symex_from_entry_point_of(&functions)
        .expect("symex should succeed");
    drop(executor);
    equation
}

fn decide(equation: &Equation, options: &Options) -> SatOutcome {
    let mut solver = SolverFactory::new(options).get_solver().unwrap();
    solver.convert(equation).unwrap();
    solver.check().unwrap()
}

/// x := nondet; assume(x < 10); assert(x < 10)  -- holds.
fn bounded_program() -> ProgramBuilder {
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: Expr::nondet(u32_ty()),
    });
    b.push(InstructionKind::Assume(lt(var("x"), n(10))));
    b.push(InstructionKind::Assert(lt(var("x"), n(10))));
    b
}

/// x := nondet; assume(x < 10); assert(x < 5)  -- violable.
fn violable_program() -> ProgramBuilder {
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: Expr::nondet(u32_ty()),
    });
    b.push(InstructionKind::Assume(lt(var("x"), n(10))));
    b.push(InstructionKind::Assert(lt(var("x"), n(5))));
    b
}

#[test]
fn valid_assertion_is_unsat() {
    let options = Options::default();
    let table = outer(&[("x", u32_ty())]);
    let equation = symex(bounded_program(), &table, &options);
    assert_eq!(decide(&equation, &options), SatOutcome::Unsat);
}

#[test]
fn violable_assertion_is_sat_with_model() {
    let options = Options::default();
    let table = outer(&[("x", u32_ty())]);
    let equation = symex(violable_program(), &table, &options);

    let mut solver = SolverFactory::new(&options).get_solver().unwrap();
    solver.convert(&equation).unwrap();
    assert_eq!(solver.check().unwrap(), SatOutcome::Sat);

    // the model binds the violating value of x
    let x = SsaName::new(Ident::new("x"), 1, 1);
    assert!(solver.value_of(&x).is_some());
}

#[test]
fn diamond_with_phi_is_decided() {
    // if (c) x := 1 else x := 2; assert(x >= 1)  -- holds
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Goto {
        target: 3,
        cond: Expr::not(Expr::symbol(Ident::new("c"), Type::Bool)),
    });
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(1),
    });
    b.push(InstructionKind::Goto {
        target: 4,
        cond: Expr::true_expr(),
    });
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(2),
    });
    b.push(InstructionKind::Assert(Expr::binary(
        BinOp::Ge,
        var("x"),
        n(1),
        Type::Bool,
    )));

    let options = Options {
        propagation: false,
        ..Options::default()
    };
    let table = outer(&[("x", u32_ty()), ("c", Type::Bool)]);
    let equation = symex(b, &table, &options);
    assert_eq!(decide(&equation, &options), SatOutcome::Unsat);
}

#[test]
fn array_update_round_trips() {
    // a[1] := 5; assert(a[1] == 5)
    let arr_ty = Type::Array {
        elem: std::sync::Arc::new(u32_ty()),
        size: Some(4),
    };
    let a = Expr::symbol(Ident::new("a"), arr_ty.clone());
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Assign {
        lhs: Expr::index(a.clone(), n(1)),
        rhs: n(5),
    });
    b.push(InstructionKind::Assert(Expr::eq(
        Expr::index(a, n(1)),
        n(5),
    )));

    let options = Options::default();
    let table = outer(&[("a", arr_ty)]);
    let equation = symex(b, &table, &options);
    assert_eq!(decide(&equation, &options), SatOutcome::Unsat);
}

#[test]
fn refinement_backend_agrees_with_default() {
    let table = outer(&[("x", u32_ty())]);
    let engine_options = Options::default();

    let refine_options = Options {
        refine: true,
        ..Options::default()
    };

    let valid = symex(bounded_program(), &table, &engine_options);
    assert_eq!(decide(&valid, &refine_options), SatOutcome::Unsat);

    let violable = symex(violable_program(), &table, &engine_options);
    assert_eq!(decide(&violable, &refine_options), SatOutcome::Sat);
}

#[test]
fn arithmetic_refinement_tightens_to_a_real_model() {
    // x := nondet; y := nondet; assume(x < 4 && y < 4); assert(x * y < 9)
    // violable only with the exact product, so the lazy lemmas must fire
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: Expr::nondet(u32_ty()),
    });
    b.push(InstructionKind::Assign {
        lhs: var("y"),
        rhs: Expr::nondet(u32_ty()),
    });
    b.push(InstructionKind::Assume(Expr::and(
        lt(var("x"), n(4)),
        lt(var("y"), n(4)),
    )));
    b.push(InstructionKind::Assert(lt(
        Expr::binary(BinOp::Mul, var("x"), var("y"), u32_ty()),
        n(9),
    )));

    let table = outer(&[("x", u32_ty()), ("y", u32_ty())]);
    let equation = symex(b, &table, &Options::default());

    let options = Options {
        refine: true,
        refine_arithmetic: true,
        max_node_refinement: Some(32),
        ..Options::default()
    };
    assert_eq!(decide(&equation, &options), SatOutcome::Sat);
}
