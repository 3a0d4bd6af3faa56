//! End-to-end tests for the symbolic execution engine.
//!
//! Each test builds a small GOTO program, runs the executor, and checks the
//! sequence of emitted equation steps.

use gotosym_engine::{
    AssignmentKind, DefaultHooks, Equation, Executor, Options, PathStorage, StepKind, SymexHooks,
    SymexState,
};
use gotosym_ir::{
    BinOp, Expr, ExprKind, GotoFunction, GotoFunctions, Ident, InstructionKind, Parameter,
    ProgramBuilder, Symbol, SymbolTable, Type,
};

fn u32_ty() -> Type {
    Type::Unsigned(32)
}

fn var(name: &str) -> Expr {
    Expr::symbol(Ident::new(name), u32_ty())
}

fn bvar(name: &str) -> Expr {
    Expr::symbol(Ident::new(name), Type::Bool)
}

fn n(v: i128) -> Expr {
    Expr::int_const(v, u32_ty())
}

/// Outer symbol table with the given locals (plus `shared` statics).
fn symbols(locals: &[(&str, Type)], shared: &[(&str, Type)]) -> SymbolTable {
    let mut table = SymbolTable::new();
    for (name, ty) in locals {
        table.insert(Symbol {
            name: Ident::new(name),
            ty: ty.clone(),
            is_static_lifetime: false,
            is_thread_local: false,
        });
    }
    for (name, ty) in shared {
        table.insert(Symbol {
            name: Ident::new(name),
            ty: ty.clone(),
            is_static_lifetime: true,
            is_thread_local: false,
        });
    }
    table
}

/// Wrap a single entry-point body into a function map.
fn entry_program(builder: ProgramBuilder) -> GotoFunctions {
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
    functions
}

fn run_with_hooks(
    functions: &GotoFunctions,
    outer: &SymbolTable,
    options: &Options,
    hooks: DefaultHooks,
) -> (Equation, SymexState) {
    let mut equation = Equation::new();
    let mut storage = PathStorage::default();
    let mut executor = Executor::new(options, outer, &mut equation, &mut storage, Box::new(hooks));
    let state = executor
        .symex_from_entry_point_of(functions)
        .expect("symex should succeed");
    drop(executor);
    (equation, state)
}

fn run(
    functions: &GotoFunctions,
    outer: &SymbolTable,
    options: &Options,
) -> (Equation, SymexState) {
    run_with_hooks(functions, outer, options, DefaultHooks::default())
}

fn step_kinds(equation: &Equation) -> Vec<&'static str> {
    equation
        .steps()
        .iter()
        .map(|s| match &s.kind {
            StepKind::Assignment { .. } => "assign",
            StepKind::Assumption { .. } => "assume",
            StepKind::Assertion { .. } => "assert",
            StepKind::Location => "location",
            StepKind::Decl { .. } => "decl",
            StepKind::Dead { .. } => "dead",
            StepKind::Constraint { .. } => "constraint",
            StepKind::SharedRead { .. } => "shared_read",
            StepKind::SharedWrite { .. } => "shared_write",
            StepKind::AtomicBegin => "atomic_begin",
            StepKind::AtomicEnd => "atomic_end",
            StepKind::Spawn => "spawn",
        })
        .collect()
}

// ============================================================================
// Straight-line programs
// ============================================================================

#[test]
fn linear_assignment_discharges_assertion_by_propagation() {
    // x := 1; assert(x == 1)
    let outer = symbols(&[("x", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(1),
    });
    b.push(InstructionKind::Assert(Expr::eq(var("x"), n(1))));
    let functions = entry_program(b);

    let (equation, state) = run(&functions, &outer, &Options::default());

    assert_eq!(step_kinds(&equation), vec!["assign"]);
    assert_eq!(state.total_vccs, 1);
    assert_eq!(state.remaining_vccs, 0);

    let StepKind::Assignment { lhs, rhs, kind } = &equation.steps()[0].kind else {
        panic!("expected assignment");
    };
    let name = lhs.as_ssa().unwrap();
    assert_eq!(name.ident, Ident::new("x"));
    assert_eq!(name.l2, 1);
    assert_eq!(rhs.as_constant_int(), Some(1));
    assert_eq!(*kind, AssignmentKind::State);
}

#[test]
fn linear_assertion_survives_without_propagation() {
    let outer = symbols(&[("x", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(1),
    });
    b.push_with_comment(
        InstructionKind::Assert(Expr::eq(var("x"), n(1))),
        Some("x is one"),
    );
    let functions = entry_program(b);

    let options = Options {
        propagation: false,
        ..Options::default()
    };
    let (equation, state) = run(&functions, &outer, &options);

    assert_eq!(step_kinds(&equation), vec!["assign", "assert"]);
    assert_eq!(state.remaining_vccs, 1);
    let step = equation.assertions().next().unwrap();
    assert!(step.guard.is_true());
    let StepKind::Assertion { msg, .. } = &step.kind else {
        unreachable!()
    };
    assert_eq!(msg, "x is one");
}

#[test]
fn ssa_versions_increase_per_write() {
    let outer = symbols(&[("x", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    for i in 0..3 {
        b.push(InstructionKind::Assign {
            lhs: var("x"),
            rhs: n(i),
        });
    }
    let functions = entry_program(b);

    let (equation, _) = run(&functions, &outer, &Options::default());
    let versions: Vec<u64> = equation
        .steps()
        .iter()
        .filter_map(|s| match &s.kind {
            StepKind::Assignment { lhs, .. } => Some(lhs.as_ssa().unwrap().l2),
            _ => None,
        })
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert!(equation.validate().is_ok());
}

// ============================================================================
// Branching and merging
// ============================================================================

#[test]
fn diamond_produces_phi_assignment() {
    // if (c) x := 1 else x := 2; assert(x >= 1)
    let outer = symbols(&[("x", u32_ty()), ("c", Type::Bool)], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Goto {
        target: 3,
        cond: Expr::not(bvar("c")),
    }); // 0: to else
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(1),
    }); // 1
    b.push(InstructionKind::Goto {
        target: 4,
        cond: Expr::true_expr(),
    }); // 2: over else
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(2),
    }); // 3
    b.push(InstructionKind::Assert(Expr::binary(
        BinOp::Ge,
        var("x"),
        n(1),
        Type::Bool,
    ))); // 4
    let functions = entry_program(b);

    let (equation, state) = run(&functions, &outer, &Options::default());

    assert_eq!(
        step_kinds(&equation),
        vec!["assign", "assign", "assign", "assert"]
    );
    assert!(equation.validate().is_ok());

    // the third assignment is the φ merging both branches
    let StepKind::Assignment { lhs, rhs, kind } = &equation.steps()[2].kind else {
        panic!("expected phi assignment");
    };
    assert_eq!(*kind, AssignmentKind::Phi);
    assert_eq!(lhs.as_ssa().unwrap().l2, 3);
    let ExprKind::Ite {
        then_value,
        else_value,
        ..
    } = &rhs.kind
    else {
        panic!("phi rhs should be an ite, got {rhs}");
    };
    assert_eq!(then_value.as_ssa().unwrap().l2, 1);
    assert_eq!(else_value.as_ssa().unwrap().l2, 2);

    // after the join, the path condition is true again
    let assertion = equation.assertions().next().unwrap();
    assert!(assertion.guard.is_true());
    assert!(state.guard.is_true());
}

#[test]
fn merge_completeness_no_queued_states_remain() {
    let outer = symbols(&[("x", u32_ty()), ("c", Type::Bool)], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Goto {
        target: 2,
        cond: bvar("c"),
    });
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(5),
    });
    b.push(InstructionKind::Skip);
    let functions = entry_program(b);

    let (_, state) = run(&functions, &outer, &Options::default());
    // frames are all popped; any unmerged queued state would have kept one
    assert!(state.call_stack().is_empty());
    assert!(state.guard.is_true());
}

#[test]
fn complex_branch_condition_gets_a_guard_symbol() {
    // a branch on (x < 10) is bound to a guard symbol before forking
    let outer = symbols(&[("x", u32_ty()), ("y", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Goto {
        target: 2,
        cond: Expr::binary(BinOp::Lt, var("x"), n(10), Type::Bool),
    });
    b.push(InstructionKind::Assign {
        lhs: var("y"),
        rhs: n(1),
    });
    b.push(InstructionKind::Skip);
    let functions = entry_program(b);

    let (equation, _) = run(&functions, &outer, &Options::default());
    let guard_assign = equation
        .steps()
        .iter()
        .find(|s| matches!(&s.kind, StepKind::Assignment { kind: AssignmentKind::Guard, .. }));
    assert!(guard_assign.is_some(), "expected a GUARD-kind assignment");
}

// ============================================================================
// Loops and bounds
// ============================================================================

/// `i := 0; while (i < 3) i := i + 1;` with loop head at 1.
fn counting_loop() -> GotoFunctions {
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Assign {
        lhs: var("i"),
        rhs: n(0),
    }); // 0
    b.push(InstructionKind::Goto {
        target: 4,
        cond: Expr::not(Expr::binary(BinOp::Lt, var("i"), n(3), Type::Bool)),
    }); // 1: exit test
    b.push(InstructionKind::Assign {
        lhs: var("i"),
        rhs: Expr::binary(BinOp::Add, var("i"), n(1), u32_ty()),
    }); // 2
    b.push(InstructionKind::Goto {
        target: 1,
        cond: Expr::true_expr(),
    }); // 3: back edge
    b.push(InstructionKind::Skip); // 4
    entry_program(b)
}

#[test]
fn loop_bound_with_unwinding_assertions() {
    let outer = symbols(&[("i", u32_ty())], &[]);
    let functions = counting_loop();
    let options = Options {
        unwinding_assertions: true,
        ..Options::default()
    };
    let (equation, state) = run_with_hooks(
        &functions,
        &outer,
        &options,
        DefaultHooks::new(Some(2), None),
    );

    // init plus two unwound increments, then the unwinding assertion
    assert_eq!(
        step_kinds(&equation),
        vec!["assign", "assign", "assign", "assert"]
    );
    let StepKind::Assertion { cond, msg } = &equation.assertions().next().unwrap().kind else {
        unreachable!()
    };
    assert!(cond.is_false());
    assert!(msg.starts_with("unwinding assertion loop"));
    assert!(state.guard.is_false());
}

#[test]
fn loop_bound_without_assertions_truncates_quietly() {
    let outer = symbols(&[("i", u32_ty())], &[]);
    let functions = counting_loop();
    let (equation, state) = run_with_hooks(
        &functions,
        &outer,
        &Options::default(),
        DefaultHooks::new(Some(2), None),
    );

    assert_eq!(step_kinds(&equation), vec!["assign", "assign", "assign"]);
    assert!(state.guard.is_false());
}

#[test]
fn partial_loops_leave_later_iterations_unmodelled() {
    let outer = symbols(&[("i", u32_ty())], &[]);
    let functions = counting_loop();
    let options = Options {
        partial_loops: true,
        ..Options::default()
    };
    let (equation, state) = run_with_hooks(
        &functions,
        &outer,
        &options,
        DefaultHooks::new(Some(2), None),
    );

    // execution continues past the loop under a true guard, so the trailing
    // Skip is recorded as a location
    assert_eq!(
        step_kinds(&equation),
        vec!["assign", "assign", "assign", "location"]
    );
    assert!(state.guard.is_true());
}

#[test]
fn unbounded_loop_terminates_when_condition_concretizes() {
    // with no unwind bound the loop runs to its natural exit
    let outer = symbols(&[("i", u32_ty())], &[]);
    let functions = counting_loop();
    let (equation, state) = run(&functions, &outer, &Options::default());

    // init plus three increments, then the exit
    let assigns = equation
        .steps()
        .iter()
        .filter(|s| matches!(s.kind, StepKind::Assignment { .. }))
        .count();
    assert_eq!(assigns, 4);
    assert!(state.guard.is_true());
}

#[test]
fn self_loop_becomes_assumption() {
    let outer = symbols(&[("c", Type::Bool)], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Goto {
        target: 0,
        cond: bvar("c"),
    });
    let functions = entry_program(b);

    let options = Options {
        self_loops_to_assumptions: true,
        ..Options::default()
    };
    let (equation, _) = run(&functions, &outer, &options);
    assert_eq!(step_kinds(&equation), vec!["assume"]);
}

#[test]
fn depth_limit_cuts_the_path() {
    let outer = symbols(&[("x", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    for i in 0..5 {
        b.push(InstructionKind::Assign {
            lhs: var("x"),
            rhs: n(i),
        });
    }
    let functions = entry_program(b);

    let options = Options {
        depth: 2,
        ..Options::default()
    };
    let (equation, state) = run(&functions, &outer, &options);
    // the bound is checked before the step counter advances, so depth 2
    // admits three instructions before the guard collapses
    let assigns = equation
        .steps()
        .iter()
        .filter(|s| matches!(s.kind, StepKind::Assignment { .. }))
        .count();
    assert_eq!(assigns, 3);
    assert!(state.guard.is_false());
}

// ============================================================================
// Function calls
// ============================================================================

#[test]
fn call_shuttles_return_value_and_restores_stack() {
    // f() { return 7; }  x := f();
    let outer = symbols(&[("x", u32_ty())], &[]);
    let f = Ident::new("f");

    let mut fb = ProgramBuilder::new(f);
    fb.push(InstructionKind::Return(Some(n(7))));
    let mut functions = GotoFunctions::default();
    functions.insert(
        f,
        GotoFunction {
            parameters: Vec::new(),
            return_type: u32_ty(),
            body: fb.finish(),
            hidden: false,
        },
    );

    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::FunctionCall {
        lhs: Some(var("x")),
        function: Expr::symbol(f, Type::Code {
            params: std::sync::Arc::new(Vec::new()),
            ret: std::sync::Arc::new(u32_ty()),
        }),
        arguments: Vec::new(),
    });
    functions.insert(
        GotoFunctions::entry_point(),
        GotoFunction {
            parameters: Vec::new(),
            return_type: Type::Empty,
            body: b.finish(),
            hidden: false,
        },
    );

    let options = Options {
        propagation: false,
        ..Options::default()
    };
    let (equation, state) = run(&functions, &outer, &options);

    // return_value := 7 (hidden), then x := return_value
    assert_eq!(step_kinds(&equation), vec!["assign", "assign"]);
    let StepKind::Assignment { lhs, kind, .. } = &equation.steps()[0].kind else {
        unreachable!()
    };
    assert_eq!(lhs.as_ssa().unwrap().ident, Ident::new("f::return_value"));
    assert_eq!(*kind, AssignmentKind::Hidden);

    let StepKind::Assignment { lhs, rhs, .. } = &equation.steps()[1].kind else {
        unreachable!()
    };
    assert_eq!(lhs.as_ssa().unwrap().ident, Ident::new("x"));
    assert_eq!(
        rhs.as_ssa().unwrap().ident,
        Ident::new("f::return_value")
    );

    // stack depth is back at the caller level
    assert!(state.call_stack().is_empty());
}

#[test]
fn parameters_are_assigned_in_the_callee_frame() {
    // g(a) { y := a; }  g(41);
    let outer = symbols(&[("a", u32_ty()), ("y", u32_ty())], &[]);
    let g = Ident::new("g");

    let mut gb = ProgramBuilder::new(g);
    gb.push(InstructionKind::Assign {
        lhs: var("y"),
        rhs: var("a"),
    });
    let mut functions = GotoFunctions::default();
    functions.insert(
        g,
        GotoFunction {
            parameters: vec![Parameter {
                identifier: Ident::new("a"),
                ty: u32_ty(),
            }],
            return_type: Type::Empty,
            body: gb.finish(),
            hidden: false,
        },
    );

    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::FunctionCall {
        lhs: None,
        function: Expr::symbol(g, Type::Code {
            params: std::sync::Arc::new(vec![u32_ty()]),
            ret: std::sync::Arc::new(Type::Empty),
        }),
        arguments: vec![n(41)],
    });
    functions.insert(
        GotoFunctions::entry_point(),
        GotoFunction {
            parameters: Vec::new(),
            return_type: Type::Empty,
            body: b.finish(),
            hidden: false,
        },
    );

    let (equation, _) = run(&functions, &outer, &Options::default());
    // a := 41, then y := 41 by propagation
    let StepKind::Assignment { lhs, rhs, .. } = &equation.steps()[0].kind else {
        unreachable!()
    };
    assert_eq!(lhs.as_ssa().unwrap().ident, Ident::new("a"));
    assert_eq!(rhs.as_constant_int(), Some(41));
    let StepKind::Assignment { lhs, rhs, .. } = &equation.steps()[1].kind else {
        unreachable!()
    };
    assert_eq!(lhs.as_ssa().unwrap().ident, Ident::new("y"));
    assert_eq!(rhs.as_constant_int(), Some(41));
}

#[test]
fn missing_body_havocs_the_destination() {
    let outer = symbols(&[("x", u32_ty())], &[]);
    let unknown = Ident::new("mystery");
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::FunctionCall {
        lhs: Some(var("x")),
        function: Expr::symbol(unknown, Type::Code {
            params: std::sync::Arc::new(Vec::new()),
            ret: std::sync::Arc::new(u32_ty()),
        }),
        arguments: Vec::new(),
    });
    let functions = entry_program(b);

    let (equation, _) = run(&functions, &outer, &Options::default());
    // the nondet choice is declared, then assigned to x
    assert_eq!(step_kinds(&equation), vec!["decl", "assign"]);
}

#[test]
fn recursion_bound_stops_unwinding() {
    // f() { f(); }
    let f = Ident::new("f");
    let code_ty = Type::Code {
        params: std::sync::Arc::new(Vec::new()),
        ret: std::sync::Arc::new(Type::Empty),
    };
    let mut fb = ProgramBuilder::new(f);
    fb.push(InstructionKind::FunctionCall {
        lhs: None,
        function: Expr::symbol(f, code_ty.clone()),
        arguments: Vec::new(),
    });
    let mut functions = GotoFunctions::default();
    functions.insert(
        f,
        GotoFunction {
            parameters: Vec::new(),
            return_type: Type::Empty,
            body: fb.finish(),
            hidden: false,
        },
    );
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::FunctionCall {
        lhs: None,
        function: Expr::symbol(f, code_ty),
        arguments: Vec::new(),
    });
    functions.insert(
        GotoFunctions::entry_point(),
        GotoFunction {
            parameters: Vec::new(),
            return_type: Type::Empty,
            body: b.finish(),
            hidden: false,
        },
    );

    let outer = SymbolTable::new();
    // terminates because the recursion bound cuts the path
    let (_, state) = run_with_hooks(
        &functions,
        &outer,
        &Options::default(),
        DefaultHooks::new(None, Some(2)),
    );
    assert!(state.guard.is_false());
    assert!(state.call_stack().is_empty());
}

// ============================================================================
// Pointers
// ============================================================================

#[test]
fn dereference_resolves_through_value_set() {
    // p := &a; y := *p
    let ptr_ty = Type::Pointer(std::sync::Arc::new(u32_ty()));
    let outer = symbols(
        &[("p", ptr_ty.clone()), ("a", u32_ty()), ("y", u32_ty())],
        &[],
    );
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Assign {
        lhs: Expr::symbol(Ident::new("p"), ptr_ty.clone()),
        rhs: Expr::address_of(var("a")),
    });
    b.push(InstructionKind::Assign {
        lhs: var("y"),
        rhs: Expr::dereference(Expr::symbol(Ident::new("p"), ptr_ty)),
    });
    let functions = entry_program(b);

    let (equation, state) = run(&functions, &outer, &Options::default());
    assert_eq!(step_kinds(&equation), vec!["assign", "assign"]);
    assert_eq!(state.remaining_vccs, 0);

    // deref totality: no dereference node survives in the equation
    for step in equation.steps() {
        if let StepKind::Assignment { rhs, .. } = &step.kind {
            assert!(!rhs.has_dereference(), "dereference survived: {rhs}");
        }
    }
    // the single target is read directly, no ite chain
    let StepKind::Assignment { rhs, .. } = &equation.steps()[1].kind else {
        unreachable!()
    };
    assert_eq!(rhs.as_ssa().unwrap().ident, Ident::new("a"));
}

#[test]
fn unknown_dereference_asserts_by_default() {
    let ptr_ty = Type::Pointer(std::sync::Arc::new(u32_ty()));
    let outer = symbols(&[("q", ptr_ty.clone()), ("y", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Assign {
        lhs: var("y"),
        rhs: Expr::dereference(Expr::symbol(Ident::new("q"), ptr_ty)),
    });
    let functions = entry_program(b);

    let (equation, state) = run(&functions, &outer, &Options::default());
    let assertion = equation.assertions().next().expect("pointer check emitted");
    let StepKind::Assertion { msg, .. } = &assertion.kind else {
        unreachable!()
    };
    assert!(msg.contains("dereference failure"));
    assert_eq!(state.remaining_vccs, 1);
}

#[test]
fn unknown_dereference_with_pointer_unsoundness_is_silent() {
    let ptr_ty = Type::Pointer(std::sync::Arc::new(u32_ty()));
    let outer = symbols(&[("q", ptr_ty.clone()), ("y", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Assign {
        lhs: var("y"),
        rhs: Expr::dereference(Expr::symbol(Ident::new("q"), ptr_ty)),
    });
    let functions = entry_program(b);

    let options = Options {
        allow_pointer_unsoundness: true,
        ..Options::default()
    };
    let (equation, state) = run(&functions, &outer, &options);
    assert_eq!(equation.assertions().count(), 0);
    assert_eq!(state.total_vccs, 0);
}

// ============================================================================
// Threads and atomic sections
// ============================================================================

#[test]
fn spawn_and_cross_thread_assertion() {
    // T0: x := 1;  T1: assert(x == 0 || x == 1)  with x shared
    let outer = symbols(&[], &[("x", u32_ty())]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::StartThread { target: 3 }); // 0
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(1),
    }); // 1
    b.push(InstructionKind::Goto {
        target: 5,
        cond: Expr::true_expr(),
    }); // 2: T0 skips the thread body
    b.push(InstructionKind::Assert(Expr::or(
        Expr::eq(var("x"), n(0)),
        Expr::eq(var("x"), n(1)),
    ))); // 3: T1 body
    b.push(InstructionKind::EndThread); // 4
    b.push(InstructionKind::Skip); // 5
    let functions = entry_program(b);

    let options = Options {
        propagation: false,
        ..Options::default()
    };
    let (equation, state) = run(&functions, &outer, &options);

    let kinds = step_kinds(&equation);
    assert_eq!(
        kinds,
        vec![
            "spawn",
            "assign",
            "shared_write",
            "location",
            "shared_read",
            "shared_read",
            "assert"
        ]
    );

    // T0 wrote x at version 1; T1 reads the same version
    let StepKind::Assignment { lhs, .. } = &equation.steps()[1].kind else {
        unreachable!()
    };
    let written = *lhs.as_ssa().unwrap();
    assert_eq!(written.l1, 0); // shared variables live outside any frame
    let StepKind::SharedRead { ssa } = &equation.steps()[4].kind else {
        unreachable!()
    };
    assert_eq!(*ssa.as_ssa().unwrap(), written);

    // the assertion was emitted by thread 1
    let assertion = equation.steps().last().unwrap();
    assert_eq!(assertion.thread, 1);
    assert_eq!(state.threads.len(), 2);
    assert!(!state.threads[1].active);
}

#[test]
fn atomic_section_brackets_steps() {
    let outer = symbols(&[("x", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::AtomicBegin);
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(1),
    });
    b.push(InstructionKind::AtomicEnd);
    let functions = entry_program(b);

    let (equation, state) = run(&functions, &outer, &Options::default());
    assert_eq!(
        step_kinds(&equation),
        vec!["atomic_begin", "assign", "atomic_end"]
    );
    assert_eq!(state.atomic_section_id, None);
}

// ============================================================================
// Declarations, havoc, allocation
// ============================================================================

#[test]
fn decl_and_dead_bracket_a_lifetime() {
    let outer = symbols(&[("t", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Decl {
        identifier: Ident::new("t"),
        ty: u32_ty(),
    });
    b.push(InstructionKind::Assign {
        lhs: var("t"),
        rhs: n(3),
    });
    b.push(InstructionKind::Dead {
        identifier: Ident::new("t"),
        ty: u32_ty(),
    });
    let functions = entry_program(b);

    let (equation, _) = run(&functions, &outer, &Options::default());
    assert_eq!(step_kinds(&equation), vec!["decl", "assign", "dead"]);
}

#[test]
fn havoc_assigns_a_fresh_nondet() {
    let outer = symbols(&[("x", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Other(gotosym_ir::CodeStatement::Havoc {
        target: var("x"),
    }));
    b.push(InstructionKind::Assert(Expr::eq(var("x"), n(0))));
    let functions = entry_program(b);

    let (equation, state) = run(&functions, &outer, &Options::default());
    assert_eq!(step_kinds(&equation), vec!["decl", "assign", "assert"]);
    assert_eq!(state.remaining_vccs, 1);
}

#[test]
fn allocate_mints_a_fresh_object() {
    let ptr_ty = Type::Pointer(std::sync::Arc::new(u32_ty()));
    let outer = symbols(&[("p", ptr_ty.clone()), ("y", u32_ty())], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Other(gotosym_ir::CodeStatement::Allocate {
        lhs: Expr::symbol(Ident::new("p"), ptr_ty.clone()),
        size: n(1),
    }));
    b.push(InstructionKind::Assign {
        lhs: var("y"),
        rhs: Expr::dereference(Expr::symbol(Ident::new("p"), ptr_ty)),
    });
    let functions = entry_program(b);

    let (equation, state) = run(&functions, &outer, &Options::default());
    // p := &dynamic_object$0, then y reads through it with no pointer check
    assert_eq!(step_kinds(&equation), vec!["assign", "assign"]);
    assert_eq!(state.remaining_vccs, 0);
    assert!(state
        .symbol_table
        .contains(Ident::new("dynamic_object$0")));
}

// ============================================================================
// Path exploration
// ============================================================================

#[test]
fn path_mode_explores_both_sides_without_phi() {
    let outer = symbols(&[("x", u32_ty()), ("c", Type::Bool)], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Goto {
        target: 3,
        cond: bvar("c"),
    }); // 0
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(2),
    }); // 1
    b.push(InstructionKind::Goto {
        target: 4,
        cond: Expr::true_expr(),
    }); // 2
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(1),
    }); // 3
    b.push(InstructionKind::Assert(Expr::binary(
        BinOp::Ge,
        var("x"),
        n(1),
        Type::Bool,
    ))); // 4
    let functions = entry_program(b);

    let options = Options {
        paths: true,
        ..Options::default()
    };
    let mut equation = Equation::new();
    let mut storage = PathStorage::default();
    let mut executor = Executor::new(
        &options,
        &outer,
        &mut equation,
        &mut storage,
        Box::new(DefaultHooks::default()),
    );

    let mut state = executor
        .symex_from_entry_point_of(&functions)
        .expect("symex should start");
    let mut completed = 0;
    loop {
        if executor.should_pause_symex {
            executor.should_pause_symex = false;
            executor
                .symex_with_state(&functions, &mut state)
                .expect("resume paused state");
            continue;
        }
        completed += 1;
        // merges are disabled on paths: no φ assignments anywhere
        for step in executor.equation().steps() {
            assert!(
                !matches!(&step.kind, StepKind::Assignment { kind: AssignmentKind::Phi, .. }),
                "path exploration must not merge"
            );
        }
        match executor.pop_saved_path() {
            Some(saved) => {
                state = executor
                    .resume_symex_from_saved_state(&functions, &saved)
                    .expect("resume saved path");
            }
            None => break,
        }
    }
    assert_eq!(completed, 2, "both branch sides should complete");
}

// ============================================================================
// Validation and errors
// ============================================================================

#[test]
fn validation_passes_on_well_formed_runs() {
    let outer = symbols(&[("x", u32_ty()), ("c", Type::Bool)], &[]);
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::Goto {
        target: 2,
        cond: bvar("c"),
    });
    b.push(InstructionKind::Assign {
        lhs: var("x"),
        rhs: n(9),
    });
    b.push(InstructionKind::Assert(Expr::binary(
        BinOp::Le,
        var("x"),
        n(9),
        Type::Bool,
    )));
    let functions = entry_program(b);

    let options = Options {
        validate_ssa_equation: true,
        propagation: false,
        ..Options::default()
    };
    let (equation, _) = run(&functions, &outer, &options);
    assert!(equation.validate().is_ok());
}

#[test]
fn program_without_entry_point_is_rejected() {
    let functions = GotoFunctions::default();
    let outer = SymbolTable::new();
    let options = Options::default();
    let mut equation = Equation::new();
    let mut storage = PathStorage::default();
    let mut executor = Executor::new(
        &options,
        &outer,
        &mut equation,
        &mut storage,
        Box::new(DefaultHooks::default()),
    );
    let err = executor.symex_from_entry_point_of(&functions).unwrap_err();
    assert!(matches!(err, gotosym_engine::EngineError::NoEntryPoint));
}

#[test]
fn invalid_instruction_aborts() {
    let outer = SymbolTable::new();
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::NoInstructionType);
    let functions = entry_program(b);

    let options = Options::default();
    let mut equation = Equation::new();
    let mut storage = PathStorage::default();
    let mut executor = Executor::new(
        &options,
        &outer,
        &mut equation,
        &mut storage,
        Box::new(DefaultHooks::default()),
    );
    let err = executor.symex_from_entry_point_of(&functions).unwrap_err();
    assert!(matches!(
        err,
        gotosym_engine::EngineError::Unsupported(_)
    ));
}

/// Hook wiring: a custom capability set sees no-body calls.
#[test]
fn hooks_observe_missing_bodies() {
    #[derive(Default, Clone)]
    struct Recording {
        missing: std::rc::Rc<std::cell::RefCell<Vec<Ident>>>,
    }
    impl SymexHooks for Recording {
        fn no_body(&mut self, function: Ident) {
            self.missing.borrow_mut().push(function);
        }
    }

    let outer = symbols(&[("x", u32_ty())], &[]);
    let ghost = Ident::new("ghost");
    let mut b = ProgramBuilder::new(GotoFunctions::entry_point());
    b.push(InstructionKind::FunctionCall {
        lhs: None,
        function: Expr::symbol(ghost, Type::Code {
            params: std::sync::Arc::new(Vec::new()),
            ret: std::sync::Arc::new(Type::Empty),
        }),
        arguments: Vec::new(),
    });
    let functions = entry_program(b);

    let options = Options::default();
    let mut equation = Equation::new();
    let mut storage = PathStorage::default();
    let hooks = Recording::default();
    let record = hooks.missing.clone();
    let mut executor = Executor::new(
        &options,
        &outer,
        &mut equation,
        &mut storage,
        Box::new(hooks),
    );
    executor.symex_from_entry_point_of(&functions).unwrap();
    assert_eq!(record.borrow().as_slice(), &[ghost]);
}
