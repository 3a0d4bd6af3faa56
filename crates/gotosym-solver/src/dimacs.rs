//! DIMACS CNF backend.
//!
//! Tseitin-encodes the boolean skeleton of the equation; non-boolean atoms
//! (bit-vector comparisons, non-boolean assignments) become opaque
//! propositional variables. The CNF is written to the output file and the
//! decision is left to the offline SAT solver.

use crate::{EquationConverter, SatOutcome, SolverError, SolverResult};
use gotosym_engine::{Equation, StepKind};
use gotosym_ir::{BinOp, Expr, ExprKind, SsaName, Type, UnaryOp};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// A literal: positive or negative variable index.
type Lit = i64;

pub struct DimacsConv {
    /// Output file; `-` or empty writes to stdout.
    path: String,
    variables: u64,
    clauses: Vec<Vec<Lit>>,
    /// Atom cache: structurally equal atoms share a variable.
    atoms: ahash::AHashMap<Expr, Lit>,
    assertion_lits: Vec<Lit>,
    /// Variable 1 is constrained true and stands for the constant.
    true_lit: Lit,
}

impl DimacsConv {
    pub fn new(path: String) -> Self {
        let mut conv = DimacsConv {
            path,
            variables: 1,
            clauses: Vec::new(),
            atoms: ahash::AHashMap::new(),
            assertion_lits: Vec::new(),
            true_lit: 1,
        };
        conv.clauses.push(vec![conv.true_lit]);
        conv
    }

    fn fresh(&mut self) -> Lit {
        self.variables += 1;
        self.variables as Lit
    }

    fn atom(&mut self, expr: &Expr) -> Lit {
        if let Some(&lit) = self.atoms.get(expr) {
            return lit;
        }
        let lit = self.fresh();
        self.atoms.insert(expr.clone(), lit);
        lit
    }

    /// Tseitin encoding of a boolean expression; returns its literal.
    fn encode(&mut self, expr: &Expr) -> SolverResult<Lit> {
        match &expr.kind {
            ExprKind::Constant(gotosym_ir::Constant::Bool(b)) => {
                Ok(if *b { self.true_lit } else { -self.true_lit })
            }
            ExprKind::Ssa(_) if expr.ty == Type::Bool => Ok(self.atom(expr)),
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(-self.encode(operand)?),
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinOp::And => {
                    let a = self.encode(lhs)?;
                    let b = self.encode(rhs)?;
                    let g = self.fresh();
                    self.clauses.push(vec![-g, a]);
                    self.clauses.push(vec![-g, b]);
                    self.clauses.push(vec![g, -a, -b]);
                    Ok(g)
                }
                BinOp::Or => {
                    let a = self.encode(lhs)?;
                    let b = self.encode(rhs)?;
                    let g = self.fresh();
                    self.clauses.push(vec![-g, a, b]);
                    self.clauses.push(vec![g, -a]);
                    self.clauses.push(vec![g, -b]);
                    Ok(g)
                }
                BinOp::Implies => {
                    let a = self.encode(lhs)?;
                    let b = self.encode(rhs)?;
                    let g = self.fresh();
                    self.clauses.push(vec![-g, -a, b]);
                    self.clauses.push(vec![g, a]);
                    self.clauses.push(vec![g, -b]);
                    Ok(g)
                }
                BinOp::Eq | BinOp::Ne if lhs.ty == Type::Bool => {
                    let a = self.encode(lhs)?;
                    let b = self.encode(rhs)?;
                    let g = self.fresh();
                    // g <-> (a <-> b)
                    self.clauses.push(vec![-g, -a, b]);
                    self.clauses.push(vec![-g, a, -b]);
                    self.clauses.push(vec![g, a, b]);
                    self.clauses.push(vec![g, -a, -b]);
                    Ok(if *op == BinOp::Ne { -g } else { g })
                }
                // bit-level atoms are abstracted
                _ => Ok(self.atom(expr)),
            },
            ExprKind::Ite {
                cond,
                then_value,
                else_value,
            } if expr.ty == Type::Bool => {
                let c = self.encode(cond)?;
                let t = self.encode(then_value)?;
                let e = self.encode(else_value)?;
                let g = self.fresh();
                self.clauses.push(vec![-g, -c, t]);
                self.clauses.push(vec![-g, c, e]);
                self.clauses.push(vec![g, -c, -t]);
                self.clauses.push(vec![g, c, -e]);
                Ok(g)
            }
            _ => Ok(self.atom(expr)),
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("c generated by gotosym\n");
        out.push_str(&format!(
            "p cnf {} {}\n",
            self.variables,
            self.clauses.len()
        ));
        for clause in &self.clauses {
            for lit in clause {
                out.push_str(&format!("{lit} "));
            }
            out.push_str("0\n");
        }
        out
    }
}

impl EquationConverter for DimacsConv {
    fn convert(&mut self, equation: &Equation) -> SolverResult<()> {
        for step in equation.steps() {
            match &step.kind {
                StepKind::Assignment { lhs, rhs, .. } => {
                    if lhs.ty == Type::Bool {
                        // lhs <-> rhs
                        let l = self.encode(lhs)?;
                        let r = self.encode(rhs)?;
                        self.clauses.push(vec![-l, r]);
                        self.clauses.push(vec![l, -r]);
                    } else {
                        // non-boolean definitions become asserted atoms
                        let eq = Expr::eq(lhs.clone(), rhs.clone());
                        let lit = self.atom(&eq);
                        self.clauses.push(vec![lit]);
                    }
                }
                StepKind::Assumption { cond } | StepKind::Constraint { cond } => {
                    let lit = self.encode(cond)?;
                    self.clauses.push(vec![lit]);
                }
                StepKind::Assertion { cond, .. } => {
                    let lit = self.encode(cond)?;
                    self.assertion_lits.push(lit);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check(&mut self) -> SolverResult<SatOutcome> {
        // refute the conjunction of assertions
        if self.assertion_lits.is_empty() {
            self.clauses.push(vec![-self.true_lit]);
        } else {
            let clause: Vec<Lit> = self.assertion_lits.iter().map(|l| -l).collect();
            self.clauses.push(clause);
        }

        let text = self.render();
        if self.path.is_empty() || self.path == "-" {
            print!("{text}");
            info!("CNF written to stdout");
        } else {
            std::fs::write(&self.path, &text).map_err(|e| SolverError::Io {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
            info!(path = %self.path, clauses = self.clauses.len(), "CNF written");
        }
        Ok(SatOutcome::Unknown {
            reason: "CNF written for an offline SAT solver".to_owned(),
        })
    }

    fn value_of(&self, _name: &SsaName) -> Option<String> {
        None
    }

    fn set_time_limit(&mut self, _limit: Duration) {
        // the offline solver owns its own budget
    }

    fn description(&self) -> &'static str {
        "DIMACS CNF"
    }
}

impl DimacsConv {
    /// Output path accessor for tests.
    pub fn path(&self) -> &str {
        &self.path
    }
}
