//! SMT-LIB 2 text backend: writes the equation as `QF_AUFBV` text to a
//! file or stdout, or pipes it through an external solver binary.

use crate::{EquationConverter, SatOutcome, SolverError, SolverResult};
use gotosym_engine::{Equation, StepKind};
use gotosym_ir::{
    BinOp, Constant, Designator, Expr, ExprKind, Ident, SsaName, Type, UnaryOp,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

/// External solver variants the SMT2 backend can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smt2SolverKind {
    Boolector,
    CproverSmt2,
    Mathsat,
    Cvc3,
    Cvc4,
    Yices,
    Z3,
    Generic,
}

impl Smt2SolverKind {
    /// Command line driving the external solver on an .smt2 file.
    fn command(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            Smt2SolverKind::Boolector => Some(("boolector", &["--smt2"])),
            Smt2SolverKind::CproverSmt2 => Some(("smt2_solver", &[])),
            Smt2SolverKind::Mathsat => Some(("mathsat", &[])),
            Smt2SolverKind::Cvc3 => Some(("cvc3", &["-lang", "smtlib2"])),
            Smt2SolverKind::Cvc4 => Some(("cvc4", &["--lang", "smt2"])),
            Smt2SolverKind::Yices => Some(("yices-smt2", &[])),
            Smt2SolverKind::Z3 => Some(("z3", &["-smt2"])),
            Smt2SolverKind::Generic => None,
        }
    }
}

/// Where the generated text goes.
#[derive(Debug, Clone)]
pub enum Smt2Target {
    File(PathBuf),
    Stdout,
    /// Temp file piped through the external solver process.
    Pipe,
}

pub struct Smt2Conv {
    kind: Smt2SolverKind,
    target: Smt2Target,
    fpa: bool,
    declarations: BTreeMap<String, String>,
    object_ids: ahash::AHashMap<Ident, u64>,
    fresh_counter: u64,
    body: Vec<String>,
    assertion_terms: Vec<String>,
    time_limit: Option<Duration>,
}

impl Smt2Conv {
    pub fn new(kind: Smt2SolverKind, target: Smt2Target, fpa: bool) -> Self {
        Smt2Conv {
            kind,
            target,
            fpa,
            declarations: BTreeMap::new(),
            object_ids: ahash::AHashMap::new(),
            fresh_counter: 0,
            body: Vec::new(),
            assertion_terms: Vec::new(),
            time_limit: None,
        }
    }

    /// Assemble the complete SMT-LIB 2 document.
    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("(set-info :source |generated by gotosym|)\n");
        out.push_str("(set-option :produce-models true)\n");
        out.push_str("(set-logic QF_AUFBV)\n");
        if self.fpa {
            out.push_str("(set-info :notes \"floating-point axioms enabled\")\n");
        }
        for (name, sort) in &self.declarations {
            out.push_str(&format!("(declare-const {name} {sort})\n"));
        }
        for line in &self.body {
            out.push_str(line);
            out.push('\n');
        }
        if self.assertion_terms.is_empty() {
            out.push_str("(assert false)\n");
        } else if self.assertion_terms.len() == 1 {
            out.push_str(&format!("(assert (not {}))\n", self.assertion_terms[0]));
        } else {
            out.push_str(&format!(
                "(assert (not (and {})))\n",
                self.assertion_terms.join(" ")
            ));
        }
        out.push_str("(check-sat)\n");
        out
    }

    fn declare(&mut self, name: String, ty: &Type) -> SolverResult<String> {
        let sort = sort_of(ty)?;
        self.declarations.entry(name.clone()).or_insert(sort);
        Ok(name)
    }

    fn ssa_name(name: &SsaName) -> String {
        format!("|{name}|")
    }

    fn fresh(&mut self, prefix: &str, ty: &Type) -> SolverResult<String> {
        let name = format!("|{prefix}#{}|", self.fresh_counter);
        self.fresh_counter += 1;
        self.declare(name, ty)
    }

    fn object_id(&mut self, ident: Ident) -> u64 {
        let next = self.object_ids.len() as u64 + 1;
        *self.object_ids.entry(ident).or_insert(next)
    }

    /// Translate one expression to an SMT-LIB term.
    fn term(&mut self, expr: &Expr) -> SolverResult<String> {
        match &expr.kind {
            ExprKind::Constant(c) => self.constant_term(c, &expr.ty),
            ExprKind::Ssa(name) => self.declare(Self::ssa_name(name), &expr.ty),
            ExprKind::Symbol(id) => Err(SolverError::Encoding(format!(
                "program variable '{id}' reached the solver un-renamed"
            ))),
            ExprKind::Unary { op, operand } => {
                let x = self.term(operand)?;
                Ok(match op {
                    UnaryOp::Not => format!("(not {x})"),
                    UnaryOp::Neg => format!("(bvneg {x})"),
                    UnaryOp::BitNot => format!("(bvnot {x})"),
                    UnaryOp::StrLen => x,
                })
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let signed = matches!(lhs.ty, Type::Signed(_));
                let l = self.term(lhs)?;
                let r = self.term(rhs)?;
                let f = match (op, signed) {
                    (BinOp::And, _) => "and",
                    (BinOp::Or, _) => "or",
                    (BinOp::Implies, _) => "=>",
                    (BinOp::Eq, _) => "=",
                    (BinOp::Ne, _) => "distinct",
                    (BinOp::Lt, true) => "bvslt",
                    (BinOp::Lt, false) => "bvult",
                    (BinOp::Le, true) => "bvsle",
                    (BinOp::Le, false) => "bvule",
                    (BinOp::Gt, true) => "bvsgt",
                    (BinOp::Gt, false) => "bvugt",
                    (BinOp::Ge, true) => "bvsge",
                    (BinOp::Ge, false) => "bvuge",
                    (BinOp::Add, _) => "bvadd",
                    (BinOp::Sub, _) => "bvsub",
                    (BinOp::Mul, _) => "bvmul",
                    (BinOp::Div, true) => "bvsdiv",
                    (BinOp::Div, false) => "bvudiv",
                    (BinOp::Mod, true) => "bvsrem",
                    (BinOp::Mod, false) => "bvurem",
                    (BinOp::BitAnd, _) => "bvand",
                    (BinOp::BitOr, _) => "bvor",
                    (BinOp::BitXor, _) => "bvxor",
                    (BinOp::Shl, _) => "bvshl",
                    (BinOp::Shr, true) => "bvashr",
                    (BinOp::Shr, false) => "bvlshr",
                    (BinOp::Concat, _) => "concat",
                };
                Ok(format!("({f} {l} {r})"))
            }
            ExprKind::Ite {
                cond,
                then_value,
                else_value,
            } => {
                let c = self.term(cond)?;
                let t = self.term(then_value)?;
                let e = self.term(else_value)?;
                Ok(format!("(ite {c} {t} {e})"))
            }
            ExprKind::Index { array, index } => {
                let a = self.term(array)?;
                let i = self.index_term(index)?;
                Ok(format!("(select {a} {i})"))
            }
            ExprKind::With {
                base,
                designator: Designator::Index(index),
                value,
            } => {
                let a = self.term(base)?;
                let i = self.index_term(index)?;
                let v = self.term(value)?;
                Ok(format!("(store {a} {i} {v})"))
            }
            ExprKind::With { .. } | ExprKind::Member { .. } => Err(SolverError::Unsupported(
                "struct encoding in SMT2 output".to_owned(),
            )),
            ExprKind::Typecast(inner) => self.cast_term(inner, &expr.ty),
            ExprKind::ByteExtract { base, offset } => {
                let width = expr.ty.width().ok_or_else(|| {
                    SolverError::Unsupported(format!("byte-extract of type {}", expr.ty))
                })?;
                let k = constant_offset(offset)?;
                let b = self.term(base)?;
                Ok(format!(
                    "((_ extract {} {}) {b})",
                    k * 8 + width as u64 - 1,
                    k * 8
                ))
            }
            ExprKind::ByteUpdate {
                base,
                offset,
                value,
            } => {
                let k = constant_offset(offset)?;
                let total = base.ty.width().ok_or_else(|| {
                    SolverError::Unsupported("byte-update on a non-scalar".to_owned())
                })? as u64;
                let vw = value.ty.width().ok_or_else(|| {
                    SolverError::Unsupported("byte-update with a non-scalar value".to_owned())
                })? as u64;
                let b = self.term(base)?;
                let v = self.term(value)?;
                let lo = k * 8;
                let hi = lo + vw;
                let mut parts = Vec::new();
                if hi < total {
                    parts.push(format!("((_ extract {} {hi}) {b})", total - 1));
                }
                parts.push(v);
                if lo > 0 {
                    parts.push(format!("((_ extract {} 0) {b})", lo - 1));
                }
                if parts.len() == 1 {
                    Ok(parts.pop().expect("one part"))
                } else {
                    Ok(format!("(concat {})", parts.join(" ")))
                }
            }
            ExprKind::AddressOf(object) => self.address_term(object),
            ExprKind::Dereference(_) => Err(SolverError::Encoding(
                "dereference reached the solver; the engine should have lowered it".to_owned(),
            )),
            ExprKind::FailedObject(_) => self.fresh("failed_object", &expr.ty),
            ExprKind::Quantifier { .. } => Err(SolverError::Unsupported(
                "quantified formula in SMT2 output".to_owned(),
            )),
            ExprKind::FunctionCall { .. } | ExprKind::SideEffect(_) => Err(
                SolverError::Encoding(format!("impure expression reached the solver: {expr}")),
            ),
        }
    }

    fn constant_term(&mut self, c: &Constant, ty: &Type) -> SolverResult<String> {
        match c {
            Constant::Bool(b) => Ok(b.to_string()),
            Constant::Integer(n) => {
                let width = ty.width().ok_or_else(|| {
                    SolverError::Encoding(format!("integer constant of type {ty}"))
                })?;
                let masked = if width >= 128 {
                    *n as u128
                } else {
                    (*n as u128) & ((1u128 << width) - 1)
                };
                Ok(format!("(_ bv{masked} {width})"))
            }
            Constant::Null => Ok("(_ bv0 64)".to_owned()),
            Constant::StringLit(s) => Ok(format!("(_ bv{} 64)", s.len())),
        }
    }

    fn cast_term(&mut self, inner: &Expr, target: &Type) -> SolverResult<String> {
        if inner.ty == *target {
            return self.term(inner);
        }
        let x = self.term(inner)?;
        match (&inner.ty, target) {
            (Type::Bool, t) if t.width().is_some() => {
                let w = t.width().expect("checked");
                Ok(format!("(ite {x} (_ bv1 {w}) (_ bv0 {w}))"))
            }
            (s, Type::Bool) if s.width().is_some() => {
                let w = s.width().expect("checked");
                Ok(format!("(distinct {x} (_ bv0 {w}))"))
            }
            (from, to) => {
                let (Some(fw), Some(tw)) = (from.width(), to.width()) else {
                    return Err(SolverError::Unsupported(format!(
                        "typecast from {from} to {to}"
                    )));
                };
                Ok(match tw.cmp(&fw) {
                    std::cmp::Ordering::Equal => x,
                    std::cmp::Ordering::Less => format!("((_ extract {} 0) {x})", tw - 1),
                    std::cmp::Ordering::Greater if matches!(from, Type::Signed(_)) => {
                        format!("((_ sign_extend {}) {x})", tw - fw)
                    }
                    std::cmp::Ordering::Greater => {
                        format!("((_ zero_extend {}) {x})", tw - fw)
                    }
                })
            }
        }
    }

    /// Indices are widened to the 64-bit array domain.
    fn index_term(&mut self, index: &Expr) -> SolverResult<String> {
        let w = index.ty.width().unwrap_or(64);
        let x = self.term(index)?;
        Ok(match w.cmp(&64) {
            std::cmp::Ordering::Equal => x,
            std::cmp::Ordering::Less => format!("((_ zero_extend {}) {x})", 64 - w),
            std::cmp::Ordering::Greater => format!("((_ extract 63 0) {x})"),
        })
    }

    fn address_term(&mut self, object: &Expr) -> SolverResult<String> {
        match &object.kind {
            ExprKind::Ssa(name) => {
                let id = self.object_id(name.ident);
                Ok(format!("(_ bv{} 64)", id << 32))
            }
            ExprKind::Index { array, index } => {
                let base = self.address_term(array)?;
                let offset = self.index_term(index)?;
                Ok(format!("(bvadd {base} {offset})"))
            }
            _ => Err(SolverError::Unsupported(format!("address of '{object}'"))),
        }
    }

    fn run_external(&self, text: &str) -> SolverResult<SatOutcome> {
        let (binary, args) = self.kind.command().ok_or_else(|| {
            SolverError::Process("generic SMT2 mode has no solver binary".to_owned())
        })?;

        let mut tmp = tempfile::NamedTempFile::with_suffix(".smt2").map_err(|e| {
            SolverError::Io {
                path: "<tempfile>".to_owned(),
                message: e.to_string(),
            }
        })?;
        tmp.write_all(text.as_bytes()).map_err(|e| SolverError::Io {
            path: "<tempfile>".to_owned(),
            message: e.to_string(),
        })?;

        let path = tmp.path().to_string_lossy().to_string();
        info!(solver = binary, path, "invoking external SMT2 solver");
        let mut command = Command::new(binary);
        command.args(args).arg(&path);
        if let Some(limit) = self.time_limit {
            // solvers in this set accept no uniform timeout flag; enforce on
            // the process instead
            return run_with_deadline(command, limit);
        }
        let output = command
            .output()
            .map_err(|e| SolverError::Process(format!("failed to invoke {binary}: {e}")))?;
        parse_solver_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn run_with_deadline(mut command: Command, limit: Duration) -> SolverResult<SatOutcome> {
    use std::process::Stdio;
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| SolverError::Process(format!("failed to spawn solver: {e}")))?;
    let deadline = std::time::Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if std::time::Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(SatOutcome::Unknown {
                        reason: format!("solver timed out after {}s", limit.as_secs()),
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                let _ = child.kill();
                return Err(SolverError::Process(format!("solver wait error: {e}")));
            }
        }
    }
    let output = child
        .wait_with_output()
        .map_err(|e| SolverError::Process(format!("solver output error: {e}")))?;
    parse_solver_output(&String::from_utf8_lossy(&output.stdout))
}

fn parse_solver_output(stdout: &str) -> SolverResult<SatOutcome> {
    for line in stdout.lines() {
        match line.trim() {
            "unsat" => return Ok(SatOutcome::Unsat),
            "sat" => return Ok(SatOutcome::Sat),
            "unknown" => {
                return Ok(SatOutcome::Unknown {
                    reason: "solver returned unknown".to_owned(),
                })
            }
            _ => continue,
        }
    }
    Ok(SatOutcome::Unknown {
        reason: format!("unrecognized solver output: {}", stdout.trim()),
    })
}

fn constant_offset(offset: &Expr) -> SolverResult<u64> {
    offset
        .as_constant_int()
        .map(|k| k as u64)
        .ok_or_else(|| SolverError::Unsupported("symbolic byte offset".to_owned()))
}

fn sort_of(ty: &Type) -> SolverResult<String> {
    match ty {
        Type::Bool => Ok("Bool".to_owned()),
        Type::Unsigned(w) | Type::Signed(w) => Ok(format!("(_ BitVec {w})")),
        Type::Pointer(_) => Ok("(_ BitVec 64)".to_owned()),
        Type::String => Ok("(_ BitVec 64)".to_owned()),
        Type::Array { elem, .. } => {
            let range = sort_of(elem)?;
            Ok(format!("(Array (_ BitVec 64) {range})"))
        }
        _ => Err(SolverError::Unsupported(format!(
            "cannot declare a value of type {ty}"
        ))),
    }
}

impl EquationConverter for Smt2Conv {
    fn convert(&mut self, equation: &Equation) -> SolverResult<()> {
        for step in equation.steps() {
            match &step.kind {
                StepKind::Assignment { lhs, rhs, .. } => {
                    let l = self.term(lhs)?;
                    let r = self.term(rhs)?;
                    self.body.push(format!("(assert (= {l} {r}))"));
                }
                StepKind::Assumption { cond } | StepKind::Constraint { cond } => {
                    let c = self.term(cond)?;
                    self.body.push(format!("(assert {c})"));
                }
                StepKind::Assertion { cond, msg } => {
                    let c = self.term(cond)?;
                    self.body.push(format!("; assertion: {msg}"));
                    self.assertion_terms.push(c);
                }
                _ => {}
            }
        }
        debug!(steps = equation.len(), "equation rendered to SMT2");
        Ok(())
    }

    fn check(&mut self) -> SolverResult<SatOutcome> {
        let text = self.render();
        match &self.target {
            Smt2Target::File(path) => {
                std::fs::write(path, &text).map_err(|e| SolverError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                info!(path = %path.display(), "SMT2 formula written");
                Ok(SatOutcome::Unknown {
                    reason: format!("formula written to {}", path.display()),
                })
            }
            Smt2Target::Stdout => {
                print!("{text}");
                Ok(SatOutcome::Unknown {
                    reason: "formula written to stdout".to_owned(),
                })
            }
            Smt2Target::Pipe => self.run_external(&text),
        }
    }

    fn value_of(&self, _name: &SsaName) -> Option<String> {
        // text back-ends do not reconstruct models
        None
    }

    fn set_time_limit(&mut self, limit: Duration) {
        self.time_limit = Some(limit);
    }

    fn description(&self) -> &'static str {
        "SMT2 text"
    }
}
