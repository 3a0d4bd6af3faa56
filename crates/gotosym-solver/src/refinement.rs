//! Lazy refinement backend.
//!
//! Arrays and nonlinear multiplication are first encoded as uninterpreted
//! constants; the check loop validates each candidate model against the real
//! axioms and asserts the violated instances, tightening until the model is
//! genuine, the formula becomes unsatisfiable, or the refinement bound is
//! hit. The string variant adds length axioms over the abstracted string
//! values.

use crate::encode::{Encoder, MulSite, SelectSite, StoreSite};
use crate::smt::{apply_time_limit, assert_refutation, convert_steps, model_value};
use crate::{EquationConverter, SatOutcome, SolverResult};
use gotosym_engine::{ArraysUf, Equation};
use gotosym_ir::SsaName;
use std::time::Duration;
use tracing::{debug, info};
use z3::ast::{Ast, Bool, Dynamic, Int, BV};
use z3::{Model, SatResult, Solver};

/// Fixed refinement bound of the string variant, unless overridden.
pub const DEFAULT_REFINEMENT_BOUND: u32 = 30;

/// Default iteration bound when `max-node-refinement` is not given.
const DEFAULT_MAX_ITERATIONS: u32 = 10;

pub struct RefinementSolver {
    encoder: Encoder,
    solver: Solver,
    assertions: Vec<Bool>,
    model: Option<Model>,
    max_iterations: u32,
    refine_arrays: bool,
    refine_arithmetic: bool,
    with_strings: bool,
    time_limit: Option<Duration>,
}

impl RefinementSolver {
    pub fn new(
        max_node_refinement: Option<u32>,
        refine_arrays: bool,
        refine_arithmetic: bool,
    ) -> Self {
        RefinementSolver {
            encoder: Encoder::new(ArraysUf::Auto, refine_arrays, refine_arithmetic),
            solver: Solver::new(),
            assertions: Vec::new(),
            model: None,
            max_iterations: max_node_refinement.unwrap_or(DEFAULT_MAX_ITERATIONS),
            refine_arrays,
            refine_arithmetic,
            with_strings: false,
            time_limit: None,
        }
    }

    /// The string variant: refinement plus string-length axioms, with the
    /// fixed default bound unless overridden.
    pub fn with_strings(
        max_node_refinement: Option<u32>,
        refine_arrays: bool,
        refine_arithmetic: bool,
    ) -> Self {
        let mut solver = RefinementSolver::new(
            Some(max_node_refinement.unwrap_or(DEFAULT_REFINEMENT_BOUND)),
            refine_arrays,
            refine_arithmetic,
        );
        solver.with_strings = true;
        solver
    }

    /// Axiom instances the current model violates.
    fn violated_axioms(&mut self, model: &Model) -> SolverResult<Vec<Bool>> {
        let mut lemmas = Vec::new();
        if self.refine_arrays {
            lemmas.extend(self.violated_select_congruence(model));
            lemmas.extend(self.violated_store_axioms(model)?);
        }
        if self.refine_arithmetic {
            lemmas.extend(self.violated_multiplications(model));
        }
        Ok(lemmas)
    }

    /// Two reads of the same array at equal indices must agree.
    fn violated_select_congruence(&self, model: &Model) -> Vec<Bool> {
        let sites = &self.encoder.select_sites;
        let mut lemmas = Vec::new();
        for (i, a) in sites.iter().enumerate() {
            for b in sites.iter().skip(i + 1) {
                if a.array != b.array {
                    continue;
                }
                let same_index = eval_eq(model, &a.index, &b.index);
                let same_value = eval_eq(model, &a.value, &b.value);
                if same_index && !same_value {
                    let premise = dyn_eq(&a.index, &b.index);
                    let conclusion = dyn_eq(&a.value, &b.value);
                    lemmas.push(premise.implies(&conclusion));
                }
            }
        }
        lemmas
    }

    /// Reads through a store see the written value at the written index and
    /// the base array elsewhere.
    fn violated_store_axioms(&mut self, model: &Model) -> SolverResult<Vec<Bool>> {
        let mut lemmas = Vec::new();
        let stores: Vec<StoreSite> = self.encoder.store_sites.clone();
        let selects: Vec<SelectSite> = self.encoder.select_sites.clone();
        for store in &stores {
            for select in selects.iter().filter(|s| s.array == store.result) {
                if eval_eq(model, &select.index, &store.index) {
                    if !eval_eq(model, &select.value, &store.value) {
                        let premise = dyn_eq(&select.index, &store.index);
                        let conclusion = dyn_eq(&select.value, &store.value);
                        lemmas.push(premise.implies(&conclusion));
                    }
                } else {
                    // frame: reading elsewhere must see the base array
                    let base_read = self.base_read(store, select)?;
                    if !eval_eq(model, &select.value, &base_read) {
                        let distinct = dyn_eq(&select.index, &store.index).not();
                        let conclusion = dyn_eq(&select.value, &base_read);
                        lemmas.push(distinct.implies(&conclusion));
                    }
                }
            }
        }
        Ok(lemmas)
    }

    /// The value of `store.base[select.index]`, materialized on demand as a
    /// new select site so later rounds refine it too.
    fn base_read(&mut self, store: &StoreSite, select: &SelectSite) -> SolverResult<Dynamic> {
        if let Some(existing) = self
            .encoder
            .select_sites
            .iter()
            .find(|s| s.array == store.base && s.index == select.index)
        {
            return Ok(existing.value.clone());
        }
        let value = fresh_like(&select.value, self.encoder.select_sites.len());
        self.encoder.select_sites.push(SelectSite {
            array: store.base.clone(),
            index: select.index.clone(),
            value: value.clone(),
        });
        Ok(value)
    }

    /// Abstracted multiplications must match their concrete product.
    fn violated_multiplications(&self, model: &Model) -> Vec<Bool> {
        let mut lemmas = Vec::new();
        for MulSite { lhs, rhs, result } in &self.encoder.mul_sites {
            let (Some(va), Some(vb), Some(vm)) = (
                eval_bv(model, lhs),
                eval_bv(model, rhs),
                eval_bv(model, result),
            ) else {
                continue;
            };
            let width = lhs.get_size();
            let product = va.wrapping_mul(vb) & mask(width);
            if vm != product {
                let a_is = lhs.eq(&BV::from_u64(va, width));
                let b_is = rhs.eq(&BV::from_u64(vb, width));
                let exact = result.eq(&BV::from_u64(product, width));
                lemmas.push(Bool::and(&[a_is, b_is]).implies(&exact));
            }
        }
        lemmas
    }
}

impl EquationConverter for RefinementSolver {
    fn convert(&mut self, equation: &Equation) -> SolverResult<()> {
        convert_steps(&mut self.encoder, &self.solver, &mut self.assertions, equation)?;
        if self.with_strings {
            // every abstracted string has a non-negative length
            let zero = Int::from_i64(0);
            for len in &self.encoder.string_lengths {
                self.solver.assert(&len.ge(&zero));
            }
        }
        Ok(())
    }

    fn check(&mut self) -> SolverResult<SatOutcome> {
        apply_time_limit(&self.solver, self.time_limit);
        assert_refutation(&self.solver, &self.assertions);

        for iteration in 0..=self.max_iterations {
            match self.solver.check() {
                SatResult::Unsat => return Ok(SatOutcome::Unsat),
                SatResult::Unknown => {
                    return Ok(SatOutcome::Unknown {
                        reason: self
                            .solver
                            .get_reason_unknown()
                            .unwrap_or_else(|| "solver returned unknown".to_owned()),
                    })
                }
                SatResult::Sat => {
                    let model = self
                        .solver
                        .get_model()
                        .ok_or_else(|| crate::SolverError::Process(
                            "sat without a model".to_owned(),
                        ))?;
                    let lemmas = self.violated_axioms(&model)?;
                    if lemmas.is_empty() {
                        debug!(iteration, "model survived refinement");
                        self.model = Some(model);
                        return Ok(SatOutcome::Sat);
                    }
                    info!(iteration, lemmas = lemmas.len(), "refining");
                    for lemma in lemmas {
                        self.solver.assert(&lemma);
                    }
                }
            }
        }
        Ok(SatOutcome::Unknown {
            reason: format!("refinement bound of {} exceeded", self.max_iterations),
        })
    }

    fn value_of(&self, name: &SsaName) -> Option<String> {
        model_value(self.model.as_ref()?, &self.encoder, name)
    }

    fn set_time_limit(&mut self, limit: Duration) {
        self.time_limit = Some(limit);
    }

    fn description(&self) -> &'static str {
        if self.with_strings {
            "string refinement"
        } else {
            "bit-vector refinement"
        }
    }
}

fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn eval_bv(model: &Model, bv: &BV) -> Option<u64> {
    model.eval(bv, true).and_then(|v| v.as_u64())
}

fn eval_eq(model: &Model, a: &Dynamic, b: &Dynamic) -> bool {
    match (a.as_bv(), b.as_bv()) {
        (Some(x), Some(y)) => {
            let vx = model.eval(&x, true).and_then(|v| v.as_u64());
            let vy = model.eval(&y, true).and_then(|v| v.as_u64());
            vx.is_some() && vx == vy
        }
        _ => match (a.as_bool(), b.as_bool()) {
            (Some(x), Some(y)) => {
                let vx = model.eval(&x, true).and_then(|v| v.as_bool());
                let vy = model.eval(&y, true).and_then(|v| v.as_bool());
                vx.is_some() && vx == vy
            }
            _ => false,
        },
    }
}

fn dyn_eq(a: &Dynamic, b: &Dynamic) -> Bool {
    if let (Some(x), Some(y)) = (a.as_bv(), b.as_bv()) {
        return x.eq(&y);
    }
    if let (Some(x), Some(y)) = (a.as_bool(), b.as_bool()) {
        return x.eq(&y);
    }
    Bool::from_bool(false)
}

/// A fresh constant of the same sort as the template.
fn fresh_like(template: &Dynamic, counter: usize) -> Dynamic {
    let name = format!("select:base#{counter}");
    if let Some(bv) = template.as_bv() {
        return Dynamic::from_ast(&BV::new_const(name, bv.get_size()));
    }
    Dynamic::from_ast(&Bool::new_const(name))
}
