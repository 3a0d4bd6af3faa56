//! Expression encoder: translates equation expressions to Z3 ASTs.
//!
//! Scalars (bool, bit-vectors, pointers) map directly; pointers flatten to
//! 64-bit words carrying an object id in the high half and the offset in
//! the low half. Fixed-size arrays are exploded into per-element constants,
//! unbounded arrays use the array theory, and the refinement back-end
//! replaces array reads and nonlinear multiplication by fresh constants
//! whose axioms are instantiated lazily.

use crate::{SolverError, SolverResult};
use gotosym_engine::ArraysUf;
use gotosym_ir::{
    BinOp, Constant, Designator, Expr, ExprKind, Ident, SsaName, Type, UnaryOp,
};
use z3::ast::{Array, Ast, Bool, Dynamic, Int, BV};
use z3::Sort;

/// Largest fixed array size that is exploded element-wise.
const EXPLODE_LIMIT: u64 = 64;

/// Pointers are (object id << 32) | offset in a 64-bit word.
const POINTER_OBJECT_SHIFT: u64 = 32;

/// An encoded value.
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(Dynamic),
    /// Fixed-size array exploded into one scalar per element.
    Elems(Vec<Dynamic>),
    /// Array-theory value.
    Arr(Array),
    /// Uninterpreted array handle used by the refinement back-end.
    Abstract(String),
}

/// A recorded array read under refinement: `value = key[index]`.
#[derive(Debug, Clone)]
pub struct SelectSite {
    pub array: String,
    pub index: Dynamic,
    pub value: Dynamic,
}

/// A recorded array write under refinement: `result = key with [index := value]`.
#[derive(Debug, Clone)]
pub struct StoreSite {
    pub result: String,
    pub base: String,
    pub index: Dynamic,
    pub value: Dynamic,
}

/// A recorded nonlinear multiplication under refinement.
#[derive(Debug, Clone)]
pub struct MulSite {
    pub lhs: BV,
    pub rhs: BV,
    pub result: BV,
}

/// Encoder state shared by the in-process back-ends.
pub struct Encoder {
    arrays_uf: ArraysUf,
    abstract_arrays: bool,
    abstract_arithmetic: bool,
    consts: ahash::AHashMap<String, Value>,
    object_ids: ahash::AHashMap<Ident, u64>,
    aliases: ahash::AHashMap<String, String>,
    fresh_counter: u64,
    pub select_sites: Vec<SelectSite>,
    pub store_sites: Vec<StoreSite>,
    pub mul_sites: Vec<MulSite>,
    /// Length proxies of string-typed values, for the string axioms.
    pub string_lengths: Vec<Int>,
}

impl Encoder {
    pub fn new(arrays_uf: ArraysUf, abstract_arrays: bool, abstract_arithmetic: bool) -> Self {
        Encoder {
            arrays_uf,
            abstract_arrays,
            abstract_arithmetic,
            consts: ahash::AHashMap::new(),
            object_ids: ahash::AHashMap::new(),
            aliases: ahash::AHashMap::new(),
            fresh_counter: 0,
            select_sites: Vec::new(),
            store_sites: Vec::new(),
            mul_sites: Vec::new(),
            string_lengths: Vec::new(),
        }
    }

    fn fresh_name(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}#{}", self.fresh_counter);
        self.fresh_counter += 1;
        name
    }

    /// The Z3 constant backing an SSA name, if it was ever encoded.
    pub fn lookup(&self, name: &SsaName) -> Option<&Value> {
        self.consts.get(&name.to_string())
    }

    /// Resolve abstract-array aliasing introduced by array-to-array copies.
    pub fn resolve_alias(&self, key: &str) -> String {
        let mut current = key.to_string();
        while let Some(next) = self.aliases.get(&current) {
            current = next.clone();
        }
        current
    }

    pub fn encode_bool(&mut self, expr: &Expr) -> SolverResult<Bool> {
        match self.encode(expr)? {
            Value::Scalar(d) => d
                .as_bool()
                .ok_or_else(|| SolverError::Encoding(format!("expected Bool, got: {expr}"))),
            _ => Err(SolverError::Encoding(format!(
                "expected scalar boolean, got an array: {expr}"
            ))),
        }
    }

    fn encode_scalar(&mut self, expr: &Expr) -> SolverResult<Dynamic> {
        match self.encode(expr)? {
            Value::Scalar(d) => Ok(d),
            _ => Err(SolverError::Encoding(format!(
                "expected scalar value: {expr}"
            ))),
        }
    }

    fn encode_bv(&mut self, expr: &Expr) -> SolverResult<BV> {
        let d = self.encode_scalar(expr)?;
        d.as_bv()
            .ok_or_else(|| SolverError::Encoding(format!("expected bit-vector: {expr}")))
    }

    /// Encode an expression as a Z3 value.
    pub fn encode(&mut self, expr: &Expr) -> SolverResult<Value> {
        match &expr.kind {
            ExprKind::Constant(c) => self.encode_constant(c, &expr.ty),
            ExprKind::Ssa(name) => self.const_for(&name.to_string(), &expr.ty),
            ExprKind::Symbol(id) => Err(SolverError::Encoding(format!(
                "program variable '{id}' reached the solver un-renamed"
            ))),
            ExprKind::Unary { op, operand } => self.encode_unary(*op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.encode_binary(*op, lhs, rhs),
            ExprKind::Ite {
                cond,
                then_value,
                else_value,
            } => {
                let c = self.encode_bool(cond)?;
                let t = self.encode_scalar(then_value)?;
                let e = self.encode_scalar(else_value)?;
                self.dynamic_ite(&c, &t, &e).map(Value::Scalar)
            }
            ExprKind::Index { array, index } => self.encode_index(array, index),
            ExprKind::With {
                base,
                designator,
                value,
            } => match designator {
                Designator::Index(index) => self.encode_array_update(base, index, value),
                Designator::Member(_) => Err(SolverError::Unsupported(
                    "struct update encoding".to_owned(),
                )),
            },
            ExprKind::Member { .. } => {
                Err(SolverError::Unsupported("struct member encoding".to_owned()))
            }
            ExprKind::Typecast(inner) => self.encode_typecast(inner, &expr.ty),
            ExprKind::ByteExtract { base, offset } => {
                self.encode_byte_extract(base, offset, &expr.ty)
            }
            ExprKind::ByteUpdate {
                base,
                offset,
                value,
            } => self.encode_byte_update(base, offset, value),
            ExprKind::AddressOf(object) => self.encode_address_of(object).map(Value::Scalar),
            ExprKind::Dereference(_) => Err(SolverError::Encoding(
                "dereference reached the solver; the engine should have lowered it".to_owned(),
            )),
            ExprKind::FailedObject(_) => {
                let name = self.fresh_name("failed_object");
                self.const_for(&name, &expr.ty)
            }
            ExprKind::Quantifier { .. } => Err(SolverError::Unsupported(
                "quantified formula encoding".to_owned(),
            )),
            ExprKind::FunctionCall { .. } | ExprKind::SideEffect(_) => {
                Err(SolverError::Encoding(format!(
                    "impure expression reached the solver: {expr}"
                )))
            }
        }
    }

    fn encode_constant(&mut self, c: &Constant, ty: &Type) -> SolverResult<Value> {
        match c {
            Constant::Bool(b) => Ok(Value::Scalar(Dynamic::from_ast(&Bool::from_bool(*b)))),
            Constant::Integer(n) => {
                let width = ty.width().ok_or_else(|| {
                    SolverError::Encoding(format!("integer constant of type {ty}"))
                })?;
                Ok(Value::Scalar(Dynamic::from_ast(&BV::from_i64(
                    *n as i64, width,
                ))))
            }
            Constant::Null => Ok(Value::Scalar(Dynamic::from_ast(&BV::from_u64(0, 64)))),
            Constant::StringLit(s) => {
                // strings are abstracted to their lengths
                Ok(Value::Scalar(Dynamic::from_ast(&Int::from_i64(
                    s.len() as i64
                ))))
            }
        }
    }

    /// Look up or mint the constant(s) backing a named value.
    fn const_for(&mut self, name: &str, ty: &Type) -> SolverResult<Value> {
        if let Some(v) = self.consts.get(name) {
            return Ok(v.clone());
        }
        let value = self.new_const(name, ty)?;
        self.consts.insert(name.to_owned(), value.clone());
        Ok(value)
    }

    fn new_const(&mut self, name: &str, ty: &Type) -> SolverResult<Value> {
        match ty {
            Type::Bool => Ok(Value::Scalar(Dynamic::from_ast(&Bool::new_const(name)))),
            Type::Unsigned(w) | Type::Signed(w) => {
                Ok(Value::Scalar(Dynamic::from_ast(&BV::new_const(name, *w))))
            }
            Type::Pointer(_) => Ok(Value::Scalar(Dynamic::from_ast(&BV::new_const(name, 64)))),
            Type::String => {
                let len = Int::new_const(format!("{name}:len"));
                self.string_lengths.push(len.clone());
                Ok(Value::Scalar(Dynamic::from_ast(&len)))
            }
            Type::Array { elem, size } => self.new_array_const(name, elem, *size),
            _ => Err(SolverError::Unsupported(format!(
                "cannot encode a value of type {ty}"
            ))),
        }
    }

    fn new_array_const(
        &mut self,
        name: &str,
        elem: &Type,
        size: Option<u64>,
    ) -> SolverResult<Value> {
        if self.abstract_arrays {
            return Ok(Value::Abstract(name.to_owned()));
        }
        let explode = match (self.arrays_uf, size) {
            (ArraysUf::Always, _) => false,
            (_, Some(n)) if n <= EXPLODE_LIMIT => true,
            (ArraysUf::Never, _) => {
                return Err(SolverError::Unsupported(format!(
                    "unbounded array '{name}' with arrays-uf=never"
                )))
            }
            _ => false,
        };
        if explode {
            let n = size.expect("exploded arrays have a size");
            let mut elems = Vec::with_capacity(n as usize);
            for k in 0..n {
                match self.new_const(&format!("{name}[{k}]"), elem)? {
                    Value::Scalar(d) => elems.push(d),
                    _ => {
                        return Err(SolverError::Unsupported(
                            "nested array encoding".to_owned(),
                        ))
                    }
                }
            }
            Ok(Value::Elems(elems))
        } else {
            let domain = Sort::bitvector(64);
            let range = scalar_sort(elem)?;
            Ok(Value::Arr(Array::new_const(name, &domain, &range)))
        }
    }

    fn encode_unary(&mut self, op: UnaryOp, operand: &Expr) -> SolverResult<Value> {
        match op {
            UnaryOp::Not => {
                let b = self.encode_bool(operand)?;
                Ok(Value::Scalar(Dynamic::from_ast(&b.not())))
            }
            UnaryOp::Neg => {
                let bv = self.encode_bv(operand)?;
                Ok(Value::Scalar(Dynamic::from_ast(&bv.bvneg())))
            }
            UnaryOp::BitNot => {
                let bv = self.encode_bv(operand)?;
                Ok(Value::Scalar(Dynamic::from_ast(&bv.bvnot())))
            }
            UnaryOp::StrLen => {
                // string values already are their length proxies
                self.encode(operand)
            }
        }
    }

    fn encode_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> SolverResult<Value> {
        match op {
            BinOp::And => {
                let l = self.encode_bool(lhs)?;
                let r = self.encode_bool(rhs)?;
                Ok(Value::Scalar(Dynamic::from_ast(&Bool::and(&[l, r]))))
            }
            BinOp::Or => {
                let l = self.encode_bool(lhs)?;
                let r = self.encode_bool(rhs)?;
                Ok(Value::Scalar(Dynamic::from_ast(&Bool::or(&[l, r]))))
            }
            BinOp::Implies => {
                let l = self.encode_bool(lhs)?;
                let r = self.encode_bool(rhs)?;
                Ok(Value::Scalar(Dynamic::from_ast(&l.implies(&r))))
            }
            BinOp::Eq | BinOp::Ne => {
                let l = self.encode(lhs)?;
                let r = self.encode(rhs)?;
                let eq = self.value_eq(&l, &r)?;
                let result = if op == BinOp::Ne { eq.not() } else { eq };
                Ok(Value::Scalar(Dynamic::from_ast(&result)))
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                self.encode_comparison(op, lhs, rhs)
            }
            BinOp::Add | BinOp::Sub | BinOp::Div | BinOp::Mod | BinOp::Mul => {
                self.encode_arithmetic(op, lhs, rhs)
            }
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
                let l = self.encode_bv(lhs)?;
                let r = self.encode_bv(rhs)?;
                let signed = matches!(lhs.ty, Type::Signed(_));
                let result = match op {
                    BinOp::BitAnd => l.bvand(&r),
                    BinOp::BitOr => l.bvor(&r),
                    BinOp::BitXor => l.bvxor(&r),
                    BinOp::Shl => l.bvshl(&r),
                    _ if signed => l.bvashr(&r),
                    _ => l.bvlshr(&r),
                };
                Ok(Value::Scalar(Dynamic::from_ast(&result)))
            }
            BinOp::Concat => {
                // string concatenation under the length abstraction
                let l = self.encode_int(lhs)?;
                let r = self.encode_int(rhs)?;
                Ok(Value::Scalar(Dynamic::from_ast(&Int::add(&[l, r]))))
            }
        }
    }

    fn encode_int(&mut self, expr: &Expr) -> SolverResult<Int> {
        let d = self.encode_scalar(expr)?;
        d.as_int()
            .ok_or_else(|| SolverError::Encoding(format!("expected integer proxy: {expr}")))
    }

    fn encode_comparison(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> SolverResult<Value> {
        if matches!(lhs.ty, Type::String) {
            let l = self.encode_int(lhs)?;
            let r = self.encode_int(rhs)?;
            let result = match op {
                BinOp::Lt => l.lt(&r),
                BinOp::Le => l.le(&r),
                BinOp::Gt => l.gt(&r),
                _ => l.ge(&r),
            };
            return Ok(Value::Scalar(Dynamic::from_ast(&result)));
        }
        let l = self.encode_bv(lhs)?;
        let r = self.encode_bv(rhs)?;
        let signed = matches!(lhs.ty, Type::Signed(_));
        let result = match (op, signed) {
            (BinOp::Lt, true) => l.bvslt(&r),
            (BinOp::Lt, false) => l.bvult(&r),
            (BinOp::Le, true) => l.bvsle(&r),
            (BinOp::Le, false) => l.bvule(&r),
            (BinOp::Gt, true) => l.bvsgt(&r),
            (BinOp::Gt, false) => l.bvugt(&r),
            (_, true) => l.bvsge(&r),
            (_, false) => l.bvuge(&r),
        };
        Ok(Value::Scalar(Dynamic::from_ast(&result)))
    }

    fn encode_arithmetic(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> SolverResult<Value> {
        if matches!(lhs.ty, Type::String) {
            return Err(SolverError::Unsupported(
                "arithmetic on string values".to_owned(),
            ));
        }
        let l = self.encode_bv(lhs)?;
        let r = self.encode_bv(rhs)?;
        let signed = matches!(lhs.ty, Type::Signed(_));
        let result = match op {
            BinOp::Add => l.bvadd(&r),
            BinOp::Sub => l.bvsub(&r),
            BinOp::Mul => {
                let nonlinear = !lhs.is_constant() && !rhs.is_constant();
                if self.abstract_arithmetic && nonlinear {
                    let name = self.fresh_name("mul");
                    let fresh = BV::new_const(name, l.get_size());
                    self.mul_sites.push(MulSite {
                        lhs: l,
                        rhs: r,
                        result: fresh.clone(),
                    });
                    return Ok(Value::Scalar(Dynamic::from_ast(&fresh)));
                }
                l.bvmul(&r)
            }
            BinOp::Div if signed => l.bvsdiv(&r),
            BinOp::Div => l.bvudiv(&r),
            BinOp::Mod if signed => l.bvsrem(&r),
            _ => l.bvurem(&r),
        };
        Ok(Value::Scalar(Dynamic::from_ast(&result)))
    }

    fn encode_index(&mut self, array: &Expr, index: &Expr) -> SolverResult<Value> {
        let base = self.encode(array)?;
        match base {
            Value::Elems(elems) => {
                if elems.is_empty() {
                    return Err(SolverError::Encoding("read from empty array".to_owned()));
                }
                if let Some(k) = index.as_constant_int() {
                    let k = k as usize;
                    return elems.get(k).cloned().map(Value::Scalar).ok_or_else(|| {
                        SolverError::Encoding(format!("index {k} out of bounds"))
                    });
                }
                // symbolic index: fold an ite chain over the elements
                let idx = self.encode_bv(index)?;
                let mut result = elems[elems.len() - 1].clone();
                for (k, elem) in elems.iter().enumerate().rev().skip(1) {
                    let here = idx.eq(&BV::from_u64(k as u64, idx.get_size()));
                    result = self.dynamic_ite(&here, elem, &result)?;
                }
                Ok(Value::Scalar(result))
            }
            Value::Arr(arr) => {
                let idx = self.index_word(index)?;
                Ok(Value::Scalar(arr.select(&Dynamic::from_ast(&idx))))
            }
            Value::Abstract(key) => {
                let key = self.resolve_alias(&key);
                let idx = Dynamic::from_ast(&self.index_word(index)?);
                let elem_ty = array.ty.elem().cloned().unwrap_or(Type::Unsigned(8));
                let name = self.fresh_name("select");
                let value = match self.new_const(&name, &elem_ty)? {
                    Value::Scalar(d) => d,
                    _ => {
                        return Err(SolverError::Unsupported(
                            "nested array under refinement".to_owned(),
                        ))
                    }
                };
                self.select_sites.push(SelectSite {
                    array: key,
                    index: idx,
                    value: value.clone(),
                });
                Ok(Value::Scalar(value))
            }
            Value::Scalar(_) => Err(SolverError::Encoding(format!(
                "index into a scalar value: {array}"
            ))),
        }
    }

    fn encode_array_update(
        &mut self,
        base: &Expr,
        index: &Expr,
        value: &Expr,
    ) -> SolverResult<Value> {
        let base_value = self.encode(base)?;
        let new_value = self.encode_scalar(value)?;
        match base_value {
            Value::Elems(elems) => {
                if let Some(k) = index.as_constant_int() {
                    let k = k as usize;
                    if k >= elems.len() {
                        return Err(SolverError::Encoding(format!(
                            "update at index {k} out of bounds"
                        )));
                    }
                    let mut updated = elems;
                    updated[k] = new_value;
                    return Ok(Value::Elems(updated));
                }
                let idx = self.encode_bv(index)?;
                let mut updated = Vec::with_capacity(elems.len());
                for (k, elem) in elems.iter().enumerate() {
                    let here = idx.eq(&BV::from_u64(k as u64, idx.get_size()));
                    updated.push(self.dynamic_ite(&here, &new_value, elem)?);
                }
                Ok(Value::Elems(updated))
            }
            Value::Arr(arr) => {
                let idx = self.index_word(index)?;
                Ok(Value::Arr(
                    arr.store(&Dynamic::from_ast(&idx), &new_value),
                ))
            }
            Value::Abstract(key) => {
                let base_key = self.resolve_alias(&key);
                let idx = Dynamic::from_ast(&self.index_word(index)?);
                let result = self.fresh_name("store");
                self.store_sites.push(StoreSite {
                    result: result.clone(),
                    base: base_key,
                    index: idx,
                    value: new_value,
                });
                Ok(Value::Abstract(result))
            }
            Value::Scalar(_) => Err(SolverError::Encoding(format!(
                "array update on a scalar value: {base}"
            ))),
        }
    }

    /// Widen an index expression to the 64-bit array domain.
    fn index_word(&mut self, index: &Expr) -> SolverResult<BV> {
        let bv = self.encode_bv(index)?;
        let size = bv.get_size();
        Ok(match size.cmp(&64) {
            std::cmp::Ordering::Less => bv.zero_ext(64 - size),
            std::cmp::Ordering::Equal => bv,
            std::cmp::Ordering::Greater => bv.extract(63, 0),
        })
    }

    fn encode_typecast(&mut self, inner: &Expr, target: &Type) -> SolverResult<Value> {
        if inner.ty == *target {
            return self.encode(inner);
        }
        match (&inner.ty, target) {
            (Type::Bool, t) if t.width().is_some() => {
                let b = self.encode_bool(inner)?;
                let w = t.width().expect("checked");
                let one = BV::from_u64(1, w);
                let zero = BV::from_u64(0, w);
                Ok(Value::Scalar(Dynamic::from_ast(&b.ite(&one, &zero))))
            }
            (s, Type::Bool) if s.width().is_some() => {
                let bv = self.encode_bv(inner)?;
                let zero = BV::from_u64(0, bv.get_size());
                Ok(Value::Scalar(Dynamic::from_ast(&bv.eq(&zero).not())))
            }
            (from, to) => {
                let (Some(from_w), Some(to_w)) = (from.width(), to.width()) else {
                    return Err(SolverError::Unsupported(format!(
                        "typecast from {from} to {to}"
                    )));
                };
                let bv = self.encode_bv(inner)?;
                let result = match to_w.cmp(&from_w) {
                    std::cmp::Ordering::Equal => bv,
                    std::cmp::Ordering::Less => bv.extract(to_w - 1, 0),
                    std::cmp::Ordering::Greater => {
                        if matches!(from, Type::Signed(_)) {
                            bv.sign_ext(to_w - from_w)
                        } else {
                            bv.zero_ext(to_w - from_w)
                        }
                    }
                };
                Ok(Value::Scalar(Dynamic::from_ast(&result)))
            }
        }
    }

    fn encode_byte_extract(
        &mut self,
        base: &Expr,
        offset: &Expr,
        ty: &Type,
    ) -> SolverResult<Value> {
        let width = ty
            .width()
            .ok_or_else(|| SolverError::Unsupported(format!("byte-extract of type {ty}")))?;
        let k = offset.as_constant_int().ok_or_else(|| {
            SolverError::Unsupported("byte-extract at a symbolic offset".to_owned())
        })? as u32;
        let bv = self.encode_bv(base)?;
        let lo = k * 8;
        let hi = lo + width - 1;
        if hi >= bv.get_size() {
            return Err(SolverError::Encoding(format!(
                "byte-extract beyond object width ({hi} >= {})",
                bv.get_size()
            )));
        }
        Ok(Value::Scalar(Dynamic::from_ast(&bv.extract(hi, lo))))
    }

    fn encode_byte_update(
        &mut self,
        base: &Expr,
        offset: &Expr,
        value: &Expr,
    ) -> SolverResult<Value> {
        let k = offset.as_constant_int().ok_or_else(|| {
            SolverError::Unsupported("byte-update at a symbolic offset".to_owned())
        })? as u32;
        let base_bv = self.encode_bv(base)?;
        let value_bv = self.encode_bv(value)?;
        let total = base_bv.get_size();
        let lo = k * 8;
        let hi = lo + value_bv.get_size();
        if hi > total {
            return Err(SolverError::Encoding(
                "byte-update beyond object width".to_owned(),
            ));
        }
        // stitch high bits ++ value ++ low bits
        let mut result = value_bv;
        if lo > 0 {
            result = result.concat(&base_bv.extract(lo - 1, 0));
        }
        if hi < total {
            result = base_bv.extract(total - 1, hi).concat(&result);
        }
        Ok(Value::Scalar(Dynamic::from_ast(&result)))
    }

    fn encode_address_of(&mut self, object: &Expr) -> SolverResult<BV> {
        match &object.kind {
            ExprKind::Ssa(name) => {
                let id = self.object_id(name.ident);
                Ok(BV::from_u64(id << POINTER_OBJECT_SHIFT, 64))
            }
            ExprKind::Index { array, index } => {
                let base = self.encode_address_of(array)?;
                let offset = self.index_word(index)?;
                Ok(base.bvadd(&offset))
            }
            _ => Err(SolverError::Unsupported(format!(
                "address of '{object}'"
            ))),
        }
    }

    fn object_id(&mut self, ident: Ident) -> u64 {
        let next = self.object_ids.len() as u64 + 1;
        *self.object_ids.entry(ident).or_insert(next)
    }

    fn value_eq(&mut self, l: &Value, r: &Value) -> SolverResult<Bool> {
        match (l, r) {
            (Value::Scalar(a), Value::Scalar(b)) => self.dynamic_eq(a, b),
            (Value::Elems(a), Value::Elems(b)) if a.len() == b.len() => {
                let mut conjuncts = Vec::with_capacity(a.len());
                for (x, y) in a.iter().zip(b.iter()) {
                    conjuncts.push(self.dynamic_eq(x, y)?);
                }
                Ok(Bool::and(&conjuncts))
            }
            (Value::Arr(a), Value::Arr(b)) => {
                Ok(Dynamic::from_ast(a).eq(&Dynamic::from_ast(b)))
            }
            _ => Err(SolverError::Encoding(
                "equality between incompatible array encodings".to_owned(),
            )),
        }
    }

    fn dynamic_eq(&self, a: &Dynamic, b: &Dynamic) -> SolverResult<Bool> {
        if let (Some(x), Some(y)) = (a.as_bool(), b.as_bool()) {
            return Ok(x.eq(&y));
        }
        if let (Some(x), Some(y)) = (a.as_bv(), b.as_bv()) {
            return Ok(x.eq(&y));
        }
        if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
            return Ok(x.eq(&y));
        }
        Err(SolverError::Encoding(
            "equality between values of different sorts".to_owned(),
        ))
    }

    fn dynamic_ite(&self, c: &Bool, t: &Dynamic, e: &Dynamic) -> SolverResult<Dynamic> {
        if let (Some(x), Some(y)) = (t.as_bool(), e.as_bool()) {
            return Ok(Dynamic::from_ast(&c.ite(&x, &y)));
        }
        if let (Some(x), Some(y)) = (t.as_bv(), e.as_bv()) {
            return Ok(Dynamic::from_ast(&c.ite(&x, &y)));
        }
        if let (Some(x), Some(y)) = (t.as_int(), e.as_int()) {
            return Ok(Dynamic::from_ast(&c.ite(&x, &y)));
        }
        Err(SolverError::Encoding(
            "if-then-else branches of different sorts".to_owned(),
        ))
    }

    /// Assert an assignment `lhs := rhs`, componentwise for arrays. Abstract
    /// array copies only record an alias.
    pub fn assert_assignment(
        &mut self,
        solver: &z3::Solver,
        lhs_name: &str,
        lhs_ty: &Type,
        rhs: &Expr,
    ) -> SolverResult<()> {
        let rhs_value = self.encode(rhs)?;
        if let Value::Abstract(key) = &rhs_value {
            let resolved = self.resolve_alias(key);
            self.aliases.insert(lhs_name.to_owned(), resolved);
            self.consts
                .insert(lhs_name.to_owned(), Value::Abstract(lhs_name.to_owned()));
            return Ok(());
        }
        let lhs_value = self.const_for(lhs_name, lhs_ty)?;
        let eq = self.value_eq(&lhs_value, &rhs_value)?;
        solver.assert(&eq);
        Ok(())
    }
}

fn scalar_sort(ty: &Type) -> SolverResult<Sort> {
    match ty {
        Type::Bool => Ok(Sort::bool()),
        Type::Unsigned(w) | Type::Signed(w) => Ok(Sort::bitvector(*w)),
        Type::Pointer(_) => Ok(Sort::bitvector(64)),
        _ => Err(SolverError::Unsupported(format!(
            "array element type {ty}"
        ))),
    }
}
