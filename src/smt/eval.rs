use std::collections::{BTreeMap, HashMap};
use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::smt::{mask, Expr, Node, Smt};

/// Assignment of values to variable names.
///
/// Booleans are stored as `0` / `1`.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Model {
    values: BTreeMap<String, BigUint>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<BigUint>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn set_bool(&mut self, name: impl Into<String>, value: bool) {
        self.set(name, value as u32);
    }

    pub fn get(&self, name: &str) -> Option<&BigUint> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BigUint)> {
        self.values.iter()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", name, value)?;
        }
        write!(f, "}}")
    }
}

fn from_bool(b: bool) -> BigUint {
    if b {
        BigUint::one()
    } else {
        BigUint::zero()
    }
}

impl Smt {
    /// Evaluates `e` under `model`.
    ///
    /// Returns `None` if `e` mentions a variable the model does not assign.
    pub fn eval(&self, e: Expr, model: &Model) -> Option<BigUint> {
        let mut cache = HashMap::new();
        self._eval(e, model, &mut cache)
    }

    pub fn eval_bool(&self, e: Expr, model: &Model) -> Option<bool> {
        self.eval(e, model).map(|v| !v.is_zero())
    }

    fn _eval(&self, e: Expr, model: &Model, cache: &mut HashMap<Expr, BigUint>) -> Option<BigUint> {
        if let Some(v) = cache.get(&e) {
            return Some(v.clone());
        }

        let value = match self.node(e) {
            Node::Bool(b) => from_bool(b),
            Node::Bv { value, .. } => value,
            Node::Var { name, sort, .. } => model.get(&name)?.clone() & mask(sort.width()),
            Node::Not(a) => from_bool(self._eval(a, model, cache)?.is_zero()),
            Node::And(a, b) => {
                let a = self._eval(a, model, cache)?;
                let b = self._eval(b, model, cache)?;
                from_bool(!a.is_zero() && !b.is_zero())
            }
            Node::Or(a, b) => {
                let a = self._eval(a, model, cache)?;
                let b = self._eval(b, model, cache)?;
                from_bool(!a.is_zero() || !b.is_zero())
            }
            Node::Eq(a, b) => {
                let a = self._eval(a, model, cache)?;
                let b = self._eval(b, model, cache)?;
                from_bool(a == b)
            }
            Node::Ite(c, t, f) => {
                if self._eval(c, model, cache)?.is_zero() {
                    self._eval(f, model, cache)?
                } else {
                    self._eval(t, model, cache)?
                }
            }
            Node::Extract { high, low, arg } => {
                (self._eval(arg, model, cache)? >> low) & mask(high - low + 1)
            }
            Node::Concat(hi, lo) => {
                let shift = self.width(lo);
                let hi = self._eval(hi, model, cache)?;
                let lo = self._eval(lo, model, cache)?;
                (hi << shift) | lo
            }
            Node::BvSub(a, b) => {
                let modulus = BigUint::one() << self.width(a);
                let a = self._eval(a, model, cache)?;
                let b = self._eval(b, model, cache)?;
                (a + &modulus - b) % modulus
            }
            Node::BvUle(a, b) => {
                let a = self._eval(a, model, cache)?;
                let b = self._eval(b, model, cache)?;
                from_bool(a <= b)
            }
        };

        cache.insert(e, value.clone());
        Some(value)
    }
}
