//! SMT-LIB 2 rendering of formulas.

use std::collections::{HashMap, HashSet};

use num_bigint::BigUint;

use crate::smt::{Expr, Node, Smt, Sort};

fn is_simple_symbol(name: &str) -> bool {
    const EXTRA: &str = "~!@$%^&*_-+=<>.?/";
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || EXTRA.contains(c))
}

/// Quotes `name` with `|...|` unless it is a simple SMT-LIB symbol.
pub fn symbol(name: &str) -> String {
    if is_simple_symbol(name) {
        name.to_string()
    } else {
        format!("|{}|", name)
    }
}

/// Bit-vector literal: hexadecimal when the width allows it, binary otherwise.
pub fn bv_literal(value: &BigUint, width: u32) -> String {
    if width % 4 == 0 {
        format!("#x{:0>1$}", value.to_str_radix(16), (width / 4) as usize)
    } else {
        format!("#b{:0>1$}", value.to_str_radix(2), width as usize)
    }
}

impl Smt {
    /// Renders `e` as an SMT-LIB 2 term.
    pub fn to_smtlib(&self, e: Expr) -> String {
        let mut cache = HashMap::new();
        self._to_smtlib(e, &mut cache)
    }

    fn _to_smtlib(&self, e: Expr, cache: &mut HashMap<Expr, String>) -> String {
        if let Some(s) = cache.get(&e) {
            return s.clone();
        }

        let mut go = |x: Expr| self._to_smtlib(x, cache);
        let s = match self.node(e) {
            Node::Bool(b) => b.to_string(),
            Node::Bv { value, width } => bv_literal(&value, width),
            Node::Var { name, .. } => symbol(&name),
            Node::Not(a) => format!("(not {})", go(a)),
            Node::And(a, b) => format!("(and {} {})", go(a), go(b)),
            Node::Or(a, b) => format!("(or {} {})", go(a), go(b)),
            Node::Eq(a, b) => format!("(= {} {})", go(a), go(b)),
            Node::Ite(c, t, f) => format!("(ite {} {} {})", go(c), go(t), go(f)),
            Node::Extract { high, low, arg } => {
                format!("((_ extract {} {}) {})", high, low, go(arg))
            }
            Node::Concat(a, b) => format!("(concat {} {})", go(a), go(b)),
            Node::BvSub(a, b) => format!("(bvsub {} {})", go(a), go(b)),
            Node::BvUle(a, b) => format!("(bvule {} {})", go(a), go(b)),
        };

        cache.insert(e, s.clone());
        s
    }

    /// Free variables of `e` with their sorts, in order of first occurrence.
    pub fn declarations(&self, e: Expr) -> Vec<(String, Sort)> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![e];
        while let Some(e) = stack.pop() {
            if !visited.insert(e) {
                continue;
            }
            match self.node(e) {
                Node::Bool(_) | Node::Bv { .. } => {}
                Node::Var { name, sort, .. } => result.push((name, sort)),
                Node::Not(a) | Node::Extract { arg: a, .. } => stack.push(a),
                Node::And(a, b)
                | Node::Or(a, b)
                | Node::Eq(a, b)
                | Node::Concat(a, b)
                | Node::BvSub(a, b)
                | Node::BvUle(a, b) => {
                    stack.push(b);
                    stack.push(a);
                }
                Node::Ite(c, t, f) => {
                    stack.push(f);
                    stack.push(t);
                    stack.push(c);
                }
            }
        }
        result
    }

    /// Renders a complete SMT-LIB 2 script asserting every formula in `assertions`.
    pub fn to_smtlib_script(&self, assertions: &[Expr]) -> String {
        let all = self.mk_and_many(assertions.iter().copied());
        let mut out = String::new();
        for (name, sort) in self.declarations(all) {
            out.push_str(&format!("(declare-fun {} () {})\n", symbol(&name), sort));
        }
        for &a in assertions {
            out.push_str(&format!("(assert {})\n", self.to_smtlib(a)));
        }
        out.push_str("(check-sat)\n");
        out
    }
}
