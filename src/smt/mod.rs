//! Formula construction.
//!
//! All formulas are built through the [`Smt`] manager and referred to by the lightweight
//! [`Expr`] handle. The manager hash-conses its nodes: two structurally equal terms always
//! share one handle, so comparing handles compares formulas, and two fresh variables are
//! told apart simply by their handles.
//!
//! Constructors fold constants and apply the cheap ITE/AND identities on the fly, so the
//! formulas produced by the value layer stay small and readable when printed.
//!
//! ```rust
//! use tv_ir::smt::Smt;
//!
//! let smt = Smt::new();
//! let x = smt.mk_bv_var("x", 8);
//! let zero = smt.mk_uint(0, 8);
//! let f = smt.mk_eq(x, zero);
//! assert_eq!(smt.to_smtlib(f), "(= x #x00)");
//! assert_eq!(smt.mk_eq(x, x), smt.mk_true());
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;
use num_bigint::BigUint;
use num_traits::{One, Zero};

pub mod check;
pub mod eval;
pub mod printer;

pub use eval::Model;

/// Handle to a node owned by an [`Smt`] manager.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Expr(u32);

impl Expr {
    /// Index of the node inside its manager.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Sort of a formula.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Sort {
    Bool,
    BitVec(u32),
}

impl Sort {
    /// Number of bits needed to represent a value of this sort.
    pub fn width(self) -> u32 {
        match self {
            Sort::Bool => 1,
            Sort::BitVec(w) => w,
        }
    }

    pub fn is_bool(self) -> bool {
        matches!(self, Sort::Bool)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::BitVec(w) => write!(f, "(_ BitVec {})", w),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Node {
    Bool(bool),
    Bv { value: BigUint, width: u32 },
    /// Free variable. Fresh variables carry their own id, so they never merge with a named one.
    Var {
        name: String,
        sort: Sort,
        fresh: Option<u32>,
    },
    Not(Expr),
    And(Expr, Expr),
    Or(Expr, Expr),
    Eq(Expr, Expr),
    Ite(Expr, Expr, Expr),
    Extract { high: u32, low: u32, arg: Expr },
    Concat(Expr, Expr),
    BvSub(Expr, Expr),
    BvUle(Expr, Expr),
}

#[derive(Default)]
struct Storage {
    nodes: Vec<(Node, Sort)>,
    unique: HashMap<Node, Expr>,
    /// Names taken by named variables.
    named: HashSet<String>,
    /// Current name of every fresh variable.
    fresh_names: HashMap<String, Expr>,
}

pub struct Smt {
    storage: RefCell<Storage>,
    fresh: RefCell<HashMap<String, u32>>,
    true_: Expr,
    false_: Expr,
}

impl Smt {
    pub fn new() -> Self {
        let storage = RefCell::new(Storage::default());
        let mut smt = Self {
            storage,
            fresh: RefCell::new(HashMap::new()),
            true_: Expr(0),
            false_: Expr(0),
        };
        smt.true_ = smt.put(Node::Bool(true), Sort::Bool);
        smt.false_ = smt.put(Node::Bool(false), Sort::Bool);
        smt
    }
}

impl Default for Smt {
    fn default() -> Self {
        Smt::new()
    }
}

impl fmt::Debug for Smt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Smt")
            .field("size", &self.size())
            .field("fresh_prefixes", &self.fresh.borrow().len())
            .finish()
    }
}

/// Bit mask with the `width` lowest bits set.
pub(crate) fn mask(width: u32) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

impl Smt {
    fn put(&self, node: Node, sort: Sort) -> Expr {
        let mut storage = self.storage.borrow_mut();
        if let Some(&e) = storage.unique.get(&node) {
            return e;
        }
        let e = Expr(storage.nodes.len() as u32);
        storage.nodes.push((node.clone(), sort));
        storage.unique.insert(node, e);
        e
    }

    /// Number of distinct nodes created so far.
    pub fn size(&self) -> usize {
        self.storage.borrow().nodes.len()
    }

    pub fn node(&self, e: Expr) -> Node {
        self.storage.borrow().nodes[e.index()].0.clone()
    }

    pub fn sort(&self, e: Expr) -> Sort {
        self.storage.borrow().nodes[e.index()].1
    }

    pub fn width(&self, e: Expr) -> u32 {
        self.sort(e).width()
    }

    pub fn is_true(&self, e: Expr) -> bool {
        e == self.true_
    }
    pub fn is_false(&self, e: Expr) -> bool {
        e == self.false_
    }

    /// Returns the value of a boolean constant, or `None` for anything else.
    pub fn as_bool(&self, e: Expr) -> Option<bool> {
        match self.node(e) {
            Node::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value of a bit-vector constant, or `None` for anything else.
    pub fn as_bv(&self, e: Expr) -> Option<BigUint> {
        match self.node(e) {
            Node::Bv { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns the variable name, if `e` is a variable.
    pub fn var_name(&self, e: Expr) -> Option<String> {
        match self.node(e) {
            Node::Var { name, .. } => Some(name),
            _ => None,
        }
    }

    fn expect_bv(&self, e: Expr, op: &str) -> u32 {
        match self.sort(e) {
            Sort::BitVec(w) => w,
            Sort::Bool => panic!("{}: expected a bit-vector operand, got {}", op, e),
        }
    }

    fn expect_bool(&self, e: Expr, op: &str) {
        assert!(
            self.sort(e).is_bool(),
            "{}: expected a boolean operand, got {}",
            op,
            e
        );
    }
}

// Leaves
impl Smt {
    pub fn mk_true(&self) -> Expr {
        self.true_
    }
    pub fn mk_false(&self) -> Expr {
        self.false_
    }
    pub fn mk_bool(&self, value: bool) -> Expr {
        if value {
            self.true_
        } else {
            self.false_
        }
    }

    /// Bit-vector constant; `value` is truncated to `width` bits.
    pub fn mk_bv(&self, value: impl Into<BigUint>, width: u32) -> Expr {
        assert_ne!(width, 0, "Bit-vector width should not be zero");
        let value = value.into() & mask(width);
        self.put(Node::Bv { value, width }, Sort::BitVec(width))
    }

    pub fn mk_uint(&self, value: u64, width: u32) -> Expr {
        self.mk_bv(value, width)
    }

    /// Named variable. The same name and sort always give the same handle.
    ///
    /// A fresh variable already holding `name` is renamed out of the way.
    pub fn mk_var(&self, name: impl Into<String>, sort: Sort) -> Expr {
        Self::check_var_sort(sort);
        let name = name.into();
        let clash = self.storage.borrow_mut().fresh_names.remove(&name);
        if let Some(e) = clash {
            self.rename_fresh(e);
        }
        self.storage.borrow_mut().named.insert(name.clone());
        self.put(Node::Var { name, sort, fresh: None }, sort)
    }

    pub fn mk_bv_var(&self, name: impl Into<String>, width: u32) -> Expr {
        self.mk_var(name, Sort::BitVec(width))
    }

    pub fn mk_bool_var(&self, name: impl Into<String>) -> Expr {
        self.mk_var(name, Sort::Bool)
    }

    /// Variable named `prefix!N`, distinct from every other variable made by this manager.
    pub fn mk_fresh_var(&self, prefix: &str, sort: Sort) -> Expr {
        Self::check_var_sort(sort);
        let name = self.next_fresh_name(prefix);
        debug!("fresh variable {} : {}", name, sort);
        let id = self.size() as u32;
        let node = Node::Var {
            name: name.clone(),
            sort,
            fresh: Some(id),
        };
        let e = self.put(node, sort);
        self.storage.borrow_mut().fresh_names.insert(name, e);
        e
    }

    fn check_var_sort(sort: Sort) {
        if let Sort::BitVec(w) = sort {
            assert_ne!(w, 0, "Bit-vector width should not be zero");
        }
    }

    /// First `prefix!N` not taken by any variable.
    fn next_fresh_name(&self, prefix: &str) -> String {
        let mut fresh = self.fresh.borrow_mut();
        let counter = fresh.entry(prefix.to_string()).or_insert(0);
        let storage = self.storage.borrow();
        loop {
            let name = format!("{}!{}", prefix, counter);
            *counter += 1;
            if !storage.named.contains(&name) && !storage.fresh_names.contains_key(&name) {
                return name;
            }
        }
    }

    /// Gives the fresh variable `e` a new unused name. Its handle, and so every formula
    /// using it, is unchanged.
    fn rename_fresh(&self, e: Expr) {
        let (old, sort, id) = match self.node(e) {
            Node::Var {
                name,
                sort,
                fresh: Some(id),
            } => (name, sort, id),
            other => panic!("Expected a fresh variable, got {:?}", other),
        };
        let prefix = old.rsplit_once('!').map_or(old.as_str(), |(p, _)| p);
        let name = self.next_fresh_name(prefix);
        debug!("fresh variable {} renamed to {}", old, name);

        let mut storage = self.storage.borrow_mut();
        storage.unique.remove(&Node::Var {
            name: old.clone(),
            sort,
            fresh: Some(id),
        });
        let node = Node::Var {
            name: name.clone(),
            sort,
            fresh: Some(id),
        };
        storage.nodes[e.index()].0 = node.clone();
        storage.unique.insert(node, e);
        storage.fresh_names.insert(name, e);
    }

    /// Fresh variable of the same sort as `like`.
    pub fn mk_fresh_like(&self, prefix: &str, like: Expr) -> Expr {
        self.mk_fresh_var(prefix, self.sort(like))
    }
}

// Boolean connectives
impl Smt {
    pub fn mk_not(&self, a: Expr) -> Expr {
        self.expect_bool(a, "not");
        match self.node(a) {
            Node::Bool(b) => self.mk_bool(!b),
            Node::Not(inner) => {
                debug!("not(not(F)) => F");
                inner
            }
            _ => self.put(Node::Not(a), Sort::Bool),
        }
    }

    fn is_negation_of(&self, a: Expr, b: Expr) -> bool {
        self.node(a) == Node::Not(b) || self.node(b) == Node::Not(a)
    }

    pub fn mk_and(&self, a: Expr, b: Expr) -> Expr {
        self.expect_bool(a, "and");
        self.expect_bool(b, "and");
        if self.is_false(a) || self.is_false(b) {
            return self.false_;
        }
        if self.is_true(a) {
            return b;
        }
        if self.is_true(b) || a == b {
            return a;
        }
        if self.is_negation_of(a, b) {
            debug!("and(F,~F) => 0");
            return self.false_;
        }
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        self.put(Node::And(a, b), Sort::Bool)
    }

    pub fn mk_or(&self, a: Expr, b: Expr) -> Expr {
        self.expect_bool(a, "or");
        self.expect_bool(b, "or");
        if self.is_true(a) || self.is_true(b) {
            return self.true_;
        }
        if self.is_false(a) {
            return b;
        }
        if self.is_false(b) || a == b {
            return a;
        }
        if self.is_negation_of(a, b) {
            debug!("or(F,~F) => 1");
            return self.true_;
        }
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        self.put(Node::Or(a, b), Sort::Bool)
    }

    pub fn mk_and_many(&self, args: impl IntoIterator<Item = Expr>) -> Expr {
        args.into_iter()
            .fold(self.true_, |acc, e| self.mk_and(acc, e))
    }

    pub fn mk_or_many(&self, args: impl IntoIterator<Item = Expr>) -> Expr {
        args.into_iter()
            .fold(self.false_, |acc, e| self.mk_or(acc, e))
    }

    pub fn mk_implies(&self, a: Expr, b: Expr) -> Expr {
        let not_a = self.mk_not(a);
        self.mk_or(not_a, b)
    }

    pub fn mk_eq(&self, a: Expr, b: Expr) -> Expr {
        assert_eq!(
            self.sort(a),
            self.sort(b),
            "eq: sort mismatch between {} and {}",
            a,
            b
        );
        if a == b {
            return self.true_;
        }
        match (self.node(a), self.node(b)) {
            (Node::Bool(x), Node::Bool(y)) => return self.mk_bool(x == y),
            (Node::Bv { value: x, .. }, Node::Bv { value: y, .. }) => return self.mk_bool(x == y),
            (Node::Bool(true), _) => return b,
            (_, Node::Bool(true)) => return a,
            (Node::Bool(false), _) => return self.mk_not(b),
            (_, Node::Bool(false)) => return self.mk_not(a),
            _ => {}
        }
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        self.put(Node::Eq(a, b), Sort::Bool)
    }

    pub fn mk_ne(&self, a: Expr, b: Expr) -> Expr {
        let eq = self.mk_eq(a, b);
        self.mk_not(eq)
    }

    pub fn mk_ite(&self, cond: Expr, then: Expr, else_: Expr) -> Expr {
        self.expect_bool(cond, "ite");
        let sort = self.sort(then);
        assert_eq!(
            sort,
            self.sort(else_),
            "ite: branch sort mismatch between {} and {}",
            then,
            else_
        );

        if self.is_true(cond) {
            debug!("ite(1,G,H) => G");
            return then;
        }
        if self.is_false(cond) {
            debug!("ite(0,G,H) => H");
            return else_;
        }
        if then == else_ {
            debug!("ite(F,G,G) => G");
            return then;
        }
        if sort.is_bool() {
            if self.is_true(then) && self.is_false(else_) {
                debug!("ite(F,1,0) => F");
                return cond;
            }
            if self.is_false(then) && self.is_true(else_) {
                debug!("ite(F,0,1) => ~F");
                return self.mk_not(cond);
            }
        }
        if let Node::Not(inner) = self.node(cond) {
            debug!("ite(~F,G,H) => ite(F,H,G)");
            return self.mk_ite(inner, else_, then);
        }
        self.put(Node::Ite(cond, then, else_), sort)
    }
}

// Bit-vector operations
impl Smt {
    /// Bits `high..=low` of `arg`.
    pub fn mk_extract(&self, arg: Expr, high: u32, low: u32) -> Expr {
        let width = self.expect_bv(arg, "extract");
        assert!(
            low <= high && high < width,
            "extract: invalid range [{}:{}] of a {}-bit operand",
            high,
            low,
            width
        );
        if low == 0 && high + 1 == width {
            return arg;
        }
        let result_width = high - low + 1;
        match self.node(arg) {
            Node::Bv { value, .. } => self.mk_bv(value >> low, result_width),
            Node::Extract {
                low: inner_low,
                arg: inner,
                ..
            } => self.mk_extract(inner, high + inner_low, low + inner_low),
            Node::Concat(hi_part, lo_part) => {
                let lo_width = self.width(lo_part);
                if high < lo_width {
                    self.mk_extract(lo_part, high, low)
                } else if low >= lo_width {
                    self.mk_extract(hi_part, high - lo_width, low - lo_width)
                } else {
                    self.put(
                        Node::Extract { high, low, arg },
                        Sort::BitVec(result_width),
                    )
                }
            }
            _ => self.put(
                Node::Extract { high, low, arg },
                Sort::BitVec(result_width),
            ),
        }
    }

    /// Concatenation; `high` ends up in the most significant bits.
    pub fn mk_concat(&self, high: Expr, low: Expr) -> Expr {
        let wh = self.expect_bv(high, "concat");
        let wl = self.expect_bv(low, "concat");
        if let (Some(h), Some(l)) = (self.as_bv(high), self.as_bv(low)) {
            return self.mk_bv((h << wl) | l, wh + wl);
        }
        self.put(Node::Concat(high, low), Sort::BitVec(wh + wl))
    }

    pub fn mk_bvsub(&self, a: Expr, b: Expr) -> Expr {
        let w = self.expect_bv(a, "bvsub");
        assert_eq!(w, self.expect_bv(b, "bvsub"), "bvsub: width mismatch");
        match (self.as_bv(a), self.as_bv(b)) {
            (Some(x), Some(y)) => {
                let modulus = BigUint::one() << w;
                self.mk_bv((x + &modulus - y) % modulus, w)
            }
            (_, Some(y)) if y.is_zero() => a,
            _ if a == b => self.mk_uint(0, w),
            _ => self.put(Node::BvSub(a, b), Sort::BitVec(w)),
        }
    }

    /// Unsigned `a <= b`.
    pub fn mk_bvule(&self, a: Expr, b: Expr) -> Expr {
        let w = self.expect_bv(a, "bvule");
        assert_eq!(w, self.expect_bv(b, "bvule"), "bvule: width mismatch");
        if a == b {
            return self.true_;
        }
        match (self.as_bv(a), self.as_bv(b)) {
            (Some(x), Some(y)) => self.mk_bool(x <= y),
            (Some(x), _) if x.is_zero() => self.true_,
            _ => self.put(Node::BvUle(a, b), Sort::Bool),
        }
    }
}
