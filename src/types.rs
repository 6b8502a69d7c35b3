//! Types of IR values.
//!
//! Types live in a [`TypeTable`] and are referred to by [`TypeId`]. Many values share one
//! type, so narrowing a type after type inference ([`TypeTable::fixup`]) is seen by all of them.
//!
//! An integer type may be left symbolic: its width is then a variable constrained to one of
//! [`INT_WIDTHS`], picked by a model of the collected type constraints. Encoding operations
//! require every type they touch to have a concrete layout.

use std::fmt::Write;

use log::debug;
use num_traits::ToPrimitive;

use crate::attrs::{Attribute, ParamAttrs};
use crate::config::Config;
use crate::memory::Pointer;
use crate::smt::{Expr, Model, Smt, Sort};
use crate::state::{State, StateValue};

/// Widths a symbolic integer type may take.
pub const INT_WIDTHS: [u32; 5] = [1, 8, 16, 32, 64];

/// Width of the variables encoding symbolic integer widths.
const WIDTH_VAR_BITS: u32 = 8;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Type {
    Void,
    /// Integer; `bits` is `None` until type inference fixes the width.
    Int { name: String, bits: Option<u32> },
    Ptr,
    /// Struct or array: an ordered list of element types.
    Aggregate { elems: Vec<TypeId> },
}

#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Vec<Type>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self {
            types: vec![Type::Void],
        }
    }
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn void(&self) -> TypeId {
        TypeId(0)
    }

    pub fn add(&mut self, ty: Type) -> TypeId {
        if let Type::Aggregate { elems } = &ty {
            for e in elems {
                assert!(e.index() < self.types.len(), "Unknown element type {:?}", e);
            }
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn mk_int(&mut self, bits: u32) -> TypeId {
        assert_ne!(bits, 0, "Integer width should not be zero");
        self.add(Type::Int {
            name: format!("i{}", bits),
            bits: Some(bits),
        })
    }

    /// Integer type whose width is left to type inference.
    pub fn mk_symbolic_int(&mut self, name: impl Into<String>) -> TypeId {
        self.add(Type::Int {
            name: name.into(),
            bits: None,
        })
    }

    pub fn mk_ptr(&mut self) -> TypeId {
        self.add(Type::Ptr)
    }

    pub fn mk_aggregate(&mut self, elems: Vec<TypeId>) -> TypeId {
        self.add(Type::Aggregate { elems })
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len() as u32).map(TypeId)
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Void)
    }

    /// Element types of an aggregate.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not an aggregate type.
    pub fn elems(&self, id: TypeId) -> &[TypeId] {
        match self.get(id) {
            Type::Aggregate { elems } => elems,
            other => panic!("Expected an aggregate type, got {:?}", other),
        }
    }

    /// Number of bits in the encoding of a value of this type.
    ///
    /// # Panics
    ///
    /// Panics on a symbolic integer that has not been fixed up.
    pub fn bits(&self, id: TypeId, config: &Config) -> u32 {
        match self.get(id) {
            Type::Void => 0,
            Type::Int { name, bits } => match bits {
                Some(b) => *b,
                None => panic!("Width of type '{}' is not fixed up", name),
            },
            Type::Ptr => config.bits_for_ptr(),
            Type::Aggregate { elems } => elems.iter().map(|&e| self.bits(e, config)).sum(),
        }
    }

    pub fn to_string(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Void => "void".to_string(),
            Type::Int { name, bits: None } => name.clone(),
            Type::Int { bits: Some(b), .. } => format!("i{}", b),
            Type::Ptr => "ptr".to_string(),
            Type::Aggregate { elems } => {
                let mut s = String::from("{");
                for (i, &e) in elems.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    let _ = write!(s, "{}", self.to_string(e));
                }
                s.push('}');
                s
            }
        }
    }
}

// Type constraints
impl TypeTable {
    fn width_var_name(name: &str) -> String {
        format!("bits_{}", name)
    }

    /// Width of an integer type as a formula.
    fn width_expr(&self, smt: &Smt, id: TypeId) -> Expr {
        match self.get(id) {
            Type::Int { bits: Some(b), .. } => smt.mk_uint(*b as u64, WIDTH_VAR_BITS),
            Type::Int { name, bits: None } => smt.mk_bv_var(Self::width_var_name(name), WIDTH_VAR_BITS),
            other => panic!("Expected an integer type, got {:?}", other),
        }
    }

    /// Constraints every valid instantiation of this type satisfies.
    pub fn type_constraints(&self, smt: &Smt, id: TypeId) -> Expr {
        match self.get(id) {
            Type::Void | Type::Ptr | Type::Int { bits: Some(_), .. } => smt.mk_true(),
            Type::Int { bits: None, .. } => {
                let w = self.width_expr(smt, id);
                smt.mk_or_many(
                    INT_WIDTHS
                        .iter()
                        .map(|&b| smt.mk_eq(w, smt.mk_uint(b as u64, WIDTH_VAR_BITS))),
                )
            }
            Type::Aggregate { elems } => {
                smt.mk_and_many(elems.iter().map(|&e| self.type_constraints(smt, e)))
            }
        }
    }

    /// `a` and `b` are instantiated to the same type.
    pub fn same_type(&self, smt: &Smt, a: TypeId, b: TypeId) -> Expr {
        if a == b {
            return smt.mk_true();
        }
        match (self.get(a), self.get(b)) {
            (Type::Void, Type::Void) | (Type::Ptr, Type::Ptr) => smt.mk_true(),
            (Type::Int { .. }, Type::Int { .. }) => {
                smt.mk_eq(self.width_expr(smt, a), self.width_expr(smt, b))
            }
            (Type::Aggregate { elems: xs }, Type::Aggregate { elems: ys }) => {
                if xs.len() != ys.len() {
                    return smt.mk_false();
                }
                smt.mk_and_many(xs.iter().zip(ys).map(|(&x, &y)| self.same_type(smt, x, y)))
            }
            _ => smt.mk_false(),
        }
    }

    /// The aggregate type `id` has exactly the element types `components`, in order.
    pub fn enforce_aggregate_type(&self, smt: &Smt, id: TypeId, components: &[TypeId]) -> Expr {
        let elems = self.elems(id);
        if elems.len() != components.len() {
            return smt.mk_false();
        }
        smt.mk_and_many(
            elems
                .iter()
                .zip(components)
                .map(|(&e, &c)| self.same_type(smt, e, c)),
        )
    }

    /// Narrows symbolic integer widths reachable from `id` to the ones chosen by `model`.
    pub fn fixup(&mut self, id: TypeId, model: &Model) {
        match self.get(id).clone() {
            Type::Int { name, bits: None } => {
                let chosen = model
                    .get(&Self::width_var_name(&name))
                    .and_then(|v| v.to_u32())
                    .filter(|b| INT_WIDTHS.contains(b));
                match chosen {
                    Some(b) => {
                        debug!("fixup: {} := i{}", name, b);
                        self.types[id.index()] = Type::Int { name, bits: Some(b) };
                    }
                    None => debug!("fixup: model does not fix {}", name),
                }
            }
            Type::Aggregate { elems } => {
                for e in elems {
                    self.fixup(e, model);
                }
            }
            _ => {}
        }
    }
}

// Encoding
impl TypeTable {
    /// The default encoding of this type, poisoned unless `non_poison`.
    pub fn dummy_value(&self, smt: &Smt, config: &Config, id: TypeId, non_poison: bool) -> StateValue {
        let np = smt.mk_bool(non_poison);
        match self.get(id) {
            Type::Void => StateValue::new(smt.mk_false(), smt.mk_false()),
            Type::Int { .. } | Type::Ptr => {
                StateValue::new(smt.mk_uint(0, self.bits(id, config)), np)
            }
            Type::Aggregate { elems } => {
                let vals: Vec<StateValue> = elems
                    .iter()
                    .map(|&e| self.dummy_value(smt, config, e, non_poison))
                    .collect();
                let mut sv = self.aggregate_vals(smt, id, &vals);
                sv.non_poison = np;
                sv
            }
        }
    }

    /// Combines the element encodings of an aggregate: the first element takes the most
    /// significant bits, and the aggregate is poison-free only if every element is.
    pub fn aggregate_vals(&self, smt: &Smt, id: TypeId, vals: &[StateValue]) -> StateValue {
        let elems = self.elems(id);
        assert_eq!(
            elems.len(),
            vals.len(),
            "Aggregate {} expects {} elements",
            self.to_string(id),
            elems.len()
        );

        let mut value: Option<Expr> = None;
        let mut non_poison = smt.mk_true();
        for (&e, sv) in elems.iter().zip(vals) {
            if self.is_void(e) {
                continue;
            }
            value = Some(match value {
                None => sv.value,
                Some(acc) => smt.mk_concat(acc, sv.value),
            });
            non_poison = smt.mk_and(non_poison, sv.non_poison);
        }
        StateValue::new(value.unwrap_or_else(|| smt.mk_false()), non_poison)
    }

    /// Encoding of a function input named `name`.
    pub fn mk_input(&self, s: &mut State, id: TypeId, name: &str, attrs: &ParamAttrs) -> Expr {
        let smt = s.smt();
        match self.get(id) {
            Type::Void => panic!("Input '{}' cannot have type void", name),
            Type::Int { .. } => smt.mk_bv_var(name, self.bits(id, s.config())),
            Type::Ptr => {
                let var = smt.mk_bv_var(name, s.config().bits_for_ptr());
                let p = Pointer::new(smt, s.memory(), var);
                if attrs.has(Attribute::NonNull) {
                    let non_null = smt.mk_not(p.is_null(smt));
                    s.add_axiom(non_null);
                }
                s.add_axiom(p.is_aligned(smt, attrs.align));
                var
            }
            Type::Aggregate { elems } => {
                let mut value: Option<Expr> = None;
                for (i, &e) in elems.iter().enumerate() {
                    if self.is_void(e) {
                        continue;
                    }
                    let elem = self.mk_input(s, e, &format!("{}#{}", name, i), attrs);
                    value = Some(match value {
                        None => elem,
                        Some(acc) => smt.mk_concat(acc, elem),
                    });
                }
                value.unwrap_or_else(|| smt.mk_false())
            }
        }
    }

    /// Encoding of an `undef` function input, along with the fresh variables it introduces.
    pub fn mk_undef_input(&self, s: &mut State, id: TypeId, attrs: &ParamAttrs) -> (Expr, Vec<Expr>) {
        let smt = s.smt();
        match self.get(id) {
            Type::Void => panic!("Input cannot have type void"),
            Type::Int { .. } | Type::Ptr => {
                let var = smt.mk_fresh_var("undef", Sort::BitVec(self.bits(id, s.config())));
                (var, vec![var])
            }
            Type::Aggregate { elems } => {
                let mut value: Option<Expr> = None;
                let mut vars = Vec::new();
                for &e in elems.iter() {
                    if self.is_void(e) {
                        continue;
                    }
                    let (elem, elem_vars) = self.mk_undef_input(s, e, attrs);
                    vars.extend(elem_vars);
                    value = Some(match value {
                        None => elem,
                        Some(acc) => smt.mk_concat(acc, elem),
                    });
                }
                (value.unwrap_or_else(|| smt.mk_false()), vars)
            }
        }
    }
}
