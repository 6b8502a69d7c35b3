//! IR values and their translation into formulas.
//!
//! Every value translates to a [`StateValue`]: its bit-level encoding and a predicate that
//! holds iff the value is not poison. Translation reads and updates the [`State`] (allocating
//! globals, registering fresh `undef` variables, asserting axioms), so it is **not**
//! idempotent: it must run exactly once per occurrence of the value.
//!
//! The encoding of a function input uses a hidden 2-bit selector variable `ty_<name>`:
//!
//! | selector | meaning |
//! |---|---|
//! | `00` | a normal value |
//! | `01` | `undef` |
//! | `1x` | poison |
//!
//! Attributes that rule out `undef` or poison (`noundef`, `nonnull`, `dereferenceable`,
//! `byval`) do so by constraining the selector with axioms, so the encoding itself keeps the
//! same shape for every input.

use std::fmt;

use log::trace;

use crate::attrs::{Attribute, ParamAttrs};
use crate::error::ValueError;
use crate::memory::{BlockKind, Pointer};
use crate::smt::{Expr, Model, Smt};
use crate::state::{State, StateValue};
use crate::types::{TypeId, TypeTable};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValueId(u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ValueKind {
    /// Any value of the type, chosen anew on every translation; never poison.
    Undef,
    Poison,
    /// The result of an instruction that produces nothing.
    Void,
    NullPointer,
    /// A named memory object; translates to its address.
    GlobalVariable {
        alloc_size: u64,
        align: u64,
        is_const: bool,
    },
    /// Struct or array literal built from other values of the same program.
    Aggregate { vals: Vec<ValueId> },
    /// Function parameter.
    Input { smt_name: String, attrs: ParamAttrs },
    /// Result of an instruction, computed by the block evaluator and recorded in the state.
    Instruction,
}

impl ValueKind {
    fn kind_name(&self) -> &'static str {
        match self {
            ValueKind::Undef => "undef",
            ValueKind::Poison => "poison",
            ValueKind::Void => "void",
            ValueKind::NullPointer => "null",
            ValueKind::GlobalVariable { .. } => "global",
            ValueKind::Aggregate { .. } => "aggregate",
            ValueKind::Input { .. } => "input",
            ValueKind::Instruction => "instruction",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Value {
    id: ValueId,
    ty: TypeId,
    name: String,
    kind: ValueKind,
}

impl Value {
    pub fn id(&self) -> ValueId {
        self.id
    }
    pub fn ty(&self) -> TypeId {
        self.ty
    }
    /// Display name; only used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_void(&self, types: &TypeTable) -> bool {
        types.is_void(self.ty)
    }

    /// Writes the standalone textual form of the value.
    ///
    /// Only globals have one; every other kind is displayed by the instruction using it.
    pub fn print(&self, out: &mut dyn fmt::Write) -> Result<(), ValueError> {
        match &self.kind {
            ValueKind::GlobalVariable {
                alloc_size,
                align,
                is_const,
            } => {
                write!(
                    out,
                    "{} = {}{} bytes, align {}",
                    self.name,
                    if *is_const { "constant " } else { "global " },
                    alloc_size,
                    align
                )?;
                Ok(())
            }
            kind => Err(ValueError::NoTextualForm {
                kind: kind.kind_name(),
                name: self.name.clone(),
            }),
        }
    }

    /// Type constraints contributed by this value.
    ///
    /// Performs no state mutation: calling it twice gives the same formula.
    pub fn type_constraints(&self, program: &Program, smt: &Smt) -> Expr {
        let types = program.types();
        let mut r = types.type_constraints(smt, self.ty);
        if let ValueKind::Aggregate { vals } = &self.kind {
            let mut component_types = Vec::with_capacity(vals.len());
            for &v in vals {
                let val = program.value(v);
                component_types.push(val.ty);
                // Instructions contribute their constraints once, with their basic block.
                if matches!(val.kind, ValueKind::Instruction) {
                    continue;
                }
                r = smt.mk_and(r, val.type_constraints(program, smt));
            }
            let structural = types.enforce_aggregate_type(smt, self.ty, &component_types);
            r = smt.mk_and(r, structural);
        }
        r
    }

    /// Translates the value into its formula pair.
    pub fn to_smt(&self, s: &mut State) -> StateValue {
        trace!("to_smt({} {})", s.program().types().to_string(self.ty), self.name);
        let smt = s.smt();
        let types = s.program().types();
        match &self.kind {
            ValueKind::Undef => {
                let dummy = types.dummy_value(smt, s.config(), self.ty, true);
                let var = smt.mk_fresh_like("undef", dummy.value);
                s.add_undef_var(var);
                StateValue::new(var, dummy.non_poison)
            }
            ValueKind::Poison => types.dummy_value(smt, s.config(), self.ty, false),
            ValueKind::Void => StateValue::new(smt.mk_false(), smt.mk_false()),
            ValueKind::NullPointer => {
                let null = Pointer::mk_null(smt, s.memory());
                StateValue::new(null.into_expr(smt), smt.mk_true())
            }
            ValueKind::GlobalVariable {
                alloc_size,
                align,
                is_const,
            } => {
                let (ptr, _) = get_global(s, &self.name, *alloc_size, *align, *is_const);
                StateValue::new(ptr, smt.mk_true())
            }
            ValueKind::Aggregate { vals } => {
                let program = s.program();
                let state_vals: Vec<StateValue> =
                    vals.iter().map(|&v| program.value(v).to_smt(s)).collect();
                types.aggregate_vals(smt, self.ty, &state_vals)
            }
            ValueKind::Input { smt_name, attrs } => self.input_to_smt(s, smt_name, attrs),
            ValueKind::Instruction => match s.result(self.id) {
                Some(sv) => sv,
                None => panic!("Instruction '{}' is used before it is evaluated", self.name),
            },
        }
    }

    fn input_to_smt(&self, s: &mut State, smt_name: &str, attrs: &ParamAttrs) -> StateValue {
        let smt = s.smt();
        let types = s.program().types();
        let config = s.config();

        let ty_var = selector_var(smt, smt_name);
        let zero = smt.mk_uint(0, 1);
        let undef_bit_clear = smt.mk_eq(smt.mk_extract(ty_var, 0, 0), zero);
        let poison_bit_clear = smt.mk_eq(smt.mk_extract(ty_var, 1, 1), zero);

        let has_byval = attrs.has(Attribute::ByVal);
        let has_deref = attrs.has(Attribute::Dereferenceable);
        let has_nonnull = attrs.has(Attribute::NonNull);
        let has_noundef = attrs.has(Attribute::NoUndef);

        let mut val = if has_byval {
            let (ptr, bid) = get_global(s, &self.name, attrs.block_size, attrs.align, false);
            s.memory_mut().mark_by_val(bid);
            ptr
        } else {
            types.mk_input(s, self.ty, smt_name, attrs)
        };

        let never_undef = config.disable_undef_input || has_byval || has_deref || has_noundef;
        if !never_undef {
            let (undef, vars) = types.mk_undef_input(s, self.ty, attrs);
            for v in vars {
                s.add_undef_var(v);
            }
            val = smt.mk_ite(undef_bit_clear, val, undef);
        }

        if has_deref {
            let p = Pointer::new(smt, s.memory(), val);
            let byte_align = (config.bits_byte / 8) as u64;
            let deref = p.is_dereferenceable(smt, s.memory(), attrs.deref_bytes, byte_align, false);
            s.add_axiom(deref);
        }

        let poison = types.dummy_value(smt, config, self.ty, false).non_poison;
        let non_poison = types.dummy_value(smt, config, self.ty, true).non_poison;
        let never_poison = config.disable_poison_input
            || has_byval
            || has_deref
            || has_nonnull
            || has_noundef;

        if never_undef {
            let axiom = if never_poison {
                smt.mk_eq(ty_var, smt.mk_uint(0, 2))
            } else {
                undef_bit_clear
            };
            s.add_axiom(axiom);
        } else if never_poison {
            s.add_axiom(poison_bit_clear);
        }

        // Poison and undef cover the whole value, even for aggregates.
        let non_poison = if never_poison {
            non_poison
        } else {
            smt.mk_ite(poison_bit_clear, non_poison, poison)
        };
        StateValue::new(val, non_poison)
    }
}

/// The selector deciding whether the input named `smt_name` is normal, undef, or poison.
pub fn selector_var(smt: &Smt, smt_name: &str) -> Expr {
    smt.mk_bv_var(format!("ty_{}", smt_name), 2)
}

/// Resolves the global `name` to a pointer, allocating its block on first use.
///
/// The source program picks block ids; the target program allocates a global it shares with
/// the source at the id recorded by the source, so both programs agree on every global's
/// address.
fn get_global(s: &mut State, name: &str, size: u64, align: u64, is_const: bool) -> (Expr, u32) {
    let smt = s.smt();
    let kind = if is_const {
        BlockKind::ConstGlobal
    } else {
        BlockKind::Global
    };

    match s.global(name) {
        Some(entry) if !entry.allocated => {
            assert!(
                !s.is_source(),
                "Global '{}' is reserved but not allocated while translating the source program",
                name
            );
            let (ptr, bid) = s.memory_mut().alloc(smt, size, align, kind, Some(entry.bid));
            s.mark_global_allocated(name);
            (ptr, bid)
        }
        Some(entry) => {
            let ptr = Pointer::from_bid(smt, s.memory(), entry.bid);
            (ptr.into_expr(smt), entry.bid)
        }
        None => {
            let (ptr, bid) = s.memory_mut().alloc(smt, size, align, kind, None);
            s.add_global(name, bid);
            (ptr, bid)
        }
    }
}

/// The values of one program, together with the types they refer to.
#[derive(Debug, Clone)]
pub struct Program {
    types: TypeTable,
    values: Vec<Value>,
}

impl Default for Program {
    fn default() -> Self {
        let types = TypeTable::new();
        let void = Value {
            id: ValueId(0),
            ty: types.void(),
            name: "void".to_string(),
            kind: ValueKind::Void,
        };
        Self {
            types,
            values: vec![void],
        }
    }
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }
    pub fn types_mut(&mut self) -> &mut TypeTable {
        &mut self.types
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// The shared void value.
    pub fn void_value(&self) -> ValueId {
        ValueId(0)
    }

    fn add(&mut self, ty: TypeId, name: String, kind: ValueKind) -> ValueId {
        assert!(ty.index() < self.types.len(), "Unknown type {:?}", ty);
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value { id, ty, name, kind });
        id
    }

    pub fn add_undef(&mut self, ty: TypeId) -> ValueId {
        self.add(ty, "undef".to_string(), ValueKind::Undef)
    }

    pub fn add_poison(&mut self, ty: TypeId) -> ValueId {
        self.add(ty, "poison".to_string(), ValueKind::Poison)
    }

    pub fn add_null(&mut self, ty: TypeId) -> ValueId {
        self.add(ty, "null".to_string(), ValueKind::NullPointer)
    }

    pub fn add_global(
        &mut self,
        ty: TypeId,
        name: impl Into<String>,
        alloc_size: u64,
        align: u64,
        is_const: bool,
    ) -> ValueId {
        let kind = ValueKind::GlobalVariable {
            alloc_size,
            align,
            is_const,
        };
        self.add(ty, name.into(), kind)
    }

    /// Aggregate of `vals`; its display name is `{ a, b, ... }`.
    pub fn add_aggregate(&mut self, ty: TypeId, vals: Vec<ValueId>) -> ValueId {
        let names: Vec<&str> = vals.iter().map(|&v| self.value(v).name()).collect();
        let name = format!("{{ {} }}", names.join(", "));
        self.add(ty, name, ValueKind::Aggregate { vals })
    }

    /// Function input; its display name is the attributes followed by `name`.
    pub fn add_input(&mut self, ty: TypeId, name: impl Into<String>, attrs: ParamAttrs) -> ValueId {
        let smt_name = name.into();
        let display = format!("{}{}", attrs, smt_name);
        self.add(ty, display, ValueKind::Input { smt_name, attrs })
    }

    pub fn add_instruction(&mut self, ty: TypeId, name: impl Into<String>) -> ValueId {
        self.add(ty, name.into(), ValueKind::Instruction)
    }

    /// `<type> <name>`, or only the type for void values.
    pub fn display(&self, id: ValueId) -> String {
        let val = self.value(id);
        let t = self.types.to_string(val.ty);
        if val.is_void(&self.types) {
            return t;
        }
        if t.is_empty() {
            val.name.clone()
        } else {
            format!("{} {}", t, val.name)
        }
    }

    /// Makes input `id` read the same symbolic variables as `other`, typically the matching
    /// input of the other program.
    ///
    /// # Panics
    ///
    /// Panics if either value is not an input.
    pub fn copy_smt_name(&mut self, id: ValueId, other: &Value) {
        let other_name = match &other.kind {
            ValueKind::Input { smt_name, .. } => smt_name.clone(),
            _ => panic!("'{}' is not an input", other.name),
        };
        let val = &mut self.values[id.index()];
        match &mut val.kind {
            ValueKind::Input { smt_name, .. } => *smt_name = other_name,
            _ => panic!("'{}' is not an input", val.name),
        }
    }

    /// Narrows the type of `id` to the one chosen by `model`.
    pub fn fixup_value_type(&mut self, id: ValueId, model: &Model) {
        let ty = self.value(id).ty;
        self.types.fixup(ty, model);
    }

    /// Narrows every type of the program to the ones chosen by `model`.
    pub fn fixup_types(&mut self, model: &Model) {
        let ids: Vec<TypeId> = self.types.ids().collect();
        for ty in ids {
            self.types.fixup(ty, model);
        }
    }

    /// Type constraints of every value, instructions excluded.
    pub fn type_constraints(&self, smt: &Smt) -> Expr {
        smt.mk_and_many(
            self.values
                .iter()
                .filter(|v| !matches!(v.kind, ValueKind::Instruction))
                .map(|v| v.type_constraints(self, smt)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::config::Config;
    use crate::state::Phase;

    #[test]
    fn test_undef_and_poison() {
        let smt = Smt::new();
        let config = Config::default();
        let mut program = Program::new();
        let i32 = program.types_mut().mk_int(32);
        let u = program.add_undef(i32);
        let p = program.add_poison(i32);
        let mut s = State::new(&smt, &program, &config, Phase::Source);

        let sv = program.value(p).to_smt(&mut s);
        assert!(smt.is_false(sv.non_poison));
        assert_eq!(sv.value, smt.mk_uint(0, 32));

        let sv = program.value(u).to_smt(&mut s);
        assert!(smt.is_true(sv.non_poison));
        assert_eq!(smt.width(sv.value), 32);
        assert_eq!(s.undef_vars(), &[sv.value]);
    }

    #[test]
    fn test_void_and_null() {
        let smt = Smt::new();
        let config = Config::default();
        let mut program = Program::new();
        let ptr = program.types_mut().mk_ptr();
        let null = program.add_null(ptr);
        let mut s = State::new(&smt, &program, &config, Phase::Source);

        let sv = program.value(program.void_value()).to_smt(&mut s);
        assert!(smt.is_false(sv.value));
        assert!(smt.is_false(sv.non_poison));

        let sv = program.value(null).to_smt(&mut s);
        assert_eq!(sv.value, smt.mk_uint(0, config.bits_for_ptr()));
        assert!(smt.is_true(sv.non_poison));
    }

    #[test]
    fn test_print_global() {
        let mut program = Program::new();
        let i64 = program.types_mut().mk_int(64);
        let g = program.add_global(i64, "@g", 8, 8, true);
        let h = program.add_global(i64, "@h", 16, 4, false);

        let mut out = String::new();
        program.value(g).print(&mut out).unwrap();
        assert_eq!(out, "@g = constant 8 bytes, align 8");
        out.clear();
        program.value(h).print(&mut out).unwrap();
        assert_eq!(out, "@h = global 16 bytes, align 4");
    }

    #[test]
    fn test_print_unsupported() {
        let mut program = Program::new();
        let i8 = program.types_mut().mk_int(8);
        let u = program.add_undef(i8);
        let x = program.add_input(i8, "%x", ParamAttrs::new());
        let agg_ty = program.types_mut().mk_aggregate(vec![i8, i8]);
        let agg = program.add_aggregate(agg_ty, vec![u, x]);

        let mut out = String::new();
        for id in [u, x, agg, program.void_value()] {
            let err = program.value(id).print(&mut out).unwrap_err();
            assert!(matches!(err, ValueError::NoTextualForm { .. }));
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_names() {
        let mut program = Program::new();
        let i8 = program.types_mut().mk_int(8);
        let x = program.add_input(i8, "%x", ParamAttrs::new().noundef());
        let y = program.add_input(i8, "%y", ParamAttrs::new());
        let agg_ty = program.types_mut().mk_aggregate(vec![i8, i8]);
        let agg = program.add_aggregate(agg_ty, vec![x, y]);

        assert_eq!(program.value(x).name(), "noundef %x");
        assert_eq!(program.value(agg).name(), "{ noundef %x, %y }");
        assert_eq!(program.display(y), "i8 %y");
        assert_eq!(program.display(program.void_value()), "void");
    }

    #[test]
    fn test_instruction_result() {
        let smt = Smt::new();
        let config = Config::default();
        let mut program = Program::new();
        let i8 = program.types_mut().mk_int(8);
        let add = program.add_instruction(i8, "%add");
        let mut s = State::new(&smt, &program, &config, Phase::Source);

        let sv = StateValue::new(smt.mk_bv_var("%add", 8), smt.mk_true());
        s.record_result(add, sv);
        assert_eq!(program.value(add).to_smt(&mut s), sv);
    }

    #[test]
    #[should_panic(expected = "used before it is evaluated")]
    fn test_unevaluated_instruction_panics() {
        let smt = Smt::new();
        let config = Config::default();
        let mut program = Program::new();
        let i8 = program.types_mut().mk_int(8);
        let add = program.add_instruction(i8, "%add");
        let mut s = State::new(&smt, &program, &config, Phase::Source);
        program.value(add).to_smt(&mut s);
    }

    #[test]
    fn test_copy_smt_name() {
        let smt = Smt::new();
        let config = Config::default();
        let mut src = Program::new();
        let i8 = src.types_mut().mk_int(8);
        let a = src.add_input(i8, "%a", ParamAttrs::new());
        let mut tgt = Program::new();
        let i8 = tgt.types_mut().mk_int(8);
        let b = tgt.add_input(i8, "%b", ParamAttrs::new());
        tgt.copy_smt_name(b, src.value(a));

        let mut s = State::new(&smt, &tgt, &config, Phase::Target);
        let sv = tgt.value(b).to_smt(&mut s);
        let names: Vec<String> = smt.declarations(sv.value).into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"%a".to_string()));
        assert!(names.contains(&"ty_%a".to_string()));
        assert_eq!(tgt.value(b).name(), "%b");
    }
}
