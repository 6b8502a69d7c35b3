//! Execution state threaded through the translation of one program.
//!
//! The two programs of a refinement query are translated one after the other, each with its
//! own [`State`]. The only information flowing from the first to the second is the
//! [`GlobalTable`]: the source program picks the block ids of its globals, and the target
//! program must place globals of the same name at the very same ids.
//!
//! ```rust
//! use tv_ir::config::Config;
//! use tv_ir::smt::Smt;
//! use tv_ir::state::{Phase, State};
//! use tv_ir::value::Program;
//!
//! let smt = Smt::new();
//! let config = Config::default();
//! let mut src = Program::new();
//! let i8 = src.types_mut().mk_int(8);
//! let g = src.add_global(i8, "@g", 1, 1, false);
//! let tgt = src.clone();
//!
//! let mut s = State::new(&smt, &src, &config, Phase::Source);
//! let p_src = src.value(g).to_smt(&mut s).value;
//! let globals = s.into_globals();
//!
//! let mut t = State::new(&smt, &tgt, &config, Phase::Target);
//! t.import_globals(&globals).unwrap();
//! let p_tgt = tgt.value(g).to_smt(&mut t).value;
//! assert_eq!(p_src, p_tgt);
//! ```

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::config::Config;
use crate::error::StateError;
use crate::memory::Memory;
use crate::smt::{Expr, Smt};
use crate::value::{Program, ValueId};

/// The formula pair every value translates to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StateValue {
    /// Bit-level encoding (boolean for zero-width values).
    pub value: Expr,
    /// Holds iff the value is not poison.
    pub non_poison: Expr,
}

impl StateValue {
    pub fn new(value: Expr, non_poison: Expr) -> Self {
        Self { value, non_poison }
    }
}

/// Which program of the pair is being translated.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Phase {
    /// The first program; it chooses the block ids of globals.
    Source,
    /// The second program; it reuses the block ids chosen by the source.
    Target,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct GlobalEntry {
    pub bid: u32,
    pub allocated: bool,
}

/// Global name to block id, with a flag telling whether the block exists in the current
/// program's memory yet.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct GlobalTable {
    entries: BTreeMap<String, GlobalEntry>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Option<GlobalEntry> {
        self.entries.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, GlobalEntry)> {
        self.entries.iter().map(|(name, &entry)| (name.as_str(), entry))
    }

    fn insert_allocated(&mut self, name: &str, bid: u32) {
        let previous = self.entries.insert(
            name.to_string(),
            GlobalEntry {
                bid,
                allocated: true,
            },
        );
        assert!(previous.is_none(), "Global '{}' is already bound", name);
    }

    fn reserve(&mut self, name: &str, bid: u32) -> Result<(), StateError> {
        if let Some(existing) = self.entries.get(name) {
            if existing.bid != bid {
                return Err(StateError::GlobalRebound {
                    name: name.to_string(),
                    existing: existing.bid,
                    bid,
                });
            }
            return Ok(());
        }
        self.entries.insert(
            name.to_string(),
            GlobalEntry {
                bid,
                allocated: false,
            },
        );
        Ok(())
    }

    fn mark_allocated(&mut self, name: &str) {
        match self.entries.get_mut(name) {
            Some(entry) => entry.allocated = true,
            None => panic!("Global '{}' is not bound", name),
        }
    }

    /// The table handed to the target program: same ids, nothing allocated yet.
    pub fn for_target(&self) -> GlobalTable {
        let entries = self
            .entries
            .iter()
            .map(|(name, entry)| {
                let entry = GlobalEntry {
                    bid: entry.bid,
                    allocated: false,
                };
                (name.clone(), entry)
            })
            .collect();
        GlobalTable { entries }
    }
}

pub struct State<'a> {
    smt: &'a Smt,
    program: &'a Program,
    config: &'a Config,
    phase: Phase,
    memory: Memory,
    globals: GlobalTable,
    undef_vars: Vec<Expr>,
    axioms: Vec<Expr>,
    results: HashMap<ValueId, StateValue>,
}

impl<'a> State<'a> {
    pub fn new(smt: &'a Smt, program: &'a Program, config: &'a Config, phase: Phase) -> Self {
        debug!("new state for {:?}", phase);
        Self {
            smt,
            program,
            config,
            phase,
            memory: Memory::new(config),
            globals: GlobalTable::new(),
            undef_vars: Vec::new(),
            axioms: Vec::new(),
            results: HashMap::new(),
        }
    }

    pub fn smt(&self) -> &'a Smt {
        self.smt
    }
    pub fn program(&self) -> &'a Program {
        self.program
    }
    pub fn config(&self) -> &'a Config {
        self.config
    }
    pub fn phase(&self) -> Phase {
        self.phase
    }
    pub fn is_source(&self) -> bool {
        self.phase == Phase::Source
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }
}

// Globals
impl<'a> State<'a> {
    pub fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    pub fn global(&self, name: &str) -> Option<GlobalEntry> {
        self.globals.lookup(name)
    }

    /// Binds `name` to a freshly allocated block.
    pub fn add_global(&mut self, name: &str, bid: u32) {
        debug!("global {} => block {}", name, bid);
        self.globals.insert_allocated(name, bid);
    }

    pub fn mark_global_allocated(&mut self, name: &str) {
        self.globals.mark_allocated(name);
    }

    /// Binds `name` to block `bid` without allocating it; the block is created at that id when
    /// the global is first translated.
    ///
    /// Only the target program may do this: the source program is the one choosing ids. The
    /// block must not be in use by another global or allocation of this program.
    pub fn reserve_global(&mut self, name: &str, bid: u32) -> Result<(), StateError> {
        if self.is_source() {
            return Err(StateError::ReserveInSource {
                name: name.to_string(),
                bid,
            });
        }
        if self.globals.lookup(name).is_none() {
            let taken = self.memory.block(bid).is_some()
                || self.globals.iter().any(|(_, entry)| entry.bid == bid);
            if taken {
                return Err(StateError::BlockTaken {
                    name: name.to_string(),
                    bid,
                });
            }
        }
        self.globals.reserve(name, bid)?;
        self.memory.reserve_bid(bid);
        debug!("global {} reserved at block {}", name, bid);
        Ok(())
    }

    /// Reserves every global of the source program's table.
    pub fn import_globals(&mut self, source: &GlobalTable) -> Result<(), StateError> {
        for (name, entry) in source.iter() {
            self.reserve_global(name, entry.bid)?;
        }
        Ok(())
    }

    /// Ends the translation, returning the table to hand to the target program.
    pub fn into_globals(self) -> GlobalTable {
        self.globals.for_target()
    }
}

// Side constraints
impl<'a> State<'a> {
    pub fn add_axiom(&mut self, axiom: Expr) {
        if self.smt.is_true(axiom) {
            return;
        }
        debug!("axiom {}", self.smt.to_smtlib(axiom));
        self.axioms.push(axiom);
    }

    pub fn axiom_list(&self) -> &[Expr] {
        &self.axioms
    }

    /// Conjunction of all axioms.
    pub fn axioms(&self) -> Expr {
        self.smt.mk_and_many(self.axioms.iter().copied())
    }

    pub fn add_undef_var(&mut self, var: Expr) {
        self.undef_vars.push(var);
    }

    pub fn undef_vars(&self) -> &[Expr] {
        &self.undef_vars
    }

    /// Stores the result of an instruction, computed by the block evaluator.
    pub fn record_result(&mut self, value: ValueId, result: StateValue) {
        self.results.insert(value, result);
    }

    pub fn result(&self, value: ValueId) -> Option<StateValue> {
        self.results.get(&value).copied()
    }
}
