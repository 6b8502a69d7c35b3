//! # tv-ir: value encoding for translation validation
//!
//! **`tv-ir`** turns the values of a small SSA intermediate representation into logical formulas,
//! so that a solver can decide whether a transformed program (the *target*) refines the original
//! one (the *source*).
//!
//! ## Values as formula pairs
//!
//! Every value translates to a [`StateValue`][crate::state::StateValue]: a bit-vector encoding of
//! the value together with a boolean formula that holds iff the value is **not poison**.
//! Besides plain values, the IR has two kinds of deferred undefined behavior:
//!
//! - **`undef`** stands for an arbitrary value, chosen anew at each use. It is encoded with fresh
//!   variables that the refinement query quantifies over.
//! - **`poison`** is a value whose use is undefined. It is encoded by the non-poison formula
//!   being false.
//!
//! Function inputs may be any of the three. A hidden 2-bit selector per input picks which one,
//! and parameter attributes (`noundef`, `nonnull`, `dereferenceable`, `byval`) rule out cases by
//! constraining that selector.
//!
//! ## Key Features
//!
//! - **Manager-Centric Formulas**: All terms are built through the [`Smt`][crate::smt::Smt]
//!   manager, which hash-conses nodes and simplifies on construction. Terms are referred to by
//!   cheap [`Expr`][crate::smt::Expr] handles.
//! - **Shared Globals**: The source program picks the block ids of global variables; the target
//!   program reuses them, so both agree on every global's address.
//! - **Type Inference**: Integer widths may be left symbolic, constrained, solved for, and fixed
//!   up afterwards.
//! - **Self-Contained Checking**: A small-scope model finder decides the formulas produced for
//!   narrow types, and every formula can be printed as an SMT-LIB 2 script for an external solver.
//!
//! ## Basic Usage
//!
//! ```rust
//! use tv_ir::attrs::ParamAttrs;
//! use tv_ir::config::Config;
//! use tv_ir::smt::Smt;
//! use tv_ir::state::{Phase, State};
//! use tv_ir::value::Program;
//!
//! // 1. Describe the program's values
//! let mut program = Program::new();
//! let i8 = program.types_mut().mk_int(8);
//! let x = program.add_input(i8, "%x", ParamAttrs::new().noundef());
//!
//! // 2. Translate them through a state
//! let smt = Smt::new();
//! let config = Config::default();
//! let mut s = State::new(&smt, &program, &config, Phase::Source);
//! let sv = program.value(x).to_smt(&mut s);
//!
//! // 3. A `noundef` input is exactly its variable, and is never poison
//! assert_eq!(smt.var_name(sv.value).as_deref(), Some("%x"));
//! assert!(smt.is_true(sv.non_poison));
//! assert!(!s.axiom_list().is_empty());
//! ```
//!
//! ## Core Components
//!
//! - **[`value`]**: The values of a program and their translation. Start here.
//! - **[`state`]**: Everything a translation reads and produces: memory, globals, axioms, `undef`
//!   variables.
//! - **[`types`]**: Types and their encodings.
//! - **[`memory`]**: Blocks and pointers.
//! - **[`smt`]**: The formula manager, evaluation, checking, and printing.

pub mod attrs;
pub mod config;
pub mod error;
pub mod memory;
pub mod smt;
pub mod state;
pub mod types;
pub mod value;
