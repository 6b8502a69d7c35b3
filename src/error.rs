//! Recoverable errors.
//!
//! Broken invariants (sort mismatches, the source program touching a reserved global, reading
//! an instruction result that was never recorded) are programming errors and panic. The types
//! below cover the misuse a caller is expected to detect and handle.

use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ValueError {
    /// The value is displayed by the instruction that owns it, never on its own.
    #[error("{kind} value '{name}' has no standalone textual form")]
    NoTextualForm { kind: &'static str, name: String },

    #[error(transparent)]
    Fmt(#[from] std::fmt::Error),
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum StateError {
    #[error("cannot reserve global '{name}' (block {bid}) while evaluating the source program")]
    ReserveInSource { name: String, bid: u32 },

    #[error("global '{name}' is already bound to block {existing}, cannot rebind it to block {bid}")]
    GlobalRebound { name: String, existing: u32, bid: u32 },

    #[error("cannot reserve block {bid} for global '{name}', the block is already in use")]
    BlockTaken { name: String, bid: u32 },
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CheckError {
    #[error("formula has {bits} bits of free variables, enumeration is limited to {limit}")]
    TooManyBits { bits: u32, limit: u32 },
}
