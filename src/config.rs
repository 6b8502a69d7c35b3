//! Encoding configuration.
//!
//! The configuration is threaded explicitly into every [`State`][crate::state::State]; nothing
//! here is process-global.

/// Knobs that change how values are encoded.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// Function inputs are never `undef`.
    pub disable_undef_input: bool,

    /// Function inputs are never `poison`.
    pub disable_poison_input: bool,

    /// Width of the block-id part of a pointer.
    pub bits_for_bid: u32,

    /// Width of the offset part of a pointer; also the width of block sizes.
    pub bits_for_offset: u32,

    /// Bits per byte.
    pub bits_byte: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            disable_undef_input: false,
            disable_poison_input: false,
            bits_for_bid: 8,
            bits_for_offset: 32,
            bits_byte: 8,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Width of a whole pointer.
    pub fn bits_for_ptr(&self) -> u32 {
        self.bits_for_bid + self.bits_for_offset
    }

    /// Width of block sizes and byte counts.
    pub fn bits_size_t(&self) -> u32 {
        self.bits_for_offset
    }
}
