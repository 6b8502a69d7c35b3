//! Parameter attributes.

use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Attribute {
    ByVal,
    Dereferenceable,
    NonNull,
    NoUndef,
}

impl Attribute {
    const fn bit(self) -> u8 {
        match self {
            Attribute::ByVal => 1 << 0,
            Attribute::Dereferenceable => 1 << 1,
            Attribute::NonNull => 1 << 2,
            Attribute::NoUndef => 1 << 3,
        }
    }
}

/// Attributes attached to a function input.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ParamAttrs {
    flags: u8,
    /// Alignment in bytes (`1` when unconstrained).
    pub align: u64,
    /// Size of the caller-allocated copy of a `byval` parameter.
    pub block_size: u64,
    /// Number of bytes a `dereferenceable` pointer can be dereferenced for.
    pub deref_bytes: u64,
}

impl Default for ParamAttrs {
    fn default() -> Self {
        Self {
            flags: 0,
            align: 1,
            block_size: 0,
            deref_bytes: 0,
        }
    }
}

impl ParamAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, attr: Attribute) -> bool {
        self.flags & attr.bit() != 0
    }

    pub fn set(&mut self, attr: Attribute) {
        self.flags |= attr.bit();
    }

    pub fn with(mut self, attr: Attribute) -> Self {
        self.set(attr);
        self
    }

    pub fn byval(mut self, block_size: u64) -> Self {
        self.set(Attribute::ByVal);
        self.block_size = block_size;
        self
    }

    pub fn dereferenceable(mut self, bytes: u64) -> Self {
        self.set(Attribute::Dereferenceable);
        self.deref_bytes = bytes;
        self
    }

    pub fn nonnull(self) -> Self {
        self.with(Attribute::NonNull)
    }

    pub fn noundef(self) -> Self {
        self.with(Attribute::NoUndef)
    }

    pub fn aligned(mut self, align: u64) -> Self {
        assert!(align.is_power_of_two(), "Alignment should be a power of two");
        self.align = align;
        self
    }
}

/// Every attribute is followed by a space, so the result can be prefixed to a name.
impl fmt::Display for ParamAttrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has(Attribute::ByVal) {
            write!(f, "byval({}) ", self.block_size)?;
        }
        if self.has(Attribute::NonNull) {
            write!(f, "nonnull ")?;
        }
        if self.has(Attribute::Dereferenceable) {
            write!(f, "dereferenceable({}) ", self.deref_bytes)?;
        }
        if self.has(Attribute::NoUndef) {
            write!(f, "noundef ")?;
        }
        if self.align > 1 {
            write!(f, "align({}) ", self.align)?;
        }
        Ok(())
    }
}
