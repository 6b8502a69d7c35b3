//! Symbolic memory.
//!
//! A pointer is the concatenation of a block id (high bits) and an offset into that block (low
//! bits). Block `0` is the null block and is never allocated. Only the blocks that the value
//! layer needs are tracked here: globals, constant globals, and the caller-allocated copies of
//! `byval` parameters (which are global blocks with the by-value mark set).

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use num_traits::ToPrimitive;

use crate::config::Config;
use crate::smt::{Expr, Smt};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlockKind {
    Global,
    ConstGlobal,
}

impl BlockKind {
    pub fn is_constant(self) -> bool {
        matches!(self, BlockKind::ConstGlobal)
    }
}

/// One allocated object.
///
/// Global blocks are initialized from the start and never change size.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Block {
    pub size: u64,
    pub align: u64,
    pub kind: BlockKind,
    pub by_val: bool,
}

#[derive(Debug, Clone)]
pub struct Memory {
    bits_for_bid: u32,
    bits_for_offset: u32,
    bits_size_t: u32,
    blocks: BTreeMap<u32, Block>,
    reserved: BTreeSet<u32>,
    next_bid: u32,
}

impl Memory {
    pub fn new(config: &Config) -> Self {
        assert!(config.bits_for_bid > 0 && config.bits_for_bid < 32);
        assert!(config.bits_for_offset > 0);
        Self {
            bits_for_bid: config.bits_for_bid,
            bits_for_offset: config.bits_for_offset,
            bits_size_t: config.bits_size_t(),
            blocks: BTreeMap::new(),
            reserved: BTreeSet::new(),
            next_bid: 1,
        }
    }

    pub fn bits_for_bid(&self) -> u32 {
        self.bits_for_bid
    }
    pub fn bits_for_offset(&self) -> u32 {
        self.bits_for_offset
    }
    /// Width of block sizes and byte counts.
    pub fn bits_size_t(&self) -> u32 {
        self.bits_size_t
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, bid: u32) -> Option<&Block> {
        self.blocks.get(&bid)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (u32, &Block)> {
        self.blocks.iter().map(|(&bid, block)| (bid, block))
    }

    fn max_bid(&self) -> u32 {
        (1u32 << self.bits_for_bid) - 1
    }

    /// Keeps `bid` away from allocations that let the memory choose the id.
    pub fn reserve_bid(&mut self, bid: u32) {
        assert_ne!(bid, 0, "Block 0 is the null block");
        self.reserved.insert(bid);
    }

    /// Allocates a block and returns a pointer to its start together with its id.
    ///
    /// With `fixed_bid`, the block is created at exactly that id.
    ///
    /// # Panics
    ///
    /// Panics if `fixed_bid` is the null block or is already allocated, or if the block id space
    /// is exhausted.
    pub fn alloc(
        &mut self,
        smt: &Smt,
        size: u64,
        align: u64,
        kind: BlockKind,
        fixed_bid: Option<u32>,
    ) -> (Expr, u32) {
        assert!(align.is_power_of_two(), "Alignment should be a power of two");

        let bid = match fixed_bid {
            Some(bid) => {
                assert_ne!(bid, 0, "Block 0 is the null block");
                assert!(
                    !self.blocks.contains_key(&bid),
                    "Block {} is already allocated",
                    bid
                );
                bid
            }
            None => {
                while self.blocks.contains_key(&self.next_bid) || self.reserved.contains(&self.next_bid) {
                    self.next_bid += 1;
                }
                let bid = self.next_bid;
                self.next_bid += 1;
                bid
            }
        };
        assert!(bid <= self.max_bid(), "Out of block ids");

        debug!(
            "alloc(size = {}, align = {}, kind = {:?}) => block {}{}",
            size,
            align,
            kind,
            bid,
            if fixed_bid.is_some() { " (fixed)" } else { "" }
        );
        self.blocks.insert(
            bid,
            Block {
                size,
                align,
                kind,
                by_val: false,
            },
        );
        let ptr = Pointer::from_bid(smt, self, bid);
        (ptr.into_expr(smt), bid)
    }

    pub fn mark_by_val(&mut self, bid: u32) {
        match self.blocks.get_mut(&bid) {
            Some(block) => block.by_val = true,
            None => panic!("Cannot mark unallocated block {} as by-value", bid),
        }
    }

    pub fn is_by_val(&self, bid: u32) -> bool {
        self.blocks.get(&bid).map_or(false, |b| b.by_val)
    }

    /// Size of the block `bid` points to.
    ///
    /// Blocks not allocated in this memory (the caller's objects) all take their size from the
    /// `blk_size_nonlocal` variable.
    pub fn block_size(&self, smt: &Smt, bid: Expr) -> Expr {
        let w = self.bits_size_t;
        if let Some(b) = smt.as_bv(bid) {
            let known = b.to_u32().and_then(|b| self.blocks.get(&b));
            if let Some(block) = known {
                return smt.mk_uint(block.size, w);
            }
        }
        let mut size = smt.mk_bv_var("blk_size_nonlocal", w);
        for (&b, block) in self.blocks.iter().rev() {
            let is_b = smt.mk_eq(bid, smt.mk_uint(b as u64, self.bits_for_bid));
            size = smt.mk_ite(is_b, smt.mk_uint(block.size, w), size);
        }
        size
    }
}

/// A pointer split into its block id and offset.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Pointer {
    bid: Expr,
    offset: Expr,
}

impl Pointer {
    /// Splits a pointer-width formula.
    pub fn new(smt: &Smt, memory: &Memory, e: Expr) -> Self {
        let wb = memory.bits_for_bid;
        let wo = memory.bits_for_offset;
        assert_eq!(smt.width(e), wb + wo, "Pointer width mismatch for {}", e);
        Self {
            bid: smt.mk_extract(e, wb + wo - 1, wo),
            offset: smt.mk_extract(e, wo - 1, 0),
        }
    }

    /// Pointer to the start of block `bid`.
    pub fn from_bid(smt: &Smt, memory: &Memory, bid: u32) -> Self {
        Self {
            bid: smt.mk_uint(bid as u64, memory.bits_for_bid),
            offset: smt.mk_uint(0, memory.bits_for_offset),
        }
    }

    pub fn mk_null(smt: &Smt, memory: &Memory) -> Self {
        Self::from_bid(smt, memory, 0)
    }

    pub fn bid(&self) -> Expr {
        self.bid
    }
    pub fn offset(&self) -> Expr {
        self.offset
    }

    pub fn into_expr(self, smt: &Smt) -> Expr {
        smt.mk_concat(self.bid, self.offset)
    }

    pub fn is_null(&self, smt: &Smt) -> Expr {
        let zero_bid = smt.mk_uint(0, smt.width(self.bid));
        smt.mk_eq(self.bid, zero_bid)
    }

    /// The offset is a multiple of `align`.
    pub fn is_aligned(&self, smt: &Smt, align: u64) -> Expr {
        assert!(align.is_power_of_two(), "Alignment should be a power of two");
        if align == 1 {
            return smt.mk_true();
        }
        let bits = align.trailing_zeros();
        let low = smt.mk_extract(self.offset, bits - 1, 0);
        smt.mk_eq(low, smt.mk_uint(0, bits))
    }

    /// The `bytes` bytes starting at this pointer lie inside a live, suitably aligned block.
    /// Writing additionally requires the block not to be constant.
    pub fn is_dereferenceable(
        &self,
        smt: &Smt,
        memory: &Memory,
        bytes: u64,
        align: u64,
        is_write: bool,
    ) -> Expr {
        if bytes == 0 {
            return smt.mk_true();
        }
        let bytes = smt.mk_uint(bytes, memory.bits_size_t);
        let size = memory.block_size(smt, self.bid);

        let non_null = smt.mk_not(self.is_null(smt));
        let fits = smt.mk_bvule(bytes, size);
        let in_bounds = smt.mk_bvule(self.offset, smt.mk_bvsub(size, bytes));
        let mut result = smt.mk_and_many([non_null, fits, in_bounds, self.is_aligned(smt, align)]);

        if is_write {
            for (bid, block) in memory.blocks() {
                if block.kind.is_constant() {
                    let b = smt.mk_uint(bid as u64, memory.bits_for_bid);
                    result = smt.mk_and(result, smt.mk_ne(self.bid, b));
                }
            }
        }
        result
    }
}
