// SPDX-License-Identifier: AGPL-3.0

//! Sparse byte-addressed memory.
//!
//! Cells are 8-bit terms; untouched offsets read as zero. The logical size
//! only grows through [`Memory::grow_to`], driven by the gas accounting in
//! the machine state.

use std::collections::BTreeMap;

use evmscan_errors::{VmError, VmResult};
use evmscan_smt::BitVec;
use z3::Context;

#[derive(Debug, Clone, Default)]
pub struct Memory<'ctx> {
    cells: BTreeMap<u64, BitVec<'ctx>>,
    size: u64,
}

impl<'ctx> Memory<'ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical size in bytes (always a multiple of 32 after extension).
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn grow_to(&mut self, bytes: u64) {
        if bytes > self.size {
            self.size = bytes;
        }
    }

    pub fn write_byte(&mut self, offset: u64, value: BitVec<'ctx>) -> VmResult<()> {
        if value.size() != 8 {
            return Err(VmError::TypeMismatch("8-bit memory cell"));
        }
        self.cells.insert(offset, value);
        Ok(())
    }

    pub fn read_byte(&self, ctx: &'ctx Context, offset: u64) -> BitVec<'ctx> {
        self.cells
            .get(&offset)
            .cloned()
            .unwrap_or_else(|| BitVec::from_u64(ctx, 0, 8))
    }

    /// Write a 256-bit word as 32 big-endian bytes.
    pub fn write_word(&mut self, offset: u64, value: &BitVec<'ctx>) -> VmResult<()> {
        if value.size() != 256 {
            return Err(VmError::TypeMismatch("256-bit memory word"));
        }
        for i in 0..32u64 {
            let high = 255 - 8 * i as u32;
            let byte = value.extract(high, high - 7);
            self.cells.insert(offset + i, byte);
        }
        Ok(())
    }

    /// Read 32 consecutive bytes as one big-endian word.
    pub fn read_word(&self, ctx: &'ctx Context, offset: u64) -> BitVec<'ctx> {
        let mut word = self.read_byte(ctx, offset);
        for i in 1..32u64 {
            word = word.concat(&self.read_byte(ctx, offset + i));
        }
        word
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::Config;

    #[test]
    fn word_round_trip() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut memory = Memory::new();
        let value = BitVec::from_bytes(&ctx, &[0xde, 0xad, 0xbe, 0xef], 256);
        memory.write_word(0, &value).unwrap();

        let read = memory.read_word(&ctx, 0);
        assert_eq!(read.as_biguint(), value.as_biguint());
        // the value sits in the low bytes of the big-endian word
        assert_eq!(memory.read_byte(&ctx, 31).as_u64(), Some(0xef));
        assert_eq!(memory.read_byte(&ctx, 28).as_u64(), Some(0xde));
        assert_eq!(memory.read_byte(&ctx, 0).as_u64(), Some(0));
    }

    #[test]
    fn symbolic_word_round_trip() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut memory = Memory::new();
        let value = BitVec::new_const(&ctx, "word", 256);
        memory.write_word(64, &value).unwrap();

        // re-reading reassembles exactly the written term
        let read = memory.read_word(&ctx, 64);
        let equal = read.eq(&value);
        assert!(equal.is_true());
    }

    #[test]
    fn untouched_cells_are_zero() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let memory = Memory::new();
        assert_eq!(memory.read_byte(&ctx, 1000).as_u64(), Some(0));
        assert_eq!(memory.read_word(&ctx, 1000).as_u64(), Some(0));
    }

    #[test]
    fn cell_width_enforced() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut memory = Memory::new();
        let wide = BitVec::from_u64(&ctx, 1, 256);
        assert!(memory.write_byte(0, wide).is_err());
    }

    #[test]
    fn size_grows_monotonically() {
        let mut memory: Memory<'_> = Memory::new();
        memory.grow_to(64);
        memory.grow_to(32);
        assert_eq!(memory.size(), 64);
    }
}
