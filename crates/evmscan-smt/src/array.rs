// SPDX-License-Identifier: AGPL-3.0

//! Functional arrays: persistent maps from a 256-bit key to an N-bit value.

use z3::ast::Array as Z3Array;
use z3::{Context, Sort};

use crate::bitvec::BitVec;

/// A functional map from a 256-bit key to a `range`-bit value.
///
/// `set` performs a persistent point update; the previous version of the
/// array keeps its own term, so cloned states share structure for free.
#[derive(Debug, Clone)]
pub struct Array<'ctx> {
    name: String,
    range: u32,
    term: Z3Array<'ctx>,
}

impl<'ctx> Array<'ctx> {
    pub fn new(ctx: &'ctx Context, name: &str, range: u32) -> Self {
        let domain = Sort::bitvector(ctx, 256);
        let range_sort = Sort::bitvector(ctx, range);
        Self {
            name: name.to_string(),
            range,
            term: Z3Array::new_const(ctx, name, &domain, &range_sort),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> u32 {
        self.range
    }

    /// Read the value at `index`, yielding an application term.
    pub fn get(&self, index: &BitVec<'ctx>) -> BitVec<'ctx> {
        assert_eq!(index.size(), 256, "array keys are 256-bit");
        let selected = self
            .term
            .select(index.term())
            .as_bv()
            .expect("array range is a bit-vector sort");
        BitVec::from_term(selected)
    }

    /// Point-update the array at `index`.
    pub fn set(&mut self, index: &BitVec<'ctx>, value: &BitVec<'ctx>) {
        assert_eq!(index.size(), 256, "array keys are 256-bit");
        assert_eq!(
            value.size(),
            self.range,
            "array value width mismatch: {} vs {}",
            value.size(),
            self.range
        );
        self.term = self.term.store(index.term(), value.term());
    }

    pub fn term(&self) -> &Z3Array<'ctx> {
        &self.term
    }

    /// Read at a concrete key.
    pub fn get_at(&self, ctx: &'ctx Context, index: u64) -> BitVec<'ctx> {
        self.get(&BitVec::from_u64(ctx, index, 256))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::Config;

    #[test]
    fn store_select_round_trip() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut balances = Array::new(&ctx, "balance", 256);
        let key = BitVec::from_u64(&ctx, 0x65, 256);
        let value = BitVec::from_u64(&ctx, 1000, 256);
        balances.set(&key, &value);

        assert_eq!(balances.get(&key).as_u64(), Some(1000));
    }

    #[test]
    fn updates_do_not_alias_clones(){
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut original = Array::new(&ctx, "storage", 256);
        let key = BitVec::from_u64(&ctx, 1, 256);
        original.set(&key, &BitVec::from_u64(&ctx, 7, 256));

        let snapshot = original.clone();
        original.set(&key, &BitVec::from_u64(&ctx, 9, 256));

        assert_eq!(snapshot.get(&key).as_u64(), Some(7));
        assert_eq!(original.get(&key).as_u64(), Some(9));
    }

    #[test]
    fn byte_range() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut calldata = Array::new(&ctx, "calldata", 8);
        calldata.set(
            &BitVec::from_u64(&ctx, 0, 256),
            &BitVec::from_u64(&ctx, 0xfe, 8),
        );
        assert_eq!(calldata.get_at(&ctx, 0).as_u64(), Some(0xfe));
        assert_eq!(calldata.get_at(&ctx, 0).size(), 8);
    }
}
