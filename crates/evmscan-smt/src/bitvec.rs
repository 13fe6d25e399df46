// SPDX-License-Identifier: AGPL-3.0

//! Bit-vector terms with EVM-flavoured operations.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::fmt;
use z3::ast::{Ast, BV};
use z3::Context;

use crate::annotation::{union, Annotation};
use crate::boolean::Bool;
use crate::{bit_mask, biguint_to_bv, bv_numeral};

/// A bit-vector term of fixed width, with an optional name and a set of
/// annotations that survive arithmetic.
#[derive(Clone)]
pub struct BitVec<'ctx> {
    term: BV<'ctx>,
    name: Option<String>,
    annotations: Vec<Annotation<'ctx>>,
}

impl<'ctx> BitVec<'ctx> {
    /// Concrete value from a u64, truncated to `size` bits.
    pub fn from_u64(ctx: &'ctx Context, value: u64, size: u32) -> Self {
        Self::wrap(BV::from_u64(ctx, value, size))
    }

    /// Concrete value from a big integer, reduced modulo `2^size`.
    pub fn from_biguint(ctx: &'ctx Context, value: &BigUint, size: u32) -> Self {
        Self::wrap(biguint_to_bv(ctx, &(value & bit_mask(size)), size))
    }

    /// Concrete value from big-endian bytes.
    pub fn from_bytes(ctx: &'ctx Context, bytes: &[u8], size: u32) -> Self {
        Self::from_biguint(ctx, &BigUint::from_bytes_be(bytes), size)
    }

    /// A fresh named symbol.
    pub fn new_const(ctx: &'ctx Context, name: &str, size: u32) -> Self {
        Self {
            term: BV::new_const(ctx, name, size),
            name: Some(name.to_string()),
            annotations: Vec::new(),
        }
    }

    /// Wrap a raw Z3 term.
    pub fn from_term(term: BV<'ctx>) -> Self {
        Self::wrap(term)
    }

    fn wrap(term: BV<'ctx>) -> Self {
        Self {
            term,
            name: None,
            annotations: Vec::new(),
        }
    }

    pub(crate) fn derived(&self, term: BV<'ctx>) -> Self {
        Self {
            term,
            name: self.name.clone(),
            annotations: self.annotations.clone(),
        }
    }

    fn combined(&self, other: &Self, term: BV<'ctx>) -> Self {
        Self {
            term,
            name: self.name.clone(),
            annotations: union(&self.annotations, &other.annotations),
        }
    }

    pub fn term(&self) -> &BV<'ctx> {
        &self.term
    }

    pub fn ctx(&self) -> &'ctx Context {
        self.term.get_ctx()
    }

    pub fn size(&self) -> u32 {
        self.term.get_size()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn annotate(&mut self, annotation: Annotation<'ctx>) {
        self.annotations.push(annotation);
    }

    pub fn annotations(&self) -> &[Annotation<'ctx>] {
        &self.annotations
    }

    /// The numeral value, if this term simplifies to one.
    pub fn as_biguint(&self) -> Option<BigUint> {
        bv_numeral(&self.term.simplify())
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_biguint().and_then(|v| v.to_u64())
    }

    pub fn is_symbolic(&self) -> bool {
        self.as_biguint().is_none()
    }

    /// Big-endian bytes padded to the term width. Symbolic terms come back
    /// zero-filled; use [`as_biguint`](Self::as_biguint) for a checked read.
    pub fn to_bytes(&self) -> Vec<u8> {
        let width = (self.size() as usize + 7) / 8;
        let value = self.as_biguint().unwrap_or_default();
        let bytes = value.to_bytes_be();
        if bytes.len() >= width {
            bytes[bytes.len() - width..].to_vec()
        } else {
            let mut padded = vec![0u8; width - bytes.len()];
            padded.extend_from_slice(&bytes);
            padded
        }
    }

    pub fn hex_string(&self) -> String {
        self.to_bytes().iter().map(|b| format!("{:02x}", b)).collect()
    }

    // Arithmetic. All binary operations require identical widths and take
    // the union of both annotation sets.

    pub fn add(&self, other: &Self) -> Self {
        self.assert_same_width(other);
        self.combined(other, self.term.bvadd(&other.term))
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.assert_same_width(other);
        self.combined(other, self.term.bvsub(&other.term))
    }

    pub fn mul(&self, other: &Self) -> Self {
        self.assert_same_width(other);
        self.combined(other, self.term.bvmul(&other.term))
    }

    pub fn udiv(&self, other: &Self) -> Self {
        self.assert_same_width(other);
        self.combined(other, self.term.bvudiv(&other.term))
    }

    pub fn sdiv(&self, other: &Self) -> Self {
        self.assert_same_width(other);
        self.combined(other, self.term.bvsdiv(&other.term))
    }

    pub fn urem(&self, other: &Self) -> Self {
        self.assert_same_width(other);
        self.combined(other, self.term.bvurem(&other.term))
    }

    pub fn srem(&self, other: &Self) -> Self {
        self.assert_same_width(other);
        self.combined(other, self.term.bvsrem(&other.term))
    }

    /// Add a small concrete offset, keeping annotations.
    pub fn add_u64(&self, offset: u64) -> Self {
        let rhs = BV::from_u64(self.ctx(), offset, self.size());
        self.derived(self.term.bvadd(&rhs))
    }

    // Bitwise.

    pub fn and(&self, other: &Self) -> Self {
        self.assert_same_width(other);
        self.combined(other, self.term.bvand(&other.term))
    }

    pub fn or(&self, other: &Self) -> Self {
        self.assert_same_width(other);
        self.combined(other, self.term.bvor(&other.term))
    }

    pub fn xor(&self, other: &Self) -> Self {
        self.assert_same_width(other);
        self.combined(other, self.term.bvxor(&other.term))
    }

    pub fn not(&self) -> Self {
        self.derived(self.term.bvnot())
    }

    // Shifts. The shift amount shares the operand width, as on the EVM.

    pub fn shl(&self, shift: &Self) -> Self {
        self.assert_same_width(shift);
        self.combined(shift, self.term.bvshl(&shift.term))
    }

    pub fn lshr(&self, shift: &Self) -> Self {
        self.assert_same_width(shift);
        self.combined(shift, self.term.bvlshr(&shift.term))
    }

    pub fn ashr(&self, shift: &Self) -> Self {
        self.assert_same_width(shift);
        self.combined(shift, self.term.bvashr(&shift.term))
    }

    // Comparisons.

    pub fn ult(&self, other: &Self) -> Bool<'ctx> {
        self.assert_same_width(other);
        Bool::with_annotations(
            self.term.bvult(&other.term),
            union(&self.annotations, &other.annotations),
        )
    }

    pub fn ugt(&self, other: &Self) -> Bool<'ctx> {
        self.assert_same_width(other);
        Bool::with_annotations(
            self.term.bvugt(&other.term),
            union(&self.annotations, &other.annotations),
        )
    }

    pub fn ule(&self, other: &Self) -> Bool<'ctx> {
        self.assert_same_width(other);
        Bool::with_annotations(
            self.term.bvule(&other.term),
            union(&self.annotations, &other.annotations),
        )
    }

    pub fn uge(&self, other: &Self) -> Bool<'ctx> {
        self.assert_same_width(other);
        Bool::with_annotations(
            self.term.bvuge(&other.term),
            union(&self.annotations, &other.annotations),
        )
    }

    pub fn slt(&self, other: &Self) -> Bool<'ctx> {
        self.assert_same_width(other);
        Bool::with_annotations(
            self.term.bvslt(&other.term),
            union(&self.annotations, &other.annotations),
        )
    }

    pub fn sgt(&self, other: &Self) -> Bool<'ctx> {
        self.assert_same_width(other);
        Bool::with_annotations(
            self.term.bvsgt(&other.term),
            union(&self.annotations, &other.annotations),
        )
    }

    pub fn eq(&self, other: &Self) -> Bool<'ctx> {
        self.assert_same_width(other);
        Bool::with_annotations(
            self.term._eq(&other.term),
            union(&self.annotations, &other.annotations),
        )
    }

    pub fn ne(&self, other: &Self) -> Bool<'ctx> {
        self.eq(other).not()
    }

    // Structure.

    /// `self` becomes the high bits, `other` the low bits.
    pub fn concat(&self, other: &Self) -> Self {
        self.combined(other, self.term.concat(&other.term))
    }

    pub fn extract(&self, high: u32, low: u32) -> Self {
        self.derived(self.term.extract(high, low))
    }

    /// Zero-extend to `size` bits. Widths can only grow.
    pub fn pad_to_size(&self, size: u32) -> Self {
        assert!(size >= self.size(), "cannot pad to a smaller width");
        if size == self.size() {
            return self.clone();
        }
        self.derived(self.term.zero_ext(size - self.size()))
    }

    /// View as a boolean: `v == 1`.
    pub fn as_bool(&self) -> Bool<'ctx> {
        let one = BV::from_u64(self.ctx(), 1, self.size());
        Bool::with_annotations(self.term._eq(&one), self.annotations.clone())
    }

    /// `ite(cond, then, otherwise)`; both branches must share a width.
    pub fn ite(cond: &Bool<'ctx>, then: &Self, otherwise: &Self) -> Self {
        then.assert_same_width(otherwise);
        Self {
            term: cond.term().ite(&then.term, &otherwise.term),
            name: None,
            annotations: union(
                &union(cond.annotations(), then.annotations()),
                &otherwise.annotations,
            ),
        }
    }

    fn assert_same_width(&self, other: &Self) {
        assert_eq!(
            self.size(),
            other.size(),
            "bit-vector width mismatch: {} vs {}",
            self.size(),
            other.size()
        );
    }
}

impl<'ctx> fmt::Debug for BitVec<'ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_biguint() {
            Some(value) => write!(f, "BitVec({}, {})", value, self.size()),
            None => write!(f, "BitVec({}, {})", self.term, self.size()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::Config;

    fn ctx() -> Context {
        Context::new(&Config::new())
    }

    #[test]
    fn concrete_arithmetic() {
        let ctx = ctx();
        let a = BitVec::from_u64(&ctx, 10, 256);
        let b = BitVec::from_u64(&ctx, 5, 256);

        assert_eq!(a.add(&b).as_u64(), Some(15));
        assert_eq!(a.sub(&b).as_u64(), Some(5));
        assert_eq!(a.mul(&b).as_u64(), Some(50));
        assert_eq!(a.udiv(&b).as_u64(), Some(2));
    }

    #[test]
    fn modular_wraparound() {
        let ctx = ctx();
        let max = BitVec::from_biguint(&ctx, &bit_mask(256), 256);
        let one = BitVec::from_u64(&ctx, 1, 256);
        assert_eq!(max.add(&one).as_u64(), Some(0));
        let zero = BitVec::from_u64(&ctx, 0, 256);
        assert_eq!(zero.sub(&one).as_biguint(), Some(bit_mask(256)));
    }

    #[test]
    fn symbolic_detection() {
        let ctx = ctx();
        let x = BitVec::new_const(&ctx, "x", 256);
        assert!(x.is_symbolic());
        assert!(!BitVec::from_u64(&ctx, 3, 256).is_symbolic());
        // a symbolic expression that simplifies to a constant is concrete
        let cancelled = x.sub(&x);
        assert_eq!(cancelled.as_u64(), Some(0));
    }

    #[test]
    fn annotations_propagate() {
        let ctx = ctx();
        let mut origin = BitVec::new_const(&ctx, "origin", 256);
        origin.annotate(Annotation::TxOrigin);
        let other = BitVec::from_u64(&ctx, 1, 256);

        let sum = origin.add(&other);
        assert!(sum.annotations().iter().any(Annotation::is_tx_origin));

        let cmp = sum.eq(&other);
        assert!(cmp.annotations().iter().any(Annotation::is_tx_origin));
    }

    #[test]
    fn concat_and_extract() {
        let ctx = ctx();
        let hi = BitVec::from_u64(&ctx, 0xab, 8);
        let lo = BitVec::from_u64(&ctx, 0xcd, 8);
        let word = hi.concat(&lo);
        assert_eq!(word.size(), 16);
        assert_eq!(word.as_u64(), Some(0xabcd));
        assert_eq!(word.extract(7, 0).as_u64(), Some(0xcd));
        assert_eq!(word.extract(15, 8).as_u64(), Some(0xab));
    }

    #[test]
    fn bool_round_trip() {
        let ctx = ctx();
        let one = BitVec::from_u64(&ctx, 1, 256);
        let two = BitVec::from_u64(&ctx, 2, 256);
        assert!(one.as_bool().is_true());
        assert!(two.as_bool().is_false());
    }

    #[test]
    fn hex_padding() {
        let ctx = ctx();
        let v = BitVec::from_u64(&ctx, 0x60, 8);
        assert_eq!(v.hex_string(), "60");
        let word = BitVec::from_u64(&ctx, 0x60, 256);
        assert_eq!(word.hex_string().len(), 64);
    }
}
