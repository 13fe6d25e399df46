// SPDX-License-Identifier: AGPL-3.0

//! Typed wrappers over the Z3 bit-vector theory.
//!
//! Every value the interpreter touches is one of these terms: a [`BitVec`]
//! of a fixed width, a [`Bool`], a functional [`Array`] or an uninterpreted
//! [`Function`] application. Terms carry taint [`Annotation`]s that survive
//! arithmetic; binary operations take the union of both operands' sets.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use z3::ast::BV;
use z3::Context;

mod annotation;
mod array;
mod bitvec;
mod boolean;
mod function;
mod solver;

pub use annotation::{Annotation, RetVal};
pub use array::Array;
pub use bitvec::BitVec;
pub use boolean::Bool;
pub use function::Function;
pub use solver::{is_feasible, Model, Solver};

pub use z3::SatResult;

/// Build a Z3 bit-vector literal of arbitrary width from a big integer.
///
/// Values beyond 64 bits are assembled byte by byte via concat, the way the
/// z3 crate expects wide numerals.
pub(crate) fn biguint_to_bv<'ctx>(ctx: &'ctx Context, value: &BigUint, size: u32) -> BV<'ctx> {
    assert!(size > 0, "bit width must be greater than zero");

    if let Some(small) = value.to_u64() {
        return BV::from_u64(ctx, small, size);
    }

    let num_bytes = (size as usize + 7) / 8;
    let mut bytes = value.to_bytes_be();
    if bytes.len() < num_bytes {
        let mut padded = vec![0u8; num_bytes - bytes.len()];
        padded.extend_from_slice(&bytes);
        bytes = padded;
    } else if bytes.len() > num_bytes {
        bytes = bytes[bytes.len() - num_bytes..].to_vec();
    }

    let mut iter = bytes.into_iter();
    let first = iter.next().unwrap_or(0);
    let mut acc = BV::from_u64(ctx, first as u64, 8);
    for byte in iter {
        acc = acc.concat(&BV::from_u64(ctx, byte as u64, 8));
    }

    if size % 8 == 0 {
        acc
    } else {
        acc.extract(size - 1, 0)
    }
}

/// Recover the numeral value of a Z3 bit-vector term, if it is one.
///
/// Z3 prints bit-vector numerals as `#x…` (width divisible by four) or
/// `#b…`; anything else is a symbolic term.
pub(crate) fn bv_numeral(term: &BV<'_>) -> Option<BigUint> {
    let printed = term.to_string();
    if let Some(hex_digits) = printed.strip_prefix("#x") {
        BigUint::parse_bytes(hex_digits.as_bytes(), 16)
    } else if let Some(bin_digits) = printed.strip_prefix("#b") {
        BigUint::parse_bytes(bin_digits.as_bytes(), 2)
    } else {
        None
    }
}

/// Mask of `size` one-bits.
pub(crate) fn bit_mask(size: u32) -> BigUint {
    if size == 0 {
        BigUint::zero()
    } else {
        (BigUint::from(1u8) << size as usize) - 1u8
    }
}
