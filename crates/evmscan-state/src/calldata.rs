// SPDX-License-Identifier: AGPL-3.0

//! Transaction input data, concrete or fully symbolic.

use evmscan_errors::{VmError, VmResult};
use evmscan_smt::{Array, BitVec};
use z3::Context;

/// Concrete calldata: the raw bytes plus an array mirror so symbolic
/// indices still resolve to terms.
#[derive(Debug, Clone)]
pub struct ConcreteCalldata<'ctx> {
    pub tx_id: String,
    bytes: Vec<u8>,
    array: Array<'ctx>,
}

/// Symbolic calldata: an unconstrained byte array with a symbolic size.
#[derive(Debug, Clone)]
pub struct SymbolicCalldata<'ctx> {
    pub tx_id: String,
    size: BitVec<'ctx>,
    array: Array<'ctx>,
}

#[derive(Debug, Clone)]
pub enum Calldata<'ctx> {
    Concrete(ConcreteCalldata<'ctx>),
    Symbolic(SymbolicCalldata<'ctx>),
}

impl<'ctx> Calldata<'ctx> {
    pub fn concrete(ctx: &'ctx Context, tx_id: &str, bytes: Vec<u8>) -> Self {
        let mut array = Array::new(ctx, &format!("{}_calldata", tx_id), 8);
        for (i, byte) in bytes.iter().enumerate() {
            array.set(
                &BitVec::from_u64(ctx, i as u64, 256),
                &BitVec::from_u64(ctx, *byte as u64, 8),
            );
        }
        Calldata::Concrete(ConcreteCalldata {
            tx_id: tx_id.to_string(),
            bytes,
            array,
        })
    }

    pub fn symbolic(ctx: &'ctx Context, tx_id: &str) -> Self {
        Calldata::Symbolic(SymbolicCalldata {
            tx_id: tx_id.to_string(),
            size: BitVec::new_const(ctx, &format!("{}_calldatasize", tx_id), 256),
            array: Array::new(ctx, &format!("{}_calldata", tx_id), 8),
        })
    }

    pub fn tx_id(&self) -> &str {
        match self {
            Calldata::Concrete(c) => &c.tx_id,
            Calldata::Symbolic(s) => &s.tx_id,
        }
    }

    /// The size term: a literal for concrete calldata, a fresh symbol
    /// otherwise.
    pub fn size(&self, ctx: &'ctx Context) -> BitVec<'ctx> {
        match self {
            Calldata::Concrete(c) => BitVec::from_u64(ctx, c.bytes.len() as u64, 256),
            Calldata::Symbolic(s) => s.size.clone(),
        }
    }

    /// Read one byte. Concrete calldata rejects a concrete index at or past
    /// its end; callers that want EVM zero-padding handle the error.
    pub fn byte_at(&self, ctx: &'ctx Context, index: &BitVec<'ctx>) -> VmResult<BitVec<'ctx>> {
        match self {
            Calldata::Concrete(c) => match index.as_u64() {
                Some(i) if (i as usize) < c.bytes.len() => {
                    Ok(BitVec::from_u64(ctx, c.bytes[i as usize] as u64, 8))
                }
                Some(i) => Err(VmError::NotConcrete(format!(
                    "calldata index {} out of bounds ({} bytes)",
                    i,
                    c.bytes.len()
                ))),
                None => Ok(c.array.get(index)),
            },
            Calldata::Symbolic(s) => Ok(s.array.get(index)),
        }
    }

    /// Read a 32-byte big-endian word starting at `index`.
    pub fn word_at(&self, ctx: &'ctx Context, index: &BitVec<'ctx>) -> VmResult<BitVec<'ctx>> {
        match self {
            Calldata::Concrete(c) => {
                let offset = index
                    .as_u64()
                    .ok_or_else(|| VmError::NotConcrete("symbolic calldata offset".into()))?
                    as usize;
                if offset >= c.bytes.len() {
                    return Err(VmError::NotConcrete(format!(
                        "calldata word at {} out of bounds ({} bytes)",
                        offset,
                        c.bytes.len()
                    )));
                }
                let mut word = [0u8; 32];
                for (i, slot) in word.iter_mut().enumerate() {
                    *slot = c.bytes.get(offset + i).copied().unwrap_or(0);
                }
                Ok(BitVec::from_bytes(ctx, &word, 256))
            }
            Calldata::Symbolic(s) => {
                let mut word = s.array.get(index);
                for i in 1..32u64 {
                    word = word.concat(&s.array.get(&index.add_u64(i)));
                }
                Ok(word)
            }
        }
    }

    /// The concrete bytes, when this calldata has any.
    pub fn concrete_bytes(&self) -> Option<&[u8]> {
        match self {
            Calldata::Concrete(c) => Some(&c.bytes),
            Calldata::Symbolic(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmscan_smt::Solver;
    use z3::{Config, Context, SatResult};

    #[test]
    fn empty_calldata_word_read_fails() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let calldata = Calldata::concrete(&ctx, "0", Vec::new());
        let index = BitVec::from_u64(&ctx, 100, 256);
        assert!(calldata.word_at(&ctx, &index).is_err());
    }

    #[test]
    fn size_and_bytes() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let calldata = Calldata::concrete(&ctx, "0", vec![1, 2, 3, 5, 5]);
        assert_eq!(calldata.size(&ctx).as_u64(), Some(5));
        for (i, expected) in [1u64, 2, 3, 5, 5].iter().enumerate() {
            let index = BitVec::from_u64(&ctx, i as u64, 256);
            assert_eq!(calldata.byte_at(&ctx, &index).unwrap().as_u64(), Some(*expected));
        }
    }

    #[test]
    fn word_zero_pads_partial_tail() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let calldata = Calldata::concrete(&ctx, "0", vec![0xff]);
        let word = calldata
            .word_at(&ctx, &BitVec::from_u64(&ctx, 0, 256))
            .unwrap();
        // 0xff in the most significant byte, zeros below
        let expected = BitVec::from_u64(&ctx, 0xff, 256)
            .shl(&BitVec::from_u64(&ctx, 248, 256));
        assert_eq!(word.as_biguint(), expected.as_biguint());
    }

    #[test]
    fn symbolic_reads_are_functional() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let calldata = Calldata::symbolic(&ctx, "1");
        let a = BitVec::from_u64(&ctx, 2, 256);
        let b = BitVec::from_u64(&ctx, 2, 256);

        let byte_a = calldata.byte_at(&ctx, &a).unwrap();
        let byte_b = calldata.byte_at(&ctx, &b).unwrap();

        // two reads of the same index can never differ
        let solver = Solver::new(&ctx);
        let (status, _) = solver.check(&[byte_a.ne(&byte_b)]);
        assert_eq!(status, SatResult::Unsat);
    }
}
