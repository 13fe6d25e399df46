// SPDX-License-Identifier: AGPL-3.0

//! Axiomatised KECCAK-256.
//!
//! Per input width `L` the manager lazily declares a pair of uninterpreted
//! functions `keccak256_L : BV_L → BV256` and its inverse
//! `keccak256_L⁻¹ : BV256 → BV_L`. Concrete inputs hash for real; symbolic
//! inputs return the application term and record side conditions:
//! an injectivity witness through the inverse, an allocation window unique
//! to the width, a mod-64 alignment that keeps symbolic hashes away from
//! concrete arithmetic neighbourhoods, and a disjunct permitting equality
//! with any recorded concrete hash of the same width. Windows of different
//! widths never overlap, but the scheme is deliberately unsound for
//! collisions across widths.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use num_bigint::BigUint;
use evmscan_smt::{BitVec, Bool, Function};
use z3::Context;

/// keccak256 of the empty input.
const EMPTY_KECCAK_DECIMAL: &str =
    "89477152217924674838424037953991966239322087453347756267410168184682657981552";

struct FunctionPair<'ctx> {
    forward: Rc<Function<'ctx>>,
    inverse: Rc<Function<'ctx>>,
}

struct KeccakInner<'ctx> {
    functions: HashMap<u32, FunctionPair<'ctx>>,
    /// Window index allocated per width.
    window_index: HashMap<u32, BigUint>,
    index_counter: BigUint,
    symbolic_inputs: HashMap<u32, Vec<BitVec<'ctx>>>,
    concrete_pairs: Vec<(BitVec<'ctx>, BitVec<'ctx>)>,
}

pub struct KeccakFunctionManager<'ctx> {
    ctx: &'ctx Context,
    inner: RefCell<KeccakInner<'ctx>>,
}

impl<'ctx> KeccakFunctionManager<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self {
            ctx,
            inner: RefCell::new(KeccakInner {
                functions: HashMap::new(),
                window_index: HashMap::new(),
                index_counter: Self::total_parts() - BigUint::from(34534u32),
                symbolic_inputs: HashMap::new(),
                concrete_pairs: Vec::new(),
            }),
        }
    }

    fn total_parts() -> BigUint {
        BigUint::from(10u8).pow(40)
    }

    fn part() -> BigUint {
        let max = (BigUint::from(1u8) << 256) - 1u8;
        max / Self::total_parts()
    }

    fn interval_difference() -> BigUint {
        BigUint::from(10u8).pow(30)
    }

    /// The hard-coded empty-input hash.
    pub fn empty_keccak_hash(&self) -> BitVec<'ctx> {
        let value = BigUint::parse_bytes(EMPTY_KECCAK_DECIMAL.as_bytes(), 10)
            .expect("constant parses");
        BitVec::from_biguint(self.ctx, &value, 256)
    }

    /// The true keccak-256 of a concrete input, zero-padded to at least 32
    /// bytes.
    pub fn find_concrete_keccak(&self, data: &BitVec<'ctx>) -> BitVec<'ctx> {
        let width_bytes = ((data.size() as usize + 7) / 8).max(32);
        let value = data.as_biguint().unwrap_or_default();
        let mut bytes = value.to_bytes_be();
        if bytes.len() < width_bytes {
            let mut padded = vec![0u8; width_bytes - bytes.len()];
            padded.extend_from_slice(&bytes);
            bytes = padded;
        }
        let hash = evmscan_hashes::keccak256(&bytes);
        BitVec::from_bytes(self.ctx, &hash, 256)
    }

    fn function_pair(&self, width: u32) -> (Rc<Function<'ctx>>, Rc<Function<'ctx>>) {
        let mut inner = self.inner.borrow_mut();
        let pair = inner.functions.entry(width).or_insert_with(|| FunctionPair {
            forward: Rc::new(Function::new(
                self.ctx,
                &format!("keccak256_{}", width),
                &[width],
                256,
            )),
            inverse: Rc::new(Function::new(
                self.ctx,
                &format!("keccak256_{}_inv", width),
                &[256],
                width,
            )),
        });
        (pair.forward.clone(), pair.inverse.clone())
    }

    /// Hash a term. Concrete inputs hash for real and the pair is recorded;
    /// symbolic inputs yield the uninterpreted application.
    pub fn create_keccak(&self, data: &BitVec<'ctx>) -> BitVec<'ctx> {
        let width = data.size();
        let (forward, _) = self.function_pair(width);

        if !data.is_symbolic() {
            let hash = self.find_concrete_keccak(data);
            self.inner
                .borrow_mut()
                .concrete_pairs
                .push((data.clone(), hash.clone()));
            return hash;
        }

        let result = forward.apply(&[data]);
        self.inner
            .borrow_mut()
            .symbolic_inputs
            .entry(width)
            .or_default()
            .push(data.clone());
        result
    }

    /// The accumulated axiom set, conjoined into every feasibility check.
    pub fn conditions(&self) -> Vec<Bool<'ctx>> {
        let (symbolic, concrete) = {
            let inner = self.inner.borrow();
            (
                inner
                    .symbolic_inputs
                    .iter()
                    .flat_map(|(_, inputs)| inputs.iter().cloned())
                    .collect::<Vec<_>>(),
                inner.concrete_pairs.clone(),
            )
        };

        let mut conditions = Vec::new();
        for input in &symbolic {
            conditions.push(self.condition_for(input));
        }
        for (input, hash) in &concrete {
            let (forward, inverse) = self.function_pair(input.size());
            conditions.push(forward.apply(&[input]).eq(hash));
            conditions.push(inverse.apply(&[hash]).eq(input));
        }
        conditions
    }

    fn condition_for(&self, input: &BitVec<'ctx>) -> Bool<'ctx> {
        let width = input.size();
        let (forward, inverse) = self.function_pair(width);
        let (lower, upper) = self.window_for(width);

        let hash = forward.apply(&[input]);
        let round_trip = inverse.apply(&[&hash]).eq(input);

        let lower_bv = BitVec::from_biguint(self.ctx, &lower, 256);
        let upper_bv = BitVec::from_biguint(self.ctx, &upper, 256);
        let sixty_four = BitVec::from_u64(self.ctx, 64, 256);
        let zero = BitVec::from_u64(self.ctx, 0, 256);

        let window = lower_bv
            .ule(&hash)
            .and(&hash.ult(&upper_bv))
            .and(&hash.urem(&sixty_four).eq(&zero));

        // each concrete pair of the same width is a permitted disjunct
        let mut permitted = window;
        let inner = self.inner.borrow();
        for (concrete_input, concrete_hash) in
            inner.concrete_pairs.iter().filter(|(i, _)| i.size() == width)
        {
            let matches = hash.eq(concrete_hash).and(&input.eq(concrete_input));
            permitted = permitted.or(&matches);
        }

        round_trip.and(&permitted)
    }

    /// The allocation window for a width; windows are disjoint by
    /// construction.
    fn window_for(&self, width: u32) -> (BigUint, BigUint) {
        let mut inner = self.inner.borrow_mut();
        let index = match inner.window_index.get(&width) {
            Some(index) => index.clone(),
            None => {
                let index = inner.index_counter.clone();
                inner.window_index.insert(width, index.clone());
                inner.index_counter = &inner.index_counter - Self::interval_difference();
                index
            }
        };
        let lower = &index * Self::part();
        let upper = &lower + Self::part();
        (lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmscan_smt::{SatResult, Solver};
    use z3::Config;

    #[test]
    fn concrete_hash_matches_library() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let manager = KeccakFunctionManager::new(&ctx);

        let input = BitVec::from_u64(&ctx, 0, 256);
        let hash = manager.create_keccak(&input);
        let expected = evmscan_hashes::keccak256(&[0u8; 32]);
        assert_eq!(hash.to_bytes(), expected.to_vec());
    }

    #[test]
    fn narrow_input_padded_to_word() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let manager = KeccakFunctionManager::new(&ctx);

        // a 64-bit input hashes as its 32-byte zero-padded form
        let input = BitVec::from_u64(&ctx, 5, 64);
        let hash = manager.create_keccak(&input);
        let mut padded = [0u8; 32];
        padded[31] = 5;
        assert_eq!(hash.to_bytes(), evmscan_hashes::keccak256(&padded).to_vec());
    }

    #[test]
    fn empty_hash_constant() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let manager = KeccakFunctionManager::new(&ctx);

        assert_eq!(
            manager.empty_keccak_hash().to_bytes(),
            evmscan_hashes::keccak256(&[]).to_vec()
        );
    }

    #[test]
    fn symbolic_hash_is_injective_within_width() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let manager = KeccakFunctionManager::new(&ctx);

        let x = BitVec::new_const(&ctx, "x", 512);
        let y = BitVec::new_const(&ctx, "y", 512);
        let hx = manager.create_keccak(&x);
        let hy = manager.create_keccak(&y);

        let mut formulas = manager.conditions();
        formulas.push(hx.eq(&hy));
        formulas.push(x.ne(&y));
        let (status, _) = Solver::new(&ctx).check(&formulas);
        assert_eq!(status, SatResult::Unsat);
    }

    #[test]
    fn symbolic_hash_is_aligned() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let manager = KeccakFunctionManager::new(&ctx);

        let x = BitVec::new_const(&ctx, "x", 512);
        let hash = manager.create_keccak(&x);

        let sixty_four = BitVec::from_u64(&ctx, 64, 256);
        let zero = BitVec::from_u64(&ctx, 0, 256);
        let mut formulas = manager.conditions();
        formulas.push(hash.urem(&sixty_four).ne(&zero));
        let (status, _) = Solver::new(&ctx).check(&formulas);
        assert_eq!(status, SatResult::Unsat);
    }
}
