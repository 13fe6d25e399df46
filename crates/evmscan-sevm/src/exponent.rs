// SPDX-License-Identifier: AGPL-3.0

//! Axiomatised exponentiation.
//!
//! EXP is modelled by an uninterpreted function `Power : BV256 × BV256 →
//! BV256`. Concrete operands get the exact value asserted against the
//! application term; symbolic operands get the application itself plus a
//! positivity bound and the concrete-base identities for base 256.

use num_bigint::BigUint;
use evmscan_smt::{BitVec, Bool, Function};
use z3::Context;

pub struct ExponentFunctionManager<'ctx> {
    ctx: &'ctx Context,
    power: Function<'ctx>,
    concrete_constraints: Bool<'ctx>,
}

impl<'ctx> ExponentFunctionManager<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        let power = Function::new(ctx, "Power", &[256, 256], 256);

        // Power(256, i) == 256^i for i in [0, 32): the byte-shift exponents
        // Solidity emits for packed-struct access.
        let base = BitVec::from_u64(ctx, 256, 256);
        let mut identities = Vec::with_capacity(32);
        for i in 0..32u32 {
            let exponent = BitVec::from_u64(ctx, i as u64, 256);
            let value = BigUint::from(256u32).pow(i);
            let expected = BitVec::from_biguint(ctx, &value, 256);
            identities.push(power.apply(&[&base, &exponent]).eq(&expected));
        }

        Self {
            ctx,
            power,
            concrete_constraints: Bool::and_all(ctx, &identities),
        }
    }

    /// Model `base ** exponent`, returning the result term and the side
    /// condition to record on the path.
    pub fn create_condition(
        &self,
        base: &BitVec<'ctx>,
        exponent: &BitVec<'ctx>,
    ) -> (BitVec<'ctx>, Bool<'ctx>) {
        let application = self.power.apply(&[base, exponent]);

        if let (Some(base_value), Some(exponent_value)) = (base.as_biguint(), exponent.as_biguint())
        {
            let modulus = BigUint::from(1u8) << 256;
            let result = base_value.modpow(&exponent_value, &modulus);
            let concrete = BitVec::from_biguint(self.ctx, &result, 256);
            let constraint = concrete.eq(&application);
            return (concrete, constraint);
        }

        let positive = application.ugt(&BitVec::from_u64(self.ctx, 0, 256));
        let constraint = positive.and(&self.concrete_constraints);
        (application, constraint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmscan_smt::{SatResult, Solver};
    use z3::Config;

    #[test]
    fn concrete_exponentiation() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let manager = ExponentFunctionManager::new(&ctx);

        let base = BitVec::from_u64(&ctx, 2, 256);
        let exponent = BitVec::from_u64(&ctx, 10, 256);
        let (result, constraint) = manager.create_condition(&base, &exponent);

        assert_eq!(result.as_u64(), Some(1024));
        let (status, _) = Solver::new(&ctx).check(&[constraint]);
        assert_eq!(status, SatResult::Sat);
    }

    #[test]
    fn overflow_wraps_modulo_word_size() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let manager = ExponentFunctionManager::new(&ctx);

        let base = BitVec::from_u64(&ctx, 2, 256);
        let exponent = BitVec::from_u64(&ctx, 256, 256);
        let (result, _) = manager.create_condition(&base, &exponent);
        assert_eq!(result.as_u64(), Some(0));
    }

    #[test]
    fn symbolic_exponent_is_constrained_positive() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let manager = ExponentFunctionManager::new(&ctx);

        let base = BitVec::from_u64(&ctx, 3, 256);
        let exponent = BitVec::new_const(&ctx, "e", 256);
        let (result, constraint) = manager.create_condition(&base, &exponent);
        assert!(result.is_symbolic());

        // the result can never be forced to zero under the side condition
        let zero = BitVec::from_u64(&ctx, 0, 256);
        let (status, _) = Solver::new(&ctx).check(&[constraint, result.eq(&zero)]);
        assert_eq!(status, SatResult::Unsat);
    }

    #[test]
    fn base_256_identities_pin_small_exponents() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let manager = ExponentFunctionManager::new(&ctx);

        let base = BitVec::from_u64(&ctx, 256, 256);
        let exponent = BitVec::new_const(&ctx, "e", 256);
        let (result, constraint) = manager.create_condition(&base, &exponent);

        // with e == 2 the identities force the result to 65536
        let two = BitVec::from_u64(&ctx, 2, 256);
        let expected = BitVec::from_u64(&ctx, 65536, 256);
        let (status, _) = Solver::new(&ctx).check(&[
            constraint,
            exponent.eq(&two),
            result.ne(&expected),
        ]);
        assert_eq!(status, SatResult::Unsat);
    }
}
