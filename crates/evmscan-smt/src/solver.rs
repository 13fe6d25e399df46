// SPDX-License-Identifier: AGPL-3.0

//! Solver contexts and models.
//!
//! Each feasibility check uses a fresh solver; asserted formulas are never
//! retained across checks. Pruning is optimistic: only a definite `Unsat`
//! kills a path, timeouts and unknowns keep it alive.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use z3::{Context, SatResult, Solver as Z3Solver};

use crate::bitvec::BitVec;
use crate::boolean::Bool;
use crate::bv_numeral;

/// A single-use solver context.
pub struct Solver<'ctx> {
    inner: Z3Solver<'ctx>,
}

impl<'ctx> Solver<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self {
            inner: Z3Solver::new(ctx),
        }
    }

    /// Assert all formulas and query satisfiability. On `Sat` a model is
    /// returned for counter-example extraction.
    pub fn check(&self, formulas: &[Bool<'ctx>]) -> (SatResult, Option<Model<'ctx>>) {
        for formula in formulas {
            self.inner.assert(formula.term());
        }
        let status = self.inner.check();
        let model = match status {
            SatResult::Sat => self.inner.get_model().map(|inner| Model { inner }),
            _ => None,
        };
        (status, model)
    }
}

/// Optimistic interpretation of a solver verdict: anything short of a
/// definite `Unsat` counts as feasible.
pub fn is_feasible(status: SatResult) -> bool {
    status != SatResult::Unsat
}

/// A satisfying assignment.
pub struct Model<'ctx> {
    inner: z3::Model<'ctx>,
}

impl<'ctx> Model<'ctx> {
    /// Evaluate a bit-vector term under the model, completing unconstrained
    /// symbols with arbitrary values.
    pub fn eval_biguint(&self, term: &BitVec<'ctx>) -> Option<BigUint> {
        let evaluated = self.inner.eval(term.term(), true)?;
        bv_numeral(&evaluated)
    }

    pub fn eval_u64(&self, term: &BitVec<'ctx>) -> Option<u64> {
        self.eval_biguint(term).and_then(|v| v.to_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::Config;

    #[test]
    fn sat_with_model() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let x = BitVec::new_const(&ctx, "x", 256);
        let five = BitVec::from_u64(&ctx, 5, 256);

        let solver = Solver::new(&ctx);
        let (status, model) = solver.check(&[x.eq(&five)]);
        assert_eq!(status, SatResult::Sat);
        assert_eq!(model.unwrap().eval_u64(&x), Some(5));
    }

    #[test]
    fn unsat_prunes() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let x = BitVec::new_const(&ctx, "x", 256);
        let five = BitVec::from_u64(&ctx, 5, 256);
        let ten = BitVec::from_u64(&ctx, 10, 256);

        let solver = Solver::new(&ctx);
        let (status, model) = solver.check(&[x.eq(&five), x.eq(&ten)]);
        assert_eq!(status, SatResult::Unsat);
        assert!(model.is_none());
        assert!(!is_feasible(status));
    }

    #[test]
    fn checks_are_independent() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let x = BitVec::new_const(&ctx, "x", 256);
        let five = BitVec::from_u64(&ctx, 5, 256);
        let ten = BitVec::from_u64(&ctx, 10, 256);

        // a fresh solver per check: the first assertion must not leak
        let (a, _) = Solver::new(&ctx).check(&[x.eq(&five)]);
        let (b, _) = Solver::new(&ctx).check(&[x.eq(&ten)]);
        assert_eq!(a, SatResult::Sat);
        assert_eq!(b, SatResult::Sat);
    }
}
