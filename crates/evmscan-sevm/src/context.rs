// SPDX-License-Identifier: AGPL-3.0

//! The shared execution context: the Z3 context, both function managers,
//! the actor table and the transaction-id source.
//!
//! Everything that would otherwise be process-global lives here and is
//! passed by reference; nothing reaches for hidden state.

use std::cell::Cell;

use evmscan_smt::{is_feasible, BitVec, Bool, Model, SatResult, Solver};
use z3::Context;

use crate::exponent::ExponentFunctionManager;
use crate::keccak::KeccakFunctionManager;

/// The three symbolic actors every analysis pre-loads: the deployer, the
/// adversary and an unrelated third party.
#[derive(Debug)]
pub struct Actors<'ctx> {
    pub creator: BitVec<'ctx>,
    pub attacker: BitVec<'ctx>,
    pub someguy: BitVec<'ctx>,
}

impl<'ctx> Actors<'ctx> {
    fn new(ctx: &'ctx Context) -> Self {
        Self {
            creator: BitVec::from_u64(ctx, 9999, 256),
            attacker: BitVec::from_u64(ctx, 8888, 256),
            someguy: BitVec::from_u64(ctx, 7777, 256),
        }
    }

    pub fn all(&self) -> [&BitVec<'ctx>; 3] {
        [&self.creator, &self.attacker, &self.someguy]
    }
}

/// Per-analysis execution context.
pub struct ExecContext<'ctx> {
    z3: &'ctx Context,
    pub exponent: ExponentFunctionManager<'ctx>,
    pub keccak: KeccakFunctionManager<'ctx>,
    pub actors: Actors<'ctx>,
    next_tx_id: Cell<usize>,
    /// Cap on materialised return data when the length is symbolic.
    pub symbolic_return_cap: usize,
}

impl<'ctx> ExecContext<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self {
            z3: ctx,
            exponent: ExponentFunctionManager::new(ctx),
            keccak: KeccakFunctionManager::new(ctx),
            actors: Actors::new(ctx),
            next_tx_id: Cell::new(0),
            symbolic_return_cap: 300,
        }
    }

    pub fn z3(&self) -> &'ctx Context {
        self.z3
    }

    pub fn next_tx_id(&self) -> String {
        let next = self.next_tx_id.get() + 1;
        self.next_tx_id.set(next);
        next.to_string()
    }

    /// Check satisfiability of `formulas`, folding in the keccak manager's
    /// accumulated axioms. A fresh solver is used per check.
    pub fn check(&self, formulas: &[Bool<'ctx>]) -> (SatResult, Option<Model<'ctx>>) {
        let mut all = formulas.to_vec();
        all.extend(self.keccak.conditions());
        Solver::new(self.z3).check(&all)
    }

    /// Optimistic feasibility: only a definite UNSAT is infeasible.
    pub fn is_feasible(&self, formulas: &[Bool<'ctx>]) -> bool {
        let (status, _) = self.check(formulas);
        is_feasible(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::Config;

    #[test]
    fn tx_ids_are_sequential() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);
        assert_eq!(ectx.next_tx_id(), "1");
        assert_eq!(ectx.next_tx_id(), "2");
    }

    #[test]
    fn feasibility_is_optimistic_on_empty() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);
        assert!(ectx.is_feasible(&[]));
    }

    #[test]
    fn contradiction_is_infeasible() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);

        let x = BitVec::new_const(&ctx, "x", 256);
        let one = BitVec::from_u64(&ctx, 1, 256);
        let two = BitVec::from_u64(&ctx, 2, 256);
        assert!(!ectx.is_feasible(&[x.eq(&one), x.eq(&two)]));
    }
}
