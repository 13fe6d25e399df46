// SPDX-License-Identifier: AGPL-3.0

//! Uninterpreted functions over bit-vector sorts.

use z3::ast::{Ast, BV};
use z3::{Context, FuncDecl, Sort};

use crate::bitvec::BitVec;

/// An uninterpreted function `BV_d1 × … × BV_dn → BV_r`.
pub struct Function<'ctx> {
    name: String,
    range: u32,
    decl: FuncDecl<'ctx>,
}

impl<'ctx> std::fmt::Debug for Function<'ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Function({} -> BV{})", self.name, self.range)
    }
}

impl<'ctx> Function<'ctx> {
    pub fn new(ctx: &'ctx Context, name: &str, domain: &[u32], range: u32) -> Self {
        let domain_sorts: Vec<Sort<'ctx>> =
            domain.iter().map(|&width| Sort::bitvector(ctx, width)).collect();
        let domain_refs: Vec<&Sort<'ctx>> = domain_sorts.iter().collect();
        let range_sort = Sort::bitvector(ctx, range);
        Self {
            name: name.to_string(),
            range,
            decl: FuncDecl::new(ctx, name, &domain_refs, &range_sort),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> u32 {
        self.range
    }

    /// Apply the function to bit-vector arguments.
    pub fn apply(&self, args: &[&BitVec<'ctx>]) -> BitVec<'ctx> {
        let raw: Vec<BV<'ctx>> = args.iter().map(|a| a.term().clone()).collect();
        let ast_args: Vec<&dyn Ast<'ctx>> = raw.iter().map(|a| a as &dyn Ast<'ctx>).collect();
        let applied = self
            .decl
            .apply(&ast_args)
            .as_bv()
            .expect("uninterpreted function returns a bit-vector");
        BitVec::from_term(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Solver;
    use z3::{Config, SatResult};

    #[test]
    fn application_is_functional() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let f = Function::new(&ctx, "keccak256_512", &[512], 256);
        let x = BitVec::new_const(&ctx, "x", 512);
        let y = BitVec::new_const(&ctx, "y", 512);

        let fx = f.apply(&[&x]);
        assert_eq!(fx.size(), 256);

        // x == y implies f(x) == f(y): the negation must be unsatisfiable
        let solver = Solver::new(&ctx);
        let (status, _) = solver.check(&[x.eq(&y), f.apply(&[&x]).ne(&f.apply(&[&y]))]);
        assert_eq!(status, SatResult::Unsat);
    }
}
