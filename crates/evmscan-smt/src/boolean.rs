// SPDX-License-Identifier: AGPL-3.0

//! Boolean terms.

use std::fmt;
use z3::ast::{Ast, Bool as Z3Bool, BV};
use z3::Context;

use crate::annotation::{union, Annotation};
use crate::bitvec::BitVec;

/// A boolean-sorted term with annotations.
#[derive(Clone)]
pub struct Bool<'ctx> {
    term: Z3Bool<'ctx>,
    annotations: Vec<Annotation<'ctx>>,
}

impl<'ctx> Bool<'ctx> {
    pub fn from_bool(ctx: &'ctx Context, value: bool) -> Self {
        Self {
            term: Z3Bool::from_bool(ctx, value),
            annotations: Vec::new(),
        }
    }

    pub fn new_const(ctx: &'ctx Context, name: &str) -> Self {
        Self {
            term: Z3Bool::new_const(ctx, name),
            annotations: Vec::new(),
        }
    }

    pub fn from_term(term: Z3Bool<'ctx>) -> Self {
        Self {
            term,
            annotations: Vec::new(),
        }
    }

    pub(crate) fn with_annotations(term: Z3Bool<'ctx>, annotations: Vec<Annotation<'ctx>>) -> Self {
        Self { term, annotations }
    }

    pub fn term(&self) -> &Z3Bool<'ctx> {
        &self.term
    }

    pub fn ctx(&self) -> &'ctx Context {
        self.term.get_ctx()
    }

    pub fn annotate(&mut self, annotation: Annotation<'ctx>) {
        self.annotations.push(annotation);
    }

    pub fn annotations(&self) -> &[Annotation<'ctx>] {
        &self.annotations
    }

    /// Literally true after simplification.
    pub fn is_true(&self) -> bool {
        self.term.simplify().as_bool() == Some(true)
    }

    /// Literally false after simplification.
    pub fn is_false(&self) -> bool {
        self.term.simplify().as_bool() == Some(false)
    }

    pub fn is_symbolic(&self) -> bool {
        self.term.simplify().as_bool().is_none()
    }

    pub fn not(&self) -> Self {
        Self {
            term: self.term.not(),
            annotations: self.annotations.clone(),
        }
    }

    pub fn and(&self, other: &Self) -> Self {
        Self {
            term: Z3Bool::and(self.ctx(), &[&self.term, &other.term]),
            annotations: union(&self.annotations, &other.annotations),
        }
    }

    pub fn or(&self, other: &Self) -> Self {
        Self {
            term: Z3Bool::or(self.ctx(), &[&self.term, &other.term]),
            annotations: union(&self.annotations, &other.annotations),
        }
    }

    /// Conjunction of a list of booleans.
    pub fn and_all(ctx: &'ctx Context, terms: &[Bool<'ctx>]) -> Self {
        let raw: Vec<&Z3Bool<'ctx>> = terms.iter().map(|b| &b.term).collect();
        Self {
            term: Z3Bool::and(ctx, &raw),
            annotations: Vec::new(),
        }
    }

    /// View as a bit-vector: `ite(b, 1, 0)` at the given width.
    pub fn as_bitvec(&self, size: u32) -> BitVec<'ctx> {
        let one = BV::from_u64(self.ctx(), 1, size);
        let zero = BV::from_u64(self.ctx(), 0, size);
        let mut result = BitVec::from_term(self.term.ite(&one, &zero));
        for annotation in &self.annotations {
            result.annotate(annotation.clone());
        }
        result
    }
}

impl<'ctx> fmt::Debug for Bool<'ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bool({})", self.term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::Config;

    #[test]
    fn literal_classification() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let t = Bool::from_bool(&ctx, true);
        assert!(t.is_true());
        assert!(!t.is_false());
        assert!(t.not().is_false());

        let x = Bool::new_const(&ctx, "b");
        assert!(x.is_symbolic());
        // a tautology simplifies back to a literal
        assert!(x.or(&x.not()).is_true());
    }

    #[test]
    fn bitvec_view() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let t = Bool::from_bool(&ctx, true).as_bitvec(256);
        assert_eq!(t.as_u64(), Some(1));
        let f = Bool::from_bool(&ctx, false).as_bitvec(256);
        assert_eq!(f.as_u64(), Some(0));
    }
}
