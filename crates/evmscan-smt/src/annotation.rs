// SPDX-License-Identifier: AGPL-3.0

//! Taint annotations attached to terms and to global states.

use crate::BitVec;

/// A return value recorded by the unchecked-retval analysis: the byte
/// address of the call site and the term pushed as its result.
#[derive(Debug, Clone)]
pub struct RetVal<'ctx> {
    pub address: usize,
    pub value: BitVec<'ctx>,
}

/// A tag carried by a term or a global state.
///
/// Neither variant survives a nested call return or gets promoted into the
/// world state; the flags exist so the driver can filter generically.
#[derive(Debug, Clone)]
pub enum Annotation<'ctx> {
    /// The term is derived from the ORIGIN opcode.
    TxOrigin,
    /// Call-site return values that have not been compared against zero yet.
    UncheckedRetval(Vec<RetVal<'ctx>>),
}

impl<'ctx> Annotation<'ctx> {
    pub fn persist_over_calls(&self) -> bool {
        false
    }

    pub fn persist_to_world_state(&self) -> bool {
        false
    }

    pub fn is_tx_origin(&self) -> bool {
        matches!(self, Annotation::TxOrigin)
    }
}

/// Union of two annotation sets. `TxOrigin` is deduplicated so taint
/// propagation through long expression chains stays bounded.
pub(crate) fn union<'ctx>(
    lhs: &[Annotation<'ctx>],
    rhs: &[Annotation<'ctx>],
) -> Vec<Annotation<'ctx>> {
    let mut result = lhs.to_vec();
    for annotation in rhs {
        match annotation {
            Annotation::TxOrigin if result.iter().any(Annotation::is_tx_origin) => {}
            other => result.push(other.clone()),
        }
    }
    result
}
