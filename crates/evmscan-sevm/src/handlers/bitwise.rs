// SPDX-License-Identifier: AGPL-3.0

//! Bitwise, shift and comparison opcodes.
//!
//! Comparisons push boolean terms; the stack model converts on demand.

use evmscan_smt::BitVec;
use evmscan_state::GlobalState;
use tracing::debug;

use crate::context::ExecContext;
use crate::instruction::{step, HandlerResult};

pub(crate) fn and<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.and(&op2))?;
    step(gs)
}

pub(crate) fn or<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.or(&op2))?;
    step(gs)
}

pub(crate) fn xor<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.xor(&op2))?;
    step(gs)
}

pub(crate) fn not<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op.not())?;
    step(gs)
}

/// The i-th most-significant byte of a word, zero for i >= 32.
pub(crate) fn byte<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let index = gs.machine_state.pop_bitvec()?;
    let word = gs.machine_state.pop_bitvec()?;

    let result = match index.as_u64() {
        None => {
            debug!("symbolic byte index, substituting a fresh symbol");
            gs.new_bitvec("byte_at_symbolic_index", 256)
        }
        Some(i) if i >= 32 => BitVec::from_u64(ectx.z3(), 0, 256),
        Some(i) => {
            let high = 255 - 8 * i as u32;
            word.extract(high, high - 7).pad_to_size(256)
        }
    };
    gs.machine_state.push(result)?;
    step(gs)
}

// Shift operands: the value sits on top of the stack, the shift amount
// below it.

pub(crate) fn shl<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let value = gs.machine_state.pop_bitvec()?;
    let shift = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(value.shl(&shift))?;
    step(gs)
}

pub(crate) fn shr<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let value = gs.machine_state.pop_bitvec()?;
    let shift = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(value.lshr(&shift))?;
    step(gs)
}

pub(crate) fn ashr<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let value = gs.machine_state.pop_bitvec()?;
    let shift = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(value.ashr(&shift))?;
    step(gs)
}

pub(crate) fn lt<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.ult(&op2))?;
    step(gs)
}

pub(crate) fn gt<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.ugt(&op2))?;
    step(gs)
}

pub(crate) fn slt<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.slt(&op2))?;
    step(gs)
}

pub(crate) fn sgt<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.sgt(&op2))?;
    step(gs)
}

pub(crate) fn eq<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.eq(&op2))?;
    step(gs)
}

pub(crate) fn iszero<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op = gs.machine_state.pop_bitvec()?;
    let zero = BitVec::from_u64(ectx.z3(), 0, op.size());
    gs.machine_state.push(op.eq(&zero))?;
    step(gs)
}
