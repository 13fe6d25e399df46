// SPDX-License-Identifier: AGPL-3.0

//! Stack shuffling and the trivial queries: PUSH/DUP/SWAP/POP, JUMPDEST,
//! PC, MSIZE, GAS.

use evmscan_errors::VmError;
use evmscan_smt::BitVec;
use evmscan_state::GlobalState;

use crate::context::ExecContext;
use crate::instruction::{step, HandlerResult};

/// All PUSHn variants: the immediate argument, zero-extended to a word.
pub(crate) fn push<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let argument = gs
        .current_instruction()
        .ok_or(VmError::InvalidInstruction)?
        .argument
        .clone();
    let value = BitVec::from_bytes(ectx.z3(), &argument, 256);
    gs.machine_state.push(value)?;
    step(gs)
}

pub(crate) fn dup<'ctx>(
    _ectx: &ExecContext<'ctx>,
    mut gs: GlobalState<'ctx>,
    n: usize,
) -> HandlerResult<'ctx> {
    gs.machine_state.dup(n)?;
    step(gs)
}

pub(crate) fn swap<'ctx>(
    _ectx: &ExecContext<'ctx>,
    mut gs: GlobalState<'ctx>,
    n: usize,
) -> HandlerResult<'ctx> {
    gs.machine_state.swap(n)?;
    step(gs)
}

pub(crate) fn pop<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    gs.machine_state.pop()?;
    step(gs)
}

pub(crate) fn jumpdest<'ctx>(
    _ectx: &ExecContext<'ctx>,
    gs: GlobalState<'ctx>,
) -> HandlerResult<'ctx> {
    step(gs)
}

/// Pushes the *byte address* of the current instruction, not the index.
pub(crate) fn pc<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let address = gs
        .current_instruction()
        .ok_or(VmError::InvalidInstruction)?
        .address;
    gs.machine_state
        .push(BitVec::from_u64(ectx.z3(), address as u64, 256))?;
    step(gs)
}

pub(crate) fn msize<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let size = gs.machine_state.memory.size();
    gs.machine_state
        .push(BitVec::from_u64(ectx.z3(), size, 256))?;
    step(gs)
}

/// Remaining gas is unknowable symbolically; a fresh symbol stands in.
pub(crate) fn gas<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let gas = gs.new_bitvec("gas", 256);
    gs.machine_state.push(gas)?;
    step(gs)
}
