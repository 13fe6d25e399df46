// SPDX-License-Identifier: AGPL-3.0

//! Memory and storage opcodes.

use evmscan_errors::VmError;
use evmscan_state::GlobalState;
use tracing::info;

use crate::context::ExecContext;
use crate::instruction::{step, HandlerResult};

pub(crate) fn mload<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let offset = gs.machine_state.pop_bitvec()?;
    let Some(offset) = offset.as_u64() else {
        info!("symbolic memory offset in MLOAD, substituting a fresh word");
        let fallback = gs.new_bitvec("mload_symbolic_offset", 256);
        gs.machine_state.push(fallback)?;
        return step(gs);
    };
    gs.machine_state.mem_extend(offset as i64, 32)?;
    let word = gs.machine_state.mem_read_word(ectx.z3(), offset);
    gs.machine_state.push(word)?;
    step(gs)
}

pub(crate) fn mstore<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let offset = gs.machine_state.pop_bitvec()?;
    let value = gs.machine_state.pop_bitvec()?;
    let Some(offset) = offset.as_u64() else {
        info!("symbolic memory offset in MSTORE is unsupported");
        return step(gs);
    };
    gs.machine_state.mem_extend(offset as i64, 32)?;
    gs.machine_state.memory.write_word(offset, &value)?;
    step(gs)
}

pub(crate) fn mstore8<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let offset = gs.machine_state.pop_bitvec()?;
    let value = gs.machine_state.pop_bitvec()?;
    let Some(offset) = offset.as_u64() else {
        info!("symbolic memory offset in MSTORE8 is unsupported");
        return step(gs);
    };
    gs.machine_state.mem_extend(offset as i64, 1)?;
    let byte = value.extract(7, 0);
    gs.machine_state.memory.write_byte(offset, byte)?;
    step(gs)
}

pub(crate) fn sload<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let key = gs.machine_state.pop_bitvec()?;
    let value = gs.active_account_mut().storage_get(ectx.z3(), &key);
    gs.machine_state.push(value)?;
    step(gs)
}

pub(crate) fn sstore<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    if gs.environment.static_flag {
        return Err(VmError::WriteInStaticContext);
    }
    let key = gs.machine_state.pop_bitvec()?;
    let value = gs.machine_state.pop_bitvec()?;
    gs.active_account_mut().storage_set(&key, &value);
    step(gs)
}
