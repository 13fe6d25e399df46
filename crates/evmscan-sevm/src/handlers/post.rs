// SPDX-License-Identifier: AGPL-3.0

//! Synthetic post handlers, run in the parent frame after a nested
//! transaction retires.
//!
//! The parent was suspended before its call operands were consumed, so the
//! post handler pops them again: 7 slots for CALL/CALLCODE, 6 for
//! DELEGATECALL/STATICCALL. Return data is copied bounded by the
//! caller-declared output size, and the pushed result is a fresh symbol
//! constrained to 1 on success and 0 when the callee produced nothing.

use evmscan_smt::BitVec;
use evmscan_state::{GlobalState, Transaction};
use tracing::debug;

use crate::call::get_call_parameters;
use crate::context::ExecContext;
use crate::instruction::{step, HandlerResult};

pub(crate) fn call_family_post<'ctx>(
    ectx: &ExecContext<'ctx>,
    mut gs: GlobalState<'ctx>,
    with_value: bool,
    reverted: bool,
) -> HandlerResult<'ctx> {
    let instruction_address = gs
        .current_instruction()
        .map(|instruction| instruction.address)
        .unwrap_or_default();
    let params = get_call_parameters(ectx, &mut gs, with_value)?;
    let retval = gs.new_bitvec(&format!("returnvalue_{}", instruction_address), 256);

    let out_offset = params.memory_out_offset.as_u64();
    let out_size = params.memory_out_size.as_u64();

    match (gs.last_return_data.clone(), out_offset, out_size) {
        (None, _, _) => {
            let zero = BitVec::from_u64(ectx.z3(), 0, 256);
            gs.world_state.add_constraint(retval.eq(&zero));
            gs.machine_state.push(retval)?;
        }
        (Some(_), None, _) | (Some(_), _, None) => {
            debug!("symbolic output region after a call, leaving the result open");
            gs.machine_state.push(retval)?;
        }
        (Some(return_data), Some(offset), Some(size)) => {
            let copy_len = (size as usize).min(return_data.data.len());
            gs.machine_state.mem_extend(offset as i64, copy_len as i64)?;
            for (i, byte) in return_data.data.iter().take(copy_len).enumerate() {
                gs.machine_state
                    .memory
                    .write_byte(offset + i as u64, byte.clone())?;
            }
            let expected = if reverted { 0 } else { 1 };
            let expected = BitVec::from_u64(ectx.z3(), expected, 256);
            gs.world_state.add_constraint(retval.eq(&expected));
            gs.machine_state.push(retval)?;
        }
    }
    step(gs)
}

/// CREATE/CREATE2 resume: pop the operands again and push the deployed
/// address, or zero when the creation reverted or returned no code.
pub(crate) fn create_post<'ctx>(
    ectx: &ExecContext<'ctx>,
    mut gs: GlobalState<'ctx>,
    operands: usize,
    ended_tx: &Transaction<'ctx>,
    reverted: bool,
) -> HandlerResult<'ctx> {
    for _ in 0..operands {
        gs.machine_state.pop()?;
    }
    let succeeded = !reverted && !ended_tx.return_data().is_empty();
    let result = if succeeded {
        ended_tx.callee_account().address.pad_to_size(256)
    } else {
        BitVec::from_u64(ectx.z3(), 0, 256)
    };
    gs.machine_state.push(result)?;
    step(gs)
}
