// SPDX-License-Identifier: AGPL-3.0

//! Operand collection for the CALL/CREATE families.

use evmscan_errors::{VmError, VmResult};
use evmscan_smt::BitVec;
use evmscan_state::{Account, Calldata, GlobalState, ReturnData};
use tracing::info;

use crate::context::ExecContext;

/// Gas stipend forwarded with a value-bearing CALL.
const CALL_STIPEND: u64 = 2300;

/// Calldata materialised from memory is capped at this many bytes when the
/// declared size is symbolic.
const SYMBOLIC_CALLDATA_SIZE: u64 = 320;

/// The EVM-defined operands of a CALL-family opcode.
#[derive(Debug)]
pub struct CallParameters<'ctx> {
    pub callee_address: BitVec<'ctx>,
    pub callee_account: Account<'ctx>,
    /// `None` for STATICCALL and DELEGATECALL, which carry no value slot.
    pub value: Option<BitVec<'ctx>>,
    pub gas: BitVec<'ctx>,
    pub memory_out_offset: BitVec<'ctx>,
    pub memory_out_size: BitVec<'ctx>,
    pub calldata: Calldata<'ctx>,
}

/// Pop the operand list of a CALL-family opcode: 7 slots with a value,
/// 6 without. A value-bearing call gains the stipend when value > 0,
/// modelled as `ite(value > 0, value + stipend, 0)`.
pub fn get_call_parameters<'ctx>(
    ectx: &ExecContext<'ctx>,
    gs: &mut GlobalState<'ctx>,
    with_value: bool,
) -> VmResult<CallParameters<'ctx>> {
    let machine = &mut gs.machine_state;
    let gas = machine.pop_bitvec()?;
    let to = machine.pop_bitvec()?;
    let value = if with_value {
        Some(machine.pop_bitvec()?)
    } else {
        None
    };
    let memory_in_offset = machine.pop_bitvec()?;
    let memory_in_size = machine.pop_bitvec()?;
    let memory_out_offset = machine.pop_bitvec()?;
    let memory_out_size = machine.pop_bitvec()?;

    let calldata = memory_calldata(ectx, gs, &memory_in_offset, &memory_in_size);
    let callee_address = to;
    let callee_account = callee_account(ectx, gs, &callee_address);

    let value = value.map(|v| {
        let zero = BitVec::from_u64(ectx.z3(), 0, v.size());
        let with_stipend = v.add_u64(CALL_STIPEND);
        BitVec::ite(&v.ugt(&zero), &with_stipend, &zero)
    });

    Ok(CallParameters {
        callee_address,
        callee_account,
        value,
        gas,
        memory_out_offset,
        memory_out_size,
        calldata,
    })
}

/// Materialise call input from memory. Symbolic sizes are capped, symbolic
/// offsets fall back to fully symbolic calldata.
fn memory_calldata<'ctx>(
    ectx: &ExecContext<'ctx>,
    gs: &GlobalState<'ctx>,
    offset: &BitVec<'ctx>,
    size: &BitVec<'ctx>,
) -> Calldata<'ctx> {
    let tx_id = match gs.current_transaction() {
        Some(frame) => format!("{}_internalcall", frame.tx.id()),
        None => "internalcall".to_string(),
    };

    let concrete_size = match size.as_u64() {
        Some(s) => s,
        None => SYMBOLIC_CALLDATA_SIZE,
    };
    let Some(concrete_offset) = offset.as_u64() else {
        info!("symbolic calldata offset is unsupported, passing symbolic input");
        return Calldata::symbolic(ectx.z3(), &tx_id);
    };

    let mut bytes = Vec::with_capacity(concrete_size as usize);
    for i in 0..concrete_size {
        let cell = gs.machine_state.memory.read_byte(ectx.z3(), concrete_offset + i);
        bytes.push(cell.as_u64().unwrap_or(0) as u8);
    }
    Calldata::concrete(ectx.z3(), &tx_id, bytes)
}

fn callee_account<'ctx>(
    ectx: &ExecContext<'ctx>,
    gs: &mut GlobalState<'ctx>,
    callee_address: &BitVec<'ctx>,
) -> Account<'ctx> {
    if callee_address.is_symbolic() {
        return Account::new(ectx.z3(), callee_address.clone(), None, 0, "", false);
    }
    gs.world_state.existing_or_load(callee_address).clone()
}

/// ETH movement between two accounts, asserting solvency into the path
/// condition before the debit.
pub(crate) fn transfer_eth<'ctx>(
    gs: &mut GlobalState<'ctx>,
    sender: &BitVec<'ctx>,
    receiver: &BitVec<'ctx>,
    value: &BitVec<'ctx>,
) {
    let sender_balance = gs.world_state.balance_of(sender);
    gs.world_state.add_constraint(sender_balance.uge(value));
    let receiver_balance = gs.world_state.balance_of(receiver);
    gs.world_state.set_balance(sender, &sender_balance.sub(value));
    gs.world_state
        .set_balance(receiver, &receiver_balance.add(value));
}

/// Model an external call with no executable callee: the output region is
/// filled with fresh bytes guarded by a symbolic `returndatasize`.
pub(crate) fn write_symbolic_return<'ctx>(
    ectx: &ExecContext<'ctx>,
    gs: &mut GlobalState<'ctx>,
    offset: &BitVec<'ctx>,
    size: &BitVec<'ctx>,
) -> VmResult<()> {
    let (Some(offset), Some(size)) = (offset.as_u64(), size.as_u64()) else {
        return Ok(());
    };

    let return_data_size = gs.new_bitvec("returndatasize", 256);
    let mut fresh_bytes = Vec::with_capacity(size as usize);
    for i in 0..size {
        fresh_bytes.push(gs.new_bitvec(
            &format!("call_output_var({})_{}", offset + i, gs.machine_state.pc()),
            8,
        ));
    }
    for (i, fresh) in fresh_bytes.iter().enumerate() {
        let index = BitVec::from_u64(ectx.z3(), i as u64, 256);
        let in_bounds = index.ult(&return_data_size);
        let old = gs.machine_state.memory.read_byte(ectx.z3(), offset + i as u64);
        let cell = BitVec::ite(&in_bounds, fresh, &old);
        gs.machine_state.memory.write_byte(offset + i as u64, cell)?;
    }
    gs.last_return_data = Some(ReturnData {
        data: fresh_bytes,
        size: return_data_size,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmscan_smt::{SatResult, Solver};
    use evmscan_state::{
        Calldata as StateCalldata, Environment, MachineState, WorldState,
    };
    use z3::{Config, Context};

    fn state<'ctx>(ectx: &ExecContext<'ctx>) -> GlobalState<'ctx> {
        let ctx = ectx.z3();
        let mut world = WorldState::new(ctx);
        let address = BitVec::from_u64(ctx, 101, 256);
        world.create_account(10, Some(address.clone()), false, None, None, 0);
        let environment = Environment {
            active_account: address,
            sender: BitVec::from_u64(ctx, 9999, 256),
            gas_price: BitVec::from_u64(ctx, 1, 256),
            call_value: BitVec::from_u64(ctx, 0, 256),
            origin: BitVec::from_u64(ctx, 9999, 256),
            base_fee: BitVec::new_const(ctx, "basefee", 256),
            block_number: BitVec::new_const(ctx, "block_number", 256),
            chain_id: BitVec::new_const(ctx, "chain_id", 256),
            calldata: StateCalldata::concrete(ctx, "0", vec![]),
            code: evmscan_disasm::Disassembly::new("6080"),
            static_flag: false,
            active_function: "fallback".to_string(),
        };
        GlobalState::new(world, environment, MachineState::new(8_000_000))
    }

    #[test]
    fn pops_in_evm_order_with_stipend() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);
        let mut gs = state(&ectx);

        // push in reverse so the top reads gas, to, value, in/out regions
        for v in [7u64, 6, 5, 4, 3, 0x42, 100_000].iter() {
            gs.machine_state.push(BitVec::from_u64(&ctx, *v, 256)).unwrap();
        }

        let params = get_call_parameters(&ectx, &mut gs, true).unwrap();
        assert_eq!(params.gas.as_u64(), Some(100_000));
        assert_eq!(params.callee_address.as_u64(), Some(0x42));
        assert_eq!(params.memory_out_offset.as_u64(), Some(6));
        assert_eq!(params.memory_out_size.as_u64(), Some(7));
        // value 3 gains the stipend
        assert_eq!(params.value.unwrap().as_u64(), Some(3 + CALL_STIPEND));
        assert_eq!(gs.machine_state.stack_size(), 0);
    }

    #[test]
    fn zero_value_keeps_no_stipend() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);
        let mut gs = state(&ectx);

        for v in [7u64, 6, 5, 4, 0, 0x42, 100_000].iter() {
            gs.machine_state.push(BitVec::from_u64(&ctx, *v, 256)).unwrap();
        }
        let params = get_call_parameters(&ectx, &mut gs, true).unwrap();
        assert_eq!(params.value.unwrap().as_u64(), Some(0));
    }

    #[test]
    fn staticcall_pops_six() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);
        let mut gs = state(&ectx);

        for v in [7u64, 6, 5, 4, 0x42, 100_000].iter() {
            gs.machine_state.push(BitVec::from_u64(&ctx, *v, 256)).unwrap();
        }
        let params = get_call_parameters(&ectx, &mut gs, false).unwrap();
        assert!(params.value.is_none());
        assert_eq!(gs.machine_state.stack_size(), 0);
    }

    #[test]
    fn transfer_constrains_solvency() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);
        let mut gs = state(&ectx);

        let sender = BitVec::from_u64(&ctx, 101, 256);
        let receiver = BitVec::from_u64(&ctx, 0x42, 256);
        let value = BitVec::from_u64(&ctx, 100, 256);
        transfer_eth(&mut gs, &sender, &receiver, &value);

        // balance of 10 cannot cover 100: the path condition is unsat
        let (status, _) = Solver::new(&ctx).check(gs.world_state.constraints().as_slice());
        assert_eq!(status, SatResult::Unsat);
    }
}
