// SPDX-License-Identifier: AGPL-3.0

//! Transaction-starting and transaction-ending opcodes.
//!
//! The CALL/CREATE family suspends the caller *before* its operands are
//! consumed; the post handlers re-pop them when the nested frame returns.

use std::cell::RefCell;

use alloy_primitives::{Address, B256};
use evmscan_errors::{VmError, VmResult};
use evmscan_smt::BitVec;
use evmscan_state::{
    AddressKey, Calldata, ContractCreationTransaction, GlobalState, MessageCallTransaction,
    ReturnData, Transaction,
};
use evmscan_disasm::Disassembly;
use tracing::{debug, info};

use crate::call::{get_call_parameters, transfer_eth, write_symbolic_return, CallParameters};
use crate::context::ExecContext;
use crate::gas::{native_gas, sha3_gas};
use crate::instruction::{charge_gas, check_gas_limit, step, HandlerResult};
use crate::natives;
use crate::outcome::{finish_transaction, StepOutcome, TxStart};

pub(crate) fn stop<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    charge_gas(&mut gs)?;
    gs.machine_state.advance();
    finish_transaction(gs, None, false)
}

pub(crate) fn ret<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let offset = gs.machine_state.pop_bitvec()?;
    let length = gs.machine_state.pop_bitvec()?;

    let return_data = match length.as_u64() {
        None => {
            info!("RETURN with symbolic length, substituting one fresh byte");
            ReturnData {
                data: vec![gs.new_bitvec("return_data", 8)],
                size: length,
            }
        }
        Some(concrete_length) => {
            let concrete_offset = offset
                .as_u64()
                .ok_or_else(|| VmError::Unsupported("symbolic RETURN offset".to_string()))?;
            gs.machine_state
                .mem_extend(concrete_offset as i64, concrete_length as i64)?;
            check_gas_limit(&gs)?;
            let mut data = Vec::with_capacity(concrete_length as usize);
            for i in 0..concrete_length {
                data.push(gs.machine_state.memory.read_byte(ectx.z3(), concrete_offset + i));
            }
            ReturnData {
                data,
                size: length,
            }
        }
    };

    charge_gas(&mut gs)?;
    gs.machine_state.advance();
    finish_transaction(gs, Some(return_data), false)
}

/// REVERT carries data like RETURN; a symbolic length materialises up to
/// the configured cap of fresh bytes guarded by `i < length`.
pub(crate) fn revert<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let offset = gs.machine_state.pop_bitvec()?;
    let length = gs.machine_state.pop_bitvec()?;

    let return_data = match length.as_u64() {
        None => {
            let cap = ectx.symbolic_return_cap;
            let zero = BitVec::from_u64(ectx.z3(), 0, 8);
            let mut data = Vec::with_capacity(cap);
            for i in 0..cap {
                let index = BitVec::from_u64(ectx.z3(), i as u64, 256);
                let fresh = gs.new_bitvec(&format!("return_data_{}", i), 8);
                data.push(BitVec::ite(&index.ult(&length), &fresh, &zero));
            }
            ReturnData {
                data,
                size: BitVec::from_u64(ectx.z3(), cap as u64, 256),
            }
        }
        Some(concrete_length) => {
            let concrete_offset = offset
                .as_u64()
                .ok_or_else(|| VmError::Unsupported("symbolic REVERT offset".to_string()))?;
            gs.machine_state
                .mem_extend(concrete_offset as i64, concrete_length as i64)?;
            let mut data = Vec::with_capacity(concrete_length as usize);
            for i in 0..concrete_length {
                data.push(gs.machine_state.memory.read_byte(ectx.z3(), concrete_offset + i));
            }
            ReturnData {
                data,
                size: length,
            }
        }
    };

    charge_gas(&mut gs)?;
    gs.machine_state.advance();
    finish_transaction(gs, Some(return_data), true)
}

/// SELFDESTRUCT: move the whole balance, snapshot and delete the account.
pub(crate) fn selfdestruct<'ctx>(
    ectx: &ExecContext<'ctx>,
    mut gs: GlobalState<'ctx>,
) -> HandlerResult<'ctx> {
    if gs.environment.static_flag {
        return Err(VmError::WriteInStaticContext);
    }
    let target = gs.machine_state.pop_bitvec()?;
    let active = gs.environment.active_account.clone();

    let amount = gs.world_state.balance_of(&active);
    gs.world_state.credit(&target, &amount);

    if let Some(account) = gs.active_account().cloned() {
        gs.destructed.insert(AddressKey::of(&active), account);
    }
    gs.world_state
        .set_balance(&active, &BitVec::from_u64(ectx.z3(), 0, 256));
    gs.active_account_mut().deleted = true;

    charge_gas(&mut gs)?;
    gs.machine_state.advance();
    finish_transaction(gs, None, false)
}

pub(crate) fn call<'ctx>(ectx: &ExecContext<'ctx>, gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let pristine = gs.clone();
    let mut gs = gs;
    let params = get_call_parameters(ectx, &mut gs, true)?;

    if params.callee_account.code.is_empty() {
        return pure_value_transfer(ectx, gs, &params);
    }
    enforce_static_value(&mut gs, &params)?;
    if native_call(ectx, &mut gs, &params)? {
        return step(gs);
    }

    let code = params.callee_account.code.clone();
    let tx = Transaction::MessageCall(MessageCallTransaction {
        world_state: gs.world_state.clone(),
        callee_account: params.callee_account,
        caller: gs.environment.active_account.clone(),
        calldata: params.calldata,
        id: ectx.next_tx_id(),
        gas_price: gs.environment.gas_price.clone(),
        gas_limit: params.gas,
        origin: gs.environment.origin.clone(),
        code,
        call_value: params.value.expect("CALL carries a value slot"),
        static_flag: gs.environment.static_flag,
        return_data: RefCell::new(String::new()),
    });
    Ok(StepOutcome::TxStart(Box::new(TxStart {
        caller_state: pristine,
        tx,
        opcode: "CALL",
    })))
}

/// CALLCODE runs the callee's code against the caller's own account.
pub(crate) fn callcode<'ctx>(ectx: &ExecContext<'ctx>, gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let pristine = gs.clone();
    let mut gs = gs;
    let params = get_call_parameters(ectx, &mut gs, true)?;

    if params.callee_account.code.is_empty() {
        return pure_value_transfer(ectx, gs, &params);
    }
    enforce_static_value(&mut gs, &params)?;
    if native_call(ectx, &mut gs, &params)? {
        return step(gs);
    }

    let active = gs
        .active_account()
        .cloned()
        .ok_or(VmError::NoActiveTransaction)?;
    let tx = Transaction::MessageCall(MessageCallTransaction {
        world_state: gs.world_state.clone(),
        callee_account: active,
        caller: gs.environment.active_account.clone(),
        calldata: params.calldata,
        id: ectx.next_tx_id(),
        gas_price: gs.environment.gas_price.clone(),
        gas_limit: params.gas,
        origin: gs.environment.origin.clone(),
        code: params.callee_account.code.clone(),
        call_value: params.value.expect("CALLCODE carries a value slot"),
        static_flag: gs.environment.static_flag,
        return_data: RefCell::new(String::new()),
    });
    Ok(StepOutcome::TxStart(Box::new(TxStart {
        caller_state: pristine,
        tx,
        opcode: "CALLCODE",
    })))
}

/// DELEGATECALL preserves sender and value and runs against the caller's
/// account.
pub(crate) fn delegatecall<'ctx>(ectx: &ExecContext<'ctx>, gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let pristine = gs.clone();
    let mut gs = gs;
    let params = get_call_parameters(ectx, &mut gs, false)?;

    if params.callee_account.code.is_empty() {
        return pure_value_transfer(ectx, gs, &params);
    }
    if native_call(ectx, &mut gs, &params)? {
        return step(gs);
    }

    let active = gs
        .active_account()
        .cloned()
        .ok_or(VmError::NoActiveTransaction)?;
    let tx = Transaction::MessageCall(MessageCallTransaction {
        world_state: gs.world_state.clone(),
        callee_account: active,
        caller: gs.environment.sender.clone(),
        calldata: params.calldata,
        id: ectx.next_tx_id(),
        gas_price: gs.environment.gas_price.clone(),
        gas_limit: params.gas,
        origin: gs.environment.origin.clone(),
        code: params.callee_account.code.clone(),
        call_value: gs.environment.call_value.clone(),
        static_flag: gs.environment.static_flag,
        return_data: RefCell::new(String::new()),
    });
    Ok(StepOutcome::TxStart(Box::new(TxStart {
        caller_state: pristine,
        tx,
        opcode: "DELEGATECALL",
    })))
}

pub(crate) fn staticcall<'ctx>(ectx: &ExecContext<'ctx>, gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let pristine = gs.clone();
    let mut gs = gs;
    let params = get_call_parameters(ectx, &mut gs, false)?;

    if params.callee_account.code.is_empty() {
        return pure_value_transfer(ectx, gs, &params);
    }
    if native_call(ectx, &mut gs, &params)? {
        return step(gs);
    }

    let code = params.callee_account.code.clone();
    let tx = Transaction::MessageCall(MessageCallTransaction {
        world_state: gs.world_state.clone(),
        callee_account: params.callee_account,
        caller: gs.environment.active_account.clone(),
        calldata: params.calldata,
        id: ectx.next_tx_id(),
        gas_price: gs.environment.gas_price.clone(),
        gas_limit: params.gas,
        origin: gs.environment.origin.clone(),
        code,
        call_value: BitVec::from_u64(ectx.z3(), 0, 256),
        static_flag: true,
        return_data: RefCell::new(String::new()),
    });
    Ok(StepOutcome::TxStart(Box::new(TxStart {
        caller_state: pristine,
        tx,
        opcode: "STATICCALL",
    })))
}

pub(crate) fn create<'ctx>(ectx: &ExecContext<'ctx>, gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    if gs.environment.static_flag {
        return Err(VmError::WriteInStaticContext);
    }
    let pristine = gs.clone();
    let mut gs = gs;
    let value = gs.machine_state.pop_bitvec()?;
    let offset = gs.machine_state.pop_bitvec()?;
    let size = gs.machine_state.pop_bitvec()?;
    create_tx_helper(ectx, pristine, gs, value, offset, size, None, "CREATE")
}

pub(crate) fn create2<'ctx>(ectx: &ExecContext<'ctx>, gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    if gs.environment.static_flag {
        return Err(VmError::WriteInStaticContext);
    }
    let pristine = gs.clone();
    let mut gs = gs;
    let value = gs.machine_state.pop_bitvec()?;
    let offset = gs.machine_state.pop_bitvec()?;
    let size = gs.machine_state.pop_bitvec()?;
    let salt = gs.machine_state.pop_bitvec()?;
    create_tx_helper(ectx, pristine, gs, value, offset, size, Some(salt), "CREATE2")
}

#[allow(clippy::too_many_arguments)]
fn create_tx_helper<'ctx>(
    ectx: &ExecContext<'ctx>,
    pristine: GlobalState<'ctx>,
    mut gs: GlobalState<'ctx>,
    value: BitVec<'ctx>,
    offset: BitVec<'ctx>,
    size: BitVec<'ctx>,
    salt: Option<BitVec<'ctx>>,
    opcode: &'static str,
) -> HandlerResult<'ctx> {
    let (Some(concrete_offset), Some(concrete_size)) = (offset.as_u64(), size.as_u64()) else {
        info!("symbolic init-code region in {}, treating the create as failed", opcode);
        gs.machine_state.push(BitVec::from_u64(ectx.z3(), 0, 256))?;
        return step(gs);
    };

    // concrete prefix of the init code; a symbolic byte ends the code and
    // starts the constructor arguments
    let mut init_code = Vec::with_capacity(concrete_size as usize);
    let mut code_end = concrete_size;
    for i in 0..concrete_size {
        let cell = gs.machine_state.memory.read_byte(ectx.z3(), concrete_offset + i);
        match cell.as_u64() {
            Some(byte) => init_code.push(byte as u8),
            None => {
                code_end = i;
                break;
            }
        }
    }
    if init_code.is_empty() {
        info!("{} with no concrete init code, treating the create as failed", opcode);
        gs.machine_state.push(BitVec::from_u64(ectx.z3(), 0, 256))?;
        return step(gs);
    }
    let constructor_args: Vec<u8> = (code_end..concrete_size)
        .map(|i| {
            gs.machine_state
                .memory
                .read_byte(ectx.z3(), concrete_offset + i)
                .as_u64()
                .unwrap_or(0) as u8
        })
        .collect();

    let code_hex = hex::encode(&init_code);
    let code = Disassembly::new(&code_hex);
    let caller = gs.environment.active_account.clone();
    let origin = gs.environment.origin.clone();

    let (gas_min, gas_max) = sha3_gas(init_code.len() as i64);
    gs.machine_state.add_gas(gas_min, gas_max);
    check_gas_limit(&gs)?;

    let code_hash = evmscan_hashes::keccak256(&init_code);
    let contract_address = match &salt {
        Some(salt) => match salt.as_biguint() {
            Some(_) => {
                // keccak256(0xff ++ caller ++ salt ++ keccak256(code))[12..]
                let caller_bytes = caller.pad_to_size(256).to_bytes();
                let deployer = Address::from_slice(&caller_bytes[12..32]);
                let salt_bytes = B256::from_slice(&salt.pad_to_size(256).to_bytes());
                let derived = deployer.create2(salt_bytes, B256::from(code_hash));
                Some(BitVec::from_bytes(ectx.z3(), derived.as_slice(), 256))
            }
            None => {
                let tag = BitVec::from_u64(ectx.z3(), 0xff, 8);
                let preimage = tag
                    .concat(&caller.extract(159, 0))
                    .concat(&salt.pad_to_size(256))
                    .concat(&BitVec::from_bytes(ectx.z3(), &code_hash, 256));
                let hashed = ectx.keccak.create_keccak(&preimage);
                Some(hashed.extract(159, 0).pad_to_size(256))
            }
        },
        None => None,
    };

    let prev_world_state = gs.world_state.clone();
    let callee_key = gs.world_state.create_account(
        0,
        contract_address,
        true,
        Some(&caller),
        Some(code.clone()),
        0,
    );
    let callee_account = gs
        .world_state
        .account(&callee_key)
        .cloned()
        .ok_or(VmError::NoActiveTransaction)?;

    let id = ectx.next_tx_id();
    let calldata = Calldata::concrete(ectx.z3(), &id, constructor_args);
    let tx = Transaction::ContractCreation(ContractCreationTransaction {
        prev_world_state,
        world_state: gs.world_state.clone(),
        callee_account,
        code,
        calldata,
        caller,
        gas_price: gs.environment.gas_price.clone(),
        gas_limit: BitVec::from_u64(ectx.z3(), gs.machine_state.gas_limit() as u64, 256),
        origin,
        call_value: value,
        contract_name: String::new(),
        id,
        return_data: RefCell::new(String::new()),
    });

    Ok(StepOutcome::TxStart(Box::new(TxStart {
        caller_state: pristine,
        tx,
        opcode,
    })))
}

// Shared pieces of the CALL family.

/// A call to an account with no code just moves value; the output region
/// becomes fresh symbolic bytes and the result a fresh symbol.
fn pure_value_transfer<'ctx>(
    ectx: &ExecContext<'ctx>,
    mut gs: GlobalState<'ctx>,
    params: &CallParameters<'ctx>,
) -> HandlerResult<'ctx> {
    debug!("call against empty code, modelling a bare value transfer");
    if let Some(value) = &params.value {
        let sender = gs.environment.active_account.clone();
        transfer_eth(&mut gs, &sender, &params.callee_account.address, value);
    }
    write_symbolic_return(ectx, &mut gs, &params.memory_out_offset, &params.memory_out_size)?;
    let address = gs
        .current_instruction()
        .map(|instruction| instruction.address)
        .unwrap_or_default();
    let retval = gs.new_bitvec(&format!("retval_{}", address), 256);
    gs.machine_state.push(retval)?;
    step(gs)
}

/// In a static frame a nonzero value is a write violation; a symbolic one
/// is constrained to zero instead.
fn enforce_static_value<'ctx>(
    gs: &mut GlobalState<'ctx>,
    params: &CallParameters<'ctx>,
) -> VmResult<()> {
    if !gs.environment.static_flag {
        return Ok(());
    }
    let Some(value) = &params.value else {
        return Ok(());
    };
    match value.as_u64() {
        None => {
            let zero = BitVec::from_u64(value.ctx(), 0, value.size());
            gs.world_state.add_constraint(zero.eq(value));
            Ok(())
        }
        Some(0) => Ok(()),
        Some(_) => Err(VmError::WriteInStaticContext),
    }
}

/// Execute a precompile synchronously when the callee address is concrete
/// and in range. Returns whether the call was handled here.
fn native_call<'ctx>(
    ectx: &ExecContext<'ctx>,
    gs: &mut GlobalState<'ctx>,
    params: &CallParameters<'ctx>,
) -> VmResult<bool> {
    let Some(address) = params.callee_address.as_u64() else {
        return Ok(false);
    };
    if !(natives::PRECOMPILE_FIRST..=natives::PRECOMPILE_LAST).contains(&address) {
        return Ok(false);
    }
    info!("precompiled contract call: {}", natives::native_name(address));

    let (Some(out_offset), Some(out_size)) = (
        params.memory_out_offset.as_u64(),
        params.memory_out_size.as_u64(),
    ) else {
        info!("symbolic output region for a precompile is unsupported");
        let retval = gs.new_bitvec("native_retval", 256);
        gs.machine_state.push(retval)?;
        return Ok(true);
    };

    let (gas_min, gas_max) = native_gas(out_size as i64, address);
    gs.machine_state.add_gas(gas_min, gas_max);
    check_gas_limit(gs)?;

    let input = params.calldata.concrete_bytes().map(<[u8]>::to_vec);
    let result = match input {
        Some(bytes) => natives::execute(address, &bytes),
        None => Err(natives::NativeError::Unsupported),
    };

    let instruction_address = gs
        .current_instruction()
        .map(|instruction| instruction.address)
        .unwrap_or_default();
    let retval = gs.new_bitvec(&format!("retval_{}", instruction_address), 256);

    match result {
        Ok(output) => {
            gs.machine_state.mem_extend(out_offset as i64, out_size as i64)?;
            for (i, byte) in output.iter().take(out_size as usize).enumerate() {
                gs.machine_state
                    .memory
                    .write_byte(out_offset + i as u64, BitVec::from_u64(ectx.z3(), *byte as u64, 8))?;
            }
            let one = BitVec::from_u64(ectx.z3(), 1, 256);
            gs.world_state.add_constraint(retval.eq(&one));
        }
        Err(_) => {
            gs.machine_state.mem_extend(out_offset as i64, out_size as i64)?;
            let name = natives::native_name(address);
            for i in 0..out_size {
                let cell = gs.new_bitvec(&format!("{}_output_{}", name, i), 8);
                gs.machine_state.memory.write_byte(out_offset + i, cell)?;
            }
            let zero = BitVec::from_u64(ectx.z3(), 0, 256);
            gs.world_state.add_constraint(retval.eq(&zero));
        }
    }
    gs.machine_state.push(retval)?;
    Ok(true)
}

