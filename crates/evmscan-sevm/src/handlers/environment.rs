// SPDX-License-Identifier: AGPL-3.0

//! Environment queries, calldata/code movement and hashing.

use evmscan_errors::{VmError, VmResult};
use evmscan_smt::BitVec;
use evmscan_state::{AddressKey, Calldata, GlobalState};
use tracing::{debug, info};

use crate::context::ExecContext;
use crate::gas::sha3_gas;
use crate::instruction::{check_gas_limit, step, HandlerResult};

/// Fallback copy width when a copy size is symbolic.
const SYMBOLIC_COPY_SIZE: i64 = 320;

pub(crate) fn address<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let address = gs.environment.active_account.clone();
    gs.machine_state.push(address)?;
    step(gs)
}

/// BALANCE over a symbolic address becomes an ite chain over every account
/// this world knows, defaulting to zero.
pub(crate) fn balance<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let address = gs.machine_state.pop_bitvec()?;
    let balance = if address.is_symbolic() {
        let mut chain = BitVec::from_u64(ectx.z3(), 0, 256);
        let world = &gs.world_state;
        for account in world.accounts() {
            let account_balance = world.balance_of(&account.address);
            let matches = account.address.eq(&address);
            chain = BitVec::ite(&matches, &account_balance, &chain);
        }
        chain
    } else {
        gs.world_state.existing_or_load(&address);
        gs.world_state.balance_of(&address)
    };
    gs.machine_state.push(balance)?;
    step(gs)
}

pub(crate) fn origin<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let origin = gs.environment.origin.clone();
    gs.machine_state.push(origin)?;
    step(gs)
}

pub(crate) fn caller<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let sender = gs.environment.sender.clone();
    gs.machine_state.push(sender)?;
    step(gs)
}

pub(crate) fn callvalue<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let value = gs.environment.call_value.clone();
    gs.machine_state.push(value)?;
    step(gs)
}

pub(crate) fn calldataload<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let offset = gs.machine_state.pop_bitvec()?;
    let word = gs.environment.calldata.word_at(ectx.z3(), &offset)?;
    gs.machine_state.push(word)?;
    step(gs)
}

pub(crate) fn calldatasize<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let size = gs.environment.calldata.size(ectx.z3());
    gs.machine_state.push(size)?;
    step(gs)
}

pub(crate) fn calldatacopy<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let mem_offset = gs.machine_state.pop_bitvec()?;
    let data_offset = gs.machine_state.pop_bitvec()?;
    let size = gs.machine_state.pop_bitvec()?;

    let in_creation = gs
        .current_transaction()
        .map(|frame| frame.tx.is_creation())
        .unwrap_or(false);
    if in_creation {
        info!("CALLDATACOPY inside a creation transaction is unsupported");
        return step(gs);
    }
    calldata_copy_helper(ectx, &mut gs, &mem_offset, &data_offset, &size)?;
    step(gs)
}

pub(crate) fn calldata_copy_helper<'ctx>(
    ectx: &ExecContext<'ctx>,
    gs: &mut GlobalState<'ctx>,
    mem_offset: &BitVec<'ctx>,
    data_offset: &BitVec<'ctx>,
    size: &BitVec<'ctx>,
) -> VmResult<()> {
    let Some(mem_offset) = mem_offset.as_u64() else {
        info!("symbolic memory offset in CALLDATACOPY is unsupported");
        return Ok(());
    };
    if data_offset.is_symbolic() {
        info!("symbolic calldata offset in CALLDATACOPY is unsupported");
        return Ok(());
    }
    let size = match size.as_u64() {
        Some(s) => s as i64,
        None => {
            info!("symbolic size in CALLDATACOPY is unsupported, copying a bounded window");
            SYMBOLIC_COPY_SIZE
        }
    };

    gs.machine_state.mem_extend(mem_offset as i64, size)?;
    let calldata = gs.environment.calldata.clone();
    for i in 0..size as u64 {
        let byte = calldata
            .byte_at(ectx.z3(), &data_offset.add_u64(i))
            .unwrap_or_else(|_| BitVec::from_u64(ectx.z3(), 0, 8));
        gs.machine_state.memory.write_byte(mem_offset + i, byte)?;
    }
    Ok(())
}

/// Inside a creation frame CODESIZE covers code plus constructor
/// arguments; a symbolic calldata size gets pinned to code + 16.
pub(crate) fn codesize<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let code_len = (gs.environment.code.bytecode().len() / 2) as i64;
    let in_creation = gs
        .current_transaction()
        .map(|frame| frame.tx.is_creation())
        .unwrap_or(false);

    let mut size = code_len;
    if in_creation {
        match &gs.environment.calldata {
            Calldata::Concrete(_) => {
                size += gs
                    .environment
                    .calldata
                    .size(ectx.z3())
                    .as_u64()
                    .unwrap_or(0) as i64;
            }
            Calldata::Symbolic(_) => {
                size += 16;
                let pinned = BitVec::from_u64(ectx.z3(), size as u64, 256);
                let constraint = gs.environment.calldata.size(ectx.z3()).eq(&pinned);
                gs.world_state.add_constraint(constraint);
            }
        }
    }
    gs.machine_state
        .push(BitVec::from_u64(ectx.z3(), size as u64, 256))?;
    step(gs)
}

pub(crate) fn codecopy<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let mem_offset = gs.machine_state.pop_bitvec()?;
    let code_offset = gs.machine_state.pop_bitvec()?;
    let size = gs.machine_state.pop_bitvec()?;

    let code = gs.environment.code.bytecode().to_string();
    let in_creation = gs
        .current_transaction()
        .map(|frame| frame.tx.is_creation())
        .unwrap_or(false);

    if !in_creation {
        code_copy_helper(ectx, &mut gs, &code, "CODECOPY", &mem_offset, &code_offset, &size)?;
        return step(gs);
    }

    // Creation frame: reads past the end of the code reach into the
    // constructor arguments appended after it.
    let code_len = (code.len() / 2) as i64;
    let symbolic_calldata = matches!(gs.environment.calldata, Calldata::Symbolic(_));
    match (symbolic_calldata, code_offset.as_u64(), size.as_u64()) {
        (true, Some(offset), Some(concrete_size)) if offset as i64 > concrete_size as i64 => {
            calldata_copy_helper(ectx, &mut gs, &mem_offset, &code_offset, &size)?;
        }
        (false, Some(offset), Some(concrete_size)) => {
            let offset = offset as i64;
            let concrete_size = concrete_size as i64;
            let code_copy_size = if offset + concrete_size <= code_len {
                concrete_size
            } else {
                (code_len - offset).max(0)
            };
            let calldata_offset = (offset - code_len).max(0);
            let calldata_size = (offset + concrete_size - code_len).max(0);

            code_copy_helper(ectx, &mut gs, &code, "CODECOPY", &mem_offset, &code_offset, &size)?;
            if calldata_size > 0 {
                let shifted_mem = mem_offset.add_u64(code_copy_size as u64);
                calldata_copy_helper(
                    ectx,
                    &mut gs,
                    &shifted_mem,
                    &BitVec::from_u64(ectx.z3(), calldata_offset as u64, 256),
                    &BitVec::from_u64(ectx.z3(), calldata_size as u64, 256),
                )?;
            }
        }
        _ => {
            code_copy_helper(ectx, &mut gs, &code, "CODECOPY", &mem_offset, &code_offset, &size)?;
        }
    }
    step(gs)
}

/// Copy `size` code bytes into memory. Symbolic dimensions degrade to
/// fresh symbolic cells rather than killing the path.
pub(crate) fn code_copy_helper<'ctx>(
    ectx: &ExecContext<'ctx>,
    gs: &mut GlobalState<'ctx>,
    code: &str,
    opcode: &str,
    mem_offset: &BitVec<'ctx>,
    code_offset: &BitVec<'ctx>,
    size: &BitVec<'ctx>,
) -> VmResult<()> {
    let Some(mem_offset) = mem_offset.as_u64() else {
        info!("symbolic memory offset in {} is unsupported", opcode);
        return Ok(());
    };
    let contract_name = gs
        .active_account()
        .map(|account| account.contract_name.clone())
        .unwrap_or_default();

    let Some(size) = size.as_u64() else {
        gs.machine_state.mem_extend(mem_offset as i64, 1)?;
        let cell = gs.new_bitvec(&format!("code({})", contract_name), 8);
        gs.machine_state.memory.write_byte(mem_offset, cell)?;
        return Ok(());
    };

    let Some(code_offset) = code_offset.as_u64() else {
        info!("symbolic code offset in {} is unsupported", opcode);
        gs.machine_state.mem_extend(mem_offset as i64, size as i64)?;
        for i in 0..size {
            let cell = gs.new_bitvec(&format!("code({})", contract_name), 8);
            gs.machine_state.memory.write_byte(mem_offset + i, cell)?;
        }
        return Ok(());
    };

    let code_bytes = hex::decode(code.trim_start_matches("0x"))
        .map_err(|e| VmError::Unsupported(format!("undecodable code: {}", e)))?;
    gs.machine_state.mem_extend(mem_offset as i64, size as i64)?;
    for i in 0..size {
        let source = code_offset as usize + i as usize;
        if source >= code_bytes.len() {
            debug!("{} read past the end of code", opcode);
            break;
        }
        let byte = BitVec::from_u64(ectx.z3(), code_bytes[source] as u64, 8);
        gs.machine_state.memory.write_byte(mem_offset + i, byte)?;
    }
    Ok(())
}

pub(crate) fn gasprice<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let price = gs.environment.gas_price.clone();
    gs.machine_state.push(price)?;
    step(gs)
}

pub(crate) fn extcodesize<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let address = gs.machine_state.pop_bitvec()?;
    if address.is_symbolic() {
        info!("symbolic address in EXTCODESIZE is unsupported");
        let fallback = gs.new_bitvec("extcodesize", 256);
        gs.machine_state.push(fallback)?;
        return step(gs);
    }
    let size = (gs.world_state.existing_or_load(&address).code.bytecode().len() / 2) as u64;
    gs.machine_state
        .push(BitVec::from_u64(ectx.z3(), size, 256))?;
    step(gs)
}

pub(crate) fn extcodecopy<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let address = gs.machine_state.pop_bitvec()?;
    let mem_offset = gs.machine_state.pop_bitvec()?;
    let code_offset = gs.machine_state.pop_bitvec()?;
    let size = gs.machine_state.pop_bitvec()?;

    if address.is_symbolic() {
        info!("symbolic address in EXTCODECOPY is unsupported");
        return step(gs);
    }
    let bytecode = gs
        .world_state
        .existing_or_load(&address)
        .code
        .bytecode()
        .to_string();
    code_copy_helper(ectx, &mut gs, &bytecode, "EXTCODECOPY", &mem_offset, &code_offset, &size)?;
    step(gs)
}

/// Hash of the callee's code; zero for an account this world has never
/// seen, the empty-code hash for a symbolic address.
pub(crate) fn extcodehash<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op = gs.machine_state.pop_bitvec()?;
    let address = op.extract(159, 0);

    let hash = if address.is_symbolic() {
        let empty = evmscan_hashes::keccak256(&[]);
        BitVec::from_bytes(ectx.z3(), &empty, 256)
    } else if gs.world_state.account(&AddressKey::of(&address)).is_none() {
        BitVec::from_u64(ectx.z3(), 0, 256)
    } else {
        let bytecode = gs
            .world_state
            .account(&AddressKey::of(&address))
            .map(|account| account.code.bytecode().to_string())
            .unwrap_or_default();
        let digest = evmscan_hashes::keccak256_of_hex(&bytecode)
            .map_err(|e| VmError::Unsupported(format!("undecodable code: {}", e)))?;
        BitVec::from_bytes(ectx.z3(), &digest, 256)
    };
    gs.machine_state.push(hash)?;
    step(gs)
}

pub(crate) fn returndatasize<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let size = match &gs.last_return_data {
        Some(data) => data.size.clone(),
        None => BitVec::from_u64(ectx.z3(), 0, 256),
    };
    gs.machine_state.push(size)?;
    step(gs)
}

pub(crate) fn returndatacopy<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let mem_offset = gs.machine_state.pop_bitvec()?;
    let return_offset = gs.machine_state.pop_bitvec()?;
    let size = gs.machine_state.pop_bitvec()?;

    let (Some(mem_offset), Some(return_offset), Some(size)) =
        (mem_offset.as_u64(), return_offset.as_u64(), size.as_u64())
    else {
        info!("symbolic operand in RETURNDATACOPY is unsupported");
        return step(gs);
    };
    let Some(return_data) = gs.last_return_data.clone() else {
        return step(gs);
    };

    gs.machine_state.mem_extend(mem_offset as i64, size as i64)?;
    let zero = BitVec::from_u64(ectx.z3(), 0, 8);
    for i in 0..size {
        let byte = return_data
            .data
            .get((return_offset + i) as usize)
            .cloned()
            .unwrap_or_else(|| zero.clone());
        gs.machine_state.memory.write_byte(mem_offset + i, byte)?;
    }
    step(gs)
}

pub(crate) fn blockhash<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let number = gs.machine_state.pop_bitvec()?;
    let name = match number.as_u64() {
        Some(n) => format!("blockhash_block_{}", n),
        None => "blockhash_block_symbolic".to_string(),
    };
    let hash = gs.new_bitvec(&name, 256);
    gs.machine_state.push(hash)?;
    step(gs)
}

pub(crate) fn coinbase<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let coinbase = gs.new_bitvec("coinbase", 256);
    gs.machine_state.push(coinbase)?;
    step(gs)
}

pub(crate) fn timestamp<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let timestamp = gs.new_bitvec("timestamp", 256);
    gs.machine_state.push(timestamp)?;
    step(gs)
}

pub(crate) fn number<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let number = gs.environment.block_number.clone();
    gs.machine_state.push(number)?;
    step(gs)
}

pub(crate) fn difficulty<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let difficulty = gs.new_bitvec("block_difficulty", 256);
    gs.machine_state.push(difficulty)?;
    step(gs)
}

pub(crate) fn gaslimit<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let limit = gs.machine_state.gas_limit();
    gs.machine_state
        .push(BitVec::from_u64(ectx.z3(), limit as u64, 256))?;
    step(gs)
}

pub(crate) fn chainid<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let chain_id = gs.environment.chain_id.clone();
    gs.machine_state.push(chain_id)?;
    step(gs)
}

pub(crate) fn selfbalance<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let balance = gs.world_state.balance_of(&gs.environment.active_account);
    gs.machine_state.push(balance)?;
    step(gs)
}

pub(crate) fn basefee<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let base_fee = gs.environment.base_fee.clone();
    gs.machine_state.push(base_fee)?;
    step(gs)
}

/// KECCAK256 over a memory range. A symbolic length is pinned to 64 bytes,
/// the common case of hashing a (key, slot) pair.
pub(crate) fn sha3<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let index = gs.machine_state.pop_bitvec()?;
    let length_bv = gs.machine_state.pop_bitvec()?;

    let length = match length_bv.as_u64() {
        Some(l) => l as i64,
        None => {
            let pinned = BitVec::from_u64(ectx.z3(), 64, 256);
            gs.world_state.add_constraint(length_bv.eq(&pinned));
            64
        }
    };
    let index = index
        .as_u64()
        .ok_or_else(|| VmError::Unsupported("symbolic offset in SHA3".to_string()))?;

    let (gas_min, gas_max) = sha3_gas(length);
    gs.machine_state.add_gas(gas_min, gas_max);
    check_gas_limit(&gs)?;
    gs.machine_state.mem_extend(index as i64, length)?;

    let hash = if length == 0 {
        ectx.keccak.empty_keccak_hash()
    } else {
        let mut data = gs.machine_state.memory.read_byte(ectx.z3(), index);
        for i in 1..length as u64 {
            data = data.concat(&gs.machine_state.memory.read_byte(ectx.z3(), index + i));
        }
        ectx.keccak.create_keccak(&data)
    };
    gs.machine_state.push(hash)?;
    step(gs)
}
