// SPDX-License-Identifier: AGPL-3.0

//! Mnemonic-family dispatch.
//!
//! One handler per opcode; the families `PUSH*`, `DUP*`, `SWAP*` and
//! `LOG*` share a handler that reads the suffix from the mnemonic.

use evmscan_errors::{VmError, VmResult};
use evmscan_state::{GlobalState, Transaction};

use crate::context::ExecContext;
use crate::handlers;
use crate::outcome::StepOutcome;

pub type HandlerResult<'ctx> = VmResult<StepOutcome<'ctx>>;

/// A single opcode evaluation, bound to the execution context.
pub struct Instruction<'e, 'ctx> {
    mnemonic: String,
    ectx: &'e ExecContext<'ctx>,
}

impl<'e, 'ctx> Instruction<'e, 'ctx> {
    pub fn new(mnemonic: impl Into<String>, ectx: &'e ExecContext<'ctx>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            ectx,
        }
    }

    /// Evaluate the opcode against a state, producing successor states
    /// and/or a transaction signal.
    pub fn evaluate(&self, gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
        let ectx = self.ectx;
        let m = self.mnemonic.as_str();

        if m.starts_with("PUSH") {
            return handlers::stack::push(ectx, gs);
        }
        if let Some(n) = suffix_number(m, "DUP") {
            return handlers::stack::dup(ectx, gs, n);
        }
        if let Some(n) = suffix_number(m, "SWAP") {
            return handlers::stack::swap(ectx, gs, n);
        }
        if let Some(n) = suffix_number(m, "LOG") {
            return handlers::control::log(ectx, gs, n);
        }

        match m {
            "STOP" => handlers::system::stop(ectx, gs),
            "ADD" => handlers::arithmetic::add(ectx, gs),
            "MUL" => handlers::arithmetic::mul(ectx, gs),
            "SUB" => handlers::arithmetic::sub(ectx, gs),
            "DIV" => handlers::arithmetic::div(ectx, gs),
            "SDIV" => handlers::arithmetic::sdiv(ectx, gs),
            "MOD" => handlers::arithmetic::umod(ectx, gs),
            "SMOD" => handlers::arithmetic::smod(ectx, gs),
            "ADDMOD" => handlers::arithmetic::addmod(ectx, gs),
            "MULMOD" => handlers::arithmetic::mulmod(ectx, gs),
            "EXP" => handlers::arithmetic::exp(ectx, gs),
            "SIGNEXTEND" => handlers::arithmetic::signextend(ectx, gs),
            "LT" => handlers::bitwise::lt(ectx, gs),
            "GT" => handlers::bitwise::gt(ectx, gs),
            "SLT" => handlers::bitwise::slt(ectx, gs),
            "SGT" => handlers::bitwise::sgt(ectx, gs),
            "EQ" => handlers::bitwise::eq(ectx, gs),
            "ISZERO" => handlers::bitwise::iszero(ectx, gs),
            "AND" => handlers::bitwise::and(ectx, gs),
            "OR" => handlers::bitwise::or(ectx, gs),
            "XOR" => handlers::bitwise::xor(ectx, gs),
            "NOT" => handlers::bitwise::not(ectx, gs),
            "BYTE" => handlers::bitwise::byte(ectx, gs),
            "SHL" => handlers::bitwise::shl(ectx, gs),
            "SHR" => handlers::bitwise::shr(ectx, gs),
            "SAR" | "ASHR" => handlers::bitwise::ashr(ectx, gs),
            "SHA3" => handlers::environment::sha3(ectx, gs),
            "ADDRESS" => handlers::environment::address(ectx, gs),
            "BALANCE" => handlers::environment::balance(ectx, gs),
            "ORIGIN" => handlers::environment::origin(ectx, gs),
            "CALLER" => handlers::environment::caller(ectx, gs),
            "CALLVALUE" => handlers::environment::callvalue(ectx, gs),
            "CALLDATALOAD" => handlers::environment::calldataload(ectx, gs),
            "CALLDATASIZE" => handlers::environment::calldatasize(ectx, gs),
            "CALLDATACOPY" => handlers::environment::calldatacopy(ectx, gs),
            "CODESIZE" => handlers::environment::codesize(ectx, gs),
            "CODECOPY" => handlers::environment::codecopy(ectx, gs),
            "GASPRICE" => handlers::environment::gasprice(ectx, gs),
            "EXTCODESIZE" => handlers::environment::extcodesize(ectx, gs),
            "EXTCODECOPY" => handlers::environment::extcodecopy(ectx, gs),
            "EXTCODEHASH" => handlers::environment::extcodehash(ectx, gs),
            "RETURNDATASIZE" => handlers::environment::returndatasize(ectx, gs),
            "RETURNDATACOPY" => handlers::environment::returndatacopy(ectx, gs),
            "BLOCKHASH" => handlers::environment::blockhash(ectx, gs),
            "COINBASE" => handlers::environment::coinbase(ectx, gs),
            "TIMESTAMP" => handlers::environment::timestamp(ectx, gs),
            "NUMBER" => handlers::environment::number(ectx, gs),
            "DIFFICULTY" => handlers::environment::difficulty(ectx, gs),
            "GASLIMIT" => handlers::environment::gaslimit(ectx, gs),
            "CHAINID" => handlers::environment::chainid(ectx, gs),
            "SELFBALANCE" => handlers::environment::selfbalance(ectx, gs),
            "BASEFEE" => handlers::environment::basefee(ectx, gs),
            "POP" => handlers::stack::pop(ectx, gs),
            "MLOAD" => handlers::memory_ops::mload(ectx, gs),
            "MSTORE" => handlers::memory_ops::mstore(ectx, gs),
            "MSTORE8" => handlers::memory_ops::mstore8(ectx, gs),
            "SLOAD" => handlers::memory_ops::sload(ectx, gs),
            "SSTORE" => handlers::memory_ops::sstore(ectx, gs),
            "JUMP" => handlers::control::jump(ectx, gs),
            "JUMPI" => handlers::control::jumpi(ectx, gs),
            "JUMPDEST" => handlers::stack::jumpdest(ectx, gs),
            "BEGINSUB" => handlers::control::beginsub(ectx, gs),
            "JUMPSUB" => handlers::control::jumpsub(ectx, gs),
            "RETURNSUB" => handlers::control::returnsub(ectx, gs),
            "PC" => handlers::stack::pc(ectx, gs),
            "MSIZE" => handlers::stack::msize(ectx, gs),
            "GAS" => handlers::stack::gas(ectx, gs),
            "CREATE" => handlers::system::create(ectx, gs),
            "CREATE2" => handlers::system::create2(ectx, gs),
            "CALL" => handlers::system::call(ectx, gs),
            "CALLCODE" => handlers::system::callcode(ectx, gs),
            "DELEGATECALL" => handlers::system::delegatecall(ectx, gs),
            "STATICCALL" => handlers::system::staticcall(ectx, gs),
            "RETURN" => handlers::system::ret(ectx, gs),
            "REVERT" => handlers::system::revert(ectx, gs),
            "SELFDESTRUCT" => handlers::system::selfdestruct(ectx, gs),
            "INVALID" | "ASSERTFAIL" => Err(VmError::InvalidInstruction),
            other => Err(VmError::UnknownOpcode(other.to_string())),
        }
    }

    /// Resume the parent frame after a nested transaction ended: the
    /// synthetic `{opcode}Post` handler of the originating opcode.
    pub fn evaluate_post(
        &self,
        gs: GlobalState<'ctx>,
        ended_tx: &Transaction<'ctx>,
        reverted: bool,
    ) -> HandlerResult<'ctx> {
        match self.mnemonic.as_str() {
            "CALL" | "CALLCODE" => handlers::post::call_family_post(self.ectx, gs, true, reverted),
            "DELEGATECALL" | "STATICCALL" => {
                handlers::post::call_family_post(self.ectx, gs, false, reverted)
            }
            "CREATE" => handlers::post::create_post(self.ectx, gs, 3, ended_tx, reverted),
            "CREATE2" => handlers::post::create_post(self.ectx, gs, 4, ended_tx, reverted),
            other => Err(VmError::UnknownOpcode(format!("{}Post", other))),
        }
    }
}

fn suffix_number(mnemonic: &str, prefix: &str) -> Option<usize> {
    mnemonic.strip_prefix(prefix).and_then(|n| n.parse().ok())
}

// Shared handler plumbing.

/// Charge the current instruction's min/max gas and enforce both the
/// machine budget and the transaction gas limit.
pub(crate) fn charge_gas<'ctx>(gs: &mut GlobalState<'ctx>) -> VmResult<()> {
    let (gas_min, gas_max) = match gs.current_instruction() {
        Some(instruction) => (instruction.gas_min, instruction.gas_max),
        None => (0, 0),
    };
    gs.machine_state.add_gas(gas_min, gas_max);
    check_gas_limit(gs)
}

pub(crate) fn check_gas_limit<'ctx>(gs: &GlobalState<'ctx>) -> VmResult<()> {
    gs.machine_state.check_gas()?;
    let frame = gs
        .current_transaction()
        .ok_or(VmError::NoActiveTransaction)?;
    if let Some(limit) = frame.tx.gas_limit().as_u64() {
        if limit as i64 <= gs.machine_state.gas_used_min() {
            return Err(VmError::OutOfGas);
        }
    }
    Ok(())
}

/// The common epilogue: charge gas, advance the pc, continue with one
/// successor.
pub(crate) fn step<'ctx>(gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let mut gs = gs;
    charge_gas(&mut gs)?;
    gs.machine_state.advance();
    Ok(StepOutcome::Continue(vec![gs]))
}
