// SPDX-License-Identifier: AGPL-3.0

//! Transactions and the per-state transaction stack.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use evmscan_disasm::Disassembly;
use evmscan_smt::BitVec;

use crate::account::Account;
use crate::calldata::Calldata;
use crate::environment::Environment;
use crate::global::GlobalState;
use crate::machine::MachineState;
use crate::world::WorldState;

/// Gas ceiling of the abstract machine driving a transaction.
pub const MACHINE_GAS_LIMIT: i64 = 1_000_000_000;

/// Data returned by a frame via RETURN or REVERT.
#[derive(Debug, Clone)]
pub struct ReturnData<'ctx> {
    pub data: Vec<BitVec<'ctx>>,
    pub size: BitVec<'ctx>,
}

impl<'ctx> ReturnData<'ctx> {
    /// Best-effort concrete rendering; symbolic bytes come out as zero.
    pub fn concrete_bytes(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|b| b.as_u64().unwrap_or(0) as u8)
            .collect()
    }
}

#[derive(Debug)]
pub struct MessageCallTransaction<'ctx> {
    pub world_state: WorldState<'ctx>,
    pub callee_account: Account<'ctx>,
    pub caller: BitVec<'ctx>,
    pub calldata: Calldata<'ctx>,
    pub id: String,
    pub gas_price: BitVec<'ctx>,
    pub gas_limit: BitVec<'ctx>,
    pub origin: BitVec<'ctx>,
    pub code: Disassembly,
    pub call_value: BitVec<'ctx>,
    pub static_flag: bool,
    pub return_data: RefCell<String>,
}

#[derive(Debug)]
pub struct ContractCreationTransaction<'ctx> {
    pub prev_world_state: WorldState<'ctx>,
    pub world_state: WorldState<'ctx>,
    pub callee_account: Account<'ctx>,
    pub code: Disassembly,
    pub calldata: Calldata<'ctx>,
    pub caller: BitVec<'ctx>,
    pub gas_price: BitVec<'ctx>,
    pub gas_limit: BitVec<'ctx>,
    pub origin: BitVec<'ctx>,
    pub call_value: BitVec<'ctx>,
    pub contract_name: String,
    pub id: String,
    pub return_data: RefCell<String>,
}

/// A message call or a contract creation.
#[derive(Debug)]
pub enum Transaction<'ctx> {
    MessageCall(MessageCallTransaction<'ctx>),
    ContractCreation(ContractCreationTransaction<'ctx>),
}

impl<'ctx> Transaction<'ctx> {
    pub fn id(&self) -> &str {
        match self {
            Transaction::MessageCall(tx) => &tx.id,
            Transaction::ContractCreation(tx) => &tx.id,
        }
    }

    pub fn caller(&self) -> &BitVec<'ctx> {
        match self {
            Transaction::MessageCall(tx) => &tx.caller,
            Transaction::ContractCreation(tx) => &tx.caller,
        }
    }

    pub fn origin(&self) -> &BitVec<'ctx> {
        match self {
            Transaction::MessageCall(tx) => &tx.origin,
            Transaction::ContractCreation(tx) => &tx.origin,
        }
    }

    pub fn gas_limit(&self) -> &BitVec<'ctx> {
        match self {
            Transaction::MessageCall(tx) => &tx.gas_limit,
            Transaction::ContractCreation(tx) => &tx.gas_limit,
        }
    }

    pub fn calldata(&self) -> &Calldata<'ctx> {
        match self {
            Transaction::MessageCall(tx) => &tx.calldata,
            Transaction::ContractCreation(tx) => &tx.calldata,
        }
    }

    pub fn callee_account(&self) -> &Account<'ctx> {
        match self {
            Transaction::MessageCall(tx) => &tx.callee_account,
            Transaction::ContractCreation(tx) => &tx.callee_account,
        }
    }

    pub fn is_creation(&self) -> bool {
        matches!(self, Transaction::ContractCreation(_))
    }

    pub fn return_data(&self) -> String {
        match self {
            Transaction::MessageCall(tx) => tx.return_data.borrow().clone(),
            Transaction::ContractCreation(tx) => tx.return_data.borrow().clone(),
        }
    }

    pub fn set_return_data(&self, data: String) {
        match self {
            Transaction::MessageCall(tx) => *tx.return_data.borrow_mut() = data,
            Transaction::ContractCreation(tx) => *tx.return_data.borrow_mut() = data,
        }
    }

    /// Build the initial global state of this transaction: derive the
    /// environment and perform the value transfer, constraining the caller
    /// balance to cover it.
    pub fn initial_global_state(&self) -> GlobalState<'ctx> {
        match self {
            Transaction::MessageCall(tx) => {
                let environment = Environment {
                    active_account: tx.callee_account.address.clone(),
                    sender: tx.caller.clone(),
                    gas_price: tx.gas_price.clone(),
                    call_value: tx.call_value.clone(),
                    origin: tx.origin.clone(),
                    base_fee: fresh(&tx.world_state, "basefee", &tx.id),
                    block_number: fresh(&tx.world_state, "block_number", &tx.id),
                    chain_id: fresh(&tx.world_state, "chain_id", &tx.id),
                    calldata: tx.calldata.clone(),
                    code: tx.code.clone(),
                    static_flag: tx.static_flag,
                    active_function: "fallback".to_string(),
                };
                setup_global_state(
                    tx.world_state.clone(),
                    &tx.callee_account,
                    environment,
                    &tx.call_value,
                )
            }
            Transaction::ContractCreation(tx) => {
                let environment = Environment {
                    active_account: tx.callee_account.address.clone(),
                    sender: tx.caller.clone(),
                    gas_price: tx.gas_price.clone(),
                    call_value: tx.call_value.clone(),
                    origin: tx.origin.clone(),
                    base_fee: fresh(&tx.world_state, "basefee", &tx.id),
                    block_number: fresh(&tx.world_state, "block_number", &tx.id),
                    chain_id: fresh(&tx.world_state, "chain_id", &tx.id),
                    calldata: tx.calldata.clone(),
                    code: tx.code.clone(),
                    static_flag: false,
                    active_function: "constructor".to_string(),
                };
                setup_global_state(
                    tx.world_state.clone(),
                    &tx.callee_account,
                    environment,
                    &tx.call_value,
                )
            }
        }
    }
}

impl<'ctx> fmt::Display for Transaction<'ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_creation() {
            "ContractCreationTransaction"
        } else {
            "MessageCallTransaction"
        };
        let caller = match self.caller().name() {
            Some(name) => name.to_string(),
            None => self.caller().hex_string(),
        };
        write!(
            f,
            "{} {} from {} to {}",
            kind,
            self.id(),
            caller,
            self.callee_account().address.hex_string()
        )
    }
}

fn fresh<'ctx>(world: &WorldState<'ctx>, name: &str, id: &str) -> BitVec<'ctx> {
    BitVec::new_const(world.z3(), &format!("{}_{}", name, id), 256)
}

fn setup_global_state<'ctx>(
    mut world_state: WorldState<'ctx>,
    callee: &Account<'ctx>,
    environment: Environment<'ctx>,
    call_value: &BitVec<'ctx>,
) -> GlobalState<'ctx> {
    world_state.put_account(callee.clone());

    let sender = environment.sender.clone();
    let receiver = environment.active_account.clone();

    let sender_balance = world_state.balance_of(&sender);
    world_state.add_constraint(sender_balance.uge(call_value));
    let receiver_balance = world_state.balance_of(&receiver);
    world_state.set_balance(&sender, &sender_balance.sub(call_value));
    world_state.set_balance(&receiver, &receiver_balance.add(call_value));

    GlobalState::new(world_state, environment, MachineState::new(MACHINE_GAS_LIMIT))
}

/// One suspended frame: the caller's state as of before the originating
/// call opcode consumed its operands, plus the transaction it started.
#[derive(Debug, Clone)]
pub struct TxInfo<'ctx> {
    pub caller_state: Option<Box<GlobalState<'ctx>>>,
    pub tx: Rc<Transaction<'ctx>>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionStack<'ctx> {
    frames: Vec<TxInfo<'ctx>>,
}

impl<'ctx> TransactionStack<'ctx> {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: TxInfo<'ctx>) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<TxInfo<'ctx>> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&TxInfo<'ctx>> {
        self.frames.last()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::{Config, Context};

    #[test]
    fn initial_state_transfers_value() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut world = WorldState::new(&ctx);
        let caller = BitVec::from_u64(&ctx, 9999, 256);
        world.create_account(100, Some(caller.clone()), false, None, None, 0);
        let callee_address = BitVec::from_u64(&ctx, 0x65, 256);
        world.create_account(0, Some(callee_address.clone()), true, None, None, 0);

        let callee = world
            .account(&crate::AddressKey::of(&callee_address))
            .unwrap()
            .clone();

        let tx = Transaction::MessageCall(MessageCallTransaction {
            world_state: world,
            callee_account: callee,
            caller: caller.clone(),
            calldata: Calldata::concrete(&ctx, "1", vec![]),
            id: "1".to_string(),
            gas_price: BitVec::from_u64(&ctx, 1, 256),
            gas_limit: BitVec::from_u64(&ctx, 8_000_000, 256),
            origin: caller.clone(),
            code: Disassembly::new("6001600101"),
            call_value: BitVec::from_u64(&ctx, 40, 256),
            static_flag: false,
            return_data: RefCell::new(String::new()),
        });

        let state = tx.initial_global_state();
        assert_eq!(state.world_state.balance_of(&caller).as_u64(), Some(60));
        assert_eq!(
            state.world_state.balance_of(&callee_address).as_u64(),
            Some(40)
        );
        // the transfer left a solvency constraint behind
        assert_eq!(state.world_state.constraints().len(), 1);
        assert_eq!(state.environment.active_function, "fallback");
    }
}
