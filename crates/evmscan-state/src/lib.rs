// SPDX-License-Identifier: AGPL-3.0

//! The symbolic machine and world model: accounts, storage, balances,
//! memory, stack, calldata, transactions and the global state the
//! interpreter threads through every instruction.

use num_bigint::BigUint;
use z3::ast::Ast;

mod account;
mod calldata;
mod constraints;
mod environment;
mod global;
mod machine;
mod memory;
mod transaction;
mod world;

pub use account::{Account, Storage};
pub use calldata::{Calldata, ConcreteCalldata, SymbolicCalldata};
pub use constraints::Constraints;
pub use environment::Environment;
pub use global::GlobalState;
pub use machine::{MachineState, StackItem, STACK_LIMIT};
pub use memory::Memory;
pub use transaction::{
    ContractCreationTransaction, MessageCallTransaction, ReturnData, Transaction,
    TransactionStack, TxInfo,
};
pub use world::WorldState;

use evmscan_smt::BitVec;

/// Round `n` up to the next multiple of 32, mirroring on negatives.
pub fn ceil32(n: i64) -> i64 {
    if n >= 0 {
        ceil32_positive(n)
    } else {
        -ceil32_positive(-n)
    }
}

fn ceil32_positive(n: i64) -> i64 {
    let rem = n % 32;
    if rem == 0 {
        n
    } else {
        n - rem + 32
    }
}

/// Identity of an account inside the world state.
///
/// The balances array is stored once in the world state and accounts refer
/// to it by address, so the map key must distinguish symbolic addresses
/// without evaluating them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressKey {
    Concrete(BigUint),
    Symbolic(String),
}

impl AddressKey {
    pub fn of(address: &BitVec<'_>) -> Self {
        match address.as_biguint() {
            Some(value) => AddressKey::Concrete(value),
            None => AddressKey::Symbolic(address.term().simplify().to_string()),
        }
    }

    pub fn concrete(value: u64) -> Self {
        AddressKey::Concrete(BigUint::from(value))
    }
}
