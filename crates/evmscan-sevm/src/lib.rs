// SPDX-License-Identifier: AGPL-3.0

//! The symbolic EVM: one evaluation handler per opcode, the function
//! managers that axiomatise EXP and KECCAK, and the transaction plumbing
//! that turns CALL/CREATE into nested symbolic transactions.

mod call;
mod context;
mod exponent;
mod gas;
mod handlers;
mod instruction;
mod keccak;
mod natives;
mod outcome;
mod setup;

pub use call::{get_call_parameters, CallParameters};
pub use context::{Actors, ExecContext};
pub use exponent::ExponentFunctionManager;
pub use instruction::Instruction;
pub use keccak::KeccakFunctionManager;
pub use outcome::{finish_transaction, StepOutcome, TxEnd, TxStart};
pub use setup::{actor_world, prepare_contract_creation, prepare_message_call};
