// SPDX-License-Identifier: AGPL-3.0

//! The execution environment of one call frame.

use evmscan_disasm::Disassembly;
use evmscan_smt::BitVec;

use crate::calldata::Calldata;

/// Frame-local context derived from the active transaction.
///
/// The active account is referenced by address; its mutable state lives in
/// the world state so that storage writes are visible to later frames.
#[derive(Debug, Clone)]
pub struct Environment<'ctx> {
    pub active_account: BitVec<'ctx>,
    pub sender: BitVec<'ctx>,
    pub gas_price: BitVec<'ctx>,
    pub call_value: BitVec<'ctx>,
    pub origin: BitVec<'ctx>,
    pub base_fee: BitVec<'ctx>,
    pub block_number: BitVec<'ctx>,
    pub chain_id: BitVec<'ctx>,
    pub calldata: Calldata<'ctx>,
    pub code: Disassembly,
    pub static_flag: bool,
    pub active_function: String,
}
