// SPDX-License-Identifier: AGPL-3.0

//! The result protocol between opcode handlers and the driver.

use evmscan_errors::{VmError, VmResult};
use evmscan_state::{GlobalState, ReturnData, Transaction};

/// What one evaluation step produced.
///
/// A state that started or ended a transaction is not a live successor:
/// the driver builds the child frame, or unwinds into the suspended caller.
#[derive(Debug)]
pub enum StepOutcome<'ctx> {
    /// Zero or more successor states continuing in the same frame.
    Continue(Vec<GlobalState<'ctx>>),
    /// A nested transaction begins; the caller is suspended as of before
    /// the originating opcode consumed its operands.
    TxStart(Box<TxStart<'ctx>>),
    /// The current transaction ended.
    TxEnd(Box<TxEnd<'ctx>>),
    /// The path died; the reason is logged and exploration continues.
    Dropped(VmError),
}

#[derive(Debug)]
pub struct TxStart<'ctx> {
    pub caller_state: GlobalState<'ctx>,
    pub tx: Transaction<'ctx>,
    pub opcode: &'static str,
}

#[derive(Debug)]
pub struct TxEnd<'ctx> {
    pub global_state: GlobalState<'ctx>,
    pub revert: bool,
    pub return_data: Option<ReturnData<'ctx>>,
}

/// Retire the current transaction.
///
/// Message calls record their concrete return bytes on the transaction.
/// Contract creations promote the returned runtime code into the callee
/// account and record the deployed address instead.
pub fn finish_transaction<'ctx>(
    mut gs: GlobalState<'ctx>,
    return_data: Option<ReturnData<'ctx>>,
    revert: bool,
) -> VmResult<StepOutcome<'ctx>> {
    let frame = gs
        .current_transaction()
        .cloned()
        .ok_or(VmError::NoActiveTransaction)?;

    let empty = match &return_data {
        None => true,
        Some(data) => data.size.as_u64() == Some(0),
    };

    if empty {
        frame.tx.set_return_data(String::new());
        return Ok(StepOutcome::TxEnd(Box::new(TxEnd {
            global_state: gs,
            revert,
            return_data: None,
        })));
    }
    let data = return_data.expect("checked non-empty above");

    if frame.tx.is_creation() {
        let runtime_code = hex::encode(data.concrete_bytes());
        let address = gs.environment.active_account.clone();
        let account = gs.world_state.existing_or_load(&address);
        account
            .code
            .assign_bytecode(&runtime_code)
            .map_err(|e| VmError::Unsupported(format!("returned runtime code: {}", e)))?;
        frame.tx.set_return_data(address.hex_string());
    } else {
        frame.tx.set_return_data(hex::encode(data.concrete_bytes()));
    }

    Ok(StepOutcome::TxEnd(Box::new(TxEnd {
        global_state: gs,
        revert,
        return_data: Some(data),
    })))
}
