// SPDX-License-Identifier: AGPL-3.0

//! SWC-115: authorization decided by tx.origin.
//!
//! The post hook on ORIGIN taints the pushed term; the pre hook on JUMPI
//! fires when a tainted condition guards a branch and the path remains
//! feasible under realistic bounds on calldata sizes and balances.

use num_bigint::BigUint;

use evmscan_sevm::ExecContext;
use evmscan_smt::{Annotation, BitVec, SatResult};
use evmscan_state::GlobalState;
use tracing::debug;

use crate::issue::Issue;
use crate::modules::{DetectionModule, EntryPoint};
use crate::swc::{SwcData, SWC_TX_ORIGIN};

const MAX_CALLDATA_SIZE: u64 = 5000;

pub struct TxOriginAuth {
    issues: Vec<Issue>,
}

impl TxOriginAuth {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }
}

impl Default for TxOriginAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl<'ctx> DetectionModule<'ctx> for TxOriginAuth {
    fn swc(&self) -> &'static SwcData {
        &SWC_TX_ORIGIN
    }

    fn entry_point(&self) -> EntryPoint {
        EntryPoint::Callback
    }

    fn pre_hooks(&self) -> &'static [&'static str] {
        &["JUMPI"]
    }

    fn post_hooks(&self) -> &'static [&'static str] {
        &["ORIGIN"]
    }

    fn execute(&mut self, ectx: &ExecContext<'ctx>, gs: &mut GlobalState<'ctx>) {
        let Some(instruction) = gs.current_instruction().cloned() else {
            return;
        };
        if instruction.mnemonic == "JUMPI" {
            // the branch condition sits below the jump target
            let Ok(condition) = gs.machine_state.from_top(2) else {
                return;
            };
            let tainted = condition
                .annotations()
                .iter()
                .any(Annotation::is_tx_origin);
            if !tainted {
                return;
            }
            debug!("tx.origin guards a branch at {:#x}", instruction.address);
            if feasible_under_realistic_bounds(ectx, gs) {
                self.issues
                    .push(Issue::from_swc(&SWC_TX_ORIGIN, instruction.address));
            }
        } else {
            // ORIGIN post hook: taint the pushed term
            if let Ok(top) = gs.machine_state.top_mut() {
                top.annotate(Annotation::TxOrigin);
            }
        }
    }

    fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

/// The path condition plus sanity bounds: per-transaction calldata at most
/// 5000 bytes and every balance at most 10^20 wei.
fn feasible_under_realistic_bounds<'ctx>(
    ectx: &ExecContext<'ctx>,
    gs: &GlobalState<'ctx>,
) -> bool {
    let ctx = ectx.z3();
    let mut formulas = gs.world_state.constraints().to_vec();

    let max_calldata = BitVec::from_u64(ctx, MAX_CALLDATA_SIZE, 256);
    let max_balance = BitVec::from_biguint(ctx, &BigUint::from(10u8).pow(20), 256);

    for tx in &gs.world_state.transaction_sequence {
        formulas.push(max_calldata.uge(&tx.calldata().size(ctx)));
        formulas.push(max_balance.uge(&gs.world_state.balance_of(tx.caller())));
    }
    for account in gs.world_state.accounts() {
        formulas.push(max_balance.uge(&gs.world_state.balance_of(&account.address)));
    }

    let (status, _) = ectx.check(&formulas);
    status == SatResult::Sat
}
