// SPDX-License-Identifier: AGPL-3.0

//! SWC-106: SELFDESTRUCT reachable by an arbitrary external caller.
//!
//! Builds an "attacker caused every call" condition over the recorded
//! transaction sequence and asks whether the destruct point stays
//! reachable, first with the attacker also receiving the funds, then
//! without.

use evmscan_sevm::ExecContext;
use evmscan_smt::{Bool, SatResult};
use evmscan_state::GlobalState;
use tracing::debug;

use crate::issue::Issue;
use crate::modules::{DetectionModule, EntryPoint};
use crate::swc::{SwcData, SWC_UNPROTECTED_SELFDESTRUCT};

pub struct AccidentallyKillable {
    issues: Vec<Issue>,
}

impl AccidentallyKillable {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }
}

impl Default for AccidentallyKillable {
    fn default() -> Self {
        Self::new()
    }
}

impl<'ctx> DetectionModule<'ctx> for AccidentallyKillable {
    fn swc(&self) -> &'static SwcData {
        &SWC_UNPROTECTED_SELFDESTRUCT
    }

    fn entry_point(&self) -> EntryPoint {
        EntryPoint::Callback
    }

    fn pre_hooks(&self) -> &'static [&'static str] {
        &["SELFDESTRUCT"]
    }

    fn post_hooks(&self) -> &'static [&'static str] {
        &[]
    }

    fn execute(&mut self, ectx: &ExecContext<'ctx>, gs: &mut GlobalState<'ctx>) {
        let Ok(top) = gs.machine_state.top() else {
            return;
        };
        let beneficiary = top.as_bitvec();
        let Some(instruction) = gs.current_instruction() else {
            return;
        };
        let attacker = &ectx.actors.attacker;

        // every prior message call was sent directly by the attacker
        let mut attacker_constraints: Vec<Bool<'ctx>> = Vec::new();
        for tx in &gs.world_state.transaction_sequence {
            if tx.is_creation() {
                continue;
            }
            let caller_is_attacker = attacker.eq(tx.caller());
            let direct_call = tx.caller().eq(tx.origin());
            attacker_constraints.push(caller_is_attacker.and(&direct_call));
        }

        let mut formulas = gs.world_state.constraints().to_vec();
        formulas.extend(attacker_constraints.iter().cloned());

        // strongest finding: the attacker also collects the balance
        let mut with_payout = formulas.clone();
        with_payout.push(attacker.eq(&beneficiary.pad_to_size(256)));
        let (status, _) = ectx.check(&with_payout);
        if status == SatResult::Sat {
            debug!("attacker-triggered selfdestruct pays the attacker");
            self.issues.push(Issue::from_swc(
                &SWC_UNPROTECTED_SELFDESTRUCT,
                instruction.address,
            ));
            return;
        }

        let (status, _) = ectx.check(&formulas);
        if status == SatResult::Sat {
            debug!("attacker-triggered selfdestruct is reachable");
            self.issues.push(Issue::from_swc(
                &SWC_UNPROTECTED_SELFDESTRUCT,
                instruction.address,
            ));
        }
    }

    fn issues(&self) -> &[Issue] {
        &self.issues
    }
}
