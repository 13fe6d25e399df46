// SPDX-License-Identifier: AGPL-3.0

//! SWC-127: a jump whose target the attacker can steer.
//!
//! Fires when the value about to be consumed by JUMP/JUMPI is symbolic and
//! the path condition admits at least two distinct targets.

use evmscan_sevm::ExecContext;
use evmscan_smt::{BitVec, SatResult};
use evmscan_state::GlobalState;
use tracing::debug;

use crate::issue::Issue;
use crate::modules::{DetectionModule, EntryPoint};
use crate::swc::{SwcData, SWC_ARBITRARY_JUMP};

pub struct ArbitraryJump {
    issues: Vec<Issue>,
}

impl ArbitraryJump {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }
}

impl Default for ArbitraryJump {
    fn default() -> Self {
        Self::new()
    }
}

impl<'ctx> DetectionModule<'ctx> for ArbitraryJump {
    fn swc(&self) -> &'static SwcData {
        &SWC_ARBITRARY_JUMP
    }

    fn entry_point(&self) -> EntryPoint {
        EntryPoint::Callback
    }

    fn pre_hooks(&self) -> &'static [&'static str] {
        &["JUMP", "JUMPI"]
    }

    fn post_hooks(&self) -> &'static [&'static str] {
        &[]
    }

    fn execute(&mut self, ectx: &ExecContext<'ctx>, gs: &mut GlobalState<'ctx>) {
        let Ok(top) = gs.machine_state.top() else {
            return;
        };
        let target = top.as_bitvec();
        if !target.is_symbolic() {
            return;
        }
        if is_unique_jump(ectx, gs, &target) {
            return;
        }
        let Some(instruction) = gs.current_instruction() else {
            return;
        };
        debug!("arbitrary jump at {:#x}", instruction.address);
        self.issues
            .push(Issue::from_swc(&SWC_ARBITRARY_JUMP, instruction.address));
    }

    fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

/// Whether the path condition pins the jump target to a single value: find
/// one model, then ask for a second distinct target.
fn is_unique_jump<'ctx>(
    ectx: &ExecContext<'ctx>,
    gs: &GlobalState<'ctx>,
    target: &BitVec<'ctx>,
) -> bool {
    let constraints = gs.world_state.constraints().to_vec();
    let (_, model) = ectx.check(&constraints);
    let Some(model) = model else {
        return true;
    };
    let Some(witness) = model.eval_biguint(target) else {
        return true;
    };

    let pinned = BitVec::from_biguint(ectx.z3(), &witness, target.size());
    let mut with_different_target = constraints;
    with_different_target.push(target.ne(&pinned));
    let (status, _) = ectx.check(&with_different_target);
    status != SatResult::Sat
}
