// SPDX-License-Identifier: AGPL-3.0

//! SWC-104: the result of an external call is never compared against
//! failure.
//!
//! The post hook on the CALL family records the pushed return value in a
//! state-level annotation. At STOP/RETURN every recorded value is probed:
//! if both `v == 1` and `v == 0` remain feasible, nothing on the path ever
//! constrained the call to have succeeded.

use evmscan_sevm::ExecContext;
use evmscan_smt::{Annotation, BitVec, RetVal, SatResult};
use evmscan_state::GlobalState;
use tracing::debug;

use crate::issue::Issue;
use crate::modules::{DetectionModule, EntryPoint};
use crate::swc::{SwcData, SWC_UNCHECKED_RETVAL};

const CALL_FAMILY: [&str; 4] = ["CALL", "DELEGATECALL", "STATICCALL", "CALLCODE"];

pub struct UncheckedRetval {
    issues: Vec<Issue>,
}

impl UncheckedRetval {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }
}

impl Default for UncheckedRetval {
    fn default() -> Self {
        Self::new()
    }
}

impl<'ctx> DetectionModule<'ctx> for UncheckedRetval {
    fn swc(&self) -> &'static SwcData {
        &SWC_UNCHECKED_RETVAL
    }

    fn entry_point(&self) -> EntryPoint {
        EntryPoint::Callback
    }

    fn pre_hooks(&self) -> &'static [&'static str] {
        &["STOP", "RETURN"]
    }

    fn post_hooks(&self) -> &'static [&'static str] {
        &["CALL", "DELEGATECALL", "STATICCALL", "CALLCODE"]
    }

    fn execute(&mut self, ectx: &ExecContext<'ctx>, gs: &mut GlobalState<'ctx>) {
        let mnemonic = gs
            .current_instruction()
            .map(|instruction| instruction.mnemonic.clone())
            .unwrap_or_else(|| "STOP".to_string());

        if mnemonic == "STOP" || mnemonic == "RETURN" {
            self.review_recorded(ectx, gs);
        } else {
            record_retval(gs);
        }
    }

    fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

impl UncheckedRetval {
    fn review_recorded<'ctx>(&mut self, ectx: &ExecContext<'ctx>, gs: &GlobalState<'ctx>) {
        let recorded: Vec<RetVal<'ctx>> = gs
            .annotations()
            .iter()
            .find_map(|annotation| match annotation {
                Annotation::UncheckedRetval(retvals) => Some(retvals.clone()),
                _ => None,
            })
            .unwrap_or_default();

        let constraints = gs.world_state.constraints().to_vec();
        for retval in &recorded {
            let one = BitVec::from_u64(ectx.z3(), 1, retval.value.size());
            let zero = BitVec::from_u64(ectx.z3(), 0, retval.value.size());

            let mut as_success = constraints.clone();
            as_success.push(retval.value.eq(&one));
            let (success_status, _) = ectx.check(&as_success);
            if success_status != SatResult::Sat {
                continue;
            }

            let mut as_failure = constraints.clone();
            as_failure.push(retval.value.eq(&zero));
            let (failure_status, _) = ectx.check(&as_failure);
            if failure_status != SatResult::Sat {
                continue;
            }

            debug!("unconstrained call result from call site {:#x}", retval.address);
            self.issues
                .push(Issue::from_swc(&SWC_UNCHECKED_RETVAL, retval.address));
            return;
        }
    }
}

/// After a call family opcode resumed, stash the pushed result together
/// with the call-site address.
fn record_retval(gs: &mut GlobalState<'_>) {
    let pc = gs.machine_state.pc();
    if pc == 0 {
        return;
    }
    let Some(previous) = gs.environment.code.instructions().get(pc - 1).cloned() else {
        return;
    };
    if !CALL_FAMILY.contains(&previous.mnemonic.as_str()) {
        return;
    }
    let Ok(top) = gs.machine_state.top() else {
        return;
    };
    let retval = RetVal {
        address: previous.address,
        value: top.as_bitvec(),
    };

    for annotation in gs.annotations.iter_mut() {
        if let Annotation::UncheckedRetval(retvals) = annotation {
            retvals.push(retval);
            return;
        }
    }
    gs.add_annotation(Annotation::UncheckedRetval(vec![retval]));
}
