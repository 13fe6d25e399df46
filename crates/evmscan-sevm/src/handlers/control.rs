// SPDX-License-Identifier: AGPL-3.0

//! Control flow: JUMP/JUMPI, the subroutine opcodes and LOG.

use evmscan_disasm::instruction_index;
use evmscan_errors::VmError;
use evmscan_state::GlobalState;
use tracing::debug;

use crate::context::ExecContext;
use crate::instruction::{charge_gas, step, HandlerResult};
use crate::outcome::StepOutcome;

/// JUMP: the target must be concrete and resolve to a JUMPDEST.
pub(crate) fn jump<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let target = gs.machine_state.pop_bitvec()?;
    let Some(address) = target.as_u64() else {
        return Err(VmError::SymbolicJumpTarget);
    };

    let index = instruction_index(gs.environment.code.instructions(), address as usize)
        .ok_or(VmError::InvalidJumpDestination(address))?;
    if gs.environment.code.instructions()[index].mnemonic != "JUMPDEST" {
        return Err(VmError::InvalidJumpDestination(address));
    }

    charge_gas(&mut gs)?;
    gs.machine_state.jump(index);
    Ok(StepOutcome::Continue(vec![gs]))
}

/// JUMPI: fork into a fall-through successor constrained by ¬cond and, when
/// the target is a JUMPDEST, a taken successor constrained by cond. A
/// symbolic target skips the branch entirely.
pub(crate) fn jumpi<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let target = gs.machine_state.pop_bitvec()?;
    let condition = gs.machine_state.pop_bool()?;

    if target.is_symbolic() {
        debug!("symbolic JUMPI target, skipping the branch");
        return step(gs);
    }
    let address = target.as_u64().expect("checked concrete above");

    let may_be_true = !condition.is_false();
    let may_be_false = !condition.is_true();
    let mut successors = Vec::new();

    if may_be_false {
        let mut fallthrough = gs.clone();
        charge_gas(&mut fallthrough)?;
        fallthrough.machine_state.increase_depth();
        fallthrough.machine_state.advance();
        fallthrough.world_state.add_constraint(condition.not());
        successors.push(fallthrough);
    }

    let destination = instruction_index(gs.environment.code.instructions(), address as usize)
        .filter(|&index| gs.environment.code.instructions()[index].mnemonic == "JUMPDEST");
    if let Some(index) = destination {
        if may_be_true {
            let mut taken = gs.clone();
            charge_gas(&mut taken)?;
            taken.machine_state.jump(index);
            taken.machine_state.increase_depth();
            taken.world_state.add_constraint(condition.clone());
            successors.push(taken);
        }
    } else {
        debug!("JUMPI destination {:#x} is not a JUMPDEST", address);
    }

    Ok(StepOutcome::Continue(successors))
}

pub(crate) fn beginsub<'ctx>(_ectx: &ExecContext<'ctx>, _gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    // only reachable via fallthrough, which is invalid
    Err(VmError::InvalidInstruction)
}

/// JUMPSUB: push the return pc and jump; the target must be a BEGINSUB.
pub(crate) fn jumpsub<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let target = gs.machine_state.pop_bitvec()?;
    let Some(address) = target.as_u64() else {
        return Err(VmError::SymbolicJumpTarget);
    };
    let index = instruction_index(gs.environment.code.instructions(), address as usize)
        .ok_or(VmError::InvalidJumpDestination(address))?;
    if gs.environment.code.instructions()[index].mnemonic != "BEGINSUB" {
        return Err(VmError::InvalidJumpDestination(address));
    }

    let return_pc = gs.machine_state.pc();
    gs.machine_state.push_return_pc(return_pc)?;
    charge_gas(&mut gs)?;
    gs.machine_state.jump(index + 1);
    Ok(StepOutcome::Continue(vec![gs]))
}

pub(crate) fn returnsub<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let return_pc = gs.machine_state.pop_return_pc()?;
    charge_gas(&mut gs)?;
    gs.machine_state.jump(return_pc + 1);
    Ok(StepOutcome::Continue(vec![gs]))
}

/// LOGn: consume the topics and data region; events are not modelled.
pub(crate) fn log<'ctx>(
    _ectx: &ExecContext<'ctx>,
    mut gs: GlobalState<'ctx>,
    topics: usize,
) -> HandlerResult<'ctx> {
    if gs.environment.static_flag {
        return Err(VmError::WriteInStaticContext);
    }
    for _ in 0..topics + 2 {
        gs.machine_state.pop()?;
    }
    step(gs)
}
