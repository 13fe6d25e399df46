// SPDX-License-Identifier: AGPL-3.0

//! Top-level transaction construction: the creation transaction that
//! deploys the contract under analysis, and the symbolic message calls
//! that probe it afterwards.

use std::cell::RefCell;
use std::rc::Rc;

use evmscan_disasm::Disassembly;
use evmscan_smt::BitVec;
use evmscan_state::{
    Account, AddressKey, Calldata, ContractCreationTransaction, GlobalState,
    MessageCallTransaction, Transaction, TransactionStack, TxInfo, WorldState,
};
use tracing::debug;

use crate::context::ExecContext;

const TX_GAS_LIMIT: u64 = 8_000_000;

/// A fresh world with the three actor accounts pre-loaded (zero code, zero
/// balance).
pub fn actor_world<'ctx>(ectx: &ExecContext<'ctx>) -> WorldState<'ctx> {
    let mut world = WorldState::new(ectx.z3());
    for actor in ectx.actors.all() {
        world.put_account(Account::new(ectx.z3(), actor.clone(), None, 0, "", false));
    }
    world
}

/// The deployment transaction: `caller = CREATOR`, concrete-storage callee
/// holding the creation code.
pub fn prepare_contract_creation<'ctx>(
    ectx: &ExecContext<'ctx>,
    creation_code: &str,
    contract_name: &str,
    mut world_state: WorldState<'ctx>,
) -> (GlobalState<'ctx>, Account<'ctx>) {
    let id = ectx.next_tx_id();
    let creator = ectx.actors.creator.clone();
    let callee_key = world_state.create_account(
        0,
        None,
        true,
        Some(&creator),
        Some(Disassembly::new(creation_code)),
        0,
    );
    let callee_account = world_state
        .account(&callee_key)
        .cloned()
        .expect("account created above");

    let tx = Transaction::ContractCreation(ContractCreationTransaction {
        prev_world_state: world_state.clone(),
        world_state,
        callee_account: callee_account.clone(),
        code: Disassembly::new(creation_code),
        calldata: Calldata::symbolic(ectx.z3(), &id),
        caller: creator.clone(),
        gas_price: BitVec::new_const(ectx.z3(), &format!("gas_price{}", id), 256),
        gas_limit: BitVec::from_u64(ectx.z3(), TX_GAS_LIMIT, 256),
        origin: creator,
        call_value: BitVec::new_const(ectx.z3(), &format!("call_value{}", id), 256),
        contract_name: contract_name.to_string(),
        id,
        return_data: RefCell::new(String::new()),
    });

    (setup_global_state_for_execution(ectx, tx), callee_account)
}

/// One symbolic message call per recorded world state, with a symbolic
/// sender constrained to the actor table.
pub fn prepare_message_call<'ctx>(
    ectx: &ExecContext<'ctx>,
    world_states: &[WorldState<'ctx>],
    callee_address: &BitVec<'ctx>,
) -> Vec<GlobalState<'ctx>> {
    let mut states = Vec::new();
    for world_state in world_states {
        let key = AddressKey::of(callee_address);
        let Some(callee_account) = world_state.account(&key).cloned() else {
            debug!("callee account missing from world state, skipping");
            continue;
        };
        if callee_account.deleted {
            debug!("skipping a dead contract");
            continue;
        }

        let id = ectx.next_tx_id();
        let sender = BitVec::new_const(ectx.z3(), &format!("sender_{}", id), 256);
        let tx = Transaction::MessageCall(MessageCallTransaction {
            world_state: world_state.clone(),
            callee_account: callee_account.clone(),
            caller: sender.clone(),
            calldata: Calldata::symbolic(ectx.z3(), &id),
            id: id.clone(),
            gas_price: BitVec::new_const(ectx.z3(), &format!("gas_price{}", id), 256),
            gas_limit: BitVec::from_u64(ectx.z3(), TX_GAS_LIMIT, 256),
            origin: sender,
            code: callee_account.code.clone(),
            call_value: BitVec::new_const(ectx.z3(), &format!("call_value{}", id), 256),
            static_flag: false,
            return_data: RefCell::new(String::new()),
        });
        states.push(setup_global_state_for_execution(ectx, tx));
    }
    states
}

/// Wire a top-level transaction into a runnable state: frame on the stack,
/// appended to the history, caller constrained to the actor set.
fn setup_global_state_for_execution<'ctx>(
    ectx: &ExecContext<'ctx>,
    tx: Transaction<'ctx>,
) -> GlobalState<'ctx> {
    let tx = Rc::new(tx);
    let mut gs = tx.initial_global_state();
    let mut stack = TransactionStack::new();
    stack.push(TxInfo {
        caller_state: None,
        tx: tx.clone(),
    });
    gs.transaction_stack = stack;
    gs.world_state.transaction_sequence.push(tx.clone());

    let caller = tx.caller();
    let [creator, attacker, someguy] = ectx.actors.all();
    let known_actor = caller
        .eq(creator)
        .or(&caller.eq(attacker))
        .or(&caller.eq(someguy));
    gs.world_state.add_constraint(known_actor);
    gs
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::{Config, Context};

    #[test]
    fn creation_state_is_runnable() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);

        let world = actor_world(&ectx);
        let (state, account) =
            prepare_contract_creation(&ectx, "6080604052", "Test", world);

        assert_eq!(state.environment.active_function, "constructor");
        assert_eq!(state.transaction_stack.len(), 1);
        assert!(state.current_transaction().unwrap().tx.is_creation());
        assert!(!account.code.is_empty());
        // creator, attacker, someguy plus the deployed account
        assert!(state.world_state.accounts().count() >= 4);
    }

    #[test]
    fn message_calls_probe_each_world() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);

        let mut world = actor_world(&ectx);
        let address = BitVec::from_u64(&ctx, 0x65, 256);
        world.create_account(
            0,
            Some(address.clone()),
            true,
            None,
            Some(Disassembly::new("6001600101")),
            0,
        );

        let states = prepare_message_call(&ectx, &[world.clone(), world], &address);
        assert_eq!(states.len(), 2);
        for state in &states {
            assert!(state.environment.sender.is_symbolic());
            assert_eq!(state.environment.active_function, "fallback");
            // actor-membership constraint plus the solvency constraint
            assert!(state.world_state.constraints().len() >= 2);
        }
    }

    #[test]
    fn dead_contracts_are_skipped() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);

        let mut world = actor_world(&ectx);
        let address = BitVec::from_u64(&ctx, 0x65, 256);
        world.create_account(0, Some(address.clone()), true, None, None, 0);
        world
            .account_mut(&AddressKey::of(&address))
            .unwrap()
            .deleted = true;

        let states = prepare_message_call(&ectx, &[world], &address);
        assert!(states.is_empty());
    }
}
