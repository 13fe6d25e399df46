// SPDX-License-Identifier: AGPL-3.0

//! The state threaded through every interpreter step.

use std::collections::HashMap;

use evmscan_disasm::EvmInstruction;
use evmscan_smt::{Annotation, BitVec};

use crate::account::Account;
use crate::environment::Environment;
use crate::machine::MachineState;
use crate::transaction::{ReturnData, TransactionStack, TxInfo};
use crate::world::WorldState;
use crate::AddressKey;

/// One point in the exploration: a world, an environment, a machine state
/// and the stack of suspended transactions that led here.
#[derive(Debug, Clone)]
pub struct GlobalState<'ctx> {
    pub world_state: WorldState<'ctx>,
    pub environment: Environment<'ctx>,
    pub machine_state: MachineState<'ctx>,
    pub last_return_data: Option<ReturnData<'ctx>>,
    pub transaction_stack: TransactionStack<'ctx>,
    pub annotations: Vec<Annotation<'ctx>>,
    /// Balances of accounts destroyed within this frame, snapshotted at the
    /// moment of SELFDESTRUCT.
    pub destructed: HashMap<AddressKey, Account<'ctx>>,
}

impl<'ctx> GlobalState<'ctx> {
    pub fn new(
        world_state: WorldState<'ctx>,
        environment: Environment<'ctx>,
        machine_state: MachineState<'ctx>,
    ) -> Self {
        Self {
            world_state,
            environment,
            machine_state,
            last_return_data: None,
            transaction_stack: TransactionStack::new(),
            annotations: Vec::new(),
            destructed: HashMap::new(),
        }
    }

    /// The instruction under the program counter, or `None` past the end of
    /// the stream (an implicit STOP).
    pub fn current_instruction(&self) -> Option<&EvmInstruction> {
        self.environment
            .code
            .instructions()
            .get(self.machine_state.pc())
    }

    pub fn current_transaction(&self) -> Option<&TxInfo<'ctx>> {
        self.transaction_stack.top()
    }

    /// A fresh symbol namespaced by the running transaction.
    pub fn new_bitvec(&self, name: &str, size: u32) -> BitVec<'ctx> {
        let full_name = match self.current_transaction() {
            Some(frame) => format!("{}_{}", frame.tx.id(), name),
            None => name.to_string(),
        };
        BitVec::new_const(self.world_state.z3(), &full_name, size)
    }

    pub fn active_account(&self) -> Option<&Account<'ctx>> {
        self.world_state
            .account(&AddressKey::of(&self.environment.active_account))
    }

    pub fn active_account_mut(&mut self) -> &mut Account<'ctx> {
        let address = self.environment.active_account.clone();
        self.world_state.existing_or_load(&address)
    }

    pub fn add_annotation(&mut self, annotation: Annotation<'ctx>) {
        self.annotations.push(annotation);
    }

    pub fn annotations(&self) -> &[Annotation<'ctx>] {
        &self.annotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmscan_disasm::Disassembly;
    use evmscan_smt::BitVec;
    use z3::{Config, Context};

    fn test_state<'ctx>(ctx: &'ctx Context, code: &str) -> GlobalState<'ctx> {
        let mut world = WorldState::new(ctx);
        let address = BitVec::from_u64(ctx, 101, 256);
        world.create_account(10, Some(address.clone()), false, None, None, 0);
        let code = Disassembly::new(code);
        let environment = Environment {
            active_account: address,
            sender: BitVec::from_u64(ctx, 9999, 256),
            gas_price: BitVec::from_u64(ctx, 1, 256),
            call_value: BitVec::from_u64(ctx, 0, 256),
            origin: BitVec::from_u64(ctx, 9999, 256),
            base_fee: BitVec::new_const(ctx, "basefee", 256),
            block_number: BitVec::new_const(ctx, "block_number", 256),
            chain_id: BitVec::new_const(ctx, "chain_id", 256),
            calldata: crate::Calldata::concrete(ctx, "0", vec![]),
            code: code.clone(),
            static_flag: false,
            active_function: "fallback".to_string(),
        };
        GlobalState::new(world, environment, MachineState::new(8_000_000))
    }

    #[test]
    fn pc_past_the_end_is_implicit_stop() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut state = test_state(&ctx, "6080");
        assert_eq!(state.current_instruction().unwrap().mnemonic, "PUSH1");
        state.machine_state.jump(5);
        assert!(state.current_instruction().is_none());
    }

    #[test]
    fn active_account_resolution() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut state = test_state(&ctx, "6080");
        assert!(state.active_account().is_some());
        let key = BitVec::from_u64(&ctx, 3, 256);
        let value = BitVec::from_u64(&ctx, 9, 256);
        state.active_account_mut().storage_set(&key, &value);
        assert_eq!(
            state
                .active_account()
                .unwrap()
                .storage_get(&ctx, &key)
                .as_u64(),
            Some(9)
        );
    }
}
