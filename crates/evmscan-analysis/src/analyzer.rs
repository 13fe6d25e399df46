// SPDX-License-Identifier: AGPL-3.0

//! The worklist-based path explorer.
//!
//! Pops states LIFO, steps them through the interpreter, prunes infeasible
//! branches optimistically, and turns TxStart/TxEnd signals into frame
//! pushes and post-handler resumes. Detection-module hooks run around
//! every instruction.

use std::time::{Duration, Instant};

use evmscan_disasm::Disassembly;
use evmscan_sevm::{
    actor_world, prepare_contract_creation, prepare_message_call, ExecContext, Instruction,
    StepOutcome, TxEnd, TxStart,
};
use evmscan_state::{GlobalState, TransactionStack, TxInfo, WorldState};
use evmscan_solidity::SolidityContract;
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::issue::Issue;
use crate::modules::ModuleManager;
use crate::worklist::Worklist;

/// Exploration budgets.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Instruction-step ceiling per exploration run.
    pub max_steps: usize,
    /// Wall-clock budget per contract.
    pub timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct Analyzer<'e, 'ctx> {
    ectx: &'e ExecContext<'ctx>,
    modules: ModuleManager<'ctx>,
    world_states: Vec<WorldState<'ctx>>,
    config: AnalyzerConfig,
}

impl<'e, 'ctx> Analyzer<'e, 'ctx> {
    pub fn new(
        ectx: &'e ExecContext<'ctx>,
        modules: ModuleManager<'ctx>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            ectx,
            modules,
            world_states: Vec::new(),
            config,
        }
    }

    /// Analyze every contract and return the decorated findings.
    pub fn run(&mut self, contracts: &[SolidityContract]) -> Vec<Issue> {
        let started = Instant::now();
        let mut issues = Vec::new();
        let mut harvested = 0;
        for contract in contracts {
            info!("analyzing contract {}", contract.name);
            self.analyze_contract(contract);
            let all = self.modules.issues();
            for mut issue in all.into_iter().skip(harvested) {
                issue.add_code_info(contract);
                issues.push(issue);
            }
            harvested = issues.len();
        }
        info!(
            "total issues found: {} ({:.2}s)",
            issues.len(),
            started.elapsed().as_secs_f64()
        );
        issues
    }

    fn analyze_contract(&mut self, contract: &SolidityContract) {
        self.world_states.clear();
        let mut world = actor_world(self.ectx);

        let callee_address = if contract.creation_code.is_empty() {
            // no constructor to run: deploy the runtime code directly and
            // treat the resulting world as the only observed one
            let creator = self.ectx.actors.creator.clone();
            let key = world.create_account(
                0,
                None,
                true,
                Some(&creator),
                Some(Disassembly::new(&contract.code)),
                0,
            );
            let address = world
                .account(&key)
                .map(|account| account.address.clone())
                .expect("account created above");
            self.world_states.push(world);
            address
        } else {
            let (initial, account) = prepare_contract_creation(
                self.ectx,
                &contract.creation_code,
                &contract.name,
                world,
            );
            info!(
                "creating contract at {} from {} bytes of initcode",
                account.address.hex_string(),
                contract.creation_code.len() / 2
            );
            self.explore(vec![initial]);
            account.address
        };

        let observed = std::mem::take(&mut self.world_states);
        let states = prepare_message_call(self.ectx, &observed, &callee_address);
        self.world_states = observed;
        info!("executing {} symbolic message calls", states.len());
        self.explore(states);
    }

    /// The main loop: depth-first over the worklist with step and
    /// wall-clock budgets.
    fn explore(&mut self, initial: Vec<GlobalState<'ctx>>) {
        let mut worklist = Worklist::new();
        worklist.extend(initial);
        let deadline = Instant::now() + self.config.timeout;
        let mut steps = 0usize;

        while let Some(state) = worklist.pop() {
            steps += 1;
            if steps > self.config.max_steps {
                warn!("step budget exhausted after {} steps", steps - 1);
                break;
            }
            if Instant::now() > deadline {
                warn!("wall-clock budget exhausted");
                break;
            }
            let successors = self.execute_state(state);
            if successors.is_empty() {
                worklist.mark_completed();
            }
            worklist.extend(successors);
        }
        debug!("exploration finished: {} completed paths", worklist.completed_paths());
    }

    /// One interpreter step, with hooks and feasibility pruning.
    fn execute_state(&mut self, mut gs: GlobalState<'ctx>) -> Vec<GlobalState<'ctx>> {
        let (mnemonic, required_stack) = match gs.current_instruction() {
            Some(instruction) => (instruction.mnemonic.clone(), instruction.required_stack),
            // past the end of the instruction stream: synthesize a STOP
            None => ("STOP".to_string(), 0),
        };

        // a stack too shallow for the opcode abandons the state
        if gs.machine_state.stack_size() < required_stack {
            debug!("abandoning state: {} needs {} stack elements", mnemonic, required_stack);
            return Vec::new();
        }

        self.modules.run_pre_hooks(self.ectx, &mnemonic, &mut gs);

        let outcome = Instruction::new(&mnemonic, self.ectx).evaluate(gs);
        match outcome {
            Ok(StepOutcome::Continue(states)) => self.continue_states(&mnemonic, states),
            Ok(StepOutcome::TxStart(start)) => self.start_transaction(*start),
            Ok(StepOutcome::TxEnd(end)) => self.end_transaction(*end),
            Ok(StepOutcome::Dropped(reason)) => {
                debug!("path dropped at {}: {}", mnemonic, reason);
                Vec::new()
            }
            Err(error) => {
                debug!("path ended at {}: {}", mnemonic, error);
                Vec::new()
            }
        }
    }

    fn continue_states(
        &mut self,
        mnemonic: &str,
        mut states: Vec<GlobalState<'ctx>>,
    ) -> Vec<GlobalState<'ctx>> {
        if states.len() > 1 {
            states.retain(|state| {
                let feasible = self
                    .ectx
                    .is_feasible(state.world_state.constraints().as_slice());
                if !feasible {
                    debug!("pruned an infeasible branch after {}", mnemonic);
                }
                feasible
            });
        }
        for state in states.iter_mut() {
            self.modules.run_post_hooks(self.ectx, mnemonic, state);
        }
        states
    }

    /// Build the child frame of a nested transaction. The suspended caller
    /// rides along in the transaction stack until the child retires.
    fn start_transaction(&mut self, start: TxStart<'ctx>) -> Vec<GlobalState<'ctx>> {
        let TxStart {
            caller_state, tx, opcode,
        } = start;
        let tx = Rc::new(tx);
        info!("starting new transaction {} via {}", tx.id(), opcode);

        let mut child = tx.initial_global_state();
        let mut stack: TransactionStack<'ctx> = caller_state.transaction_stack.clone();
        stack.push(TxInfo {
            caller_state: Some(Box::new(caller_state)),
            tx: tx.clone(),
        });
        child.transaction_stack = stack;
        vec![child]
    }

    /// Retire a transaction: record the world of a top-level frame, or
    /// restore the suspended caller and resume it at the post handler.
    fn end_transaction(&mut self, end: TxEnd<'ctx>) -> Vec<GlobalState<'ctx>> {
        let child = end.global_state;
        let Some(frame) = child.transaction_stack.top().cloned() else {
            return Vec::new();
        };
        info!("ending {}", frame.tx);

        let Some(caller) = frame.caller_state else {
            // top-level transaction: keep the world it produced
            let produced_code =
                !frame.tx.is_creation() || !frame.tx.return_data().is_empty();
            if !end.revert && produced_code {
                self.world_states.push(child.world_state.clone());
            }
            return Vec::new();
        };

        let mut resumed = *caller;
        for annotation in child.annotations() {
            if annotation.persist_over_calls() {
                resumed.add_annotation(annotation.clone());
            }
        }
        if end.revert {
            resumed
                .world_state
                .add_constraints(child.world_state.constraints().to_vec());
        } else {
            resumed.world_state = child.world_state.clone();
            if frame.tx.is_creation() {
                resumed.machine_state.add_gas(
                    child.machine_state.gas_used_min(),
                    child.machine_state.gas_used_max(),
                );
            }
        }
        resumed.last_return_data = end.return_data.clone();

        let Some(opcode) = resumed
            .current_instruction()
            .map(|instruction| instruction.mnemonic.clone())
        else {
            debug!("suspended caller has no current instruction");
            return Vec::new();
        };

        match Instruction::new(&opcode, self.ectx).evaluate_post(resumed, &frame.tx, end.revert) {
            Ok(StepOutcome::Continue(states)) => self.continue_states(&opcode, states),
            Ok(_) => Vec::new(),
            Err(error) => {
                debug!("post handler for {} failed: {}", opcode, error);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::default_modules;
    use z3::{Config, Context};

    fn contract(runtime: &str, creation: &str) -> SolidityContract {
        SolidityContract::from_bytecode("Test", runtime, creation)
    }

    /// PUSH1 0 PUSH1 0 RETURN — terminates immediately.
    #[test]
    fn trivial_contract_explores_cleanly() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);

        let mut analyzer = Analyzer::new(&ectx, default_modules(), AnalyzerConfig::default());
        let issues = analyzer.run(&[contract("60006000f3", "")]);
        assert!(issues.is_empty());
    }

    /// An INVALID opcode kills its path but the driver keeps going and
    /// still explores the sibling branch.
    #[test]
    fn path_fatal_error_does_not_stop_exploration() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let ectx = ExecContext::new(&ctx);

        // CALLDATASIZE PUSH1 0x05 JUMPI INVALID JUMPDEST STOP
        // offsets:   0      1     3     4       5        6
        let code = "36600557fe5b00";
        let mut analyzer = Analyzer::new(&ectx, default_modules(), AnalyzerConfig::default());
        let issues = analyzer.run(&[contract(code, "")]);
        // both branches were handled without a panic; no findings expected
        assert!(issues.is_empty());
    }
}
