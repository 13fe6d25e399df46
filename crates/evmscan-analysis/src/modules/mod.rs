// SPDX-License-Identifier: AGPL-3.0

//! Detection modules and their hook registration.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use evmscan_sevm::ExecContext;
use evmscan_state::GlobalState;

use crate::issue::Issue;
use crate::swc::SwcData;

mod arbitrary_jump;
mod suicide;
mod tx_origin;
mod unchecked_retval;

pub use arbitrary_jump::ArbitraryJump;
pub use suicide::AccidentallyKillable;
pub use tx_origin::TxOriginAuth;
pub use unchecked_retval::UncheckedRetval;

/// When the driver harvests a module's findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// Reviewed once after exploration finishes.
    Post,
    /// Invoked at instruction boundaries through its hooks.
    Callback,
}

/// A vulnerability analysis over states at instruction boundaries.
///
/// Modules may read the state freely; the only permitted mutation is
/// attaching annotations.
pub trait DetectionModule<'ctx> {
    fn swc(&self) -> &'static SwcData;
    fn entry_point(&self) -> EntryPoint;
    fn pre_hooks(&self) -> &'static [&'static str];
    fn post_hooks(&self) -> &'static [&'static str];
    fn execute(&mut self, ectx: &ExecContext<'ctx>, gs: &mut GlobalState<'ctx>);
    fn issues(&self) -> &[Issue];
}

type SharedModule<'ctx> = Rc<RefCell<dyn DetectionModule<'ctx> + 'ctx>>;

/// Registry of modules keyed by the opcodes they hook.
pub struct ModuleManager<'ctx> {
    modules: Vec<SharedModule<'ctx>>,
    pre_hooks: HashMap<&'static str, Vec<SharedModule<'ctx>>>,
    post_hooks: HashMap<&'static str, Vec<SharedModule<'ctx>>>,
}

impl<'ctx> ModuleManager<'ctx> {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            pre_hooks: HashMap::new(),
            post_hooks: HashMap::new(),
        }
    }

    pub fn add_module(&mut self, module: SharedModule<'ctx>) {
        {
            let registered = module.borrow();
            for &opcode in registered.pre_hooks() {
                self.pre_hooks.entry(opcode).or_default().push(module.clone());
            }
            for &opcode in registered.post_hooks() {
                self.post_hooks.entry(opcode).or_default().push(module.clone());
            }
        }
        self.modules.push(module);
    }

    pub fn run_pre_hooks(
        &self,
        ectx: &ExecContext<'ctx>,
        mnemonic: &str,
        gs: &mut GlobalState<'ctx>,
    ) {
        if let Some(modules) = self.pre_hooks.get(mnemonic) {
            for module in modules {
                module.borrow_mut().execute(ectx, gs);
            }
        }
    }

    pub fn run_post_hooks(
        &self,
        ectx: &ExecContext<'ctx>,
        mnemonic: &str,
        gs: &mut GlobalState<'ctx>,
    ) {
        if let Some(modules) = self.post_hooks.get(mnemonic) {
            for module in modules {
                module.borrow_mut().execute(ectx, gs);
            }
        }
    }

    /// All findings across registered modules.
    pub fn issues(&self) -> Vec<Issue> {
        self.modules
            .iter()
            .flat_map(|module| module.borrow().issues().to_vec())
            .collect()
    }
}

impl<'ctx> Default for ModuleManager<'ctx> {
    fn default() -> Self {
        Self::new()
    }
}

/// The four analyses shipped by default.
pub fn default_modules<'ctx>() -> ModuleManager<'ctx> {
    let mut manager = ModuleManager::new();
    manager.add_module(Rc::new(RefCell::new(ArbitraryJump::new())));
    manager.add_module(Rc::new(RefCell::new(TxOriginAuth::new())));
    manager.add_module(Rc::new(RefCell::new(UncheckedRetval::new())));
    manager.add_module(Rc::new(RefCell::new(AccidentallyKillable::new())));
    manager
}
