// SPDX-License-Identifier: AGPL-3.0

//! The path-exploration driver and the detection modules that run around
//! every instruction.

mod analyzer;
mod issue;
mod modules;
mod swc;
mod worklist;

pub use analyzer::{Analyzer, AnalyzerConfig};
pub use issue::Issue;
pub use modules::{
    default_modules, AccidentallyKillable, ArbitraryJump, DetectionModule, EntryPoint,
    ModuleManager, TxOriginAuth, UncheckedRetval,
};
pub use swc::{swc_data, SwcData};
pub use worklist::Worklist;
