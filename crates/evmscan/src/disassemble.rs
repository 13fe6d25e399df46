// SPDX-License-Identifier: AGPL-3.0

//! The `disassemble` command: print EVM assembly for both bytecodes.

use std::path::Path;

use anyhow::{bail, Context as _, Result};
use evmscan_solidity::contracts_from_file;

pub fn run(file: &Path) -> Result<()> {
    let contracts = contracts_from_file(file)
        .with_context(|| format!("compiling {}", file.display()))?;
    if contracts.is_empty() {
        bail!("no contract found in {}", file.display());
    }

    for contract in &contracts {
        println!("Disassembled runtime code of {}:", contract.name);
        println!("{}", contract.easm());
        println!("Disassembled creation code of {}:", contract.name);
        println!("{}", contract.creation_easm());
    }
    Ok(())
}
