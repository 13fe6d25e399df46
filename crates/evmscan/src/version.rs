// SPDX-License-Identifier: AGPL-3.0

//! The `version` command: build-info key/value pairs.

use anyhow::Result;
use colored::Colorize;

pub fn run() -> Result<()> {
    print_entry("Version", env!("CARGO_PKG_VERSION"));
    print_entry(
        "Profile",
        if cfg!(debug_assertions) { "debug" } else { "release" },
    );
    print_entry("Commit", option_env!("EVMSCAN_BUILD_COMMIT").unwrap_or("unknown"));
    print_entry("BuildTime", option_env!("EVMSCAN_BUILD_TIME").unwrap_or("unknown"));
    Ok(())
}

fn print_entry(key: &str, value: &str) {
    println!("{} {}", format!("{:<16}", key).cyan(), value);
}
