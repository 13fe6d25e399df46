// SPDX-License-Identifier: AGPL-3.0

//! Confirmed findings, decorated with source locations for reporting.

use std::fmt;

use colored::Colorize;
use evmscan_solidity::SolidityContract;

use crate::swc::SwcData;

#[derive(Debug, Clone)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Byte address of the offending instruction.
    pub address: usize,
    pub file: String,
    pub line: usize,
    pub code: String,
}

impl Issue {
    pub fn from_swc(swc: &SwcData, address: usize) -> Self {
        Self {
            id: swc.id.to_string(),
            title: swc.title.to_string(),
            description: swc.description.to_string(),
            address,
            file: String::new(),
            line: 0,
            code: String::new(),
        }
    }

    /// Resolve the byte address against the contract's source map.
    pub fn add_code_info(&mut self, contract: &SolidityContract) {
        match contract.source_info(self.address, false) {
            Some(info) => {
                self.file = info.file_name;
                self.line = info.line;
                self.code = info.code;
            }
            None => {
                self.file = "Internal file".to_string();
            }
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = format!(
            "ID: {}\nTitle: {}\nDescription: {}\n",
            self.id, self.title, self.description
        );
        let location = format!("In file: {}:{}\n{}", self.file, self.line, self.code);
        write!(f, "{}\n{}", header.red(), location.yellow())
    }
}
