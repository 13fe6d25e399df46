// SPDX-License-Identifier: AGPL-3.0

//! Static per-opcode metadata: numeric code, mnemonic, stack arity and the
//! min/max gas charged by the symbolic machine.
//!
//! Gas figures follow the Istanbul schedule; variable-cost opcodes carry a
//! loose upper bound since gas is only tracked to enforce a budget.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Metadata for a single EVM opcode.
#[derive(Debug, Clone)]
pub struct OpInfo {
    pub code: u8,
    pub mnemonic: String,
    /// Number of stack elements the opcode consumes.
    pub required_stack: usize,
    pub gas_min: i64,
    pub gas_max: i64,
}

// (mnemonic, code, required stack elements, gas min, gas max)
const BASE_TABLE: &[(&str, u8, usize, i64, i64)] = &[
    ("STOP", 0x00, 0, 0, 0),
    ("ADD", 0x01, 2, 3, 3),
    ("MUL", 0x02, 2, 5, 5),
    ("SUB", 0x03, 2, 3, 3),
    ("DIV", 0x04, 2, 5, 5),
    ("SDIV", 0x05, 2, 5, 5),
    ("MOD", 0x06, 2, 5, 5),
    ("SMOD", 0x07, 2, 5, 5),
    ("ADDMOD", 0x08, 3, 8, 8),
    ("MULMOD", 0x09, 3, 8, 8),
    ("EXP", 0x0a, 2, 10, 340),
    ("SIGNEXTEND", 0x0b, 2, 5, 5),
    ("LT", 0x10, 2, 3, 3),
    ("GT", 0x11, 2, 3, 3),
    ("SLT", 0x12, 2, 3, 3),
    ("SGT", 0x13, 2, 3, 3),
    ("EQ", 0x14, 2, 3, 3),
    ("ISZERO", 0x15, 1, 3, 3),
    ("AND", 0x16, 2, 3, 3),
    ("OR", 0x17, 2, 3, 3),
    ("XOR", 0x18, 2, 3, 3),
    ("NOT", 0x19, 1, 3, 3),
    ("BYTE", 0x1a, 2, 3, 3),
    ("SHL", 0x1b, 2, 3, 3),
    ("SHR", 0x1c, 2, 3, 3),
    ("SAR", 0x1d, 2, 3, 3),
    ("SHA3", 0x20, 2, 30, 30 + 6 * 8),
    ("ADDRESS", 0x30, 0, 2, 2),
    ("BALANCE", 0x31, 1, 700, 700),
    ("ORIGIN", 0x32, 0, 2, 2),
    ("CALLER", 0x33, 0, 2, 2),
    ("CALLVALUE", 0x34, 0, 2, 2),
    ("CALLDATALOAD", 0x35, 1, 3, 3),
    ("CALLDATASIZE", 0x36, 0, 2, 2),
    ("CALLDATACOPY", 0x37, 3, 2, 2 + 3 * 768),
    ("CODESIZE", 0x38, 0, 2, 2),
    ("CODECOPY", 0x39, 3, 2, 2 + 3 * 768),
    ("GASPRICE", 0x3a, 0, 2, 2),
    ("EXTCODESIZE", 0x3b, 1, 700, 700),
    ("EXTCODECOPY", 0x3c, 4, 700, 700 + 3 * 768),
    ("RETURNDATASIZE", 0x3d, 0, 2, 2),
    ("RETURNDATACOPY", 0x3e, 3, 3, 3),
    ("EXTCODEHASH", 0x3f, 1, 700, 700),
    ("BLOCKHASH", 0x40, 1, 20, 20),
    ("COINBASE", 0x41, 0, 2, 2),
    ("TIMESTAMP", 0x42, 0, 2, 2),
    ("NUMBER", 0x43, 0, 2, 2),
    ("DIFFICULTY", 0x44, 0, 2, 2),
    ("GASLIMIT", 0x45, 0, 2, 2),
    ("CHAINID", 0x46, 0, 2, 2),
    ("SELFBALANCE", 0x47, 0, 2, 2),
    ("BASEFEE", 0x48, 0, 2, 2),
    ("POP", 0x50, 1, 2, 2),
    ("MLOAD", 0x51, 1, 3, 96),
    ("MSTORE", 0x52, 2, 3, 98),
    ("MSTORE8", 0x53, 2, 3, 98),
    ("SLOAD", 0x54, 1, 800, 800),
    ("SSTORE", 0x55, 2, 5000, 5000),
    ("JUMP", 0x56, 1, 8, 8),
    ("JUMPI", 0x57, 2, 10, 10),
    ("PC", 0x58, 0, 2, 2),
    ("MSIZE", 0x59, 0, 2, 2),
    ("GAS", 0x5a, 0, 2, 2),
    ("JUMPDEST", 0x5b, 0, 1, 1),
    ("BEGINSUB", 0x5c, 0, 2, 2),
    ("RETURNSUB", 0x5d, 0, 5, 5),
    ("JUMPSUB", 0x5e, 1, 10, 10),
    ("CREATE", 0xf0, 3, 32000, 32000),
    ("CALL", 0xf1, 7, 700, 700 + 9000 + 25000),
    ("CALLCODE", 0xf2, 7, 700, 700 + 9000 + 25000),
    ("RETURN", 0xf3, 2, 0, 0),
    ("DELEGATECALL", 0xf4, 6, 700, 700 + 9000 + 25000),
    ("CREATE2", 0xf5, 4, 32000, 32000),
    ("STATICCALL", 0xfa, 6, 700, 700 + 9000 + 25000),
    ("REVERT", 0xfd, 2, 0, 0),
    ("INVALID", 0xfe, 0, 0, 0),
    ("SELFDESTRUCT", 0xff, 1, 5000, 30000),
];

static TABLE: Lazy<Vec<OpInfo>> = Lazy::new(|| {
    let mut table: Vec<OpInfo> = BASE_TABLE
        .iter()
        .map(|&(mnemonic, code, required_stack, gas_min, gas_max)| OpInfo {
            code,
            mnemonic: mnemonic.to_string(),
            required_stack,
            gas_min,
            gas_max,
        })
        .collect();
    for n in 1..=32u8 {
        table.push(OpInfo {
            code: 0x5f + n,
            mnemonic: format!("PUSH{}", n),
            required_stack: 0,
            gas_min: 3,
            gas_max: 3,
        });
    }
    for n in 1..=16u8 {
        table.push(OpInfo {
            code: 0x7f + n,
            mnemonic: format!("DUP{}", n),
            required_stack: n as usize,
            gas_min: 3,
            gas_max: 3,
        });
        table.push(OpInfo {
            code: 0x8f + n,
            mnemonic: format!("SWAP{}", n),
            required_stack: n as usize + 1,
            gas_min: 3,
            gas_max: 3,
        });
    }
    for n in 0..=4u8 {
        table.push(OpInfo {
            code: 0xa0 + n,
            mnemonic: format!("LOG{}", n),
            required_stack: n as usize + 2,
            gas_min: (n as i64 + 1) * 375,
            gas_max: (n as i64 + 1) * 375 + 8 * 32,
        });
    }
    table
});

static BY_CODE: Lazy<HashMap<u8, &'static OpInfo>> =
    Lazy::new(|| TABLE.iter().map(|info| (info.code, info)).collect());

static BY_NAME: Lazy<HashMap<&'static str, &'static OpInfo>> =
    Lazy::new(|| TABLE.iter().map(|info| (info.mnemonic.as_str(), info)).collect());

/// Look up opcode metadata by its byte value.
pub fn by_code(code: u8) -> Option<&'static OpInfo> {
    BY_CODE.get(&code).copied()
}

/// Look up opcode metadata by mnemonic.
pub fn by_name(mnemonic: &str) -> Option<&'static OpInfo> {
    BY_NAME.get(mnemonic).copied()
}

/// The byte-wise length of an instruction (1 + immediate bytes for PUSHn).
pub fn instruction_length(mnemonic: &str) -> usize {
    1 + push_width(mnemonic).unwrap_or(0)
}

/// The number of immediate argument bytes for a `PUSHn` mnemonic.
pub fn push_width(mnemonic: &str) -> Option<usize> {
    mnemonic
        .strip_prefix("PUSH")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| (1..=32).contains(n))
}
