// SPDX-License-Identifier: AGPL-3.0

//! Bytecode disassembly: the linear instruction stream and the recovered
//! function-selector jump table.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisasmError {
    #[error("invalid bytecode hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A single decoded instruction.
#[derive(Debug, Clone)]
pub struct EvmInstruction {
    /// Byte offset of the opcode within the bytecode.
    pub address: usize,
    /// Raw opcode byte; kept so a disassembly can be re-encoded.
    pub code: u8,
    pub mnemonic: String,
    /// Immediate bytes for `PUSHn`, empty otherwise.
    pub argument: Vec<u8>,
    pub required_stack: usize,
    pub gas_min: i64,
    pub gas_max: i64,
}

impl EvmInstruction {
    /// Hex-format the immediate argument, zero-padded to at least eight
    /// digits. Used for the selector table where 4-byte hashes are the norm.
    pub fn format_argument(&self) -> String {
        if self.argument.is_empty() {
            return String::new();
        }
        let data = hex::encode(&self.argument);
        if data.len() < 8 {
            format!("0x{:0>8}", data)
        } else {
            format!("0x{}", data)
        }
    }

    pub fn easm_line(&self) -> String {
        if self.argument.is_empty() {
            format!("{} {}", self.address, self.mnemonic)
        } else {
            format!("{} {} 0x{}", self.address, self.mnemonic, hex::encode(&self.argument))
        }
    }
}

/// Decode a hex string (with or without `0x`) into an instruction stream.
///
/// A trailing 43-byte Swarm metadata blob (marked by the `bzzr` substring)
/// is excluded from the decoded region; unknown bytes decode to one-byte
/// `INVALID` pseudo-instructions.
pub fn disassemble(data: &str) -> Result<Vec<EvmInstruction>, DisasmError> {
    let bytecode = hex::decode(data.trim_start_matches("0x"))?;
    let mut length = bytecode.len();
    if length >= 43 {
        let tail = &bytecode[length - 43..];
        if tail.windows(4).any(|w| w == b"bzzr") {
            length -= 43;
        }
    }

    let mut instructions = Vec::new();
    let mut address = 0usize;
    while address < length {
        let byte = bytecode[address];
        let Some(info) = evmscan_opcodes::by_code(byte) else {
            instructions.push(EvmInstruction {
                address,
                code: byte,
                mnemonic: "INVALID".to_string(),
                argument: Vec::new(),
                required_stack: 0,
                gas_min: 0,
                gas_max: 0,
            });
            address += 1;
            continue;
        };
        let argument = match evmscan_opcodes::push_width(&info.mnemonic) {
            Some(n) => {
                let start = address + 1;
                let end = (start + n).min(bytecode.len());
                let mut arg = bytecode[start..end].to_vec();
                arg.resize(n, 0);
                arg
            }
            None => Vec::new(),
        };
        let advance = 1 + argument.len();
        instructions.push(EvmInstruction {
            address,
            code: byte,
            mnemonic: info.mnemonic.clone(),
            argument,
            required_stack: info.required_stack,
            gas_min: info.gas_min,
            gas_max: info.gas_max,
        });
        address += advance;
    }
    Ok(instructions)
}

/// Render an instruction stream as EVM assembly text.
pub fn easm(instructions: &[EvmInstruction]) -> String {
    let mut out = String::new();
    for instruction in instructions {
        let _ = writeln!(out, "{}", instruction.easm_line());
    }
    out
}

/// Find every index at which a sequence of opcode alternatives matches.
///
/// `patterns` is a list of positions, each holding the mnemonics accepted at
/// that position.
pub fn find_opcode_sequence(patterns: &[&[&str]], instructions: &[EvmInstruction]) -> Vec<usize> {
    let mut result = Vec::new();
    if patterns.is_empty() || instructions.len() < patterns.len() {
        return result;
    }
    for start in 0..=(instructions.len() - patterns.len()) {
        let matched = patterns.iter().enumerate().all(|(offset, alternatives)| {
            alternatives
                .iter()
                .any(|p| instructions[start + offset].mnemonic == *p)
        });
        if matched {
            result.push(start);
        }
    }
    result
}

/// Resolve a byte address to an instruction index: the first instruction at
/// or after that address.
pub fn instruction_index(instructions: &[EvmInstruction], address: usize) -> Option<usize> {
    instructions.iter().position(|i| i.address >= address)
}

/// A disassembled contract: the instruction stream plus the selector table
/// recovered from the dispatch prologue.
#[derive(Debug, Clone, Default)]
pub struct Disassembly {
    bytecode: String,
    instructions: Rc<Vec<EvmInstruction>>,
    func_hashes: Vec<String>,
    func_name_to_address: HashMap<String, usize>,
    func_address_to_name: HashMap<usize, String>,
}

impl Disassembly {
    pub fn new(bytecode: &str) -> Self {
        let mut disassembly = Disassembly::default();
        // undecodable bytecode yields an empty instruction stream
        let _ = disassembly.assign_bytecode(bytecode);
        disassembly
    }

    pub fn assign_bytecode(&mut self, bytecode: &str) -> Result<(), DisasmError> {
        let instructions = disassemble(bytecode)?;
        self.bytecode = bytecode.trim_start_matches("0x").to_string();
        self.func_hashes.clear();
        self.func_name_to_address.clear();
        self.func_address_to_name.clear();

        // Solidity dispatch prologues compare the selector with
        // [PUSH1..PUSH4] <hash> EQ and jump via the next PUSH.
        let jump_table =
            find_opcode_sequence(&[&["PUSH1", "PUSH2", "PUSH3", "PUSH4"], &["EQ"]], &instructions);
        for index in jump_table {
            let hash = instructions[index].format_argument();
            let name = format!("_function_{}", hash);
            self.func_hashes.push(hash);
            let Some(target_instruction) = instructions.get(index + 2) else {
                continue;
            };
            let target = target_instruction.format_argument();
            if let Ok(entry_point) =
                usize::from_str_radix(target.trim_start_matches("0x"), 16)
            {
                if entry_point != 0 {
                    self.func_name_to_address.insert(name.clone(), entry_point);
                    self.func_address_to_name.insert(entry_point, name);
                }
            }
        }
        self.instructions = Rc::new(instructions);
        Ok(())
    }

    pub fn bytecode(&self) -> &str {
        &self.bytecode
    }

    pub fn is_empty(&self) -> bool {
        self.bytecode.is_empty()
    }

    pub fn instructions(&self) -> &[EvmInstruction] {
        &self.instructions
    }

    pub fn easm(&self) -> String {
        easm(&self.instructions)
    }

    pub fn func_hashes(&self) -> &[String] {
        &self.func_hashes
    }

    pub fn entry_point(&self, function_name: &str) -> Option<usize> {
        self.func_name_to_address.get(function_name).copied()
    }

    pub fn function_at(&self, address: usize) -> Option<&str> {
        self.func_address_to_name.get(&address).map(String::as_str)
    }
}
