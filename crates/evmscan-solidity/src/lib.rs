// SPDX-License-Identifier: AGPL-3.0

//! The compiler-facing side of the scanner: solc invocation and the
//! mapping from instruction offsets back to source lines.

use once_cell::sync::Lazy;
use regex::Regex;

use evmscan_disasm::Disassembly;

mod solc;
mod srcmap;

pub use solc::{contracts_from_file, SolcError};
pub use srcmap::{parse_source_map, SourceMapEntry};

/// Unlinked library placeholders (`__LibName…__`) are not valid hex;
/// replace them with a dummy address before disassembly.
static LIBRARY_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new("_{2}.{38}").expect("pattern compiles"));

pub fn replace_library_placeholders(code: &str) -> String {
    LIBRARY_PLACEHOLDER
        .replace_all(code, "aa".repeat(20).as_str())
        .to_string()
}

/// One source file fed to the compiler.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

/// A resolved source location for issue reporting.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_name: String,
    pub line: usize,
    pub code: String,
}

/// A compiled contract with both bytecodes, their disassemblies, and the
/// source maps to resolve instruction offsets.
#[derive(Debug, Clone)]
pub struct SolidityContract {
    pub name: String,
    /// Runtime bytecode hex.
    pub code: String,
    /// Creation bytecode hex.
    pub creation_code: String,
    pub disassembly: Disassembly,
    pub creation_disassembly: Disassembly,
    srcmap: Vec<SourceMapEntry>,
    creation_srcmap: Vec<SourceMapEntry>,
    sources: Vec<SourceFile>,
}

impl SolidityContract {
    pub fn new(
        name: &str,
        code: &str,
        creation_code: &str,
        srcmap: &str,
        creation_srcmap: &str,
        sources: Vec<SourceFile>,
    ) -> Self {
        let code = replace_library_placeholders(code);
        let creation_code = replace_library_placeholders(creation_code);
        Self {
            name: name.to_string(),
            disassembly: Disassembly::new(&code),
            creation_disassembly: Disassembly::new(&creation_code),
            code,
            creation_code,
            srcmap: parse_source_map(srcmap),
            creation_srcmap: parse_source_map(creation_srcmap),
            sources,
        }
    }

    /// A contract from raw bytecode with no source information, as used by
    /// tests and direct bytecode scans.
    pub fn from_bytecode(name: &str, code: &str, creation_code: &str) -> Self {
        Self::new(name, code, creation_code, "", "", Vec::new())
    }

    pub fn easm(&self) -> String {
        self.disassembly.easm()
    }

    pub fn creation_easm(&self) -> String {
        self.creation_disassembly.easm()
    }

    /// Resolve a byte address to file, line and snippet.
    pub fn source_info(&self, address: usize, is_constructor: bool) -> Option<SourceInfo> {
        let (disassembly, srcmap) = if is_constructor {
            (&self.creation_disassembly, &self.creation_srcmap)
        } else {
            (&self.disassembly, &self.srcmap)
        };

        let index = disassembly
            .instructions()
            .iter()
            .position(|instruction| instruction.address == address)?;
        let entry = srcmap.get(index)?;
        if entry.file < 0 {
            return None;
        }
        let source = self.sources.get(entry.file as usize)?;
        let end = (entry.offset + entry.length).min(source.content.len());
        let snippet = source.content.get(entry.offset..end)?;
        let line = source.content[..entry.offset.min(source.content.len())]
            .bytes()
            .filter(|&b| b == b'\n')
            .count()
            + 1;

        Some(SourceInfo {
            file_name: source.path.clone(),
            line,
            code: snippet.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_become_addresses() {
        let code = format!("6080__{}__6040", "a".repeat(36));
        let replaced = replace_library_placeholders(&code);
        assert!(!replaced.contains("__"));
        assert_eq!(replaced, format!("6080{}6040", "aa".repeat(20)));
    }

    #[test]
    fn source_info_resolves_lines() {
        // two instructions; the second maps to the transfer call on line 3
        let source = "contract C {\n  function f() public {\n    msg.sender.transfer(1 ether);\n  }\n}\n";
        let offset = source.find("msg.sender").unwrap();
        let srcmap = format!("0:10:0:-;{}:28:0:-", offset);
        let contract = SolidityContract::new(
            "C",
            "60805b",
            "",
            &srcmap,
            "",
            vec![SourceFile {
                path: "C.sol".to_string(),
                content: source.to_string(),
            }],
        );

        let info = contract.source_info(2, false).unwrap();
        assert_eq!(info.file_name, "C.sol");
        assert_eq!(info.line, 3);
        assert_eq!(info.code, "msg.sender.transfer(1 ether)");
    }

    #[test]
    fn unknown_address_is_none() {
        let contract = SolidityContract::from_bytecode("C", "6080", "");
        assert!(contract.source_info(100, false).is_none());
    }

    #[test]
    fn generated_code_is_unmapped() {
        let contract = SolidityContract::new(
            "C",
            "6080",
            "",
            "0:10:-1:-",
            "",
            vec![SourceFile {
                path: "C.sol".to_string(),
                content: "contract C {}".to_string(),
            }],
        );
        assert!(contract.source_info(0, false).is_none());
    }
}
