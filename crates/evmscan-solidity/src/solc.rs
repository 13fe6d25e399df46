// SPDX-License-Identifier: AGPL-3.0

//! Invocation of the `solc` binary via its standard-JSON interface.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{SolidityContract, SourceFile};

#[derive(Error, Debug)]
pub enum SolcError {
    #[error("failed to read source file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to run solc, is it installed? {0}")]
    Spawn(String),

    #[error("solc produced invalid output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("compilation failed: {0}")]
    Compiler(String),
}

#[derive(Deserialize)]
struct SolcOutput {
    #[serde(default)]
    errors: Vec<SolcDiagnostic>,
    #[serde(default)]
    contracts: HashMap<String, HashMap<String, SolcContract>>,
    #[serde(default)]
    sources: HashMap<String, SolcSource>,
}

#[derive(Deserialize)]
struct SolcDiagnostic {
    severity: String,
    #[serde(rename = "formattedMessage")]
    formatted_message: Option<String>,
    message: String,
}

#[derive(Deserialize)]
struct SolcContract {
    evm: SolcEvm,
}

#[derive(Deserialize)]
struct SolcEvm {
    bytecode: SolcBytecode,
    #[serde(rename = "deployedBytecode")]
    deployed_bytecode: SolcBytecode,
}

#[derive(Deserialize)]
struct SolcBytecode {
    #[serde(default)]
    object: String,
    #[serde(rename = "sourceMap", default)]
    source_map: String,
}

#[derive(Deserialize)]
struct SolcSource {
    id: i64,
}

/// Compile a Solidity file and return every contract it defines.
pub fn contracts_from_file(path: &Path) -> Result<Vec<SolidityContract>, SolcError> {
    let content = std::fs::read_to_string(path)?;
    let file_name = path.to_string_lossy().to_string();

    let mut sources_input = serde_json::Map::new();
    sources_input.insert(file_name.clone(), json!({ "content": content }));
    let input = json!({
        "language": "Solidity",
        "sources": sources_input,
        "settings": {
            "optimizer": { "enabled": false },
            "outputSelection": {
                "*": {
                    "*": [
                        "metadata",
                        "evm.bytecode",
                        "evm.deployedBytecode",
                        "evm.methodIdentifiers"
                    ]
                }
            }
        }
    });

    let output = run_solc(&input.to_string())?;
    let parsed: SolcOutput = serde_json::from_str(&output)?;

    let fatal: Vec<String> = parsed
        .errors
        .iter()
        .filter(|diagnostic| diagnostic.severity == "error")
        .map(|diagnostic| {
            diagnostic
                .formatted_message
                .clone()
                .unwrap_or_else(|| diagnostic.message.clone())
        })
        .collect();
    if !fatal.is_empty() {
        return Err(SolcError::Compiler(fatal.join("\n")));
    }

    // sources ordered by compiler-assigned id, as the source maps index them
    let mut ordered: Vec<(i64, String)> = parsed
        .sources
        .iter()
        .map(|(name, source)| (source.id, name.clone()))
        .collect();
    ordered.sort_by_key(|(id, _)| *id);
    let mut sources = Vec::new();
    for (_, name) in &ordered {
        let content = if *name == file_name {
            content.clone()
        } else {
            std::fs::read_to_string(name)?
        };
        sources.push(SourceFile {
            path: name.clone(),
            content,
        });
    }

    let mut contracts = Vec::new();
    for (source_name, file_contracts) in &parsed.contracts {
        for (contract_name, compiled) in file_contracts {
            debug!("compiled {}:{}", source_name, contract_name);
            contracts.push(SolidityContract::new(
                contract_name,
                &compiled.evm.deployed_bytecode.object,
                &compiled.evm.bytecode.object,
                &compiled.evm.deployed_bytecode.source_map,
                &compiled.evm.bytecode.source_map,
                sources.clone(),
            ));
        }
    }
    Ok(contracts)
}

fn run_solc(input: &str) -> Result<String, SolcError> {
    let mut child = Command::new("solc")
        .arg("--standard-json")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SolcError::Spawn(e.to_string()))?;

    child
        .stdin
        .as_mut()
        .expect("stdin was piped")
        .write_all(input.as_bytes())?;
    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(SolcError::Compiler(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_parsing() {
        let raw = r#"{
            "contracts": {
                "a.sol": {
                    "Wallet": {
                        "evm": {
                            "bytecode": {"object": "6080", "sourceMap": "0:2:0:-"},
                            "deployedBytecode": {"object": "6001", "sourceMap": "0:2:0:-"}
                        }
                    }
                }
            },
            "sources": {"a.sol": {"id": 0}}
        }"#;
        let parsed: SolcOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.contracts["a.sol"]["Wallet"].evm.bytecode.object, "6080");
        assert_eq!(parsed.sources["a.sol"].id, 0);
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn error_detection() {
        let raw = r#"{
            "errors": [
                {"severity": "warning", "message": "unused variable"},
                {"severity": "error", "message": "expected ;"}
            ]
        }"#;
        let parsed: SolcOutput = serde_json::from_str(raw).unwrap();
        let fatal: Vec<_> = parsed
            .errors
            .iter()
            .filter(|d| d.severity == "error")
            .collect();
        assert_eq!(fatal.len(), 1);
    }
}
