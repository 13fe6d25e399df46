// SPDX-License-Identifier: AGPL-3.0

//! Concrete Keccak-256 helpers used by the function managers, the
//! disassembler metadata and CREATE2 address derivation.

use sha3::{Digest, Keccak256};

/// Compute the Keccak-256 hash of a byte slice.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute the Keccak-256 hash of hex-encoded code (with or without `0x`).
pub fn keccak256_of_hex(code: &str) -> Result<[u8; 32], hex::FromHexError> {
    let data = hex::decode(code.trim_start_matches("0x"))?;
    Ok(keccak256(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(
            hex::encode(keccak256(&[])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn known_vector() {
        // keccak256 of the single zero word, the slot-0 mapping base
        let hash = keccak256(&[0u8; 32]);
        assert_eq!(
            hex::encode(hash),
            "290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"
        );
    }

    #[test]
    fn hex_input() {
        let direct = keccak256(&[0x60, 0x60, 0x60, 0x60, 0x60, 0x60]);
        let via_hex = keccak256_of_hex("0x606060606060").unwrap();
        assert_eq!(direct, via_hex);
    }
}
