// SPDX-License-Identifier: AGPL-3.0

//! Concrete-input stub for the precompiled contracts at addresses 1..9.
//!
//! Only SHA-256 and the identity contract execute for real; everything
//! else reports `Unsupported` and the caller falls back to fresh symbolic
//! output bytes.

use sha2::{Digest, Sha256};

pub(crate) const PRECOMPILE_FIRST: u64 = 1;
pub(crate) const PRECOMPILE_LAST: u64 = 9;

#[derive(Debug)]
pub(crate) enum NativeError {
    Unsupported,
}

pub(crate) fn native_name(address: u64) -> &'static str {
    match address {
        1 => "ecrecover",
        2 => "sha256",
        3 => "ripemd160",
        4 => "identity",
        5 => "mod_exp",
        6 => "ec_add",
        7 => "ec_mul",
        8 => "ec_pair",
        9 => "blake2b_fcompress",
        _ => "unknown",
    }
}

pub(crate) fn execute(address: u64, input: &[u8]) -> Result<Vec<u8>, NativeError> {
    match address {
        2 => {
            let mut hasher = Sha256::new();
            hasher.update(input);
            Ok(hasher.finalize().to_vec())
        }
        4 => Ok(input.to_vec()),
        _ => Err(NativeError::Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_echoes_input() {
        assert_eq!(execute(4, &[1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn sha256_known_vector() {
        let digest = execute(2, b"abc").unwrap();
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn unsupported_contracts_fall_back() {
        assert!(execute(1, &[0u8; 128]).is_err());
        assert!(execute(9, &[]).is_err());
    }
}
