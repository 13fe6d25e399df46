// SPDX-License-Identifier: AGPL-3.0

//! Gas figures for hashing and the precompile stub. Only a loose budget:
//! consensus parity is a non-goal.

use evmscan_state::ceil32;

const KECCAK256_GAS: i64 = 30;
const KECCAK256_WORD_GAS: i64 = 6;

pub(crate) fn sha3_gas(length: i64) -> (i64, i64) {
    let gas = KECCAK256_GAS + KECCAK256_WORD_GAS * (ceil32(length) / 32);
    (gas, gas)
}

pub(crate) fn native_gas(size: i64, address: u64) -> (i64, i64) {
    let words = ceil32(size) / 32;
    let gas = match address {
        1 => 3000,
        2 => 60 + 12 * words,
        3 => 600 + 120 * words,
        4 => 15 + 3 * words,
        _ => 0,
    };
    (gas, gas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha3_word_rounding() {
        assert_eq!(sha3_gas(0), (30, 30));
        assert_eq!(sha3_gas(32), (36, 36));
        assert_eq!(sha3_gas(33), (42, 42));
    }

    #[test]
    fn native_costs() {
        assert_eq!(native_gas(0, 1), (3000, 3000));
        assert_eq!(native_gas(64, 2), (84, 84));
        assert_eq!(native_gas(32, 4), (18, 18));
        assert_eq!(native_gas(32, 9), (0, 0));
    }
}
