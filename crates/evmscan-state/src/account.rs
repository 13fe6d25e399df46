// SPDX-License-Identifier: AGPL-3.0

//! Accounts and their storage.

use std::collections::HashMap;

use evmscan_disasm::Disassembly;
use evmscan_smt::{Array, BitVec};
use z3::ast::Ast;
use z3::Context;

/// Contract storage backed by a symbolic array.
///
/// Concrete storage additionally shadows every written key; a read on a key
/// never written returns zero instead of a symbolic application, which is
/// the right model for freshly deployed contracts.
#[derive(Debug, Clone)]
pub struct Storage<'ctx> {
    concrete: bool,
    array: Array<'ctx>,
    known_keys: HashMap<String, BitVec<'ctx>>,
}

impl<'ctx> Storage<'ctx> {
    pub fn symbolic(ctx: &'ctx Context, name: &str) -> Self {
        Self {
            concrete: false,
            array: Array::new(ctx, name, 256),
            known_keys: HashMap::new(),
        }
    }

    pub fn concrete(ctx: &'ctx Context, name: &str) -> Self {
        Self {
            concrete: true,
            array: Array::new(ctx, name, 256),
            known_keys: HashMap::new(),
        }
    }

    pub fn is_concrete(&self) -> bool {
        self.concrete
    }

    pub fn get(&self, ctx: &'ctx Context, key: &BitVec<'ctx>) -> BitVec<'ctx> {
        if self.concrete && !self.known_keys.contains_key(&Self::key_id(key)) {
            return BitVec::from_u64(ctx, 0, self.array.range());
        }
        self.array.get(key)
    }

    pub fn set(&mut self, key: &BitVec<'ctx>, value: &BitVec<'ctx>) {
        self.array.set(key, value);
        if self.concrete {
            self.known_keys.insert(Self::key_id(key), value.clone());
        }
    }

    fn key_id(key: &BitVec<'ctx>) -> String {
        key.term().simplify().to_string()
    }
}

/// An account the interpreter has interacted with.
///
/// The balance lives in the world state's shared balances array, keyed by
/// this account's address; the account itself carries no balance field.
#[derive(Debug, Clone)]
pub struct Account<'ctx> {
    pub address: BitVec<'ctx>,
    pub nonce: u64,
    pub code: Disassembly,
    pub storage: Storage<'ctx>,
    pub contract_name: String,
    pub deleted: bool,
}

impl<'ctx> Account<'ctx> {
    pub fn new(
        ctx: &'ctx Context,
        address: BitVec<'ctx>,
        code: Option<Disassembly>,
        nonce: u64,
        contract_name: &str,
        concrete_storage: bool,
    ) -> Self {
        let contract_name = if contract_name.is_empty() {
            if address.is_symbolic() {
                "unknown".to_string()
            } else {
                address.hex_string()
            }
        } else {
            contract_name.to_string()
        };
        let storage_name = format!("storage_{}", contract_name);
        let storage = if concrete_storage {
            Storage::concrete(ctx, &storage_name)
        } else {
            Storage::symbolic(ctx, &storage_name)
        };
        Self {
            address,
            nonce,
            code: code.unwrap_or_default(),
            storage,
            contract_name,
            deleted: false,
        }
    }

    pub fn storage_get(&self, ctx: &'ctx Context, key: &BitVec<'ctx>) -> BitVec<'ctx> {
        self.storage.get(ctx, key)
    }

    pub fn storage_set(&mut self, key: &BitVec<'ctx>, value: &BitVec<'ctx>) {
        self.storage.set(key, value);
    }

    pub fn serialised_code(&self) -> &str {
        self.code.bytecode()
    }
}
