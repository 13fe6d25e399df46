// SPDX-License-Identifier: AGPL-3.0

//! The world state: every account the interpreter has touched, the shared
//! balances array, the path condition and the transaction history.

use std::collections::HashMap;
use std::rc::Rc;

use alloy_primitives::Address;
use evmscan_disasm::Disassembly;
use evmscan_smt::{Annotation, Array, BitVec, Bool};
use z3::Context;

use crate::account::Account;
use crate::constraints::Constraints;
use crate::transaction::Transaction;
use crate::AddressKey;

#[derive(Clone)]
pub struct WorldState<'ctx> {
    ctx: &'ctx Context,
    accounts: HashMap<AddressKey, Account<'ctx>>,
    balances: Array<'ctx>,
    starting_balances: Array<'ctx>,
    constraints: Constraints<'ctx>,
    pub transaction_sequence: Vec<Rc<Transaction<'ctx>>>,
    annotations: Vec<Annotation<'ctx>>,
}

impl<'ctx> std::fmt::Debug for WorldState<'ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldState")
            .field("accounts", &self.accounts.keys().collect::<Vec<_>>())
            .field("constraints", &self.constraints.len())
            .field("transactions", &self.transaction_sequence.len())
            .finish()
    }
}

impl<'ctx> WorldState<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self {
            ctx,
            accounts: HashMap::new(),
            balances: Array::new(ctx, "balance", 256),
            starting_balances: Array::new(ctx, "starting_balance", 256),
            constraints: Constraints::new(),
            transaction_sequence: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn z3(&self) -> &'ctx Context {
        self.ctx
    }

    // Balances. An account's balance is the shared array at its address.

    pub fn balance_of(&self, address: &BitVec<'ctx>) -> BitVec<'ctx> {
        self.balances.get(&widen(self.ctx, address))
    }

    pub fn set_balance(&mut self, address: &BitVec<'ctx>, value: &BitVec<'ctx>) {
        self.balances.set(&widen(self.ctx, address), value);
    }

    /// Credit `amount` to `address`.
    pub fn credit(&mut self, address: &BitVec<'ctx>, amount: &BitVec<'ctx>) {
        let updated = self.balance_of(address).add(amount);
        self.set_balance(address, &updated);
    }

    /// The balances as of world-state creation, for counter-example output.
    pub fn starting_balances(&self) -> &Array<'ctx> {
        &self.starting_balances
    }

    // Path condition.

    pub fn constraints(&self) -> &Constraints<'ctx> {
        &self.constraints
    }

    pub fn add_constraint(&mut self, constraint: Bool<'ctx>) {
        self.constraints.push(constraint);
    }

    pub fn add_constraints(&mut self, constraints: impl IntoIterator<Item = Bool<'ctx>>) {
        self.constraints.extend(constraints);
    }

    // Accounts.

    pub fn accounts(&self) -> impl Iterator<Item = &Account<'ctx>> {
        self.accounts.values()
    }

    pub fn account(&self, key: &AddressKey) -> Option<&Account<'ctx>> {
        self.accounts.get(key)
    }

    pub fn account_mut(&mut self, key: &AddressKey) -> Option<&mut Account<'ctx>> {
        self.accounts.get_mut(key)
    }

    pub fn put_account(&mut self, account: Account<'ctx>) {
        self.accounts.insert(AddressKey::of(&account.address), account);
    }

    /// Fetch the account at `address`, materialising an empty one on first
    /// contact.
    pub fn existing_or_load(&mut self, address: &BitVec<'ctx>) -> &mut Account<'ctx> {
        let ctx = self.ctx;
        let key = AddressKey::of(address);
        self.accounts
            .entry(key)
            .or_insert_with(|| Account::new(ctx, address.clone(), None, 0, "", false))
    }

    /// Create an account, generating an address when none is given.
    pub fn create_account(
        &mut self,
        balance: u64,
        address: Option<BitVec<'ctx>>,
        concrete_storage: bool,
        creator: Option<&BitVec<'ctx>>,
        code: Option<Disassembly>,
        nonce: u64,
    ) -> AddressKey {
        let address = address.unwrap_or_else(|| self.generate_new_address(creator, nonce));
        if let Some(creator_address) = creator {
            let creator_key = AddressKey::of(creator_address);
            if !self.accounts.contains_key(&creator_key) {
                self.put_account(Account::new(
                    self.ctx,
                    creator_address.clone(),
                    None,
                    0,
                    "",
                    false,
                ));
            }
        }
        let account = Account::new(self.ctx, address.clone(), code, nonce, "", concrete_storage);
        let key = AddressKey::of(&account.address);
        self.set_balance(&address, &BitVec::from_u64(self.ctx, balance, 256));
        self.accounts.insert(key.clone(), account);
        key
    }

    /// A deployment address: the canonical creator/nonce derivation when the
    /// creator is concrete, otherwise the first free small address.
    fn generate_new_address(&self, creator: Option<&BitVec<'ctx>>, nonce: u64) -> BitVec<'ctx> {
        if let Some(creator) = creator {
            if !creator.is_symbolic() {
                let bytes = creator.pad_to_size(256).to_bytes();
                let creator_address = Address::from_slice(&bytes[12..32]);
                let derived = creator_address.create(nonce);
                return BitVec::from_bytes(self.ctx, derived.as_slice(), 256);
            }
        }
        for candidate in 0..66u64 {
            if !self.accounts.contains_key(&AddressKey::concrete(candidate)) {
                return BitVec::from_u64(self.ctx, candidate, 256);
            }
        }
        tracing::error!("address generation exhausted the search limit");
        BitVec::from_u64(self.ctx, 66, 256)
    }

    // Annotations.

    pub fn add_annotation(&mut self, annotation: Annotation<'ctx>) {
        self.annotations.push(annotation);
    }

    pub fn annotations(&self) -> &[Annotation<'ctx>] {
        &self.annotations
    }
}

/// Balances are keyed by 256-bit terms; widen narrower address terms.
fn widen<'ctx>(_ctx: &'ctx Context, address: &BitVec<'ctx>) -> BitVec<'ctx> {
    if address.size() == 256 {
        address.clone()
    } else {
        address.pad_to_size(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::Config;

    #[test]
    fn balances_are_shared_by_address() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut world = WorldState::new(&ctx);
        let address = BitVec::from_u64(&ctx, 0x65, 256);
        world.create_account(10, Some(address.clone()), false, None, None, 0);

        assert_eq!(world.balance_of(&address).as_u64(), Some(10));
        world.credit(&address, &BitVec::from_u64(&ctx, 5, 256));
        assert_eq!(world.balance_of(&address).as_u64(), Some(15));
    }

    #[test]
    fn unseen_addresses_materialise_on_demand() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut world = WorldState::new(&ctx);
        let address = BitVec::from_u64(&ctx, 0x79, 256);
        assert!(world.account(&AddressKey::of(&address)).is_none());

        let account = world.existing_or_load(&address);
        assert!(account.code.is_empty());
        assert!(world.account(&AddressKey::of(&address)).is_some());
    }

    #[test]
    fn generated_addresses_avoid_collisions() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut world = WorldState::new(&ctx);
        let first = world.create_account(0, None, false, None, None, 0);
        let second = world.create_account(0, None, false, None, None, 0);
        assert_ne!(first, second);
    }

    #[test]
    fn creator_derived_address() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut world = WorldState::new(&ctx);
        let creator = BitVec::from_u64(&ctx, 9999, 256);
        let key = world.create_account(0, None, true, Some(&creator), None, 0);
        // the canonical derivation is deterministic for (creator, nonce)
        let expected = {
            let bytes = creator.to_bytes();
            Address::from_slice(&bytes[12..32]).create(0)
        };
        assert_eq!(
            key,
            AddressKey::of(&BitVec::from_bytes(&ctx, expected.as_slice(), 256))
        );
    }

    #[test]
    fn clones_do_not_share_balance_updates() {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);

        let mut world = WorldState::new(&ctx);
        let address = BitVec::from_u64(&ctx, 1, 256);
        world.create_account(100, Some(address.clone()), false, None, None, 0);

        let snapshot = world.clone();
        world.set_balance(&address, &BitVec::from_u64(&ctx, 0, 256));

        assert_eq!(snapshot.balance_of(&address).as_u64(), Some(100));
        assert_eq!(world.balance_of(&address).as_u64(), Some(0));
    }
}
