// SPDX-License-Identifier: AGPL-3.0

//! Ordered path conditions.

use evmscan_smt::Bool;

/// The conjunction of booleans that must hold for the current path.
#[derive(Debug, Clone, Default)]
pub struct Constraints<'ctx> {
    items: Vec<Bool<'ctx>>,
}

impl<'ctx> Constraints<'ctx> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, constraint: Bool<'ctx>) {
        self.items.push(constraint);
    }

    pub fn extend(&mut self, constraints: impl IntoIterator<Item = Bool<'ctx>>) {
        self.items.extend(constraints);
    }

    pub fn as_slice(&self) -> &[Bool<'ctx>] {
        &self.items
    }

    pub fn to_vec(&self) -> Vec<Bool<'ctx>> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bool<'ctx>> {
        self.items.iter()
    }
}
