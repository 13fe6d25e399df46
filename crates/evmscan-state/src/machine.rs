// SPDX-License-Identifier: AGPL-3.0

//! Machine state: operand stack, memory, program counter and gas totals.

use evmscan_errors::{VmError, VmResult};
use evmscan_smt::{Annotation, BitVec, Bool};
use z3::Context;

use crate::ceil32;
use crate::memory::Memory;

pub const STACK_LIMIT: usize = 1024;

const MEMORY_GAS: i64 = 3;
const QUAD_COEFF_DIV: i64 = 512;

/// A stack slot: either a bit-vector or a boolean term.
#[derive(Debug, Clone)]
pub enum StackItem<'ctx> {
    BitVec(BitVec<'ctx>),
    Bool(Bool<'ctx>),
}

impl<'ctx> StackItem<'ctx> {
    /// View as a 256-bit value; booleans become `ite(b, 1, 0)`.
    pub fn as_bitvec(&self) -> BitVec<'ctx> {
        match self {
            StackItem::BitVec(bv) => bv.clone(),
            StackItem::Bool(b) => b.as_bitvec(256),
        }
    }

    /// View as a boolean; bit-vectors become `v == 1`.
    pub fn as_bool(&self) -> Bool<'ctx> {
        match self {
            StackItem::BitVec(bv) => bv.as_bool(),
            StackItem::Bool(b) => b.clone(),
        }
    }

    pub fn annotations(&self) -> &[Annotation<'ctx>] {
        match self {
            StackItem::BitVec(bv) => bv.annotations(),
            StackItem::Bool(b) => b.annotations(),
        }
    }

    pub fn annotate(&mut self, annotation: Annotation<'ctx>) {
        match self {
            StackItem::BitVec(bv) => bv.annotate(annotation),
            StackItem::Bool(b) => b.annotate(annotation),
        }
    }
}

impl<'ctx> From<BitVec<'ctx>> for StackItem<'ctx> {
    fn from(bv: BitVec<'ctx>) -> Self {
        StackItem::BitVec(bv)
    }
}

impl<'ctx> From<Bool<'ctx>> for StackItem<'ctx> {
    fn from(b: Bool<'ctx>) -> Self {
        StackItem::Bool(b)
    }
}

/// Per-frame machine state.
#[derive(Debug, Clone)]
pub struct MachineState<'ctx> {
    stack: Vec<StackItem<'ctx>>,
    subroutine_stack: Vec<usize>,
    pub memory: Memory<'ctx>,
    pc: usize,
    gas_limit: i64,
    gas_used_min: i64,
    gas_used_max: i64,
    depth: usize,
}

impl<'ctx> MachineState<'ctx> {
    pub fn new(gas_limit: i64) -> Self {
        Self {
            stack: Vec::new(),
            subroutine_stack: Vec::new(),
            memory: Memory::new(),
            pc: 0,
            gas_limit,
            gas_used_min: 0,
            gas_used_max: 0,
            depth: 0,
        }
    }

    // Stack.

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    pub fn push(&mut self, item: impl Into<StackItem<'ctx>>) -> VmResult<()> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(item.into());
        Ok(())
    }

    pub fn pop(&mut self) -> VmResult<StackItem<'ctx>> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    pub fn pop_bitvec(&mut self) -> VmResult<BitVec<'ctx>> {
        Ok(self.pop()?.as_bitvec())
    }

    pub fn pop_bool(&mut self) -> VmResult<Bool<'ctx>> {
        Ok(self.pop()?.as_bool())
    }

    pub fn top(&self) -> VmResult<&StackItem<'ctx>> {
        self.stack.last().ok_or(VmError::StackUnderflow)
    }

    pub fn top_mut(&mut self) -> VmResult<&mut StackItem<'ctx>> {
        self.stack.last_mut().ok_or(VmError::StackUnderflow)
    }

    /// The n-th element counting from the top, 1-based: `from_top(1)` is the
    /// top of the stack.
    pub fn from_top(&self, n: usize) -> VmResult<&StackItem<'ctx>> {
        if n == 0 || n > self.stack.len() {
            return Err(VmError::StackUnderflow);
        }
        Ok(&self.stack[self.stack.len() - n])
    }

    /// Duplicate the n-th element from the top (DUPn).
    pub fn dup(&mut self, n: usize) -> VmResult<()> {
        let item = self.from_top(n)?.clone();
        self.push(item)
    }

    /// Exchange the top with the (n+1)-th element (SWAPn).
    pub fn swap(&mut self, n: usize) -> VmResult<()> {
        let len = self.stack.len();
        if len < n + 1 {
            return Err(VmError::StackUnderflow);
        }
        self.stack.swap(len - 1, len - 1 - n);
        Ok(())
    }

    // Subroutine stack (BEGINSUB/JUMPSUB/RETURNSUB).

    pub fn push_return_pc(&mut self, pc: usize) -> VmResult<()> {
        if self.subroutine_stack.len() >= STACK_LIMIT {
            return Err(VmError::StackOverflow);
        }
        self.subroutine_stack.push(pc);
        Ok(())
    }

    pub fn pop_return_pc(&mut self) -> VmResult<usize> {
        self.subroutine_stack.pop().ok_or(VmError::StackUnderflow)
    }

    // Program counter.

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn advance(&mut self) {
        self.pc += 1;
    }

    pub fn jump(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn increase_depth(&mut self) {
        self.depth += 1;
    }

    // Gas.

    pub fn gas_limit(&self) -> i64 {
        self.gas_limit
    }

    pub fn gas_used_min(&self) -> i64 {
        self.gas_used_min
    }

    pub fn gas_used_max(&self) -> i64 {
        self.gas_used_max
    }

    pub fn add_gas(&mut self, min: i64, max: i64) {
        self.gas_used_min += min;
        self.gas_used_max += max;
    }

    pub fn check_gas(&self) -> VmResult<()> {
        if self.gas_used_min > self.gas_limit {
            return Err(VmError::OutOfGas);
        }
        Ok(())
    }

    /// Extend memory to cover `[offset, offset + length)`, rounded up to a
    /// 32-byte boundary, charging quadratic growth gas.
    pub fn mem_extend(&mut self, offset: i64, length: i64) -> VmResult<()> {
        if length <= 0 {
            return Ok(());
        }
        let new_size = ceil32(offset + length);
        let old_words = self.memory.size() as i64 / 32;
        let new_words = new_size / 32;
        if new_words <= old_words {
            return Ok(());
        }
        let fee = |words: i64| words * MEMORY_GAS + words * words / QUAD_COEFF_DIV;
        let growth_gas = fee(new_words) - fee(old_words);
        self.add_gas(growth_gas, growth_gas);
        self.check_gas()?;
        self.memory.grow_to(new_size as u64);
        Ok(())
    }

    pub fn mem_read_word(&self, ctx: &'ctx Context, offset: u64) -> BitVec<'ctx> {
        self.memory.read_word(ctx, offset)
    }
}
