// SPDX-License-Identifier: AGPL-3.0

//! Arithmetic opcodes. Division and modulo by zero yield zero without
//! trapping, expressed with `ite` so symbolic divisors branch correctly.

use evmscan_smt::BitVec;
use evmscan_state::GlobalState;

use crate::context::ExecContext;
use crate::instruction::{step, HandlerResult};

pub(crate) fn add<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.add(&op2))?;
    step(gs)
}

pub(crate) fn sub<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.sub(&op2))?;
    step(gs)
}

pub(crate) fn mul<'ctx>(_ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(op1.mul(&op2))?;
    step(gs)
}

pub(crate) fn div<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(guard_zero(ectx, &op2, &op1.udiv(&op2)))?;
    step(gs)
}

pub(crate) fn sdiv<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(guard_zero(ectx, &op2, &op1.sdiv(&op2)))?;
    step(gs)
}

pub(crate) fn umod<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(guard_zero(ectx, &op2, &op1.urem(&op2)))?;
    step(gs)
}

pub(crate) fn smod<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    gs.machine_state.push(guard_zero(ectx, &op2, &op1.srem(&op2)))?;
    step(gs)
}

/// `(a + b) % n` over a widened intermediate so the sum cannot wrap.
pub(crate) fn addmod<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    let op3 = gs.machine_state.pop_bitvec()?;

    let wide = 256 + 8;
    let sum = op1.pad_to_size(wide).add(&op2.pad_to_size(wide));
    let modulus = op3.pad_to_size(wide);
    let reduced = sum.urem(&modulus).extract(255, 0);
    gs.machine_state.push(guard_zero(ectx, &op3, &reduced))?;
    step(gs)
}

/// `(a * b) % n` over a doubled width.
pub(crate) fn mulmod<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let op1 = gs.machine_state.pop_bitvec()?;
    let op2 = gs.machine_state.pop_bitvec()?;
    let op3 = gs.machine_state.pop_bitvec()?;

    let wide = 512;
    let product = op1.pad_to_size(wide).mul(&op2.pad_to_size(wide));
    let modulus = op3.pad_to_size(wide);
    let reduced = product.urem(&modulus).extract(255, 0);
    gs.machine_state.push(guard_zero(ectx, &op3, &reduced))?;
    step(gs)
}

pub(crate) fn exp<'ctx>(ectx: &ExecContext<'ctx>, mut gs: GlobalState<'ctx>) -> HandlerResult<'ctx> {
    let base = gs.machine_state.pop_bitvec()?;
    let exponent = gs.machine_state.pop_bitvec()?;
    let (result, constraint) = ectx.exponent.create_condition(&base, &exponent);
    gs.machine_state.push(result)?;
    gs.world_state.add_constraint(constraint);
    step(gs)
}

/// Sign-extend `x` at bit `b*8 + 7` for `b < 31`; otherwise `x` unchanged.
pub(crate) fn signextend<'ctx>(
    ectx: &ExecContext<'ctx>,
    mut gs: GlobalState<'ctx>,
) -> HandlerResult<'ctx> {
    let b = gs.machine_state.pop_bitvec()?;
    let x = gs.machine_state.pop_bitvec()?;
    let ctx = ectx.z3();

    let one = BitVec::from_u64(ctx, 1, 256);
    let eight = BitVec::from_u64(ctx, 8, 256);
    let seven = BitVec::from_u64(ctx, 7, 256);
    let zero = BitVec::from_u64(ctx, 0, 256);
    let thirty_one = BitVec::from_u64(ctx, 31, 256);

    let test_bit = b.mul(&eight).add(&seven);
    let sign_mask = one.shl(&test_bit);
    let low_mask = sign_mask.shl(&one).sub(&one);

    let sign_set = x.and(&sign_mask).eq(&zero).not();
    let extended = BitVec::ite(
        &sign_set,
        &x.or(&low_mask.not()),
        &x.and(&low_mask),
    );
    let result = BitVec::ite(&b.ult(&thirty_one), &extended, &x);

    gs.machine_state.push(result)?;
    step(gs)
}

fn guard_zero<'ctx>(
    ectx: &ExecContext<'ctx>,
    divisor: &BitVec<'ctx>,
    quotient: &BitVec<'ctx>,
) -> BitVec<'ctx> {
    let zero = BitVec::from_u64(ectx.z3(), 0, quotient.size());
    let divisor_zero = divisor.eq(&BitVec::from_u64(ectx.z3(), 0, divisor.size()));
    BitVec::ite(&divisor_zero, &zero, quotient)
}
