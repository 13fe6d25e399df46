// SPDX-License-Identifier: AGPL-3.0

//! End-to-end opcode scenarios driven through the dispatcher.

use std::cell::RefCell;
use std::rc::Rc;

use num_bigint::BigUint;
use z3::{Config, Context};

use evmscan_disasm::Disassembly;
use evmscan_sevm::{ExecContext, Instruction, StepOutcome};
use evmscan_smt::{BitVec, SatResult, Solver};
use evmscan_state::{
    AddressKey, Calldata, GlobalState, MessageCallTransaction, ReturnData, Transaction, TxInfo,
    WorldState,
};

/// A runnable state for a message call against an account at 0x65 holding
/// `code_hex`, with a top-level frame on the transaction stack.
fn test_state<'ctx>(ectx: &ExecContext<'ctx>, code_hex: &str) -> GlobalState<'ctx> {
    let ctx = ectx.z3();
    let mut world = WorldState::new(ctx);
    let address = BitVec::from_u64(ctx, 0x65, 256);
    world.create_account(
        10,
        Some(address.clone()),
        false,
        None,
        Some(Disassembly::new(code_hex)),
        0,
    );
    let account = world.account(&AddressKey::of(&address)).unwrap().clone();
    let caller = BitVec::from_u64(ctx, 9999, 256);

    let tx = Rc::new(Transaction::MessageCall(MessageCallTransaction {
        world_state: world,
        callee_account: account.clone(),
        caller: caller.clone(),
        calldata: Calldata::concrete(ctx, "1", vec![]),
        id: "1".to_string(),
        gas_price: BitVec::from_u64(ctx, 1, 256),
        gas_limit: BitVec::from_u64(ctx, 8_000_000, 256),
        origin: caller,
        code: account.code.clone(),
        call_value: BitVec::from_u64(ctx, 0, 256),
        static_flag: false,
        return_data: RefCell::new(String::new()),
    }));
    let mut gs = tx.initial_global_state();
    gs.transaction_stack.push(TxInfo {
        caller_state: None,
        tx,
    });
    gs
}

fn single_successor<'ctx>(outcome: StepOutcome<'ctx>) -> GlobalState<'ctx> {
    match outcome {
        StepOutcome::Continue(mut states) => {
            assert_eq!(states.len(), 1, "expected exactly one successor");
            states.pop().unwrap()
        }
        other => panic!("expected Continue, got {:?}", std::mem::discriminant(&other)),
    }
}

fn push_word<'ctx>(gs: &mut GlobalState<'ctx>, ctx: &'ctx Context, hex: &str) {
    let value = BigUint::parse_bytes(hex.trim_start_matches("0x").as_bytes(), 16).unwrap();
    gs.machine_state
        .push(BitVec::from_biguint(ctx, &value, 256))
        .unwrap();
}

/// Pop-order helper: `op2` is pushed first, so `op1` is on top.
fn run_shift(ectx: &ExecContext<'_>, mnemonic: &str, op1: &str, op2: &str) -> BigUint {
    let mut gs = test_state(ectx, "60606040");
    push_word(&mut gs, ectx.z3(), op2);
    push_word(&mut gs, ectx.z3(), op1);
    let outcome = Instruction::new(mnemonic, ectx).evaluate(gs).unwrap();
    let result = single_successor(outcome);
    result
        .machine_state
        .top()
        .unwrap()
        .as_bitvec()
        .as_biguint()
        .unwrap()
}

const NEG_ONE: &str = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

#[test]
fn ashr_boundary_vectors() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let top_bit = "8000000000000000000000000000000000000000000000000000000000000000";
    let cases = [
        ("01", "00", "01"),
        ("01", "01", "00"),
        (top_bit, "01", "c000000000000000000000000000000000000000000000000000000000000000"),
        (top_bit, "ff", NEG_ONE),
        (top_bit, "0100", NEG_ONE),
        (top_bit, "0101", NEG_ONE),
        (NEG_ONE, "00", NEG_ONE),
        (NEG_ONE, "01", NEG_ONE),
        (NEG_ONE, "ff", NEG_ONE),
        (NEG_ONE, "0100", NEG_ONE),
        ("00", "01", "00"),
        ("4000000000000000000000000000000000000000000000000000000000000000", "fe", "01"),
        ("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff", "f8", "7f"),
        ("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff", "fe", "01"),
        ("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff", "ff", "00"),
        ("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff", "0100", "00"),
    ];
    for (op1, op2, expected) in cases {
        let result = run_shift(&ectx, "SAR", op1, op2);
        let expected = BigUint::parse_bytes(expected.as_bytes(), 16).unwrap();
        assert_eq!(result, expected, "SAR {} >> {}", op1, op2);
    }
}

#[test]
fn shl_boundary_vectors() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let cases = [
        ("01", "00", "01"),
        ("01", "01", "02"),
        ("01", "ff", "8000000000000000000000000000000000000000000000000000000000000000"),
        ("01", "0100", "00"),
        ("01", "0101", "00"),
        (NEG_ONE, "00", NEG_ONE),
        (NEG_ONE, "01", "fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffe"),
        (NEG_ONE, "ff", "8000000000000000000000000000000000000000000000000000000000000000"),
        (NEG_ONE, "0100", "00"),
        ("00", "01", "00"),
        ("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff", "01", "fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffe"),
    ];
    for (op1, op2, expected) in cases {
        let result = run_shift(&ectx, "SHL", op1, op2);
        let expected = BigUint::parse_bytes(expected.as_bytes(), 16).unwrap();
        assert_eq!(result, expected, "SHL {} << {}", op1, op2);
    }
}

#[test]
fn shr_boundary_vectors() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let top_bit = "8000000000000000000000000000000000000000000000000000000000000000";
    let cases = [
        ("01", "00", "01"),
        ("01", "01", "00"),
        (top_bit, "01", "4000000000000000000000000000000000000000000000000000000000000000"),
        (top_bit, "ff", "01"),
        (top_bit, "0100", "00"),
        (top_bit, "0101", "00"),
        (NEG_ONE, "00", NEG_ONE),
        (NEG_ONE, "01", "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
        (NEG_ONE, "ff", "01"),
        (NEG_ONE, "0100", "00"),
        ("00", "01", "00"),
    ];
    for (op1, op2, expected) in cases {
        let result = run_shift(&ectx, "SHR", op1, op2);
        let expected = BigUint::parse_bytes(expected.as_bytes(), 16).unwrap();
        assert_eq!(result, expected, "SHR {} >> {}", op1, op2);
    }
}

/// Two accounts: the running contract at 0x65 and an extcode target at
/// 0x79. Copying three bytes of the target's code lands its prefix in
/// memory.
#[test]
fn extcodecopy_reads_foreign_code() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let mut gs = test_state(&ectx, "60606040");
    let target = BitVec::from_u64(&ctx, 0x79, 256);
    gs.world_state.create_account(
        0,
        Some(target.clone()),
        false,
        None,
        Some(Disassembly::new("6040404040")),
        0,
    );

    // EXTCODECOPY pops addr, dst, src, len
    push_word(&mut gs, &ctx, "03");
    push_word(&mut gs, &ctx, "00");
    push_word(&mut gs, &ctx, "00");
    push_word(&mut gs, &ctx, "79");

    let outcome = Instruction::new("EXTCODECOPY", &ectx).evaluate(gs).unwrap();
    let result = single_successor(outcome);
    assert_eq!(result.machine_state.memory.read_byte(&ctx, 0).as_u64(), Some(0x60));
    assert_eq!(result.machine_state.memory.read_byte(&ctx, 1).as_u64(), Some(0x40));
    assert_eq!(result.machine_state.memory.read_byte(&ctx, 2).as_u64(), Some(0x40));
}

/// EXTCODEHASH of an address no account exists at yields zero.
#[test]
fn extcodehash_missing_account_is_zero() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let mut gs = test_state(&ectx, "60606040");
    push_word(&mut gs, &ctx, "01");

    let outcome = Instruction::new("EXTCODEHASH", &ectx).evaluate(gs).unwrap();
    let result = single_successor(outcome);
    assert_eq!(result.machine_state.top().unwrap().as_bitvec().as_u64(), Some(0));
}

/// CREATE2 with a concrete salt derives
/// `keccak256(0xff ‖ caller ‖ salt ‖ keccak256(code))[12..]`.
#[test]
fn create2_concrete_salt_address() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let init_code = [0x60u8, 0x60, 0x60, 0x60, 0x60, 0x60];
    let mut gs = test_state(&ectx, "60606040");
    for (i, byte) in init_code.iter().enumerate() {
        gs.machine_state
            .memory
            .write_byte(i as u64, BitVec::from_u64(&ctx, *byte as u64, 8))
            .unwrap();
    }

    // CREATE2 pops value, offset, size, salt
    push_word(&mut gs, &ctx, "0a");
    push_word(&mut gs, &ctx, "06");
    push_word(&mut gs, &ctx, "00");
    push_word(&mut gs, &ctx, "03");

    let outcome = Instruction::new("CREATE2", &ectx).evaluate(gs).unwrap();
    let StepOutcome::TxStart(start) = outcome else {
        panic!("expected a creation transaction");
    };
    assert!(start.tx.is_creation());

    let mut preimage = vec![0xffu8];
    let mut caller = [0u8; 20];
    caller[19] = 0x65;
    preimage.extend_from_slice(&caller);
    let mut salt = [0u8; 32];
    salt[31] = 10;
    preimage.extend_from_slice(&salt);
    preimage.extend_from_slice(&evmscan_hashes::keccak256(&init_code));
    let expected = &evmscan_hashes::keccak256(&preimage)[12..];

    let address = start.tx.callee_account().address.to_bytes();
    assert_eq!(&address[12..32], expected);
}

/// MSTORE then MLOAD at the same concrete offset always reads back the
/// stored word.
#[test]
fn mstore_mload_round_trip() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let mut gs = test_state(&ectx, "60606040");
    let value = BitVec::new_const(&ctx, "stored", 256);
    gs.machine_state.push(value.clone()).unwrap();
    push_word(&mut gs, &ctx, "40");

    let outcome = Instruction::new("MSTORE", &ectx).evaluate(gs).unwrap();
    let mut gs = single_successor(outcome);

    push_word(&mut gs, &ctx, "40");
    let outcome = Instruction::new("MLOAD", &ectx).evaluate(gs).unwrap();
    let result = single_successor(outcome);

    let loaded = result.machine_state.top().unwrap().as_bitvec();
    let (status, _) = Solver::new(&ctx).check(&[loaded.ne(&value)]);
    assert_eq!(status, SatResult::Unsat);
}

/// Each JUMPI successor gains exactly the condition (taken) or its
/// negation (fall-through) and nothing else.
#[test]
fn jumpi_constraint_law() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    // JUMPDEST at offset 0, so the taken branch has a valid target
    let mut gs = test_state(&ectx, "5b600101");
    let condition = BitVec::new_const(&ctx, "cond", 256);
    let before = gs.world_state.constraints().len();
    gs.machine_state.push(condition).unwrap();
    push_word(&mut gs, &ctx, "00");

    let outcome = Instruction::new("JUMPI", &ectx).evaluate(gs).unwrap();
    let StepOutcome::Continue(states) = outcome else {
        panic!("expected successors");
    };
    assert_eq!(states.len(), 2);
    for state in &states {
        assert_eq!(state.world_state.constraints().len(), before + 1);
    }
    // fall-through first, then taken: the two added constraints negate
    // each other, so asserting both is unsatisfiable
    let fallthrough = states[0].world_state.constraints().as_slice().last().unwrap();
    let taken = states[1].world_state.constraints().as_slice().last().unwrap();
    let (status, _) = Solver::new(&ctx).check(&[fallthrough.clone(), taken.clone()]);
    assert_eq!(status, SatResult::Unsat);
}

/// The post handler of a CALL copies bounded return data into the
/// caller's memory and pushes a fresh result pinned to one.
#[test]
fn call_post_handler_contract() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let mut gs = test_state(&ectx, "60606040");
    // operand layout of the suspended CALL: out_size 1, out_offset 0x80,
    // in_size 0, in_offset 0, value 0, to 0x42, gas 100000
    for hex in ["01", "80", "00", "00", "00", "42", "0186a0"] {
        push_word(&mut gs, &ctx, hex);
    }
    gs.last_return_data = Some(ReturnData {
        data: vec![
            BitVec::from_u64(&ctx, 0xaa, 8),
            BitVec::from_u64(&ctx, 0xbb, 8),
        ],
        size: BitVec::from_u64(&ctx, 2, 256),
    });

    let frame_tx = gs.current_transaction().unwrap().tx.clone();
    let outcome = Instruction::new("CALL", &ectx)
        .evaluate_post(gs, &frame_tx, false)
        .unwrap();
    let result = single_successor(outcome);

    // the copy is bounded by the declared output size of one byte
    assert_eq!(result.machine_state.memory.read_byte(&ctx, 0x80).as_u64(), Some(0xaa));
    assert_eq!(result.machine_state.memory.read_byte(&ctx, 0x81).as_u64(), Some(0));

    // the pushed result is a fresh symbol pinned to one by the path
    let retval = result.machine_state.top().unwrap().as_bitvec();
    assert!(retval.is_symbolic());
    let mut formulas = result.world_state.constraints().to_vec();
    formulas.push(retval.eq(&BitVec::from_u64(&ctx, 0, 256)));
    let (status, _) = Solver::new(&ctx).check(&formulas);
    assert_eq!(status, SatResult::Unsat);
}

/// With no return data the pushed result is pinned to zero instead.
#[test]
fn call_post_handler_without_return_data() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let mut gs = test_state(&ectx, "60606040");
    for hex in ["01", "80", "00", "00", "00", "42", "0186a0"] {
        push_word(&mut gs, &ctx, hex);
    }
    gs.last_return_data = None;

    let frame_tx = gs.current_transaction().unwrap().tx.clone();
    let outcome = Instruction::new("CALL", &ectx)
        .evaluate_post(gs, &frame_tx, false)
        .unwrap();
    let result = single_successor(outcome);

    let retval = result.machine_state.top().unwrap().as_bitvec();
    let mut formulas = result.world_state.constraints().to_vec();
    formulas.push(retval.eq(&BitVec::from_u64(&ctx, 1, 256)));
    let (status, _) = Solver::new(&ctx).check(&formulas);
    assert_eq!(status, SatResult::Unsat);
}

/// SIGNEXTEND at byte 0 widens the sign of the low byte.
#[test]
fn signextend_low_byte() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let mut gs = test_state(&ectx, "60606040");
    push_word(&mut gs, &ctx, "ff");
    push_word(&mut gs, &ctx, "00");

    let outcome = Instruction::new("SIGNEXTEND", &ectx).evaluate(gs).unwrap();
    let result = single_successor(outcome);
    let extended = result.machine_state.top().unwrap().as_bitvec();
    assert_eq!(
        extended.as_biguint().unwrap(),
        BigUint::parse_bytes(NEG_ONE.as_bytes(), 16).unwrap()
    );
}

/// DIV by a concrete zero yields zero rather than trapping.
#[test]
fn division_by_zero_is_zero() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let mut gs = test_state(&ectx, "60606040");
    push_word(&mut gs, &ctx, "00");
    push_word(&mut gs, &ctx, "2a");

    let outcome = Instruction::new("DIV", &ectx).evaluate(gs).unwrap();
    let result = single_successor(outcome);
    assert_eq!(result.machine_state.top().unwrap().as_bitvec().as_u64(), Some(0));
}

/// BYTE indexes from the most significant end and zero-fills past 31.
#[test]
fn byte_opcode_indexing() {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let ectx = ExecContext::new(&ctx);

    let mut gs = test_state(&ectx, "60606040");
    push_word(&mut gs, &ctx, "abcd");
    push_word(&mut gs, &ctx, "1f");
    let outcome = Instruction::new("BYTE", &ectx).evaluate(gs).unwrap();
    let result = single_successor(outcome);
    assert_eq!(result.machine_state.top().unwrap().as_bitvec().as_u64(), Some(0xcd));

    let mut gs = test_state(&ectx, "60606040");
    push_word(&mut gs, &ctx, "abcd");
    push_word(&mut gs, &ctx, "20");
    let outcome = Instruction::new("BYTE", &ectx).evaluate(gs).unwrap();
    let result = single_successor(outcome);
    assert_eq!(result.machine_state.top().unwrap().as_bitvec().as_u64(), Some(0));
}
