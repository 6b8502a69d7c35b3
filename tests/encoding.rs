//! Encoding tests for program values.
//!
//! Tests cover constants, globals shared between the source and target programs, function
//! inputs under every attribute and configuration, aggregates, and type inference.

use num_bigint::BigUint;
use tv_ir::attrs::ParamAttrs;
use tv_ir::config::Config;
use tv_ir::error::{StateError, ValueError};
use tv_ir::smt::{Model, Smt};
use tv_ir::state::{Phase, State};
use tv_ir::value::{selector_var, Program};

fn small_config() -> Config {
    Config {
        bits_for_bid: 2,
        bits_for_offset: 6,
        ..Config::default()
    }
}

// ─── Constants ─────────────────────────────────────────────────────────────────

#[test]
fn poison_is_never_defined() {
    let smt = Smt::new();
    let config = Config::default();
    let mut program = Program::new();
    let i32 = program.types_mut().mk_int(32);
    let p = program.add_poison(i32);

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(p).to_smt(&mut s);
    assert!(smt.is_false(sv.non_poison));
    assert!(s.undef_vars().is_empty());
}

#[test]
fn undef_is_fresh_on_every_use() {
    let smt = Smt::new();
    let config = Config::default();
    let mut program = Program::new();
    let i32 = program.types_mut().mk_int(32);
    let u = program.add_undef(i32);

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let first = program.value(u).to_smt(&mut s);
    let second = program.value(u).to_smt(&mut s);
    assert!(smt.is_true(first.non_poison));
    assert!(smt.is_true(second.non_poison));
    assert_ne!(first.value, second.value);
    assert_eq!(s.undef_vars(), &[first.value, second.value]);
}

#[test]
fn undef_never_aliases_a_named_input() {
    for undef_first in [false, true] {
        let smt = Smt::new();
        let config = Config::default();
        let mut program = Program::new();
        let i8 = program.types_mut().mk_int(8);
        let x = program.add_input(i8, "undef!0", ParamAttrs::new().noundef());
        let u = program.add_undef(i8);

        let mut s = State::new(&smt, &program, &config, Phase::Source);
        let (input, undef) = if undef_first {
            let undef = program.value(u).to_smt(&mut s);
            (program.value(x).to_smt(&mut s), undef)
        } else {
            let input = program.value(x).to_smt(&mut s);
            (input, program.value(u).to_smt(&mut s))
        };

        assert_ne!(input.value, undef.value, "undef_first = {}", undef_first);
        assert_eq!(smt.var_name(input.value).as_deref(), Some("undef!0"));
        let undef_name = smt.var_name(undef.value).unwrap();
        assert_ne!(undef_name, "undef!0");

        let mut model = Model::new();
        model.set("undef!0", 5u32);
        model.set(undef_name, 9u32);
        assert_eq!(smt.eval(input.value, &model), Some(BigUint::from(5u32)));
        assert_eq!(smt.eval(undef.value, &model), Some(BigUint::from(9u32)));
    }
}

#[test]
fn void_and_null() {
    let smt = Smt::new();
    let config = small_config();
    let mut program = Program::new();
    let ptr = program.types_mut().mk_ptr();
    let null = program.add_null(ptr);

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let void = program.value(program.void_value());
    assert!(void.is_void(program.types()));
    let sv = void.to_smt(&mut s);
    assert!(smt.is_false(sv.value));
    assert!(smt.is_false(sv.non_poison));

    let sv = program.value(null).to_smt(&mut s);
    assert_eq!(sv.value, smt.mk_uint(0, 8));
    assert!(smt.is_true(sv.non_poison));
}

// ─── Globals ───────────────────────────────────────────────────────────────────

#[test]
fn shared_global_keeps_its_block() {
    let smt = Smt::new();
    let config = Config::default();

    let mut src = Program::new();
    let ptr = src.types_mut().mk_ptr();
    let a = src.add_global(ptr, "@a", 4, 4, false);
    let b = src.add_global(ptr, "@b", 4, 4, false);
    let g = src.add_global(ptr, "@g", 8, 8, true);

    let mut tgt = Program::new();
    let ptr = tgt.types_mut().mk_ptr();
    let g_tgt = tgt.add_global(ptr, "@g", 8, 8, true);
    let h_tgt = tgt.add_global(ptr, "@h", 2, 1, false);

    let mut s = State::new(&smt, &src, &config, Phase::Source);
    for id in [a, b] {
        src.value(id).to_smt(&mut s);
    }
    let p_src = src.value(g).to_smt(&mut s);
    assert!(smt.is_true(p_src.non_poison));
    assert_eq!(s.global("@g").map(|e| e.bid), Some(3));
    let globals = s.into_globals();
    assert_eq!(globals.len(), 3);

    let mut t = State::new(&smt, &tgt, &config, Phase::Target);
    t.import_globals(&globals).unwrap();
    assert_eq!(t.memory().num_blocks(), 0);

    let p_tgt = tgt.value(g_tgt).to_smt(&mut t);
    assert_eq!(p_src.value, p_tgt.value);
    let block = t.memory().block(3).unwrap();
    assert_eq!((block.size, block.align), (8, 8));
    assert!(block.kind.is_constant());

    // A second use resolves without allocating again.
    let again = tgt.value(g_tgt).to_smt(&mut t);
    assert_eq!(again.value, p_tgt.value);
    assert_eq!(t.memory().num_blocks(), 1);

    // Globals only the target has stay clear of the ids chosen by the source.
    tgt.value(h_tgt).to_smt(&mut t);
    assert_eq!(t.global("@h").map(|e| e.bid), Some(4));
}

#[test]
fn reserve_rejected_while_translating_source() {
    let smt = Smt::new();
    let config = Config::default();
    let program = Program::new();
    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let err = s.reserve_global("@g", 3).unwrap_err();
    assert!(matches!(err, StateError::ReserveInSource { bid: 3, .. }));
}

#[test]
fn import_rejects_block_taken_by_target_global() {
    let smt = Smt::new();
    let config = Config::default();

    let mut src = Program::new();
    let ptr = src.types_mut().mk_ptr();
    let g = src.add_global(ptr, "@g", 4, 4, false);
    let mut s = State::new(&smt, &src, &config, Phase::Source);
    src.value(g).to_smt(&mut s);
    let globals = s.into_globals();
    assert_eq!(globals.lookup("@g").map(|e| e.bid), Some(1));

    let mut tgt = Program::new();
    let ptr = tgt.types_mut().mk_ptr();
    let h = tgt.add_global(ptr, "@h", 4, 4, false);
    let mut t = State::new(&smt, &tgt, &config, Phase::Target);
    tgt.value(h).to_smt(&mut t);

    let err = t.import_globals(&globals).unwrap_err();
    assert_eq!(
        err,
        StateError::BlockTaken {
            name: "@g".to_string(),
            bid: 1
        }
    );
    assert_eq!(t.global("@g"), None);
    assert_eq!(t.memory().num_blocks(), 1);
}

#[test]
fn print_global() {
    let mut program = Program::new();
    let ptr = program.types_mut().mk_ptr();
    let g = program.add_global(ptr, "@g", 8, 8, true);
    let x = program.add_input(ptr, "%x", ParamAttrs::new());

    let mut out = String::new();
    program.value(g).print(&mut out).unwrap();
    assert_eq!(out, "@g = constant 8 bytes, align 8");

    let err = program.value(x).print(&mut out).unwrap_err();
    assert!(matches!(err, ValueError::NoTextualForm { kind: "input", .. }));
    assert_eq!(err.to_string(), "input value '%x' has no standalone textual form");
}

// ─── Inputs ────────────────────────────────────────────────────────────────────

#[test]
fn plain_input_selects_between_value_undef_and_poison() {
    let smt = Smt::new();
    let config = Config::default();
    let mut program = Program::new();
    let i8 = program.types_mut().mk_int(8);
    let x = program.add_input(i8, "%x", ParamAttrs::new());

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(x).to_smt(&mut s);
    assert!(s.axiom_list().is_empty());
    assert_eq!(s.undef_vars().len(), 1);
    let undef = smt.var_name(s.undef_vars()[0]).unwrap();

    let mut model = Model::new();
    model.set("%x", 0x2au32);
    model.set(undef, 0x17u32);

    model.set("ty_%x", 0b00u32);
    assert_eq!(smt.eval(sv.value, &model), Some(BigUint::from(0x2au32)));
    assert_eq!(smt.eval_bool(sv.non_poison, &model), Some(true));

    model.set("ty_%x", 0b01u32);
    assert_eq!(smt.eval(sv.value, &model), Some(BigUint::from(0x17u32)));
    assert_eq!(smt.eval_bool(sv.non_poison, &model), Some(true));

    model.set("ty_%x", 0b10u32);
    assert_eq!(smt.eval_bool(sv.non_poison, &model), Some(false));
    model.set("ty_%x", 0b11u32);
    assert_eq!(smt.eval_bool(sv.non_poison, &model), Some(false));
}

#[test]
fn two_plain_inputs_are_independent() {
    let smt = Smt::new();
    let config = Config::default();
    let mut program = Program::new();
    let i32 = program.types_mut().mk_int(32);
    let a = program.add_input(i32, "%a", ParamAttrs::new());
    let b = program.add_input(i32, "%b", ParamAttrs::new());

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sa = program.value(a).to_smt(&mut s);
    let sb = program.value(b).to_smt(&mut s);

    assert!(s.axiom_list().is_empty());
    assert_eq!(s.undef_vars().len(), 2);
    assert_ne!(s.undef_vars()[0], s.undef_vars()[1]);
    assert_ne!(selector_var(&smt, "%a"), selector_var(&smt, "%b"));
    assert_ne!(sa.value, sb.value);
    for np in [sa.non_poison, sb.non_poison] {
        assert!(smt.as_bool(np).is_none());
    }
}

#[test]
fn input_translated_twice_gets_fresh_undef() {
    let smt = Smt::new();
    let config = Config::default();
    let mut program = Program::new();
    let i8 = program.types_mut().mk_int(8);
    let x = program.add_input(i8, "%x", ParamAttrs::new());

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let first = program.value(x).to_smt(&mut s);
    let second = program.value(x).to_smt(&mut s);
    assert_ne!(first.value, second.value);
    assert_eq!(first.non_poison, second.non_poison);
    assert_eq!(s.undef_vars().len(), 2);
}

#[test]
fn noundef_input_is_exactly_its_variable() {
    let smt = Smt::new();
    let config = Config::default();
    let mut program = Program::new();
    let i8 = program.types_mut().mk_int(8);
    let x = program.add_input(i8, "%x", ParamAttrs::new().noundef());

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(x).to_smt(&mut s);
    assert_eq!(sv.value, smt.mk_bv_var("%x", 8));
    assert!(smt.is_true(sv.non_poison));
    assert!(s.undef_vars().is_empty());

    let ty = selector_var(&smt, "%x");
    let undef_bit = smt.mk_eq(smt.mk_extract(ty, 0, 0), smt.mk_uint(0, 1));
    assert!(smt.is_implied(s.axioms(), undef_bit).unwrap());
    assert!(smt.is_implied(s.axioms(), smt.mk_eq(ty, smt.mk_uint(0, 2))).unwrap());
}

#[test]
fn noundef_nonnull_pointer() {
    let smt = Smt::new();
    let config = small_config();
    let mut program = Program::new();
    let ptr = program.types_mut().mk_ptr();
    let p = program.add_input(ptr, "%p", ParamAttrs::new().noundef().nonnull());

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(p).to_smt(&mut s);
    assert!(smt.is_true(sv.non_poison));

    let ty = selector_var(&smt, "%p");
    assert!(smt.is_implied(s.axioms(), smt.mk_eq(ty, smt.mk_uint(0, 2))).unwrap());
    let bid = smt.mk_extract(sv.value, 7, 6);
    assert!(smt.is_implied(s.axioms(), smt.mk_ne(bid, smt.mk_uint(0, 2))).unwrap());
}

#[test]
fn dereferenceable_pointer() {
    let smt = Smt::new();
    let config = small_config();
    let mut program = Program::new();
    let ptr = program.types_mut().mk_ptr();
    let p = program.add_input(ptr, "%p", ParamAttrs::new().dereferenceable(4));

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(p).to_smt(&mut s);
    assert!(smt.is_true(sv.non_poison));
    assert!(s.undef_vars().is_empty());

    let bid = smt.mk_extract(sv.value, 7, 6);
    assert!(smt.is_implied(s.axioms(), smt.mk_ne(bid, smt.mk_uint(0, 2))).unwrap());

    let mut model = Model::new();
    model.set("ty_%p", 0u32);
    model.set("%p", 0b01_000010u32);
    model.set("blk_size_nonlocal", 6u32);
    assert_eq!(smt.eval_bool(s.axioms(), &model), Some(true));
    model.set("blk_size_nonlocal", 5u32);
    assert_eq!(smt.eval_bool(s.axioms(), &model), Some(false));
}

#[test]
fn byval_input_allocates_its_copy() {
    let smt = Smt::new();
    let config = Config::default();
    let mut program = Program::new();
    let ptr = program.types_mut().mk_ptr();
    let p = program.add_input(ptr, "%p", ParamAttrs::new().byval(16).aligned(8));

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(p).to_smt(&mut s);
    assert!(smt.is_true(sv.non_poison));
    assert!(s.undef_vars().is_empty());

    let bid = s.global("byval(16) align(8) %p").unwrap().bid;
    let block = s.memory().block(bid).unwrap();
    assert_eq!((block.size, block.align), (16, 8));
    assert!(block.by_val);
    assert!(!block.kind.is_constant());
    assert_eq!(sv.value, smt.mk_uint((bid as u64) << config.bits_for_offset, config.bits_for_ptr()));

    let ty = selector_var(&smt, "%p");
    assert_eq!(s.axiom_list(), &[smt.mk_eq(ty, smt.mk_uint(0, 2))]);
}

#[test]
fn byval_ignores_other_attributes() {
    let smt = Smt::new();
    let config = small_config();
    let mut program = Program::new();
    let ptr = program.types_mut().mk_ptr();
    let attrs = ParamAttrs::new().byval(16).nonnull().dereferenceable(8);
    let p = program.add_input(ptr, "%p", attrs);

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(p).to_smt(&mut s);
    assert!(smt.is_true(sv.non_poison));
    assert!(s.undef_vars().is_empty());

    let blocks: Vec<_> = s.memory().blocks().collect();
    assert_eq!(blocks.len(), 1);
    let (bid, block) = blocks[0];
    assert_eq!((block.size, block.align), (16, 1));
    assert!(block.by_val);
    assert_eq!(sv.value, smt.mk_uint((bid as u64) << config.bits_for_offset, config.bits_for_ptr()));

    let ty = selector_var(&smt, "%p");
    assert!(smt.is_sat(s.axioms()).unwrap());
    assert!(smt.is_implied(s.axioms(), smt.mk_eq(ty, smt.mk_uint(0, 2))).unwrap());
}

#[test]
fn nonnull_input_may_still_be_undef() {
    let smt = Smt::new();
    let config = small_config();
    let mut program = Program::new();
    let ptr = program.types_mut().mk_ptr();
    let p = program.add_input(ptr, "%p", ParamAttrs::new().nonnull());

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(p).to_smt(&mut s);
    assert!(smt.is_true(sv.non_poison));
    assert_eq!(s.undef_vars().len(), 1);

    let ty = selector_var(&smt, "%p");
    let bit_clear = |bit: u32| smt.mk_eq(smt.mk_extract(ty, bit, bit), smt.mk_uint(0, 1));
    assert!(smt.is_implied(s.axioms(), bit_clear(1)).unwrap());
    assert!(!smt.is_implied(s.axioms(), bit_clear(0)).unwrap());
}

#[test]
fn configuration_flags() {
    let cases = [
        // undef, poison, axiom on the selector, undef vars, poison-free
        (false, false, None, 1, false),
        (true, false, Some(0b01u32), 0, false),
        (false, true, Some(0b10), 1, true),
        (true, true, Some(0b11), 0, true),
    ];
    for (disable_undef, disable_poison, cleared_bits, undef_vars, always_defined) in cases {
        let smt = Smt::new();
        let config = Config {
            disable_undef_input: disable_undef,
            disable_poison_input: disable_poison,
            ..Config::default()
        };
        let mut program = Program::new();
        let i8 = program.types_mut().mk_int(8);
        let x = program.add_input(i8, "%x", ParamAttrs::new());

        let mut s = State::new(&smt, &program, &config, Phase::Source);
        let sv = program.value(x).to_smt(&mut s);
        assert_eq!(s.undef_vars().len(), undef_vars, "{:?}", config);
        assert_eq!(smt.is_true(sv.non_poison), always_defined, "{:?}", config);

        let ty = selector_var(&smt, "%x");
        match cleared_bits {
            None => assert!(s.axiom_list().is_empty()),
            Some(bits) => {
                assert_eq!(s.axiom_list().len(), 1);
                for bit in 0..2 {
                    let cleared = smt.mk_eq(smt.mk_extract(ty, bit, bit), smt.mk_uint(0, 1));
                    let expected = bits & (1 << bit) != 0;
                    assert_eq!(smt.is_implied(s.axioms(), cleared).unwrap(), expected, "{:?}", config);
                }
            }
        }
    }
}

#[test]
fn input_reads_the_other_programs_variables() {
    let smt = Smt::new();
    let config = Config::default();
    let mut src = Program::new();
    let i8 = src.types_mut().mk_int(8);
    let x_src = src.add_input(i8, "%x", ParamAttrs::new().noundef());
    let mut tgt = Program::new();
    let i8 = tgt.types_mut().mk_int(8);
    let x_tgt = tgt.add_input(i8, "%y", ParamAttrs::new().noundef());
    tgt.copy_smt_name(x_tgt, src.value(x_src));

    let mut s = State::new(&smt, &src, &config, Phase::Source);
    let a = src.value(x_src).to_smt(&mut s);
    let mut t = State::new(&smt, &tgt, &config, Phase::Target);
    let b = tgt.value(x_tgt).to_smt(&mut t);
    assert_eq!(a, b);
}

// ─── Aggregates ────────────────────────────────────────────────────────────────

#[test]
fn aggregate_of_constants() {
    let smt = Smt::new();
    let config = Config::default();
    let mut program = Program::new();
    let i8 = program.types_mut().mk_int(8);
    let pair = program.types_mut().mk_aggregate(vec![i8, i8]);
    let x = program.add_input(i8, "%x", ParamAttrs::new().noundef());
    let p = program.add_poison(i8);
    let u = program.add_undef(i8);
    let poisoned = program.add_aggregate(pair, vec![x, p]);
    let with_undef = program.add_aggregate(pair, vec![u, x]);
    assert_eq!(program.value(poisoned).name(), "{ noundef %x, poison }");
    assert_eq!(program.display(with_undef), "{i8, i8} { undef, noundef %x }");

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(poisoned).to_smt(&mut s);
    assert!(smt.is_false(sv.non_poison));
    assert_eq!(smt.width(sv.value), 16);

    let sv = program.value(with_undef).to_smt(&mut s);
    assert!(smt.is_true(sv.non_poison));
    assert_eq!(s.undef_vars().len(), 1);
    assert_eq!(smt.mk_extract(sv.value, 15, 8), s.undef_vars()[0]);
    assert_eq!(smt.mk_extract(sv.value, 7, 0), smt.mk_bv_var("%x", 8));
}

#[test]
fn aggregate_input_poison_covers_whole_value() {
    let smt = Smt::new();
    let config = Config::default();
    let mut program = Program::new();
    let i8 = program.types_mut().mk_int(8);
    let pair = program.types_mut().mk_aggregate(vec![i8, i8]);
    let s_in = program.add_input(pair, "%s", ParamAttrs::new());

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(s_in).to_smt(&mut s);
    assert_eq!(smt.width(sv.value), 16);
    assert_eq!(s.undef_vars().len(), 2);

    let mut model = Model::new();
    model.set("ty_%s", 0b10u32);
    assert_eq!(smt.eval_bool(sv.non_poison, &model), Some(false));
    model.set("ty_%s", 0b00u32);
    assert_eq!(smt.eval_bool(sv.non_poison, &model), Some(true));
}

// ─── Type inference ────────────────────────────────────────────────────────────

#[test]
fn type_constraints_are_pure() {
    let smt = Smt::new();
    let mut program = Program::new();
    let t = program.types_mut().mk_symbolic_int("t");
    let i8 = program.types_mut().mk_int(8);
    let agg_ty = program.types_mut().mk_aggregate(vec![t, i8]);
    let x = program.add_input(t, "%x", ParamAttrs::new());
    let y = program.add_input(i8, "%y", ParamAttrs::new());
    let agg = program.add_aggregate(agg_ty, vec![x, y]);

    let first = program.value(agg).type_constraints(&program, &smt);
    let second = program.value(agg).type_constraints(&program, &smt);
    assert_eq!(first, second);
    assert!(smt.as_bool(first).is_none());
}

#[test]
fn aggregate_skips_instruction_components() {
    let smt = Smt::new();
    let mut program = Program::new();
    let u = program.types_mut().mk_symbolic_int("u");
    let i8 = program.types_mut().mk_int(8);
    let agg_ty = program.types_mut().mk_aggregate(vec![i8]);
    let inst = program.add_instruction(u, "%r");
    let agg = program.add_aggregate(agg_ty, vec![inst]);

    // Only the structural constraint remains; the width domain of `u` comes from the
    // instruction itself.
    let constraints = program.value(agg).type_constraints(&program, &smt);
    let bits_u = smt.mk_bv_var("bits_u", 8);
    assert_eq!(constraints, smt.mk_eq(bits_u, smt.mk_uint(8, 8)));
}

#[test]
fn inferred_widths_reach_every_value() {
    let smt = Smt::new();
    let config = Config::default();
    let mut program = Program::new();
    let t = program.types_mut().mk_symbolic_int("t");
    let i16 = program.types_mut().mk_int(16);
    let agg_ty = program.types_mut().mk_aggregate(vec![i16]);
    let x = program.add_input(t, "%x", ParamAttrs::new().noundef());
    program.add_aggregate(agg_ty, vec![x]);

    let constraints = program.type_constraints(&smt);
    let model = smt.find_model(constraints).unwrap().unwrap();
    program.fixup_types(&model);
    assert_eq!(program.display(x), "i16 noundef %x");

    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(x).to_smt(&mut s);
    assert_eq!(smt.width(sv.value), 16);
}
