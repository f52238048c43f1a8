//! Whole-module translation tests: each scenario builds a binary, runs the
//! full pipeline, and asserts on the observable shape of the emitted
//! JavaScript (register moves, trap guards, control lowering, wrapper
//! plumbing).

use crate::utils::{
    KIND_FUNC, ModuleBuilder, SEC_CODE, SEC_DATA, SEC_ELEMENT, SEC_EXPORT, SEC_FUNCTION,
    SEC_GLOBAL, SEC_IMPORT, SEC_MEMORY, SEC_START, SEC_TABLE, SEC_TYPE, T_F32, T_F64, T_I32,
    T_I64, counted, data_entry, element_entry, export, func_body, functype, global_entry,
    i32_const_init, import_func, import_global, limits, table_entry, vari32,
};
use wasmlift_translate::translate_module;

/// S1: the identity function comes out as a parameter move and a return.
#[test]
fn s1_identity_function() -> anyhow::Result<()> {
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_I32], Some(T_I32))]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_EXPORT, counted(&[export("id", KIND_FUNC, 0)]))
        .section(SEC_CODE, counted(&[func_body(&[], &[0x20, 0x00, 0x0b])]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("function F0(li0) {"));
    assert!(js.contains("si0 = li0;"));
    assert!(js.contains("return si0;"));
    assert!(js.contains("\"id\": F0,"));
    Ok(())
}

/// S2: an i64 memory round-trip splits into two 32-bit halves and rejoins
/// through the Long constructor, with bounds guards on both accesses.
#[test]
fn s2_i64_round_trip_through_memory() -> anyhow::Result<()> {
    let code = [
        0x41, 0x00, // i32.const 0
        0x20, 0x00, // get_local 0
        0x37, 0x03, 0x00, // i64.store align=3 offset=0
        0x41, 0x00, // i32.const 0
        0x29, 0x03, 0x00, // i64.load align=3 offset=0
        0x0b,
    ];
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_I64], Some(T_I64))]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_MEMORY, counted(&[limits(1, None)]))
        .section(SEC_EXPORT, counted(&[export("f", KIND_FUNC, 0)]))
        .section(SEC_CODE, counted(&[func_body(&[], &code)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("sl0.low"));
    assert!(js.contains("sl0.high"));
    assert!(js.contains("new Long("));
    assert!(js.contains("trap('i64.store OOB')"));
    assert!(js.contains("trap('i64.load OOB')"));
    Ok(())
}

/// S3: signed division carries both the divisor-zero and INT_MIN/-1 guards,
/// each naming the operation.
#[test]
fn s3_div_s_trap_guards() -> anyhow::Result<()> {
    let code = [0x20, 0x00, 0x20, 0x01, 0x6d, 0x0b];
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_I32, T_I32], Some(T_I32))]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_EXPORT, counted(&[export("f", KIND_FUNC, 0)]))
        .section(SEC_CODE, counted(&[func_body(&[], &code)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("if (si1 === 0) { trap('i32_div_s'); }"));
    assert!(js.contains("if (si0 === -2147483648 && si1 === -1) { trap('i32_div_s'); }"));
    assert!(js.contains("si0 = (si0 / si1) | 0;"));
    Ok(())
}

/// S4: a three-armed br_table lowers to a switch with one case per explicit
/// target plus a default, each breaking to the matching label.
#[test]
fn s4_br_table_switch() -> anyhow::Result<()> {
    let mut code = vec![
        0x02, 0x40, // block          ; L0
        0x02, 0x40, // block          ; L1
        0x02, 0x40, // block          ; L2
        0x20, 0x00, // get_local 0
        0x0e, 0x02, 0x00, 0x01, 0x02, // br_table [0 1] default 2
        0x0b, // end L2
        0x41,
    ];
    vari32(&mut code, 100);
    code.extend_from_slice(&[0x0f, 0x0b, 0x41]); // return; end L1
    vari32(&mut code, 200);
    code.extend_from_slice(&[0x0f, 0x0b, 0x41]); // return; end L0
    vari32(&mut code, 300);
    code.push(0x0b);

    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_I32], Some(T_I32))]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_EXPORT, counted(&[export("f", KIND_FUNC, 0)]))
        .section(SEC_CODE, counted(&[func_body(&[], &code)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("switch (si0) {"));
    assert!(js.contains("case 0: break L2;"));
    assert!(js.contains("case 1: break L1;"));
    assert!(js.contains("default: break L0;"));
    assert!(js.contains("return 100;") || js.contains("si0 = 100;"));
    Ok(())
}

/// S5: call_indirect synthesises a per-signature helper that checks the
/// stored signature string and traps on mismatch.
#[test]
fn s5_indirect_call_signature_check() -> anyhow::Result<()> {
    let identity_f32 = [0x20, 0x00, 0x0b];
    let caller = [
        0x20, 0x00, // get_local 0 (argument)
        0x41, 0x00, // i32.const 0 (table index)
        0x11, 0x01, 0x00, // call_indirect type 1, reserved 0
        0x0b,
    ];
    let bytes = ModuleBuilder::new()
        .section(
            SEC_TYPE,
            counted(&[
                functype(&[T_F32], Some(T_F32)),
                functype(&[T_I32], Some(T_I32)),
            ]),
        )
        .section(SEC_FUNCTION, counted(&[vec![0], vec![1]]))
        .section(SEC_TABLE, counted(&[table_entry(1, None)]))
        .section(SEC_EXPORT, counted(&[export("call", KIND_FUNC, 1)]))
        .section(
            SEC_ELEMENT,
            counted(&[element_entry(0, &i32_const_init(0), &[0])]),
        )
        .section(
            SEC_CODE,
            counted(&[func_body(&[], &identity_f32), func_body(&[], &caller)]),
        )
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("call_i_i(si1, si0) | 0"));
    assert!(js.contains("function call_i_i(idx, a0) {"));
    assert!(js.contains("if (f._sig !== 'i_i') { trap('call_indirect: signature mismatch'); }"));
    assert!(js.contains("F0._sig = 'f_f';"));
    assert!(js.contains("F1._sig = 'i_i';"));
    assert!(js.contains("if ((0) + 1 > T0.length) { trap('element segment OOB'); }"));
    assert!(js.contains("T0._setmany((0) + 0, [F0]);"));
    Ok(())
}

/// S6: the start function is invoked inside the wrapper before the exports
/// object is returned.
#[test]
fn s6_start_function_runs_at_instantiation() -> anyhow::Result<()> {
    let store42 = [
        0x41, 0x00, // i32.const 0
        0x41, 0x2a, // i32.const 42
        0x36, 0x02, 0x00, // i32.store
        0x0b,
    ];
    let read = [
        0x41, 0x00, // i32.const 0
        0x28, 0x02, 0x00, // i32.load
        0x0b,
    ];
    let mut start_payload = Vec::new();
    crate::utils::varu32(&mut start_payload, 0);
    let bytes = ModuleBuilder::new()
        .section(
            SEC_TYPE,
            counted(&[functype(&[], None), functype(&[], Some(T_I32))]),
        )
        .section(SEC_FUNCTION, counted(&[vec![0], vec![1]]))
        .section(SEC_MEMORY, counted(&[limits(1, None)]))
        .section(SEC_EXPORT, counted(&[export("read", KIND_FUNC, 1)]))
        .section(SEC_START, start_payload)
        .section(
            SEC_CODE,
            counted(&[func_body(&[], &store42), func_body(&[], &read)]),
        )
        .build();
    let js = translate_module(&bytes)?;
    let start_pos = js.find("F0();").expect("start call emitted");
    let return_pos = js.rfind("return {").expect("exports object emitted");
    assert!(start_pos < return_pos);
    assert!(js.contains("\"read\": F1,"));
    Ok(())
}

#[test]
fn imported_function_is_bound_and_called() -> anyhow::Result<()> {
    let caller = [0x20, 0x00, 0x10, 0x00, 0x0b]; // get_local 0; call 0
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_I32], Some(T_I32))]))
        .section(SEC_IMPORT, counted(&[import_func("env", "add1", 0)]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_EXPORT, counted(&[export("f", KIND_FUNC, 1)]))
        .section(SEC_CODE, counted(&[func_body(&[], &caller)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("var F0 = imports.F0;"));
    assert!(js.contains("si0 = F0(si0) | 0;"));
    assert!(js.contains("function F1(li0) {"));
    Ok(())
}

#[test]
fn globals_are_bound_read_and_written() -> anyhow::Result<()> {
    // get_global 1; set_global 1; get_global 0 -> returns the imported one.
    let code = [0x23, 0x01, 0x24, 0x01, 0x23, 0x00, 0x0b];
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], Some(T_I32))]))
        .section(
            SEC_IMPORT,
            counted(&[import_global("env", "base", T_I32, false)]),
        )
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(
            SEC_GLOBAL,
            counted(&[global_entry(T_I32, true, &i32_const_init(7))]),
        )
        .section(SEC_EXPORT, counted(&[export("f", KIND_FUNC, 0)]))
        .section(SEC_CODE, counted(&[func_body(&[], &code)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("var G0 = imports.G0;"));
    assert!(js.contains("var G1 = 7;"));
    assert!(js.contains("si0 = G1;"));
    assert!(js.contains("G1 = si0;"));
    assert!(js.contains("si0 = G0;"));
    Ok(())
}

#[test]
fn data_segments_initialise_memory_with_a_guard() -> anyhow::Result<()> {
    let bytes = ModuleBuilder::new()
        .section(SEC_MEMORY, counted(&[limits(1, None)]))
        .section(
            SEC_DATA,
            counted(&[data_entry(0, &i32_const_init(16), &[1, 2, 3])]),
        )
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("if ((16) + 3 > M0.buffer.byteLength) { trap('data segment OOB'); }"));
    assert!(js.contains("HU8.set([1,2,3], (16) + 0);"));
    Ok(())
}

#[test]
fn locals_declare_with_typed_zero_initialisers() -> anyhow::Result<()> {
    // One declared i64 local, touched by get/set.
    let code = [
        0x20, 0x00, // get_local 0 (the i64 local)
        0x21, 0x00, // set_local 0
        0x0b,
    ];
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_CODE, counted(&[func_body(&[(1, T_I64)], &code)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("var ll0 = new Long(0, 0);"));
    assert!(js.contains("sl0 = ll0;"));
    assert!(js.contains("ll0 = sl0;"));
    Ok(())
}

#[test]
fn loop_with_branch_back_emits_continue() -> anyhow::Result<()> {
    // loop; get_local 0; br_if 0; end
    let code = [0x03, 0x40, 0x20, 0x00, 0x0d, 0x00, 0x0b, 0x0b];
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_I32], None)]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_CODE, counted(&[func_body(&[], &code)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("L0: while (1) {"));
    assert!(js.contains("if (si0) { continue L0; }"));
    assert!(js.contains("break L0;"));
    Ok(())
}

#[test]
fn if_else_produces_both_arms() -> anyhow::Result<()> {
    // if (result i32) get_local 0 ... else ... end
    let mut code = vec![
        0x20, 0x00, // get_local 0
        0x04, 0x7f, // if (result i32)
        0x41,
    ];
    vari32(&mut code, 10);
    code.push(0x05); // else
    code.push(0x41);
    vari32(&mut code, 20);
    code.push(0x0b); // end if
    code.push(0x0b); // end func
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_I32], Some(T_I32))]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_CODE, counted(&[func_body(&[], &code)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("L0: do { if (si0) {"));
    assert!(js.contains("} else {"));
    assert!(js.contains("} } while (0);"));
    assert!(js.contains("si0 = 10;"));
    assert!(js.contains("si0 = 20;"));
    Ok(())
}

#[test]
fn grow_and_current_memory_lower_to_helpers() -> anyhow::Result<()> {
    let code = [
        0x20, 0x00, // get_local 0
        0x40, 0x00, // grow_memory
        0x1a, // drop
        0x3f, 0x00, // current_memory
        0x0b,
    ];
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_I32], Some(T_I32))]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_MEMORY, counted(&[limits(1, Some(4))]))
        .section(SEC_CODE, counted(&[func_body(&[], &code)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("si0 = grow_memory(si0) | 0;"));
    assert!(js.contains("si0 = (memorySize / 65536) | 0;"));
    Ok(())
}

#[test]
fn f32_arithmetic_rounds_through_to_f32() -> anyhow::Result<()> {
    let code = [0x20, 0x00, 0x20, 0x01, 0x92, 0x0b]; // f32.add
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_F32, T_F32], Some(T_F32))]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_CODE, counted(&[func_body(&[], &code)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(js.contains("sf0 = ToF32(sf0 + sf1);"));
    Ok(())
}

#[test]
fn trunc_guard_rejects_nan_and_out_of_range() -> anyhow::Result<()> {
    let code = [0x20, 0x00, 0xaa, 0x0b]; // i32.trunc_s/f64
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_F64], Some(T_I32))]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_CODE, counted(&[func_body(&[], &code)]))
        .build();
    let js = translate_module(&bytes)?;
    assert!(
        js.contains("if (!(sd0 > -2147483649 && sd0 < 2147483648)) { trap('i32_trunc_s_f64'); }")
    );
    assert!(js.contains("si0 = sd0 | 0;"));
    Ok(())
}
