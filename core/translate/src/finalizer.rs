//! Module result finalizer: renders the outer JavaScript wrapper around the
//! translated function pack.
//!
//! The wrapper has the shape `(ambient, stdlib, imports) -> exports`. In
//! order it binds imported functions and globals to their stable `F<i>` /
//! `G<i>` names, constructs or imports the table (`T0`) and memory (`M0`),
//! defines the unaligned-access and per-signature indirect-call helpers,
//! runs the function pack, tags each defined function with its signature
//! string, performs element and data initialisation, invokes the start
//! function, and returns the exports object.

use crate::emitter::Emitter;
use crate::translator::{f32_literal, f64_literal};
use crate::types::{
    ExternalKind, ImportKind, InitExpr, Limits, ParseResult,
};

/// Stdlib helpers the translated code may reference; bound once in the
/// wrapper preamble.
const STDLIB_HELPERS: &[&str] = &[
    "Long",
    "ToF32",
    "i32_mul",
    "i32_clz",
    "i32_ctz",
    "i32_popcnt",
    "i32_rotl",
    "i32_rotr",
    "i64_add",
    "i64_sub",
    "i64_mul",
    "i64_div_s",
    "i64_div_u",
    "i64_rem_s",
    "i64_rem_u",
    "i64_and",
    "i64_or",
    "i64_xor",
    "i64_shl",
    "i64_shr_s",
    "i64_shr_u",
    "i64_rotl",
    "i64_rotr",
    "i64_clz",
    "i64_ctz",
    "i64_popcnt",
    "i64_eq",
    "i64_ne",
    "i64_lt_s",
    "i64_lt_u",
    "i64_gt_s",
    "i64_gt_u",
    "i64_le_s",
    "i64_le_u",
    "i64_ge_s",
    "i64_ge_u",
    "i64_trunc_s_f64",
    "i64_trunc_u_f64",
    "i64_to_f32_s",
    "i64_to_f32_u",
    "i64_to_f64_s",
    "i64_to_f64_u",
    "f32_abs",
    "f32_ceil",
    "f32_floor",
    "f32_trunc",
    "f32_nearest",
    "f32_sqrt",
    "f32_min",
    "f32_max",
    "f32_copysign",
    "f64_abs",
    "f64_ceil",
    "f64_floor",
    "f64_trunc",
    "f64_nearest",
    "f64_sqrt",
    "f64_min",
    "f64_max",
    "f64_copysign",
    "i32_reinterpret_f32",
    "i64_reinterpret_f64",
    "f32_reinterpret_i32",
    "f64_reinterpret_i64",
    "f32_load_nan",
    "f32_store_nan",
];

/// Element and data initialisers are emitted in bounded chunks so the
/// staged literal never grows with segment size.
const CHUNK: usize = 1024;

/// Renders the complete module wrapper. `name` labels the emitted function.
pub(crate) fn finalize(result: &ParseResult, name: &str) -> String {
    let mut out = Emitter::default();
    out.line(&["function ", name, "(ambient, stdlib, imports) {"]);
    out.line(&["\"use strict\";"]);
    out.line(&["var trap = ambient.trap;"]);
    for helper in STDLIB_HELPERS {
        out.line(&["var ", helper, " = stdlib.", helper, ";"]);
    }

    bind_imports(&mut out, result);
    bind_table_and_memory(&mut out, result);
    if result.memory.is_some() {
        emit_memory_views(&mut out);
        emit_unaligned_helpers(&mut out);
    }
    emit_defined_globals(&mut out, result);
    emit_indirect_helpers(&mut out, result);
    emit_function_pack(&mut out, result);
    emit_elements(&mut out, result);
    emit_data(&mut out, result);

    if let Some(start) = result.start {
        out.line(&["F", &start.to_string(), "();"]);
    }

    emit_exports(&mut out, result);
    out.line(&["}"]);
    out.contents().to_string()
}

fn bind_imports(out: &mut Emitter, result: &ParseResult) {
    let mut func_index = 0u32;
    let mut global_index = 0u32;
    for import in &result.imports {
        match &import.kind {
            ImportKind::Function { type_index } => {
                let f = format!("F{func_index}");
                let sig = result
                    .types
                    .get(*type_index)
                    .expect("import type indices are checked at decode time")
                    .sig_string();
                out.line(&["var ", &f, " = imports.", &f, ";"]);
                // A WASM-backed import carries its signature string; a raw
                // host function does not and is trusted as-is.
                out.line(&[
                    "if (", &f, "._sig && ", &f, "._sig !== '", &sig,
                    "') { trap('import signature mismatch'); }",
                ]);
                func_index += 1;
            }
            ImportKind::Global(_) => {
                let g = format!("G{global_index}");
                out.line(&["var ", &g, " = imports.", &g, ";"]);
                global_index += 1;
            }
            ImportKind::Table(_) => {
                out.line(&["var T0 = imports.T0;"]);
            }
            ImportKind::Memory(_) => {
                out.line(&["var M0 = imports.M0;"]);
            }
        }
    }
}

fn limits_object(limits: Limits) -> String {
    match limits.maximum {
        Some(maximum) => format!("{{initial: {}, maximum: {maximum}}}", limits.initial),
        None => format!("{{initial: {}}}", limits.initial),
    }
}

fn bind_table_and_memory(out: &mut Emitter, result: &ParseResult) {
    if let Some(table) = &result.table
        && !result.table_imported
    {
        out.line(&["var T0 = new ambient.Table(", &limits_object(table.limits), ");"]);
    }
    if let Some(memory) = &result.memory
        && !result.memory_imported
    {
        out.line(&[
            "var M0 = new ambient.Memory(",
            &limits_object(memory.limits),
            ");",
        ]);
    }
}

fn emit_memory_views(out: &mut Emitter) {
    out.line(&["var memorySize = M0.buffer.byteLength;"]);
    out.line(&["var HU8 = new Uint8Array(M0.buffer);"]);
    out.line(&["var HI8 = new Int8Array(M0.buffer);"]);
    out.line(&["var HI16 = new Int16Array(M0.buffer);"]);
    out.line(&["var HU16 = new Uint16Array(M0.buffer);"]);
    out.line(&["var HI32 = new Int32Array(M0.buffer);"]);
    out.line(&["var HF32 = new Float32Array(M0.buffer);"]);
    out.line(&["var HF64 = new Float64Array(M0.buffer);"]);
    out.line(&["function refresh_memory() {"]);
    out.line(&["memorySize = M0.buffer.byteLength;"]);
    out.line(&["HU8 = new Uint8Array(M0.buffer);"]);
    out.line(&["HI8 = new Int8Array(M0.buffer);"]);
    out.line(&["HI16 = new Int16Array(M0.buffer);"]);
    out.line(&["HU16 = new Uint16Array(M0.buffer);"]);
    out.line(&["HI32 = new Int32Array(M0.buffer);"]);
    out.line(&["HF32 = new Float32Array(M0.buffer);"]);
    out.line(&["HF64 = new Float64Array(M0.buffer);"]);
    out.line(&["}"]);
    out.line(&["function grow_memory(pages) {"]);
    out.line(&["var prev = M0._grow(pages);"]);
    out.line(&["if (prev !== -1) { refresh_memory(); }"]);
    out.line(&["return prev;"]);
    out.line(&["}"]);
}

fn emit_unaligned_helpers(out: &mut Emitter) {
    out.line(&["var scratch = new ArrayBuffer(8);"]);
    out.line(&["var scratchU8 = new Uint8Array(scratch);"]);
    out.line(&["var scratchF32 = new Float32Array(scratch);"]);
    out.line(&["var scratchF64 = new Float64Array(scratch);"]);
    out.line(&[
        "function i32_load_unaligned(b, p) { return (b[p] | (b[p + 1] << 8) | (b[p + 2] << 16) | (b[p + 3] << 24)) | 0; }",
    ]);
    out.line(&[
        "function i32_load16_s_unaligned(b, p) { return ((b[p] | (b[p + 1] << 8)) << 16) >> 16; }",
    ]);
    out.line(&["function i32_load16_u_unaligned(b, p) { return b[p] | (b[p + 1] << 8); }"]);
    out.line(&[
        "function i32_store_unaligned(b, p, v) { b[p] = v; b[p + 1] = v >> 8; b[p + 2] = v >> 16; b[p + 3] = v >> 24; }",
    ]);
    out.line(&["function i32_store16_unaligned(b, p, v) { b[p] = v; b[p + 1] = v >> 8; }"]);
    out.line(&[
        "function f32_load_unaligned(b, p) { scratchU8[0] = b[p]; scratchU8[1] = b[p + 1]; scratchU8[2] = b[p + 2]; scratchU8[3] = b[p + 3]; return scratchF32[0]; }",
    ]);
    out.line(&[
        "function f32_store_unaligned(b, p, v) { scratchF32[0] = v; b[p] = scratchU8[0]; b[p + 1] = scratchU8[1]; b[p + 2] = scratchU8[2]; b[p + 3] = scratchU8[3]; }",
    ]);
    out.line(&[
        "function f64_load_unaligned(b, p) { for (var i = 0; i < 8; i++) { scratchU8[i] = b[p + i]; } return scratchF64[0]; }",
    ]);
    out.line(&[
        "function f64_store_unaligned(b, p, v) { scratchF64[0] = v; for (var i = 0; i < 8; i++) { b[p + i] = scratchU8[i]; } }",
    ]);
}

fn init_expr_js(init: InitExpr) -> String {
    match init {
        InitExpr::I32(v) => v.to_string(),
        InitExpr::I64(v) => {
            let low = (v as u64 & 0xffff_ffff) as u32 as i32;
            let high = ((v as u64) >> 32) as u32 as i32;
            format!("new Long({low}, {high})")
        }
        InitExpr::F32(bits) => f32_literal(bits),
        InitExpr::F64(bits) => f64_literal(bits),
        InitExpr::GetGlobal(index) => format!("G{index}"),
    }
}

fn emit_defined_globals(out: &mut Emitter, result: &ParseResult) {
    let imported = result.imported_globals.len();
    for (i, global) in result.globals.iter().enumerate() {
        let name = format!("G{}", imported + i);
        out.line(&["var ", &name, " = ", &init_expr_js(global.init), ";"]);
    }
}

fn emit_indirect_helpers(out: &mut Emitter, result: &ParseResult) {
    for (sig_string, type_index) in result.types.indirect_sigs() {
        let sig = result
            .types
            .get(type_index)
            .expect("indirect type indices are recorded from checked calls");
        let params: Vec<String> = (0..sig.params.len()).map(|i| format!("a{i}")).collect();
        let params_list = params.join(", ");
        let head = if params_list.is_empty() {
            format!("function call_{sig_string}(idx) {{")
        } else {
            format!("function call_{sig_string}(idx, {params_list}) {{")
        };
        out.line(&[&head]);
        out.line(&["if ((idx >>> 0) >= T0.length) { trap('call_indirect: index out of range'); }"]);
        out.line(&["var f = T0._get(idx);"]);
        out.line(&["if (!f) { trap('call_indirect: null entry'); }"]);
        out.line(&[
            "if (f._sig !== '", &sig_string, "') { trap('call_indirect: signature mismatch'); }",
        ]);
        out.line(&["return f(", &params_list, ");"]);
        out.line(&["}"]);
    }
}

fn emit_function_pack(out: &mut Emitter, result: &ParseResult) {
    out.line(&["var funcs = (function() {"]);
    out.push_raw(result.code.contents());
    let defined: Vec<u32> = (result.num_imported_funcs..result.num_funcs()).collect();
    let pack: Vec<String> = defined.iter().map(|i| format!("F{i}: F{i}")).collect();
    out.line(&["return {", &pack.join(", "), "};"]);
    out.line(&["})();"]);
    for i in &defined {
        let f = format!("F{i}");
        out.line(&["var ", &f, " = funcs.", &f, ";"]);
    }
    for i in &defined {
        let sig = result
            .func_sig(*i)
            .expect("defined function signatures resolve")
            .sig_string();
        out.line(&["F", &i.to_string(), "._sig = '", &sig, "';"]);
    }
}

fn emit_elements(out: &mut Emitter, result: &ParseResult) {
    for segment in &result.elements {
        let offset = init_expr_js(segment.offset);
        let count = segment.func_indices.len();
        out.line(&[
            "if ((", &offset, ") + ", &count.to_string(),
            " > T0.length) { trap('element segment OOB'); }",
        ]);
        for (chunk_index, chunk) in segment.func_indices.chunks(CHUNK).enumerate() {
            let base = chunk_index * CHUNK;
            let entries: Vec<String> = chunk.iter().map(|f| format!("F{f}")).collect();
            out.line(&[
                "T0._setmany((", &offset, ") + ", &base.to_string(), ", [",
                &entries.join(", "), "]);",
            ]);
        }
    }
}

fn emit_data(out: &mut Emitter, result: &ParseResult) {
    for segment in &result.data {
        let offset = init_expr_js(segment.offset);
        let len = segment.bytes.len();
        out.line(&[
            "if ((", &offset, ") + ", &len.to_string(),
            " > M0.buffer.byteLength) { trap('data segment OOB'); }",
        ]);
        for (chunk_index, chunk) in segment.bytes.chunks(CHUNK).enumerate() {
            let base = chunk_index * CHUNK;
            let bytes: Vec<String> = chunk.iter().map(ToString::to_string).collect();
            out.line(&[
                "HU8.set([", &bytes.join(","), "], (", &offset, ") + ",
                &base.to_string(), ");",
            ]);
        }
    }
}

/// JS string literal escaping for export names (decoded as lossy UTF-8).
fn js_string(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('"');
    for c in text.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                escaped.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => escaped.push(c),
        }
    }
    escaped.push('"');
    escaped
}

fn emit_exports(out: &mut Emitter, result: &ParseResult) {
    out.line(&["return {"]);
    for export in &result.exports {
        let value = match export.kind {
            ExternalKind::Function => format!("F{}", export.index),
            ExternalKind::Global => format!("G{}", export.index),
            ExternalKind::Table => "T0".to_string(),
            ExternalKind::Memory => "M0".to_string(),
        };
        out.line(&[&js_string(&export.field), ": ", &value, ","]);
    }
    out.line(&["};"]);
}
