#![warn(clippy::pedantic)]
//! WebAssembly MVP to JavaScript Translator
//!
//! This crate is a single-pass decoder, validator, and translator for
//! WebAssembly MVP (version 1) binary modules. It lets a host environment
//! without native WASM support load and run WASM modules: each function body
//! is translated into semantically equivalent JavaScript, and the whole
//! module becomes one JavaScript factory function.
//!
//! ## Overview
//!
//! ```text
//! .wasm image → decode sections → validate → translate bodies → JS module
//! ```
//!
//! Decoding, validation, and emission happen in one forward pass over the
//! binary: section parsers populate a parse result, and the code section
//! streams every function body through the stack-polymorphic translator as
//! it is read. The finalizer then renders the outer wrapper with imports
//! binding, table/memory construction, segment initialisation, the start
//! call, and the exports object.
//!
//! ## Entry Points
//!
//! [`translate_module`] translates a binary image into a JavaScript module
//! factory named `instantiate`; [`translate_module_named`] labels the
//! wrapper for debuggability:
//!
//! ```ignore
//! use wasmlift_translate::translate_module;
//!
//! let wasm_bytes = std::fs::read("module.wasm")?;
//! let js = translate_module(&wasm_bytes)?;
//! std::fs::write("module.js", js)?;
//! ```
//!
//! The emitted artifact has the signature
//! `(ambient, stdlib, imports) -> exports`: `ambient` supplies the
//! container objects (`trap`, `Memory`, `Table`), `stdlib` the pure numeric
//! helpers (`Long`, `ToF32`, the `i64_*`/`f32_*`/`f64_*` families), and
//! `imports` the module's imported functions (`F<i>`), globals (`G<i>`),
//! table (`T0`), and memory (`M0`).
//!
//! ## Errors
//!
//! Failures are [`DecodeError`] for structurally malformed images and
//! [`ValidateError`] for static MVP rule violations, wrapped in
//! [`TranslateError`]. Both reject the module wholesale; runtime traps in
//! the emitted code go through the host-supplied `trap` callable instead.

mod emitter;
mod finalizer;
mod opcodes;
mod reader;
mod translator;
mod wasm_parser;

pub mod errors;
pub mod types;

pub use errors::{DecodeError, TranslateError, ValidateError};

/// Translates a WASM MVP binary image into a JavaScript module factory
/// named `instantiate`.
///
/// # Errors
///
/// Returns [`TranslateError`] when the image is malformed or violates the
/// MVP validation rules.
pub fn translate_module(bytes: &[u8]) -> Result<String, TranslateError> {
    translate_module_named("instantiate", bytes)
}

/// Translates a WASM MVP binary image, labelling the emitted wrapper
/// function `name`.
///
/// # Errors
///
/// Returns [`TranslateError`] when the image is malformed or violates the
/// MVP validation rules.
pub fn translate_module_named(name: &str, bytes: &[u8]) -> Result<String, TranslateError> {
    let result = wasm_parser::decode_module(bytes)?;
    Ok(finalizer::finalize(&result, name))
}
