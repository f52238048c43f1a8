//! Error types for module decoding and validation.
//!
//! Two non-recoverable error kinds cover the whole pipeline:
//!
//! - [`DecodeError`] — the binary image is structurally malformed (bad magic,
//!   truncated input, LEB128 overflow, sections out of order, payload
//!   overruns, post-MVP constructs).
//! - [`ValidateError`] — the image is well-formed but violates a static rule
//!   of the WebAssembly MVP (operand stack type mismatch, branch depth out of
//!   range, duplicate export, mutable imported global, ...).
//!
//! Both surface to the caller of the translation entry point; the partially
//! built artifact is discarded and no recovery is attempted. Runtime traps in
//! the *emitted* JavaScript (division by zero, out-of-bounds access, indirect
//! call mismatch) are not compile-time errors and never appear here.

use thiserror::Error;

use crate::types::{StackType, ValType};

/// Structural failures raised while reading the binary image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("offset {offset}: unexpected end of input, {needed} more byte(s) needed")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("offset {offset}: {what} uses too many bytes")]
    VarintOverflow { offset: usize, what: &'static str },

    #[error("offset {offset}: varuint does not fit in {bits} bit(s)")]
    VaruintTooWide { offset: usize, bits: u32 },

    #[error("bad magic number {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unsupported module version {found}")]
    BadVersion { found: u32 },

    #[error("offset {offset}: unknown section id {id}")]
    UnknownSection { offset: usize, id: u8 },

    #[error("offset {offset}: section id {id} after section id {last} is out of order")]
    SectionOutOfOrder { offset: usize, id: u8, last: u8 },

    #[error("offset {offset}: section payload overrun past {end}")]
    PayloadOverrun { offset: usize, end: usize },

    #[error("offset {offset}: unknown import kind {kind}")]
    UnknownImportKind { offset: usize, kind: u8 },

    #[error("offset {offset}: unknown value type tag {tag}")]
    UnknownValueType { offset: usize, tag: i8 },

    #[error("function {func}, offset {offset}: unsupported opcode {opcode:#04x}")]
    UnsupportedOpcode { func: u32, offset: usize, opcode: u8 },

    #[error("offset {offset}: {what} is not part of the MVP")]
    Unsupported { offset: usize, what: &'static str },

    #[error("offset {offset}: {message}")]
    Malformed { offset: usize, message: &'static str },
}

/// Static rule violations raised while type-checking the decoded module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("function {func}: expected {expected} on the operand stack, found {found}")]
    StackTypeMismatch {
        func: u32,
        expected: ValType,
        found: StackType,
    },

    #[error("function {func}: operand stack underflow")]
    StackUnderflow { func: u32 },

    #[error("function {func}: {remaining} value(s) left on the operand stack at block end")]
    UnbalancedBlock { func: u32, remaining: usize },

    #[error("function {func}: branch depth {depth} exceeds {frames} open frame(s)")]
    BranchDepthOutOfRange { func: u32, depth: u32, frames: usize },

    #[error("function {func}: br_table targets disagree on their result type")]
    BrTableTypeMismatch { func: u32 },

    #[error("function {func}: `if` with a result type requires an `else` arm")]
    IfMissingElse { func: u32 },

    #[error("function {func}: local index {index} out of range")]
    LocalIndexOutOfRange { func: u32, index: u32 },

    #[error("function {func}: alignment hint {align} exceeds the natural alignment of {op}")]
    AlignmentTooLarge {
        func: u32,
        align: u32,
        op: &'static str,
    },

    #[error("function {func}: memory access without a declared memory")]
    NoMemory { func: u32 },

    #[error("function {func}: call_indirect without a declared table")]
    NoTable { func: u32 },

    #[error("function index {index} out of range")]
    FunctionIndexOutOfRange { index: u32 },

    #[error("global index {index} out of range")]
    GlobalIndexOutOfRange { index: u32 },

    #[error("type index {index} out of range")]
    TypeIndexOutOfRange { index: u32 },

    #[error("function {func}: assignment to immutable global {index}")]
    ImmutableGlobalAssigned { func: u32, index: u32 },

    #[error("imported global {index} is mutable")]
    MutableGlobalImported { index: u32 },

    #[error("exported global `{name}` is mutable")]
    MutableGlobalExported { name: String },

    #[error("more than one table")]
    MultipleTables,

    #[error("more than one memory")]
    MultipleMemories,

    #[error("limits minimum {initial} exceeds maximum {maximum}")]
    LimitsMinExceedsMax { initial: u32, maximum: u32 },

    #[error("duplicate export name `{name}`")]
    DuplicateExportName { name: String },

    #[error("export index {index} out of range for {kind}")]
    ExportIndexOutOfRange { kind: &'static str, index: u32 },

    #[error("init expression refers to non-imported global {index}")]
    InitExprNonImportedGlobal { index: u32 },

    #[error("init expression refers to mutable global {index}")]
    InitExprMutableGlobal { index: u32 },

    #[error("init expression has type {found}, expected {expected}")]
    InitExprTypeMismatch { expected: ValType, found: ValType },

    #[error("start function {index} must take no parameters and return nothing")]
    StartFunctionSignature { index: u32 },

    #[error("code section has {bodies} bodies for {declared} declared function(s)")]
    BodyCountMismatch { bodies: u32, declared: u32 },

    #[error("element segment targets table {index}, only table 0 exists in the MVP")]
    NonZeroTableIndex { index: u32 },

    #[error("data segment targets memory {index}, only memory 0 exists in the MVP")]
    NonZeroMemoryIndex { index: u32 },

    #[error("element segment without a declared table")]
    ElementWithoutTable,

    #[error("data segment without a declared memory")]
    DataWithoutMemory,
}

/// Either of the two failure kinds, as returned by the translation entry
/// points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Validate(#[from] ValidateError),
}
