//! Data model shared by the decoder, the translator, and the finalizer.
//!
//! Everything a decoded module owns lives in [`ParseResult`]: the interned
//! signature table, per-kind descriptor records, the segments, and the
//! function-pack text accumulated while the code section streams through the
//! translator.

use std::fmt::{self, Display, Formatter};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::emitter::Emitter;
use crate::errors::{DecodeError, ValidateError};
use crate::opcodes::typetags;

/// Bytes per linear-memory page.
pub const PAGE_SIZE: u32 = 65_536;

/// Upper bound on memory limits, in pages (4 GiB total).
pub const MAX_PAGES: u32 = 65_536;

/// The four numeric value types of the MVP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    pub(crate) fn from_tag(tag: i8, offset: usize) -> Result<Self, DecodeError> {
        match tag {
            typetags::I32 => Ok(ValType::I32),
            typetags::I64 => Ok(ValType::I64),
            typetags::F32 => Ok(ValType::F32),
            typetags::F64 => Ok(ValType::F64),
            _ => Err(DecodeError::UnknownValueType { offset, tag }),
        }
    }

    /// One-letter name used in signature strings and virtual-register
    /// prefixes: `i`, `l`, `f`, `d`.
    pub(crate) fn letter(self) -> char {
        match self {
            ValType::I32 => 'i',
            ValType::I64 => 'l',
            ValType::F32 => 'f',
            ValType::F64 => 'd',
        }
    }

    /// Index into per-type height arrays.
    pub(crate) fn idx(self) -> usize {
        match self {
            ValType::I32 => 0,
            ValType::I64 => 1,
            ValType::F32 => 2,
            ValType::F64 => 3,
        }
    }

    /// JavaScript zero initialiser for a hoisted declaration of this type.
    pub(crate) fn zero_literal(self) -> &'static str {
        match self {
            ValType::I32 => "0",
            ValType::I64 => "new Long(0, 0)",
            ValType::F32 | ValType::F64 => "0.0",
        }
    }
}

impl Display for ValType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValType::I32 => write!(f, "i32"),
            ValType::I64 => write!(f, "i64"),
            ValType::F32 => write!(f, "f32"),
            ValType::F64 => write!(f, "f64"),
        }
    }
}

/// An operand-stack slot as the translator sees it. `Unknown` only appears
/// in polymorphic (unreachable) code and satisfies any type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackType {
    Val(ValType),
    Unknown,
}

impl Display for StackType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StackType::Val(ty) => write!(f, "{ty}"),
            StackType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A function signature: parameter types plus at most one result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncSig {
    pub params: Vec<ValType>,
    pub result: Option<ValType>,
}

impl FuncSig {
    /// Canonical signature string: one letter per parameter, `_`, then the
    /// result letter (`v` when there is no result). `(i32, i64) -> f64`
    /// becomes `il_d`.
    #[must_use]
    pub fn sig_string(&self) -> String {
        let mut s = String::with_capacity(self.params.len() + 2);
        for p in &self.params {
            s.push(p.letter());
        }
        s.push('_');
        s.push(self.result.map_or('v', ValType::letter));
        s
    }
}

/// Interned function signatures, in type-section order, plus the set of
/// signatures the translator saw at `call_indirect` sites (the finalizer
/// synthesises one `call_<sig>` helper per entry).
#[derive(Debug, Default)]
pub struct SignatureTable {
    sigs: Vec<FuncSig>,
    indirect: FxHashMap<String, u32>,
}

impl SignatureTable {
    pub(crate) fn push(&mut self, sig: FuncSig) {
        self.sigs.push(sig);
    }

    pub(crate) fn len(&self) -> usize {
        self.sigs.len()
    }

    pub(crate) fn get(&self, index: u32) -> Result<&FuncSig, ValidateError> {
        self.sigs
            .get(index as usize)
            .ok_or(ValidateError::TypeIndexOutOfRange { index })
    }

    /// Records that `call_indirect` was emitted against type `index`.
    /// Signatures equal element-wise share one helper.
    pub(crate) fn record_indirect(&mut self, index: u32) {
        let key = self.sigs[index as usize].sig_string();
        self.indirect.entry(key).or_insert(index);
    }

    /// Signature strings needing a `call_<sig>` helper, with a type index
    /// carrying each one, in a stable order.
    pub(crate) fn indirect_sigs(&self) -> Vec<(String, u32)> {
        let mut out: Vec<(String, u32)> = self
            .indirect
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        out.sort();
        out
    }
}

/// Size bounds for a table or memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub initial: u32,
    pub maximum: Option<u32>,
}

impl Limits {
    pub(crate) fn check(&self) -> Result<(), ValidateError> {
        match self.maximum {
            Some(maximum) if maximum < self.initial => Err(ValidateError::LimitsMinExceedsMax {
                initial: self.initial,
                maximum,
            }),
            _ => Ok(()),
        }
    }
}

/// The single table of an MVP module. Element type is always `anyfunc`.
#[derive(Debug, Clone, Copy)]
pub struct TableDesc {
    pub limits: Limits,
}

/// The single linear memory of an MVP module, limits in pages.
#[derive(Debug, Clone, Copy)]
pub struct MemoryDesc {
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy)]
pub struct GlobalDesc {
    pub content: ValType,
    pub mutable: bool,
}

/// What an import brings into the module.
#[derive(Debug, Clone)]
pub enum ImportKind {
    Function { type_index: u32 },
    Table(TableDesc),
    Memory(MemoryDesc),
    Global(GlobalDesc),
}

/// One import entry. Names are kept as raw bytes; UTF-8 decoding happens at
/// the emission boundary only.
#[derive(Debug, Clone)]
pub struct ImportEntry {
    pub module: Vec<u8>,
    pub name: Vec<u8>,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    Function,
    Table,
    Memory,
    Global,
}

impl ExternalKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ExternalKind::Function => "function",
            ExternalKind::Table => "table",
            ExternalKind::Memory => "memory",
            ExternalKind::Global => "global",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub field: Vec<u8>,
    pub kind: ExternalKind,
    pub index: u32,
}

/// A decoded init-expression: one constant-producing operation, already
/// validated against its required result type.
#[derive(Debug, Clone, Copy)]
pub enum InitExpr {
    I32(i32),
    I64(i64),
    /// Raw bits, so NaN payloads survive to emission.
    F32(u32),
    F64(u64),
    /// Index of an imported immutable global.
    GetGlobal(u32),
}

#[derive(Debug, Clone)]
pub struct GlobalRecord {
    pub desc: GlobalDesc,
    pub init: InitExpr,
}

#[derive(Debug, Clone)]
pub struct ElementSegment {
    pub offset: InitExpr,
    pub func_indices: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct DataSegment {
    pub offset: InitExpr,
    pub bytes: Vec<u8>,
}

/// Everything decoded from one module image. Created at decode start,
/// mutated only by the decoder and translator, frozen once the finalizer
/// renders it.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub(crate) types: SignatureTable,
    pub(crate) imports: Vec<ImportEntry>,

    /// Type index per function, imported functions first.
    pub(crate) functions: Vec<u32>,
    pub(crate) num_imported_funcs: u32,

    pub(crate) table: Option<TableDesc>,
    pub(crate) table_imported: bool,
    pub(crate) memory: Option<MemoryDesc>,
    pub(crate) memory_imported: bool,

    /// Imported globals, first in the global index space.
    pub(crate) imported_globals: Vec<GlobalDesc>,
    /// Defined globals, after the imported ones.
    pub(crate) globals: Vec<GlobalRecord>,

    pub(crate) exports: Vec<ExportEntry>,
    pub(crate) export_names: FxHashSet<Vec<u8>>,

    pub(crate) start: Option<u32>,
    pub(crate) elements: Vec<ElementSegment>,
    pub(crate) data: Vec<DataSegment>,

    /// Function-pack text, one JavaScript function per defined body,
    /// appended in code-section order.
    pub(crate) code: Emitter,
}

impl ParseResult {
    pub(crate) fn num_funcs(&self) -> u32 {
        u32::try_from(self.functions.len()).unwrap_or(u32::MAX)
    }

    pub(crate) fn num_globals(&self) -> u32 {
        u32::try_from(self.imported_globals.len() + self.globals.len()).unwrap_or(u32::MAX)
    }

    /// Descriptor for any global index, imported or defined.
    pub(crate) fn global_desc(&self, index: u32) -> Result<GlobalDesc, ValidateError> {
        let imported = self.imported_globals.len();
        let index_usize = index as usize;
        if index_usize < imported {
            Ok(self.imported_globals[index_usize])
        } else {
            self.globals
                .get(index_usize - imported)
                .map(|g| g.desc)
                .ok_or(ValidateError::GlobalIndexOutOfRange { index })
        }
    }

    /// Resolved signature of any function index.
    pub(crate) fn func_sig(&self, index: u32) -> Result<&FuncSig, ValidateError> {
        let type_index = self
            .functions
            .get(index as usize)
            .ok_or(ValidateError::FunctionIndexOutOfRange { index })?;
        self.types.get(*type_index)
    }
}
