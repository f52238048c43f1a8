//! Module skeleton decoder and per-section parsers.
//!
//! One forward pass over the binary image: verify magic and version, then
//! walk sections in id order, dispatching each known section to its handler
//! and skipping custom sections after a well-formedness check. Section
//! handlers populate a [`ParseResult`]; the code section streams every
//! function body straight through the translator, so by the time the last
//! section closes the whole function pack has been emitted.

use crate::errors::{DecodeError, TranslateError, ValidateError};
use crate::opcodes::{external, op, sections, typetags};
use crate::reader::BytesReader;
use crate::translator;
use crate::types::{
    DataSegment, ElementSegment, ExportEntry, ExternalKind, FuncSig, GlobalDesc, GlobalRecord,
    ImportEntry, ImportKind, InitExpr, Limits, MAX_PAGES, MemoryDesc, ParseResult, TableDesc,
    ValType,
};

const MAGIC: u32 = 0x6d73_6100;
const VERSION: u32 = 1;

/// Decodes, validates, and translates a whole module image.
pub(crate) fn decode_module(bytes: &[u8]) -> Result<ParseResult, TranslateError> {
    let mut decoder = ModuleDecoder {
        reader: BytesReader::new(bytes),
        result: ParseResult::default(),
    };
    decoder.run()?;
    Ok(decoder.result)
}

struct ModuleDecoder<'a> {
    reader: BytesReader<'a>,
    result: ParseResult,
}

impl ModuleDecoder<'_> {
    fn run(&mut self) -> Result<(), TranslateError> {
        let magic = self.reader.read_u32()?;
        if magic != MAGIC {
            return Err(DecodeError::BadMagic { found: magic }.into());
        }
        let version = self.reader.read_u32()?;
        if version != VERSION {
            return Err(DecodeError::BadVersion { found: version }.into());
        }

        let mut last_known: u8 = 0;
        while !self.reader.is_eof() {
            let id_offset = self.reader.pos();
            let id = self.reader.read_var_u7()?;
            let payload_len = self.reader.read_var_u32()? as usize;
            let payload_end = self.reader.pos() + payload_len;

            if id == sections::CUSTOM {
                self.check_custom_name(payload_end)?;
            } else {
                if id > sections::LAST_KNOWN {
                    return Err(DecodeError::UnknownSection {
                        offset: id_offset,
                        id,
                    }
                    .into());
                }
                if id <= last_known {
                    return Err(DecodeError::SectionOutOfOrder {
                        offset: id_offset,
                        id,
                        last: last_known,
                    }
                    .into());
                }
                last_known = id;
                self.dispatch(id)?;
                if self.reader.pos() > payload_end {
                    return Err(DecodeError::PayloadOverrun {
                        offset: self.reader.pos(),
                        end: payload_end,
                    }
                    .into());
                }
            }
            // The declared payload end is authoritative; trailing padding
            // inside a section is tolerated.
            self.reader.skip_to(payload_end)?;
        }
        Ok(())
    }

    /// Custom sections must carry a well-formed length-prefixed name that
    /// fits inside the payload; the content is skipped.
    fn check_custom_name(&mut self, payload_end: usize) -> Result<(), DecodeError> {
        let name_len = self.reader.read_var_u32()? as usize;
        if self.reader.pos() + name_len > payload_end {
            return Err(DecodeError::PayloadOverrun {
                offset: self.reader.pos() + name_len,
                end: payload_end,
            });
        }
        self.reader.read_bytes(name_len)?;
        Ok(())
    }

    fn dispatch(&mut self, id: u8) -> Result<(), TranslateError> {
        match id {
            sections::TYPE => self.parse_type_section(),
            sections::IMPORT => self.parse_import_section(),
            sections::FUNCTION => self.parse_function_section(),
            sections::TABLE => self.parse_table_section(),
            sections::MEMORY => self.parse_memory_section(),
            sections::GLOBAL => self.parse_global_section(),
            sections::EXPORT => self.parse_export_section(),
            sections::START => self.parse_start_section(),
            sections::ELEMENT => self.parse_element_section(),
            sections::CODE => self.parse_code_section(),
            sections::DATA => self.parse_data_section(),
            _ => unreachable!("ids outside 1..=11 are rejected before dispatch"),
        }
    }

    fn read_val_type(&mut self) -> Result<ValType, DecodeError> {
        let offset = self.reader.pos();
        let tag = self.reader.read_var_s7()?;
        ValType::from_tag(tag, offset)
    }

    fn read_name(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.reader.read_var_u32()? as usize;
        Ok(self.reader.read_bytes(len)?.to_vec())
    }

    fn read_limits(&mut self) -> Result<Limits, TranslateError> {
        let flags = self.reader.read_var_u1()?;
        let initial = self.reader.read_var_u32()?;
        let maximum = if flags == 1 {
            Some(self.reader.read_var_u32()?)
        } else {
            None
        };
        let limits = Limits { initial, maximum };
        limits.check()?;
        Ok(limits)
    }

    fn read_table_desc(&mut self) -> Result<TableDesc, TranslateError> {
        let offset = self.reader.pos();
        let elem_type = self.reader.read_var_s7()?;
        if elem_type != typetags::ANYFUNC {
            return Err(DecodeError::Unsupported {
                offset,
                what: "table element type other than anyfunc",
            }
            .into());
        }
        let limits = self.read_limits()?;
        Ok(TableDesc { limits })
    }

    fn read_memory_desc(&mut self) -> Result<MemoryDesc, TranslateError> {
        let offset = self.reader.pos();
        let limits = self.read_limits()?;
        if limits.initial > MAX_PAGES || limits.maximum.is_some_and(|m| m > MAX_PAGES) {
            return Err(DecodeError::Malformed {
                offset,
                message: "memory limits exceed 65536 pages",
            }
            .into());
        }
        Ok(MemoryDesc { limits })
    }

    fn read_global_desc(&mut self) -> Result<GlobalDesc, TranslateError> {
        let content = self.read_val_type()?;
        let mutable = self.reader.read_var_u1()? == 1;
        Ok(GlobalDesc { content, mutable })
    }

    fn add_table(&mut self, desc: TableDesc, imported: bool) -> Result<(), ValidateError> {
        if self.result.table.is_some() {
            return Err(ValidateError::MultipleTables);
        }
        self.result.table = Some(desc);
        self.result.table_imported = imported;
        Ok(())
    }

    fn add_memory(&mut self, desc: MemoryDesc, imported: bool) -> Result<(), ValidateError> {
        if self.result.memory.is_some() {
            return Err(ValidateError::MultipleMemories);
        }
        self.result.memory = Some(desc);
        self.result.memory_imported = imported;
        Ok(())
    }

    fn parse_type_section(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        for _ in 0..count {
            let offset = self.reader.pos();
            let form = self.reader.read_var_s7()?;
            if form != typetags::FUNC {
                return Err(DecodeError::Malformed {
                    offset,
                    message: "type entry is not a function signature",
                }
                .into());
            }
            let param_count = self.reader.read_var_u32()?;
            let mut params = Vec::with_capacity(param_count as usize);
            for _ in 0..param_count {
                params.push(self.read_val_type()?);
            }
            let result_offset = self.reader.pos();
            let result_count = self.reader.read_var_u32()?;
            if result_count > 1 {
                return Err(DecodeError::Unsupported {
                    offset: result_offset,
                    what: "more than one result type",
                }
                .into());
            }
            let result = if result_count == 1 {
                Some(self.read_val_type()?)
            } else {
                None
            };
            self.result.types.push(FuncSig { params, result });
        }
        Ok(())
    }

    fn parse_import_section(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        for _ in 0..count {
            let module = self.read_name()?;
            let name = self.read_name()?;
            let kind_offset = self.reader.pos();
            let kind_byte = self.reader.read_u8()?;
            let kind = match kind_byte {
                external::FUNCTION => {
                    let type_index = self.reader.read_var_u32()?;
                    if type_index as usize >= self.result.types.len() {
                        return Err(ValidateError::TypeIndexOutOfRange { index: type_index }.into());
                    }
                    self.result.functions.push(type_index);
                    self.result.num_imported_funcs += 1;
                    ImportKind::Function { type_index }
                }
                external::TABLE => {
                    let desc = self.read_table_desc()?;
                    self.add_table(desc, true)?;
                    ImportKind::Table(desc)
                }
                external::MEMORY => {
                    let desc = self.read_memory_desc()?;
                    self.add_memory(desc, true)?;
                    ImportKind::Memory(desc)
                }
                external::GLOBAL => {
                    let desc = self.read_global_desc()?;
                    if desc.mutable {
                        let index = u32::try_from(self.result.imported_globals.len())
                            .unwrap_or(u32::MAX);
                        return Err(ValidateError::MutableGlobalImported { index }.into());
                    }
                    self.result.imported_globals.push(desc);
                    ImportKind::Global(desc)
                }
                _ => {
                    return Err(DecodeError::UnknownImportKind {
                        offset: kind_offset,
                        kind: kind_byte,
                    }
                    .into());
                }
            };
            self.result.imports.push(ImportEntry { module, name, kind });
        }
        Ok(())
    }

    fn parse_function_section(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        for _ in 0..count {
            let type_index = self.reader.read_var_u32()?;
            if type_index as usize >= self.result.types.len() {
                return Err(ValidateError::TypeIndexOutOfRange { index: type_index }.into());
            }
            self.result.functions.push(type_index);
        }
        Ok(())
    }

    fn parse_table_section(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        for _ in 0..count {
            let desc = self.read_table_desc()?;
            self.add_table(desc, false)?;
        }
        Ok(())
    }

    fn parse_memory_section(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        for _ in 0..count {
            let desc = self.read_memory_desc()?;
            self.add_memory(desc, false)?;
        }
        Ok(())
    }

    fn parse_global_section(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        for _ in 0..count {
            let desc = self.read_global_desc()?;
            let init = read_init_expr(
                &mut self.reader,
                desc.content,
                &self.result.imported_globals,
            )?;
            self.result.globals.push(GlobalRecord { desc, init });
        }
        Ok(())
    }

    fn parse_export_section(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        for _ in 0..count {
            let field = self.read_name()?;
            let kind_offset = self.reader.pos();
            let kind_byte = self.reader.read_u8()?;
            let index = self.reader.read_var_u32()?;
            let kind = match kind_byte {
                external::FUNCTION => {
                    if index >= self.result.num_funcs() {
                        return Err(ValidateError::ExportIndexOutOfRange {
                            kind: ExternalKind::Function.name(),
                            index,
                        }
                        .into());
                    }
                    ExternalKind::Function
                }
                external::TABLE => {
                    if index != 0 || self.result.table.is_none() {
                        return Err(ValidateError::ExportIndexOutOfRange {
                            kind: ExternalKind::Table.name(),
                            index,
                        }
                        .into());
                    }
                    ExternalKind::Table
                }
                external::MEMORY => {
                    if index != 0 || self.result.memory.is_none() {
                        return Err(ValidateError::ExportIndexOutOfRange {
                            kind: ExternalKind::Memory.name(),
                            index,
                        }
                        .into());
                    }
                    ExternalKind::Memory
                }
                external::GLOBAL => {
                    let desc = self
                        .result
                        .global_desc(index)
                        .map_err(|_| ValidateError::ExportIndexOutOfRange {
                            kind: ExternalKind::Global.name(),
                            index,
                        })?;
                    if desc.mutable {
                        return Err(ValidateError::MutableGlobalExported {
                            name: String::from_utf8_lossy(&field).into_owned(),
                        }
                        .into());
                    }
                    ExternalKind::Global
                }
                _ => {
                    return Err(DecodeError::UnknownImportKind {
                        offset: kind_offset,
                        kind: kind_byte,
                    }
                    .into());
                }
            };
            if !self.result.export_names.insert(field.clone()) {
                return Err(ValidateError::DuplicateExportName {
                    name: String::from_utf8_lossy(&field).into_owned(),
                }
                .into());
            }
            self.result.exports.push(ExportEntry { field, kind, index });
        }
        Ok(())
    }

    fn parse_start_section(&mut self) -> Result<(), TranslateError> {
        let index = self.reader.read_var_u32()?;
        let sig = self.result.func_sig(index)?;
        if !sig.params.is_empty() || sig.result.is_some() {
            return Err(ValidateError::StartFunctionSignature { index }.into());
        }
        self.result.start = Some(index);
        Ok(())
    }

    fn parse_element_section(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        for _ in 0..count {
            let table_index = self.reader.read_var_u32()?;
            if table_index != 0 {
                return Err(ValidateError::NonZeroTableIndex { index: table_index }.into());
            }
            if self.result.table.is_none() {
                return Err(ValidateError::ElementWithoutTable.into());
            }
            let offset = read_init_expr(
                &mut self.reader,
                ValType::I32,
                &self.result.imported_globals,
            )?;
            let func_count = self.reader.read_var_u32()?;
            let mut func_indices = Vec::with_capacity(func_count as usize);
            for _ in 0..func_count {
                let index = self.reader.read_var_u32()?;
                if index >= self.result.num_funcs() {
                    return Err(ValidateError::FunctionIndexOutOfRange { index }.into());
                }
                func_indices.push(index);
            }
            self.result.elements.push(ElementSegment {
                offset,
                func_indices,
            });
        }
        Ok(())
    }

    fn parse_code_section(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        let declared = self.result.num_funcs() - self.result.num_imported_funcs;
        if count != declared {
            return Err(ValidateError::BodyCountMismatch {
                bodies: count,
                declared,
            }
            .into());
        }
        for i in 0..count {
            let func_index = self.result.num_imported_funcs + i;
            let body_size = self.reader.read_var_u32()? as usize;
            // The declared body size is authoritative: the translator gets
            // exactly this slice, so any read past it fails at EOF.
            let body = self.reader.read_bytes(body_size)?;
            let translated = translator::translate_function(&self.result, func_index, body)?;
            self.result.code.push_raw(&translated.text);
            for type_index in translated.indirect_type_indices {
                self.result.types.record_indirect(type_index);
            }
        }
        Ok(())
    }

    fn parse_data_section(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        for _ in 0..count {
            let memory_index = self.reader.read_var_u32()?;
            if memory_index != 0 {
                return Err(ValidateError::NonZeroMemoryIndex {
                    index: memory_index,
                }
                .into());
            }
            if self.result.memory.is_none() {
                return Err(ValidateError::DataWithoutMemory.into());
            }
            let offset = read_init_expr(
                &mut self.reader,
                ValType::I32,
                &self.result.imported_globals,
            )?;
            let len = self.reader.read_var_u32()? as usize;
            let bytes = self.reader.read_bytes(len)?.to_vec();
            self.result.data.push(DataSegment { offset, bytes });
        }
        Ok(())
    }
}

/// Reads one constant-producing opcode plus its terminating `end`, checked
/// against the result type the use site requires.
fn read_init_expr(
    reader: &mut BytesReader<'_>,
    expected: ValType,
    imported_globals: &[GlobalDesc],
) -> Result<InitExpr, TranslateError> {
    let offset = reader.pos();
    let opcode = reader.read_u8()?;
    let (expr, found) = match opcode {
        op::I32_CONST => (InitExpr::I32(reader.read_var_s32()?), ValType::I32),
        op::I64_CONST => (InitExpr::I64(reader.read_var_s64()?), ValType::I64),
        op::F32_CONST => (InitExpr::F32(reader.read_f32_bits()?), ValType::F32),
        op::F64_CONST => (InitExpr::F64(reader.read_f64_bits()?), ValType::F64),
        op::GET_GLOBAL => {
            let index = reader.read_var_u32()?;
            let Some(desc) = imported_globals.get(index as usize) else {
                // Defined globals are not constant at instantiation time;
                // anything past the imported range is rejected outright.
                return Err(ValidateError::InitExprNonImportedGlobal { index }.into());
            };
            if desc.mutable {
                return Err(ValidateError::InitExprMutableGlobal { index }.into());
            }
            (InitExpr::GetGlobal(index), desc.content)
        }
        _ => {
            return Err(DecodeError::Malformed {
                offset,
                message: "init expression must be a single constant opcode",
            }
            .into());
        }
    };
    if found != expected {
        return Err(ValidateError::InitExprTypeMismatch { expected, found }.into());
    }
    let end_offset = reader.pos();
    if reader.read_u8()? != op::END {
        return Err(DecodeError::Malformed {
            offset: end_offset,
            message: "init expression missing `end`",
        }
        .into());
    }
    Ok(expr)
}
