//! Static MVP rule tests: index spaces, uniqueness, mutability, and the
//! init-expression constraints.

use crate::utils::{
    KIND_FUNC, KIND_GLOBAL, ModuleBuilder, SEC_CODE, SEC_DATA, SEC_ELEMENT, SEC_EXPORT,
    SEC_FUNCTION, SEC_GLOBAL, SEC_IMPORT, SEC_MEMORY, SEC_START, SEC_TABLE, SEC_TYPE, T_F64, T_I32,
    counted, data_entry, element_entry, export, func_body, functype, get_global_init,
    global_entry, i32_const_init, import_global, import_memory, import_table, limits, table_entry,
};
use wasmlift_translate::{TranslateError, ValidateError, translate_module};

fn validate_err(bytes: &[u8]) -> ValidateError {
    match translate_module(bytes).unwrap_err() {
        TranslateError::Validate(err) => err,
        TranslateError::Decode(err) => panic!("expected ValidateError, got {err}"),
    }
}

#[test]
fn imported_and_defined_memory_is_one_too_many() {
    let bytes = ModuleBuilder::new()
        .section(SEC_IMPORT, counted(&[import_memory("env", "mem", 1, None)]))
        .section(SEC_MEMORY, counted(&[limits(1, None)]))
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::MultipleMemories
    ));
}

#[test]
fn two_defined_memories_are_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_MEMORY, counted(&[limits(1, None), limits(1, None)]))
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::MultipleMemories
    ));
}

#[test]
fn imported_and_defined_table_is_one_too_many() {
    let bytes = ModuleBuilder::new()
        .section(SEC_IMPORT, counted(&[import_table("env", "tbl", 1, None)]))
        .section(SEC_TABLE, counted(&[table_entry(1, None)]))
        .build();
    assert!(matches!(validate_err(&bytes), ValidateError::MultipleTables));
}

#[test]
fn inverted_limits_are_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_MEMORY, counted(&[limits(4, Some(2))]))
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::LimitsMinExceedsMax {
            initial: 4,
            maximum: 2
        }
    ));
}

#[test]
fn duplicate_export_names_are_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(SEC_FUNCTION, counted(&[vec![0], vec![0]]))
        .section(
            SEC_EXPORT,
            counted(&[export("foo", KIND_FUNC, 0), export("foo", KIND_FUNC, 1)]),
        )
        .section(
            SEC_CODE,
            counted(&[func_body(&[], &[0x0b]), func_body(&[], &[0x0b])]),
        )
        .build();
    let err = validate_err(&bytes);
    assert!(
        matches!(&err, ValidateError::DuplicateExportName { name } if name == "foo"),
        "unexpected error: {err}"
    );
}

#[test]
fn export_index_out_of_range_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_EXPORT, counted(&[export("f", KIND_FUNC, 0)]))
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::ExportIndexOutOfRange { .. }
    ));
}

#[test]
fn mutable_imported_global_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(
            SEC_IMPORT,
            counted(&[import_global("env", "g", T_I32, true)]),
        )
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::MutableGlobalImported { index: 0 }
    ));
}

#[test]
fn exporting_a_mutable_global_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(
            SEC_GLOBAL,
            counted(&[global_entry(T_I32, true, &i32_const_init(0))]),
        )
        .section(SEC_EXPORT, counted(&[export("g", KIND_GLOBAL, 0)]))
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::MutableGlobalExported { .. }
    ));
}

#[test]
fn init_expr_referring_to_defined_global_is_rejected() {
    // Global 0 is defined in this module, not imported, so global 1 cannot
    // use it in a constant initialiser.
    let bytes = ModuleBuilder::new()
        .section(
            SEC_GLOBAL,
            counted(&[
                global_entry(T_I32, false, &i32_const_init(1)),
                global_entry(T_I32, false, &get_global_init(0)),
            ]),
        )
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::InitExprNonImportedGlobal { index: 0 }
    ));
}

#[test]
fn init_expr_type_mismatch_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(
            SEC_GLOBAL,
            counted(&[global_entry(T_F64, false, &i32_const_init(0))]),
        )
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::InitExprTypeMismatch { .. }
    ));
}

#[test]
fn start_function_with_parameters_is_rejected() {
    let mut start_payload = Vec::new();
    crate::utils::varu32(&mut start_payload, 0);
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[T_I32], None)]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_START, start_payload)
        .section(SEC_CODE, counted(&[func_body(&[], &[0x0b])]))
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::StartFunctionSignature { index: 0 }
    ));
}

#[test]
fn element_segment_with_nonzero_table_index_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_TABLE, counted(&[table_entry(1, None)]))
        .section(
            SEC_ELEMENT,
            counted(&[element_entry(1, &i32_const_init(0), &[0])]),
        )
        .section(SEC_CODE, counted(&[func_body(&[], &[0x0b])]))
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::NonZeroTableIndex { index: 1 }
    ));
}

#[test]
fn element_segment_without_table_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(
            SEC_ELEMENT,
            counted(&[element_entry(0, &i32_const_init(0), &[0])]),
        )
        .section(SEC_CODE, counted(&[func_body(&[], &[0x0b])]))
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::ElementWithoutTable
    ));
}

#[test]
fn data_segment_with_nonzero_memory_index_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_MEMORY, counted(&[limits(1, None)]))
        .section(
            SEC_DATA,
            counted(&[data_entry(1, &i32_const_init(0), &[0xff])]),
        )
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::NonZeroMemoryIndex { index: 1 }
    ));
}

#[test]
fn data_segment_without_memory_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(
            SEC_DATA,
            counted(&[data_entry(0, &i32_const_init(0), &[0xff])]),
        )
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::DataWithoutMemory
    ));
}

#[test]
fn body_count_must_match_declared_functions() {
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(SEC_FUNCTION, counted(&[vec![0], vec![0]]))
        .section(SEC_CODE, counted(&[func_body(&[], &[0x0b])]))
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::BodyCountMismatch {
            bodies: 1,
            declared: 2
        }
    ));
}

#[test]
fn function_type_index_out_of_range_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(SEC_FUNCTION, counted(&[vec![7]]))
        .build();
    assert!(matches!(
        validate_err(&bytes),
        ValidateError::TypeIndexOutOfRange { index: 7 }
    ));
}
