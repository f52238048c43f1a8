//! Binary-structure decoding tests: section framing, ordering, LEB128
//! boundary behaviour, and payload accounting.

use crate::utils::{
    ModuleBuilder, SEC_CODE, SEC_FUNCTION, SEC_MEMORY, SEC_TYPE, T_I32, counted, func_body,
    functype, limits,
};
use wasmlift_translate::{DecodeError, TranslateError, translate_module};

fn decode_err(bytes: &[u8]) -> DecodeError {
    match translate_module(bytes).unwrap_err() {
        TranslateError::Decode(err) => err,
        TranslateError::Validate(err) => panic!("expected DecodeError, got {err}"),
    }
}

#[test]
fn empty_module_decodes() -> anyhow::Result<()> {
    let bytes = ModuleBuilder::new().build();
    translate_module(&bytes)?;
    Ok(())
}

#[test]
fn custom_sections_are_skipped() -> anyhow::Result<()> {
    // name "meta" plus opaque payload bytes.
    let custom = vec![4, b'm', b'e', b't', b'a', 0xde, 0xad];
    let bytes = ModuleBuilder::new()
        .section(0, custom.clone())
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(0, custom)
        .build();
    translate_module(&bytes)?;
    Ok(())
}

#[test]
fn known_sections_out_of_order_are_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_MEMORY, counted(&[limits(1, None)]))
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .build();
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::SectionOutOfOrder { id: 1, last: 5, .. }
    ));
}

#[test]
fn repeated_known_section_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .build();
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::SectionOutOfOrder { id: 1, last: 1, .. }
    ));
}

#[test]
fn unknown_section_id_is_rejected() {
    let bytes = ModuleBuilder::new().section(12, vec![]).build();
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::UnknownSection { id: 12, .. }
    ));
}

#[test]
fn six_byte_varuint32_is_rejected() {
    // Section length encoded with six 0x80-continued groups.
    let mut bytes = ModuleBuilder::new().build();
    bytes.push(SEC_TYPE);
    bytes.extend_from_slice(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00]);
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::VarintOverflow { .. }
    ));
}

#[test]
fn memory_limit_boundary_is_enforced() {
    // 65537 initial pages exceeds the 4 GiB ceiling.
    let bytes = ModuleBuilder::new()
        .section(SEC_MEMORY, counted(&[limits(65_537, None)]))
        .build();
    assert!(matches!(decode_err(&bytes), DecodeError::Malformed { .. }));

    // 65536 is exactly the ceiling and decodes.
    let bytes = ModuleBuilder::new()
        .section(SEC_MEMORY, counted(&[limits(65_536, None)]))
        .build();
    assert!(translate_module(&bytes).is_ok());
}

#[test]
fn truncated_section_payload_is_rejected() {
    let mut bytes = ModuleBuilder::new().build();
    bytes.push(SEC_TYPE);
    bytes.push(10); // declares ten payload bytes, none follow
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::UnexpectedEof { .. }
    ));
}

#[test]
fn section_reads_past_declared_payload_are_rejected() {
    // The type section declares a one-byte payload whose entry count then
    // promises an entry that lives past the declared end.
    let mut bytes = ModuleBuilder::new().build();
    bytes.push(SEC_TYPE);
    bytes.push(1); // payload length
    bytes.push(1); // entry count; the entry itself overruns
    bytes.extend_from_slice(&[0x60, 0x00, 0x00]);
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::PayloadOverrun { .. }
    ));
}

#[test]
fn trailing_padding_inside_section_is_tolerated() -> anyhow::Result<()> {
    // The declared payload end is authoritative.
    let mut payload = counted(&[functype(&[], None)]);
    payload.extend_from_slice(&[0x00, 0x00]);
    let bytes = ModuleBuilder::new().section(SEC_TYPE, payload).build();
    translate_module(&bytes)?;
    Ok(())
}

#[test]
fn multi_result_signature_is_unsupported() {
    // form, no params, two results.
    let entry = vec![0x60, 0x00, 0x02, T_I32, T_I32];
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[entry]))
        .build();
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::Unsupported { .. }
    ));
}

#[test]
fn unknown_value_type_is_rejected() {
    let entry = vec![0x60, 0x01, 0x7b, 0x00]; // 0x7b is the post-MVP v128 tag
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[entry]))
        .build();
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::UnknownValueType { .. }
    ));
}

#[test]
fn function_body_with_trailing_bytes_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_CODE, counted(&[func_body(&[], &[0x0b, 0x01])]))
        .build();
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::Malformed {
            message: "trailing bytes after function end",
            ..
        }
    ));
}

#[test]
fn function_body_truncated_by_declared_size_is_rejected() {
    // Declared body size cuts the stream before the terminating end.
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_CODE, counted(&[func_body(&[], &[0x41, 0x05])]))
        .build();
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::UnexpectedEof { .. }
    ));
}

#[test]
fn post_mvp_opcode_in_body_is_rejected() {
    let bytes = ModuleBuilder::new()
        .section(SEC_TYPE, counted(&[functype(&[], None)]))
        .section(SEC_FUNCTION, counted(&[vec![0]]))
        .section(SEC_CODE, counted(&[func_body(&[], &[0xfc, 0x00, 0x0b])]))
        .build();
    assert!(matches!(
        decode_err(&bytes),
        DecodeError::UnsupportedOpcode { opcode: 0xfc, .. }
    ));
}
