/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use isax::assembler::AssemblyOutput;
use isax::container;
use isax::disassembler::decoder::DecodedOperand;
use isax::disassembler::formatter::{Formatter, ListingOptions};
use isax::errors::AssemblyError;
use isax::workspace::{DiskWorkspace, MemoryWorkspace, Workspace};
use isax::{DisassemblyOptions, Isa};

const ZX16: &str = include_str!("../definitions/zx16.json");

fn zx16() -> Isa {
    Isa::from_json(ZX16).unwrap()
}

fn assemble(source: &str, isa: &Isa) -> AssemblyOutput {
    isax::assemble(source, isa).unwrap()
}

fn code_bytes(output: &AssemblyOutput) -> Vec<u8> {
    let (start, end) = output.image.bounds().unwrap();
    output.image.extract(start, end - start + 1)
}

#[test]
fn test_basic_r_type() {
    let isa = zx16();
    let output = assemble("ADD x6, x7\n", &isa);
    // rs2=7 into 11:9, rd=6 into 8:6, everything else fixed zero
    assert_eq!(code_bytes(&output), vec![0x80, 0x0F]);
}

#[test]
fn test_signed_immediate_field_and_text() {
    let isa = zx16();
    let output = assemble("ADDI x1, #-1\n", &isa);
    let bytes = code_bytes(&output);
    let word = u16::from_le_bytes([bytes[0], bytes[1]]);
    // -1 occupies the whole 7-bit field
    assert_eq!(word >> 9, 0x7F);

    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    let formatter = Formatter::new(&isa);
    let text = formatter.instruction(&result.instructions[0], &result.labels);
    assert_eq!(text, "ADDI x1, #-1");
}

#[test]
fn test_multi_field_immediate_round_trip() {
    let isa = zx16();
    let output = assemble("LUI x6, 100\n", &isa);
    let bytes = code_bytes(&output);
    let word = u16::from_le_bytes([bytes[0], bytes[1]]);
    // 100 = 0b001100100 -> 001100 in bits 15:10, 100 in bits 5:3
    assert_eq!(word >> 10, 0b001100);
    assert_eq!((word >> 3) & 0x7, 0b100);

    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    assert_eq!(result.instructions[0].mnemonic, "LUI");
    assert_eq!(
        result.instructions[0].operands,
        vec![DecodedOperand::Register(6), DecodedOperand::Immediate(100)]
    );
}

#[test]
fn test_pc_relative_jump_with_label() {
    let isa = zx16();
    let output = assemble("start: NOP\nJ start\n", &isa);
    let wrapped = container::write(&output, &isa);
    let result = isax::disassemble(
        &wrapped,
        &isa,
        &DisassemblyOptions {
            reconstruct_labels: true,
            ..DisassemblyOptions::default()
        },
    )
    .unwrap();

    let formatter = Formatter::new(&isa);
    let listing = formatter.listing(
        &result.instructions,
        &result.data_sections,
        &result.labels,
        &ListingOptions::default(),
    );
    assert!(listing.contains("start:"), "listing:\n{}", listing);
    assert!(listing.contains("J start"), "listing:\n{}", listing);
}

#[test]
fn test_smart_expansion_forward_target() {
    let isa = zx16();
    // offset 0x180: AUIPC takes 3, ADDI takes 0
    let output = assemble("LA x6, tgt\nNOP\n.org 0x1A0\ntgt: ADD x6, x7\n", &isa);
    let word = u16::from_le_bytes([
        output.image.get(0x20).unwrap(),
        output.image.get(0x21).unwrap(),
    ]);
    // AUIPC x6: imm=3 split over 15:10 and 5:3
    assert_eq!(word >> 10, 0);
    assert_eq!((word >> 3) & 0x7, 3);
    assert_eq!(word & 0x7, 0b011);
}

#[test]
fn test_smart_expansion_overflow_is_reported() {
    let isa = zx16();
    // Backward target: AUIPC's immediate is unsigned, nothing can absorb
    // a negative offset
    let failure = isax::assemble("tgt: NOP\n.org 0x120\nLA x6, tgt\n", &isa).unwrap_err();
    assert!(
        failure
            .errors
            .iter()
            .any(|e| matches!(e, AssemblyError::PseudoExpansionOverflow { .. })),
        "unexpected errors: {}",
        failure
    );
}

#[test]
fn test_la_coalesces_back_to_label() {
    let isa = zx16();
    let output = assemble("LA x6, tgt\nNOP\n.org 0x1A0\ntgt: ADD x6, x7\n", &isa);
    let wrapped = container::write(&output, &isa);
    let result = isax::disassemble(
        &wrapped,
        &isa,
        &DisassemblyOptions {
            reconstruct_labels: true,
            ..DisassemblyOptions::default()
        },
    )
    .unwrap();

    assert_eq!(result.instructions[0].mnemonic, "LA");
    assert_eq!(result.instructions[0].target, Some(0x1A0));
    let formatter = Formatter::new(&isa);
    let listing = formatter.listing(
        &result.instructions,
        &result.data_sections,
        &result.labels,
        &ListingOptions::default(),
    );
    assert!(listing.contains("LA x6, tgt"), "listing:\n{}", listing);
}

#[test]
fn test_li16_coalesces_to_immediate() {
    let isa = zx16();
    let output = assemble("LI16 x6, 0x1234\n", &isa);
    let bytes = code_bytes(&output);
    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    assert_eq!(result.instructions.len(), 1);
    assert_eq!(result.instructions[0].mnemonic, "LI16");
    assert_eq!(
        result.instructions[0].operands,
        vec![DecodedOperand::Register(6), DecodedOperand::Immediate(0x1234)]
    );
}

#[test]
fn test_no_pseudo_flag_leaves_expansion_visible() {
    let isa = zx16();
    let output = assemble("LI16 x6, 0x1234\n", &isa);
    let bytes = code_bytes(&output);
    let result = isax::disassemble(
        &bytes,
        &isa,
        &DisassemblyOptions {
            coalesce_pseudo: false,
            ..DisassemblyOptions::default()
        },
    )
    .unwrap();
    assert_eq!(result.instructions.len(), 2);
    assert_eq!(result.instructions[0].mnemonic, "LUI");
    assert_eq!(result.instructions[1].mnemonic, "ORI");
}

#[test]
fn test_zero_run_detected_as_data() {
    let isa = zx16();
    let output = assemble("ADD x6, x7\n.org 0x40\n.space 32\n.byte 0xAA\n", &isa);
    let bytes = code_bytes(&output);
    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    // The long zero run must not come back as a pile of NOPs
    assert_eq!(result.instructions.len(), 1);
    assert_eq!(result.instructions[0].mnemonic, "ADD");
    assert!(!result.data_sections.is_empty());
    assert_eq!(result.data_sections[0].0, 0x22);
}

#[test]
fn test_memory_map_classifies_full_image() {
    let isa = zx16();
    // An image reaching into the mapped data section, large enough that
    // the memory map applies (>= a tenth of the address space)
    let output = assemble("ADD x6, x7\n.org 0x2000\ntable: .word 1, 2, 3, 4\n", &isa);
    let bytes = code_bytes(&output);
    assert!(bytes.len() as u64 >= isa.address_space_size() / 10);
    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    assert_eq!(result.instructions.len(), 1);
    let (_, data) = result
        .data_sections
        .iter()
        .find(|(start, data)| *start <= 0x2000 && *start + data.len() as u32 >= 0x2008)
        .expect("mapped data section present");
    let tail = &data[data.len() - 8..];
    assert_eq!(tail, &[1, 0, 2, 0, 3, 0, 4, 0]);
}

#[test]
fn test_user_data_regions_override() {
    let isa = zx16();
    let output = assemble("ADD x6, x7\nADD x6, x7\nADD x6, x7\n", &isa);
    let bytes = code_bytes(&output);
    let result = isax::disassemble(
        &bytes,
        &isa,
        &DisassemblyOptions {
            data_regions: Some(vec![(0x22, 0x24)]),
            ..DisassemblyOptions::default()
        },
    )
    .unwrap();
    assert_eq!(result.instructions.len(), 2);
    assert_eq!(result.data_sections, vec![(0x22, vec![0x80, 0x0F])]);
}

#[test]
fn test_isax_v2_round_trip_prints_label() {
    let isa = zx16();
    let output = assemble("loop: ADD x6, x7\nBEQZ x1, loop\nJ loop\n", &isa);
    let wrapped = container::write(&output, &isa);

    let result = isax::disassemble(
        &wrapped,
        &isa,
        &DisassemblyOptions {
            reconstruct_labels: true,
            ..DisassemblyOptions::default()
        },
    )
    .unwrap();
    let formatter = Formatter::new(&isa);
    let listing = formatter.listing(
        &result.instructions,
        &result.data_sections,
        &result.labels,
        &ListingOptions::default(),
    );
    assert!(listing.contains("BEQZ x1, loop"), "listing:\n{}", listing);
    assert!(listing.contains("J loop"), "listing:\n{}", listing);
    assert!(!listing.contains("0x20"), "listing:\n{}", listing);
}

#[test]
fn test_round_trip_reassembles_identically() {
    let isa = zx16();
    let source = "\
ADD x6, x7
SUB x1, x2
AND x3, x4
XOR x5, x5
ADDI x1, #-3
ORI x2, 0x55
SLLI x3, 0x12
LUI x6, 100
LW x6, 4(x2)
SW x7, -2(x2)
J 0x20
BEQZ x1, 0x28
ECALL 5
";
    let first = assemble(source, &isa);
    let first_bytes = code_bytes(&first);

    let result = isax::disassemble(
        &first_bytes,
        &isa,
        &DisassemblyOptions {
            coalesce_pseudo: false,
            ..DisassemblyOptions::default()
        },
    )
    .unwrap();
    let formatter = Formatter::new(&isa);
    let listing = formatter.listing(
        &result.instructions,
        &result.data_sections,
        &result.labels,
        &ListingOptions::default(),
    );

    let second = assemble(&listing, &isa);
    assert_eq!(first_bytes, code_bytes(&second), "listing:\n{}", listing);
}

#[test]
fn test_show_addresses_and_bytes_gutters() {
    let isa = zx16();
    let output = assemble("ADD x6, x7\n", &isa);
    let bytes = code_bytes(&output);
    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    let formatter = Formatter::new(&isa);
    let listing = formatter.listing(
        &result.instructions,
        &result.data_sections,
        &result.labels,
        &ListingOptions {
            show_addresses: true,
            show_bytes: true,
        },
    );
    assert!(listing.contains("0020:"), "listing:\n{}", listing);
    assert!(listing.contains("80 0F"), "listing:\n{}", listing);
}

#[test]
fn test_data_directives_round_trip_strings() {
    let isa = zx16();
    let output = assemble(
        ".org 0x2000\nmsg: .asciiz \"hello world\"\n.align 2\n.word 0xBEEF\n",
        &isa,
    );
    let (start, end) = output.image.bounds().unwrap();
    assert_eq!(start, 0x2000);
    let bytes = output.image.extract(start, end - start + 1);
    assert!(bytes.starts_with(b"hello world\0"));
    // aligned word after the string
    assert_eq!(&bytes[bytes.len() - 2..], &[0xEF, 0xBE]);
}

#[test]
fn test_symbol_table_in_container() {
    let isa = zx16();
    let output = assemble("first: NOP\nsecond: NOP\nJ first\n", &isa);
    let wrapped = container::write(&output, &isa);
    let read = container::read(&wrapped).unwrap().unwrap();
    assert_eq!(read.symbols["first"].value, 0x20);
    assert_eq!(read.symbols["second"].value, 0x22);
}

#[test]
fn test_errors_are_collected_not_first_only() {
    let isa = zx16();
    let failure = isax::assemble("BOGUS x1\nADDI x1, #200\nJ nowhere\n", &isa).unwrap_err();
    assert!(failure.errors.len() >= 2, "errors: {}", failure);
}

#[test]
fn test_constant_and_global_directives() {
    let isa = zx16();
    let output = assemble(
        ".equ GREETING, 0x22\n.globl main\nmain: ADDI x1, GREETING\n",
        &isa,
    );
    assert_eq!(output.entry_point, 0x20);
    let bytes = code_bytes(&output);
    let word = u16::from_le_bytes([bytes[0], bytes[1]]);
    assert_eq!(word >> 9, 0x22);
}

#[test]
fn test_shift_family_disambiguates() {
    let isa = zx16();
    let output = assemble("SLLI x1, 0x13\nSRLI x1, 0x23\n", &isa);
    let bytes = code_bytes(&output);
    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    assert_eq!(result.instructions[0].mnemonic, "SLLI");
    assert_eq!(result.instructions[1].mnemonic, "SRLI");
}

#[test]
fn test_mnemonics_and_registers_are_case_insensitive() {
    let isa = zx16();
    let upper = assemble("ADD X6, X7\n", &isa);
    let lower = assemble("add x6, x7\n", &isa);
    assert_eq!(code_bytes(&upper), code_bytes(&lower));
}

#[test]
fn test_big_endian_emission() {
    let isa = Isa::from_json(&ZX16.replace("\"little\"", "\"big\"")).unwrap();
    let output = assemble("ADD x6, x7\n", &isa);
    assert_eq!(code_bytes(&output), vec![0x0F, 0x80]);

    let result = isax::disassemble(&[0x0F, 0x80], &isa, &DisassemblyOptions::default()).unwrap();
    assert_eq!(result.instructions[0].mnemonic, "ADD");
    assert_eq!(
        result.instructions[0].operands,
        vec![DecodedOperand::Register(6), DecodedOperand::Register(7)]
    );
}

#[test]
fn test_required_immediate_prefix() {
    let json = ZX16.replace(
        "\"immediate_prefix_required\": false",
        "\"immediate_prefix_required\": true",
    );
    let isa = Isa::from_json(&json).unwrap();
    assert!(isax::assemble("ADDI x1, 5\n", &isa).is_err());
    assert!(isax::assemble("ADDI x1, #5\n", &isa).is_ok());
}

#[test]
fn test_custom_immediate_prefix_round_trips() {
    let json = ZX16
        .replace("\"immediate_prefix\": \"#\"", "\"immediate_prefix\": \"@\"")
        .replace(
            "\"immediate_prefix_required\": false",
            "\"immediate_prefix_required\": true",
        );
    let isa = Isa::from_json(&json).unwrap();

    let output = assemble("ADDI x1, @-1\n", &isa);
    let bytes = code_bytes(&output);
    let word = u16::from_le_bytes([bytes[0], bytes[1]]);
    assert_eq!(word >> 9, 0x7F);
    assert!(isax::assemble("ADDI x1, -1\n", &isa).is_err());

    // the formatter spells the declared prefix back out, and its output
    // reassembles under the same rules
    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    let formatter = Formatter::new(&isa);
    let text = formatter.instruction(&result.instructions[0], &result.labels);
    assert_eq!(text, "ADDI x1, @-1");
    assert_eq!(code_bytes(&assemble(&text, &isa)), bytes);
}

#[test]
fn test_operand_error_kinds() {
    let isa = zx16();

    let failure = isax::assemble("BEQZ x1\n", &isa).unwrap_err();
    assert!(failure
        .errors
        .iter()
        .any(|e| matches!(e, AssemblyError::OperandArityMismatch { .. })));

    let failure = isax::assemble("ADD x1, #3\n", &isa).unwrap_err();
    assert!(failure
        .errors
        .iter()
        .any(|e| matches!(e, AssemblyError::OperandTypeMismatch { .. })));

    let failure = isax::assemble("ADD x9, x1\n", &isa).unwrap_err();
    assert!(failure
        .errors
        .iter()
        .any(|e| matches!(e, AssemblyError::UnknownRegister { .. })));

    let failure = isax::assemble(".bogus 1\n", &isa).unwrap_err();
    assert!(failure
        .errors
        .iter()
        .any(|e| matches!(e, AssemblyError::UnknownDirective { .. })));

    let failure = isax::assemble(".org 0x12345\n", &isa).unwrap_err();
    assert!(failure
        .errors
        .iter()
        .any(|e| matches!(e, AssemblyError::DirectiveArgument { .. })));
}

#[test]
fn test_immediate_out_of_range_reported_with_field_details() {
    let isa = zx16();
    let failure = isax::assemble("J far\nfar: NOP\n.org 0x1000\nADDI x1, #100\n", &isa);
    let failure = failure.unwrap_err();
    let found = failure.errors.iter().any(|e| {
        matches!(
            e,
            AssemblyError::ImmediateOutOfRange {
                field,
                width: 7,
                signed: true,
                value: 100,
                ..
            } if field == "imm"
        )
    });
    assert!(found, "errors: {}", failure);
}

#[test]
fn test_clr_coalesces_only_on_matching_registers() {
    let isa = zx16();
    let output = assemble("CLR x3\nXOR x3, x4\n", &isa);
    let bytes = code_bytes(&output);
    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    assert_eq!(result.instructions[0].mnemonic, "CLR");
    assert_eq!(result.instructions[0].operands, vec![DecodedOperand::Register(3)]);
    assert_eq!(result.instructions[1].mnemonic, "XOR");
}

#[test]
fn test_pattern_exclusivity_over_all_instructions() {
    let isa = zx16();
    let source = "\
ADD x1, x2
SUB x1, x2
AND x1, x2
OR x1, x2
XOR x1, x2
ADDI x1, #5
ORI x1, 5
SLLI x1, 0x12
SRLI x1, 0x22
LUI x1, 9
AUIPC x1, 9
LW x1, 2(x2)
SW x1, 2(x2)
J 0x20
BEQZ x1, 0x20
ECALL 3
";
    let expected = [
        "ADD", "SUB", "AND", "OR", "XOR", "ADDI", "ORI", "SLLI", "SRLI", "LUI", "AUIPC", "LW",
        "SW", "J", "BEQZ", "ECALL",
    ];
    let output = assemble(source, &isa);
    let bytes = code_bytes(&output);
    let result = isax::disassemble(
        &bytes,
        &isa,
        &DisassemblyOptions {
            coalesce_pseudo: false,
            ..DisassemblyOptions::default()
        },
    )
    .unwrap();
    let mnemonics: Vec<&str> = result
        .instructions
        .iter()
        .map(|i| i.mnemonic.as_str())
        .collect();
    assert_eq!(mnemonics, expected);
}

#[test]
fn test_legacy_container_is_accepted() {
    let isa = zx16();
    let output = assemble("ADD x6, x7\n", &isa);
    let code = code_bytes(&output);

    let mut legacy = Vec::new();
    legacy.extend_from_slice(b"ISA\x01");
    legacy.push(4);
    legacy.extend_from_slice(b"zx16");
    legacy.extend_from_slice(&(code.len() as u32).to_le_bytes());
    legacy.extend_from_slice(&0u32.to_le_bytes());
    legacy.extend_from_slice(&code);

    let result = isax::disassemble(&legacy, &isa, &DisassemblyOptions::default()).unwrap();
    assert_eq!(result.instructions.len(), 1);
    assert_eq!(result.instructions[0].mnemonic, "ADD");
}

#[test]
fn test_variable_length_instructions_end_to_end() {
    let isa = Isa::from_json(
        r#"{
            "name": "VL", "version": "1.0",
            "word_size": 16, "instruction_size": 16, "endianness": "little",
            "variable_length": {
                "opcode_bits": "2:0",
                "lengths": { "0b110": 32 }
            },
            "registers": { "general": [
                {"name": "r0", "number": 0},
                {"name": "r1", "number": 1}
            ] },
            "instructions": [
                { "mnemonic": "MOV", "syntax": "MOV rd, imm", "fields": [
                    {"name": "imm", "bits": "15:6", "kind": "immediate"},
                    {"name": "rd", "bits": "5:3", "kind": "register"},
                    {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "001"}
                ] },
                { "mnemonic": "MOVL", "syntax": "MOVL rd, imm", "length": 32, "fields": [
                    {"name": "imm", "bits": "31:6", "kind": "immediate"},
                    {"name": "rd", "bits": "5:3", "kind": "register"},
                    {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "110"}
                ] }
            ]
        }"#,
    )
    .unwrap();

    let output = assemble("MOVL r1, 0x12345\nMOV r0, 7\n", &isa);
    let bytes = code_bytes(&output);
    assert_eq!(bytes.len(), 6);

    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    assert_eq!(result.instructions.len(), 2);
    assert_eq!(result.instructions[0].mnemonic, "MOVL");
    assert_eq!(
        result.instructions[0].operands,
        vec![DecodedOperand::Register(1), DecodedOperand::Immediate(0x12345)]
    );
    assert_eq!(result.instructions[1].mnemonic, "MOV");
    assert_eq!(result.instructions[1].address, result.instructions[0].address + 4);
}

#[test]
fn test_data_labels_appear_in_listing() {
    let isa = zx16();
    let output = assemble(
        "LA x6, msg\n.org 0x2000\nmsg: .asciiz \"data!\"\n",
        &isa,
    );
    let wrapped = container::write(&output, &isa);
    let result = isax::disassemble(
        &wrapped,
        &isa,
        &DisassemblyOptions {
            reconstruct_labels: true,
            ..DisassemblyOptions::default()
        },
    )
    .unwrap();
    let formatter = Formatter::new(&isa);
    let listing = formatter.listing(
        &result.instructions,
        &result.data_sections,
        &result.labels,
        &ListingOptions::default(),
    );
    assert!(listing.contains("msg:"), "listing:\n{}", listing);
    assert!(listing.contains(".asciiz \"data!\""), "listing:\n{}", listing);
}

#[test]
fn test_unsigned_field_rejects_negative_value() {
    let isa = zx16();
    let failure = isax::assemble("ORI x1, #-1\n", &isa).unwrap_err();
    assert!(failure
        .errors
        .iter()
        .any(|e| matches!(e, AssemblyError::ImmediateOutOfRange { signed: false, .. })));
}

#[test]
fn test_byte_directive_layout() {
    let isa = zx16();
    let output = assemble(".org 0x2000\n.byte 1, 2, 0xFF, -1\n", &isa);
    assert_eq!(
        output.image.extract(0x2000, 4),
        vec![0x01, 0x02, 0xFF, 0xFF]
    );
}

#[test]
fn test_symbols_iterate_in_name_order() {
    let isa = zx16();
    let output = assemble("b: NOP\na: NOP\n.equ C, 1\n", &isa);
    let names: Vec<&str> = output.symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["C", "a", "b"]);
}

const MC4: &str = include_str!("../definitions/mc4.json");

fn mc4() -> Isa {
    Isa::from_json(MC4).unwrap()
}

#[test]
fn test_mc4_big_endian_with_register_sigils() {
    let isa = mc4();
    let output = assemble("start: LDI $acc, 0x42\nADDV $acc, -1\nBR start\nHALT\n", &isa);
    assert_eq!(
        code_bytes(&output),
        vec![0x20, 0x42, 0x30, 0xFF, 0x4F, 0xFA, 0xFF, 0xFF]
    );
}

#[test]
fn test_mc4_nonzero_pc_base_is_symmetric() {
    // offset_for_jumps is 2 here; encoder and decoder must agree on it
    let isa = mc4();
    let output = assemble("start: LDI $acc, 0x42\nADDV $acc, -1\nBR start\nHALT\n", &isa);
    let bytes = code_bytes(&output);
    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    assert_eq!(result.instructions[2].mnemonic, "BR");
    assert_eq!(result.instructions[2].target, Some(0));
}

#[test]
fn test_mc4_alias_and_hex_formatting() {
    let isa = mc4();
    let output = assemble("LDI $r0, 0x42\nMOV $tmp, $lr\n", &isa);
    let bytes = code_bytes(&output);
    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    let formatter = Formatter::new(&isa);
    assert_eq!(
        formatter.instruction(&result.instructions[0], &result.labels),
        "LDI $acc, 0x42"
    );
    assert_eq!(
        formatter.instruction(&result.instructions[1], &result.labels),
        "MOV $tmp, $lr"
    );
}

#[test]
fn test_mc4_zero_pseudo_round_trip() {
    let isa = mc4();
    let output = assemble("ZERO $tmp\n", &isa);
    let bytes = code_bytes(&output);
    // ZERO rd expands to LDI rd, 0
    assert_eq!(bytes, vec![0x28, 0x00]);
    let result = isax::disassemble(&bytes, &isa, &DisassemblyOptions::default()).unwrap();
    assert_eq!(result.instructions[0].mnemonic, "ZERO");
    assert_eq!(result.instructions[0].operands, vec![DecodedOperand::Register(2)]);
}

#[test]
fn test_mc4_round_trip_fixpoint() {
    let isa = mc4();
    let source = "LDI $acc, 0x42\nADDV $idx, -3\nMOV $tmp, $acc\nBR 0x0\nHALT\n";
    let first = assemble(source, &isa);
    let first_bytes = code_bytes(&first);

    let result = isax::disassemble(
        &first_bytes,
        &isa,
        &DisassemblyOptions {
            coalesce_pseudo: false,
            ..DisassemblyOptions::default()
        },
    )
    .unwrap();
    let formatter = Formatter::new(&isa);
    let listing = formatter.listing(
        &result.instructions,
        &result.data_sections,
        &result.labels,
        &ListingOptions::default(),
    );
    let second = assemble(&listing, &isa);
    assert_eq!(first_bytes, code_bytes(&second), "listing:\n{}", listing);
}

#[test]
fn test_assemble_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let isa_path = dir.path().join("zx16.json");
    let bin_path = dir.path().join("out.bin");
    std::fs::write(&isa_path, ZX16).unwrap();

    let workspace = DiskWorkspace;
    let isa = workspace.isa(&isa_path).unwrap();
    let output = assemble("entry: ADD x6, x7\nJ entry\n", &isa);
    std::fs::write(&bin_path, container::write(&output, &isa)).unwrap();

    let bytes = workspace.binary(&bin_path).unwrap();
    let result = isax::disassemble(
        &bytes,
        &isa,
        &DisassemblyOptions {
            reconstruct_labels: true,
            ..DisassemblyOptions::default()
        },
    )
    .unwrap();
    assert_eq!(result.entry_point, 0x20);
    assert_eq!(result.labels.resolve(0x20), Some("entry"));
}

#[test]
fn test_assemble_through_memory_workspace() {
    let mut workspace = MemoryWorkspace::default();
    workspace.add_isa("zx16.json", ZX16);
    workspace.add_source("prog.s", "loop: NOP\nJ loop\n");

    let isa = workspace.isa(std::path::Path::new("zx16.json")).unwrap();
    let source = workspace.source(std::path::Path::new("prog.s")).unwrap();
    let output = assemble(&source, &isa);
    assert_eq!(output.image.bounds(), Some((0x20, 0x23)));
}
