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

//! In-memory instruction set description. Deserialized from a JSON document,
//! validated once, then shared read-only by the assembler and disassembler.

use crate::bits;
use crate::errors::IsaError;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn word_to_bytes(self, value: u64, nbytes: usize) -> Vec<u8> {
        let le = value.to_le_bytes();
        match self {
            Endianness::Little => le[..nbytes].to_vec(),
            Endianness::Big => le[..nbytes].iter().rev().copied().collect(),
        }
    }

    pub fn word_from_bytes(self, bytes: &[u8]) -> u64 {
        let mut value = 0u64;
        match self {
            Endianness::Little => {
                for &b in bytes.iter().rev() {
                    value = (value << 8) | b as u64;
                }
            }
            Endianness::Big => {
                for &b in bytes {
                    value = (value << 8) | b as u64;
                }
            }
        }
        value
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDef {
    pub name: String,
    pub number: u32,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Carries a constant; part of the opcode fingerprint.
    Fixed,
    Register,
    Immediate,
    /// A PC-relative target. Encoded as `target - (pc + offset_for_jumps)`.
    Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// One or more `high:low` ranges, listed order MSB-first.
    pub bits: String,
    pub kind: FieldKind,
    /// Constant for `fixed` fields: binary ("0101"), hex ("0x5") or decimal.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub signed: bool,
    /// Sub-field selector for shift-family instructions that share their
    /// fixed bits and differ only in the type bits inside the immediate.
    #[serde(default)]
    pub shift_type: Option<u32>,
}

impl FieldDef {
    pub fn ranges(&self) -> Result<Vec<bits::BitRange>, IsaError> {
        bits::parse_spec(&self.bits).map_err(|e| IsaError::BadBitSpec {
            spec: self.bits.clone(),
            reason: e.to_string(),
        })
    }

    pub fn width(&self) -> Result<u32, IsaError> {
        Ok(bits::spec_width(&self.ranges()?))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstructionDef {
    pub mnemonic: String,
    /// Template like "ADD rd, rs2" or "LW rd, imm(rs1)"; the operand names
    /// match field names in `fields`.
    pub syntax: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub semantics: Option<String>,
    /// Never evaluated; carried only so descriptions round-trip.
    #[serde(default)]
    pub implementation: Option<String>,
    /// Explicit length in bits for variable-length ISAs.
    #[serde(default)]
    pub length: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    #[default]
    Single,
    MultiInstruction,
    AddressReconstruction,
    StackOp,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DisassemblyHint {
    #[serde(default)]
    pub kind: HintKind,
    #[serde(default)]
    pub hide_operands: bool,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PseudoDef {
    pub mnemonic: String,
    pub syntax: String,
    /// Real-instruction templates joined by ";", each operand either a
    /// placeholder from `syntax`, a literal, or a slice like `label[15:7]`.
    pub expansion: String,
    /// Slices are taken of `target - pc` instead of the raw target.
    #[serde(default)]
    pub pc_relative: bool,
    /// Enables overflow redistribution across the expansion's fields.
    #[serde(default)]
    pub smart_expansion: bool,
    #[serde(default)]
    pub disassembly: DisassemblyHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    SetOrigin,
    EmitWords,
    EmitBytes,
    EmitString,
    EmitStringNul,
    ReserveSpace,
    Align,
    DefineConstant,
    SelectSection,
    DeclareGlobal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectiveDef {
    pub name: String,
    pub action: DirectiveKind,
}

fn default_label_suffix() -> String {
    ":".to_string()
}

fn default_hex_prefix() -> String {
    "0x".to_string()
}

fn default_binary_prefix() -> String {
    "0b".to_string()
}

fn default_comment_chars() -> Vec<String> {
    vec![";".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyntaxRules {
    #[serde(default = "default_comment_chars")]
    pub comment_chars: Vec<String>,
    #[serde(default = "default_label_suffix")]
    pub label_suffix: String,
    /// Sigil registers are written with, e.g. "$"; empty for none.
    #[serde(default)]
    pub register_prefix: String,
    #[serde(default)]
    pub immediate_prefix: String,
    #[serde(default)]
    pub immediate_prefix_required: bool,
    #[serde(default = "default_hex_prefix")]
    pub hex_prefix: String,
    #[serde(default = "default_binary_prefix")]
    pub binary_prefix: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl Default for SyntaxRules {
    fn default() -> Self {
        SyntaxRules {
            comment_chars: default_comment_chars(),
            label_suffix: default_label_suffix(),
            register_prefix: String::new(),
            immediate_prefix: String::new(),
            immediate_prefix_required: false,
            hex_prefix: default_hex_prefix(),
            binary_prefix: default_binary_prefix(),
            case_sensitive: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MemorySpan {
    pub start: u32,
    pub end: u32,
}

impl MemorySpan {
    pub fn contains(&self, addr: u32) -> bool {
        self.start <= addr && addr <= self.end
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryMap {
    #[serde(default)]
    pub code_section: Option<MemorySpan>,
    #[serde(default)]
    pub data_section: Option<MemorySpan>,
    #[serde(default)]
    pub interrupt_vectors: Option<MemorySpan>,
    #[serde(default)]
    pub mmio: Option<MemorySpan>,
}

impl MemoryMap {
    pub fn is_empty(&self) -> bool {
        self.code_section.is_none()
            && self.data_section.is_none()
            && self.interrupt_vectors.is_none()
            && self.mmio.is_none()
    }

    /// True when the map classifies `addr` as something other than code.
    pub fn is_data(&self, addr: u32) -> bool {
        [&self.data_section, &self.interrupt_vectors, &self.mmio]
            .into_iter()
            .flatten()
            .any(|span| span.contains(addr))
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AddressSpace {
    #[serde(default)]
    pub default_code_start: u32,
    #[serde(default)]
    pub default_data_start: u32,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PcBehavior {
    /// Base added to the instruction address when computing PC-relative
    /// displacements. Both encoder and decoder read this; they must agree.
    #[serde(default)]
    pub offset_for_jumps: i64,
}

fn default_shift_type_width() -> u32 {
    3
}

fn default_shift_amount_width() -> u32 {
    4
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ShiftConfig {
    #[serde(default = "default_shift_type_width")]
    pub type_width: u32,
    #[serde(default = "default_shift_amount_width")]
    pub amount_width: u32,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        ShiftConfig {
            type_width: default_shift_type_width(),
            amount_width: default_shift_amount_width(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariableLength {
    /// Where the length-selecting opcode lives in the first base-sized word.
    pub opcode_bits: String,
    /// Opcode value ("0b110", "0x6" or decimal) to instruction length in bits.
    pub lengths: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImmediateStyle {
    Hex,
    #[default]
    Decimal,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Formatting {
    #[serde(default)]
    pub immediate_style: ImmediateStyle,
    #[serde(default)]
    pub use_register_aliases: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Isa {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub word_size: u32,
    pub instruction_size: u32,
    pub endianness: Endianness,
    #[serde(default)]
    pub address_bits: Option<u32>,
    /// Register categories in declaration order; lookup is by name or alias.
    pub registers: BTreeMap<String, Vec<RegisterDef>>,
    pub instructions: Vec<InstructionDef>,
    #[serde(default)]
    pub pseudo_instructions: Vec<PseudoDef>,
    #[serde(default)]
    pub directives: Vec<DirectiveDef>,
    #[serde(default)]
    pub syntax: SyntaxRules,
    #[serde(default)]
    pub memory_map: MemoryMap,
    #[serde(default)]
    pub address_space: AddressSpace,
    #[serde(default)]
    pub pc_behavior: PcBehavior,
    #[serde(default)]
    pub immediate_widths: BTreeMap<String, u32>,
    #[serde(default)]
    pub shift_config: ShiftConfig,
    #[serde(default)]
    pub variable_length: Option<VariableLength>,
    #[serde(default)]
    pub formatting: Formatting,
}

/// Parses a fixed-field constant: "0x.." hex, "0b.." or all-0/1 binary,
/// decimal otherwise.
pub fn parse_field_value(text: &str) -> Result<u64, IsaError> {
    let bad = |t: &str| IsaError::Definition {
        reason: format!("invalid field value \"{}\"", t),
    };
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).map_err(|_| bad(text))
    } else if let Some(bin) = text.strip_prefix("0b") {
        u64::from_str_radix(bin, 2).map_err(|_| bad(text))
    } else if !text.is_empty() && text.chars().all(|c| c == '0' || c == '1') {
        u64::from_str_radix(text, 2).map_err(|_| bad(text))
    } else {
        text.parse().map_err(|_| bad(text))
    }
}

impl Isa {
    pub fn from_json(json: &str) -> Result<Isa, IsaError> {
        let isa: Isa = serde_json::from_str(json).map_err(|e| IsaError::Definition {
            reason: e.to_string(),
        })?;
        isa.validate()?;
        Ok(isa)
    }

    pub fn address_bits(&self) -> u32 {
        self.address_bits.unwrap_or(self.word_size)
    }

    pub fn address_mask(&self) -> u64 {
        bits::mask(self.address_bits())
    }

    pub fn address_space_size(&self) -> u64 {
        1u64 << self.address_bits()
    }

    pub fn word_bytes(&self) -> u32 {
        self.word_size / 8
    }

    pub fn instruction_bytes(&self) -> u32 {
        self.instruction_size / 8
    }

    /// Length in bits of one concrete instruction definition.
    pub fn instruction_length(&self, def: &InstructionDef) -> u32 {
        def.length.unwrap_or(self.instruction_size)
    }

    /// Mnemonic comparison key honoring the ISA's case rule.
    pub fn fold_case(&self, text: &str) -> String {
        if self.syntax.case_sensitive {
            text.to_string()
        } else {
            text.to_uppercase()
        }
    }

    pub fn find_instruction(&self, mnemonic: &str) -> Option<&InstructionDef> {
        let key = self.fold_case(mnemonic);
        self.instructions
            .iter()
            .find(|def| self.fold_case(&def.mnemonic) == key)
    }

    pub fn find_pseudo(&self, mnemonic: &str) -> Option<&PseudoDef> {
        let key = self.fold_case(mnemonic);
        self.pseudo_instructions
            .iter()
            .find(|def| self.fold_case(&def.mnemonic) == key)
    }

    pub fn find_directive(&self, name: &str) -> Option<&DirectiveDef> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn register_count(&self) -> usize {
        self.registers.values().map(|v| v.len()).sum()
    }

    /// The `(value, mask)` opcode fingerprint of an instruction: the OR of
    /// all fixed fields. For variable-length ISAs only the field named
    /// "opcode" takes part, since other fixed bits may sit past the first
    /// base-sized word.
    pub fn fingerprint(&self, def: &InstructionDef) -> Result<(u64, u64), IsaError> {
        let mut value = 0u64;
        let mut mask = 0u64;
        for field in &def.fields {
            if field.kind != FieldKind::Fixed {
                continue;
            }
            if self.variable_length.is_some() && field.name != "opcode" {
                continue;
            }
            let ranges = field.ranges()?;
            let raw = match &field.value {
                Some(text) => parse_field_value(text)?,
                None => {
                    return Err(IsaError::Instruction {
                        mnemonic: def.mnemonic.clone(),
                        reason: format!("fixed field \"{}\" has no value", field.name),
                    });
                }
            };
            let with_field =
                bits::insert(value, &ranges, raw).map_err(|e| IsaError::Instruction {
                    mnemonic: def.mnemonic.clone(),
                    reason: e.to_string(),
                })?;
            value = with_field;
            for range in &ranges {
                mask |= bits::mask(range.width()) << range.low;
            }
        }
        Ok((value, mask))
    }

    /// Instruction length in bits for a raw word, consulting the
    /// variable-length table when one is declared.
    pub fn length_for_word(&self, word: u64) -> u32 {
        let Some(var) = &self.variable_length else {
            return self.instruction_size;
        };
        let Ok(ranges) = bits::parse_spec(&var.opcode_bits) else {
            return self.instruction_size;
        };
        let opcode = bits::extract(word, &ranges);
        for (key, len) in &var.lengths {
            if parse_field_value(key).is_ok_and(|v| v == opcode) {
                return *len;
            }
        }
        self.instruction_size
    }

    pub fn validate(&self) -> Result<(), IsaError> {
        if self.word_size == 0 || self.word_size % 8 != 0 {
            return Err(IsaError::Definition {
                reason: format!("word_size must be a positive multiple of 8, got {}", self.word_size),
            });
        }
        if self.instruction_size == 0 || self.instruction_size % 8 != 0 {
            return Err(IsaError::Definition {
                reason: format!(
                    "instruction_size must be a positive multiple of 8, got {}",
                    self.instruction_size
                ),
            });
        }
        if self.address_bits() == 0 || self.address_bits() > 32 {
            return Err(IsaError::Definition {
                reason: format!("address_bits must be within 1..=32, got {}", self.address_bits()),
            });
        }
        if self.register_count() == 0 {
            return Err(IsaError::Definition {
                reason: "an ISA needs at least one register".to_string(),
            });
        }

        let mut seen_names = std::collections::HashSet::new();
        for regs in self.registers.values() {
            for reg in regs {
                for name in std::iter::once(&reg.name).chain(reg.aliases.iter()) {
                    if !seen_names.insert(self.fold_case(name)) {
                        return Err(IsaError::Definition {
                            reason: format!("register name \"{}\" declared twice", name),
                        });
                    }
                }
            }
        }

        for def in &self.instructions {
            self.validate_instruction(def)?;
        }
        Ok(())
    }

    fn validate_instruction(&self, def: &InstructionDef) -> Result<(), IsaError> {
        let length = self.instruction_length(def);
        let mut covered = 0u64;
        for field in &def.fields {
            let ranges = field.ranges()?;
            for range in &ranges {
                if range.high >= length {
                    return Err(IsaError::Instruction {
                        mnemonic: def.mnemonic.clone(),
                        reason: format!(
                            "field \"{}\" reaches bit {} of a {}-bit instruction",
                            field.name, range.high, length
                        ),
                    });
                }
                let field_mask = bits::mask(range.width()) << range.low;
                if covered & field_mask != 0 {
                    return Err(IsaError::Instruction {
                        mnemonic: def.mnemonic.clone(),
                        reason: format!("field \"{}\" overlaps another field", field.name),
                    });
                }
                covered |= field_mask;
            }
            if field.kind == FieldKind::Fixed {
                let width = field.width()?;
                let raw = field.value.as_deref().map(parse_field_value).transpose()?;
                match raw {
                    Some(v) if v <= bits::mask(width) => {}
                    Some(v) => {
                        return Err(IsaError::Instruction {
                            mnemonic: def.mnemonic.clone(),
                            reason: format!(
                                "fixed value {:#x} does not fit field \"{}\"",
                                v, field.name
                            ),
                        });
                    }
                    None => {
                        return Err(IsaError::Instruction {
                            mnemonic: def.mnemonic.clone(),
                            reason: format!("fixed field \"{}\" has no value", field.name),
                        });
                    }
                }
            }
        }
        if covered != bits::mask(length) {
            return Err(IsaError::Instruction {
                mnemonic: def.mnemonic.clone(),
                reason: format!("fields do not cover all {} bits exactly once", length),
            });
        }
        // A fingerprint must exist for the decoder to recognize the pattern.
        let (value, mask) = self.fingerprint(def)?;
        if mask == 0 {
            return Err(IsaError::Instruction {
                mnemonic: def.mnemonic.clone(),
                reason: "no fixed bits to recognize the instruction by".to_string(),
            });
        }
        debug_assert_eq!(value & mask, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_isa(fields: &str) -> String {
        format!(
            r#"{{
                "name": "T", "version": "1.0",
                "word_size": 16, "instruction_size": 16, "endianness": "little",
                "registers": {{ "general": [
                    {{"name": "x0", "number": 0}},
                    {{"name": "x1", "number": 1, "aliases": ["ra"]}}
                ] }},
                "instructions": [
                    {{ "mnemonic": "ADD", "syntax": "ADD rd, rs2", "fields": {} }}
                ]
            }}"#,
            fields
        )
    }

    const GOOD_FIELDS: &str = r#"[
        {"name": "funct4", "bits": "15:12", "kind": "fixed", "value": "0000"},
        {"name": "rs2", "bits": "11:9", "kind": "register"},
        {"name": "rd", "bits": "8:6", "kind": "register"},
        {"name": "funct3", "bits": "5:3", "kind": "fixed", "value": "000"},
        {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "000"}
    ]"#;

    #[test]
    fn test_load_minimal_isa() {
        let isa = Isa::from_json(&minimal_isa(GOOD_FIELDS)).unwrap();
        assert_eq!(isa.name, "T");
        assert_eq!(isa.address_bits(), 16);
        assert_eq!(isa.address_mask(), 0xFFFF);
        assert_eq!(isa.register_count(), 2);
    }

    #[test]
    fn test_field_coverage_gap_rejected() {
        // bits 5:3 are missing
        let fields = r#"[
            {"name": "funct4", "bits": "15:12", "kind": "fixed", "value": "0000"},
            {"name": "rs2", "bits": "11:9", "kind": "register"},
            {"name": "rd", "bits": "8:6", "kind": "register"},
            {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "000"}
        ]"#;
        assert!(Isa::from_json(&minimal_isa(fields)).is_err());
    }

    #[test]
    fn test_field_overlap_rejected() {
        let fields = r#"[
            {"name": "funct4", "bits": "15:12", "kind": "fixed", "value": "0000"},
            {"name": "rs2", "bits": "12:9", "kind": "register"},
            {"name": "rd", "bits": "8:6", "kind": "register"},
            {"name": "funct3", "bits": "5:3", "kind": "fixed", "value": "000"},
            {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "000"}
        ]"#;
        assert!(Isa::from_json(&minimal_isa(fields)).is_err());
    }

    #[test]
    fn test_fingerprint_from_fixed_fields() {
        let isa = Isa::from_json(&minimal_isa(GOOD_FIELDS)).unwrap();
        let (value, mask) = isa.fingerprint(&isa.instructions[0]).unwrap();
        assert_eq!(value, 0x0000);
        // funct4 | funct3 | opcode
        assert_eq!(mask, 0b1111_000_000_111_111);
    }

    #[test]
    fn test_parse_field_value_radices() {
        assert_eq!(parse_field_value("0x1F").unwrap(), 0x1F);
        assert_eq!(parse_field_value("0b101").unwrap(), 5);
        assert_eq!(parse_field_value("0101").unwrap(), 5);
        assert_eq!(parse_field_value("12").unwrap(), 12);
        assert!(parse_field_value("12x").is_err());
    }

    #[test]
    fn test_find_instruction_case_insensitive() {
        let isa = Isa::from_json(&minimal_isa(GOOD_FIELDS)).unwrap();
        assert!(isa.find_instruction("add").is_some());
        assert!(isa.find_instruction("ADD").is_some());
        assert!(isa.find_instruction("SUB").is_none());
    }

    #[test]
    fn test_register_name_collision_rejected() {
        let json = minimal_isa(GOOD_FIELDS).replace("\"ra\"", "\"x0\"");
        assert!(Isa::from_json(&json).is_err());
    }

    #[test]
    fn test_variable_length_table() {
        let json = r#"{
            "name": "T", "version": "1.0",
            "word_size": 16, "instruction_size": 16, "endianness": "little",
            "variable_length": {
                "opcode_bits": "2:0",
                "lengths": { "0b110": 32 }
            },
            "registers": { "general": [ {"name": "x0", "number": 0} ] },
            "instructions": [
                { "mnemonic": "EXT", "syntax": "EXT imm", "length": 32, "fields": [
                    {"name": "imm", "bits": "31:3", "kind": "immediate"},
                    {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "110"}
                ] },
                { "mnemonic": "NOPW", "syntax": "NOPW", "fields": [
                    {"name": "pad", "bits": "15:3", "kind": "fixed", "value": "0"},
                    {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "000"}
                ] }
            ]
        }"#;
        let isa = Isa::from_json(json).unwrap();
        assert_eq!(isa.length_for_word(0b110), 32);
        assert_eq!(isa.length_for_word(0b000), 16);
        let ext = isa.find_instruction("EXT").unwrap();
        assert_eq!(isa.instruction_length(ext), 32);
        // With variable lengths only the opcode field fingerprints
        let (value, mask) = isa.fingerprint(ext).unwrap();
        assert_eq!((value, mask), (0b110, 0b111));
    }
}
