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

//! Pattern-matching decoder: instruction words are recognized by their
//! `(value, mask)` fingerprint, fields extracted with the same multi-range
//! rules the encoder packs with.

use crate::assembler::encoder::{syntax_slots, Slot};
use crate::bits;
use crate::errors::IsaError;
use crate::isa::{FieldKind, Isa, InstructionDef};
use std::collections::BTreeMap;

/// One decoded operand, still symbolic; the formatter renders it last so
/// label reconstruction can swap targets for names first.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedOperand {
    Register(u32),
    Immediate(i64),
    /// A resolved PC-relative target address.
    Target(u32),
    Memory { offset: i64, base: u32 },
}

#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    pub address: u32,
    pub raw_bytes: Vec<u8>,
    pub mnemonic: String,
    pub operands: Vec<DecodedOperand>,
    /// Raw field values by name, sign-interpreted per the field declaration.
    pub fields: BTreeMap<String, i64>,
    /// Set when some field resolved to a target address.
    pub target: Option<u32>,
    /// Index into `isa.instructions`; `None` marks an unknown word.
    pub def_index: Option<usize>,
}

impl DecodedInstruction {
    pub fn unknown(address: u32, raw_bytes: Vec<u8>) -> Self {
        DecodedInstruction {
            address,
            raw_bytes,
            mnemonic: "UNKNOWN".to_string(),
            operands: Vec::new(),
            fields: BTreeMap::new(),
            target: None,
            def_index: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.def_index.is_none()
    }
}

struct Pattern {
    value: u64,
    mask: u64,
    index: usize,
}

pub struct Decoder<'a> {
    isa: &'a Isa,
    patterns: Vec<Pattern>,
}

impl<'a> Decoder<'a> {
    /// Builds the pattern table once; decoding is then a scan with a
    /// tie-break.
    pub fn new(isa: &'a Isa) -> Result<Self, IsaError> {
        let mut patterns = Vec::new();
        for (index, def) in isa.instructions.iter().enumerate() {
            let (value, mask) = isa.fingerprint(def)?;
            patterns.push(Pattern { value, mask, index });
        }
        Ok(Decoder { isa, patterns })
    }

    /// Matches `word` (read at `address`) against the pattern table and
    /// extracts its fields. `None` means no pattern matched.
    pub fn decode(&self, word: u64, address: u32, raw_bytes: &[u8]) -> Option<DecodedInstruction> {
        let matched: Vec<&Pattern> = self
            .patterns
            .iter()
            .filter(|p| word & p.mask == p.value)
            .collect();

        let pattern = match matched.len() {
            0 => return None,
            1 => matched[0],
            _ => self.tie_break(&matched, word)?,
        };

        let def = &self.isa.instructions[pattern.index];
        Some(self.extract_fields(def, pattern.index, word, address, raw_bytes))
    }

    /// Shift-family instructions share fixed bits and differ only in a
    /// type sub-field inside the immediate; read it and pick the matching
    /// definition. Otherwise the most specific mask wins.
    fn tie_break<'p>(&self, matched: &[&'p Pattern], word: u64) -> Option<&'p Pattern> {
        for pattern in matched {
            let def = &self.isa.instructions[pattern.index];
            let Some((field, expected)) = def
                .fields
                .iter()
                .find_map(|f| f.shift_type.map(|t| (f, t)))
            else {
                continue;
            };
            let Ok(ranges) = field.ranges() else { continue };
            let imm = bits::extract(word, &ranges);
            let shift = &self.isa.shift_config;
            let actual = (imm >> shift.amount_width) & bits::mask(shift.type_width);
            if actual == expected as u64 {
                return Some(pattern);
            }
        }
        matched
            .iter()
            .max_by_key(|p| p.mask.count_ones())
            .copied()
    }

    fn extract_fields(
        &self,
        def: &InstructionDef,
        index: usize,
        word: u64,
        address: u32,
        raw_bytes: &[u8],
    ) -> DecodedInstruction {
        let mut fields = BTreeMap::new();
        let mut target = None;

        for field in &def.fields {
            if field.kind == FieldKind::Fixed {
                continue;
            }
            let Ok(ranges) = field.ranges() else { continue };
            let width = bits::spec_width(&ranges);
            let raw = bits::extract(word, &ranges);
            let value = if field.signed {
                bits::to_signed(raw, width)
            } else {
                raw as i64
            };
            if field.kind == FieldKind::Address {
                // Same base the encoder subtracted; asymmetry here would
                // corrupt every branch target.
                let resolved = (address as i64
                    + self.isa.pc_behavior.offset_for_jumps
                    + value) as u64
                    & self.isa.address_mask();
                target = Some(resolved as u32);
            }
            fields.insert(field.name.clone(), value);
        }

        let operands = self.operands_from_slots(def, &fields, target);

        DecodedInstruction {
            address,
            raw_bytes: raw_bytes.to_vec(),
            mnemonic: def.mnemonic.clone(),
            operands,
            fields,
            target,
            def_index: Some(index),
        }
    }

    /// Orders the decoded fields the way the syntax template writes them.
    fn operands_from_slots(
        &self,
        def: &InstructionDef,
        fields: &BTreeMap<String, i64>,
        target: Option<u32>,
    ) -> Vec<DecodedOperand> {
        let mut operands = Vec::new();
        for slot in syntax_slots(&def.syntax) {
            match slot {
                Slot::Plain(name) => {
                    let Some(field) = def.fields.iter().find(|f| f.name == name) else {
                        continue;
                    };
                    let value = fields.get(&name).copied().unwrap_or(0);
                    operands.push(match field.kind {
                        FieldKind::Register => DecodedOperand::Register(value as u32),
                        FieldKind::Address => {
                            DecodedOperand::Target(target.unwrap_or(value as u32))
                        }
                        _ => DecodedOperand::Immediate(value),
                    });
                }
                Slot::Memory { offset, base } => {
                    let offset_value = fields.get(&offset).copied().unwrap_or(0);
                    let base_value = fields.get(&base).copied().unwrap_or(0);
                    operands.push(DecodedOperand::Memory {
                        offset: offset_value,
                        base: base_value as u32,
                    });
                }
            }
        }
        operands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::encoder::Encoder;
    use crate::assembler::symbol_table::SymbolTable;
    use crate::ast::{Instruction, Operand};
    use crate::errors::SourceLoc;

    fn test_isa() -> Isa {
        Isa::from_json(
            r#"{
                "name": "T", "version": "1.0",
                "word_size": 16, "instruction_size": 16, "endianness": "little",
                "pc_behavior": { "offset_for_jumps": 0 },
                "shift_config": { "type_width": 3, "amount_width": 4 },
                "registers": { "general": [
                    {"name": "x0", "number": 0},
                    {"name": "x1", "number": 1},
                    {"name": "x6", "number": 6},
                    {"name": "x7", "number": 7}
                ] },
                "instructions": [
                    { "mnemonic": "ADD", "syntax": "ADD rd, rs2", "fields": [
                        {"name": "funct4", "bits": "15:12", "kind": "fixed", "value": "0000"},
                        {"name": "rs2", "bits": "11:9", "kind": "register"},
                        {"name": "rd", "bits": "8:6", "kind": "register"},
                        {"name": "funct3", "bits": "5:3", "kind": "fixed", "value": "000"},
                        {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "000"}
                    ] },
                    { "mnemonic": "ADDI", "syntax": "ADDI rd, imm", "fields": [
                        {"name": "imm", "bits": "15:9", "kind": "immediate", "signed": true},
                        {"name": "rd", "bits": "8:6", "kind": "register"},
                        {"name": "funct3", "bits": "5:3", "kind": "fixed", "value": "000"},
                        {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "001"}
                    ] },
                    { "mnemonic": "LUI", "syntax": "LUI rd, imm", "fields": [
                        {"name": "imm", "bits": "15:10,5:3", "kind": "immediate"},
                        {"name": "rd", "bits": "9:7", "kind": "register"},
                        {"name": "pad", "bits": "6:6", "kind": "fixed", "value": "0"},
                        {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "010"}
                    ] },
                    { "mnemonic": "J", "syntax": "J target", "fields": [
                        {"name": "target", "bits": "15:6", "kind": "address", "signed": true},
                        {"name": "funct3", "bits": "5:3", "kind": "fixed", "value": "000"},
                        {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "101"}
                    ] },
                    { "mnemonic": "SLLI", "syntax": "SLLI rd, imm", "fields": [
                        {"name": "imm", "bits": "15:9", "kind": "immediate", "shift_type": 1},
                        {"name": "rd", "bits": "8:6", "kind": "register"},
                        {"name": "funct3", "bits": "5:3", "kind": "fixed", "value": "001"},
                        {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "001"}
                    ] },
                    { "mnemonic": "SRLI", "syntax": "SRLI rd, imm", "fields": [
                        {"name": "imm", "bits": "15:9", "kind": "immediate", "shift_type": 2},
                        {"name": "rd", "bits": "8:6", "kind": "register"},
                        {"name": "funct3", "bits": "5:3", "kind": "fixed", "value": "001"},
                        {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "001"}
                    ] }
                ]
            }"#,
        )
        .unwrap()
    }

    fn encode(isa: &Isa, mnemonic: &str, operands: Vec<Operand>) -> u64 {
        let encoder = Encoder::new(isa);
        let symbols = SymbolTable::new();
        let bytes = encoder
            .encode(
                &Instruction {
                    mnemonic: mnemonic.to_string(),
                    operands,
                },
                0,
                &symbols,
                &SourceLoc::line(1),
            )
            .unwrap();
        isa.endianness.word_from_bytes(&bytes)
    }

    #[test]
    fn test_decode_r_type() {
        let isa = test_isa();
        let decoder = Decoder::new(&isa).unwrap();
        let decoded = decoder.decode(0x0F80, 0, &[0x80, 0x0F]).unwrap();
        assert_eq!(decoded.mnemonic, "ADD");
        assert_eq!(
            decoded.operands,
            vec![DecodedOperand::Register(6), DecodedOperand::Register(7)]
        );
    }

    #[test]
    fn test_decode_signed_immediate() {
        let isa = test_isa();
        let decoder = Decoder::new(&isa).unwrap();
        let word = encode(
            &isa,
            "ADDI",
            vec![
                Operand::Register("x1".to_string()),
                Operand::Immediate(-1),
            ],
        );
        let decoded = decoder.decode(word, 0, &[0, 0]).unwrap();
        assert_eq!(decoded.mnemonic, "ADDI");
        assert_eq!(decoded.fields["imm"], -1);
    }

    #[test]
    fn test_decode_multi_range_immediate() {
        let isa = test_isa();
        let decoder = Decoder::new(&isa).unwrap();
        let word = encode(
            &isa,
            "LUI",
            vec![
                Operand::Register("x6".to_string()),
                Operand::Immediate(100),
            ],
        );
        let decoded = decoder.decode(word, 0, &[0, 0]).unwrap();
        assert_eq!(decoded.fields["imm"], 100);
    }

    #[test]
    fn test_decode_pc_relative_target_round_trip() {
        let isa = test_isa();
        let encoder = Encoder::new(&isa);
        let mut symbols = SymbolTable::new();
        let loc = SourceLoc::line(1);
        symbols.define_label("start", 0x20, &loc).unwrap();
        let bytes = encoder
            .encode(
                &Instruction {
                    mnemonic: "J".to_string(),
                    operands: vec![Operand::Label("start".to_string())],
                },
                0x26,
                &symbols,
                &loc,
            )
            .unwrap();
        let word = isa.endianness.word_from_bytes(&bytes);
        let decoder = Decoder::new(&isa).unwrap();
        let decoded = decoder.decode(word, 0x26, &bytes).unwrap();
        assert_eq!(decoded.target, Some(0x20));
        assert_eq!(decoded.operands, vec![DecodedOperand::Target(0x20)]);
    }

    #[test]
    fn test_decode_unmatched_word() {
        let isa = test_isa();
        let decoder = Decoder::new(&isa).unwrap();
        // opcode 111 matches nothing
        assert!(decoder.decode(0x0007, 0, &[0x07, 0x00]).is_none());
    }

    #[test]
    fn test_shift_type_tie_break() {
        let isa = test_isa();
        let decoder = Decoder::new(&isa).unwrap();
        // SLLI and SRLI share funct3/opcode; type bits sit above the
        // 4-bit shift amount inside the immediate
        let slli_imm = (1 << 4) | 3; // type 1, amount 3
        let word = encode(
            &isa,
            "SLLI",
            vec![
                Operand::Register("x1".to_string()),
                Operand::Immediate(slli_imm),
            ],
        );
        let decoded = decoder.decode(word, 0, &[0, 0]).unwrap();
        assert_eq!(decoded.mnemonic, "SLLI");

        let srli_imm = (2 << 4) | 3;
        let word = encode(
            &isa,
            "SRLI",
            vec![
                Operand::Register("x1".to_string()),
                Operand::Immediate(srli_imm),
            ],
        );
        let decoded = decoder.decode(word, 0, &[0, 0]).unwrap();
        assert_eq!(decoded.mnemonic, "SRLI");
    }

    #[test]
    fn test_memory_operand_decodes_as_offset_base() {
        let isa = Isa::from_json(
            r#"{
                "name": "T", "version": "1.0",
                "word_size": 16, "instruction_size": 16, "endianness": "little",
                "registers": { "general": [
                    {"name": "x0", "number": 0},
                    {"name": "x1", "number": 1},
                    {"name": "x2", "number": 2}
                ] },
                "instructions": [
                    { "mnemonic": "LW", "syntax": "LW rd, imm(rs1)", "fields": [
                        {"name": "imm", "bits": "15:12", "kind": "immediate", "signed": true},
                        {"name": "rs1", "bits": "11:9", "kind": "register"},
                        {"name": "rd", "bits": "8:6", "kind": "register"},
                        {"name": "funct3", "bits": "5:3", "kind": "fixed", "value": "001"},
                        {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "011"}
                    ] }
                ]
            }"#,
        )
        .unwrap();
        let word = encode(
            &isa,
            "LW",
            vec![
                Operand::Register("x1".to_string()),
                Operand::Memory {
                    offset: Box::new(Operand::Immediate(-2)),
                    base: "x2".to_string(),
                },
            ],
        );
        let decoder = Decoder::new(&isa).unwrap();
        let decoded = decoder.decode(word, 0, &[0, 0]).unwrap();
        assert_eq!(
            decoded.operands,
            vec![
                DecodedOperand::Register(1),
                DecodedOperand::Memory { offset: -2, base: 2 },
            ]
        );
    }

    #[test]
    fn test_unique_match_after_tie_break() {
        // Every encoded known instruction decodes to exactly one pattern
        let isa = test_isa();
        let decoder = Decoder::new(&isa).unwrap();
        let cases = [
            ("ADD", vec![
                Operand::Register("x6".to_string()),
                Operand::Register("x7".to_string()),
            ]),
            ("ADDI", vec![
                Operand::Register("x1".to_string()),
                Operand::Immediate(5),
            ]),
            ("LUI", vec![
                Operand::Register("x1".to_string()),
                Operand::Immediate(12),
            ]),
        ];
        for (mnemonic, operands) in cases {
            let word = encode(&isa, mnemonic, operands);
            assert_eq!(decoder.decode(word, 0, &[0, 0]).unwrap().mnemonic, mnemonic);
        }
    }
}
