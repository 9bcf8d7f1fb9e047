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

//! Instruction encoding: matches parsed operands against the declared
//! syntax template, computes each field's raw value and packs the word.

use super::symbol_table::SymbolTable;
use crate::ast::{Instruction, Operand};
use crate::bits;
use crate::errors::{AssemblyError, SourceLoc};
use crate::isa::{FieldDef, FieldKind, Isa};
use crate::operands::OperandResolver;

/// One operand position of a syntax template. `Memory` binds two field
/// names at once: `LW rd, imm(rs1)` supplies both `imm` and `rs1` from a
/// single source operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Plain(String),
    Memory { offset: String, base: String },
}

/// Splits the operand part of a syntax template like "ADD rd, rs2" or
/// "LW rd, imm(rs1)" into named slots. The mnemonic token is skipped.
pub fn syntax_slots(syntax: &str) -> Vec<Slot> {
    let rest = match syntax.trim().split_once(char::is_whitespace) {
        Some((_, rest)) => rest,
        None => return Vec::new(),
    };
    rest.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|token| {
            if let Some((offset, base)) = token.split_once('(') {
                if let Some(base) = base.strip_suffix(')') {
                    return Slot::Memory {
                        offset: offset.trim().to_string(),
                        base: base.trim().to_string(),
                    };
                }
            }
            Slot::Plain(token.to_string())
        })
        .collect()
}

pub struct Encoder<'a> {
    isa: &'a Isa,
    resolver: OperandResolver<'a>,
}

impl<'a> Encoder<'a> {
    pub fn new(isa: &'a Isa) -> Self {
        Encoder {
            isa,
            resolver: OperandResolver::new(isa),
        }
    }

    /// Encodes one real instruction at `address` into its byte sequence.
    pub fn encode(
        &self,
        instruction: &Instruction,
        address: u32,
        symbols: &SymbolTable,
        loc: &SourceLoc,
    ) -> Result<Vec<u8>, AssemblyError> {
        let def = self
            .isa
            .find_instruction(&instruction.mnemonic)
            .ok_or_else(|| AssemblyError::UnknownMnemonic {
                loc: loc.clone(),
                mnemonic: instruction.mnemonic.clone(),
            })?;

        let slots = syntax_slots(&def.syntax);
        if slots.len() != instruction.operands.len() {
            return Err(AssemblyError::OperandArityMismatch {
                loc: loc.clone(),
                mnemonic: def.mnemonic.clone(),
                expected: slots.len(),
                found: instruction.operands.len(),
            });
        }

        // Fixed fields first; the remaining fields are filled from operands.
        let mut word = 0u64;
        for field in &def.fields {
            if field.kind == FieldKind::Fixed {
                let ranges = field_ranges(field, loc)?;
                let value = crate::isa::parse_field_value(
                    field.value.as_deref().unwrap_or_default(),
                )
                .map_err(|e| AssemblyError::ParseSyntax {
                    loc: loc.clone(),
                    reason: e.to_string(),
                })?;
                word = bits::insert(word, &ranges, value).expect("validated fixed field");
            }
        }

        for (slot, operand) in slots.iter().zip(&instruction.operands) {
            match slot {
                Slot::Plain(name) => {
                    word = self.encode_field(def, name, operand, word, address, symbols, loc)?;
                }
                Slot::Memory { offset, base } => {
                    let Operand::Memory { offset: off, base: base_reg } = operand else {
                        return Err(AssemblyError::OperandTypeMismatch {
                            loc: loc.clone(),
                            mnemonic: def.mnemonic.clone(),
                            operand: describe_operand(operand),
                            expected: "a memory operand offset(base)".to_string(),
                        });
                    };
                    word = self.encode_field(def, offset, off, word, address, symbols, loc)?;
                    let base_operand = Operand::Register(base_reg.clone());
                    word = self.encode_field(def, base, &base_operand, word, address, symbols, loc)?;
                }
            }
        }

        let length = self.isa.instruction_length(def);
        Ok(self
            .isa
            .endianness
            .word_to_bytes(word, (length / 8) as usize))
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_field(
        &self,
        def: &crate::isa::InstructionDef,
        field_name: &str,
        operand: &Operand,
        word: u64,
        address: u32,
        symbols: &SymbolTable,
        loc: &SourceLoc,
    ) -> Result<u64, AssemblyError> {
        let field = def
            .fields
            .iter()
            .find(|f| f.name == field_name && f.kind != FieldKind::Fixed)
            .ok_or_else(|| AssemblyError::ParseSyntax {
                loc: loc.clone(),
                reason: format!(
                    "syntax of {} names \"{}\" but no such field exists",
                    def.mnemonic, field_name
                ),
            })?;
        let ranges = field_ranges(field, loc)?;
        let width = bits::spec_width(&ranges);

        let value: i64 = match field.kind {
            FieldKind::Register => match operand {
                Operand::Register(name) => self.resolver.register_number(name, loc)? as i64,
                // A bare name in a register slot is a misspelled register,
                // not a symbol reference.
                Operand::Label(name) => {
                    return Err(AssemblyError::UnknownRegister {
                        loc: loc.clone(),
                        name: name.clone(),
                    });
                }
                other => {
                    return Err(AssemblyError::OperandTypeMismatch {
                        loc: loc.clone(),
                        mnemonic: def.mnemonic.clone(),
                        operand: describe_operand(other),
                        expected: format!("a register for \"{}\"", field.name),
                    });
                }
            },
            FieldKind::Immediate => match operand {
                Operand::Immediate(v) => *v,
                Operand::Label(name) => symbols.resolve(name, loc)?,
                other => {
                    return Err(AssemblyError::OperandTypeMismatch {
                        loc: loc.clone(),
                        mnemonic: def.mnemonic.clone(),
                        operand: describe_operand(other),
                        expected: format!("an immediate for \"{}\"", field.name),
                    });
                }
            },
            FieldKind::Address => {
                let target = match operand {
                    Operand::Immediate(v) => *v,
                    Operand::Label(name) => symbols.resolve(name, loc)?,
                    other => {
                        return Err(AssemblyError::OperandTypeMismatch {
                            loc: loc.clone(),
                            mnemonic: def.mnemonic.clone(),
                            operand: describe_operand(other),
                            expected: format!("a target address for \"{}\"", field.name),
                        });
                    }
                };
                if target < 0 || target as u64 > self.isa.address_mask() {
                    return Err(AssemblyError::AddressOutOfRange {
                        loc: loc.clone(),
                        width: self.isa.address_bits(),
                        value: target,
                    });
                }
                target - (address as i64 + self.isa.pc_behavior.offset_for_jumps)
            }
            FieldKind::Fixed => unreachable!("fixed fields filtered above"),
        };

        let fits = if field.signed {
            value >= -(1i64 << (width - 1)) && value < (1i64 << (width - 1))
        } else {
            value >= 0 && (width >= 63 || value < (1i64 << width))
        };
        if !fits {
            return Err(AssemblyError::ImmediateOutOfRange {
                loc: loc.clone(),
                field: field.name.clone(),
                width,
                signed: field.signed,
                value,
            });
        }

        let raw = value as u64 & bits::mask(width);
        Ok(bits::insert(word, &ranges, raw).expect("masked to field width"))
    }
}

fn field_ranges(field: &FieldDef, loc: &SourceLoc) -> Result<Vec<bits::BitRange>, AssemblyError> {
    field.ranges().map_err(|e| AssemblyError::ParseSyntax {
        loc: loc.clone(),
        reason: e.to_string(),
    })
}

fn describe_operand(operand: &Operand) -> String {
    match operand {
        Operand::Register(name) => format!("register {}", name),
        Operand::Immediate(value) => format!("immediate {}", value),
        Operand::Label(name) => format!("symbol {}", name),
        Operand::Memory { .. } => "memory operand".to_string(),
        Operand::Str(_) => "string".to_string(),
    }
}
