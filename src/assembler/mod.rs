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

pub mod directives;
pub mod encoder;
pub mod pseudo;
pub mod symbol_table;

use crate::ast::{Operand, SourceLine};
use crate::errors::{AssemblyError, AssemblyFailure, SourceLoc};
use crate::isa::Isa;
use directives::AddressEffect;
use encoder::Encoder;
use pseudo::PseudoExpander;
use std::collections::BTreeMap;
use symbol_table::SymbolTable;

/// Sparse output image: only addressed bytes exist, everything else reads
/// as a gap. The container writer turns ranges of this into packed spans.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Image {
    bytes: BTreeMap<u32, u8>,
}

impl Image {
    pub fn new() -> Self {
        Image::default()
    }

    pub fn put_bytes(&mut self, address: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.bytes.insert(address + i as u32, *byte);
        }
    }

    pub fn get(&self, address: u32) -> Option<u8> {
        self.bytes.get(&address).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Lowest and highest occupied address.
    pub fn bounds(&self) -> Option<(u32, u32)> {
        let first = self.bytes.keys().next()?;
        let last = self.bytes.keys().next_back()?;
        Some((*first, *last))
    }

    /// Bounds restricted to addresses the predicate accepts.
    pub fn bounds_where(&self, pred: impl Fn(u32) -> bool) -> Option<(u32, u32)> {
        let mut result: Option<(u32, u32)> = None;
        for addr in self.bytes.keys().copied().filter(|a| pred(*a)) {
            result = Some(match result {
                None => (addr, addr),
                Some((lo, hi)) => (lo.min(addr), hi.max(addr)),
            });
        }
        result
    }

    /// Packed copy of `[start, start+len)`, gaps reading as zero.
    pub fn extract(&self, start: u32, len: u32) -> Vec<u8> {
        (0..len)
            .map(|i| self.get(start + i).unwrap_or(0))
            .collect()
    }
}

#[derive(Debug)]
pub struct AssemblyOutput {
    pub image: Image,
    pub symbols: SymbolTable,
    pub entry_point: u32,
}

/// Two-pass assembly of a parsed translation unit.
///
/// Pass 1 walks the lines collecting label addresses and directive/
/// instruction sizes; pseudo-instruction sizes come from their templates
/// alone, so no operand needs to resolve yet. Pass 2 expands and encodes
/// at the final addresses. Each pass accumulates every error it can so
/// one run reports them all; pass 2 only starts from a clean pass 1.
pub fn assemble(lines: &[SourceLine], isa: &Isa) -> Result<AssemblyOutput, AssemblyFailure> {
    let mut symbols = SymbolTable::new();
    let expander = PseudoExpander::new(isa);
    let mut errors = Vec::new();

    // ---- pass 1: addresses and symbols ----
    let mut address = isa.address_space.default_code_start;
    for line in lines {
        let loc = SourceLoc::line(line.line_number);

        if let Some(label) = &line.label {
            if let Err(err) = symbols.define_label(label, address, &loc) {
                errors.push(err);
            }
        }

        if let Some(directive) = &line.directive {
            record_references(&directive.args, &mut symbols, address);
            match directives::pass1_effect(directive, isa, &mut symbols, &loc) {
                Ok(effect) => address = apply_effect(address, effect),
                Err(err) => errors.push(err),
            }
        }

        if let Some(instruction) = &line.instruction {
            record_instruction_references(instruction, isa, &mut symbols, address);
            match instruction_size(instruction, isa, &expander, &loc) {
                Ok(size) => address += size,
                Err(err) => errors.push(err),
            }
        }

        if address as u64 > isa.address_space_size() {
            errors.push(AssemblyError::AddressOutOfRange {
                loc,
                width: isa.address_bits(),
                value: address as i64,
            });
            break;
        }
    }

    // Anything still undefined after pass 1 can never resolve.
    for symbol in symbols.undefined() {
        let at = symbol.forward_refs.first().copied().unwrap_or(0);
        errors.push(AssemblyError::UndefinedSymbol {
            loc: SourceLoc::default(),
            name: format!("{} (first referenced at {:#06x})", symbol.name, at),
        });
    }

    if !errors.is_empty() {
        return Err(AssemblyFailure { errors });
    }

    // ---- pass 2: emission ----
    let encoder = Encoder::new(isa);
    let mut image = Image::new();
    let mut address = isa.address_space.default_code_start;

    for line in lines {
        let loc = SourceLoc::line(line.line_number);

        if let Some(directive) = &line.directive {
            match directives::execute(directive, isa, &symbols, &mut image, address, &loc) {
                Ok(effect) => address = apply_effect(address, effect),
                Err(err) => {
                    // Keep the counter in step with pass 1 so later lines
                    // land where their labels say.
                    errors.push(err);
                    if let Ok(effect) = directives::address_effect(directive, isa, &symbols, &loc) {
                        address = apply_effect(address, effect);
                    }
                }
            }
        }

        if let Some(instruction) = &line.instruction {
            let size = instruction_size(instruction, isa, &expander, &loc).unwrap_or(0);
            match encode_line(instruction, isa, &expander, &encoder, &symbols, address, &loc) {
                Ok(bytes) => image.put_bytes(address, &bytes),
                Err(err) => errors.push(err),
            }
            address += size;
        }
    }

    if !errors.is_empty() {
        return Err(AssemblyFailure { errors });
    }

    let entry_point = ["_start", "main"]
        .iter()
        .find_map(|name| symbols.get(name).filter(|s| s.defined).map(|s| s.value as u32))
        .unwrap_or(isa.address_space.default_code_start);

    Ok(AssemblyOutput {
        image,
        symbols,
        entry_point,
    })
}

fn apply_effect(address: u32, effect: AddressEffect) -> u32 {
    match effect {
        AddressEffect::SetAddress(addr) => addr,
        AddressEffect::Advance(n) => address + n,
        AddressEffect::AlignTo(n) => {
            crate::bits::align_up(address as u64, n as u64).unwrap_or(address as u64) as u32
        }
        AddressEffect::None => address,
    }
}

/// Encoded size in bytes of one source instruction, pseudo or real.
fn instruction_size(
    instruction: &crate::ast::Instruction,
    isa: &Isa,
    expander: &PseudoExpander,
    loc: &SourceLoc,
) -> Result<u32, AssemblyError> {
    if let Some(pseudo) = isa.find_pseudo(&instruction.mnemonic) {
        return expander.encoded_size(pseudo, loc);
    }
    match isa.find_instruction(&instruction.mnemonic) {
        Some(def) => Ok(isa.instruction_length(def) / 8),
        None => Err(AssemblyError::UnknownMnemonic {
            loc: loc.clone(),
            mnemonic: instruction.mnemonic.clone(),
        }),
    }
}

fn encode_line(
    instruction: &crate::ast::Instruction,
    isa: &Isa,
    expander: &PseudoExpander,
    encoder: &Encoder,
    symbols: &SymbolTable,
    address: u32,
    loc: &SourceLoc,
) -> Result<Vec<u8>, AssemblyError> {
    let real = match isa.find_pseudo(&instruction.mnemonic) {
        Some(pseudo) => expander.expand(pseudo, instruction, address, symbols, loc)?,
        None => vec![instruction.clone()],
    };
    let mut bytes = Vec::new();
    let mut at = address;
    for step in &real {
        let encoded = encoder.encode(step, at, symbols, loc)?;
        at += encoded.len() as u32;
        bytes.extend(encoded);
    }
    Ok(bytes)
}

fn record_references(operands: &[Operand], symbols: &mut SymbolTable, address: u32) {
    for operand in operands {
        match operand {
            Operand::Label(name) => symbols.reference(name, address),
            Operand::Memory { offset, .. } => {
                if let Operand::Label(name) = offset.as_ref() {
                    symbols.reference(name, address);
                }
            }
            _ => {}
        }
    }
}

/// Like `record_references`, but for a real instruction a name sitting in
/// a register slot is a misspelled register, not a symbol use; recording
/// it would turn the later `UnknownRegister` into a confusing
/// undefined-symbol report.
fn record_instruction_references(
    instruction: &crate::ast::Instruction,
    isa: &Isa,
    symbols: &mut SymbolTable,
    address: u32,
) {
    let Some(def) = isa.find_instruction(&instruction.mnemonic) else {
        record_references(&instruction.operands, symbols, address);
        return;
    };
    let slots = encoder::syntax_slots(&def.syntax);
    for (slot, operand) in slots.iter().zip(&instruction.operands) {
        match (slot, operand) {
            (encoder::Slot::Plain(name), Operand::Label(symbol)) => {
                let register_slot = def
                    .fields
                    .iter()
                    .any(|f| f.name == *name && f.kind == crate::isa::FieldKind::Register);
                if !register_slot {
                    symbols.reference(symbol, address);
                }
            }
            (_, Operand::Memory { offset, .. }) => {
                if let Operand::Label(symbol) = offset.as_ref() {
                    symbols.reference(symbol, address);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn test_isa() -> Isa {
        Isa::from_json(
            r#"{
                "name": "T", "version": "1.0",
                "word_size": 16, "instruction_size": 16, "endianness": "little",
                "address_space": { "default_code_start": 32 },
                "pc_behavior": { "offset_for_jumps": 0 },
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
                    { "mnemonic": "J", "syntax": "J target", "fields": [
                        {"name": "target", "bits": "15:6", "kind": "address", "signed": true},
                        {"name": "funct3", "bits": "5:3", "kind": "fixed", "value": "000"},
                        {"name": "opcode", "bits": "2:0", "kind": "fixed", "value": "101"}
                    ] }
                ],
                "pseudo_instructions": [
                    { "mnemonic": "NOP", "syntax": "NOP", "expansion": "ADD x0, x0" }
                ],
                "directives": [
                    {"name": ".org", "action": "set_origin"},
                    {"name": ".word", "action": "emit_words"},
                    {"name": ".equ", "action": "define_constant"}
                ]
            }"#,
        )
        .unwrap()
    }

    fn run(source: &str) -> Result<AssemblyOutput, AssemblyFailure> {
        let isa = test_isa();
        let lines = parse_source(source, &isa)?;
        assemble(&lines, &isa)
    }

    #[test]
    fn test_single_instruction_at_code_start() {
        let out = run("ADD x6, x7\n").unwrap();
        assert_eq!(out.image.bounds(), Some((32, 33)));
        assert_eq!(out.image.extract(32, 2), vec![0x80, 0x0F]);
    }

    #[test]
    fn test_forward_reference_resolves() {
        // J at 32 jumps to the label at 36: displacement +4
        let out = run("J skip\nNOP\nskip: ADD x6, x7\n").unwrap();
        let word = u16::from_le_bytes([
            out.image.get(32).unwrap(),
            out.image.get(33).unwrap(),
        ]);
        assert_eq!((word >> 6) as i16, 4);
        let loc = SourceLoc::line(1);
        assert_eq!(out.symbols.resolve("skip", &loc).unwrap(), 36);
    }

    #[test]
    fn test_backward_reference() {
        let out = run("loop: NOP\nJ loop\n").unwrap();
        let word = u16::from_le_bytes([
            out.image.get(34).unwrap(),
            out.image.get(35).unwrap(),
        ]);
        let raw = (word >> 6) as u64;
        assert_eq!(crate::bits::to_signed(raw, 10), -2);
    }

    #[test]
    fn test_undefined_symbol_reported() {
        let failure = run("J nowhere\n").unwrap_err();
        assert!(failure
            .errors
            .iter()
            .any(|e| matches!(e, AssemblyError::UndefinedSymbol { .. })));
    }

    #[test]
    fn test_org_and_word_layout() {
        let out = run(".org 0x40\ntable: .word 1, 2\n").unwrap();
        assert_eq!(out.image.extract(0x40, 4), vec![1, 0, 2, 0]);
        let loc = SourceLoc::line(1);
        assert_eq!(out.symbols.resolve("table", &loc).unwrap(), 0x40);
    }

    #[test]
    fn test_constant_usable_before_and_after() {
        let out = run(".equ OFF, 5\nADDI x1, OFF\n").unwrap();
        let word = u16::from_le_bytes([
            out.image.get(32).unwrap(),
            out.image.get(33).unwrap(),
        ]);
        assert_eq!(word >> 9, 5);
    }

    #[test]
    fn test_pass1_collects_multiple_errors() {
        let failure = run("BOGUS1 x1\nBOGUS2 x2\n").unwrap_err();
        assert_eq!(failure.errors.len(), 2);
    }

    #[test]
    fn test_duplicate_label_reported() {
        let failure = run("a: NOP\na: NOP\n").unwrap_err();
        assert!(failure
            .errors
            .iter()
            .any(|e| matches!(e, AssemblyError::SymbolRedefinition { .. })));
    }

    #[test]
    fn test_entry_point_from_start_label() {
        let out = run("NOP\n_start: NOP\n").unwrap();
        assert_eq!(out.entry_point, 34);
    }

    #[test]
    fn test_entry_point_defaults_to_code_start() {
        let out = run("NOP\n").unwrap();
        assert_eq!(out.entry_point, 32);
    }

    #[test]
    fn test_pseudo_occupies_template_size() {
        let out = run("NOP\nafter: ADD x6, x7\n").unwrap();
        let loc = SourceLoc::line(1);
        assert_eq!(out.symbols.resolve("after", &loc).unwrap(), 34);
        // NOP encodes as ADD x0, x0
        assert_eq!(out.image.extract(32, 2), vec![0x00, 0x00]);
    }
}
