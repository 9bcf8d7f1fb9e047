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

//! Operand classification against a loaded ISA: register names (canonical
//! or alias, with or without the declared sigil), numeric literals in the
//! declared radix prefixes, and symbol references.

use crate::ast::Operand;
use crate::errors::{AssemblyError, SourceLoc};
use crate::isa::Isa;
use std::collections::HashMap;

pub struct OperandResolver<'a> {
    isa: &'a Isa,
    /// folded name or alias -> (canonical name, register number)
    registers: HashMap<String, (String, u32)>,
}

impl<'a> OperandResolver<'a> {
    pub fn new(isa: &'a Isa) -> Self {
        let mut registers = HashMap::new();
        for regs in isa.registers.values() {
            for reg in regs {
                for name in std::iter::once(&reg.name).chain(reg.aliases.iter()) {
                    registers.insert(isa.fold_case(name), (reg.name.clone(), reg.number));
                }
            }
        }
        OperandResolver { isa, registers }
    }

    /// Canonical name and number for a register spelling, sigil included or
    /// not. `None` when the text names no register at all.
    pub fn lookup_register(&self, text: &str) -> Option<&(String, u32)> {
        let stripped = match self.isa.syntax.register_prefix.as_str() {
            "" => text,
            prefix => text.strip_prefix(prefix).unwrap_or(text),
        };
        self.registers.get(&self.isa.fold_case(stripped))
    }

    pub fn register_number(&self, name: &str, loc: &SourceLoc) -> Result<u32, AssemblyError> {
        self.lookup_register(name)
            .map(|(_, number)| *number)
            .ok_or_else(|| AssemblyError::UnknownRegister {
                loc: loc.clone(),
                name: name.to_string(),
            })
    }

    /// Classifies a name token: a register spelling becomes
    /// `Operand::Register` with its canonical name, anything else a label
    /// reference. A register sigil on an unknown name is an error.
    pub fn classify_name(&self, text: &str, loc: &SourceLoc) -> Result<Operand, AssemblyError> {
        if let Some((canonical, _)) = self.lookup_register(text) {
            return Ok(Operand::Register(canonical.clone()));
        }
        let prefix = &self.isa.syntax.register_prefix;
        if !prefix.is_empty() && text.starts_with(prefix.as_str()) {
            return Err(AssemblyError::UnknownRegister {
                loc: loc.clone(),
                name: text.to_string(),
            });
        }
        Ok(Operand::Label(text.to_string()))
    }

    /// Parses a numeric literal honoring the ISA's hex and binary prefixes
    /// and an optional leading sign.
    pub fn parse_number(&self, text: &str, loc: &SourceLoc) -> Result<i64, AssemblyError> {
        let bad = || AssemblyError::ParseSyntax {
            loc: loc.clone(),
            reason: format!("invalid number \"{}\"", text),
        };
        let text = text.trim();
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let syntax = &self.isa.syntax;
        let strip = |prefix: &str| -> Option<&str> {
            if prefix.is_empty() {
                None
            } else {
                digits.strip_prefix(prefix)
            }
        };
        let magnitude = if let Some(hex) = strip(&syntax.hex_prefix) {
            i64::from_str_radix(hex, 16).map_err(|_| bad())?
        } else if let Some(bin) = strip(&syntax.binary_prefix) {
            i64::from_str_radix(bin, 2).map_err(|_| bad())?
        } else {
            digits.parse::<i64>().map_err(|_| bad())?
        };
        Ok(if negative { -magnitude } else { magnitude })
    }

    /// Builds an immediate operand from its literal text, enforcing the
    /// immediate-prefix rule when the ISA declares one as mandatory.
    pub fn classify_immediate(
        &self,
        text: &str,
        had_prefix: bool,
        loc: &SourceLoc,
    ) -> Result<Operand, AssemblyError> {
        let syntax = &self.isa.syntax;
        if syntax.immediate_prefix_required && !had_prefix && !syntax.immediate_prefix.is_empty() {
            return Err(AssemblyError::ParseSyntax {
                loc: loc.clone(),
                reason: format!(
                    "immediate \"{}\" is missing the required \"{}\" prefix",
                    text, syntax.immediate_prefix
                ),
            });
        }
        Ok(Operand::Immediate(self.parse_number(text, loc)?))
    }
}
