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

//! Text emission from decoded instructions and data spans, following the
//! ISA's declared syntax: register spelling, immediate prefix, hex or
//! decimal immediates, and data directives for non-code bytes.

use super::decoder::{DecodedInstruction, DecodedOperand};
use super::labels::LabelMap;
use crate::isa::{ImmediateStyle, Isa};
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default)]
pub struct ListingOptions {
    pub show_addresses: bool,
    pub show_bytes: bool,
}

pub struct Formatter<'a> {
    isa: &'a Isa,
    /// register number -> (canonical name, first alias)
    names: HashMap<u32, (String, Option<String>)>,
}

impl<'a> Formatter<'a> {
    pub fn new(isa: &'a Isa) -> Self {
        let mut names = HashMap::new();
        for regs in isa.registers.values() {
            for reg in regs {
                names
                    .entry(reg.number)
                    .or_insert_with(|| (reg.name.clone(), reg.aliases.first().cloned()));
            }
        }
        Formatter { isa, names }
    }

    pub fn register_name(&self, number: u32) -> String {
        let spelled = match self.names.get(&number) {
            Some((canonical, alias)) => {
                if self.isa.formatting.use_register_aliases {
                    alias.clone().unwrap_or_else(|| canonical.clone())
                } else {
                    canonical.clone()
                }
            }
            None => format!("r{}", number),
        };
        format!("{}{}", self.isa.syntax.register_prefix, spelled)
    }

    pub fn immediate(&self, value: i64) -> String {
        let body = match self.isa.formatting.immediate_style {
            ImmediateStyle::Hex => {
                if value < 0 {
                    format!("-0x{:X}", -value)
                } else {
                    format!("0x{:X}", value)
                }
            }
            ImmediateStyle::Decimal => value.to_string(),
        };
        format!("{}{}", self.isa.syntax.immediate_prefix, body)
    }

    fn operand(&self, operand: &DecodedOperand, labels: &LabelMap) -> String {
        match operand {
            DecodedOperand::Register(number) => self.register_name(*number),
            DecodedOperand::Immediate(value) => self.immediate(*value),
            DecodedOperand::Target(address) => match labels.resolve(*address) {
                Some(name) => name.to_string(),
                None => format!("0x{:X}", address),
            },
            DecodedOperand::Memory { offset, base } => {
                format!("{}({})", offset, self.register_name(*base))
            }
        }
    }

    /// One instruction, without address/byte gutters: `ADDI x1, #-1`.
    pub fn instruction(&self, decoded: &DecodedInstruction, labels: &LabelMap) -> String {
        if decoded.is_unknown() && decoded.operands.is_empty() && decoded.mnemonic == "UNKNOWN" {
            let word = self.isa.endianness.word_from_bytes(&decoded.raw_bytes);
            return format!(
                ".word 0x{:0width$X} ; unknown instruction",
                word,
                width = decoded.raw_bytes.len() * 2
            );
        }
        let mut text = decoded.mnemonic.clone();
        for (i, operand) in decoded.operands.iter().enumerate() {
            text.push_str(if i == 0 { " " } else { ", " });
            text.push_str(&self.operand(operand, labels));
        }
        text
    }

    /// A full listing: labels in column zero, instructions indented, data
    /// spans rendered as directives.
    pub fn listing(
        &self,
        instructions: &[DecodedInstruction],
        data_sections: &[(u32, Vec<u8>)],
        labels: &LabelMap,
        options: &ListingOptions,
    ) -> String {
        let mut out = String::new();
        for decoded in instructions {
            if let Some(name) = labels.resolve(decoded.address) {
                let _ = writeln!(out, "{}{}", name, self.isa.syntax.label_suffix);
            }
            let gutter = self.gutter(decoded.address, &decoded.raw_bytes, options);
            let _ = writeln!(out, "{}    {}", gutter, self.instruction(decoded, labels));
        }
        for (address, bytes) in data_sections {
            let _ = writeln!(out);
            for line in self.data_lines(*address, bytes, labels) {
                let _ = writeln!(out, "{}", line);
            }
        }
        out
    }

    fn gutter(&self, address: u32, raw: &[u8], options: &ListingOptions) -> String {
        let mut gutter = String::new();
        if options.show_addresses {
            let _ = write!(gutter, "{:04X}:", address);
        }
        if options.show_bytes {
            let hex: Vec<String> = raw.iter().map(|b| format!("{:02X}", b)).collect();
            let _ = write!(gutter, " {:<8}", hex.join(" "));
        }
        gutter
    }

    /// Renders a data span as directives, pulling printable NUL-terminated
    /// runs out as strings and grouping the rest into words.
    pub fn data_lines(&self, start: u32, bytes: &[u8], labels: &LabelMap) -> Vec<String> {
        let mut lines = Vec::new();
        let word_bytes = self.isa.word_bytes() as usize;
        let mut offset = 0usize;
        while offset < bytes.len() {
            let address = start + offset as u32;
            if let Some(name) = labels.resolve(address) {
                lines.push(format!("{}{}", name, self.isa.syntax.label_suffix));
            }
            if let Some(text) = ascii_run(&bytes[offset..]) {
                lines.push(format!(".asciiz \"{}\"", escape(text)));
                offset += text.len() + 1;
                continue;
            }
            if offset + word_bytes <= bytes.len() {
                let word = self
                    .isa
                    .endianness
                    .word_from_bytes(&bytes[offset..offset + word_bytes]);
                lines.push(format!(".word 0x{:0width$X}", word, width = word_bytes * 2));
                offset += word_bytes;
            } else {
                lines.push(format!(".byte 0x{:02X}", bytes[offset]));
                offset += 1;
            }
        }
        lines
    }
}

/// A printable ASCII run of at least four characters ending in NUL.
fn ascii_run(bytes: &[u8]) -> Option<&str> {
    let nul = bytes.iter().position(|b| *b == 0)?;
    if nul < 4 {
        return None;
    }
    let run = &bytes[..nul];
    if run.iter().all(|b| (0x20..=0x7E).contains(b)) {
        std::str::from_utf8(run).ok()
    } else {
        None
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
