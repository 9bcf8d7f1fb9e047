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

//! ISA scaffolding: generates a complete, valid description document for a
//! new instruction set from a handful of parameters. The output is a
//! starting point meant to be edited, but it always loads and assembles
//! as-is.

use crate::errors::IsaError;
use crate::isa::Isa;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct ScaffoldOptions {
    pub name: String,
    pub word_size: u32,
    pub instruction_size: u32,
    pub register_count: u32,
    pub little_endian: bool,
}

impl Default for ScaffoldOptions {
    fn default() -> Self {
        ScaffoldOptions {
            name: "NEWISA".to_string(),
            word_size: 16,
            instruction_size: 16,
            register_count: 8,
            little_endian: true,
        }
    }
}

fn bits_for(count: u32) -> u32 {
    let mut bits = 1;
    while (1u32 << bits) < count {
        bits += 1;
    }
    bits
}

fn range(high: u32, low: u32) -> String {
    format!("{}:{}", high, low)
}

/// Emits the scaffolded description as a JSON document. Layout: a 3-bit
/// opcode at the bottom, a 3-bit function code above it, register fields
/// above that, and whatever remains feeds immediates or extra fixed bits.
pub fn generate(options: &ScaffoldOptions) -> Result<String, IsaError> {
    let size = options.instruction_size;
    let reg_bits = bits_for(options.register_count);
    if size < 6 + 2 * reg_bits + 1 {
        return Err(IsaError::Definition {
            reason: format!(
                "{}-bit instructions cannot hold two {}-bit register fields",
                size, reg_bits
            ),
        });
    }

    let rd_low = 6;
    let rd_high = rd_low + reg_bits - 1;
    let rs2_low = rd_high + 1;
    let rs2_high = rs2_low + reg_bits - 1;
    let top = size - 1;

    let registers: Vec<Value> = (0..options.register_count)
        .map(|n| {
            let aliases = if n == 0 { json!(["zero"]) } else { json!([]) };
            json!({
                "name": format!("x{}", n),
                "number": n,
                "aliases": aliases
            })
        })
        .collect();

    let r_type = |mnemonic: &str, funct: u32| -> Value {
        json!({
            "mnemonic": mnemonic,
            "syntax": format!("{} rd, rs2", mnemonic),
            "semantics": format!("rd = rd {} rs2", operator_for(mnemonic)),
            "fields": [
                { "name": "funct", "bits": range(top, rs2_high + 1), "kind": "fixed",
                  "value": format!("{}", funct) },
                { "name": "rs2", "bits": range(rs2_high, rs2_low), "kind": "register" },
                { "name": "rd", "bits": range(rd_high, rd_low), "kind": "register" },
                { "name": "funct3", "bits": "5:3", "kind": "fixed", "value": "000" },
                { "name": "opcode", "bits": "2:0", "kind": "fixed", "value": "000" }
            ]
        })
    };

    let i_type = |mnemonic: &str, funct3: &str, signed: bool| -> Value {
        json!({
            "mnemonic": mnemonic,
            "syntax": format!("{} rd, imm", mnemonic),
            "semantics": format!("rd = rd {} imm", operator_for(mnemonic)),
            "fields": [
                { "name": "imm", "bits": range(top, rd_high + 1), "kind": "immediate",
                  "signed": signed },
                { "name": "rd", "bits": range(rd_high, rd_low), "kind": "register" },
                { "name": "funct3", "bits": "5:3", "kind": "fixed", "value": funct3 },
                { "name": "opcode", "bits": "2:0", "kind": "fixed", "value": "001" }
            ]
        })
    };

    let mut instructions = vec![
        r_type("ADD", 0),
        r_type("SUB", 1),
        r_type("AND", 2),
        r_type("OR", 3),
        r_type("XOR", 4),
        i_type("ADDI", "000", true),
        i_type("ORI", "010", false),
    ];
    instructions.push(json!({
        "mnemonic": "J",
        "syntax": "J target",
        "semantics": "pc = target",
        "fields": [
            { "name": "target", "bits": range(top, 6), "kind": "address",
              "signed": true },
            { "name": "funct3", "bits": "5:3", "kind": "fixed", "value": "000" },
            { "name": "opcode", "bits": "2:0", "kind": "fixed", "value": "101" }
        ]
    }));
    instructions.push(json!({
        "mnemonic": "BEQZ",
        "syntax": "BEQZ rs, target",
        "semantics": "if rs == 0: pc = target",
        "fields": [
            { "name": "target", "bits": range(top, rd_high + 1), "kind": "address",
              "signed": true },
            { "name": "rs", "bits": range(rd_high, rd_low), "kind": "register" },
            { "name": "funct3", "bits": "5:3", "kind": "fixed", "value": "000" },
            { "name": "opcode", "bits": "2:0", "kind": "fixed", "value": "110" }
        ]
    }));
    instructions.push(json!({
        "mnemonic": "ECALL",
        "syntax": "ECALL svc",
        "semantics": "system call",
        "fields": [
            { "name": "svc", "bits": range(top, 6), "kind": "immediate" },
            { "name": "funct3", "bits": "5:3", "kind": "fixed", "value": "000" },
            { "name": "opcode", "bits": "2:0", "kind": "fixed", "value": "111" }
        ]
    }));

    let address_bits = options.word_size;
    let space = 1u64 << address_bits;
    let code_start = 32u64.min(space / 4);
    let data_start = space / 2;

    let endianness = if options.little_endian { "little" } else { "big" };
    let document = json!({
        "name": options.name,
        "version": "1.0",
        "description": format!("Scaffolded {}-bit ISA", options.word_size),
        "word_size": options.word_size,
        "instruction_size": options.instruction_size,
        "endianness": endianness,
        "address_bits": address_bits,
        "registers": { "general": registers },
        "instructions": instructions,
        "pseudo_instructions": [
            {
                "mnemonic": "NOP",
                "syntax": "NOP",
                "expansion": "ADD x0, x0",
                "disassembly": { "kind": "single" }
            },
            {
                "mnemonic": "CLR",
                "syntax": "CLR rd",
                "expansion": "XOR rd, rd",
                "disassembly": { "kind": "single" }
            }
        ],
        "directives": [
            { "name": ".org", "action": "set_origin" },
            { "name": ".word", "action": "emit_words" },
            { "name": ".byte", "action": "emit_bytes" },
            { "name": ".ascii", "action": "emit_string" },
            { "name": ".asciiz", "action": "emit_string_nul" },
            { "name": ".space", "action": "reserve_space" },
            { "name": ".align", "action": "align" },
            { "name": ".equ", "action": "define_constant" },
            { "name": ".section", "action": "select_section" },
            { "name": ".globl", "action": "declare_global" }
        ],
        "syntax": {
            "comment_chars": [";"],
            "label_suffix": ":",
            "register_prefix": "",
            "immediate_prefix": "#",
            "immediate_prefix_required": false,
            "hex_prefix": "0x",
            "binary_prefix": "0b",
            "case_sensitive": false
        },
        "memory_map": {
            "code_section": { "start": code_start, "end": data_start - 1 },
            "data_section": { "start": data_start, "end": space - 1 }
        },
        "address_space": {
            "default_code_start": code_start,
            "default_data_start": data_start
        },
        "pc_behavior": { "offset_for_jumps": 0 },
        "formatting": { "immediate_style": "decimal", "use_register_aliases": false }
    });

    // The scaffold must hold itself to the loader's rules.
    let text = serde_json::to_string_pretty(&document).expect("document serializes");
    Isa::from_json(&text)?;
    Ok(text)
}

fn operator_for(mnemonic: &str) -> &'static str {
    match mnemonic {
        "SUB" => "-",
        "AND" => "&",
        "OR" | "ORI" => "|",
        "XOR" => "^",
        _ => "+",
    }
}
