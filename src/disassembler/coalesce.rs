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

//! Re-coalescing of pseudo-instructions after decoding: a sliding window
//! over the decoded list is compared against each pseudo's expansion
//! template; when mnemonics, fixed registers and placeholder bindings all
//! line up, the window collapses back into the pseudo, and sliced
//! immediates are recombined into the original target or value.

use super::decoder::{DecodedInstruction, DecodedOperand};
use crate::assembler::encoder::{syntax_slots, Slot};
use crate::assembler::pseudo::{parse_expansion, ExpansionStep, TemplateArg};
use crate::errors::SourceLoc;
use crate::isa::{HintKind, Isa, PseudoDef};
use crate::operands::OperandResolver;
use std::collections::BTreeMap;

struct PseudoPattern<'a> {
    def: &'a PseudoDef,
    steps: Vec<ExpansionStep>,
}

pub fn coalesce(instructions: Vec<DecodedInstruction>, isa: &Isa) -> Vec<DecodedInstruction> {
    let resolver = OperandResolver::new(isa);
    let loc = SourceLoc::default();

    let mut patterns: Vec<PseudoPattern> = isa
        .pseudo_instructions
        .iter()
        .filter(|p| !p.disassembly.disabled)
        .filter_map(|def| {
            let steps = parse_expansion(&def.expansion, &loc).ok()?;
            Some(PseudoPattern { def, steps })
        })
        .collect();
    // Longer windows first so LA wins over any single-step prefix of it.
    patterns.sort_by(|a, b| b.steps.len().cmp(&a.steps.len()));

    let mut out = Vec::with_capacity(instructions.len());
    let mut i = 0;
    while i < instructions.len() {
        let mut matched = None;
        for pattern in &patterns {
            if let Some(coalesced) = try_match(pattern, &instructions[i..], isa, &resolver) {
                matched = Some((coalesced, pattern.steps.len()));
                break;
            }
        }
        match matched {
            Some((coalesced, width)) => {
                out.push(coalesced);
                i += width;
            }
            None => {
                out.push(instructions[i].clone());
                i += 1;
            }
        }
    }
    out
}

fn try_match(
    pattern: &PseudoPattern,
    window: &[DecodedInstruction],
    isa: &Isa,
    resolver: &OperandResolver,
) -> Option<DecodedInstruction> {
    let steps = &pattern.steps;
    if window.len() < steps.len() {
        return None;
    }
    let window = &window[..steps.len()];

    // Single-step pseudos coalesce only on some constraint (a literal, a
    // concrete register, or a repeated placeholder); otherwise every plain
    // instruction would disappear into its alias.
    if steps.len() == 1 && !has_constraint(&steps[0], resolver) {
        return None;
    }

    // The window must be contiguous decoded instructions.
    let mut expected_addr = window[0].address;
    for instr in window {
        if instr.is_unknown() || instr.address != expected_addr {
            return None;
        }
        expected_addr += instr.raw_bytes.len() as u32;
    }

    let mut bindings: BTreeMap<&str, DecodedOperand> = BTreeMap::new();
    let mut slices: BTreeMap<&str, i64> = BTreeMap::new();

    for (step, instr) in steps.iter().zip(window) {
        if isa.fold_case(&step.mnemonic) != isa.fold_case(&instr.mnemonic) {
            return None;
        }
        if step.args.len() != instr.operands.len() {
            return None;
        }
        for (arg, operand) in step.args.iter().zip(&instr.operands) {
            match arg {
                TemplateArg::Number(expected) => {
                    if *operand != DecodedOperand::Immediate(*expected) {
                        return None;
                    }
                }
                TemplateArg::Slice { name, low, .. } => {
                    let DecodedOperand::Immediate(value) = operand else {
                        return None;
                    };
                    *slices.entry(name.as_str()).or_insert(0) += value << low;
                }
                TemplateArg::Name(name) => {
                    if let Some((_, number)) = resolver.lookup_register(name) {
                        // A concrete register in the template is a
                        // constraint, not a binding.
                        if *operand != DecodedOperand::Register(*number) {
                            return None;
                        }
                    } else {
                        match bindings.get(name.as_str()) {
                            Some(bound) if bound != operand => return None,
                            Some(_) => {}
                            None => {
                                bindings.insert(name.as_str(), operand.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    Some(build_pseudo(pattern.def, window, isa, &bindings, &slices))
}

fn has_constraint(step: &ExpansionStep, resolver: &OperandResolver) -> bool {
    let fixed = step.args.iter().any(|arg| match arg {
        TemplateArg::Number(_) => true,
        TemplateArg::Name(name) => resolver.lookup_register(name).is_some(),
        TemplateArg::Slice { .. } => false,
    });
    if fixed {
        return true;
    }
    // A placeholder used twice (XOR rd, rd) pins the operands to match.
    step.args.iter().enumerate().any(|(i, arg)| {
        matches!(arg, TemplateArg::Name(_)) && step.args[..i].contains(arg)
    })
}

fn build_pseudo(
    def: &PseudoDef,
    window: &[DecodedInstruction],
    isa: &Isa,
    bindings: &BTreeMap<&str, DecodedOperand>,
    slices: &BTreeMap<&str, i64>,
) -> DecodedInstruction {
    let address = window[0].address;
    let raw_bytes: Vec<u8> = window.iter().flat_map(|i| i.raw_bytes.clone()).collect();

    let mut operands = Vec::new();
    let mut target = None;
    if !def.disassembly.hide_operands {
        for slot in syntax_slots(&def.syntax) {
            let Slot::Plain(name) = slot else { continue };
            if let Some(bound) = bindings.get(name.as_str()) {
                operands.push(bound.clone());
            } else if let Some(effective) = slices.get(name.as_str()) {
                let reconstruct_address = def.pc_relative
                    || def.disassembly.kind == HintKind::AddressReconstruction;
                if reconstruct_address {
                    let resolved =
                        (address as i64 + effective) as u64 & isa.address_mask();
                    target = Some(resolved as u32);
                    operands.push(DecodedOperand::Target(resolved as u32));
                } else {
                    operands.push(DecodedOperand::Immediate(*effective));
                }
            }
        }
    }

    DecodedInstruction {
        address,
        raw_bytes,
        mnemonic: def.mnemonic.clone(),
        operands,
        fields: BTreeMap::new(),
        target,
        def_index: None,
    }
}
