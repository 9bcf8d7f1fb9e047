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

//! Pseudo-instruction expansion. The encoded size of an expansion depends
//! only on its template, never on operand values, so pass 1 can lay out
//! addresses before anything is resolved. When a template slices a target
//! across several immediate fields and a slice does not fit its field,
//! the bits are redistributed until every field is in range and the
//! reconstructed target is exact.

use super::encoder::{syntax_slots, Slot};
use super::symbol_table::SymbolTable;
use crate::ast::{Instruction, Operand};
use crate::bits;
use crate::errors::{AssemblyError, SourceLoc};
use crate::isa::{FieldKind, Isa, PseudoDef};
use crate::operands::OperandResolver;

/// One argument of a template step, before binding.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateArg {
    /// A placeholder from the pseudo's syntax, a fixed register, or a
    /// symbol; which one is decided at expansion time.
    Name(String),
    /// `label[15:7]` — a bit slice of a bound target value.
    Slice { name: String, high: u32, low: u32 },
    Number(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionStep {
    pub mnemonic: String,
    pub args: Vec<TemplateArg>,
}

/// Parses an expansion template: real-instruction invocations joined by
/// ";" or newlines.
pub fn parse_expansion(expansion: &str, loc: &SourceLoc) -> Result<Vec<ExpansionStep>, AssemblyError> {
    let bad = |reason: String| AssemblyError::ParseSyntax {
        loc: loc.clone(),
        reason,
    };
    let mut steps = Vec::new();
    for part in expansion.split([';', '\n']) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (mnemonic, rest) = match part.split_once(char::is_whitespace) {
            Some((m, rest)) => (m, rest.trim()),
            None => (part, ""),
        };
        let mut args = Vec::new();
        if !rest.is_empty() {
            for arg in rest.split(',') {
                args.push(parse_template_arg(arg.trim()).ok_or_else(|| {
                    bad(format!("bad expansion operand \"{}\" in \"{}\"", arg.trim(), part))
                })?);
            }
        }
        steps.push(ExpansionStep {
            mnemonic: mnemonic.to_string(),
            args,
        });
    }
    if steps.is_empty() {
        return Err(bad("empty expansion template".to_string()));
    }
    Ok(steps)
}

fn parse_template_arg(text: &str) -> Option<TemplateArg> {
    if text.is_empty() {
        return None;
    }
    if let Some((name, slice)) = text.split_once('[') {
        let slice = slice.strip_suffix(']')?;
        let (high, low) = slice.split_once(':')?;
        let high: u32 = high.trim().parse().ok()?;
        let low: u32 = low.trim().parse().ok()?;
        if high < low || name.is_empty() {
            return None;
        }
        return Some(TemplateArg::Slice {
            name: name.to_string(),
            high,
            low,
        });
    }
    if text.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
        let value = if let Some(hex) = text.strip_prefix("0x") {
            i64::from_str_radix(hex, 16).ok()?
        } else {
            text.parse().ok()?
        };
        return Some(TemplateArg::Number(value));
    }
    Some(TemplateArg::Name(text.to_string()))
}

/// Bit budget of one sliced field during redistribution.
#[derive(Debug, Clone)]
struct SliceConstraint {
    step: usize,
    arg: usize,
    low: u32,
    width: u32,
    signed: bool,
}

impl SliceConstraint {
    fn min(&self) -> i64 {
        if self.signed {
            -(1i64 << (self.width - 1))
        } else {
            0
        }
    }

    fn max(&self) -> i64 {
        if self.signed {
            (1i64 << (self.width - 1)) - 1
        } else {
            (1i64 << self.width) - 1
        }
    }
}

pub struct PseudoExpander<'a> {
    isa: &'a Isa,
}

impl<'a> PseudoExpander<'a> {
    pub fn new(isa: &'a Isa) -> Self {
        PseudoExpander { isa }
    }

    /// Total encoded size in bytes, derived from the template alone.
    pub fn encoded_size(&self, pseudo: &PseudoDef, loc: &SourceLoc) -> Result<u32, AssemblyError> {
        let steps = parse_expansion(&pseudo.expansion, loc)?;
        let mut total = 0;
        for step in &steps {
            let def = self.isa.find_instruction(&step.mnemonic).ok_or_else(|| {
                AssemblyError::UnknownMnemonic {
                    loc: loc.clone(),
                    mnemonic: step.mnemonic.clone(),
                }
            })?;
            total += self.isa.instruction_length(def) / 8;
        }
        Ok(total)
    }

    /// Expands one invocation into real instructions with concrete operands.
    pub fn expand(
        &self,
        pseudo: &PseudoDef,
        invocation: &Instruction,
        address: u32,
        symbols: &SymbolTable,
        loc: &SourceLoc,
    ) -> Result<Vec<Instruction>, AssemblyError> {
        let steps = parse_expansion(&pseudo.expansion, loc)?;
        let bindings = self.bind_operands(pseudo, invocation, loc)?;

        let slice_values = self.solve_slices(pseudo, &steps, &bindings, address, symbols, loc)?;

        let resolver = OperandResolver::new(self.isa);
        let mut out = Vec::with_capacity(steps.len());
        for (step_index, step) in steps.iter().enumerate() {
            let mut operands = Vec::with_capacity(step.args.len());
            for (arg_index, arg) in step.args.iter().enumerate() {
                let operand = match arg {
                    TemplateArg::Number(value) => Operand::Immediate(*value),
                    TemplateArg::Slice { .. } => {
                        let value = slice_values
                            .iter()
                            .find(|(s, a, _)| *s == step_index && *a == arg_index)
                            .map(|(_, _, v)| *v)
                            .expect("slice solved above");
                        Operand::Immediate(value)
                    }
                    TemplateArg::Name(name) => match bindings.iter().find(|(n, _)| n == name) {
                        Some((_, operand)) => operand.clone(),
                        None => resolver.classify_name(name, loc)?,
                    },
                };
                operands.push(operand);
            }
            out.push(Instruction {
                mnemonic: step.mnemonic.clone(),
                operands,
            });
        }
        Ok(out)
    }

    /// Pairs the pseudo's syntax placeholders with the invocation operands.
    fn bind_operands(
        &self,
        pseudo: &PseudoDef,
        invocation: &Instruction,
        loc: &SourceLoc,
    ) -> Result<Vec<(String, Operand)>, AssemblyError> {
        let slots = syntax_slots(&pseudo.syntax);
        let mut bindings = Vec::new();
        let mut operands = invocation.operands.iter();
        for slot in &slots {
            match slot {
                Slot::Plain(name) => {
                    let operand = operands.next().ok_or_else(|| arity_error(pseudo, invocation, &slots, loc))?;
                    bindings.push((name.clone(), operand.clone()));
                }
                Slot::Memory { offset, base } => {
                    let operand = operands.next().ok_or_else(|| arity_error(pseudo, invocation, &slots, loc))?;
                    let Operand::Memory { offset: off, base: base_reg } = operand else {
                        return Err(AssemblyError::OperandTypeMismatch {
                            loc: loc.clone(),
                            mnemonic: pseudo.mnemonic.clone(),
                            operand: format!("{:?}", operand),
                            expected: "a memory operand offset(base)".to_string(),
                        });
                    };
                    bindings.push((offset.clone(), (**off).clone()));
                    bindings.push((base.clone(), Operand::Register(base_reg.clone())));
                }
            }
        }
        if operands.next().is_some() {
            return Err(arity_error(pseudo, invocation, &slots, loc));
        }
        Ok(bindings)
    }

    /// Computes the value of every sliced argument, redistributing bits
    /// when a literal slice does not fit its real field.
    fn solve_slices(
        &self,
        pseudo: &PseudoDef,
        steps: &[ExpansionStep],
        bindings: &[(String, Operand)],
        address: u32,
        symbols: &SymbolTable,
        loc: &SourceLoc,
    ) -> Result<Vec<(usize, usize, i64)>, AssemblyError> {
        // Group the slices by the name they slice; each name is solved
        // independently (in practice there is one: the target).
        let mut names: Vec<&str> = Vec::new();
        for step in steps {
            for arg in &step.args {
                if let TemplateArg::Slice { name, .. } = arg {
                    if !names.contains(&name.as_str()) {
                        names.push(name);
                    }
                }
            }
        }

        let mut solved = Vec::new();
        for name in names {
            let target = self.bound_value(name, bindings, symbols, loc)?;
            let effective = if pseudo.pc_relative {
                target - address as i64
            } else {
                target
            };

            let constraints = self.slice_constraints(steps, name, loc)?;
            let values = self
                .solve(effective, &constraints, pseudo.smart_expansion)
                .map_err(|kind| match kind {
                    SolveFailure::Overflow => AssemblyError::PseudoExpansionOverflow {
                        loc: loc.clone(),
                        mnemonic: pseudo.mnemonic.clone(),
                        target,
                    },
                    SolveFailure::Inexact(got) => AssemblyError::PseudoExpansionInexact {
                        loc: loc.clone(),
                        mnemonic: pseudo.mnemonic.clone(),
                        target: effective,
                        got,
                    },
                })?;
            for (constraint, value) in constraints.iter().zip(values) {
                solved.push((constraint.step, constraint.arg, value));
            }
        }
        Ok(solved)
    }

    fn bound_value(
        &self,
        name: &str,
        bindings: &[(String, Operand)],
        symbols: &SymbolTable,
        loc: &SourceLoc,
    ) -> Result<i64, AssemblyError> {
        let operand = bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, op)| op)
            .ok_or_else(|| AssemblyError::ParseSyntax {
                loc: loc.clone(),
                reason: format!("expansion slices \"{}\" which the syntax does not bind", name),
            })?;
        match operand {
            Operand::Immediate(value) => Ok(*value),
            Operand::Label(label) => symbols.resolve(label, loc),
            other => Err(AssemblyError::OperandTypeMismatch {
                loc: loc.clone(),
                mnemonic: name.to_string(),
                operand: format!("{:?}", other),
                expected: "a label or immediate".to_string(),
            }),
        }
    }

    /// Finds, for every slice of `name`, the real instruction field it
    /// lands in, taking its width and signedness as the bit budget.
    fn slice_constraints(
        &self,
        steps: &[ExpansionStep],
        name: &str,
        loc: &SourceLoc,
    ) -> Result<Vec<SliceConstraint>, AssemblyError> {
        let mut constraints = Vec::new();
        for (step_index, step) in steps.iter().enumerate() {
            for (arg_index, arg) in step.args.iter().enumerate() {
                let TemplateArg::Slice { name: slice_name, high, low } = arg else {
                    continue;
                };
                if slice_name != name {
                    continue;
                }
                let def = self.isa.find_instruction(&step.mnemonic).ok_or_else(|| {
                    AssemblyError::UnknownMnemonic {
                        loc: loc.clone(),
                        mnemonic: step.mnemonic.clone(),
                    }
                })?;
                // The slice arg's position selects the field through the
                // real instruction's own syntax template.
                let slots = syntax_slots(&def.syntax);
                let field_name = match slots.get(arg_index) {
                    Some(Slot::Plain(n)) => n.clone(),
                    Some(Slot::Memory { offset, .. }) => offset.clone(),
                    None => {
                        return Err(AssemblyError::OperandArityMismatch {
                            loc: loc.clone(),
                            mnemonic: step.mnemonic.clone(),
                            expected: slots.len(),
                            found: step.args.len(),
                        });
                    }
                };
                let field = def
                    .fields
                    .iter()
                    .find(|f| f.name == field_name && f.kind != FieldKind::Fixed)
                    .ok_or_else(|| AssemblyError::ParseSyntax {
                        loc: loc.clone(),
                        reason: format!(
                            "expansion of {} references no field \"{}\"",
                            step.mnemonic, field_name
                        ),
                    })?;
                let width = field.width().map_err(|e| AssemblyError::ParseSyntax {
                    loc: loc.clone(),
                    reason: e.to_string(),
                })?;
                let slice_width = high - low + 1;
                constraints.push(SliceConstraint {
                    step: step_index,
                    arg: arg_index,
                    low: *low,
                    width: width.min(slice_width),
                    signed: field.signed,
                });
            }
        }
        // Highest-weight slice first.
        constraints.sort_by(|a, b| b.low.cmp(&a.low));
        Ok(constraints)
    }

    /// Computes slice values. Without smart expansion only the literal
    /// slicing is acceptable; with it, field values are nudged until the
    /// weighted sum reconstructs `effective` exactly and every field is
    /// inside its own range.
    fn solve(
        &self,
        effective: i64,
        constraints: &[SliceConstraint],
        smart: bool,
    ) -> Result<Vec<i64>, SolveFailure> {
        if constraints.is_empty() {
            return Ok(Vec::new());
        }

        // Literal slicing, each raw chunk read with its field's signedness.
        let mut values: Vec<i64> = constraints
            .iter()
            .map(|c| {
                let raw = (effective >> c.low) as u64 & bits::mask(c.width);
                if c.signed {
                    bits::to_signed(raw, c.width)
                } else {
                    raw as i64
                }
            })
            .collect();

        let reconstruct =
            |values: &[i64]| -> i64 { constraints.iter().zip(values).map(|(c, v)| v << c.low).sum() };

        if !smart {
            let got = reconstruct(&values);
            if got != effective {
                return Err(SolveFailure::Inexact(got));
            }
            return Ok(values);
        }

        let rounds = constraints.len() * 2 + 2;
        for _ in 0..rounds {
            // Absorb any residual into the highest-weight field that can
            // express it.
            let mut residual = effective - reconstruct(&values);
            if residual != 0 {
                for (i, c) in constraints.iter().enumerate() {
                    let delta = residual >> c.low;
                    if delta != 0 {
                        values[i] += delta;
                        residual = effective - reconstruct(&values);
                        if residual == 0 {
                            break;
                        }
                    }
                }
            }

            // Clamp out-of-range fields, pushing the excess into the next
            // higher-weight field (rounded away from zero so the lower
            // field can compensate with its signed range).
            let mut changed = false;
            for i in (0..constraints.len()).rev() {
                let c = &constraints[i];
                if values[i] >= c.min() && values[i] <= c.max() {
                    continue;
                }
                let clamped = values[i].clamp(c.min(), c.max());
                let excess = (values[i] - clamped) << c.low;
                values[i] = clamped;
                if i == 0 {
                    return Err(SolveFailure::Overflow);
                }
                let higher = &constraints[i - 1];
                values[i - 1] += div_round_away(excess, 1i64 << higher.low);
                changed = true;
            }

            let residual = effective - reconstruct(&values);
            let in_range = constraints
                .iter()
                .zip(&values)
                .all(|(c, v)| *v >= c.min() && *v <= c.max());
            if residual == 0 && in_range && !changed {
                return Ok(values);
            }
        }

        let got = reconstruct(&values);
        let in_range = constraints
            .iter()
            .zip(&values)
            .all(|(c, v)| *v >= c.min() && *v <= c.max());
        if !in_range || got != effective {
            if in_range {
                Err(SolveFailure::Inexact(got))
            } else {
                Err(SolveFailure::Overflow)
            }
        } else {
            Ok(values)
        }
    }
}

enum SolveFailure {
    Overflow,
    Inexact(i64),
}

fn div_round_away(a: i64, b: i64) -> i64 {
    if a >= 0 {
        (a + b - 1) / b
    } else {
        (a - b + 1) / b
    }
}

fn arity_error(
    pseudo: &PseudoDef,
    invocation: &Instruction,
    slots: &[Slot],
    loc: &SourceLoc,
) -> AssemblyError {
    AssemblyError::OperandArityMismatch {
        loc: loc.clone(),
        mnemonic: pseudo.mnemonic.clone(),
        expected: slots.len(),
        found: invocation.operands.len(),
    }
}
