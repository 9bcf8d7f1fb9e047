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

//! Execution of data directives. Pass 1 asks only for the address effect;
//! pass 2 emits bytes into the output image.

use super::symbol_table::SymbolTable;
use super::Image;
use crate::ast::{Directive, Operand};
use crate::bits;
use crate::errors::{AssemblyError, SourceLoc};
use crate::isa::{DirectiveKind, Isa};

/// How a directive moves the location counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressEffect {
    SetAddress(u32),
    Advance(u32),
    AlignTo(u32),
    None,
}

fn arg_error(directive: &Directive, loc: &SourceLoc, reason: impl Into<String>) -> AssemblyError {
    AssemblyError::DirectiveArgument {
        loc: loc.clone(),
        directive: directive.name.clone(),
        reason: reason.into(),
    }
}

/// Resolves one numeric argument. Constants and already-defined labels are
/// usable; anything else is an error at the caller's stage.
fn numeric_arg(
    directive: &Directive,
    arg: &Operand,
    symbols: &SymbolTable,
    loc: &SourceLoc,
) -> Result<i64, AssemblyError> {
    match arg {
        Operand::Immediate(value) => Ok(*value),
        Operand::Label(name) => symbols.resolve(name, loc),
        other => Err(arg_error(
            directive,
            loc,
            format!("expected a number or symbol, found {:?}", other),
        )),
    }
}

fn single_numeric_arg(
    directive: &Directive,
    symbols: &SymbolTable,
    loc: &SourceLoc,
) -> Result<i64, AssemblyError> {
    match directive.args.as_slice() {
        [arg] => numeric_arg(directive, arg, symbols, loc),
        args => Err(arg_error(
            directive,
            loc,
            format!("expected exactly one argument, found {}", args.len()),
        )),
    }
}

fn string_arg<'a>(directive: &'a Directive, loc: &SourceLoc) -> Result<&'a str, AssemblyError> {
    match directive.args.as_slice() {
        [Operand::Str(text)] => Ok(text),
        _ => Err(arg_error(directive, loc, "expected one string argument")),
    }
}

/// Printable ASCII plus CR, LF and TAB; data directives never emit
/// arbitrary byte values through strings.
fn check_ascii(directive: &Directive, text: &str, loc: &SourceLoc) -> Result<(), AssemblyError> {
    for c in text.chars() {
        let ok = (' '..='~').contains(&c) || c == '\r' || c == '\n' || c == '\t';
        if !ok {
            return Err(arg_error(
                directive,
                loc,
                format!("non-ASCII character {:?} in string", c),
            ));
        }
    }
    Ok(())
}

/// Pass 1: how the directive moves the location counter, plus symbol-table
/// side effects (constants and global markers are defined here so later
/// pass-1 lines can use them).
pub fn pass1_effect(
    directive: &Directive,
    isa: &Isa,
    symbols: &mut SymbolTable,
    loc: &SourceLoc,
) -> Result<AddressEffect, AssemblyError> {
    let def = isa
        .find_directive(&directive.name)
        .ok_or_else(|| AssemblyError::UnknownDirective {
            loc: loc.clone(),
            name: directive.name.clone(),
        })?;

    match def.action {
        DirectiveKind::DefineConstant => {
            let (name, value) = constant_args(directive, symbols, loc)?;
            symbols.define_constant(&name, value, loc)?;
            Ok(AddressEffect::None)
        }
        DirectiveKind::DeclareGlobal => {
            match directive.args.as_slice() {
                [Operand::Label(name)] => symbols.mark_global(name),
                _ => return Err(arg_error(directive, loc, "expected one symbol name")),
            }
            Ok(AddressEffect::None)
        }
        _ => address_effect(directive, isa, symbols, loc),
    }
}

/// The pure part of the pass-1 query: how the location counter moves,
/// with no symbol-table side effects. Pass 2 uses this to stay in step
/// with pass 1 after an emission error.
pub fn address_effect(
    directive: &Directive,
    isa: &Isa,
    symbols: &SymbolTable,
    loc: &SourceLoc,
) -> Result<AddressEffect, AssemblyError> {
    let def = isa
        .find_directive(&directive.name)
        .ok_or_else(|| AssemblyError::UnknownDirective {
            loc: loc.clone(),
            name: directive.name.clone(),
        })?;

    match def.action {
        DirectiveKind::SetOrigin => {
            let addr = single_numeric_arg(directive, symbols, loc)?;
            check_address(directive, addr, isa, loc)?;
            Ok(AddressEffect::SetAddress(addr as u32))
        }
        DirectiveKind::EmitWords => {
            if directive.args.is_empty() {
                return Err(arg_error(directive, loc, "expected at least one value"));
            }
            Ok(AddressEffect::Advance(
                directive.args.len() as u32 * isa.word_bytes(),
            ))
        }
        DirectiveKind::EmitBytes => {
            if directive.args.is_empty() {
                return Err(arg_error(directive, loc, "expected at least one value"));
            }
            Ok(AddressEffect::Advance(directive.args.len() as u32))
        }
        DirectiveKind::EmitString => {
            let text = string_arg(directive, loc)?;
            check_ascii(directive, text, loc)?;
            Ok(AddressEffect::Advance(text.len() as u32))
        }
        DirectiveKind::EmitStringNul => {
            let text = string_arg(directive, loc)?;
            check_ascii(directive, text, loc)?;
            Ok(AddressEffect::Advance(text.len() as u32 + 1))
        }
        DirectiveKind::ReserveSpace => {
            let count = single_numeric_arg(directive, symbols, loc)?;
            if count < 0 {
                return Err(arg_error(directive, loc, "cannot reserve a negative size"));
            }
            Ok(AddressEffect::Advance(count as u32))
        }
        DirectiveKind::Align => {
            let alignment = single_numeric_arg(directive, symbols, loc)?;
            if alignment <= 0 || !bits::is_power_of_two(alignment as u64) {
                return Err(arg_error(
                    directive,
                    loc,
                    format!("alignment {} is not a power of two", alignment),
                ));
            }
            Ok(AddressEffect::AlignTo(alignment as u32))
        }
        DirectiveKind::DefineConstant => {
            constant_args(directive, symbols, loc)?;
            Ok(AddressEffect::None)
        }
        DirectiveKind::SelectSection | DirectiveKind::DeclareGlobal => Ok(AddressEffect::None),
    }
}

fn constant_args(
    directive: &Directive,
    symbols: &SymbolTable,
    loc: &SourceLoc,
) -> Result<(String, i64), AssemblyError> {
    match directive.args.as_slice() {
        [Operand::Label(name), value] => {
            let value = numeric_arg(directive, value, symbols, loc)?;
            Ok((name.clone(), value))
        }
        _ => Err(arg_error(directive, loc, "expected a name and a value")),
    }
}

fn check_address(
    directive: &Directive,
    addr: i64,
    isa: &Isa,
    loc: &SourceLoc,
) -> Result<(), AssemblyError> {
    if addr < 0 || addr as u64 > isa.address_mask() {
        return Err(arg_error(
            directive,
            loc,
            format!("address {:#x} outside the {}-bit address space", addr, isa.address_bits()),
        ));
    }
    Ok(())
}

/// Pass 2: emit bytes at `address`. Constants and globals were handled in
/// pass 1 and are no-ops here. Returns the effect so the driver advances
/// its counter the same way pass 1 did.
pub fn execute(
    directive: &Directive,
    isa: &Isa,
    symbols: &SymbolTable,
    image: &mut Image,
    address: u32,
    loc: &SourceLoc,
) -> Result<AddressEffect, AssemblyError> {
    let def = isa
        .find_directive(&directive.name)
        .ok_or_else(|| AssemblyError::UnknownDirective {
            loc: loc.clone(),
            name: directive.name.clone(),
        })?;

    match def.action {
        DirectiveKind::SetOrigin => {
            let addr = single_numeric_arg(directive, symbols, loc)?;
            check_address(directive, addr, isa, loc)?;
            Ok(AddressEffect::SetAddress(addr as u32))
        }
        DirectiveKind::EmitWords => {
            let word_bytes = isa.word_bytes();
            let word_bits = isa.word_size;
            let mut at = address;
            for arg in &directive.args {
                let value = numeric_arg(directive, arg, symbols, loc)?;
                if (value as i128) >= 1i128 << word_bits || (value as i128) < -(1i128 << (word_bits - 1)) {
                    return Err(arg_error(
                        directive,
                        loc,
                        format!("value {} does not fit a {}-bit word", value, word_bits),
                    ));
                }
                let raw = value as u64 & bits::mask(word_bits);
                image.put_bytes(at, &isa.endianness.word_to_bytes(raw, word_bytes as usize));
                at += word_bytes;
            }
            Ok(AddressEffect::Advance(at - address))
        }
        DirectiveKind::EmitBytes => {
            let mut at = address;
            for arg in &directive.args {
                let value = numeric_arg(directive, arg, symbols, loc)?;
                if !(-128..256).contains(&value) {
                    return Err(arg_error(
                        directive,
                        loc,
                        format!("value {} does not fit a byte", value),
                    ));
                }
                image.put_bytes(at, &[value as u8]);
                at += 1;
            }
            Ok(AddressEffect::Advance(at - address))
        }
        DirectiveKind::EmitString | DirectiveKind::EmitStringNul => {
            let text = string_arg(directive, loc)?;
            check_ascii(directive, text, loc)?;
            image.put_bytes(address, text.as_bytes());
            let mut len = text.len() as u32;
            if def.action == DirectiveKind::EmitStringNul {
                image.put_bytes(address + len, &[0]);
                len += 1;
            }
            Ok(AddressEffect::Advance(len))
        }
        DirectiveKind::ReserveSpace => {
            let count = single_numeric_arg(directive, symbols, loc)?;
            if count < 0 {
                return Err(arg_error(directive, loc, "cannot reserve a negative size"));
            }
            image.put_bytes(address, &vec![0u8; count as usize]);
            Ok(AddressEffect::Advance(count as u32))
        }
        DirectiveKind::Align => {
            let alignment = single_numeric_arg(directive, symbols, loc)?;
            if alignment <= 0 || !bits::is_power_of_two(alignment as u64) {
                return Err(arg_error(
                    directive,
                    loc,
                    format!("alignment {} is not a power of two", alignment),
                ));
            }
            let target = bits::align_up(address as u64, alignment as u64).unwrap() as u32;
            image.put_bytes(address, &vec![0u8; (target - address) as usize]);
            Ok(AddressEffect::AlignTo(alignment as u32))
        }
        DirectiveKind::DefineConstant | DirectiveKind::SelectSection | DirectiveKind::DeclareGlobal => {
            Ok(AddressEffect::None)
        }
    }
}
