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

use crate::ast::*;
use crate::errors::{AssemblyError, AssemblyFailure, SourceLoc};
use crate::isa::Isa;
use crate::operands::OperandResolver;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

// Derive the parser from our grammar file.
#[derive(Parser)]
#[grammar = "./grammar.pest"]
pub struct LineParser;

/// Parses a whole translation unit against the ISA's declared syntax.
/// Each line is stripped of comments (string-literal aware), normalized,
/// and run through the grammar. All bad lines are reported, not just the
/// first one.
pub fn parse_source(source: &str, isa: &Isa) -> Result<Vec<SourceLine>, AssemblyFailure> {
    let resolver = OperandResolver::new(isa);
    let mut lines = Vec::new();
    let mut errors = Vec::new();

    for (index, raw_line) in source.lines().enumerate() {
        let line_number = index + 1;
        let stripped = strip_comment(raw_line, &isa.syntax.comment_chars);
        let normalized = normalize_label_suffix(stripped.trim(), &isa.syntax.label_suffix);
        let normalized = normalize_immediate_prefix(&normalized, &isa.syntax.immediate_prefix);
        if normalized.is_empty() {
            continue;
        }
        match parse_line(&normalized, line_number, &resolver) {
            Ok(Some(line)) => lines.push(line),
            Ok(None) => {}
            Err(err) => errors.push(err),
        }
    }

    if errors.is_empty() {
        Ok(lines)
    } else {
        Err(AssemblyFailure { errors })
    }
}

/// Cuts the line at the first comment marker that sits outside a string
/// literal. Markers may be multi-character ("//").
fn strip_comment<'a>(line: &'a str, comment_chars: &[String]) -> &'a str {
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        let rest = &line[i..];
        if in_string {
            if bytes[i] == b'\\' {
                i += 2;
                continue;
            }
            if bytes[i] == b'"' {
                in_string = false;
            }
        } else if bytes[i] == b'"' {
            in_string = true;
        } else if comment_chars.iter().any(|c| !c.is_empty() && rest.starts_with(c.as_str())) {
            return &line[..i];
        }
        i += 1;
    }
    line
}

/// The grammar expects "#" before an immediate; rewrite a different
/// declared prefix so one grammar serves every ISA. Only a prefix that
/// sits directly before a number is rewritten, and string literals are
/// left alone.
fn normalize_immediate_prefix(line: &str, prefix: &str) -> String {
    if prefix.is_empty() || prefix == "#" {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;
    while i < line.len() {
        let rest = &line[i..];
        let c = rest.chars().next().unwrap();
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            i += c.len_utf8();
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            i += c.len_utf8();
            continue;
        }
        if rest.starts_with(prefix) {
            let after = &rest[prefix.len()..];
            if after.starts_with(|a: char| a.is_ascii_digit() || a == '+' || a == '-') {
                out.push('#');
                i += prefix.len();
                continue;
            }
        }
        out.push(c);
        i += c.len_utf8();
    }
    out
}

/// The grammar expects ":" after a label; rewrite a nonstandard declared
/// suffix so one grammar serves every ISA.
fn normalize_label_suffix(line: &str, suffix: &str) -> String {
    if suffix == ":" || suffix.is_empty() {
        return line.to_string();
    }
    let ident_len = line
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .map(|c| c.len_utf8())
        .sum::<usize>();
    if ident_len > 0 && line[ident_len..].starts_with(suffix) {
        format!("{}:{}", &line[..ident_len], &line[ident_len + suffix.len()..])
    } else {
        line.to_string()
    }
}

fn parse_line(
    text: &str,
    line_number: usize,
    resolver: &OperandResolver,
) -> Result<Option<SourceLine>, AssemblyError> {
    let loc = SourceLoc::line(line_number);
    let mut pairs =
        LineParser::parse(Rule::line, text).map_err(|e| AssemblyError::ParseSyntax {
            loc: loc.clone(),
            reason: e.variant.message().to_string(),
        })?;

    let mut line = SourceLine {
        line_number,
        ..SourceLine::default()
    };

    for pair in pairs.next().unwrap().into_inner() {
        match pair.as_rule() {
            Rule::label => {
                let ident = pair.into_inner().next().unwrap();
                line.label = Some(ident.as_str().to_string());
            }
            Rule::statement => {
                let inner = pair.into_inner().next().unwrap();
                match inner.as_rule() {
                    Rule::directive => {
                        line.directive = Some(build_directive(inner, &loc, resolver)?);
                    }
                    Rule::instruction => {
                        line.instruction = Some(build_instruction(inner, &loc, resolver)?);
                    }
                    _ => unreachable!("unexpected statement rule: {:?}", inner.as_rule()),
                }
            }
            Rule::EOI => {}
            _ => unreachable!("unexpected line rule: {:?}", pair.as_rule()),
        }
    }

    if line.label.is_some() || line.instruction.is_some() || line.directive.is_some() {
        Ok(Some(line))
    } else {
        Ok(None)
    }
}

fn build_instruction(
    pair: Pair<Rule>,
    loc: &SourceLoc,
    resolver: &OperandResolver,
) -> Result<Instruction, AssemblyError> {
    let mut inner = pair.into_inner();
    let mnemonic = inner.next().unwrap().as_str().to_string();
    let mut operands = Vec::new();
    if let Some(list) = inner.next() {
        for operand_pair in list.into_inner() {
            operands.push(build_operand(operand_pair, loc, resolver)?);
        }
    }
    Ok(Instruction { mnemonic, operands })
}

fn build_directive(
    pair: Pair<Rule>,
    loc: &SourceLoc,
    resolver: &OperandResolver,
) -> Result<Directive, AssemblyError> {
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();
    let mut args = Vec::new();
    if let Some(list) = inner.next() {
        for operand_pair in list.into_inner() {
            args.push(build_operand(operand_pair, loc, resolver)?);
        }
    }
    Ok(Directive { name, args })
}

// Helper to build an Operand from a pest Pair
fn build_operand(
    pair: Pair<Rule>,
    loc: &SourceLoc,
    resolver: &OperandResolver,
) -> Result<Operand, AssemblyError> {
    let inner = pair.into_inner().next().ok_or_else(|| AssemblyError::ParseSyntax {
        loc: loc.clone(),
        reason: "expected an operand".to_string(),
    })?;
    match inner.as_rule() {
        Rule::memory => build_memory(inner, loc, resolver),
        Rule::str_literal => Ok(Operand::Str(unescape_string(
            inner.into_inner().next().unwrap().as_str(),
        ))),
        Rule::immediate => build_immediate(inner, loc, resolver),
        Rule::name => resolver.classify_name(inner.as_str(), loc),
        _ => unreachable!("unknown operand rule: {:?}", inner.as_rule()),
    }
}

fn build_immediate(
    pair: Pair<Rule>,
    loc: &SourceLoc,
    resolver: &OperandResolver,
) -> Result<Operand, AssemblyError> {
    let mut had_prefix = false;
    let mut number = "";
    for piece in pair.into_inner() {
        match piece.as_rule() {
            Rule::imm_prefix => had_prefix = true,
            Rule::number => number = piece.as_str(),
            _ => {}
        }
    }
    resolver.classify_immediate(number, had_prefix, loc)
}

fn build_memory(
    pair: Pair<Rule>,
    loc: &SourceLoc,
    resolver: &OperandResolver,
) -> Result<Operand, AssemblyError> {
    let mut inner = pair.into_inner();
    let offset_pair = inner.next().unwrap().into_inner().next().unwrap();
    let offset = match offset_pair.as_rule() {
        Rule::immediate => build_immediate(offset_pair, loc, resolver)?,
        Rule::bare_ident => Operand::Label(offset_pair.as_str().to_string()),
        _ => unreachable!("unknown offset rule: {:?}", offset_pair.as_rule()),
    };
    let base_pair = inner.next().unwrap();
    let base = match resolver.classify_name(base_pair.as_str(), loc)? {
        Operand::Register(name) => name,
        _ => {
            return Err(AssemblyError::UnknownRegister {
                loc: loc.clone(),
                name: base_pair.as_str().to_string(),
            });
        }
    };
    Ok(Operand::Memory {
        offset: Box::new(offset),
        base,
    })
}

fn unescape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

// ------------- unit tests -------------
