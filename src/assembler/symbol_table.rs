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

use crate::errors::{AssemblyError, SourceLoc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Label,
    Constant,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolScope {
    Local,
    Global,
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub scope: SymbolScope,
    pub value: i64,
    pub defined: bool,
    pub referenced: bool,
    /// Addresses of instructions that referenced this symbol before it was
    /// defined.
    pub forward_refs: Vec<u32>,
}

/// Serialized form embedded in the container: one `name -> {value, kind}`
/// entry per defined non-constant symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub value: i64,
    pub kind: SymbolKind,
}

// The symbol table stores label names and their resolved addresses across
// both assembly passes.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn define_label(
        &mut self,
        name: &str,
        address: u32,
        loc: &SourceLoc,
    ) -> Result<(), AssemblyError> {
        self.define(name, address as i64, SymbolKind::Label, loc)
    }

    pub fn define_constant(
        &mut self,
        name: &str,
        value: i64,
        loc: &SourceLoc,
    ) -> Result<(), AssemblyError> {
        self.define(name, value, SymbolKind::Constant, loc)
    }

    fn define(
        &mut self,
        name: &str,
        value: i64,
        kind: SymbolKind,
        loc: &SourceLoc,
    ) -> Result<(), AssemblyError> {
        if let Some(existing) = self.symbols.get_mut(name) {
            if existing.defined {
                return Err(AssemblyError::SymbolRedefinition {
                    loc: loc.clone(),
                    name: name.to_string(),
                });
            }
            existing.value = value;
            existing.kind = kind;
            existing.defined = true;
            return Ok(());
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                name: name.to_string(),
                kind,
                scope: SymbolScope::Local,
                value,
                defined: true,
                referenced: false,
                forward_refs: Vec::new(),
            },
        );
        Ok(())
    }

    /// Records a use site. An unknown name becomes an undefined entry whose
    /// forward reference list carries `at_address`; pass 1 resolves it or
    /// pass 2 reports it.
    pub fn reference(&mut self, name: &str, at_address: u32) {
        let symbol = self.symbols.entry(name.to_string()).or_insert_with(|| Symbol {
            name: name.to_string(),
            kind: SymbolKind::Label,
            scope: SymbolScope::Local,
            value: 0,
            defined: false,
            referenced: false,
            forward_refs: Vec::new(),
        });
        symbol.referenced = true;
        if !symbol.defined {
            symbol.forward_refs.push(at_address);
        }
    }

    pub fn mark_global(&mut self, name: &str) {
        let symbol = self.symbols.entry(name.to_string()).or_insert_with(|| Symbol {
            name: name.to_string(),
            kind: SymbolKind::Label,
            scope: SymbolScope::Global,
            value: 0,
            defined: false,
            referenced: false,
            forward_refs: Vec::new(),
        });
        symbol.scope = SymbolScope::Global;
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Value of a defined symbol, or `UndefinedSymbol`.
    pub fn resolve(&self, name: &str, loc: &SourceLoc) -> Result<i64, AssemblyError> {
        match self.symbols.get(name) {
            Some(symbol) if symbol.defined => Ok(symbol.value),
            _ => Err(AssemblyError::UndefinedSymbol {
                loc: loc.clone(),
                name: name.to_string(),
            }),
        }
    }

    /// Symbols that were referenced but never defined.
    pub fn undefined(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .values()
            .filter(|s| s.referenced && !s.defined)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// Reverse lookup for the disassembler: defined label at exactly `address`.
    pub fn label_at(&self, address: u32) -> Option<&str> {
        self.symbols
            .values()
            .find(|s| s.defined && s.kind == SymbolKind::Label && s.value == address as i64)
            .map(|s| s.name.as_str())
    }

    /// The container payload: defined non-constant symbols only.
    pub fn export(&self) -> BTreeMap<String, SymbolRecord> {
        self.symbols
            .values()
            .filter(|s| s.defined && s.kind != SymbolKind::Constant)
            .map(|s| {
                (
                    s.name.clone(),
                    SymbolRecord {
                        value: s.value,
                        kind: s.kind,
                    },
                )
            })
            .collect()
    }

    pub fn import(records: BTreeMap<String, SymbolRecord>) -> Self {
        let mut table = SymbolTable::new();
        for (name, record) in records {
            table.symbols.insert(
                name.clone(),
                Symbol {
                    name,
                    kind: record.kind,
                    scope: SymbolScope::Local,
                    value: record.value,
                    defined: true,
                    referenced: false,
                    forward_refs: Vec::new(),
                },
            );
        }
        table
    }
}
