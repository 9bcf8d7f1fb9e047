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

//! Address-to-name substitution for decoded branch targets. Names come
//! exclusively from the container's embedded symbol table; nothing is
//! invented, and a target with no exact symbol stays a hex literal.

use crate::assembler::symbol_table::{SymbolKind, SymbolRecord};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct LabelMap {
    map: BTreeMap<u32, String>,
}

impl LabelMap {
    pub fn empty() -> Self {
        LabelMap::default()
    }

    pub fn from_records(records: &BTreeMap<String, SymbolRecord>) -> Self {
        let mut map = BTreeMap::new();
        for (name, record) in records {
            if record.kind == SymbolKind::Label {
                map.insert(record.value as u32, name.clone());
            }
        }
        LabelMap { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Exact-address lookup only.
    pub fn resolve(&self, address: u32) -> Option<&str> {
        self.map.get(&address).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &String)> {
        self.map.iter()
    }
}
