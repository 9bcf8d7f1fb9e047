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

//! Typed input loading for the front-end. The toolkit reads three kinds
//! of file — ISA descriptions, assembly source, and binary images — and
//! each gets its own accessor, so a failure names the thing that was
//! being loaded and ISA parsing/validation happens in exactly one place.

use crate::isa::Isa;
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait Workspace {
    /// Loads and validates an ISA description document.
    fn isa(&self, path: &Path) -> Result<Isa>;
    /// Loads an assembly translation unit.
    fn source(&self, path: &Path) -> Result<String>;
    /// Loads a binary image, ISAX-wrapped or raw.
    fn binary(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Reads from the real filesystem.
pub struct DiskWorkspace;

impl Workspace for DiskWorkspace {
    fn isa(&self, path: &Path) -> Result<Isa> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read ISA description {}", path.display()))?;
        Isa::from_json(&json)
            .with_context(|| format!("Invalid ISA description {}", path.display()))
    }

    fn source(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file {}", path.display()))
    }

    fn binary(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("Failed to read binary {}", path.display()))
    }
}

/// In-memory workspace for tests. Each input kind lives in its own path
/// space, so a test cannot accidentally read a source file as an image.
#[derive(Default)]
pub struct MemoryWorkspace {
    isas: HashMap<PathBuf, String>,
    sources: HashMap<PathBuf, String>,
    binaries: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryWorkspace {
    pub fn add_isa(&mut self, path: &str, json: &str) {
        self.isas.insert(PathBuf::from(path), json.to_string());
    }

    pub fn add_source(&mut self, path: &str, text: &str) {
        self.sources.insert(PathBuf::from(path), text.to_string());
    }

    pub fn add_binary(&mut self, path: &str, bytes: &[u8]) {
        self.binaries.insert(PathBuf::from(path), bytes.to_vec());
    }
}

impl Workspace for MemoryWorkspace {
    fn isa(&self, path: &Path) -> Result<Isa> {
        let json = self
            .isas
            .get(path)
            .ok_or_else(|| anyhow!("no ISA description registered at {}", path.display()))?;
        Isa::from_json(json)
            .with_context(|| format!("Invalid ISA description {}", path.display()))
    }

    fn source(&self, path: &Path) -> Result<String> {
        self.sources
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no source file registered at {}", path.display()))
    }

    fn binary(&self, path: &Path) -> Result<Vec<u8>> {
        self.binaries
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no binary registered at {}", path.display()))
    }
}
