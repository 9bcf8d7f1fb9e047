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

//! The ISAX container: a self-describing wrapper around assembled output
//! carrying the entry point, code and data section bounds, and the symbol
//! table (as a UTF-8 JSON map) so disassembly can print the original
//! labels. All header fields are little-endian regardless of the ISA.
//!
//! Writers emit version 2. Readers also accept version 1 (24-byte header,
//! no symbol table, data running to end of file) and the legacy
//! `"ISA\x01"` wrapper that embeds the ISA name.

use crate::assembler::symbol_table::SymbolRecord;
use crate::assembler::AssemblyOutput;
use crate::errors::AssemblyError;
use crate::isa::Isa;
use std::collections::BTreeMap;

pub const MAGIC: &[u8; 4] = b"ISAX";
pub const LEGACY_MAGIC: &[u8; 4] = b"ISA\x01";
pub const VERSION: u32 = 2;

const V2_HEADER_LEN: usize = 32;
const V1_HEADER_LEN: usize = 24;

/// An unwrapped container payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub entry_point: u32,
    pub code_start: u32,
    pub code: Vec<u8>,
    pub data_start: u32,
    pub data: Vec<u8>,
    pub symbols: BTreeMap<String, SymbolRecord>,
    /// Only the legacy wrapper names its ISA; the caller matches it
    /// against the ISA selected on the command line.
    pub isa_name: Option<String>,
}

/// Wraps assembled output as ISAX v2. The code span covers the occupied
/// addresses the memory map calls code (all of them when no map is
/// declared), the data span the rest; gaps inside a span are zero-filled
/// so span lengths always add up to the payload length.
pub fn write(output: &AssemblyOutput, isa: &Isa) -> Vec<u8> {
    let (code_start, code) = span_where(output, |addr| !isa.memory_map.is_data(addr));
    let (data_start, data) = span_where(output, |addr| isa.memory_map.is_data(addr));
    let symbols = serde_json::to_string(&output.symbols.export()).expect("symbol map serializes");
    let symbol_bytes = symbols.as_bytes();

    let mut out = Vec::with_capacity(V2_HEADER_LEN + code.len() + data.len() + symbol_bytes.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&output.entry_point.to_le_bytes());
    out.extend_from_slice(&code_start.to_le_bytes());
    out.extend_from_slice(&(code.len() as u32).to_le_bytes());
    out.extend_from_slice(&data_start.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&(symbol_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&code);
    out.extend_from_slice(&data);
    out.extend_from_slice(symbol_bytes);
    out
}

/// Bare payload with no header, for legacy consumers.
pub fn write_raw(output: &AssemblyOutput) -> Vec<u8> {
    match output.image.bounds() {
        Some((start, end)) => output.image.extract(start, end - start + 1),
        None => Vec::new(),
    }
}

fn span_where(output: &AssemblyOutput, pred: impl Fn(u32) -> bool) -> (u32, Vec<u8>) {
    match output.image.bounds_where(pred) {
        Some((start, end)) => (start, output.image.extract(start, end - start + 1)),
        None => (0, Vec::new()),
    }
}

/// Recognizes and unwraps a container. `Ok(None)` means the input carries
/// no known magic and should be treated as a raw image.
pub fn read(bytes: &[u8]) -> Result<Option<Container>, AssemblyError> {
    if bytes.len() >= 4 && &bytes[..4] == LEGACY_MAGIC {
        return read_legacy(bytes).map(Some);
    }
    if bytes.len() >= 4 && &bytes[..4] == MAGIC {
        return read_isax(bytes).map(Some);
    }
    Ok(None)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, AssemblyError> {
    let slice = bytes
        .get(offset..offset + 4)
        .ok_or_else(|| AssemblyError::ContainerMalformed {
            reason: format!("truncated header at offset {}", offset),
        })?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn take<'a>(bytes: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8], AssemblyError> {
    bytes
        .get(offset..offset + len)
        .ok_or_else(|| AssemblyError::ContainerMalformed {
            reason: format!("{} extends past end of file", what),
        })
}

fn read_isax(bytes: &[u8]) -> Result<Container, AssemblyError> {
    let version = read_u32(bytes, 4)?;
    match version {
        1 => read_v1(bytes),
        2 => read_v2(bytes),
        other => Err(AssemblyError::ContainerVersionUnsupported { version: other }),
    }
}

fn read_v2(bytes: &[u8]) -> Result<Container, AssemblyError> {
    let entry_point = read_u32(bytes, 8)?;
    let code_start = read_u32(bytes, 12)?;
    let code_size = read_u32(bytes, 16)? as usize;
    let data_start = read_u32(bytes, 20)?;
    let data_size = read_u32(bytes, 24)? as usize;
    let symbol_size = read_u32(bytes, 28)? as usize;

    let mut offset = V2_HEADER_LEN;
    let code = take(bytes, offset, code_size, "code section")?.to_vec();
    offset += code_size;
    let data = take(bytes, offset, data_size, "data section")?.to_vec();
    offset += data_size;
    let symbol_bytes = take(bytes, offset, symbol_size, "symbol table")?;

    let symbols = if symbol_bytes.is_empty() {
        BTreeMap::new()
    } else {
        serde_json::from_slice(symbol_bytes).map_err(|e| AssemblyError::ContainerMalformed {
            reason: format!("bad symbol table: {}", e),
        })?
    };

    Ok(Container {
        entry_point,
        code_start,
        code,
        data_start,
        data,
        symbols,
        isa_name: None,
    })
}

fn read_v1(bytes: &[u8]) -> Result<Container, AssemblyError> {
    let entry_point = read_u32(bytes, 8)?;
    let code_start = read_u32(bytes, 12)?;
    let code_size = read_u32(bytes, 16)? as usize;
    let data_start = read_u32(bytes, 20)?;
    if bytes.len() < V1_HEADER_LEN + code_size {
        return Err(AssemblyError::ContainerMalformed {
            reason: "code section extends past end of file".to_string(),
        });
    }
    let code = bytes[V1_HEADER_LEN..V1_HEADER_LEN + code_size].to_vec();
    let data = bytes[V1_HEADER_LEN + code_size..].to_vec();
    Ok(Container {
        entry_point,
        code_start,
        code,
        data_start,
        data,
        symbols: BTreeMap::new(),
        isa_name: None,
    })
}

fn read_legacy(bytes: &[u8]) -> Result<Container, AssemblyError> {
    let name_len = *bytes.get(4).ok_or_else(|| AssemblyError::ContainerMalformed {
        reason: "truncated legacy header".to_string(),
    })? as usize;
    let name = take(bytes, 5, name_len, "ISA name")?;
    let name = String::from_utf8(name.to_vec()).map_err(|_| AssemblyError::ContainerMalformed {
        reason: "ISA name is not UTF-8".to_string(),
    })?;
    let code_size = read_u32(bytes, 5 + name_len)? as usize;
    let entry_point = read_u32(bytes, 9 + name_len)?;
    let code = take(bytes, 13 + name_len, code_size, "code section")?.to_vec();
    Ok(Container {
        entry_point,
        code_start: 0,
        code,
        data_start: 0,
        data: Vec::new(),
        symbols: BTreeMap::new(),
        isa_name: Some(name),
    })
}
