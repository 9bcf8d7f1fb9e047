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

pub mod arbiter;
pub mod coalesce;
pub mod decoder;
pub mod formatter;
pub mod labels;

use crate::assembler::symbol_table::SymbolRecord;
use crate::container;
use crate::errors::AssemblyError;
use crate::isa::Isa;
use arbiter::{ArbiterConfig, Span, SpanKind};
use decoder::{DecodedInstruction, Decoder};
use labels::LabelMap;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct DisassemblyOptions {
    /// Load address for raw images; wrapped images carry their own.
    pub base_address: Option<u32>,
    /// Explicit data regions, overriding every inference.
    pub data_regions: Option<Vec<(u32, u32)>>,
    pub coalesce_pseudo: bool,
    pub reconstruct_labels: bool,
}

impl Default for DisassemblyOptions {
    fn default() -> Self {
        DisassemblyOptions {
            base_address: None,
            data_regions: None,
            coalesce_pseudo: true,
            reconstruct_labels: false,
        }
    }
}

#[derive(Debug)]
pub struct Disassembly {
    pub instructions: Vec<DecodedInstruction>,
    pub data_sections: Vec<(u32, Vec<u8>)>,
    pub symbols: BTreeMap<String, SymbolRecord>,
    pub entry_point: u32,
    pub labels: LabelMap,
}

/// Disassembles a binary image, wrapped or raw. Never aborts on unknown
/// words; only a malformed container stops it up-front.
pub fn disassemble(
    bytes: &[u8],
    isa: &Isa,
    options: &DisassemblyOptions,
) -> Result<Disassembly, AssemblyError> {
    // Fingerprints were checked when the ISA was validated.
    let decoder = Decoder::new(isa).expect("validated ISA has decodable fingerprints");

    let mut instructions = Vec::new();
    let mut data_sections: Vec<(u32, Vec<u8>)> = Vec::new();

    let (code, code_start, entry_point, symbols) = match container::read(bytes)? {
        Some(wrapped) => {
            if !wrapped.data.is_empty() {
                data_sections.push((wrapped.data_start, wrapped.data.clone()));
            }
            (
                wrapped.code,
                wrapped.code_start,
                wrapped.entry_point,
                wrapped.symbols,
            )
        }
        None => {
            let base = options
                .base_address
                .unwrap_or(isa.address_space.default_code_start);
            (bytes.to_vec(), base, base, BTreeMap::new())
        }
    };

    // The container's own section bounds are authoritative; arbitration
    // only inspects the code payload for embedded data runs.
    let regions = arbiter::fixed_data_regions(isa, code.len(), options.data_regions.as_deref());
    let spans = arbiter::carve(
        isa,
        &decoder,
        &code,
        code_start,
        &regions,
        &ArbiterConfig::default(),
    );

    for span in &spans {
        let slice = span_bytes(&code, code_start, span);
        match span.kind {
            SpanKind::Code => decode_span(isa, &decoder, slice, span.start, &mut instructions),
            SpanKind::Data => data_sections.push((span.start, slice.to_vec())),
        }
    }
    data_sections.sort_by_key(|(addr, _)| *addr);

    if options.coalesce_pseudo {
        instructions = coalesce::coalesce(instructions, isa);
    }

    let labels = if options.reconstruct_labels {
        LabelMap::from_records(&symbols)
    } else {
        LabelMap::empty()
    };

    Ok(Disassembly {
        instructions,
        data_sections,
        symbols,
        entry_point,
        labels,
    })
}

fn span_bytes<'a>(code: &'a [u8], base: u32, span: &Span) -> &'a [u8] {
    let lo = (span.start - base) as usize;
    let hi = (span.end - base) as usize;
    &code[lo..hi.min(code.len())]
}

/// Decodes one code span word by word; unmatched words become placeholder
/// entries with their raw bytes kept for the listing comment.
fn decode_span(
    isa: &Isa,
    decoder: &Decoder,
    bytes: &[u8],
    base: u32,
    out: &mut Vec<DecodedInstruction>,
) {
    let base_len = isa.instruction_bytes() as usize;
    let mut offset = 0usize;
    while offset < bytes.len() {
        let address = base + offset as u32;
        let avail = bytes.len() - offset;
        if avail < base_len {
            out.push(DecodedInstruction::unknown(
                address,
                bytes[offset..].to_vec(),
            ));
            break;
        }
        let peek = isa
            .endianness
            .word_from_bytes(&bytes[offset..offset + base_len]);
        let len = ((isa.length_for_word(peek) / 8) as usize).clamp(1, avail);
        let chunk = &bytes[offset..offset + len];
        let word = isa.endianness.word_from_bytes(chunk);
        out.push(
            decoder
                .decode(word, address, chunk)
                .unwrap_or_else(|| DecodedInstruction::unknown(address, chunk.to_vec())),
        );
        offset += len;
    }
}
