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

//! Code-versus-data arbitration. Priority order: user-supplied regions,
//! then the ISA memory map (only when the image plausibly covers the full
//! address space), then a content heuristic over decode failures and
//! zero runs.

use super::decoder::Decoder;
use crate::isa::Isa;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Code,
    Data,
}

/// Half-open address span `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ArbiterConfig {
    /// Unknown words in a row before the run is reclassified as data.
    pub unknown_run_for_data: u32,
    /// All-zero words tolerated before the run is reclassified as data.
    pub max_zero_words: u32,
    /// Decoded words in a row needed to climb back out of data mode.
    pub decoded_run_for_code: u32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        ArbiterConfig {
            unknown_run_for_data: 3,
            max_zero_words: 4,
            decoded_run_for_code: 3,
        }
    }
}

/// Fixed data regions that override the content heuristic: the user's, or
/// the memory map's when the image is at least a tenth of the address
/// space (a compact binary's addresses say nothing about the map).
pub fn fixed_data_regions(
    isa: &Isa,
    image_len: usize,
    user_regions: Option<&[(u32, u32)]>,
) -> Vec<(u32, u32)> {
    if let Some(regions) = user_regions {
        return regions.to_vec();
    }
    if isa.memory_map.is_empty() || (image_len as u64) < isa.address_space_size() / 10 {
        return Vec::new();
    }
    let mut regions = Vec::new();
    for span in [
        &isa.memory_map.data_section,
        &isa.memory_map.interrupt_vectors,
        &isa.memory_map.mmio,
    ]
    .into_iter()
    .flatten()
    {
        regions.push((span.start, span.end + 1));
    }
    regions
}

fn in_regions(addr: u32, regions: &[(u32, u32)]) -> bool {
    regions.iter().any(|(start, end)| *start <= addr && addr < *end)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WordClass {
    Decoded,
    Unknown,
    Zero,
    Pinned, // inside a fixed data region
}

/// Partitions `bytes` (based at `base`) into code and data spans. The
/// decoder is only consulted for classification here; actual decoding
/// happens span by span afterwards.
pub fn carve(
    isa: &Isa,
    decoder: &Decoder,
    bytes: &[u8],
    base: u32,
    regions: &[(u32, u32)],
    config: &ArbiterConfig,
) -> Vec<Span> {
    // Classify each word position first.
    let mut classes: Vec<(u32, u32, WordClass)> = Vec::new(); // (addr, len, class)
    let mut offset = 0usize;
    while offset < bytes.len() {
        let addr = base + offset as u32;
        let base_len = isa.instruction_bytes() as usize;
        let avail = bytes.len() - offset;
        let peek = &bytes[offset..offset + base_len.min(avail)];
        let word = isa.endianness.word_from_bytes(peek);
        let len = if avail < base_len {
            avail
        } else {
            (isa.length_for_word(word) / 8) as usize
        };
        let len = len.min(avail).max(1);
        let chunk = &bytes[offset..offset + len];

        let class = if in_regions(addr, regions) {
            WordClass::Pinned
        } else if len < base_len {
            WordClass::Unknown
        } else if chunk.iter().all(|b| *b == 0) {
            WordClass::Zero
        } else {
            let word = isa.endianness.word_from_bytes(chunk);
            if decoder.decode(word, addr, chunk).is_some() {
                WordClass::Decoded
            } else {
                WordClass::Unknown
            }
        };
        classes.push((addr, len as u32, class));
        offset += len;
    }

    // Walk the classification, switching modes per the thresholds. Once in
    // data, only a user-region boundary or a run of decodable words
    // switches back.
    let mut kinds: Vec<SpanKind> = vec![SpanKind::Code; classes.len()];
    let mut mode = SpanKind::Code;
    let mut pinned_mode = false;
    let mut unknown_run = 0u32;
    let mut zero_run = 0u32;
    let mut decoded_run = 0u32;

    for (i, (_, _, class)) in classes.iter().enumerate() {
        // Leaving a fixed region is a hard boundary back to code.
        if mode == SpanKind::Data && pinned_mode && *class != WordClass::Pinned {
            mode = SpanKind::Code;
            pinned_mode = false;
            unknown_run = 0;
            zero_run = 0;
            decoded_run = 0;
        }

        match mode {
            SpanKind::Code => {
                match class {
                    WordClass::Pinned => {
                        kinds[i] = SpanKind::Data;
                        mode = SpanKind::Data;
                        pinned_mode = true;
                        unknown_run = 0;
                        zero_run = 0;
                        decoded_run = 0;
                        continue;
                    }
                    WordClass::Unknown => {
                        unknown_run += 1;
                        zero_run = 0;
                        if unknown_run >= config.unknown_run_for_data {
                            for k in kinds.iter_mut().take(i + 1).skip(i + 1 - unknown_run as usize) {
                                *k = SpanKind::Data;
                            }
                            mode = SpanKind::Data;
                            pinned_mode = false;
                            unknown_run = 0;
                            decoded_run = 0;
                            continue;
                        }
                    }
                    WordClass::Zero => {
                        zero_run += 1;
                        unknown_run = 0;
                        if zero_run > config.max_zero_words {
                            for k in kinds.iter_mut().take(i + 1).skip(i + 1 - zero_run as usize) {
                                *k = SpanKind::Data;
                            }
                            mode = SpanKind::Data;
                            pinned_mode = false;
                            zero_run = 0;
                            decoded_run = 0;
                            continue;
                        }
                    }
                    WordClass::Decoded => {
                        unknown_run = 0;
                        zero_run = 0;
                    }
                }
                kinds[i] = SpanKind::Code;
            }
            SpanKind::Data => {
                if *class == WordClass::Pinned {
                    kinds[i] = SpanKind::Data;
                    pinned_mode = true;
                    decoded_run = 0;
                    continue;
                }
                if *class == WordClass::Decoded {
                    decoded_run += 1;
                    if decoded_run >= config.decoded_run_for_code {
                        for k in kinds.iter_mut().take(i + 1).skip(i + 1 - decoded_run as usize) {
                            *k = SpanKind::Code;
                        }
                        mode = SpanKind::Code;
                        decoded_run = 0;
                        unknown_run = 0;
                        zero_run = 0;
                        continue;
                    }
                } else {
                    decoded_run = 0;
                }
                kinds[i] = SpanKind::Data;
            }
        }
    }

    // Merge neighbors of the same kind.
    let mut spans: Vec<Span> = Vec::new();
    for ((addr, len, _), kind) in classes.iter().zip(kinds) {
        match spans.last_mut() {
            Some(last) if last.kind == kind && last.end == *addr => last.end = addr + len,
            _ => spans.push(Span {
                kind,
                start: *addr,
                end: addr + len,
            }),
        }
    }
    spans
}
