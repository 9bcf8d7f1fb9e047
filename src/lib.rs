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

pub mod assembler;
pub mod ast;
pub mod bits;
pub mod container;
pub mod disassembler;
pub mod errors;
pub mod isa;
pub mod operands;
pub mod parser;
pub mod scaffold;
pub mod workspace;

pub use assembler::AssemblyOutput;
pub use disassembler::{Disassembly, DisassemblyOptions};
pub use errors::{AssemblyError, AssemblyFailure};
pub use isa::Isa;

/// Assembles one translation unit against a validated ISA: parse, two
/// passes, and a sparse image plus the symbol table out the other end.
pub fn assemble(source: &str, isa: &Isa) -> Result<AssemblyOutput, AssemblyFailure> {
    let lines = parser::parse_source(source, isa)?;
    assembler::assemble(&lines, isa)
}

/// Disassembles a binary (ISAX-wrapped or raw) back to structured form;
/// use `disassembler::formatter::Formatter` to render it as text.
pub fn disassemble(
    bytes: &[u8],
    isa: &Isa,
    options: &DisassemblyOptions,
) -> Result<Disassembly, AssemblyError> {
    disassembler::disassemble(bytes, isa, options)
}
