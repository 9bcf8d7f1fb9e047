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

use anyhow::{bail, Result};
use clap::Parser as clap_parser;
use clap::Subcommand;
use isax::disassembler::formatter::{Formatter, ListingOptions};
use isax::workspace::{DiskWorkspace, Workspace};
use isax::{container, DisassemblyOptions};
use std::fs;
use std::path::PathBuf;

#[derive(clap_parser)]
#[clap(version = "0.1.0", about = "Data-driven assembler/disassembler")]
struct Opts {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a source file into an ISAX binary (or a raw image)
    Assemble {
        input: PathBuf,
        /// Path to the ISA description (JSON)
        #[clap(short, long)]
        isa: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
        /// Emit the bare payload with no ISAX header
        #[clap(long)]
        raw: bool,
        /// Print the symbol table after assembly
        #[clap(long)]
        list_symbols: bool,
    },
    /// Disassemble an ISAX binary or raw image back to assembly text
    Disassemble {
        input: PathBuf,
        /// Path to the ISA description (JSON)
        #[clap(short, long)]
        isa: PathBuf,
        /// Write the listing here instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
        #[clap(long)]
        show_addresses: bool,
        #[clap(long)]
        show_bytes: bool,
        /// Force data regions: start-end[,start-end...] (hex accepted)
        #[clap(long)]
        data_regions: Option<String>,
        /// Leave expansions as real instructions
        #[clap(long)]
        no_pseudo: bool,
        /// Replace branch targets with symbol names from the container
        #[clap(long)]
        labels: bool,
        /// Load address for raw images
        #[clap(long)]
        base: Option<String>,
    },
    /// Print summary statistics for an ISA description
    Validate {
        #[clap(short, long)]
        isa: PathBuf,
    },
    /// Generate a starter ISA description to edit
    Scaffold {
        /// Name of the new ISA
        name: String,
        #[clap(short, long)]
        output: PathBuf,
        #[clap(long, default_value_t = 16)]
        word_size: u32,
        #[clap(long, default_value_t = 16)]
        instruction_size: u32,
        #[clap(long, default_value_t = 8)]
        registers: u32,
        #[clap(long)]
        big_endian: bool,
    },
}

fn parse_address(text: &str) -> Result<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x") {
        Ok(u32::from_str_radix(hex, 16)?)
    } else {
        Ok(text.parse()?)
    }
}

fn parse_data_regions(spec: &str) -> Result<Vec<(u32, u32)>> {
    let mut regions = Vec::new();
    for part in spec.split(',') {
        let Some((start, end)) = part.split_once('-') else {
            bail!("data region \"{}\" is not start-end", part);
        };
        let start = parse_address(start)?;
        let end = parse_address(end)?;
        if end <= start {
            bail!("data region \"{}\" is empty", part);
        }
        regions.push((start, end));
    }
    Ok(regions)
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();
    let workspace = DiskWorkspace;

    match opts.command {
        Commands::Assemble {
            input,
            isa,
            output,
            raw,
            list_symbols,
        } => {
            let isa = workspace.isa(&isa)?;
            let source = workspace.source(&input)?;
            let assembled = isax::assemble(&source, &isa).map_err(|failure| {
                anyhow::anyhow!("{}", failure)
            })?;

            let bytes = if raw {
                container::write_raw(&assembled)
            } else {
                container::write(&assembled, &isa)
            };
            fs::write(&output, bytes)?;

            if list_symbols {
                for symbol in assembled.symbols.iter() {
                    println!("{:<24} {:#06x} {:?}", symbol.name, symbol.value, symbol.kind);
                }
            }
            println!(
                "Successfully assembled {} to {}",
                input.display(),
                output.display()
            );
        }

        Commands::Disassemble {
            input,
            isa,
            output,
            show_addresses,
            show_bytes,
            data_regions,
            no_pseudo,
            labels,
            base,
        } => {
            let isa = workspace.isa(&isa)?;
            let bytes = workspace.binary(&input)?;

            let options = DisassemblyOptions {
                base_address: base.as_deref().map(parse_address).transpose()?,
                data_regions: data_regions.as_deref().map(parse_data_regions).transpose()?,
                coalesce_pseudo: !no_pseudo,
                reconstruct_labels: labels,
            };
            let result = isax::disassemble(&bytes, &isa, &options)?;

            let formatter = Formatter::new(&isa);
            let listing = formatter.listing(
                &result.instructions,
                &result.data_sections,
                &result.labels,
                &ListingOptions {
                    show_addresses,
                    show_bytes,
                },
            );
            match output {
                Some(path) => fs::write(&path, listing)?,
                None => print!("{}", listing),
            }
        }

        Commands::Validate { isa } => {
            let isa = workspace.isa(&isa)?;
            println!("{} {}", isa.name, isa.version);
            println!("  word size:           {} bits", isa.word_size);
            println!("  instruction size:    {} bits", isa.instruction_size);
            println!("  address bits:        {}", isa.address_bits());
            println!("  registers:           {}", isa.register_count());
            println!("  instructions:        {}", isa.instructions.len());
            println!("  pseudo-instructions: {}", isa.pseudo_instructions.len());
            println!("  directives:          {}", isa.directives.len());
        }

        Commands::Scaffold {
            name,
            output,
            word_size,
            instruction_size,
            registers,
            big_endian,
        } => {
            let options = isax::scaffold::ScaffoldOptions {
                name,
                word_size,
                instruction_size,
                register_count: registers,
                little_endian: !big_endian,
            };
            let text = isax::scaffold::generate(&options)?;
            fs::write(&output, text)?;
            println!("Wrote scaffolded ISA to {}", output.display());
        }
    }

    Ok(())
}
