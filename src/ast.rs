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

// Represents all possible forms an argument to an instruction or directive
// can take. Every consumer matches exhaustively over these variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Register(String),
    Immediate(i64),
    Label(String),
    /// e.g. `4(x2)` or `offset(sp)` — an offset plus a base register.
    Memory {
        offset: Box<Operand>,
        base: String,
    },
    /// Quoted string argument to a data directive.
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub mnemonic: String,
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<Operand>,
}

// Represents a single line of code, which can have a label, an instruction
// or a directive, in any combination.
#[derive(Debug, Clone, Default)]
pub struct SourceLine {
    pub line_number: usize,
    pub label: Option<String>,
    pub instruction: Option<Instruction>,
    pub directive: Option<Directive>,
}
