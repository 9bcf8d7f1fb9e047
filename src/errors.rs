use std::fmt;
use thiserror::Error;

/// Where in the source an error was detected. Column and file are filled in
/// when the stage that raised the error still knows them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: Option<String>,
    pub line: usize,
    pub column: Option<usize>,
}

impl SourceLoc {
    pub fn line(line: usize) -> Self {
        SourceLoc {
            file: None,
            line,
            column: None,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:", file)?;
        }
        write!(f, "line {}", self.line)?;
        if let Some(col) = self.column {
            write!(f, ":{}", col)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum AssemblyError {
    #[error("Syntax error ({loc}): {reason}")]
    ParseSyntax { loc: SourceLoc, reason: String },

    #[error("Unknown mnemonic \"{mnemonic}\" ({loc})")]
    UnknownMnemonic { loc: SourceLoc, mnemonic: String },

    #[error("Unknown register \"{name}\" ({loc})")]
    UnknownRegister { loc: SourceLoc, name: String },

    #[error("Unknown directive \"{name}\" ({loc})")]
    UnknownDirective { loc: SourceLoc, name: String },

    #[error("{mnemonic} expects {expected} operand(s), found {found} ({loc})")]
    OperandArityMismatch {
        loc: SourceLoc,
        mnemonic: String,
        expected: usize,
        found: usize,
    },

    #[error("Operand \"{operand}\" of {mnemonic} should be {expected} ({loc})")]
    OperandTypeMismatch {
        loc: SourceLoc,
        mnemonic: String,
        operand: String,
        expected: String,
    },

    #[error("Value {value} does not fit field \"{field}\" (width {width}, signed {signed}) ({loc})")]
    ImmediateOutOfRange {
        loc: SourceLoc,
        field: String,
        width: u32,
        signed: bool,
        value: i64,
    },

    #[error("Address {value:#x} does not fit in {width} bits ({loc})")]
    AddressOutOfRange {
        loc: SourceLoc,
        width: u32,
        value: i64,
    },

    #[error("Undefined symbol \"{name}\" ({loc})")]
    UndefinedSymbol { loc: SourceLoc, name: String },

    #[error("Symbol \"{name}\" redefined ({loc})")]
    SymbolRedefinition { loc: SourceLoc, name: String },

    #[error("Cannot expand {mnemonic}: target {target:#x} exceeds the expansion's bit budget ({loc})")]
    PseudoExpansionOverflow {
        loc: SourceLoc,
        mnemonic: String,
        target: i64,
    },

    #[error("Expansion of {mnemonic} reconstructs {got:#x}, wanted {target:#x} ({loc})")]
    PseudoExpansionInexact {
        loc: SourceLoc,
        mnemonic: String,
        target: i64,
        got: i64,
    },

    #[error("Bad argument to {directive} ({loc}): {reason}")]
    DirectiveArgument {
        loc: SourceLoc,
        directive: String,
        reason: String,
    },

    #[error("Malformed container: {reason}")]
    ContainerMalformed { reason: String },

    #[error("Unsupported container version {version}")]
    ContainerVersionUnsupported { version: u32 },
}

/// Everything that went wrong during one assembly run. The driver collects
/// errors across a pass instead of stopping at the first one.
#[derive(Debug, PartialEq)]
pub struct AssemblyFailure {
    pub errors: Vec<AssemblyError>,
}

impl std::error::Error for AssemblyFailure {}

impl fmt::Display for AssemblyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error(s):", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "  {}", err)?;
        }
        Ok(())
    }
}

impl From<AssemblyError> for AssemblyFailure {
    fn from(err: AssemblyError) -> Self {
        AssemblyFailure { errors: vec![err] }
    }
}

/// Problems with the ISA description itself, reported by `Isa::validate`.
#[derive(Error, Debug, PartialEq)]
pub enum IsaError {
    #[error("Invalid bit specification \"{spec}\": {reason}")]
    BadBitSpec { spec: String, reason: String },

    #[error("ISA definition error: {reason}")]
    Definition { reason: String },

    #[error("Instruction {mnemonic}: {reason}")]
    Instruction { mnemonic: String, reason: String },
}
