//! Token kinds and the token records passed between tokenizer and normalizer.
//!
//! Token Layers
//!
//!     Raw Tokens:
//!         `Token { kind, text }` pairs produced by a [Tokenizer](crate::tokenizer::Tokenizer).
//!         These include structural markers (Spacing, Newline, InstructionStart) that never
//!         reach the output.
//!
//!     Line Tokens:
//!         `TokenTuple { kind, text, original }` records kept in the working line while an
//!         instruction is being normalized. `text` is the handler output, `original` the
//!         source text, so multi-token handlers can rebuild the exact source span.
//!
//!     Special Tokens:
//!         Strings wrapped in `#` (see [SPECIAL_TOKEN_DESIGNATOR]) are labels inserted by
//!         normalization (`#immval#`, `#memexpr#`, ...) or structural markers
//!         (`#start_instr#`). They can't collide with real instruction text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const SPECIAL_TOKEN_DESIGNATOR: char = '#';

/// Marker emitted before each instruction at opcode granularity
pub const INSTRUCTION_START_TOKEN: &str = "#start_instr#";

pub const STRING_LITERAL_STR: &str = "#str#";
pub const IMMEDIATE_VALUE_STR: &str = "#immval#";
pub const FUNCTION_CALL_STR: &str = "#func#";
pub const RECURSIVE_FUNCTION_CALL_STR: &str = "#self#";
pub const INTERNAL_FUNCTION_CALL_STR: &str = "#innerfunc#";
pub const EXTERNAL_FUNCTION_CALL_STR: &str = "#externfunc#";
pub const MULTI_FUNCTION_CALL_STR: &str = "#multifunc#";
pub const JUMP_DESTINATION_STR: &str = "#jmpdst#";
pub const MEMORY_EXPRESSION_STR: &str = "#memexpr#";

/// Delimiters around disassembler info
pub const DISINFO_START: char = '<';
pub const DISINFO_END: char = '>';

/// Closed set of token kinds.
///
/// The serialized names are the ones accepted by configuration files and by the
/// `insert_type` key of disassembler-info annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TokenKind {
    #[serde(rename = "inst_addr")]
    InstructionAddress,
    #[serde(rename = "inst_start")]
    InstructionStart,
    #[serde(rename = "split_imm")]
    SplitImmediate,
    #[serde(rename = "disassembler_info")]
    DisassemblerInfo,
    #[serde(rename = "newline")]
    Newline,
    #[serde(rename = "spacing")]
    Spacing,

    #[serde(rename = "open_bracket")]
    OpenBracket,
    #[serde(rename = "close_bracket")]
    CloseBracket,
    #[serde(rename = "plus_sign")]
    PlusSign,
    #[serde(rename = "times_sign")]
    TimesSign,
    #[serde(rename = "colon")]
    Colon,

    #[serde(rename = "prefix")]
    InstructionPrefix,
    #[serde(rename = "opcode")]
    Opcode,
    #[serde(rename = "register")]
    Register,
    #[serde(rename = "immediate")]
    Immediate,

    #[serde(rename = "memory_size")]
    MemorySize,
    #[serde(rename = "memory_expression")]
    MemoryExpression,
    #[serde(rename = "branch_prediction")]
    BranchPrediction,
    #[serde(rename = "string_literal")]
    StringLiteral,
    #[serde(rename = "segment_address")]
    SegmentAddress,

    #[serde(rename = "mismatch")]
    Mismatch,
}

impl TokenKind {
    pub const ALL: [TokenKind; 21] = [
        TokenKind::InstructionAddress,
        TokenKind::InstructionStart,
        TokenKind::SplitImmediate,
        TokenKind::DisassemblerInfo,
        TokenKind::Newline,
        TokenKind::Spacing,
        TokenKind::OpenBracket,
        TokenKind::CloseBracket,
        TokenKind::PlusSign,
        TokenKind::TimesSign,
        TokenKind::Colon,
        TokenKind::InstructionPrefix,
        TokenKind::Opcode,
        TokenKind::Register,
        TokenKind::Immediate,
        TokenKind::MemorySize,
        TokenKind::MemoryExpression,
        TokenKind::BranchPrediction,
        TokenKind::StringLiteral,
        TokenKind::SegmentAddress,
        TokenKind::Mismatch,
    ];

    /// Stable snake_case name of this kind
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::InstructionAddress => "inst_addr",
            TokenKind::InstructionStart => "inst_start",
            TokenKind::SplitImmediate => "split_imm",
            TokenKind::DisassemblerInfo => "disassembler_info",
            TokenKind::Newline => "newline",
            TokenKind::Spacing => "spacing",
            TokenKind::OpenBracket => "open_bracket",
            TokenKind::CloseBracket => "close_bracket",
            TokenKind::PlusSign => "plus_sign",
            TokenKind::TimesSign => "times_sign",
            TokenKind::Colon => "colon",
            TokenKind::InstructionPrefix => "prefix",
            TokenKind::Opcode => "opcode",
            TokenKind::Register => "register",
            TokenKind::Immediate => "immediate",
            TokenKind::MemorySize => "memory_size",
            TokenKind::MemoryExpression => "memory_expression",
            TokenKind::BranchPrediction => "branch_prediction",
            TokenKind::StringLiteral => "string_literal",
            TokenKind::SegmentAddress => "segment_address",
            TokenKind::Mismatch => "mismatch",
        }
    }

    /// Look up a kind by its snake_case name
    pub fn from_name(name: &str) -> Option<TokenKind> {
        TokenKind::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Kinds that end the current instruction
    pub fn is_instruction_boundary(&self) -> bool {
        matches!(self, TokenKind::Newline | TokenKind::InstructionStart)
    }

    /// Kinds the dispatcher skips without consulting the handler table
    pub fn is_ignorable(&self) -> bool {
        matches!(self, TokenKind::InstructionStart)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TokenKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenKind::from_name(s).ok_or_else(|| ConfigError::UnknownTokenKind(s.to_string()))
    }
}

/// A classified source fragment as produced by a tokenizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Token {
            kind,
            text: text.into(),
        }
    }
}

/// One entry of the working line: kind, normalized text, original source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTuple {
    pub kind: TokenKind,
    pub text: String,
    pub original: String,
}

impl TokenTuple {
    pub fn new(kind: TokenKind, text: impl Into<String>, original: impl Into<String>) -> Self {
        TokenTuple {
            kind,
            text: text.into(),
            original: original.into(),
        }
    }
}
