//! Tokenizers: raw disassembler text to a flat token stream.
//!
//! The normalizer only depends on the [Tokenizer] trait. [BaseTokenizer] is the reference
//! implementation for x86-style text:
//!
//!     1. Join: with `#start_instr#` leading the first input, all inputs are joined with a
//!        space and tokenized as one stream. Otherwise each input is tokenized separately
//!        and the joiner token (if any) is appended after each non-empty input.
//!     2. Lex: logos splits each string into lexemes (see [raw]).
//!     3. Classify: bare words become opcodes, prefixes, registers, memory sizes or branch
//!        hints (see [passes]).
//!     4. Merge split immediates.
//!     5. Promote leading instruction addresses, unless disabled by the request.

pub mod passes;
pub mod raw;

use log::trace;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::error::ConfigError;
use crate::token::{Token, TokenKind, INSTRUCTION_START_TOKEN};

/// Per-call tokenizer inputs
#[derive(Debug, Clone)]
pub struct TokenizeRequest<'a> {
    pub joiner: Option<Token>,
    pub match_instruction_address: bool,
    pub options: &'a Map<String, Value>,
}

impl<'a> TokenizeRequest<'a> {
    /// No joiner, no address matching: the text is tokenized exactly as given
    pub fn bare(options: &'a Map<String, Value>) -> Self {
        TokenizeRequest {
            joiner: None,
            match_instruction_address: false,
            options,
        }
    }
}

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, inputs: &[&str], request: &TokenizeRequest<'_>) -> Vec<Token>;

    /// Joiner used when the caller doesn't choose one
    fn default_joiner(&self) -> Option<Token> {
        Some(Token::new(TokenKind::Newline, "\n"))
    }
}

static X86_REGISTERS: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(
        r"^(?:[re]?[abcd]x|[abcd][lh]|[re]?(?:si|di|sp|bp)|(?:si|di|sp|bp)l|r(?:[89]|1[0-5])[dwb]?|[re]?ip|[cdefgs]s|[xyz]mm(?:[0-9]|[12][0-9]|3[01])|st[0-7]?|mm[0-7]|k[0-7]|cr[0-9]|dr[0-7]|[re]?flags)$",
    )
    .case_insensitive(true)
    .build()
    .unwrap()
});

const X86_PREFIXES: &[&str] = &[
    "lock", "rep", "repe", "repz", "repne", "repnz", "bnd", "notrack", "xacquire", "xrelease",
    "data16", "data32", "addr16", "addr32",
];

const X86_MEMORY_SIZES: &[&str] = &[
    "byte", "word", "dword", "fword", "qword", "tbyte", "tword", "oword", "mmword", "xmmword",
    "ymmword", "zmmword",
];

const X86_BRANCH_HINTS: &[&str] = &["pt", "pn"];

/// Word lists and patterns used to classify bare words
#[derive(Debug, Clone)]
pub struct Vocabulary {
    registers: Regex,
    prefixes: BTreeSet<String>,
    memory_sizes: BTreeSet<String>,
    branch_hints: BTreeSet<String>,
}

impl Vocabulary {
    pub fn x86() -> Self {
        Vocabulary {
            registers: X86_REGISTERS.clone(),
            prefixes: words(X86_PREFIXES),
            memory_sizes: words(X86_MEMORY_SIZES),
            branch_hints: words(X86_BRANCH_HINTS),
        }
    }

    /// Vocabulary with a custom register pattern (full-match, case-insensitive)
    pub fn with_registers(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.registers = RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(self)
    }

    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn with_memory_sizes<I, S>(mut self, sizes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.memory_sizes = sizes
            .into_iter()
            .map(|s| s.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn is_register(&self, word: &str) -> bool {
        self.registers.is_match(word)
    }

    pub fn is_prefix(&self, word: &str) -> bool {
        self.prefixes.contains(word)
    }

    pub fn is_memory_size(&self, word: &str) -> bool {
        self.memory_sizes.contains(word)
    }

    pub fn is_branch_hint(&self, word: &str) -> bool {
        self.branch_hints.contains(word)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::x86()
    }
}

fn words(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|w| w.to_string()).collect()
}

/// Reference tokenizer for x86-style disassembly
#[derive(Debug, Clone, Default)]
pub struct BaseTokenizer {
    vocabulary: Vocabulary,
}

impl BaseTokenizer {
    pub fn new(vocabulary: Vocabulary) -> Self {
        BaseTokenizer { vocabulary }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Tokens of a single string, before joining
    pub fn tokenize_one(&self, source: &str, match_instruction_address: bool) -> Vec<Token> {
        let lexemes = raw::lex(source);
        let tokens = passes::classify_words(lexemes, &self.vocabulary);
        let tokens = passes::merge_split_immediates(tokens);
        if match_instruction_address {
            passes::promote_instruction_address(tokens)
        } else {
            tokens
        }
    }
}

impl Tokenizer for BaseTokenizer {
    fn tokenize(&self, inputs: &[&str], request: &TokenizeRequest<'_>) -> Vec<Token> {
        let Some(first) = inputs.first() else {
            return Vec::new();
        };

        // Pre-split instruction streams are one stream; the markers are the boundaries.
        // Their addresses were already stripped, so a leading operand is never one.
        let joined;
        let (sources, joiner, match_address): (Vec<&str>, Option<&Token>, bool) =
            if first.trim_start().starts_with(INSTRUCTION_START_TOKEN) {
                joined = inputs.join(" ");
                (vec![joined.as_str()], None, false)
            } else {
                (
                    inputs.to_vec(),
                    request.joiner.as_ref(),
                    request.match_instruction_address,
                )
            };

        let mut tokens = Vec::new();
        for source in sources {
            let line = self.tokenize_one(source, match_address);
            if line.is_empty() {
                continue;
            }
            tokens.extend(line);
            if let Some(joiner) = joiner {
                tokens.push(joiner.clone());
            }
        }

        trace!("tokenized {} input(s) into {} token(s)", inputs.len(), tokens.len());
        tokens
    }
}
