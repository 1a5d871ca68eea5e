//! Raw lexemes for disassembler text.
//!
//! The logos lexer splits a string into lexemes without deciding what a bare word is:
//! opcode, prefix, register and memory-size words all come out as [RawToken::Word] and are
//! classified afterwards by [super::passes], which knows where instructions start.
use logos::{Lexer, Logos};

use crate::token::TokenKind;

/// Deepest `<...>` nesting recognized inside disassembler info
pub const MAX_DISINFO_DEPTH: usize = 3;

#[derive(Logos, Debug, PartialEq, Eq, Clone, Copy)]
pub enum RawToken {
    // Quoted literals and the substituted literal label
    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r#"'([^'\\]|\\.)*'"#)]
    #[token("#str#")]
    StringLiteral,

    // Out-of-band annotations, possibly nested
    #[token("<", scan_disassembler_info)]
    DisassemblerInfo,

    // Structural markers
    #[token("#start_instr#")]
    InstructionStart,
    #[token("#split_imm#")]
    SplitImmediate,

    // Other labels produced by an earlier normalization pass
    #[regex(r"-?#[A-Za-z0-9_]+#")]
    Label,

    // Symbols
    #[token("+")]
    PlusSign,
    #[token("*")]
    TimesSign,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token(":")]
    Colon,

    #[regex(r"[, \t.]+")]
    Spacing,
    #[regex(r"[\n|]")]
    Newline,

    #[regex(r"-?(0[xX][0-9a-fA-F]+|0[oO][0-7]+|0[bB][01]+|[0-9]+)")]
    Immediate,

    #[regex(r"[A-Za-z_][A-Za-z0-9_@$?]*")]
    Word,
}

impl RawToken {
    /// Kind for lexemes that need no further classification
    pub fn fixed_kind(&self) -> Option<TokenKind> {
        match self {
            RawToken::StringLiteral => Some(TokenKind::StringLiteral),
            RawToken::DisassemblerInfo => Some(TokenKind::DisassemblerInfo),
            RawToken::InstructionStart => Some(TokenKind::InstructionStart),
            RawToken::SplitImmediate => Some(TokenKind::SplitImmediate),
            RawToken::PlusSign => Some(TokenKind::PlusSign),
            RawToken::TimesSign => Some(TokenKind::TimesSign),
            RawToken::OpenBracket => Some(TokenKind::OpenBracket),
            RawToken::CloseBracket => Some(TokenKind::CloseBracket),
            RawToken::Colon => Some(TokenKind::Colon),
            RawToken::Spacing => Some(TokenKind::Spacing),
            RawToken::Newline => Some(TokenKind::Newline),
            RawToken::Immediate => Some(TokenKind::Immediate),
            RawToken::Label | RawToken::Word => None,
        }
    }

    pub fn is_word(&self) -> bool {
        matches!(self, RawToken::Label | RawToken::Word)
    }
}

/// A lexeme and its source text. `raw` is `None` for text the lexer couldn't match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub raw: Option<RawToken>,
    pub text: String,
}

pub fn lex(source: &str) -> Vec<Lexeme> {
    let mut lexer = RawToken::lexer(source);
    let mut lexemes = Vec::new();

    while let Some(result) = lexer.next() {
        lexemes.push(Lexeme {
            raw: result.ok(),
            text: lexer.slice().to_string(),
        });
    }

    lexemes
}

fn scan_disassembler_info(lex: &mut Lexer<RawToken>) -> bool {
    match disinfo_end(lex.remainder().as_bytes(), 0, 1) {
        Some(end) => {
            lex.bump(end);
            true
        }
        None => false,
    }
}

/// End (exclusive) of a disassembler-info body starting at `i`, just past its closing `>`.
///
/// Quoted strings are skipped whole, so `>` inside them doesn't close the annotation. A
/// nested `<` opens a deeper annotation if one closes; otherwise it's plain text.
fn disinfo_end(s: &[u8], mut i: usize, depth: usize) -> Option<usize> {
    while i < s.len() {
        match s[i] {
            b'>' => return Some(i + 1),
            quote @ (b'"' | b'\'') => {
                i = quoted_end(s, i, quote).unwrap_or(i + 1);
            }
            b'<' if depth < MAX_DISINFO_DEPTH => {
                if let Some(inner) = disinfo_end(s, i + 1, depth + 1) {
                    if let Some(end) = disinfo_end(s, inner, depth) {
                        return Some(end);
                    }
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

fn quoted_end(s: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut i = start + 1;
    while i < s.len() {
        match s[i] {
            b'\\' => i += 2,
            c if c == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}
