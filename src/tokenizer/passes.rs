//! Token-stream passes applied after raw lexing.
//!
//! Passes
//!
//!     classify_words:            words become prefixes, opcodes, registers, memory sizes or
//!                                branch hints depending on position and vocabulary
//!     merge_split_immediates:    `#split_imm#` followed by immediates becomes one immediate
//!     promote_instruction_address:
//!                                a leading positive immediate (plus an optional colon)
//!                                becomes an instruction address
use crate::handlers::immediate::parse_immediate;
use crate::scan::TokenScan;
use crate::token::{Token, TokenKind};
use crate::tokenizer::raw::{Lexeme, RawToken};
use crate::tokenizer::Vocabulary;

/// Turn lexemes into tokens, deciding what each bare word is.
///
/// The first word of an instruction is its opcode, unless it is a prefix (which keeps the
/// opcode slot open) or a register or memory size. Later words are operands. Non-word
/// tokens such as a leading address don't take the opcode slot.
pub fn classify_words(lexemes: Vec<Lexeme>, vocabulary: &Vocabulary) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(lexemes.len());
    let mut at_start = true;
    let mut i = 0;

    while i < lexemes.len() {
        let lexeme = &lexemes[i];
        let raw = match lexeme.raw {
            Some(raw) => raw,
            None => {
                tokens.push(Token::new(TokenKind::Mismatch, lexeme.text.clone()));
                i += 1;
                continue;
            }
        };

        if let Some(kind) = raw.fixed_kind() {
            if kind.is_instruction_boundary() {
                at_start = true;
            }
            tokens.push(Token::new(kind, lexeme.text.clone()));
            i += 1;
            continue;
        }

        let word = lexeme.text.to_ascii_lowercase();
        if vocabulary.is_memory_size(&word) {
            let end = ptr_suffix(&lexemes, i).unwrap_or(i);
            let text: String = lexemes[i..=end].iter().map(|l| l.text.as_str()).collect();
            tokens.push(Token::new(TokenKind::MemorySize, text));
            at_start = false;
            i = end + 1;
            continue;
        }

        let kind = if vocabulary.is_register(&word) {
            TokenKind::Register
        } else if at_start && vocabulary.is_prefix(&word) {
            TokenKind::InstructionPrefix
        } else if at_start {
            TokenKind::Opcode
        } else if vocabulary.is_branch_hint(&word) {
            TokenKind::BranchPrediction
        } else {
            TokenKind::Register
        };
        at_start = kind == TokenKind::InstructionPrefix;
        tokens.push(Token::new(kind, lexeme.text.clone()));
        i += 1;
    }

    tokens
}

/// Index of a `ptr` word following the memory-size word at `i`, spacing allowed between
fn ptr_suffix(lexemes: &[Lexeme], i: usize) -> Option<usize> {
    let j = (i + 1..lexemes.len()).find(|&j| lexemes[j].raw != Some(RawToken::Spacing))?;
    let lexeme = &lexemes[j];
    (lexeme.raw == Some(RawToken::Word) && lexeme.text.eq_ignore_ascii_case("ptr")).then_some(j)
}

/// Concatenate the immediates following each `#split_imm#` marker into one immediate.
///
/// Spacing between the pieces is dropped. A marker with no immediates after it is dropped.
pub fn merge_split_immediates(tokens: Vec<Token>) -> Vec<Token> {
    if !tokens.iter().any(|t| t.kind == TokenKind::SplitImmediate) {
        return tokens;
    }

    let scan = TokenScan::new(&[TokenKind::Immediate]).ignoring(&[TokenKind::Spacing]);
    let mut merged = Vec::with_capacity(tokens.len());
    let mut idx = 0;
    while idx < tokens.len() {
        if tokens[idx].kind != TokenKind::SplitImmediate {
            merged.push(tokens[idx].clone());
            idx += 1;
            continue;
        }
        let pieces = scan.forward_all(&tokens, idx + 1);
        let Some(&last) = pieces.last() else {
            idx += 1;
            continue;
        };
        let text: String = pieces.iter().map(|&p| tokens[p].text.as_str()).collect();
        merged.push(Token::new(TokenKind::Immediate, text));
        idx = last + 1;
    }
    merged
}

/// Promote leading instruction addresses.
///
/// At the start of the stream and after every instruction boundary, a positive immediate
/// (spacing allowed before it) becomes an [TokenKind::InstructionAddress]. A colon that
/// directly follows, spacing allowed, is absorbed into the address.
pub fn promote_instruction_address(tokens: Vec<Token>) -> Vec<Token> {
    let imm_scan = TokenScan::new(&[TokenKind::Immediate]).ignoring(&[TokenKind::Spacing]);
    let colon_scan = TokenScan::new(&[TokenKind::Colon]).ignoring(&[TokenKind::Spacing]);

    let mut promoted = Vec::with_capacity(tokens.len());
    let mut idx = 0;
    while idx < tokens.len() {
        let kind = tokens[idx].kind;
        let boundary = kind.is_instruction_boundary();

        if idx == 0 || boundary {
            let start = if boundary { idx + 1 } else { idx };
            let address = imm_scan
                .forward(&tokens, start)
                .filter(|&a| parse_immediate(&tokens[a].text).is_some_and(|v| v > 0));

            if let Some(address) = address {
                let mut parts = vec![address];
                if let Some(colon) = colon_scan.forward(&tokens, address + 1) {
                    parts.push(colon);
                }
                // Boundary and leading spacing stay; the address replaces the rest
                let keep_from = if boundary || kind == TokenKind::Spacing {
                    idx
                } else {
                    idx + 1
                };
                promoted.extend(tokens[keep_from.min(address)..address].iter().cloned());
                let text: String = parts.iter().map(|&p| tokens[p].text.as_str()).collect();
                promoted.push(Token::new(TokenKind::InstructionAddress, text));
                idx = parts[parts.len() - 1] + 1;
                continue;
            }
        }

        promoted.push(tokens[idx].clone());
        idx += 1;
    }
    promoted
}
