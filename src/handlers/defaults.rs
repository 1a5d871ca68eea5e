//! Default token handlers.
//!
//! Structural kinds (spacing, newlines, instruction addresses) are dropped, immediates are
//! rewritten to signed decimal, string literals are canonicalized, disassembler info is
//! applied to the line, mismatches abort the call. Split immediates, memory expressions and
//! segment addresses have no default. Everything else passes through.

use crate::dispatch::{HandlerResult, HandlerTable};
use crate::disinfo::handle_disassembler_info;
use crate::error::NormalizeError;
use crate::handlers::immediate::immediate_to_decimal;
use crate::state::NormalizerState;
use crate::string_literal::canonical_string_literal;
use crate::token::TokenKind;

pub fn pass_through(state: &mut NormalizerState<'_>) -> HandlerResult {
    Ok(Some(state.text.clone()))
}

pub fn drop_token(_state: &mut NormalizerState<'_>) -> HandlerResult {
    Ok(None)
}

pub fn handle_immediate(state: &mut NormalizerState<'_>) -> HandlerResult {
    immediate_to_decimal(&state.text).map(Some)
}

pub fn handle_string_literal(state: &mut NormalizerState<'_>) -> HandlerResult {
    Ok(Some(canonical_string_literal(&state.text)))
}

pub fn handle_mismatch(state: &mut NormalizerState<'_>) -> HandlerResult {
    Err(NormalizeError::TokenMismatch {
        text: state.text.clone(),
    })
}

/// Handler table for every kind the reference tokenizer can emit
pub fn default_table() -> HandlerTable {
    let mut table = HandlerTable::new();
    for kind in TokenKind::ALL {
        match kind {
            TokenKind::Spacing | TokenKind::Newline | TokenKind::InstructionAddress => {
                table.insert(kind, drop_token)
            }
            TokenKind::Immediate => table.insert(kind, handle_immediate),
            TokenKind::StringLiteral => table.insert(kind, handle_string_literal),
            TokenKind::DisassemblerInfo => table.insert(kind, handle_disassembler_info),
            TokenKind::Mismatch => table.insert(kind, handle_mismatch),
            // Structural: the dispatcher never consults the table for it
            TokenKind::InstructionStart => {}
            // Only produced by handlers or custom tokenizers, which must bring their own
            TokenKind::SplitImmediate
            | TokenKind::MemoryExpression
            | TokenKind::SegmentAddress => {}
            _ => table.insert(kind, pass_through),
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{dispatch, Placement};
    use crate::state::CallOptions;
    use crate::tokenizer::BaseTokenizer;

    fn run(kind: TokenKind, text: &str) -> HandlerResult {
        let tokenizer = BaseTokenizer::default();
        let handlers = default_table();
        let call = CallOptions::default();
        let raw: Vec<&str> = vec![text];
        let mut state = NormalizerState::new(&raw, &tokenizer, &handlers, &call);
        state.set_token(kind, text);
        dispatch(&mut state, Placement::Detached)
    }

    #[test]
    fn test_default_table_coverage() {
        let table = default_table();
        for kind in TokenKind::ALL {
            let expected = !matches!(
                kind,
                TokenKind::InstructionStart
                    | TokenKind::SplitImmediate
                    | TokenKind::MemoryExpression
                    | TokenKind::SegmentAddress
            );
            assert_eq!(table.contains(kind), expected, "{kind}");
        }
    }

    #[test]
    fn test_structural_tokens_dropped() {
        assert_eq!(run(TokenKind::Spacing, ", ").unwrap(), None);
        assert_eq!(run(TokenKind::Newline, "\n").unwrap(), None);
        assert_eq!(run(TokenKind::InstructionAddress, "0x401000:").unwrap(), None);
    }

    #[test]
    fn test_pass_through_kinds() {
        assert_eq!(run(TokenKind::Opcode, "MOV").unwrap().as_deref(), Some("MOV"));
        assert_eq!(run(TokenKind::OpenBracket, "[").unwrap().as_deref(), Some("["));
        assert_eq!(
            run(TokenKind::MemorySize, "qword ptr").unwrap().as_deref(),
            Some("qword ptr")
        );
    }

    #[test]
    fn test_immediate_and_string_defaults() {
        assert_eq!(run(TokenKind::Immediate, "-0x20").unwrap().as_deref(), Some("-32"));
        assert_eq!(
            run(TokenKind::StringLiteral, "'hi'").unwrap().as_deref(),
            Some("\"hi\"")
        );
    }

    #[test]
    fn test_kinds_without_default_are_unknown() {
        for kind in [
            TokenKind::SplitImmediate,
            TokenKind::MemoryExpression,
            TokenKind::SegmentAddress,
        ] {
            let err = run(kind, "x").unwrap_err();
            assert!(
                matches!(&err, NormalizeError::UnknownToken { kind: name } if name == kind.name()),
                "{kind}: {err}"
            );
        }
    }

    #[test]
    fn test_mismatch_aborts() {
        let err = run(TokenKind::Mismatch, "~").unwrap_err();
        assert!(matches!(err, NormalizeError::TokenMismatch { text } if text == "~"));
    }
}
