//! Disassembler-info annotations.
//!
//! A `<...>` token carries out-of-band facts about the instruction it follows. The handler
//! never emits a token of its own; it edits the working line instead.
//!
//! Recognized shapes, tried in order
//!
//!     JSON interior:
//!         integer                           replace the preceding immediate with it
//!                                           (any width, including past 64 bits)
//!         string                            insert a canonical string literal
//!         {"immediate": v}                  replace the preceding immediate with v
//!         {"insert": v, "insert_type": k}   dispatch v as a token of kind k
//!         {"insert": v, "insert_type": false}
//!                                           append v verbatim as a string literal; it keeps
//!                                           its case, so it does not survive a round trip
//!                                           through opcode output (which lower-cases it)
//!         {"insert": v}                     tokenize v, expecting exactly one token
//!     Non-JSON interior:
//!         leading immediate ("0x10 <foo>")  replace the preceding immediate
//!         leading string literal            insert it
//!     Anything else is ignored, or rejected in strict mode.
//!
//! "Preceding immediate" means the nearest immediate at the end of the line, skipping
//! spacing and stopping at the first other token. When there is none, nothing changes.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::dispatch::{dispatch, HandlerResult, Placement};
use crate::error::NormalizeError;
use crate::handlers::immediate::parse_immediate;
use crate::scan::TokenScan;
use crate::state::NormalizerState;
use crate::string_literal::canonical_string_literal;
use crate::token::{TokenKind, TokenTuple, DISINFO_END, DISINFO_START};
use crate::tokenizer::TokenizeRequest;

static LEADING_IMMEDIATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-?(?:0[xX][0-9a-fA-F]+|0[oO][0-7]+|0[bB][01]+|[0-9]+))").unwrap()
});

static LEADING_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|#str#)"#).unwrap());

/// Default handler for [TokenKind::DisassemblerInfo]
pub fn handle_disassembler_info(state: &mut NormalizerState<'_>) -> HandlerResult {
    state.disinfo_json = None;
    let interior = interior(&state.text).to_string();

    match serde_json::from_str::<Value>(&interior) {
        Ok(json) => {
            state.disinfo_json = Some(json.clone());
            apply_json(state, &json, &interior)?;
        }
        Err(_) => apply_pattern(state, &interior)?,
    }
    Ok(None)
}

/// Text between the outer delimiters
pub fn interior(token: &str) -> &str {
    let token = token.strip_prefix(DISINFO_START).unwrap_or(token);
    token.strip_suffix(DISINFO_END).unwrap_or(token)
}

fn apply_json(
    state: &mut NormalizerState<'_>,
    json: &Value,
    interior: &str,
) -> Result<(), NormalizeError> {
    match json {
        Value::Number(n) if n.is_i64() || n.is_u64() => replace_immediate(state, &n.to_string()),
        // Integers wider than 64 bits parse as floats; keep the exact digits
        Value::Number(_) if parse_immediate(interior).is_some() => {
            replace_immediate(state, interior.trim())
        }
        Value::String(s) => {
            insert_string_literal(state, &canonical_string_literal(&format!("\"{s}\"")))
        }
        Value::Object(map) => apply_object(state, map),
        _ => {
            debug!("ignoring disassembler info {json}");
            Ok(())
        }
    }
}

fn apply_object(
    state: &mut NormalizerState<'_>,
    map: &Map<String, Value>,
) -> Result<(), NormalizeError> {
    if let Some(value) = map.get("immediate") {
        return replace_immediate(state, &json_text(value));
    }
    let Some(value) = map.get("insert") else {
        debug!("disassembler info object has no known key");
        return Ok(());
    };
    let text = json_text(value);

    match map.get("insert_type") {
        Some(Value::Bool(false)) => {
            // Verbatim: no handler runs, and the text keeps its case in the output
            state
                .line
                .push(TokenTuple::new(TokenKind::StringLiteral, text.clone(), text));
            Ok(())
        }
        Some(kind_value) => {
            let kind_name = json_text(kind_value);
            let kind = TokenKind::from_name(&kind_name)
                .ok_or(NormalizeError::UnknownToken { kind: kind_name })?;
            let text = if kind == TokenKind::StringLiteral {
                canonical_string_literal(&format!("\"{text}\""))
            } else {
                text
            };
            let mut derived = state.derive(kind, text);
            dispatch(&mut derived, Placement::Append)?;
            state.line = derived.line;
            Ok(())
        }
        None => insert_tokenized(state, &text),
    }
}

fn insert_tokenized(state: &mut NormalizerState<'_>, text: &str) -> Result<(), NormalizeError> {
    let request = TokenizeRequest::bare(&state.call.options);
    let mut tokens = state.tokenizer.tokenize(&[text], &request);
    if tokens.len() != 1 {
        return Err(NormalizeError::MalformedInsertion {
            text: text.to_string(),
            count: tokens.len(),
        });
    }
    let token = tokens.remove(0);
    let mut derived = state.derive_with_original(token.kind, token.text, text);
    dispatch(&mut derived, Placement::Append)?;
    state.line = derived.line;
    Ok(())
}

fn apply_pattern(state: &mut NormalizerState<'_>, interior: &str) -> Result<(), NormalizeError> {
    if let Some(caps) = LEADING_IMMEDIATE.captures(interior) {
        return replace_immediate(state, &caps[1]);
    }
    if let Some(caps) = LEADING_STRING.captures(interior) {
        return insert_string_literal(state, &canonical_string_literal(&caps[1]));
    }
    if state.call.strict_disassembler_info {
        return Err(NormalizeError::UnknownDisassemblerInfo {
            info: interior.to_string(),
        });
    }
    debug!("ignoring disassembler info {interior:?}");
    Ok(())
}

/// Overwrite the preceding immediate with `value`, run through the immediate handler
fn replace_immediate(state: &mut NormalizerState<'_>, value: &str) -> Result<(), NormalizeError> {
    let scan = TokenScan::new(&[TokenKind::Immediate]).ignoring(&[TokenKind::Spacing]);
    let Some(idx) = scan.backward(&state.line, state.line.len()) else {
        debug!("no immediate to replace with {value:?}");
        return Ok(());
    };
    let mut derived = state.derive(TokenKind::Immediate, value);
    dispatch(&mut derived, Placement::Replace(idx))?;
    state.line = derived.line;
    Ok(())
}

fn insert_string_literal(
    state: &mut NormalizerState<'_>,
    literal: &str,
) -> Result<(), NormalizeError> {
    let mut derived = state.derive(TokenKind::StringLiteral, literal);
    dispatch(&mut derived, Placement::Append)?;
    state.line = derived.line;
    Ok(())
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
