//! Canonical string-literal form.
//!
//! Any quoted literal, single or double quoted, is rewritten to a double-quoted body where:
//!
//!     - printable ASCII stays as is, except `"` which becomes `\"`
//!     - an existing escape pair `\X` (X printable) is kept, except `\'` which becomes `'`
//!     - a lone backslash becomes `\\`
//!     - newline, tab and carriage return become `\n`, `\t`, `\r`
//!     - every other character becomes `\xHH` per UTF-8 byte
//!
//! The canonical form is a fixed point. Text that is not quoted (for instance an
//! already-substituted `#str#` label) is returned unchanged.

use std::fmt::Write;

pub fn canonical_string_literal(token: &str) -> String {
    let inner = match strip_quotes(token) {
        Some(inner) => inner,
        None => return token.to_string(),
    };

    let mut out = String::with_capacity(inner.len() + 2);
    out.push('"');
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek().copied() {
                Some('\'') => {
                    chars.next();
                    out.push('\'');
                }
                Some(next) if is_printable_ascii(next) => {
                    chars.next();
                    out.push('\\');
                    out.push(next);
                }
                _ => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if is_printable_ascii(c) => out.push(c),
            c => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    let _ = write!(out, "\\x{byte:02x}");
                }
            }
        }
    }
    out.push('"');
    out
}

fn strip_quotes(token: &str) -> Option<&str> {
    if token.len() < 2 {
        return None;
    }
    for quote in ['"', '\''] {
        if let Some(inner) = token
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return Some(inner);
        }
    }
    None
}

fn is_printable_ascii(c: char) -> bool {
    (' '..='~').contains(&c)
}
