//! Line finalization: opcode pass, case folding and stringification.
//!
//! Granularity
//!
//!     Instruction: one output string per instruction, tokens joined with the separator.
//!     Opcode:      one output string per token, each instruction preceded by the
//!                  `#start_instr#` marker.
//!     Auto:        resolved by the normalizer when it is built (instruction).
//!
//! String literals keep their case, every other token is lower-cased.

use log::debug;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, NormalizeError};
use crate::opcode::OpcodeRegistry;
use crate::state::NormalizerState;
use crate::token::{TokenKind, TokenTuple, INSTRUCTION_START_TOKEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Instruction,
    Opcode,
    #[default]
    Auto,
}

impl Granularity {
    pub const OPCODE_ALIASES: &'static [&'static str] =
        &["op", "opcode", "operand", "opcodes", "operands"];
    pub const INSTRUCTION_ALIASES: &'static [&'static str] =
        &["inst", "instruction", "line", "instructions", "lines"];
    pub const AUTO_ALIASES: &'static [&'static str] = &["auto", "automatic", "default"];

    /// Replace `Auto` with the concrete default
    pub fn resolve(self) -> Granularity {
        match self {
            Granularity::Auto => Granularity::Instruction,
            other => other,
        }
    }
}

impl FromStr for Granularity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        if Self::OPCODE_ALIASES.contains(&key.as_str()) {
            Ok(Granularity::Opcode)
        } else if Self::INSTRUCTION_ALIASES.contains(&key.as_str()) {
            Ok(Granularity::Instruction)
        } else if Self::AUTO_ALIASES.contains(&key.as_str()) {
            Ok(Granularity::Auto)
        } else {
            Err(ConfigError::UnknownGranularity(s.to_string()))
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Instruction => "instruction",
            Granularity::Opcode => "opcode",
            Granularity::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// Renders completed lines into output strings
#[derive(Debug, Clone)]
pub struct Stringifier {
    separator: String,
    granularity: Granularity,
}

impl Stringifier {
    pub fn new(separator: impl Into<String>, granularity: Granularity) -> Self {
        Stringifier {
            separator: separator.into(),
            granularity: granularity.resolve(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn render(&self, line: &[TokenTuple]) -> Vec<String> {
        let texts = line.iter().map(case_folded);
        match self.granularity {
            Granularity::Opcode => std::iter::once(INSTRUCTION_START_TOKEN.to_string())
                .chain(texts)
                .collect(),
            _ => vec![texts.collect::<Vec<_>>().join(&self.separator)],
        }
    }
}

fn case_folded(token: &TokenTuple) -> String {
    if token.kind == TokenKind::StringLiteral {
        token.text.clone()
    } else {
        token.text.to_lowercase()
    }
}

/// Close out the working line: run opcode handlers, render, append to the output.
///
/// An empty line produces no output.
pub fn finalize_instruction(
    state: &mut NormalizerState<'_>,
    opcodes: &OpcodeRegistry,
    stringifier: &Stringifier,
) -> Result<(), NormalizeError> {
    if state.line.is_empty() {
        return Ok(());
    }
    opcodes.apply(state)?;
    let rendered = stringifier.render(&state.line);
    debug!("finalized {} token(s) into {:?}", state.line.len(), rendered);
    state.normalized_lines.extend(rendered);
    state.line.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("op", Granularity::Opcode)]
    #[case("Operands", Granularity::Opcode)]
    #[case("line", Granularity::Instruction)]
    #[case("INSTRUCTIONS", Granularity::Instruction)]
    #[case("automatic", Granularity::Auto)]
    #[case(" default ", Granularity::Auto)]
    fn test_granularity_aliases(#[case] name: &str, #[case] expected: Granularity) {
        assert_eq!(name.parse::<Granularity>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_granularity() {
        let err = "words".parse::<Granularity>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownGranularity(name) if name == "words"));
    }

    #[test]
    fn test_auto_resolves_to_instruction() {
        assert_eq!(Granularity::Auto.resolve(), Granularity::Instruction);
        assert_eq!(
            Stringifier::new(" ", Granularity::Auto).granularity(),
            Granularity::Instruction
        );
    }

    fn sample_line() -> Vec<TokenTuple> {
        vec![
            TokenTuple::new(TokenKind::Opcode, "MOV", "MOV"),
            TokenTuple::new(TokenKind::Register, "EAX", "EAX"),
            TokenTuple::new(TokenKind::StringLiteral, "\"Hi\"", "'Hi'"),
        ]
    }

    #[test]
    fn test_render_instruction() {
        let rendered = Stringifier::new(" ", Granularity::Instruction).render(&sample_line());
        assert_eq!(rendered, vec!["mov eax \"Hi\""]);

        let rendered = Stringifier::new("_", Granularity::Instruction).render(&sample_line());
        assert_eq!(rendered, vec!["mov_eax_\"Hi\""]);
    }

    #[test]
    fn test_render_opcode() {
        let rendered = Stringifier::new(" ", Granularity::Opcode).render(&sample_line());
        assert_eq!(rendered, vec!["#start_instr#", "mov", "eax", "\"Hi\""]);
    }
}
