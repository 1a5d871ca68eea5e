//! Parameterized token handlers.
//!
//! Each factory validates its parameters when constructed, so a bad threshold fails at
//! setup and never at call time.

use crate::dispatch::{Handler, HandlerResult};
use crate::error::{ConfigError, NormalizeError};
use crate::handlers::immediate::parse_immediate;
use crate::scan::TokenScan;
use crate::state::NormalizerState;
use crate::token::{TokenKind, TokenTuple, IMMEDIATE_VALUE_STR, STRING_LITERAL_STR};

/// Replace the token with a fixed label.
///
/// With `sign_aware`, tokens whose text starts with `-` become `-label`.
#[derive(Debug, Clone)]
pub struct ReplaceToken {
    label: String,
    sign_aware: bool,
}

impl ReplaceToken {
    pub fn new(label: impl Into<String>) -> Self {
        ReplaceToken {
            label: label.into(),
            sign_aware: false,
        }
    }

    /// `#immval#` with negative values kept distinguishable
    pub fn immediate() -> Self {
        Self::new(IMMEDIATE_VALUE_STR).sign_aware(true)
    }

    pub fn sign_aware(mut self, sign_aware: bool) -> Self {
        self.sign_aware = sign_aware;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Handler for ReplaceToken {
    fn handle(&self, state: &mut NormalizerState<'_>) -> HandlerResult {
        if self.sign_aware && state.text.trim_start().starts_with('-') {
            Ok(Some(format!("-{}", self.label)))
        } else {
            Ok(Some(self.label.clone()))
        }
    }
}

/// Keep small immediates as decimal, replace the rest with a label.
///
/// A value is replaced when its magnitude exceeds the threshold.
#[derive(Debug, Clone)]
pub struct ThresholdImmediate {
    threshold: u128,
    label: String,
}

impl ThresholdImmediate {
    pub const DEFAULT_THRESHOLD: i128 = 5000;

    pub fn new(threshold: i128, label: impl Into<String>) -> Result<Self, ConfigError> {
        if threshold < 0 {
            return Err(ConfigError::InvalidParameter(format!(
                "immediate threshold must be non-negative, got {threshold}"
            )));
        }
        Ok(ThresholdImmediate {
            threshold: threshold.unsigned_abs(),
            label: label.into(),
        })
    }

    pub fn threshold(&self) -> u128 {
        self.threshold
    }

    /// Whether `value` is small enough to keep
    pub fn keeps(&self, value: i128) -> bool {
        value.unsigned_abs() <= self.threshold
    }
}

impl Default for ThresholdImmediate {
    fn default() -> Self {
        ThresholdImmediate {
            threshold: Self::DEFAULT_THRESHOLD.unsigned_abs(),
            label: IMMEDIATE_VALUE_STR.to_string(),
        }
    }
}

impl Handler for ThresholdImmediate {
    fn handle(&self, state: &mut NormalizerState<'_>) -> HandlerResult {
        let value = parse_immediate(&state.text).ok_or_else(|| NormalizeError::InvalidImmediate {
            text: state.text.clone(),
        })?;
        if self.keeps(value) {
            Ok(Some(value.to_string()))
        } else {
            Ok(Some(self.label.clone()))
        }
    }
}

/// Replace string literals with a label.
///
/// With `consume_immediate`, the literal stands in for the immediate it annotates: the
/// nearest preceding immediate in the line (spacing skipped) is overwritten and nothing is
/// emitted. Without a preceding immediate the label is emitted as a normal token.
#[derive(Debug, Clone)]
pub struct ReplaceStringLiteral {
    label: String,
    consume_immediate: bool,
}

impl ReplaceStringLiteral {
    pub fn new(label: impl Into<String>) -> Self {
        ReplaceStringLiteral {
            label: label.into(),
            consume_immediate: false,
        }
    }

    pub fn consume_immediate(mut self, consume: bool) -> Self {
        self.consume_immediate = consume;
        self
    }
}

impl Default for ReplaceStringLiteral {
    fn default() -> Self {
        Self::new(STRING_LITERAL_STR).consume_immediate(true)
    }
}

impl Handler for ReplaceStringLiteral {
    fn handle(&self, state: &mut NormalizerState<'_>) -> HandlerResult {
        if self.consume_immediate {
            let scan = TokenScan::new(&[TokenKind::Immediate]).ignoring(&[TokenKind::Spacing]);
            if let Some(idx) = scan.backward(&state.line, state.line.len()) {
                state.line[idx] = TokenTuple::new(
                    TokenKind::StringLiteral,
                    self.label.clone(),
                    state.original.clone(),
                );
                return Ok(None);
            }
        }
        Ok(Some(self.label.clone()))
    }
}
