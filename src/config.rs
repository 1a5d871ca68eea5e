//! Declarative normalizer configuration.
//!
//! The same settings the builder exposes, as data. Handlers are limited to the built-ins
//! that can be described without code; anything custom goes through [NormalizerBuilder]
//! directly.
//!
//! Example (YAML)
//!
//!     token_sep: " "
//!     granularity: instruction
//!     anonymize: false
//!     token_handlers:
//!       immediate: { type: threshold, threshold: 5000, label: "#immval#" }
//!       string_literal: { type: replace_string_literal, label: "#str#" }
//!     opcode_handlers:
//!       - pattern: "j.*"
//!         handler: { type: replace_operand, label: "#jmpdst#" }
//!       - pattern: call
//!         exact: true
//!         handler: { type: call_site, special_functions: [printf, malloc] }

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dispatch::TokenHandler;
use crate::error::ConfigError;
use crate::handlers::defaults::{drop_token, pass_through};
use crate::handlers::{ReplaceStringLiteral, ReplaceToken, ThresholdImmediate};
use crate::normalizer::{Normalizer, NormalizerBuilder, DEFAULT_TOKEN_SEP};
use crate::opcode::{
    CallSiteClassifier, MemoryExpressionFold, OpcodeHandler, OpcodePattern, ReplaceOperand,
    ThresholdOperands,
};
use crate::token::{
    TokenKind, IMMEDIATE_VALUE_STR, MEMORY_EXPRESSION_STR, STRING_LITERAL_STR,
};
use crate::tokenizer::Tokenizer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizerConfig {
    pub token_sep: String,
    pub granularity: String,
    pub anonymize: bool,
    /// Keyed by token kind name (`immediate`, `string_literal`, ...)
    pub token_handlers: BTreeMap<String, BuiltinTokenHandler>,
    pub opcode_handlers: Vec<OpcodeHandlerConfig>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            token_sep: DEFAULT_TOKEN_SEP.to_string(),
            granularity: "auto".to_string(),
            anonymize: false,
            token_handlers: BTreeMap::new(),
            opcode_handlers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpcodeHandlerConfig {
    pub pattern: String,
    /// Treat `pattern` as an exact opcode instead of a regex
    #[serde(default)]
    pub exact: bool,
    pub handler: BuiltinOpcodeHandler,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuiltinTokenHandler {
    Ignore,
    PassThrough,
    Replace {
        label: String,
        #[serde(default)]
        sign_aware: bool,
    },
    Threshold {
        #[serde(default = "default_threshold")]
        threshold: i64,
        #[serde(default = "default_immediate_label")]
        label: String,
    },
    ReplaceStringLiteral {
        #[serde(default = "default_string_label")]
        label: String,
        #[serde(default = "default_true")]
        consume_immediate: bool,
    },
    FoldMemory {
        #[serde(default = "default_memory_label")]
        label: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuiltinOpcodeHandler {
    ReplaceOperand {
        label: String,
        #[serde(default)]
        keep_sign: bool,
        #[serde(default)]
        any_kind: bool,
    },
    ThresholdOperands {
        #[serde(default = "default_threshold")]
        threshold: i64,
        #[serde(default = "default_immediate_label")]
        label: String,
    },
    CallSite {
        #[serde(default)]
        special_functions: Vec<String>,
        #[serde(default)]
        libc: bool,
    },
    FoldMemory {
        #[serde(default = "default_memory_label")]
        label: String,
    },
}

fn default_threshold() -> i64 {
    ThresholdImmediate::DEFAULT_THRESHOLD as i64
}

fn default_immediate_label() -> String {
    IMMEDIATE_VALUE_STR.to_string()
}

fn default_string_label() -> String {
    STRING_LITERAL_STR.to_string()
}

fn default_memory_label() -> String {
    MEMORY_EXPRESSION_STR.to_string()
}

fn default_true() -> bool {
    true
}

impl BuiltinTokenHandler {
    pub fn build(&self) -> Result<TokenHandler, ConfigError> {
        let handler: TokenHandler = match self {
            BuiltinTokenHandler::Ignore => Arc::new(drop_token),
            BuiltinTokenHandler::PassThrough => Arc::new(pass_through),
            BuiltinTokenHandler::Replace { label, sign_aware } => {
                Arc::new(ReplaceToken::new(label.clone()).sign_aware(*sign_aware))
            }
            BuiltinTokenHandler::Threshold { threshold, label } => {
                Arc::new(ThresholdImmediate::new(i128::from(*threshold), label.clone())?)
            }
            BuiltinTokenHandler::ReplaceStringLiteral {
                label,
                consume_immediate,
            } => Arc::new(
                ReplaceStringLiteral::new(label.clone()).consume_immediate(*consume_immediate),
            ),
            BuiltinTokenHandler::FoldMemory { label } => {
                Arc::new(MemoryExpressionFold::new(label.clone()))
            }
        };
        Ok(handler)
    }
}

impl BuiltinOpcodeHandler {
    pub fn build(&self) -> Result<Arc<dyn OpcodeHandler>, ConfigError> {
        let handler: Arc<dyn OpcodeHandler> = match self {
            BuiltinOpcodeHandler::ReplaceOperand {
                label,
                keep_sign,
                any_kind,
            } => Arc::new(
                ReplaceOperand::new(label.clone())
                    .keep_sign(*keep_sign)
                    .any_kind(*any_kind),
            ),
            BuiltinOpcodeHandler::ThresholdOperands { threshold, label } => {
                Arc::new(ThresholdOperands::new(i128::from(*threshold), label.clone())?)
            }
            BuiltinOpcodeHandler::CallSite {
                special_functions,
                libc,
            } => {
                let mut classifier =
                    CallSiteClassifier::new().with_special_functions(special_functions.iter().cloned());
                if *libc {
                    classifier = classifier.with_libc_functions();
                }
                Arc::new(classifier)
            }
            BuiltinOpcodeHandler::FoldMemory { label } => {
                Arc::new(MemoryExpressionFold::new(label.clone()))
            }
        };
        Ok(handler)
    }
}

impl NormalizerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Builder carrying every setting in this configuration
    pub fn into_builder(self, tokenizer: Arc<dyn Tokenizer>) -> Result<NormalizerBuilder, ConfigError> {
        let granularity = self.granularity.parse()?;
        let mut builder = NormalizerBuilder::new(tokenizer)
            .token_sep(self.token_sep)
            .granularity(granularity)
            .anonymize(self.anonymize);

        for (name, handler) in &self.token_handlers {
            let kind: TokenKind = name.parse()?;
            builder = builder.shared_token_handler(kind, handler.build()?);
        }

        for entry in &self.opcode_handlers {
            let pattern = if entry.exact {
                OpcodePattern::exact(entry.pattern.clone())
            } else {
                OpcodePattern::regex(&entry.pattern)?
            };
            builder = builder.shared_opcode_handler(pattern, entry.handler.build()?);
        }

        Ok(builder)
    }

    pub fn build(self, tokenizer: Arc<dyn Tokenizer>) -> Result<Normalizer, ConfigError> {
        self.into_builder(tokenizer)?.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalize::Granularity;
    use crate::state::CallOptions;
    use crate::tokenizer::BaseTokenizer;

    fn tokenizer() -> Arc<dyn Tokenizer> {
        Arc::new(BaseTokenizer::default())
    }

    #[test]
    fn test_defaults() {
        let config = NormalizerConfig::from_json("{}").unwrap();
        assert_eq!(config, NormalizerConfig::default());
        let normalizer = config.build(tokenizer()).unwrap();
        assert_eq!(normalizer.granularity(), Granularity::Instruction);
        assert_eq!(normalizer.token_sep(), " ");
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r##"
token_sep: "_"
granularity: lines
token_handlers:
  immediate: { type: threshold, threshold: 100 }
opcode_handlers:
  - pattern: "j.*"
    handler: { type: replace_operand, label: "#jmpdst#" }
"##;
        let config = NormalizerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.opcode_handlers.len(), 1);
        let normalizer = config.build(tokenizer()).unwrap();
        let lines = normalizer
            .normalize(&["mov eax, 0x64", "mov eax, 0x65", "jmp 0x401000"], &CallOptions::default())
            .unwrap();
        assert_eq!(lines, vec!["mov_eax_100", "mov_eax_#immval#", "jmp_#jmpdst#"]);
    }

    #[test]
    fn test_json_config() {
        let json = r##"{
            "granularity": "op",
            "token_handlers": {
                "string_literal": {"type": "replace_string_literal"}
            },
            "opcode_handlers": [
                {"pattern": "call", "exact": true, "handler": {"type": "call_site"}}
            ]
        }"##;
        let normalizer = NormalizerConfig::from_json(json)
            .unwrap()
            .build(tokenizer())
            .unwrap();
        assert_eq!(normalizer.opcode_handlers().patterns(), vec!["call"]);
        let lines = normalizer
            .normalize(&["call 0x401000"], &CallOptions::default())
            .unwrap();
        assert_eq!(lines, vec!["#start_instr#", "call", "#func#"]);
    }

    #[test]
    fn test_config_errors() {
        assert!(matches!(
            NormalizerConfig::from_json(r#"{"granularity": "words"}"#)
                .unwrap()
                .build(tokenizer()),
            Err(ConfigError::UnknownGranularity(_))
        ));
        assert!(matches!(
            NormalizerConfig::from_json(r#"{"token_handlers": {"label": {"type": "ignore"}}}"#)
                .unwrap()
                .build(tokenizer()),
            Err(ConfigError::UnknownTokenKind(_))
        ));
        assert!(matches!(
            NormalizerConfig::from_json(
                r#"{"token_handlers": {"immediate": {"type": "threshold", "threshold": -1}}}"#
            )
            .unwrap()
            .build(tokenizer()),
            Err(ConfigError::InvalidParameter(_))
        ));
        assert!(matches!(
            NormalizerConfig::from_json(
                r#"{"opcode_handlers": [{"pattern": "j(", "handler": {"type": "fold_memory"}}]}"#
            )
            .unwrap()
            .build(tokenizer()),
            Err(ConfigError::InvalidPattern { .. })
        ));
        assert!(matches!(
            NormalizerConfig::from_json(r#"{"unknown_key": 1}"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
