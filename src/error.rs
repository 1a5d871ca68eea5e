//! Error types for normalization and normalizer setup
//!
//! Two layers:
//!     ConfigError: raised while building a normalizer or a handler factory. Never deferred
//!         to call time.
//!     NormalizeError: raised by a single normalize call. Aborts the call with no partial
//!         output.

use thiserror::Error;

/// Errors detected while configuring a normalizer or a handler factory
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Granularity string not in any known alias set
    #[error("unknown granularity '{0}'")]
    UnknownGranularity(String),

    /// Opcode pattern failed to compile
    #[error("invalid opcode pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A factory parameter is out of range
    #[error("invalid handler parameter: {0}")]
    InvalidParameter(String),

    /// A token kind name that doesn't exist
    #[error("unknown token kind '{0}'")]
    UnknownTokenKind(String),

    /// Configuration text failed to deserialize
    #[error("could not parse configuration: {0}")]
    Parse(String),
}

/// Errors raised while normalizing one batch of input strings
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The tokenizer could not classify part of the input
    #[error("mismatched token {text:?} found during normalization")]
    TokenMismatch { text: String },

    /// A token kind reached dispatch with no handler
    #[error("unknown token kind '{kind}'")]
    UnknownToken { kind: String },

    /// Strict mode only: an annotation matched no known shape
    #[error("unknown disassembler info: {info:?}")]
    UnknownDisassemblerInfo { info: String },

    /// A generic `insert` annotation did not tokenize to exactly one token
    #[error("could not tokenize insert value {text:?} into a single token (got {count})")]
    MalformedInsertion { text: String, count: usize },

    /// Immediate text that no radix accepts
    #[error("invalid immediate value {text:?}")]
    InvalidImmediate { text: String },

    #[error(transparent)]
    Configuration(#[from] ConfigError),
}
