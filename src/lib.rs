//! # insn-norm
//!
//! Normalizer for disassembled instruction streams.
//!
//! Raw disassembler text (plus out-of-band `<...>` annotations) goes in, a canonical
//! list of instruction strings comes out. The pipeline is:
//!
//!     Tokenizer -> token dispatcher (per-kind handlers) -> line finalizer
//!               -> opcode handler pass -> stringifier -> optional anonymizer
//!
//! The tokenizer is a trait ([tokenizer::Tokenizer]); [tokenizer::BaseTokenizer] is the
//! reference implementation used by [Normalizer::with_base_tokenizer].
//!
//! ## Quick start
//!
//! ```ignore
//! use insn_norm::{CallOptions, Normalizer};
//!
//! let normalizer = Normalizer::with_base_tokenizer().build()?;
//! let lines = normalizer.normalize(&["0x1000: add rax, 0x10"], &CallOptions::default())?;
//! assert_eq!(lines, vec!["add rax 16"]);
//! ```

pub mod anonymize;
pub mod config;
pub mod dispatch;
pub mod disinfo;
pub mod error;
pub mod finalize;
pub mod handlers;
pub mod normalizer;
pub mod opcode;
pub mod scan;
pub mod state;
pub mod string_literal;
pub mod token;
pub mod tokenizer;

pub use config::{BuiltinOpcodeHandler, BuiltinTokenHandler, NormalizerConfig};
pub use dispatch::{Handler, HandlerResult, HandlerTable, Placement, TokenHandler};
pub use error::{ConfigError, NormalizeError};
pub use finalize::Granularity;
pub use normalizer::{Normalizer, NormalizerBuilder};
pub use opcode::{OpcodeHandler, OpcodePattern, OpcodeRegistry, Resume};
pub use state::{
    BlockId, CallOptions, ControlFlowContext, Edge, EdgeKind, FunctionId, Joiner, NormalizerState,
};
pub use token::{Token, TokenKind, TokenTuple};
pub use tokenizer::{BaseTokenizer, TokenizeRequest, Tokenizer, Vocabulary};
