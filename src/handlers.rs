//! Token handlers: the built-in defaults and configurable factories.
//!
//!     defaults     one handler per token kind, assembled by [HandlerTable::with_defaults]
//!     immediate    radix-aware immediate parsing shared by handlers and the tokenizer
//!     factories    parameterized handlers (label replacement, thresholds, string literals)
//!
//! Every factory is a plain struct implementing [Handler](crate::dispatch::Handler), so it can
//! be installed in a table or called directly on a state.
//!
//! [HandlerTable::with_defaults]: crate::dispatch::HandlerTable::with_defaults

pub mod defaults;
pub mod factories;
pub mod immediate;

pub use defaults::{
    drop_token, handle_immediate, handle_mismatch, handle_string_literal, pass_through,
};
pub use factories::{ReplaceStringLiteral, ReplaceToken, ThresholdImmediate};
pub use immediate::{immediate_to_decimal, parse_immediate};
