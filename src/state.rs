//! Per-call normalization state and the call-scoped inputs it borrows.
//!
//! A [NormalizerState] lives for exactly one `normalize` call and is never shared.
//! Handlers receive it mutably: they read the current token, and may rewrite any part
//! of the working line.
//!
//! Borrowed vs owned
//!
//!     Borrowed for the whole call (shared with every derived state): the tokenizer, the
//!     merged handler table, the call options, and through them the control-flow context.
//!
//!     Owned (copied into derived states): the current token, the working line, the
//!     disassembler-info scratch slot.

use serde_json::{Map, Value};

use crate::dispatch::HandlerTable;
use crate::token::{Token, TokenKind, TokenTuple};
use crate::tokenizer::Tokenizer;

/// Opaque basic-block identity in an external control-flow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Opaque function identity in an external control-flow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Normal,
    FunctionCall,
}

/// Outgoing edge of a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target: BlockId,
    pub kind: EdgeKind,
}

/// Read-only view of a control-flow graph, used by call-site classification.
///
/// The normalizer never builds or owns one of these; callers pass an already-resolved
/// graph by reference for the duration of a call.
pub trait ControlFlowContext: Sync {
    fn outgoing_edges(&self, block: BlockId) -> Vec<Edge>;

    fn function_of(&self, block: BlockId) -> Option<FunctionId>;

    fn is_external(&self, function: FunctionId) -> bool;

    fn function_name(&self, function: FunctionId) -> Option<String>;
}

/// How input strings are joined before tokenizing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Joiner {
    /// Whatever the tokenizer considers its default (a newline for [BaseTokenizer](crate::tokenizer::BaseTokenizer))
    #[default]
    Default,
    /// Nothing between input strings
    Disabled,
    Token(Token),
}

/// Options scoped to one `normalize` call
#[derive(Clone)]
pub struct CallOptions<'a> {
    /// Free-form options forwarded to the tokenizer and visible to every handler
    pub options: Map<String, Value>,
    pub cfg: Option<&'a dyn ControlFlowContext>,
    pub block: Option<BlockId>,
    pub joiner: Joiner,
    pub match_instruction_address: bool,
    /// Fail on disassembler info that matches no known shape instead of ignoring it
    pub strict_disassembler_info: bool,
}

impl<'a> CallOptions<'a> {
    pub fn new() -> Self {
        CallOptions {
            options: Map::new(),
            cfg: None,
            block: None,
            joiner: Joiner::Default,
            match_instruction_address: true,
            strict_disassembler_info: false,
        }
    }

    pub fn with_cfg(mut self, cfg: &'a dyn ControlFlowContext, block: BlockId) -> Self {
        self.cfg = Some(cfg);
        self.block = Some(block);
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn with_joiner(mut self, joiner: Joiner) -> Self {
        self.joiner = joiner;
        self
    }

    pub fn without_address_matching(mut self) -> Self {
        self.match_instruction_address = false;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_disassembler_info = true;
        self
    }
}

impl Default for CallOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable state threaded through every handler during one call
pub struct NormalizerState<'a> {
    /// Kind of the token being handled
    pub kind: TokenKind,
    /// Source text of the token being handled
    pub original: String,
    /// Working text of the token being handled
    pub text: String,
    /// Index of the current token in `line`, set during the opcode pass
    pub token_idx: Option<usize>,
    pub line: Vec<TokenTuple>,
    pub normalized_lines: Vec<String>,
    /// Parsed JSON of the last disassembler info, if it was valid JSON
    pub disinfo_json: Option<Value>,
    pub raw_strings: &'a [&'a str],
    pub tokenizer: &'a dyn Tokenizer,
    pub handlers: &'a HandlerTable,
    pub call: &'a CallOptions<'a>,
}

impl<'a> NormalizerState<'a> {
    pub fn new(
        raw_strings: &'a [&'a str],
        tokenizer: &'a dyn Tokenizer,
        handlers: &'a HandlerTable,
        call: &'a CallOptions<'a>,
    ) -> Self {
        NormalizerState {
            kind: TokenKind::Newline,
            original: String::new(),
            text: String::new(),
            token_idx: None,
            line: Vec::new(),
            normalized_lines: Vec::new(),
            disinfo_json: None,
            raw_strings,
            tokenizer,
            handlers,
            call,
        }
    }

    /// Make `token` the current token
    pub fn set_token(&mut self, kind: TokenKind, text: impl Into<String>) {
        let text = text.into();
        self.kind = kind;
        self.original = text.clone();
        self.text = text;
        self.token_idx = None;
    }

    /// Copy of this state carrying a synthesized token.
    ///
    /// The line and scratch slot are copied; the tokenizer, handler table and call
    /// options (including the control-flow context) are shared by reference. Output
    /// lines are not carried over. Callers write back whatever part of the derived
    /// state they want to keep, usually `line`.
    pub fn derive(&self, kind: TokenKind, text: impl Into<String>) -> NormalizerState<'a> {
        let text = text.into();
        self.derive_with_original(kind, text.clone(), text)
    }

    pub fn derive_with_original(
        &self,
        kind: TokenKind,
        text: impl Into<String>,
        original: impl Into<String>,
    ) -> NormalizerState<'a> {
        NormalizerState {
            kind,
            original: original.into(),
            text: text.into(),
            token_idx: None,
            line: self.line.clone(),
            normalized_lines: Vec::new(),
            disinfo_json: self.disinfo_json.clone(),
            raw_strings: self.raw_strings,
            tokenizer: self.tokenizer,
            handlers: self.handlers,
            call: self.call,
        }
    }

    pub fn token_tuple(&self) -> TokenTuple {
        TokenTuple::new(self.kind, self.text.clone(), self.original.clone())
    }

    pub fn cfg(&self) -> Option<&'a dyn ControlFlowContext> {
        self.call.cfg
    }

    pub fn block(&self) -> Option<BlockId> {
        self.call.block
    }

    pub fn option(&self, name: &str) -> Option<&'a Value> {
        self.call.options.get(name)
    }
}
