//! The normalizer: configuration plus the per-call pipeline driver.
//!
//! A [Normalizer] is built once with [NormalizerBuilder] and is immutable afterwards, so it
//! can be shared across threads. All per-call data lives in a fresh [NormalizerState].
//!
//! Call flow
//!
//!     1. Zero inputs produce zero outputs.
//!     2. Tokenize the inputs with the resolved joiner (disabled when the first input is the
//!        `#start_instr#` marker).
//!     3. Dispatch every token; after each instruction boundary, finalize the line.
//!     4. Finalize whatever is left, so a missing trailing newline loses nothing.
//!     5. A call that produced no lines returns one empty string.
//!     6. Anonymize, if enabled, as the very last step.

use log::debug;
use std::fmt;
use std::sync::Arc;

use crate::anonymize::anonymize_lines;
use crate::dispatch::{dispatch, Handler, HandlerTable, Placement, TokenHandler};
use crate::error::{ConfigError, NormalizeError};
use crate::finalize::{finalize_instruction, Granularity, Stringifier};
use crate::opcode::{OpcodeHandler, OpcodePattern, OpcodeRegistry};
use crate::state::{CallOptions, Joiner, NormalizerState};
use crate::token::{Token, TokenKind, INSTRUCTION_START_TOKEN};
use crate::tokenizer::{BaseTokenizer, TokenizeRequest, Tokenizer};

pub const DEFAULT_TOKEN_SEP: &str = " ";

pub struct Normalizer {
    tokenizer: Arc<dyn Tokenizer>,
    handlers: HandlerTable,
    stringifier: Stringifier,
    anonymize: bool,
    opcode_handlers: OpcodeRegistry,
}

impl Normalizer {
    pub fn builder(tokenizer: impl Tokenizer + 'static) -> NormalizerBuilder {
        NormalizerBuilder::new(Arc::new(tokenizer))
    }

    pub fn with_base_tokenizer() -> NormalizerBuilder {
        Self::builder(BaseTokenizer::default())
    }

    pub fn token_sep(&self) -> &str {
        self.stringifier.separator()
    }

    /// Concrete granularity (never `Auto`)
    pub fn granularity(&self) -> Granularity {
        self.stringifier.granularity()
    }

    pub fn anonymizes(&self) -> bool {
        self.anonymize
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn opcode_handlers(&self) -> &OpcodeRegistry {
        &self.opcode_handlers
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Tokenize without normalizing, with the same joiner rules as [Normalizer::normalize]
    pub fn tokenize<S: AsRef<str>>(&self, inputs: &[S], call: &CallOptions<'_>) -> Vec<Token> {
        let raw: Vec<&str> = inputs.iter().map(AsRef::as_ref).collect();
        let request = self.request(&raw, call);
        self.tokenizer.tokenize(&raw, &request)
    }

    /// Normalize a batch of input strings
    pub fn normalize<S: AsRef<str>>(
        &self,
        inputs: &[S],
        call: &CallOptions<'_>,
    ) -> Result<Vec<String>, NormalizeError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<&str> = inputs.iter().map(AsRef::as_ref).collect();
        let request = self.request(&raw, call);
        let tokens = self.tokenizer.tokenize(&raw, &request);
        debug!("normalizing {} input(s), {} token(s)", raw.len(), tokens.len());

        let mut state = NormalizerState::new(&raw, self.tokenizer.as_ref(), &self.handlers, call);
        for token in tokens {
            state.set_token(token.kind, token.text);
            dispatch(&mut state, Placement::Append)?;
            if state.kind.is_instruction_boundary() {
                self.finalize(&mut state)?;
            }
        }
        self.finalize(&mut state)?;

        let mut lines = std::mem::take(&mut state.normalized_lines);
        if lines.is_empty() {
            lines.push(String::new());
        }
        if self.anonymize {
            anonymize_lines(&mut lines);
        }
        Ok(lines)
    }

    fn finalize(&self, state: &mut NormalizerState<'_>) -> Result<(), NormalizeError> {
        finalize_instruction(state, &self.opcode_handlers, &self.stringifier)
    }

    fn request<'o>(&self, raw: &[&str], call: &'o CallOptions<'_>) -> TokenizeRequest<'o> {
        let exploded = raw.first().map(|s| s.trim()) == Some(INSTRUCTION_START_TOKEN);
        let joiner = if exploded {
            None
        } else {
            match &call.joiner {
                Joiner::Default => self.tokenizer.default_joiner(),
                Joiner::Disabled => None,
                Joiner::Token(token) => Some(token.clone()),
            }
        };
        TokenizeRequest {
            joiner,
            match_instruction_address: call.match_instruction_address && !exploded,
            options: &call.options,
        }
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("token_sep", &self.token_sep())
            .field("granularity", &self.granularity())
            .field("anonymize", &self.anonymize)
            .field("handlers", &self.handlers)
            .field("opcode_handlers", &self.opcode_handlers)
            .finish()
    }
}

/// Builder for [Normalizer].
///
/// Setters that can fail (granularity names, opcode regexes) record the first error, which
/// [NormalizerBuilder::build] returns. Nothing is deferred to call time.
pub struct NormalizerBuilder {
    tokenizer: Arc<dyn Tokenizer>,
    overrides: HandlerTable,
    token_sep: String,
    granularity: Granularity,
    anonymize: bool,
    opcode_handlers: OpcodeRegistry,
    error: Option<ConfigError>,
}

impl NormalizerBuilder {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        NormalizerBuilder {
            tokenizer,
            overrides: HandlerTable::new(),
            token_sep: DEFAULT_TOKEN_SEP.to_string(),
            granularity: Granularity::Auto,
            anonymize: false,
            opcode_handlers: OpcodeRegistry::new(),
            error: None,
        }
    }

    /// Override the handler for one token kind
    pub fn token_handler(mut self, kind: TokenKind, handler: impl Handler + 'static) -> Self {
        self.overrides.insert(kind, handler);
        self
    }

    pub fn shared_token_handler(mut self, kind: TokenKind, handler: TokenHandler) -> Self {
        self.overrides.insert_shared(kind, handler);
        self
    }

    pub fn token_sep(mut self, sep: impl Into<String>) -> Self {
        self.token_sep = sep.into();
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Granularity by name or alias (`"op"`, `"lines"`, `"auto"`, ...)
    pub fn granularity_name(mut self, name: &str) -> Self {
        match name.parse() {
            Ok(granularity) => self.granularity = granularity,
            Err(e) => self.record(e),
        }
        self
    }

    pub fn anonymize(mut self, anonymize: bool) -> Self {
        self.anonymize = anonymize;
        self
    }

    pub fn opcode_handler(
        mut self,
        pattern: OpcodePattern,
        handler: impl OpcodeHandler + 'static,
    ) -> Self {
        self.opcode_handlers.register(pattern, handler);
        self
    }

    pub fn shared_opcode_handler(
        mut self,
        pattern: OpcodePattern,
        handler: Arc<dyn OpcodeHandler>,
    ) -> Self {
        self.opcode_handlers.register_shared(pattern, handler);
        self
    }

    /// Register against an exact, case-insensitive opcode
    pub fn opcode_exact(self, opcode: &str, handler: impl OpcodeHandler + 'static) -> Self {
        self.opcode_handler(OpcodePattern::exact(opcode), handler)
    }

    /// Register against a full-match, case-insensitive regex
    pub fn opcode_regex(mut self, pattern: &str, handler: impl OpcodeHandler + 'static) -> Self {
        match OpcodePattern::regex(pattern) {
            Ok(pattern) => self.opcode_handler(pattern, handler),
            Err(e) => {
                self.record(e);
                self
            }
        }
    }

    fn record(&mut self, error: ConfigError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn build(self) -> Result<Normalizer, ConfigError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let handlers = HandlerTable::with_defaults().merged(&self.overrides);
        debug!(
            "built normalizer: granularity {}, {} opcode handler(s), {} override(s)",
            self.granularity.resolve(),
            self.opcode_handlers.len(),
            self.overrides.len()
        );
        Ok(Normalizer {
            tokenizer: self.tokenizer,
            handlers,
            stringifier: Stringifier::new(self.token_sep, self.granularity),
            anonymize: self.anonymize,
            opcode_handlers: self.opcode_handlers,
        })
    }
}
