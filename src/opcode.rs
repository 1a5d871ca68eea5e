//! Opcode handlers: instruction-level rewrites that run once a line is complete.
//!
//! Registration
//!
//!     Handlers are registered against an [OpcodePattern], either an exact opcode or a regex.
//!     Regexes must match the whole opcode and ignore ASCII case, so `j.*` matches `JMP` but
//!     not `ljmp`. Registration order is significant: for each opcode token the first
//!     matching entry wins and no other entry runs for that token.
//!
//! Resuming
//!
//!     A handler sees the state with `token_idx` pointing at the opcode and may rewrite
//!     anything in the line. It returns where the pass should continue:
//!         Resume::AfterOpcode   the token after the opcode
//!         Resume::At(i)         index `i`. An index at or before the opcode is honored
//!                               only if the handler changed the line; otherwise the
//!                               pass moves on as with AfterOpcode

pub mod builtins;

use log::trace;
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, NormalizeError};
use crate::state::NormalizerState;
use crate::token::TokenKind;

pub use builtins::{CallSiteClassifier, MemoryExpressionFold, ReplaceOperand, ThresholdOperands};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    AfterOpcode,
    At(usize),
}

pub trait OpcodeHandler: Send + Sync {
    fn rewrite(&self, state: &mut NormalizerState<'_>) -> Result<Resume, NormalizeError>;
}

impl<F> OpcodeHandler for F
where
    F: Fn(&mut NormalizerState<'_>) -> Result<Resume, NormalizeError> + Send + Sync,
{
    fn rewrite(&self, state: &mut NormalizerState<'_>) -> Result<Resume, NormalizeError> {
        self(state)
    }
}

#[derive(Clone)]
pub enum OpcodePattern {
    Exact(String),
    Regex { source: String, regex: Regex },
}

impl OpcodePattern {
    /// Exact, case-insensitive opcode
    pub fn exact(opcode: impl Into<String>) -> Self {
        OpcodePattern::Exact(opcode.into().to_ascii_lowercase())
    }

    /// Full-match, case-insensitive regex
    pub fn regex(pattern: &str) -> Result<Self, ConfigError> {
        let regex = RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(OpcodePattern::Regex {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, opcode: &str) -> bool {
        match self {
            OpcodePattern::Exact(exact) => exact.eq_ignore_ascii_case(opcode),
            OpcodePattern::Regex { regex, .. } => regex.is_match(opcode),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OpcodePattern::Exact(exact) => exact,
            OpcodePattern::Regex { source, .. } => source,
        }
    }
}

impl fmt::Debug for OpcodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpcodePattern::Exact(exact) => write!(f, "Exact({exact:?})"),
            OpcodePattern::Regex { source, .. } => write!(f, "Regex({source:?})"),
        }
    }
}

#[derive(Clone)]
struct Entry {
    pattern: OpcodePattern,
    handler: Arc<dyn OpcodeHandler>,
}

/// Ordered list of opcode handlers
#[derive(Clone, Default)]
pub struct OpcodeRegistry {
    entries: Vec<Entry>,
}

impl OpcodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pattern: OpcodePattern, handler: impl OpcodeHandler + 'static) {
        self.register_shared(pattern, Arc::new(handler));
    }

    pub fn register_shared(&mut self, pattern: OpcodePattern, handler: Arc<dyn OpcodeHandler>) {
        self.entries.push(Entry { pattern, handler });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered patterns in registration order
    pub fn patterns(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.pattern.as_str()).collect()
    }

    /// First handler whose pattern matches `opcode`
    pub fn find(&self, opcode: &str) -> Option<&dyn OpcodeHandler> {
        self.entries
            .iter()
            .find(|e| e.pattern.matches(opcode))
            .map(|e| e.handler.as_ref())
    }

    /// Run the opcode pass over the working line of `state`
    pub fn apply(&self, state: &mut NormalizerState<'_>) -> Result<(), NormalizeError> {
        if self.entries.is_empty() {
            return Ok(());
        }

        let mut idx = 0;
        while idx < state.line.len() {
            let entry = &state.line[idx];
            if entry.kind != TokenKind::Opcode {
                idx += 1;
                continue;
            }
            let Some(handler) = self.find(&entry.text) else {
                idx += 1;
                continue;
            };

            let before = entry.clone();
            let len_before = state.line.len();
            trace!("opcode handler for {:?} at {idx}", before.text);
            state.kind = before.kind;
            state.text = before.text.clone();
            state.original = before.original.clone();
            state.token_idx = Some(idx);

            let resume = handler.rewrite(state)?;
            let changed = state.line.len() != len_before || state.line.get(idx) != Some(&before);
            idx = match resume {
                Resume::At(next) if next > idx || changed => next,
                _ => idx + 1,
            };
        }
        state.token_idx = None;
        Ok(())
    }
}

impl fmt::Debug for OpcodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.pattern))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HandlerTable;
    use crate::state::CallOptions;
    use crate::token::TokenTuple;
    use crate::tokenizer::BaseTokenizer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn run(registry: &OpcodeRegistry, line: Vec<TokenTuple>) -> Vec<TokenTuple> {
        let tokenizer = BaseTokenizer::default();
        let handlers = HandlerTable::with_defaults();
        let call = CallOptions::default();
        let raw: Vec<&str> = Vec::new();
        let mut state = NormalizerState::new(&raw, &tokenizer, &handlers, &call);
        state.line = line;
        registry.apply(&mut state).unwrap();
        state.line
    }

    fn tuple(kind: TokenKind, text: &str) -> TokenTuple {
        TokenTuple::new(kind, text, text)
    }

    #[test]
    fn test_regex_is_full_match_and_case_insensitive() {
        let pattern = OpcodePattern::regex("j.*").unwrap();
        assert!(pattern.matches("jmp"));
        assert!(pattern.matches("JNE"));
        assert!(!pattern.matches("ljmp"));

        let pattern = OpcodePattern::regex("call").unwrap();
        assert!(!pattern.matches("callq"));
        assert!(OpcodePattern::exact("CALL").matches("call"));
    }

    #[test]
    fn test_invalid_regex() {
        let err = OpcodePattern::regex("j(").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { pattern, .. } if pattern == "j("));
    }

    #[test]
    fn test_first_match_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut registry = OpcodeRegistry::new();
        let counter = Arc::clone(&first);
        registry.register(
            OpcodePattern::regex("j.*").unwrap(),
            move |_state: &mut NormalizerState<'_>| -> Result<Resume, NormalizeError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Resume::AfterOpcode)
            },
        );
        let counter = Arc::clone(&second);
        registry.register(
            OpcodePattern::exact("jmp"),
            move |_state: &mut NormalizerState<'_>| -> Result<Resume, NormalizeError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Resume::AfterOpcode)
            },
        );

        run(
            &registry,
            vec![tuple(TokenKind::Opcode, "jmp"), tuple(TokenKind::Immediate, "4")],
        );
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(registry.patterns(), vec!["j.*", "jmp"]);
    }

    #[test]
    fn test_resume_index_and_backwards_guard() {
        let mut registry = OpcodeRegistry::new();
        registry.register(
            OpcodePattern::exact("rep"),
            |state: &mut NormalizerState<'_>| -> Result<Resume, NormalizeError> {
                let idx = state.token_idx.unwrap_or(0);
                state.line[idx].text = "REPLACED".to_string();
                Ok(Resume::At(idx))
            },
        );
        let line = run(
            &registry,
            vec![tuple(TokenKind::Opcode, "rep"), tuple(TokenKind::Opcode, "rep")],
        );
        assert_eq!(line[0].text, "REPLACED");
        assert_eq!(line[1].text, "REPLACED");
    }

    #[test]
    fn test_resume_at_same_index_after_removal() {
        let mut registry = OpcodeRegistry::new();
        registry.register(
            OpcodePattern::exact("nop"),
            |state: &mut NormalizerState<'_>| -> Result<Resume, NormalizeError> {
                let idx = state.token_idx.unwrap_or(0);
                state.line.remove(idx);
                Ok(Resume::At(idx))
            },
        );
        registry.register(
            OpcodePattern::exact("jmp"),
            ReplaceOperand::jump_destination(),
        );
        let line = run(
            &registry,
            vec![
                tuple(TokenKind::Opcode, "nop"),
                tuple(TokenKind::Opcode, "jmp"),
                tuple(TokenKind::Immediate, "16"),
            ],
        );
        let texts: Vec<&str> = line.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["jmp", "#jmpdst#"]);
    }

    #[test]
    fn test_unchanged_line_never_resumes_in_place() {
        let mut registry = OpcodeRegistry::new();
        registry.register(
            OpcodePattern::exact("nop"),
            |state: &mut NormalizerState<'_>| -> Result<Resume, NormalizeError> {
                Ok(Resume::At(state.token_idx.unwrap_or(0)))
            },
        );
        let line = run(&registry, vec![tuple(TokenKind::Opcode, "nop")]);
        assert_eq!(line, vec![tuple(TokenKind::Opcode, "nop")]);
    }

    #[test]
    fn test_non_opcodes_ignored() {
        let mut registry = OpcodeRegistry::new();
        registry.register(
            OpcodePattern::regex(".*").unwrap(),
            |state: &mut NormalizerState<'_>| -> Result<Resume, NormalizeError> {
                let idx = state.token_idx.unwrap_or(0);
                state.line[idx].text.push('!');
                Ok(Resume::AfterOpcode)
            },
        );
        let line = run(
            &registry,
            vec![tuple(TokenKind::Register, "rax"), tuple(TokenKind::Opcode, "nop")],
        );
        assert_eq!(line[0].text, "rax");
        assert_eq!(line[1].text, "nop!");
    }
}
