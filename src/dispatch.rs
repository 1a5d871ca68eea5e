//! Token dispatch: the per-kind handler table and the single entry point that runs a
//! handler and places its result in the working line.
//!
//! Handlers
//!
//!     A handler sees the whole [NormalizerState] and returns `Some(text)` to emit a token or
//!     `None` to emit nothing. Anything implementing `Fn(&mut NormalizerState) -> HandlerResult`
//!     is a handler, as are the factory structs in [crate::handlers].
//!
//! Placement
//!
//!     Where a result lands is decided by the caller, not the handler:
//!         Append       push onto the end of the line
//!         Insert(i)    insert before entry `i` (appends past the end)
//!         Replace(i)   overwrite entry `i`, or remove it when the handler returns `None`
//!         Detached     leave the line alone, only return the result

use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::NormalizeError;
use crate::handlers::defaults;
use crate::state::NormalizerState;
use crate::token::{TokenKind, TokenTuple};

pub type HandlerResult = Result<Option<String>, NormalizeError>;

pub trait Handler: Send + Sync {
    fn handle(&self, state: &mut NormalizerState<'_>) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&mut NormalizerState<'_>) -> HandlerResult + Send + Sync,
{
    fn handle(&self, state: &mut NormalizerState<'_>) -> HandlerResult {
        self(state)
    }
}

/// Shared, type-erased handler
pub type TokenHandler = Arc<dyn Handler>;

/// Map from token kind to handler
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<TokenKind, TokenHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with a handler for every kind the reference tokenizer emits
    pub fn with_defaults() -> Self {
        defaults::default_table()
    }

    pub fn insert(&mut self, kind: TokenKind, handler: impl Handler + 'static) {
        self.handlers.insert(kind, Arc::new(handler));
    }

    pub fn insert_shared(&mut self, kind: TokenKind, handler: TokenHandler) {
        self.handlers.insert(kind, handler);
    }

    pub fn remove(&mut self, kind: TokenKind) -> Option<TokenHandler> {
        self.handlers.remove(&kind)
    }

    pub fn get(&self, kind: TokenKind) -> Option<&dyn Handler> {
        self.handlers.get(&kind).map(|h| h.as_ref())
    }

    pub fn contains(&self, kind: TokenKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Layer `overrides` on top of this table, key by key
    pub fn merged(mut self, overrides: &HandlerTable) -> Self {
        for (kind, handler) in &overrides.handlers {
            self.handlers.insert(*kind, Arc::clone(handler));
        }
        self
    }

    /// Kinds with a handler, sorted
    pub fn kinds(&self) -> Vec<TokenKind> {
        let mut kinds: Vec<TokenKind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Append,
    Insert(usize),
    Replace(usize),
    Detached,
}

/// Run the handler for the current token of `state` and place the result.
///
/// Structural kinds (see [TokenKind::is_ignorable]) short-circuit to `None`. A kind with
/// no handler is an error. The kind recorded in the line is read after the handler runs,
/// so handlers may reclassify the current token.
pub fn dispatch(state: &mut NormalizerState<'_>, placement: Placement) -> HandlerResult {
    let handled = if state.kind.is_ignorable() {
        None
    } else {
        let handlers = state.handlers;
        let handler = handlers
            .get(state.kind)
            .ok_or_else(|| NormalizeError::UnknownToken {
                kind: state.kind.name().to_string(),
            })?;
        handler.handle(state)?
    };

    trace!(
        "dispatched {} {:?} -> {:?} ({:?})",
        state.kind,
        state.original,
        handled,
        placement
    );

    match (placement, &handled) {
        (Placement::Append, Some(text)) => {
            state
                .line
                .push(TokenTuple::new(state.kind, text.clone(), state.original.clone()));
        }
        (Placement::Insert(idx), Some(text)) => {
            let tuple = TokenTuple::new(state.kind, text.clone(), state.original.clone());
            let idx = idx.min(state.line.len());
            state.line.insert(idx, tuple);
        }
        (Placement::Replace(idx), Some(text)) => {
            let tuple = TokenTuple::new(state.kind, text.clone(), state.original.clone());
            match state.line.get_mut(idx) {
                Some(slot) => *slot = tuple,
                None => state.line.push(tuple),
            }
        }
        (Placement::Replace(idx), None) => {
            if idx < state.line.len() {
                state.line.remove(idx);
            }
        }
        _ => {}
    }

    if let Some(text) = &handled {
        state.text = text.clone();
    }

    Ok(handled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CallOptions;
    use crate::tokenizer::BaseTokenizer;

    fn with_state<R>(handlers: &HandlerTable, f: impl FnOnce(&mut NormalizerState<'_>) -> R) -> R {
        let tokenizer = BaseTokenizer::default();
        let call = CallOptions::default();
        let raw: Vec<&str> = Vec::new();
        let mut state = NormalizerState::new(&raw, &tokenizer, handlers, &call);
        f(&mut state)
    }

    #[test]
    fn test_append_pushes_tuple() {
        let handlers = HandlerTable::with_defaults();
        with_state(&handlers, |state| {
            state.set_token(TokenKind::Immediate, "0x10");
            let out = dispatch(state, Placement::Append).unwrap();
            assert_eq!(out.as_deref(), Some("16"));
            assert_eq!(
                state.line,
                vec![TokenTuple::new(TokenKind::Immediate, "16", "0x10")]
            );
        });
    }

    #[test]
    fn test_replace_overwrites_or_removes() {
        let handlers = HandlerTable::with_defaults();
        with_state(&handlers, |state| {
            state.line.push(TokenTuple::new(TokenKind::Opcode, "mov", "mov"));
            state.line.push(TokenTuple::new(TokenKind::Immediate, "1", "1"));

            state.set_token(TokenKind::Immediate, "0x2");
            dispatch(state, Placement::Replace(1)).unwrap();
            assert_eq!(state.line[1], TokenTuple::new(TokenKind::Immediate, "2", "0x2"));

            state.set_token(TokenKind::Spacing, " ");
            dispatch(state, Placement::Replace(1)).unwrap();
            assert_eq!(state.line.len(), 1);
        });
    }

    #[test]
    fn test_insert_places_before_index() {
        let handlers = HandlerTable::with_defaults();
        with_state(&handlers, |state| {
            state.line.push(TokenTuple::new(TokenKind::Opcode, "mov", "mov"));
            state.line.push(TokenTuple::new(TokenKind::Register, "eax", "eax"));

            state.set_token(TokenKind::Immediate, "0x3");
            dispatch(state, Placement::Insert(1)).unwrap();
            let texts: Vec<&str> = state.line.iter().map(|t| t.text.as_str()).collect();
            assert_eq!(texts, vec!["mov", "3", "eax"]);
            assert_eq!(state.line[1].original, "0x3");

            state.set_token(TokenKind::Register, "ebx");
            dispatch(state, Placement::Insert(99)).unwrap();
            assert_eq!(state.line[3].text, "ebx");

            state.set_token(TokenKind::Spacing, " ");
            dispatch(state, Placement::Insert(0)).unwrap();
            assert_eq!(state.line.len(), 4);
        });
    }

    #[test]
    fn test_detached_leaves_line() {
        let handlers = HandlerTable::with_defaults();
        with_state(&handlers, |state| {
            state.set_token(TokenKind::Register, "RAX");
            let out = dispatch(state, Placement::Detached).unwrap();
            assert_eq!(out.as_deref(), Some("RAX"));
            assert!(state.line.is_empty());
        });
    }

    #[test]
    fn test_instruction_start_short_circuits() {
        let handlers = HandlerTable::new();
        with_state(&handlers, |state| {
            state.set_token(TokenKind::InstructionStart, "#start_instr#");
            assert_eq!(dispatch(state, Placement::Append).unwrap(), None);
            assert!(state.line.is_empty());
        });
    }

    #[test]
    fn test_missing_handler_is_an_error() {
        let mut handlers = HandlerTable::with_defaults();
        handlers.remove(TokenKind::Register);
        with_state(&handlers, |state| {
            state.set_token(TokenKind::Register, "rax");
            let err = dispatch(state, Placement::Append).unwrap_err();
            assert!(matches!(err, NormalizeError::UnknownToken { kind } if kind == "register"));
        });
    }

    #[test]
    fn test_closure_handler_and_merge() {
        let mut overrides = HandlerTable::new();
        overrides.insert(
            TokenKind::Register,
            |state: &mut NormalizerState<'_>| -> HandlerResult {
                Ok(Some(format!("reg_{}", state.text)))
            },
        );
        let handlers = HandlerTable::with_defaults().merged(&overrides);
        assert!(handlers.contains(TokenKind::Immediate));
        with_state(&handlers, |state| {
            state.set_token(TokenKind::Register, "rax");
            dispatch(state, Placement::Append).unwrap();
            assert_eq!(state.line[0].text, "reg_rax");
            assert_eq!(state.line[0].original, "rax");
        });
    }
}
