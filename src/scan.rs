//! Scanning helpers over token sequences.
//!
//! Works on both raw tokenizer output (`Token`) and working lines (`TokenTuple`).
//! A scan accepts some kinds, silently skips ignored kinds, and by default stops at the
//! first token that is neither.

use crate::token::{Token, TokenKind, TokenTuple};

/// Anything with a kind and a text
pub trait Classified {
    fn kind(&self) -> TokenKind;
    fn text(&self) -> &str;
}

impl Classified for Token {
    fn kind(&self) -> TokenKind {
        self.kind
    }
    fn text(&self) -> &str {
        &self.text
    }
}

impl Classified for TokenTuple {
    fn kind(&self) -> TokenKind {
        self.kind
    }
    fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenScan<'k> {
    accept: &'k [TokenKind],
    ignore: &'k [TokenKind],
    stop_unmatched: bool,
}

impl<'k> TokenScan<'k> {
    pub fn new(accept: &'k [TokenKind]) -> Self {
        TokenScan {
            accept,
            ignore: &[],
            stop_unmatched: true,
        }
    }

    pub fn ignoring(mut self, ignore: &'k [TokenKind]) -> Self {
        self.ignore = ignore;
        self
    }

    /// Keep scanning past tokens that are neither accepted nor ignored
    pub fn skip_unmatched(mut self) -> Self {
        self.stop_unmatched = false;
        self
    }

    /// First accepted index at or after `start`
    pub fn forward<T: Classified>(&self, items: &[T], start: usize) -> Option<usize> {
        self.walk((start..items.len()).map(|i| (i, &items[i])))
    }

    /// Nearest accepted index strictly before `end`
    pub fn backward<T: Classified>(&self, items: &[T], end: usize) -> Option<usize> {
        let end = end.min(items.len());
        self.walk((0..end).rev().map(|i| (i, &items[i])))
    }

    /// Every consecutive accepted index from `start`, in order
    pub fn forward_all<T: Classified>(&self, items: &[T], start: usize) -> Vec<usize> {
        let mut found = Vec::new();
        for (i, item) in items.iter().enumerate().skip(start) {
            let kind = item.kind();
            if self.ignore.contains(&kind) {
                continue;
            }
            if self.accept.contains(&kind) {
                found.push(i);
            } else if self.stop_unmatched {
                break;
            }
        }
        found
    }

    fn walk<'a, T: Classified + 'a>(
        &self,
        indexed: impl Iterator<Item = (usize, &'a T)>,
    ) -> Option<usize> {
        for (i, item) in indexed {
            let kind = item.kind();
            if self.ignore.contains(&kind) {
                continue;
            }
            if self.accept.contains(&kind) {
                return Some(i);
            }
            if self.stop_unmatched {
                return None;
            }
        }
        None
    }
}
