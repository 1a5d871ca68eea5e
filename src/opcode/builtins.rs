//! Built-in opcode handlers.
//!
//!     ReplaceOperand         overwrite the first operand with a label (jump targets)
//!     ThresholdOperands      label large immediates in the operand list
//!     CallSiteClassifier     collapse call operands into a call-target class
//!     MemoryExpressionFold   collapse `[...]` groups into one memory-expression token
//!
//! [MemoryExpressionFold] also works as a close-bracket token handler, folding each group
//! as soon as it closes.

use std::collections::BTreeSet;

use crate::dispatch::{Handler, HandlerResult};
use crate::error::{ConfigError, NormalizeError};
use crate::handlers::immediate::parse_immediate;
use crate::opcode::{OpcodeHandler, Resume};
use crate::scan::TokenScan;
use crate::state::{EdgeKind, FunctionId, NormalizerState};
use crate::token::{
    TokenKind, TokenTuple, EXTERNAL_FUNCTION_CALL_STR, FUNCTION_CALL_STR, IMMEDIATE_VALUE_STR,
    INTERNAL_FUNCTION_CALL_STR, JUMP_DESTINATION_STR, MEMORY_EXPRESSION_STR,
    MULTI_FUNCTION_CALL_STR, RECURSIVE_FUNCTION_CALL_STR,
};

/// Index of the first non-spacing token after the current opcode
fn first_operand(state: &NormalizerState<'_>) -> Option<usize> {
    let start = state.token_idx? + 1;
    (start..state.line.len()).find(|&i| state.line[i].kind != TokenKind::Spacing)
}

/// Replace the first operand with a label.
///
/// By default only immediate operands are replaced (`jmp 0x401000` becomes
/// `jmp #jmpdst#`, `jmp rax` is left alone).
#[derive(Debug, Clone)]
pub struct ReplaceOperand {
    label: String,
    keep_sign: bool,
    any_kind: bool,
}

impl ReplaceOperand {
    pub fn new(label: impl Into<String>) -> Self {
        ReplaceOperand {
            label: label.into(),
            keep_sign: false,
            any_kind: false,
        }
    }

    pub fn jump_destination() -> Self {
        Self::new(JUMP_DESTINATION_STR)
    }

    /// Negative operands become `-label`
    pub fn keep_sign(mut self, keep: bool) -> Self {
        self.keep_sign = keep;
        self
    }

    /// Replace the first operand whatever its kind
    pub fn any_kind(mut self, any: bool) -> Self {
        self.any_kind = any;
        self
    }
}

impl OpcodeHandler for ReplaceOperand {
    fn rewrite(&self, state: &mut NormalizerState<'_>) -> Result<Resume, NormalizeError> {
        let Some(idx) = first_operand(state) else {
            return Ok(Resume::AfterOpcode);
        };
        let operand = &mut state.line[idx];
        if !self.any_kind && operand.kind != TokenKind::Immediate {
            return Ok(Resume::AfterOpcode);
        }
        operand.text = if self.keep_sign && operand.text.starts_with('-') {
            format!("-{}", self.label)
        } else {
            self.label.clone()
        };
        Ok(Resume::At(idx + 1))
    }
}

/// Replace every immediate operand whose magnitude exceeds a threshold
#[derive(Debug, Clone)]
pub struct ThresholdOperands {
    threshold: u128,
    label: String,
}

impl ThresholdOperands {
    pub fn new(threshold: i128, label: impl Into<String>) -> Result<Self, ConfigError> {
        if threshold < 0 {
            return Err(ConfigError::InvalidParameter(format!(
                "operand threshold must be non-negative, got {threshold}"
            )));
        }
        Ok(ThresholdOperands {
            threshold: threshold.unsigned_abs(),
            label: label.into(),
        })
    }
}

impl Default for ThresholdOperands {
    fn default() -> Self {
        ThresholdOperands {
            threshold: 5000,
            label: IMMEDIATE_VALUE_STR.to_string(),
        }
    }
}

impl OpcodeHandler for ThresholdOperands {
    fn rewrite(&self, state: &mut NormalizerState<'_>) -> Result<Resume, NormalizeError> {
        let Some(start) = state.token_idx.map(|i| i + 1) else {
            return Ok(Resume::AfterOpcode);
        };
        for operand in state.line.iter_mut().skip(start) {
            if operand.kind == TokenKind::Opcode {
                break;
            }
            if operand.kind != TokenKind::Immediate {
                continue;
            }
            // Already-labelled operands don't parse and are left alone
            if let Some(value) = parse_immediate(&operand.text) {
                if value.unsigned_abs() > self.threshold {
                    operand.text = self.label.clone();
                }
            }
        }
        Ok(Resume::AfterOpcode)
    }
}

/// Classify call targets using the control-flow context.
///
/// All operands after the opcode collapse into a single token holding one of:
///
///     #self#          the call targets the calling function
///     <name>          an external function on the allow-list (`@plt` stripped)
///     #externfunc#    any other external function
///     #innerfunc#     a function inside the binary
///     #multifunc#     more than one distinct callee
///     #func#          no context, or no resolvable callee
#[derive(Debug, Clone, Default)]
pub struct CallSiteClassifier {
    special_functions: BTreeSet<String>,
}

impl CallSiteClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// External functions kept by name instead of collapsed to `#externfunc#`
    pub fn with_special_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.special_functions
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Common libc entry points
    pub fn with_libc_functions(self) -> Self {
        self.with_special_functions(LIBC_FUNCTIONS.iter().copied())
    }

    pub fn classify(&self, state: &NormalizerState<'_>) -> String {
        let (Some(cfg), Some(block)) = (state.cfg(), state.block()) else {
            return FUNCTION_CALL_STR.to_string();
        };

        let callees: BTreeSet<FunctionId> = cfg
            .outgoing_edges(block)
            .into_iter()
            .filter(|edge| edge.kind == EdgeKind::FunctionCall)
            .filter_map(|edge| cfg.function_of(edge.target))
            .collect();

        let mut iter = callees.iter();
        let (Some(&callee), None) = (iter.next(), iter.next()) else {
            return if callees.is_empty() {
                FUNCTION_CALL_STR.to_string()
            } else {
                MULTI_FUNCTION_CALL_STR.to_string()
            };
        };

        if cfg.function_of(block) == Some(callee) {
            return RECURSIVE_FUNCTION_CALL_STR.to_string();
        }
        if !cfg.is_external(callee) {
            return INTERNAL_FUNCTION_CALL_STR.to_string();
        }
        match cfg.function_name(callee) {
            Some(name) => {
                let name = name.strip_suffix("@plt").unwrap_or(&name);
                if self.special_functions.contains(name) {
                    name.to_string()
                } else {
                    EXTERNAL_FUNCTION_CALL_STR.to_string()
                }
            }
            None => EXTERNAL_FUNCTION_CALL_STR.to_string(),
        }
    }
}

impl OpcodeHandler for CallSiteClassifier {
    fn rewrite(&self, state: &mut NormalizerState<'_>) -> Result<Resume, NormalizeError> {
        let Some(start) = first_operand(state) else {
            return Ok(Resume::AfterOpcode);
        };
        let label = self.classify(state);
        let original: String = state.line[start..]
            .iter()
            .map(|t| t.original.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let kind = state.line[start].kind;
        state.line.truncate(start);
        state.line.push(TokenTuple::new(kind, label, original));
        Ok(Resume::At(start + 1))
    }
}

/// Collapse each bracketed memory operand into a single token
#[derive(Debug, Clone)]
pub struct MemoryExpressionFold {
    label: String,
}

impl MemoryExpressionFold {
    pub fn new(label: impl Into<String>) -> Self {
        MemoryExpressionFold {
            label: label.into(),
        }
    }

    fn folded(&self, parts: &[TokenTuple]) -> TokenTuple {
        let original: String = parts.iter().map(|t| t.original.as_str()).collect();
        TokenTuple::new(TokenKind::MemoryExpression, self.label.clone(), original)
    }
}

impl Default for MemoryExpressionFold {
    fn default() -> Self {
        Self::new(MEMORY_EXPRESSION_STR)
    }
}

impl OpcodeHandler for MemoryExpressionFold {
    fn rewrite(&self, state: &mut NormalizerState<'_>) -> Result<Resume, NormalizeError> {
        let Some(mut idx) = state.token_idx.map(|i| i + 1) else {
            return Ok(Resume::AfterOpcode);
        };
        let open_scan = TokenScan::new(&[TokenKind::OpenBracket]).skip_unmatched();
        let close_scan = TokenScan::new(&[TokenKind::CloseBracket]).skip_unmatched();
        while let Some(open) = open_scan.forward(&state.line, idx) {
            let Some(close) = close_scan.forward(&state.line, open + 1) else {
                break;
            };
            let folded = self.folded(&state.line[open..=close]);
            state.line.splice(open..=close, [folded]);
            idx = open + 1;
        }
        Ok(Resume::AfterOpcode)
    }
}

impl Handler for MemoryExpressionFold {
    fn handle(&self, state: &mut NormalizerState<'_>) -> HandlerResult {
        let scan = TokenScan::new(&[TokenKind::OpenBracket]).skip_unmatched();
        let Some(open) = scan.backward(&state.line, state.line.len()) else {
            return Ok(Some(state.text.clone()));
        };
        let mut parts = state.line.split_off(open);
        parts.push(state.token_tuple());
        let folded = self.folded(&parts);
        state.line.push(folded);
        Ok(None)
    }
}

/// libc functions commonly kept by name in call-site classification
pub const LIBC_FUNCTIONS: &[&str] = &[
    "abort", "atoi", "atol", "calloc", "exit", "fclose", "fgets", "fopen", "fprintf", "fputs",
    "fread", "free", "fwrite", "getenv", "malloc", "memcmp", "memcpy", "memmove", "memset",
    "printf", "puts", "qsort", "rand", "realloc", "scanf", "snprintf", "sprintf", "srand",
    "strcat", "strchr", "strcmp", "strcpy", "strlen", "strncmp", "strncpy", "strrchr",
    "strstr", "strtol", "time",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HandlerTable;
    use crate::state::{BlockId, CallOptions, ControlFlowContext, Edge};
    use crate::tokenizer::BaseTokenizer;

    struct Graph {
        edges: Vec<Edge>,
        owners: Vec<(usize, usize)>,
        external: Vec<(usize, &'static str)>,
    }

    impl ControlFlowContext for Graph {
        fn outgoing_edges(&self, _block: BlockId) -> Vec<Edge> {
            self.edges.clone()
        }

        fn function_of(&self, block: BlockId) -> Option<FunctionId> {
            self.owners
                .iter()
                .find(|(b, _)| *b == block.0)
                .map(|(_, f)| FunctionId(*f))
        }

        fn is_external(&self, function: FunctionId) -> bool {
            self.external.iter().any(|(f, _)| *f == function.0)
        }

        fn function_name(&self, function: FunctionId) -> Option<String> {
            self.external
                .iter()
                .find(|(f, _)| *f == function.0)
                .map(|(_, n)| n.to_string())
        }
    }

    fn call_edge(target: usize) -> Edge {
        Edge {
            target: BlockId(target),
            kind: EdgeKind::FunctionCall,
        }
    }

    fn tuple(kind: TokenKind, text: &str) -> TokenTuple {
        TokenTuple::new(kind, text, text)
    }

    fn rewrite_with(
        handler: &dyn OpcodeHandler,
        call: &CallOptions<'_>,
        line: Vec<TokenTuple>,
    ) -> (Resume, Vec<TokenTuple>) {
        let tokenizer = BaseTokenizer::default();
        let handlers = HandlerTable::with_defaults();
        let raw: Vec<&str> = Vec::new();
        let mut state = NormalizerState::new(&raw, &tokenizer, &handlers, call);
        state.line = line;
        state.token_idx = Some(0);
        let resume = handler.rewrite(&mut state).unwrap();
        (resume, state.line)
    }

    fn classify(graph: &Graph) -> String {
        let call = CallOptions::new().with_cfg(graph, BlockId(0));
        let (_, line) = rewrite_with(
            &CallSiteClassifier::new().with_special_functions(["printf"]),
            &call,
            vec![tuple(TokenKind::Opcode, "call"), tuple(TokenKind::Immediate, "4198400")],
        );
        line[1].text.clone()
    }

    #[test]
    fn test_replace_operand() {
        let call = CallOptions::default();
        let (resume, line) = rewrite_with(
            &ReplaceOperand::jump_destination(),
            &call,
            vec![tuple(TokenKind::Opcode, "jmp"), tuple(TokenKind::Immediate, "4198400")],
        );
        assert_eq!(resume, Resume::At(2));
        assert_eq!(line[1].text, "#jmpdst#");

        let (resume, line) = rewrite_with(
            &ReplaceOperand::jump_destination(),
            &call,
            vec![tuple(TokenKind::Opcode, "jmp"), tuple(TokenKind::Register, "rax")],
        );
        assert_eq!(resume, Resume::AfterOpcode);
        assert_eq!(line[1].text, "rax");
    }

    #[test]
    fn test_replace_operand_keep_sign() {
        let call = CallOptions::default();
        let (_, line) = rewrite_with(
            &ReplaceOperand::new("#off#").keep_sign(true),
            &call,
            vec![tuple(TokenKind::Opcode, "jmp"), tuple(TokenKind::Immediate, "-12")],
        );
        assert_eq!(line[1].text, "-#off#");
    }

    #[test]
    fn test_threshold_operands() {
        let call = CallOptions::default();
        let (_, line) = rewrite_with(
            &ThresholdOperands::default(),
            &call,
            vec![
                tuple(TokenKind::Opcode, "mov"),
                tuple(TokenKind::Immediate, "10"),
                tuple(TokenKind::Immediate, "-70000"),
                tuple(TokenKind::Immediate, "#immval#"),
            ],
        );
        let texts: Vec<&str> = line.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["mov", "10", "#immval#", "#immval#"]);
        assert!(ThresholdOperands::new(-5, "#x#").is_err());
    }

    #[test]
    fn test_call_site_without_context() {
        let call = CallOptions::default();
        let (resume, line) = rewrite_with(
            &CallSiteClassifier::new(),
            &call,
            vec![
                tuple(TokenKind::Opcode, "call"),
                tuple(TokenKind::MemorySize, "qword ptr"),
                tuple(TokenKind::OpenBracket, "["),
                tuple(TokenKind::Register, "rip"),
                tuple(TokenKind::CloseBracket, "]"),
            ],
        );
        assert_eq!(resume, Resume::At(2));
        assert_eq!(line.len(), 2);
        assert_eq!(line[1].text, "#func#");
        assert_eq!(line[1].original, "qword ptr [ rip ]");
    }

    #[test]
    fn test_call_site_classification() {
        let recursive = Graph {
            edges: vec![call_edge(0)],
            owners: vec![(0, 1)],
            external: vec![],
        };
        assert_eq!(classify(&recursive), "#self#");

        let inner = Graph {
            edges: vec![call_edge(5)],
            owners: vec![(0, 1), (5, 2)],
            external: vec![],
        };
        assert_eq!(classify(&inner), "#innerfunc#");

        let special = Graph {
            edges: vec![call_edge(5)],
            owners: vec![(0, 1), (5, 2)],
            external: vec![(2, "printf@plt")],
        };
        assert_eq!(classify(&special), "printf");

        let external = Graph {
            edges: vec![call_edge(5)],
            owners: vec![(0, 1), (5, 2)],
            external: vec![(2, "custom_alloc")],
        };
        assert_eq!(classify(&external), "#externfunc#");

        let multi = Graph {
            edges: vec![call_edge(5), call_edge(6)],
            owners: vec![(0, 1), (5, 2), (6, 3)],
            external: vec![],
        };
        assert_eq!(classify(&multi), "#multifunc#");

        let unresolved = Graph {
            edges: vec![Edge {
                target: BlockId(5),
                kind: EdgeKind::Normal,
            }],
            owners: vec![(0, 1), (5, 2)],
            external: vec![],
        };
        assert_eq!(classify(&unresolved), "#func#");
    }

    #[test]
    fn test_memory_fold_as_opcode_handler() {
        let call = CallOptions::default();
        let (_, line) = rewrite_with(
            &MemoryExpressionFold::default(),
            &call,
            vec![
                tuple(TokenKind::Opcode, "mov"),
                tuple(TokenKind::Register, "rax"),
                tuple(TokenKind::OpenBracket, "["),
                tuple(TokenKind::Register, "rbp"),
                tuple(TokenKind::PlusSign, "+"),
                TokenTuple::new(TokenKind::Immediate, "8", "0x8"),
                tuple(TokenKind::CloseBracket, "]"),
            ],
        );
        assert_eq!(line.len(), 3);
        assert_eq!(
            line[2],
            TokenTuple::new(TokenKind::MemoryExpression, "#memexpr#", "[rbp+0x8]")
        );
    }

    #[test]
    fn test_memory_fold_as_token_handler() {
        let tokenizer = BaseTokenizer::default();
        let handlers = HandlerTable::with_defaults();
        let call = CallOptions::default();
        let raw: Vec<&str> = Vec::new();
        let mut state = NormalizerState::new(&raw, &tokenizer, &handlers, &call);
        state.line = vec![
            tuple(TokenKind::Opcode, "lea"),
            tuple(TokenKind::OpenBracket, "["),
            tuple(TokenKind::Register, "rip"),
        ];
        state.set_token(TokenKind::CloseBracket, "]");

        let fold = MemoryExpressionFold::default();
        assert_eq!(fold.handle(&mut state).unwrap(), None);
        assert_eq!(state.line.len(), 2);
        assert_eq!(state.line[1].original, "[rip]");

        state.line = vec![tuple(TokenKind::Opcode, "nop")];
        state.set_token(TokenKind::CloseBracket, "]");
        assert_eq!(fold.handle(&mut state).unwrap().as_deref(), Some("]"));
    }
}
