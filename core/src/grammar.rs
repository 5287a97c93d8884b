//! Grammar constraints for equation decoding.
//!
//! The filter enforces that greedy decoding emits a syntactically plausible
//! single equation: operators and operands alternate, a parenthesis opens
//! before it closes, and `=` never chains. It is a pure function of the
//! previously selected symbol only (first-order), so it cannot track nesting
//! depth — closing more parentheses than were opened across a long sequence
//! is a known, accepted limitation.
//!
//! Forbidden-index lists are precomputed per category at construction; the
//! per-step work is one classify lookup plus writing -inf into the logits.

use crate::vocab::{SymbolVocab, EOS_TOKEN};

/// Binary operator symbols, in vocabulary-lookup order.
pub const OPERATORS: [&str; 5] = ["+", "-", "*", "/", "^"];

/// Category of the previously emitted symbol. Exactly one applies per step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrevSymbol {
    /// No symbol emitted yet (step 0).
    Start,
    /// One of `+ - * / ^`.
    Operator,
    /// A numbered placeholder (index >= num_start).
    Number,
    Equals,
    OpenParen,
    CloseParen,
    /// Structural or out-of-grammar symbol; no rule applies.
    Other,
}

/// Precomputed forbidden-next-symbol sets per category.
///
/// Rules whose referenced symbols are absent from the output vocabulary
/// (e.g. no `=` in postfix mode) degrade to the subset that exists; absence
/// is an explicit skip, never an error.
#[derive(Clone, Debug)]
pub struct GrammarFilter {
    classify: Vec<PrevSymbol>,
    start: Vec<usize>,
    operator: Vec<usize>,
    number: Vec<usize>,
    equals: Vec<usize>,
    open_paren: Vec<usize>,
    close_paren: Vec<usize>,
}

impl GrammarFilter {
    pub fn new(output: &SymbolVocab) -> Self {
        let op_indices: Vec<usize> =
            OPERATORS.iter().filter_map(|s| output.index_of(s)).collect();
        let open = output.index_of("(");
        let close = output.index_of(")");
        let eq = output.index_of("=");
        let eos = output.index_of(EOS_TOKEN);
        let numbers: Vec<usize> = (output.num_start()..output.len()).collect();

        let mut classify = vec![PrevSymbol::Other; output.len()];
        for &i in &op_indices {
            classify[i] = PrevSymbol::Operator;
        }
        if let Some(i) = eq {
            classify[i] = PrevSymbol::Equals;
        }
        if let Some(i) = open {
            classify[i] = PrevSymbol::OpenParen;
        }
        if let Some(i) = close {
            classify[i] = PrevSymbol::CloseParen;
        }
        for &i in &numbers {
            classify[i] = PrevSymbol::Number;
        }

        // An expression cannot begin with an operator or end immediately.
        let mut start = op_indices.clone();
        start.extend(eos);

        // Operator must be followed by an operand: no operator, `)`, `=`, or end.
        let mut operator = op_indices.clone();
        operator.extend(close);
        operator.extend(eq);
        operator.extend(eos);

        // A number is a complete operand: no `(` and no second number.
        let mut number: Vec<usize> = Vec::new();
        number.extend(open);
        number.extend_from_slice(&numbers);

        // `=` expects a fresh right-hand side.
        let mut equals = op_indices.clone();
        equals.extend(eq);
        equals.extend(close);

        // `(` must open a subexpression, not close or terminate.
        let mut open_paren: Vec<usize> = Vec::new();
        open_paren.extend(close);
        open_paren.extend(eq);
        open_paren.extend_from_slice(&op_indices);
        open_paren.extend(eos);

        // `)` closes an operand: no reopening and no bare number after it.
        let mut close_paren: Vec<usize> = Vec::new();
        close_paren.extend(open);
        close_paren.extend_from_slice(&numbers);

        GrammarFilter { classify, start, operator, number, equals, open_paren, close_paren }
    }

    /// Category of a previously selected output index. `None` means step 0.
    pub fn classify(&self, prev: Option<usize>) -> PrevSymbol {
        match prev {
            None => PrevSymbol::Start,
            Some(idx) => self.classify.get(idx).copied().unwrap_or(PrevSymbol::Other),
        }
    }

    /// Forbidden output indices for the step after `prev`.
    pub fn forbidden(&self, prev: Option<usize>) -> &[usize] {
        match self.classify(prev) {
            PrevSymbol::Start => &self.start,
            PrevSymbol::Operator => &self.operator,
            PrevSymbol::Number => &self.number,
            PrevSymbol::Equals => &self.equals,
            PrevSymbol::OpenParen => &self.open_paren,
            PrevSymbol::CloseParen => &self.close_paren,
            PrevSymbol::Other => &[],
        }
    }

    /// Writes -inf over every forbidden logit so greedy arg-max cannot pick
    /// an illegal symbol.
    pub fn apply(&self, prev: Option<usize>, logits: &mut [f32]) {
        for &idx in self.forbidden(prev) {
            if let Some(slot) = logits.get_mut(idx) {
                *slot = f32::NEG_INFINITY;
            }
        }
    }
}
