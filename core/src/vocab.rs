//! Symbol vocabularies and the input↔output index bridge.
//!
//! Two symbol spaces exist: the input vocabulary (question words plus numbered
//! placeholders) and the output vocabulary (arithmetic symbols plus the same
//! placeholders). A model with `share_vocab` still decodes over output-space
//! indices; "shared" means one embedding table over the input space, with
//! generated symbols remapped through the bridge before the next embedding
//! lookup. All remap tables are precomputed here so the decode loop never
//! chases strings per token.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Padding token.
pub const PAD_TOKEN: &str = "<PAD>";
/// Start-of-sequence token.
pub const SOS_TOKEN: &str = "<SOS>";
/// End-of-sequence token.
pub const EOS_TOKEN: &str = "<EOS>";
/// Unknown-symbol token.
pub const UNK_TOKEN: &str = "<UNK>";

/// Prefix shared by all numbered placeholder symbols (`NUM0`, `NUM1`, ...).
pub const NUM_PREFIX: &str = "NUM";

/// Errors raised while building vocabularies or the bridge between them.
///
/// All variants are construction-time and fatal: a malformed vocabulary is a
/// configuration problem, not a data problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VocabError {
    /// The same symbol string appears at two indices.
    DuplicateSymbol { symbol: String, first: usize, second: usize },
    /// `num_start` does not lie within `[0, len]`.
    NumStartOutOfRange { num_start: usize, len: usize },
    /// A symbol at or above `num_start` is not a numbered placeholder,
    /// or a placeholder appears below `num_start`.
    MisplacedPlaceholder { symbol: String, index: usize },
    /// A vocabulary that must carry a structural token does not.
    MissingToken { token: &'static str, side: &'static str },
}

impl fmt::Display for VocabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VocabError::DuplicateSymbol { symbol, first, second } => {
                write!(f, "duplicate symbol {symbol:?} at indices {first} and {second}")
            }
            VocabError::NumStartOutOfRange { num_start, len } => {
                write!(f, "num_start {num_start} out of range for vocab of {len} symbols")
            }
            VocabError::MisplacedPlaceholder { symbol, index } => {
                write!(f, "symbol {symbol:?} at index {index} violates the num_start boundary")
            }
            VocabError::MissingToken { token, side } => {
                write!(f, "{side} vocabulary is missing required token {token}")
            }
        }
    }
}

impl std::error::Error for VocabError {}

/// An ordered, injective mapping between symbol strings and dense indices.
///
/// Indices are contiguous `[0, len)`. The tail range `[num_start, len)` holds
/// exactly the numbered placeholder symbols; that boundary is what the grammar
/// filter uses to treat "any number" as one category.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SymbolVocab {
    symbols: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    num_start: usize,
}

impl SymbolVocab {
    /// Builds a vocabulary from symbols in index order.
    ///
    /// Fails if a symbol repeats, if `num_start` is out of range, or if the
    /// placeholder range does not line up with `num_start` on either side.
    pub fn new(symbols: Vec<String>, num_start: usize) -> Result<Self, VocabError> {
        if num_start > symbols.len() {
            return Err(VocabError::NumStartOutOfRange { num_start, len: symbols.len() });
        }
        let mut index = HashMap::with_capacity(symbols.len());
        for (i, s) in symbols.iter().enumerate() {
            if let Some(&first) = index.get(s) {
                return Err(VocabError::DuplicateSymbol { symbol: s.clone(), first, second: i });
            }
            index.insert(s.clone(), i);
        }
        for (i, s) in symbols.iter().enumerate() {
            let is_placeholder = s.starts_with(NUM_PREFIX)
                && s[NUM_PREFIX.len()..].chars().all(|c| c.is_ascii_digit())
                && s.len() > NUM_PREFIX.len();
            if (i >= num_start) != is_placeholder {
                return Err(VocabError::MisplacedPlaceholder { symbol: s.clone(), index: i });
            }
        }
        Ok(SymbolVocab { symbols, index, num_start })
    }

    /// Rebuilds the string→index map after deserialization (serde skips it).
    pub fn rebuild_index(&mut self) {
        self.index = self
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// First index of the numbered-placeholder range.
    pub fn num_start(&self) -> usize {
        self.num_start
    }

    /// True if `idx` names a numbered placeholder.
    pub fn is_placeholder(&self, idx: usize) -> bool {
        idx >= self.num_start && idx < self.symbols.len()
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    pub fn symbol(&self, idx: usize) -> Option<&str> {
        self.symbols.get(idx).map(String::as_str)
    }

    pub fn pad(&self) -> Option<usize> {
        self.index_of(PAD_TOKEN)
    }

    pub fn sos(&self) -> Option<usize> {
        self.index_of(SOS_TOKEN)
    }

    pub fn eos(&self) -> Option<usize> {
        self.index_of(EOS_TOKEN)
    }

    pub fn unknown(&self) -> Option<usize> {
        self.index_of(UNK_TOKEN)
    }
}

/// Precomputed bidirectional index maps between the input and output spaces.
///
/// Lookups are O(1) slice reads, deterministic and side-effect-free. Symbols
/// with no counterpart on the other side were resolved to that side's `<UNK>`
/// index once, at build time; `unknown_mappings()` reports how many, as a
/// data-quality signal.
#[derive(Clone, Debug)]
pub struct VocabBridge {
    out_to_in: Vec<usize>,
    in_to_out: Vec<usize>,
    unknown_mappings: usize,
}

impl VocabBridge {
    /// Builds both remap tables.
    ///
    /// Requires `<UNK>` on both sides so unmapped symbols have a fallback;
    /// a side without it fails fast here rather than mid-decode.
    pub fn new(input: &SymbolVocab, output: &SymbolVocab) -> Result<Self, VocabError> {
        let in_unk = input
            .unknown()
            .ok_or(VocabError::MissingToken { token: UNK_TOKEN, side: "input" })?;
        let out_unk = output
            .unknown()
            .ok_or(VocabError::MissingToken { token: UNK_TOKEN, side: "output" })?;

        let mut unknown_mappings = 0usize;
        let mut out_to_in = Vec::with_capacity(output.len());
        for idx in 0..output.len() {
            let sym = output.symbol(idx).unwrap_or(UNK_TOKEN);
            match input.index_of(sym) {
                Some(i) => out_to_in.push(i),
                None => {
                    unknown_mappings += 1;
                    out_to_in.push(in_unk);
                }
            }
        }
        let mut in_to_out = Vec::with_capacity(input.len());
        for idx in 0..input.len() {
            let sym = input.symbol(idx).unwrap_or(UNK_TOKEN);
            match output.index_of(sym) {
                Some(o) => in_to_out.push(o),
                None => {
                    unknown_mappings += 1;
                    in_to_out.push(out_unk);
                }
            }
        }
        Ok(VocabBridge { out_to_in, in_to_out, unknown_mappings })
    }

    /// Input-space index for a generated output symbol. Feeds the shared
    /// embedding during decoding.
    pub fn input_index(&self, out_idx: usize) -> usize {
        self.out_to_in[out_idx]
    }

    /// Output-space index for an input symbol. Remaps shared-vocab targets
    /// into loss space.
    pub fn output_index(&self, in_idx: usize) -> usize {
        self.in_to_out[in_idx]
    }

    /// Remaps a slice of output indices into the input space.
    pub fn map_to_input(&self, out_ids: &[usize]) -> Vec<usize> {
        out_ids.iter().map(|&i| self.out_to_in[i]).collect()
    }

    /// Remaps a slice of input indices into the output space.
    pub fn map_to_output(&self, in_ids: &[usize]) -> Vec<usize> {
        in_ids.iter().map(|&i| self.in_to_out[i]).collect()
    }

    /// Count of build-time lookups that fell back to `<UNK>`.
    pub fn unknown_mappings(&self) -> usize {
        self.unknown_mappings
    }
}
