//! Converting decoded symbol indices back into expressions.
//!
//! Each example's symbol row is truncated at the first structural marker
//! (`<SOS>`, `<EOS>`, or `<PAD>`, whichever comes first) and numbered
//! placeholders are resolved against that example's numeric-literal list.
//! A placeholder whose ordinal exceeds the list is emitted verbatim and
//! counted — it signals a question/placeholder alignment problem upstream,
//! not a crash: a batched pass never raises per-example errors.

use crate::vocab::SymbolVocab;

/// Aggregate data-quality counters from one decoding call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Placeholders whose ordinal exceeded the example's numeric list.
    pub unresolved_placeholders: usize,
    /// Symbol indices outside the output vocabulary entirely.
    pub invalid_indices: usize,
}

/// Resolves output-vocabulary indices to expression tokens.
#[derive(Clone, Debug)]
pub struct AnswerDecoder<'v> {
    vocab: &'v SymbolVocab,
    sos: Option<usize>,
    eos: Option<usize>,
    pad: Option<usize>,
}

impl<'v> AnswerDecoder<'v> {
    pub fn new(vocab: &'v SymbolVocab) -> Self {
        AnswerDecoder { vocab, sos: vocab.sos(), eos: vocab.eos(), pad: vocab.pad() }
    }

    fn is_stop(&self, idx: usize) -> bool {
        Some(idx) == self.sos || Some(idx) == self.eos || Some(idx) == self.pad
    }

    /// Lazy token stream for one example. Finite (stops at the first
    /// structural marker) and restartable (clone to iterate again).
    pub fn tokens<'s>(&'s self, symbols: &'s [usize], nums: &'s [String]) -> ExpressionTokens<'s, 'v> {
        ExpressionTokens { decoder: self, symbols, nums, pos: 0, done: false }
    }

    /// Decodes one example eagerly, bumping `stats` for degraded tokens.
    pub fn decode_example(
        &self,
        symbols: &[usize],
        nums: &[String],
        stats: &mut DecodeStats,
    ) -> Vec<String> {
        let mut out = Vec::new();
        for &idx in symbols {
            if self.is_stop(idx) {
                break;
            }
            if self.vocab.is_placeholder(idx) {
                let ordinal = idx - self.vocab.num_start();
                match nums.get(ordinal) {
                    Some(value) => out.push(value.clone()),
                    None => {
                        stats.unresolved_placeholders += 1;
                        // Vocabulary range was checked by is_placeholder.
                        out.push(self.vocab.symbol(idx).unwrap_or_default().to_string());
                    }
                }
            } else {
                match self.vocab.symbol(idx) {
                    Some(sym) => out.push(sym.to_string()),
                    None => stats.invalid_indices += 1,
                }
            }
        }
        out
    }

    /// Decodes a whole batch of symbol rows (`[batch, steps]` flattened).
    pub fn decode_batch(
        &self,
        symbols: &[usize],
        steps: usize,
        num_lists: &[Vec<String>],
    ) -> (Vec<Vec<String>>, DecodeStats) {
        debug_assert_eq!(symbols.len(), steps * num_lists.len());
        let mut stats = DecodeStats::default();
        let mut out = Vec::with_capacity(num_lists.len());
        for (b, nums) in num_lists.iter().enumerate() {
            let row = &symbols[b * steps..(b + 1) * steps];
            out.push(self.decode_example(row, nums, &mut stats));
        }
        (out, stats)
    }
}

/// Iterator over one example's resolved tokens. Cloning restarts it.
#[derive(Clone, Debug)]
pub struct ExpressionTokens<'s, 'v> {
    decoder: &'s AnswerDecoder<'v>,
    symbols: &'s [usize],
    nums: &'s [String],
    pos: usize,
    done: bool,
}

impl Iterator for ExpressionTokens<'_, '_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while !self.done && self.pos < self.symbols.len() {
            let idx = self.symbols[self.pos];
            self.pos += 1;
            if self.decoder.is_stop(idx) {
                self.done = true;
                return None;
            }
            if self.decoder.vocab.is_placeholder(idx) {
                let ordinal = idx - self.decoder.vocab.num_start();
                return Some(match self.nums.get(ordinal) {
                    Some(value) => value.clone(),
                    None => self.decoder.vocab.symbol(idx).unwrap_or_default().to_string(),
                });
            }
            if let Some(sym) = self.decoder.vocab.symbol(idx) {
                return Some(sym.to_string());
            }
            // Out-of-vocabulary index: skip, counted only by the eager path.
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::SymbolVocab;

    fn vocab() -> SymbolVocab {
        let symbols = ["<PAD>", "<SOS>", "<EOS>", "<UNK>", "+", "-", "NUM0", "NUM1"];
        SymbolVocab::new(symbols.iter().map(|s| s.to_string()).collect(), 6).unwrap()
    }

    fn idx(v: &SymbolVocab, s: &str) -> usize {
        v.index_of(s).unwrap()
    }

    #[test]
    fn test_truncates_at_eos_and_resolves() {
        let v = vocab();
        let symbols = [idx(&v, "NUM0"), idx(&v, "+"), idx(&v, "NUM1"), idx(&v, "<EOS>"), idx(&v, "NUM0")];
        let nums = vec!["3".to_string(), "5".to_string()];
        let mut stats = DecodeStats::default();
        let d = AnswerDecoder::new(&v);
        let out = d.decode_example(&symbols, &nums, &mut stats);
        assert_eq!(out, vec!["3", "+", "5"]);
        assert_eq!(stats, DecodeStats::default());
    }

    #[test]
    fn test_out_of_range_ordinal_emits_placeholder() {
        let v = vocab();
        let symbols = [idx(&v, "NUM0"), idx(&v, "+"), idx(&v, "NUM1")];
        let nums = vec!["7".to_string()]; // no value for NUM1
        let mut stats = DecodeStats::default();
        let d = AnswerDecoder::new(&v);
        let out = d.decode_example(&symbols, &nums, &mut stats);
        assert_eq!(out, vec!["7", "+", "NUM1"]);
        assert_eq!(stats.unresolved_placeholders, 1);
    }

    #[test]
    fn test_iterator_is_lazy_and_restartable() {
        let v = vocab();
        let symbols = [idx(&v, "NUM0"), idx(&v, "<EOS>"), idx(&v, "NUM1")];
        let nums = vec!["3".to_string(), "5".to_string()];
        let d = AnswerDecoder::new(&v);

        let it = d.tokens(&symbols, &nums);
        let restart = it.clone();
        assert_eq!(it.collect::<Vec<_>>(), vec!["3"]);
        assert_eq!(restart.collect::<Vec<_>>(), vec!["3"]);
    }

    #[test]
    fn test_pad_and_sos_also_truncate() {
        let v = vocab();
        let d = AnswerDecoder::new(&v);
        let nums: Vec<String> = vec![];
        let mut stats = DecodeStats::default();

        let out = d.decode_example(&[idx(&v, "<PAD>"), idx(&v, "+")], &nums, &mut stats);
        assert!(out.is_empty());
        let out = d.decode_example(&[idx(&v, "<SOS>"), idx(&v, "+")], &nums, &mut stats);
        assert!(out.is_empty());
    }

    #[test]
    fn test_batch_decode_accumulates_stats() {
        let v = vocab();
        let d = AnswerDecoder::new(&v);
        let steps = 2;
        let symbols = [idx(&v, "NUM1"), idx(&v, "<EOS>"), idx(&v, "NUM1"), idx(&v, "<EOS>")];
        let num_lists = vec![vec!["1".to_string(), "2".to_string()], vec!["1".to_string()]];
        let (out, stats) = d.decode_batch(&symbols, steps, &num_lists);
        assert_eq!(out, vec![vec!["2".to_string()], vec!["NUM1".to_string()]]);
        assert_eq!(stats.unresolved_placeholders, 1);
    }
}
