//! The stepwise decode driver and model facade.
//!
//! A forward pass is a sequential loop over decode steps — each step's input
//! depends on the previous step's selection, so there is no parallelism
//! across steps. Within a batch every example advances in lockstep; grammar
//! filtering and greedy selection are applied per example inside the step.
//!
//! Teacher forcing is decided by a single coin flip per forward call, never
//! per step: a sequence is either fully teacher-forced or fully free-running.
//! This matches the original training dynamics and is intentional.

use std::fmt;

use crate::answer::{AnswerDecoder, DecodeStats};
use crate::batch::{Batch, BatchError};
use crate::grammar::GrammarFilter;
use crate::loss::{LossError, NllLoss};
use crate::model::{resolve_sos, ConfigError, SolverConfig, SolverParams};
use crate::rnn::{cell_step, encode_sequence, HiddenState};
use crate::tensor::{argmax_f32, log_softmax_f32, matvec_acc_f32, SimpleRng};
use crate::vocab::{SymbolVocab, VocabBridge, VocabError};

/// Any failure surfaced by the solver. Construction-time variants are fatal;
/// batch/loss variants indicate a caller-side shape bug.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    Config(ConfigError),
    Vocab(VocabError),
    Batch(BatchError),
    Loss(LossError),
    /// An operation that needs ground-truth targets got a batch without them.
    MissingTarget,
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Config(e) => write!(f, "config: {e}"),
            SolverError::Vocab(e) => write!(f, "vocab: {e}"),
            SolverError::Batch(e) => write!(f, "batch: {e}"),
            SolverError::Loss(e) => write!(f, "loss: {e}"),
            SolverError::MissingTarget => write!(f, "batch has no target equations"),
        }
    }
}

impl std::error::Error for SolverError {}

impl From<ConfigError> for SolverError {
    fn from(e: ConfigError) -> Self {
        SolverError::Config(e)
    }
}

impl From<VocabError> for SolverError {
    fn from(e: VocabError) -> Self {
        SolverError::Vocab(e)
    }
}

impl From<BatchError> for SolverError {
    fn from(e: BatchError) -> Self {
        SolverError::Batch(e)
    }
}

impl From<LossError> for SolverError {
    fn from(e: LossError) -> Self {
        SolverError::Loss(e)
    }
}

/// Stacked per-step outputs of one forward pass.
///
/// `token_logits` holds the *raw* projection scores `[batch, steps, symbols]`
/// (the loss consumes these); grammar masking happens on a scratch copy used
/// only for selection, so illegal symbols still receive gradient pressure.
/// `symbols` holds the grammar-constrained greedy selections `[batch, steps]`.
#[derive(Clone, Debug)]
pub struct DecodeOutput {
    pub token_logits: Vec<f32>,
    pub symbols: Vec<usize>,
    pub steps: usize,
    pub symbol_size: usize,
}

impl DecodeOutput {
    pub fn symbol_row(&self, b: usize) -> &[usize] {
        &self.symbols[b * self.steps..(b + 1) * self.steps]
    }
}

/// The equation solver model: embeddings, recurrent encoder/decoder, grammar
/// filter, vocabulary bridge, and the loss accumulator owned by the current
/// training step.
pub struct Solver {
    cfg: SolverConfig,
    params: SolverParams,
    input_vocab: SymbolVocab,
    output_vocab: SymbolVocab,
    bridge: VocabBridge,
    grammar: GrammarFilter,
    /// Embedding-space id of `<SOS>` (input space when vocab is shared).
    sos_id: usize,
    loss: NllLoss,
}

impl Solver {
    /// Builds a solver with freshly initialized parameters.
    ///
    /// All structural-token requirements are checked here; decode loops never
    /// re-validate vocabulary shape.
    pub fn new(
        cfg: SolverConfig,
        input_vocab: SymbolVocab,
        output_vocab: SymbolVocab,
        seed: u64,
    ) -> Result<Self, SolverError> {
        cfg.validate()?;
        let bridge = VocabBridge::new(&input_vocab, &output_vocab)?;
        let grammar = GrammarFilter::new(&output_vocab);
        let sos_id = resolve_sos(&cfg, &input_vocab, &output_vocab)?;
        let loss = NllLoss::new(output_vocab.len(), output_vocab.pad());
        let params = SolverParams::init(&cfg, input_vocab.len(), output_vocab.len(), seed);
        Ok(Solver { cfg, params, input_vocab, output_vocab, bridge, grammar, sos_id, loss })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.cfg
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut SolverParams {
        &mut self.params
    }

    pub fn bridge(&self) -> &VocabBridge {
        &self.bridge
    }

    pub fn grammar(&self) -> &GrammarFilter {
        &self.grammar
    }

    pub fn input_vocab(&self) -> &SymbolVocab {
        &self.input_vocab
    }

    pub fn output_vocab(&self) -> &SymbolVocab {
        &self.output_vocab
    }

    /// Encodes every example and hands each final hidden state to the
    /// decoder's arity.
    fn encode_batch(&self, batch: &Batch) -> Vec<HiddenState> {
        let e = self.cfg.embedding_size;
        let h = self.cfg.hidden_size;
        let mut embedded = vec![0.0f32; batch.max_in_len * e];
        let mut hiddens = Vec::with_capacity(batch.batch_size());
        for b in 0..batch.batch_size() {
            let row = batch.input_row(b);
            let len = batch.input_lens[b];
            for t in 0..len {
                embedded[t * e..(t + 1) * e]
                    .copy_from_slice(self.params.input_embedding(row[t], e));
            }
            let enc = encode_sequence(
                self.cfg.encoder_cell,
                &self.params.encoder,
                &embedded[..len * e],
                len,
                e,
                h,
            );
            hiddens.push(enc.reconcile(self.cfg.decoder_cell.arity()));
        }
        hiddens
    }

    /// One full forward pass.
    ///
    /// With `with_target` (and targets present) the loop runs exactly the
    /// target length and may be teacher-forced; otherwise it free-runs for
    /// `max_gen_len` steps. There is no early stop on the end marker — the
    /// answer decoder truncates.
    pub fn forward(
        &self,
        batch: &Batch,
        with_target: bool,
        rng: &mut SimpleRng,
    ) -> Result<DecodeOutput, SolverError> {
        batch.validate()?;
        let b_sz = batch.batch_size();
        let e = self.cfg.embedding_size;
        let h = self.cfg.hidden_size;
        let v = self.output_vocab.len();

        let use_target = with_target && batch.target_ids.is_some();
        let steps = if use_target { batch.target_len } else { self.cfg.max_gen_len };

        // One flip for the whole pass, drawn before any step runs.
        let teacher_forced = use_target && rng.next_f32() < self.cfg.teacher_force_ratio;
        let forced_ids = if teacher_forced { batch.target_ids.as_deref() } else { None };

        let mut hiddens = self.encode_batch(batch);
        let mut token_logits = vec![0.0f32; b_sz * steps * v];
        let mut symbols = vec![0usize; b_sz * steps];
        let mut prev: Vec<Option<usize>> = vec![None; b_sz];
        let mut feedback: Vec<usize> = vec![self.sos_id; b_sz];
        let mut masked = vec![0.0f32; v];

        for t in 0..steps {
            for b in 0..b_sz {
                // Forced inputs are <SOS>-shifted implicitly: position t
                // consumes the target symbol at t-1.
                let input_id = match (t, forced_ids) {
                    (0, _) => self.sos_id,
                    (_, Some(tids)) => tids[b * batch.target_len + t - 1],
                    (_, None) => feedback[b],
                };

                let x = self.params.decoder_embedding(input_id, e);
                cell_step(self.cfg.decoder_cell, &self.params.decoder, x, &mut hiddens[b], e, h);

                let base = (b * steps + t) * v;
                let row = &mut token_logits[base..base + v];
                row.copy_from_slice(&self.params.b_out);
                matvec_acc_f32(&self.params.w_out, hiddens[b].output(), row, v, h);

                // Selection sees the filtered scores; the stored logits stay raw.
                masked.copy_from_slice(row);
                self.grammar.apply(prev[b], &mut masked);
                let sel = argmax_f32(&masked);

                symbols[b * steps + t] = sel;
                prev[b] = Some(sel);
                feedback[b] = if self.cfg.share_vocab {
                    self.bridge.input_index(sel)
                } else {
                    sel
                };
            }
        }

        Ok(DecodeOutput { token_logits, symbols, steps, symbol_size: v })
    }

    /// Training-side entry point: teacher-forced forward, log-softmax, masked
    /// NLL. Returns the accumulated mean loss for this batch.
    pub fn calculate_loss(&mut self, batch: &Batch, rng: &mut SimpleRng) -> Result<f32, SolverError> {
        if batch.target_ids.is_none() {
            return Err(SolverError::MissingTarget);
        }
        let out = self.forward(batch, true, rng)?;

        let targets = self.loss_targets(batch)?;
        let rows = batch.batch_size() * out.steps;
        let mut log_probs = vec![0.0f32; rows * out.symbol_size];
        log_softmax_f32(&out.token_logits, &mut log_probs, rows, out.symbol_size);

        self.loss.reset();
        self.loss.accumulate(&log_probs, &targets)?;
        Ok(self.loss.finalize())
    }

    /// Evaluation entry point: free-running decode, then both predicted and
    /// target expressions with placeholders resolved. Data-quality issues are
    /// reported in aggregate, never per example.
    pub fn model_test(
        &self,
        batch: &Batch,
        rng: &mut SimpleRng,
    ) -> Result<(Vec<Vec<String>>, Vec<Vec<String>>, DecodeStats), SolverError> {
        if batch.target_ids.is_none() {
            return Err(SolverError::MissingTarget);
        }
        let out = self.forward(batch, false, rng)?;
        let answer = AnswerDecoder::new(&self.output_vocab);
        let (predicted, mut stats) = answer.decode_batch(&out.symbols, out.steps, &batch.num_lists);

        let targets = self.loss_targets(batch)?;
        let (expected, target_stats) =
            answer.decode_batch(&targets, batch.target_len, &batch.num_lists);
        stats.unresolved_placeholders += target_stats.unresolved_placeholders;
        stats.invalid_indices += target_stats.invalid_indices;

        Ok((predicted, expected, stats))
    }

    /// Inference entry point: raw per-step scores plus selected symbols,
    /// free-running for `max_gen_len` steps.
    pub fn predict(&self, batch: &Batch, rng: &mut SimpleRng) -> Result<DecodeOutput, SolverError> {
        self.forward(batch, false, rng)
    }

    /// Target ids in output (loss) space. Shared-vocab targets arrive in the
    /// input space and are remapped through the precomputed bridge tables.
    fn loss_targets(&self, batch: &Batch) -> Result<Vec<usize>, SolverError> {
        let targets = batch.target_ids.as_ref().ok_or(SolverError::MissingTarget)?;
        if self.cfg.share_vocab {
            Ok(self.bridge.map_to_output(targets))
        } else {
            Ok(targets.clone())
        }
    }
}
