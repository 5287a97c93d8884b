//! Solver model configuration and parameters.
//!
//! Configuration is immutable after construction. In particular the
//! shared-vocabulary decision is made exactly once: when `share_vocab` is
//! set, the decoder's embedding *is* the encoder's input table
//! ([`OutEmbedding::Shared`]), never a second table discovered to alias it
//! at call time.
//!
//! All weight matrices are flat Vec<f32> in row-major layout.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rnn::{CellKind, CellParams};
use crate::tensor::SimpleRng;
use crate::vocab::{SymbolVocab, SOS_TOKEN};

/// Invalid model setup, detected at construction. Fatal, never recovered.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A structural token the model needs is absent from the vocabulary that
    /// must carry it (e.g. `<SOS>` on the embedding side).
    MissingToken { token: &'static str, side: &'static str },
    /// `teacher_force_ratio` outside [0, 1].
    BadTeacherForceRatio(f32),
    /// Zero-sized dimension or generation budget.
    BadDimension { field: &'static str, value: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingToken { token, side } => {
                write!(f, "{side} vocabulary has no {token} token")
            }
            ConfigError::BadTeacherForceRatio(r) => {
                write!(f, "teacher_force_ratio {r} not in [0, 1]")
            }
            ConfigError::BadDimension { field, value } => {
                write!(f, "{field} must be positive, got {value}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Model configuration — immutable after construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverConfig {
    pub embedding_size: usize,
    pub hidden_size: usize,
    pub encoder_cell: CellKind,
    pub decoder_cell: CellKind,
    /// One embedding table over the input space for both encoder and decoder.
    pub share_vocab: bool,
    /// Decode-step budget when no target dictates the length.
    pub max_gen_len: usize,
    /// Probability that a whole forward pass is teacher-forced.
    pub teacher_force_ratio: f32,
}

impl SolverConfig {
    /// Test configuration: tiny model for fast iteration.
    pub fn test_config() -> Self {
        SolverConfig {
            embedding_size: 16,
            hidden_size: 24,
            encoder_cell: CellKind::Gru,
            decoder_cell: CellKind::Gru,
            share_vocab: false,
            max_gen_len: 12,
            teacher_force_ratio: 0.9,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.teacher_force_ratio) || self.teacher_force_ratio.is_nan() {
            return Err(ConfigError::BadTeacherForceRatio(self.teacher_force_ratio));
        }
        for (field, value) in [
            ("embedding_size", self.embedding_size),
            ("hidden_size", self.hidden_size),
            ("max_gen_len", self.max_gen_len),
        ] {
            if value == 0 {
                return Err(ConfigError::BadDimension { field, value });
            }
        }
        Ok(())
    }
}

/// Decoder-side embedding: either the encoder's table, shared by both roles,
/// or an independent table over the output space.
#[derive(Clone, Serialize, Deserialize)]
pub enum OutEmbedding {
    Shared,
    Separate(Vec<f32>),
}

/// All learnable parameters — flat Vec<f32>.
///
/// Layout (row-major):
///   in_embed:  [in_vocab, embedding_size]
///   out_embed: [out_vocab, embedding_size] when Separate
///   encoder / decoder: stacked cell weights (see CellParams)
///   w_out:     [out_vocab, hidden_size]
///   b_out:     [out_vocab]
#[derive(Clone, Serialize, Deserialize)]
pub struct SolverParams {
    pub in_embed: Vec<f32>,
    pub out_embed: OutEmbedding,
    pub encoder: CellParams,
    pub decoder: CellParams,
    pub w_out: Vec<f32>,
    pub b_out: Vec<f32>,
}

impl SolverParams {
    /// Initialize with small random values using Xavier-like scaling.
    pub fn init(cfg: &SolverConfig, in_vocab: usize, out_vocab: usize, seed: u64) -> Self {
        let mut rng = SimpleRng::new(seed);
        let e = cfg.embedding_size;
        let h = cfg.hidden_size;

        let embed_scale = (1.0 / e as f32).sqrt();
        let out_scale = (1.0 / h as f32).sqrt();

        let mut in_embed = vec![0.0f32; in_vocab * e];
        rng.fill_uniform(&mut in_embed, embed_scale);

        let out_embed = if cfg.share_vocab {
            OutEmbedding::Shared
        } else {
            let mut table = vec![0.0f32; out_vocab * e];
            rng.fill_uniform(&mut table, embed_scale);
            OutEmbedding::Separate(table)
        };

        let encoder = CellParams::init(cfg.encoder_cell, e, h, &mut rng);
        let decoder = CellParams::init(cfg.decoder_cell, e, h, &mut rng);

        let mut w_out = vec![0.0f32; out_vocab * h];
        rng.fill_uniform(&mut w_out, out_scale);

        SolverParams { in_embed, out_embed, encoder, decoder, w_out, b_out: vec![0.0; out_vocab] }
    }

    /// Create a zero-initialized shadow for gradient accumulation by an
    /// external optimizer.
    pub fn zeros_like(cfg: &SolverConfig, in_vocab: usize, out_vocab: usize) -> Self {
        let e = cfg.embedding_size;
        let h = cfg.hidden_size;
        SolverParams {
            in_embed: vec![0.0; in_vocab * e],
            out_embed: if cfg.share_vocab {
                OutEmbedding::Shared
            } else {
                OutEmbedding::Separate(vec![0.0; out_vocab * e])
            },
            encoder: CellParams::zeros_like(cfg.encoder_cell, e, h),
            decoder: CellParams::zeros_like(cfg.decoder_cell, e, h),
            w_out: vec![0.0; out_vocab * h],
            b_out: vec![0.0; out_vocab],
        }
    }

    /// Total number of parameters.
    pub fn num_params(&self) -> usize {
        let out_embed = match &self.out_embed {
            OutEmbedding::Shared => 0,
            OutEmbedding::Separate(t) => t.len(),
        };
        self.in_embed.len()
            + out_embed
            + self.encoder.num_params()
            + self.decoder.num_params()
            + self.w_out.len()
            + self.b_out.len()
    }

    /// Embedding row for a decoder input id. The id lives in the input space
    /// when the table is shared, in the output space otherwise.
    pub fn decoder_embedding(&self, id: usize, embedding_size: usize) -> &[f32] {
        let table = match &self.out_embed {
            OutEmbedding::Shared => &self.in_embed,
            OutEmbedding::Separate(t) => t,
        };
        &table[id * embedding_size..(id + 1) * embedding_size]
    }

    /// Embedding row for an encoder input id.
    pub fn input_embedding(&self, id: usize, embedding_size: usize) -> &[f32] {
        &self.in_embed[id * embedding_size..(id + 1) * embedding_size]
    }
}

/// Resolves the start-of-sequence id on the embedding side.
///
/// With a shared table the decoder's first input is the input-space `<SOS>`;
/// with separate tables it is the output-space one. Absence is a
/// configuration error, raised at construction rather than at decode time.
pub fn resolve_sos(
    cfg: &SolverConfig,
    input_vocab: &SymbolVocab,
    output_vocab: &SymbolVocab,
) -> Result<usize, ConfigError> {
    if cfg.share_vocab {
        input_vocab
            .sos()
            .ok_or(ConfigError::MissingToken { token: SOS_TOKEN, side: "input" })
    } else {
        output_vocab
            .sos()
            .ok_or(ConfigError::MissingToken { token: SOS_TOKEN, side: "output" })
    }
}
