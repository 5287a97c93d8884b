//! Grammar-constrained seq2seq solver for math word problems.
//!
//! Questions are encoded token by token; the decoder emits arithmetic
//! symbols one step at a time under a first-order grammar filter, and
//! numbered placeholders are resolved back to the question's literals after
//! decoding.

pub mod answer;
pub mod batch;
pub mod driver;
pub mod grammar;
pub mod loss;
pub mod model;
pub mod rnn;
pub mod tensor;
pub mod vocab;

pub use answer::{AnswerDecoder, DecodeStats};
pub use batch::{Batch, BatchError};
pub use driver::{DecodeOutput, Solver, SolverError};
pub use grammar::{GrammarFilter, PrevSymbol};
pub use loss::{LossError, NllLoss};
pub use model::{ConfigError, OutEmbedding, SolverConfig, SolverParams};
pub use rnn::{CellKind, HiddenState, StateArity};
pub use vocab::{SymbolVocab, VocabBridge, VocabError};
