/// Checkpoint serialization roundtrip tests.
///
/// Verifies that config, vocabulary, and parameter structs survive JSON
/// serialization, including the shared-vs-separate embedding distinction.

use mwp_solver_core::model::{OutEmbedding, SolverConfig, SolverParams};
use mwp_solver_core::rnn::CellKind;
use mwp_solver_core::vocab::SymbolVocab;

// ── Configuration ────────────────────────────────────────────────────

#[test]
fn test_config_round_trip() {
    let cfg = SolverConfig {
        embedding_size: 32,
        hidden_size: 48,
        encoder_cell: CellKind::Lstm,
        decoder_cell: CellKind::Gru,
        share_vocab: true,
        max_gen_len: 30,
        teacher_force_ratio: 0.75,
    };
    let json = serde_json::to_string(&cfg).unwrap();
    let back: SolverConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.embedding_size, cfg.embedding_size);
    assert_eq!(back.hidden_size, cfg.hidden_size);
    assert_eq!(back.encoder_cell, cfg.encoder_cell);
    assert_eq!(back.decoder_cell, cfg.decoder_cell);
    assert_eq!(back.share_vocab, cfg.share_vocab);
    assert_eq!(back.max_gen_len, cfg.max_gen_len);
    assert_eq!(back.teacher_force_ratio, cfg.teacher_force_ratio);
    back.validate().unwrap();
}

// ── Vocabulary ───────────────────────────────────────────────────────

#[test]
fn test_vocab_round_trip_rebuilds_index() {
    let symbols = ["<PAD>", "<SOS>", "<EOS>", "<UNK>", "+", "*", "NUM0", "NUM1"];
    let v = SymbolVocab::new(symbols.iter().map(|s| s.to_string()).collect(), 6).unwrap();

    let json = serde_json::to_string(&v).unwrap();
    let mut back: SymbolVocab = serde_json::from_str(&json).unwrap();
    // The string→index map is skipped on the wire and must be rebuilt.
    back.rebuild_index();

    assert_eq!(back.len(), v.len());
    assert_eq!(back.num_start(), v.num_start());
    for (i, s) in symbols.iter().enumerate() {
        assert_eq!(back.index_of(s), Some(i), "index_of({s}) mismatch");
        assert_eq!(back.symbol(i), Some(*s), "symbol({i}) mismatch");
    }
    assert_eq!(back.pad(), Some(0));
    assert_eq!(back.sos(), Some(1));
    assert_eq!(back.eos(), Some(2));
}

// ── Parameters ───────────────────────────────────────────────────────

#[test]
fn test_params_round_trip_separate_table() {
    let cfg = SolverConfig::test_config();
    let params = SolverParams::init(&cfg, 18, 14, 42);

    let json = serde_json::to_string(&params).unwrap();
    let back: SolverParams = serde_json::from_str(&json).unwrap();

    assert_eq!(back.in_embed, params.in_embed, "in_embed mismatch");
    assert_eq!(back.w_out, params.w_out, "w_out mismatch");
    assert_eq!(back.b_out, params.b_out, "b_out mismatch");
    assert_eq!(back.num_params(), params.num_params());
    match (&back.out_embed, &params.out_embed) {
        (OutEmbedding::Separate(a), OutEmbedding::Separate(b)) => assert_eq!(a, b),
        _ => panic!("separate embedding table did not survive the round trip"),
    }
}

#[test]
fn test_params_round_trip_shared_table() {
    let cfg = SolverConfig { share_vocab: true, ..SolverConfig::test_config() };
    let params = SolverParams::init(&cfg, 18, 14, 42);

    let json = serde_json::to_string(&params).unwrap();
    let back: SolverParams = serde_json::from_str(&json).unwrap();

    assert!(matches!(back.out_embed, OutEmbedding::Shared));
    assert_eq!(back.in_embed, params.in_embed, "in_embed mismatch");
    assert_eq!(back.num_params(), params.num_params());
}
