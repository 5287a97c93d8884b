/// Criterion benchmarks for the grammar-constrained decoder.
///
/// Measures grammar masking cost, full free-running decode latency across
/// hidden sizes, and the teacher-forced loss path.
///
/// Run: cargo bench --bench decode_bench
/// Reports saved to: target/criterion/

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mwp_solver_core::batch::Batch;
use mwp_solver_core::driver::Solver;
use mwp_solver_core::grammar::GrammarFilter;
use mwp_solver_core::model::SolverConfig;
use mwp_solver_core::rnn::CellKind;
use mwp_solver_core::tensor::SimpleRng;
use mwp_solver_core::vocab::SymbolVocab;

fn input_vocab() -> SymbolVocab {
    let mut symbols: Vec<String> = ["<PAD>", "<SOS>", "<EOS>", "<UNK>"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    symbols.extend((0..200).map(|i| format!("word{i}")));
    for op in ["+", "-", "*", "/", "^", "(", ")", "="] {
        symbols.push(op.to_string());
    }
    let num_start = symbols.len();
    symbols.extend((0..8).map(|i| format!("NUM{i}")));
    SymbolVocab::new(symbols, num_start).unwrap()
}

fn output_vocab() -> SymbolVocab {
    let symbols = [
        "<PAD>", "<SOS>", "<EOS>", "<UNK>", "+", "-", "*", "/", "^", "(", ")", "=", "NUM0",
        "NUM1", "NUM2", "NUM3", "NUM4", "NUM5", "NUM6", "NUM7",
    ];
    SymbolVocab::new(symbols.iter().map(|s| s.to_string()).collect(), 12).unwrap()
}

fn make_config(hidden: usize) -> SolverConfig {
    SolverConfig {
        embedding_size: hidden / 2,
        hidden_size: hidden,
        encoder_cell: CellKind::Gru,
        decoder_cell: CellKind::Gru,
        share_vocab: false,
        max_gen_len: 30,
        teacher_force_ratio: 0.9,
    }
}

fn make_batch(batch_size: usize, in_len: usize, in_vocab: usize, target_len: usize) -> Batch {
    let input_ids: Vec<usize> = (0..batch_size * in_len).map(|i| i % in_vocab).collect();
    let eos = 2;
    let target_ids: Vec<usize> = (0..batch_size * target_len)
        .map(|i| match i % target_len {
            0 => 12,           // NUM0
            1 => 4,            // +
            2 => 13,           // NUM1
            _ => eos,
        })
        .collect();
    Batch {
        input_ids,
        input_lens: vec![in_len; batch_size],
        max_in_len: in_len,
        target_ids: Some(target_ids),
        target_len,
        num_lists: vec![vec!["3".into(), "5".into()]; batch_size],
    }
}

/// Per-step masking cost: one classify lookup plus -inf writes.
fn bench_grammar_apply(c: &mut Criterion) {
    let vocab = output_vocab();
    let filter = GrammarFilter::new(&vocab);
    let plus = vocab.index_of("+");
    let mut logits = vec![0.5f32; vocab.len()];

    c.bench_function("grammar_apply", |b| {
        b.iter(|| {
            logits.fill(0.5);
            filter.apply(plus, &mut logits);
        });
    });
}

/// Free-running decode latency across hidden sizes.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for hidden in [64, 128, 256] {
        let cfg = make_config(hidden);
        let solver = Solver::new(cfg, input_vocab(), output_vocab(), 42).unwrap();
        let batch = make_batch(8, 24, solver.input_vocab().len(), 8);

        group.bench_with_input(BenchmarkId::new("free_running", format!("h={hidden}")), &hidden, |b, _| {
            let mut rng = SimpleRng::new(7);
            b.iter(|| solver.predict(&batch, &mut rng));
        });
    }
    group.finish();
}

/// Teacher-forced forward plus masked NLL, the training inner loop.
fn bench_loss_path(c: &mut Criterion) {
    let cfg = make_config(128);
    let mut solver = Solver::new(cfg, input_vocab(), output_vocab(), 42).unwrap();
    let batch = make_batch(8, 24, solver.input_vocab().len(), 8);

    c.bench_function("calculate_loss", |b| {
        let mut rng = SimpleRng::new(7);
        b.iter(|| solver.calculate_loss(&batch, &mut rng));
    });
}

criterion_group!(benches, bench_grammar_apply, bench_decode, bench_loss_path);
criterion_main!(benches);
