/// Minimal tensor utilities for the solver core.
///
/// All operations are free functions on flat f32 slices with explicit
/// dimensions. No generics, no traits on buffers — recurrent cells and the
/// output projection are plain matvec loops. Row-major layout throughout.

/// Matrix multiply: C[M,N] = A[M,K] @ B[K,N].  Row-major.
/// `out` must be pre-allocated with M*N elements (will be overwritten).
pub fn matmul_f32(a: &[f32], b: &[f32], out: &mut [f32], m: usize, k: usize, n: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(out.len(), m * n);

    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += a[i * k + p] * b[p * n + j];
            }
            out[i * n + j] = sum;
        }
    }
}

/// Matrix-vector multiply: out[M] = W[M,K] @ x[K].  Row-major.
pub fn matvec_f32(w: &[f32], x: &[f32], out: &mut [f32], m: usize, k: usize) {
    debug_assert_eq!(w.len(), m * k);
    debug_assert_eq!(x.len(), k);
    debug_assert_eq!(out.len(), m);

    for i in 0..m {
        let row = &w[i * k..(i + 1) * k];
        let mut sum = 0.0f32;
        for p in 0..k {
            sum += row[p] * x[p];
        }
        out[i] = sum;
    }
}

/// Matrix-vector multiply with accumulation: out[M] += W[M,K] @ x[K].
pub fn matvec_acc_f32(w: &[f32], x: &[f32], out: &mut [f32], m: usize, k: usize) {
    debug_assert_eq!(w.len(), m * k);
    debug_assert_eq!(x.len(), k);
    debug_assert_eq!(out.len(), m);

    for i in 0..m {
        let row = &w[i * k..(i + 1) * k];
        let mut sum = 0.0f32;
        for p in 0..k {
            sum += row[p] * x[p];
        }
        out[i] += sum;
    }
}

/// Row-wise softmax: each row of length `cols` in `scores` gets softmaxed into `out`.
/// `rows` * `cols` elements.
pub fn softmax_f32(scores: &[f32], out: &mut [f32], rows: usize, cols: usize) {
    debug_assert_eq!(scores.len(), rows * cols);
    debug_assert_eq!(out.len(), rows * cols);

    for r in 0..rows {
        let base = r * cols;
        let row = &scores[base..base + cols];

        // Numerically stable: subtract max
        let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum_exp = 0.0f32;
        for c in 0..cols {
            let e = (row[c] - max_val).exp();
            out[base + c] = e;
            sum_exp += e;
        }
        if sum_exp > 0.0 {
            for c in 0..cols {
                out[base + c] /= sum_exp;
            }
        }
    }
}

/// Row-wise log-softmax: out[r, c] = x[r, c] - max_r - ln(sum(exp(x_r - max_r))).
///
/// Rows where every entry is -inf (fully masked) produce -inf outputs rather
/// than NaN; the loss side masks those positions by weight.
pub fn log_softmax_f32(scores: &[f32], out: &mut [f32], rows: usize, cols: usize) {
    debug_assert_eq!(scores.len(), rows * cols);
    debug_assert_eq!(out.len(), rows * cols);

    for r in 0..rows {
        let base = r * cols;
        let row = &scores[base..base + cols];

        let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if max_val == f32::NEG_INFINITY {
            for c in 0..cols {
                out[base + c] = f32::NEG_INFINITY;
            }
            continue;
        }
        let mut sum_exp = 0.0f32;
        for c in 0..cols {
            sum_exp += (row[c] - max_val).exp();
        }
        let log_z = max_val + sum_exp.ln();
        for c in 0..cols {
            out[base + c] = row[c] - log_z;
        }
    }
}

/// Index of the largest element in a row. Ties resolve to the lowest index,
/// matching greedy top-1 selection. Rows of all -inf resolve to index 0.
pub fn argmax_f32(row: &[f32]) -> usize {
    let mut best = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in row.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}

/// Sigmoid: 1 / (1 + exp(-x)). Clamped to avoid overflow.
#[inline]
pub fn sigmoid_f32(x: f32) -> f32 {
    if x >= 15.0 { return 1.0; }
    if x <= -15.0 { return 0.0; }
    1.0 / (1.0 + (-x).exp())
}

/// Simple xorshift64 PRNG for deterministic weight init and the
/// teacher-forcing coin flip. Not crypto-safe.
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        SimpleRng { state: seed.max(1) } // avoid zero state
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Uniform in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        ((self.next_u64() >> 11) as f64 / (1u64 << 53) as f64) as f32
    }

    /// Uniform in [-scale, scale].
    pub fn uniform(&mut self, scale: f32) -> f32 {
        let u = (self.next_u64() as f64) / (u64::MAX as f64);
        (2.0 * u as f32 - 1.0) * scale
    }

    /// Fill slice with uniform random values in [-scale, scale].
    pub fn fill_uniform(&mut self, buf: &mut [f32], scale: f32) {
        for v in buf.iter_mut() {
            *v = self.uniform(scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_identity() {
        let a = [1.0, 0.0, 0.0, 1.0f32];
        let b = [1.0, 2.0, 3.0, 4.0f32];
        let mut out = [0.0f32; 4];
        matmul_f32(&a, &b, &mut out, 2, 2, 2);
        assert_eq!(out, b);
    }

    #[test]
    fn test_matvec_known_values() {
        let w = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0f32]; // [2,3]
        let x = [1.0, 0.0, -1.0f32];
        let mut out = [0.0f32; 2];
        matvec_f32(&w, &x, &mut out, 2, 3);
        assert_eq!(out, [-2.0, -2.0]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let scores = [0.0, 1.0, 2.0, -1.0, -1.0, -1.0f32];
        let mut out = [0.0f32; 6];
        softmax_f32(&scores, &mut out, 2, 3);
        for r in 0..2 {
            let sum: f32 = out[r * 3..(r + 1) * 3].iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "row {r} sums to {sum}");
        }
    }

    #[test]
    fn test_log_softmax_matches_softmax_log() {
        let scores = [0.3, -1.2, 2.5, 0.0f32];
        let mut sm = [0.0f32; 4];
        let mut lsm = [0.0f32; 4];
        softmax_f32(&scores, &mut sm, 1, 4);
        log_softmax_f32(&scores, &mut lsm, 1, 4);
        for i in 0..4 {
            assert!((lsm[i] - sm[i].ln()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_log_softmax_fully_masked_row() {
        let scores = [f32::NEG_INFINITY; 3];
        let mut out = [0.0f32; 3];
        log_softmax_f32(&scores, &mut out, 1, 3);
        assert!(out.iter().all(|v| *v == f32::NEG_INFINITY));
    }

    #[test]
    fn test_argmax_ties_take_lowest_index() {
        assert_eq!(argmax_f32(&[1.0, 3.0, 3.0, 0.0]), 1);
        assert_eq!(argmax_f32(&[f32::NEG_INFINITY; 4]), 0);
    }

    #[test]
    fn test_rng_deterministic() {
        let mut rng1 = SimpleRng::new(42);
        let mut rng2 = SimpleRng::new(42);
        for _ in 0..100 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_next_f32_in_unit_interval() {
        let mut rng = SimpleRng::new(7);
        for _ in 0..1000 {
            let u = rng.next_f32();
            assert!((0.0..1.0).contains(&u));
        }
    }
}
