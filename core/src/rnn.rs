//! Recurrent cells: the opaque sequence transforms behind the decode loop.
//!
//! The driver only depends on the seam exposed here — a hidden state, a
//! per-step update, and the arity conversion between single-state (rnn/gru)
//! and dual-state (lstm) cells. The cell math itself is swappable; these are
//! plain flat-f32 reference implementations.

use serde::{Deserialize, Serialize};

use crate::tensor::{matvec_acc_f32, sigmoid_f32, SimpleRng};

/// Recurrent cell kind for the encoder and decoder, chosen independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Rnn,
    Gru,
    Lstm,
}

impl CellKind {
    /// Gate rows per hidden unit in the stacked weight matrices.
    pub fn gates(self) -> usize {
        match self {
            CellKind::Rnn => 1,
            CellKind::Gru => 3,
            CellKind::Lstm => 4,
        }
    }

    pub fn arity(self) -> StateArity {
        match self {
            CellKind::Rnn | CellKind::Gru => StateArity::Single,
            CellKind::Lstm => StateArity::Dual,
        }
    }
}

/// How many state vectors a cell carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateArity {
    Single,
    Dual,
}

/// Hidden state of one example. Tagged by arity so encoder→decoder handoff
/// between different cell kinds is an explicit conversion, not a downcast.
#[derive(Clone, Debug, PartialEq)]
pub enum HiddenState {
    Single(Vec<f32>),
    Dual { h: Vec<f32>, c: Vec<f32> },
}

impl HiddenState {
    pub fn zeros(arity: StateArity, hidden_size: usize) -> Self {
        match arity {
            StateArity::Single => HiddenState::Single(vec![0.0; hidden_size]),
            StateArity::Dual => {
                HiddenState::Dual { h: vec![0.0; hidden_size], c: vec![0.0; hidden_size] }
            }
        }
    }

    /// The externally visible state vector (h for both arities).
    pub fn output(&self) -> &[f32] {
        match self {
            HiddenState::Single(h) => h,
            HiddenState::Dual { h, .. } => h,
        }
    }

    /// Converts to the target arity: single→dual duplicates h into the cell
    /// slot, dual→single drops the cell slot. Identity when arities match.
    pub fn reconcile(self, target: StateArity) -> HiddenState {
        match (self, target) {
            (HiddenState::Single(h), StateArity::Dual) => {
                let c = h.clone();
                HiddenState::Dual { h, c }
            }
            (HiddenState::Dual { h, .. }, StateArity::Single) => HiddenState::Single(h),
            (state, _) => state,
        }
    }
}

/// One cell's weights: stacked gate projections plus both bias vectors.
///
/// Layout (row-major):
///   w_ih: [gates * hidden, input]
///   w_hh: [gates * hidden, hidden]
///   b_ih: [gates * hidden]
///   b_hh: [gates * hidden]
/// Gate order: gru r,z,n — lstm i,f,g,o.
#[derive(Clone, Serialize, Deserialize)]
pub struct CellParams {
    pub w_ih: Vec<f32>,
    pub w_hh: Vec<f32>,
    pub b_ih: Vec<f32>,
    pub b_hh: Vec<f32>,
}

impl CellParams {
    /// Xavier-style seeded init.
    pub fn init(kind: CellKind, input_size: usize, hidden_size: usize, rng: &mut SimpleRng) -> Self {
        let g = kind.gates() * hidden_size;
        let in_scale = (2.0 / (input_size + hidden_size) as f32).sqrt();
        let hh_scale = (1.0 / hidden_size as f32).sqrt();

        let mut w_ih = vec![0.0f32; g * input_size];
        rng.fill_uniform(&mut w_ih, in_scale);
        let mut w_hh = vec![0.0f32; g * hidden_size];
        rng.fill_uniform(&mut w_hh, hh_scale);

        CellParams { w_ih, w_hh, b_ih: vec![0.0; g], b_hh: vec![0.0; g] }
    }

    pub fn zeros_like(kind: CellKind, input_size: usize, hidden_size: usize) -> Self {
        let g = kind.gates() * hidden_size;
        CellParams {
            w_ih: vec![0.0; g * input_size],
            w_hh: vec![0.0; g * hidden_size],
            b_ih: vec![0.0; g],
            b_hh: vec![0.0; g],
        }
    }

    pub fn num_params(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.b_ih.len() + self.b_hh.len()
    }
}

/// Advances one example's hidden state by one input vector.
///
/// `hidden` must already match the cell's arity (the driver reconciles at
/// the encoder→decoder handoff).
pub fn cell_step(
    kind: CellKind,
    p: &CellParams,
    x: &[f32],
    hidden: &mut HiddenState,
    input_size: usize,
    hidden_size: usize,
) {
    debug_assert_eq!(x.len(), input_size);
    let g = kind.gates() * hidden_size;

    // gi = W_ih @ x + b_ih ; gh = W_hh @ h + b_hh
    let mut gi = p.b_ih.clone();
    matvec_acc_f32(&p.w_ih, x, &mut gi, g, input_size);
    let mut gh = p.b_hh.clone();
    matvec_acc_f32(&p.w_hh, hidden.output(), &mut gh, g, hidden_size);

    match (kind, hidden) {
        (CellKind::Rnn, HiddenState::Single(h)) => {
            for i in 0..hidden_size {
                h[i] = (gi[i] + gh[i]).tanh();
            }
        }
        (CellKind::Gru, HiddenState::Single(h)) => {
            let n0 = 2 * hidden_size;
            for i in 0..hidden_size {
                let r = sigmoid_f32(gi[i] + gh[i]);
                let z = sigmoid_f32(gi[hidden_size + i] + gh[hidden_size + i]);
                let n = (gi[n0 + i] + r * gh[n0 + i]).tanh();
                h[i] = (1.0 - z) * n + z * h[i];
            }
        }
        (CellKind::Lstm, HiddenState::Dual { h, c }) => {
            let (f0, g0, o0) = (hidden_size, 2 * hidden_size, 3 * hidden_size);
            for i in 0..hidden_size {
                let ig = sigmoid_f32(gi[i] + gh[i]);
                let fg = sigmoid_f32(gi[f0 + i] + gh[f0 + i]);
                let gg = (gi[g0 + i] + gh[g0 + i]).tanh();
                let og = sigmoid_f32(gi[o0 + i] + gh[o0 + i]);
                c[i] = fg * c[i] + ig * gg;
                h[i] = og * c[i].tanh();
            }
        }
        (kind, state) => {
            debug_assert!(false, "hidden arity {:?} does not match cell kind {kind:?}", state);
        }
    }
}

/// Runs a cell over one example's embedded sequence and returns the final
/// hidden state. `embedded` is `[steps, input_size]`; only the first `len`
/// steps are consumed, so right-padding never leaks into the state.
pub fn encode_sequence(
    kind: CellKind,
    p: &CellParams,
    embedded: &[f32],
    len: usize,
    input_size: usize,
    hidden_size: usize,
) -> HiddenState {
    debug_assert!(len * input_size <= embedded.len());
    let mut hidden = HiddenState::zeros(kind.arity(), hidden_size);
    for t in 0..len {
        let x = &embedded[t * input_size..(t + 1) * input_size];
        cell_step(kind, p, x, &mut hidden, input_size, hidden_size);
    }
    hidden
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_single_to_dual_duplicates() {
        let s = HiddenState::Single(vec![1.0, 2.0]);
        match s.reconcile(StateArity::Dual) {
            HiddenState::Dual { h, c } => {
                assert_eq!(h, vec![1.0, 2.0]);
                assert_eq!(c, vec![1.0, 2.0]);
            }
            _ => panic!("expected dual state"),
        }
    }

    #[test]
    fn test_reconcile_dual_to_single_drops_cell() {
        let s = HiddenState::Dual { h: vec![1.0], c: vec![9.0] };
        assert_eq!(s.reconcile(StateArity::Single), HiddenState::Single(vec![1.0]));
    }

    #[test]
    fn test_reconcile_identity_when_arities_match() {
        let s = HiddenState::Single(vec![0.5]);
        assert_eq!(s.clone().reconcile(StateArity::Single), s);
    }

    #[test]
    fn test_gru_step_deterministic_and_bounded() {
        let mut rng = SimpleRng::new(3);
        let p = CellParams::init(CellKind::Gru, 4, 8, &mut rng);
        let x = [0.1, -0.2, 0.3, 0.0f32];

        let mut h1 = HiddenState::zeros(StateArity::Single, 8);
        let mut h2 = HiddenState::zeros(StateArity::Single, 8);
        cell_step(CellKind::Gru, &p, &x, &mut h1, 4, 8);
        cell_step(CellKind::Gru, &p, &x, &mut h2, 4, 8);
        assert_eq!(h1, h2);
        assert!(h1.output().iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn test_lstm_step_updates_both_states() {
        let mut rng = SimpleRng::new(11);
        let p = CellParams::init(CellKind::Lstm, 3, 5, &mut rng);
        let x = [1.0, -1.0, 0.5f32];
        let mut state = HiddenState::zeros(StateArity::Dual, 5);
        cell_step(CellKind::Lstm, &p, &x, &mut state, 3, 5);
        match &state {
            HiddenState::Dual { h, c } => {
                assert!(h.iter().any(|v| *v != 0.0));
                assert!(c.iter().any(|v| *v != 0.0));
            }
            _ => panic!("expected dual state"),
        }
    }

    #[test]
    fn test_encode_ignores_padding() {
        let mut rng = SimpleRng::new(5);
        let p = CellParams::init(CellKind::Gru, 2, 4, &mut rng);
        // Same prefix, different padding tail.
        let a = [0.1, 0.2, 0.3, 0.4, 0.0, 0.0f32];
        let b = [0.1, 0.2, 0.3, 0.4, 9.0, 9.0f32];
        let ha = encode_sequence(CellKind::Gru, &p, &a, 2, 2, 4);
        let hb = encode_sequence(CellKind::Gru, &p, &b, 2, 2, 4);
        assert_eq!(ha, hb);
    }
}
