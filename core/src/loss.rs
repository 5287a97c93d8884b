//! Masked negative-log-likelihood accumulation.
//!
//! One accumulator instance belongs to the training loop's current
//! optimization step: `reset()` at the step's start, one or more
//! `accumulate()` calls, `finalize()` for the reported value. It must never
//! be shared across concurrent steps.
//!
//! Padding is masked through the class-weight vector (pad weight 0), not an
//! explicit sequence mask — the weight vector is the masking mechanism.

use std::fmt;

/// Loss-side failures. Shape mismatches are fatal: silently broadcasting
/// would hide a batching bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LossError {
    ShapeMismatch { log_probs: usize, targets: usize, classes: usize },
    /// A target index outside `[0, classes)`.
    TargetOutOfRange { position: usize, target: usize, classes: usize },
}

impl fmt::Display for LossError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossError::ShapeMismatch { log_probs, targets, classes } => {
                write!(
                    f,
                    "log_probs has {log_probs} elements, expected {targets} targets x {classes} classes"
                )
            }
            LossError::TargetOutOfRange { position, target, classes } => {
                write!(f, "target {target} at position {position} out of range for {classes} classes")
            }
        }
    }
}

impl std::error::Error for LossError {}

/// Average NLL loss with per-class weights.
///
/// `accumulate` expects log-probabilities (log-softmax applied upstream) and
/// adds the weighted mean over the flattened batch×time positions; `finalize`
/// returns the mean of those per-call means, or 0 when nothing accumulated.
#[derive(Clone, Debug)]
pub struct NllLoss {
    weight: Vec<f32>,
    acc_loss: f32,
    norm_term: usize,
}

impl NllLoss {
    /// Uniform weights over `classes`, with `pad`'s weight zeroed when given.
    pub fn new(classes: usize, pad: Option<usize>) -> Self {
        let mut weight = vec![1.0f32; classes];
        if let Some(p) = pad {
            if p < classes {
                weight[p] = 0.0;
            }
        }
        NllLoss { weight, acc_loss: 0.0, norm_term: 0 }
    }

    pub fn classes(&self) -> usize {
        self.weight.len()
    }

    /// Clears accumulated loss and the step counter. Call once per
    /// optimization unit before accumulating.
    pub fn reset(&mut self) {
        self.acc_loss = 0.0;
        self.norm_term = 0;
    }

    /// Adds the weighted mean NLL over `targets.len()` positions.
    ///
    /// `log_probs` is `[positions, classes]` flattened row-major.
    pub fn accumulate(&mut self, log_probs: &[f32], targets: &[usize]) -> Result<(), LossError> {
        let classes = self.weight.len();
        if log_probs.len() != targets.len() * classes {
            return Err(LossError::ShapeMismatch {
                log_probs: log_probs.len(),
                targets: targets.len(),
                classes,
            });
        }

        let mut total = 0.0f32;
        let mut weight_sum = 0.0f32;
        for (pos, &target) in targets.iter().enumerate() {
            if target >= classes {
                return Err(LossError::TargetOutOfRange { position: pos, target, classes });
            }
            let w = self.weight[target];
            if w == 0.0 {
                continue;
            }
            total += w * -log_probs[pos * classes + target];
            weight_sum += w;
        }

        // All positions padded: contributes a zero step, not a NaN.
        let batch_loss = if weight_sum > 0.0 { total / weight_sum } else { 0.0 };
        self.acc_loss += batch_loss;
        self.norm_term += 1;
        Ok(())
    }

    /// Mean of the accumulated per-call means; 0 when nothing accumulated.
    pub fn finalize(&self) -> f32 {
        if self.norm_term == 0 {
            return 0.0;
        }
        self.acc_loss / self.norm_term as f32
    }
}
