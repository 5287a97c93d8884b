//! Fixed-shape batch records handed over by the data-loading side.
//!
//! Construction, padding, and tokenization happen upstream; this module only
//! defines the dense layout the solver consumes and validates its shape
//! invariants once per forward pass.

use std::fmt;

/// Shape violations in an incoming batch. Fatal: a malformed batch cannot be
/// partially decoded without breaking batch-uniform tensor shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// Flat buffer length disagrees with `batch * width`.
    BadShape { field: &'static str, expected: usize, got: usize },
    /// A per-example true length exceeds the padded width.
    LengthOutOfRange { example: usize, len: usize, max: usize },
    /// Per-example metadata does not cover every example.
    MissingMetadata { field: &'static str, expected: usize, got: usize },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::BadShape { field, expected, got } => {
                write!(f, "batch field {field}: expected {expected} elements, got {got}")
            }
            BatchError::LengthOutOfRange { example, len, max } => {
                write!(f, "example {example}: length {len} exceeds padded width {max}")
            }
            BatchError::MissingMetadata { field, expected, got } => {
                write!(f, "batch field {field}: expected {expected} entries, got {got}")
            }
        }
    }
}

impl std::error::Error for BatchError {}

/// One dense batch. Batch-major, row-major flat buffers.
///
/// `input_ids` is `[batch, max_in_len]`; positions past each example's true
/// length hold the pad index. `target_ids`, when present, is
/// `[batch, target_len]` right-padded with the end marker. `num_lists` holds
/// each example's numeric literals in question order; only the answer decoder
/// reads it.
#[derive(Clone, Debug)]
pub struct Batch {
    pub input_ids: Vec<usize>,
    pub input_lens: Vec<usize>,
    pub max_in_len: usize,
    pub target_ids: Option<Vec<usize>>,
    pub target_len: usize,
    pub num_lists: Vec<Vec<String>>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.input_lens.len()
    }

    /// One example's padded input row.
    pub fn input_row(&self, b: usize) -> &[usize] {
        &self.input_ids[b * self.max_in_len..(b + 1) * self.max_in_len]
    }

    /// One example's target row, if targets are present.
    pub fn target_row(&self, b: usize) -> Option<&[usize]> {
        self.target_ids
            .as_ref()
            .map(|t| &t[b * self.target_len..(b + 1) * self.target_len])
    }

    /// Checks every shape invariant. Called once at the top of a forward pass.
    pub fn validate(&self) -> Result<(), BatchError> {
        let batch = self.batch_size();
        let expected = batch * self.max_in_len;
        if self.input_ids.len() != expected {
            return Err(BatchError::BadShape {
                field: "input_ids",
                expected,
                got: self.input_ids.len(),
            });
        }
        for (b, &len) in self.input_lens.iter().enumerate() {
            if len > self.max_in_len {
                return Err(BatchError::LengthOutOfRange { example: b, len, max: self.max_in_len });
            }
        }
        if let Some(targets) = &self.target_ids {
            let expected = batch * self.target_len;
            if targets.len() != expected {
                return Err(BatchError::BadShape {
                    field: "target_ids",
                    expected,
                    got: targets.len(),
                });
            }
        }
        if self.num_lists.len() != batch {
            return Err(BatchError::MissingMetadata {
                field: "num_lists",
                expected: batch,
                got: self.num_lists.len(),
            });
        }
        Ok(())
    }
}
