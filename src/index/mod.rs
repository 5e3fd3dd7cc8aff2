//! Gather index tables.
//!
//! Entry `i` of a table holds the flat input position of the pixel that
//! lands at output position `i`. The value equal to the input length (the
//! sentinel) selects the zero row the reorder layer appends to its input.
//!
//! Multi-tap tables are stored row-major with `width` entries per row, so
//! each output pixel's taps form one contiguous block.

pub mod npy;
pub mod provider;

use serde::{Deserialize, Serialize};

use crate::error::{HealpixError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTable {
    values: Vec<usize>,
    width: usize,
}

impl IndexTable {
    /// Build a table from flat row-major values with `width` taps per row.
    pub fn new(values: Vec<usize>, width: usize) -> Result<Self> {
        if width == 0 {
            return Err(HealpixError::InvalidTable("row width must be positive".into()));
        }
        if values.len() % width != 0 {
            return Err(HealpixError::InvalidTable(format!(
                "{} entries do not split into rows of {}",
                values.len(),
                width
            )));
        }
        Ok(Self { values, width })
    }

    /// One-dimensional table (one tap per output position).
    pub fn flat(values: Vec<usize>) -> Self {
        Self { values, width: 1 }
    }

    #[inline]
    pub fn values(&self) -> &[usize] {
        &self.values
    }

    /// Total number of entries, i.e. the reordered spatial length.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.values.len() / self.width
    }

    pub fn min_index(&self) -> Option<usize> {
        self.values.iter().copied().min()
    }

    pub fn max_index(&self) -> Option<usize> {
        self.values.iter().copied().max()
    }

    /// Number of entries pointing at the zero row for an input of `input_len`.
    pub fn sentinel_count(&self, input_len: usize) -> usize {
        self.values.iter().filter(|&&v| v == input_len).count()
    }

    /// Check every entry is a valid position in `[0, input_len)` or the sentinel.
    pub fn validate(&self, input_len: usize) -> Result<()> {
        match self.values.iter().position(|&v| v > input_len) {
            Some(pos) => Err(HealpixError::InvalidTable(format!(
                "entry {} = {} exceeds sentinel {}",
                pos, self.values[pos], input_len
            ))),
            None => Ok(()),
        }
    }

    /// Entries as the signed integers burn uses for index tensors.
    pub(crate) fn to_i64(&self) -> Vec<i64> {
        self.values.iter().map(|&v| v as i64).collect()
    }
}
