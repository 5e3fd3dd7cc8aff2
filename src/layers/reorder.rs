//! Reorder (gather) layer.
//!
//! Gathers pixels along the spatial axis according to a fixed
//! [`IndexTable`]. A zero row is appended to every input first, so the
//! sentinel entry (equal to the input pixel count) yields zeros.
//!
//! Indices are clamped at call time into `[0, pixels]` using the runtime
//! pixel count of the input, so the gather never leaves the augmented
//! input even when the table was built for a larger map; anything past the
//! last real pixel reads the zero row.

use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::prelude::*;
use burn::tensor::TensorData;

use super::{FeatureBatch, FeatureShape, SphereLayer};
use crate::index::IndexTable;

/// Reorder configuration: the raw table, recoverable for serialization.
#[derive(Config, Debug)]
pub struct ReorderConfig {
    pub table: IndexTable,
    /// Pixel count of the maps the table was built for. When unset the
    /// largest table entry stands in for it.
    pub input_len: Option<usize>,
}

/// Stateless gather over the pixel axis.
#[derive(Module, Debug)]
pub struct Reorder<B: Backend> {
    /// Flattened table as an int tensor; never differentiated.
    indices: Tensor<B, 1, Int>,
    min_index: usize,
    max_index: usize,
    sentinel: usize,
    table: Ignored<IndexTable>,
}

impl ReorderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Reorder<B> {
        let len = self.table.len();
        let indices = Tensor::<B, 1, Int>::from_data(
            TensorData::new(self.table.to_i64(), [len]),
            device,
        );
        let max_index = self.table.max_index().unwrap_or(0);
        Reorder {
            indices,
            min_index: self.table.min_index().unwrap_or(0),
            max_index,
            sentinel: self.input_len.unwrap_or(max_index),
            table: Ignored(self.table.clone()),
        }
    }
}

impl<B: Backend> Reorder<B> {
    /// Gather `[batch, pixels, channels]` into `[batch, table.len(), channels]`.
    pub fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        let [batch, pixels, channels] = x.dims();
        let zero = Tensor::<B, 3>::zeros([batch, 1, channels], &x.device());
        let augmented = Tensor::cat(vec![x, zero], 1);

        // Row `pixels` is the zero row; clamp onto it.
        let indices = if self.max_index > pixels {
            self.indices.clone().clamp(0, pixels as i64)
        } else {
            self.indices.clone()
        };
        augmented.select(1, indices)
    }

    /// Integer maps are cast to the backend float type before gathering.
    pub fn forward_int(&self, x: Tensor<B, 3, Int>) -> FeatureBatch<B> {
        self.forward(x.float())
    }

    /// Number of output pixels.
    pub fn len(&self) -> usize {
        self.table.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.0.is_empty()
    }

    pub fn min_index(&self) -> usize {
        self.min_index
    }

    pub fn max_index(&self) -> usize {
        self.max_index
    }

    /// Index that reads the zero row: the input length the table was
    /// built for.
    pub fn sentinel(&self) -> usize {
        self.sentinel
    }

    pub fn table(&self) -> &IndexTable {
        &self.table.0
    }

    /// Configuration this layer can be rebuilt from.
    pub fn config(&self) -> ReorderConfig {
        let config = ReorderConfig::new(self.table.0.clone());
        if self.sentinel == self.max_index {
            config
        } else {
            config.with_input_len(Some(self.sentinel))
        }
    }
}

impl<B: Backend> SphereLayer<B> for Reorder<B> {
    fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        Reorder::forward(self, x)
    }

    fn output_shape(&self, input: FeatureShape) -> FeatureShape {
        FeatureShape::new(input.batch, self.len(), input.channels)
    }
}
