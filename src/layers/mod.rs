//! Layers operating on batches of HEALPix feature maps.
//!
//! All public tensors are laid out `[batch, pixels, channels]`, the pixel
//! axis being the flat HEALPix ordering at some resolution. burn's 1-D
//! pooling and convolution want `[batch, channels, length]`, so the
//! composition layers swap axes around those primitives.
//!
//! Every layer is built in two stages: a `*Config` carries the static
//! parameters, and its `init` resolves the index table once through an
//! [`IndexProvider`](crate::index::provider::IndexProvider).

pub mod conv;
pub mod pooling;
pub mod reorder;
pub mod resample;

use burn::prelude::*;

/// `[batch, pixels, channels]` feature maps.
pub type FeatureBatch<B> = Tensor<B, 3>;

/// Static shape of a feature batch; the batch size may be unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureShape {
    pub batch: Option<usize>,
    pub pixels: usize,
    pub channels: usize,
}

impl FeatureShape {
    pub fn new(batch: Option<usize>, pixels: usize, channels: usize) -> Self {
        Self {
            batch,
            pixels,
            channels,
        }
    }

    /// Concrete shape of a runtime tensor.
    pub fn of<B: Backend>(x: &FeatureBatch<B>) -> Self {
        let [batch, pixels, channels] = x.dims();
        Self::new(Some(batch), pixels, channels)
    }
}

/// Common surface of the bound layers.
pub trait SphereLayer<B: Backend> {
    /// Apply the layer to `[batch, pixels, channels]` maps.
    fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B>;

    /// Shape produced for inputs of shape `input`.
    fn output_shape(&self, input: FeatureShape) -> FeatureShape;
}

/// Run a channels-first primitive on channels-last maps.
pub(crate) fn channels_first<B: Backend>(
    x: FeatureBatch<B>,
    op: impl FnOnce(Tensor<B, 3>) -> Tensor<B, 3>,
) -> FeatureBatch<B> {
    op(x.swap_dims(1, 2)).swap_dims(1, 2)
}

/// Output length of a window of `block` applied with stride `block`.
#[inline]
pub(crate) fn blocks(pixels: usize, block: usize) -> usize {
    pixels / block
}
