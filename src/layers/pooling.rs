//! Downgrade followed by a caller-chosen 1-D pooling op.
//!
//! The pool size is always `(nside_in / nside_out)^2` and is handed to the
//! caller's factory; callers never pick it themselves.

use burn::config::Config;
use burn::nn::pool::{AvgPool1d, AvgPool1dConfig, MaxPool1d, MaxPool1dConfig};
use burn::prelude::*;

use super::reorder::{Reorder, ReorderConfig};
use super::{blocks, channels_first, FeatureBatch, FeatureShape, SphereLayer};
use crate::error;
use crate::index::provider::{IndexGenerator, IndexProvider, TransformKind};

/// A 1-D window op over `[batch, channels, length]` tensors.
pub trait Pool1dOp<B: Backend> {
    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3>;
}

impl<B: Backend> Pool1dOp<B> for MaxPool1d {
    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        MaxPool1d::forward(self, x)
    }
}

impl<B: Backend> Pool1dOp<B> for AvgPool1d {
    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        AvgPool1d::forward(self, x)
    }
}

/// Pooling configuration.
#[derive(Config, Debug)]
pub struct PoolingConfig {
    pub nside_in: usize,
    pub nside_out: usize,
}

/// Reorder into parent blocks, then pool each block.
#[derive(Debug)]
pub struct Pooling<B: Backend, P> {
    reorder: Reorder<B>,
    pool: P,
    block: usize,
    config: PoolingConfig,
}

pub type MaxPooling<B> = Pooling<B, MaxPool1d>;
pub type AveragePooling<B> = Pooling<B, AvgPool1d>;

impl PoolingConfig {
    /// Build with a custom op; `make_pool` receives the pool size.
    pub fn init_with<B, G, P, F>(
        &self,
        provider: &IndexProvider<G>,
        make_pool: F,
        device: &B::Device,
    ) -> error::Result<Pooling<B, P>>
    where
        B: Backend,
        G: IndexGenerator,
        P: Pool1dOp<B>,
        F: FnOnce(usize) -> P,
    {
        let kind = TransformKind::downgrade(self.nside_in, self.nside_out)?;
        let block = kind.block();
        let table = provider.fetch(kind)?;
        Ok(Pooling {
            reorder: ReorderConfig::new(table)
                .with_input_len(Some(kind.input_len()?))
                .init(device),
            pool: make_pool(block),
            block,
            config: self.clone(),
        })
    }

    pub fn init_max<B: Backend, G: IndexGenerator>(
        &self,
        provider: &IndexProvider<G>,
        device: &B::Device,
    ) -> error::Result<MaxPooling<B>> {
        self.init_with(
            provider,
            |k| MaxPool1dConfig::new(k).with_stride(k).init(),
            device,
        )
    }

    pub fn init_average<B: Backend, G: IndexGenerator>(
        &self,
        provider: &IndexProvider<G>,
        device: &B::Device,
    ) -> error::Result<AveragePooling<B>> {
        self.init_with(
            provider,
            |k| AvgPool1dConfig::new(k).with_stride(k).init(),
            device,
        )
    }
}

impl<B: Backend, P: Pool1dOp<B>> Pooling<B, P> {
    pub fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        let y = self.reorder.forward(x);
        channels_first(y, |t| self.pool.forward(t))
    }

    pub fn pool_size(&self) -> usize {
        self.block
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn reorder(&self) -> &Reorder<B> {
        &self.reorder
    }

    /// Configuration this layer was built from. The pool op itself is not
    /// part of it.
    pub fn config(&self) -> PoolingConfig {
        self.config.clone()
    }
}

impl<B: Backend, P: Pool1dOp<B>> SphereLayer<B> for Pooling<B, P> {
    fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        Pooling::forward(self, x)
    }

    fn output_shape(&self, input: FeatureShape) -> FeatureShape {
        let reordered = self.reorder.output_shape(input);
        FeatureShape::new(
            reordered.batch,
            blocks(reordered.pixels, self.block),
            reordered.channels,
        )
    }
}
