//! Resolution changes: downgrade (reorder + average pool) and upsample
//! (reorder only).

use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::pool::{AvgPool1d, AvgPool1dConfig};
use burn::prelude::*;

use super::reorder::{Reorder, ReorderConfig};
use super::{blocks, channels_first, FeatureBatch, FeatureShape, SphereLayer};
use crate::error;
use crate::healpix;
use crate::index::provider::{IndexGenerator, IndexProvider, TransformKind};

// ─── Downgrade ────────────────────────────────────────────────────

/// Downgrade configuration.
#[derive(Config, Debug)]
pub struct DowngradeConfig {
    /// Resolution of the input maps.
    pub nside_in: usize,
    /// Resolution of the output maps.
    pub nside_out: usize,
}

/// Averages each parent pixel's children.
#[derive(Module, Debug)]
pub struct Downgrade<B: Backend> {
    reorder: Reorder<B>,
    pool: AvgPool1d,
    block: usize,
    config: Ignored<DowngradeConfig>,
}

impl DowngradeConfig {
    pub fn init<B: Backend, G: IndexGenerator>(
        &self,
        provider: &IndexProvider<G>,
        device: &B::Device,
    ) -> error::Result<Downgrade<B>> {
        let kind = TransformKind::downgrade(self.nside_in, self.nside_out)?;
        let block = kind.block();
        let table = provider.fetch(kind)?;

        Ok(Downgrade {
            reorder: ReorderConfig::new(table)
                .with_input_len(Some(kind.input_len()?))
                .init(device),
            pool: AvgPool1dConfig::new(block).with_stride(block).init(),
            block,
            config: Ignored(self.clone()),
        })
    }
}

impl<B: Backend> Downgrade<B> {
    /// `[batch, npix(nside_in), C]` -> `[batch, npix(nside_out), C]`.
    pub fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        let y = self.reorder.forward(x);
        channels_first(y, |t| self.pool.forward(t))
    }

    /// Children averaged into each output pixel.
    pub fn pool_size(&self) -> usize {
        self.block
    }

    pub fn reorder(&self) -> &Reorder<B> {
        &self.reorder
    }

    /// Configuration this layer was built from.
    pub fn config(&self) -> DowngradeConfig {
        self.config.0.clone()
    }
}

impl<B: Backend> SphereLayer<B> for Downgrade<B> {
    fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        Downgrade::forward(self, x)
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

// ─── Upsample ─────────────────────────────────────────────────────

/// Upsample configuration.
#[derive(Config, Debug)]
pub struct UpsampleConfig {
    /// Resolution of the input maps.
    pub nside_in: usize,
    /// Resolution multiplier; output maps have `nside_in * factor`.
    pub factor: usize,
}

/// Copies every parent pixel into its children. No pooling involved.
#[derive(Module, Debug)]
pub struct Upsample<B: Backend> {
    reorder: Reorder<B>,
    config: Ignored<UpsampleConfig>,
}

impl UpsampleConfig {
    pub fn nside_out(&self) -> error::Result<usize> {
        healpix::upsampled(self.nside_in, self.factor)
    }

    pub fn init<B: Backend, G: IndexGenerator>(
        &self,
        provider: &IndexProvider<G>,
        device: &B::Device,
    ) -> error::Result<Upsample<B>> {
        let kind = TransformKind::upgrade(self.nside_in, self.nside_out()?)?;
        let table = provider.fetch(kind)?;
        Ok(Upsample {
            reorder: ReorderConfig::new(table)
                .with_input_len(Some(kind.input_len()?))
                .init(device),
            config: Ignored(self.clone()),
        })
    }
}

impl<B: Backend> Upsample<B> {
    pub fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        self.reorder.forward(x)
    }

    pub fn reorder(&self) -> &Reorder<B> {
        &self.reorder
    }

    pub fn config(&self) -> UpsampleConfig {
        self.config.0.clone()
    }
}

impl<B: Backend> SphereLayer<B> for Upsample<B> {
    fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        Upsample::forward(self, x)
    }

    fn output_shape(&self, input: FeatureShape) -> FeatureShape {
        self.reorder.output_shape(input)
    }
}
