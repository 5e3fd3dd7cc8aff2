//! Convolutions over reordered pixel blocks.
//!
//! After reordering, each output pixel's inputs sit in one contiguous block
//! (its children for a downgrade, itself plus its 8 neighbours for a
//! neighbour filter). A 1-D convolution with kernel = stride = block then
//! sees exactly one block per output position.

use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::Initializer;
use burn::prelude::*;

use super::reorder::{Reorder, ReorderConfig};
use super::{blocks, channels_first, FeatureBatch, FeatureShape, SphereLayer};
use crate::error;
use crate::healpix::NEIGHBOUR_KERNEL;
use crate::index::provider::{IndexGenerator, IndexProvider, TransformKind};

// ─── Downgrade + convolution ──────────────────────────────────────

/// Downgrade-and-convolve configuration.
#[derive(Config, Debug)]
pub struct DowngradeConvConfig {
    pub nside_in: usize,
    pub nside_out: usize,
    /// Channels of the input maps.
    pub channels_in: usize,
    /// Number of filters (output channels).
    pub filters: usize,
    #[config(default = false)]
    pub use_bias: bool,
    /// Frozen weights when false.
    #[config(default = true)]
    pub trainable: bool,
    #[config(default = "Initializer::Uniform{min: -0.05, max: 0.05}")]
    pub initializer: Initializer,
}

/// Learns one weight per child pixel and channel, per filter.
#[derive(Module, Debug)]
pub struct DowngradeConv<B: Backend> {
    reorder: Reorder<B>,
    conv: Conv1d<B>,
    block: usize,
    config: Ignored<DowngradeConvConfig>,
}

impl DowngradeConvConfig {
    pub fn init<B: Backend, G: IndexGenerator>(
        &self,
        provider: &IndexProvider<G>,
        device: &B::Device,
    ) -> error::Result<DowngradeConv<B>> {
        let kind = TransformKind::downgrade(self.nside_in, self.nside_out)?;
        let block = kind.block();
        let table = provider.fetch(kind)?;

        let conv = block_conv(
            self.channels_in,
            self.filters,
            block,
            self.use_bias,
            self.trainable,
            self.initializer.clone(),
            device,
        );
        Ok(DowngradeConv {
            reorder: ReorderConfig::new(table)
                .with_input_len(Some(kind.input_len()?))
                .init(device),
            conv,
            block,
            config: Ignored(self.clone()),
        })
    }
}

impl<B: Backend> DowngradeConv<B> {
    /// `[batch, npix(nside_in), channels_in]` -> `[batch, npix(nside_out), filters]`.
    pub fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        let y = self.reorder.forward(x);
        channels_first(y, |t| self.conv.forward(t))
    }

    pub fn kernel_size(&self) -> usize {
        self.block
    }

    pub fn conv(&self) -> &Conv1d<B> {
        &self.conv
    }

    pub fn reorder(&self) -> &Reorder<B> {
        &self.reorder
    }

    pub fn config(&self) -> DowngradeConvConfig {
        self.config.0.clone()
    }
}

impl<B: Backend> SphereLayer<B> for DowngradeConv<B> {
    fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        DowngradeConv::forward(self, x)
    }

    fn output_shape(&self, input: FeatureShape) -> FeatureShape {
        let reordered = self.reorder.output_shape(input);
        FeatureShape::new(
            reordered.batch,
            blocks(reordered.pixels, self.block),
            filters_of(&self.conv),
        )
    }
}

// ─── Neighbour convolution ────────────────────────────────────────

/// First-order neighbour convolution configuration.
#[derive(Config, Debug)]
pub struct NeighbourConvConfig {
    pub nside: usize,
    /// Must be 9; checked before any table lookup.
    pub kernel_size: usize,
    pub channels_in: usize,
    pub filters: usize,
    #[config(default = false)]
    pub use_bias: bool,
    #[config(default = true)]
    pub trainable: bool,
    /// Weight initializer. Unset means Glorot-uniform over the 9-tap
    /// kernel, see [`NeighbourConvConfig::glorot_limit`].
    pub initializer: Option<Initializer>,
}

/// Convolves every pixel with its 8 HEALPix neighbours. Resolution is kept.
#[derive(Module, Debug)]
pub struct NeighbourConv<B: Backend> {
    reorder: Reorder<B>,
    conv: Conv1d<B>,
    config: Ignored<NeighbourConvConfig>,
}

impl NeighbourConvConfig {
    /// Bound of the default uniform init: `sqrt(6 / (fan_in + fan_out))`
    /// with both fans counted over the 9 kernel taps.
    pub fn glorot_limit(&self) -> f64 {
        let fans = (self.channels_in + self.filters) * NEIGHBOUR_KERNEL;
        (6.0 / fans.max(1) as f64).sqrt()
    }

    pub fn init<B: Backend, G: IndexGenerator>(
        &self,
        provider: &IndexProvider<G>,
        device: &B::Device,
    ) -> error::Result<NeighbourConv<B>> {
        let kind = TransformKind::neighbour_filter(self.nside, self.kernel_size)?;
        let table = provider.fetch(kind)?;

        // burn's Xavier initializers need a fan-out that Conv1d does not pass.
        let initializer = self.initializer.clone().unwrap_or_else(|| {
            let limit = self.glorot_limit();
            Initializer::Uniform {
                min: -limit,
                max: limit,
            }
        });

        let conv = block_conv(
            self.channels_in,
            self.filters,
            NEIGHBOUR_KERNEL,
            self.use_bias,
            self.trainable,
            initializer,
            device,
        );
        Ok(NeighbourConv {
            reorder: ReorderConfig::new(table)
                .with_input_len(Some(kind.input_len()?))
                .init(device),
            conv,
            config: Ignored(self.clone()),
        })
    }
}

impl<B: Backend> NeighbourConv<B> {
    /// `[batch, npix(nside), channels_in]` -> `[batch, npix(nside), filters]`.
    pub fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        let y = self.reorder.forward(x);
        channels_first(y, |t| self.conv.forward(t))
    }

    pub fn conv(&self) -> &Conv1d<B> {
        &self.conv
    }

    pub fn reorder(&self) -> &Reorder<B> {
        &self.reorder
    }

    pub fn config(&self) -> NeighbourConvConfig {
        self.config.0.clone()
    }
}

impl<B: Backend> SphereLayer<B> for NeighbourConv<B> {
    fn forward(&self, x: FeatureBatch<B>) -> FeatureBatch<B> {
        NeighbourConv::forward(self, x)
    }

    fn output_shape(&self, input: FeatureShape) -> FeatureShape {
        let reordered = self.reorder.output_shape(input);
        FeatureShape::new(
            reordered.batch,
            blocks(reordered.pixels, NEIGHBOUR_KERNEL),
            filters_of(&self.conv),
        )
    }
}

// ─── Helpers ──────────────────────────────────────────────────────

/// Non-overlapping conv: kernel = stride = `block`.
fn block_conv<B: Backend>(
    channels_in: usize,
    filters: usize,
    block: usize,
    use_bias: bool,
    trainable: bool,
    initializer: Initializer,
    device: &B::Device,
) -> Conv1d<B> {
    let conv = Conv1dConfig::new(channels_in, filters, block)
        .with_stride(block)
        .with_bias(use_bias)
        .with_initializer(initializer)
        .init(device);
    if trainable {
        conv
    } else {
        conv.no_grad()
    }
}

/// Weight layout is `[channels_out, channels_in, kernel]`.
fn filters_of<B: Backend>(conv: &Conv1d<B>) -> usize {
    conv.weight.dims()[0]
}
