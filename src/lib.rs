//! Neural-network layers over HEALPix spherical maps.
//!
//! HEALPix maps are flat pixel arrays whose meaningful neighbourhoods are
//! not contiguous. Each layer here reorders (gathers) the pixel axis with a
//! precomputed index table so that a plain 1-D pooling or convolution from
//! burn approximates the spherical operation.
//!
//! ```ignore
//! use nnhealpix::index::provider::ProviderConfig;
//! use nnhealpix::layers::resample::DowngradeConfig;
//!
//! let provider = ProviderConfig::new().init(my_generator);
//! let layer = DowngradeConfig::new(8, 4).init::<B, _>(&provider, &device)?;
//! let y = layer.forward(x); // [batch, 768, C] -> [batch, 192, C]
//! ```

pub mod error;
pub mod healpix;
pub mod index;
pub mod layers;

pub use error::{GeneratorError, HealpixError, Result};
pub use index::provider::{IndexGenerator, IndexProvider, ProviderConfig, TransformKind};
pub use index::IndexTable;
pub use layers::conv::{DowngradeConv, DowngradeConvConfig, NeighbourConv, NeighbourConvConfig};
pub use layers::pooling::{AveragePooling, MaxPooling, Pool1dOp, Pooling, PoolingConfig};
pub use layers::reorder::{Reorder, ReorderConfig};
pub use layers::resample::{Downgrade, DowngradeConfig, Upsample, UpsampleConfig};
pub use layers::{FeatureBatch, FeatureShape, SphereLayer};
