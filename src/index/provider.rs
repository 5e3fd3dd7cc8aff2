//! Index-table provider: cached `.npy` tables with on-the-fly fallback.
//!
//! Tables are looked up once, when a layer is initialized. A missing or
//! unreadable cache file is never an error; the provider asks its
//! [`IndexGenerator`] instead and returns whatever that produces (or the
//! generator's own error).

use std::path::{Path, PathBuf};

use burn::config::Config;
use tracing::{debug, info, warn};

use super::npy;
use super::IndexTable;
use crate::error::{self, GeneratorError, HealpixError};
use crate::healpix::{self, NEIGHBOUR_KERNEL};

/// Default for [`ProviderConfig::cache_dir`].
pub const DEFAULT_CACHE_DIR: &str = "ancillary_files";

// ─── Transform kinds ──────────────────────────────────────────────

/// Which table is requested, with the resolution parameters that key it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformKind {
    Downgrade { nside_in: usize, nside_out: usize },
    Upgrade { nside_in: usize, nside_out: usize },
    NeighbourFilter { nside: usize, kernel_size: usize },
}

impl TransformKind {
    pub fn downgrade(nside_in: usize, nside_out: usize) -> error::Result<Self> {
        healpix::block_size(nside_in, nside_out)?;
        Ok(Self::Downgrade {
            nside_in,
            nside_out,
        })
    }

    pub fn upgrade(nside_in: usize, nside_out: usize) -> error::Result<Self> {
        // The inverse grouping must exist.
        healpix::block_size(nside_out, nside_in)?;
        Ok(Self::Upgrade {
            nside_in,
            nside_out,
        })
    }

    /// First-order neighbour filter. Only 9-tap kernels exist.
    pub fn neighbour_filter(nside: usize, kernel_size: usize) -> error::Result<Self> {
        if kernel_size != NEIGHBOUR_KERNEL {
            return Err(HealpixError::Config(format!(
                "kernel size must be {} (got {})",
                NEIGHBOUR_KERNEL, kernel_size
            )));
        }
        if nside == 0 {
            return Err(HealpixError::Resolution("nside must be positive".into()));
        }
        Ok(Self::NeighbourFilter { nside, kernel_size })
    }

    /// File name of the cached table, relative to the cache directory.
    pub fn cache_file_name(&self) -> String {
        match *self {
            Self::Downgrade {
                nside_in,
                nside_out,
            } => format!("dgrade_from{}_to{}.npy", nside_in, nside_out),
            Self::Upgrade {
                nside_in,
                nside_out,
            } => format!("upgrade_from{}_to{}.npy", nside_in, nside_out),
            Self::NeighbourFilter { nside, kernel_size } => {
                format!("filter{}_nside{}.npy", kernel_size, nside)
            }
        }
    }

    /// Pixel count of the maps the table gathers from. Also the sentinel.
    pub fn input_len(&self) -> error::Result<usize> {
        match *self {
            Self::Downgrade { nside_in, .. } | Self::Upgrade { nside_in, .. } => {
                healpix::npix(nside_in)
            }
            Self::NeighbourFilter { nside, .. } => healpix::npix(nside),
        }
    }

    /// Contiguous entries consumed per output pixel by the following op.
    pub fn block(&self) -> usize {
        match *self {
            Self::Downgrade {
                nside_in,
                nside_out,
            } => {
                let ratio = nside_in / nside_out;
                ratio * ratio
            }
            Self::Upgrade { .. } => 1,
            Self::NeighbourFilter { kernel_size, .. } => kernel_size,
        }
    }

    /// Number of table entries a well-formed table has.
    pub fn expected_len(&self) -> error::Result<usize> {
        let (pixels, block) = match *self {
            Self::Downgrade { nside_out, .. } => (healpix::npix(nside_out)?, self.block()),
            Self::Upgrade { nside_out, .. } => (healpix::npix(nside_out)?, 1),
            Self::NeighbourFilter { nside, .. } => (healpix::npix(nside)?, self.block()),
        };
        pixels.checked_mul(block).ok_or_else(|| {
            HealpixError::Resolution(format!("{:?} table length overflows", self))
        })
    }

    /// Structural check: right length, row width compatible with the block,
    /// and every entry a valid input position or the sentinel.
    pub fn check(&self, table: &IndexTable) -> error::Result<()> {
        let expected = self.expected_len()?;
        if table.len() != expected {
            return Err(HealpixError::InvalidTable(format!(
                "{:?} needs {} entries, table has {}",
                self,
                expected,
                table.len()
            )));
        }
        if table.width() != 1 && table.width() != self.block() {
            return Err(HealpixError::InvalidTable(format!(
                "row width {} does not match block size {}",
                table.width(),
                self.block()
            )));
        }
        table.validate(self.input_len()?)
    }
}

// ─── Generator seam ───────────────────────────────────────────────

/// Computes tables from scratch when no cached copy is usable.
///
/// Implementations must emit entries grouped in contiguous blocks of
/// [`TransformKind::block`] per output pixel, in output order.
pub trait IndexGenerator {
    fn downgrade(
        &self,
        nside_in: usize,
        nside_out: usize,
    ) -> Result<IndexTable, GeneratorError>;

    fn upgrade(
        &self,
        nside_in: usize,
        nside_out: usize,
    ) -> Result<IndexTable, GeneratorError>;

    /// 9-tap first-order neighbour table for maps at `nside`.
    fn neighbour_filter(&self, nside: usize) -> Result<IndexTable, GeneratorError>;
}

impl<G: IndexGenerator + ?Sized> IndexGenerator for &G {
    fn downgrade(
        &self,
        nside_in: usize,
        nside_out: usize,
    ) -> Result<IndexTable, GeneratorError> {
        (**self).downgrade(nside_in, nside_out)
    }

    fn upgrade(
        &self,
        nside_in: usize,
        nside_out: usize,
    ) -> Result<IndexTable, GeneratorError> {
        (**self).upgrade(nside_in, nside_out)
    }

    fn neighbour_filter(&self, nside: usize) -> Result<IndexTable, GeneratorError> {
        (**self).neighbour_filter(nside)
    }
}

impl<G: IndexGenerator + ?Sized> IndexGenerator for Box<G> {
    fn downgrade(
        &self,
        nside_in: usize,
        nside_out: usize,
    ) -> Result<IndexTable, GeneratorError> {
        (**self).downgrade(nside_in, nside_out)
    }

    fn upgrade(
        &self,
        nside_in: usize,
        nside_out: usize,
    ) -> Result<IndexTable, GeneratorError> {
        (**self).upgrade(nside_in, nside_out)
    }

    fn neighbour_filter(&self, nside: usize) -> Result<IndexTable, GeneratorError> {
        (**self).neighbour_filter(nside)
    }
}

// ─── Provider ─────────────────────────────────────────────────────

/// Provider configuration.
#[derive(Config, Debug)]
pub struct ProviderConfig {
    /// Directory holding cached tables.
    #[config(default = "DEFAULT_CACHE_DIR.to_string()")]
    pub cache_dir: String,
    /// Look for cached tables before generating.
    #[config(default = true)]
    pub use_cache: bool,
    /// Persist generated tables into the cache directory so the next
    /// lookup hits the cache.
    #[config(default = false)]
    pub write_back: bool,
}

impl ProviderConfig {
    pub fn init<G: IndexGenerator>(&self, generator: G) -> IndexProvider<G> {
        IndexProvider {
            cache_dir: PathBuf::from(&self.cache_dir),
            use_cache: self.use_cache,
            write_back: self.write_back,
            generator,
        }
    }
}

/// Resolves [`TransformKind`]s to validated index tables.
#[derive(Debug)]
pub struct IndexProvider<G> {
    cache_dir: PathBuf,
    use_cache: bool,
    write_back: bool,
    generator: G,
}

impl<G: IndexGenerator> IndexProvider<G> {
    /// Provider with the default configuration.
    pub fn new(generator: G) -> Self {
        ProviderConfig::new().init(generator)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Full path of the cache file for `kind`.
    pub fn cache_path(&self, kind: &TransformKind) -> PathBuf {
        self.cache_dir.join(kind.cache_file_name())
    }

    /// Cached table if usable, otherwise a freshly generated one.
    pub fn fetch(&self, kind: TransformKind) -> error::Result<IndexTable> {
        if self.use_cache {
            if let Some(table) = self.load_cached(&kind) {
                return Ok(table);
            }
        }

        info!(?kind, "generating index table");
        let table = self.generate(&kind)?;
        kind.check(&table)?;

        if self.write_back {
            let path = self.cache_path(&kind);
            if let Err(e) = npy::write_table(&path, &table) {
                warn!(path = %path.display(), "could not cache index table: {}", e);
            }
        }
        Ok(table)
    }

    fn load_cached(&self, kind: &TransformKind) -> Option<IndexTable> {
        let path = self.cache_path(kind);
        let loaded = npy::read_table(&path).and_then(|table| kind.check(&table).map(|_| table));
        match loaded {
            Ok(table) => {
                debug!(path = %path.display(), "loaded cached index table");
                Some(table)
            }
            Err(HealpixError::Io(e)) => {
                debug!(path = %path.display(), "no cached index table: {}", e);
                None
            }
            Err(e) => {
                warn!(path = %path.display(), "ignoring cached index table: {}", e);
                None
            }
        }
    }

    fn generate(&self, kind: &TransformKind) -> error::Result<IndexTable> {
        let generated = match *kind {
            TransformKind::Downgrade {
                nside_in,
                nside_out,
            } => self.generator.downgrade(nside_in, nside_out),
            TransformKind::Upgrade {
                nside_in,
                nside_out,
            } => self.generator.upgrade(nside_in, nside_out),
            TransformKind::NeighbourFilter { nside, .. } => self.generator.neighbour_filter(nside),
        };
        generated.map_err(HealpixError::Generation)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Nested-ordering tables: children of parent `p` are contiguous.
    #[derive(Default)]
    struct Nested {
        calls: Cell<usize>,
    }

    impl IndexGenerator for Nested {
        fn downgrade(
            &self,
            nside_in: usize,
            _nside_out: usize,
        ) -> Result<IndexTable, GeneratorError> {
            self.calls.set(self.calls.get() + 1);
            Ok(IndexTable::flat((0..healpix::npix(nside_in)?).collect()))
        }

        fn upgrade(
            &self,
            nside_in: usize,
            nside_out: usize,
        ) -> Result<IndexTable, GeneratorError> {
            self.calls.set(self.calls.get() + 1);
            let children = (nside_out / nside_in).pow(2);
            Ok(IndexTable::flat(
                (0..healpix::npix(nside_out)?).map(|c| c / children).collect(),
            ))
        }

        fn neighbour_filter(
            &self,
            _nside: usize,
        ) -> Result<IndexTable, GeneratorError> {
            Err("neighbour search not available".into())
        }
    }

    fn provider(dir: &Path) -> IndexProvider<Nested> {
        ProviderConfig::new()
            .with_cache_dir(dir.display().to_string())
            .init(Nested::default())
    }

    #[test]
    fn cache_file_names() {
        let dg = TransformKind::downgrade(8, 4).unwrap();
        let ug = TransformKind::upgrade(4, 8).unwrap();
        let nf = TransformKind::neighbour_filter(16, 9).unwrap();
        assert_eq!(dg.cache_file_name(), "dgrade_from8_to4.npy");
        assert_eq!(ug.cache_file_name(), "upgrade_from4_to8.npy");
        assert_eq!(nf.cache_file_name(), "filter9_nside16.npy");
    }

    #[test]
    fn expected_lengths() {
        let len = |kind: error::Result<TransformKind>| kind.unwrap().expected_len().unwrap();
        assert_eq!(len(TransformKind::downgrade(8, 4)), 768);
        assert_eq!(len(TransformKind::upgrade(4, 8)), 768);
        assert_eq!(len(TransformKind::neighbour_filter(2, 9)), 9 * 48);
        assert_eq!(TransformKind::downgrade(8, 4).unwrap().input_len().unwrap(), 768);
    }

    #[test]
    fn neighbour_kernel_must_be_nine() {
        let err = TransformKind::neighbour_filter(4, 5).unwrap_err();
        assert!(matches!(err, HealpixError::Config(_)));
    }

    #[test]
    fn upgrade_rejects_downward_pair() {
        assert!(TransformKind::upgrade(8, 4).is_err());
    }

    #[test]
    fn missing_cache_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let table = provider
            .fetch(TransformKind::downgrade(2, 1).unwrap())
            .unwrap();
        assert_eq!(table.len(), 48);
        assert_eq!(provider.generator().calls.get(), 1);
    }

    #[test]
    fn cached_table_wins() {
        let dir = tempfile::tempdir().unwrap();
        let kind = TransformKind::downgrade(2, 1).unwrap();
        let cached = IndexTable::flat((0..48).rev().collect());
        npy::write_table(&dir.path().join(kind.cache_file_name()), &cached).unwrap();

        let provider = provider(dir.path());
        assert_eq!(provider.fetch(kind).unwrap(), cached);
        assert_eq!(provider.generator().calls.get(), 0);
    }

    #[test]
    fn corrupt_cache_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let kind = TransformKind::upgrade(1, 2).unwrap();
        std::fs::write(dir.path().join(kind.cache_file_name()), b"garbage").unwrap();

        let provider = provider(dir.path());
        let table = provider.fetch(kind).unwrap();
        assert_eq!(table.len(), 48);
        assert!(table.values().iter().all(|&v| v < 12));
        assert_eq!(provider.generator().calls.get(), 1);
    }

    #[test]
    fn wrong_length_cache_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let kind = TransformKind::downgrade(2, 1).unwrap();
        npy::write_table(
            &dir.path().join(kind.cache_file_name()),
            &IndexTable::flat(vec![0; 10]),
        )
        .unwrap();

        let provider = provider(dir.path());
        assert_eq!(provider.fetch(kind).unwrap().len(), 48);
        assert_eq!(provider.generator().calls.get(), 1);
    }

    #[test]
    fn generator_error_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let err = provider
            .fetch(TransformKind::neighbour_filter(1, 9).unwrap())
            .unwrap_err();
        assert!(matches!(err, HealpixError::Generation(_)));
        assert_eq!(err.to_string(), "neighbour search not available");
    }

    #[test]
    fn write_back_populates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let kind = TransformKind::upgrade(1, 2).unwrap();
        let provider = ProviderConfig::new()
            .with_cache_dir(dir.path().display().to_string())
            .with_write_back(true)
            .init(Nested::default());

        let generated = provider.fetch(kind).unwrap();
        let cached = npy::read_table(&provider.cache_path(&kind)).unwrap();
        assert_eq!(cached, generated);
    }

    #[test]
    fn cache_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let kind = TransformKind::downgrade(2, 1).unwrap();
        npy::write_table(
            &dir.path().join(kind.cache_file_name()),
            &IndexTable::flat((0..48).rev().collect()),
        )
        .unwrap();

        let provider = ProviderConfig::new()
            .with_cache_dir(dir.path().display().to_string())
            .with_use_cache(false)
            .init(Nested::default());
        assert_eq!(provider.fetch(kind).unwrap().values()[0], 0);
        assert_eq!(provider.generator().calls.get(), 1);
    }

    /// Returns a fixed table for every request.
    struct Fixed(IndexTable);

    impl IndexGenerator for Fixed {
        fn downgrade(&self, _: usize, _: usize) -> Result<IndexTable, GeneratorError> {
            Ok(self.0.clone())
        }

        fn upgrade(&self, _: usize, _: usize) -> Result<IndexTable, GeneratorError> {
            Ok(self.0.clone())
        }

        fn neighbour_filter(&self, _: usize) -> Result<IndexTable, GeneratorError> {
            Ok(self.0.clone())
        }
    }

    fn fixed(table: IndexTable) -> IndexProvider<Fixed> {
        ProviderConfig::new().with_use_cache(false).init(Fixed(table))
    }

    #[test]
    fn generated_table_with_wrong_length_is_invalid() {
        let err = fixed(IndexTable::flat((0..47).collect()))
            .fetch(TransformKind::downgrade(2, 1).unwrap())
            .unwrap_err();
        assert!(matches!(err, HealpixError::InvalidTable(_)), "{}", err);
    }

    #[test]
    fn generated_entry_past_sentinel_is_invalid() {
        // 48 is the sentinel for nside 2 and allowed; 49 is not.
        let mut values: Vec<usize> = (0..47).collect();
        values.push(48);
        let kind = TransformKind::downgrade(2, 1).unwrap();
        assert!(fixed(IndexTable::flat(values.clone())).fetch(kind).is_ok());

        values[0] = 49;
        let err = fixed(IndexTable::flat(values)).fetch(kind).unwrap_err();
        assert!(matches!(err, HealpixError::InvalidTable(_)), "{}", err);
    }

    #[test]
    fn generated_grid_with_wrong_width_is_invalid() {
        let err = fixed(IndexTable::new((0..48).collect(), 3).unwrap())
            .fetch(TransformKind::downgrade(2, 1).unwrap())
            .unwrap_err();
        assert!(matches!(err, HealpixError::InvalidTable(_)), "{}", err);
    }

    #[test]
    fn oversized_cache_header_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let kind = TransformKind::downgrade(2, 1).unwrap();
        let header = "{'descr': '<i8', 'fortran_order': False, 'shape': (4294967296, 4294967296), }\n";
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&0i64.to_le_bytes());
        std::fs::write(dir.path().join(kind.cache_file_name()), bytes).unwrap();

        let provider = provider(dir.path());
        assert_eq!(provider.fetch(kind).unwrap().len(), 48);
        assert_eq!(provider.generator().calls.get(), 1);
    }

    #[test]
    fn default_cache_dir() {
        let config = ProviderConfig::new();
        assert_eq!(config.cache_dir, DEFAULT_CACHE_DIR);
        assert!(config.use_cache);
        assert!(!config.write_back);
        let provider = config.init(Nested::default());
        assert_eq!(provider.cache_dir(), Path::new("ancillary_files"));
    }
}
