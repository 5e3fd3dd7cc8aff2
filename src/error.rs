//! Error types shared by the index provider and the layers.

use thiserror::Error;

/// Error produced by an external index generator.
pub type GeneratorError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for layer construction and index-table handling.
pub type Result<T> = std::result::Result<T, HealpixError>;

#[derive(Error, Debug)]
pub enum HealpixError {
    /// Layer parameters rejected before any table is looked up.
    #[error("invalid layer configuration: {0}")]
    Config(String),

    #[error("invalid resolution pair: {0}")]
    Resolution(String),

    /// Table that breaks the sentinel/block layout contract.
    #[error("invalid index table: {0}")]
    InvalidTable(String),

    #[error("malformed npy file: {0}")]
    Npy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Passed through from the index generator untouched.
    #[error(transparent)]
    Generation(GeneratorError),
}
