//! Error type shared by the loading side of the crate.
//!
//! Only load-time failures surface as errors. Missing optional columns or
//! files, zero denominators and malformed interaction payloads are absorbed
//! where they occur.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BedflowError {
    /// None of the accepted weekly file names exists in the data directory.
    #[error("could not find a weekly dataset in '{}' (accepted file names: {})", path.display(), accepted.join(", "))]
    DataNotFound { path: PathBuf, accepted: Vec<String> },

    /// The mandatory `week` or `service` column could not be resolved.
    #[error("could not detect 'week' and/or 'service' columns in {file}; columns found: {columns:?}")]
    Schema { file: String, columns: Vec<String> },

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed CSV in '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BedflowError>;
