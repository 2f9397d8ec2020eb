// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use thiserror::Error;

use ferry_cache_client::ClientError;
use ferry_store_core::{ParseDerivationError, ParseStorePathError, StorePath};

#[derive(Error, Debug)]
pub enum FerryError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    StorePath(#[from] ParseStorePathError),

    #[error(transparent)]
    Derivation(#[from] ParseDerivationError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store directory mismatch: local {local}, cache serves {remote}")]
    StoreMismatch { local: String, remote: String },

    #[error("import failed, archive kept at {} for inspection: {source}", kept.display())]
    ImportFailed {
        kept: PathBuf,
        #[source]
        source: Box<FerryError>,
    },

    #[error("{path}: {source}")]
    ForPath {
        path: String,
        #[source]
        source: Box<FerryError>,
    },
}

impl FerryError {
    /// Attach the abbreviated store path the error was raised for.
    pub fn for_path(self, path: &StorePath) -> Self {
        FerryError::ForPath {
            path: path.abbrev(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, FerryError>;

/// Helper trait for adding context to IO errors
pub trait IoContext<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FerryError::Io {
            context: f(),
            source: e,
        })
    }
}
