// SPDX-License-Identifier: MIT

//! Store path identifiers.
//!
//! A store path basename is `<hash>-<name>` where the hash part is exactly
//! [`HASH_PART_LEN`] characters from `[A-Za-z0-9]` and the name is
//! non-empty. A full store path additionally carries the absolute store
//! directory it lives under, e.g. `/nix/store/<hash>-<name>`.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Length of the hash part of a store path basename.
pub const HASH_PART_LEN: usize = 32;

/// Hash-part length used by [`StorePath::abbrev`].
const ABBREV_LEN: usize = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseStorePathError {
    #[error("'{0}' is not a valid store path basename")]
    BadStorePath(String),

    #[error("'{0}' is not an absolute path")]
    NotAbsolute(String),

    #[error("'{0}' has an empty basename")]
    EmptyBasename(String),

    #[error("'{input}': {basename_error}; {full_error}")]
    Permissive {
        input: String,
        basename_error: Box<ParseStorePathError>,
        full_error: Box<ParseStorePathError>,
    },
}

/// A store path basename: hash part plus human-readable name.
///
/// Value-typed: equality, ordering and hashing are structural on
/// `(hash, name)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath {
    hash: String,
    name: String,
}

pub type PathSet = BTreeSet<StorePath>;

impl StorePath {
    /// Parse a basename of the form `<32 chars from [A-Za-z0-9]>-<name>`.
    pub fn parse(basename: &str) -> Result<Self, ParseStorePathError> {
        let bad = || ParseStorePathError::BadStorePath(basename.to_string());

        let (hash, name) = match basename.split_at_checked(HASH_PART_LEN) {
            Some(parts) => parts,
            None => return Err(bad()),
        };
        if !hash.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(bad());
        }
        let name = match name.strip_prefix('-') {
            Some(name) if !name.is_empty() => name,
            _ => return Err(bad()),
        };

        Ok(StorePath {
            hash: hash.to_string(),
            name: name.to_string(),
        })
    }

    /// Try [`StorePath::parse`] first, then [`FullStorePath::parse`];
    /// failing both, report both errors.
    pub fn parse_permissive(text: &str) -> Result<Self, ParseStorePathError> {
        let basename_error = match Self::parse(text) {
            Ok(path) => return Ok(path),
            Err(e) => e,
        };
        match FullStorePath::parse(text) {
            Ok(full) => Ok(full.into_store_path()),
            Err(full_error) => Err(ParseStorePathError::Permissive {
                input: text.to_string(),
                basename_error: Box::new(basename_error),
                full_error: Box::new(full_error),
            }),
        }
    }

    pub fn hash_part(&self) -> &str {
        &self.hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shortened form for diagnostics: first six hash characters plus name.
    pub fn abbrev(&self) -> String {
        format!("{}-{}", &self.hash[..ABBREV_LEN], self.name)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.name)
    }
}

impl FromStr for StorePath {
    type Err = ParseStorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The absolute directory a store is rooted at, e.g. `/nix/store`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreDir(PathBuf);

impl StoreDir {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ParseStorePathError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(ParseStorePathError::NotAbsolute(
                path.display().to_string(),
            ));
        }
        Ok(StoreDir(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Filesystem location of `path` under this store directory.
    pub fn path_of(&self, path: &StorePath) -> PathBuf {
        self.0.join(path.to_string())
    }

    /// Pair `path` with this store directory.
    pub fn full(&self, path: StorePath) -> FullStorePath {
        FullStorePath {
            store_dir: self.clone(),
            path,
        }
    }
}

impl fmt::Display for StoreDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A store path qualified with the store directory it lives under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FullStorePath {
    store_dir: StoreDir,
    path: StorePath,
}

impl FullStorePath {
    /// Split an absolute path into store directory and basename and parse
    /// the basename.
    pub fn parse(text: &str) -> Result<Self, ParseStorePathError> {
        if !text.starts_with('/') {
            return Err(ParseStorePathError::NotAbsolute(text.to_string()));
        }
        let (dir, base) = match text.rsplit_once('/') {
            Some((dir, base)) if !base.is_empty() => (dir, base),
            _ => return Err(ParseStorePathError::EmptyBasename(text.to_string())),
        };
        let store_dir = StoreDir::new(if dir.is_empty() { "/" } else { dir })?;
        Ok(FullStorePath {
            store_dir,
            path: StorePath::parse(base)?,
        })
    }

    pub fn store_dir(&self) -> &StoreDir {
        &self.store_dir
    }

    pub fn store_path(&self) -> &StorePath {
        &self.path
    }

    pub fn into_store_path(self) -> StorePath {
        self.path
    }

    pub fn to_path(&self) -> PathBuf {
        self.store_dir.path_of(&self.path)
    }
}

impl fmt::Display for FullStorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_dir, self.path)
    }
}
