// SPDX-License-Identifier: MIT

//! File hash digests as they appear on the wire and in derivation files.
//!
//! The serialized form is `sha256:<body>`; the body encoding is
//! self-describing from its length and alphabet (64 hex characters or 52
//! nix-base32 characters).

use std::fmt;
use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;

/// Digest length of a sha256 hash in lowercase hex.
const SHA256_HEX_LEN: usize = 64;
/// Digest length of a sha256 hash in nix-base32.
const SHA256_BASE32_LEN: usize = 52;

/// The nix-base32 alphabet (omits `e`, `o`, `u`, `t`).
const NIX_BASE32_ALPHABET: &[u8] = b"0123456789abcdfghijklmnpqrsvwxyz";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseHashError {
    #[error("unknown hash algorithm in '{0}'")]
    UnknownHashAlgorithm(String),

    #[error("'{0}' is not a valid {1} digest")]
    BadFileHash(String, HashEncoding),

    #[error("'{0}' has the length of neither a hex nor a base32 sha256 digest")]
    BadDigestLength(String),
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashEncoding {
    #[display("hex")]
    Hex,
    #[display("base32")]
    Base32,
}

/// A tagged file hash. Only sha256 exists today; the enum keeps the
/// algorithm tag explicit in every signature that carries a digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileHash {
    Sha256 {
        encoding: HashEncoding,
        digest: String,
    },
}

impl FileHash {
    /// Parse `sha256:<body>`. Any other algorithm prefix is rejected.
    pub fn parse(text: &str) -> Result<Self, ParseHashError> {
        match text.split_once(':') {
            Some(("sha256", body)) => Self::sha256(body),
            _ => Err(ParseHashError::UnknownHashAlgorithm(text.to_string())),
        }
    }

    /// Build a sha256 hash from a bare digest body, detecting its encoding.
    pub fn sha256(body: &str) -> Result<Self, ParseHashError> {
        let encoding = match body.len() {
            SHA256_HEX_LEN => HashEncoding::Hex,
            SHA256_BASE32_LEN => HashEncoding::Base32,
            _ => return Err(ParseHashError::BadDigestLength(body.to_string())),
        };
        let valid = match encoding {
            HashEncoding::Hex => body.bytes().all(|b| b.is_ascii_hexdigit()),
            HashEncoding::Base32 => body.bytes().all(|b| NIX_BASE32_ALPHABET.contains(&b)),
        };
        if !valid {
            return Err(ParseHashError::BadFileHash(body.to_string(), encoding));
        }
        Ok(FileHash::Sha256 {
            encoding,
            digest: body.to_string(),
        })
    }

    pub fn encoding(&self) -> HashEncoding {
        match self {
            FileHash::Sha256 { encoding, .. } => *encoding,
        }
    }

    pub fn digest(&self) -> &str {
        match self {
            FileHash::Sha256 { digest, .. } => digest,
        }
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileHash::Sha256 { digest, .. } => write!(f, "sha256:{digest}"),
        }
    }
}

impl FromStr for FileHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
