// SPDX-License-Identifier: MIT

use thiserror::Error;

use ferry_store_core::ParseHashError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("malformed key-value blob at line {line}: {reason}")]
    BadKvBlob { line: usize, reason: String },

    #[error("key-value blob is not valid UTF-8")]
    NotUtf8,
}

/// Errors decoding a typed record (narinfo, cache info) from a key-value
/// blob.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("missing key '{0}'")]
    MissingKey(&'static str),

    #[error("'{0}' is not a non-negative integer")]
    NotANonNegativeInteger(String),

    #[error(transparent)]
    FileHash(#[from] ParseHashError),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid cache URL: {0}")]
    BadUrl(#[from] url::ParseError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url}: HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("{url}: unsupported content type '{content_type}'")]
    BadContentType { url: String, content_type: String },

    #[error("{url}: gzip decoding failed: {source}")]
    Gzip {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{url}: malformed JSON response: {source}")]
    BadJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{url}: {source}")]
    BadBlob {
        url: String,
        #[source]
        source: BlobError,
    },

    #[error("cache rejected upload of {path} (status {status}): {reason}")]
    RejectedUpload {
        path: String,
        status: u16,
        reason: String,
    },
}
