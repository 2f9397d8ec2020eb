// SPDX-License-Identifier: MIT

//! Narinfo: sidecar metadata describing an archived store path on the
//! cache.

use std::path::PathBuf;

use ferry_store_core::FileHash;

use crate::error::BlobError;
use crate::kv::KvBlob;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarInfo {
    pub store_path: PathBuf,
    pub nar_hash: FileHash,
    pub nar_size: u64,
    pub file_hash: FileHash,
    pub file_size: u64,
    /// Relative location of the archive on the cache, when advertised.
    pub url: Option<String>,
    /// Immediate references, as full filesystem paths.
    pub references: Vec<PathBuf>,
    pub deriver: Option<PathBuf>,
}

impl NarInfo {
    pub fn from_blob(blob: &KvBlob) -> Result<Self, BlobError> {
        let required = |key: &'static str| blob.get(key).ok_or(BlobError::MissingKey(key));

        let store_path = PathBuf::from(required("StorePath")?);
        let nar_hash = FileHash::parse(required("NarHash")?)?;
        let nar_size = crate::cacheinfo::parse_non_negative(required("NarSize")?)?;
        let file_hash = FileHash::parse(required("FileHash")?)?;
        let file_size = crate::cacheinfo::parse_non_negative(required("FileSize")?)?;

        let url = blob.get("URL").map(str::to_string);
        // whitespace splitting means an empty value yields no references
        let references = blob
            .get("References")
            .map(|value| value.split_ascii_whitespace().map(PathBuf::from).collect())
            .unwrap_or_default();
        let deriver = blob.get("Deriver").map(PathBuf::from);

        Ok(NarInfo {
            store_path,
            nar_hash,
            nar_size,
            file_hash,
            file_size,
            url,
            references,
            deriver,
        })
    }
}
