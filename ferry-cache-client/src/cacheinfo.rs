// SPDX-License-Identifier: MIT

//! The `/nix-cache-info` record.

use std::path::PathBuf;

use crate::error::BlobError;
use crate::kv::KvBlob;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NixCacheInfo {
    pub store_dir: PathBuf,
    pub want_mass_query: bool,
    pub priority: Option<u64>,
}

impl NixCacheInfo {
    pub fn from_blob(blob: &KvBlob) -> Result<Self, BlobError> {
        let store_dir = blob
            .get("StoreDir")
            .ok_or(BlobError::MissingKey("StoreDir"))?;
        let want_mass_query = blob.get("WantMassQuery") == Some("1");
        let priority = blob
            .get("Priority")
            .map(parse_non_negative)
            .transpose()?;

        Ok(NixCacheInfo {
            store_dir: PathBuf::from(store_dir),
            want_mass_query,
            priority,
        })
    }
}

pub(crate) fn parse_non_negative(text: &str) -> Result<u64, BlobError> {
    text.parse::<u64>()
        .map_err(|_| BlobError::NotANonNegativeInteger(text.to_string()))
}
