// SPDX-License-Identifier: MIT

//! The cache HTTP client.
//!
//! One [`CacheClient`] (and thus one connection pool) exists per
//! invocation. All requests carry basic auth when credentials are
//! configured. Responses with content type `application/x-gzip` are
//! decompressed before the inner codec runs.

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;
use tracing::debug;
use url::Url;

use crate::cacheinfo::NixCacheInfo;
use crate::error::ClientError;
use crate::kv::KvBlob;
use crate::narinfo::NarInfo;

/// Credentials for HTTP basic auth.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

pub struct CacheClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Option<BasicAuth>,
}

impl CacheClient {
    pub fn new(base_url: &str, auth: Option<BasicAuth>) -> Result<Self, ClientError> {
        // a trailing slash makes Url::join treat the last segment as a
        // directory
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Ok(CacheClient {
            http: reqwest::Client::new(),
            base_url: Url::parse(&normalized)?,
            auth,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(BasicAuth { user, password }) => req.basic_auth(user, Some(password)),
            None => req,
        }
    }

    /// GET `path` and return the (decompressed) body.
    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let url = self.url(path)?;
        debug!(%url, "GET");
        let response = self.apply_auth(self.http.get(url.clone())).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.bytes().await?;
        decode_body(url.as_str(), &content_type, &body)
    }

    async fn get_blob(&self, path: &str) -> Result<(String, KvBlob), ClientError> {
        let url = self.url(path)?.to_string();
        let body = self.get_bytes(path).await?;
        let blob = KvBlob::parse_bytes(&body).map_err(|e| ClientError::BadBlob {
            url: url.clone(),
            source: e.into(),
        })?;
        Ok((url, blob))
    }

    /// GET `/nix-cache-info`.
    pub async fn cache_info(&self) -> Result<NixCacheInfo, ClientError> {
        let (url, blob) = self.get_blob("nix-cache-info").await?;
        NixCacheInfo::from_blob(&blob).map_err(|e| ClientError::BadBlob { url, source: e })
    }

    /// GET `/<hash-part>.narinfo`.
    pub async fn narinfo(&self, hash_part: &str) -> Result<NarInfo, ClientError> {
        let (url, blob) = self.get_blob(&format!("{hash_part}.narinfo")).await?;
        NarInfo::from_blob(&blob).map_err(|e| ClientError::BadBlob { url, source: e })
    }

    /// GET an archive by its relative name (e.g. `<hash>.nar` or a
    /// narinfo-advertised URL).
    pub async fn nar(&self, name: &str) -> Result<Vec<u8>, ClientError> {
        self.get_bytes(name).await
    }

    /// POST the fully-qualified closure to `/query-paths`; the response
    /// maps each path to its presence upstream.
    pub async fn query_paths(
        &self,
        paths: &[String],
    ) -> Result<BTreeMap<String, bool>, ClientError> {
        let url = self.url("query-paths")?;
        debug!(%url, count = paths.len(), "POST");
        let response = self
            .apply_auth(self.http.post(url.clone()).json(&paths))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::BadJson {
            url: url.to_string(),
            source: e,
        })
    }

    /// POST an exported archive to `/import-paths`. `path` labels the
    /// artifact in diagnostics.
    pub async fn import_paths(&self, path: &str, archive: Vec<u8>) -> Result<(), ClientError> {
        let url = self.url("import-paths")?;
        debug!(%url, path, bytes = archive.len(), "POST");
        let response = self
            .apply_auth(
                self.http
                    .post(url)
                    .header(reqwest::header::CONTENT_TYPE, "application/x-nix-export")
                    .body(archive),
            )
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(ClientError::RejectedUpload {
                path: path.to_string(),
                status: status.as_u16(),
                reason,
            });
        }
        Ok(())
    }
}

/// Decompress a response body according to its content type.
fn decode_body(url: &str, content_type: &str, body: &[u8]) -> Result<Vec<u8>, ClientError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "application/x-gzip" | "application/gzip" => {
            let mut decoded = Vec::new();
            GzDecoder::new(body)
                .read_to_end(&mut decoded)
                .map_err(|e| ClientError::Gzip {
                    url: url.to_string(),
                    source: e,
                })?;
            Ok(decoded)
        }
        // compression schemes we do not speak
        "application/x-bzip2" | "application/x-xz" | "application/zstd" => {
            Err(ClientError::BadContentType {
                url: url.to_string(),
                content_type: content_type.to_string(),
            })
        }
        _ => Ok(body.to_vec()),
    }
}
