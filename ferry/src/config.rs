// SPDX-License-Identifier: MIT

//! Invocation configuration, read from the environment.

use std::path::PathBuf;

use ferry_cache_client::BasicAuth;
use ferry_store_core::StoreDir;

use crate::error::{FerryError, Result};

/// Directory name of the on-disk reference cache under `$HOME`.
const PATH_CACHE_NAME: &str = ".nix-path-cache";

fn default_max_jobs() -> usize {
    16
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the local object store (`NIX_STORE`).
    pub store_dir: StoreDir,
    /// Base URL of the remote cache (`NIX_REPO_HTTP`).
    pub cache_url: String,
    /// `$HOME/.nix-path-cache`.
    pub path_cache_dir: PathBuf,
    /// Basic auth, when both username and password are set.
    pub auth: Option<BasicAuth>,
    /// Fan-out bound for closure expansion and uploads (`FERRY_MAX_JOBS`).
    pub max_jobs: usize,
}

fn require(name: &'static str) -> Result<String> {
    std::env::var(name).map_err(|_| FerryError::Config(format!("{name} is not set")))
}

pub fn load() -> Result<Config> {
    let store_dir = StoreDir::new(require("NIX_STORE")?)
        .map_err(|e| FerryError::Config(format!("NIX_STORE: {e}")))?;
    let cache_url = require("NIX_REPO_HTTP")?;
    let path_cache_dir = PathBuf::from(require("HOME")?).join(PATH_CACHE_NAME);

    let auth = match (
        std::env::var("NIX_BINARY_CACHE_USERNAME"),
        std::env::var("NIX_BINARY_CACHE_PASSWORD"),
    ) {
        (Ok(user), Ok(password)) => Some(BasicAuth { user, password }),
        _ => None,
    };

    let max_jobs = match std::env::var("FERRY_MAX_JOBS") {
        Ok(value) => value
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                FerryError::Config(format!("FERRY_MAX_JOBS must be a positive integer, got '{value}'"))
            })?,
        Err(_) => default_max_jobs(),
    };

    Ok(Config {
        store_dir,
        cache_url,
        path_cache_dir,
        auth,
        max_jobs,
    })
}
