// SPDX-License-Identifier: MIT

//! The per-invocation client context.
//!
//! One `Client` exists per invocation: one HTTP connection manager, one
//! mutex over the shared `(path_tree, sent)` record, one upload
//! semaphore. Critical sections only perform O(1) map operations;
//! subprocess and HTTP work always happens with the lock released.

use std::collections::HashMap;

use tokio::sync::{Mutex, Semaphore};

use ferry_cache_client::CacheClient;
use ferry_store_core::{PathSet, StorePath};

use crate::config::Config;
use crate::error::Result;
use crate::path_cache::PathCache;
use crate::store::LocalStore;
use crate::transfer::PendingCell;

/// Immediate (non-transitive) references per store path, the key itself
/// excluded. Monotonic: an entry, once inserted, is never mutated.
pub type PathTree = HashMap<StorePath, PathSet>;

pub struct Client {
    pub config: Config,
    pub store: LocalStore,
    pub cache: CacheClient,
    pub(crate) state: Mutex<ClientState>,
    pub(crate) transfer_slots: Semaphore,
    path_cache: PathCache,
}

pub(crate) struct ClientState {
    pub path_tree: PathTree,
    pub sent: HashMap<StorePath, PendingCell>,
}

impl Client {
    /// Build the invocation context and load the on-disk reference cache.
    pub fn new(config: Config) -> Result<Self> {
        let cache = CacheClient::new(&config.cache_url, config.auth.clone())?;
        let store = LocalStore::new(config.store_dir.clone());
        let path_cache = PathCache::new(config.path_cache_dir.clone());
        let path_tree = path_cache.load()?;

        Ok(Client {
            store,
            cache,
            state: Mutex::new(ClientState {
                path_tree,
                sent: HashMap::new(),
            }),
            transfer_slots: Semaphore::new(config.max_jobs),
            path_cache,
            config,
        })
    }

    /// Persist the in-memory reference tree. Entries already on disk are
    /// left untouched.
    pub async fn flush_path_cache(&self) -> Result<()> {
        let tree = self.state.lock().await.path_tree.clone();
        self.path_cache.store(&tree)
    }

    /// Record `path` as already transferred, so the upload walk skips it.
    pub(crate) async fn mark_sent(&self, path: &StorePath) {
        let cell = {
            let mut state = self.state.lock().await;
            state.sent.entry(path.clone()).or_default().clone()
        };
        let _ = cell.set(());
    }
}
