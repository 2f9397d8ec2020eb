// SPDX-License-Identifier: MIT

//! The download orchestrator: the inverse of push.
//!
//! References come from narinfo records instead of the local store, and a
//! transfer downloads the exported archive and imports it. Paths already
//! present locally are complete by the store invariant, so their whole
//! subtree is skipped.

use std::collections::HashMap;
use std::future::Future;

use futures::future::try_join_all;
use tokio::sync::Mutex;
use tracing::{debug, info};

use ferry_cache_client::NarInfo;
use ferry_store_core::{FullStorePath, PathSet, StorePath};

use crate::error::Result;
use crate::state::Client;
use crate::transfer::{PendingCell, Transfer, transfer_closure};

struct FetchWalk<'a> {
    client: &'a Client,
    pending: Mutex<HashMap<StorePath, PendingCell>>,
    /// Narinfo records already fetched during this walk.
    infos: Mutex<HashMap<StorePath, NarInfo>>,
}

impl<'a> FetchWalk<'a> {
    fn new(client: &'a Client) -> Self {
        FetchWalk {
            client,
            pending: Mutex::new(HashMap::new()),
            infos: Mutex::new(HashMap::new()),
        }
    }

    async fn is_local(&self, path: &StorePath) -> bool {
        let on_disk = self.client.config.store_dir.path_of(path);
        matches!(tokio::fs::try_exists(&on_disk).await, Ok(true))
    }

    async fn narinfo(&self, path: &StorePath) -> Result<NarInfo> {
        {
            let infos = self.infos.lock().await;
            if let Some(info) = infos.get(path) {
                return Ok(info.clone());
            }
        }
        let info = self.client.cache.narinfo(path.hash_part()).await?;
        let mut infos = self.infos.lock().await;
        infos.entry(path.clone()).or_insert_with(|| info.clone());
        Ok(info)
    }
}

impl Transfer for FetchWalk<'_> {
    fn pending_cell(&self, path: &StorePath) -> impl Future<Output = PendingCell> + Send {
        async move {
            let mut pending = self.pending.lock().await;
            pending.entry(path.clone()).or_default().clone()
        }
    }

    fn refs(&self, path: &StorePath) -> impl Future<Output = Result<PathSet>> + Send {
        async move {
            if self.is_local(path).await {
                return Ok(PathSet::new());
            }
            let info = self.narinfo(path).await?;
            let mut refs = PathSet::new();
            for reference in &info.references {
                let parsed =
                    FullStorePath::parse(&reference.to_string_lossy())?.into_store_path();
                if parsed != *path {
                    refs.insert(parsed);
                }
            }
            Ok(refs)
        }
    }

    fn transfer(&self, path: &StorePath) -> impl Future<Output = Result<()>> + Send {
        async move {
            if self.is_local(path).await {
                debug!(path = %path.abbrev(), "already in local store");
                return Ok(());
            }
            let _permit = self.client.transfer_slots.acquire().await.unwrap();
            info!(path = %path.abbrev(), "downloading");

            let info = self.narinfo(path).await?;
            let nar_name = info
                .url
                .clone()
                .unwrap_or_else(|| format!("{}.nar", path.hash_part()));
            let archive = self.client.cache.nar(&nar_name).await?;
            self.client.store.import(&archive).await
        }
    }
}

impl Client {
    /// Fetch the closures of `roots` from the cache into the local store.
    pub async fn fetch(&self, roots: &PathSet) -> Result<()> {
        let walk = FetchWalk::new(self);
        try_join_all(roots.iter().map(|r| transfer_closure(&walk, r.clone()))).await?;
        info!(roots = roots.len(), "fetch complete");
        Ok(())
    }
}
