// SPDX-License-Identifier: MIT

//! The upload orchestrator.
//!
//! Two phases: discover which closure members the cache is missing
//! (`/query-paths`), then transfer the missing paths in dependency order.
//! Paths the cache already holds are pre-marked as sent, so the walk
//! skips them and everything below them.

use std::collections::BTreeMap;
use std::future::Future;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use ferry_store_core::{Derivation, PathSet, StorePath};

use crate::error::{FerryError, IoContext, Result};
use crate::state::Client;
use crate::transfer::{PendingCell, Transfer, transfer_closure};

impl Transfer for Client {
    fn pending_cell(&self, path: &StorePath) -> impl Future<Output = PendingCell> + Send {
        async move {
            let mut state = self.state.lock().await;
            state.sent.entry(path.clone()).or_default().clone()
        }
    }

    fn refs(&self, path: &StorePath) -> impl Future<Output = Result<PathSet>> + Send {
        self.get_refs(path)
    }

    fn transfer(&self, path: &StorePath) -> impl Future<Output = Result<()>> + Send {
        self.upload_path(path)
    }
}

impl Client {
    /// Expand the closure of `roots` and return the subset the cache
    /// reports as absent.
    pub async fn query_store_paths(&self, roots: &PathSet) -> Result<PathSet> {
        let closure = self.closure(roots).await?;
        self.query_missing(&closure).await
    }

    /// Partition an already-expanded closure against the cache.
    async fn query_missing(&self, closure: &PathSet) -> Result<PathSet> {
        let full_paths: Vec<String> = closure
            .iter()
            .map(|p| self.config.store_dir.full(p.clone()).to_string())
            .collect();
        let presence: BTreeMap<String, bool> = self.cache.query_paths(&full_paths).await?;

        Ok(closure
            .iter()
            .zip(&full_paths)
            .filter(|(_, full)| presence.get(*full).copied() == Some(false))
            .map(|(path, _)| path.clone())
            .collect())
    }

    /// Push the closures of `roots` to the cache.
    pub async fn push(&self, roots: &PathSet) -> Result<()> {
        let info = self.cache.cache_info().await?;
        if info.store_dir != self.config.store_dir.as_path() {
            return Err(FerryError::StoreMismatch {
                local: self.config.store_dir.to_string(),
                remote: info.store_dir.display().to_string(),
            });
        }
        if !info.want_mass_query {
            warn!("cache does not advertise mass queries; querying anyway");
        }
        debug!(priority = ?info.priority, "cache info");

        let roots = self.expand_derivation_roots(roots.clone()).await?;
        let closure = self.closure(&roots).await?;
        let missing = self.query_missing(&closure).await?;
        info!(
            closure = closure.len(),
            missing = missing.len(),
            "queried cache"
        );

        if missing.is_empty() {
            info!("nothing to push");
            return Ok(());
        }

        for present in closure.difference(&missing) {
            self.mark_sent(present).await;
        }

        try_join_all(roots.iter().map(|r| transfer_closure(self, r.clone()))).await?;
        info!(uploaded = missing.len(), "push complete");
        Ok(())
    }

    /// Roots naming derivation files also push the derivation's outputs,
    /// when those outputs exist in the local store.
    async fn expand_derivation_roots(&self, roots: PathSet) -> Result<PathSet> {
        let mut expanded = PathSet::new();
        for root in roots {
            if root.name().ends_with(".drv") {
                let file = self.config.store_dir.path_of(&root);
                let text = tokio::fs::read_to_string(&file)
                    .await
                    .io_context(|| format!("failed to read {}", file.display()))?;
                let drv = Derivation::parse(&self.config.store_dir, &text)
                    .map_err(|e| FerryError::from(e).for_path(&root))?;
                for output in drv.outputs.values() {
                    let built = self.config.store_dir.path_of(&output.path);
                    if matches!(tokio::fs::try_exists(&built).await, Ok(true)) {
                        debug!(output = %output.path.abbrev(), "pushing derivation output");
                        expanded.insert(output.path.clone());
                    }
                }
            }
            expanded.insert(root);
        }
        Ok(expanded)
    }

    /// Export one path and hand the archive to the cache. Bounded by the
    /// transfer semaphore.
    async fn upload_path(&self, path: &StorePath) -> Result<()> {
        let _permit = self.transfer_slots.acquire().await.unwrap();
        info!(path = %path.abbrev(), "uploading");
        let archive = self.store.export(path).await?;
        let full = self.config.store_dir.full(path.clone()).to_string();
        self.cache.import_paths(&full, archive).await?;
        Ok(())
    }
}
