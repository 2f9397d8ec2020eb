// SPDX-License-Identifier: MIT

//! Closure expansion over the reference graph.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::debug;

use ferry_store_core::{PathSet, StorePath};

use crate::error::Result;
use crate::state::Client;

impl Client {
    /// Query the store for the immediate references of `path`, the path
    /// itself filtered out. Idempotent; concurrent calls for the same path
    /// return the same value.
    pub async fn get_refs_direct(&self, path: &StorePath) -> Result<PathSet> {
        let refs = self.store.references(path).await?;
        Ok(refs.into_iter().filter(|r| r != path).collect())
    }

    /// Memoized [`Client::get_refs_direct`]. The state lock is held only
    /// for the map lookup and insert; the subprocess runs with it
    /// released, so two tasks may race to fetch the same key. The second
    /// writer writes the same value and the first insert wins.
    pub async fn get_refs(&self, path: &StorePath) -> Result<PathSet> {
        {
            let state = self.state.lock().await;
            if let Some(refs) = state.path_tree.get(path) {
                return Ok(refs.clone());
            }
        }

        let refs = self.get_refs_direct(path).await?;

        let mut state = self.state.lock().await;
        state
            .path_tree
            .entry(path.clone())
            .or_insert_with(|| refs.clone());
        Ok(refs)
    }

    /// The reflexive-transitive closure of `roots` under
    /// [`Client::get_refs`], expanded in parallel with at most
    /// `max_jobs` reference queries in flight. Each path is visited once.
    pub async fn closure(&self, roots: &PathSet) -> Result<PathSet> {
        let mut seen = roots.clone();
        let mut queue: Vec<StorePath> = roots.iter().cloned().collect();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.config.max_jobs {
                let Some(path) = queue.pop() else { break };
                in_flight.push(async move {
                    let refs = self.get_refs(&path).await;
                    (path, refs)
                });
            }

            let Some((path, refs)) = in_flight.next().await else {
                break;
            };
            let refs = refs.map_err(|e| e.for_path(&path))?;
            for reference in refs {
                if seen.insert(reference.clone()) {
                    queue.push(reference);
                }
            }
        }

        debug!(roots = roots.len(), paths = seen.len(), "expanded closure");
        Ok(seen)
    }
}
