// SPDX-License-Identifier: MIT

//! Dependency-ordered closure transfer.
//!
//! Both directions of the protocol move closures across the same edge
//! relation: a path may only be transferred once every path it references
//! has been. [`transfer_closure`] walks the graph recursively, awaiting
//! all references before transferring the path itself, so for every edge
//! `u -> v` the transfer of `v` completes-before the transfer of `u`.
//!
//! Memoization is per path: the first task to reach a path runs the
//! transfer, concurrent tasks await its completion. Siblings in disjoint
//! subtrees proceed in parallel.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, try_join_all};
use tokio::sync::OnceCell;

use ferry_store_core::{PathSet, StorePath};

use crate::error::Result;

/// Completion cell for one path. Unset: not yet transferred (possibly in
/// flight); set: transfer finished.
pub(crate) type PendingCell = Arc<OnceCell<()>>;

/// A direction of the protocol: push implements this against the local
/// store and the remote cache, fetch against the remote cache and the
/// local store.
pub(crate) trait Transfer: Sync {
    /// The memoization cell for `path`, from the owner's shared state.
    fn pending_cell(&self, path: &StorePath) -> impl Future<Output = PendingCell> + Send;

    /// Paths that must be transferred before `path`.
    fn refs(&self, path: &StorePath) -> impl Future<Output = Result<PathSet>> + Send;

    /// Move one path.
    fn transfer(&self, path: &StorePath) -> impl Future<Output = Result<()>> + Send;
}

/// Transfer `path` after all of its references, each at most once.
pub(crate) fn transfer_closure<'a, T: Transfer>(
    target: &'a T,
    path: StorePath,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let cell = target.pending_cell(&path).await;
        cell.get_or_try_init(|| async {
            let refs = target
                .refs(&path)
                .await
                .map_err(|e| e.for_path(&path))?;
            try_join_all(refs.into_iter().map(|r| transfer_closure(target, r))).await?;
            target.transfer(&path).await.map_err(|e| e.for_path(&path))
        })
        .await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio::sync::Mutex;

    use crate::error::FerryError;

    use super::*;

    struct FakeTarget {
        graph: HashMap<StorePath, PathSet>,
        pending: Mutex<HashMap<StorePath, PendingCell>>,
        transferred: Mutex<Vec<StorePath>>,
        fail_on: Option<StorePath>,
    }

    impl FakeTarget {
        fn new(edges: Vec<(StorePath, Vec<StorePath>)>) -> Self {
            let graph = edges
                .into_iter()
                .map(|(path, refs)| (path, refs.into_iter().collect()))
                .collect();
            FakeTarget {
                graph,
                pending: Mutex::new(HashMap::new()),
                transferred: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }
    }

    impl Transfer for FakeTarget {
        fn pending_cell(&self, path: &StorePath) -> impl Future<Output = PendingCell> + Send {
            async move {
                let mut pending = self.pending.lock().await;
                pending.entry(path.clone()).or_default().clone()
            }
        }

        fn refs(&self, path: &StorePath) -> impl Future<Output = Result<PathSet>> + Send {
            async move { Ok(self.graph.get(path).cloned().unwrap_or_default()) }
        }

        fn transfer(&self, path: &StorePath) -> impl Future<Output = Result<()>> + Send {
            async move {
                // yield so sibling transfers interleave
                tokio::task::yield_now().await;
                if self.fail_on.as_ref() == Some(path) {
                    return Err(FerryError::Config("injected failure".to_string()));
                }
                self.transferred.lock().await.push(path.clone());
                Ok(())
            }
        }
    }

    fn sp(hash_char: char, name: &str) -> StorePath {
        let hash: String = std::iter::repeat_n(hash_char, 32).collect();
        StorePath::parse(&format!("{hash}-{name}")).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn diamond_transfers_in_dependency_order() {
        let a = sp('a', "a");
        let b = sp('b', "b");
        let c = sp('c', "c");
        let d = sp('d', "d");

        let target = FakeTarget::new(vec![
            (a.clone(), vec![b.clone(), c.clone()]),
            (b.clone(), vec![d.clone()]),
            (c.clone(), vec![d.clone()]),
            (d.clone(), vec![]),
        ]);

        transfer_closure(&target, a.clone()).await.unwrap();

        let order = target.transferred.lock().await.clone();
        assert_eq!(order.len(), 4, "every path transferred exactly once");

        let pos = |p: &StorePath| order.iter().position(|o| o == p).unwrap();
        assert!(pos(&d) < pos(&b));
        assert!(pos(&d) < pos(&c));
        assert!(pos(&b) < pos(&a));
        assert!(pos(&c) < pos(&a));
    }

    #[tokio::test]
    async fn premarked_paths_are_skipped() {
        let a = sp('a', "a");
        let b = sp('b', "b");

        let target = FakeTarget::new(vec![(a.clone(), vec![b.clone()]), (b.clone(), vec![])]);
        {
            let mut pending = target.pending.lock().await;
            let cell = pending.entry(b.clone()).or_default().clone();
            cell.set(()).unwrap();
        }

        transfer_closure(&target, a.clone()).await.unwrap();

        let order = target.transferred.lock().await.clone();
        assert_eq!(order, vec![a]);
    }

    #[tokio::test]
    async fn failure_propagates_with_path_context() {
        let a = sp('a', "a");
        let b = sp('b', "b");

        let mut target = FakeTarget::new(vec![(a.clone(), vec![b.clone()]), (b.clone(), vec![])]);
        target.fail_on = Some(b.clone());

        let err = transfer_closure(&target, a.clone()).await.unwrap_err();
        assert!(err.to_string().contains(&b.abbrev()));

        // the failed subtree blocks the root
        assert!(target.transferred.lock().await.is_empty());
    }
}
