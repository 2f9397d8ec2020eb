// SPDX-License-Identifier: MIT

//! The on-disk reference cache.
//!
//! Layout: one subdirectory per known store path, named by its basename,
//! holding one empty file per immediate reference. Entries are written by
//! staging a sibling temporary directory and atomically renaming it into
//! place, then marking it read-only; an existing entry is never rewritten
//! (the in-memory tree is monotonic, so its value cannot have changed).

use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tracing::debug;

use ferry_store_core::StorePath;

use crate::error::{FerryError, IoContext, Result};
use crate::state::PathTree;

/// Mode of a populated cache entry directory.
const ENTRY_DIR_MODE: u32 = 0o555;

pub struct PathCache {
    root: PathBuf,
}

impl PathCache {
    pub fn new(root: PathBuf) -> Self {
        PathCache { root }
    }

    /// Read the whole cache. A missing cache directory is an empty tree;
    /// an entry that does not parse as a store path basename is an error.
    pub fn load(&self) -> Result<PathTree> {
        let mut tree = PathTree::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tree),
            Err(e) => {
                return Err(FerryError::Io {
                    context: format!("failed to read {}", self.root.display()),
                    source: e,
                });
            }
        };

        for entry in entries {
            let entry =
                entry.io_context(|| format!("failed to read {}", self.root.display()))?;
            let name = entry.file_name();
            let key = StorePath::parse(&name.to_string_lossy())?;

            let mut refs = BTreeSet::new();
            let children = fs::read_dir(entry.path())
                .io_context(|| format!("failed to read {}", entry.path().display()))?;
            for child in children {
                let child =
                    child.io_context(|| format!("failed to read {}", entry.path().display()))?;
                refs.insert(StorePath::parse(&child.file_name().to_string_lossy())?);
            }
            tree.insert(key, refs);
        }

        debug!(entries = tree.len(), "loaded path cache");
        Ok(tree)
    }

    /// Write every tree entry that is not yet on disk.
    pub fn store(&self, tree: &PathTree) -> Result<()> {
        fs::create_dir_all(&self.root)
            .io_context(|| format!("failed to create {}", self.root.display()))?;

        for (key, refs) in tree {
            let target = self.root.join(key.to_string());
            if target.exists() {
                continue;
            }

            let staging = tempfile::Builder::new()
                .prefix(".tmp-")
                .tempdir_in(&self.root)
                .io_context(|| format!("failed to stage entry for {key}"))?
                .keep();

            for reference in refs {
                let file = staging.join(reference.to_string());
                fs::File::create(&file)
                    .io_context(|| format!("failed to write {}", file.display()))?;
            }

            if let Err(e) = fs::rename(&staging, &target) {
                let _ = fs::remove_dir_all(&staging);
                // a concurrent invocation renamed the same (monotonic) value
                // into place first
                if !target.is_dir() {
                    return Err(FerryError::Io {
                        context: format!("failed to rename {} into place", target.display()),
                        source: e,
                    });
                }
                continue;
            }

            fs::set_permissions(&target, fs::Permissions::from_mode(ENTRY_DIR_MODE))
                .io_context(|| format!("failed to mark {} read-only", target.display()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(hash_char: char, name: &str) -> StorePath {
        let hash: String = std::iter::repeat_n(hash_char, 32).collect();
        StorePath::parse(&format!("{hash}-{name}")).unwrap()
    }

    /// Restore write permission so the tempdir can be cleaned up.
    fn unlock(root: &std::path::Path) {
        for entry in fs::read_dir(root).unwrap().flatten() {
            let _ = fs::set_permissions(entry.path(), fs::Permissions::from_mode(0o755));
        }
    }

    #[test]
    fn store_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PathCache::new(dir.path().join("path-cache"));

        let mut tree = PathTree::new();
        tree.insert(
            sp('a', "app"),
            BTreeSet::from([sp('b', "lib"), sp('c', "data")]),
        );
        tree.insert(sp('b', "lib"), BTreeSet::new());

        cache.store(&tree).unwrap();
        let loaded = cache.load().unwrap();
        assert_eq!(loaded, tree);

        unlock(&dir.path().join("path-cache"));
    }

    #[test]
    fn missing_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PathCache::new(dir.path().join("nonexistent"));
        assert!(cache.load().unwrap().is_empty());
    }

    #[test]
    fn existing_entries_are_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PathCache::new(dir.path().to_path_buf());

        let key = sp('a', "app");
        let mut tree = PathTree::new();
        tree.insert(key.clone(), BTreeSet::from([sp('b', "lib")]));
        cache.store(&tree).unwrap();

        // second store with the same key (different in-memory value) must
        // leave the on-disk entry alone
        let mut other = PathTree::new();
        other.insert(key.clone(), BTreeSet::from([sp('c', "data")]));
        cache.store(&other).unwrap();

        let loaded = cache.load().unwrap();
        assert_eq!(loaded[&key], BTreeSet::from([sp('b', "lib")]));

        unlock(dir.path());
    }

    #[test]
    fn entries_are_marked_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PathCache::new(dir.path().to_path_buf());

        let key = sp('a', "app");
        let mut tree = PathTree::new();
        tree.insert(key.clone(), BTreeSet::new());
        cache.store(&tree).unwrap();

        let meta = fs::metadata(dir.path().join(key.to_string())).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, ENTRY_DIR_MODE);

        unlock(dir.path());
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]

        #[test]
        fn proptest_store_load_roundtrip(
            entries in proptest::collection::hash_map(
                "[a-z0-9]{32}",
                proptest::collection::btree_set("[a-z0-9]{32}", 0..4),
                0..6,
            )
        ) {
            let dir = tempfile::tempdir().unwrap();
            let cache = PathCache::new(dir.path().to_path_buf());

            let tree: PathTree = entries
                .into_iter()
                .map(|(k, refs)| {
                    (
                        StorePath::parse(&format!("{k}-pkg")).unwrap(),
                        refs.into_iter()
                            .map(|r| StorePath::parse(&format!("{r}-dep")).unwrap())
                            .collect(),
                    )
                })
                .collect();

            cache.store(&tree).unwrap();
            let loaded = cache.load().unwrap();
            proptest::prop_assert_eq!(loaded, tree);

            unlock(dir.path());
        }
    }

    #[test]
    fn unparseable_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PathCache::new(dir.path().to_path_buf());
        fs::create_dir(dir.path().join("garbage")).unwrap();

        assert!(matches!(
            cache.load(),
            Err(FerryError::StorePath(_))
        ));
    }
}
