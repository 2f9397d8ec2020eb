// SPDX-License-Identifier: MIT

//! The local object store, reached through the `nix-store` tool.
//!
//! Four operations are delegated: dumping a raw archive, exporting an
//! archive with its metadata framing, importing an exported archive, and
//! listing a path's immediate references. Each call spawns one subprocess
//! with piped stdio; stderr is captured for diagnostics.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use ferry_store_core::{FullStorePath, StoreDir, StorePath};

use crate::error::{FerryError, IoContext, Result};

const STORE_PROGRAM: &str = "nix-store";

pub struct LocalStore {
    store_dir: StoreDir,
}

impl LocalStore {
    pub fn new(store_dir: StoreDir) -> Self {
        LocalStore { store_dir }
    }

    pub fn store_dir(&self) -> &StoreDir {
        &self.store_dir
    }

    /// Raw archive of `path` (`--dump`).
    pub async fn dump(&self, path: &StorePath) -> Result<Vec<u8>> {
        let full = self.store_dir.path_of(path);
        run_store(&["--dump", &full.to_string_lossy()], None).await
    }

    /// Exportable archive of `path`, metadata framing included
    /// (`--export`).
    pub async fn export(&self, path: &StorePath) -> Result<Vec<u8>> {
        let full = self.store_dir.path_of(path);
        run_store(&["--export", &full.to_string_lossy()], None).await
    }

    /// Import an exported archive (`--import`). On failure the archive is
    /// kept in a temporary file for post-mortem inspection.
    pub async fn import(&self, archive: &[u8]) -> Result<()> {
        match run_store(&["--import"], Some(archive)).await {
            Ok(_) => Ok(()),
            Err(source) => {
                let file = tempfile::Builder::new()
                    .prefix("ferry-import-")
                    .suffix(".export")
                    .tempfile()
                    .io_context(|| "failed to create post-mortem file".to_string())?;
                std::fs::write(file.path(), archive)
                    .io_context(|| "failed to write post-mortem file".to_string())?;
                let (_, kept) = file
                    .keep()
                    .map_err(|e| FerryError::Io {
                        context: "failed to keep post-mortem file".to_string(),
                        source: e.error,
                    })?;
                Err(FerryError::ImportFailed {
                    kept,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Immediate references of `path` (`--query --references`), parsed
    /// from the whitespace-separated list the tool prints.
    pub async fn references(&self, path: &StorePath) -> Result<Vec<StorePath>> {
        let full = self.store_dir.path_of(path);
        let stdout = run_store(
            &["--query", "--references", &full.to_string_lossy()],
            None,
        )
        .await?;
        let text = String::from_utf8_lossy(&stdout);
        text.split_ascii_whitespace()
            .map(|p| Ok(FullStorePath::parse(p)?.into_store_path()))
            .collect()
    }
}

async fn run_store(args: &[&str], stdin: Option<&[u8]>) -> Result<Vec<u8>> {
    debug!(?args, "spawning {STORE_PROGRAM}");
    let mut cmd = Command::new(STORE_PROGRAM);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| FerryError::SpawnFailed {
        program: STORE_PROGRAM.to_string(),
        source: e,
    })?;

    if let Some(input) = stdin {
        // taking the handle closes the pipe once the write is done
        let mut pipe = child.stdin.take().ok_or_else(|| FerryError::Io {
            context: format!("no stdin pipe for {STORE_PROGRAM}"),
            source: std::io::Error::other("stdin not captured"),
        })?;
        pipe.write_all(input)
            .await
            .io_context(|| format!("failed to write to {STORE_PROGRAM} stdin"))?;
        drop(pipe);
    }

    let output = child
        .wait_with_output()
        .await
        .io_context(|| format!("failed to wait for {STORE_PROGRAM}"))?;

    if !output.status.success() {
        return Err(FerryError::NonZeroExit {
            program: STORE_PROGRAM.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}
