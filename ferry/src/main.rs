// SPDX-License-Identifier: MIT

#![warn(clippy::dbg_macro)]

use std::process::exit;

use tokio::io::AsyncWriteExt;
use tracing::warn;

use ferry_store_core::{PathSet, StorePath};

mod closure;
mod config;
mod error;
mod fetch;
mod path_cache;
mod push;
mod state;
mod store;
mod transfer;

use error::{IoContext, Result};
use state::Client;

fn usage() -> ! {
    eprintln!("usage: ferry <push|fetch|closure|missing|dump> <store-path>...");
    exit(2)
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else { usage() };
    let roots = args
        .map(|arg| StorePath::parse_permissive(&arg))
        .collect::<std::result::Result<PathSet, _>>()?;
    if roots.is_empty() {
        usage();
    }

    let config = config::load()?;
    let client = Client::new(config)?;

    let result = match command.as_str() {
        "push" => client.push(&roots).await,
        "fetch" => client.fetch(&roots).await,
        "closure" => match client.closure(&roots).await {
            Ok(closure) => {
                for path in closure {
                    println!("{}", client.config.store_dir.full(path));
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        "missing" => match client.query_store_paths(&roots).await {
            Ok(missing) => {
                for path in missing {
                    println!("{}", client.config.store_dir.full(path));
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        "dump" => dump(&client, &roots).await,
        _ => usage(),
    };

    // flush whatever was learned, even when the operation failed
    if let Err(e) = client.flush_path_cache().await {
        warn!("failed to persist path cache: {e}");
    }

    result
}

/// Write the raw archive of a single path to stdout.
async fn dump(client: &Client, roots: &PathSet) -> Result<()> {
    let mut paths = roots.iter();
    let (Some(path), None) = (paths.next(), paths.next()) else {
        usage()
    };
    let archive = client.store.dump(path).await?;
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(&archive)
        .await
        .io_context(|| "failed to write archive to stdout".to_string())?;
    stdout
        .flush()
        .await
        .io_context(|| "failed to flush stdout".to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    if let Err(e) = run().await {
        eprintln!("ferry: {e}");
        exit(1);
    }
}
