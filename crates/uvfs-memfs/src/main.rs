#![warn(missing_docs)]
//! uvfs in-memory volume daemon

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uvfs::service::{control, Service};
use uvfs::DebugLog;
use uvfs_memfs::cli::Cli;
use uvfs_memfs::{session, MemFs, MemFsDaemon};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    tracing::info!("uvfs memfs daemon starting...");

    let cli = Cli::parse();
    let params = cli.volume_params()?;
    let mount_point = cli.mount_point()?;

    let store = Arc::new(MemFs::new(&cli.label, params.read_only_volume)?);
    for path in &cli.imports {
        store.import_file(path)?;
    }

    let log = DebugLog::all(tracing::info_span!("memfs", label = %cli.label));
    let (daemon, client) = MemFsDaemon::new(
        store,
        params,
        mount_point,
        cli.guard.strategy(),
        cli.threads,
        log,
    )?;

    let service = Service::new("uvfs-memfs", daemon);
    service.start(&[])?;
    let outcome = session::smoke(&client);
    service.control(control::STOP)?;

    match outcome {
        Ok(names) => {
            tracing::info!("Smoke session listed {} entries", names.len());
            Ok(())
        }
        Err(e) if service.hooks().file_system().params().read_only_volume => {
            tracing::warn!("Smoke session stopped on read-only volume: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
