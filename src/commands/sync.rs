// ABOUTME: Sync command - replicates selected catalog streams to stdout
// ABOUTME: Wires config, catalog, state and the REST client into the sync runner

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::remote::RestClient;
use crate::sink::MessageWriter;
use crate::state::{FileStateStore, ReplicationState, StateMessageStore, StateStore};
use crate::sync::{run_sync, SyncContext, SyncStats, SystemClock};

pub struct SyncOptions {
    pub config_path: PathBuf,
    pub catalog_path: PathBuf,
    /// State to resume from
    pub state_path: Option<PathBuf>,
    /// Where to persist checkpoints; STATE messages on stdout when unset
    pub state_output: Option<PathBuf>,
}

pub async fn sync(opts: SyncOptions) -> Result<SyncStats> {
    tracing::info!("Starting sync.");

    let config = Config::load(&opts.config_path)?;
    let catalog = Catalog::load(&opts.catalog_path)?;
    let mut state = match &opts.state_path {
        Some(path) => ReplicationState::load(path).context("Failed to load state")?,
        None => ReplicationState::default(),
    };

    let selected = catalog.selected_streams().count();
    tracing::info!(
        "{} of {} catalog streams selected",
        selected,
        catalog.streams.len()
    );

    let client = RestClient::connect(&config).await?;
    let clock = SystemClock;
    let ctx = SyncContext::new(&client, &config, &clock);

    let mut sink = MessageWriter::stdout();
    let mut store: Box<dyn StateStore> = match &opts.state_output {
        Some(path) => Box::new(FileStateStore::new(path)),
        None => Box::new(StateMessageStore::stdout()),
    };

    let stats = run_sync(&ctx, &catalog, &mut state, &mut sink, store.as_mut()).await?;

    tracing::info!(
        "Sync completed: {} streams, {} records in {}ms",
        stats.streams_synced,
        stats.records_synced,
        stats.duration_ms
    );
    if !stats.is_success() {
        for error in &stats.errors {
            tracing::error!("{}", error);
        }
        bail!("{} stream(s) failed to sync", stats.errors.len());
    }
    Ok(stats)
}
