// ABOUTME: Sync runner - replicates every selected catalog stream in order
// ABOUTME: Isolates per-stream failures and persists the final state

use anyhow::Result;

use super::streams::StreamHandler;
use super::window::Clock;
use super::SyncContext;
use crate::catalog::Catalog;
use crate::remote::ExtensionSource;
use crate::sink::RecordSink;
use crate::state::{ReplicationState, StateStore};

/// Statistics from a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub streams_synced: usize,
    pub streams_skipped: usize,
    pub records_synced: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl SyncStats {
    /// Check if the run completed without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Sync each selected stream sequentially.
///
/// A failing stream is logged and recorded in the returned stats; later streams
/// still run. The state is persisted once more after the last stream.
pub async fn run_sync<S: ExtensionSource, C: Clock>(
    ctx: &SyncContext<'_, S, C>,
    catalog: &Catalog,
    state: &mut ReplicationState,
    sink: &mut dyn RecordSink,
    store: &mut dyn StateStore,
) -> Result<SyncStats> {
    let start = std::time::Instant::now();
    let mut stats = SyncStats::default();

    for entry in &catalog.streams {
        if !entry.is_selected() {
            tracing::info!("'{}' is not marked selected, skipping.", entry.stream);
            stats.streams_skipped += 1;
            continue;
        }

        let Some(handler) = StreamHandler::for_entry(entry) else {
            tracing::warn!(
                "No handler for stream '{}', skipping.",
                entry.tap_stream_id
            );
            stats.streams_skipped += 1;
            continue;
        };

        tracing::info!(
            "Syncing stream {} with handler {}",
            entry.tap_stream_id,
            handler.name()
        );

        let result = match entry.validate() {
            Ok(()) => handler.sync(ctx, entry, state, sink, store).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(stream_stats) => {
                stats.streams_synced += 1;
                stats.records_synced += stream_stats.records;
            }
            Err(e) => {
                // Log with :? to show full error chain including root cause
                tracing::error!("Failed to sync {}: {:?}", entry.stream, e);
                stats
                    .errors
                    .push(format!("Failed to sync {}: {}", entry.stream, e));
            }
        }
    }

    store.persist(state)?;

    stats.duration_ms = start.elapsed().as_millis() as u64;
    Ok(stats)
}
