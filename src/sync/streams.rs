// ABOUTME: Registry of stream handlers - which sync strategy serves a catalog stream
// ABOUTME: Each variant declares a match predicate plus its discover and sync operations

use anyhow::Result;

use super::replicator::{ExtensionReplicator, StreamSyncStats};
use super::window::Clock;
use super::SyncContext;
use crate::catalog::{CatalogBuilder, CatalogEntry, STREAM_PREFIX};
use crate::config::Config;
use crate::remote::ExtensionSource;
use crate::sink::RecordSink;
use crate::state::{ReplicationState, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHandler {
    /// Dynamic-schema data extension streams (`data_extension.*`)
    DataExtension,
}

impl StreamHandler {
    pub const ALL: &'static [StreamHandler] = &[StreamHandler::DataExtension];

    pub fn name(&self) -> &'static str {
        match self {
            StreamHandler::DataExtension => "data_extension",
        }
    }

    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        match self {
            StreamHandler::DataExtension => entry.tap_stream_id.starts_with(STREAM_PREFIX),
        }
    }

    /// First registered handler whose predicate accepts the entry.
    pub fn for_entry(entry: &CatalogEntry) -> Option<StreamHandler> {
        Self::ALL.iter().copied().find(|handler| handler.matches(entry))
    }

    /// Catalog entries this handler contributes to discovery.
    pub async fn discover<S: ExtensionSource>(
        &self,
        source: &S,
        config: &Config,
    ) -> Result<Vec<CatalogEntry>> {
        match self {
            StreamHandler::DataExtension => {
                let builder = CatalogBuilder::new(config.replication_keys().to_vec());
                Ok(builder.discover(source).await?.into_values().collect())
            }
        }
    }

    pub async fn sync<S: ExtensionSource, C: Clock>(
        &self,
        ctx: &SyncContext<'_, S, C>,
        entry: &CatalogEntry,
        state: &mut ReplicationState,
        sink: &mut dyn RecordSink,
        store: &mut dyn StateStore,
    ) -> Result<StreamSyncStats> {
        match self {
            StreamHandler::DataExtension => {
                ExtensionReplicator::new(ctx)
                    .sync(entry, state, sink, store)
                    .await
            }
        }
    }
}
