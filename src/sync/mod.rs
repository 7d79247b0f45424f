// ABOUTME: Incremental replication of catalog streams
// ABOUTME: Windowed extension sync, stream handler registry and the sync runner

pub mod replicator;
pub mod runner;
pub mod streams;
pub mod window;

pub use replicator::{ExtensionReplicator, StreamSyncStats};
pub use runner::{run_sync, SyncStats};
pub use streams::StreamHandler;
pub use window::{Clock, FixedClock, SystemClock, Window, WindowUnit};

use crate::config::Config;

/// Everything a stream sync reads but never mutates.
pub struct SyncContext<'a, S, C> {
    pub source: &'a S,
    pub config: &'a Config,
    pub clock: &'a C,
}

impl<'a, S, C> SyncContext<'a, S, C> {
    pub fn new(source: &'a S, config: &'a Config, clock: &'a C) -> Self {
        Self {
            source,
            config,
            clock,
        }
    }
}
