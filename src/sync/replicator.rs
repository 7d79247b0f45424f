// ABOUTME: ExtensionReplicator - windowed incremental sync of one data extension
// ABOUTME: Streams projected rows downstream and checkpoints after each full window

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;

use super::window::{format_datetime, parse_datetime, Clock, Window};
use super::SyncContext;
use crate::catalog::{CatalogEntry, CATEGORY_ID_FIELD};
use crate::projector::project;
use crate::remote::{DateRangeFilter, ExtensionSource, RowCursor, RowRequest};
use crate::sink::RecordSink;
use crate::state::{ReplicationState, StateStore};

/// Counters from syncing one stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSyncStats {
    pub records: u64,
    /// Windows fully emitted and checkpointed (0 in full-refresh mode)
    pub windows: u64,
    /// Largest replication-key value seen across all emitted rows
    pub max_replication_value: Option<DateTime<Utc>>,
}

/// Per-fetch parameters shared by every window of a stream.
struct FetchPlan<'e> {
    stream: &'e str,
    customer_key: &'e str,
    properties: Vec<String>,
    selected: BTreeSet<String>,
    category_id: Value,
    replication_key: Option<&'e str>,
}

/// Replicates a data extension window by window.
pub struct ExtensionReplicator<'c, 'a, S, C> {
    ctx: &'c SyncContext<'a, S, C>,
}

impl<'c, 'a, S: ExtensionSource, C: Clock> ExtensionReplicator<'c, 'a, S, C> {
    pub fn new(ctx: &'c SyncContext<'a, S, C>) -> Self {
        Self { ctx }
    }

    /// Sync one catalog stream.
    ///
    /// Emits the schema, then fetches `[start, start + unit)` windows until the
    /// window start reaches today, committing each window's start as the
    /// bookmark once all of its rows are emitted. Without a replication key the
    /// whole table is fetched once and no bookmark is written.
    pub async fn sync(
        &self,
        entry: &CatalogEntry,
        state: &mut ReplicationState,
        sink: &mut dyn RecordSink,
        store: &mut dyn StateStore,
    ) -> Result<StreamSyncStats> {
        let mut stats = StreamSyncStats::default();

        if !entry.is_selected() {
            tracing::info!("{} is not marked as selected, skipping.", entry.stream);
            return Ok(stats);
        }

        let customer_key = entry.customer_key().ok_or_else(|| {
            anyhow!(
                "Stream id '{}' is not a data extension stream",
                entry.tap_stream_id
            )
        })?;

        tracing::info!(
            "Syncing stream {} (data extension {})",
            entry.stream,
            customer_key
        );

        let replication_key = entry.resolve_replication_key(self.ctx.config.replication_keys());
        let bookmark_properties: Vec<String> = replication_key.iter().cloned().collect();
        sink.emit_schema(
            &entry.stream,
            &entry.schema,
            &entry.key_properties,
            &bookmark_properties,
        )?;

        let start = match replication_key.as_deref() {
            Some(key) => Some(self.resolve_start(&entry.stream, key, state)?),
            None => None,
        };

        let category_id = self.lookup_category_id(customer_key).await?;

        let plan = FetchPlan {
            stream: &entry.stream,
            customer_key,
            properties: entry.request_properties(),
            selected: entry.selected_fields(),
            category_id,
            replication_key: replication_key.as_deref(),
        };

        let (key, start) = match (plan.replication_key, start) {
            (Some(key), Some(start)) => (key, start),
            _ => {
                tracing::info!(
                    "{} has no replication key, fetching the full table",
                    entry.stream
                );
                self.replicate(&plan, None, sink, &mut stats).await?;
                return Ok(stats);
            }
        };

        let unit = self.ctx.config.window_unit();
        let mut window = Window::starting_at(start, unit)?;

        while self.ctx.clock.before_today(&window.start) {
            tracing::info!(
                "Fetching {} from {} to {}",
                entry.stream,
                format_datetime(&window.start),
                format_datetime(&window.end)
            );

            let seen = self
                .replicate(&plan, Some(window.filter(key)), sink, &mut stats)
                .await?;

            // Commit the window start, not the max value seen; the window is the checkpoint unit
            state.set(&entry.stream, key, format_datetime(&window.start));
            store.persist(state)?;
            stats.windows += 1;

            tracing::debug!(
                "Committed {} bookmark {} ({} rows, max {} seen)",
                entry.stream,
                format_datetime(&window.start),
                seen,
                stats
                    .max_replication_value
                    .as_ref()
                    .map(format_datetime)
                    .unwrap_or_else(|| "none".to_string())
            );

            window = window.next(unit)?;
        }

        tracing::info!(
            "Finished {}: {} records in {} windows",
            entry.stream,
            stats.records,
            stats.windows
        );
        Ok(stats)
    }

    fn resolve_start(
        &self,
        stream: &str,
        key: &str,
        state: &ReplicationState,
    ) -> Result<DateTime<Utc>> {
        if let Some(bookmark) = state.get(stream, key) {
            return parse_datetime(bookmark)
                .with_context(|| format!("Invalid bookmark for {}.{}", stream, key));
        }
        match self.ctx.config.default_start_date()? {
            Some(start) => Ok(start),
            None => bail!(
                "No bookmark for {} and no default_start_date configured; cannot determine where to start",
                stream
            ),
        }
    }

    async fn lookup_category_id(&self, customer_key: &str) -> Result<Value> {
        let parent = self
            .ctx
            .source
            .get_extension(customer_key)
            .await
            .with_context(|| format!("Failed to look up data extension {}", customer_key))?
            .ok_or_else(|| anyhow!("Data extension {} was not found", customer_key))?;
        Ok(parent.category_id.map(Value::from).unwrap_or(Value::Null))
    }

    /// Fetch every page for one filter, emitting each row as it arrives.
    /// Returns the number of rows emitted.
    async fn replicate(
        &self,
        plan: &FetchPlan<'_>,
        filter: Option<DateRangeFilter>,
        sink: &mut dyn RecordSink,
        stats: &mut StreamSyncStats,
    ) -> Result<u64> {
        let mut cursor = RowCursor::new(RowRequest {
            customer_key: plan.customer_key.to_string(),
            properties: plan.properties.clone(),
            filter,
            page_size: self.ctx.config.page_size,
        });

        let mut emitted = 0u64;
        while let Some(rows) = self
            .ctx
            .source
            .fetch_rows(&mut cursor)
            .await
            .with_context(|| format!("Failed to fetch rows for {}", plan.stream))?
        {
            tracing::debug!("Fetched {} rows for {}", rows.len(), plan.stream);
            for row in &rows {
                let mut record = project(row, &plan.selected);
                record.insert(CATEGORY_ID_FIELD.to_string(), plan.category_id.clone());

                if let Some(key) = plan.replication_key {
                    observe_replication_value(stats, record.get(key));
                }

                sink.emit_records(plan.stream, &[record])?;
                emitted += 1;
                stats.records += 1;
            }
        }
        Ok(emitted)
    }
}

fn observe_replication_value(stats: &mut StreamSyncStats, value: Option<&Value>) {
    let Some(Value::String(raw)) = value else {
        return;
    };
    match parse_datetime(raw) {
        Ok(seen) => {
            if stats.max_replication_value.map_or(true, |max| seen > max) {
                stats.max_replication_value = Some(seen);
            }
        }
        Err(_) => tracing::debug!("Ignoring unparseable replication value '{}'", raw),
    }
}
