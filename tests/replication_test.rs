// ABOUTME: End-to-end replication tests against an in-memory data extension API
// ABOUTME: Covers discovery, message ordering, checkpoint files and resume

use anyhow::Result;
use chrono::NaiveDate;
use exacttarget_replicator::catalog::Catalog;
use exacttarget_replicator::commands::discover;
use exacttarget_replicator::config::Config;
use exacttarget_replicator::remote::{
    Extension, ExtensionField, ExtensionSource, Row, RowCursor,
};
use exacttarget_replicator::sink::MessageWriter;
use exacttarget_replicator::state::{FileStateStore, ReplicationState};
use exacttarget_replicator::sync::window::parse_datetime;
use exacttarget_replicator::sync::{run_sync, FixedClock, SyncContext};
use serde_json::{json, Value};

struct InMemoryApi {
    rows: Vec<Row>,
}

impl InMemoryApi {
    fn new() -> Self {
        let row = |id: &str, email: &str, modified: &str| {
            Row::from_pairs([
                ("_CustomObjectKey", json!(id)),
                ("Email", json!(email)),
                ("Opted", json!("True")),
                ("ModifiedDate", json!(modified)),
            ])
        };
        Self {
            rows: vec![
                row("1", "a@example.com", "2/1/2024 9:15:00 AM"),
                row("2", "b@example.com", "2/2/2024 11:00:00 PM"),
                row("3", "c@example.com", "2/3/2024 12:30:00 AM"),
            ],
        }
    }
}

impl ExtensionSource for InMemoryApi {
    async fn list_extensions(&self) -> Result<Vec<Extension>> {
        Ok(vec![
            Extension {
                customer_key: "subs-key".to_string(),
                name: "Subscribers".to_string(),
                category_id: None,
            },
            Extension {
                customer_key: "lookup-key".to_string(),
                name: "Lookup".to_string(),
                category_id: None,
            },
        ])
    }

    async fn list_extension_fields(&self) -> Result<Vec<ExtensionField>> {
        let field = |owner: &str, name: &str, value_type: &str, pk: bool| ExtensionField {
            customer_key: owner.to_string(),
            name: name.to_string(),
            value_type: value_type.to_string(),
            is_primary_key: pk,
            description: None,
        };
        Ok(vec![
            field("subs-key", "Email", "EmailAddress", true),
            field("subs-key", "ModifiedDate", "Date", false),
            field("lookup-key", "Code", "Text", true),
        ])
    }

    async fn get_extension(&self, customer_key: &str) -> Result<Option<Extension>> {
        Ok(Some(Extension {
            customer_key: customer_key.to_string(),
            name: customer_key.to_string(),
            category_id: Some(9001),
        }))
    }

    async fn fetch_rows(&self, cursor: &mut RowCursor) -> Result<Option<Vec<Row>>> {
        if cursor.exhausted {
            return Ok(None);
        }
        let filter = cursor.request.filter.clone();
        let rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|row| match &filter {
                None => true,
                Some(filter) => row
                    .properties
                    .iter()
                    .find(|p| p.name == filter.property)
                    .and_then(|p| p.value.as_str())
                    .and_then(|raw| parse_datetime(raw).ok())
                    .map_or(false, |at| filter.contains(&at)),
            })
            .cloned()
            .collect();
        cursor.exhausted = true;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }
}

fn config() -> Config {
    Config {
        access_token: Some("token".to_string()),
        rest_url: Some("https://example.com".to_string()),
        default_start_date: Some("2024-02-01T00:00:00Z".to_string()),
        ..Config::default()
    }
}

fn messages(output: Vec<u8>) -> Vec<Value> {
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

async fn selected_catalog(api: &InMemoryApi, config: &Config) -> Catalog {
    let mut catalog = discover(api, config).await.unwrap();
    for entry in &mut catalog.streams {
        if entry.stream == "data_extension.Subscribers" {
            entry.schema.selected = true;
        }
    }
    catalog
}

#[tokio::test]
async fn test_sync_emits_schema_then_records_and_checkpoints() {
    let api = InMemoryApi::new();
    let config = config();
    let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 2, 4).unwrap());
    let ctx = SyncContext::new(&api, &config, &clock);
    let catalog = selected_catalog(&api, &config).await;

    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let mut store = FileStateStore::new(&state_path);
    let mut state = ReplicationState::load(&state_path).unwrap();
    let mut sink = MessageWriter::new(Vec::new());

    let stats = run_sync(&ctx, &catalog, &mut state, &mut sink, &mut store)
        .await
        .unwrap();
    assert!(stats.is_success());
    assert_eq!(stats.streams_synced, 1);
    assert_eq!(stats.streams_skipped, 1);
    assert_eq!(stats.records_synced, 3);

    let messages = messages(sink.into_inner());
    assert_eq!(messages[0]["type"], "SCHEMA");
    assert_eq!(messages[0]["stream"], "data_extension.Subscribers");
    assert_eq!(
        messages[0]["key_properties"],
        json!(["_CustomObjectKey", "Email"])
    );
    assert!(messages[1..].iter().all(|m| m["type"] == "RECORD"));

    let first = &messages[1]["record"];
    assert_eq!(first["Email"], "a@example.com");
    assert_eq!(first["CategoryID"], 9001);
    assert!(first.get("Opted").is_none());

    let persisted = ReplicationState::load(&state_path).unwrap();
    assert_eq!(
        persisted.get("data_extension.Subscribers", "ModifiedDate"),
        Some("2024-02-03T00:00:00Z")
    );
}

#[tokio::test]
async fn test_resume_refetches_only_from_committed_window() {
    let api = InMemoryApi::new();
    let config = config();
    let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 2, 4).unwrap());
    let ctx = SyncContext::new(&api, &config, &clock);
    let catalog = selected_catalog(&api, &config).await;

    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let mut seeded = ReplicationState::new();
    seeded.set(
        "data_extension.Subscribers",
        "ModifiedDate",
        "2024-02-03T00:00:00Z",
    );
    std::fs::write(&state_path, serde_json::to_string(&seeded).unwrap()).unwrap();

    let mut state = ReplicationState::load(&state_path).unwrap();
    let mut store = FileStateStore::new(&state_path);
    let mut sink = MessageWriter::new(Vec::new());

    let stats = run_sync(&ctx, &catalog, &mut state, &mut sink, &mut store)
        .await
        .unwrap();
    assert_eq!(stats.records_synced, 1);

    let records: Vec<_> = messages(sink.into_inner())
        .into_iter()
        .filter(|m| m["type"] == "RECORD")
        .map(|m| m["record"]["Email"].clone())
        .collect();
    assert_eq!(records, vec![json!("c@example.com")]);
}

#[tokio::test]
async fn test_stream_without_replication_key_is_full_refresh() {
    let api = InMemoryApi::new();
    let config = Config {
        data_extensions: exacttarget_replicator::config::DataExtensionConfig {
            replication_keys: vec!["LastUpdated".to_string()],
        },
        ..config()
    };
    let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 2, 4).unwrap());
    let ctx = SyncContext::new(&api, &config, &clock);
    let catalog = selected_catalog(&api, &config).await;

    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let mut state = ReplicationState::new();
    let mut store = FileStateStore::new(&state_path);
    let mut sink = MessageWriter::new(Vec::new());

    let stats = run_sync(&ctx, &catalog, &mut state, &mut sink, &mut store)
        .await
        .unwrap();
    assert_eq!(stats.records_synced, 3);
    assert_eq!(state, ReplicationState::new());
    assert_eq!(ReplicationState::load(&state_path).unwrap(), ReplicationState::new());
}
