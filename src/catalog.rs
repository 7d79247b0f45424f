// ABOUTME: Catalog of data extension streams built from remote discovery
// ABOUTME: Two-phase build - seed one entry per extension, then merge in every field

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::remote::{Extension, ExtensionField, ExtensionSource};
use crate::schema::{FieldSchema, JsonType, StreamSchema, TypeSpec};

/// Prefix of every data extension stream identifier.
pub const STREAM_PREFIX: &str = "data_extension.";

/// Auto-incrementing row key the remote keeps on every data extension.
pub const HIDDEN_KEY_FIELD: &str = "_CustomObjectKey";

/// Folder id copied from the parent extension onto every row.
pub const CATEGORY_ID_FIELD: &str = "CategoryID";

/// Catalog description of one data extension stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// `data_extension.<customer key>`
    pub tap_stream_id: String,
    /// `data_extension.<extension name>`, also the bookmark namespace
    pub stream: String,
    pub key_properties: Vec<String>,
    pub schema: StreamSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key: Option<String>,
}

impl CatalogEntry {
    /// Entry for a freshly listed extension, before any of its fields are known.
    pub fn seed(extension: &Extension) -> Self {
        let mut schema = StreamSchema::default();
        schema.properties.insert(
            HIDDEN_KEY_FIELD.to_string(),
            FieldSchema::new(
                TypeSpec::Single(JsonType::String),
                Some("Hidden auto-incrementing primary key for data extension rows.".to_string()),
            ),
        );
        schema.properties.insert(
            CATEGORY_ID_FIELD.to_string(),
            FieldSchema::new(
                TypeSpec::Single(JsonType::Integer),
                Some(
                    "Specifies the identifier of the folder. (Taken from the parent data extension.)"
                        .to_string(),
                ),
            ),
        );

        Self {
            tap_stream_id: format!("{}{}", STREAM_PREFIX, extension.customer_key),
            stream: format!("{}{}", STREAM_PREFIX, extension.name),
            key_properties: vec![HIDDEN_KEY_FIELD.to_string()],
            schema,
            replication_key: None,
        }
    }

    /// Customer key of the extension this stream replicates.
    pub fn customer_key(&self) -> Option<&str> {
        self.tap_stream_id.strip_prefix(STREAM_PREFIX)
    }

    pub fn is_selected(&self) -> bool {
        self.schema.selected
    }

    /// Every field the consumer receives.
    pub fn selected_fields(&self) -> BTreeSet<String> {
        self.schema.properties.keys().cloned().collect()
    }

    /// Fields to request from the remote; the injected folder id is not a column.
    pub fn request_properties(&self) -> Vec<String> {
        self.schema
            .properties
            .keys()
            .filter(|name| name.as_str() != CATEGORY_ID_FIELD)
            .cloned()
            .collect()
    }

    /// First candidate present among the remote columns, in preference order.
    pub fn resolve_replication_key(&self, candidates: &[String]) -> Option<String> {
        candidates
            .iter()
            .filter(|candidate| candidate.as_str() != CATEGORY_ID_FIELD)
            .find(|candidate| self.schema.properties.contains_key(candidate.as_str()))
            .cloned()
    }

    /// Key properties and replication key must name schema fields.
    pub fn validate(&self) -> Result<()> {
        for key in self.key_properties.iter().chain(self.replication_key.iter()) {
            if !self.schema.properties.contains_key(key) {
                bail!(
                    "Stream {} references field '{}' which is not in its schema",
                    self.tap_stream_id,
                    key
                );
            }
        }
        Ok(())
    }

    fn merge_field(&mut self, field: &ExtensionField) {
        // Rows always carry the parent folder id under this name
        if field.name == CATEGORY_ID_FIELD {
            tracing::warn!(
                "Ignoring field '{}' on data extension '{}': the name is reserved for the folder id",
                field.name,
                field.customer_key
            );
            return;
        }
        self.schema.properties.insert(
            field.name.clone(),
            FieldSchema::discovered(&field.value_type, field.description.clone()),
        );
        if field.is_primary_key && !self.key_properties.contains(&field.name) {
            self.key_properties.push(field.name.clone());
        }
    }

    /// Hidden key first, then primary keys by name, so merge order never shows.
    fn normalize_key_properties(&mut self) {
        let mut keys: Vec<String> = self
            .key_properties
            .drain(..)
            .filter(|key| key != HIDDEN_KEY_FIELD)
            .collect();
        keys.sort();
        keys.dedup();
        self.key_properties = std::iter::once(HIDDEN_KEY_FIELD.to_string())
            .chain(keys)
            .collect();
    }
}

/// Full catalog as printed by discovery and read back for sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub streams: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog from {:?}", path))?;
        let catalog: Catalog = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse catalog from {:?}", path))?;
        Ok(catalog)
    }

    pub fn selected_streams(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.streams.iter().filter(|entry| entry.is_selected())
    }
}

/// Discovers data extensions and their fields and builds one entry per extension.
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    replication_keys: Vec<String>,
}

impl CatalogBuilder {
    pub fn new(replication_keys: Vec<String>) -> Self {
        Self { replication_keys }
    }

    /// List extensions, then all fields, and merge them into catalog entries
    /// keyed by customer key.
    pub async fn discover<S: ExtensionSource>(
        &self,
        source: &S,
    ) -> Result<BTreeMap<String, CatalogEntry>> {
        tracing::info!("Listing data extensions...");
        let extensions = source
            .list_extensions()
            .await
            .context("Failed to list data extensions")?;
        tracing::info!("Found {} data extensions", extensions.len());

        tracing::info!("Listing data extension fields...");
        let fields = source
            .list_extension_fields()
            .await
            .context("Failed to list data extension fields")?;
        tracing::info!("Found {} data extension fields", fields.len());

        Ok(self.build(&extensions, &fields))
    }

    /// Merge listed extensions and fields.
    ///
    /// Fields whose owning extension was never listed are skipped with a warning.
    pub fn build(
        &self,
        extensions: &[Extension],
        fields: &[ExtensionField],
    ) -> BTreeMap<String, CatalogEntry> {
        let mut entries: BTreeMap<String, CatalogEntry> = BTreeMap::new();
        for extension in extensions {
            entries.insert(extension.customer_key.clone(), CatalogEntry::seed(extension));
        }

        let mut orphaned = 0usize;
        for field in fields {
            match entries.get_mut(&field.customer_key) {
                Some(entry) => entry.merge_field(field),
                None => {
                    orphaned += 1;
                    tracing::warn!(
                        "Skipping field '{}': data extension '{}' was not listed",
                        field.name,
                        field.customer_key
                    );
                }
            }
        }
        if orphaned > 0 {
            tracing::warn!("Skipped {} fields with no listed data extension", orphaned);
        }

        for entry in entries.values_mut() {
            entry.normalize_key_properties();
            entry.replication_key = entry.resolve_replication_key(&self.replication_keys);
        }

        entries
    }
}
