// ABOUTME: Boundary to the remote marketing platform API
// ABOUTME: Defines the ExtensionSource trait and its reqwest-backed implementation

pub mod client;
pub mod models;

pub use client::RestClient;
pub use models::{DateRangeFilter, Extension, ExtensionField, Property, Row, RowCursor, RowRequest};

use anyhow::Result;

/// Remote operations the catalog builder and replicator consume.
///
/// Calls are awaited one at a time; implementations do not retry.
#[allow(async_fn_in_trait)]
pub trait ExtensionSource {
    /// List every data extension visible to the account.
    async fn list_extensions(&self) -> Result<Vec<Extension>>;

    /// List the fields of all data extensions in one call.
    async fn list_extension_fields(&self) -> Result<Vec<ExtensionField>>;

    /// Look up a single extension (with its folder) by customer key.
    async fn get_extension(&self, customer_key: &str) -> Result<Option<Extension>>;

    /// Fetch the next page of rows for the cursor.
    ///
    /// Returns `None` once the cursor is exhausted.
    async fn fetch_rows(&self, cursor: &mut RowCursor) -> Result<Option<Vec<Row>>>;
}
