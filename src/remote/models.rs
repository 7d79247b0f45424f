// ABOUTME: Data structures exchanged with the remote data extension API
// ABOUTME: Extensions, fields, name/value rows and paged row cursors

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A user-defined data extension (remote table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Extension {
    pub customer_key: String,
    pub name: String,
    /// Folder the extension lives in. Only populated by single-extension lookups.
    #[serde(rename = "CategoryID", default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
}

/// A column of a data extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtensionField {
    /// Customer key of the owning extension
    pub customer_key: String,
    pub name: String,
    #[serde(rename = "FieldType")]
    pub value_type: String,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// One name/value pair of a row's property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: serde_json::Value,
}

/// A data extension row as returned by the remote: an ordered property list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "Properties", default)]
    pub properties: Vec<Property>,
}

impl Row {
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        Self {
            properties: pairs
                .into_iter()
                .map(|(name, value)| Property {
                    name: name.into(),
                    value,
                })
                .collect(),
        }
    }
}

/// Half-open `[start, end)` filter on a date-valued property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeFilter {
    pub property: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRangeFilter {
    /// Render as a remote filter expression, e.g.
    /// `ModifiedDate gte '2021-01-01T00:00:00Z' and ModifiedDate lt '2021-01-02T00:00:00Z'`
    pub fn to_expression(&self) -> String {
        format!(
            "{} gte '{}' and {} lt '{}'",
            self.property,
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.property,
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        self.start <= *instant && *instant < self.end
    }
}

/// What to fetch from one data extension.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRequest {
    pub customer_key: String,
    /// Properties to request (never includes injected fields)
    pub properties: Vec<String>,
    /// `None` fetches the whole table
    pub filter: Option<DateRangeFilter>,
    pub page_size: usize,
}

/// Page-by-page position within a row listing.
#[derive(Debug, Clone)]
pub struct RowCursor {
    pub request: RowRequest,
    /// 1-based page to fetch next
    pub next_page: u32,
    pub exhausted: bool,
}

impl RowCursor {
    pub fn new(request: RowRequest) -> Self {
        Self {
            request,
            next_page: 1,
            exhausted: false,
        }
    }

    /// Record a fetched page; a short or empty page ends the listing.
    pub fn advance(&mut self, rows_in_page: usize) {
        self.next_page += 1;
        if rows_in_page == 0 || rows_in_page < self.request.page_size {
            self.exhausted = true;
        }
    }
}
