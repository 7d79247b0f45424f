// ABOUTME: HTTP client for the marketing platform REST API
// ABOUTME: Token exchange, paged listings of data extensions, fields and rows

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::models::{Extension, ExtensionField, Row, RowCursor};
use super::ExtensionSource;
use crate::config::Config;

/// Wrapper for paged API responses
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// REST client implementing [`ExtensionSource`].
pub struct RestClient {
    client: Client,
    rest_base_url: Url,
    access_token: String,
    page_size: usize,
}

impl RestClient {
    /// Build a client from config, exchanging client credentials for a token
    /// unless the config already carries one.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let access_token = match config.access_token.clone() {
            Some(token) => token,
            None => Self::request_token(&client, config).await?,
        };

        Ok(Self {
            client,
            rest_base_url: config.rest_base_url()?,
            access_token,
            page_size: config.page_size,
        })
    }

    async fn request_token(client: &Client, config: &Config) -> Result<String> {
        let (client_id, client_secret) = match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => (id.as_str(), secret.as_str()),
            _ => anyhow::bail!("client_id and client_secret are required to request a token"),
        };

        let mut url = config.auth_base_url()?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Auth URL cannot be used as a base"))?
            .pop_if_empty()
            .extend(["v2", "token"]);

        tracing::debug!("Requesting access token from {}", url);
        let response = client
            .post(url)
            .json(&TokenRequest {
                grant_type: "client_credentials",
                client_id,
                client_secret,
            })
            .send()
            .await
            .context("Failed to send token request")?;

        if response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::BAD_REQUEST
        {
            anyhow::bail!(
                "Authentication failed. Check client_id and client_secret and that the \
                 installed package has data extension read access."
            );
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Token request failed with status {}: {}", status, body);
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;
        if let Some(expires_in) = token.expires_in {
            tracing::info!("Obtained access token (expires in {}s)", expires_in);
        }
        Ok(token.access_token)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.rest_base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("REST URL cannot be used as a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_page<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url.path()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => anyhow::bail!(
                "Access token was rejected. It may be expired; re-run to request a new one."
            ),
            StatusCode::NOT_FOUND => anyhow::bail!("Resource {} not found", url.path()),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("Request to {} failed with status {}: {}", url.path(), status, body);
            }
            _ => {}
        }

        let page: Page<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url.path()))?;
        Ok(page.items)
    }

    /// Follow page numbers until a short page comes back.
    async fn get_all<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        filter: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let mut url = self.endpoint(segments)?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("$page", &page.to_string())
                    .append_pair("$pageSize", &self.page_size.to_string());
                if let Some(filter) = filter {
                    query.append_pair("$filter", filter);
                }
            }
            let items: Vec<T> = self.get_page(url).await?;
            let count = items.len();
            all.extend(items);
            if count < self.page_size {
                return Ok(all);
            }
            page += 1;
        }
    }

    fn rows_url(&self, cursor: &RowCursor) -> Result<Url> {
        let request = &cursor.request;
        let mut url = self.endpoint(&[
            "data",
            "v1",
            "customobjectdata",
            "key",
            &request.customer_key,
            "rowset",
        ])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("$page", &cursor.next_page.to_string())
                .append_pair("$pageSize", &request.page_size.to_string());
            if !request.properties.is_empty() {
                query.append_pair("$fields", &request.properties.join(","));
            }
            if let Some(filter) = &request.filter {
                query.append_pair("$filter", &filter.to_expression());
            }
        }
        Ok(url)
    }
}

impl ExtensionSource for RestClient {
    async fn list_extensions(&self) -> Result<Vec<Extension>> {
        self.get_all(&["data", "v1", "dataextensions"], None).await
    }

    async fn list_extension_fields(&self) -> Result<Vec<ExtensionField>> {
        self.get_all(&["data", "v1", "dataextensions", "fields"], None)
            .await
    }

    async fn get_extension(&self, customer_key: &str) -> Result<Option<Extension>> {
        let filter = format!("CustomerKey eq '{}'", customer_key.replace('\'', "''"));
        let mut url = self.endpoint(&["data", "v1", "dataextensions"])?;
        url.query_pairs_mut().append_pair("$filter", &filter);
        let extensions: Vec<Extension> = self.get_page(url).await?;
        Ok(extensions.into_iter().next())
    }

    async fn fetch_rows(&self, cursor: &mut RowCursor) -> Result<Option<Vec<Row>>> {
        if cursor.exhausted {
            return Ok(None);
        }
        let url = self.rows_url(cursor)?;
        let rows: Vec<Row> = self.get_page(url).await?;
        cursor.advance(rows.len());
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::models::{DateRangeFilter, RowRequest};
    use chrono::{TimeZone, Utc};

    fn config() -> Config {
        Config {
            access_token: Some("test-token".to_string()),
            rest_url: Some("https://api.example.com/base/".to_string()),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_client_creation_with_access_token() {
        let client = RestClient::connect(&config()).await;
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_endpoint_keeps_base_path() {
        let client = RestClient::connect(&config()).await.unwrap();
        let url = client.endpoint(&["data", "v1", "dataextensions"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/base/data/v1/dataextensions"
        );
    }

    #[tokio::test]
    async fn test_rows_url_carries_fields_and_filter() {
        let client = RestClient::connect(&config()).await.unwrap();
        let cursor = RowCursor::new(RowRequest {
            customer_key: "orders key".to_string(),
            properties: vec!["OrderId".to_string(), "ModifiedDate".to_string()],
            filter: Some(DateRangeFilter {
                property: "ModifiedDate".to_string(),
                start: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
            }),
            page_size: 100,
        });

        let url = client.rows_url(&cursor).unwrap();
        assert_eq!(
            url.path(),
            "/base/data/v1/customobjectdata/key/orders%20key/rowset"
        );
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("$page".to_string(), "1".to_string())));
        assert!(query.contains(&("$pageSize".to_string(), "100".to_string())));
        assert!(query.contains(&("$fields".to_string(), "OrderId,ModifiedDate".to_string())));
        assert!(query.contains(&(
            "$filter".to_string(),
            "ModifiedDate gte '2021-01-01T00:00:00Z' and ModifiedDate lt '2021-01-02T00:00:00Z'"
                .to_string()
        )));
    }

    #[tokio::test]
    async fn test_connect_requires_credentials_without_token() {
        let config = Config {
            access_token: None,
            client_id: Some("id".to_string()),
            ..config()
        };
        let err = RestClient::connect(&config).await.err().unwrap();
        assert!(err.to_string().contains("client_secret"));
    }
}
