// ABOUTME: Discover command - builds the catalog of every replicable stream
// ABOUTME: Prints the catalog as JSON for the consumer to mark streams selected

use anyhow::{Context, Result};
use std::path::Path;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::remote::{ExtensionSource, RestClient};
use crate::sync::StreamHandler;

/// Collect catalog entries from every registered stream handler.
pub async fn discover<S: ExtensionSource>(source: &S, config: &Config) -> Result<Catalog> {
    let mut streams = Vec::new();
    for handler in StreamHandler::ALL {
        let entries = handler
            .discover(source, config)
            .await
            .with_context(|| format!("Discovery failed for {} streams", handler.name()))?;
        tracing::info!("Discovered {} {} streams", entries.len(), handler.name());
        streams.extend(entries);
    }
    Ok(Catalog { streams })
}

pub async fn command(config_path: &Path) -> Result<()> {
    tracing::info!("Starting discovery.");
    let config = Config::load(config_path)?;
    let client = RestClient::connect(&config).await?;

    let catalog = discover(&client, &config).await?;
    let json = serde_json::to_string_pretty(&catalog).context("Failed to serialize catalog")?;
    println!("{}", json);
    Ok(())
}
