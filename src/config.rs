// ABOUTME: Replicator configuration loaded from a JSON or TOML file
// ABOUTME: Credentials, endpoints, start date, replication key candidates and window size

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::sync::window::{parse_datetime, WindowUnit};

const DEFAULT_PAGE_SIZE: usize = 2500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_replication_keys() -> Vec<String> {
    vec!["ModifiedDate".to_string()]
}

/// Settings for data extension streams.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataExtensionConfig {
    /// Candidate replication key field names, in order of preference
    #[serde(default = "default_replication_keys")]
    pub replication_keys: Vec<String>,
}

impl Default for DataExtensionConfig {
    fn default() -> Self {
        Self {
            replication_keys: default_replication_keys(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PaginationConfig {
    /// Window width for data extension syncs
    #[serde(default)]
    pub data_extension: WindowUnit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Pre-issued bearer token; skips the client-credentials exchange
    #[serde(default)]
    pub access_token: Option<String>,
    /// Tenant-specific subdomain used to derive the auth and REST endpoints
    #[serde(default)]
    pub tenant_subdomain: Option<String>,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub rest_url: Option<String>,
    #[serde(default)]
    pub default_start_date: Option<String>,
    #[serde(default)]
    pub data_extensions: DataExtensionConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            access_token: None,
            tenant_subdomain: None,
            auth_url: None,
            rest_url: None,
            default_start_date: None,
            data_extensions: DataExtensionConfig::default(),
            pagination: PaginationConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load and validate a config file. `.toml` files are parsed as TOML,
    /// everything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let config: Config = if is_toml {
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config from {:?}", path))?
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config from {:?}", path))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Default config location: ~/.exacttarget-replicator/config.json
    pub fn default_path() -> Result<PathBuf> {
        let home_dir =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home_dir.join(".exacttarget-replicator").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_token.is_none()
            && (self.client_id.is_none() || self.client_secret.is_none())
        {
            bail!("Config must provide either access_token or both client_id and client_secret");
        }
        if self.page_size == 0 {
            bail!("page_size must be greater than zero");
        }
        self.pagination.data_extension.validate()?;
        self.default_start_date()?;
        self.rest_base_url()?;
        Ok(())
    }

    /// Lower bound used when a stream has no bookmark yet.
    pub fn default_start_date(&self) -> Result<Option<DateTime<Utc>>> {
        self.default_start_date
            .as_deref()
            .map(|raw| parse_datetime(raw).context("Invalid default_start_date"))
            .transpose()
    }

    pub fn window_unit(&self) -> &WindowUnit {
        &self.pagination.data_extension
    }

    pub fn replication_keys(&self) -> &[String] {
        &self.data_extensions.replication_keys
    }

    pub fn auth_base_url(&self) -> Result<Url> {
        self.endpoint(self.auth_url.as_deref(), "auth")
    }

    pub fn rest_base_url(&self) -> Result<Url> {
        self.endpoint(self.rest_url.as_deref(), "rest")
    }

    fn endpoint(&self, explicit: Option<&str>, kind: &str) -> Result<Url> {
        let raw = match (explicit, self.tenant_subdomain.as_deref()) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(subdomain)) => {
                format!("https://{}.{}.marketingcloudapis.com", subdomain, kind)
            }
            (None, None) => bail!(
                "Config must provide either tenant_subdomain or an explicit {}_url",
                kind
            ),
        };
        Url::parse(&raw).with_context(|| format!("Invalid {} URL '{}'", kind, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_applied() {
        let config: Config = serde_json::from_str(
            r#"{"client_id": "id", "client_secret": "secret", "tenant_subdomain": "mc123"}"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.replication_keys(), ["ModifiedDate".to_string()]);
        assert_eq!(*config.window_unit(), WindowUnit::days(1));
        assert_eq!(config.page_size, 2500);
        assert!(config.default_start_date().unwrap().is_none());
        assert_eq!(
            config.rest_base_url().unwrap().as_str(),
            "https://mc123.rest.marketingcloudapis.com/"
        );
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config: Config =
            serde_json::from_str(r#"{"client_id": "id", "tenant_subdomain": "mc123"}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }

    #[test]
    fn test_zero_window_rejected() {
        let config: Config = serde_json::from_str(
            r#"{"access_token": "t", "rest_url": "https://example.com", "pagination": {"data_extension": {"days": 0}}}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let config: Config = serde_json::from_str(
            r#"{"access_token": "t", "rest_url": "https://example.com", "pagination": {"data_extension": {"days": 100000000}}}"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Window size"));
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
access_token = "token"
rest_url = "https://example.com/"
default_start_date = "2021-01-01"

[data_extensions]
replication_keys = ["LastUpdated", "ModifiedDate"]

[pagination.data_extension]
hours = 12
"#
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.replication_keys(),
            ["LastUpdated".to_string(), "ModifiedDate".to_string()]
        );
        assert_eq!(config.window_unit().hours, 12);
        assert_eq!(
            config.default_start_date().unwrap().unwrap().to_rfc3339(),
            "2021-01-01T00:00:00+00:00"
        );
        assert_eq!(config.rest_base_url().unwrap().as_str(), "https://example.com/");
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.json"));
    }
}
