//! Import configuration loaded from environment variables.

use std::path::PathBuf;

use catalog_core::DEFAULT_SEARCH_INDEX;
use url::Url;

use crate::{Error, Result};

/// Configuration for one import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// URL of the manifest listing importable file names.
    pub manifest_url: String,

    /// Base URL the file names are appended to. Always ends with `/`.
    pub base_url: String,

    /// Directory downloaded files are written to before decoding.
    pub scratch_dir: PathBuf,

    /// SQLite database path.
    pub database_path: PathBuf,

    /// Search indexing settings.
    pub search: SearchConfig,
}

/// Which search backend stored products are pushed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchDriver {
    /// Indexing disabled.
    #[default]
    Disabled,
    /// Algolia REST API.
    Algolia,
}

/// Search indexing settings.
#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    pub driver: SearchDriver,
    pub app_id: String,
    pub api_key: String,
    pub index_name: String,
}

impl SearchConfig {
    /// Settings with indexing turned off.
    pub fn disabled() -> Self {
        Self {
            index_name: DEFAULT_SEARCH_INDEX.to_string(),
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.driver != SearchDriver::Disabled
    }
}

impl ImportConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `PRODUCT_LIST_URL`: manifest URL
    /// - `PRODUCT_IMPORT_BASE_URL`: base URL for feed files
    ///
    /// Optional:
    /// - `IMPORT_SCRATCH_DIR`: download directory (default: "./storage/import")
    /// - `DATABASE_PATH`: SQLite path (default: "./data/catalog.db")
    /// - `SEARCH_DRIVER`: "algolia" to enable indexing (default: disabled)
    /// - `ALGOLIA_APP_ID`, `ALGOLIA_SECRET`: required when the driver is algolia
    /// - `ALGOLIA_INDEX`: index name (default: "products")
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let manifest_url = validate_url("PRODUCT_LIST_URL", var("PRODUCT_LIST_URL"))?;

        let mut base_url = validate_url("PRODUCT_IMPORT_BASE_URL", var("PRODUCT_IMPORT_BASE_URL"))?;
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let scratch_dir = var("IMPORT_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./storage/import"));

        let database_path = var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/catalog.db"));

        let search = match var("SEARCH_DRIVER").map(|d| d.to_ascii_lowercase()).as_deref() {
            None | Some("null") | Some("none") => SearchConfig::disabled(),
            Some("algolia") => {
                let app_id = var("ALGOLIA_APP_ID").ok_or_else(|| {
                    Error::Config("ALGOLIA_APP_ID is required when SEARCH_DRIVER=algolia".into())
                })?;
                let api_key = var("ALGOLIA_SECRET").ok_or_else(|| {
                    Error::Config("ALGOLIA_SECRET is required when SEARCH_DRIVER=algolia".into())
                })?;
                SearchConfig {
                    driver: SearchDriver::Algolia,
                    app_id,
                    api_key,
                    index_name: var("ALGOLIA_INDEX")
                        .unwrap_or_else(|| DEFAULT_SEARCH_INDEX.to_string()),
                }
            }
            Some(other) => {
                return Err(Error::Config(format!("unsupported SEARCH_DRIVER '{other}'")));
            }
        };

        tracing::info!(
            manifest_url = %manifest_url,
            base_url = %base_url,
            scratch_dir = %scratch_dir.display(),
            database_path = %database_path.display(),
            search_enabled = search.is_enabled(),
            "import configuration loaded"
        );

        Ok(Self {
            manifest_url,
            base_url,
            scratch_dir,
            database_path,
            search,
        })
    }
}

fn validate_url(name: &str, value: Option<String>) -> Result<String> {
    let value = value.ok_or_else(|| Error::Config(format!("{name} is not set")))?;

    let parsed =
        Url::parse(&value).map_err(|e| Error::Config(format!("{name} is not a valid URL: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "{name} must be an http(s) URL, got scheme '{}'",
            parsed.scheme()
        )));
    }

    Ok(value)
}
