use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Region;

/// Root lookup configuration, loaded from `~/.config/shelfmark/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub credentials: Credentials,
    pub catalog: CatalogConfig,
    pub resolution: ResolutionConfig,
    pub mapping: MappingConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub associate_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub region: Region,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub search_index: String,
    pub response_group: String,
    pub api_version: String,
    pub max_qps: f64,
    pub timeout_secs: u64,
    pub max_search_pages: u32,
    pub throttle_retries: u32,
    pub retry_base_delay_ms: u64,
}

/// Identifier kinds the resolver may look up by, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKey {
    VendorId,
    Isbn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    pub lookup_order: Vec<LookupKey>,
    pub preferred_binding: String,
    pub disable_title_author_search: bool,
    pub disable_api_calls: bool,
    pub title_joiners: Vec<String>,
}

/// A declarative title rewrite: regex pattern plus replacement template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRule {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub title_cleaners: Vec<TitleRule>,
    pub series_patterns: Vec<String>,
    pub reformat_author_initials: bool,
    pub default_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: PathBuf,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            region: Region::Us,
            endpoint: None,
            search_index: "KindleStore".to_string(),
            response_group: "AlternateVersions,BrowseNodes,EditorialReview,Images,ItemAttributes"
                .to_string(),
            api_version: "2013-08-01".to_string(),
            max_qps: 0.8,
            timeout_secs: 30,
            max_search_pages: 1,
            throttle_retries: 0,
            retry_base_delay_ms: 1000,
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            lookup_order: vec![LookupKey::VendorId, LookupKey::Isbn],
            preferred_binding: "Kindle Edition".to_string(),
            disable_title_author_search: false,
            disable_api_calls: false,
            title_joiners: ["a", "and", "the", "&"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            title_cleaners: Vec::new(),
            series_patterns: vec![
                r"\((?P<series_name>.+?)\s+(#|book)\s*(?P<series_index>\d+)\)".to_string(),
                r"\[(?P<series_name>.+?)\s+(#|book)\s*(?P<series_index>\d+)\]".to_string(),
            ],
            reformat_author_initials: true,
            default_tags: vec!["amazonapi".to_string()],
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let directory = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("shelfmark")
            .join("cache");
        Self {
            enabled: true,
            directory,
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl LookupConfig {
    /// Standard config file path: `~/.config/shelfmark/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("SHELFMARK_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("shelfmark")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    /// Credential environment variables take precedence over the file.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("AWS_ACCESS_KEY_ID") {
            self.credentials.access_key = v;
        }
        if let Some(v) = non_empty("AWS_SECRET_ACCESS_KEY") {
            self.credentials.secret_key = v;
        }
        if let Some(v) = non_empty("AWS_ASSOCIATE_TAG") {
            self.credentials.associate_tag = v;
        }
    }

    // ─── Derived values ────────────────────────────────────

    pub fn is_configured(&self) -> bool {
        !self.credentials.access_key.is_empty()
            && !self.credentials.secret_key.is_empty()
            && !self.credentials.associate_tag.is_empty()
    }

    pub fn vendor_id_key(&self) -> String {
        self.catalog.region.vendor_id_key()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.catalog.timeout_secs)
    }

    pub fn records_dir(&self) -> PathBuf {
        self.cache.directory.join("records")
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.cache.directory.join("covers")
    }

    /// Default location of the batch identifier list.
    pub fn batch_file(&self) -> PathBuf {
        self.cache.directory.join("batch.txt")
    }
}
