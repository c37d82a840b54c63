use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShelfError};

/// Root application configuration, loaded from `~/.config/shelfmark/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub reconcile: ReconcileConfig,
    pub registration: RegistrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Relative paths are resolved against the directory holding the config file.
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub timeout_secs: f64,
    pub max_retries: u32,
    pub retryable_status_codes: Vec<u16>,
    /// Base delay before a retry; doubled on each further attempt.
    pub retry_backoff_ms: u64,
    pub search_limit: usize,
    pub series_candidates_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Candidates whose title, author or publisher contains one of these are dropped.
    pub exclusion_terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub cooldown_secs: u64,
}

/// Upper bound the catalog accepts for one page of results.
pub const MAX_SEARCH_LIMIT: usize = 100;

// ─── Defaults ──────────────────────────────────────────────

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("shelfmark");

        Self {
            database_path: data_dir.join("library.db").to_string_lossy().to_string(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ndlsearch.ndl.go.jp/api/opensearch".to_string(),
            timeout_secs: 10.0,
            max_retries: 1,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
            retry_backoff_ms: 250,
            search_limit: 10,
            series_candidates_limit: MAX_SEARCH_LIMIT,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            exclusion_terms: ["特装版", "電子版", "電子書籍", "Kindle", "[Kindle版]"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self { cooldown_secs: 10 }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
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

    /// Load config from disk, falling back to defaults if the file doesn't exist.
    /// `SHELFMARK_DB_PATH` overrides the database location.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = Self::load_from(&path)?;
        if let Ok(db_path) = std::env::var("SHELFMARK_DB_PATH")
            && !db_path.trim().is_empty()
        {
            config.storage.database_path = db_path;
        }
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        if let Some(dir) = path.parent() {
            config.storage.database_path = resolve_relative(dir, &config.storage.database_path);
        }
        config.validate()?;
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

    pub fn validate(&self) -> Result<()> {
        let limit = self.catalog.search_limit;
        if limit == 0 || limit > MAX_SEARCH_LIMIT {
            return Err(ShelfError::Config(format!(
                "catalog.search_limit must be within 1..={MAX_SEARCH_LIMIT}, got {limit}"
            )));
        }
        let limit = self.catalog.series_candidates_limit;
        if limit == 0 || limit > MAX_SEARCH_LIMIT {
            return Err(ShelfError::Config(format!(
                "catalog.series_candidates_limit must be within 1..={MAX_SEARCH_LIMIT}, got {limit}"
            )));
        }
        if !(self.catalog.timeout_secs.is_finite() && self.catalog.timeout_secs > 0.0) {
            return Err(ShelfError::Config(
                "catalog.timeout_secs must be a positive number".to_string(),
            ));
        }
        Ok(())
    }

    // ─── Derived values ─────────────────────────────────────

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.database_path)
    }

    pub fn cooldown(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.registration.cooldown_secs)
    }
}

fn resolve_relative(base: &Path, raw: &str) -> String {
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() || raw.starts_with('~') {
        return raw.to_string();
    }
    base.join(candidate).to_string_lossy().to_string()
}
