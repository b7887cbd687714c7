use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub items: ItemsConfig,
    #[serde(default)]
    pub users: UserLimitsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default)]
    pub sqlx_logging: bool,
}

fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 30 }
fn default_idle_timeout() -> u64 { 600 }
fn default_max_lifetime() -> u64 { 3600 }
fn default_acquire_timeout() -> u64 { 30 }

/// Limits applied by the items service.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemsConfig {
    /// Ceiling for mutations performed by one top-level operation. `None` means unlimited.
    #[serde(default)]
    pub max_batch_mutation: Option<u64>,
    /// Page size used when a query does not set a limit.
    #[serde(default = "default_query_limit")]
    pub query_limit_default: u64,
    /// Largest page size a query may request. `None` means unlimited.
    #[serde(default)]
    pub query_limit_max: Option<u64>,
}

fn default_query_limit() -> u64 { 100 }

impl Default for ItemsConfig {
    fn default() -> Self {
        Self { max_batch_mutation: None, query_limit_default: default_query_limit(), query_limit_max: None }
    }
}

/// Seat ceilings enforced by the user integrity check. Each `None` means unlimited.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct UserLimitsConfig {
    #[serde(default)]
    pub max_admin_users: Option<u64>,
    #[serde(default)]
    pub max_app_users: Option<u64>,
    #[serde(default)]
    pub max_api_users: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_locations")]
    pub locations: Vec<String>,
    #[serde(default)]
    pub default_location: Option<String>,
    #[serde(default = "default_local_root")]
    pub local_root: String,
}

fn default_locations() -> Vec<String> { vec!["local".to_string()] }
fn default_local_root() -> String { "./uploads".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { locations: default_locations(), default_location: None, local_root: default_local_root() }
    }
}

impl StorageConfig {
    /// Location used when an import does not name one: the configured default, else the first listed.
    pub fn default_location(&self) -> Option<&str> {
        self.default_location.as_deref().or_else(|| self.locations.first().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String { "info,sqlx=warn".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self { Self { format: LogFormat::Compact, filter: default_log_filter() } }
}

pub fn load_default() -> Result<AppConfig> {
    let _ = dotenvy::dotenv();
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        // DATABASE_URL fills in a missing url
        self.database.normalize_from_env();
        self.database.validate()?;
        self.items.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn normalize_from_env(&mut self) {
        if self.url.trim().is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                self.url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!("database.url is empty; set it in config.toml or DATABASE_URL"));
        }
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("postgresql://") || lower.starts_with("postgres://") || lower.starts_with("sqlite:")) {
            return Err(anyhow!("database.url must start with postgres://, postgresql:// or sqlite:"));
        }
        if self.min_connections == 0 {
            return Err(anyhow!("database.min_connections must be >= 1"));
        }
        if self.max_connections < self.min_connections {
            return Err(anyhow!("database.max_connections must be >= min_connections"));
        }
        if self.connect_timeout_secs == 0 || self.acquire_timeout_secs == 0 {
            return Err(anyhow!("database timeouts must be positive seconds"));
        }
        Ok(())
    }
}

impl ItemsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.query_limit_default == 0 {
            return Err(anyhow!("items.query_limit_default must be >= 1"));
        }
        if let Some(max) = self.query_limit_max {
            if max < self.query_limit_default {
                return Err(anyhow!("items.query_limit_max must be >= query_limit_default"));
            }
        }
        Ok(())
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(default) = &self.default_location {
            if !self.locations.iter().any(|l| l == default) {
                return Err(anyhow!("storage.default_location `{default}` is not listed in storage.locations"));
            }
        }
        Ok(())
    }
}
