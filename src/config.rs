use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub drive: DriveConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_port() -> u16 {
    3001
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Persistence configuration.
///
/// When `db_path` is unset the server falls back to the in-memory store and
/// everything it records is lost on restart.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Seed the in-memory store with a demo customer and transaction
    #[serde(default = "default_seed_demo_data")]
    pub seed_demo_data: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            seed_demo_data: default_seed_demo_data(),
        }
    }
}

fn default_seed_demo_data() -> bool {
    true
}

/// Gemini extraction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Name of the environment variable holding the Gemini API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound for a single extraction request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// Order in which a poll cycle lists folder files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl ListingOrder {
    /// Drive API `orderBy` value
    pub fn order_by(&self) -> &'static str {
        match self {
            ListingOrder::NewestFirst => "modifiedTime desc",
            ListingOrder::OldestFirst => "modifiedTime",
        }
    }
}

/// Google Drive watcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    /// Service-account key file used for Drive access
    #[serde(default = "default_service_account_path")]
    pub service_account_path: PathBuf,
    /// Environment variable that may carry the key file base64-encoded
    #[serde(default = "default_service_account_base64_env")]
    pub service_account_base64_env: String,
    /// Maximum number of files examined per poll cycle
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub order: ListingOrder,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            service_account_path: default_service_account_path(),
            service_account_base64_env: default_service_account_base64_env(),
            page_size: default_page_size(),
            order: ListingOrder::default(),
        }
    }
}

fn default_service_account_path() -> PathBuf {
    PathBuf::from("serviceAccountKey.json")
}

fn default_service_account_base64_env() -> String {
    "SERVICE_ACCOUNT_BASE64".to_string()
}

fn default_page_size() -> u32 {
    10
}

impl Config {
    /// Load configuration
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in CRM_CONFIG environment variable (must exist)
    /// 2. ./config.toml in current directory (optional, defaults are used when absent)
    ///
    /// `PORT` and `CRM_DB_PATH` override the file values.
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let mut config = match std::env::var("CRM_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_path = PathBuf::from("config.toml");
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    log::info!("No config.toml found, using defaults");
                    Config::default()
                }
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {}", port))?;
        }

        if let Ok(db_path) = std::env::var("CRM_DB_PATH") {
            if !db_path.trim().is_empty() {
                self.store.db_path = Some(PathBuf::from(db_path));
            }
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.drive.page_size == 0 || self.drive.page_size > 1000 {
            anyhow::bail!("drive.page_size must be between 1 and 1000");
        }

        if self.extraction.timeout_secs == 0 {
            anyhow::bail!("extraction.timeout_secs must be greater than 0");
        }

        if self.extraction.model.trim().is_empty() {
            anyhow::bail!("extraction.model must not be empty");
        }

        Ok(())
    }

    /// Gemini API key from the configured environment variable, if set
    pub fn extraction_api_key(&self) -> Option<String> {
        std::env::var(&self.extraction.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const TEST_CONFIG: &str = r#"
[server]
port = 8088

[store]
db_path = "./crm.db"
seed_demo_data = false

[extraction]
api_key_env = "TEST_GEMINI_KEY"
timeout_secs = 30

[drive]
page_size = 25
order = "oldest_first"
"#;

    fn with_env(vars: &[(&str, Option<&str>)], f: impl FnOnce()) {
        let originals: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(k, _)| (k.to_string(), std::env::var(k).ok()))
            .collect();
        for (k, v) in vars {
            match v {
                Some(v) => std::env::set_var(k, v),
                None => std::env::remove_var(k),
            }
        }
        f();
        for (k, v) in originals {
            match v {
                Some(v) => std::env::set_var(&k, v),
                None => std::env::remove_var(&k),
            }
        }
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3001);
        assert!(config.store.db_path.is_none());
        assert!(config.store.seed_demo_data);
        assert_eq!(config.extraction.model, "gemini-2.5-flash");
        assert_eq!(config.drive.page_size, 10);
        assert_eq!(config.drive.order, ListingOrder::NewestFirst);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(TEST_CONFIG).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.store.db_path, Some(PathBuf::from("./crm.db")));
        assert!(!config.store.seed_demo_data);
        assert_eq!(config.extraction.timeout_secs, 30);
        assert_eq!(config.drive.page_size, 25);
        assert_eq!(config.drive.order.order_by(), "modifiedTime");
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = Config::default();
        config.drive.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.extraction.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_explicit_path_with_overrides() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("crm.toml");
        fs::write(&config_path, TEST_CONFIG).unwrap();

        with_env(
            &[
                ("CRM_CONFIG", Some(config_path.to_str().unwrap())),
                ("PORT", Some("9090")),
                ("CRM_DB_PATH", Some("/tmp/override.db")),
            ],
            || {
                let config = Config::load();
                assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
                let config = config.unwrap();
                assert_eq!(config.server.port, 9090);
                assert_eq!(config.store.db_path, Some(PathBuf::from("/tmp/override.db")));
                assert_eq!(config.drive.page_size, 25);
            },
        );
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        with_env(&[("CRM_CONFIG", Some("nonexistent-crm.toml"))], || {
            let config = Config::load();
            assert!(config.is_err());
        });
    }

    #[test]
    fn test_invalid_port_override_fails() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("crm.toml");
        fs::write(&config_path, "").unwrap();

        with_env(
            &[
                ("CRM_CONFIG", Some(config_path.to_str().unwrap())),
                ("PORT", Some("not-a-port")),
            ],
            || {
                let config = Config::load();
                assert!(config.is_err());
                assert!(config.unwrap_err().to_string().contains("PORT"));
            },
        );
    }

    #[test]
    fn test_extraction_api_key_ignores_blank() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let mut config = Config::default();
        config.extraction.api_key_env = "CRM_TEST_BLANK_KEY".to_string();
        with_env(&[("CRM_TEST_BLANK_KEY", Some("   "))], || {
            assert!(config.extraction_api_key().is_none());
        });
        with_env(&[("CRM_TEST_BLANK_KEY", Some("secret"))], || {
            assert_eq!(config.extraction_api_key().as_deref(), Some("secret"));
        });
    }
}
