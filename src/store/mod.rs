//! Persistence for customers, transactions and the processed-file ledger.
//!
//! One async [`Store`] trait is implemented by a durable SQLite backend and an
//! ephemeral in-memory backend. The backend is chosen once at startup by
//! [`StoreBackend::probe`] and opened with [`open_store`].

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::ProcessedFileCache;
use crate::config::StoreConfig;
use crate::db::{migrate, Db};
use crate::error::{CrmError, Result};
use crate::models::{Customer, CustomerUpdate, ProcessedFileRecord, ProcessedKey, Transaction};

/// Which backend is serving requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Sqlite,
    Memory,
}

impl StoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMode::Sqlite => "SQLITE",
            StoreMode::Memory => "MEMORY",
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform capability surface over the storage backends
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_customers(&self) -> Result<Vec<Customer>>;

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>>;

    /// At most one customer with exactly this email
    async fn get_customer_by_email(&self, email: &str) -> Result<Option<Customer>>;

    /// Insert or fully replace the customer with `customer.id`
    async fn save_customer(&self, customer: &Customer) -> Result<()>;

    /// Merge `update` into an existing customer.
    ///
    /// Returns `None` without creating anything when no customer has `id`.
    async fn update_customer(&self, id: &str, update: &CustomerUpdate) -> Result<Option<Customer>>;

    async fn get_transactions(&self) -> Result<Vec<Transaction>>;

    async fn get_customer_transactions(&self, customer_id: &str) -> Result<Vec<Transaction>>;

    async fn save_transaction(&self, transaction: &Transaction) -> Result<()>;

    /// Whether the ledger has an entry for `key`
    async fn check_processed_file(&self, key: &ProcessedKey) -> Result<bool>;

    async fn save_processed_file(&self, key: &ProcessedKey, record: &ProcessedFileRecord) -> Result<()>;

    /// Every key in the ledger
    async fn processed_file_keys(&self) -> Result<Vec<String>>;

    fn mode(&self) -> StoreMode;
}

/// Result of the startup capability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// SQLite database at the given path
    Durable(PathBuf),
    /// In-memory maps, lost on restart
    Ephemeral,
}

impl StoreBackend {
    /// Decide the backend from configuration: durable when a database path is configured
    pub fn probe(config: &StoreConfig) -> Self {
        match &config.db_path {
            Some(path) if !path.as_os_str().is_empty() => StoreBackend::Durable(path.clone()),
            _ => StoreBackend::Ephemeral,
        }
    }
}

/// Construct the store for a probed backend.
///
/// The durable backend has its parent directory created and migrations applied.
pub async fn open_store(backend: &StoreBackend, config: &StoreConfig) -> Result<Arc<dyn Store>> {
    match backend {
        StoreBackend::Durable(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CrmError::Config(format!(
                        "Cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }

            let db = Db::new(path);
            db.with_connection(|conn| migrate::run_migrations(conn)).await?;
            log::info!("Using SQLite store at {}", path.display());
            Ok(Arc::new(SqliteStore::new(db)))
        }
        StoreBackend::Ephemeral => {
            log::warn!("No database configured, using in-memory store (data resets on restart)");
            let store = if config.seed_demo_data {
                MemoryStore::seeded()
            } else {
                MemoryStore::new()
            };
            Ok(Arc::new(store))
        }
    }
}

/// Load every ledger key into the cache.
///
/// Failures are logged and leave the cache as it was; the ledger check in the
/// poll cycle still prevents reprocessing.
pub async fn init_cache(store: &dyn Store, cache: &ProcessedFileCache) {
    match store.processed_file_keys().await {
        Ok(keys) => {
            cache.extend(keys);
            log::info!("Loaded {} processed file keys into cache", cache.len());
        }
        Err(e) => log::error!("Failed to load processed file cache: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessedStatus;
    use tempfile::TempDir;

    fn record(file_id: &str) -> ProcessedFileRecord {
        ProcessedFileRecord {
            file_id: file_id.to_string(),
            file_name: format!("{}.pdf", file_id),
            modified_time: "t1".to_string(),
            processed_at: "2024-01-01T00:00:00Z".to_string(),
            status: ProcessedStatus::Success,
        }
    }

    #[test]
    fn test_probe_without_path_is_ephemeral() {
        let config = StoreConfig::default();
        assert_eq!(StoreBackend::probe(&config), StoreBackend::Ephemeral);

        let config = StoreConfig {
            db_path: Some(PathBuf::new()),
            ..Default::default()
        };
        assert_eq!(StoreBackend::probe(&config), StoreBackend::Ephemeral);
    }

    #[test]
    fn test_probe_with_path_is_durable() {
        let config = StoreConfig {
            db_path: Some(PathBuf::from("data/crm.db")),
            ..Default::default()
        };
        assert_eq!(
            StoreBackend::probe(&config),
            StoreBackend::Durable(PathBuf::from("data/crm.db"))
        );
    }

    #[tokio::test]
    async fn test_open_durable_creates_directory_and_schema() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("crm.db");
        let backend = StoreBackend::Durable(path.clone());

        let store = open_store(&backend, &StoreConfig::default()).await.unwrap();
        assert_eq!(store.mode(), StoreMode::Sqlite);
        assert!(path.exists());
        assert!(store.get_customers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_ephemeral_respects_seed_flag() {
        let seeded = open_store(&StoreBackend::Ephemeral, &StoreConfig::default())
            .await
            .unwrap();
        assert_eq!(seeded.mode(), StoreMode::Memory);
        assert!(!seeded.get_customers().await.unwrap().is_empty());

        let config = StoreConfig {
            seed_demo_data: false,
            ..Default::default()
        };
        let empty = open_store(&StoreBackend::Ephemeral, &config).await.unwrap();
        assert!(empty.get_customers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_init_cache_loads_ledger_keys() {
        let store = MemoryStore::new();
        let key = ProcessedKey::new("file1", "t1");
        store.save_processed_file(&key, &record("file1")).await.unwrap();

        let cache = ProcessedFileCache::new();
        init_cache(&store, &cache).await;

        assert!(cache.contains(&key));
        assert_eq!(cache.len(), 1);
    }
}
