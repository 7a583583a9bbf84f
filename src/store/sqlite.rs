//! Durable store: JSON documents in SQLite tables.
//!
//! Each record is serialized whole into a `data` column; `email` and
//! `customer_id` are duplicated into indexed columns for lookups.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use super::{Store, StoreMode};
use crate::db::Db;
use crate::error::{CrmError, Result};
use crate::models::{Customer, CustomerUpdate, ProcessedFileRecord, ProcessedKey, Transaction};

/// SQLite-backed [`Store`]
pub struct SqliteStore {
    db: Db,
}

impl SqliteStore {
    /// Wrap a database whose migrations have already been applied
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<String>) -> Result<Vec<T>> {
    rows.iter()
        .map(|data| serde_json::from_str(data).map_err(CrmError::from))
        .collect()
}

fn upsert_customer(conn: &rusqlite::Connection, customer: &Customer) -> Result<()> {
    let data = serde_json::to_string(customer)?;
    conn.execute(
        r#"
        INSERT INTO customers (id, email, data, created_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET
            email = excluded.email,
            data = excluded.data,
            created_at = excluded.created_at
        "#,
        params![customer.id, customer.email, data, customer.created_at],
    )?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_customers(&self) -> Result<Vec<Customer>> {
        let rows = self
            .db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT data FROM customers ORDER BY created_at, id")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        decode_rows(rows)
    }

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>> {
        let id = id.to_string();
        let row = self
            .db
            .with_connection(move |conn| {
                let data = conn
                    .query_row("SELECT data FROM customers WHERE id = ?1", params![id], |row| {
                        row.get::<_, String>(0)
                    })
                    .optional()?;
                Ok(data)
            })
            .await?;
        row.map(|data| serde_json::from_str(&data).map_err(CrmError::from))
            .transpose()
    }

    async fn get_customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let email = email.to_string();
        let row = self
            .db
            .with_connection(move |conn| {
                let data = conn
                    .query_row(
                        "SELECT data FROM customers WHERE email = ?1 LIMIT 1",
                        params![email],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(data)
            })
            .await?;
        row.map(|data| serde_json::from_str(&data).map_err(CrmError::from))
            .transpose()
    }

    async fn save_customer(&self, customer: &Customer) -> Result<()> {
        let customer = customer.clone();
        self.db
            .with_connection(move |conn| upsert_customer(conn, &customer))
            .await
    }

    async fn update_customer(&self, id: &str, update: &CustomerUpdate) -> Result<Option<Customer>> {
        let id = id.to_string();
        let update = update.clone();
        self.db
            .with_connection(move |conn| {
                // Read-merge-write under one transaction so concurrent updates don't interleave
                let tx = conn.transaction()?;
                let existing = tx
                    .query_row("SELECT data FROM customers WHERE id = ?1", params![id], |row| {
                        row.get::<_, String>(0)
                    })
                    .optional()?;
                let Some(existing) = existing else {
                    return Ok(None);
                };
                let existing: Customer = serde_json::from_str(&existing)?;
                let merged = update.apply_to(&existing);
                upsert_customer(&tx, &merged)?;
                tx.commit()?;
                Ok(Some(merged))
            })
            .await
    }

    async fn get_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = self
            .db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT data FROM transactions ORDER BY rowid")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        decode_rows(rows)
    }

    async fn get_customer_transactions(&self, customer_id: &str) -> Result<Vec<Transaction>> {
        let customer_id = customer_id.to_string();
        let rows = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT data FROM transactions WHERE customer_id = ?1 ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map(params![customer_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        decode_rows(rows)
    }

    async fn save_transaction(&self, transaction: &Transaction) -> Result<()> {
        let data = serde_json::to_string(transaction)?;
        let id = transaction.id.clone();
        let customer_id = transaction.customer_id.clone();
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO transactions (id, customer_id, data)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(id) DO UPDATE SET
                        customer_id = excluded.customer_id,
                        data = excluded.data
                    "#,
                    params![id, customer_id, data],
                )?;
                Ok(())
            })
            .await
    }

    async fn check_processed_file(&self, key: &ProcessedKey) -> Result<bool> {
        let key = key.as_str().to_string();
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare("SELECT 1 FROM processed_files WHERE key = ?1")?;
                Ok(stmt.exists(params![key])?)
            })
            .await
    }

    async fn save_processed_file(&self, key: &ProcessedKey, record: &ProcessedFileRecord) -> Result<()> {
        let key = key.as_str().to_string();
        let data = serde_json::to_string(record)?;
        let processed_at = record.processed_at.clone();
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO processed_files (key, data, processed_at) VALUES (?1, ?2, ?3)",
                    params![key, data, processed_at],
                )?;
                Ok(())
            })
            .await
    }

    async fn processed_file_keys(&self) -> Result<Vec<String>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT key FROM processed_files")?;
                let keys = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(keys)
            })
            .await
    }

    fn mode(&self) -> StoreMode {
        StoreMode::Sqlite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use crate::models::{Device, Plan, ProcessedStatus, TransactionStatus};
    use tempfile::TempDir;

    async fn open(temp_dir: &TempDir) -> SqliteStore {
        let db = Db::new(temp_dir.path().join("crm.db"));
        db.with_connection(|conn| migrate::run_migrations(conn)).await.unwrap();
        SqliteStore::new(db)
    }

    fn customer(id: &str, email: Option<&str>) -> Customer {
        Customer {
            id: id.to_string(),
            name: Some("Sam".to_string()),
            email: email.map(str::to_string),
            address: Some("4 Pine Ave".to_string()),
            contact_phone_number: Some("555-0177".to_string()),
            created_at: "2024-02-02T10:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_customer_round_trip_and_email_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir).await;
        let sam = customer("c1", Some("sam@example.com"));
        store.save_customer(&sam).await.unwrap();

        assert_eq!(store.get_customer("c1").await.unwrap(), Some(sam.clone()));
        assert_eq!(store.get_customer_by_email("sam@example.com").await.unwrap(), Some(sam));
        assert!(store.get_customer("c2").await.unwrap().is_none());
        assert!(store.get_customer_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_customer_replaces_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir).await;
        store.save_customer(&customer("c1", Some("old@example.com"))).await.unwrap();
        store.save_customer(&customer("c1", Some("new@example.com"))).await.unwrap();

        assert_eq!(store.get_customers().await.unwrap().len(), 1);
        assert!(store.get_customer_by_email("old@example.com").await.unwrap().is_none());
        assert!(store.get_customer_by_email("new@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_customer() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir).await;
        store.save_customer(&customer("c1", None)).await.unwrap();

        let update = CustomerUpdate {
            address: Some("8 Birch Rd".to_string()),
            ..Default::default()
        };
        let updated = store.update_customer("c1", &update).await.unwrap().unwrap();
        assert_eq!(updated.address.as_deref(), Some("8 Birch Rd"));
        assert_eq!(updated.contact_phone_number.as_deref(), Some("555-0177"));

        assert!(store.update_customer("missing", &update).await.unwrap().is_none());
        assert!(store.get_customer("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transactions_by_customer() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir).await;
        let txn = Transaction {
            id: "t1".to_string(),
            customer_id: "c1".to_string(),
            date: "2024-02-03".to_string(),
            description: "Activation".to_string(),
            amount: 89.99,
            status: TransactionStatus::Completed,
            scan_id: Some("scan-1".to_string()),
            device: Some(Device {
                imei: Some("356938035643809".to_string()),
                ..Default::default()
            }),
            plan: Some(Plan {
                name: Some("Unlimited".to_string()),
                term: Some("12 months".to_string()),
            }),
        };
        store.save_transaction(&txn).await.unwrap();
        store
            .save_transaction(&Transaction {
                id: "t2".to_string(),
                customer_id: "c2".to_string(),
                ..txn.clone()
            })
            .await
            .unwrap();

        let for_c1 = store.get_customer_transactions("c1").await.unwrap();
        assert_eq!(for_c1, vec![txn]);
        assert_eq!(store.get_transactions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_processed_file_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir).await;
        let key = ProcessedKey::new("f1", "2024-02-03T00:00:00.000Z");

        assert!(!store.check_processed_file(&key).await.unwrap());

        let record = ProcessedFileRecord {
            file_id: "f1".to_string(),
            file_name: "scan.jpg".to_string(),
            modified_time: "2024-02-03T00:00:00.000Z".to_string(),
            processed_at: "2024-02-03T00:01:00Z".to_string(),
            status: ProcessedStatus::Success,
        };
        store.save_processed_file(&key, &record).await.unwrap();

        assert!(store.check_processed_file(&key).await.unwrap());
        assert_eq!(store.processed_file_keys().await.unwrap(), vec![key.to_string()]);
    }

    #[tokio::test]
    async fn test_ledger_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let key = ProcessedKey::new("f9", "t9");
        {
            let store = open(&temp_dir).await;
            let record = ProcessedFileRecord {
                file_id: "f9".to_string(),
                file_name: "contract.pdf".to_string(),
                modified_time: "t9".to_string(),
                processed_at: "2024-02-03T00:01:00Z".to_string(),
                status: ProcessedStatus::Success,
            };
            store.save_processed_file(&key, &record).await.unwrap();
        }

        let reopened = open(&temp_dir).await;
        assert!(reopened.check_processed_file(&key).await.unwrap());
    }
}
