//! Ephemeral store backed by in-process maps.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{Store, StoreMode};
use crate::error::Result;
use crate::models::{
    Customer, CustomerUpdate, ProcessedFileRecord, ProcessedKey, Transaction, TransactionStatus,
};

#[derive(Debug, Default)]
struct Collections {
    customers: BTreeMap<String, Customer>,
    transactions: BTreeMap<String, Transaction>,
    processed_files: HashMap<String, ProcessedFileRecord>,
}

/// In-memory [`Store`]. Everything is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding one demo customer with one completed transaction
    pub fn seeded() -> Self {
        let store = Self::new();
        let now = Utc::now().to_rfc3339();
        {
            let mut inner = store.write();
            let customer = Customer {
                id: "cust_demo_123".to_string(),
                name: Some("Demo User".to_string()),
                email: Some("demo@example.com".to_string()),
                address: Some("123 Mock St, Test City".to_string()),
                contact_phone_number: Some("555-0123".to_string()),
                created_at: now.clone(),
            };
            let transaction = Transaction {
                id: "txn_demo_999".to_string(),
                customer_id: customer.id.clone(),
                date: now,
                description: "Demo Activation".to_string(),
                amount: 50.0,
                status: TransactionStatus::Completed,
                scan_id: None,
                device: None,
                plan: None,
            };
            inner.customers.insert(customer.id.clone(), customer);
            inner.transactions.insert(transaction.id.clone(), transaction);
        }
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_customers(&self) -> Result<Vec<Customer>> {
        Ok(self.read().customers.values().cloned().collect())
    }

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>> {
        Ok(self.read().customers.get(id).cloned())
    }

    async fn get_customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        Ok(self
            .read()
            .customers
            .values()
            .find(|c| c.email.as_deref() == Some(email))
            .cloned())
    }

    async fn save_customer(&self, customer: &Customer) -> Result<()> {
        self.write()
            .customers
            .insert(customer.id.clone(), customer.clone());
        Ok(())
    }

    async fn update_customer(&self, id: &str, update: &CustomerUpdate) -> Result<Option<Customer>> {
        let mut inner = self.write();
        let Some(existing) = inner.customers.get_mut(id) else {
            return Ok(None);
        };
        *existing = update.apply_to(existing);
        Ok(Some(existing.clone()))
    }

    async fn get_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.read().transactions.values().cloned().collect())
    }

    async fn get_customer_transactions(&self, customer_id: &str) -> Result<Vec<Transaction>> {
        Ok(self
            .read()
            .transactions
            .values()
            .filter(|t| t.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn save_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.write()
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    async fn check_processed_file(&self, key: &ProcessedKey) -> Result<bool> {
        Ok(self.read().processed_files.contains_key(key.as_str()))
    }

    async fn save_processed_file(&self, key: &ProcessedKey, record: &ProcessedFileRecord) -> Result<()> {
        self.write()
            .processed_files
            .insert(key.as_str().to_string(), record.clone());
        Ok(())
    }

    async fn processed_file_keys(&self) -> Result<Vec<String>> {
        Ok(self.read().processed_files.keys().cloned().collect())
    }

    fn mode(&self) -> StoreMode {
        StoreMode::Memory
    }
}
