//! Map extracted document fields onto existing-or-new customer and transaction records.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Customer, CustomerUpdate, Device, ExtractedFields, Plan, Transaction, TransactionStatus,
};
use crate::store::Store;

const DEFAULT_CUSTOMER_NAME: &str = "Unknown Customer";
const DEFAULT_DESCRIPTION: &str = "Scanned Document Transaction";

/// Records written for one reconciled document
#[derive(Debug, Clone, Serialize)]
pub struct Reconciled {
    pub customer: Customer,
    pub transaction: Transaction,
}

/// Reconciles extraction results against the store.
///
/// Work for the same identity (email, or customer id when there is no email) is
/// serialized so concurrent documents for one person cannot create duplicate
/// customers. The manual save path and the watcher share one instance.
pub struct Reconciler {
    store: Arc<dyn Store>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Find or create the customer, patch contact fields, and record the transaction
    pub async fn reconcile(&self, fields: &ExtractedFields) -> Result<Reconciled> {
        let fields = fields.clone().normalized();
        let customer_id = non_empty_or_mint(&fields.customer_id, "cust");

        let lease = self.lease(identity_key(fields.email.as_deref(), &customer_id));
        let _guard = lease.lock.lock().await;
        self.reconcile_locked(&fields, customer_id).await
    }

    async fn reconcile_locked(
        &self,
        fields: &ExtractedFields,
        customer_id: String,
    ) -> Result<Reconciled> {
        let mut existing = None;
        if let Some(email) = fields.email.as_deref() {
            existing = self.store.get_customer_by_email(email).await?;
        }
        if existing.is_none() {
            existing = self.store.get_customer(&customer_id).await?;
        }

        let now = Utc::now().to_rfc3339();

        let customer = match existing {
            Some(existing) => {
                let diff = contact_diff(&existing, fields);
                if diff.is_empty() {
                    existing
                } else {
                    log::info!("Updating contact details for customer {}", existing.id);
                    self.store
                        .update_customer(&existing.id, &diff)
                        .await?
                        .unwrap_or_else(|| diff.apply_to(&existing))
                }
            }
            None => {
                let customer = Customer {
                    id: customer_id,
                    name: Some(
                        fields
                            .customer_name
                            .clone()
                            .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
                    ),
                    email: fields.email.clone(),
                    address: fields.customer_address.clone(),
                    contact_phone_number: fields.contact_phone_number.clone(),
                    created_at: fields.transaction_date.clone().unwrap_or_else(|| now.clone()),
                };
                log::info!("Creating customer {}", customer.id);
                self.store.save_customer(&customer).await?;
                customer
            }
        };

        let transaction = Transaction {
            id: non_empty_or_mint(&fields.transaction_id, "txn"),
            customer_id: customer.id.clone(),
            date: fields.transaction_date.clone().unwrap_or(now),
            description: build_description(fields),
            amount: parse_amount(fields.total_payment_amount.as_deref()),
            status: TransactionStatus::Completed,
            scan_id: Some(fields.scan_id.clone()).filter(|s| !s.is_empty()),
            device: Some(Device {
                imei: fields.imei.clone(),
                iccid: fields.iccid.clone(),
                serviced_phone_number: fields.serviced_phone_number.clone(),
                network_provider: fields.network_provider.clone(),
            }),
            plan: Some(Plan {
                name: fields.service_plan.clone(),
                term: fields.plan_term.clone(),
            }),
        };
        self.store.save_transaction(&transaction).await?;

        Ok(Reconciled {
            customer,
            transaction,
        })
    }

    fn lease(&self, key: String) -> IdentityLease<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(key.clone()).or_default().clone();
        IdentityLease {
            locks: &self.locks,
            key,
            lock,
        }
    }
}

/// One caller's share of an identity mutex. Dropping it, including when the
/// reconcile future is cancelled, removes the table entry once no other caller
/// holds or waits on it.
struct IdentityLease<'a> {
    locks: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for IdentityLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The table's copy plus ours
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

fn identity_key(email: Option<&str>, customer_id: &str) -> String {
    match email {
        Some(email) => format!("email:{}", email.trim().to_lowercase()),
        None => format!("id:{}", customer_id),
    }
}

fn non_empty_or_mint(id: &str, prefix: &str) -> String {
    let id = id.trim();
    if id.is_empty() {
        format!("{}_{}", prefix, Uuid::new_v4())
    } else {
        id.to_string()
    }
}

/// Address and contact phone values that are present and differ from the stored record
fn contact_diff(existing: &Customer, fields: &ExtractedFields) -> CustomerUpdate {
    let changed = |new: &Option<String>, old: &Option<String>| match new {
        Some(value) if old.as_deref() != Some(value.as_str()) => Some(value.clone()),
        _ => None,
    };

    CustomerUpdate {
        address: changed(&fields.customer_address, &existing.address),
        contact_phone_number: changed(&fields.contact_phone_number, &existing.contact_phone_number),
        ..Default::default()
    }
}

/// Payment breakdown plus a port-in suffix when carrier or account is known
pub fn build_description(fields: &ExtractedFields) -> String {
    let mut description = fields
        .payment_breakdown
        .clone()
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    if fields.port_current_carrier.is_some() || fields.port_account_number.is_some() {
        description.push_str(&format!(
            " | Port: {} (Acct: {})",
            fields.port_current_carrier.as_deref().unwrap_or("unknown"),
            fields.port_account_number.as_deref().unwrap_or("unknown"),
        ));
    }

    description
}

/// Parse a money string such as `"$1,234.56"`.
///
/// Everything except digits, `.` and `-` is discarded and the longest numeric
/// prefix of the remainder is used. Unparseable or missing input is 0.
pub fn parse_amount(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        return 0.0;
    };
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    (1..=cleaned.len())
        .rev()
        .find_map(|end| cleaned[..end].parse::<f64>().ok())
        .filter(|amount| amount.is_finite())
        .unwrap_or(0.0)
}
