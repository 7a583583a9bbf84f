use serde::{Deserialize, Serialize};

/// Transaction status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[default]
    Completed,
    Pending,
    Failed,
}

/// Device serviced in a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub imei: Option<String>,
    pub iccid: Option<String>,
    pub serviced_phone_number: Option<String>,
    pub network_provider: Option<String>,
}

/// Service plan attached to a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub name: Option<String>,
    pub term: Option<String>,
}

/// A CRM transaction record. Immutable once saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub customer_id: String,
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
}

/// Body of a manually entered transaction; the server assigns the id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub customer_id: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default)]
    pub scan_id: Option<String>,
    #[serde(default)]
    pub device: Option<Device>,
    #[serde(default)]
    pub plan: Option<Plan>,
}

impl NewTransaction {
    pub fn into_transaction(self, id: String) -> Transaction {
        Transaction {
            id,
            customer_id: self.customer_id,
            date: self.date,
            description: self.description,
            amount: self.amount,
            status: self.status,
            scan_id: self.scan_id,
            device: self.device,
            plan: self.plan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_json_shape() {
        let txn = Transaction {
            id: "txn_1".to_string(),
            customer_id: "cust_1".to_string(),
            date: "2024-03-01".to_string(),
            description: "Activation".to_string(),
            amount: 50.0,
            status: TransactionStatus::Completed,
            scan_id: None,
            device: Some(Device {
                imei: Some("490154203237518".to_string()),
                ..Default::default()
            }),
            plan: None,
        };
        let json = serde_json::to_value(&txn).unwrap();
        assert_eq!(json["customerId"], "cust_1");
        assert_eq!(json["status"], "Completed");
        assert_eq!(json["device"]["imei"], "490154203237518");
        assert!(json.get("scanId").is_none());
        assert!(json.get("plan").is_none());
    }

    #[test]
    fn test_new_transaction_defaults() {
        let body = r#"{"customerId": "cust_9", "date": "2024-05-05", "amount": 12.5}"#;
        let new_txn: NewTransaction = serde_json::from_str(body).unwrap();
        let txn = new_txn.into_transaction("txn_abc".to_string());
        assert_eq!(txn.id, "txn_abc");
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert_eq!(txn.amount, 12.5);
        assert!(txn.description.is_empty());
    }

    #[test]
    fn test_status_rejects_unknown_value() {
        let parsed = serde_json::from_str::<TransactionStatus>(r#""Refunded""#);
        assert!(parsed.is_err());
    }
}
