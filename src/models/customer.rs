use serde::{Deserialize, Serialize};

/// A CRM customer record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub contact_phone_number: Option<String>,
    /// Set once at creation
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// Partial customer fields. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone_number: Option<String>,
}

impl CustomerUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.address.is_none()
            && self.contact_phone_number.is_none()
    }

    /// Merge these fields over `customer`, returning the merged record
    pub fn apply_to(&self, customer: &Customer) -> Customer {
        let mut merged = customer.clone();
        if let Some(name) = &self.name {
            merged.name = Some(name.clone());
        }
        if let Some(email) = &self.email {
            merged.email = Some(email.clone());
        }
        if let Some(address) = &self.address {
            merged.address = Some(address.clone());
        }
        if let Some(phone) = &self.contact_phone_number {
            merged.contact_phone_number = Some(phone.clone());
        }
        merged
    }
}
