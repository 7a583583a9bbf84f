use serde::{Deserialize, Deserializer, Serialize};

/// Structured fields returned by the extraction service for one document.
///
/// The three identifiers are minted by the service; they are empty strings when
/// it omitted them. Every other field is `None` when not found in the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub scan_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub customer_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub transaction_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_address: Option<String>,
    #[serde(default)]
    pub contact_phone_number: Option<String>,
    #[serde(default)]
    pub serviced_phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub imei: Option<String>,
    #[serde(default)]
    pub iccid: Option<String>,
    #[serde(default)]
    pub service_plan: Option<String>,
    #[serde(default)]
    pub plan_term: Option<String>,
    #[serde(default)]
    pub network_provider: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<String>,
    #[serde(default)]
    pub payment_breakdown: Option<String>,
    #[serde(default)]
    pub total_payment_amount: Option<String>,
    #[serde(default)]
    pub port_current_carrier: Option<String>,
    #[serde(default)]
    pub port_account_number: Option<String>,
    #[serde(default)]
    pub port_pin: Option<String>,
}

/// Identifiers may arrive as `null`; treat that like an omitted key
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExtractedFields {
    /// Treat blank strings from the model as missing
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.customer_name,
            &mut self.customer_address,
            &mut self.contact_phone_number,
            &mut self.serviced_phone_number,
            &mut self.email,
            &mut self.imei,
            &mut self.iccid,
            &mut self.service_plan,
            &mut self.plan_term,
            &mut self.network_provider,
            &mut self.transaction_date,
            &mut self.payment_breakdown,
            &mut self.total_payment_amount,
            &mut self.port_current_carrier,
            &mut self.port_account_number,
            &mut self.port_pin,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }
}
