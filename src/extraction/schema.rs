//! Prompt and response schema sent with every extraction request.

use serde_json::{json, Map, Value};

/// Instruction text accompanying the document
pub(crate) const EXTRACTION_PROMPT: &str = "Analyze the provided business document \
(contract, receipt, activation form) for a mobile-service CRM. Extract information into JSON.

Rules:
1. Generate unique UUIDs for 'customer_id' and 'transaction_id' if not extracting an existing one.
2. 'scan_id' should be a unique hash.
3. Look for Port-In info: Carrier, Account #, PIN.
4. If a field is missing, use null.";

/// Identifiers the model must always produce
const REQUIRED_FIELDS: &[&str] = &["scan_id", "customer_id", "transaction_id"];

const NULLABLE_FIELDS: &[&str] = &[
    "customer_name",
    "customer_address",
    "contact_phone_number",
    "serviced_phone_number",
    "email",
    "imei",
    "iccid",
    "service_plan",
    "plan_term",
    "network_provider",
    "transaction_date",
    "payment_breakdown",
    "total_payment_amount",
    "port_current_carrier",
    "port_account_number",
    "port_pin",
];

/// Gemini `responseSchema` describing `ExtractedFields`
pub(crate) fn response_schema() -> Value {
    let mut properties = Map::new();
    for field in REQUIRED_FIELDS {
        properties.insert(field.to_string(), json!({ "type": "STRING" }));
    }
    for field in NULLABLE_FIELDS {
        properties.insert(field.to_string(), json!({ "type": "STRING", "nullable": true }));
    }

    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": REQUIRED_FIELDS,
    })
}
