use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::AppState;
use crate::error::CrmError;
use crate::extraction;
use crate::models::{CustomerUpdate, ExtractedFields, NewTransaction};

/// Multipart field carrying the uploaded document
const DOCUMENT_FIELD: &str = "document";

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn internal_error(context: &str, error: CrmError) -> Response {
    log::error!("{}: {}", context, error);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}

pub(super) async fn root(State(state): State<AppState>) -> String {
    format!("CRM backend is RUNNING. Mode: {}", state.store.mode())
}

pub(super) async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "dbMode": state.store.mode().as_str(),
        "cacheSize": state.cache.len(),
    }))
    .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ConfigureRequest {
    #[serde(default)]
    folder_id: Option<String>,
    #[serde(default)]
    active: bool,
}

pub(super) async fn configure_drive(
    State(state): State<AppState>,
    Json(request): Json<ConfigureRequest>,
) -> Response {
    match state.watcher.configure(request.folder_id, request.active) {
        Ok(status) => Json(json!({
            "active": status.active,
            "folderId": status.folder_id,
        }))
        .into_response(),
        Err(CrmError::Config(message)) | Err(CrmError::InvalidInput(message)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "active": false, "message": message })),
        )
            .into_response(),
        Err(e) => internal_error("Drive configure failed", e),
    }
}

pub(super) async fn drive_status(State(state): State<AppState>) -> Response {
    Json(state.watcher.status()).into_response()
}

pub(super) async fn analyze_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    let mut document = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some(DOCUMENT_FIELD) {
                    continue;
                }
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        document = Some((bytes, mime_type));
                        break;
                    }
                    Err(e) => {
                        return error_response(StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e))
                    }
                }
            }
            Ok(None) => break,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e)),
        }
    }

    let Some((bytes, mime_type)) = document else {
        return error_response(StatusCode::BAD_REQUEST, "No file uploaded.");
    };
    if !extraction::is_supported_mime_type(&mime_type) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Unsupported file type: {}", mime_type),
        );
    }

    match extraction::analyze_document(state.extractor.as_ref(), &bytes, &mime_type).await {
        Ok(fields) => Json(fields).into_response(),
        Err(e) => internal_error("Analysis error", e),
    }
}

pub(super) async fn save_analysis(
    State(state): State<AppState>,
    Json(fields): Json<ExtractedFields>,
) -> Response {
    match state.reconciler.reconcile(&fields).await {
        Ok(reconciled) => (StatusCode::CREATED, Json(reconciled)).into_response(),
        Err(e) => {
            log::error!("Save error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save data.")
        }
    }
}

pub(super) async fn list_customers(State(state): State<AppState>) -> Response {
    match state.store.get_customers().await {
        Ok(customers) => Json(customers).into_response(),
        Err(e) => internal_error("Failed to list customers", e),
    }
}

pub(super) async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_customer(&id).await {
        Ok(Some(customer)) => Json(customer).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Customer not found"),
        Err(e) => internal_error("Failed to load customer", e),
    }
}

pub(super) async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<CustomerUpdate>,
) -> Response {
    match state.store.update_customer(&id, &update).await {
        Ok(Some(customer)) => Json(customer).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Customer not found"),
        Err(e) => internal_error("Failed to update customer", e),
    }
}

pub(super) async fn customer_transactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_customer_transactions(&id).await {
        Ok(transactions) => Json(transactions).into_response(),
        Err(e) => internal_error("Failed to list customer transactions", e),
    }
}

pub(super) async fn list_transactions(State(state): State<AppState>) -> Response {
    match state.store.get_transactions().await {
        Ok(transactions) => Json(transactions).into_response(),
        Err(e) => internal_error("Failed to list transactions", e),
    }
}

pub(super) async fn create_transaction(
    State(state): State<AppState>,
    Json(new_transaction): Json<NewTransaction>,
) -> Response {
    let transaction = new_transaction.into_transaction(format!("txn_{}", Uuid::new_v4()));
    match state.store.save_transaction(&transaction).await {
        Ok(()) => (StatusCode::CREATED, Json(transaction)).into_response(),
        Err(e) => internal_error("Failed to save transaction", e),
    }
}
