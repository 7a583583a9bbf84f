//! HTTP API: document analysis, CRM records and watcher control.

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::ProcessedFileCache;
use crate::config::{Config, ServerConfig};
use crate::drive::{GoogleDrive, RemoteFolder};
use crate::error::{CrmError, Result};
use crate::extraction::{Extractor, GeminiExtractor};
use crate::reconcile::Reconciler;
use crate::store::{init_cache, open_store, Store, StoreBackend};
use crate::watch::Watcher;

/// Largest accepted upload
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Watcher-side extraction bound beyond the HTTP client timeout
const EXTRACTION_GRACE_SECS: u64 = 30;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: Arc<ProcessedFileCache>,
    pub extractor: Arc<dyn Extractor>,
    pub reconciler: Arc<Reconciler>,
    pub watcher: Arc<Watcher>,
}

impl AppState {
    /// Wire every component from configuration.
    ///
    /// Missing Gemini or Drive credentials are not fatal: analysis then fails per
    /// request and the watcher refuses to start.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let backend = StoreBackend::probe(&config.store);
        let store = open_store(&backend, &config.store).await?;

        let cache = Arc::new(ProcessedFileCache::new());
        init_cache(store.as_ref(), &cache).await;

        let api_key = config.extraction_api_key();
        if api_key.is_none() {
            log::warn!(
                "{} not set, document analysis is unavailable",
                config.extraction.api_key_env
            );
        }
        let extractor: Arc<dyn Extractor> =
            Arc::new(GeminiExtractor::new(api_key, &config.extraction)?);

        let remote: Option<Arc<dyn RemoteFolder>> = match GoogleDrive::from_config(&config.drive) {
            Ok(Some(drive)) => Some(Arc::new(drive)),
            Ok(None) => {
                log::warn!("No Drive service account configured, folder watcher is unavailable");
                None
            }
            Err(e) => {
                log::error!("Drive client unavailable: {}", e);
                None
            }
        };

        let reconciler = Arc::new(Reconciler::new(store.clone()));
        let watcher = Watcher::new(remote, extractor.clone(), reconciler.clone(), cache.clone())
            .with_extraction_timeout(Duration::from_secs(
                config.extraction.timeout_secs + EXTRACTION_GRACE_SECS,
            ));

        Ok(Self {
            store,
            cache,
            extractor,
            reconciler,
            watcher: Arc::new(watcher),
        })
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<axum::http::HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the axum router
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route("/api/drive/configure", post(handlers::configure_drive))
        .route("/api/drive/status", get(handlers::drive_status))
        .route("/api/analyze-document", post(handlers::analyze_document))
        .route("/api/save-analysis", post(handlers::save_analysis))
        .route("/api/customers", get(handlers::list_customers))
        .route(
            "/api/customers/:id",
            get(handlers::get_customer).put(handlers::update_customer),
        )
        .route(
            "/api/customers/:id/transactions",
            get(handlers::customer_transactions),
        )
        .route(
            "/api/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn run(state: AppState, config: &ServerConfig) -> Result<()> {
    let app = create_router(state.clone(), &config.allowed_origins);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        CrmError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })?;

    log::info!("Server running on http://{}", addr);
    log::info!("Database mode: {}", state.store.mode());

    axum::serve(listener, app).await.map_err(|e| {
        CrmError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("HTTP server error: {}", e),
        ))
    })?;

    Ok(())
}
