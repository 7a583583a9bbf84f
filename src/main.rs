use crmsync::db::{migrate, Db};
use crmsync::error::CrmError;
use crmsync::server::{self, AppState};
use crmsync::store::StoreBackend;
use crmsync::Config;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger from environment variable or default to info level
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" => run_server().await?,
        "verify" => run_schema_verification().await?,
        other => anyhow::bail!("Unknown command '{}' (expected 'serve' or 'verify')", other),
    }

    Ok(())
}

/// Run the HTTP API and the folder watcher
async fn run_server() -> Result<()> {
    log::info!("Starting crmsync v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let state = AppState::from_config(&config).await?;
    log::info!("Cache initialized with {} processed files", state.cache.len());

    server::run(state, &config.server).await?;
    Ok(())
}

/// Apply migrations to the configured database and check the resulting schema
async fn run_schema_verification() -> Result<()> {
    let config = Config::load()?;

    let path = match StoreBackend::probe(&config.store) {
        StoreBackend::Durable(path) => path,
        StoreBackend::Ephemeral => {
            log::warn!("No database configured (set store.db_path or CRM_DB_PATH), nothing to verify");
            return Ok(());
        }
    };
    log::info!("Database path: {}", path.display());

    let db = Db::new(&path);
    db.with_connection(|conn| migrate::run_migrations(conn)).await?;

    db.with_connection(|conn| {
        let tables = migrate::list_tables(conn)?;
        let missing: Vec<&str> = migrate::EXPECTED_TABLES
            .iter()
            .copied()
            .filter(|table| !tables.iter().any(|t| t == table))
            .collect();
        if !missing.is_empty() {
            return Err(CrmError::Config(format!("Missing tables: {}", missing.join(", "))));
        }
        log::debug!("✓ {} tables present", migrate::EXPECTED_TABLES.len());

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(CrmError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(CrmError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    }).await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
