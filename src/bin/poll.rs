//! Run a single watcher poll cycle against a Drive folder and print what happened.

use clap::Parser;
use crmsync::server::AppState;
use crmsync::Config;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "poll")]
#[command(about = "Run one Drive poll cycle: extract and save any new documents in the folder")]
struct Args {
    /// Drive folder id to poll
    #[arg(long)]
    folder_id: String,

    /// Print the cycle report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .init();

    let args = Args::parse();

    let config = Config::load()?;
    let state = AppState::from_config(&config).await?;
    log::info!("Polling folder {} ({} files already processed)", args.folder_id, state.cache.len());

    state.watcher.configure(Some(args.folder_id), false)?;
    let report = state.watcher.poll_once().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for entry in state.watcher.status().logs.iter().rev() {
            println!("[{}] {}", entry.timestamp, entry.message);
        }
        println!(
            "listed {}, processed {}, failed {}, skipped {} (cache) + {} (ledger)",
            report.listed,
            report.processed,
            report.failed,
            report.skipped_cached,
            report.skipped_ledger
        );
    }

    Ok(())
}
