pub mod config;
pub mod error;
pub mod db;
pub mod cache;
pub mod models;
pub mod store;
pub mod extraction;
pub mod drive;
pub mod reconcile;
pub mod watch;
pub mod server;

pub use config::Config;
pub use error::{CrmError, Result};
pub use reconcile::{Reconciled, Reconciler};
pub use watch::{CycleReport, Watcher};
