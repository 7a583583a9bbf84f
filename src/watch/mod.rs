//! Drive folder watcher: poll a remote folder and turn new documents into CRM records.
//!
//! Each poll cycle lists the folder, skips files whose `{fileId}_{modifiedTime}` key
//! is in the dedup cache or the persisted ledger, and runs the rest through
//! download, extraction and reconciliation. A file is recorded in the ledger and
//! the cache only after its records are saved, so failures are retried next cycle.
//!
//! The polling task waits a fixed interval after each cycle completes. Stopping
//! cancels the pending wait; a cycle already running finishes first.

mod activity;

pub use activity::{ActivityLog, LogEntry, LogKind, MAX_LOG_ENTRIES};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::ProcessedFileCache;
use crate::drive::{RemoteFile, RemoteFolder};
use crate::error::{CrmError, Result};
use crate::extraction::{analyze_document, Extractor};
use crate::models::{ProcessedFileRecord, ProcessedKey, ProcessedStatus};
use crate::reconcile::{Reconciled, Reconciler};

/// Wait between the end of one cycle and the start of the next
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound on one extraction call made by the watcher
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(180);

/// Counts from one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub listed: usize,
    pub skipped_cached: usize,
    pub skipped_ledger: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Snapshot served by `GET /api/drive/status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStatus {
    pub active: bool,
    pub folder_id: Option<String>,
    pub logs: Vec<LogEntry>,
}

struct WatcherState {
    active: bool,
    folder_id: Option<String>,
    /// Bumped on every start and stop; a polling task exits once it is stale
    generation: u64,
    task: Option<JoinHandle<()>>,
    log: ActivityLog,
}

pub struct Watcher {
    remote: Option<Arc<dyn RemoteFolder>>,
    extractor: Arc<dyn Extractor>,
    reconciler: Arc<Reconciler>,
    cache: Arc<ProcessedFileCache>,
    state: Mutex<WatcherState>,
    /// Held for the duration of a cycle
    cycle_lock: tokio::sync::Mutex<()>,
    wake: watch::Sender<u64>,
    poll_interval: Duration,
    extraction_timeout: Duration,
}

impl Watcher {
    /// `remote` is `None` when no Drive credentials are configured; activation is
    /// then refused.
    pub fn new(
        remote: Option<Arc<dyn RemoteFolder>>,
        extractor: Arc<dyn Extractor>,
        reconciler: Arc<Reconciler>,
        cache: Arc<ProcessedFileCache>,
    ) -> Self {
        let (wake, _) = watch::channel(0);
        Self {
            remote,
            extractor,
            reconciler,
            cache,
            state: Mutex::new(WatcherState {
                active: false,
                folder_id: None,
                generation: 0,
                task: None,
                log: ActivityLog::new(),
            }),
            cycle_lock: tokio::sync::Mutex::new(()),
            wake,
            poll_interval: POLL_INTERVAL,
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
        }
    }

    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn state(&self) -> MutexGuard<'_, WatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_log(&self, kind: LogKind, message: impl Into<String>) {
        self.state().log.push(kind, message);
    }

    pub fn status(&self) -> WatcherStatus {
        let state = self.state();
        WatcherStatus {
            active: state.active,
            folder_id: state.folder_id.clone(),
            logs: state.log.entries(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    /// Whether the current polling task is alive
    pub fn is_polling(&self) -> bool {
        self.state().task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Update the folder and start or stop polling.
    ///
    /// A non-empty `folder_id` always replaces the current one. Starting requires a
    /// remote folder client and a folder id; starting while active or stopping
    /// while stopped only updates the folder.
    pub fn configure(self: &Arc<Self>, folder_id: Option<String>, active: bool) -> Result<WatcherStatus> {
        let start = {
            let mut state = self.state();
            if let Some(id) = folder_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) {
                state.folder_id = Some(id);
            }

            if active && !state.active {
                if self.remote.is_none() {
                    return Err(CrmError::Config(
                        "Drive service not configured (missing service account credentials)".to_string(),
                    ));
                }
                let folder = state.folder_id.clone().ok_or_else(|| {
                    CrmError::InvalidInput("A folder id is required to start the watcher".to_string())
                })?;

                state.active = true;
                state.generation += 1;
                state
                    .log
                    .push(LogKind::Success, format!("Starting watcher on folder {}...", folder));
                Some(state.generation)
            } else {
                if !active && state.active {
                    state.active = false;
                    state.generation += 1;
                    state.task = None;
                    self.wake.send_replace(state.generation);
                    state.log.push(LogKind::Info, "Watcher stopped.");
                }
                None
            }
        };

        if let Some(generation) = start {
            self.wake.send_replace(generation);
            let handle = tokio::spawn(Arc::clone(self).run(generation));
            let mut state = self.state();
            if state.generation == generation {
                state.task = Some(handle);
            }
        }

        Ok(self.status())
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.state();
        state.active && state.generation == generation
    }

    /// Polling task: one cycle immediately, then one per interval until stopped
    async fn run(self: Arc<Self>, generation: u64) {
        let mut wake = self.wake.subscribe();

        while self.is_current(generation) {
            // errors are already in the activity log
            let _ = self.poll_once().await;

            if !self.is_current(generation) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = wake.changed() => {}
            }
        }

        log::debug!("Polling task {} exited", generation);
    }

    /// Run one poll cycle against the configured folder.
    ///
    /// Waits for any cycle already in progress. A listing failure is logged and
    /// returned; per-file failures are logged and counted in the report.
    pub async fn poll_once(&self) -> Result<CycleReport> {
        let _cycle = self.cycle_lock.lock().await;

        let remote = self.remote.as_ref().ok_or_else(|| {
            CrmError::Config("Drive service not configured (missing service account credentials)".to_string())
        })?;
        let folder_id = self
            .state()
            .folder_id
            .clone()
            .ok_or_else(|| CrmError::InvalidInput("No folder configured".to_string()))?;

        let files = match remote.list_files(&folder_id).await {
            Ok(files) => files,
            Err(e) => {
                self.push_log(LogKind::Error, format!("Drive polling error: {}", e));
                return Err(e);
            }
        };

        let mut report = CycleReport {
            listed: files.len(),
            ..Default::default()
        };

        for file in &files {
            let key = ProcessedKey::new(&file.id, &file.modified_time);

            if self.cache.contains(&key) {
                report.skipped_cached += 1;
                continue;
            }

            match self.reconciler.store().check_processed_file(&key).await {
                Ok(true) => {
                    self.cache.insert(&key);
                    report.skipped_ledger += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    self.push_log(LogKind::Error, format!("Failed to process {}: {}", file.name, e));
                    report.failed += 1;
                    continue;
                }
            }

            self.push_log(LogKind::Info, format!("Processing new file: {}", file.name));
            match self.process_file(remote.as_ref(), file, &key).await {
                Ok(_) => {
                    self.push_log(LogKind::Success, format!("Successfully processed: {}", file.name));
                    report.processed += 1;
                }
                Err(e) => {
                    self.push_log(LogKind::Error, format!("Failed to process {}: {}", file.name, e));
                    report.failed += 1;
                }
            }
        }

        log::debug!("Poll cycle for folder {}: {:?}", folder_id, report);
        Ok(report)
    }

    async fn process_file(
        &self,
        remote: &dyn RemoteFolder,
        file: &RemoteFile,
        key: &ProcessedKey,
    ) -> Result<Reconciled> {
        let bytes = remote.download(file).await?;

        let fields = tokio::time::timeout(
            self.extraction_timeout,
            analyze_document(self.extractor.as_ref(), &bytes, &file.mime_type),
        )
        .await
        .map_err(|_| {
            CrmError::Extraction(format!("Timed out after {:?}", self.extraction_timeout))
        })??;

        let reconciled = self.reconciler.reconcile(&fields).await?;

        let record = ProcessedFileRecord {
            file_id: file.id.clone(),
            file_name: file.name.clone(),
            modified_time: file.modified_time.clone(),
            processed_at: Utc::now().to_rfc3339(),
            status: ProcessedStatus::Success,
        };
        self.reconciler.store().save_processed_file(key, &record).await?;
        self.cache.insert(key);

        Ok(reconciled)
    }
}
