use crate::error::AppError;
use crate::services::engine::SyncEngine;
use crate::services::replay::DrainOutcome;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_LOG_ENTRIES: usize = 500;

/// In-memory session log entry (volatile, lost on restart)
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogEntry {
    pub ts_ms: i64,
    pub queued_records: usize,
    pub primary_replayed: usize,
    pub dependent_replayed: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncStats {
    pub queued_records: usize,
    pub primary: DrainOutcome,
    pub dependent: DrainOutcome,
}

fn replayed(outcome: &DrainOutcome) -> usize {
    match outcome {
        DrainOutcome::Completed(stats) => stats.succeeded + stats.short_circuited,
        DrainOutcome::NoCredential | DrainOutcome::AlreadyRunning => 0,
    }
}

/// The scheduler the engine leaves retries to: runs a sync cycle every
/// `sync_interval_seconds`, and waits `retry_delay_seconds` plus jitter after
/// a failed one.
pub struct BackgroundSync {
    engine: Arc<SyncEngine>,
    enabled: AtomicBool,
    /// epoch ms of the next planned cycle
    next_sync_at: AtomicU64,
    log: Mutex<Vec<SyncLogEntry>>,
}

impl BackgroundSync {
    pub fn new(engine: Arc<SyncEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            enabled: AtomicBool::new(false),
            next_sync_at: AtomicU64::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    fn append_log(&self, entry: SyncLogEntry) {
        if let Ok(mut guard) = self.log.lock() {
            guard.push(entry);
            let len = guard.len();
            if len > MAX_LOG_ENTRIES {
                guard.drain(0..len - MAX_LOG_ENTRIES);
            }
        }
    }

    pub fn sync_log(&self) -> Vec<SyncLogEntry> {
        self.log.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    pub fn next_sync_eta_seconds(&self) -> Option<u64> {
        if !self.is_running() {
            return None;
        }
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let target = self.next_sync_at.load(Ordering::SeqCst);
        Some(target.saturating_sub(now_ms) / 1000)
    }

    fn plan_next(&self, delay_seconds: u64) {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        self.next_sync_at
            .store(now_ms + delay_seconds * 1000, Ordering::SeqCst);
    }

    fn retry_delay_seconds(&self) -> u64 {
        let base = self.engine.config().retry_delay_seconds;
        // spread retries of many clients coming back online together
        let jitter_max = (base / 4).max(1);
        base + rand::random::<u64>() % (jitter_max + 1)
    }

    /// Starts the background loop on its own thread.
    /// Returns `None` when it was already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.enabled.swap(true, Ordering::SeqCst) {
            log::warn!("Background sync already running");
            return None;
        }

        let interval = self.engine.config().sync_interval_seconds;
        log::info!("Starting background sync with {} second interval", interval);

        let this = Arc::clone(self);
        let handle = std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    log::error!("Failed to create tokio runtime: {}", e);
                    this.enabled.store(false, Ordering::SeqCst);
                    return;
                }
            };

            while this.enabled.load(Ordering::SeqCst) {
                runtime.block_on(async {
                    let delay = match this.perform_sync_cycle().await {
                        Ok(stats) => {
                            log::info!("Background sync completed: {:?}", stats);
                            interval
                        }
                        Err(e) if e.is_retryable() => {
                            let delay = this.retry_delay_seconds();
                            log::warn!("Background sync failed, retrying in {}s: {}", delay, e);
                            delay
                        }
                        Err(e) => {
                            log::error!("Background sync error: {}", e);
                            interval
                        }
                    };
                    this.plan_next(delay);
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                });
            }

            log::info!("Background sync stopped");
        });
        Some(handle)
    }

    pub fn stop(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            log::info!("Stopping background sync");
        }
    }

    pub fn is_running(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// One cycle: hand waiting records to the queue, then drain both queues.
    /// The dependent queue is drained even when the primary drain failed.
    async fn perform_sync_cycle(&self) -> Result<SyncStats, AppError> {
        let queued_records = self.engine.process_local_queue()?;
        let primary = self.engine.sync_primary_queue().await;
        let dependent = self.engine.sync_dependent_queue().await;

        let error = match (&primary, &dependent) {
            (Err(e), _) | (_, Err(e)) => Some(e.to_string()),
            _ => None,
        };
        self.append_log(SyncLogEntry {
            ts_ms: Utc::now().timestamp_millis(),
            queued_records,
            primary_replayed: primary.as_ref().map(replayed).unwrap_or(0),
            dependent_replayed: dependent.as_ref().map(replayed).unwrap_or(0),
            error,
        });

        Ok(SyncStats {
            queued_records,
            primary: primary?,
            dependent: dependent?,
        })
    }

    /// Triggers an immediate cycle, in addition to the scheduled ones
    pub async fn sync_now(&self) -> Result<SyncStats, AppError> {
        self.perform_sync_cycle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Observation, ProcessingOutcome};
    use crate::test_support::{test_engine, MockTransport, Reply};

    #[tokio::test]
    async fn test_sync_now_runs_a_full_cycle() {
        let (engine, _transport) = test_engine(MockTransport::new(|req| {
            if req.url.ends_with("/observations") {
                Reply::Status(200, r#"{"id":42,"uuid":"x"}"#)
            } else {
                Reply::Status(200, "{}")
            }
        }));
        let uuid = engine.save_new_record(Observation::new(""), Vec::new()).unwrap();
        engine.update_credential(Some("Bearer abc"));
        let sync = BackgroundSync::new(engine.clone());

        let stats = sync.sync_now().await.unwrap();
        assert_eq!(stats.queued_records, 1);
        assert_eq!(replayed(&stats.primary), 1);
        assert_eq!(replayed(&stats.dependent), 1);

        let queue = engine.local_queue().unwrap();
        assert_eq!(queue.summary[0].uuid, uuid);
        assert_eq!(queue.summary[0].processing_outcome, ProcessingOutcome::Success);

        let log = sync.sync_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].error, None);
    }

    #[tokio::test]
    async fn test_failed_cycle_is_logged_and_returned() {
        let (engine, _transport) = test_engine(MockTransport::always(Reply::Offline));
        engine.save_new_record(Observation::new(""), Vec::new()).unwrap();
        engine.update_credential(Some("Bearer abc"));
        let sync = BackgroundSync::new(engine);

        let err = sync.sync_now().await.unwrap_err();
        assert!(err.is_retryable());
        let log = sync.sync_log();
        assert_eq!(log[0].queued_records, 1);
        assert!(log[0].error.is_some());
    }

    #[test]
    fn test_log_is_capped() {
        let (engine, _transport) = test_engine(MockTransport::always(Reply::Offline));
        let sync = BackgroundSync::new(engine);
        for i in 0..(MAX_LOG_ENTRIES + 10) {
            sync.append_log(SyncLogEntry {
                ts_ms: i as i64,
                queued_records: 0,
                primary_replayed: 0,
                dependent_replayed: 0,
                error: None,
            });
        }
        let log = sync.sync_log();
        assert_eq!(log.len(), MAX_LOG_ENTRIES);
        assert_eq!(log[0].ts_ms, 10);
    }

    #[test]
    fn test_eta_only_while_running() {
        let (engine, _transport) = test_engine(MockTransport::always(Reply::Offline));
        let sync = BackgroundSync::new(engine);
        assert!(!sync.is_running());
        assert_eq!(sync.next_sync_eta_seconds(), None);
        sync.stop();
        assert!(!sync.is_running());
    }

    #[test]
    fn test_retry_delay_has_bounded_jitter() {
        let (engine, _transport) = test_engine(MockTransport::always(Reply::Offline));
        let sync = BackgroundSync::new(engine);
        for _ in 0..50 {
            let delay = sync.retry_delay_seconds();
            assert!((60..=75).contains(&delay));
        }
    }
}
