//! The drain loop shared by both queues.
//!
//! One pass works through the entries in FIFO order until the queue is empty.
//! An entry is only removed once its callback has returned, so a crash at any
//! point replays it again later. Per entry:
//! - uuid in the ignore set: dropped without any callback
//! - poison pill: success callback with no response, nothing is sent
//! - no response: entry stays at the head, its attempt is counted, the pass aborts
//! - 401: entry stays at the head unchanged and the pass aborts
//! - request cannot be sent at all: unsendable callback, the rest of that uuid is skipped
//! - other 4xx: error callback, which may ask to skip the rest of that uuid
//! - 5xx: error callback, and the rest of that uuid is always skipped
//! - anything else: success callback

use crate::error::AppError;
use crate::models::QueueEntry;
use crate::services::credential::AuthCredential;
use crate::services::request_queue::RequestQueue;
use crate::services::transport::{HttpResponse, HttpTransport};
use std::collections::HashSet;
use ulid::Ulid;

/// What an error callback wants done with the rest of the entry's uuid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    Continue,
    IgnoreRemaining,
}

/// Per-queue callbacks
pub trait ReplayHandler: Send + Sync {
    /// `response` is `None` for poison pills
    fn on_success(&self, entry: &QueueEntry, response: Option<&HttpResponse>)
        -> Result<(), AppError>;

    /// Called for 4xx (except 401) and 5xx responses
    fn on_error(
        &self,
        entry: &QueueEntry,
        response: &HttpResponse,
    ) -> Result<ErrorDisposition, AppError>;

    /// Called when the request failed for a reason other than the network,
    /// e.g. a photo with an invalid mime type
    fn on_unsendable(&self, entry: &QueueEntry, error: &AppError) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub pass_id: String,
    pub succeeded: usize,
    pub short_circuited: usize,
    pub client_errors: usize,
    pub server_errors: usize,
    pub unsendable: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed(DrainStats),
    /// Refused: no credential is held
    NoCredential,
    /// Refused: a drain of this queue is already running
    AlreadyRunning,
}

/// Drains `queue` against the network.
///
/// Transport and auth failures are returned as errors with the entry still at
/// the head, so the caller can schedule a retry. Errors from callbacks abort the
/// pass as well and leave the entry that triggered them queued.
pub async fn drain_queue(
    queue: &RequestQueue,
    transport: &dyn HttpTransport,
    credential: &AuthCredential,
    handler: &dyn ReplayHandler,
) -> Result<DrainOutcome, AppError> {
    if !credential.is_set() {
        log::debug!(
            "[queue={}] no auth credential held, refusing to replay",
            queue.name()
        );
        return Ok(DrainOutcome::NoCredential);
    }
    let Some(_guard) = queue.try_begin_sync() else {
        log::debug!(
            "[queue={}] refusing to sync again as a sync is already running",
            queue.name()
        );
        return Ok(DrainOutcome::AlreadyRunning);
    };

    let mut stats = DrainStats {
        pass_id: Ulid::new().to_string(),
        ..Default::default()
    };
    log::debug!("[queue={} pass={}] starting", queue.name(), stats.pass_id);

    let mut ignored: HashSet<String> = HashSet::new();
    while let Some(mut stored) = queue.peek()? {
        let obs_uuid = stored.entry.metadata.obs_uuid.clone();

        if ignored.contains(&obs_uuid) {
            log::debug!(
                "[queue={}] discarding '{}' as uuid={} is in the ignore set",
                queue.name(),
                stored.entry.describe(),
                obs_uuid
            );
            queue.remove(&stored)?;
            stats.skipped += 1;
            continue;
        }

        if stored.entry.request.is_poison_pill() {
            log::debug!(
                "[queue={}] short-circuiting '{}' straight to the success callback",
                queue.name(),
                stored.entry.describe()
            );
            handler.on_success(&stored.entry, None)?;
            queue.remove(&stored)?;
            stats.short_circuited += 1;
            continue;
        }

        // re-read on every entry so a refreshed credential is used mid-pass
        let Some(authorization) = credential.current() else {
            return Err(AppError::Auth(format!(
                "Credential cleared while replaying queue '{}'",
                queue.name()
            )));
        };

        let sent = transport.send(&stored.entry.request, &authorization).await;
        let response = match sent {
            Ok(response) => response,
            Err(AppError::Transport(msg)) => {
                queue.record_failed_attempt(&mut stored)?;
                log::debug!(
                    "[queue={}] '{}' failed to replay (attempt {}), left at the front",
                    queue.name(),
                    stored.entry.describe(),
                    stored.attempts
                );
                return Err(AppError::Transport(format!(
                    "Failed to replay queue '{}', due to: {}",
                    queue.name(),
                    msg
                )));
            }
            Err(e) => {
                log::error!(
                    "[queue={}] dropping '{}' for uuid={}, it cannot be sent: {}",
                    queue.name(),
                    stored.entry.describe(),
                    obs_uuid,
                    e
                );
                handler.on_unsendable(&stored.entry, &e)?;
                queue.remove(&stored)?;
                stats.unsendable += 1;
                ignored.insert(obs_uuid);
                continue;
            }
        };
        log::debug!(
            "[queue={}] '{}' replayed, status={}",
            queue.name(),
            stored.entry.describe(),
            response.status
        );

        if response.status == 401 {
            return Err(AppError::Auth(format!(
                "Response indicates failed auth (status=401) in queue '{}', \
                 stopping now but we'll retry on next sync",
                queue.name()
            )));
        }

        if response.is_client_error() {
            stats.client_errors += 1;
            if handler.on_error(&stored.entry, &response)? == ErrorDisposition::IgnoreRemaining {
                ignored.insert(obs_uuid);
            }
            queue.remove(&stored)?;
            continue;
        }

        if response.is_server_error() {
            stats.server_errors += 1;
            handler.on_error(&stored.entry, &response)?;
            queue.remove(&stored)?;
            ignored.insert(obs_uuid);
            continue;
        }

        handler.on_success(&stored.entry, Some(&response))?;
        queue.remove(&stored)?;
        stats.succeeded += 1;
    }

    log::info!(
        "[queue={} pass={}] finished: {} ok, {} short-circuited, {} client errors, {} server errors, {} unsendable, {} skipped",
        queue.name(),
        stats.pass_id,
        stats.succeeded,
        stats.short_circuited,
        stats.client_errors,
        stats.server_errors,
        stats.unsendable,
        stats.skipped
    );
    Ok(DrainOutcome::Completed(stats))
}
