//! Lifecycle of local records: queued actions, blocked actions captured while
//! a record is in flight, promotion and echo cleanup.

use crate::error::AppError;
use crate::models::{
    BlockedAction, LocalPhoto, LocalQueue, Observation, PendingChange, Photo, PhotoFile,
    ProcessingOutcome, QueueSummaryEntry, Record, RecordType,
};
use crate::services::record_store;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::HashMap;

/// A photo the user just attached, before it has a placeholder id
#[derive(Debug, Clone, PartialEq)]
pub struct NewPhoto {
    pub file: PhotoFile,
    pub photo_type: String,
}

/// User edit of an existing record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEdit {
    pub obs: Observation,
    pub new_photos: Vec<NewPhoto>,
    pub photo_ids_to_delete: Vec<i64>,
    pub obs_field_ids_to_delete: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// The blocked action is now the active, waiting record
    Promoted,
    /// No blocked action, the record was removed from the store
    Removed,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteDisposition {
    /// Queued as a delete against the remote
    Queued,
    /// Captured as a blocked action behind the in-flight operation
    Blocked,
    /// Never reached the remote, removed outright
    RemovedLocally,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub removed: usize,
    pub promoted: usize,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Records the user intent for a uuid with no conflicting operation in flight.
///
/// `photo_ids_to_delete` and `new_photos` are appended to what the stored
/// record still has pending (waiting or systemError). The caller's
/// `obsFieldIdsToDelete` are treated as new ids and appended the same way.
/// Everything else comes from `record`, and the outcome becomes `waiting`.
pub fn upsert_queued_action(
    conn: &Connection,
    mut record: Record,
    photo_ids_to_delete: Vec<i64>,
    new_photos: Vec<LocalPhoto>,
) -> Result<(), AppError> {
    let existing = record_store::get_record(conn, record.uuid())?;

    let mut pending = PendingChange::new(record.record_type());
    let mut blocked_action = None;
    if let Some(existing) = existing {
        let still_pending = matches!(
            existing.processing_outcome(),
            ProcessingOutcome::Waiting | ProcessingOutcome::SystemError
        );
        if still_pending {
            pending = existing.wow_meta.change;
        }
        blocked_action = existing.wow_meta.blocked_action;
    }

    let change = &mut record.wow_meta.change;
    let mut ids = pending.photo_ids_to_delete;
    ids.extend(photo_ids_to_delete);
    let mut photos = pending.photos_to_add;
    photos.extend(new_photos);
    let mut field_ids = pending.obs_field_ids_to_delete;
    field_ids.append(&mut change.obs_field_ids_to_delete);

    change.photo_ids_to_delete = ids;
    change.photos_to_add = photos;
    change.obs_field_ids_to_delete = field_ids;
    record.wow_meta.processing_outcome = ProcessingOutcome::Waiting;
    if record.wow_meta.blocked_action.is_none() {
        record.wow_meta.blocked_action = blocked_action;
    }

    log::debug!(
        "Queued {} action for uuid={}",
        record.record_type().as_str(),
        record.uuid()
    );
    record_store::put_record(conn, &record)
}

/// Captures user intent for a uuid whose operation is in flight.
///
/// The stored record is left alone apart from its blocked action. A first
/// call installs `record` with its own lists. Later calls append to the
/// blocked lists and take every other field from the newest `record`.
pub fn upsert_blocked_action(
    conn: &Connection,
    record: Record,
    photo_ids_to_delete: Vec<i64>,
    new_photos: Vec<LocalPhoto>,
) -> Result<(), AppError> {
    let Some(mut existing) = record_store::get_record(conn, record.uuid())? else {
        return Err(AppError::NotFound(format!(
            "In-flight record uuid={} to block behind",
            record.uuid()
        )));
    };

    let Record { obs, wow_meta } = record;
    let mut change = wow_meta.change;
    change.photo_ids_to_delete = photo_ids_to_delete;
    change.photos_to_add = new_photos;

    if let Some(previous) = existing.wow_meta.blocked_action.take() {
        let previous = previous.wow_meta;
        let mut ids = previous.photo_ids_to_delete;
        ids.append(&mut change.photo_ids_to_delete);
        let mut photos = previous.photos_to_add;
        photos.append(&mut change.photos_to_add);
        let mut field_ids = previous.obs_field_ids_to_delete;
        field_ids.append(&mut change.obs_field_ids_to_delete);
        change.photo_ids_to_delete = ids;
        change.photos_to_add = photos;
        change.obs_field_ids_to_delete = field_ids;
        log::debug!("Merged into existing blocked action for uuid={}", obs.uuid);
    } else {
        log::debug!("Installed blocked action for uuid={}", obs.uuid);
    }

    existing.wow_meta.blocked_action = Some(Box::new(BlockedAction {
        obs,
        wow_meta: change,
    }));
    record_store::put_record(conn, &existing)
}

/// Called once the active operation succeeded
pub fn promote_blocked_action(conn: &Connection, uuid: &str) -> Result<Promotion, AppError> {
    let Some(existing) = record_store::get_record(conn, uuid)? else {
        return Ok(Promotion::Missing);
    };

    let Some(blocked) = existing.wow_meta.blocked_action else {
        record_store::remove_record(conn, uuid)?;
        log::debug!("No blocked action for uuid={}, record removed", uuid);
        return Ok(Promotion::Removed);
    };

    let BlockedAction { mut obs, wow_meta } = *blocked;
    obs.remote_id = obs.remote_id.or(existing.obs.remote_id);
    let mut change = wow_meta;
    if change.record_type == RecordType::New && obs.remote_id.is_some() {
        // the create it was waiting for has gone through
        change.record_type = RecordType::Edit;
    }
    if change.record_type == RecordType::Delete && obs.remote_id.is_none() {
        record_store::remove_record(conn, uuid)?;
        return Ok(Promotion::Removed);
    }

    let record = Record {
        obs,
        wow_meta: crate::models::WowMeta {
            change,
            processing_outcome: ProcessingOutcome::Waiting,
            blocked_action: None,
        },
    };
    record_store::put_record(conn, &record)?;
    log::info!(
        "Promoted blocked {} action for uuid={}",
        record.record_type().as_str(),
        uuid
    );
    Ok(Promotion::Promoted)
}

/// Marks the in-flight operation of `uuid` done. A blocked action captured
/// meanwhile is promoted right away and its promotion returned. Without one the
/// record stays `success` until the remote echoes it.
pub fn complete_active_action(conn: &Connection, uuid: &str) -> Result<Option<Promotion>, AppError> {
    let blocked = record_store::get_record(conn, uuid)?
        .map(|r| r.has_blocked_action())
        .unwrap_or(false);
    if blocked {
        return promote_blocked_action(conn, uuid).map(Some);
    }
    record_store::set_processing_outcome(conn, uuid, ProcessingOutcome::Success)?;
    Ok(None)
}

/// Queue summary plus the records the UI may show and edit
pub fn refresh_local_record_queue(conn: &Connection) -> Result<LocalQueue, AppError> {
    let records = record_store::list_records(conn)?;
    let summary = records.iter().map(QueueSummaryEntry::from).collect();
    let ui_visible = records
        .into_iter()
        .filter(|r| r.processing_outcome() != ProcessingOutcome::WithServiceWorker)
        .collect();
    Ok(LocalQueue {
        summary,
        ui_visible,
    })
}

fn assign_placeholder_ids(photos: Vec<NewPhoto>, first_id: i64) -> Vec<LocalPhoto> {
    photos
        .into_iter()
        .zip(0..)
        .map(|(p, offset)| LocalPhoto::new(first_id - offset, p.file, p.photo_type))
        .collect()
}

/// Saves a brand new observation and returns its generated uuid
pub fn save_new_record(
    conn: &Connection,
    mut obs: Observation,
    photos: Vec<NewPhoto>,
) -> Result<String, AppError> {
    let uuid = uuid::Uuid::new_v4().to_string();
    let new_photos = assign_placeholder_ids(photos, -1);

    obs.uuid = uuid.clone();
    obs.remote_id = None;
    obs.photos = new_photos.iter().cloned().map(Photo::Local).collect();

    let mut record = Record::new(obs, RecordType::New);
    record.wow_meta.change.wow_updated_at = Some(now_rfc3339());
    upsert_queued_action(conn, record, Vec::new(), new_photos)?;

    log::info!("Saved new record uuid={}", uuid);
    Ok(uuid)
}

/// Saves an edit. Goes into the blocked slot when the record is in flight or
/// already has a blocked action waiting.
pub fn save_edit(conn: &Connection, edit: RecordEdit) -> Result<(), AppError> {
    let RecordEdit {
        mut obs,
        new_photos,
        photo_ids_to_delete,
        obs_field_ids_to_delete,
    } = edit;
    if obs.uuid.is_empty() {
        return Err(AppError::Validation("Cannot edit a record without a uuid".to_string()));
    }

    let existing = record_store::get_record(conn, &obs.uuid)?;
    let route_to_blocked = existing
        .as_ref()
        .map(|r| {
            r.processing_outcome() == ProcessingOutcome::WithServiceWorker || r.has_blocked_action()
        })
        .unwrap_or(false);

    obs.remote_id = obs
        .remote_id
        .or(existing.as_ref().and_then(|r| r.obs.remote_id));
    let record_type = if obs.remote_id.is_some() {
        RecordType::Edit
    } else {
        RecordType::New
    };

    // the most recent view of the photos: blocked slot, then stored record, then caller
    let (base_photos, pending_ids): (Vec<Photo>, Vec<i64>) = match &existing {
        Some(r) => {
            let mut pending: Vec<i64> =
                r.wow_meta.change.photos_to_add.iter().map(|p| p.id).collect();
            let base = match &r.wow_meta.blocked_action {
                Some(b) => {
                    pending.extend(b.wow_meta.photos_to_add.iter().map(|p| p.id));
                    b.obs.photos.clone()
                }
                None => r.obs.photos.clone(),
            };
            (base, pending)
        }
        None => (std::mem::take(&mut obs.photos), Vec::new()),
    };

    let lowest = base_photos
        .iter()
        .map(Photo::id)
        .chain(pending_ids)
        .fold(0, i64::min);
    let new_local = assign_placeholder_ids(new_photos, lowest - 1);

    obs.photos = base_photos
        .into_iter()
        .filter(|p| !photo_ids_to_delete.contains(&p.id()))
        .chain(new_local.iter().cloned().map(Photo::Local))
        .collect();

    // placeholder ids never existed on the remote
    let remote_deletes: Vec<i64> = photo_ids_to_delete.into_iter().filter(|id| *id > 0).collect();

    let mut record = Record::new(obs, record_type);
    record.wow_meta.change.obs_field_ids_to_delete = obs_field_ids_to_delete;
    record.wow_meta.change.wow_updated_at = Some(now_rfc3339());

    if route_to_blocked {
        upsert_blocked_action(conn, record, remote_deletes, new_local)
    } else {
        upsert_queued_action(conn, record, remote_deletes, new_local)
    }
}

/// Deletes a record: blocked when in flight, removed outright when it never
/// reached the remote, otherwise replaced by a delete-typed record
pub fn delete_record(
    conn: &Connection,
    uuid: &str,
    remote_id: Option<i64>,
) -> Result<DeleteDisposition, AppError> {
    let existing = record_store::get_record(conn, uuid)?;
    let remote_id = remote_id.or(existing.as_ref().and_then(|r| r.obs.remote_id));

    let mut obs = Observation::new(uuid);
    obs.remote_id = remote_id;
    let mut record = Record::new(obs, RecordType::Delete);
    record.wow_meta.change.wow_updated_at = Some(now_rfc3339());

    let route_to_blocked = existing
        .as_ref()
        .map(|r| {
            r.processing_outcome() == ProcessingOutcome::WithServiceWorker || r.has_blocked_action()
        })
        .unwrap_or(false);
    if route_to_blocked {
        upsert_blocked_action(conn, record, Vec::new(), Vec::new())?;
        return Ok(DeleteDisposition::Blocked);
    }

    if remote_id.is_none() {
        record_store::remove_record(conn, uuid)?;
        log::info!("Removed local-only record uuid={}", uuid);
        return Ok(DeleteDisposition::RemovedLocally);
    }

    record_store::put_record(conn, &record)?;
    log::info!("Queued delete for uuid={} remote_id={:?}", uuid, remote_id);
    Ok(DeleteDisposition::Queued)
}

/// Discards the local copy of a record, whatever its state
pub fn delete_local_record(conn: &Connection, uuid: &str) -> Result<(), AppError> {
    if !record_store::remove_record(conn, uuid)? {
        return Err(AppError::NotFound(format!(
            "Failed to delete local edit with uuid={}",
            uuid
        )));
    }
    Ok(())
}

/// `systemError -> waiting` for every failed record
pub fn retry_failed_records(conn: &Connection) -> Result<usize, AppError> {
    let mut count = 0;
    for mut record in record_store::list_records(conn)? {
        if record.processing_outcome() == ProcessingOutcome::SystemError {
            record.wow_meta.processing_outcome = ProcessingOutcome::Waiting;
            record_store::put_record(conn, &record)?;
            count += 1;
        }
    }
    if count > 0 {
        log::info!("Reset {} failed records to waiting", count);
    }
    Ok(count)
}

fn is_echoed(remote_updated_at: Option<&str>, wow_updated_at: Option<&str>) -> bool {
    let (remote, local) = match (remote_updated_at, wow_updated_at) {
        (_, None) => return true,
        (None, Some(_)) => return false,
        (Some(r), Some(l)) => (r, l),
    };
    match (
        DateTime::parse_from_rfc3339(remote),
        DateTime::parse_from_rfc3339(local),
    ) {
        (Ok(r), Ok(l)) => r >= l,
        _ => remote >= local,
    }
}

/// Drops local records the remote list already reflects and promotes blocked
/// actions behind completed operations
pub fn clean_successful_records_remote_has_echoed(
    conn: &Connection,
    remote: &[Observation],
) -> Result<CleanupStats, AppError> {
    let remote_by_uuid: HashMap<&str, &Observation> =
        remote.iter().map(|o| (o.uuid.as_str(), o)).collect();
    let mut stats = CleanupStats::default();

    for record in record_store::list_records(conn)? {
        let uuid = record.uuid();
        let on_remote = remote_by_uuid.get(uuid);
        let outcome = record.processing_outcome();

        if outcome == ProcessingOutcome::Success && record.has_blocked_action() {
            if promote_blocked_action(conn, uuid)? == Promotion::Promoted {
                stats.promoted += 1;
            } else {
                stats.removed += 1;
            }
            continue;
        }

        let remove = match (outcome, record.record_type()) {
            (ProcessingOutcome::Success, RecordType::New) => on_remote.is_some(),
            (ProcessingOutcome::Success, RecordType::Edit) => on_remote
                .map(|r| {
                    is_echoed(
                        r.updated_at.as_deref(),
                        record.wow_meta.change.wow_updated_at.as_deref(),
                    )
                })
                .unwrap_or(false),
            (ProcessingOutcome::Success | ProcessingOutcome::SystemError, RecordType::Delete) => {
                on_remote.is_none()
            }
            _ => false,
        };

        if remove {
            record_store::remove_record(conn, uuid)?;
            log::debug!("Remote has echoed uuid={}, local copy removed", uuid);
            stats.removed += 1;
        }
    }

    Ok(stats)
}
