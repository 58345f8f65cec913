use crate::error::AppError;
use crate::models::{ProcessingOutcome, Record, RecordType, StagedDeps, StagingTag};
use crate::services::kv_store::{self, RECORD_NAMESPACE, STAGING_NAMESPACE};
use rusqlite::Connection;

pub fn get_record(conn: &Connection, uuid: &str) -> Result<Option<Record>, AppError> {
    kv_store::get(conn, RECORD_NAMESPACE, uuid)
}

pub fn put_record(conn: &Connection, record: &Record) -> Result<(), AppError> {
    if record.obs.uuid.is_empty() {
        return Err(AppError::Validation(
            "Cannot store a record without a uuid".to_string(),
        ));
    }
    kv_store::set(conn, RECORD_NAMESPACE, &record.obs.uuid, record)
}

pub fn remove_record(conn: &Connection, uuid: &str) -> Result<bool, AppError> {
    kv_store::remove(conn, RECORD_NAMESPACE, uuid)
}

pub fn list_records(conn: &Connection) -> Result<Vec<Record>, AppError> {
    kv_store::values(conn, RECORD_NAMESPACE)
}

/// Sets the outcome of a stored record. A missing record is only logged,
/// callbacks for records the user already discarded are expected.
pub fn set_processing_outcome(
    conn: &Connection,
    uuid: &str,
    outcome: ProcessingOutcome,
) -> Result<bool, AppError> {
    let Some(mut record) = get_record(conn, uuid)? else {
        log::warn!(
            "Could not set outcome={} for uuid={}, record not found",
            outcome.as_str(),
            uuid
        );
        return Ok(false);
    };
    log::debug!(
        "Record uuid={} outcome {} -> {}",
        uuid,
        record.processing_outcome().as_str(),
        outcome.as_str()
    );
    record.wow_meta.processing_outcome = outcome;
    put_record(conn, &record)?;
    Ok(true)
}

/// Stores the id the server assigned on create. From then on the record is
/// a remote one, so a retry is sent as an edit.
pub fn set_remote_id(conn: &Connection, uuid: &str, remote_id: i64) -> Result<bool, AppError> {
    let Some(mut record) = get_record(conn, uuid)? else {
        log::warn!("Could not set remote id={} for uuid={}, record not found", remote_id, uuid);
        return Ok(false);
    };
    record.obs.remote_id = Some(remote_id);
    if record.wow_meta.change.record_type == RecordType::New {
        record.wow_meta.change.record_type = RecordType::Edit;
    }
    put_record(conn, &record)?;
    Ok(true)
}

pub fn get_staged(
    conn: &Connection,
    tag: StagingTag,
    uuid: &str,
) -> Result<Option<StagedDeps>, AppError> {
    kv_store::get(conn, STAGING_NAMESPACE, &tag.key(uuid))
}

pub fn put_staged(conn: &Connection, tag: StagingTag, deps: &StagedDeps) -> Result<(), AppError> {
    kv_store::set(conn, STAGING_NAMESPACE, &tag.key(&deps.obs_uuid), deps)
}

pub fn remove_staged(conn: &Connection, tag: StagingTag, uuid: &str) -> Result<bool, AppError> {
    kv_store::remove(conn, STAGING_NAMESPACE, &tag.key(uuid))
}

pub fn staged_count(conn: &Connection) -> Result<usize, AppError> {
    kv_store::count(conn, STAGING_NAMESPACE)
}
