use crate::database::{self, SharedConnection};
use crate::error::AppError;
use crate::models::{
    CreatedObservation, HttpMethod, MultipartPart, QueueEntry, QueuedRequest, StagedDeps,
    StagingTag, OBS_PUT_POISON_PILL_URL,
};
use crate::services::record_store;
use crate::services::request_queue;
use serde_json::json;

/// Builds the dependent requests of a parent, in replay order: photo POSTs,
/// field-value POSTs, photo DELETEs, field-value DELETEs, then the completion
/// marker (project linkage for a create, the poison pill for an update).
pub fn build_dependent_batch(
    api_base: &str,
    tag: StagingTag,
    deps: &StagedDeps,
    parent: &CreatedObservation,
) -> Result<Vec<QueueEntry>, AppError> {
    let obs_id = parent.id;
    let uuid = deps.obs_uuid.as_str();
    let mut batch = Vec::new();

    for photo in &deps.photos {
        batch.push(QueueEntry::new(
            uuid,
            Some(obs_id),
            QueuedRequest::multipart(
                format!("{}/observation_photos", api_base),
                vec![
                    MultipartPart::Text {
                        name: "observation_photo[observation_id]".to_string(),
                        value: obs_id.to_string(),
                    },
                    // the photo type travels as the filename
                    MultipartPart::File {
                        name: "file".to_string(),
                        filename: photo.wow_type.clone(),
                        mime: photo.mime.clone(),
                        data: photo.data.clone(),
                    },
                ],
            ),
        ));
    }

    for field in &deps.obs_fields {
        batch.push(QueueEntry::new(
            uuid,
            Some(obs_id),
            QueuedRequest::json(
                HttpMethod::Post,
                format!("{}/observation_field_values", api_base),
                json!({
                    "observation_id": obs_id,
                    "observation_field_id": field.observation_field_id,
                    "value": field.value,
                }),
            ),
        ));
    }

    for id in &deps.deleted_photo_ids {
        batch.push(QueueEntry::new(
            uuid,
            Some(obs_id),
            QueuedRequest::bare(
                HttpMethod::Delete,
                format!("{}/observation_photos/{}", api_base, id),
            ),
        ));
    }

    for id in &deps.deleted_obs_field_ids {
        batch.push(QueueEntry::new(
            uuid,
            Some(obs_id),
            QueuedRequest::bare(
                HttpMethod::Delete,
                format!("{}/observation_field_values/{}", api_base, id),
            ),
        ));
    }

    let closing = match tag {
        StagingTag::Create => {
            let project_id = deps.project_id.ok_or_else(|| {
                AppError::Programmer(format!("Staged create for uuid={} has no project id", uuid))
            })?;
            QueuedRequest::json(
                HttpMethod::Post,
                format!("{}/project_observations", api_base),
                json!({
                    "observation_id": obs_id,
                    "project_id": project_id,
                }),
            )
        }
        StagingTag::Update => QueuedRequest::poison_pill(OBS_PUT_POISON_PILL_URL),
    };
    batch.push(QueueEntry::new(uuid, Some(obs_id), closing));

    Ok(batch)
}

/// Reads the staged record for `obs_uuid`, pushes its dependents and removes
/// it, all in one transaction. Returns how many entries were queued.
pub fn queue_dependents(
    db: &SharedConnection,
    api_base: &str,
    dependent_queue: &str,
    tag: StagingTag,
    obs_uuid: &str,
    parent: &CreatedObservation,
) -> Result<usize, AppError> {
    let mut conn = database::lock(db)?;
    let tx = conn.transaction()?;

    let key = tag.key(obs_uuid);
    let deps = record_store::get_staged(&tx, tag, obs_uuid)?.ok_or_else(|| {
        AppError::Programmer(format!(
            "No deps found under key='{}'. We should always have deps!",
            key
        ))
    })?;

    let batch = build_dependent_batch(api_base, tag, &deps, parent)?;
    for entry in &batch {
        request_queue::push_entry(&tx, dependent_queue, entry)?;
    }
    record_store::remove_staged(&tx, tag, obs_uuid)?;
    tx.commit()?;

    log::debug!(
        "Queued {} dependents for uuid={} (remote id={}), staged key='{}' removed",
        batch.len(),
        obs_uuid,
        parent.id,
        key
    );
    Ok(batch.len())
}
