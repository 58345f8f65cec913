//! The sync engine: owns both queues, the record store, the credential and the
//! notifier, and exposes the trigger surface used by the scheduler and the UI.

use crate::config::SyncConfig;
use crate::database::{self, SharedConnection};
use crate::error::AppError;
use crate::models::{
    BundleReceipt, CreateBundle, HealthSnapshot, HttpMethod, LocalQueue, Observation,
    ProcessingOutcome, QueueEntry, QueueStatus, QueuedRequest, Record, RecordType, StagedDeps,
    StagingTag, UpdateBundle,
};
use crate::services::credential::AuthCredential;
use crate::services::dependent_queue::DependentHandler;
use crate::services::notifier::{ClientMessage, Notifier};
use crate::services::primary_queue::PrimaryHandler;
use crate::services::record_queue::{self, CleanupStats, DeleteDisposition, NewPhoto, RecordEdit};
use crate::services::record_store;
use crate::services::replay::{drain_queue, DrainOutcome};
use crate::services::request_queue::{
    self, RequestQueue, DEPENDENT_QUEUE_NAME, PRIMARY_QUEUE_NAME,
};
use crate::services::transport::{HttpTransport, ReqwestTransport};
use obs_domain::{map_outbound, PhotoPostBodyPartial};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct SyncEngine {
    config: SyncConfig,
    db: SharedConnection,
    primary: RequestQueue,
    dependent: RequestQueue,
    transport: Arc<dyn HttpTransport>,
    credential: AuthCredential,
    notifier: Notifier,
}

fn check_photos(photos: &[PhotoPostBodyPartial], uuid: &str) -> Result<(), AppError> {
    // the remote answers an empty upload with 422
    if let Some(photo) = photos.iter().find(|p| p.data.is_empty()) {
        return Err(AppError::Validation(format!(
            "Photo '{}' of uuid={} has no data",
            photo.wow_type, uuid
        )));
    }
    Ok(())
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        db: SharedConnection,
        transport: Arc<dyn HttpTransport>,
    ) -> Arc<Self> {
        let retention = config.max_retention_days;
        Arc::new(Self {
            primary: RequestQueue::new(PRIMARY_QUEUE_NAME, db.clone(), retention),
            dependent: RequestQueue::new(DEPENDENT_QUEUE_NAME, db.clone(), retention),
            config,
            db,
            transport,
            credential: AuthCredential::new(),
            notifier: Notifier::default(),
        })
    }

    /// Opens the configured database and talks to the network through reqwest
    pub fn open(config: SyncConfig) -> Result<Arc<Self>, AppError> {
        config.validate()?;
        let db = database::open_database(&config.database_path)?;
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout_seconds)?);
        Ok(Self::new(config, db, transport))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base(), path)
    }

    // ---- queue producers ----

    /// Stages the children and queues the POST of a record never sent before
    pub fn enqueue_create_bundle(&self, bundle: CreateBundle) -> Result<BundleReceipt, AppError> {
        let uuid = bundle.observation.observation.uuid.clone();
        if uuid.is_empty() {
            return Err(AppError::Validation(
                "Cannot create an observation without a uuid".to_string(),
            ));
        }
        check_photos(&bundle.photos, &uuid)?;
        let project_id = bundle.project_id.or(self.config.project_id).ok_or_else(|| {
            AppError::Validation(format!(
                "No project to link uuid={} to, set project_id in the config",
                uuid
            ))
        })?;

        let staged = StagedDeps {
            obs_uuid: uuid.clone(),
            photos: bundle.photos,
            obs_fields: bundle.obs_fields,
            project_id: Some(project_id),
            deleted_photo_ids: Vec::new(),
            deleted_obs_field_ids: Vec::new(),
        };
        let parent = QueueEntry::new(
            uuid.as_str(),
            None,
            QueuedRequest::json(
                HttpMethod::Post,
                self.url("observations"),
                serde_json::to_value(&bundle.observation)?,
            ),
        );
        self.stage_and_push(StagingTag::Create, &staged, &parent)?;

        log::info!(
            "Queued create for uuid={} with {} photos, {} field values",
            uuid,
            staged.photos.len(),
            staged.obs_fields.len()
        );
        Ok(BundleReceipt::from(&staged))
    }

    /// Stages the children and queues the PUT of a record the remote knows
    pub fn enqueue_update_bundle(&self, bundle: UpdateBundle) -> Result<BundleReceipt, AppError> {
        let uuid = bundle.observation.observation.uuid.clone();
        if uuid.is_empty() {
            return Err(AppError::Validation(
                "Cannot update an observation without a uuid".to_string(),
            ));
        }
        let Some(id) = bundle.observation.observation.id else {
            return Err(AppError::Validation(format!(
                "Cannot update uuid={} without its remote id",
                uuid
            )));
        };
        check_photos(&bundle.photos, &uuid)?;

        let staged = StagedDeps {
            obs_uuid: uuid.clone(),
            photos: bundle.photos,
            obs_fields: bundle.obs_fields,
            project_id: None,
            deleted_photo_ids: bundle.deleted_photo_ids,
            deleted_obs_field_ids: bundle.deleted_obs_field_ids,
        };
        let parent = QueueEntry::new(
            uuid.as_str(),
            Some(id),
            QueuedRequest::json(
                HttpMethod::Put,
                self.url(&format!("observations/{}", id)),
                serde_json::to_value(&bundle.observation)?,
            ),
        );
        self.stage_and_push(StagingTag::Update, &staged, &parent)?;

        log::info!("Queued update for uuid={} (id={})", uuid, id);
        Ok(BundleReceipt::from(&staged))
    }

    fn stage_and_push(
        &self,
        tag: StagingTag,
        staged: &StagedDeps,
        parent: &QueueEntry,
    ) -> Result<(), AppError> {
        let mut conn = database::lock(&self.db)?;
        let tx = conn.transaction()?;
        record_store::put_staged(&tx, tag, staged)?;
        request_queue::push_entry(&tx, self.primary.name(), parent)?;
        tx.commit()?;
        Ok(())
    }

    pub fn enqueue_delete(&self, uuid: &str, remote_id: i64) -> Result<(), AppError> {
        if uuid.is_empty() {
            return Err(AppError::Validation(
                "Cannot delete an observation without a uuid".to_string(),
            ));
        }
        self.primary.push(&QueueEntry::new(
            uuid,
            Some(remote_id),
            QueuedRequest::bare(
                HttpMethod::Delete,
                self.url(&format!("observations/{}", remote_id)),
            ),
        ))?;
        log::info!("Queued delete for uuid={} (id={})", uuid, remote_id);
        Ok(())
    }

    /// Returns false when the record never reached the remote and was simply removed
    fn hand_to_queue(&self, record: &Record) -> Result<bool, AppError> {
        let uuid = record.uuid();
        let change = &record.wow_meta.change;

        if record.record_type() == RecordType::Delete {
            return match record.obs.remote_id {
                Some(id) => self.enqueue_delete(uuid, id).map(|_| true),
                None => {
                    let conn = database::lock(&self.db)?;
                    record_store::remove_record(&conn, uuid)?;
                    log::info!("Dropped never-sent record uuid={} instead of deleting", uuid);
                    Ok(false)
                }
            };
        }

        let mapping = map_outbound(record).ok_or_else(|| {
            AppError::Programmer(format!("No outbound mapping for uuid={}", uuid))
        })?;
        log::debug!(
            "uuid={} maps to {} tasks",
            uuid,
            mapping.total_task_count
        );

        let receipt = match record.record_type() {
            RecordType::New => self.enqueue_create_bundle(CreateBundle {
                observation: mapping.observation_post_body,
                photos: mapping.photo_post_body_partials,
                obs_fields: mapping.obs_field_post_body_partials,
                project_id: None,
            }),
            _ => self.enqueue_update_bundle(UpdateBundle {
                observation: mapping.observation_post_body,
                photos: mapping.photo_post_body_partials,
                obs_fields: mapping.obs_field_post_body_partials,
                deleted_photo_ids: change.photo_ids_to_delete.clone(),
                deleted_obs_field_ids: change.obs_field_ids_to_delete.clone(),
            }),
        }?;
        log::debug!(
            "uuid={} queued with {} photos, {} field values",
            receipt.obs_uuid,
            receipt.photo_count,
            receipt.obs_field_count
        );
        Ok(true)
    }

    /// Hands every waiting record to the queues and marks it in flight.
    /// Returns how many were queued.
    pub fn process_local_queue(&self) -> Result<usize, AppError> {
        let waiting: Vec<Record> = {
            let conn = database::lock(&self.db)?;
            record_store::list_records(&conn)?
                .into_iter()
                .filter(|r| r.processing_outcome() == ProcessingOutcome::Waiting)
                .collect()
        };
        if waiting.is_empty() {
            return Ok(0);
        }

        let mut queued = 0;
        for record in &waiting {
            let uuid = record.uuid();
            self.set_record_processing_outcome(uuid, ProcessingOutcome::WithServiceWorker)?;
            match self.hand_to_queue(record) {
                Ok(true) => queued += 1,
                Ok(false) => {}
                Err(e) => {
                    log::error!("Failed to queue uuid={}: {}", uuid, e);
                    self.set_record_processing_outcome(uuid, ProcessingOutcome::SystemError)?;
                }
            }
        }

        log::info!("Handed {} of {} waiting records to the queue", queued, waiting.len());
        self.notifier.notify(ClientMessage::RefreshLocalQueue);
        Ok(queued)
    }

    // ---- drains ----

    pub async fn sync_primary_queue(self: &Arc<Self>) -> Result<DrainOutcome, AppError> {
        let engine = Arc::clone(self);
        let trigger = move || engine.trigger_dependent_sync();
        let handler = PrimaryHandler {
            db: &self.db,
            notifier: &self.notifier,
            api_base: self.config.api_base(),
            dependent_queue: self.dependent.name(),
            on_dependents_queued: &trigger,
        };
        drain_queue(
            &self.primary,
            self.transport.as_ref(),
            &self.credential,
            &handler,
        )
        .await
    }

    pub async fn sync_dependent_queue(&self) -> Result<DrainOutcome, AppError> {
        let handler = DependentHandler {
            db: &self.db,
            notifier: &self.notifier,
        };
        drain_queue(
            &self.dependent,
            self.transport.as_ref(),
            &self.credential,
            &handler,
        )
        .await
    }

    /// Fire-and-forget dependent drain. Without a runtime the dependents simply
    /// wait for the next scheduled sync.
    pub fn trigger_dependent_sync(self: &Arc<Self>) {
        if !self.config.eager_dependent_sync {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let engine = Arc::clone(self);
                handle.spawn(async move {
                    if let Err(e) = engine.sync_dependent_queue().await {
                        log::warn!("Eager dependent sync failed: {}", e);
                    }
                });
            }
            Err(_) => log::debug!("No async runtime, dependents wait for the next sync"),
        }
    }

    // ---- trigger surface ----

    pub fn update_credential(&self, header: Option<&str>) -> bool {
        self.credential.update_from_header(header)
    }

    pub fn health(&self) -> Result<HealthSnapshot, AppError> {
        let staged_dependency_count = {
            let conn = database::lock(&self.db)?;
            record_store::staged_count(&conn)?
        };
        Ok(HealthSnapshot {
            primary_queue: QueueStatus {
                in_progress: self.primary.is_sync_in_progress(),
                length: self.primary.len()?,
            },
            dependent_queue: QueueStatus {
                in_progress: self.dependent.is_sync_in_progress(),
                length: self.dependent.len()?,
            },
            staged_dependency_count,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.notifier.subscribe()
    }

    // ---- record store ----

    pub fn local_queue(&self) -> Result<LocalQueue, AppError> {
        let conn = database::lock(&self.db)?;
        record_queue::refresh_local_record_queue(&conn)
    }

    pub fn set_record_processing_outcome(
        &self,
        uuid: &str,
        outcome: ProcessingOutcome,
    ) -> Result<bool, AppError> {
        let conn = database::lock(&self.db)?;
        record_store::set_processing_outcome(&conn, uuid, outcome)
    }

    pub fn save_new_record(&self, obs: Observation, photos: Vec<NewPhoto>) -> Result<String, AppError> {
        let uuid = {
            let conn = database::lock(&self.db)?;
            record_queue::save_new_record(&conn, obs, photos)?
        };
        self.notifier.notify(ClientMessage::RefreshLocalQueue);
        Ok(uuid)
    }

    pub fn save_edit(&self, edit: RecordEdit) -> Result<(), AppError> {
        {
            let conn = database::lock(&self.db)?;
            record_queue::save_edit(&conn, edit)?;
        }
        self.notifier.notify(ClientMessage::RefreshLocalQueue);
        Ok(())
    }

    pub fn delete_record(
        &self,
        uuid: &str,
        remote_id: Option<i64>,
    ) -> Result<DeleteDisposition, AppError> {
        let disposition = {
            let conn = database::lock(&self.db)?;
            record_queue::delete_record(&conn, uuid, remote_id)?
        };
        self.notifier.notify(ClientMessage::RefreshLocalQueue);
        Ok(disposition)
    }

    pub fn delete_local_record(&self, uuid: &str) -> Result<(), AppError> {
        {
            let conn = database::lock(&self.db)?;
            record_queue::delete_local_record(&conn, uuid)?;
        }
        self.notifier.notify(ClientMessage::RefreshLocalQueue);
        Ok(())
    }

    pub fn retry_failed_records(&self) -> Result<usize, AppError> {
        let count = {
            let conn = database::lock(&self.db)?;
            record_queue::retry_failed_records(&conn)?
        };
        if count > 0 {
            self.notifier.notify(ClientMessage::RefreshLocalQueue);
        }
        Ok(count)
    }

    pub fn clean_successful_records_remote_has_echoed(
        &self,
        remote: &[Observation],
    ) -> Result<CleanupStats, AppError> {
        let stats = {
            let conn = database::lock(&self.db)?;
            record_queue::clean_successful_records_remote_has_echoed(&conn, remote)?
        };
        if stats != CleanupStats::default() {
            self.notifier.notify(ClientMessage::RefreshLocalQueue);
        }
        Ok(stats)
    }
}
