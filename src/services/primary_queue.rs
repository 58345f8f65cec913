//! Callbacks for the queue of parent observation requests.

use crate::database::{self, SharedConnection};
use crate::error::AppError;
use crate::models::{CreatedObservation, ProcessingOutcome, QueueEntry, StagingTag};
use crate::services::dependents;
use crate::services::notifier::{ClientMessage, Notifier};
use crate::services::ops::ParentOp;
use crate::services::record_queue;
use crate::services::record_store;
use crate::services::replay::{ErrorDisposition, ReplayHandler};
use crate::services::transport::HttpResponse;

pub struct PrimaryHandler<'a> {
    pub db: &'a SharedConnection,
    pub notifier: &'a Notifier,
    pub api_base: &'a str,
    pub dependent_queue: &'a str,
    /// Called after a parent's dependents were queued
    pub on_dependents_queued: &'a (dyn Fn() + Send + Sync),
}

fn staging_tag(op: &ParentOp) -> Option<StagingTag> {
    match op {
        ParentOp::Create => Some(StagingTag::Create),
        ParentOp::Update { .. } => Some(StagingTag::Update),
        ParentOp::Delete { .. } => None,
    }
}

impl PrimaryHandler<'_> {
    /// Marks the record failed. Staged children are dropped, they are staged
    /// again when the record is retried.
    fn fail(&self, uuid: &str, tag: Option<StagingTag>) -> Result<(), AppError> {
        let conn = database::lock(self.db)?;
        record_store::set_processing_outcome(&conn, uuid, ProcessingOutcome::SystemError)?;
        if let Some(tag) = tag {
            record_store::remove_staged(&conn, tag, uuid)?;
        }
        drop(conn);
        self.notifier.notify(ClientMessage::RefreshLocalQueue);
        Ok(())
    }

    fn deleted(&self, uuid: &str) -> Result<(), AppError> {
        let promoted = {
            let conn = database::lock(self.db)?;
            record_queue::complete_active_action(&conn, uuid)?
        };
        self.notifier.notify(ClientMessage::RefreshObs);
        if promoted.is_some() {
            self.notifier.notify(ClientMessage::RefreshLocalQueue);
        }
        Ok(())
    }

    fn queue_children(
        &self,
        entry: &QueueEntry,
        response: Option<&HttpResponse>,
        tag: StagingTag,
    ) -> Result<(), AppError> {
        let response = response.ok_or_else(|| {
            AppError::Programmer(format!("No response for parent '{}'", entry.describe()))
        })?;
        let created: CreatedObservation = response.json()?;
        let uuid = entry.metadata.obs_uuid.as_str();

        if tag == StagingTag::Create {
            let conn = database::lock(self.db)?;
            record_store::set_remote_id(&conn, uuid, created.id)?;
        }
        dependents::queue_dependents(
            self.db,
            self.api_base,
            self.dependent_queue,
            tag,
            uuid,
            &created,
        )?;
        (self.on_dependents_queued)();
        Ok(())
    }

    /// A parent the remote accepted but whose children could not be queued is
    /// failed, so the user can retry it. Only a failure to record that is returned.
    fn parent_saved(
        &self,
        entry: &QueueEntry,
        response: Option<&HttpResponse>,
        tag: StagingTag,
    ) -> Result<(), AppError> {
        if let Err(e) = self.queue_children(entry, response, tag) {
            log::error!(
                "Could not queue dependents of '{}' for uuid={}: {}",
                entry.describe(),
                entry.metadata.obs_uuid,
                e
            );
            self.fail(&entry.metadata.obs_uuid, Some(tag))?;
        }
        Ok(())
    }
}

impl ReplayHandler for PrimaryHandler<'_> {
    fn on_success(
        &self,
        entry: &QueueEntry,
        response: Option<&HttpResponse>,
    ) -> Result<(), AppError> {
        match ParentOp::classify(&entry.request)? {
            ParentOp::Create => self.parent_saved(entry, response, StagingTag::Create),
            ParentOp::Update { .. } => self.parent_saved(entry, response, StagingTag::Update),
            ParentOp::Delete { id } => {
                log::info!("Remote observation id={} deleted", id);
                self.deleted(&entry.metadata.obs_uuid)
            }
        }
    }

    fn on_error(
        &self,
        entry: &QueueEntry,
        response: &HttpResponse,
    ) -> Result<ErrorDisposition, AppError> {
        let uuid = entry.metadata.obs_uuid.as_str();
        let op = ParentOp::classify(&entry.request)?;
        match op {
            ParentOp::Delete { id } if response.status == 404 => {
                log::info!("Remote observation id={} was already deleted", id);
                self.deleted(uuid)?;
            }
            ParentOp::Delete { .. } => {
                log::warn!(
                    "'{}' failed with status={} for uuid={}",
                    entry.describe(),
                    response.status,
                    uuid
                );
                self.fail(uuid, None)?;
            }
            ParentOp::Create | ParentOp::Update { .. } => {
                log::warn!(
                    "'{}' failed with status={} for uuid={}, body={}",
                    entry.describe(),
                    response.status,
                    uuid,
                    String::from_utf8_lossy(&response.body)
                );
                self.fail(uuid, staging_tag(&op))?;
            }
        }
        Ok(ErrorDisposition::Continue)
    }

    fn on_unsendable(&self, entry: &QueueEntry, _error: &AppError) -> Result<(), AppError> {
        let tag = ParentOp::classify(&entry.request)
            .ok()
            .and_then(|op| staging_tag(&op));
        self.fail(&entry.metadata.obs_uuid, tag)
    }
}
