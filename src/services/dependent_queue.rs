//! Callbacks for the queue of photo, field value and linkage requests.

use crate::database::{self, SharedConnection};
use crate::error::AppError;
use crate::models::{ProcessingOutcome, QueueEntry};
use crate::services::notifier::{ClientMessage, Notifier};
use crate::services::ops::DependentOp;
use crate::services::record_queue;
use crate::services::record_store;
use crate::services::replay::{ErrorDisposition, ReplayHandler};
use crate::services::transport::HttpResponse;

pub struct DependentHandler<'a> {
    pub db: &'a SharedConnection,
    pub notifier: &'a Notifier,
}

impl DependentHandler<'_> {
    fn set_outcome(&self, uuid: &str, outcome: ProcessingOutcome) -> Result<(), AppError> {
        let conn = database::lock(self.db)?;
        record_store::set_processing_outcome(&conn, uuid, outcome)?;
        Ok(())
    }

    fn fail(&self, uuid: &str) -> Result<(), AppError> {
        self.set_outcome(uuid, ProcessingOutcome::SystemError)?;
        self.notifier.notify(ClientMessage::RefreshLocalQueue);
        Ok(())
    }
}

impl ReplayHandler for DependentHandler<'_> {
    fn on_success(
        &self,
        entry: &QueueEntry,
        _response: Option<&HttpResponse>,
    ) -> Result<(), AppError> {
        match DependentOp::classify(&entry.request)? {
            DependentOp::LinkageComplete | DependentOp::UpdateComplete => {
                log::info!(
                    "All dependents of uuid={} replayed, record synced",
                    entry.metadata.obs_uuid
                );
                let promoted = {
                    let conn = database::lock(self.db)?;
                    record_queue::complete_active_action(&conn, &entry.metadata.obs_uuid)?
                };
                self.notifier.notify(ClientMessage::RefreshObs);
                if promoted.is_some() {
                    self.notifier.notify(ClientMessage::RefreshLocalQueue);
                }
            }
            DependentOp::PhotoAdd
            | DependentOp::FieldAdd
            | DependentOp::PhotoDelete { .. }
            | DependentOp::FieldDelete { .. } => {}
        }
        Ok(())
    }

    fn on_error(
        &self,
        entry: &QueueEntry,
        response: &HttpResponse,
    ) -> Result<ErrorDisposition, AppError> {
        let op = DependentOp::classify(&entry.request)?;
        if let DependentOp::PhotoDelete { id } | DependentOp::FieldDelete { id } = op {
            if response.status == 404 {
                log::debug!("Dependent id={} already gone on the remote", id);
                return Ok(ErrorDisposition::Continue);
            }
        }

        log::warn!(
            "'{}' failed with status={} for uuid={}, skipping its remaining dependents",
            entry.describe(),
            response.status,
            entry.metadata.obs_uuid
        );
        self.fail(&entry.metadata.obs_uuid)?;
        Ok(ErrorDisposition::IgnoreRemaining)
    }

    fn on_unsendable(&self, entry: &QueueEntry, _error: &AppError) -> Result<(), AppError> {
        self.fail(&entry.metadata.obs_uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BlockedAction, HttpMethod, Observation, PendingChange, QueuedRequest, Record, RecordType,
        OBS_PUT_POISON_PILL_URL,
    };

    fn setup() -> (SharedConnection, Notifier) {
        let db = database::open_in_memory().unwrap();
        {
            let conn = database::lock(&db).unwrap();
            let mut record = Record::new(Observation::new("123A"), RecordType::Edit);
            record.wow_meta.processing_outcome = ProcessingOutcome::WithServiceWorker;
            record_store::put_record(&conn, &record).unwrap();
        }
        (db, Notifier::default())
    }

    fn outcome(db: &SharedConnection) -> ProcessingOutcome {
        let conn = database::lock(db).unwrap();
        record_store::get_record(&conn, "123A")
            .unwrap()
            .unwrap()
            .processing_outcome()
    }

    fn entry(method: HttpMethod, url: &str) -> QueueEntry {
        QueueEntry::new("123A", Some(42), QueuedRequest::bare(method, url))
    }

    #[test]
    fn test_poison_pill_completes_record() {
        let (db, notifier) = setup();
        let mut rx = notifier.subscribe();
        let handler = DependentHandler {
            db: &db,
            notifier: &notifier,
        };

        let pill = QueueEntry::new("123A", Some(42), QueuedRequest::poison_pill(OBS_PUT_POISON_PILL_URL));
        handler.on_success(&pill, None).unwrap();

        assert_eq!(outcome(&db), ProcessingOutcome::Success);
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::RefreshObs);
    }

    #[test]
    fn test_linkage_promotes_blocked_edit() {
        let (db, notifier) = setup();
        {
            let conn = database::lock(&db).unwrap();
            let mut record = record_store::get_record(&conn, "123A").unwrap().unwrap();
            let mut edited = Observation::new("123A");
            edited.species_guess = Some("Orchid".to_string());
            record.wow_meta.blocked_action = Some(Box::new(BlockedAction {
                obs: edited,
                wow_meta: PendingChange::new(RecordType::Edit),
            }));
            record_store::put_record(&conn, &record).unwrap();
        }
        let mut rx = notifier.subscribe();
        let handler = DependentHandler {
            db: &db,
            notifier: &notifier,
        };

        handler
            .on_success(
                &entry(HttpMethod::Post, "https://api.test/project_observations"),
                Some(&HttpResponse::new(200, b"{}".to_vec())),
            )
            .unwrap();

        assert_eq!(outcome(&db), ProcessingOutcome::Waiting);
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::RefreshObs);
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::RefreshLocalQueue);
        let conn = database::lock(&db).unwrap();
        let record = record_store::get_record(&conn, "123A").unwrap().unwrap();
        assert_eq!(record.obs.species_guess.as_deref(), Some("Orchid"));
        assert!(!record.has_blocked_action());
    }

    #[test]
    fn test_unsendable_dependent_fails_parent() {
        let (db, notifier) = setup();
        let handler = DependentHandler {
            db: &db,
            notifier: &notifier,
        };
        handler
            .on_unsendable(
                &entry(HttpMethod::Post, "https://api.test/observation_photos"),
                &AppError::Programmer("Invalid mime type".to_string()),
            )
            .unwrap();
        assert_eq!(outcome(&db), ProcessingOutcome::SystemError);
    }

    #[test]
    fn test_photo_success_leaves_record_in_flight() {
        let (db, notifier) = setup();
        let handler = DependentHandler {
            db: &db,
            notifier: &notifier,
        };
        handler
            .on_success(
                &entry(HttpMethod::Post, "https://api.test/observation_photos"),
                Some(&HttpResponse::new(200, b"{}".to_vec())),
            )
            .unwrap();
        assert_eq!(outcome(&db), ProcessingOutcome::WithServiceWorker);
    }

    #[test]
    fn test_missing_dependent_delete_is_fine() {
        let (db, notifier) = setup();
        let handler = DependentHandler {
            db: &db,
            notifier: &notifier,
        };
        let disposition = handler
            .on_error(
                &entry(HttpMethod::Delete, "https://api.test/observation_field_values/6"),
                &HttpResponse::new(404, Vec::new()),
            )
            .unwrap();
        assert_eq!(disposition, ErrorDisposition::Continue);
        assert_eq!(outcome(&db), ProcessingOutcome::WithServiceWorker);
    }

    #[test]
    fn test_dependent_error_fails_parent() {
        let (db, notifier) = setup();
        let mut rx = notifier.subscribe();
        let handler = DependentHandler {
            db: &db,
            notifier: &notifier,
        };
        let disposition = handler
            .on_error(
                &entry(HttpMethod::Post, "https://api.test/observation_photos"),
                &HttpResponse::new(422, Vec::new()),
            )
            .unwrap();
        assert_eq!(disposition, ErrorDisposition::IgnoreRemaining);
        assert_eq!(outcome(&db), ProcessingOutcome::SystemError);
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::RefreshLocalQueue);
    }
}
