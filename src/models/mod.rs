pub mod queue_entry;
pub mod staged_deps;
pub mod status;

pub use obs_domain::{
    BlockedAction, CreatedObservation, LocalPhoto, ObsFieldValue, Observation, PendingChange,
    Photo, PhotoFile, ProcessingOutcome, Record, RecordType, RemotePhoto, WowMeta,
};
pub use queue_entry::{
    EntryMetadata, HttpMethod, MultipartPart, QueueEntry, QueuedRequest, RequestBody,
    OBS_PUT_POISON_PILL_URL, POISON_PILL_URL_PREFIX,
};
pub use staged_deps::{BundleReceipt, CreateBundle, StagedDeps, StagingTag, UpdateBundle};
pub use status::{HealthSnapshot, LocalQueue, QueueStatus, QueueSummaryEntry};
