pub mod background_sync;
pub mod credential;
pub mod dependent_queue;
pub mod dependents;
pub mod engine;
pub mod kv_store;
pub mod notifier;
pub mod ops;
pub mod primary_queue;
pub mod record_queue;
pub mod record_store;
pub mod replay;
pub mod request_queue;
pub mod transport;

pub use background_sync::BackgroundSync;
pub use engine::SyncEngine;
pub use notifier::ClientMessage;
pub use replay::{DrainOutcome, DrainStats};
