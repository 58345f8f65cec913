//! # Observation Domain
//!
//! The local observation record and the pure mapping functions between that
//! record and the remote API's JSON shape.
//!
//! This crate does no I/O. It provides:
//! - The `Record` model with its synchronization metadata (`wowMeta`)
//! - `map_outbound`: local record to request bodies for the parent create/update
//!   and the dependent photo and field-value writes
//! - `map_inbound`: remote API observation to local domain shape
//! - `extract_geolocation_text`: the human readable location shown for a record
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use obs_domain::{map_outbound, Record};
//!
//! let record: Record = serde_json::from_str(stored_json)?;
//! if let Some(mapping) = map_outbound(&record) {
//!     println!("{} requests to send", mapping.total_task_count);
//! }
//! ```

pub mod inbound;
pub mod models;
pub mod outbound;

pub use inbound::{
    extract_geolocation_text, map_inbound, ApiObservation, CreatedObservation,
    NO_PLACE_GUESS_TEXT,
};
pub use models::{
    base64_bytes, BlockedAction, LocalPhoto, ObsFieldValue, Observation, PendingChange, Photo,
    PhotoFile, ProcessingOutcome, Record, RecordType, RemotePhoto, WowMeta,
};
pub use outbound::{
    map_outbound, ObsFieldPostBodyPartial, ObservationBody, ObservationPostBody,
    OutboundMapping, PhotoPostBodyPartial,
};
