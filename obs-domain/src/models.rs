use serde::{Deserialize, Serialize};

/// Which parent operation a record currently represents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RecordType {
    New,
    Edit,
    Delete,
}

impl RecordType {
    pub fn as_str(&self) -> &str {
        match self {
            RecordType::New => "new",
            RecordType::Edit => "edit",
            RecordType::Delete => "delete",
        }
    }
}

/// Lifecycle stage of a record
///
/// `waiting -> withServiceWorker -> success | systemError`, and
/// `systemError -> waiting` on retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ProcessingOutcome {
    Waiting,
    WithServiceWorker,
    Success,
    SystemError,
}

impl ProcessingOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            ProcessingOutcome::Waiting => "waiting",
            ProcessingOutcome::WithServiceWorker => "withServiceWorker",
            ProcessingOutcome::Success => "success",
            ProcessingOutcome::SystemError => "systemError",
        }
    }
}

/// Domain fields of an observation, shared by the active record and its blocked action
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub uuid: String,
    /// Assigned by the server on the first successful create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species_guess: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoprivacy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positional_accuracy: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captive_flag: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_guess: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geolocation_text: Option<String>,
    /// Remote `updated_at`, only present on inbound records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub obs_field_values: Vec<ObsFieldValue>,
    #[serde(default)]
    pub photos: Vec<Photo>,
}

impl Observation {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Default::default()
        }
    }
}

/// A custom field value attached to an observation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObsFieldValue {
    pub field_id: i64,
    /// Id of the field value itself on the remote, needed to delete it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: serde_json::Value,
}

/// Photo descriptor: either already on the server or waiting for upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Photo {
    Remote(RemotePhoto),
    Local(LocalPhoto),
}

impl Photo {
    pub fn id(&self) -> i64 {
        match self {
            Photo::Remote(p) => p.id,
            Photo::Local(p) => p.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemotePhoto {
    pub is_remote: bool,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
}

/// Pending photo. The negative `id` is a placeholder that only gives the UI a
/// stable key until the server assigns a real one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalPhoto {
    pub id: i64,
    pub file: PhotoFile,
    #[serde(rename = "type")]
    pub photo_type: String,
    pub license_code: String,
    pub attribution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl LocalPhoto {
    pub fn new(id: i64, file: PhotoFile, photo_type: impl Into<String>) -> Self {
        Self {
            id,
            file,
            photo_type: photo_type.into(),
            license_code: "default".to_string(),
            attribution: "default".to_string(),
            url: Some("(set at render time)".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoFile {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub mime: String,
}

/// The part of `wowMeta` that describes a pending mutation. The blocked action
/// carries only this, so it cannot nest a further blocked action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub record_type: RecordType,
    #[serde(default)]
    pub photos_to_add: Vec<LocalPhoto>,
    #[serde(default)]
    pub photo_ids_to_delete: Vec<i64>,
    #[serde(default)]
    pub obs_field_ids_to_delete: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wow_updated_at: Option<String>,
}

impl PendingChange {
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            photos_to_add: Vec::new(),
            photo_ids_to_delete: Vec::new(),
            obs_field_ids_to_delete: Vec::new(),
            wow_updated_at: None,
        }
    }
}

/// Synchronization metadata of a stored record, never sent to the remote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WowMeta {
    #[serde(flatten)]
    pub change: PendingChange,
    pub processing_outcome: ProcessingOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_action: Option<Box<BlockedAction>>,
}

impl WowMeta {
    pub fn waiting(record_type: RecordType) -> Self {
        Self {
            change: PendingChange::new(record_type),
            processing_outcome: ProcessingOutcome::Waiting,
            blocked_action: None,
        }
    }
}

/// A second mutation captured while the first one is still in flight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockedAction {
    #[serde(flatten)]
    pub obs: Observation,
    pub wow_meta: PendingChange,
}

/// The unit of synchronization as held in the durable record store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(flatten)]
    pub obs: Observation,
    pub wow_meta: WowMeta,
}

impl Record {
    pub fn new(obs: Observation, record_type: RecordType) -> Self {
        Self {
            obs,
            wow_meta: WowMeta::waiting(record_type),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.obs.uuid
    }

    pub fn record_type(&self) -> RecordType {
        self.wow_meta.change.record_type
    }

    pub fn processing_outcome(&self) -> ProcessingOutcome {
        self.wow_meta.processing_outcome
    }

    pub fn has_blocked_action(&self) -> bool {
        self.wow_meta.blocked_action.is_some()
    }

    /// True when either the active or the blocked mutation is a delete
    pub fn is_eventually_deleted(&self) -> bool {
        self.record_type() == RecordType::Delete
            || self
                .wow_meta
                .blocked_action
                .as_ref()
                .map(|b| b.wow_meta.record_type == RecordType::Delete)
                .unwrap_or(false)
    }
}

/// Serde helper storing raw bytes as a standard base64 string
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
