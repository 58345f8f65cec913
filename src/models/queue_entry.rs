use obs_domain::base64_bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Synthetic requests under this prefix are never sent over the network
pub const POISON_PILL_URL_PREFIX: &str = "http://local.poison-pill";
/// Marks the end of the dependents of an observation update
pub const OBS_PUT_POISON_PILL_URL: &str = "http://local.poison-pill/obs-put";

/// Bookkeeping for callbacks. Never used to address the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub obs_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Delete,
    /// Private token of the poison pill completion marker
    Magic,
}

impl HttpMethod {
    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Magic => "MAGIC",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RequestBody {
    Json { value: serde_json::Value },
    Multipart { parts: Vec<MultipartPart> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MultipartPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        mime: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

/// An outbound HTTP request in persistable form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedRequest {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,
}

impl QueuedRequest {
    /// Request without a body (DELETE, poison pill)
    pub fn bare(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn json(method: HttpMethod, url: impl Into<String>, value: serde_json::Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            method,
            url: url.into(),
            headers,
            body: Some(RequestBody::Json { value }),
        }
    }

    /// The transport sets the multipart content type with its boundary
    pub fn multipart(url: impl Into<String>, parts: Vec<MultipartPart>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: BTreeMap::new(),
            body: Some(RequestBody::Multipart { parts }),
        }
    }

    pub fn poison_pill(url: impl Into<String>) -> Self {
        Self::bare(HttpMethod::Magic, url)
    }

    pub fn is_poison_pill(&self) -> bool {
        self.url.starts_with(POISON_PILL_URL_PREFIX)
    }

    pub fn json_body(&self) -> Option<&serde_json::Value> {
        match &self.body {
            Some(RequestBody::Json { value }) => Some(value),
            _ => None,
        }
    }
}

/// Persisted queue entry: `{ metadata: { obsUuid, obsId? }, request }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub metadata: EntryMetadata,
    pub request: QueuedRequest,
}

impl QueueEntry {
    pub fn new(obs_uuid: impl Into<String>, obs_id: Option<i64>, request: QueuedRequest) -> Self {
        Self {
            metadata: EntryMetadata {
                obs_uuid: obs_uuid.into(),
                obs_id,
            },
            request,
        }
    }

    pub fn describe(&self) -> String {
        format!("{} {}", self.request.method.as_str(), self.request.url)
    }
}
