use obs_domain::{ObsFieldPostBodyPartial, ObservationPostBody, PhotoPostBodyPartial};
use serde::{Deserialize, Serialize};

/// Which parent operation a staged dependency record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingTag {
    Create,
    Update,
}

impl StagingTag {
    pub fn prefix(&self) -> &str {
        match self {
            StagingTag::Create => "create:",
            StagingTag::Update => "update:",
        }
    }

    pub fn key(&self, obs_uuid: &str) -> String {
        format!("{}{}", self.prefix(), obs_uuid)
    }
}

/// Children of a parent request, held until the parent succeeds.
/// Written once when the bundle is queued and removed once the dependents are queued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StagedDeps {
    pub obs_uuid: String,
    #[serde(default)]
    pub photos: Vec<PhotoPostBodyPartial>,
    #[serde(default)]
    pub obs_fields: Vec<ObsFieldPostBodyPartial>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub deleted_photo_ids: Vec<i64>,
    #[serde(default)]
    pub deleted_obs_field_ids: Vec<i64>,
}

/// Parent body plus its children, for a record never sent before
#[derive(Debug, Clone, PartialEq)]
pub struct CreateBundle {
    pub observation: ObservationPostBody,
    pub photos: Vec<PhotoPostBodyPartial>,
    pub obs_fields: Vec<ObsFieldPostBodyPartial>,
    pub project_id: Option<i64>,
}

/// Parent body plus its children for a record that already exists remotely
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBundle {
    pub observation: ObservationPostBody,
    pub photos: Vec<PhotoPostBodyPartial>,
    pub obs_fields: Vec<ObsFieldPostBodyPartial>,
    pub deleted_photo_ids: Vec<i64>,
    pub deleted_obs_field_ids: Vec<i64>,
}

/// What was queued for a bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleReceipt {
    pub obs_uuid: String,
    pub photo_count: usize,
    pub obs_field_count: usize,
    pub deleted_photo_count: usize,
    pub deleted_obs_field_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
}

impl From<&StagedDeps> for BundleReceipt {
    fn from(deps: &StagedDeps) -> Self {
        Self {
            obs_uuid: deps.obs_uuid.clone(),
            photo_count: deps.photos.len(),
            obs_field_count: deps.obs_fields.len(),
            deleted_photo_count: deps.deleted_photo_ids.len(),
            deleted_obs_field_count: deps.deleted_obs_field_ids.len(),
            project_id: deps.project_id,
        }
    }
}
