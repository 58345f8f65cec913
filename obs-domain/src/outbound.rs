use crate::models::{base64_bytes, LocalPhoto, Record, RecordType};
use serde::{Deserialize, Serialize};

/// Request bodies derived from one local record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMapping {
    pub observation_post_body: ObservationPostBody,
    pub photo_post_body_partials: Vec<PhotoPostBodyPartial>,
    pub obs_field_post_body_partials: Vec<ObsFieldPostBodyPartial>,
    /// Parent request plus one per pending photo and field value, for progress display
    pub total_task_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationPostBody {
    pub ignore_photos: bool,
    pub observation: ObservationBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObservationBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species_guess: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captive_flag: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoprivacy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_on_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positional_accuracy: Option<i64>,
}

/// Photo payload staged until the parent exists on the remote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoPostBodyPartial {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub mime: String,
    /// Sent as the multipart filename so the photo type survives the upload
    pub wow_type: String,
}

impl From<&LocalPhoto> for PhotoPostBodyPartial {
    fn from(photo: &LocalPhoto) -> Self {
        Self {
            data: photo.file.data.clone(),
            mime: photo.file.mime.clone(),
            wow_type: photo.photo_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObsFieldPostBodyPartial {
    pub observation_field_id: i64,
    pub value: serde_json::Value,
}

/// Builds the outbound request bodies for a record.
///
/// Returns `None` for delete records: a delete needs no body. The parent body
/// sets `ignore_photos` because photos travel as separate dependent uploads.
/// Only photos in `photosToAdd` are mapped, remote photos are already there.
/// Every field value is mapped since field values clobber on the remote.
pub fn map_outbound(record: &Record) -> Option<OutboundMapping> {
    let record_type = record.record_type();
    if record_type == RecordType::Delete {
        return None;
    }

    let obs = &record.obs;
    let observation = ObservationBody {
        id: match record_type {
            RecordType::Edit => obs.remote_id,
            _ => None,
        },
        uuid: obs.uuid.clone(),
        species_guess: obs.species_guess.clone(),
        captive_flag: obs.captive_flag,
        description: obs.description.clone(),
        geoprivacy: obs.geoprivacy.clone(),
        latitude: obs.lat,
        longitude: obs.lng,
        observed_on_string: obs.observed_at.clone(),
        positional_accuracy: obs.positional_accuracy,
    };

    let photo_post_body_partials: Vec<PhotoPostBodyPartial> = record
        .wow_meta
        .change
        .photos_to_add
        .iter()
        .map(PhotoPostBodyPartial::from)
        .collect();

    let obs_field_post_body_partials: Vec<ObsFieldPostBodyPartial> = obs
        .obs_field_values
        .iter()
        .map(|f| ObsFieldPostBodyPartial {
            observation_field_id: f.field_id,
            value: f.value.clone(),
        })
        .collect();

    let total_task_count = 1 + photo_post_body_partials.len() + obs_field_post_body_partials.len();

    Some(OutboundMapping {
        observation_post_body: ObservationPostBody {
            ignore_photos: true,
            observation,
        },
        photo_post_body_partials,
        obs_field_post_body_partials,
        total_task_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ObsFieldValue, Observation, Photo, PhotoFile, RemotePhoto};
    use serde_json::json;

    fn local_photo(id: i64) -> LocalPhoto {
        LocalPhoto::new(
            id,
            PhotoFile {
                data: vec![0xff, 0xd8, id.unsigned_abs() as u8],
                mime: "image/jpeg".to_string(),
            },
            "habitat",
        )
    }

    #[test]
    fn test_map_top_level_properties() {
        let mut obs = Observation::new("111A");
        obs.species_guess = Some("some species".to_string());
        obs.description = Some("some desc".to_string());
        obs.captive_flag = Some(false);
        obs.lat = Some(-35.123);
        obs.lng = Some(138.123);
        obs.geoprivacy = Some("obscured".to_string());
        obs.observed_at = Some("2020-01-03T05:18:10.702Z".to_string());
        obs.positional_accuracy = Some(1234);
        let record = Record::new(obs, RecordType::New);

        let result = map_outbound(&record).unwrap();
        assert!(result.photo_post_body_partials.is_empty());
        assert!(result.obs_field_post_body_partials.is_empty());
        assert_eq!(result.total_task_count, 1);
        assert_eq!(
            serde_json::to_value(&result.observation_post_body).unwrap(),
            json!({
                "ignore_photos": true,
                "observation": {
                    "uuid": "111A",
                    "species_guess": "some species",
                    "captive_flag": false,
                    "description": "some desc",
                    "geoprivacy": "obscured",
                    "latitude": -35.123,
                    "longitude": 138.123,
                    "observed_on_string": "2020-01-03T05:18:10.702Z",
                    "positional_accuracy": 1234
                }
            })
        );
    }

    #[test]
    fn test_map_delete_record_is_empty() {
        let mut obs = Observation::new("d3635120-1669-11ea-bce5-695a028863dd");
        obs.remote_id = Some(544);
        let record = Record::new(obs, RecordType::Delete);
        assert_eq!(map_outbound(&record), None);
    }

    #[test]
    fn test_map_pending_photos_only() {
        let mut obs = Observation::new("111A");
        obs.photos = vec![
            Photo::Remote(RemotePhoto {
                is_remote: true,
                id: 9,
                uuid: None,
                url: "http://example.com/9.jpg".to_string(),
                license_code: None,
                attribution: None,
            }),
            Photo::Local(local_photo(-1)),
            Photo::Local(local_photo(-2)),
        ];
        let mut record = Record::new(obs, RecordType::New);
        record.wow_meta.change.photos_to_add = vec![local_photo(-1), local_photo(-2)];

        let result = map_outbound(&record).unwrap();
        assert_eq!(result.photo_post_body_partials.len(), 2);
        assert_eq!(result.photo_post_body_partials[0].wow_type, "habitat");
        assert_eq!(result.photo_post_body_partials[1].data, vec![0xff, 0xd8, 2]);
        assert_eq!(result.total_task_count, 3);
    }

    #[test]
    fn test_map_obs_fields() {
        let mut obs = Observation::new("111A");
        obs.obs_field_values = vec![ObsFieldValue {
            field_id: 11,
            relationship_id: None,
            datatype: None,
            name: None,
            value: json!("blah"),
        }];
        let record = Record::new(obs, RecordType::New);

        let result = map_outbound(&record).unwrap();
        assert_eq!(
            result.obs_field_post_body_partials,
            vec![ObsFieldPostBodyPartial {
                observation_field_id: 11,
                value: json!("blah"),
            }]
        );
        assert_eq!(result.total_task_count, 2);
    }

    #[test]
    fn test_edit_body_carries_remote_id() {
        let mut obs = Observation::new("111A");
        obs.remote_id = Some(42);
        let record = Record::new(obs.clone(), RecordType::Edit);
        let result = map_outbound(&record).unwrap();
        assert_eq!(result.observation_post_body.observation.id, Some(42));

        let record = Record::new(obs, RecordType::New);
        let result = map_outbound(&record).unwrap();
        assert_eq!(result.observation_post_body.observation.id, None);
    }
}
