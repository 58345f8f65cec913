use crate::models::{ObsFieldValue, Observation, Photo, RemotePhoto};
use serde::{Deserialize, Serialize};

/// Shown when a record has neither coordinates nor a place guess
pub const NO_PLACE_GUESS_TEXT: &str = "(No place guess)";

/// Prefix the project puts on its observation field names
const FIELD_NAME_PREFIX: &str = "WOW ";

/// Minimal view of the entity returned by a successful create or update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedObservation {
    pub id: i64,
    pub uuid: String,
}

/// The subset of the remote API's observation we map into local shape
#[derive(Debug, Clone, Deserialize)]
pub struct ApiObservation {
    pub id: i64,
    pub uuid: String,
    #[serde(default)]
    pub species_guess: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub geoprivacy: Option<String>,
    #[serde(default)]
    pub positional_accuracy: Option<i64>,
    #[serde(default)]
    pub time_observed_at: Option<String>,
    #[serde(default)]
    pub observed_on: Option<String>,
    #[serde(default)]
    pub captive: Option<bool>,
    #[serde(default)]
    pub place_guess: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub geojson: Option<ApiGeoJson>,
    #[serde(default)]
    pub observation_photos: Vec<ApiObservationPhoto>,
    #[serde(default)]
    pub ofvs: Vec<ApiFieldValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiGeoJson {
    #[serde(default)]
    pub coordinates: Vec<ApiCoordinate>,
}

/// The API has been seen returning coordinates both as numbers and as strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiCoordinate {
    Number(f64),
    Text(String),
}

impl ApiCoordinate {
    fn as_f64(&self) -> Option<f64> {
        match self {
            ApiCoordinate::Number(n) => Some(*n),
            ApiCoordinate::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiObservationPhoto {
    pub id: i64,
    #[serde(default)]
    pub uuid: Option<String>,
    pub photo: ApiPhoto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPhoto {
    pub url: String,
    #[serde(default)]
    pub license_code: Option<String>,
    #[serde(default)]
    pub attribution: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiFieldValue {
    pub id: i64,
    pub field_id: i64,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub observation_field: Option<ApiObservationField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiObservationField {
    pub name: String,
}

/// Converts a remote observation into local domain shape.
///
/// Photos become `isRemote` descriptors, field values keep the remote id as
/// `relationshipId` so they can be deleted later, and the geolocation text is
/// derived from the mapped fields.
pub fn map_inbound(api: ApiObservation) -> Observation {
    let (lng, lat) = match api.geojson.as_ref() {
        Some(geo) if geo.coordinates.len() >= 2 => {
            (geo.coordinates[0].as_f64(), geo.coordinates[1].as_f64())
        }
        _ => (None, None),
    };

    let photos = api
        .observation_photos
        .into_iter()
        .map(|p| {
            Photo::Remote(RemotePhoto {
                is_remote: true,
                id: p.id,
                uuid: p.uuid,
                url: p.photo.url,
                license_code: p.photo.license_code,
                attribution: p.photo.attribution,
            })
        })
        .collect();

    let obs_field_values = api
        .ofvs
        .into_iter()
        .map(|f| ObsFieldValue {
            field_id: f.field_id,
            relationship_id: Some(f.id),
            datatype: f.datatype,
            name: f.observation_field.map(|of| strip_field_prefix(&of.name)),
            value: f.value,
        })
        .collect();

    let mut obs = Observation {
        uuid: api.uuid,
        remote_id: Some(api.id),
        species_guess: api.species_guess,
        lat,
        lng,
        description: api.description,
        geoprivacy: api.geoprivacy,
        positional_accuracy: api.positional_accuracy,
        observed_at: api.time_observed_at.or(api.observed_on),
        captive_flag: api.captive,
        place_guess: api.place_guess,
        geolocation_text: None,
        updated_at: api.updated_at,
        obs_field_values,
        photos,
    };
    obs.geolocation_text = Some(extract_geolocation_text(&obs));
    obs
}

fn strip_field_prefix(name: &str) -> String {
    name.strip_prefix(FIELD_NAME_PREFIX)
        .unwrap_or(name)
        .to_string()
}

/// Coordinates as `"lng,lat"` with 6 decimals, else the place guess, else a placeholder
pub fn extract_geolocation_text(obs: &Observation) -> String {
    if let (Some(lat), Some(lng)) = (obs.lat, obs.lng) {
        return format!("{:.6},{:.6}", lng, lat);
    }
    match obs.place_guess.as_deref() {
        Some(guess) if !guess.trim().is_empty() => guess.to_string(),
        _ => NO_PLACE_GUESS_TEXT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api_record() -> serde_json::Value {
        json!({
            "id": 42,
            "uuid": "765148bd-cd29-4be2-ab5c-6a5e8574561f",
            "species_guess": "a species guess",
            "description": "some notes",
            "positional_accuracy": 3739,
            "captive": false,
            "place_guess": null,
            "updated_at": "2019-07-18T13:45:53+09:30",
            "quality_grade": "casual",
            "geojson": { "type": "Point", "coordinates": ["138.6", "-34.9"] },
            "observation_photos": [
                {
                    "id": 13,
                    "uuid": "d7e2c89a-0741-4ce8-8b9c-c5992bfe6727",
                    "photo": {
                        "id": 14,
                        "license_code": "cc-by-nc",
                        "url": "http://example.com/14/square.jpg",
                        "attribution": "(c) tom, some rights reserved (CC BY-NC)"
                    }
                }
            ],
            "ofvs": [
                {
                    "id": 4,
                    "field_id": 1,
                    "datatype": "text",
                    "name": "WOW Orchid type",
                    "value": "Terrestrial",
                    "observation_field": { "id": 1, "name": "WOW Orchid type" }
                }
            ]
        })
    }

    #[test]
    fn test_map_inbound_everything() {
        let api: ApiObservation = serde_json::from_value(api_record()).unwrap();
        let obs = map_inbound(api);

        assert_eq!(obs.remote_id, Some(42));
        assert_eq!(obs.species_guess.as_deref(), Some("a species guess"));
        assert_eq!(obs.description.as_deref(), Some("some notes"));
        assert_eq!(obs.place_guess, None);
        assert_eq!(obs.lng, Some(138.6));
        assert_eq!(obs.lat, Some(-34.9));
        assert_eq!(
            obs.photos,
            vec![Photo::Remote(RemotePhoto {
                is_remote: true,
                id: 13,
                uuid: Some("d7e2c89a-0741-4ce8-8b9c-c5992bfe6727".to_string()),
                url: "http://example.com/14/square.jpg".to_string(),
                license_code: Some("cc-by-nc".to_string()),
                attribution: Some("(c) tom, some rights reserved (CC BY-NC)".to_string()),
            })]
        );
        assert_eq!(
            obs.obs_field_values,
            vec![ObsFieldValue {
                field_id: 1,
                relationship_id: Some(4),
                datatype: Some("text".to_string()),
                name: Some("Orchid type".to_string()),
                value: json!("Terrestrial"),
            }]
        );
        assert_eq!(obs.geolocation_text.as_deref(), Some("138.600000,-34.900000"));
    }

    #[test]
    fn test_geolocation_text_from_coordinates() {
        let mut obs = Observation::new("A");
        obs.lat = Some(44.12345678);
        obs.lng = Some(33.12345678);
        obs.place_guess = Some("ignored".to_string());
        assert_eq!(extract_geolocation_text(&obs), "33.123457,44.123457");
    }

    #[test]
    fn test_geolocation_text_fallbacks() {
        let mut obs = Observation::new("A");
        obs.place_guess = Some("Adelaide".to_string());
        assert_eq!(extract_geolocation_text(&obs), "Adelaide");

        obs.place_guess = None;
        assert_eq!(extract_geolocation_text(&obs), NO_PLACE_GUESS_TEXT);
    }
}
