//! Classification of queued requests into the operations the callbacks know.
//! Anything else is a code defect and surfaces as `AppError::Programmer`.

use crate::error::AppError;
use crate::models::{HttpMethod, QueuedRequest, OBS_PUT_POISON_PILL_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentOp {
    Create,
    Update { id: i64 },
    Delete { id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependentOp {
    PhotoAdd,
    FieldAdd,
    PhotoDelete { id: i64 },
    FieldDelete { id: i64 },
    /// Project linkage POST, closes the dependents of a create
    LinkageComplete,
    /// Poison pill, closes the dependents of an update
    UpdateComplete,
}

/// Last two path segments, e.g. `("observations", Some("42"))` or `("observations", None)`
fn resource_path(url: &str) -> Result<(String, Option<String>), AppError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| AppError::Programmer(format!("Unparseable queued url='{}': {}", url, e)))?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [.., collection, last] if last.parse::<i64>().is_ok() => {
            Ok((collection.to_string(), Some(last.to_string())))
        }
        [.., last] => Ok((last.to_string(), None)),
        [] => Ok((String::new(), None)),
    }
}

fn parse_id(id: Option<String>, request: &QueuedRequest) -> Result<i64, AppError> {
    id.and_then(|s| s.parse().ok()).ok_or_else(|| unexpected(request))
}

fn unexpected(request: &QueuedRequest) -> AppError {
    AppError::Programmer(format!(
        "Don't know how to handle method={} url={}",
        request.method.as_str(),
        request.url
    ))
}

impl ParentOp {
    pub fn classify(request: &QueuedRequest) -> Result<Self, AppError> {
        let (collection, id) = resource_path(&request.url)?;
        if collection != "observations" {
            return Err(unexpected(request));
        }
        match (request.method, id) {
            (HttpMethod::Post, None) => Ok(ParentOp::Create),
            (HttpMethod::Put, id @ Some(_)) => Ok(ParentOp::Update {
                id: parse_id(id, request)?,
            }),
            (HttpMethod::Delete, id @ Some(_)) => Ok(ParentOp::Delete {
                id: parse_id(id, request)?,
            }),
            _ => Err(unexpected(request)),
        }
    }
}

impl DependentOp {
    pub fn classify(request: &QueuedRequest) -> Result<Self, AppError> {
        if request.method == HttpMethod::Magic {
            if request.url == OBS_PUT_POISON_PILL_URL {
                return Ok(DependentOp::UpdateComplete);
            }
            return Err(unexpected(request));
        }

        let (collection, id) = resource_path(&request.url)?;
        match (request.method, collection.as_str(), id) {
            (HttpMethod::Post, "observation_photos", None) => Ok(DependentOp::PhotoAdd),
            (HttpMethod::Post, "observation_field_values", None) => Ok(DependentOp::FieldAdd),
            (HttpMethod::Post, "project_observations", None) => Ok(DependentOp::LinkageComplete),
            (HttpMethod::Delete, "observation_photos", id @ Some(_)) => Ok(DependentOp::PhotoDelete {
                id: parse_id(id, request)?,
            }),
            (HttpMethod::Delete, "observation_field_values", id @ Some(_)) => {
                Ok(DependentOp::FieldDelete {
                    id: parse_id(id, request)?,
                })
            }
            _ => Err(unexpected(request)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(method: HttpMethod, url: &str) -> QueuedRequest {
        QueuedRequest::bare(method, url)
    }

    #[test]
    fn test_classify_parent_ops() {
        assert_eq!(
            ParentOp::classify(&req(HttpMethod::Post, "https://api.test/v1/observations")).unwrap(),
            ParentOp::Create
        );
        assert_eq!(
            ParentOp::classify(&req(HttpMethod::Put, "https://api.test/v1/observations/42")).unwrap(),
            ParentOp::Update { id: 42 }
        );
        assert_eq!(
            ParentOp::classify(&req(HttpMethod::Delete, "https://api.test/observations/7")).unwrap(),
            ParentOp::Delete { id: 7 }
        );
    }

    #[test]
    fn test_parent_rejects_unexpected_combinations() {
        for (method, url) in [
            (HttpMethod::Put, "https://api.test/observations"),
            (HttpMethod::Post, "https://api.test/observations/42"),
            (HttpMethod::Post, "https://api.test/observation_photos"),
            (HttpMethod::Magic, "http://local.poison-pill/obs-put"),
        ] {
            assert!(
                matches!(ParentOp::classify(&req(method, url)), Err(AppError::Programmer(_))),
                "{} {} should be rejected",
                method.as_str(),
                url
            );
        }
    }

    #[test]
    fn test_classify_dependent_ops() {
        let cases = [
            (HttpMethod::Post, "https://api.test/observation_photos", DependentOp::PhotoAdd),
            (HttpMethod::Post, "https://api.test/observation_field_values", DependentOp::FieldAdd),
            (HttpMethod::Post, "https://api.test/project_observations", DependentOp::LinkageComplete),
            (
                HttpMethod::Delete,
                "https://api.test/observation_photos/12",
                DependentOp::PhotoDelete { id: 12 },
            ),
            (
                HttpMethod::Delete,
                "https://api.test/observation_field_values/3",
                DependentOp::FieldDelete { id: 3 },
            ),
            (HttpMethod::Magic, OBS_PUT_POISON_PILL_URL, DependentOp::UpdateComplete),
        ];
        for (method, url, expected) in cases {
            assert_eq!(DependentOp::classify(&req(method, url)).unwrap(), expected);
        }
    }

    #[test]
    fn test_dependent_rejects_unexpected_combinations() {
        assert!(DependentOp::classify(&req(HttpMethod::Put, "https://api.test/observation_photos/1")).is_err());
        assert!(DependentOp::classify(&req(HttpMethod::Magic, "http://local.poison-pill/other")).is_err());
        assert!(DependentOp::classify(&req(HttpMethod::Post, "https://api.test/observations")).is_err());
    }
}
