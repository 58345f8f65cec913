use crate::error::AppError;
use crate::models::{HttpMethod, MultipartPart, QueuedRequest, RequestBody};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Status and body of a replayed request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Sends one queued request. Any response, whatever its status, is `Ok`;
/// `Err(AppError::Transport)` means no response was received.
pub trait HttpTransport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a QueuedRequest,
        authorization: &'a str,
    ) -> BoxFuture<'a, Result<HttpResponse, AppError>>;
}

/// Transport backed by a shared reqwest client
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout_seconds: u64) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(30))
            .user_agent(concat!("wow-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Other(format!("Client build failed: {}", e)))?;
        Ok(Self { client })
    }
}

fn to_reqwest_method(method: HttpMethod) -> Result<reqwest::Method, AppError> {
    match method {
        HttpMethod::Post => Ok(reqwest::Method::POST),
        HttpMethod::Put => Ok(reqwest::Method::PUT),
        HttpMethod::Delete => Ok(reqwest::Method::DELETE),
        HttpMethod::Magic => Err(AppError::Programmer(
            "MAGIC requests must never be sent over the network".to_string(),
        )),
    }
}

pub(crate) fn build_form(parts: &[MultipartPart]) -> Result<reqwest::multipart::Form, AppError> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        form = match part {
            MultipartPart::Text { name, value } => form.text(name.clone(), value.clone()),
            MultipartPart::File {
                name,
                filename,
                mime,
                data,
            } => {
                let file = reqwest::multipart::Part::bytes(data.clone())
                    .file_name(filename.clone())
                    .mime_str(mime)
                    .map_err(|e| {
                        AppError::Programmer(format!("Invalid mime type '{}': {}", mime, e))
                    })?;
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}

async fn send_with_reqwest(
    client: &reqwest::Client,
    request: &QueuedRequest,
    authorization: &str,
) -> Result<HttpResponse, AppError> {
    let method = to_reqwest_method(request.method)?;
    let mut builder = client
        .request(method, &request.url)
        .header(reqwest::header::AUTHORIZATION, authorization);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = match &request.body {
        Some(RequestBody::Json { value }) => builder.body(serde_json::to_vec(value)?),
        Some(RequestBody::Multipart { parts }) => builder.multipart(build_form(parts)?),
        None => builder,
    };

    let response = builder
        .send()
        .await
        .map_err(|e| AppError::Transport(format!("Request failed: {}", e)))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| AppError::Transport(format!("Reading response failed: {}", e)))?;

    Ok(HttpResponse::new(status, body.to_vec()))
}

impl HttpTransport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: &'a QueuedRequest,
        authorization: &'a str,
    ) -> BoxFuture<'a, Result<HttpResponse, AppError>> {
        send_with_reqwest(&self.client, request, authorization).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_is_never_sent() {
        assert!(matches!(
            to_reqwest_method(HttpMethod::Magic),
            Err(AppError::Programmer(_))
        ));
        assert_eq!(to_reqwest_method(HttpMethod::Put).unwrap(), reqwest::Method::PUT);
    }

    #[test]
    fn test_build_form_rejects_bad_mime() {
        let parts = vec![MultipartPart::File {
            name: "file".to_string(),
            filename: "top".to_string(),
            mime: "not a mime".to_string(),
            data: vec![1],
        }];
        assert!(build_form(&parts).is_err());
    }

    #[test]
    fn test_response_status_classes() {
        let response = HttpResponse::new(422, b"{}".to_vec());
        assert!(response.is_client_error());
        assert!(!response.is_server_error());
        assert!(HttpResponse::new(503, Vec::new()).is_server_error());
    }
}
