//! Scripted transport for replay tests.

use crate::config::SyncConfig;
use crate::database;
use crate::error::AppError;
use crate::models::{QueuedRequest, RequestBody};
use crate::services::engine::SyncEngine;
use crate::services::transport::{build_form, HttpResponse, HttpTransport};
use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, Mutex};

/// What the mock answers for one request
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, &'static str),
    /// No response at all, like a dropped connection
    Offline,
}

type Script = Box<dyn Fn(&QueuedRequest) -> Reply + Send + Sync>;

pub struct MockTransport {
    script: Script,
    sent: Mutex<Vec<QueuedRequest>>,
    authorizations: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new(script: impl Fn(&QueuedRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            sent: Mutex::new(Vec::new()),
            authorizations: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self::new(move |_| reply.clone())
    }

    pub fn sent(&self) -> Vec<QueuedRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.authorizations.lock().unwrap().clone()
    }
}

impl HttpTransport for MockTransport {
    fn send<'a>(
        &'a self,
        request: &'a QueuedRequest,
        authorization: &'a str,
    ) -> BoxFuture<'a, Result<HttpResponse, AppError>> {
        // multipart bodies are checked like the real transport does
        if let Some(RequestBody::Multipart { parts }) = &request.body {
            if let Err(e) = build_form(parts) {
                return futures::future::ready(Err(e)).boxed();
            }
        }
        let result = match (self.script)(request) {
            Reply::Status(status, body) => {
                self.sent.lock().unwrap().push(request.clone());
                self.authorizations
                    .lock()
                    .unwrap()
                    .push(authorization.to_string());
                Ok(HttpResponse::new(status, body.as_bytes().to_vec()))
            }
            Reply::Offline => Err(AppError::Transport("connection refused".to_string())),
        };
        futures::future::ready(result).boxed()
    }
}

/// Engine on an in-memory database, linking creates to project 7 and never
/// draining dependents on its own
pub fn test_engine(transport: MockTransport) -> (Arc<SyncEngine>, Arc<MockTransport>) {
    let config = SyncConfig {
        api_url_base: "https://api.test/".to_string(),
        project_id: Some(7),
        eager_dependent_sync: false,
        ..Default::default()
    };
    let transport = Arc::new(transport);
    let engine = SyncEngine::new(config, database::open_in_memory().unwrap(), transport.clone());
    (engine, transport)
}
