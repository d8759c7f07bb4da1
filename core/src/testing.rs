//! In-memory `Transport` for tests.
//!
//! Responses are scripted per method and path suffix and repeat until
//! replaced. A transport can be put on hold so requests park inside
//! `execute` until released, which is how tests keep a fetch in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

#[derive(Debug, Clone)]
enum Scripted {
    Respond { status: u16, body: String },
    Fail(String),
}

#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<(HttpMethod, String), Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
    held: AtomicBool,
    gate: Semaphore,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    /// Answer every `method` request whose path ends with `path`.
    pub fn respond(&self, method: HttpMethod, path: &str, status: u16, body: &str) {
        self.script.lock().insert(
            (method, path.to_string()),
            Scripted::Respond {
                status,
                body: body.to_string(),
            },
        );
    }

    /// Fail matching requests below HTTP with `message`.
    pub fn fail(&self, method: HttpMethod, path: &str, message: &str) {
        self.script
            .lock()
            .insert((method, path.to_string()), Scripted::Fail(message.to_string()));
    }

    /// Park subsequent requests until `release` is called.
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Let `n` parked (or future) requests through.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Stop parking requests. Requests already parked still need `release`.
    pub fn resume(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|req| req.method == method && req.path.ends_with(path))
            .count()
    }

    fn lookup(&self, request: &HttpRequest) -> Option<Scripted> {
        let script = self.script.lock();
        script
            .iter()
            .filter(|((method, path), _)| *method == request.method && request.path.ends_with(path.as_str()))
            .max_by_key(|((_, path), _)| path.len())
            .map(|(_, scripted)| scripted.clone())
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.requests.lock().push(request.clone());

        if self.held.load(Ordering::SeqCst) {
            let permit = self.gate.acquire().await.map_err(ApiError::transport)?;
            permit.forget();
        }

        match self.lookup(&request) {
            Some(Scripted::Respond { status, body }) => Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body,
            }),
            Some(Scripted::Fail(message)) => Err(ApiError::transport(message)),
            None => Ok(HttpResponse {
                status: 404,
                headers: Vec::new(),
                body: r#"{"detail":"Not Found"}"#.to_string(),
            }),
        }
    }
}
