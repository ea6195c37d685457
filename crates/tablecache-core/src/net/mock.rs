//! Scripted transport for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::Notify;

use super::{FetchError, Request, Response, Transport};

#[derive(Clone)]
enum Reply {
    Respond(Response),
    Fail,
    /// Wait for the notify before answering.
    Held(Arc<Notify>, Response),
}

#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(Method, String)>>,
    offline: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn route(&self, url: &str, reply: Reply) {
        self.routes.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn respond(&self, url: &str, status: StatusCode, body: &str) {
        self.route(url, Reply::Respond(Response::new(status, body.as_bytes().to_vec())));
    }

    pub fn json(&self, url: &str, body: Value) {
        self.route(
            url,
            Reply::Respond(Response::json_body(StatusCode::OK, &body).unwrap()),
        );
    }

    pub fn fail(&self, url: &str) {
        self.route(url, Reply::Fail);
    }

    pub fn hold(&self, url: &str, gate: Arc<Notify>, body: &str) {
        self.route(
            url,
            Reply::Held(gate, Response::new(StatusCode::OK, body.as_bytes().to_vec())),
        );
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, u)| u == url)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        self.calls
            .lock()
            .unwrap()
            .push((request.method.clone(), url.clone()));

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable("offline".to_string()));
        }

        let reply = self.routes.lock().unwrap().get(&url).cloned();
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Held(gate, response)) => {
                gate.notified().await;
                Ok(response)
            }
            Some(Reply::Fail) | None => Err(FetchError::Unreachable(url)),
        }
    }
}
