//! Scripted `Network` for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;
use tether_core::Error;

use crate::fetch::{FetchResponse, Network, Request, ResponseSource};

#[derive(Debug, Clone)]
enum Reply {
    Respond { status: u16, content_type: String, body: String },
    Fail,
}

/// A network answering from a fixed table of URLs.
///
/// Unknown URLs answer `404`. While offline, every request fails.
#[derive(Debug, Default)]
pub struct StubNetwork {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with the given status and body.
    pub fn respond(&self, url: &str, status: u16, content_type: &str, body: impl Into<String>) {
        let reply = Reply::Respond { status, content_type: content_type.into(), body: body.into() };
        self.lock_replies().insert(url.to_string(), reply);
    }

    /// Answer `url` with `200` and a JSON body.
    pub fn json(&self, url: &str, body: &serde_json::Value) {
        self.respond(url, 200, "application/json", body.to_string());
    }

    /// Fail requests for `url` with a network error.
    pub fn fail(&self, url: &str) {
        self.lock_replies().insert(url.to_string(), Reply::Fail);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every URL requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|called| called.as_str() == url).count()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, HashMap<String, Reply>> {
        self.replies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &Request) -> Result<FetchResponse, Error> {
        let url = request.url.as_str().to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.clone());
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{url}: offline")));
        }

        let reply = self.lock_replies().get(&url).cloned();
        let (status, content_type, body) = match reply {
            Some(Reply::Respond { status, content_type, body }) => (status, content_type, body),
            Some(Reply::Fail) => return Err(Error::Network(format!("{url}: connection reset"))),
            None => (404, "text/plain".to_string(), "not found".to_string()),
        };

        let status = StatusCode::from_u16(status).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let mut response = FetchResponse::synthesized(request.url.clone(), status, &content_type, body);
        response.source = ResponseSource::Network;
        Ok(response)
    }
}
