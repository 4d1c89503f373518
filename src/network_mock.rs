use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StatwolfError, StatwolfResult};
use crate::http::Transport;

/// HTTP method of a recorded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request seen by the mock transport
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    replies: HashMap<String, Value>,
    queued: HashMap<String, VecDeque<Value>>,
    failures: HashMap<String, String>,
    calls: Vec<RecordedCall>,
}

/// Mock transport with scripted replies per path, for tests
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replies with `reply` to every request on `path`
    pub fn reply(&self, path: &str, reply: Value) -> &Self {
        self.state().replies.insert(path.to_string(), reply);
        self
    }

    /// Queues a one-shot reply; queued replies are used before the standing one
    pub fn enqueue(&self, path: &str, reply: Value) -> &Self {
        self.state()
            .queued
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Makes every request on `path` fail with a network error
    pub fn fail(&self, path: &str, message: &str) -> &Self {
        self.state().failures.insert(path.to_string(), message.to_string());
        self
    }

    /// All calls in the order they were made
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Calls made to one path
    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.path == path)
            .cloned()
            .collect()
    }

    /// Body of the most recent POST to `path`
    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.calls_to(path)
            .into_iter()
            .rev()
            .find(|call| call.method == Method::Post)
            .and_then(|call| call.body)
    }

    fn handle(&self, method: Method, path: &str, body: Option<&Value>) -> StatwolfResult<Value> {
        let mut state = self.state();
        state.calls.push(RecordedCall {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        if let Some(message) = state.failures.get(path) {
            return Err(StatwolfError::Network(message.clone()));
        }

        if let Some(reply) = state.queued.get_mut(path).and_then(|queue| queue.pop_front()) {
            return Ok(reply);
        }

        state
            .replies
            .get(path)
            .cloned()
            .ok_or_else(|| StatwolfError::Network(format!("No mock reply for {}", path)))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, path: &str, body: &Value) -> StatwolfResult<Value> {
        self.handle(Method::Post, path, Some(body))
    }

    async fn get(&self, path: &str) -> StatwolfResult<Value> {
        self.handle(Method::Get, path, None)
    }
}
