//! Scripted HTTP double shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use authload::client::{ApiRequest, ApiResponse, HttpApi};
use authload::error::TransportError;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Replays queued responses in order and records every request it receives
#[derive(Default)]
pub struct ScriptedApi {
    responses: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .push_back(Ok(ApiResponse::new(status, body)));
        self
    }

    pub fn fail(self, err: TransportError) -> Self {
        self.responses.lock().push_back(Err(err));
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpApi for ScriptedApi {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("no scripted response left".into())))
    }
}
