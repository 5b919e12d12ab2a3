use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::types::{ChatModel, ChatRequest};
use super::GradingError;

/// HTTP chat client for a `/api/generate`-shaped provider endpoint.
///
/// The HTTP timeout is the call's whole budget; the orchestrator applies
/// the same bound on its side so a hung socket cannot stall a grading.
pub struct HttpChatModel {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl HttpChatModel {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        }
    }
}

impl ChatModel for HttpChatModel {
    fn complete(&self, request: &ChatRequest) -> Result<String, GradingError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: &request.system,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
            },
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                GradingError::Timeout {
                    secs: self.timeout_secs,
                }
            } else if e.is_connect() {
                GradingError::Connection(self.base_url.clone())
            } else {
                GradingError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GradingError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| GradingError::ResponseParsing(e.to_string()))?;
        Ok(parsed.response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Mock chat model for testing — scripted responses consumed in order,
/// with optional per-call delay and a record of every request received.
pub struct MockChatModel {
    model_id: String,
    responses: Mutex<VecDeque<Result<String, GradingError>>>,
    delay: Option<std::time::Duration>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatModel {
    pub fn new(model_id: &str, responses: Vec<Result<String, GradingError>>) -> Self {
        Self {
            model_id: model_id.to_string(),
            responses: Mutex::new(responses.into()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Single canned success, repeated forever.
    pub fn always(model_id: &str, response: &str) -> Self {
        let mut mock = Self::new(model_id, vec![]);
        mock.responses = Mutex::new(VecDeque::from(vec![Ok(response.to_string())]));
        mock
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl ChatModel for MockChatModel {
    fn complete(&self, request: &ChatRequest) -> Result<String, GradingError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.requests.lock().unwrap().push(request.clone());

        let mut responses = self.responses.lock().unwrap();
        match responses.pop_front() {
            Some(r) => {
                // `always` mocks keep replaying their single entry.
                if responses.is_empty() {
                    if let Ok(text) = &r {
                        responses.push_back(Ok(text.clone()));
                    }
                }
                r
            }
            None => Err(GradingError::Connection("mock exhausted".into())),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
