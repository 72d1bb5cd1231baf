//! Reasoning Oracle
//!
//! The oracle is the external text-generation service that proposes lessons,
//! goals, plans and milestone verdicts. The core only needs "prompt in,
//! best-effort text out":
//! - `Oracle` trait: the request/response contract
//! - `OracleClient`: caller-side timeout and one-shot JSON repair
//! - `OllamaOracle`: local Ollama/Llama over HTTP
//! - `ScriptedOracle`: canned responses for tests and offline replays

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CognitionError, Result};
use crate::parser::extract_json;

/// Text-generation service consulted by the cognitive loop
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Answer a prompt with free text (ideally JSON)
    async fn ask(&self, prompt: &str) -> Result<String>;
}

/// Shared oracle handle with the caller-side policy applied
#[derive(Clone)]
pub struct OracleClient {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
    repair_malformed_json: bool,
}

impl OracleClient {
    /// Wrap an oracle with the default policy (60s timeout, JSON repair on)
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            timeout: Duration::from_secs(60),
            repair_malformed_json: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_json_repair(mut self, enabled: bool) -> Self {
        self.repair_malformed_json = enabled;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the oracle, treating a timeout as a failure
    pub async fn ask(&self, prompt: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.oracle.ask(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(CognitionError::OracleTimeout(self.timeout)),
        }
    }

    /// Ask the oracle and extract the first JSON value from its answer
    ///
    /// If the answer holds no JSON and repair is enabled, the oracle gets one
    /// chance to rewrite its own output as valid JSON.
    pub async fn ask_json(&self, prompt: &str) -> Result<Value> {
        let response = self.ask(prompt).await?;
        if let Some(value) = extract_json(&response) {
            return Ok(value);
        }

        if !self.repair_malformed_json {
            return Err(CognitionError::UnparsableResponse(preview(&response)));
        }

        debug!("Oracle returned no JSON, requesting repair");
        let repair_prompt = format!(
            "Fix this invalid JSON and return ONLY valid JSON without any additional text:\n\n{}",
            response
        );
        let repaired = self.ask(&repair_prompt).await?;
        extract_json(&repaired).ok_or_else(|| CognitionError::UnparsableResponse(preview(&response)))
    }
}

fn preview(text: &str) -> String {
    let mut s: String = text.chars().take(120).collect();
    if text.chars().count() > 120 {
        s.push('…');
    }
    s
}

/// Ollama oracle configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model: String,
    pub temperature: f32,
    pub num_predict: u32,
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            temperature: 0.2,
            num_predict: 1024,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Ollama generate response
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Oracle backed by a local Ollama server
pub struct OllamaOracle {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaOracle {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CognitionError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Check if Ollama is reachable
    pub async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.config.ollama_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Oracle for OllamaOracle {
    async fn ask(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.config.ollama_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "model": self.config.model,
                "prompt": prompt,
                "stream": false,
                "options": {
                    "temperature": self.config.temperature,
                    "num_predict": self.config.num_predict,
                }
            }))
            .send()
            .await
            .map_err(|e| CognitionError::OracleUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Ollama error {}: {}", status, body);
            return Err(CognitionError::OracleUnavailable(format!("HTTP {}: {}", status, body)));
        }

        let result: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| CognitionError::OracleUnavailable(format!("bad response body: {}", e)))?;

        Ok(result.response.trim().to_string())
    }
}

/// Oracle that replays queued responses and records every prompt
///
/// An exhausted queue answers with `OracleUnavailable`.
#[derive(Default)]
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let oracle = Self::new();
        for r in responses {
            oracle.push(r);
        }
        oracle
    }

    /// Queue a successful response
    pub fn push(&self, response: impl Into<String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response.into()));
        }
    }

    /// Queue a failure
    pub fn push_error(&self, error: CognitionError) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(error));
        }
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn ask(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Err(CognitionError::OracleUnavailable("no scripted response".into())))
    }
}
