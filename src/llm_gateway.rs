use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::warn;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Completion/embedding services the pipeline stages depend on. The stages
/// only ever see this trait so tests can substitute a scripted backend.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    /// Text completion constrained to a single JSON object response.
    async fn complete_json(&self, system: &str, user: &str) -> Result<String>;

    /// Vision completion: one screenshot (base64 JPEG/PNG) plus a text query,
    /// constrained to a single JSON object response.
    async fn complete_vision_json(
        &self,
        system: &str,
        query: &str,
        image_b64: &str,
    ) -> Result<String>;

    /// Fixed-length embedding vector for a text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// OpenAI-compatible client over reqwest with bounded timeouts and a small
/// retry/backoff loop for transient failures.
#[derive(Clone)]
pub struct LLMClient {
    client: Client,
    api_key: String,
    api_base: String,
    planner_model: String,
    vision_model: String,
    embedding_model: String,
}

impl LLMClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            planner_model: config.planner_model.clone(),
            vision_model: config.vision_model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }

    /// POST with retry on 5xx/429 and network errors. Exponential backoff:
    /// 1s, 2s, 4s.
    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let max_retries = 3;
        let mut attempt = 0;
        let mut backoff = Duration::from_secs(1);

        loop {
            attempt += 1;
            match self
                .client
                .post(url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        if attempt > max_retries {
                            return Ok(resp);
                        }
                        warn!(%status, attempt, "transient completion-service error, retrying");
                    } else {
                        return Ok(resp);
                    }
                }
                Err(e) => {
                    if attempt > max_retries {
                        return Err(AppError::ServiceUnavailable(format!(
                            "max retries exceeded: {}",
                            e
                        )));
                    }
                    warn!(error = %e, attempt, "completion-service network error, retrying");
                }
            }

            sleep(backoff).await;
            backoff *= 2;
        }
    }

    async fn chat(&self, body: Value) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let response = self.post_with_retry(&url, &body).await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ServiceUnavailable(format!(
                "completion API error: {}",
                error_text
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("invalid API response: {}", e)))?;

        if let Some(refusal) = body["choices"][0]["message"]["refusal"].as_str() {
            return Err(AppError::ServiceUnavailable(format!(
                "completion refused: {}",
                refusal
            )));
        }

        match body["choices"][0]["message"]["content"].as_str() {
            Some(content) => Ok(content.to_string()),
            None => Err(AppError::ServiceUnavailable(
                "no content in completion response".to_string(),
            )),
        }
    }
}

#[async_trait]
impl LanguageBackend for LLMClient {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        // Low fixed temperature to favor deterministic plans. Not a hard
        // guarantee; plans are not byte-identical across calls.
        let body = json!({
            "model": self.planner_model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.2,
            "max_tokens": 800
        });
        self.chat(body).await
    }

    async fn complete_vision_json(
        &self,
        system: &str,
        query: &str,
        image_b64: &str,
    ) -> Result<String> {
        let body = json!({
            "model": self.vision_model,
            "messages": [
                { "role": "system", "content": system },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:image/png;base64,{}", image_b64),
                                "detail": "high"
                            }
                        },
                        { "type": "text", "text": query }
                    ]
                }
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.1,
            "max_tokens": 600
        });
        self.chat(body).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.embedding_model,
            "input": text,
        });

        let url = format!("{}/embeddings", self.api_base);
        let response = match self.post_with_retry(&url, &body).await {
            Ok(r) => r,
            Err(e) => return Err(AppError::Embedding(e.to_string())),
        };

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!("embedding API error: {}", error_text)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("invalid embedding response: {}", e)))?;

        let vector = body["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| AppError::Embedding("missing embedding vector".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        Ok(vector)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Scripted backend for stage tests: completions and vision responses
    /// are popped in order, embeddings come from a fixed text->vector map.
    #[derive(Default)]
    pub struct MockBackend {
        pub completions: Mutex<VecDeque<Result<String>>>,
        pub visions: Mutex<VecDeque<Result<String>>>,
        pub embeddings: Mutex<HashMap<String, Vec<f32>>>,
        pub fail_embeddings: AtomicBool,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_completion(&self, response: &str) {
            self.completions
                .lock()
                .unwrap()
                .push_back(Ok(response.to_string()));
        }

        pub fn push_vision(&self, response: &str) {
            self.visions
                .lock()
                .unwrap()
                .push_back(Ok(response.to_string()));
        }

        pub fn set_embedding(&self, text: &str, vector: Vec<f32>) {
            self.embeddings
                .lock()
                .unwrap()
                .insert(text.to_string(), vector);
        }

        pub fn fail_embeddings(&self) {
            self.fail_embeddings.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LanguageBackend for MockBackend {
        async fn complete_json(&self, _system: &str, _user: &str) -> Result<String> {
            self.completions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(AppError::ServiceUnavailable("mock completions exhausted".into()))
                })
        }

        async fn complete_vision_json(
            &self,
            _system: &str,
            _query: &str,
            _image_b64: &str,
        ) -> Result<String> {
            self.visions.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(AppError::ServiceUnavailable("mock visions exhausted".into()))
            })
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail_embeddings.load(Ordering::SeqCst) {
                return Err(AppError::Embedding("mock embedding failure".into()));
            }
            Ok(self
                .embeddings
                .lock()
                .unwrap()
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![1.0, 0.0, 0.0]))
        }
    }
}
