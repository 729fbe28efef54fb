//! External judge providers and the model capability cache.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{JudgeError, JudgeResult};
use crate::config::JudgeConfig;

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Sends prompts to a named model and returns raw text.
#[async_trait]
pub trait JudgeProvider: Send + Sync {
    async fn complete(&self, model: &str, request: &CompletionRequest) -> JudgeResult<String>;
}

/// Inference tasks a model advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapability {
    pub tasks: BTreeSet<String>,
}

impl ModelCapability {
    pub fn from_tasks<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tasks: tasks.into_iter().map(Into::into).collect(),
        }
    }

    /// Nothing is known; callers should try every route.
    pub fn is_unknown(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn supports_chat(&self) -> bool {
        self.is_unknown()
            || self.tasks.contains("conversational")
            || self.tasks.contains("text-generation")
    }

    pub fn supports_text_generation(&self) -> bool {
        self.is_unknown() || self.tasks.contains("text-generation")
    }
}

/// Process-wide memo of model capabilities, keyed by model identifier.
///
/// Shared by `Arc` across concurrent evaluations. Entries are written once
/// per model; a racing second lookup writes an equal value.
#[derive(Debug, Default)]
pub struct ModelCapabilityCache {
    entries: RwLock<HashMap<String, ModelCapability>>,
}

impl ModelCapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, ModelCapability>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("capability cache lock poisoned; recovering entries");
                poisoned.into_inner()
            }
        }
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, ModelCapability>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("capability cache lock poisoned; recovering entries");
                poisoned.into_inner()
            }
        }
    }

    pub fn get(&self, model: &str) -> Option<ModelCapability> {
        self.read_entries().get(model).cloned()
    }

    /// Record `capability` unless the model already has an entry.
    pub fn insert(&self, model: &str, capability: ModelCapability) {
        self.write_entries()
            .entry(model.to_string())
            .or_insert(capability);
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extract advertised tasks from a model metadata document.
pub fn capability_from_metadata(doc: &Value) -> ModelCapability {
    let mut tasks = BTreeSet::new();
    if let Some(tag) = doc.get("pipeline_tag").and_then(Value::as_str) {
        if !tag.is_empty() {
            tasks.insert(tag.to_string());
        }
    }
    if let Some(mapping) = doc.get("inferenceProviderMapping") {
        let entries: Vec<&Value> = match mapping {
            Value::Object(map) => map.values().collect(),
            Value::Array(items) => items.iter().collect(),
            _ => Vec::new(),
        };
        for entry in entries {
            if let Some(task) = entry.get("task").and_then(Value::as_str) {
                if !task.is_empty() {
                    tasks.insert(task.to_string());
                }
            }
        }
    }
    ModelCapability { tasks }
}

/// Hugging Face inference client routing by model capability.
pub struct HuggingFaceProvider {
    http_client: reqwest::Client,
    api_key: String,
    inference_url: String,
    metadata_url: String,
    cache: Arc<ModelCapabilityCache>,
}

impl HuggingFaceProvider {
    pub fn new(
        config: &JudgeConfig,
        api_key: impl Into<String>,
        cache: Arc<ModelCapabilityCache>,
    ) -> JudgeResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("codegrade/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            inference_url: config.inference_url.trim_end_matches('/').to_string(),
            metadata_url: config.metadata_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    /// Capability for `model`, fetched at most once per process.
    pub async fn capability(&self, model: &str) -> ModelCapability {
        if let Some(cap) = self.cache.get(model) {
            return cap;
        }
        let cap = match self.fetch_metadata(model).await {
            Ok(doc) => capability_from_metadata(&doc),
            Err(e) => {
                tracing::warn!(model, error = %e, "model metadata lookup failed");
                ModelCapability::default()
            }
        };
        tracing::debug!(model, tasks = ?cap.tasks, "model capability resolved");
        self.cache.insert(model, cap.clone());
        cap
    }

    async fn fetch_metadata(&self, model: &str) -> JudgeResult<Value> {
        let url = format!(
            "{}/{}?expand=inferenceProviderMapping&expand=pipeline_tag",
            self.metadata_url, model
        );
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(JudgeError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    async fn post_json(&self, url: &str, body: &Value) -> JudgeResult<Value> {
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(JudgeError::Status {
                status: status.as_u16(),
                body: text.chars().take(300).collect(),
            });
        }
        Ok(response.json().await?)
    }

    async fn chat(&self, model: &str, request: &CompletionRequest) -> JudgeResult<String> {
        let url = format!("{}/v1/chat/completions", self.inference_url);
        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        let doc = self.post_json(&url, &body).await?;
        doc.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| JudgeError::MalformedResponse("no chat completion content".into()))
    }

    async fn text_generation(&self, model: &str, request: &CompletionRequest) -> JudgeResult<String> {
        let url = format!("{}/hf-inference/models/{}", self.inference_url, model);
        let prompt = format!(
            "### System:\n{}\n\n### User:\n{}\n\n### Assistant:\n",
            request.system, request.user
        );
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": request.max_tokens,
                "temperature": request.temperature.max(0.01),
                "return_full_text": false,
            },
        });
        let doc = self.post_json(&url, &body).await?;
        let text = doc
            .pointer("/0/generated_text")
            .or_else(|| doc.get("generated_text"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        text.ok_or_else(|| JudgeError::MalformedResponse("no generated_text".into()))
    }
}

#[async_trait]
impl JudgeProvider for HuggingFaceProvider {
    async fn complete(&self, model: &str, request: &CompletionRequest) -> JudgeResult<String> {
        let cap = self.capability(model).await;
        let mut last_err = JudgeError::UnsupportedTask {
            model: model.to_string(),
            task: "chat or text-generation".to_string(),
        };
        if cap.supports_chat() {
            match self.chat(model, request).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(model, error = %e, "chat completion failed");
                    last_err = e;
                }
            }
        }
        if cap.supports_text_generation() {
            match self.text_generation(model, request).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(model, error = %e, "text generation failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_from_metadata() {
        let doc = json!({
            "pipeline_tag": "text-generation",
            "inferenceProviderMapping": {
                "together": {"task": "conversational", "status": "live"},
                "nebius": {"task": "conversational"}
            }
        });
        let cap = capability_from_metadata(&doc);
        assert_eq!(
            cap,
            ModelCapability::from_tasks(["conversational", "text-generation"])
        );
        assert!(cap.supports_chat());
        assert!(cap.supports_text_generation());
    }

    #[test]
    fn test_conversational_only_model() {
        let cap = ModelCapability::from_tasks(["conversational"]);
        assert!(cap.supports_chat());
        assert!(!cap.supports_text_generation());
    }

    #[test]
    fn test_unknown_capability_tries_everything() {
        let cap = capability_from_metadata(&json!({}));
        assert!(cap.is_unknown());
        assert!(cap.supports_chat());
        assert!(cap.supports_text_generation());
    }

    #[test]
    fn test_unrelated_task_supports_nothing() {
        let cap = ModelCapability::from_tasks(["image-classification"]);
        assert!(!cap.supports_chat());
        assert!(!cap.supports_text_generation());
    }

    #[test]
    fn test_cache_keeps_entries_after_poisoned_lock() {
        let cache = Arc::new(ModelCapabilityCache::new());
        cache.insert("org/image", ModelCapability::from_tasks(["image-classification"]));
        let holder = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = holder.entries.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(cache.entries.is_poisoned());

        let cap = cache.get("org/image").unwrap();
        assert!(!cap.is_unknown());
        assert!(!cap.supports_chat());
        cache.insert("org/chat", ModelCapability::from_tasks(["conversational"]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_first_write_wins() {
        let cache = ModelCapabilityCache::new();
        assert!(cache.is_empty());
        cache.insert("m", ModelCapability::from_tasks(["conversational"]));
        cache.insert("m", ModelCapability::from_tasks(["text-generation"]));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("m").unwrap().tasks.contains("conversational"));
        assert!(cache.get("other").is_none());
    }

    #[tokio::test]
    async fn test_cached_capability_skips_network() {
        let cache = Arc::new(ModelCapabilityCache::new());
        cache.insert("org/model", ModelCapability::from_tasks(["conversational"]));
        let config = JudgeConfig {
            metadata_url: "http://127.0.0.1:9".to_string(),
            ..JudgeConfig::default()
        };
        let provider = HuggingFaceProvider::new(&config, "token", cache).unwrap();
        let cap = provider.capability("org/model").await;
        assert!(cap.tasks.contains("conversational"));
    }
}
