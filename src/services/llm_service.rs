use crate::api::middleware::AppError;
use crate::config::LlmConfig;
use crate::models::ContextEntry;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The two model roles used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Planning, query synthesis and answering
    Primary,
    /// Route classification
    Secondary,
}

/// A chat model that turns a system prompt, prior turns and a human input into text
#[async_trait::async_trait]
pub trait ModelService: Send + Sync {
    async fn invoke(
        &self,
        system_prompt: &str,
        human_input: &str,
        context: &[ContextEntry],
    ) -> Result<String, AppError>;

    fn model_name(&self) -> &str;
}

/// Client for an Ollama-compatible `/api/chat` endpoint
pub struct OllamaChatModel {
    gateway_url: String,
    api_key: Option<String>,
    model: String,
    http_client: HttpClient,
}

impl OllamaChatModel {
    pub fn new(
        gateway_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        http_client: HttpClient,
    ) -> Self {
        Self {
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            http_client,
        }
    }

    fn build_messages(system_prompt: &str, human_input: &str, context: &[ContextEntry]) -> Vec<Value> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(json!({ "role": "system", "content": system_prompt }));
        for entry in context {
            messages.push(json!({ "role": entry.role.as_str(), "content": entry.content }));
        }
        messages.push(json!({ "role": "user", "content": human_input }));
        messages
    }

    /// Chat replies carry `message.content`; completion-style gateways use a flat field
    fn extract_content(body: &Value) -> Option<String> {
        body["message"]["content"]
            .as_str()
            .or_else(|| body["response"].as_str())
            .or_else(|| body["text"].as_str())
            .or_else(|| body["content"].as_str())
            .map(str::to_string)
    }
}

#[async_trait::async_trait]
impl ModelService for OllamaChatModel {
    async fn invoke(
        &self,
        system_prompt: &str,
        human_input: &str,
        context: &[ContextEntry],
    ) -> Result<String, AppError> {
        let mut request = self
            .http_client
            .post(format!("{}/api/chat", self.gateway_url))
            .json(&json!({
                "model": self.model,
                "stream": false,
                "messages": Self::build_messages(system_prompt, human_input, context),
                "options": { "temperature": 0 },
            }));

        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(|e| {
            AppError::ModelUnavailable(format!("Failed to call model {}: {}", self.model, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ModelUnavailable(format!(
                "Model gateway returned error {}: {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            AppError::ModelUnavailable(format!("Failed to parse model response: {}", e))
        })?;

        Self::extract_content(&body).ok_or_else(|| {
            AppError::ModelUnavailable("Model response does not contain any text".to_string())
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// One service handle per variant, resolved once from configuration.
/// Every call is bounded by the configured timeout.
#[derive(Clone)]
pub struct ModelHandles {
    primary: Arc<dyn ModelService>,
    secondary: Arc<dyn ModelService>,
    timeout_secs: u64,
}

impl ModelHandles {
    pub fn new(
        primary: Arc<dyn ModelService>,
        secondary: Arc<dyn ModelService>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            primary,
            secondary,
            timeout_secs,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        let http_client = HttpClient::new();
        let model = |name: &str| -> Arc<dyn ModelService> {
            Arc::new(OllamaChatModel::new(
                config.gateway_url.clone(),
                config.api_key.clone(),
                name,
                http_client.clone(),
            ))
        };

        Self::new(
            model(&config.primary_model),
            model(&config.secondary_model),
            config.timeout_secs,
        )
    }

    pub fn handle(&self, variant: ModelVariant) -> &Arc<dyn ModelService> {
        match variant {
            ModelVariant::Primary => &self.primary,
            ModelVariant::Secondary => &self.secondary,
        }
    }

    pub async fn invoke(
        &self,
        variant: ModelVariant,
        system_prompt: &str,
        human_input: &str,
        context: &[ContextEntry],
    ) -> Result<String, AppError> {
        let service = self.handle(variant);
        let started = Instant::now();

        let reply = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            service.invoke(system_prompt, human_input, context),
        )
        .await
        .map_err(|_| {
            tracing::error!("Model {} timed out after {}s", service.model_name(), self.timeout_secs);
            AppError::ModelTimeout(self.timeout_secs)
        })??;

        tracing::debug!(
            "Model {} replied in {}ms ({} chars)",
            service.model_name(),
            started.elapsed().as_millis(),
            reply.len()
        );
        Ok(reply)
    }
}
