//! OpenAI 兼容 Chat Completion 客户端
//!
//! 直接用 reqwest 调用 `{base_url}/chat/completions`（Groq、OpenAI、自建代理等均兼容）；
//! 请求体带 max_tokens / temperature / stop，回复从 `choices[0].text` 或 `choices[0].message.content` 提取。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use crate::config::LlmSection;
use crate::core::AgentError;
use crate::llm::{LlmClient, Message};

/// 请求体（只包含单轮分类所需字段）
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    stop: &'a [String],
}

/// OpenAI 兼容客户端：持有 HTTP Client、端点、密钥与生成参数
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    temperature: f32,
    stop: Vec<String>,
}

impl OpenAiClient {
    pub fn new(section: &LlmSection, api_key: SecretString) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", section.base_url.trim_end_matches('/')),
            api_key,
            model: section.model.clone(),
            max_tokens: section.max_tokens,
            temperature: section.temperature,
            stop: section.stop.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// 从响应 JSON 中取首个 choice 的文本；兼容 completion 风格（text）与 chat 风格（message.content）
pub fn extract_reply(body: &Value) -> Result<String, AgentError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| AgentError::MalformedResponse("no 'choices' field in response".to_string()))?;

    if let Some(text) = choice.get("text").and_then(|t| t.as_str()) {
        return Ok(text.trim().to_string());
    }
    if let Some(content) = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
    {
        return Ok(content.trim().to_string());
    }
    Err(AgentError::MalformedResponse(
        "no 'text' or 'message.content' in choices[0]".to_string(),
    ))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, AgentError> {
        let payload = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stop: &self.stop,
        };
        tracing::debug!(
            payload = %serde_json::to_string(&payload).unwrap_or_default(),
            "llm request"
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "llm request failed");
                AgentError::Transport(e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "llm returned error status");
            return Err(AgentError::Transport(format!("HTTP {}", status)));
        }

        let body: Value = resp.json().await.map_err(|e| {
            tracing::error!(error = %e, "llm response is not JSON");
            AgentError::MalformedResponse(e.to_string())
        })?;
        tracing::debug!(response = %body, "llm response");

        extract_reply(&body).map_err(|e| {
            tracing::error!(error = %e, "unexpected llm response shape");
            e
        })
    }
}
