//! Web 搜索客户端：SerpAPI 风格的 GET 接口
//!
//! 请求参数 {engine, q, api_key, num}；响应取 `organic_results[*].{title, link}`，保持原顺序。
//! 出错时记录日志并降级为空结果，调度层统一显示 "No results found."。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SearchSection;
use crate::core::AgentError;

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
}

/// 搜索后端 trait：返回有序结果，失败时为空（错误只体现在日志中）
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Vec<SearchResult>;
}

/// SerpAPI 客户端
pub struct SerpApiClient {
    client: Client,
    endpoint: String,
    engine: String,
    num_results: u32,
    api_key: SecretString,
}

/// 从响应 JSON 解析 organic_results；缺少该字段视为空，条目缺 title/link 时跳过
pub fn parse_organic_results(body: &Value) -> Result<Vec<SearchResult>, AgentError> {
    let Some(results) = body.get("organic_results") else {
        return Ok(Vec::new());
    };
    let items = results.as_array().ok_or_else(|| {
        AgentError::MalformedResponse("'organic_results' is not an array".to_string())
    })?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let title = item.get("title")?.as_str()?;
            let link = item.get("link")?.as_str()?;
            Some(SearchResult {
                title: title.to_string(),
                link: link.to_string(),
            })
        })
        .collect())
}

impl SerpApiClient {
    pub fn new(section: &SearchSection, api_key: SecretString) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: section.endpoint.clone(),
            engine: section.engine.clone(),
            num_results: section.num_results,
            api_key,
        })
    }

    /// 执行搜索并保留错误（供需要区分「无结果」与「出错」的调用方使用）
    pub async fn try_search(&self, query: &str) -> Result<Vec<SearchResult>, AgentError> {
        let num = self.num_results.to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", self.engine.as_str()),
                ("q", query),
                ("api_key", self.api_key.expose_secret()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("Request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(AgentError::Transport(format!("HTTP {}", resp.status())));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AgentError::MalformedResponse(format!("Read body: {}", e)))?;

        parse_organic_results(&body)
    }
}

#[async_trait]
impl SearchBackend for SerpApiClient {
    async fn search(&self, query: &str) -> Vec<SearchResult> {
        tracing::info!(query = %query, engine = %self.engine, "web search");
        match self.try_search(query).await {
            Ok(results) => {
                tracing::info!("Found {} results.", results.len());
                results
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "web search failed");
                Vec::new()
            }
        }
    }
}
