//! Agent 组装
//!
//! 由配置与校验后的凭据构建 Dispatcher：OpenAI 兼容 LLM、SerpAPI 搜索、数据库连接工厂、RAG 进程启动器。

use std::sync::Arc;

use crate::config::{AppConfig, Credentials};
use crate::core::AgentError;
use crate::dispatch::{Dispatcher, PromptTemplate, ShortcutMatcher};
use crate::llm::OpenAiClient;
use crate::tools::{connector_for, LaunchSettings, ProcessLauncher, SerpApiClient};

/// 创建调度器；任何组件构建失败都以 Config 错误返回
pub fn create_dispatcher(cfg: &AppConfig, creds: &Credentials) -> Result<Dispatcher, AgentError> {
    let llm = OpenAiClient::new(&cfg.llm, creds.llm_api_key.clone())?;
    tracing::info!(model = %llm.model(), base_url = %cfg.llm.base_url, "Using OpenAI-compatible LLM");

    let search = SerpApiClient::new(&cfg.search, creds.search_api_key.clone())?;
    let database = connector_for(&creds.database)?;
    let launcher = ProcessLauncher::new(LaunchSettings::from(&cfg.retrieval));

    Ok(Dispatcher::new(
        Arc::new(llm),
        Arc::new(search),
        database,
        Box::new(launcher),
    )
    .with_shortcuts(ShortcutMatcher::from_config(&cfg.app))
    .with_prompt(PromptTemplate::load()))
}
