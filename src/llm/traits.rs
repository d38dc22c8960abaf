//! LLM 客户端抽象
//!
//! 后端（OpenAI 兼容 HTTP / 测试用脚本化 Mock）实现 LlmClient：complete 返回去除首尾空白的回复文本。

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::Message;

/// LLM 客户端 trait：单次非流式完成
///
/// 任何失败（网络、状态码、响应缺字段）都以 Err 返回；调用方必须将其视为「分类失败」，而不是「无动作」。
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, AgentError>;

    /// 便捷方法：单轮 user 消息
    async fn complete_prompt(&self, prompt: &str) -> Result<String, AgentError> {
        self.complete(&[Message::user(prompt)]).await
    }
}
