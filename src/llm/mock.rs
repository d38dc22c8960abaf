//! 脚本化 Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置回复（或错误），并记录每次收到的 prompt，便于断言「本轮是否调用了模型」。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端：预置回复队列 + 调用记录；队列耗尽时返回 Transport 错误
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以固定回复序列构造
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::default();
        for r in replies {
            mock.push_reply(r);
        }
        mock
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    /// 下一次调用返回 Transport 错误
    pub fn push_failure(&self, reason: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(reason.into()));
        }
    }

    /// 已收到的 prompt（最后一条 user 消息内容）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, AgentError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if let Ok(mut p) = self.prompts.lock() {
            p.push(last_user);
        }

        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(reply)) => Ok(reply.trim().to_string()),
            Some(Err(reason)) => Err(AgentError::Transport(reason)),
            None => Err(AgentError::Transport("mock reply queue exhausted".to_string())),
        }
    }
}
