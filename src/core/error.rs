//! Agent 错误类型
//!
//! 每类错误都在产生它的操作边界被捕获、记录日志并转为用户可见消息；调度循环不会因单轮失败而退出。
//! 只有启动阶段的 Config 错误是致命的。

use thiserror::Error;

/// 调度过程中可能出现的错误（网络、响应格式、数据库、分类、子进程、配置）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 访问模型或搜索后端时的网络 / HTTP 层错误
    #[error("Transport failure: {0}")]
    Transport(String),

    /// 后端返回的 JSON 结构不符合预期
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Database connection failed: {0}")]
    ConnectionFailure(String),

    #[error("Query failed: {0}")]
    QueryFailure(String),

    /// 模型没有给出可用的动作（调用失败、空回复、缺少 `Action:`、参数不合规）
    #[error("Classification failed: {0}")]
    ClassificationFailure(String),

    /// 回复中的动作名不在固定枚举内
    #[error("Unrecognized action: {0}")]
    UnrecognizedAction(String),

    #[error("Subprocess failure: {0}")]
    SubprocessFailure(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 便于日志中按类别聚合
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Transport(_) => "transport",
            AgentError::MalformedResponse(_) => "malformed_response",
            AgentError::ConnectionFailure(_) => "connection",
            AgentError::QueryFailure(_) => "query",
            AgentError::ClassificationFailure(_) => "classification",
            AgentError::UnrecognizedAction(_) => "unrecognized_action",
            AgentError::SubprocessFailure(_) => "subprocess",
            AgentError::Config(_) => "config",
        }
    }
}
