//! Foreman - 命令行调度智能体
//!
//! 模块划分：
//! - **agent**: 由配置组装 Dispatcher
//! - **config**: 应用配置加载（TOML + 环境变量）与凭据校验
//! - **core**: 错误分类与调度阶段
//! - **dispatch**: 快捷意图、分类 Prompt、`Action:` 指令解析、主循环
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化
//! - **tools**: 外部集成（Web 搜索、数据库、RAG 子系统启动器）

pub mod agent;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod llm;
pub mod observability;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::Dispatcher;
