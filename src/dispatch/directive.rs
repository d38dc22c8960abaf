//! 动作指令解析
//!
//! 模型回复约定为一行 `Action: <tag>(<arg>)`。取最后一个 `Action:` 之后的内容，
//! 动作名必须属于固定枚举；search_web 的参数取第一个 `(` 到其后第一个 `)` 之间的文本，去掉首尾双引号。
//! 不合规的回复一律视为分类失败，不做模糊匹配。

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::core::AgentError;

/// 回复中动作行的前缀
pub const ACTION_MARKER: &str = "Action:";

/// 可用动作名（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTag {
    SearchWeb,
    ConnectToDatabase,
    StartRagApp,
}

impl ActionTag {
    pub const ALL: [ActionTag; 3] = [
        ActionTag::SearchWeb,
        ActionTag::ConnectToDatabase,
        ActionTag::StartRagApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTag::SearchWeb => "search_web",
            ActionTag::ConnectToDatabase => "connect_to_database",
            ActionTag::StartRagApp => "start_rag_app",
        }
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionTag {
    type Err = DirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| DirectiveError::Unrecognized(name.to_string()))
    }
}

/// 解析后的动作指令（每轮至多一个）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionDirective {
    Search { query: String },
    Database,
    Rag,
}

impl ActionDirective {
    pub fn tag(&self) -> ActionTag {
        match self {
            ActionDirective::Search { .. } => ActionTag::SearchWeb,
            ActionDirective::Database => ActionTag::ConnectToDatabase,
            ActionDirective::Rag => ActionTag::StartRagApp,
        }
    }
}

/// 回复不符合约定的原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("no 'Action:' line in the reply")]
    MissingMarker,

    #[error("empty action after 'Action:'")]
    EmptyAction,

    #[error("'{0}' is not one of search_web, connect_to_database, start_rag_app")]
    Unrecognized(String),

    #[error("{0} requires a non-empty argument")]
    MissingArgument(ActionTag),
}

impl From<DirectiveError> for AgentError {
    fn from(err: DirectiveError) -> Self {
        match err {
            DirectiveError::Unrecognized(name) => AgentError::UnrecognizedAction(name),
            other => AgentError::ClassificationFailure(other.to_string()),
        }
    }
}

/// 取第一个 `(` 与其后第一个 `)` 之间的参数，去除首尾空白与双引号；内部引号保持原样
pub fn extract_argument(call: &str) -> Option<&str> {
    let open = call.find('(')?;
    let rest = &call[open + 1..];
    let close = rest.find(')')?;
    Some(rest[..close].trim().trim_matches('"'))
}

/// 解析模型回复为动作指令
pub fn parse_directive(reply: &str) -> Result<ActionDirective, DirectiveError> {
    let idx = reply.rfind(ACTION_MARKER).ok_or(DirectiveError::MissingMarker)?;
    let call = reply[idx + ACTION_MARKER.len()..]
        .trim()
        .trim_matches('`')
        .trim();

    let name = call.split('(').next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(DirectiveError::EmptyAction);
    }

    match name.parse::<ActionTag>()? {
        ActionTag::SearchWeb => {
            let query = extract_argument(call)
                .filter(|q| !q.is_empty())
                .ok_or(DirectiveError::MissingArgument(ActionTag::SearchWeb))?;
            Ok(ActionDirective::Search {
                query: query.to_string(),
            })
        }
        ActionTag::ConnectToDatabase => Ok(ActionDirective::Database),
        ActionTag::StartRagApp => Ok(ActionDirective::Rag),
    }
}
